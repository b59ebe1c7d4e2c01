/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! An in-process cloud anchor service.
//!
//! Requests are queued on a channel. They are either processed on the
//! caller's thread by `run_pending`, or by a worker thread started with
//! `HeadlessCloudService::spawn`, so completions can be made to arrive
//! exactly when a test wants them or on a foreign thread.

mod exchange;
mod platform;

pub use platform::DrawnMarker;
pub use platform::HeadlessPlatform;
pub use platform::HeadlessRenderer;

use exchange::AnchorCache;

use cloudanchor_api::pose_at;
use cloudanchor_api::AnchorExchange;
use cloudanchor_api::AnchorNumber;
use cloudanchor_api::CloudAnchor;
use cloudanchor_api::CloudError;
use cloudanchor_api::CloudSession;
use cloudanchor_api::CloudSessionFactory;
use cloudanchor_api::CompletionCallback;
use cloudanchor_api::Error;
use cloudanchor_api::Event;
use cloudanchor_api::EventCallback;
use cloudanchor_api::Expiration;
use cloudanchor_api::ListenerSet;
use cloudanchor_api::LocateAnchorStatus;
use cloudanchor_api::LocateCriteria;
use cloudanchor_api::LocationProvider;
use cloudanchor_api::Native;
use cloudanchor_api::SensorCapabilities;
use cloudanchor_api::SensorStatus;
use cloudanchor_api::SessionConfiguration;
use cloudanchor_api::SessionStatus;
use cloudanchor_api::Subscription;
use cloudanchor_api::Watcher;
use cloudanchor_api::WatcherId;

use crossbeam_channel::{unbounded, Receiver, Sender};

use euclid::Point3D;

use log::{debug, info, warn};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Counters of what the service was asked to do.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub sessions_created: usize,
    pub sessions_started: usize,
    pub watchers_created: usize,
    pub watchers_stopped: usize,
    pub anchors_saved: usize,
    pub anchors_deleted: usize,
    pub anchors_shared: usize,
}

enum Request {
    Create {
        session: Arc<HeadlessSession>,
        anchor: CloudAnchor,
        callback: Box<dyn CompletionCallback<CloudAnchor>>,
    },
    Delete {
        anchor: CloudAnchor,
        callback: Box<dyn CompletionCallback<()>>,
    },
    Locate {
        session: Arc<HeadlessSession>,
        watcher: WatcherId,
        stopped: Arc<AtomicBool>,
        criteria: LocateCriteria,
    },
    Share {
        identifier: String,
        callback: Box<dyn CompletionCallback<u64>>,
    },
    Retrieve {
        number: AnchorNumber,
        callback: Box<dyn CompletionCallback<Option<String>>>,
    },
    Shutdown,
}

struct StoredAnchor {
    position: Point3D<f32, Native>,
    expiration: Option<Expiration>,
    /// Saved by a session with at least one sensor enabled.
    fingerprinted: bool,
    /// Whether the device can see it, if it goes looking.
    visible: bool,
}

#[derive(Default)]
struct CloudData {
    // Ordered, so that queries report anchors in a stable order.
    anchors: BTreeMap<String, StoredAnchor>,
    next_anchor: u64,
    next_watcher: u64,
    status: SessionStatus,
    fail_next_create: Option<CloudError>,
    delete_failures: HashMap<String, CloudError>,
    exchange: AnchorCache,
    sessions: Vec<Weak<HeadlessSession>>,
    location_providers: Vec<Arc<HeadlessLocationProvider>>,
    stats: ServiceStats,
}

impl CloudData {
    fn next_identifier(&mut self) -> String {
        let identifier = format!("headless-{:04}", self.next_anchor);
        self.next_anchor += 1;
        identifier
    }
}

struct Shared {
    platform: Arc<HeadlessPlatform>,
    data: Mutex<CloudData>,
    sender: Sender<Request>,
    queued: AtomicUsize,
}

impl Shared {
    fn data(&self) -> MutexGuard<'_, CloudData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, request: Request) {
        self.queued.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(request).is_err() {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            warn!("Headless cloud service is gone, dropping request");
        }
    }
}

pub struct HeadlessCloudService {
    shared: Arc<Shared>,
    receiver: Receiver<Request>,
    worker: Option<JoinHandle<()>>,
}

impl HeadlessCloudService {
    /// A service whose requests are only processed by `run_pending`.
    pub fn new(platform: Arc<HeadlessPlatform>) -> HeadlessCloudService {
        let (sender, receiver) = unbounded();
        let data = CloudData {
            next_anchor: 1,
            next_watcher: 1,
            ..Default::default()
        };
        HeadlessCloudService {
            shared: Arc::new(Shared {
                platform,
                data: Mutex::new(data),
                sender,
                queued: AtomicUsize::new(0),
            }),
            receiver,
            worker: None,
        }
    }

    /// A service that processes requests on its own thread.
    pub fn spawn(platform: Arc<HeadlessPlatform>) -> HeadlessCloudService {
        let mut service = HeadlessCloudService::new(platform);
        let receiver = service.receiver.clone();
        let shared = service.shared.clone();
        service.worker = Some(thread::spawn(move || run_loop(receiver, shared)));
        service
    }

    /// Process every queued request, including ones queued meanwhile.
    /// Returns how many were processed.
    pub fn run_pending(&self) -> usize {
        let mut processed = 0;
        while let Ok(request) = self.receiver.try_recv() {
            if !handle_request(&self.shared, request) {
                break;
            }
            processed += 1;
        }
        processed
    }

    /// Wait for the worker thread to drain the queue.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.shared.queued.load(Ordering::SeqCst) != 0 {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }

    pub fn queued(&self) -> usize {
        self.shared.queued.load(Ordering::SeqCst)
    }

    /// Report new spatial data progress to every live session.
    pub fn set_session_status(&self, status: SessionStatus) {
        let sessions: Vec<Arc<HeadlessSession>> = {
            let mut data = self.shared.data();
            data.status = status;
            data.sessions.retain(|session| session.strong_count() > 0);
            data.sessions.iter().filter_map(Weak::upgrade).collect()
        };
        for session in sessions {
            session.update_status(status);
        }
    }

    pub fn set_recommended_progress(&self, progress: f32) {
        self.set_session_status(SessionStatus {
            ready_for_create_progress: progress,
            recommended_for_create_progress: progress,
            ..Default::default()
        });
    }

    /// Fail the next save with `error`.
    pub fn fail_next_create(&self, error: CloudError) {
        self.shared.data().fail_next_create = Some(error);
    }

    /// Fail the next deletion of `identifier` with `error`.
    pub fn fail_delete(&self, identifier: &str, error: CloudError) {
        self.shared
            .data()
            .delete_failures
            .insert(identifier.into(), error);
    }

    /// Store an anchor as if another device had saved it.
    pub fn insert_anchor(&self, position: Point3D<f32, Native>, fingerprinted: bool) -> String {
        let mut data = self.shared.data();
        let identifier = data.next_identifier();
        data.anchors.insert(
            identifier.clone(),
            StoredAnchor {
                position,
                expiration: None,
                fingerprinted,
                visible: true,
            },
        );
        identifier
    }

    /// Remove an anchor as if another device had deleted it.
    pub fn forget_anchor(&self, identifier: &str) -> bool {
        self.shared.data().anchors.remove(identifier).is_some()
    }

    /// Make a stored anchor invisible to the device, or visible again.
    pub fn set_anchor_visible(&self, identifier: &str, visible: bool) -> bool {
        match self.shared.data().anchors.get_mut(identifier) {
            Some(anchor) => {
                anchor.visible = visible;
                true
            }
            None => false,
        }
    }

    /// Publish an identifier as if another device had shared it.
    pub fn share_identifier(&self, identifier: &str) -> Result<u64, CloudError> {
        self.shared.data().exchange.insert(identifier.into())
    }

    pub fn shared_anchor_count(&self) -> usize {
        self.shared.data().exchange.len()
    }

    pub fn stored_anchors(&self) -> Vec<String> {
        self.shared.data().anchors.keys().cloned().collect()
    }

    pub fn expiration(&self, identifier: &str) -> Option<Expiration> {
        self.shared
            .data()
            .anchors
            .get(identifier)
            .and_then(|anchor| anchor.expiration)
    }

    pub fn stats(&self) -> ServiceStats {
        self.shared.data().stats.clone()
    }

    /// Listeners still registered on live sessions.
    pub fn listener_count(&self) -> usize {
        let sessions: Vec<Arc<HeadlessSession>> = self
            .shared
            .data()
            .sessions
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        sessions.iter().map(|session| session.listeners.len()).sum()
    }

    pub fn location_providers(&self) -> Vec<Arc<HeadlessLocationProvider>> {
        self.shared.data().location_providers.clone()
    }
}

impl Drop for HeadlessCloudService {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.shared.sender.send(Request::Shutdown);
            // Dropped from one of our own completions: the worker exits on its own.
            if worker.thread().id() == thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                warn!("Headless cloud worker panicked");
            }
        }
    }
}

impl CloudSessionFactory for HeadlessCloudService {
    fn create_session(&self) -> Result<Arc<dyn CloudSession>, Error> {
        let session = Arc::new_cyclic(|this| HeadlessSession {
            this: this.clone(),
            shared: self.shared.clone(),
            listeners: ListenerSet::new(),
            data: Mutex::new(SessionData::default()),
        });
        let mut data = self.shared.data();
        data.sessions.push(Arc::downgrade(&session));
        data.stats.sessions_created += 1;
        Ok(session)
    }

    fn create_location_provider(&self) -> Result<Arc<dyn LocationProvider>, Error> {
        let provider = Arc::new(HeadlessLocationProvider::default());
        self.shared.data().location_providers.push(provider.clone());
        Ok(provider)
    }
}

impl AnchorExchange for HeadlessCloudService {
    fn send_anchor_async(&self, identifier: String, callback: Box<dyn CompletionCallback<u64>>) {
        self.shared.send(Request::Share {
            identifier,
            callback,
        });
    }

    fn retrieve_anchor_async(
        &self,
        number: AnchorNumber,
        callback: Box<dyn CompletionCallback<Option<String>>>,
    ) {
        self.shared.send(Request::Retrieve { number, callback });
    }
}

fn run_loop(receiver: Receiver<Request>, shared: Arc<Shared>) {
    while let Ok(request) = receiver.recv() {
        if !handle_request(&shared, request) {
            break;
        }
    }
    debug!("Headless cloud worker exiting");
}

fn handle_request(shared: &Arc<Shared>, request: Request) -> bool {
    match request {
        Request::Create {
            session,
            anchor,
            callback,
        } => {
            let result = session.save(anchor);
            callback.callback(result);
        }
        Request::Delete { anchor, callback } => {
            let result = delete(shared, &anchor);
            callback.callback(result);
        }
        Request::Locate {
            session,
            watcher,
            stopped,
            criteria,
        } => session.locate(watcher, &stopped, criteria),
        Request::Share {
            identifier,
            callback,
        } => {
            let result = {
                let mut data = shared.data();
                let result = data.exchange.insert(identifier);
                if result.is_ok() {
                    data.stats.anchors_shared += 1;
                }
                result
            };
            callback.callback(result);
        }
        Request::Retrieve { number, callback } => {
            let identifier = shared.data().exchange.get(number);
            debug!("Anchor number {} is {:?}", number, identifier);
            callback.callback(Ok(identifier));
        }
        Request::Shutdown => return false,
    }
    shared.queued.fetch_sub(1, Ordering::SeqCst);
    true
}

fn delete(shared: &Shared, anchor: &CloudAnchor) -> Result<(), CloudError> {
    let mut data = shared.data();
    if let Some(error) = data.delete_failures.remove(&anchor.identifier) {
        return Err(error);
    }
    match data.anchors.remove(&anchor.identifier) {
        Some(_) => {
            data.stats.anchors_deleted += 1;
            Ok(())
        }
        None => Err(CloudError::AnchorNotFound),
    }
}

#[derive(Default)]
struct SessionData {
    configuration: Option<SessionConfiguration>,
    started: bool,
    status: SessionStatus,
    provider: Option<Arc<dyn LocationProvider>>,
    /// Anchors this session already reported or saved.
    tracked: HashSet<String>,
}

pub struct HeadlessSession {
    this: Weak<HeadlessSession>,
    shared: Arc<Shared>,
    listeners: ListenerSet,
    data: Mutex<SessionData>,
}

impl HeadlessSession {
    fn data(&self) -> MutexGuard<'_, SessionData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update_status(&self, status: SessionStatus) {
        let started = {
            let mut data = self.data();
            data.status = status;
            data.started
        };
        if started {
            self.listeners.dispatch(&Event::SessionUpdated(status));
        }
    }

    fn sensors_enabled(&self) -> bool {
        let provider = self.data().provider.clone();
        provider.map_or(false, |provider| {
            let sensors = provider.sensors();
            sensors.geo_location_enabled || sensors.wifi_enabled || sensors.bluetooth_enabled
        })
    }

    fn save(&self, mut anchor: CloudAnchor) -> Result<CloudAnchor, CloudError> {
        let (started, progress) = {
            let data = self.data();
            (data.started, data.status.recommended_for_create_progress)
        };
        if !started {
            return Err(CloudError::ServiceUnavailable);
        }
        if let Some(error) = self.shared.data().fail_next_create.take() {
            return Err(error);
        }
        if progress < 1.0 {
            return Err(CloudError::NotEnoughSpatialData);
        }
        let position = self
            .shared
            .platform
            .anchor_position(anchor.local_anchor)
            .unwrap_or_else(Point3D::origin);
        let fingerprinted = self.sensors_enabled();
        let identifier = {
            let mut data = self.shared.data();
            let identifier = data.next_identifier();
            data.anchors.insert(
                identifier.clone(),
                StoredAnchor {
                    position,
                    expiration: anchor.expiration,
                    fingerprinted,
                    visible: true,
                },
            );
            data.stats.anchors_saved += 1;
            identifier
        };
        info!("Saved headless cloud anchor {}", identifier);
        self.data().tracked.insert(identifier.clone());
        anchor.identifier = identifier;
        Ok(anchor)
    }

    /// The anchors a query matches, with what is stored for them.
    fn matches(&self, criteria: &LocateCriteria) -> Vec<(String, Option<StoredMatch>)> {
        // Anchors near the device are only found through sensor fingerprints.
        let device = match *criteria {
            LocateCriteria::NearDevice { .. } if !self.sensors_enabled() => {
                debug!("No sensors enabled, nothing can be found near the device");
                return vec![];
            }
            LocateCriteria::NearDevice { .. } => self.shared.platform.camera_position(),
            _ => Point3D::origin(),
        };
        let data = self.shared.data();
        let stored = |identifier: &String| data.anchors.get(identifier).map(StoredMatch::from);
        match *criteria {
            LocateCriteria::Identifiers(ref identifiers) => identifiers
                .iter()
                .map(|identifier| (identifier.clone(), stored(identifier)))
                .collect(),
            LocateCriteria::NearAnchor {
                ref source,
                distance_in_meters,
            } => {
                let origin = match data.anchors.get(&source.identifier) {
                    Some(anchor) => anchor.position,
                    None => return vec![],
                };
                data.anchors
                    .iter()
                    .filter(|(identifier, anchor)| {
                        **identifier != source.identifier
                            && (anchor.position - origin).length() <= distance_in_meters
                    })
                    .map(|(identifier, anchor)| {
                        (identifier.clone(), Some(StoredMatch::from(anchor)))
                    })
                    .collect()
            }
            LocateCriteria::NearDevice {
                distance_in_meters,
                max_result_count,
            } => data
                .anchors
                .iter()
                .filter(|(_, anchor)| {
                    anchor.fingerprinted
                        && (anchor.position - device).length() <= distance_in_meters
                })
                .take(max_result_count as usize)
                .map(|(identifier, anchor)| (identifier.clone(), Some(StoredMatch::from(anchor))))
                .collect(),
        }
    }

    fn locate(&self, watcher: WatcherId, stopped: &AtomicBool, criteria: LocateCriteria) {
        if !self.data().started {
            self.listeners.dispatch(&Event::Error {
                code: CloudError::ServiceUnavailable.code() as i32,
                message: "session is not started".into(),
            });
        } else {
            for (identifier, found) in self.matches(&criteria) {
                if stopped.load(Ordering::SeqCst) {
                    break;
                }
                let event = self.resolve(watcher, identifier, found);
                self.listeners.dispatch(&event);
            }
        }
        let cancelled = stopped.load(Ordering::SeqCst);
        self.listeners
            .dispatch(&Event::LocateAnchorsCompleted { watcher, cancelled });
    }

    fn resolve(&self, watcher: WatcherId, identifier: String, found: Option<StoredMatch>) -> Event {
        let found = match found {
            Some(found) => found,
            None => {
                return Event::AnchorLocated {
                    watcher,
                    status: LocateAnchorStatus::NotLocatedAnchorDoesNotExist,
                    identifier,
                    anchor: None,
                }
            }
        };
        if !found.visible {
            return Event::AnchorLocated {
                watcher,
                status: LocateAnchorStatus::NotLocated,
                identifier,
                anchor: None,
            };
        }
        let newly_tracked = self.data().tracked.insert(identifier.clone());
        // Nobody would own the local anchor.
        if !newly_tracked || self.listeners.is_empty() {
            return Event::AnchorLocated {
                watcher,
                status: LocateAnchorStatus::AlreadyTracked,
                identifier,
                anchor: None,
            };
        }
        let local_anchor = self.shared.platform.adopt_anchor(pose_at(found.position));
        let anchor = CloudAnchor {
            identifier: identifier.clone(),
            local_anchor,
            expiration: found.expiration,
        };
        Event::AnchorLocated {
            watcher,
            status: LocateAnchorStatus::Located,
            identifier,
            anchor: Some(anchor),
        }
    }
}

struct StoredMatch {
    position: Point3D<f32, Native>,
    expiration: Option<Expiration>,
    visible: bool,
}

impl<'a> From<&'a StoredAnchor> for StoredMatch {
    fn from(anchor: &'a StoredAnchor) -> StoredMatch {
        StoredMatch {
            position: anchor.position,
            expiration: anchor.expiration,
            visible: anchor.visible,
        }
    }
}

impl CloudSession for HeadlessSession {
    fn configure(&self, configuration: &SessionConfiguration) {
        self.data().configuration = Some(configuration.clone());
    }

    fn set_location_provider(&self, provider: Option<Arc<dyn LocationProvider>>) {
        self.data().provider = provider;
    }

    fn subscribe(&self, callback: Arc<dyn EventCallback>) -> Subscription {
        self.listeners.subscribe(callback)
    }

    fn start(&self) -> Result<(), Error> {
        let status = {
            let mut shared = self.shared.data();
            shared.stats.sessions_started += 1;
            shared.status
        };
        {
            let mut data = self.data();
            let configured = data
                .configuration
                .as_ref()
                .map_or(false, |configuration| !configuration.account_id.is_empty());
            if !configured {
                return Err(Error::BackendSpecific("session is not configured".into()));
            }
            data.started = true;
            data.status = status;
        }
        info!("Started headless cloud session");
        self.listeners.dispatch(&Event::LogDebug("session started".into()));
        self.listeners.dispatch(&Event::SessionUpdated(status));
        Ok(())
    }

    fn stop(&self) {
        self.data().started = false;
    }

    fn create_anchor_async(
        &self,
        anchor: CloudAnchor,
        callback: Box<dyn CompletionCallback<CloudAnchor>>,
    ) {
        match self.this.upgrade() {
            Some(session) => self.shared.send(Request::Create {
                session,
                anchor,
                callback,
            }),
            None => callback.callback(Err(CloudError::ServiceUnavailable)),
        }
    }

    fn delete_anchor_async(&self, anchor: CloudAnchor, callback: Box<dyn CompletionCallback<()>>) {
        self.shared.send(Request::Delete { anchor, callback });
    }

    fn create_watcher(&self, criteria: LocateCriteria) -> Result<Box<dyn Watcher>, Error> {
        let session = self
            .this
            .upgrade()
            .ok_or_else(|| Error::BackendSpecific("session is gone".into()))?;
        let id = {
            let mut data = self.shared.data();
            let id = WatcherId(data.next_watcher);
            data.next_watcher += 1;
            data.stats.watchers_created += 1;
            id
        };
        let stopped = Arc::new(AtomicBool::new(false));
        self.shared.send(Request::Locate {
            session,
            watcher: id,
            stopped: stopped.clone(),
            criteria,
        });
        Ok(Box::new(HeadlessWatcher {
            id,
            stopped,
            shared: self.shared.clone(),
        }))
    }
}

struct HeadlessWatcher {
    id: WatcherId,
    stopped: Arc<AtomicBool>,
    shared: Arc<Shared>,
}

impl Watcher for HeadlessWatcher {
    fn identifier(&self) -> WatcherId {
        self.id
    }

    fn stop(&mut self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.shared.data().stats.watchers_stopped += 1;
        }
    }
}

/// A location provider whose sensors see whatever they are enabled for.
#[derive(Default)]
pub struct HeadlessLocationProvider {
    sensors: Mutex<SensorCapabilities>,
}

impl HeadlessLocationProvider {
    fn status(enabled: bool) -> SensorStatus {
        if enabled {
            SensorStatus::Available
        } else {
            SensorStatus::Disabled
        }
    }
}

impl LocationProvider for HeadlessLocationProvider {
    fn sensors(&self) -> SensorCapabilities {
        self.sensors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_sensors(&self, sensors: SensorCapabilities) {
        *self.sensors.lock().unwrap_or_else(PoisonError::into_inner) = sensors;
    }

    fn geo_location_status(&self) -> SensorStatus {
        HeadlessLocationProvider::status(self.sensors().geo_location_enabled)
    }

    fn wifi_status(&self) -> SensorStatus {
        HeadlessLocationProvider::status(self.sensors().wifi_enabled)
    }

    fn bluetooth_status(&self) -> SensorStatus {
        let sensors = self.sensors();
        if sensors.bluetooth_enabled && sensors.known_beacon_proximity_uuids.is_empty() {
            // No beacons to look for.
            return SensorStatus::Unavailable;
        }
        HeadlessLocationProvider::status(sensors.bluetooth_enabled)
    }
}
