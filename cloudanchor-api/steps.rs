/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! What each step does, and how the SDK completions it issues land.

use crate::controller::{ActiveSession, AsyncOp, Inner, Release, SessionEvents, Transition};
use crate::first_anchorable;
use crate::in_front_of;
use crate::pose_at;
use crate::sensors_state;
use crate::AnchorExchange;
use crate::AnchorPose;
use crate::AnchorVisual;
use crate::CloudAnchor;
use crate::CloudError;
use crate::CloudSession;
use crate::DemoMode;
use crate::Error;
use crate::Expiration;
use crate::FailurePolicy;
use crate::LocalAnchor;
use crate::LocateAnchorStatus;
use crate::LocateCriteria;
use crate::LocateQuery;
use crate::MarkerColor;
use crate::Selection;
use crate::SensorCapabilities;
use crate::StepKind;
use crate::TrackingState;
use crate::WatcherId;

use log::{debug, info, warn};

use std::sync::Arc;

fn lifetime_text(hours: i64) -> String {
    match (hours / 24, hours % 24) {
        (1, 0) => "1 day".into(),
        (days, 0) if days > 1 => format!("{} days", days),
        _ if hours == 1 => "1 hour".into(),
        _ => format!("{} hours", hours),
    }
}

impl Inner {
    pub(crate) fn run_step(
        self: &Arc<Self>,
        index: usize,
        kind: &StepKind,
        selection: Selection,
    ) -> Result<Transition, Error> {
        match *kind {
            StepKind::CreateSession => self.create_session(),
            StepKind::ConfigureSession => self.configure_session(),
            StepKind::StartSession => self.start_session(),
            StepKind::CreateLocationProvider => self.create_location_provider(),
            StepKind::ConfigureSensors => self.configure_sensors(),
            StepKind::CreateLocalAnchor => self.create_local_anchor(selection),
            StepKind::CreateCloudAnchor => self.create_cloud_anchor(),
            StepKind::SetExpiration => self.set_expiration(),
            StepKind::SaveCloudAnchor { on_failure } => self.save_cloud_anchor(index, on_failure),
            StepKind::CreateNearbyAnchors { count, on_failure } => {
                self.create_nearby_anchor(index, count, on_failure, selection)
            }
            StepKind::StopSession => self.stop_session(),
            StepKind::DestroySession => self.destroy_session(),
            StepKind::Locate(ref query) => self.locate(index, query),
            StepKind::DeleteFoundAnchors { on_failure } => {
                self.delete_found_anchors(index, on_failure)
            }
            StepKind::StopWatcher => self.stop_current_watcher(),
            StepKind::ShareAnchor => self.share_anchor(index),
            StepKind::EnterAnchorNumber => self.enter_anchor_number(index, selection),
            StepKind::Teardown => {
                self.release_session(Release::Everything);
                self.lock_state().set_message("session stopped");
                Ok(Transition::Stay)
            }
        }
    }

    // The sensor state line shown by the coarse relocation demo.
    fn sensor_suffix(&self) -> String {
        match self.location_provider() {
            Some(provider) => format!("\n{}", sensors_state(&*provider)),
            None => String::new(),
        }
    }

    fn create_session(self: &Arc<Self>) -> Result<Transition, Error> {
        // Only one session at a time.
        self.release_session(Release::Session);
        let session = self.sdk.create_session()?;
        let epoch = {
            let mut state = self.lock_state();
            state.epoch += 1;
            state.set_message("session created, not configured");
            state.epoch
        };
        *self.lock_session() = Some(ActiveSession::new(epoch, session));
        info!("Created cloud session (epoch {})", epoch);
        Ok(Transition::Next)
    }

    fn configure_session(self: &Arc<Self>) -> Result<Transition, Error> {
        let (session, epoch) = self.session()?;
        session.configure(&self.config.session_configuration());
        let subscription = session.subscribe(Arc::new(SessionEvents {
            inner: Arc::downgrade(self),
            epoch,
        }));
        let replaced =
            self.with_session(epoch, |active| active.subscription.replace(subscription))?;
        drop(replaced);
        self.lock_state().set_message("session configured, not started");
        Ok(Transition::Next)
    }

    fn start_session(&self) -> Result<Transition, Error> {
        let (session, epoch) = self.session()?;
        session.start()?;
        self.with_session(epoch, |active| active.started = true)?;
        let suffix = self.sensor_suffix();
        self.lock_state()
            .set_message(format!("session started{}", suffix));
        info!("Started cloud session (epoch {})", epoch);
        Ok(Transition::Next)
    }

    fn create_location_provider(&self) -> Result<Transition, Error> {
        let (session, epoch) = self.session()?;
        let provider = self.sdk.create_location_provider()?;
        provider.set_sensors(SensorCapabilities {
            known_beacon_proximity_uuids: self.config.known_beacon_proximity_uuids.clone(),
            ..Default::default()
        });
        session.set_location_provider(Some(provider.clone()));
        self.with_session(epoch, |active| active.location_provider = Some(provider))?;
        let suffix = self.sensor_suffix();
        self.lock_state()
            .set_message(format!("location provider created{}", suffix));
        Ok(Transition::Next)
    }

    fn configure_sensors(&self) -> Result<Transition, Error> {
        if self.location_provider().is_none() {
            return Err(Error::NoLocationProvider);
        }
        self.apply_sensor_permissions();
        let suffix = self.sensor_suffix();
        self.lock_state()
            .set_message(format!("sensors configured{}", suffix));
        Ok(Transition::Next)
    }

    fn camera_placement(&self) -> Option<AnchorPose> {
        let camera = self.platform.camera_pose()?;
        in_front_of(&camera, self.config.placement_distance).map(pose_at)
    }

    /// Create a platform anchor where the user pointed.
    fn place_anchor(&self, selection: Selection) -> Result<LocalAnchor, Error> {
        if self.platform.camera_tracking_state() != TrackingState::Tracking {
            return Err(Error::NotTracking);
        }
        let pose = match selection {
            Selection::Screen(point) => first_anchorable(self.platform.hit_test(point))
                .or_else(|| self.camera_placement()),
            Selection::Gaze(ray) => Some(pose_at(ray.point_at(self.config.placement_distance))),
            Selection::Advance | Selection::AnchorNumber(_) => self.camera_placement(),
        };
        let pose = pose.ok_or(Error::NotTracking)?;
        let anchor = LocalAnchor::new(self.platform.create_anchor(pose)?, self.platform.clone());
        if self.platform.anchor_tracking_state(anchor.handle()) != TrackingState::Tracking {
            return Err(Error::AnchorCreationRefused);
        }
        debug!("Placed {:?}", anchor);
        Ok(anchor)
    }

    fn create_local_anchor(&self, selection: Selection) -> Result<Transition, Error> {
        self.session()?;
        let anchor = self.place_anchor(selection)?;
        let suffix = self.sensor_suffix();
        let replaced = {
            let mut state = self.lock_state();
            state.set_message(format!("local anchor created{}", suffix));
            state.visuals.upsert(AnchorVisual::pending(anchor))
        };
        drop(replaced);
        Ok(Transition::Next)
    }

    fn create_cloud_anchor(&self) -> Result<Transition, Error> {
        let suffix = self.sensor_suffix();
        let mut state = self.lock_state();
        let visual = state.visuals.pending_mut().ok_or(Error::NoPendingAnchor)?;
        visual.cloud_anchor = Some(CloudAnchor::new(visual.local_anchor.handle()));
        state.set_message(format!("cloud anchor created, not saved{}", suffix));
        Ok(Transition::Next)
    }

    fn set_expiration(&self) -> Result<Transition, Error> {
        let hours = self.config.anchor_lifetime_hours;
        let mut state = self.lock_state();
        let anchor = state
            .visuals
            .pending_mut()
            .and_then(|visual| visual.cloud_anchor.as_mut())
            .ok_or(Error::NoPendingAnchor)?;
        anchor.expiration = Some(Expiration::hours_from_now(hours));
        state.set_message(format!(
            "cloud anchor expiration set to {} from now, not saved",
            lifetime_text(hours)
        ));
        Ok(Transition::Next)
    }

    fn ensure_enough_data(&self) -> Result<(), Error> {
        let progress = self.lock_state().session_status.recommended_for_create_progress;
        if progress < 1.0 {
            return Err(Error::NotEnoughData(progress));
        }
        Ok(())
    }

    fn save_cloud_anchor(
        self: &Arc<Self>,
        step: usize,
        on_failure: FailurePolicy,
    ) -> Result<Transition, Error> {
        let (session, epoch) = self.session()?;
        self.ensure_enough_data()?;
        let anchor = {
            let mut state = self.lock_state();
            let anchor = state
                .visuals
                .pending()
                .and_then(|visual| visual.cloud_anchor.clone())
                .ok_or(Error::NoPendingAnchor)?;
            state.async_op = Some(AsyncOp::Save {
                step,
                on_failure,
                batch: None,
            });
            state.set_message("cloud anchor being saved...");
            anchor
        };
        self.save(&*session, epoch, anchor);
        Ok(Transition::Pending)
    }

    fn create_nearby_anchor(
        self: &Arc<Self>,
        step: usize,
        count: u32,
        on_failure: FailurePolicy,
        selection: Selection,
    ) -> Result<Transition, Error> {
        let (session, epoch) = self.session()?;
        self.ensure_enough_data()?;
        let local_anchor = self.place_anchor(selection)?;
        let mut anchor = CloudAnchor::new(local_anchor.handle());
        anchor.expiration = Some(Expiration::hours_from_now(self.config.anchor_lifetime_hours));
        let replaced = {
            let mut state = self.lock_state();
            let mut visual = AnchorVisual::pending(local_anchor);
            visual.cloud_anchor = Some(anchor.clone());
            state.async_op = Some(AsyncOp::Save {
                step,
                on_failure,
                batch: Some(count),
            });
            let message = format!("saving anchor {} of {}...", state.saved_in_step + 1, count);
            state.set_message(message);
            state.visuals.upsert(visual)
        };
        drop(replaced);
        self.save(&*session, epoch, anchor);
        Ok(Transition::Pending)
    }

    fn save(self: &Arc<Self>, session: &dyn CloudSession, epoch: u64, anchor: CloudAnchor) {
        let inner = Arc::downgrade(self);
        session.create_anchor_async(
            anchor,
            Box::new(move |result: Result<CloudAnchor, CloudError>| {
                if let Some(inner) = inner.upgrade() {
                    inner.on_anchor_saved(epoch, result);
                }
            }),
        );
    }

    fn on_anchor_saved(&self, epoch: u64, result: Result<CloudAnchor, CloudError>) {
        let mut state = self.lock_state();
        if state.epoch != epoch {
            debug!("Ignoring save completion for a released session");
            return;
        }
        let (step, on_failure, batch) = match state.async_op {
            Some(AsyncOp::Save {
                step,
                on_failure,
                batch,
            }) => (step, on_failure, batch),
            _ => {
                warn!("Save completion with no save in flight");
                return;
            }
        };
        state.async_op = None;
        let mut replaced = None;
        match result {
            Ok(saved) => {
                let identifier = saved.identifier.clone();
                info!("Saved cloud anchor {}", identifier);
                match state.visuals.rekey_pending(saved, MarkerColor::Saved) {
                    Ok(visual) => replaced = visual,
                    Err(_) => warn!("Saved anchor {} has no pending visual", identifier),
                }
                state.targets.push(identifier.clone());
                state.saved_in_step += 1;
                let next = match batch {
                    Some(count) if state.saved_in_step < count => {
                        let message = format!(
                            "cloud anchor saved with ID {} ({} of {})",
                            identifier, state.saved_in_step, count
                        );
                        state.set_message(message);
                        step
                    }
                    _ => {
                        state.saved_in_step = 0;
                        state.set_message(format!("cloud anchor saved with ID {}", identifier));
                        state.next_step(step)
                    }
                };
                state.move_to(next);
            }
            Err(err) => {
                warn!("Saving cloud anchor failed: {}", err);
                if let Some(visual) = state.visuals.pending_mut() {
                    visual.color = MarkerColor::Failed;
                }
                state.set_message(format!("save failed: {} - {}", err.code(), err));
                let next = state.after_failure(step, on_failure);
                state.move_to(next);
            }
        }
        drop(state);
        drop(replaced);
    }

    fn stop_session(&self) -> Result<Transition, Error> {
        let (session, epoch) = self.session()?;
        session.stop();
        self.with_session(epoch, |active| active.started = false)?;
        self.lock_state().set_message("session stopped");
        Ok(Transition::Next)
    }

    fn destroy_session(&self) -> Result<Transition, Error> {
        self.release_session(Release::Session);
        let mut state = self.lock_state();
        if state.targets.is_empty() {
            // Nothing to look for: start over.
            state.set_message("session released, nothing was saved");
            return Ok(Transition::GoTo(0));
        }
        state.set_message("session released, anchors cleared");
        Ok(Transition::Next)
    }

    fn locate(self: &Arc<Self>, step: usize, query: &LocateQuery) -> Result<Transition, Error> {
        let (session, epoch) = self.session()?;
        let (criteria, op) = {
            let mut state = self.lock_state();
            let (criteria, op) = match *query {
                LocateQuery::SavedIdentifiers
                | LocateQuery::LastSaved
                | LocateQuery::SharedAnchor => {
                    let targets: Vec<String> = match *query {
                        LocateQuery::LastSaved => {
                            state.targets.last().cloned().into_iter().collect()
                        }
                        LocateQuery::SharedAnchor => state.retrieved.clone().into_iter().collect(),
                        _ => state.targets.clone(),
                    };
                    if targets.is_empty() {
                        return Err(Error::NoLocateTarget);
                    }
                    state.found_anchor = None;
                    let op = AsyncOp::Locate {
                        step,
                        targets: targets.clone(),
                        advance_on_complete: false,
                    };
                    (LocateCriteria::Identifiers(targets), Some(op))
                }
                LocateQuery::NearFoundAnchor { distance_in_meters } => {
                    let source = state.found_anchor.clone().ok_or(Error::NoSourceAnchor)?;
                    let op = AsyncOp::Locate {
                        step,
                        targets: vec![],
                        advance_on_complete: true,
                    };
                    let criteria = LocateCriteria::NearAnchor {
                        source,
                        distance_in_meters,
                    };
                    (criteria, Some(op))
                }
                LocateQuery::NearDevice {
                    distance_in_meters,
                    max_result_count,
                } => {
                    state.anchors_found = 0;
                    let criteria = LocateCriteria::NearDevice {
                        distance_in_meters,
                        max_result_count,
                    };
                    (criteria, None)
                }
            };
            state.async_op = op.clone();
            state.set_message("locating...");
            (criteria, op)
        };
        debug!("Locating anchors with {:?}", criteria);
        if let Err(err) = self.replace_watcher(&*session, epoch, criteria) {
            let mut state = self.lock_state();
            if state.epoch == epoch && op.is_some() {
                state.async_op = None;
            }
            return Err(err);
        }
        Ok(if op.is_some() {
            Transition::Pending
        } else {
            Transition::Next
        })
    }

    /// Start a watcher, stopping the previous one first.
    fn replace_watcher(
        &self,
        session: &dyn CloudSession,
        epoch: u64,
        criteria: LocateCriteria,
    ) -> Result<(), Error> {
        self.stop_watcher(epoch);
        let watcher = session.create_watcher(criteria)?;
        let id = watcher.identifier();
        let orphan = match self.lock_session().as_mut() {
            Some(active) if active.epoch == epoch => active.watcher.replace(watcher),
            _ => Some(watcher),
        };
        if let Some(mut orphan) = orphan {
            warn!("Stopping watcher {:?}, it has no session", orphan.identifier());
            orphan.stop();
        }
        debug!("Started watcher {:?}", id);
        Ok(())
    }

    fn stop_current_watcher(&self) -> Result<Transition, Error> {
        let (_, epoch) = self.session()?;
        let message = if self.stop_watcher(epoch) {
            "watcher stopped"
        } else {
            "no watcher to stop"
        };
        self.lock_state().set_message(message);
        Ok(Transition::Next)
    }

    pub(crate) fn on_anchor_located(
        &self,
        epoch: u64,
        watcher: WatcherId,
        status: LocateAnchorStatus,
        identifier: &str,
        anchor: Option<&CloudAnchor>,
    ) {
        let mut state = self.lock_state();
        if !state.accepts(epoch, Some(watcher)) {
            drop(state);
            debug!("Ignoring located event from stale watcher {:?}", watcher);
            // The located anchor is ours to release all the same.
            if let (LocateAnchorStatus::Located, Some(anchor)) = (status, anchor) {
                drop(LocalAnchor::new(anchor.local_anchor, self.platform.clone()));
            }
            return;
        }
        let mut replaced = None;
        match status {
            LocateAnchorStatus::Located => {
                let anchor = match anchor {
                    Some(anchor) => anchor.clone(),
                    None => {
                        warn!("Anchor {} located without a cloud anchor", identifier);
                        return;
                    }
                };
                info!("Located cloud anchor {}", identifier);
                let local_anchor = anchor.local_anchor;
                match state
                    .visuals
                    .get_mut(identifier)
                    .filter(|visual| visual.local_anchor.handle() == local_anchor)
                {
                    Some(visual) => {
                        visual.color = MarkerColor::Found;
                        visual.cloud_anchor = Some(anchor.clone());
                    }
                    None => {
                        let local = LocalAnchor::new(local_anchor, self.platform.clone());
                        let visual = AnchorVisual::found(local, anchor.clone());
                        replaced = state.visuals.upsert(visual);
                    }
                }
                state.anchors_found += 1;
                state.set_message(format!("anchor located: {}", identifier));
                if state.mode == Some(DemoMode::CoarseRelocation) {
                    let found = format!("{} anchor(s) found", state.anchors_found);
                    state.set_status(found);
                }
                let targeted = match state.async_op {
                    Some(AsyncOp::Locate {
                        step,
                        ref targets,
                        advance_on_complete: false,
                    }) if targets.iter().any(|target| target == identifier) => Some(step),
                    _ => None,
                };
                if let Some(step) = targeted {
                    state.found_anchor = Some(anchor);
                    state.async_op = None;
                    let next = state.next_step(step);
                    state.move_to(next);
                }
            }
            LocateAnchorStatus::AlreadyTracked => {
                state.set_message(format!("anchor already tracked: {}", identifier));
            }
            LocateAnchorStatus::NotLocated => {
                state.set_message(format!("not located: {}", identifier));
            }
            LocateAnchorStatus::NotLocatedAnchorDoesNotExist => {
                warn!("Cloud anchor {} does not exist", identifier);
                state.set_message(format!("not located: anchor {} does not exist", identifier));
            }
        }
        drop(state);
        drop(replaced);
    }

    pub(crate) fn on_locate_completed(&self, epoch: u64, watcher: WatcherId, cancelled: bool) {
        let mut state = self.lock_state();
        if !state.accepts(epoch, Some(watcher)) {
            return;
        }
        debug!("Watcher {:?} completed (cancelled: {})", watcher, cancelled);
        match state.async_op {
            Some(AsyncOp::Locate {
                step,
                advance_on_complete,
                ..
            }) => {
                state.async_op = None;
                if advance_on_complete {
                    state.set_message("nearby anchors located");
                    let next = state.next_step(step);
                    state.move_to(next);
                } else {
                    // The target never showed up: let the user query again.
                    let message = format!("{}\nlocate completed", state.ui.message);
                    state.set_message(message);
                    state.move_to(step);
                }
            }
            _ => {
                if state.mode == Some(DemoMode::CoarseRelocation) {
                    let found = format!(
                        "{} anchor(s) found, locate completed",
                        state.anchors_found
                    );
                    state.set_status(found);
                }
            }
        }
    }

    fn delete_found_anchors(
        self: &Arc<Self>,
        step: usize,
        on_failure: FailurePolicy,
    ) -> Result<Transition, Error> {
        let (session, epoch) = self.session()?;
        let anchors = {
            let mut state = self.lock_state();
            let anchors = state.visuals.cloud_anchors();
            if anchors.is_empty() {
                return Err(Error::NothingToDelete);
            }
            state.async_op = Some(AsyncOp::Delete {
                step,
                outstanding: anchors.len(),
                failed: 0,
                on_failure,
            });
            state.set_message(format!("deleting {} anchor(s)...", anchors.len()));
            anchors
        };
        for anchor in anchors {
            let identifier = anchor.identifier.clone();
            let inner = Arc::downgrade(self);
            session.delete_anchor_async(
                anchor,
                Box::new(move |result: Result<(), CloudError>| {
                    if let Some(inner) = inner.upgrade() {
                        inner.on_anchor_deleted(epoch, &identifier, result);
                    }
                }),
            );
        }
        Ok(Transition::Pending)
    }

    fn on_anchor_deleted(&self, epoch: u64, identifier: &str, result: Result<(), CloudError>) {
        let mut state = self.lock_state();
        if state.epoch != epoch {
            debug!("Ignoring delete completion for a released session");
            return;
        }
        let (step, on_failure, outstanding, failed) = match state.async_op {
            Some(AsyncOp::Delete {
                step,
                ref mut outstanding,
                ref mut failed,
                on_failure,
            }) => {
                *outstanding = outstanding.saturating_sub(1);
                if result.is_err() {
                    *failed += 1;
                }
                (step, on_failure, *outstanding, *failed)
            }
            _ => {
                warn!("Delete completion for {} with no delete in flight", identifier);
                return;
            }
        };
        let mut removed = None;
        match result {
            Ok(()) => {
                info!("Deleted cloud anchor {}", identifier);
                removed = state.visuals.remove(identifier);
            }
            Err(err) => {
                warn!("Deleting cloud anchor {} failed: {}", identifier, err);
                if let Some(visual) = state.visuals.get_mut(identifier) {
                    visual.color = MarkerColor::Failed;
                }
                state.set_message(format!("delete failed: {} - {}", err.code(), err));
            }
        }
        let finished = outstanding == 0;
        if finished {
            state.async_op = None;
            let next = if failed == 0 {
                state.set_message("anchors deleted");
                state.next_step(step)
            } else {
                let message = format!("{} of the anchors could not be deleted", failed);
                state.set_message(message);
                state.after_failure(step, on_failure)
            };
            state.move_to(next);
        }
        drop(state);
        drop(removed);
        if finished {
            self.stop_watcher(epoch);
        }
    }

    fn anchor_exchange(&self) -> Result<Arc<dyn AnchorExchange>, Error> {
        self.exchange.clone().ok_or(Error::NoAnchorExchange)
    }

    fn share_anchor(self: &Arc<Self>, step: usize) -> Result<Transition, Error> {
        let exchange = self.anchor_exchange()?;
        let (identifier, epoch) = {
            let mut state = self.lock_state();
            let identifier = state.targets.last().cloned().ok_or(Error::NothingToShare)?;
            state.async_op = Some(AsyncOp::Share { step });
            state.set_message("sharing anchor...");
            (identifier, state.epoch)
        };
        debug!("Sharing cloud anchor {}", identifier);
        let inner = Arc::downgrade(self);
        exchange.send_anchor_async(
            identifier,
            Box::new(move |result: Result<u64, CloudError>| {
                if let Some(inner) = inner.upgrade() {
                    inner.on_anchor_shared(epoch, result);
                }
            }),
        );
        Ok(Transition::Pending)
    }

    fn on_anchor_shared(&self, epoch: u64, result: Result<u64, CloudError>) {
        let mut state = self.lock_state();
        if state.epoch != epoch {
            debug!("Ignoring share completion for a released session");
            return;
        }
        let step = match state.async_op {
            Some(AsyncOp::Share { step }) => step,
            _ => {
                warn!("Share completion with no share in flight");
                return;
            }
        };
        state.async_op = None;
        match result {
            Ok(number) => {
                info!("Shared cloud anchor as number {}", number);
                state.shared_number = Some(number);
                state.set_message(format!("anchor number: {}", number));
                let next = state.next_step(step);
                state.move_to(next);
            }
            Err(err) => {
                warn!("Sharing cloud anchor failed: {}", err);
                state.set_message(format!("sharing failed: {} - {}", err.code(), err));
                state.move_to(step);
            }
        }
    }

    fn enter_anchor_number(
        self: &Arc<Self>,
        step: usize,
        selection: Selection,
    ) -> Result<Transition, Error> {
        let exchange = self.anchor_exchange()?;
        let number = match selection {
            Selection::AnchorNumber(number) => number,
            _ => return Err(Error::AnchorNumberRequired),
        };
        let epoch = {
            let mut state = self.lock_state();
            state.retrieved = None;
            state.async_op = Some(AsyncOp::Retrieve { step, number });
            state.set_message(format!("looking up anchor number {}...", number));
            state.epoch
        };
        let inner = Arc::downgrade(self);
        exchange.retrieve_anchor_async(
            number,
            Box::new(move |result: Result<Option<String>, CloudError>| {
                if let Some(inner) = inner.upgrade() {
                    inner.on_anchor_retrieved(epoch, result);
                }
            }),
        );
        Ok(Transition::Pending)
    }

    fn on_anchor_retrieved(&self, epoch: u64, result: Result<Option<String>, CloudError>) {
        let mut state = self.lock_state();
        if state.epoch != epoch {
            debug!("Ignoring anchor number lookup for a released session");
            return;
        }
        let (step, number) = match state.async_op {
            Some(AsyncOp::Retrieve { step, number }) => (step, number),
            _ => {
                warn!("Anchor number lookup with no lookup in flight");
                return;
            }
        };
        state.async_op = None;
        match result {
            Ok(Some(identifier)) => {
                info!("Anchor number {} is {}", number, identifier);
                state.set_message(format!("anchor number {} is {}", number, identifier));
                state.retrieved = Some(identifier);
                let next = state.next_step(step);
                state.move_to(next);
            }
            Ok(None) => {
                state.set_message(format!("anchor number {} was not found", number));
                state.move_to(step);
            }
            Err(err) => {
                warn!("Looking up anchor number {} failed: {}", number, err);
                state.set_message(format!("anchor lookup failed: {} - {}", err.code(), err));
                state.move_to(step);
            }
        }
    }
}
