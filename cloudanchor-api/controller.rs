/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The demo controller: walks the user through a `Workflow`, one step per input.
//!
//! SDK completions and session events arrive on threads we do not control.
//! Everything they touch lives in `DemoState`, behind a single mutex; the
//! session and watcher handles live in a second slot. The two locks are never
//! held together, and neither is held across a call into the SDK or the
//! platform. Each callback carries the epoch of the session it was issued
//! for, and is dropped on the floor once that session has been released.

use crate::AnchorExchange;
use crate::AnchorNumber;
use crate::AnchorVisual;
use crate::AnchorVisualRegistry;
use crate::ArPlatform;
use crate::CloudAnchor;
use crate::CloudSession;
use crate::CloudSessionFactory;
use crate::DemoConfig;
use crate::DemoMode;
use crate::Error;
use crate::Event;
use crate::EventCallback;
use crate::FailurePolicy;
use crate::LocationProvider;
use crate::MarkerColor;
use crate::MarkerRenderer;
use crate::Selection;
use crate::SensorPermissions;
use crate::SessionStatus;
use crate::StepKind;
use crate::Subscription;
use crate::TrackingState;
use crate::Watcher;
use crate::WatcherId;
use crate::Workflow;

use log::{debug, error, warn};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// What the UI shell displays.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UiState {
    /// The outcome of the last step.
    pub message: String,
    /// What the next input will do.
    pub prompt: String,
    /// Session progress, sensor state, or why the last input was refused.
    pub status: String,
    /// The last SDK log or error line.
    pub log: String,
    pub show_advance_button: bool,
    pub account_configured: bool,
}

impl UiState {
    pub fn button_text(&self) -> String {
        if self.message.is_empty() {
            self.prompt.clone()
        } else if self.prompt.is_empty() {
            self.message.clone()
        } else {
            format!("{}\n{}", self.message, self.prompt)
        }
    }
}

/// The asynchronous operation the demo is waiting on.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum AsyncOp {
    Save {
        step: usize,
        on_failure: FailurePolicy,
        /// For nearby anchors, how many saves the step needs.
        batch: Option<u32>,
    },
    Locate {
        step: usize,
        /// Finding one of these moves the demo on.
        targets: Vec<String>,
        /// Move on when the watcher completes, found or not.
        advance_on_complete: bool,
    },
    Delete {
        step: usize,
        outstanding: usize,
        failed: usize,
        on_failure: FailurePolicy,
    },
    Share {
        step: usize,
    },
    Retrieve {
        step: usize,
        number: AnchorNumber,
    },
}

pub(crate) struct DemoState {
    pub(crate) workflow: Workflow,
    pub(crate) mode: Option<DemoMode>,
    pub(crate) step: usize,
    /// Bumped whenever a session is created or released.
    pub(crate) epoch: u64,
    pub(crate) async_op: Option<AsyncOp>,
    pub(crate) visuals: AnchorVisualRegistry,
    pub(crate) session_status: SessionStatus,
    /// Identifiers saved during this run, oldest first.
    pub(crate) targets: Vec<String>,
    /// The targeted anchor found by the last identifier query.
    pub(crate) found_anchor: Option<CloudAnchor>,
    pub(crate) saved_in_step: u32,
    pub(crate) anchors_found: u32,
    /// The number the last saved anchor was shared under.
    pub(crate) shared_number: Option<u64>,
    /// The identifier looked up by anchor number.
    pub(crate) retrieved: Option<String>,
    /// Events from watchers below this id come from stopped watchers.
    pub(crate) lowest_live_watcher: u64,
    pub(crate) permissions: SensorPermissions,
    pub(crate) ui: UiState,
}

impl DemoState {
    pub(crate) fn set_message<S: Into<String>>(&mut self, message: S) {
        self.ui.message = message.into();
    }

    pub(crate) fn set_status<S: Into<String>>(&mut self, status: S) {
        self.ui.status = status.into();
    }

    pub(crate) fn move_to(&mut self, step: usize) {
        self.step = step;
        self.ui.prompt = self.workflow.prompt(step).into();
    }

    pub(crate) fn next_step(&self, step: usize) -> usize {
        self.workflow.next(step)
    }

    pub(crate) fn after_failure(&self, step: usize, policy: FailurePolicy) -> usize {
        match policy {
            FailurePolicy::Retry => step,
            FailurePolicy::Proceed => self.workflow.next(step),
            FailurePolicy::GoTo(index) if index < self.workflow.len() => index,
            FailurePolicy::GoTo(index) => {
                warn!("Failure step {} is out of range, retrying instead", index);
                step
            }
        }
    }

    /// Whether an event from `watcher` of the session at `epoch` is still current.
    pub(crate) fn accepts(&self, epoch: u64, watcher: Option<WatcherId>) -> bool {
        self.epoch == epoch
            && watcher.map_or(true, |watcher| watcher.0 >= self.lowest_live_watcher)
    }
}

/// The session and the handles hanging off it, replaced wholesale.
pub(crate) struct ActiveSession {
    pub(crate) epoch: u64,
    pub(crate) session: Arc<dyn CloudSession>,
    pub(crate) subscription: Option<Subscription>,
    pub(crate) location_provider: Option<Arc<dyn LocationProvider>>,
    pub(crate) watcher: Option<Box<dyn Watcher>>,
    pub(crate) started: bool,
}

impl ActiveSession {
    pub(crate) fn new(epoch: u64, session: Arc<dyn CloudSession>) -> ActiveSession {
        ActiveSession {
            epoch,
            session,
            subscription: None,
            location_provider: None,
            watcher: None,
            started: false,
        }
    }

    fn close(mut self) {
        self.subscription.take();
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
        if self.started {
            self.session.stop();
        }
        if self.location_provider.take().is_some() {
            self.session.set_location_provider(None);
        }
        debug!("Released cloud session (epoch {})", self.epoch);
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Release {
    /// Keep the saved identifiers and the current step, to query them later.
    Session,
    /// Forget the whole run and go back to the first step.
    Everything,
}

pub(crate) struct Inner {
    pub(crate) config: DemoConfig,
    pub(crate) platform: Arc<dyn ArPlatform>,
    pub(crate) sdk: Arc<dyn CloudSessionFactory>,
    pub(crate) exchange: Option<Arc<dyn AnchorExchange>>,
    pub(crate) state: Mutex<DemoState>,
    pub(crate) session: Mutex<Option<ActiveSession>>,
    // Inputs are handled one at a time.
    input: Mutex<()>,
}

impl Inner {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, DemoState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lock_session(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The live session and its epoch.
    pub(crate) fn session(&self) -> Result<(Arc<dyn CloudSession>, u64), Error> {
        self.lock_session()
            .as_ref()
            .map(|active| (active.session.clone(), active.epoch))
            .ok_or(Error::NoSession)
    }

    /// Update the live session's bookkeeping. `f` must not call into the SDK.
    pub(crate) fn with_session<R, F>(&self, epoch: u64, f: F) -> Result<R, Error>
    where
        F: FnOnce(&mut ActiveSession) -> R,
    {
        match self.lock_session().as_mut() {
            Some(active) if active.epoch == epoch => Ok(f(active)),
            _ => Err(Error::NoSession),
        }
    }

    pub(crate) fn location_provider(&self) -> Option<Arc<dyn LocationProvider>> {
        self.lock_session()
            .as_ref()
            .and_then(|active| active.location_provider.clone())
    }

    pub(crate) fn apply_sensor_permissions(&self) {
        let permissions = self.lock_state().permissions;
        if let Some(provider) = self.location_provider() {
            provider.set_sensors(permissions.apply(provider.sensors()));
        }
    }

    /// Stop the session's watcher, if it has one.
    pub(crate) fn stop_watcher(&self, epoch: u64) -> bool {
        let watcher = match self.lock_session().as_mut() {
            Some(active) if active.epoch == epoch => active.watcher.take(),
            _ => None,
        };
        let mut watcher = match watcher {
            Some(watcher) => watcher,
            None => return false,
        };
        let id = watcher.identifier();
        {
            let mut state = self.lock_state();
            if state.epoch == epoch {
                state.lowest_live_watcher = state.lowest_live_watcher.max(id.0 + 1);
            }
        }
        watcher.stop();
        debug!("Stopped watcher {:?}", id);
        true
    }

    /// Tear the session down: listeners, watcher, the session itself, then
    /// the anchors it was showing.
    pub(crate) fn release_session(&self, release: Release) {
        let active = self.lock_session().take();
        let visuals = {
            let mut state = self.lock_state();
            state.epoch += 1;
            state.async_op = None;
            state.found_anchor = None;
            state.saved_in_step = 0;
            state.anchors_found = 0;
            state.lowest_live_watcher = 0;
            state.session_status = SessionStatus::default();
            if release == Release::Everything {
                state.targets.clear();
                state.shared_number = None;
                state.retrieved = None;
                state.move_to(0);
                state.ui.show_advance_button = false;
                state.ui.status.clear();
            }
            state.visuals.drain()
        };
        if let Some(active) = active {
            active.close();
        }
        drop(visuals);
    }

    pub(crate) fn on_event(self: &Arc<Self>, epoch: u64, event: &Event) {
        match *event {
            Event::SessionUpdated(status) => {
                let mut state = self.lock_state();
                if !state.accepts(epoch, None) {
                    return;
                }
                state.session_status = status;
                let saving = matches!(
                    state.workflow.get(state.step),
                    Some(StepKind::SaveCloudAnchor { .. })
                        | Some(StepKind::CreateNearbyAnchors { .. })
                );
                if saving {
                    state.set_status(status.to_string());
                }
            }
            Event::Error { code, ref message } => {
                error!("Cloud session error {}: {}", code, message);
                let mut state = self.lock_state();
                if state.accepts(epoch, None) {
                    state.ui.log = format!("error {}: {}", code, message);
                }
            }
            Event::LogDebug(ref message) => {
                debug!("{}", message);
                let mut state = self.lock_state();
                if state.accepts(epoch, None) {
                    state.ui.log = message.clone();
                }
            }
            Event::AnchorLocated {
                watcher,
                status,
                ref identifier,
                ref anchor,
            } => self.on_anchor_located(epoch, watcher, status, identifier, anchor.as_ref()),
            Event::LocateAnchorsCompleted { watcher, cancelled } => {
                self.on_locate_completed(epoch, watcher, cancelled)
            }
        }
    }
}

/// Forwards session events to the controller, as long as it is alive.
pub(crate) struct SessionEvents {
    pub(crate) inner: Weak<Inner>,
    pub(crate) epoch: u64,
}

impl EventCallback for SessionEvents {
    fn callback(&self, event: &Event) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_event(self.epoch, event);
        }
    }
}

/// The transition a step handler asks for.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Transition {
    Next,
    Stay,
    GoTo(usize),
    /// An SDK completion will decide.
    Pending,
}

const ACCOUNT_NOT_SET: &str =
    "Set the spatial anchors account id and key in the demo configuration";

fn refusal_text(err: &Error) -> String {
    match *err {
        Error::AccountNotConfigured => ACCOUNT_NOT_SET.into(),
        Error::NotTracking => "unable to create local anchor, camera is not tracking".into(),
        Error::AnchorCreationRefused => "unable to create local anchor".into(),
        Error::NotEnoughData(progress) => format!(
            "cannot save yet, not enough data ({}), look around and try again",
            crate::format_percent(progress)
        ),
        Error::NoSourceAnchor => "still looking for the first anchor".into(),
        Error::NothingToDelete => "cannot delete, no anchor was found yet".into(),
        Error::AnchorNumberRequired => "enter an anchor number first".into(),
        ref other => other.to_string(),
    }
}

/// Drives the demo. This is the application context handed to the UI shell;
/// dropping it tears the session down.
pub struct DemoController {
    inner: Arc<Inner>,
}

impl DemoController {
    /// A controller running the basic demo. Use `select_mode` to pick another.
    pub fn new(
        config: DemoConfig,
        platform: Arc<dyn ArPlatform>,
        sdk: Arc<dyn CloudSessionFactory>,
    ) -> DemoController {
        let workflow = Workflow::for_mode(DemoMode::Basic, &config);
        let controller = DemoController::build(config, workflow, platform, sdk, None);
        controller.inner.lock_state().mode = Some(DemoMode::Basic);
        controller
    }

    /// Like `new`, with a service for sharing anchors between devices, which
    /// the shared demo needs.
    pub fn with_anchor_exchange(
        config: DemoConfig,
        platform: Arc<dyn ArPlatform>,
        sdk: Arc<dyn CloudSessionFactory>,
        exchange: Arc<dyn AnchorExchange>,
    ) -> DemoController {
        let workflow = Workflow::for_mode(DemoMode::Basic, &config);
        let controller = DemoController::build(config, workflow, platform, sdk, Some(exchange));
        controller.inner.lock_state().mode = Some(DemoMode::Basic);
        controller
    }

    pub fn with_workflow(
        config: DemoConfig,
        workflow: Workflow,
        platform: Arc<dyn ArPlatform>,
        sdk: Arc<dyn CloudSessionFactory>,
    ) -> DemoController {
        DemoController::build(config, workflow, platform, sdk, None)
    }

    fn build(
        config: DemoConfig,
        workflow: Workflow,
        platform: Arc<dyn ArPlatform>,
        sdk: Arc<dyn CloudSessionFactory>,
        exchange: Option<Arc<dyn AnchorExchange>>,
    ) -> DemoController {
        let mut ui = UiState {
            prompt: workflow.prompt(0).into(),
            account_configured: config.account.is_configured(),
            ..Default::default()
        };
        if !ui.account_configured {
            ui.status = ACCOUNT_NOT_SET.into();
        }
        let state = DemoState {
            workflow,
            mode: None,
            step: 0,
            epoch: 0,
            async_op: None,
            visuals: AnchorVisualRegistry::new(),
            session_status: SessionStatus::default(),
            targets: vec![],
            found_anchor: None,
            saved_in_step: 0,
            anchors_found: 0,
            shared_number: None,
            retrieved: None,
            lowest_live_watcher: 0,
            permissions: SensorPermissions::default(),
            ui,
        };
        DemoController {
            inner: Arc::new(Inner {
                config,
                platform,
                sdk,
                exchange,
                state: Mutex::new(state),
                session: Mutex::new(None),
                input: Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &DemoConfig {
        &self.inner.config
    }

    pub fn is_account_configured(&self) -> bool {
        self.inner.config.account.is_configured()
    }

    /// Switch demo variant. Only allowed between runs.
    pub fn select_mode(&self, mode: DemoMode) -> Result<(), Error> {
        let _input = self.inner.input.lock().unwrap_or_else(PoisonError::into_inner);
        if mode == DemoMode::Shared && self.inner.exchange.is_none() {
            return Err(Error::NoAnchorExchange);
        }
        // A failure can send the run back to the first step with the session still up.
        let live = self.inner.lock_session().is_some();
        let mut state = self.inner.lock_state();
        if live || state.step != 0 || state.async_op.is_some() {
            return Err(Error::DemoInProgress);
        }
        state.workflow = Workflow::for_mode(mode, &self.inner.config);
        state.mode = Some(mode);
        state.ui.show_advance_button = true;
        state.ui.message.clear();
        state.move_to(0);
        debug!("Selected {:?} demo", mode);
        Ok(())
    }

    /// Run the current step.
    ///
    /// Inputs are refused while the account is not configured, and ignored
    /// while an asynchronous operation is in flight.
    pub fn handle_user_input(&self, selection: Selection) -> Result<(), Error> {
        let _input = self.inner.input.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.inner.config.account.is_configured() {
            self.inner.lock_state().set_status(ACCOUNT_NOT_SET);
            return Err(Error::AccountNotConfigured);
        }
        let (index, kind) = {
            let state = self.inner.lock_state();
            if state.async_op.is_some() {
                return Err(Error::Busy);
            }
            match state.workflow.get(state.step) {
                Some(kind) => (state.step, kind.clone()),
                None => return Ok(()),
            }
        };
        debug!("Running step {}: {:?}", index, kind);
        match self.inner.run_step(index, &kind, selection) {
            Ok(transition) => {
                let mut state = self.inner.lock_state();
                if state.step == index {
                    match transition {
                        Transition::Next => {
                            let next = state.next_step(index);
                            state.move_to(next);
                        }
                        Transition::Stay => state.move_to(index),
                        Transition::GoTo(step) => state.move_to(step),
                        Transition::Pending => {}
                    }
                }
                Ok(())
            }
            Err(err) => {
                warn!("Step {} ({:?}) failed: {}", index, kind, err);
                self.inner.lock_state().set_status(refusal_text(&err));
                Err(err)
            }
        }
    }

    /// Release listeners, watcher, session and anchors, and go back to the
    /// first step. Completions still in flight are ignored when they land.
    pub fn teardown(&self) {
        let _input = self.inner.input.lock().unwrap_or_else(PoisonError::into_inner);
        self.inner.release_session(Release::Everything);
    }

    /// Draw a marker over every visible, tracked anchor. Returns how many were drawn.
    pub fn render_frame(&self, renderer: &mut dyn MarkerRenderer) -> usize {
        let platform = &self.inner.platform;
        // If the camera isn't tracking don't bother rendering anchors.
        if platform.camera_tracking_state() != TrackingState::Tracking {
            return 0;
        }
        let markers = self.inner.lock_state().visuals.snapshot();
        let mut drawn = 0;
        for marker in markers {
            if platform.anchor_tracking_state(marker.anchor) != TrackingState::Tracking {
                continue;
            }
            if let Some(pose) = platform.anchor_pose(marker.anchor) {
                renderer.draw_marker(pose, marker.color);
                drawn += 1;
            }
        }
        drawn
    }

    /// Visit every visual while holding the state lock.
    pub fn for_each_visual<F>(&self, visitor: F)
    where
        F: FnMut(&AnchorVisual),
    {
        self.inner.lock_state().visuals.for_each(visitor)
    }

    pub fn visual_color(&self, identifier: &str) -> Option<MarkerColor> {
        self.inner
            .lock_state()
            .visuals
            .get(identifier)
            .map(|visual| visual.color)
    }

    pub fn visual_count(&self) -> usize {
        self.inner.lock_state().visuals.len()
    }

    pub fn visual_identifiers(&self) -> Vec<String> {
        let mut identifiers = vec![];
        self.for_each_visual(|visual| identifiers.push(visual.identifier.clone()));
        identifiers.sort();
        identifiers
    }

    /// Identifiers saved during this run.
    pub fn saved_identifiers(&self) -> Vec<String> {
        self.inner.lock_state().targets.clone()
    }

    /// The number the last saved anchor was shared under, in the shared demo.
    pub fn shared_anchor_number(&self) -> Option<u64> {
        self.inner.lock_state().shared_number
    }

    pub fn ui(&self) -> UiState {
        self.inner.lock_state().ui.clone()
    }

    pub fn step(&self) -> usize {
        self.inner.lock_state().step
    }

    pub fn current_step(&self) -> Option<StepKind> {
        let state = self.inner.lock_state();
        state.workflow.get(state.step).cloned()
    }

    pub fn workflow(&self) -> Workflow {
        self.inner.lock_state().workflow.clone()
    }

    pub fn mode(&self) -> Option<DemoMode> {
        self.inner.lock_state().mode
    }

    pub fn is_async_op_in_progress(&self) -> bool {
        self.inner.lock_state().async_op.is_some()
    }

    pub fn session_status(&self) -> SessionStatus {
        self.inner.lock_state().session_status
    }

    pub fn has_session(&self) -> bool {
        self.inner.lock_session().is_some()
    }

    pub fn update_geolocation_permission(&self, granted: bool) {
        self.inner.lock_state().permissions.geo_location = granted;
        self.inner.apply_sensor_permissions();
    }

    pub fn update_wifi_permission(&self, granted: bool) {
        self.inner.lock_state().permissions.wifi = granted;
        self.inner.apply_sensor_permissions();
    }

    pub fn update_bluetooth_permission(&self, granted: bool) {
        self.inner.lock_state().permissions.bluetooth = granted;
        self.inner.apply_sensor_permissions();
    }

    pub fn sensor_permissions(&self) -> SensorPermissions {
        self.inner.lock_state().permissions
    }
}

impl Drop for DemoController {
    fn drop(&mut self) {
        self.inner.release_session(Release::Everything);
    }
}
