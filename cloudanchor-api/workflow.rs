/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The demo variants, as ordered lists of steps.

use crate::DemoConfig;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// What to do when an asynchronous step fails.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum FailurePolicy {
    /// Stay on the step, so the next input retries it.
    Retry,
    /// Move on to the next step anyway.
    Proceed,
    /// Jump to the step at this index.
    GoTo(usize),
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum LocateQuery {
    /// The anchors saved earlier in this run.
    SavedIdentifiers,
    /// The anchor saved last.
    LastSaved,
    /// The anchor looked up by its shared number.
    SharedAnchor,
    /// Anchors around the anchor found by the previous query.
    NearFoundAnchor { distance_in_meters: f32 },
    /// Anchors around the device, using the location provider.
    NearDevice {
        distance_in_meters: f32,
        max_result_count: u32,
    },
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum StepKind {
    CreateSession,
    ConfigureSession,
    StartSession,
    CreateLocationProvider,
    ConfigureSensors,
    CreateLocalAnchor,
    CreateCloudAnchor,
    SetExpiration,
    SaveCloudAnchor { on_failure: FailurePolicy },
    /// Place and save anchors until `count` of them have been saved.
    CreateNearbyAnchors { count: u32, on_failure: FailurePolicy },
    StopSession,
    /// Release the session and its anchors, keeping the saved identifiers.
    DestroySession,
    Locate(LocateQuery),
    DeleteFoundAnchors { on_failure: FailurePolicy },
    StopWatcher,
    /// Publish the anchor saved last, and show the number it was given.
    ShareAnchor,
    /// Look up the identifier of a shared anchor by its number.
    EnterAnchorNumber,
    /// Release everything and go back to the first step.
    Teardown,
}

impl StepKind {
    /// The button text inviting the user to run this step.
    pub fn prompt(&self) -> &'static str {
        match *self {
            StepKind::CreateSession => "tap to create a session",
            StepKind::ConfigureSession => "tap to configure the session",
            StepKind::StartSession => "tap to start the session",
            StepKind::CreateLocationProvider => "tap to create a location provider",
            StepKind::ConfigureSensors => "tap to configure sensors",
            StepKind::CreateLocalAnchor => "tap to place an anchor",
            StepKind::CreateCloudAnchor => "tap to prepare a cloud anchor",
            StepKind::SetExpiration => "tap to set the expiration date",
            StepKind::SaveCloudAnchor { .. } => "tap to save the anchor (once at 100%)",
            StepKind::CreateNearbyAnchors { .. } => "tap to place and save an anchor",
            StepKind::StopSession => "tap to stop the session",
            StepKind::DestroySession => "tap to release the session",
            StepKind::Locate(LocateQuery::SavedIdentifiers) => "tap to locate the saved anchor",
            StepKind::Locate(LocateQuery::LastSaved) => "tap to locate the last saved anchor",
            StepKind::Locate(LocateQuery::NearFoundAnchor { .. }) => {
                "tap to locate nearby anchors"
            }
            StepKind::Locate(LocateQuery::NearDevice { .. }) => {
                "tap to locate anchors near the device"
            }
            StepKind::DeleteFoundAnchors { .. } => "tap to delete found anchors",
            StepKind::StopWatcher => "tap to stop the watcher",
            StepKind::ShareAnchor => "tap to share the anchor",
            StepKind::EnterAnchorNumber => "enter an anchor number and tap locate",
            StepKind::Locate(LocateQuery::SharedAnchor) => "tap to locate the shared anchor",
            StepKind::Teardown => "tap to clean up",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum DemoMode {
    /// Save one anchor, find it again by identifier, delete it.
    Basic,
    /// Save several anchors, find the first one, then the others near it.
    Nearby,
    /// Save an anchor with sensor data, then find anchors near the device.
    CoarseRelocation,
    /// Save an anchor and share its number, then find it by that number.
    Shared,
}

/// An ordered list of steps, interpreted by the demo controller.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct Workflow {
    steps: Vec<StepKind>,
}

impl Workflow {
    pub fn new(steps: Vec<StepKind>) -> Workflow {
        Workflow { steps }
    }

    pub fn for_mode(mode: DemoMode, config: &DemoConfig) -> Workflow {
        let mut steps = vec![StepKind::CreateSession, StepKind::ConfigureSession];
        let sensors = [StepKind::CreateLocationProvider, StepKind::ConfigureSensors];
        let single_anchor = [
            StepKind::CreateLocalAnchor,
            StepKind::CreateCloudAnchor,
            StepKind::SetExpiration,
            StepKind::SaveCloudAnchor {
                on_failure: config.save_failure,
            },
        ];
        let delete = StepKind::DeleteFoundAnchors {
            on_failure: config.delete_failure,
        };
        match mode {
            DemoMode::Basic => {
                steps.push(StepKind::StartSession);
                steps.extend_from_slice(&single_anchor);
                steps.extend(Workflow::requery());
                steps.push(StepKind::StartSession);
                steps.push(StepKind::Locate(LocateQuery::SavedIdentifiers));
                steps.push(delete);
            }
            DemoMode::Nearby => {
                steps.push(StepKind::StartSession);
                steps.push(StepKind::CreateNearbyAnchors {
                    count: config.nearby_anchor_count.max(1),
                    on_failure: config.save_failure,
                });
                steps.extend(Workflow::requery());
                steps.push(StepKind::StartSession);
                steps.push(StepKind::Locate(LocateQuery::LastSaved));
                steps.push(StepKind::Locate(LocateQuery::NearFoundAnchor {
                    distance_in_meters: config.near_anchor_distance_in_meters,
                }));
                steps.push(delete);
            }
            DemoMode::CoarseRelocation => {
                steps.extend_from_slice(&sensors);
                steps.push(StepKind::StartSession);
                steps.extend_from_slice(&single_anchor);
                steps.extend(Workflow::requery());
                steps.extend_from_slice(&sensors);
                steps.push(StepKind::StartSession);
                steps.push(StepKind::Locate(LocateQuery::NearDevice {
                    distance_in_meters: config.near_device_distance_in_meters,
                    max_result_count: config.near_device_max_result_count,
                }));
                steps.push(StepKind::StopWatcher);
            }
            DemoMode::Shared => {
                steps.push(StepKind::StartSession);
                steps.extend_from_slice(&single_anchor);
                steps.push(StepKind::ShareAnchor);
                steps.push(StepKind::StopSession);
                steps.push(StepKind::DestroySession);
                steps.push(StepKind::EnterAnchorNumber);
                steps.push(StepKind::CreateSession);
                steps.push(StepKind::ConfigureSession);
                steps.push(StepKind::StartSession);
                steps.push(StepKind::Locate(LocateQuery::SharedAnchor));
            }
        }
        steps.push(StepKind::Teardown);
        Workflow { steps }
    }

    // Stop and release the session, then create and configure a new one
    // for querying.
    fn requery() -> Vec<StepKind> {
        vec![
            StepKind::StopSession,
            StepKind::DestroySession,
            StepKind::CreateSession,
            StepKind::ConfigureSession,
        ]
    }

    pub fn steps(&self) -> &[StepKind] {
        &self.steps
    }

    pub fn get(&self, index: usize) -> Option<&StepKind> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The step after `index`, wrapping back to the first one.
    pub fn next(&self, index: usize) -> usize {
        if self.steps.is_empty() {
            0
        } else {
            (index + 1) % self.steps.len()
        }
    }

    pub fn prompt(&self, index: usize) -> &'static str {
        self.get(index).map(StepKind::prompt).unwrap_or("")
    }
}
