/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! This crate defines the Rust API for the cloud spatial anchors demo.
//! Cloud SDK backends are implemented by the `cloudanchor` crate.

mod anchor;
mod config;
mod controller;
mod device;
mod error;
mod events;
mod exchange;
mod hittest;
mod input;
mod registry;
mod sensors;
mod session;
mod steps;
mod view;
mod workflow;

pub use anchor::AnchorHandle;
pub use anchor::CloudAnchor;
pub use anchor::Expiration;
pub use anchor::LocalAnchor;
pub use anchor::TrackingState;

pub use config::AccountConfig;
pub use config::DemoConfig;
pub use config::PLACEHOLDER;

pub use controller::DemoController;
pub use controller::UiState;

pub use device::ArPlatform;
pub use device::MarkerRenderer;

pub use error::CloudError;
pub use error::Error;

pub use events::format_percent;
pub use events::Event;
pub use events::EventCallback;
pub use events::ListenerSet;
pub use events::LocateAnchorStatus;
pub use events::SessionStatus;
pub use events::Subscription;
pub use events::UserFeedback;

pub use exchange::AnchorExchange;
pub use exchange::AnchorNumber;

pub use hittest::first_anchorable;
pub use hittest::HitResult;
pub use hittest::Trackable;

pub use input::Selection;

pub use registry::AnchorVisual;
pub use registry::AnchorVisualRegistry;
pub use registry::MarkerColor;
pub use registry::MarkerSnapshot;
pub use registry::PENDING;

pub use sensors::sensors_state;
pub use sensors::LocationProvider;
pub use sensors::SensorCapabilities;
pub use sensors::SensorPermissions;
pub use sensors::SensorStatus;

pub use session::CloudSession;
pub use session::CloudSessionFactory;
pub use session::CompletionCallback;
pub use session::LocateCriteria;
pub use session::LogLevel;
pub use session::SessionConfiguration;
pub use session::Watcher;
pub use session::WatcherId;

pub use view::in_front_of;
pub use view::pose_at;
pub use view::Anchor;
pub use view::AnchorPose;
pub use view::CameraPose;
pub use view::Native;
pub use view::Ray;
pub use view::Viewer;
pub use view::Viewport;

pub use workflow::DemoMode;
pub use workflow::FailurePolicy;
pub use workflow::LocateQuery;
pub use workflow::StepKind;
pub use workflow::Workflow;
