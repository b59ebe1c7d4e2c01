/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

/// Traits to be implemented by cloud anchor SDK backends
use crate::CloudAnchor;
use crate::CloudError;
use crate::Error;
use crate::EventCallback;
use crate::LocationProvider;
use crate::Subscription;

use std::sync::Arc;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum LogLevel {
    None,
    Error,
    Warning,
    Information,
    Debug,
    All,
}

/// Account and diagnostics settings handed to a session before it starts.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct SessionConfiguration {
    pub account_id: String,
    pub account_key: String,
    pub log_level: LogLevel,
}

/// Watchers are identified in the order they were created:
/// a later watcher of a session always has a larger id.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct WatcherId(pub u64);

/// The query a watcher runs.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum LocateCriteria {
    Identifiers(Vec<String>),
    NearAnchor {
        source: CloudAnchor,
        distance_in_meters: f32,
    },
    NearDevice {
        distance_in_meters: f32,
        max_result_count: u32,
    },
}

/// One in-flight locate query.
pub trait Watcher: Send {
    fn identifier(&self) -> WatcherId;

    /// Stop looking. Events that are already on their way may still arrive.
    fn stop(&mut self);
}

/// The continuation of an asynchronous SDK call.
/// It is called exactly once, on any thread.
pub trait CompletionCallback<T>: 'static + Send {
    fn callback(self: Box<Self>, result: Result<T, CloudError>);
}

impl<T, F> CompletionCallback<T> for F
where
    F: 'static + Send + FnOnce(Result<T, CloudError>),
{
    fn callback(self: Box<Self>, result: Result<T, CloudError>) {
        (*self)(result)
    }
}

/// A cloud anchor session.
pub trait CloudSession: 'static + Send + Sync {
    fn configure(&self, configuration: &SessionConfiguration);

    fn set_location_provider(&self, provider: Option<Arc<dyn LocationProvider>>);

    fn subscribe(&self, callback: Arc<dyn EventCallback>) -> Subscription;

    fn start(&self) -> Result<(), Error>;

    fn stop(&self);

    /// Save the anchor; on success the callback receives it with its identifier set.
    fn create_anchor_async(
        &self,
        anchor: CloudAnchor,
        callback: Box<dyn CompletionCallback<CloudAnchor>>,
    );

    fn delete_anchor_async(&self, anchor: CloudAnchor, callback: Box<dyn CompletionCallback<()>>);

    fn create_watcher(&self, criteria: LocateCriteria) -> Result<Box<dyn Watcher>, Error>;
}

/// The entry point of a cloud anchor SDK.
pub trait CloudSessionFactory: 'static + Send + Sync {
    fn create_session(&self) -> Result<Arc<dyn CloudSession>, Error>;

    fn create_location_provider(&self) -> Result<Arc<dyn LocationProvider>, Error>;
}
