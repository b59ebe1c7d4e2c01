/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Errors raised by the demo controller and its collaborators.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum Error {
    #[error("spatial anchors account id and key are not set")]
    AccountNotConfigured,
    #[error("an asynchronous operation is already in progress")]
    Busy,
    #[error("no cloud session")]
    NoSession,
    #[error("no location provider")]
    NoLocationProvider,
    #[error("camera is not tracking")]
    NotTracking,
    #[error("the platform refused to create an anchor")]
    AnchorCreationRefused,
    #[error("no anchor is waiting to be saved")]
    NoPendingAnchor,
    #[error("not enough data to save, recommended progress is {0:.2}")]
    NotEnoughData(f32),
    #[error("no saved anchor to look for")]
    NoLocateTarget,
    #[error("the first anchor has not been found yet")]
    NoSourceAnchor,
    #[error("no found anchors to delete")]
    NothingToDelete,
    #[error("no saved anchor to share")]
    NothingToShare,
    #[error("no anchor exchange service")]
    NoAnchorExchange,
    #[error("an anchor number is needed")]
    AnchorNumberRequired,
    #[error("demo mode can only change between runs")]
    DemoInProgress,
    #[error("cloud operation failed: {0}")]
    Cloud(#[from] CloudError),
    #[error("backend error: {0}")]
    BackendSpecific(String),
}

/// Failure reported by the cloud SDK for a single operation.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum CloudError {
    #[error("not enough spatial data")]
    NotEnoughSpatialData,
    #[error("anchor not found")]
    AnchorNotFound,
    #[error("unauthorized")]
    Unauthorized,
    #[error("service unavailable")]
    ServiceUnavailable,
    #[error("request failed with code {0}")]
    Failed(u32),
}

impl CloudError {
    /// The numeric status code shown to the user.
    pub fn code(&self) -> u32 {
        match *self {
            CloudError::NotEnoughSpatialData => 2,
            CloudError::AnchorNotFound => 3,
            CloudError::Unauthorized => 9,
            CloudError::ServiceUnavailable => 13,
            CloudError::Failed(code) => code,
        }
    }
}
