/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use crate::ArPlatform;

use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// A platform anchor, as issued by the AR session.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct AnchorHandle(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum TrackingState {
    Tracking,
    Paused,
    Stopped,
}

/// Milliseconds since the unix epoch.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct Expiration(pub i64);

impl Expiration {
    /// The expiration `hours` from now.
    pub fn hours_from_now(hours: i64) -> Expiration {
        let at = time::get_time() + time::Duration::hours(hours);
        Expiration(at.sec * 1000 + i64::from(at.nsec) / 1_000_000)
    }

    pub fn unix_millis(self) -> i64 {
        self.0
    }
}

/// A platform anchor owned by the demo.
///
/// The handle is released back to the platform when this is dropped,
/// so each handle is released exactly once.
pub struct LocalAnchor {
    handle: AnchorHandle,
    platform: Arc<dyn ArPlatform>,
}

impl LocalAnchor {
    pub fn new(handle: AnchorHandle, platform: Arc<dyn ArPlatform>) -> LocalAnchor {
        LocalAnchor { handle, platform }
    }

    pub fn handle(&self) -> AnchorHandle {
        self.handle
    }
}

impl fmt::Debug for LocalAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LocalAnchor").field(&self.handle).finish()
    }
}

impl Drop for LocalAnchor {
    fn drop(&mut self) {
        self.platform.release_anchor(self.handle);
    }
}

/// A cloud-persisted wrapper around a local anchor.
/// The identifier is empty until the anchor has been saved.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct CloudAnchor {
    pub identifier: String,
    pub local_anchor: AnchorHandle,
    pub expiration: Option<Expiration>,
}

impl CloudAnchor {
    pub fn new(local_anchor: AnchorHandle) -> CloudAnchor {
        CloudAnchor {
            identifier: String::new(),
            local_anchor,
            expiration: None,
        }
    }

    pub fn is_saved(&self) -> bool {
        !self.identifier.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_week_expiration_is_in_the_future() {
        let now = Expiration::hours_from_now(0);
        let week = Expiration::hours_from_now(7 * 24);
        let delta = week.unix_millis() - now.unix_millis();
        let expected = 7 * 24 * 60 * 60 * 1000;
        assert!(delta >= expected && delta < expected + 1000);
    }

    #[test]
    fn new_cloud_anchor_is_unsaved() {
        let anchor = CloudAnchor::new(AnchorHandle(4));
        assert!(!anchor.is_saved());
        assert_eq!(anchor.expiration, None);
    }
}
