/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use crate::FailurePolicy;
use crate::LogLevel;
use crate::SessionConfiguration;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// The value the account fields ship with, which counts as unset.
pub const PLACEHOLDER: &str = "Set me";

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct AccountConfig {
    pub account_id: String,
    pub account_key: String,
}

impl Default for AccountConfig {
    fn default() -> Self {
        AccountConfig {
            account_id: PLACEHOLDER.into(),
            account_key: PLACEHOLDER.into(),
        }
    }
}

impl AccountConfig {
    pub fn new(account_id: &str, account_key: &str) -> AccountConfig {
        AccountConfig {
            account_id: account_id.into(),
            account_key: account_key.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        let set = |value: &str| !value.trim().is_empty() && value != PLACEHOLDER;
        set(&self.account_id) && set(&self.account_key)
    }
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
pub struct DemoConfig {
    pub account: AccountConfig,
    pub log_level: LogLevel,
    /// How many anchors the nearby demo saves before locating them.
    pub nearby_anchor_count: u32,
    pub near_anchor_distance_in_meters: f32,
    pub near_device_distance_in_meters: f32,
    pub near_device_max_result_count: u32,
    /// How far in front of the camera or gaze an anchor is placed
    /// when a tap does not hit anything.
    pub placement_distance: f32,
    /// Saved anchors expire this many hours after they are created.
    pub anchor_lifetime_hours: i64,
    pub known_beacon_proximity_uuids: Vec<String>,
    pub save_failure: FailurePolicy,
    pub delete_failure: FailurePolicy,
}

impl Default for DemoConfig {
    fn default() -> Self {
        DemoConfig {
            account: AccountConfig::default(),
            log_level: LogLevel::All,
            nearby_anchor_count: 3,
            near_anchor_distance_in_meters: 10.0,
            near_device_distance_in_meters: 8.0,
            near_device_max_result_count: 25,
            placement_distance: 1.0,
            anchor_lifetime_hours: 7 * 24,
            known_beacon_proximity_uuids: vec![
                "61687109-905f-4436-91f8-e602f514c96d".into(),
                "e1f54e02-1e23-44e0-9c3d-512eb56adec9".into(),
                "01234567-8901-2345-6789-012345678903".into(),
            ],
            save_failure: FailurePolicy::Retry,
            delete_failure: FailurePolicy::Proceed,
        }
    }
}

impl DemoConfig {
    pub fn with_account(account: AccountConfig) -> DemoConfig {
        DemoConfig {
            account,
            ..Default::default()
        }
    }

    pub fn session_configuration(&self) -> SessionConfiguration {
        SessionConfiguration {
            account_id: self.account.account_id.clone(),
            account_key: self.account.account_key.clone(),
            log_level: self.log_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_account_is_not_configured() {
        assert!(!AccountConfig::default().is_configured());
        assert!(!AccountConfig::new("id", "").is_configured());
        assert!(!AccountConfig::new("id", PLACEHOLDER).is_configured());
        assert!(AccountConfig::new("id", "key").is_configured());
    }

    #[test]
    fn session_configuration_carries_account() {
        let config = DemoConfig::with_account(AccountConfig::new("id", "key"));
        let session = config.session_configuration();
        assert_eq!(session.account_id, "id");
        assert_eq!(session.account_key, "key");
        assert_eq!(session.log_level, LogLevel::All);
    }
}
