/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Coarse relocalization: the location provider and the sensors it may use.

use std::fmt;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Which sensors the location provider is allowed to use.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct SensorCapabilities {
    pub geo_location_enabled: bool,
    pub wifi_enabled: bool,
    pub bluetooth_enabled: bool,
    /// Bluetooth-LE beacons used to find anchors.
    pub known_beacon_proximity_uuids: Vec<String>,
}

/// What a single sensor is currently contributing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum SensorStatus {
    Available,
    /// The sensor is disabled, or the platform lacks the capability.
    Disabled,
    /// Enabled, but no GPS data, access points or beacons were seen.
    Unavailable,
    Indeterminate,
}

impl fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            SensorStatus::Available => "Available",
            SensorStatus::Disabled => "Disabled",
            SensorStatus::Unavailable => "Unavailable",
            SensorStatus::Indeterminate => "Indeterminate",
        })
    }
}

/// The SDK object that feeds sensor fingerprints to a cloud session.
pub trait LocationProvider: 'static + Send + Sync {
    fn sensors(&self) -> SensorCapabilities;
    fn set_sensors(&self, sensors: SensorCapabilities);
    fn geo_location_status(&self) -> SensorStatus;
    fn wifi_status(&self) -> SensorStatus;
    fn bluetooth_status(&self) -> SensorStatus;
}

/// Sensor permissions granted by the operating system.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct SensorPermissions {
    pub geo_location: bool,
    pub wifi: bool,
    pub bluetooth: bool,
}

impl SensorPermissions {
    /// Mirror the granted permissions onto the sensor enable flags.
    pub fn apply(self, mut sensors: SensorCapabilities) -> SensorCapabilities {
        sensors.geo_location_enabled = self.geo_location;
        sensors.wifi_enabled = self.wifi;
        sensors.bluetooth_enabled = self.bluetooth;
        sensors
    }
}

/// `GeoLocation: X, Bluetooth: Y, Wifi: Z`, with disabled sensors reported
/// as such regardless of what the provider says.
pub fn sensors_state(provider: &dyn LocationProvider) -> String {
    let sensors = provider.sensors();
    let state = |enabled: bool, status: SensorStatus| {
        if enabled {
            status
        } else {
            SensorStatus::Disabled
        }
    };
    format!(
        "GeoLocation: {}, Bluetooth: {}, Wifi: {}",
        state(sensors.geo_location_enabled, provider.geo_location_status()),
        state(sensors.bluetooth_enabled, provider.bluetooth_status()),
        state(sensors.wifi_enabled, provider.wifi_status()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    struct FixedProvider(Mutex<SensorCapabilities>);

    impl LocationProvider for FixedProvider {
        fn sensors(&self) -> SensorCapabilities {
            self.0.lock().unwrap().clone()
        }
        fn set_sensors(&self, sensors: SensorCapabilities) {
            *self.0.lock().unwrap() = sensors;
        }
        fn geo_location_status(&self) -> SensorStatus {
            SensorStatus::Available
        }
        fn wifi_status(&self) -> SensorStatus {
            SensorStatus::Unavailable
        }
        fn bluetooth_status(&self) -> SensorStatus {
            SensorStatus::Indeterminate
        }
    }

    #[test]
    fn apply_is_idempotent_and_keeps_beacons() {
        let permissions = SensorPermissions {
            geo_location: true,
            wifi: false,
            bluetooth: true,
        };
        let sensors = SensorCapabilities {
            wifi_enabled: true,
            known_beacon_proximity_uuids: vec!["beacon".into()],
            ..Default::default()
        };
        let once = permissions.apply(sensors);
        let twice = permissions.apply(once.clone());
        assert_eq!(once, twice);
        assert!(once.geo_location_enabled);
        assert!(!once.wifi_enabled);
        assert!(once.bluetooth_enabled);
        assert_eq!(once.known_beacon_proximity_uuids, vec!["beacon".to_string()]);
    }

    #[test]
    fn disabled_sensors_report_disabled() {
        let provider = FixedProvider(Mutex::new(SensorCapabilities {
            geo_location_enabled: true,
            wifi_enabled: true,
            ..Default::default()
        }));
        assert_eq!(
            sensors_state(&provider),
            "GeoLocation: Available, Bluetooth: Disabled, Wifi: Unavailable"
        );
    }
}
