//! Device type definitions for the Matter bridge.
//!
//! This module defines the device types used by the bridge,
//! following the Matter specification for various device types.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A Matter device type: identifier plus revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceType {
    pub dtype: u16,
    pub drev: u8,
}

/// Numeric device type identifier, the durable half of [`DeviceType`].
pub type DeviceTypeId = u16;

/// Cluster identifier as carried in endpoint descriptors.
pub type ClusterId = u32;

/// Matter Root Node device type
///
/// Device Type ID: 0x0016 (22 decimal)
/// Device Type Revision: 1
pub const DEV_TYPE_ROOT_NODE: DeviceType = DeviceType {
    dtype: 0x0016,
    drev: 1,
};

/// Matter Aggregator device type (for the bridge root)
///
/// Device Type ID: 0x000E (14 decimal)
/// Device Type Revision: 1
///
/// Required clusters:
/// - Descriptor (standard)
///
/// Used as the bridge aggregator endpoint that enumerates bridged devices.
pub const DEV_TYPE_AGGREGATOR: DeviceType = DeviceType {
    dtype: 0x000E,
    drev: 1,
};

/// Matter Bridged Node device type
///
/// Device Type ID: 0x0013 (19 decimal)
/// Device Type Revision: 1
///
/// Required clusters:
/// - BridgedDeviceBasicInformation (0x0039)
/// - Descriptor (standard)
///
/// Added to bridged device endpoints alongside their functional device type.
pub const DEV_TYPE_BRIDGED_NODE: DeviceType = DeviceType {
    dtype: 0x0013,
    drev: 1,
};

/// Matter On/Off Light device type
///
/// Device Type ID: 0x0100 (256 decimal)
/// Device Type Revision: 2
///
/// Required clusters:
/// - OnOff (0x0006)
/// - Descriptor (standard)
pub const DEV_TYPE_ON_OFF_LIGHT: DeviceType = DeviceType {
    dtype: 0x0100,
    drev: 2,
};

/// Matter On/Off Plug-in Unit device type
///
/// Device Type ID: 0x010A (266 decimal)
/// Device Type Revision: 2
///
/// Required clusters:
/// - OnOff (0x0006)
/// - Descriptor (standard)
pub const DEV_TYPE_ON_OFF_PLUG_IN_UNIT: DeviceType = DeviceType {
    dtype: 0x010A,
    drev: 2,
};

/// Matter Contact Sensor device type
///
/// Device Type ID: 0x0015 (21 decimal)
/// Device Type Revision: 1
///
/// Required clusters:
/// - BooleanState (0x0045)
/// - Descriptor (standard)
pub const DEV_TYPE_CONTACT_SENSOR: DeviceType = DeviceType {
    dtype: 0x0015,
    drev: 1,
};

/// Matter Occupancy Sensor device type
///
/// Device Type ID: 0x0107 (263 decimal)
/// Device Type Revision: 1
///
/// Required clusters:
/// - OccupancySensing (0x0406)
/// - Descriptor (standard)
pub const DEV_TYPE_OCCUPANCY_SENSOR: DeviceType = DeviceType {
    dtype: 0x0107,
    drev: 1,
};

/// Matter Temperature Sensor device type
///
/// Device Type ID: 0x0302 (770 decimal)
/// Device Type Revision: 2
///
/// Required clusters:
/// - TemperatureMeasurement (0x0402)
/// - Descriptor (standard)
pub const DEV_TYPE_TEMPERATURE_SENSOR: DeviceType = DeviceType {
    dtype: 0x0302,
    drev: 2,
};

/// Matter Humidity Sensor device type
///
/// Device Type ID: 0x0307 (775 decimal)
/// Device Type Revision: 2
///
/// Required clusters:
/// - RelativeHumidityMeasurement (0x0405)
/// - Descriptor (standard)
pub const DEV_TYPE_HUMIDITY_SENSOR: DeviceType = DeviceType {
    dtype: 0x0307,
    drev: 2,
};

// Cluster ids referenced by the bridged endpoint descriptors.
pub const CLUSTER_DESCRIPTOR: ClusterId = 0x001D;
pub const CLUSTER_BRIDGED_DEVICE_BASIC_INFORMATION: ClusterId = 0x0039;
pub const CLUSTER_ON_OFF: ClusterId = 0x0006;
pub const CLUSTER_BOOLEAN_STATE: ClusterId = 0x0045;
pub const CLUSTER_OCCUPANCY_SENSING: ClusterId = 0x0406;
pub const CLUSTER_TEMPERATURE_MEASUREMENT: ClusterId = 0x0402;
pub const CLUSTER_RELATIVE_HUMIDITY_MEASUREMENT: ClusterId = 0x0405;

/// Functional kinds a bridged Zigbee device can be exposed as.
///
/// The kind decides the functional device type and cluster set stamped onto
/// the bridged endpoint next to the mandatory bridged-node clusters.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum BridgedDeviceKind {
    /// On/Off light
    OnOffLight,
    /// On/Off plug-in unit (outlet/relay)
    OnOffPlugInUnit,
    /// Contact sensor (door/window open/close)
    ContactSensor,
    /// Occupancy/motion sensor
    OccupancySensor,
    /// Temperature sensor
    TemperatureSensor,
    /// Humidity sensor
    HumiditySensor,
}

impl BridgedDeviceKind {
    /// Get the Matter DeviceType for this kind.
    pub const fn device_type(&self) -> DeviceType {
        match self {
            Self::OnOffLight => DEV_TYPE_ON_OFF_LIGHT,
            Self::OnOffPlugInUnit => DEV_TYPE_ON_OFF_PLUG_IN_UNIT,
            Self::ContactSensor => DEV_TYPE_CONTACT_SENSOR,
            Self::OccupancySensor => DEV_TYPE_OCCUPANCY_SENSOR,
            Self::TemperatureSensor => DEV_TYPE_TEMPERATURE_SENSOR,
            Self::HumiditySensor => DEV_TYPE_HUMIDITY_SENSOR,
        }
    }

    /// The durable identifier persisted in bridged device records.
    pub const fn device_type_id(&self) -> DeviceTypeId {
        self.device_type().dtype
    }

    /// The functional cluster carried by endpoints of this kind.
    pub const fn functional_cluster(&self) -> ClusterId {
        match self {
            Self::OnOffLight | Self::OnOffPlugInUnit => CLUSTER_ON_OFF,
            Self::ContactSensor => CLUSTER_BOOLEAN_STATE,
            Self::OccupancySensor => CLUSTER_OCCUPANCY_SENSING,
            Self::TemperatureSensor => CLUSTER_TEMPERATURE_MEASUREMENT,
            Self::HumiditySensor => CLUSTER_RELATIVE_HUMIDITY_MEASUREMENT,
        }
    }

    /// Map a persisted device type id back to a kind.
    pub const fn from_device_type_id(id: DeviceTypeId) -> Option<Self> {
        match id {
            0x0100 => Some(Self::OnOffLight),
            0x010A => Some(Self::OnOffPlugInUnit),
            0x0015 => Some(Self::ContactSensor),
            0x0107 => Some(Self::OccupancySensor),
            0x0302 => Some(Self::TemperatureSensor),
            0x0307 => Some(Self::HumiditySensor),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_device_type_id() {
        let kinds = [
            BridgedDeviceKind::OnOffLight,
            BridgedDeviceKind::OnOffPlugInUnit,
            BridgedDeviceKind::ContactSensor,
            BridgedDeviceKind::OccupancySensor,
            BridgedDeviceKind::TemperatureSensor,
            BridgedDeviceKind::HumiditySensor,
        ];
        for kind in kinds {
            assert_eq!(
                BridgedDeviceKind::from_device_type_id(kind.device_type_id()),
                Some(kind)
            );
        }
    }

    #[test]
    fn test_unknown_device_type_id() {
        assert_eq!(BridgedDeviceKind::from_device_type_id(0xFFFF), None);
    }

    #[test]
    fn test_functional_clusters() {
        assert_eq!(
            BridgedDeviceKind::OnOffLight.functional_cluster(),
            CLUSTER_ON_OFF
        );
        assert_eq!(
            BridgedDeviceKind::ContactSensor.functional_cluster(),
            CLUSTER_BOOLEAN_STATE
        );
    }
}
