//! Typed views over raw hub attribute maps.
//!
//! Extraction happens at the reconciliation boundary. Every field is read
//! independently and a value of the wrong shape becomes `None`, so one odd
//! attribute never hides the others.

use serde::de::DeserializeOwned;
use serde_json::Map;
use serde_json::Value;
use strum::Display;
use strum::EnumString;

pub const ATTR_DIRECTION: &str = "direction";
pub const ATTR_OSCILLATING: &str = "oscillating";
pub const ATTR_SPEED: &str = "speed";
pub const ATTR_SPEED_LIST: &str = "speed_list";

/// Read `key` from `attributes` as a `T`, if present and well-formed.
fn field<T: DeserializeOwned>(attributes: &Map<String, Value>, key: &str) -> Option<T> {
    attributes
        .get(key)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
pub enum FanState {
    On,
    Off,
}

impl FanState {
    pub fn parse(label: &str) -> Option<Self> {
        label.parse().ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Direction {
    Forward,
    Reverse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
pub enum VacuumState {
    Cleaning,
    Docked,
    Idle,
    Paused,
    Returning,
    Error,
}

impl VacuumState {
    pub fn parse(label: &str) -> Option<Self> {
        label.parse().ok()
    }
}

/// Fan supported-feature bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FanFeatures(pub u32);

impl FanFeatures {
    pub const SET_SPEED: u32 = 1;
    pub const OSCILLATE: u32 = 2;
    pub const DIRECTION: u32 = 4;

    pub fn contains(&self, bit: u32) -> bool {
        self.0 & bit != 0
    }
}

/// Vacuum supported-feature bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VacuumFeatures(pub u32);

impl VacuumFeatures {
    pub const TURN_ON: u32 = 1;
    pub const TURN_OFF: u32 = 2;
    pub const PAUSE: u32 = 4;
    pub const STOP: u32 = 8;
    pub const RETURN_HOME: u32 = 16;
    pub const FAN_SPEED: u32 = 32;
    pub const BATTERY: u32 = 64;
    pub const STATUS: u32 = 128;
    pub const SEND_COMMAND: u32 = 256;
    pub const LOCATE: u32 = 512;
    pub const CLEAN_SPOT: u32 = 1024;
    pub const MAP: u32 = 2048;
    pub const STATE: u32 = 4096;
    pub const START: u32 = 8192;

    pub fn contains(&self, bit: u32) -> bool {
        self.0 & bit != 0
    }
}

/// The fan attributes the fan adapter understands.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FanAttributes {
    pub direction: Option<Direction>,
    pub speed: Option<String>,
    pub speed_list: Option<Vec<String>>,
    pub oscillating: Option<bool>,
}

impl FanAttributes {
    pub fn from_attributes(attributes: &Map<String, Value>) -> Self {
        Self {
            direction: field::<String>(attributes, ATTR_DIRECTION).and_then(|d| d.parse().ok()),
            speed: field(attributes, ATTR_SPEED),
            speed_list: field(attributes, ATTR_SPEED_LIST),
            oscillating: field(attributes, ATTR_OSCILLATING),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn attrs(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_fan_attributes_well_formed() {
        let a = FanAttributes::from_attributes(&attrs(json!({
            "direction": "reverse",
            "speed": "medium",
            "speed_list": ["low", "medium", "high"],
            "oscillating": true,
        })));
        assert_eq!(a.direction, Some(Direction::Reverse));
        assert_eq!(a.speed.as_deref(), Some("medium"));
        assert_eq!(a.speed_list.unwrap().len(), 3);
        assert_eq!(a.oscillating, Some(true));
    }

    #[test]
    fn test_fan_attributes_wrong_shapes_are_none() {
        let a = FanAttributes::from_attributes(&attrs(json!({
            "direction": "sideways",
            "speed": 3,
            "speed_list": "low,high",
            "oscillating": "yes",
        })));
        assert_eq!(a, FanAttributes::default());
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(FanState::parse("on"), Some(FanState::On));
        assert_eq!(FanState::parse("unavailable"), None);
        assert_eq!(VacuumState::parse("returning"), Some(VacuumState::Returning));
        assert_eq!(VacuumState::parse("Cleaning"), None);
        assert_eq!(Direction::Reverse.to_string(), "reverse");
    }

    #[test]
    fn test_feature_bits() {
        let f = FanFeatures(FanFeatures::SET_SPEED | FanFeatures::DIRECTION);
        assert!(f.contains(FanFeatures::SET_SPEED));
        assert!(!f.contains(FanFeatures::OSCILLATE));

        let v = VacuumFeatures(VacuumFeatures::CLEAN_SPOT);
        assert!(v.contains(VacuumFeatures::CLEAN_SPOT));
        assert!(!v.contains(VacuumFeatures::START | VacuumFeatures::STOP));
    }
}
