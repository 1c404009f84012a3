//! Hub-side collaborator: entity snapshots in, service calls out.

mod attributes;
#[cfg(feature = "hub_mqtt")]
pub mod client;
#[cfg(feature = "hub_mqtt")]
mod mqtt;

pub use attributes::Direction;
pub use attributes::FanAttributes;
pub use attributes::FanFeatures;
pub use attributes::FanState;
pub use attributes::VacuumFeatures;
pub use attributes::VacuumState;
#[cfg(feature = "hub_mqtt")]
pub use mqtt::MqttHub;
#[cfg(feature = "hub_mqtt")]
pub use mqtt::MqttHubDriver;
use serde::Deserialize;
use serde::Serialize;

/// Attribute key carrying an entity's supported-feature bitmask.
pub const ATTR_SUPPORTED_FEATURES: &str = "supported_features";

/// Point-in-time view of a hub entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub entity_id: String,

    /// Free-form state label, e.g. "on" or "cleaning".
    pub state: String,

    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl EntitySnapshot {
    /// Domain part of the entity id ("fan" for "fan.bedroom").
    pub fn domain(&self) -> &str {
        domain_of(&self.entity_id)
    }

    /// Supported-feature bitmask; absent or malformed reads as no features.
    pub fn supported_features(&self) -> u32 {
        self.attributes
            .get(ATTR_SUPPORTED_FEATURES)
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0)
    }
}

pub fn domain_of(entity_id: &str) -> &str {
    entity_id.split_once('.').map_or(entity_id, |(d, _)| d)
}

/// Object part of the entity id ("bedroom" for "fan.bedroom"). An id without
/// a domain is all object id.
pub fn object_id_of(entity_id: &str) -> &str {
    entity_id.split_once('.').map_or(entity_id, |(_, o)| o)
}

/// A request for the hub to run a domain service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,

    /// Service data; always an object carrying at least `entity_id`.
    pub data: serde_json::Value,
}

/// The hub as seen by adapters.
///
/// Both operations are synchronous and infallible from the caller's point of
/// view: a service call is handed off and forgotten.
pub trait Hub: Send + Sync {
    fn call_service(&self, call: ServiceCall);

    fn snapshot(&self, entity_id: &str) -> Option<EntitySnapshot>;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// In-memory hub that records service calls.
    #[derive(Debug, Default)]
    pub struct RecordingHub {
        pub calls: Mutex<Vec<ServiceCall>>,
        pub snapshots: Mutex<HashMap<String, EntitySnapshot>>,
    }

    impl RecordingHub {
        pub fn with_snapshot(snapshot: EntitySnapshot) -> Self {
            let hub = Self::default();
            hub.put(snapshot);
            hub
        }

        pub fn put(&self, snapshot: EntitySnapshot) {
            self.snapshots
                .lock()
                .unwrap()
                .insert(snapshot.entity_id.clone(), snapshot);
        }

        pub fn take_calls(&self) -> Vec<ServiceCall> {
            std::mem::take(&mut *self.calls.lock().unwrap())
        }
    }

    impl Hub for RecordingHub {
        fn call_service(&self, call: ServiceCall) {
            self.calls.lock().unwrap().push(call);
        }

        fn snapshot(&self, entity_id: &str) -> Option<EntitySnapshot> {
            self.snapshots.lock().unwrap().get(entity_id).cloned()
        }
    }

    pub fn snapshot(entity_id: &str, state: &str, attributes: serde_json::Value) -> EntitySnapshot {
        EntitySnapshot {
            entity_id: entity_id.to_string(),
            state: state.to_string(),
            attributes: attributes.as_object().cloned().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::testing::snapshot;
    use super::*;

    #[test]
    fn test_snapshot_deserialize() {
        let s: EntitySnapshot = serde_json::from_value(json!({
            "entity_id": "fan.bedroom",
            "state": "on",
            "attributes": {"supported_features": 5, "speed": "low"}
        }))
        .unwrap();
        assert_eq!(s.domain(), "fan");
        assert_eq!(s.supported_features(), 5);
        assert_eq!(s.attributes["speed"], "low");
    }

    #[test]
    fn test_snapshot_attributes_default_to_empty() {
        let s: EntitySnapshot =
            serde_json::from_value(json!({"entity_id": "vacuum.rosie", "state": "docked"}))
                .unwrap();
        assert!(s.attributes.is_empty());
        assert_eq!(s.supported_features(), 0);
    }

    #[test]
    fn test_supported_features_malformed() {
        let s = snapshot("fan.x", "on", json!({"supported_features": "lots"}));
        assert_eq!(s.supported_features(), 0);
        let s = snapshot("fan.x", "on", json!({"supported_features": -1}));
        assert_eq!(s.supported_features(), 0);
    }

    #[test]
    fn test_domain_of_without_dot() {
        assert_eq!(domain_of("fan"), "fan");
        assert_eq!(domain_of("vacuum.rosie"), "vacuum");
    }

    #[test]
    fn test_object_id_of() {
        assert_eq!(object_id_of("fan.living_room"), "living_room");
        assert_eq!(object_id_of("sensor.a.b"), "a.b");
        assert_eq!(object_id_of("noperiod"), "noperiod");
    }
}
