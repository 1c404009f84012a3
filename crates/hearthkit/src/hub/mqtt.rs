use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::client::Incoming;
use super::client::MqttClient;
use super::client::MqttMessage;
use super::client::Topics;
use super::EntitySnapshot;
use super::Hub;
use super::ServiceCall;
use crate::bridge::Bridge;

/// Hub reached over MQTT.
///
/// Snapshots and service calls travel on the topics of [`Topics`]. The
/// snapshot cache is replaced wholesale on every update so readers never
/// wait on the event loop.
pub struct MqttHub {
    topics: Topics,
    snapshots: ArcSwap<HashMap<String, EntitySnapshot>>,
    calls_tx: mpsc::UnboundedSender<ServiceCall>,
}

impl MqttHub {
    /// Create the hub and the driver that must run for it to make progress.
    pub fn new<C: MqttClient>(client: C, prefix: &str) -> (Arc<MqttHub>, MqttHubDriver<C>) {
        let (calls_tx, calls_rx) = mpsc::unbounded_channel();
        let hub = Arc::new(MqttHub {
            topics: Topics::new(prefix),
            snapshots: ArcSwap::new(Arc::default()),
            calls_tx,
        });
        let driver = MqttHubDriver {
            client,
            hub: hub.clone(),
            calls_rx,
        };
        (hub, driver)
    }

    fn update_cache(&self, entity_id: &str, snapshot: Option<&EntitySnapshot>) {
        let mut snapshots = HashMap::clone(&self.snapshots.load());
        match snapshot {
            Some(snapshot) => {
                snapshots.insert(entity_id.to_string(), snapshot.clone());
            }
            None => {
                snapshots.remove(entity_id);
            }
        }
        self.snapshots.store(Arc::new(snapshots));
    }
}

impl Hub for MqttHub {
    fn call_service(&self, call: ServiceCall) {
        if let Err(e) = self.calls_tx.send(call) {
            warn!("Dropping service call, MQTT driver stopped: {:?}", e.0);
        }
    }

    fn snapshot(&self, entity_id: &str) -> Option<EntitySnapshot> {
        self.snapshots.load().get(entity_id).cloned()
    }
}

/// Owns the MQTT client and moves messages between it and the bridge.
pub struct MqttHubDriver<C: MqttClient> {
    client: C,
    hub: Arc<MqttHub>,
    calls_rx: mpsc::UnboundedReceiver<ServiceCall>,
}

impl<C: MqttClient> MqttHubDriver<C> {
    /// Connect and subscribe to entity state topics.
    pub async fn start(&mut self) -> Result<(), Box<dyn Error + Send>> {
        self.client.connect().await?;
        let filter = self.hub.topics.state_filter();
        info!("Subscribing to entity states on {}", filter);
        self.client.subscribe(&filter).await
    }

    /// Process service calls and incoming snapshots until the client stops.
    pub async fn run(&mut self, bridge: &Bridge) {
        loop {
            tokio::select! {
                biased;

                Some(call) = self.calls_rx.recv() => self.publish_call(call).await,
                msg = self.client.poll_message() => match msg {
                    Some(msg) => self.handle_message(&msg, bridge),
                    None => break,
                },
            }
        }
        info!("MQTT hub driver stopped");
    }

    async fn publish_call(&mut self, call: ServiceCall) {
        let topic = self.hub.topics.service(&call.domain, &call.service);
        let payload = match serde_json::to_vec(&call.data) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode service call {}: {}", topic, e);
                return;
            }
        };
        if let Err(e) = self.client.publish_call(&topic, &payload).await {
            warn!("Failed to publish service call {}: {}", topic, e);
        } else {
            debug!("Published service call {}", topic);
        }
    }

    fn handle_message(&self, msg: &MqttMessage, bridge: &Bridge) {
        match self.hub.topics.decode(msg) {
            Incoming::State(snapshot) => {
                debug!("State changed: {} -> {}", snapshot.entity_id, snapshot.state);
                self.hub.update_cache(&snapshot.entity_id, Some(&snapshot));
                bridge.handle_state_changed(&snapshot);
            }
            Incoming::Removed(entity_id) => {
                info!("Entity removed: {}", entity_id);
                self.hub.update_cache(&entity_id, None);
            }
            Incoming::Malformed { entity_id, error } => {
                warn!("Malformed state for {}: {}", entity_id, error);
            }
            Incoming::Unrelated => {
                debug!("Ignoring message on {}", msg.topic);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::AccessoryConfig;
    use crate::hub::client::MockMqttClient;

    fn setup() -> (Arc<MqttHub>, MqttHubDriver<MockMqttClient>, Bridge) {
        let (hub, driver) = MqttHub::new(MockMqttClient::new(), "hearthd/");
        let bridge = Bridge::new(
            "Test".to_string(),
            hub.clone(),
            &[AccessoryConfig {
                entity_id: "fan.bedroom".to_string(),
                name: None,
            }],
        );
        (hub, driver, bridge)
    }

    #[tokio::test]
    async fn test_start_subscribes_to_states() {
        let (_, mut driver, _) = setup();
        driver.start().await.unwrap();
        assert!(driver.client.is_connected);
        assert_eq!(driver.client.subscriptions, vec!["hearthd/+/state"]);
    }

    #[tokio::test]
    async fn test_run_routes_states_and_calls() {
        let (hub, mut driver, bridge) = setup();
        let state = json!({
            "state": "on",
            "attributes": {"supported_features": 1, "speed": "low", "speed_list": ["low", "high"]},
        });
        driver
            .client
            .add_message("hearthd/fan.bedroom/state", state.to_string().as_bytes());
        driver.client.add_message("hearthd/fan.bedroom/state", b"{not json");
        driver.client.add_message("zigbee2mqtt/bridge/state", b"online");

        hub.call_service(ServiceCall {
            domain: "fan".to_string(),
            service: "turn_off".to_string(),
            data: json!({"entity_id": "fan.bedroom"}),
        });

        driver.run(&bridge).await;

        assert_eq!(driver.client.published.len(), 1);
        let (topic, payload) = &driver.client.published[0];
        assert_eq!(topic, "hearthd/service/fan/turn_off");
        assert_eq!(
            serde_json::from_slice::<serde_json::Value>(payload).unwrap(),
            json!({"entity_id": "fan.bedroom"})
        );

        let snapshot = hub.snapshot("fan.bedroom").unwrap();
        assert_eq!(snapshot.state, "on");
        assert_eq!(snapshot.supported_features(), 1);
        assert_eq!(bridge.accessories().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_payload_removes_snapshot() {
        let (hub, mut driver, bridge) = setup();
        driver
            .client
            .add_message("hearthd/fan.bedroom/state", br#"{"state": "off"}"#);
        driver.client.add_message("hearthd/fan.bedroom/state", b"");

        driver.run(&bridge).await;

        assert!(hub.snapshot("fan.bedroom").is_none());
        // the accessory itself lives on; features are fixed for its lifetime
        assert_eq!(bridge.accessories().len(), 1);
    }

    #[tokio::test]
    async fn test_call_after_driver_dropped_is_absorbed() {
        let (hub, driver, _) = setup();
        drop(driver);
        hub.call_service(ServiceCall {
            domain: "fan".to_string(),
            service: "turn_on".to_string(),
            data: json!({"entity_id": "fan.bedroom"}),
        });
    }
}
