//! MQTT side of the hub transport: topic layout, message decoding and the
//! broker client.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::AsyncClient;
use rumqttc::Event;
use rumqttc::MqttOptions;
use rumqttc::Packet;
use rumqttc::QoS;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;
use tracing::warn;

use super::EntitySnapshot;
use crate::config::MqttConfig;

/// MQTT message received from a subscription
#[derive(Debug, Clone)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Topic layout under a common prefix.
///
/// Entity states live on `{prefix}/{entity_id}/state`, service calls go to
/// `{prefix}/service/{domain}/{service}`.
#[derive(Debug, Clone)]
pub struct Topics {
    prefix: String,
}

/// Body of an entity state message.
#[derive(Debug, Deserialize)]
struct StatePayload {
    state: String,
    #[serde(default)]
    attributes: serde_json::Map<String, serde_json::Value>,
}

/// An incoming message, decoded.
#[derive(Debug)]
pub enum Incoming {
    State(EntitySnapshot),
    /// Empty payload on a state topic: the entity is gone.
    Removed(String),
    Malformed {
        entity_id: String,
        error: serde_json::Error,
    },
    Unrelated,
}

impl Topics {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Filter matching every entity state topic.
    pub fn state_filter(&self) -> String {
        format!("{}/+/state", self.prefix)
    }

    pub fn service(&self, domain: &str, service: &str) -> String {
        format!("{}/service/{}/{}", self.prefix, domain, service)
    }

    /// Entity id of a state topic, if `topic` is one.
    pub fn entity_of<'a>(&self, topic: &'a str) -> Option<&'a str> {
        let entity_id = topic
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix('/')?
            .strip_suffix("/state")?;
        (!entity_id.is_empty() && !entity_id.contains('/')).then_some(entity_id)
    }

    pub fn decode(&self, msg: &MqttMessage) -> Incoming {
        let Some(entity_id) = self.entity_of(&msg.topic) else {
            return Incoming::Unrelated;
        };
        if msg.payload.is_empty() {
            return Incoming::Removed(entity_id.to_string());
        }

        match serde_json::from_slice::<StatePayload>(&msg.payload) {
            Ok(payload) => Incoming::State(EntitySnapshot {
                entity_id: entity_id.to_string(),
                state: payload.state,
                attributes: payload.attributes,
            }),
            Err(error) => Incoming::Malformed {
                entity_id: entity_id.to_string(),
                error,
            },
        }
    }
}

/// Trait for MQTT client operations
///
/// This trait allows for mocking the MQTT client for testing purposes
#[async_trait]
pub trait MqttClient: Send + Sync {
    /// Connect to the MQTT broker
    async fn connect(&mut self) -> Result<(), Box<dyn Error + Send>>;

    /// Subscribe to an MQTT topic filter
    ///
    /// The subscription is restored whenever the broker connection is
    /// re-established.
    async fn subscribe(&mut self, filter: &str) -> Result<(), Box<dyn Error + Send>>;

    /// Publish a service call
    ///
    /// Calls are sent at-least-once and never retained.
    async fn publish_call(
        &mut self,
        topic: &str,
        payload: &[u8],
    ) -> Result<(), Box<dyn Error + Send>>;

    /// Wait for the next message from subscribed topics
    ///
    /// Returns None once the client has stopped
    async fn poll_message(&mut self) -> Option<MqttMessage>;
}

/// Mock MQTT client for testing
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockMqttClient {
    pub messages: std::collections::VecDeque<MqttMessage>,
    pub subscriptions: Vec<String>,
    pub published: Vec<(String, Vec<u8>)>,
    pub is_connected: bool,
}

#[cfg(test)]
#[async_trait]
impl MqttClient for MockMqttClient {
    async fn connect(&mut self) -> Result<(), Box<dyn Error + Send>> {
        self.is_connected = true;
        Ok(())
    }

    async fn subscribe(&mut self, filter: &str) -> Result<(), Box<dyn Error + Send>> {
        self.subscriptions.push(filter.to_string());
        Ok(())
    }

    async fn publish_call(
        &mut self,
        topic: &str,
        payload: &[u8],
    ) -> Result<(), Box<dyn Error + Send>> {
        self.published.push((topic.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn poll_message(&mut self) -> Option<MqttMessage> {
        self.messages.pop_front()
    }
}

#[cfg(test)]
impl MockMqttClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message for delivery
    pub fn add_message(&mut self, topic: &str, payload: &[u8]) {
        self.messages.push_back(MqttMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
    }
}

fn boxed<E: Error + Send + 'static>(e: E) -> Box<dyn Error + Send> {
    Box::new(e)
}

fn not_connected() -> Box<dyn Error + Send> {
    boxed(std::io::Error::new(
        std::io::ErrorKind::NotConnected,
        "MQTT client not connected. Call connect() first.",
    ))
}

/// Broker client backed by rumqttc
///
/// A background task drives the rumqttc event loop, forwards publishes to
/// [`MqttClient::poll_message`] and re-subscribes after every reconnect.
pub struct RumqttcClient {
    mqtt_options: MqttOptions,

    /// Set by connect()
    client: Option<AsyncClient>,
    message_rx: Option<mpsc::UnboundedReceiver<MqttMessage>>,
    event_loop_task: Option<JoinHandle<()>>,

    /// Filters to restore on reconnect
    filters: Arc<Mutex<Vec<String>>>,
}

impl RumqttcClient {
    pub fn new(config: &MqttConfig) -> anyhow::Result<Self> {
        let mut mqtt_options =
            MqttOptions::new(config.client_id.clone(), config.broker.clone(), config.port);

        mqtt_options.set_keep_alive(Duration::from_secs(30));

        // Entity snapshots with long speed lists or vendor attributes can be large
        mqtt_options.set_max_packet_size(2 * 1024 * 1024, 2 * 1024 * 1024);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            mqtt_options.set_credentials(username, password);
        }

        Ok(Self {
            mqtt_options,
            client: None,
            message_rx: None,
            event_loop_task: None,
            filters: Arc::default(),
        })
    }
}

/// Queue subscriptions for `filters` without waiting on the event loop.
async fn resubscribe(client: &AsyncClient, filters: &Mutex<Vec<String>>) {
    for filter in filters.lock().await.iter() {
        if let Err(e) = client.try_subscribe(filter.clone(), QoS::AtMostOnce) {
            warn!("Failed to restore subscription {}: {}", filter, e);
        }
    }
}

#[async_trait]
impl MqttClient for RumqttcClient {
    async fn connect(&mut self) -> Result<(), Box<dyn Error + Send>> {
        let (client, mut event_loop) = AsyncClient::new(self.mqtt_options.clone(), 10);
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let loop_client = client.clone();
        let filters = self.filters.clone();

        let task = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Connected to MQTT broker");
                        resubscribe(&loop_client, &filters).await;
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let msg = MqttMessage {
                            topic: publish.topic.to_string(),
                            payload: publish.payload.to_vec(),
                        };
                        if message_tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("MQTT event loop error: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
            info!("MQTT event loop task exiting");
        });

        self.client = Some(client);
        self.message_rx = Some(message_rx);
        self.event_loop_task = Some(task);

        Ok(())
    }

    async fn subscribe(&mut self, filter: &str) -> Result<(), Box<dyn Error + Send>> {
        let client = self.client.as_ref().ok_or_else(not_connected)?;

        self.filters.lock().await.push(filter.to_string());
        client
            .subscribe(filter, QoS::AtMostOnce)
            .await
            .map_err(boxed)
    }

    async fn publish_call(
        &mut self,
        topic: &str,
        payload: &[u8],
    ) -> Result<(), Box<dyn Error + Send>> {
        let client = self.client.as_ref().ok_or_else(not_connected)?;

        client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(boxed)
    }

    async fn poll_message(&mut self) -> Option<MqttMessage> {
        self.message_rx.as_mut()?.recv().await
    }
}

impl Drop for RumqttcClient {
    fn drop(&mut self) {
        if let Some(task) = self.event_loop_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn message(topic: &str, payload: &[u8]) -> MqttMessage {
        MqttMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn test_topic_layout() {
        let topics = Topics::new("hearthd/");
        assert_eq!(topics.state_filter(), "hearthd/+/state");
        assert_eq!(topics.service("fan", "set_speed"), "hearthd/service/fan/set_speed");
    }

    #[test]
    fn test_entity_of() {
        let topics = Topics::new("hearthd");
        assert_eq!(topics.entity_of("hearthd/fan.bedroom/state"), Some("fan.bedroom"));
        assert_eq!(topics.entity_of("hearthd/service/fan/turn_on"), None);
        assert_eq!(topics.entity_of("other/fan.bedroom/state"), None);
        assert_eq!(topics.entity_of("hearthd//state"), None);
        assert_eq!(topics.entity_of("hearthd/a/b/state"), None);
    }

    #[test]
    fn test_decode_state() {
        let topics = Topics::new("hearthd");
        let payload = json!({
            "entity_id": "ignored",
            "state": "on",
            "attributes": {"speed": "low"},
        });
        let Incoming::State(snapshot) = topics.decode(&message(
            "hearthd/fan.bedroom/state",
            payload.to_string().as_bytes(),
        )) else {
            panic!("expected a state");
        };
        // the topic names the entity
        assert_eq!(snapshot.entity_id, "fan.bedroom");
        assert_eq!(snapshot.state, "on");
        assert_eq!(snapshot.attributes["speed"], "low");
    }

    #[test]
    fn test_decode_state_without_attributes() {
        let topics = Topics::new("hearthd");
        let incoming = topics.decode(&message("hearthd/vacuum.rosie/state", br#"{"state": "docked"}"#));
        assert!(matches!(incoming, Incoming::State(s) if s.attributes.is_empty()));
    }

    #[test]
    fn test_decode_removed_malformed_unrelated() {
        let topics = Topics::new("hearthd");
        assert!(matches!(
            topics.decode(&message("hearthd/fan.bedroom/state", b"")),
            Incoming::Removed(id) if id == "fan.bedroom"
        ));
        assert!(matches!(
            topics.decode(&message("hearthd/fan.bedroom/state", b"{not json")),
            Incoming::Malformed { entity_id, .. } if entity_id == "fan.bedroom"
        ));
        assert!(matches!(
            topics.decode(&message("hearthd/fan.bedroom/state", br#"{"attributes": {}}"#)),
            Incoming::Malformed { .. }
        ));
        assert!(matches!(
            topics.decode(&message("zigbee2mqtt/bridge/state", b"online")),
            Incoming::Unrelated
        ));
    }

    #[tokio::test]
    async fn test_rumqttc_requires_connect() {
        let config = MqttConfig {
            broker: "localhost".to_string(),
            port: 1883,
            client_id: "hearthkit-test".to_string(),
            topic_prefix: "hearthd".to_string(),
            username: None,
            password: None,
        };
        let mut client = RumqttcClient::new(&config).unwrap();
        assert!(client.subscribe("hearthd/+/state").await.is_err());
        assert!(client.publish_call("hearthd/service/fan/turn_on", b"{}").await.is_err());
        assert!(client.poll_message().await.is_none());
        assert!(client.filters.lock().await.is_empty());
    }
}
