//! Adapters that expose hub entities as remote-protocol accessories.
//!
//! Each adapter owns one [`Accessory`] and keeps it in sync with one hub
//! entity in both directions:
//!
//! - client writes reach the adapter's setters, which raise an [`EchoFlag`]
//!   and hand a service call to the hub;
//! - hub state changes reach [`AccessoryAdapter::update_state`], which writes
//!   the characteristics whose flag is not raised and then clears the flags.

mod fan;
mod flag;
mod vacuum;

use std::sync::Arc;

pub use fan::percentage_from_speed;
pub use fan::speed_from_percentage;
pub use fan::FanAdapter;
pub use flag::EchoFlag;
use linkme::distributed_slice;
use serde_json::json;
use tracing::debug;
pub use vacuum::VacuumAdapter;

use crate::hap::Accessory;
use crate::hap::Value;
use crate::hub::EntitySnapshot;
use crate::hub::Hub;
use crate::hub::ServiceCall;

/// Everything an adapter needs from the outside world.
#[derive(Clone)]
pub struct AdapterContext {
    pub aid: u64,
    pub entity_id: String,
    pub display_name: String,
    pub hub: Arc<dyn Hub>,
}

impl AdapterContext {
    /// Hand a service call for this entity to the hub.
    ///
    /// The service data always carries `entity_id`; `field` adds the one
    /// service-specific parameter, if any.
    pub fn call_service(&self, domain: &str, service: &str, field: Option<(&str, serde_json::Value)>) {
        let mut data = json!({ "entity_id": self.entity_id });
        if let Some((key, value)) = field {
            data[key] = value;
        }
        debug!("{}: calling {}.{} with {}", self.entity_id, domain, service, data);
        self.hub.call_service(ServiceCall {
            domain: domain.to_string(),
            service: service.to_string(),
            data,
        });
    }
}

impl std::fmt::Debug for AdapterContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterContext")
            .field("aid", &self.aid)
            .field("entity_id", &self.entity_id)
            .field("display_name", &self.display_name)
            .field("hub", &"<hub>")
            .finish()
    }
}

/// Contract shared by all entity adapters.
pub trait AccessoryAdapter: Send + Sync {
    fn entity_id(&self) -> &str;

    fn accessory(&self) -> &Accessory;

    /// Reconcile the accessory with a new hub snapshot.
    ///
    /// Called once per hub state change. Repeating an identical snapshot
    /// writes nothing.
    fn update_state(&self, snapshot: &EntitySnapshot);

    /// Run the setter for characteristic `iid` after a client write of
    /// `value`. Characteristics without a setter ignore the call.
    fn set_characteristic(&self, iid: u64, value: &Value);
}

/// Constructor for the adapter of one hub domain.
pub struct AdapterFactory {
    pub domain: &'static str,
    pub build: fn(AdapterContext, &EntitySnapshot) -> Arc<dyn AccessoryAdapter>,
}

#[distributed_slice]
pub static ADAPTERS: [AdapterFactory];

/// Find the adapter factory for a hub domain.
pub fn lookup(domain: &str) -> Option<&'static AdapterFactory> {
    ADAPTERS.iter().find(|f| f.domain == domain)
}
