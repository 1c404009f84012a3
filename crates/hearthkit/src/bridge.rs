use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::debug;
use tracing::info;

use crate::accessories;
use crate::accessories::AccessoryAdapter;
use crate::accessories::AdapterContext;
use crate::config::AccessoryConfig;
use crate::hap::CharacteristicKind;
use crate::hap::HapError;
use crate::hap::Value;
use crate::hub::domain_of;
use crate::hub::object_id_of;
use crate::hub::EntitySnapshot;
use crate::hub::Hub;

/// Aid of the bridge accessory itself; bridged accessories start after it.
pub const BRIDGE_AID: u64 = 1;

/// An entity the bridge is configured to expose.
#[derive(Debug, Clone)]
struct Exposed {
    aid: u64,
    display_name: String,
}

/// The set of built accessories. Replaced wholesale on every change.
#[derive(Clone, Default)]
pub struct Accessories {
    by_aid: BTreeMap<u64, Arc<dyn AccessoryAdapter>>,
}

impl Accessories {
    pub fn get(&self, aid: u64) -> Option<&Arc<dyn AccessoryAdapter>> {
        self.by_aid.get(&aid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn AccessoryAdapter>> {
        self.by_aid.values()
    }

    pub fn len(&self) -> usize {
        self.by_aid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_aid.is_empty()
    }
}

/// Routes hub snapshots to adapters and client writes to their setters.
///
/// Snapshots are expected from a single task. Client writes and readers may
/// come from any thread.
pub struct Bridge {
    name: String,
    hub: Arc<dyn Hub>,
    exposed: HashMap<String, Exposed>,
    accessories: ArcSwap<Accessories>,
}

impl Bridge {
    pub fn new(name: String, hub: Arc<dyn Hub>, entities: &[AccessoryConfig]) -> Self {
        let mut exposed = HashMap::new();
        let mut next_aid = BRIDGE_AID + 1;
        for entity in entities {
            if exposed.contains_key(&entity.entity_id) {
                debug!("{} listed more than once, keeping the first", entity.entity_id);
                continue;
            }
            let display_name = entity
                .name
                .clone()
                .unwrap_or_else(|| default_display_name(&entity.entity_id));
            exposed.insert(
                entity.entity_id.clone(),
                Exposed {
                    aid: next_aid,
                    display_name,
                },
            );
            next_aid += 1;
        }

        Self {
            name,
            hub,
            exposed,
            accessories: ArcSwap::new(Arc::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hub(&self) -> &Arc<dyn Hub> {
        &self.hub
    }

    /// Current set of built accessories.
    pub fn accessories(&self) -> Arc<Accessories> {
        self.accessories.load_full()
    }

    /// Handle a hub state change.
    ///
    /// The first snapshot of a configured entity builds its accessory; every
    /// snapshot is then reconciled into it.
    pub fn handle_state_changed(&self, snapshot: &EntitySnapshot) {
        let Some(exposed) = self.exposed.get(&snapshot.entity_id) else {
            debug!("Ignoring state of unexposed entity {}", snapshot.entity_id);
            return;
        };

        let existing = self.accessories.load().get(exposed.aid).cloned();
        let adapter = match existing {
            Some(adapter) => adapter,
            None => match self.build(exposed, snapshot) {
                Some(adapter) => adapter,
                None => return,
            },
        };

        adapter.update_state(snapshot);
    }

    fn build(&self, exposed: &Exposed, snapshot: &EntitySnapshot) -> Option<Arc<dyn AccessoryAdapter>> {
        let domain = domain_of(&snapshot.entity_id);
        let Some(factory) = accessories::lookup(domain) else {
            debug!(
                "No accessory type for domain {} ({})",
                domain, snapshot.entity_id
            );
            return None;
        };

        let ctx = AdapterContext {
            aid: exposed.aid,
            entity_id: snapshot.entity_id.clone(),
            display_name: exposed.display_name.clone(),
            hub: self.hub.clone(),
        };
        let adapter = (factory.build)(ctx, snapshot);
        info!(
            "Built {} accessory {} for {} (aid {})",
            domain,
            exposed.display_name,
            snapshot.entity_id,
            exposed.aid
        );

        let mut accessories = Accessories::clone(&self.accessories.load());
        accessories.by_aid.insert(exposed.aid, adapter.clone());
        self.accessories.store(Arc::new(accessories));

        Some(adapter)
    }

    /// Apply a client write to characteristic `iid` of accessory `aid`.
    pub fn write(&self, aid: u64, iid: u64, value: Value) -> Result<(), HapError> {
        let accessories = self.accessories();
        let adapter = accessories
            .get(aid)
            .ok_or(HapError::UnknownAccessory(aid))?;

        let characteristic = adapter.accessory().client_write(iid, value)?;
        let value = characteristic.value();
        debug!(
            "{}: client wrote {} = {}",
            adapter.entity_id(),
            characteristic.kind(),
            value
        );

        if characteristic.kind() == CharacteristicKind::Identify {
            info!("Identify requested for {}", adapter.entity_id());
            return Ok(());
        }

        adapter.set_characteristic(iid, &value);
        Ok(())
    }
}

/// "fan.living_room" becomes "living room".
fn default_display_name(entity_id: &str) -> String {
    object_id_of(entity_id).replace('_', " ")
}
