use std::sync::Arc;

use linkme::distributed_slice;
use tracing::debug;

use super::AccessoryAdapter;
use super::AdapterContext;
use super::AdapterFactory;
use super::EchoFlag;
use super::ADAPTERS;
use crate::hap::Accessory;
use crate::hap::AccessoryBuilder;
use crate::hap::Category;
use crate::hap::Characteristic;
use crate::hap::CharacteristicKind;
use crate::hap::ServiceKind;
use crate::hap::Value;
use crate::hub::EntitySnapshot;
use crate::hub::VacuumFeatures;
use crate::hub::VacuumState;

const DOMAIN: &str = "vacuum";

const SERVICE_CLEAN_SPOT: &str = "clean_spot";
const SERVICE_RETURN_TO_BASE: &str = "return_to_base";
const SERVICE_START: &str = "start";
const SERVICE_STOP: &str = "stop";

const CLEAN_RETURN_LABEL: &str = "Clean";
const TOGGLE_TIMER_LABEL: &str = "Timer";

#[distributed_slice(ADAPTERS)]
static VACUUM_ADAPTER: AdapterFactory = AdapterFactory {
    domain: DOMAIN,
    build: build_vacuum,
};

fn build_vacuum(ctx: AdapterContext, snapshot: &EntitySnapshot) -> Arc<dyn AccessoryAdapter> {
    Arc::new(VacuumAdapter::new(ctx, snapshot))
}

#[derive(Debug, Default)]
struct VacuumFlags {
    clean_return: EchoFlag,
    toggle_timer: EchoFlag,
}

/// Vacuum entity exposed as up to two named switches.
///
/// "Clean" starts a spot clean when turned on and sends the vacuum home when
/// turned off. "Timer" starts and stops the cleaning run.
pub struct VacuumAdapter {
    ctx: AdapterContext,
    accessory: Accessory,
    clean_return: Option<Arc<Characteristic>>,
    toggle_timer: Option<Arc<Characteristic>>,
    flags: VacuumFlags,
}

fn add_switch(builder: &mut AccessoryBuilder, label: &str) -> Arc<Characteristic> {
    let name = format!("{} {}", builder.display_name(), label);
    builder.add_service(ServiceKind::Switch);
    builder.add_characteristic_with_value(CharacteristicKind::Name, Value::String(name));
    builder.add_characteristic(CharacteristicKind::On)
}

impl VacuumAdapter {
    pub fn new(ctx: AdapterContext, snapshot: &EntitySnapshot) -> Self {
        let features = VacuumFeatures(snapshot.supported_features());

        let mut builder =
            AccessoryBuilder::new(ctx.aid, &ctx.display_name, Category::Switch, &ctx.entity_id);
        let clean_return = (features.contains(VacuumFeatures::RETURN_HOME)
            || features.contains(VacuumFeatures::CLEAN_SPOT))
        .then(|| add_switch(&mut builder, CLEAN_RETURN_LABEL));
        let toggle_timer = (features.contains(VacuumFeatures::START)
            || features.contains(VacuumFeatures::STOP))
        .then(|| add_switch(&mut builder, TOGGLE_TIMER_LABEL));

        Self {
            accessory: builder.build(),
            ctx,
            clean_return,
            toggle_timer,
            flags: VacuumFlags::default(),
        }
    }

    pub fn set_clean_return(&self, on: bool) {
        debug!(
            "{}: Set switch state for \"clean_return\" to {}",
            self.ctx.entity_id, on
        );
        self.flags.clean_return.raise();
        let service = if on {
            SERVICE_CLEAN_SPOT
        } else {
            SERVICE_RETURN_TO_BASE
        };
        self.ctx.call_service(DOMAIN, service, None);
    }

    pub fn set_toggle_timer(&self, on: bool) {
        debug!(
            "{}: Set switch state for \"toggle_timer\" to {}",
            self.ctx.entity_id, on
        );
        self.flags.toggle_timer.raise();
        let service = if on { SERVICE_START } else { SERVICE_STOP };
        self.ctx.call_service(DOMAIN, service, None);
    }
}

impl AccessoryAdapter for VacuumAdapter {
    fn entity_id(&self) -> &str {
        &self.ctx.entity_id
    }

    fn accessory(&self) -> &Accessory {
        &self.accessory
    }

    fn update_state(&self, snapshot: &EntitySnapshot) {
        let state = VacuumState::parse(&snapshot.state);

        if let Some(clean_return) = &self.clean_return {
            let hk_state = state == Some(VacuumState::Cleaning);
            if !self.flags.clean_return.is_raised() {
                clean_return.set_value(Value::Bool(hk_state));
            }
            self.flags.clean_return.clear();
        }

        // The timer switch only follows states that say whether a run is
        // active. Its flag is cleared only by one of those states.
        if let Some(toggle_timer) = &self.toggle_timer {
            if let Some(
                state @ (VacuumState::Cleaning
                | VacuumState::Docked
                | VacuumState::Error
                | VacuumState::Paused),
            ) = state
            {
                let hk_state = state != VacuumState::Paused;
                if !self.flags.toggle_timer.is_raised() {
                    toggle_timer.set_value(Value::Bool(hk_state));
                }
                self.flags.toggle_timer.clear();
            }
        }
    }

    fn set_characteristic(&self, iid: u64, value: &Value) {
        let Some(on) = value.as_bool() else {
            return;
        };
        let is = |c: &Option<Arc<Characteristic>>| c.as_ref().is_some_and(|c| c.iid() == iid);

        if is(&self.clean_return) {
            self.set_clean_return(on);
        } else if is(&self.toggle_timer) {
            self.set_toggle_timer(on);
        }
    }
}
