use std::sync::Arc;

use linkme::distributed_slice;
use serde_json::json;
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
use crate::hub::Direction;
use crate::hub::EntitySnapshot;
use crate::hub::FanAttributes;
use crate::hub::FanFeatures;
use crate::hub::FanState;

const DOMAIN: &str = "fan";

const SERVICE_TURN_ON: &str = "turn_on";
const SERVICE_TURN_OFF: &str = "turn_off";
const SERVICE_SET_DIRECTION: &str = "set_direction";
const SERVICE_OSCILLATE: &str = "oscillate";
const SERVICE_SET_SPEED: &str = "set_speed";

/// Scaled values this close to a bucket edge count as on the edge.
const EDGE_TOLERANCE: f64 = 1e-9;

#[distributed_slice(ADAPTERS)]
static FAN_ADAPTER: AdapterFactory = AdapterFactory {
    domain: DOMAIN,
    build: build_fan,
};

fn build_fan(ctx: AdapterContext, snapshot: &EntitySnapshot) -> Arc<dyn AccessoryAdapter> {
    Arc::new(FanAdapter::new(ctx, snapshot))
}

/// Map a 0-100 percentage onto a named speed.
///
/// The list is split into equal buckets above 0%: bucket `i` covers
/// `(i * 100 / len, (i + 1) * 100 / len]`. Percentages at or below 0 map to
/// the first speed, at or above 100 to the last. Returns `None` for an empty
/// list.
///
/// A bucket top belongs to the lower bucket: 50% of `[low, high]` is "low",
/// where flooring `p * len / 100` would pick "high". This keeps
/// [`percentage_from_speed`] round-tripping.
pub fn speed_from_percentage(speed_list: &[String], percentage: f64) -> Option<&str> {
    let last = speed_list.last()?;
    if percentage >= 100.0 {
        return Some(last);
    }
    if percentage <= 0.0 {
        return speed_list.first().map(String::as_str);
    }

    let len = speed_list.len();
    let scaled = percentage / 100.0 * len as f64;
    let nearest = scaled.round();
    let scaled = if (scaled - nearest).abs() < EDGE_TOLERANCE {
        nearest
    } else {
        scaled
    };
    let index = (scaled.ceil() as usize).saturating_sub(1).min(len - 1);
    speed_list.get(index).map(String::as_str)
}

/// Map a named speed onto the top of its percentage bucket.
///
/// The first speed is the first step above 0% ("off"), the last is 100%.
/// Returns `None` when the speed is not in the list.
pub fn percentage_from_speed(speed_list: &[String], speed: &str) -> Option<f64> {
    let index = speed_list.iter().position(|s| s == speed)?;
    Some((index + 1) as f64 * 100.0 / speed_list.len() as f64)
}

#[derive(Debug, Default)]
struct FanFlags {
    active: EchoFlag,
    direction: EchoFlag,
    speed: EchoFlag,
    swing: EchoFlag,
}

/// Fan entity exposed as a `Fanv2` accessory.
///
/// Active is always present; rotation direction, rotation speed and swing
/// mode follow the entity's supported features at construction time.
pub struct FanAdapter {
    ctx: AdapterContext,
    accessory: Accessory,
    active: Arc<Characteristic>,
    direction: Option<Arc<Characteristic>>,
    speed: Option<Arc<Characteristic>>,
    swing: Option<Arc<Characteristic>>,
    flags: FanFlags,
}

impl FanAdapter {
    pub fn new(ctx: AdapterContext, snapshot: &EntitySnapshot) -> Self {
        let features = FanFeatures(snapshot.supported_features());

        let mut builder =
            AccessoryBuilder::new(ctx.aid, &ctx.display_name, Category::Fan, &ctx.entity_id);
        builder.add_service(ServiceKind::Fanv2);
        let active = builder.add_characteristic(CharacteristicKind::Active);
        let direction = features
            .contains(FanFeatures::DIRECTION)
            .then(|| builder.add_characteristic(CharacteristicKind::RotationDirection));
        let speed = features
            .contains(FanFeatures::SET_SPEED)
            .then(|| builder.add_characteristic(CharacteristicKind::RotationSpeed));
        let swing = features
            .contains(FanFeatures::OSCILLATE)
            .then(|| builder.add_characteristic(CharacteristicKind::SwingMode));

        Self {
            accessory: builder.build(),
            ctx,
            active,
            direction,
            speed,
            swing,
            flags: FanFlags::default(),
        }
    }

    pub fn set_active(&self, active: bool) {
        debug!("{}: Set state to {}", self.ctx.entity_id, active as u8);
        self.flags.active.raise();
        let service = if active {
            SERVICE_TURN_ON
        } else {
            SERVICE_TURN_OFF
        };
        self.ctx.call_service(DOMAIN, service, None);
    }

    pub fn set_direction(&self, reverse: bool) {
        debug!("{}: Set direction to {}", self.ctx.entity_id, reverse as u8);
        self.flags.direction.raise();
        let direction = if reverse {
            Direction::Reverse
        } else {
            Direction::Forward
        };
        self.ctx.call_service(
            DOMAIN,
            SERVICE_SET_DIRECTION,
            Some(("direction", json!(direction.to_string()))),
        );
    }

    pub fn set_oscillating(&self, oscillating: bool) {
        debug!("{}: Set oscillating to {}", self.ctx.entity_id, oscillating as u8);
        self.flags.swing.raise();
        self.ctx
            .call_service(DOMAIN, SERVICE_OSCILLATE, Some(("oscillating", json!(oscillating))));
    }

    /// Set the speed from a 0-100 percentage. Zero or below turns the fan off.
    pub fn set_speed(&self, percentage: f64) {
        debug!("{}: Set speed to {}", self.ctx.entity_id, percentage);
        if percentage <= 0.0 {
            self.set_active(false);
            return;
        }

        self.flags.speed.raise();
        let speed_list = self
            .ctx
            .hub
            .snapshot(&self.ctx.entity_id)
            .and_then(|s| FanAttributes::from_attributes(&s.attributes).speed_list)
            .unwrap_or_default();
        let speed = speed_from_percentage(&speed_list, percentage);
        if speed.is_none() {
            debug!(
                "{}: no speed list, requesting speed without a value",
                self.ctx.entity_id
            );
        }
        self.ctx
            .call_service(DOMAIN, SERVICE_SET_SPEED, Some(("speed", json!(speed))));
    }
}

impl AccessoryAdapter for FanAdapter {
    fn entity_id(&self) -> &str {
        &self.ctx.entity_id
    }

    fn accessory(&self) -> &Accessory {
        &self.accessory
    }

    fn update_state(&self, snapshot: &EntitySnapshot) {
        let state = FanState::parse(&snapshot.state);
        let attributes = FanAttributes::from_attributes(&snapshot.attributes);

        if let Some(state) = state {
            let hk_active = i64::from(state == FanState::On);
            if !self.flags.active.is_raised() {
                self.active.set_value(Value::Int(hk_active));
            }
        }
        self.flags.active.clear();

        if let Some(direction_char) = &self.direction {
            if !self.flags.direction.is_raised() {
                if let Some(direction) = attributes.direction {
                    let hk_direction = i64::from(direction == Direction::Reverse);
                    direction_char.set_value(Value::Int(hk_direction));
                }
            }
            self.flags.direction.clear();
        }

        // Speed is written even after a client write so that the displayed
        // percentage snaps to the bucket the hub actually picked.
        if let Some(speed_char) = &self.speed {
            let hk_speed = if state == Some(FanState::On) {
                match (&attributes.speed, &attributes.speed_list) {
                    (Some(speed), Some(list)) => percentage_from_speed(list, speed),
                    _ => None,
                }
            } else {
                Some(0.0)
            };
            if let Some(hk_speed) = hk_speed {
                speed_char.set_value(Value::Float(hk_speed));
            }
            self.flags.speed.clear();
        }

        if let Some(swing_char) = &self.swing {
            if !self.flags.swing.is_raised() {
                if let Some(oscillating) = attributes.oscillating {
                    swing_char.set_value(Value::Int(i64::from(oscillating)));
                }
            }
            self.flags.swing.clear();
        }
    }

    fn set_characteristic(&self, iid: u64, value: &Value) {
        let Some(n) = value.as_f64() else {
            return;
        };
        let is = |c: &Option<Arc<Characteristic>>| c.as_ref().is_some_and(|c| c.iid() == iid);

        if self.active.iid() == iid {
            self.set_active(n == 1.0);
        } else if is(&self.direction) {
            self.set_direction(n == 1.0);
        } else if is(&self.speed) {
            self.set_speed(n);
        } else if is(&self.swing) {
            self.set_oscillating(n == 1.0);
        }
    }
}
