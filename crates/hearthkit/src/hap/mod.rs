//! Accessory-protocol object model.
//!
//! An [`Accessory`] is what the remote protocol layer sees: a category tag
//! and a list of services, each holding typed, range-bound characteristics.
//! Adapters build one at construction time and keep handles to the
//! characteristics they reconcile.

mod accessory;
mod characteristic;

pub use accessory::Accessory;
pub use accessory::AccessoryBuilder;
pub use accessory::Category;
pub use accessory::Service;
pub use accessory::ServiceKind;
pub use characteristic::Characteristic;
pub use characteristic::CharacteristicKind;
pub use characteristic::Format;
pub use characteristic::Perms;
pub use characteristic::Value;
pub use characteristic::ValueRange;

/// Errors surfaced to the protocol layer when a client write is rejected.
#[derive(Debug, thiserror::Error)]
pub enum HapError {
    #[error("no accessory with aid {0}")]
    UnknownAccessory(u64),

    #[error("accessory {aid} has no characteristic with iid {iid}")]
    UnknownCharacteristic { aid: u64, iid: u64 },

    #[error("characteristic {iid} ({kind}) on accessory {aid} is read-only")]
    ReadOnly {
        aid: u64,
        iid: u64,
        kind: CharacteristicKind,
    },

    #[error("characteristic {iid} on accessory {aid} expects {format}, got {value}")]
    InvalidFormat {
        aid: u64,
        iid: u64,
        format: Format,
        value: Value,
    },

    #[error("characteristic {iid} on accessory {aid} expects a value in {range}, got {value}")]
    OutOfRange {
        aid: u64,
        iid: u64,
        range: ValueRange,
        value: Value,
    },
}
