use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use arc_swap::ArcSwap;
use serde::Deserialize;
use serde::Serialize;
use strum::AsRefStr;
use strum::Display;
use tracing::debug;

use super::HapError;

/// Wire format of a characteristic value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Format {
    Bool,
    Uint8,
    Int,
    Float,
    String,
}

/// Characteristic types used by the fan and switch services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, AsRefStr)]
pub enum CharacteristicKind {
    Active,
    RotationDirection,
    RotationSpeed,
    SwingMode,
    On,
    Name,
    Manufacturer,
    Model,
    SerialNumber,
    Identify,
}

/// Inclusive numeric bounds of a characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValueRange {
    #[serde(rename = "minValue")]
    pub min: f64,
    #[serde(rename = "maxValue")]
    pub max: f64,
    #[serde(rename = "minStep")]
    pub step: f64,
}

impl ValueRange {
    const BINARY: ValueRange = ValueRange {
        min: 0.0,
        max: 1.0,
        step: 1.0,
    };

    const PERCENTAGE: ValueRange = ValueRange {
        min: 0.0,
        max: 100.0,
        step: 1.0,
    };

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

impl fmt::Display for ValueRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.min, self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Perms {
    pub read: bool,
    pub write: bool,
}

impl Perms {
    const READ: Perms = Perms {
        read: true,
        write: false,
    };
    const WRITE: Perms = Perms {
        read: false,
        write: true,
    };
    const READ_WRITE: Perms = Perms {
        read: true,
        write: true,
    };

    /// Permission codes as reported by the accessory protocol.
    pub fn codes(&self) -> Vec<&'static str> {
        let mut codes = Vec::new();
        if self.read {
            codes.push("pr");
            codes.push("ev");
        }
        if self.write {
            codes.push("pw");
        }
        codes
    }
}

impl CharacteristicKind {
    /// Short form of the characteristic's protocol UUID.
    pub fn type_code(&self) -> &'static str {
        match self {
            Self::Active => "B0",
            Self::RotationDirection => "28",
            Self::RotationSpeed => "29",
            Self::SwingMode => "B6",
            Self::On => "25",
            Self::Name => "23",
            Self::Manufacturer => "20",
            Self::Model => "21",
            Self::SerialNumber => "30",
            Self::Identify => "14",
        }
    }

    pub fn format(&self) -> Format {
        match self {
            Self::Active | Self::SwingMode => Format::Uint8,
            Self::RotationDirection => Format::Int,
            Self::RotationSpeed => Format::Float,
            Self::On | Self::Identify => Format::Bool,
            Self::Name | Self::Manufacturer | Self::Model | Self::SerialNumber => Format::String,
        }
    }

    pub fn range(&self) -> Option<ValueRange> {
        match self {
            Self::Active | Self::SwingMode | Self::RotationDirection => Some(ValueRange::BINARY),
            Self::RotationSpeed => Some(ValueRange::PERCENTAGE),
            _ => None,
        }
    }

    pub fn perms(&self) -> Perms {
        match self {
            Self::Name | Self::Manufacturer | Self::Model | Self::SerialNumber => Perms::READ,
            Self::Identify => Perms::WRITE,
            _ => Perms::READ_WRITE,
        }
    }

    /// Value a freshly constructed characteristic starts with.
    pub fn default_value(&self) -> Value {
        match self.format() {
            Format::Bool => Value::Bool(false),
            Format::Uint8 | Format::Int => Value::Int(0),
            Format::Float => Value::Float(0.0),
            Format::String => Value::String(String::new()),
        }
    }
}

/// A characteristic value as carried by the accessory protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Value {
    /// Numeric view of the value; booleans read as 0/1.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::String(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(0) => Some(false),
            Value::Int(1) => Some(true),
            _ => None,
        }
    }

    /// Coerce a client-supplied value into `format`, if it fits.
    ///
    /// Clients are loose about numeric encodings (`true` for a uint8, `1` for
    /// a bool, `50` for a float); anything else is rejected.
    fn coerce(self, format: Format) -> Option<Value> {
        match format {
            Format::Bool => self.as_bool().map(Value::Bool),
            Format::Uint8 | Format::Int => match self {
                Value::Float(f) if f.fract() == 0.0 => Some(Value::Int(f as i64)),
                Value::Float(_) | Value::String(_) => None,
                other => other.as_f64().map(|f| Value::Int(f as i64)),
            },
            Format::Float => self.as_f64().map(Value::Float),
            Format::String => match self {
                Value::String(s) => Some(Value::String(s)),
                _ => None,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

/// A single value slot of an accessory service.
///
/// The current value is shared between the hub event loop, which writes it
/// during reconciliation, and the protocol layer, which reads it and applies
/// client writes. Readers never block.
pub struct Characteristic {
    iid: u64,
    kind: CharacteristicKind,
    value: ArcSwap<Value>,
    revision: AtomicU64,
}

impl Characteristic {
    pub(crate) fn new(iid: u64, kind: CharacteristicKind, value: Value) -> Self {
        Self {
            iid,
            kind,
            value: ArcSwap::from_pointee(value),
            revision: AtomicU64::new(0),
        }
    }

    pub fn iid(&self) -> u64 {
        self.iid
    }

    pub fn kind(&self) -> CharacteristicKind {
        self.kind
    }

    pub fn value(&self) -> Value {
        Value::clone(&self.value.load())
    }

    /// Number of times the value has changed since construction.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Store a hub-originated value. Returns whether the value changed.
    pub fn set_value(&self, value: impl Into<Value>) -> bool {
        let value = value.into();
        if **self.value.load() == value {
            return false;
        }
        debug!("{} (iid {}) -> {}", self.kind, self.iid, value);
        self.value.store(std::sync::Arc::new(value));
        self.revision.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Validate a client-supplied value against this characteristic's
    /// permissions, format, and range, returning the normalized value.
    pub fn validate(&self, aid: u64, value: Value) -> Result<Value, HapError> {
        if !self.kind.perms().write {
            return Err(HapError::ReadOnly {
                aid,
                iid: self.iid,
                kind: self.kind,
            });
        }

        let format = self.kind.format();
        let value = value
            .clone()
            .coerce(format)
            .ok_or_else(|| HapError::InvalidFormat {
                aid,
                iid: self.iid,
                format,
                value: value.clone(),
            })?;

        if let (Some(range), Some(n)) = (self.kind.range(), value.as_f64()) {
            if !range.contains(n) {
                return Err(HapError::OutOfRange {
                    aid,
                    iid: self.iid,
                    range,
                    value,
                });
            }
        }

        Ok(value)
    }

    /// Store a validated client write without counting it as a hub change.
    pub(crate) fn store_client_value(&self, value: Value) {
        self.value.store(std::sync::Arc::new(value));
    }
}

impl fmt::Debug for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Characteristic")
            .field("iid", &self.iid)
            .field("kind", &self.kind)
            .field("value", &self.value())
            .finish()
    }
}
