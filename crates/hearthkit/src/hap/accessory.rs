use std::sync::Arc;

use serde_json::json;

use super::Characteristic;
use super::CharacteristicKind;
use super::HapError;
use super::Value;
use crate::hub::domain_of;

/// Accessory category advertised to the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Category {
    Bridge,
    Fan,
    Switch,
}

impl Category {
    /// Numeric category identifier used by the accessory protocol.
    pub fn code(&self) -> u8 {
        match self {
            Category::Bridge => 2,
            Category::Fan => 3,
            Category::Switch => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ServiceKind {
    AccessoryInformation,
    Fanv2,
    Switch,
}

impl ServiceKind {
    /// Short form of the service's protocol UUID.
    pub fn type_code(&self) -> &'static str {
        match self {
            ServiceKind::AccessoryInformation => "3E",
            ServiceKind::Fanv2 => "B7",
            ServiceKind::Switch => "49",
        }
    }
}

#[derive(Debug)]
pub struct Service {
    iid: u64,
    kind: ServiceKind,
    characteristics: Vec<Arc<Characteristic>>,
}

impl Service {
    pub fn iid(&self) -> u64 {
        self.iid
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    pub fn characteristics(&self) -> &[Arc<Characteristic>] {
        &self.characteristics
    }

    /// First characteristic of the given kind in this service.
    pub fn characteristic(&self, kind: CharacteristicKind) -> Option<&Arc<Characteristic>> {
        self.characteristics.iter().find(|c| c.kind() == kind)
    }
}

/// A remote-protocol accessory: an aid, a category, and its services.
///
/// The set of services and characteristics is fixed once built.
#[derive(Debug)]
pub struct Accessory {
    aid: u64,
    display_name: String,
    category: Category,
    services: Vec<Service>,
}

impl Accessory {
    pub fn aid(&self) -> u64 {
        self.aid
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn characteristics(&self) -> impl Iterator<Item = &Arc<Characteristic>> {
        self.services.iter().flat_map(|s| s.characteristics.iter())
    }

    pub fn characteristic(&self, iid: u64) -> Option<&Arc<Characteristic>> {
        self.characteristics().find(|c| c.iid() == iid)
    }

    /// Apply a client write: validate it and store the new value.
    ///
    /// The caller is responsible for dispatching the returned characteristic
    /// to the owning adapter's setter.
    pub fn client_write(&self, iid: u64, value: Value) -> Result<&Arc<Characteristic>, HapError> {
        let characteristic =
            self.characteristic(iid)
                .ok_or(HapError::UnknownCharacteristic {
                    aid: self.aid,
                    iid,
                })?;
        let value = characteristic.validate(self.aid, value)?;
        characteristic.store_client_value(value);
        Ok(characteristic)
    }

    /// Describe the accessory in the protocol's attribute database layout.
    pub fn to_json(&self) -> serde_json::Value {
        let services: Vec<_> = self
            .services
            .iter()
            .map(|s| {
                let characteristics: Vec<_> = s
                    .characteristics
                    .iter()
                    .map(|c| {
                        let kind = c.kind();
                        let mut obj = json!({
                            "iid": c.iid(),
                            "type": kind.type_code(),
                            "kind": kind.as_ref(),
                            "format": kind.format(),
                            "perms": kind.perms().codes(),
                        });
                        if kind.perms().read {
                            obj["value"] = json!(c.value());
                        }
                        if let Some(range) = kind.range() {
                            obj["minValue"] = json!(range.min);
                            obj["maxValue"] = json!(range.max);
                            obj["minStep"] = json!(range.step);
                        }
                        obj
                    })
                    .collect();
                json!({
                    "iid": s.iid,
                    "type": s.kind.type_code(),
                    "characteristics": characteristics,
                })
            })
            .collect();

        json!({
            "aid": self.aid,
            "name": self.display_name,
            "category": self.category.code(),
            "services": services,
        })
    }
}

/// Builds an [`Accessory`], assigning instance ids in insertion order.
///
/// Every accessory starts with an information service; characteristics are
/// added to the most recently added service.
pub struct AccessoryBuilder {
    aid: u64,
    display_name: String,
    category: Category,
    services: Vec<Service>,
    next_iid: u64,
}

impl AccessoryBuilder {
    pub fn new(aid: u64, display_name: &str, category: Category, entity_id: &str) -> Self {
        let mut builder = Self {
            aid,
            display_name: display_name.to_string(),
            category,
            services: Vec::new(),
            next_iid: 1,
        };

        let model = domain_of(entity_id);
        builder.add_service(ServiceKind::AccessoryInformation);
        builder.add_characteristic_with_value(CharacteristicKind::Identify, Value::Bool(false));
        builder.add_characteristic_with_value(CharacteristicKind::Name, Value::from(display_name));
        builder.add_characteristic_with_value(
            CharacteristicKind::Manufacturer,
            Value::from(env!("CARGO_PKG_NAME")),
        );
        builder.add_characteristic_with_value(CharacteristicKind::Model, Value::from(model));
        builder.add_characteristic_with_value(
            CharacteristicKind::SerialNumber,
            Value::from(entity_id),
        );
        builder
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    fn next_iid(&mut self) -> u64 {
        let iid = self.next_iid;
        self.next_iid += 1;
        iid
    }

    pub fn add_service(&mut self, kind: ServiceKind) -> &mut Self {
        let iid = self.next_iid();
        self.services.push(Service {
            iid,
            kind,
            characteristics: Vec::new(),
        });
        self
    }

    /// Add a characteristic holding its kind's default value.
    pub fn add_characteristic(&mut self, kind: CharacteristicKind) -> Arc<Characteristic> {
        self.add_characteristic_with_value(kind, kind.default_value())
    }

    pub fn add_characteristic_with_value(
        &mut self,
        kind: CharacteristicKind,
        value: Value,
    ) -> Arc<Characteristic> {
        let iid = self.next_iid();
        let characteristic = Arc::new(Characteristic::new(iid, kind, value));
        // The information service is always present, so there is a last service.
        if let Some(service) = self.services.last_mut() {
            service.characteristics.push(characteristic.clone());
        }
        characteristic
    }

    pub fn build(self) -> Accessory {
        Accessory {
            aid: self.aid,
            display_name: self.display_name,
            category: self.category,
            services: self.services,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fan_accessory() -> (Accessory, Arc<Characteristic>) {
        let mut builder = AccessoryBuilder::new(2, "Bedroom Fan", Category::Fan, "fan.bedroom");
        builder.add_service(ServiceKind::Fanv2);
        let active = builder.add_characteristic(CharacteristicKind::Active);
        (builder.build(), active)
    }

    #[test]
    fn test_information_service_is_first() {
        let (accessory, _) = fan_accessory();
        let info = &accessory.services()[0];
        assert_eq!(info.kind(), ServiceKind::AccessoryInformation);
        assert_eq!(
            info.characteristic(CharacteristicKind::Model).unwrap().value(),
            Value::from("fan")
        );
        assert_eq!(
            info.characteristic(CharacteristicKind::SerialNumber)
                .unwrap()
                .value(),
            Value::from("fan.bedroom")
        );
    }

    #[test]
    fn test_iids_are_sequential_and_unique() {
        let (accessory, active) = fan_accessory();
        // 1 info service + 5 info characteristics, then the fan service
        assert_eq!(accessory.services()[1].iid(), 7);
        assert_eq!(active.iid(), 8);

        let mut iids: Vec<_> = accessory.characteristics().map(|c| c.iid()).collect();
        iids.dedup();
        assert_eq!(iids.len(), 6);
    }

    #[test]
    fn test_client_write_stores_value() {
        let (accessory, active) = fan_accessory();
        let written = accessory.client_write(active.iid(), Value::Int(1)).unwrap();
        assert_eq!(written.kind(), CharacteristicKind::Active);
        assert_eq!(active.value(), Value::Int(1));
        // client writes are not hub-originated changes
        assert_eq!(active.revision(), 0);
    }

    #[test]
    fn test_client_write_unknown_iid() {
        let (accessory, _) = fan_accessory();
        assert!(matches!(
            accessory.client_write(99, Value::Int(1)),
            Err(HapError::UnknownCharacteristic { aid: 2, iid: 99 })
        ));
    }

    #[test]
    fn test_to_json_layout() {
        let (accessory, _) = fan_accessory();
        let json = accessory.to_json();
        assert_eq!(json["aid"], 2);
        assert_eq!(json["category"], 3);
        assert_eq!(json["services"][1]["type"], "B7");

        let active = &json["services"][1]["characteristics"][0];
        assert_eq!(active["kind"], "Active");
        assert_eq!(active["format"], "uint8");
        assert_eq!(active["value"], 0);
        assert_eq!(active["maxValue"], 1.0);

        let identify = &json["services"][0]["characteristics"][0];
        assert!(identify.get("value").is_none());
    }
}
