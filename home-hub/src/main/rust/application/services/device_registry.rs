use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::DeviceDriver;
use crate::domain::value_objects::{DeviceId, DeviceKind, DeviceStatus, Trigger};

/// A configured device and the triggers it fires when switched
pub struct Device {
    id: DeviceId,
    name: Option<String>,
    triggers: Vec<Trigger>,
    driver: Arc<dyn DeviceDriver>,
}

impl Device {
    pub fn new(id: DeviceId, driver: Arc<dyn DeviceDriver>) -> Self {
        Self {
            id,
            name: None,
            triggers: Vec::new(),
            driver,
        }
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    pub fn with_triggers(mut self, triggers: Vec<Trigger>) -> Self {
        self.triggers = triggers;
        self
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    pub fn driver(&self) -> &Arc<dyn DeviceDriver> {
        &self.driver
    }

    /// `name (id)` when named, otherwise the bare id
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("{} ({})", name, self.id.id()),
            None => self.id.id().to_string(),
        }
    }
}

/// All configured devices, keyed by typed id
#[derive(Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<DeviceId, Device>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, device: Device) -> Result<()> {
        if self.devices.contains_key(device.id()) {
            return Err(DomainError::InvalidDeviceConfig {
                device: device.id().to_string(),
                reason: "registered twice".to_string(),
            });
        }
        self.devices.insert(device.id().clone(), device);
        Ok(())
    }

    pub fn get(&self, id: &DeviceId) -> Result<&Device> {
        self.devices
            .get(id)
            .ok_or_else(|| DomainError::UnknownDevice(id.clone()))
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.devices.contains_key(id)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn of_kind(&self, kind: DeviceKind) -> impl Iterator<Item = &Device> {
        self.devices.values().filter(move |device| device.id().kind() == kind)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Every trigger must point at a registered device
    pub fn validate_triggers(&self) -> Result<()> {
        for device in self.devices.values() {
            for trigger in device.triggers() {
                if !self.contains(trigger.target()) {
                    return Err(DomainError::InvalidDeviceConfig {
                        device: device.id().to_string(),
                        reason: format!("trigger '{}' targets an unknown device", trigger),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn trigger_graph(&self) -> BTreeMap<DeviceId, Vec<Trigger>> {
        self.devices
            .iter()
            .map(|(id, device)| (id.clone(), device.triggers.clone()))
            .collect()
    }

    pub async fn read(&self, id: &DeviceId) -> Result<DeviceStatus> {
        self.get(id)?.driver.read_state().await
    }

    /// Switch one device without running its triggers
    pub async fn apply(&self, id: &DeviceId, on: bool) -> Result<()> {
        let device = self.get(id)?;
        device.driver.set_state(on).await?;

        tracing::info!(
            device = %id,
            "[{}] {} turned {}",
            id.kind().label(),
            device.label(),
            if on { "on" } else { "off" }
        );
        Ok(())
    }
}

/// Last state seen for each device, whether switched here or observed by polling
#[derive(Debug, Default)]
pub struct ObservedStates {
    states: Mutex<HashMap<DeviceId, bool>>,
}

impl ObservedStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `state`, returning the previous value
    pub fn record(&self, id: &DeviceId, state: bool) -> Option<bool> {
        self.states.lock().insert(id.clone(), state)
    }

    pub fn get(&self, id: &DeviceId) -> Option<bool> {
        self.states.lock().get(id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct Switch(AtomicBool);

    #[async_trait]
    impl DeviceDriver for Switch {
        async fn read_state(&self) -> Result<DeviceStatus> {
            Ok(DeviceStatus::switched(self.0.load(Ordering::SeqCst)))
        }

        async fn set_state(&self, on: bool) -> Result<()> {
            self.0.store(on, Ordering::SeqCst);
            Ok(())
        }
    }

    fn device(id: DeviceId) -> Device {
        Device::new(id, Arc::new(Switch::default()))
    }

    #[test]
    fn test_rejects_duplicates() {
        let mut registry = DeviceRegistry::new();
        registry.register(device(DeviceId::psu("1"))).unwrap();
        assert!(registry.register(device(DeviceId::psu("1"))).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_validate_triggers() {
        let mut registry = DeviceRegistry::new();
        registry
            .register(device(DeviceId::psu("1")).with_triggers(vec!["light:1".parse().unwrap()]))
            .unwrap();
        assert!(registry.validate_triggers().is_err());

        registry.register(device(DeviceId::light("1"))).unwrap();
        assert!(registry.validate_triggers().is_ok());
    }

    #[test]
    fn test_label() {
        let named = device(DeviceId::light("2")).with_name(Some("Desk".to_string()));
        assert_eq!(named.label(), "Desk (2)");
        assert_eq!(device(DeviceId::light("3")).label(), "3");
    }

    #[test]
    fn test_of_kind_is_ordered() {
        let mut registry = DeviceRegistry::new();
        registry.register(device(DeviceId::light("b"))).unwrap();
        registry.register(device(DeviceId::psu("1"))).unwrap();
        registry.register(device(DeviceId::light("a"))).unwrap();

        let ids: Vec<_> = registry
            .of_kind(DeviceKind::Light)
            .map(|d| d.id().id().to_string())
            .collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[tokio::test]
    async fn test_apply_and_read() {
        let mut registry = DeviceRegistry::new();
        registry.register(device(DeviceId::psu("1"))).unwrap();

        registry.apply(&DeviceId::psu("1"), true).await.unwrap();
        assert!(registry.read(&DeviceId::psu("1")).await.unwrap().state);

        let err = registry.apply(&DeviceId::psu("9"), true).await.unwrap_err();
        assert!(matches!(err, DomainError::UnknownDevice(_)));
    }

    #[test]
    fn test_observed_states() {
        let observed = ObservedStates::new();
        assert_eq!(observed.record(&DeviceId::psu("1"), true), None);
        assert_eq!(observed.record(&DeviceId::psu("1"), false), Some(true));
        assert_eq!(observed.get(&DeviceId::psu("1")), Some(false));
    }
}
