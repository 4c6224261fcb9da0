//! [`DeviceRegistry`] – name-to-driver lookup for bound stepper devices.
//!
//! Commands never keep a device around: they resolve it by name with
//! [`DeviceRegistry::get`], use the borrowed handle for one invocation and
//! let it go.  [`DeviceRegistry::device_names`] feeds shell tab completion.

use std::collections::BTreeMap;

use stepctl_types::StepperError;
use tracing::debug;

use crate::stepper::Stepper;

/// Registry of bound stepper drivers, keyed by device name.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<String, Box<dyn Stepper>>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a driver under its own name.  Any previously registered driver
    /// with the same name is replaced.
    pub fn register(&mut self, device: Box<dyn Stepper>) {
        debug!(device = device.name(), "registering stepper");
        self.devices.insert(device.name().to_string(), device);
    }

    /// Resolve `name` to a borrowed driver handle.
    ///
    /// # Errors
    ///
    /// Returns [`StepperError::DeviceNotFound`] when nothing is bound under
    /// `name`.
    pub fn get(&self, name: &str) -> Result<&dyn Stepper, StepperError> {
        self.devices
            .get(name)
            .map(|device| device.as_ref())
            .ok_or_else(|| StepperError::DeviceNotFound(name.to_string()))
    }

    /// Names of all bound devices in sorted order.  The iterator borrows the
    /// registry and can be restarted by calling this again (or cloning it).
    pub fn device_names(&self) -> impl Iterator<Item = &str> + Clone + '_ {
        self.devices.keys().map(String::as_str)
    }

    /// Iterate over every bound driver.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Stepper> + '_ {
        self.devices.values().map(|device| device.as_ref())
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimStepper;

    #[test]
    fn get_resolves_registered_device() {
        let mut registry = DeviceRegistry::new();
        registry.register(SimStepper::new("x_axis"));

        let device = registry.get("x_axis").unwrap();
        assert_eq!(device.name(), "x_axis");
    }

    #[test]
    fn get_missing_device_returns_not_found() {
        let registry = DeviceRegistry::new();
        let err = registry.get("ghost").err().unwrap();
        assert_eq!(err, StepperError::DeviceNotFound("ghost".to_string()));
    }

    #[test]
    fn device_names_are_sorted_and_restartable() {
        let mut registry = DeviceRegistry::new();
        registry.register(SimStepper::new("z_axis"));
        registry.register(SimStepper::new("x_axis"));
        registry.register(SimStepper::new("y_axis"));

        let names = registry.device_names();
        let first: Vec<&str> = names.clone().collect();
        let second: Vec<&str> = names.collect();
        assert_eq!(first, vec!["x_axis", "y_axis", "z_axis"]);
        assert_eq!(first, second);
    }

    #[test]
    fn re_registering_replaces_old_driver() {
        let mut registry = DeviceRegistry::new();
        registry.register(SimStepper::new("x_axis"));
        registry
            .get("x_axis")
            .unwrap()
            .set_actual_position(42)
            .unwrap();

        registry.register(SimStepper::new("x_axis"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("x_axis").unwrap().actual_position().unwrap(), 0);
    }
}
