//! Driver registry for `HardwareIO` backends.
//!
//! Provides a `DriverRegistry` struct for registering and retrieving backend
//! factories. This uses constructor-injection rather than global state.

use limb_common::hal::error::HalError;
use limb_common::hal::io::HardwareIO;
use std::collections::HashMap;
use std::sync::Arc;

/// Factory producing a fresh backend instance.
pub type DriverFactory = fn() -> Arc<dyn HardwareIO>;

/// Registry of available backends.
///
/// Constructed at startup, populated via `register()`, and consulted once to
/// build the `HardwareIO` handed to `Rig`.
pub struct DriverRegistry {
    factories: HashMap<&'static str, DriverFactory>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Create a registry holding every built-in backend.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        crate::drivers::register_all_drivers(&mut registry);
        registry
    }

    /// Register a driver factory.
    ///
    /// # Panics
    /// Panics if a driver with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: DriverFactory) {
        if self.factories.contains_key(name) {
            panic!("Driver '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    /// Get a driver factory by name.
    pub fn get_factory(&self, name: &str) -> Option<DriverFactory> {
        self.factories.get(name).copied()
    }

    /// Create a backend instance by name.
    ///
    /// # Errors
    /// Returns `HalError::DriverNotFound` if no driver with the given name is registered.
    pub fn create_driver(&self, name: &str) -> Result<Arc<dyn HardwareIO>, HalError> {
        let factory = self
            .get_factory(name)
            .ok_or_else(|| HalError::DriverNotFound(name.to_string()))?;
        Ok(factory())
    }

    /// List all registered driver names, sorted.
    pub fn list_drivers(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use limb_common::hal::io::{BusHandle, Pin, PinMode};

    struct NullIo;

    impl HardwareIO for NullIo {
        fn name(&self) -> &'static str {
            "null"
        }
        fn set_mode(&self, _: Pin, _: PinMode) -> Result<(), HalError> {
            Ok(())
        }
        fn write(&self, _: Pin, _: bool) -> Result<(), HalError> {
            Ok(())
        }
        fn read(&self, _: Pin) -> Result<bool, HalError> {
            Ok(false)
        }
        fn set_pwm_frequency(&self, _: Pin, _: u32) -> Result<(), HalError> {
            Ok(())
        }
        fn set_duty(&self, _: Pin, _: u8) -> Result<(), HalError> {
            Ok(())
        }
        fn read_raw(&self, _: Pin) -> Result<u32, HalError> {
            Ok(0)
        }
        fn open_bus(&self, _: u8, _: u16) -> Result<BusHandle, HalError> {
            Ok(BusHandle(0))
        }
        fn write_byte(&self, _: BusHandle, _: u8) -> Result<(), HalError> {
            Ok(())
        }
        fn read_bytes(&self, _: BusHandle, len: usize) -> Result<Vec<u8>, HalError> {
            Ok(vec![0; len])
        }
    }

    fn create_null_driver() -> Arc<dyn HardwareIO> {
        Arc::new(NullIo)
    }

    #[test]
    fn registry_register_and_create() {
        let mut reg = DriverRegistry::new();
        reg.register("null", create_null_driver);

        let driver = reg.create_driver("null").expect("should create");
        assert_eq!(driver.name(), "null");
    }

    #[test]
    fn registry_driver_not_found() {
        let reg = DriverRegistry::new();
        let result = reg.create_driver("pigpio");
        assert!(matches!(result, Err(HalError::DriverNotFound(_))));
    }

    #[test]
    fn registry_list_drivers() {
        let mut reg = DriverRegistry::new();
        reg.register("beta", create_null_driver);
        reg.register("alpha", create_null_driver);
        assert_eq!(reg.list_drivers(), vec!["alpha", "beta"]);
    }

    #[test]
    fn builtin_drivers_are_registered() {
        let reg = DriverRegistry::with_builtin();
        assert_eq!(reg.list_drivers(), vec!["simulation"]);
        assert!(matches!(
            reg.create_driver("recording"),
            Err(HalError::DriverNotFound(_))
        ));
        assert_eq!(reg.create_driver("simulation").unwrap().name(), "simulation");
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn registry_duplicate_panics() {
        let mut reg = DriverRegistry::new();
        reg.register("dup", create_null_driver);
        reg.register("dup", create_null_driver);
    }
}
