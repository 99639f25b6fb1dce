//! `HardwareIO` backends.
//!
//! - [`simulation`] - In-memory backend for development without the robot
//! - [`recording`] - Call recorder with scripted responses, used by tests.
//!   Constructed directly, never registered by name.
//!
//! # Adding New Backends
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement `HardwareIO` from `limb_common::hal::io`
//! 3. Register a factory in [`register_all_drivers`]

pub mod recording;
pub mod simulation;

use crate::driver_registry::DriverRegistry;

/// Register every built-in backend the binary can select by name.
pub fn register_all_drivers(registry: &mut DriverRegistry) {
    registry.register("simulation", simulation::create_driver);
}
