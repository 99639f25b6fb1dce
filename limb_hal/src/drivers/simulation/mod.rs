//! Simulation driver module.
//!
//! This module provides a software `HardwareIO` backend for development and
//! testing without the robot attached.

mod adc;
mod io;

pub use adc::{ADC_CHANNELS, SimulatedAdc};
pub use io::SimulatedIo;

use limb_common::hal::io::HardwareIO;
use std::sync::Arc;

/// Factory function to create a simulation backend instance.
pub fn create_driver() -> Arc<dyn HardwareIO> {
    Arc::new(SimulatedIo::new())
}
