//! # Limb HAL Library
//!
//! Hardware Abstraction Layer for the limb robot's pressure regulator,
//! multiplexed potentiometers and latch-addressed motors.
//!
//! Devices never touch the platform directly: they call the injected
//! `HardwareIO` (from `limb_common::hal::io`) and share physical buses
//! through a `BusRegistry` passed to their constructors.
//!
//! # Module Structure
//!
//! - [`bus_registry`] - Shared ADC buses and motor latch banks
//! - [`devices`] - Regulator, potentiometer, motor, valve, muscle, joint
//! - [`driver_registry`] - `HardwareIO` backend factory registration
//! - [`drivers`] - Simulation and recording backends
//! - [`rig`] - Device assembly from `RobotConfig` and the control loop
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     limb_hal (single crate)                      │
//! │  ┌─────────────┐    ┌──────────────┐    ┌─────────────────────┐  │
//! │  │ RobotConfig │───►│     Rig      │◄───│  Driver Registry    │  │
//! │  │(limb_common)│    │ (cycle loop) │    │                     │  │
//! │  └─────────────┘    └──────┬───────┘    └─────────────────────┘  │
//! │                            │                                     │
//! │               ┌────────────┴────────────┐                        │
//! │               ▼                         ▼                        │
//! │      ┌────────────────┐        ┌────────────────┐                │
//! │      │    devices     │───────►│  BusRegistry   │                │
//! │      └───────┬────────┘        └───────┬────────┘                │
//! │              └────────────┬────────────┘                         │
//! │                           ▼                                      │
//! │                  ┌────────────────┐                              │
//! │                  │  HardwareIO    │ (trait object)               │
//! │                  └────────────────┘                              │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod bus_registry;
pub mod devices;
pub mod driver_registry;
pub mod drivers;
pub mod rig;

// Re-export key types for convenience
pub use crate::bus_registry::{AdcBus, BusRegistry, LatchBus};
pub use crate::driver_registry::DriverRegistry;
pub use crate::rig::{Rig, RigStatus};
