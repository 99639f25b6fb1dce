//! Device drivers built on `HardwareIO` and the shared buses.
//!
//! - [`pressure`] - Pressure regulator (sensor + compressor)
//! - [`potentiometer`] - ADC-multiplexed rotary potentiometers
//! - [`motor`] - Latch-addressed and direct DC motors
//! - [`valve`] - Solenoid valves
//! - [`muscle`] - Pneumatic muscles gated by a pressure check
//! - [`joint`] - Motor + potentiometer position control

pub mod joint;
pub mod motor;
pub mod muscle;
pub mod potentiometer;
pub mod pressure;
pub mod valve;

pub use joint::JointController;
pub use motor::Motor;
pub use muscle::Muscle;
pub use potentiometer::{PotentiometerChannel, command_byte};
pub use pressure::{PressureReading, PressureRegulator};
pub use valve::Valve;
