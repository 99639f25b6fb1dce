//! Prelude module for common re-exports.
//!
//! ```rust
//! use limb_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig, load_robot_config};
pub use crate::hal::config::{
    AcceptancePolicy, AdcBusConfig, JointConfig, LatchBusConfig, MotorConfig, MotorSelect,
    MuscleConfig, PotentiometerConfig, PressureRegulatorConfig, RobotConfig, StopPolicy,
    ValveConfig,
};

// ─── Hardware ───────────────────────────────────────────────────────
pub use crate::hal::error::HalError;
pub use crate::hal::io::{BusHandle, HardwareIO, Pin, PinMode};

// ─── Constants ──────────────────────────────────────────────────────
pub use crate::consts::{CHANNEL_MAP, POWER_DOWN_BITS, PWM_RANGE};
