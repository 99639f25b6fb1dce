//! Hardware capability consumed by every limb device.
//!
//! `HardwareIO` is the seam between the bus protocols implemented in
//! `limb_hal` and the platform that actually toggles pins: a GPIO daemon on
//! the robot, the in-memory simulation, or a recording mock in tests.
//! Implementations take `&self` and must be safe to call from several
//! threads; serialization of multi-step bus transactions is the caller's job.

use crate::hal::error::HalError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Broadcom-style GPIO number.
pub type Pin = u8;

/// Direction of a digital pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinMode {
    /// High-impedance input.
    Input,
    /// Push-pull output.
    Output,
}

/// Opaque handle to an opened serial-bus device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BusHandle(pub u32);

impl fmt::Display for BusHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Platform pin, PWM, analog and serial-bus primitives.
pub trait HardwareIO: Send + Sync {
    /// Returns the backend's identifier (e.g. "simulation").
    fn name(&self) -> &'static str;

    /// Configure a digital pin as input or output.
    fn set_mode(&self, pin: Pin, mode: PinMode) -> Result<(), HalError>;

    /// Drive a digital output.
    fn write(&self, pin: Pin, level: bool) -> Result<(), HalError>;

    /// Sample a digital input.
    fn read(&self, pin: Pin) -> Result<bool, HalError>;

    /// Set the PWM carrier frequency of a pin.
    fn set_pwm_frequency(&self, pin: Pin, hz: u32) -> Result<(), HalError>;

    /// Set the PWM duty of a pin, 0 (off) ..= 255 (always high).
    fn set_duty(&self, pin: Pin, duty: u8) -> Result<(), HalError>;

    /// Take one raw analog sample, `0 ..= 2^resolution - 1`.
    fn read_raw(&self, pin: Pin) -> Result<u32, HalError>;

    /// Open a device on a serial bus.
    fn open_bus(&self, bus: u8, address: u16) -> Result<BusHandle, HalError>;

    /// Send one byte to an opened device.
    fn write_byte(&self, handle: BusHandle, byte: u8) -> Result<(), HalError>;

    /// Read up to `len` bytes from an opened device.
    fn read_bytes(&self, handle: BusHandle, len: usize) -> Result<Vec<u8>, HalError>;
}
