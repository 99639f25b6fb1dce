//! Solenoid valves.

use limb_common::hal::config::ValveConfig;
use limb_common::hal::error::HalError;
use limb_common::hal::io::{HardwareIO, Pin, PinMode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// One valve on one digital output. The state is the last commanded level.
pub struct Valve {
    name: String,
    pin: Pin,
    io: Arc<dyn HardwareIO>,
    open: AtomicBool,
    // Serializes read-modify-write in `toggle`.
    lock: Mutex<()>,
}

impl Valve {
    /// Configure the pin as an output and close the valve.
    pub fn new(config: &ValveConfig, io: Arc<dyn HardwareIO>) -> Result<Self, HalError> {
        io.set_mode(config.pin, PinMode::Output)?;
        io.write(config.pin, false)?;
        info!("Valve '{}' on pin {}", config.name, config.pin);
        Ok(Self {
            name: config.name.clone(),
            pin: config.pin,
            io,
            open: AtomicBool::new(false),
            lock: Mutex::new(()),
        })
    }

    /// Open the valve.
    pub fn open(&self) -> Result<(), HalError> {
        self.set(true)
    }

    /// Close the valve.
    pub fn close(&self) -> Result<(), HalError> {
        self.set(false)
    }

    /// Command the valve open or closed.
    pub fn set(&self, open: bool) -> Result<(), HalError> {
        let _guard = self.lock.lock()?;
        self.write(open)
    }

    /// Flip the valve; returns the new state.
    pub fn toggle(&self) -> Result<bool, HalError> {
        let _guard = self.lock.lock()?;
        let open = !self.open.load(Ordering::SeqCst);
        self.write(open)?;
        Ok(open)
    }

    /// Last commanded state.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Valve name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn write(&self, open: bool) -> Result<(), HalError> {
        self.io.write(self.pin, open)?;
        self.open.store(open, Ordering::SeqCst);
        debug!("Valve '{}' {}", self.name, if open { "open" } else { "closed" });
        Ok(())
    }
}
