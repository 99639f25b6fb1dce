//! DC motors on the address-latched actuation bus.
//!
//! A latched motor shares its address, latch-enable and direction lines with
//! every other motor on the bank. `run` commits the motor's address and
//! direction into the latch and then sets its PWM duty, all under the bank's
//! lock, so the lines describe exactly one motor when the latch is strobed.
//! A direct motor owns its direction pin and only serializes against itself.
//!
//! The recorded direction and duty are updated while the same lock is held,
//! so `duty()` always names what was last put on the wire.

use crate::bus_registry::{BusRegistry, LatchBus};
use limb_common::consts::{LATCH_SLOTS, PWM_RANGE};
use limb_common::hal::config::{MotorConfig, MotorSelect, StopPolicy};
use limb_common::hal::error::HalError;
use limb_common::hal::io::{HardwareIO, Pin, PinMode};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use tracing::{debug, info};

enum Drive {
    Latched { bus: Arc<LatchBus>, address: u8 },
    Direct {
        direction_pin: Pin,
        clockwise_level: bool,
        lock: Mutex<()>,
    },
}

/// One motor driver.
pub struct Motor {
    name: String,
    pwm_pin: Pin,
    drive: Drive,
    stop_policy: StopPolicy,
    io: Arc<dyn HardwareIO>,
    last_clockwise: AtomicBool,
    duty: AtomicU8,
}

impl Motor {
    /// Configure the PWM line (mode and carrier frequency, once) and bind
    /// the motor to its latch bank or direction pin.
    ///
    /// # Errors
    /// `ConfigError` if the latch bank is not registered,
    /// `HardwareIoFailure` if the pins cannot be configured.
    pub fn new(config: &MotorConfig, registry: &BusRegistry) -> Result<Self, HalError> {
        let io = Arc::clone(registry.io());

        let drive = match config.select {
            MotorSelect::Latch { bus, address } => Drive::Latched {
                bus: registry.latch_bus(bus)?,
                address,
            },
            MotorSelect::Direct {
                direction_pin,
                clockwise_level,
            } => {
                io.set_mode(direction_pin, PinMode::Output)?;
                Drive::Direct {
                    direction_pin,
                    clockwise_level,
                    lock: Mutex::new(()),
                }
            }
        };

        io.set_mode(config.pwm_pin, PinMode::Output)?;
        io.set_pwm_frequency(config.pwm_pin, config.pwm_frequency_hz)?;

        info!(
            "Motor '{}': pwm pin {} at {} Hz, {:?}",
            config.name, config.pwm_pin, config.pwm_frequency_hz, config.select
        );
        Ok(Self {
            name: config.name.clone(),
            pwm_pin: config.pwm_pin,
            drive,
            stop_policy: config.stop_policy,
            io,
            last_clockwise: AtomicBool::new(false),
            duty: AtomicU8::new(0),
        })
    }

    /// Drive the motor at `speed` (0..=255) in the given direction.
    ///
    /// # Errors
    /// `InvalidArgument` for a speed outside 0..=255 or a latch address that
    /// does not fit in three bits; nothing is written in either case.
    /// `HardwareIoFailure` from the backend.
    pub fn run(&self, clockwise: bool, speed: i32) -> Result<(), HalError> {
        let duty = duty_from_speed(speed)?;

        match &self.drive {
            Drive::Latched { bus, address } => {
                let address = checked_address(*address)?;
                let latch = bus.lock()?;
                latch.select(address, clockwise)?;
                latch.set_duty(self.pwm_pin, duty)?;
                self.record(clockwise, duty);
            }
            Drive::Direct {
                direction_pin,
                clockwise_level,
                lock,
            } => {
                let _held = lock.lock()?;
                let level = if clockwise {
                    *clockwise_level
                } else {
                    !*clockwise_level
                };
                self.io.write(*direction_pin, level)?;
                self.io.set_duty(self.pwm_pin, duty)?;
                self.record(clockwise, duty);
            }
        }

        debug!("Motor '{}': run clockwise={} duty={}", self.name, clockwise, duty);
        Ok(())
    }

    /// Zero the motor's PWM duty.
    ///
    /// Under `StopPolicy::Reselect` a latched motor first re-selects its own
    /// slot (with its last direction) so a PWM line shared across slots
    /// stops this motor and not whichever one was selected last.
    pub fn stop(&self) -> Result<(), HalError> {
        match &self.drive {
            Drive::Latched { bus, address } => {
                let address = checked_address(*address)?;
                let latch = bus.lock()?;
                if self.stop_policy == StopPolicy::Reselect {
                    latch.select(address, self.last_clockwise.load(Ordering::SeqCst))?;
                }
                latch.set_duty(self.pwm_pin, 0)?;
                self.duty.store(0, Ordering::SeqCst);
            }
            Drive::Direct { lock, .. } => {
                let _held = lock.lock()?;
                self.io.set_duty(self.pwm_pin, 0)?;
                self.duty.store(0, Ordering::SeqCst);
            }
        }

        debug!("Motor '{}': stopped", self.name);
        Ok(())
    }

    fn record(&self, clockwise: bool, duty: u8) {
        self.last_clockwise.store(clockwise, Ordering::SeqCst);
        self.duty.store(duty, Ordering::SeqCst);
    }

    /// Motor name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Latch slot, for latched motors.
    pub fn address(&self) -> Option<u8> {
        match self.drive {
            Drive::Latched { address, .. } => Some(address),
            Drive::Direct { .. } => None,
        }
    }

    /// PWM pin.
    pub fn pwm_pin(&self) -> Pin {
        self.pwm_pin
    }

    /// Duty last written by `run` or `stop`.
    pub fn duty(&self) -> u8 {
        self.duty.load(Ordering::SeqCst)
    }

    /// Direction last commanded by `run`.
    pub fn last_clockwise(&self) -> bool {
        self.last_clockwise.load(Ordering::SeqCst)
    }
}

fn duty_from_speed(speed: i32) -> Result<u8, HalError> {
    if !(0..=PWM_RANGE).contains(&speed) {
        return Err(HalError::invalid("speed", speed));
    }
    u8::try_from(speed).map_err(|_| HalError::invalid("speed", speed))
}

fn checked_address(address: u8) -> Result<u8, HalError> {
    if address >= LATCH_SLOTS {
        return Err(HalError::invalid("latch address", address));
    }
    Ok(address)
}
