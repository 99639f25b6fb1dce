//! HAL configuration types.
//!
//! This module contains configuration types for the limb devices:
//! - `RobotConfig` - Main configuration loaded from robot.toml
//! - `AdcBusConfig` / `LatchBusConfig` - Shared physical buses
//! - `PressureRegulatorConfig`, `PotentiometerConfig`, `MotorConfig` - Core devices
//! - `ValveConfig`, `MuscleConfig`, `JointConfig` - Composite devices
//!
//! Every device config is immutable once a device has been built from it.

use crate::config::SharedConfig;
use crate::consts::{
    ADC_I2C_ADDR, ADC_RESOLUTION_BITS, DEFAULT_CYCLE_TIME_MS, DEFAULT_REFERENCE_VOLTAGE,
    LATCH_ADDRESS_PINS, LATCH_SLOTS, PIN_LATCH_EN, PIN_MOTOR_DIR, POT_MAX_ROTATION_DEG,
    PWM_FREQUENCY_HZ,
};
use crate::hal::error::HalError;
use crate::hal::io::Pin;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

fn default_cycle_time_ms() -> u64 {
    DEFAULT_CYCLE_TIME_MS
}

fn default_driver() -> String {
    "simulation".to_string()
}

fn default_adc_address() -> u16 {
    ADC_I2C_ADDR
}

fn default_address_pins() -> [Pin; 3] {
    LATCH_ADDRESS_PINS
}

fn default_latch_enable_pin() -> Pin {
    PIN_LATCH_EN
}

fn default_direction_pin() -> Pin {
    PIN_MOTOR_DIR
}

fn default_pressure_resolution() -> u8 {
    10
}

fn default_adc_resolution() -> u8 {
    ADC_RESOLUTION_BITS
}

fn default_reference_voltage() -> f64 {
    DEFAULT_REFERENCE_VOLTAGE
}

fn default_max_rotation() -> f64 {
    POT_MAX_ROTATION_DEG
}

fn default_pwm_frequency() -> u32 {
    PWM_FREQUENCY_HZ
}

fn default_tolerance_deg() -> f64 {
    2.0
}

fn default_poll_interval_ms() -> u64 {
    10
}

fn default_timeout_ms() -> u64 {
    5000
}

// ─── Buses ──────────────────────────────────────────────────────────

/// One I2C-style bus carrying an ADS7828-class ADC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdcBusConfig {
    /// Bus number as known to the platform (e.g. 1 for `/dev/i2c-1`).
    pub id: u8,
    /// Device address of the ADC on that bus.
    #[serde(default = "default_adc_address")]
    pub address: u16,
}

/// Address-latched motor bank: three address lines, a latch enable and a
/// direction line shared by up to eight motor drivers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LatchBusConfig {
    /// Bank identifier referenced by `MotorSelect::Latch`.
    pub id: u8,
    /// Address-select pins, index 0 = least significant bit.
    #[serde(default = "default_address_pins")]
    pub address_pins: [Pin; 3],
    /// Latch-enable pin (active low, commits on the rising edge).
    #[serde(default = "default_latch_enable_pin")]
    pub latch_enable_pin: Pin,
    /// Shared direction data pin.
    #[serde(default = "default_direction_pin")]
    pub direction_pin: Pin,
    /// Level written to the direction pin for clockwise rotation.
    /// Hardware calibration fact; deliberately has no default.
    pub clockwise_level: bool,
}

impl LatchBusConfig {
    /// Every line the bank drives, in wiring order.
    pub fn pins(&self) -> [Pin; 5] {
        [
            self.address_pins[0],
            self.address_pins[1],
            self.address_pins[2],
            self.latch_enable_pin,
            self.direction_pin,
        ]
    }

    fn validate(&self) -> Result<(), HalError> {
        let mut seen = HashSet::new();
        for pin in self.pins() {
            if !seen.insert(pin) {
                return Err(HalError::ConfigError(format!(
                    "Latch bus {}: pin {} used twice",
                    self.id, pin
                )));
            }
        }
        Ok(())
    }
}

// ─── Pressure regulator ─────────────────────────────────────────────

/// How `pressure_ok()` judges a fresh reading.
///
/// Both policies exist on the robot's history; which one applies is a
/// calibration decision, so the config must name one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case", deny_unknown_fields)]
pub enum AcceptancePolicy {
    /// Accept when `reading >= ideal_pressure - tolerance`.
    OneSided {
        /// Allowed shortfall below the ideal pressure (PSI).
        tolerance: f64,
    },
    /// Accept when `lower <= reading <= upper`.
    /// Missing bounds fall back to the sensor's `p_min` / `p_max`.
    Range {
        /// Lower bound (PSI).
        #[serde(default)]
        lower: Option<f64>,
        /// Upper bound (PSI).
        #[serde(default)]
        upper: Option<f64>,
    },
}

/// Pressure sensor + compressor pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PressureRegulatorConfig {
    /// Unique regulator name.
    pub name: String,
    /// Analog input wired to the pressure transducer.
    pub sensor_pin: Pin,
    /// Digital output switching the compressor.
    pub compressor_pin: Pin,
    /// Sensor ADC resolution in bits.
    #[serde(default = "default_pressure_resolution")]
    pub resolution_bits: u8,
    /// Target pressure; the compressor runs while below it (PSI).
    pub ideal_pressure: f64,
    /// Acceptability policy for `pressure_ok()`.
    pub acceptance: AcceptancePolicy,
    /// Pressure at `min_voltage` (PSI).
    pub p_min: f64,
    /// Pressure at `max_voltage` (PSI).
    pub p_max: f64,
    /// Sensor output at `p_min` (V).
    pub min_voltage: f64,
    /// Sensor output at `p_max` (V).
    pub max_voltage: f64,
    /// ADC full-scale voltage (V).
    #[serde(default = "default_reference_voltage")]
    pub reference_voltage: f64,
}

impl PressureRegulatorConfig {
    /// Number of distinct raw codes, `2^resolution_bits`.
    pub fn full_scale(&self) -> f64 {
        f64::from(1u32 << self.resolution_bits)
    }

    /// Convert a raw sample to sensor volts.
    pub fn voltage_from_raw(&self, raw: u32) -> f64 {
        f64::from(raw) / self.full_scale() * self.reference_voltage
    }

    /// Map sensor volts onto `[p_min, p_max]`, clamping outside the
    /// calibrated window.
    pub fn pressure_from_voltage(&self, volts: f64) -> f64 {
        let span = self.max_voltage - self.min_voltage;
        let n = ((volts - self.min_voltage) / span).clamp(0.0, 1.0);
        self.p_min + n * (self.p_max - self.p_min)
    }

    /// Convert a raw sample straight to PSI.
    pub fn pressure_from_raw(&self, raw: u32) -> f64 {
        self.pressure_from_voltage(self.voltage_from_raw(raw))
    }

    /// Evaluate the acceptance policy against a reading.
    pub fn accepts(&self, psi: f64) -> bool {
        match self.acceptance {
            AcceptancePolicy::OneSided { tolerance } => psi >= self.ideal_pressure - tolerance,
            AcceptancePolicy::Range { lower, upper } => {
                let lower = lower.unwrap_or(self.p_min);
                let upper = upper.unwrap_or(self.p_max);
                (lower..=upper).contains(&psi)
            }
        }
    }

    /// Validate calibration values.
    ///
    /// # Validation Rules
    /// 1. `1 <= resolution_bits <= 16`
    /// 2. `p_max > p_min`
    /// 3. `max_voltage > min_voltage >= 0`
    /// 4. `reference_voltage > 0`
    /// 5. Policy bounds are ordered, tolerance is non-negative
    pub fn validate(&self) -> Result<(), HalError> {
        let err = |msg: String| HalError::ConfigError(format!("Regulator '{}': {msg}", self.name));

        if self.resolution_bits == 0 || self.resolution_bits > 16 {
            return Err(err(format!(
                "resolution_bits must be 1..=16, got {}",
                self.resolution_bits
            )));
        }
        let calibration = [
            ("ideal_pressure", self.ideal_pressure),
            ("p_min", self.p_min),
            ("p_max", self.p_max),
            ("min_voltage", self.min_voltage),
            ("max_voltage", self.max_voltage),
            ("reference_voltage", self.reference_voltage),
        ];
        let bounds = match self.acceptance {
            AcceptancePolicy::OneSided { tolerance } => vec![("tolerance", Some(tolerance))],
            AcceptancePolicy::Range { lower, upper } => vec![("lower", lower), ("upper", upper)],
        };
        let values = calibration
            .into_iter()
            .chain(bounds.into_iter().filter_map(|(what, v)| v.map(|v| (what, v))));
        for (what, value) in values {
            if !value.is_finite() {
                return Err(err(format!("{what} must be finite, got {value}")));
            }
        }
        if self.p_max <= self.p_min {
            return Err(err(format!(
                "p_max ({}) must exceed p_min ({})",
                self.p_max, self.p_min
            )));
        }
        if self.min_voltage < 0.0 || self.max_voltage <= self.min_voltage {
            return Err(err(format!(
                "voltage window [{}, {}] is invalid",
                self.min_voltage, self.max_voltage
            )));
        }
        if self.reference_voltage <= 0.0 {
            return Err(err("reference_voltage must be positive".to_string()));
        }
        match self.acceptance {
            AcceptancePolicy::OneSided { tolerance } if tolerance < 0.0 => {
                Err(err("tolerance must not be negative".to_string()))
            }
            AcceptancePolicy::Range { lower, upper }
                if lower.unwrap_or(self.p_min) > upper.unwrap_or(self.p_max) =>
            {
                Err(err("acceptance range is inverted".to_string()))
            }
            _ => Ok(()),
        }
    }
}

// ─── Potentiometer ──────────────────────────────────────────────────

/// Rotary potentiometer on one ADC channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PotentiometerConfig {
    /// Unique potentiometer name.
    pub name: String,
    /// ADC bus id (must match an `AdcBusConfig`).
    pub bus: u8,
    /// ADC input channel, 0..=7 (POT0..POT7 on the board).
    pub channel: u8,
    /// ADC resolution in bits.
    #[serde(default = "default_adc_resolution")]
    pub resolution_bits: u8,
    /// Mechanical range in degrees.
    #[serde(default = "default_max_rotation")]
    pub max_rotation_deg: f64,
}

// ─── Motor ──────────────────────────────────────────────────────────

/// How a motor's direction is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum MotorSelect {
    /// Driver sits behind a shared latch; direction is committed by strobing
    /// the latch at `address`.
    Latch {
        /// Latch bank id (must match a `LatchBusConfig`).
        bus: u8,
        /// 3-bit slot on that latch.
        address: u8,
    },
    /// Driver has its own direction pin.
    Direct {
        /// Direction pin of this motor.
        direction_pin: Pin,
        /// Level written for clockwise rotation.
        clockwise_level: bool,
    },
}

/// What `stop()` does on a latched motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopPolicy {
    /// Re-select the motor's own latch slot before zeroing PWM, so a shared
    /// PWM line never stops another motor.
    #[default]
    Reselect,
    /// Only zero the PWM line.
    PwmOnly,
}

/// One DC motor driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MotorConfig {
    /// Unique motor name.
    pub name: String,
    /// PWM (speed) pin.
    pub pwm_pin: Pin,
    /// PWM carrier frequency, set once at construction.
    #[serde(default = "default_pwm_frequency")]
    pub pwm_frequency_hz: u32,
    /// Direction selection.
    pub select: MotorSelect,
    /// Behaviour of `stop()` on a latched motor.
    #[serde(default)]
    pub stop_policy: StopPolicy,
}

// ─── Composites ─────────────────────────────────────────────────────

/// Solenoid valve on one digital output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValveConfig {
    /// Unique valve name.
    pub name: String,
    /// Output pin.
    pub pin: Pin,
}

/// Pneumatic muscle: a valve gated by a regulator's pressure check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MuscleConfig {
    /// Unique muscle name.
    pub name: String,
    /// Name of the valve feeding the muscle.
    pub valve: String,
    /// Name of the regulator supplying it.
    pub regulator: String,
}

/// Joint driven by a motor and measured by a potentiometer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JointConfig {
    /// Unique joint name.
    pub name: String,
    /// Name of the driving motor.
    pub motor: String,
    /// Name of the measuring potentiometer.
    pub potentiometer: String,
    /// Angle accepted as "on target".
    #[serde(default = "default_tolerance_deg")]
    pub tolerance_deg: f64,
    /// Potentiometer poll period while moving.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Give up and stop after this long.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Set when clockwise motor rotation increases the measured angle.
    #[serde(default)]
    pub invert: bool,
}

// ─── Robot ──────────────────────────────────────────────────────────

/// Main configuration loaded from `robot.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RobotConfig {
    /// Service name and log level.
    pub shared: SharedConfig,

    /// Control step period in milliseconds.
    #[serde(default = "default_cycle_time_ms")]
    pub cycle_time_ms: u64,

    /// `HardwareIO` backend to load.
    #[serde(default = "default_driver")]
    pub driver: String,

    /// ADC buses.
    #[serde(default)]
    pub adc_buses: Vec<AdcBusConfig>,

    /// Motor latch banks.
    #[serde(default)]
    pub latch_buses: Vec<LatchBusConfig>,

    /// Pressure regulators.
    #[serde(default)]
    pub regulators: Vec<PressureRegulatorConfig>,

    /// Potentiometers.
    #[serde(default)]
    pub potentiometers: Vec<PotentiometerConfig>,

    /// Motors.
    #[serde(default)]
    pub motors: Vec<MotorConfig>,

    /// Valves.
    #[serde(default)]
    pub valves: Vec<ValveConfig>,

    /// Muscles.
    #[serde(default)]
    pub muscles: Vec<MuscleConfig>,

    /// Joints.
    #[serde(default)]
    pub joints: Vec<JointConfig>,
}

impl RobotConfig {
    /// Validate the robot configuration.
    ///
    /// # Validation Rules
    /// 1. `cycle_time_ms` > 0
    /// 2. Bus ids unique per bus kind, device names unique per kind
    /// 3. Every regulator passes `PressureRegulatorConfig::validate`
    /// 4. Potentiometers reference a known ADC bus, channel 0..=7
    /// 5. Latched motors reference a known latch bus, address 0..=7,
    ///    no two motors on the same slot
    /// 6. Muscles and joints reference known devices
    pub fn validate(&self) -> Result<(), HalError> {
        if self.cycle_time_ms == 0 {
            return Err(HalError::ConfigError(
                "cycle_time_ms must be greater than 0".to_string(),
            ));
        }
        if self.driver.is_empty() {
            return Err(HalError::ConfigError("driver cannot be empty".to_string()));
        }
        self.shared.validate()?;

        let adc_ids = unique("ADC bus id", self.adc_buses.iter().map(|b| b.id))?;
        let latch_ids = unique("latch bus id", self.latch_buses.iter().map(|b| b.id))?;
        let regulators = unique("regulator", self.regulators.iter().map(|r| r.name.as_str()))?;
        let pots = unique(
            "potentiometer",
            self.potentiometers.iter().map(|p| p.name.as_str()),
        )?;
        let motors = unique("motor", self.motors.iter().map(|m| m.name.as_str()))?;
        let valves = unique("valve", self.valves.iter().map(|v| v.name.as_str()))?;
        unique("muscle", self.muscles.iter().map(|m| m.name.as_str()))?;
        unique("joint", self.joints.iter().map(|j| j.name.as_str()))?;

        for bus in &self.latch_buses {
            bus.validate()?;
        }

        for regulator in &self.regulators {
            regulator.validate()?;
        }

        for pot in &self.potentiometers {
            if !adc_ids.contains(&pot.bus) {
                return Err(HalError::ConfigError(format!(
                    "Potentiometer '{}' references unknown ADC bus {}",
                    pot.name, pot.bus
                )));
            }
            if pot.channel >= 8 {
                return Err(HalError::ConfigError(format!(
                    "Potentiometer '{}': channel {} must be 0..=7",
                    pot.name, pot.channel
                )));
            }
            if pot.resolution_bits == 0 || pot.resolution_bits > 16 {
                return Err(HalError::ConfigError(format!(
                    "Potentiometer '{}': resolution_bits must be 1..=16",
                    pot.name
                )));
            }
            if !(pot.max_rotation_deg > 0.0 && pot.max_rotation_deg.is_finite()) {
                return Err(HalError::ConfigError(format!(
                    "Potentiometer '{}': max_rotation_deg must be positive",
                    pot.name
                )));
            }
        }

        let mut slots = HashSet::new();
        for motor in &self.motors {
            if let MotorSelect::Latch { bus, address } = motor.select {
                if !latch_ids.contains(&bus) {
                    return Err(HalError::ConfigError(format!(
                        "Motor '{}' references unknown latch bus {}",
                        motor.name, bus
                    )));
                }
                if address >= LATCH_SLOTS {
                    return Err(HalError::ConfigError(format!(
                        "Motor '{}': latch address {} must fit in 3 bits",
                        motor.name, address
                    )));
                }
                if !slots.insert((bus, address)) {
                    return Err(HalError::ConfigError(format!(
                        "Motor '{}': latch bus {} slot {} already taken",
                        motor.name, bus, address
                    )));
                }
            }
            if motor.pwm_frequency_hz == 0 {
                return Err(HalError::ConfigError(format!(
                    "Motor '{}': pwm_frequency_hz must be greater than 0",
                    motor.name
                )));
            }
        }

        for muscle in &self.muscles {
            if !valves.contains(muscle.valve.as_str()) {
                return Err(HalError::ConfigError(format!(
                    "Muscle '{}' references unknown valve '{}'",
                    muscle.name, muscle.valve
                )));
            }
            if !regulators.contains(muscle.regulator.as_str()) {
                return Err(HalError::ConfigError(format!(
                    "Muscle '{}' references unknown regulator '{}'",
                    muscle.name, muscle.regulator
                )));
            }
        }

        for joint in &self.joints {
            if !motors.contains(joint.motor.as_str()) {
                return Err(HalError::ConfigError(format!(
                    "Joint '{}' references unknown motor '{}'",
                    joint.name, joint.motor
                )));
            }
            if !pots.contains(joint.potentiometer.as_str()) {
                return Err(HalError::ConfigError(format!(
                    "Joint '{}' references unknown potentiometer '{}'",
                    joint.name, joint.potentiometer
                )));
            }
            if joint.tolerance_deg < 0.0 || joint.poll_interval_ms == 0 {
                return Err(HalError::ConfigError(format!(
                    "Joint '{}': tolerance must be >= 0 and poll interval > 0",
                    joint.name
                )));
            }
        }

        Ok(())
    }
}

/// Collect keys into a set, failing on the first duplicate.
fn unique<T, I>(what: &str, items: I) -> Result<HashSet<T>, HalError>
where
    T: std::hash::Hash + Eq + std::fmt::Display + Copy,
    I: IntoIterator<Item = T>,
{
    let mut set = HashSet::new();
    for item in items {
        if !set.insert(item) {
            return Err(HalError::ConfigError(format!("Duplicate {what}: {item}")));
        }
    }
    Ok(set)
}
