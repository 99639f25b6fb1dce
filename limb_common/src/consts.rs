//! System-wide constants for the limb workspace.
//!
//! Wiring defaults of the hip board and the ADS7828 command-byte layout.
//! Imported by all crates; never duplicate these values.

use bitflags::bitflags;
use static_assertions::const_assert;

/// Canonical HAL service name (used for logging).
pub const HAL_SERVICE_NAME: &str = "limb_hal";

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/limb/robot.toml";

/// Default control step period in milliseconds.
pub const DEFAULT_CYCLE_TIME_MS: u64 = 50;

// ─── PWM ────────────────────────────────────────────────────────────

/// Default PWM carrier frequency for motor speed lines (Hz).
pub const PWM_FREQUENCY_HZ: u32 = 100;

/// Full-scale PWM duty value.
pub const PWM_RANGE: i32 = 255;

// ─── Motor latch ────────────────────────────────────────────────────

/// Number of address-select lines on a motor latch.
pub const LATCH_ADDRESS_BITS: u32 = 3;

/// Number of motor drivers addressable through one latch.
pub const LATCH_SLOTS: u8 = 1 << LATCH_ADDRESS_BITS;

/// Default address-select pins, index 0 is the least significant bit.
pub const LATCH_ADDRESS_PINS: [u8; 3] = [12, 6, 5];

/// Default latch-enable pin (active low).
pub const PIN_LATCH_EN: u8 = 15;

/// Default shared motor direction pin.
pub const PIN_MOTOR_DIR: u8 = 1;

// ─── ADC ────────────────────────────────────────────────────────────

/// Default I2C bus number of the potentiometer ADC.
pub const ADC_I2C_BUS: u8 = 1;

/// Default I2C device address of the potentiometer ADC.
pub const ADC_I2C_ADDR: u16 = 0x48;

/// Default ADC resolution in bits.
pub const ADC_RESOLUTION_BITS: u8 = 12;

/// Default mechanical range of a potentiometer in degrees.
pub const POT_MAX_ROTATION_DEG: f64 = 285.0;

/// Bytes returned by one ADC conversion.
pub const ADC_RESPONSE_LEN: usize = 2;

/// Channel-select nibble per logical channel (ADS7828 single-ended mode).
///
/// Index is the channel printed on the board (POT0, POT1, ...). The order
/// follows the chip's SD/C2/C1/C0 encoding and the board wiring, so it must
/// not be re-derived.
pub const CHANNEL_MAP: [u8; 8] = [
    0b1000, // CH0
    0b1100, // CH1
    0b1001, // CH2
    0b1101, // CH3
    0b1010, // CH4
    0b1110, // CH5
    0b1011, // CH6
    0b1111, // CH7
];

bitflags! {
    /// Power-down selection bits (PD1, PD0) in the low nibble of the ADC
    /// command byte. The two lowest bits are unused.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PowerDown: u8 {
        /// Internal reference on (PD1).
        const REFERENCE_ON = 0b1000;
        /// A/D converter on (PD0).
        const CONVERTER_ON = 0b0100;
    }
}

/// Always-on conversion mode: reference and converter stay powered.
pub const POWER_DOWN_BITS: PowerDown = PowerDown::REFERENCE_ON.union(PowerDown::CONVERTER_ON);

// ─── Pressure sensor ────────────────────────────────────────────────

/// Default analog reference voltage of the pressure sensor ADC.
pub const DEFAULT_REFERENCE_VOLTAGE: f64 = 5.0;

const_assert!(CHANNEL_MAP.len() == LATCH_SLOTS as usize);
const_assert!(LATCH_ADDRESS_PINS.len() == LATCH_ADDRESS_BITS as usize);
const_assert!(POWER_DOWN_BITS.bits() <= 0x0F);
const_assert!(ADC_RESOLUTION_BITS <= 16);
