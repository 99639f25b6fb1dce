//! Multiplexed rotary potentiometers behind a shared ADS7828.
//!
//! A reading is one transaction on the channel's ADC bus: write the command
//! byte, read two bytes back. The bus guard is held across both steps so a
//! reply can never belong to another channel's command.

use crate::bus_registry::{AdcBus, BusRegistry};
use limb_common::consts::{ADC_RESPONSE_LEN, CHANNEL_MAP, POWER_DOWN_BITS};
use limb_common::hal::config::PotentiometerConfig;
use limb_common::hal::error::HalError;
use std::sync::Arc;
use tracing::{debug, info};

/// ADS7828 command byte for a single-ended channel with the internal
/// reference and converter left on.
///
/// # Errors
/// `InvalidArgument` if `channel` is not 0..=7.
pub fn command_byte(channel: u8) -> Result<u8, HalError> {
    let nibble = *CHANNEL_MAP
        .get(usize::from(channel))
        .ok_or_else(|| HalError::invalid("channel", channel))?;
    Ok((nibble << 4) | POWER_DOWN_BITS.bits())
}

/// One potentiometer on one ADC input.
pub struct PotentiometerChannel {
    name: String,
    channel: u8,
    command: u8,
    resolution_bits: u8,
    max_rotation_deg: f64,
    bus: Arc<AdcBus>,
}

impl PotentiometerChannel {
    /// Bind a channel to its (already registered) ADC bus.
    ///
    /// The bus is not opened here; the first reading opens it.
    ///
    /// # Errors
    /// `InvalidArgument` for a channel outside 0..=7 or a resolution outside
    /// 1..=16. `ConfigError` if the mechanical range is not a positive finite
    /// number or the bus id is unknown to `registry`.
    pub fn new(config: &PotentiometerConfig, registry: &BusRegistry) -> Result<Self, HalError> {
        let command = command_byte(config.channel)?;
        if config.resolution_bits == 0 || config.resolution_bits > 16 {
            return Err(HalError::invalid("resolution_bits", config.resolution_bits));
        }
        if !(config.max_rotation_deg > 0.0 && config.max_rotation_deg.is_finite()) {
            return Err(HalError::ConfigError(format!(
                "Potentiometer '{}': max_rotation_deg must be positive and finite, got {}",
                config.name, config.max_rotation_deg
            )));
        }
        let bus = registry.adc_bus(config.bus)?;

        info!(
            "Potentiometer '{}': bus {} CH{} (command 0x{:02x})",
            config.name, config.bus, config.channel, command
        );
        Ok(Self {
            name: config.name.clone(),
            channel: config.channel,
            command,
            resolution_bits: config.resolution_bits,
            max_rotation_deg: config.max_rotation_deg,
            bus,
        })
    }

    /// Raw conversion result.
    pub fn read_raw(&self) -> Result<u16, HalError> {
        let bytes = {
            let bus = self.bus.lock()?;
            bus.write_byte(self.command)?;
            bus.read_bytes(ADC_RESPONSE_LEN)?
        };
        let pair: [u8; ADC_RESPONSE_LEN] = bytes.as_slice().try_into().map_err(|_| {
            HalError::io(format!(
                "'{}': expected {} response bytes, got {}",
                self.name,
                ADC_RESPONSE_LEN,
                bytes.len()
            ))
        })?;
        Ok(u16::from_be_bytes(pair))
    }

    /// Angle in degrees, unrounded.
    pub fn read_angle(&self) -> Result<f64, HalError> {
        let raw = self.read_raw()?;
        let angle = self.scale(raw);
        debug!("Potentiometer '{}': raw {} -> {:.2} deg", self.name, raw, angle);
        Ok(angle)
    }

    /// Angle in whole degrees, truncated, never above the mechanical range.
    pub fn get_degrees(&self) -> Result<u32, HalError> {
        let angle = self.read_angle()?;
        Ok((angle.trunc() as u32).min(self.max_rotation_deg.trunc() as u32))
    }

    /// Convert a raw code to degrees.
    pub fn scale(&self, raw: u16) -> f64 {
        let full_scale = f64::from(1u32 << self.resolution_bits);
        (f64::from(raw) / full_scale * self.max_rotation_deg).clamp(0.0, self.max_rotation_deg)
    }

    /// Mechanical range in degrees.
    pub fn max_rotation_deg(&self) -> f64 {
        self.max_rotation_deg
    }

    /// ADC input index.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Command byte sent for every reading.
    pub fn command(&self) -> u8 {
        self.command
    }

    /// Potentiometer name.
    pub fn name(&self) -> &str {
        &self.name
    }
}
