//! ADS7828 model.
//!
//! The converter latches a channel from the upper nibble of the last command
//! byte and answers every 2-byte read with that channel's code, big-endian.

use limb_common::consts::{ADC_RESPONSE_LEN, CHANNEL_MAP};
use limb_common::hal::error::HalError;
use tracing::trace;

/// Number of single-ended inputs.
pub const ADC_CHANNELS: usize = CHANNEL_MAP.len();

/// One simulated 8-channel ADC.
#[derive(Debug, Clone, Default)]
pub struct SimulatedAdc {
    codes: [u16; ADC_CHANNELS],
    selected: Option<usize>,
}

impl SimulatedAdc {
    /// Create a converter with every input at code 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the code an input converts to.
    pub fn set_code(&mut self, channel: usize, code: u16) -> Result<(), HalError> {
        let slot = self
            .codes
            .get_mut(channel)
            .ok_or_else(|| HalError::invalid("adc channel", channel as i64))?;
        *slot = code;
        Ok(())
    }

    /// Code currently on an input.
    pub fn code(&self, channel: usize) -> Option<u16> {
        self.codes.get(channel).copied()
    }

    /// Channel selected by the last command, if any.
    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    /// Decode a command byte and latch its channel.
    pub fn command(&mut self, byte: u8) -> Result<(), HalError> {
        let nibble = byte >> 4;
        let channel = CHANNEL_MAP
            .iter()
            .position(|&n| n == nibble)
            .ok_or_else(|| {
                HalError::io(format!("command 0x{byte:02x} selects no single-ended input"))
            })?;
        trace!("ADS7828: command 0x{:02x} -> CH{}", byte, channel);
        self.selected = Some(channel);
        Ok(())
    }

    /// Answer a read with the selected channel's code.
    pub fn respond(&self, len: usize) -> Result<Vec<u8>, HalError> {
        if len != ADC_RESPONSE_LEN {
            return Err(HalError::io(format!(
                "ADS7828 answers {ADC_RESPONSE_LEN} bytes, {len} requested"
            )));
        }
        let channel = self
            .selected
            .ok_or_else(|| HalError::io("ADS7828 read before any command"))?;
        Ok(self.codes[channel].to_be_bytes().to_vec())
    }
}
