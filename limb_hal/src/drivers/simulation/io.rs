//! In-memory `HardwareIO`.
//!
//! `SimulatedIo` keeps the last commanded state of every pin (mode, level,
//! PWM duty and frequency), serves analog samples from settable values and
//! models one ADS7828 per opened `(bus, address)` pair. Actuators have no
//! physics: a compressor pin that goes high does not raise the pressure.

use super::adc::SimulatedAdc;
use limb_common::hal::error::HalError;
use limb_common::hal::io::{BusHandle, HardwareIO, Pin, PinMode};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, trace};

#[derive(Debug, Default)]
struct SimState {
    modes: HashMap<Pin, PinMode>,
    levels: HashMap<Pin, bool>,
    duties: HashMap<Pin, u8>,
    frequencies: HashMap<Pin, u32>,
    analog: HashMap<Pin, u32>,
    /// ADC models by `(bus, address)`; created on first reference.
    adcs: HashMap<(u8, u16), SimulatedAdc>,
    /// Opened handles, indexed by handle number.
    handles: Vec<(u8, u16)>,
}

impl SimState {
    fn adc_for(&mut self, handle: BusHandle) -> Result<&mut SimulatedAdc, HalError> {
        let key = self
            .handles
            .get(handle.0 as usize)
            .copied()
            .ok_or_else(|| HalError::io(format!("unknown bus handle {handle}")))?;
        Ok(self.adcs.entry(key).or_default())
    }
}

/// Software stand-in for the robot's GPIO / I2C platform.
#[derive(Debug, Default)]
pub struct SimulatedIo {
    state: Mutex<SimState>,
}

impl SimulatedIo {
    /// Create a simulator with every pin low and every input at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the raw sample returned by `read_raw` on a pin.
    pub fn set_analog(&self, pin: Pin, raw: u32) -> Result<(), HalError> {
        self.state.lock()?.analog.insert(pin, raw);
        Ok(())
    }

    /// Set the code an ADC input converts to.
    pub fn set_adc_channel(
        &self,
        bus: u8,
        address: u16,
        channel: usize,
        code: u16,
    ) -> Result<(), HalError> {
        self.state
            .lock()?
            .adcs
            .entry((bus, address))
            .or_default()
            .set_code(channel, code)
    }

    /// Drive an input pin from outside.
    pub fn set_input(&self, pin: Pin, level: bool) -> Result<(), HalError> {
        self.state.lock()?.levels.insert(pin, level);
        Ok(())
    }

    /// Last level on a pin (`false` if never written).
    pub fn level(&self, pin: Pin) -> Result<bool, HalError> {
        Ok(self.state.lock()?.levels.get(&pin).copied().unwrap_or(false))
    }

    /// Last duty on a PWM pin (`0` if never written).
    pub fn duty(&self, pin: Pin) -> Result<u8, HalError> {
        Ok(self.state.lock()?.duties.get(&pin).copied().unwrap_or(0))
    }

    /// PWM frequency configured on a pin.
    pub fn frequency(&self, pin: Pin) -> Result<Option<u32>, HalError> {
        Ok(self.state.lock()?.frequencies.get(&pin).copied())
    }

    /// Mode configured on a pin.
    pub fn mode(&self, pin: Pin) -> Result<Option<PinMode>, HalError> {
        Ok(self.state.lock()?.modes.get(&pin).copied())
    }

    /// Number of bus handles opened so far.
    pub fn open_handles(&self) -> Result<usize, HalError> {
        Ok(self.state.lock()?.handles.len())
    }
}

impl HardwareIO for SimulatedIo {
    fn name(&self) -> &'static str {
        "simulation"
    }

    fn set_mode(&self, pin: Pin, mode: PinMode) -> Result<(), HalError> {
        trace!("pin {} mode {:?}", pin, mode);
        self.state.lock()?.modes.insert(pin, mode);
        Ok(())
    }

    fn write(&self, pin: Pin, level: bool) -> Result<(), HalError> {
        let mut state = self.state.lock()?;
        if state.modes.get(&pin) == Some(&PinMode::Input) {
            return Err(HalError::io(format!("pin {pin} is an input")));
        }
        trace!("pin {} <- {}", pin, level);
        state.levels.insert(pin, level);
        Ok(())
    }

    fn read(&self, pin: Pin) -> Result<bool, HalError> {
        self.level(pin)
    }

    fn set_pwm_frequency(&self, pin: Pin, hz: u32) -> Result<(), HalError> {
        if hz == 0 {
            return Err(HalError::invalid("pwm frequency", hz));
        }
        trace!("pin {} pwm {} Hz", pin, hz);
        self.state.lock()?.frequencies.insert(pin, hz);
        Ok(())
    }

    fn set_duty(&self, pin: Pin, duty: u8) -> Result<(), HalError> {
        trace!("pin {} duty {}", pin, duty);
        self.state.lock()?.duties.insert(pin, duty);
        Ok(())
    }

    fn read_raw(&self, pin: Pin) -> Result<u32, HalError> {
        Ok(self.state.lock()?.analog.get(&pin).copied().unwrap_or(0))
    }

    fn open_bus(&self, bus: u8, address: u16) -> Result<BusHandle, HalError> {
        let mut state = self.state.lock()?;
        let handle = BusHandle(state.handles.len() as u32);
        state.handles.push((bus, address));
        state.adcs.entry((bus, address)).or_default();
        debug!("Simulated bus {} addr 0x{:02x} opened as {}", bus, address, handle);
        Ok(handle)
    }

    fn write_byte(&self, handle: BusHandle, byte: u8) -> Result<(), HalError> {
        self.state.lock()?.adc_for(handle)?.command(byte)
    }

    fn read_bytes(&self, handle: BusHandle, len: usize) -> Result<Vec<u8>, HalError> {
        self.state.lock()?.adc_for(handle)?.respond(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use limb_common::consts::CHANNEL_MAP;

    #[test]
    fn tracks_outputs() {
        let io = SimulatedIo::new();
        io.set_mode(4, PinMode::Output).unwrap();
        io.write(4, true).unwrap();
        io.set_pwm_frequency(18, 100).unwrap();
        io.set_duty(18, 200).unwrap();

        assert!(io.level(4).unwrap());
        assert!(io.read(4).unwrap());
        assert_eq!(io.duty(18).unwrap(), 200);
        assert_eq!(io.frequency(18).unwrap(), Some(100));
        assert_eq!(io.mode(4).unwrap(), Some(PinMode::Output));
    }

    #[test]
    fn refuses_to_drive_an_input() {
        let io = SimulatedIo::new();
        io.set_mode(0, PinMode::Input).unwrap();
        assert!(matches!(io.write(0, true), Err(HalError::HardwareIoFailure(_))));
    }

    #[test]
    fn analog_defaults_to_zero() {
        let io = SimulatedIo::new();
        assert_eq!(io.read_raw(0).unwrap(), 0);
        io.set_analog(0, 512).unwrap();
        assert_eq!(io.read_raw(0).unwrap(), 512);
    }

    #[test]
    fn adc_transaction_returns_selected_channel() {
        let io = SimulatedIo::new();
        io.set_adc_channel(1, 0x48, 5, 2048).unwrap();

        let handle = io.open_bus(1, 0x48).unwrap();
        io.write_byte(handle, (CHANNEL_MAP[5] << 4) | 0b1100).unwrap();
        assert_eq!(io.read_bytes(handle, 2).unwrap(), vec![0x08, 0x00]);
        assert_eq!(io.open_handles().unwrap(), 1);
    }

    #[test]
    fn unknown_handle_is_an_io_failure() {
        let io = SimulatedIo::new();
        assert!(io.write_byte(BusHandle(9), 0x8C).is_err());
    }
}
