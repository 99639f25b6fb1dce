//! Pneumatic muscles.
//!
//! A muscle contracts by opening its valve, but only while the regulator
//! feeding it reports acceptable pressure.

use super::pressure::PressureRegulator;
use super::valve::Valve;
use limb_common::hal::error::HalError;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// A valve gated by a regulator's pressure check.
pub struct Muscle {
    name: String,
    valve: Arc<Valve>,
    regulator: Arc<Mutex<PressureRegulator>>,
}

impl Muscle {
    /// Pair a valve with the regulator supplying it.
    pub fn new(
        name: impl Into<String>,
        valve: Arc<Valve>,
        regulator: Arc<Mutex<PressureRegulator>>,
    ) -> Self {
        Self {
            name: name.into(),
            valve,
            regulator,
        }
    }

    /// Open the valve if the pressure is acceptable.
    ///
    /// Returns `false` without touching the valve when it is not.
    pub fn contract(&self) -> Result<bool, HalError> {
        let ok = self.regulator.lock()?.pressure_ok()?;
        if !ok {
            warn!("Muscle '{}': pressure too low, not contracting", self.name);
            return Ok(false);
        }
        self.valve.open()?;
        debug!("Muscle '{}' contracted", self.name);
        Ok(true)
    }

    /// Close the valve. Returns `false` if it was already closed.
    pub fn relax(&self) -> Result<bool, HalError> {
        if !self.valve.is_open() {
            return Ok(false);
        }
        self.valve.close()?;
        debug!("Muscle '{}' relaxed", self.name);
        Ok(true)
    }

    /// Relax when contracted, contract otherwise.
    pub fn toggle(&self) -> Result<bool, HalError> {
        if self.is_contracted() {
            self.relax()
        } else {
            self.contract()
        }
    }

    /// Whether the valve is open.
    pub fn is_contracted(&self) -> bool {
        self.valve.is_open()
    }

    /// Muscle name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::recording::{IoEvent, RecordingIo};
    use limb_common::hal::config::{AcceptancePolicy, PressureRegulatorConfig, ValveConfig};

    const SENSOR: u8 = 0;
    const VALVE: u8 = 22;

    fn muscle(io: &Arc<RecordingIo>) -> Muscle {
        let regulator = PressureRegulator::new(
            PressureRegulatorConfig {
                name: "main".to_string(),
                sensor_pin: SENSOR,
                compressor_pin: 4,
                resolution_bits: 10,
                ideal_pressure: 60.0,
                acceptance: AcceptancePolicy::OneSided { tolerance: 5.0 },
                p_min: 0.0,
                p_max: 100.0,
                min_voltage: 0.5,
                max_voltage: 4.5,
                reference_voltage: 5.0,
            },
            io.clone(),
        )
        .unwrap();
        let valve = Valve::new(
            &ValveConfig {
                name: "knee".to_string(),
                pin: VALVE,
            },
            io.clone(),
        )
        .unwrap();
        io.clear();
        Muscle::new("knee", Arc::new(valve), Arc::new(Mutex::new(regulator)))
    }

    #[test]
    fn low_pressure_blocks_contraction() {
        let io = Arc::new(RecordingIo::new());
        let m = muscle(&io);
        io.push_samples(SENSOR, [100]);

        assert!(!m.contract().unwrap());
        assert!(!m.is_contracted());
        assert!(!io.events().iter().any(|e| matches!(e, IoEvent::Write { pin: VALVE, .. })));
    }

    #[test]
    fn contract_then_relax() {
        let io = Arc::new(RecordingIo::new());
        let m = muscle(&io);
        io.push_samples(SENSOR, [900]);

        assert!(m.contract().unwrap());
        assert!(m.is_contracted());
        assert!(m.relax().unwrap());
        assert!(!m.relax().unwrap());
    }

    #[test]
    fn toggle_alternates() {
        let io = Arc::new(RecordingIo::new().with_default_raw(900));
        let m = muscle(&io);

        assert!(m.toggle().unwrap());
        assert!(m.is_contracted());
        assert!(m.toggle().unwrap());
        assert!(!m.is_contracted());
    }
}
