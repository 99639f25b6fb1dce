//! Pressure regulator: transducer in, compressor out.
//!
//! Every decision re-samples the sensor; nothing is ever judged on a cached
//! reading. The compressor line is written exactly once per `pressurize`
//! call and the regulator keeps no timers of its own.

use limb_common::hal::config::PressureRegulatorConfig;
use limb_common::hal::error::HalError;
use limb_common::hal::io::{HardwareIO, PinMode};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Last sample taken by a regulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PressureReading {
    /// Raw ADC code.
    pub raw_sample: u32,
    /// Calibrated pressure (PSI).
    pub pressure_psi: f64,
}

/// Closed-loop pressure control for one sensor/compressor pair.
pub struct PressureRegulator {
    config: PressureRegulatorConfig,
    io: Arc<dyn HardwareIO>,
    reading: PressureReading,
}

impl PressureRegulator {
    /// Validate the calibration and configure the sensor and compressor pins.
    pub fn new(config: PressureRegulatorConfig, io: Arc<dyn HardwareIO>) -> Result<Self, HalError> {
        config.validate()?;
        io.set_mode(config.sensor_pin, PinMode::Input)?;
        io.set_mode(config.compressor_pin, PinMode::Output)?;
        info!(
            "Regulator '{}': sensor pin {}, compressor pin {}, ideal {} PSI",
            config.name, config.sensor_pin, config.compressor_pin, config.ideal_pressure
        );
        Ok(Self {
            config,
            io,
            reading: PressureReading::default(),
        })
    }

    /// Sample the transducer and return the calibrated pressure in PSI.
    pub fn get_pressure(&mut self) -> Result<f64, HalError> {
        let raw = self.io.read_raw(self.config.sensor_pin)?;
        let pressure_psi = self.config.pressure_from_raw(raw);
        self.reading = PressureReading {
            raw_sample: raw,
            pressure_psi,
        };
        debug!("Regulator '{}': raw {} -> {:.2} PSI", self.config.name, raw, pressure_psi);
        Ok(pressure_psi)
    }

    /// Whether a fresh reading satisfies the configured acceptance policy.
    pub fn pressure_ok(&mut self) -> Result<bool, HalError> {
        let psi = self.get_pressure()?;
        Ok(self.config.accepts(psi))
    }

    /// Drive the compressor from a fresh reading.
    ///
    /// The compressor is switched on when the pressure is below the ideal
    /// value or when `force` is set, and off otherwise. Returns the state
    /// written.
    pub fn pressurize(&mut self, force: bool) -> Result<bool, HalError> {
        let psi = self.get_pressure()?;
        let on = psi < self.config.ideal_pressure || force;
        self.io.write(self.config.compressor_pin, on)?;
        debug!(
            "Regulator '{}': compressor {} ({:.2} PSI, force={})",
            self.config.name,
            if on { "ON" } else { "OFF" },
            psi,
            force
        );
        Ok(on)
    }

    /// Reading cached by the last sample.
    pub fn last_reading(&self) -> PressureReading {
        self.reading
    }

    /// Regulator configuration.
    pub fn config(&self) -> &PressureRegulatorConfig {
        &self.config
    }

    /// Regulator name.
    pub fn name(&self) -> &str {
        &self.config.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::recording::{IoEvent, IoOp, RecordingIo};
    use limb_common::hal::config::AcceptancePolicy;

    const SENSOR: u8 = 0;
    const COMPRESSOR: u8 = 4;

    fn config() -> PressureRegulatorConfig {
        PressureRegulatorConfig {
            name: "main".to_string(),
            sensor_pin: SENSOR,
            compressor_pin: COMPRESSOR,
            resolution_bits: 10,
            ideal_pressure: 60.0,
            acceptance: AcceptancePolicy::OneSided { tolerance: 5.0 },
            p_min: 0.0,
            p_max: 100.0,
            min_voltage: 0.5,
            max_voltage: 4.5,
            reference_voltage: 5.0,
        }
    }

    fn regulator(io: &Arc<RecordingIo>) -> PressureRegulator {
        let r = PressureRegulator::new(config(), io.clone()).unwrap();
        io.clear();
        r
    }

    fn compressor_writes(io: &RecordingIo) -> Vec<bool> {
        io.events()
            .into_iter()
            .filter_map(|e| match e {
                IoEvent::Write { pin, level } if pin == COMPRESSOR => Some(level),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn construction_configures_pins() {
        let io = Arc::new(RecordingIo::new());
        PressureRegulator::new(config(), io.clone()).unwrap();
        assert_eq!(
            io.events(),
            vec![
                IoEvent::SetMode { pin: SENSOR, mode: PinMode::Input },
                IoEvent::SetMode { pin: COMPRESSOR, mode: PinMode::Output },
            ]
        );
    }

    #[test]
    fn invalid_calibration_rejected() {
        let mut cfg = config();
        cfg.p_max = cfg.p_min;
        let result = PressureRegulator::new(cfg, Arc::new(RecordingIo::new()));
        assert!(matches!(result, Err(HalError::ConfigError(_))));
    }

    #[test]
    fn mid_window_reads_fifty_psi() {
        let io = Arc::new(RecordingIo::new());
        let mut r = regulator(&io);
        io.push_samples(SENSOR, [512]);

        let psi = r.get_pressure().unwrap();
        assert!((psi - 50.0).abs() < 1e-9);
        assert_eq!(r.last_reading().raw_sample, 512);
    }

    #[test]
    fn pressure_is_monotonic_and_clamped() {
        let io = Arc::new(RecordingIo::new());
        let mut r = regulator(&io);
        io.push_samples(SENSOR, 0..1024);

        let mut previous = f64::MIN;
        for _ in 0..1024 {
            let psi = r.get_pressure().unwrap();
            assert!(psi >= previous);
            assert!((0.0..=100.0).contains(&psi));
            previous = psi;
        }
        assert_eq!(previous, 100.0);
    }

    #[test]
    fn pressurize_writes_compressor_once() {
        let io = Arc::new(RecordingIo::new());
        let mut r = regulator(&io);

        // ~40 PSI, then ~91 PSI
        io.push_samples(SENSOR, [430, 850]);
        assert!(r.pressurize(false).unwrap());
        assert_eq!(compressor_writes(&io), vec![true]);

        io.clear();
        assert!(!r.pressurize(false).unwrap());
        assert_eq!(compressor_writes(&io), vec![false]);
    }

    #[test]
    fn force_always_runs_compressor() {
        let io = Arc::new(RecordingIo::new());
        let mut r = regulator(&io);
        io.push_samples(SENSOR, [1023]);

        assert!(r.pressurize(true).unwrap());
        assert_eq!(compressor_writes(&io), vec![true]);
    }

    #[test]
    fn each_decision_resamples() {
        let io = Arc::new(RecordingIo::new());
        let mut r = regulator(&io);
        io.push_samples(SENSOR, [850, 430]);

        assert!(r.pressure_ok().unwrap());
        assert!(!r.pressure_ok().unwrap());
        let samples = io
            .events()
            .iter()
            .filter(|e| matches!(e, IoEvent::ReadRaw { .. }))
            .count();
        assert_eq!(samples, 2);
    }

    #[test]
    fn range_policy() {
        let mut cfg = config();
        cfg.acceptance = AcceptancePolicy::Range {
            lower: Some(40.0),
            upper: Some(70.0),
        };
        let io = Arc::new(RecordingIo::new());
        let mut r = PressureRegulator::new(cfg, io.clone()).unwrap();

        io.push_samples(SENSOR, [512, 1023]);
        assert!(r.pressure_ok().unwrap());
        assert!(!r.pressure_ok().unwrap());
    }

    #[test]
    fn sensor_failure_leaves_compressor_untouched() {
        let io = Arc::new(RecordingIo::new());
        let mut r = regulator(&io);
        io.fail(IoOp::ReadRaw);

        assert!(matches!(r.pressurize(true), Err(HalError::HardwareIoFailure(_))));
        assert!(compressor_writes(&io).is_empty());
    }
}
