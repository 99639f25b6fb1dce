//! Rig assembly and the control loop.
//!
//! The `Rig` struct is the main entry point for HAL operations. It builds
//! every bus and device named in `RobotConfig` on one `HardwareIO`, runs one
//! control step per `cycle()` call and owns the periodic loop.

use crate::bus_registry::BusRegistry;
use crate::devices::{
    JointController, Motor, Muscle, PotentiometerChannel, PressureRegulator, Valve,
};
use limb_common::consts::HAL_SERVICE_NAME;
use limb_common::hal::config::RobotConfig;
use limb_common::hal::error::HalError;
use limb_common::hal::io::HardwareIO;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Rig manages the device set and the control loop.
pub struct Rig {
    /// Robot configuration
    config: RobotConfig,
    /// Shared buses
    registry: BusRegistry,
    regulators: Vec<(String, Arc<Mutex<PressureRegulator>>)>,
    potentiometers: Vec<Arc<PotentiometerChannel>>,
    motors: Vec<Arc<Motor>>,
    valves: Vec<Arc<Valve>>,
    muscles: Vec<Muscle>,
    joints: Vec<JointController>,
    /// Running flag for loop control
    running: Arc<AtomicBool>,
    /// Cycle time from config
    cycle_time: Duration,
    /// Timing statistics
    stats: TimingStats,
}

/// Timing statistics for loop monitoring.
#[derive(Debug, Default)]
struct TimingStats {
    /// Number of cycles executed
    cycle_count: u64,
    /// Number of timing violations (cycle exceeded target)
    timing_violations: u64,
    /// Maximum observed cycle time
    max_cycle_time_us: u64,
    /// Sum of cycle times for average calculation
    total_cycle_time_us: u64,
}

/// Snapshot of one regulator after a control step.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegulatorStatus {
    /// Regulator name
    pub name: String,
    /// Raw sample taken this step
    pub raw_sample: Option<u32>,
    /// Calibrated pressure (PSI)
    pub pressure_psi: Option<f64>,
    /// Compressor state written this step
    pub compressor_on: Option<bool>,
    /// Error raised this step
    pub error: Option<String>,
}

/// Snapshot of one potentiometer after a control step.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PotentiometerStatus {
    /// Potentiometer name
    pub name: String,
    /// Angle read this step
    pub degrees: Option<f64>,
    /// Error raised this step
    pub error: Option<String>,
}

/// Last commanded motor state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MotorStatus {
    /// Motor name
    pub name: String,
    /// PWM duty
    pub duty: u8,
    /// Direction
    pub clockwise: bool,
}

/// Last commanded valve state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValveStatus {
    /// Valve name
    pub name: String,
    /// Valve open
    pub open: bool,
}

/// Result of one `Rig::cycle`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RigStatus {
    /// Cycle number, from 1
    pub cycle: u64,
    /// Regulators
    pub regulators: Vec<RegulatorStatus>,
    /// Potentiometers
    pub potentiometers: Vec<PotentiometerStatus>,
    /// Motors
    pub motors: Vec<MotorStatus>,
    /// Valves
    pub valves: Vec<ValveStatus>,
}

impl RigStatus {
    /// Number of devices that failed this step.
    pub fn error_count(&self) -> usize {
        self.regulators.iter().filter(|r| r.error.is_some()).count()
            + self
                .potentiometers
                .iter()
                .filter(|p| p.error.is_some())
                .count()
    }
}

impl Rig {
    /// Build every bus and device described by `config` on top of `io`.
    ///
    /// # Errors
    /// Returns error if configuration validation or any device
    /// construction fails.
    pub fn from_config(config: RobotConfig, io: Arc<dyn HardwareIO>) -> Result<Self, HalError> {
        config.validate()?;

        info!(
            "Building rig '{}' on '{}' driver",
            config.shared.service_name,
            io.name()
        );
        let registry = BusRegistry::new(io);

        for bus in &config.adc_buses {
            registry.register_adc_bus(bus)?;
        }
        for bus in &config.latch_buses {
            registry.register_latch_bus(bus)?;
        }

        let mut regulators = Vec::with_capacity(config.regulators.len());
        for cfg in &config.regulators {
            let regulator = PressureRegulator::new(cfg.clone(), Arc::clone(registry.io()))?;
            regulators.push((cfg.name.clone(), Arc::new(Mutex::new(regulator))));
        }

        let mut potentiometers = Vec::with_capacity(config.potentiometers.len());
        for cfg in &config.potentiometers {
            potentiometers.push(Arc::new(PotentiometerChannel::new(cfg, &registry)?));
        }

        let mut motors = Vec::with_capacity(config.motors.len());
        for cfg in &config.motors {
            motors.push(Arc::new(Motor::new(cfg, &registry)?));
        }

        let mut valves = Vec::with_capacity(config.valves.len());
        for cfg in &config.valves {
            valves.push(Arc::new(Valve::new(cfg, Arc::clone(registry.io()))?));
        }

        let muscles = {
            let valve_by_name: HashMap<&str, &Arc<Valve>> =
                valves.iter().map(|v| (v.name(), v)).collect();
            let regulator_by_name: HashMap<&str, &Arc<Mutex<PressureRegulator>>> =
                regulators.iter().map(|(n, r)| (n.as_str(), r)).collect();
            let mut muscles = Vec::with_capacity(config.muscles.len());
            for cfg in &config.muscles {
                let valve = lookup(&valve_by_name, &cfg.valve, "valve")?;
                let regulator = lookup(&regulator_by_name, &cfg.regulator, "regulator")?;
                muscles.push(Muscle::new(
                    cfg.name.clone(),
                    Arc::clone(valve),
                    Arc::clone(regulator),
                ));
            }
            muscles
        };

        let joints = {
            let motor_by_name: HashMap<&str, &Arc<Motor>> =
                motors.iter().map(|m| (m.name(), m)).collect();
            let pot_by_name: HashMap<&str, &Arc<PotentiometerChannel>> =
                potentiometers.iter().map(|p| (p.name(), p)).collect();
            let mut joints = Vec::with_capacity(config.joints.len());
            for cfg in &config.joints {
                let motor = lookup(&motor_by_name, &cfg.motor, "motor")?;
                let pot = lookup(&pot_by_name, &cfg.potentiometer, "potentiometer")?;
                joints.push(JointController::new(cfg, Arc::clone(motor), Arc::clone(pot)));
            }
            joints
        };

        let cycle_time = Duration::from_millis(config.cycle_time_ms);
        info!(
            "Rig ready: {} regulators, {} potentiometers, {} motors, {} valves, {} muscles, {} joints, cycle_time={}ms",
            regulators.len(),
            potentiometers.len(),
            motors.len(),
            valves.len(),
            muscles.len(),
            joints.len(),
            config.cycle_time_ms
        );

        Ok(Self {
            config,
            registry,
            regulators,
            potentiometers,
            motors,
            valves,
            muscles,
            joints,
            running: Arc::new(AtomicBool::new(false)),
            cycle_time,
            stats: TimingStats::default(),
        })
    }

    /// Run one control step: pressurize every regulator and read every
    /// potentiometer.
    ///
    /// A failing device is logged and reported in the status; the remaining
    /// devices are still serviced.
    pub fn cycle(&mut self, force_compressor: bool) -> RigStatus {
        self.stats.cycle_count += 1;
        let mut status = RigStatus {
            cycle: self.stats.cycle_count,
            ..RigStatus::default()
        };

        for (name, regulator) in &self.regulators {
            let mut entry = RegulatorStatus {
                name: name.clone(),
                ..RegulatorStatus::default()
            };
            let result = regulator.lock().map_err(HalError::from).and_then(|mut r| {
                let on = r.pressurize(force_compressor)?;
                Ok((on, r.last_reading()))
            });
            match result {
                Ok((on, reading)) => {
                    entry.raw_sample = Some(reading.raw_sample);
                    entry.pressure_psi = Some(reading.pressure_psi);
                    entry.compressor_on = Some(on);
                }
                Err(e) => {
                    warn!("Regulator '{}' failed: {}", name, e);
                    entry.error = Some(e.to_string());
                }
            }
            status.regulators.push(entry);
        }

        for pot in &self.potentiometers {
            let mut entry = PotentiometerStatus {
                name: pot.name().to_string(),
                ..PotentiometerStatus::default()
            };
            match pot.read_angle() {
                Ok(angle) => entry.degrees = Some(angle),
                Err(e) => {
                    warn!("Potentiometer '{}' failed: {}", pot.name(), e);
                    entry.error = Some(e.to_string());
                }
            }
            status.potentiometers.push(entry);
        }

        status.motors = self
            .motors
            .iter()
            .map(|m| MotorStatus {
                name: m.name().to_string(),
                duty: m.duty(),
                clockwise: m.last_clockwise(),
            })
            .collect();
        status.valves = self
            .valves
            .iter()
            .map(|v| ValveStatus {
                name: v.name().to_string(),
                open: v.is_open(),
            })
            .collect();

        status
    }

    /// Run the control loop.
    ///
    /// Blocks until the running flag is cleared (signal handler or
    /// `shutdown`) or `max_cycles` steps have run.
    pub fn run(&mut self, max_cycles: Option<u64>) -> Result<(), HalError> {
        info!(
            "Starting {} loop (cycle_time={}ms)...",
            HAL_SERVICE_NAME,
            self.cycle_time.as_millis()
        );
        self.running.store(true, Ordering::SeqCst);

        if detect_rt_mode() {
            info!("Running in real-time mode");
        } else {
            info!("Running in standard (non-RT) mode");
        }

        let target_us = self.cycle_time.as_micros() as u64;
        let mut steps = 0u64;

        while self.running.load(Ordering::SeqCst) {
            if max_cycles.is_some_and(|max| steps >= max) {
                break;
            }
            let cycle_start = Instant::now();

            let status = self.cycle(false);
            steps += 1;
            if let Ok(json) = serde_json::to_string(&status) {
                debug!("cycle {}: {}", status.cycle, json);
            }

            // Update timing stats
            let cycle_time_us = cycle_start.elapsed().as_micros() as u64;
            self.stats.total_cycle_time_us += cycle_time_us;
            self.stats.max_cycle_time_us = self.stats.max_cycle_time_us.max(cycle_time_us);

            if cycle_time_us > target_us {
                self.stats.timing_violations += 1;
                if self.stats.timing_violations <= 10 || self.stats.timing_violations % 1000 == 0 {
                    warn!(
                        "Timing violation #{}: cycle took {}us (target {}us)",
                        self.stats.timing_violations, cycle_time_us, target_us
                    );
                }
            }

            // Sleep for remaining cycle time
            let elapsed = cycle_start.elapsed();
            if elapsed < self.cycle_time {
                std::thread::sleep(self.cycle_time - elapsed);
            }

            if self.stats.cycle_count % 100 == 0 {
                debug!(
                    "Loop: {} cycles, avg={}us, max={}us, violations={}",
                    self.stats.cycle_count,
                    self.stats.total_cycle_time_us / self.stats.cycle_count,
                    self.stats.max_cycle_time_us,
                    self.stats.timing_violations
                );
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!(
            "Loop stopped after {} cycles (violations: {})",
            self.stats.cycle_count, self.stats.timing_violations
        );
        Ok(())
    }

    /// Stop every motor and close every valve.
    ///
    /// Every actuator is attempted; the first error is returned.
    pub fn stop_all(&self) -> Result<(), HalError> {
        let mut first_err = None;
        let motor_results = self.motors.iter().map(|m| (m.name(), m.stop()));
        let valve_results = self.valves.iter().map(|v| (v.name(), v.close()));
        for (name, result) in motor_results.chain(valve_results) {
            if let Err(e) = result {
                warn!("Failed to stop '{}': {}", name, e);
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => {
                info!("All actuators stopped");
                Ok(())
            }
        }
    }

    /// Request shutdown of the loop and stop every actuator.
    pub fn shutdown(&mut self) -> Result<(), HalError> {
        info!("Shutdown requested");
        self.running.store(false, Ordering::SeqCst);
        self.stop_all()
    }

    /// Get the running flag for signal handlers.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Get timing statistics: (cycles, violations, max cycle time in us).
    pub fn stats(&self) -> (u64, u64, u64) {
        (
            self.stats.cycle_count,
            self.stats.timing_violations,
            self.stats.max_cycle_time_us,
        )
    }

    /// Robot configuration the rig was built from.
    pub fn config(&self) -> &RobotConfig {
        &self.config
    }

    /// Shared buses.
    pub fn registry(&self) -> &BusRegistry {
        &self.registry
    }

    /// Regulator by name.
    pub fn regulator(&self, name: &str) -> Option<Arc<Mutex<PressureRegulator>>> {
        self.regulators
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, r)| Arc::clone(r))
    }

    /// Potentiometer by name.
    pub fn potentiometer(&self, name: &str) -> Option<Arc<PotentiometerChannel>> {
        self.potentiometers.iter().find(|p| p.name() == name).cloned()
    }

    /// Motor by name.
    pub fn motor(&self, name: &str) -> Option<Arc<Motor>> {
        self.motors.iter().find(|m| m.name() == name).cloned()
    }

    /// Valve by name.
    pub fn valve(&self, name: &str) -> Option<Arc<Valve>> {
        self.valves.iter().find(|v| v.name() == name).cloned()
    }

    /// Muscle by name.
    pub fn muscle(&self, name: &str) -> Option<&Muscle> {
        self.muscles.iter().find(|m| m.name() == name)
    }

    /// Joint by name.
    pub fn joint(&self, name: &str) -> Option<&JointController> {
        self.joints.iter().find(|j| j.name() == name)
    }
}

fn lookup<'a, T>(
    by_name: &HashMap<&str, &'a T>,
    name: &str,
    what: &str,
) -> Result<&'a T, HalError> {
    by_name
        .get(name)
        .copied()
        .ok_or_else(|| HalError::ConfigError(format!("unknown {what} '{name}'")))
}

/// Detect if running in real-time mode by checking scheduler policy.
fn detect_rt_mode() -> bool {
    #[cfg(target_os = "linux")]
    {
        use libc::{SCHED_FIFO, SCHED_RR, sched_getscheduler};
        let policy = unsafe { sched_getscheduler(0) };
        policy == SCHED_FIFO || policy == SCHED_RR
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}
