//! End-to-end tests: config file -> Rig -> devices -> backend.

use limb_common::prelude::*;
use limb_hal::drivers::recording::{IoOp, RecordingIo};
use limb_hal::drivers::simulation::SimulatedIo;
use limb_hal::{DriverRegistry, Rig};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tempfile::NamedTempFile;

const COMPRESSOR: Pin = 4;
const SENSOR: Pin = 0;
const VALVE: Pin = 22;

fn sample_config() -> RobotConfig {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../config/robot.toml");
    load_robot_config(&path).expect("sample config should load")
}

fn sim_rig() -> (Arc<SimulatedIo>, Rig) {
    let io = Arc::new(SimulatedIo::new());
    let rig = Rig::from_config(sample_config(), io.clone()).unwrap();
    (io, rig)
}

#[test]
fn sample_config_builds_every_device() {
    let (_, rig) = sim_rig();
    for name in ["hip", "knee"] {
        assert!(rig.potentiometer(name).is_some());
        assert!(rig.motor(name).is_some());
        assert!(rig.joint(name).is_some());
    }
    assert!(rig.regulator("main").is_some());
    assert!(rig.valve("thigh").is_some());
    assert!(rig.muscle("thigh").is_some());
    assert!(rig.motor("elbow").is_none());
    assert_eq!(rig.registry().adc_bus_ids(), vec![1]);
}

#[test]
fn cycle_runs_compressor_until_pressurized() {
    let (io, mut rig) = sim_rig();

    let status = rig.cycle(false);
    assert_eq!(status.cycle, 1);
    assert_eq!(status.regulators[0].compressor_on, Some(true));
    assert_eq!(status.regulators[0].pressure_psi, Some(0.0));
    assert!(io.level(COMPRESSOR).unwrap());

    // ~91 PSI
    io.set_analog(SENSOR, 850).unwrap();
    let status = rig.cycle(false);
    assert_eq!(status.regulators[0].compressor_on, Some(false));
    assert!(!io.level(COMPRESSOR).unwrap());

    let status = rig.cycle(true);
    assert_eq!(status.regulators[0].compressor_on, Some(true));
    assert_eq!(status.error_count(), 0);
}

#[test]
fn cycle_reads_potentiometers_through_shared_adc() {
    let (io, mut rig) = sim_rig();
    io.set_adc_channel(1, 0x48, 0, 2048).unwrap();
    io.set_adc_channel(1, 0x48, 1, 0).unwrap();

    let status = rig.cycle(false);
    let hip = &status.potentiometers[0];
    let knee = &status.potentiometers[1];
    assert_eq!((hip.name.as_str(), hip.degrees), ("hip", Some(142.5)));
    assert_eq!((knee.name.as_str(), knee.degrees), ("knee", Some(0.0)));
    assert_eq!(io.open_handles().unwrap(), 1);
}

#[test]
fn device_failure_does_not_abort_cycle() {
    let io = Arc::new(RecordingIo::new());
    let mut rig = Rig::from_config(sample_config(), io.clone()).unwrap();
    io.fail(IoOp::ReadBytes);

    let status = rig.cycle(false);
    assert_eq!(status.error_count(), 2);
    assert!(status.potentiometers.iter().all(|p| p.error.is_some()));
    assert_eq!(status.regulators[0].compressor_on, Some(true));
}

#[test]
fn stop_all_idles_every_actuator() {
    let (io, rig) = sim_rig();
    rig.motor("hip").unwrap().run(true, 200).unwrap();
    rig.valve("thigh").unwrap().open().unwrap();
    assert_eq!(io.duty(18).unwrap(), 200);

    rig.stop_all().unwrap();
    assert_eq!(io.duty(18).unwrap(), 0);
    assert_eq!(io.duty(19).unwrap(), 0);
    assert!(!io.level(VALVE).unwrap());
}

#[test]
fn muscle_contracts_only_with_pressure() {
    let (io, rig) = sim_rig();
    let thigh = rig.muscle("thigh").unwrap();

    assert!(!thigh.contract().unwrap());
    assert!(!io.level(VALVE).unwrap());

    io.set_analog(SENSOR, 900).unwrap();
    assert!(thigh.contract().unwrap());
    assert!(io.level(VALVE).unwrap());
    assert!(thigh.relax().unwrap());
}

#[test]
fn joint_on_target_stays_still() {
    let (io, rig) = sim_rig();
    io.set_adc_channel(1, 0x48, 0, 2048).unwrap();

    let angle = rig.joint("hip").unwrap().rotate_to(142.0, 150).unwrap();
    assert_eq!(angle, 142.5);
    assert_eq!(io.duty(18).unwrap(), 0);
}

#[test]
fn joint_without_motion_times_out() {
    let mut config = sample_config();
    config.joints[0].timeout_ms = 20;
    config.joints[0].poll_interval_ms = 1;
    let io = Arc::new(SimulatedIo::new());
    let rig = Rig::from_config(config, io.clone()).unwrap();

    // The simulation has no physics: the reading never moves.
    let result = rig.joint("hip").unwrap().rotate_to(200.0, 150);
    assert!(matches!(result, Err(HalError::Timeout(_))));
    assert_eq!(io.duty(18).unwrap(), 0);
}

#[test]
fn status_serializes_to_json() {
    let (_, mut rig) = sim_rig();
    let status = rig.cycle(false);
    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["cycle"], 1);
    assert_eq!(json["regulators"][0]["name"], "main");
    assert_eq!(json["motors"].as_array().unwrap().len(), 2);
    assert_eq!(json["valves"][0]["open"], false);
}

#[test]
fn run_stops_after_max_cycles() {
    let mut config = sample_config();
    config.cycle_time_ms = 1;
    let mut rig = Rig::from_config(config, Arc::new(SimulatedIo::new())).unwrap();

    rig.run(Some(3)).unwrap();
    assert_eq!(rig.stats().0, 3);
    assert!(!rig.running_flag().load(Ordering::SeqCst));
}

#[test]
fn shutdown_clears_running_flag() {
    let (_, mut rig) = sim_rig();
    let running = rig.running_flag();
    running.store(true, Ordering::SeqCst);
    rig.shutdown().unwrap();
    assert!(!running.load(Ordering::SeqCst));
}

#[test]
fn driver_registry_builds_rig_by_name() {
    let config = sample_config();
    let drivers = DriverRegistry::with_builtin();
    let io = drivers.create_driver(&config.driver).unwrap();
    assert_eq!(io.name(), "simulation");
    assert!(Rig::from_config(config, io).is_ok());

    assert!(matches!(
        drivers.create_driver("pigpio"),
        Err(HalError::DriverNotFound(_))
    ));
}

#[test]
fn dangling_reference_rejected_at_build() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[shared]
service_name = "broken"

[[valves]]
name = "thigh"
pin = 22

[[muscles]]
name = "thigh"
valve = "thigh"
regulator = "missing"
"#
    )
    .unwrap();

    let result = load_robot_config(file.path());
    assert!(matches!(result, Err(ConfigError::ValidationError(_))));

    let config = RobotConfig::load(file.path()).unwrap();
    let result = Rig::from_config(config, Arc::new(SimulatedIo::new()));
    assert!(matches!(result, Err(HalError::ConfigError(_))));
}
