//! Concurrency tests for the shared buses.
//!
//! A recording backend with per-call latency widens the window between the
//! steps of each transaction; the recorded call order must still show every
//! transaction as one contiguous run.

use limb_common::prelude::*;
use limb_hal::devices::{Motor, PotentiometerChannel};
use limb_hal::drivers::recording::{IoEvent, RecordingIo};
use limb_hal::BusRegistry;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const LATENCY: Duration = Duration::from_micros(200);

fn latch_bus() -> LatchBusConfig {
    LatchBusConfig {
        id: 0,
        address_pins: [12, 6, 5],
        latch_enable_pin: 15,
        direction_pin: 1,
        clockwise_level: true,
    }
}

fn motor(name: &str, pwm_pin: Pin, address: u8) -> MotorConfig {
    MotorConfig {
        name: name.to_string(),
        pwm_pin,
        pwm_frequency_hz: 100,
        select: MotorSelect::Latch { bus: 0, address },
        stop_policy: StopPolicy::Reselect,
    }
}

fn level(event: &IoEvent, pin: Pin) -> bool {
    match event {
        IoEvent::Write { pin: p, level } if *p == pin => *level,
        other => panic!("expected write to pin {pin}, got {other:?}"),
    }
}

#[test]
fn concurrent_runs_on_one_latch_never_interleave() {
    let io = Arc::new(RecordingIo::new().with_latency(LATENCY));
    let registry = BusRegistry::new(io.clone());
    registry.register_latch_bus(&latch_bus()).unwrap();

    let left = Motor::new(&motor("left", 18, 1), &registry).unwrap();
    let right = Motor::new(&motor("right", 19, 6), &registry).unwrap();
    io.clear();

    let barrier = Barrier::new(2);
    thread::scope(|s| {
        for (m, clockwise) in [(&left, true), (&right, false)] {
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                for speed in 0..20 {
                    m.run(clockwise, speed * 10).unwrap();
                }
            });
        }
    });

    let writes = io.output_writes();
    assert_eq!(writes.len(), 2 * 20 * 7);

    for txn in writes.chunks(7) {
        let address = u8::from(level(&txn[0], 12))
            | u8::from(level(&txn[1], 6)) << 1
            | u8::from(level(&txn[2], 5)) << 2;
        let clockwise = level(&txn[3], 1);
        assert!(!level(&txn[4], 15));
        assert!(level(&txn[5], 15));

        match txn[6] {
            IoEvent::SetDuty { pin: 18, .. } => {
                assert_eq!(address, 1);
                assert!(clockwise);
            }
            IoEvent::SetDuty { pin: 19, .. } => {
                assert_eq!(address, 6);
                assert!(!clockwise);
            }
            ref other => panic!("transaction must end with a duty write, got {other:?}"),
        }
    }
}

#[test]
fn stop_and_run_on_one_latch_never_interleave() {
    let io = Arc::new(RecordingIo::new().with_latency(LATENCY));
    let registry = BusRegistry::new(io.clone());
    registry.register_latch_bus(&latch_bus()).unwrap();

    let a = Motor::new(&motor("a", 18, 2), &registry).unwrap();
    let b = Motor::new(&motor("b", 19, 5), &registry).unwrap();
    io.clear();

    thread::scope(|s| {
        s.spawn(|| {
            for _ in 0..15 {
                a.run(true, 100).unwrap();
                a.stop().unwrap();
            }
        });
        s.spawn(|| {
            for _ in 0..15 {
                b.stop().unwrap();
            }
        });
    });

    for txn in io.output_writes().chunks(7) {
        let address = u8::from(level(&txn[0], 12))
            | u8::from(level(&txn[1], 6)) << 1
            | u8::from(level(&txn[2], 5)) << 2;
        match txn[6] {
            IoEvent::SetDuty { pin: 18, .. } => assert_eq!(address, 2),
            IoEvent::SetDuty { pin: 19, .. } => assert_eq!(address, 5),
            ref other => panic!("unexpected {other:?}"),
        }
    }
}

#[test]
fn concurrent_first_use_opens_bus_once() {
    let io = Arc::new(RecordingIo::new().with_latency(LATENCY));
    let registry = BusRegistry::new(io.clone());
    registry
        .register_adc_bus(&AdcBusConfig { id: 1, address: 0x48 })
        .unwrap();

    let pots: Vec<PotentiometerChannel> = (0..8)
        .map(|channel| {
            PotentiometerChannel::new(
                &PotentiometerConfig {
                    name: format!("pot{channel}"),
                    bus: 1,
                    channel,
                    resolution_bits: 12,
                    max_rotation_deg: 285.0,
                },
                &registry,
            )
            .unwrap()
        })
        .collect();

    let barrier = Barrier::new(pots.len());
    thread::scope(|s| {
        for pot in &pots {
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                pot.read_raw().unwrap();
                pot.read_raw().unwrap();
            });
        }
    });

    assert_eq!(io.open_count(), 1);
    assert!(registry.adc_bus(1).unwrap().is_open());
}

#[test]
fn adc_transactions_never_interleave() {
    let io = Arc::new(RecordingIo::new().with_latency(LATENCY));
    let registry = BusRegistry::new(io.clone());
    registry
        .register_adc_bus(&AdcBusConfig { id: 1, address: 0x48 })
        .unwrap();

    let pots: Vec<PotentiometerChannel> = [0u8, 3, 7]
        .into_iter()
        .map(|channel| {
            PotentiometerChannel::new(
                &PotentiometerConfig {
                    name: format!("pot{channel}"),
                    bus: 1,
                    channel,
                    resolution_bits: 12,
                    max_rotation_deg: 285.0,
                },
                &registry,
            )
            .unwrap()
        })
        .collect();

    thread::scope(|s| {
        for pot in &pots {
            s.spawn(move || {
                for _ in 0..10 {
                    pot.read_raw().unwrap();
                }
            });
        }
    });

    let bus_events: Vec<IoEvent> = io
        .events()
        .into_iter()
        .filter(|e| matches!(e, IoEvent::WriteByte { .. } | IoEvent::ReadBytes { .. }))
        .collect();
    assert_eq!(bus_events.len(), 3 * 10 * 2);
    for pair in bus_events.chunks(2) {
        assert!(matches!(pair[0], IoEvent::WriteByte { .. }));
        assert!(matches!(pair[1], IoEvent::ReadBytes { len: 2, .. }));
    }
}

#[test]
fn independent_buses_each_open_once() {
    let io = Arc::new(RecordingIo::new());
    let registry = BusRegistry::new(io.clone());
    for id in [1, 3] {
        registry
            .register_adc_bus(&AdcBusConfig { id, address: 0x48 })
            .unwrap();
    }

    for bus in [1, 3, 1, 3] {
        let pot = PotentiometerChannel::new(
            &PotentiometerConfig {
                name: format!("bus{bus}"),
                bus,
                channel: 0,
                resolution_bits: 12,
                max_rotation_deg: 285.0,
            },
            &registry,
        )
        .unwrap();
        pot.read_raw().unwrap();
    }

    assert_eq!(io.open_count(), 2);
    assert_eq!(registry.adc_bus_ids(), vec![1, 3]);
}
