//! Recording `HardwareIO` backend for tests.
//!
//! Every call is appended to an event log in call order. Analog samples and
//! ADC responses are served from per-pin / per-bus scripts, falling back to
//! a fixed default once a script runs dry. Failures can be injected per
//! operation kind, and an optional latency is slept after every call to
//! widen race windows in concurrency tests.

use limb_common::hal::error::HalError;
use limb_common::hal::io::{BusHandle, HardwareIO, Pin, PinMode};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tracing::trace;

/// One recorded `HardwareIO` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoEvent {
    /// `set_mode`
    SetMode {
        /// Pin
        pin: Pin,
        /// Requested mode
        mode: PinMode,
    },
    /// `write`
    Write {
        /// Pin
        pin: Pin,
        /// Level written
        level: bool,
    },
    /// `read`
    Read {
        /// Pin
        pin: Pin,
    },
    /// `set_pwm_frequency`
    SetFrequency {
        /// Pin
        pin: Pin,
        /// Frequency in Hz
        hz: u32,
    },
    /// `set_duty`
    SetDuty {
        /// Pin
        pin: Pin,
        /// Duty written
        duty: u8,
    },
    /// `read_raw`
    ReadRaw {
        /// Pin
        pin: Pin,
    },
    /// `open_bus`
    Open {
        /// Bus number
        bus: u8,
        /// Device address
        address: u16,
    },
    /// `write_byte`
    WriteByte {
        /// Handle written to
        handle: BusHandle,
        /// Byte sent
        byte: u8,
    },
    /// `read_bytes`
    ReadBytes {
        /// Handle read from
        handle: BusHandle,
        /// Bytes requested
        len: usize,
    },
}

impl IoEvent {
    /// Whether the call drives an output (pin level or PWM duty).
    pub fn is_output_write(&self) -> bool {
        matches!(self, Self::Write { .. } | Self::SetDuty { .. })
    }
}

/// Operation kinds that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoOp {
    /// `write`
    Write,
    /// `set_duty`
    SetDuty,
    /// `read_raw`
    ReadRaw,
    /// `open_bus`
    Open,
    /// `write_byte`
    WriteByte,
    /// `read_bytes`
    ReadBytes,
}

#[derive(Default)]
struct Script {
    analog: HashMap<Pin, VecDeque<u32>>,
    responses: HashMap<BusHandle, VecDeque<Vec<u8>>>,
    inputs: HashMap<Pin, bool>,
    failing: HashSet<IoOp>,
    next_handle: u32,
}

/// `HardwareIO` that records every call.
pub struct RecordingIo {
    events: Mutex<Vec<IoEvent>>,
    script: Mutex<Script>,
    default_raw: u32,
    default_response: Vec<u8>,
    latency: Option<Duration>,
}

impl RecordingIo {
    /// Create a recorder answering `0` to every sample and `[0, 0]` to
    /// every ADC read.
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            script: Mutex::new(Script::default()),
            default_raw: 0,
            default_response: vec![0, 0],
            latency: None,
        }
    }

    /// Sleep this long after every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Answer `read_raw` with `raw` when no sample is scripted.
    pub fn with_default_raw(mut self, raw: u32) -> Self {
        self.default_raw = raw;
        self
    }

    /// Answer `read_bytes` with `bytes` when no response is scripted.
    pub fn with_default_response(mut self, bytes: Vec<u8>) -> Self {
        self.default_response = bytes;
        self
    }

    /// Queue analog samples for a pin.
    pub fn push_samples(&self, pin: Pin, samples: impl IntoIterator<Item = u32>) {
        if let Ok(mut script) = self.script.lock() {
            script.analog.entry(pin).or_default().extend(samples);
        }
    }

    /// Queue ADC responses for a handle (handles are numbered from 0 in
    /// open order).
    pub fn push_responses(&self, handle: BusHandle, responses: impl IntoIterator<Item = Vec<u8>>) {
        if let Ok(mut script) = self.script.lock() {
            script.responses.entry(handle).or_default().extend(responses);
        }
    }

    /// Set the level returned by `read` on a pin.
    pub fn set_input(&self, pin: Pin, level: bool) {
        if let Ok(mut script) = self.script.lock() {
            script.inputs.insert(pin, level);
        }
    }

    /// Make every call of `op` fail until `heal` is called.
    pub fn fail(&self, op: IoOp) {
        if let Ok(mut script) = self.script.lock() {
            script.failing.insert(op);
        }
    }

    /// Stop failing `op`.
    pub fn heal(&self, op: IoOp) {
        if let Ok(mut script) = self.script.lock() {
            script.failing.remove(&op);
        }
    }

    /// Snapshot of the event log.
    pub fn events(&self) -> Vec<IoEvent> {
        self.events
            .lock()
            .map(|events| events.to_vec())
            .unwrap_or_default()
    }

    /// Snapshot of output writes only.
    pub fn output_writes(&self) -> Vec<IoEvent> {
        self.events()
            .into_iter()
            .filter(IoEvent::is_output_write)
            .collect()
    }

    /// Forget recorded events.
    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }

    /// Number of `open_bus` calls so far.
    pub fn open_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, IoEvent::Open { .. }))
            .count()
    }

    fn record(&self, event: IoEvent, op: Option<IoOp>) -> Result<(), HalError> {
        trace!("recorded {:?}", event);
        self.events.lock()?.push(event);
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
        let Some(op) = op else {
            return Ok(());
        };
        if self.script.lock()?.failing.contains(&op) {
            return Err(HalError::io(format!("injected {op:?} failure")));
        }
        Ok(())
    }
}

impl Default for RecordingIo {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareIO for RecordingIo {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn set_mode(&self, pin: Pin, mode: PinMode) -> Result<(), HalError> {
        self.record(IoEvent::SetMode { pin, mode }, None)
    }

    fn write(&self, pin: Pin, level: bool) -> Result<(), HalError> {
        self.record(IoEvent::Write { pin, level }, Some(IoOp::Write))
    }

    fn read(&self, pin: Pin) -> Result<bool, HalError> {
        self.record(IoEvent::Read { pin }, None)?;
        Ok(self.script.lock()?.inputs.get(&pin).copied().unwrap_or(false))
    }

    fn set_pwm_frequency(&self, pin: Pin, hz: u32) -> Result<(), HalError> {
        self.record(IoEvent::SetFrequency { pin, hz }, None)
    }

    fn set_duty(&self, pin: Pin, duty: u8) -> Result<(), HalError> {
        self.record(IoEvent::SetDuty { pin, duty }, Some(IoOp::SetDuty))
    }

    fn read_raw(&self, pin: Pin) -> Result<u32, HalError> {
        self.record(IoEvent::ReadRaw { pin }, Some(IoOp::ReadRaw))?;
        let mut script = self.script.lock()?;
        Ok(script
            .analog
            .get_mut(&pin)
            .and_then(VecDeque::pop_front)
            .unwrap_or(self.default_raw))
    }

    fn open_bus(&self, bus: u8, address: u16) -> Result<BusHandle, HalError> {
        self.record(IoEvent::Open { bus, address }, Some(IoOp::Open))?;
        let mut script = self.script.lock()?;
        let handle = BusHandle(script.next_handle);
        script.next_handle += 1;
        Ok(handle)
    }

    fn write_byte(&self, handle: BusHandle, byte: u8) -> Result<(), HalError> {
        self.record(IoEvent::WriteByte { handle, byte }, Some(IoOp::WriteByte))
    }

    fn read_bytes(&self, handle: BusHandle, len: usize) -> Result<Vec<u8>, HalError> {
        self.record(IoEvent::ReadBytes { handle, len }, Some(IoOp::ReadBytes))?;
        let mut script = self.script.lock()?;
        Ok(script
            .responses
            .get_mut(&handle)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.default_response.clone()))
    }
}
