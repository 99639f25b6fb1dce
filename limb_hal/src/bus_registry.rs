//! Shared physical buses.
//!
//! Several logical devices sit on one set of wires: every potentiometer on a
//! board talks to the same ADC over one serial bus, and up to eight motor
//! drivers share one address latch. `BusRegistry` owns one [`AdcBus`] per
//! bus id and one [`LatchBus`] per latch bank and hands out `Arc`s to them,
//! so devices built from the same registry share handles and locks.
//!
//! Both bus kinds expose their lines only through a guard returned by
//! `lock()`; a multi-step transaction holds the guard end to end, which keeps
//! transactions on one bus from interleaving. Different buses never contend.

use limb_common::hal::config::{AdcBusConfig, LatchBusConfig};
use limb_common::hal::error::HalError;
use limb_common::hal::io::{BusHandle, HardwareIO, Pin, PinMode};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tracing::{debug, info, trace};

// ─── ADC bus ────────────────────────────────────────────────────────

/// One serial bus carrying the potentiometer ADC.
///
/// The transport handle is opened on first use, exactly once, and cached
/// for the lifetime of the bus.
pub struct AdcBus {
    config: AdcBusConfig,
    io: Arc<dyn HardwareIO>,
    handle: OnceLock<BusHandle>,
    open_lock: Mutex<()>,
    txn_lock: Mutex<()>,
}

impl AdcBus {
    fn new(config: AdcBusConfig, io: Arc<dyn HardwareIO>) -> Self {
        Self {
            config,
            io,
            handle: OnceLock::new(),
            open_lock: Mutex::new(()),
            txn_lock: Mutex::new(()),
        }
    }

    /// Bus id.
    pub fn id(&self) -> u8 {
        self.config.id
    }

    /// Device address of the ADC.
    pub fn address(&self) -> u16 {
        self.config.address
    }

    /// Whether the transport has been opened yet.
    pub fn is_open(&self) -> bool {
        self.handle.get().is_some()
    }

    /// Get the transport handle, opening it if this is the first use.
    ///
    /// Concurrent first callers serialize on a per-bus open lock; only the
    /// first one calls `open_bus`. Later callers read the cached handle
    /// without locking.
    pub fn handle(&self) -> Result<BusHandle, HalError> {
        if let Some(handle) = self.handle.get() {
            return Ok(*handle);
        }

        let _open = self.open_lock.lock()?;
        if let Some(handle) = self.handle.get() {
            return Ok(*handle);
        }

        let handle = self.io.open_bus(self.config.id, self.config.address)?;
        info!(
            "Opened ADC bus {} (addr 0x{:02x}) as {}",
            self.config.id, self.config.address, handle
        );
        Ok(*self.handle.get_or_init(|| handle))
    }

    /// Take exclusive use of the bus for one request/response exchange.
    ///
    /// Opens the transport lazily. The returned guard must be held across
    /// the command write and the response read.
    pub fn lock(&self) -> Result<AdcGuard<'_>, HalError> {
        let handle = self.handle()?;
        let guard = self.txn_lock.lock()?;
        Ok(AdcGuard {
            io: self.io.as_ref(),
            handle,
            _guard: guard,
        })
    }
}

/// Exclusive access to an open ADC bus.
pub struct AdcGuard<'a> {
    io: &'a dyn HardwareIO,
    handle: BusHandle,
    _guard: MutexGuard<'a, ()>,
}

impl AdcGuard<'_> {
    /// Send one command byte.
    pub fn write_byte(&self, byte: u8) -> Result<(), HalError> {
        trace!("{} <- 0x{:02x}", self.handle, byte);
        self.io.write_byte(self.handle, byte)
    }

    /// Read the response.
    pub fn read_bytes(&self, len: usize) -> Result<Vec<u8>, HalError> {
        let bytes = self.io.read_bytes(self.handle, len)?;
        trace!("{} -> {:02x?}", self.handle, bytes);
        Ok(bytes)
    }
}

// ─── Latch bus ──────────────────────────────────────────────────────

/// Address-latched motor bank: address lines, latch enable and the shared
/// direction line.
pub struct LatchBus {
    config: LatchBusConfig,
    io: Arc<dyn HardwareIO>,
    lock: Mutex<()>,
}

impl LatchBus {
    fn new(config: LatchBusConfig, io: Arc<dyn HardwareIO>) -> Result<Self, HalError> {
        for pin in config.pins() {
            io.set_mode(pin, PinMode::Output)?;
        }
        // Hold the latch closed until the first strobe.
        io.write(config.latch_enable_pin, true)?;

        info!(
            "Latch bus {} ready: address pins {:?}, enable {}, direction {}",
            config.id, config.address_pins, config.latch_enable_pin, config.direction_pin
        );
        Ok(Self {
            config,
            io,
            lock: Mutex::new(()),
        })
    }

    /// Bank id.
    pub fn id(&self) -> u8 {
        self.config.id
    }

    /// Wiring of this bank.
    pub fn config(&self) -> &LatchBusConfig {
        &self.config
    }

    /// Take exclusive use of the bank's lines.
    pub fn lock(&self) -> Result<LatchGuard<'_>, HalError> {
        let guard = self.lock.lock()?;
        Ok(LatchGuard {
            bus: self,
            _guard: guard,
        })
    }
}

/// Exclusive access to a latch bank for one motor transaction.
pub struct LatchGuard<'a> {
    bus: &'a LatchBus,
    _guard: MutexGuard<'a, ()>,
}

impl LatchGuard<'_> {
    /// Put `address` and the direction on the lines and strobe the latch,
    /// committing both into the addressed driver.
    ///
    /// `address` must already be known to fit in three bits.
    pub fn select(&self, address: u8, clockwise: bool) -> Result<(), HalError> {
        let cfg = &self.bus.config;
        let io = self.bus.io.as_ref();

        for (bit, pin) in cfg.address_pins.iter().enumerate() {
            io.write(*pin, (address >> bit) & 1 == 1)?;
        }

        let level = if clockwise {
            cfg.clockwise_level
        } else {
            !cfg.clockwise_level
        };
        io.write(cfg.direction_pin, level)?;

        io.write(cfg.latch_enable_pin, false)?;
        io.write(cfg.latch_enable_pin, true)?;

        debug!(
            "Latch bus {}: selected slot {} (clockwise={})",
            cfg.id, address, clockwise
        );
        Ok(())
    }

    /// Write the duty of a PWM line fed by this bank.
    pub fn set_duty(&self, pin: Pin, duty: u8) -> Result<(), HalError> {
        self.bus.io.set_duty(pin, duty)
    }
}

// ─── Registry ───────────────────────────────────────────────────────

/// Owner of every shared bus built on one `HardwareIO`.
///
/// Constructed at startup and passed to device constructors. No global
/// state; two registries never share a handle.
pub struct BusRegistry {
    io: Arc<dyn HardwareIO>,
    adc_buses: Mutex<HashMap<u8, Arc<AdcBus>>>,
    latch_buses: Mutex<HashMap<u8, Arc<LatchBus>>>,
}

impl BusRegistry {
    /// Create an empty registry on top of a hardware backend.
    pub fn new(io: Arc<dyn HardwareIO>) -> Self {
        Self {
            io,
            adc_buses: Mutex::new(HashMap::new()),
            latch_buses: Mutex::new(HashMap::new()),
        }
    }

    /// The hardware backend shared by every bus and device.
    pub fn io(&self) -> &Arc<dyn HardwareIO> {
        &self.io
    }

    /// Register an ADC bus, or return the existing one for the same id.
    ///
    /// Does not touch the hardware; the transport opens on first use.
    ///
    /// # Errors
    /// `ConfigError` if the id is already registered with another address.
    pub fn register_adc_bus(&self, config: &AdcBusConfig) -> Result<Arc<AdcBus>, HalError> {
        let mut buses = self.adc_buses.lock()?;
        if let Some(existing) = buses.get(&config.id) {
            if existing.config != *config {
                return Err(HalError::ConfigError(format!(
                    "ADC bus {} already registered with address 0x{:02x}",
                    config.id, existing.config.address
                )));
            }
            return Ok(Arc::clone(existing));
        }

        let bus = Arc::new(AdcBus::new(config.clone(), Arc::clone(&self.io)));
        buses.insert(config.id, Arc::clone(&bus));
        debug!("Registered ADC bus {}", config.id);
        Ok(bus)
    }

    /// Register a latch bank, or return the existing one for the same id.
    ///
    /// The first registration configures the bank's lines as outputs.
    ///
    /// # Errors
    /// `ConfigError` if the id is already registered with other wiring,
    /// `HardwareIoFailure` if the lines cannot be configured.
    pub fn register_latch_bus(&self, config: &LatchBusConfig) -> Result<Arc<LatchBus>, HalError> {
        let mut buses = self.latch_buses.lock()?;
        if let Some(existing) = buses.get(&config.id) {
            if existing.config != *config {
                return Err(HalError::ConfigError(format!(
                    "Latch bus {} already registered with different wiring",
                    config.id
                )));
            }
            return Ok(Arc::clone(existing));
        }

        let bus = Arc::new(LatchBus::new(config.clone(), Arc::clone(&self.io))?);
        buses.insert(config.id, Arc::clone(&bus));
        Ok(bus)
    }

    /// Look up a registered ADC bus.
    pub fn adc_bus(&self, id: u8) -> Result<Arc<AdcBus>, HalError> {
        self.adc_buses
            .lock()?
            .get(&id)
            .cloned()
            .ok_or_else(|| HalError::ConfigError(format!("ADC bus {id} is not registered")))
    }

    /// Look up a registered latch bank.
    pub fn latch_bus(&self, id: u8) -> Result<Arc<LatchBus>, HalError> {
        self.latch_buses
            .lock()?
            .get(&id)
            .cloned()
            .ok_or_else(|| HalError::ConfigError(format!("Latch bus {id} is not registered")))
    }

    /// Ids of all registered ADC buses, sorted.
    pub fn adc_bus_ids(&self) -> Vec<u8> {
        let mut ids: Vec<u8> = match self.adc_buses.lock() {
            Ok(buses) => buses.keys().copied().collect(),
            Err(_) => Vec::new(),
        };
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::recording::{IoEvent, RecordingIo};

    fn latch_config() -> LatchBusConfig {
        LatchBusConfig {
            id: 0,
            address_pins: [12, 6, 5],
            latch_enable_pin: 15,
            direction_pin: 1,
            clockwise_level: false,
        }
    }

    #[test]
    fn adc_bus_opens_lazily_once() {
        let io = Arc::new(RecordingIo::new());
        let registry = BusRegistry::new(io.clone());
        let bus = registry
            .register_adc_bus(&AdcBusConfig { id: 1, address: 0x48 })
            .unwrap();

        assert!(!bus.is_open());
        assert_eq!(io.open_count(), 0);

        let first = bus.handle().unwrap();
        let second = bus.handle().unwrap();
        assert_eq!(first, second);
        assert!(bus.is_open());
        assert_eq!(io.open_count(), 1);
    }

    #[test]
    fn register_same_adc_bus_returns_shared_handle() {
        let registry = BusRegistry::new(Arc::new(RecordingIo::new()));
        let cfg = AdcBusConfig { id: 1, address: 0x48 };
        let a = registry.register_adc_bus(&cfg).unwrap();
        let b = registry.register_adc_bus(&cfg).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &registry.adc_bus(1).unwrap()));
        assert_eq!(registry.adc_bus_ids(), vec![1]);
    }

    #[test]
    fn conflicting_adc_address_rejected() {
        let registry = BusRegistry::new(Arc::new(RecordingIo::new()));
        registry
            .register_adc_bus(&AdcBusConfig { id: 1, address: 0x48 })
            .unwrap();
        let result = registry.register_adc_bus(&AdcBusConfig { id: 1, address: 0x49 });
        assert!(matches!(result, Err(HalError::ConfigError(_))));
    }

    #[test]
    fn unknown_bus_lookup_fails() {
        let registry = BusRegistry::new(Arc::new(RecordingIo::new()));
        assert!(matches!(registry.adc_bus(3), Err(HalError::ConfigError(_))));
        assert!(matches!(registry.latch_bus(0), Err(HalError::ConfigError(_))));
    }

    #[test]
    fn latch_bus_configures_lines_once() {
        let io = Arc::new(RecordingIo::new());
        let registry = BusRegistry::new(io.clone());
        registry.register_latch_bus(&latch_config()).unwrap();
        registry.register_latch_bus(&latch_config()).unwrap();

        let modes = io
            .events()
            .into_iter()
            .filter(|e| matches!(e, IoEvent::SetMode { .. }))
            .count();
        assert_eq!(modes, 5);
    }

    #[test]
    fn latch_select_writes_address_direction_strobe() {
        let io = Arc::new(RecordingIo::new());
        let registry = BusRegistry::new(io.clone());
        let bus = registry.register_latch_bus(&latch_config()).unwrap();
        io.clear();

        bus.lock().unwrap().select(0b101, true).unwrap();

        assert_eq!(
            io.events(),
            vec![
                IoEvent::Write { pin: 12, level: true },
                IoEvent::Write { pin: 6, level: false },
                IoEvent::Write { pin: 5, level: true },
                IoEvent::Write { pin: 1, level: false },
                IoEvent::Write { pin: 15, level: false },
                IoEvent::Write { pin: 15, level: true },
            ]
        );
    }

    #[test]
    fn conflicting_latch_wiring_rejected() {
        let registry = BusRegistry::new(Arc::new(RecordingIo::new()));
        registry.register_latch_bus(&latch_config()).unwrap();
        let mut other = latch_config();
        other.direction_pin = 7;
        assert!(registry.register_latch_bus(&other).is_err());
    }
}
