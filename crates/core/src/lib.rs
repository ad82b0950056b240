pub mod bus;
pub mod memory;
pub mod metrics;
pub mod peripherals;
pub mod port;
pub mod snapshot;

use std::any::Any;
use std::collections::HashMap;
use std::ffi::{c_int, CStr, CString};
use std::sync::{Arc, Mutex, MutexGuard};

use putwire_driver::{Console, FlagState};

use crate::peripherals::stdout_sink::StdoutSink;
use crate::port::BusPort;

mod tests;

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("Memory access violation at {0:#x}")]
    MemoryViolation(u64),
    #[error("String at {0:#x} is not NUL-terminated within mapped memory")]
    UnterminatedString(u64),
    #[error("No output sink is mapped on the bus")]
    NoSink,
}

pub type SimResult<T> = Result<T, SimulationError>;

/// Trait for observing output sink events in a modular way.
pub trait SinkObserver: std::fmt::Debug + Send + Sync {
    fn on_write(&self, _value: i32) {}
    fn on_drain(&self, _value: i32) {}
    fn on_overrun(&self, _lost: i32) {}
}

/// Trait representing a memory-mapped peripheral
pub trait Peripheral: std::fmt::Debug + Send {
    fn read(&self, offset: u64) -> SimResult<u8>;
    fn write(&mut self, offset: u64, value: u8) -> SimResult<()>;

    /// A single word-wide store. Peripherals with word registers override this
    /// so a 32-bit store is seen as one event instead of four byte writes.
    fn write_word(&mut self, offset: u64, value: u32) -> SimResult<()> {
        for (i, b) in value.to_le_bytes().into_iter().enumerate() {
            self.write(offset + i as u64, b)?;
        }
        Ok(())
    }

    fn tick(&mut self) -> bool {
        false
    }
    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
    fn as_any(&self) -> Option<&dyn Any> {
        None
    }
    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        None
    }
}

/// Trait representing the system bus
pub trait Bus {
    fn read_u8(&self, addr: u64) -> SimResult<u8>;
    fn write_u8(&mut self, addr: u64, value: u8) -> SimResult<()>;
    fn tick_peripherals(&mut self) -> usize; // Returns number of peripherals that did work

    fn read_u32(&self, addr: u64) -> SimResult<u32> {
        let mut bytes = [0u8; 4];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = self.read_u8(byte_addr(addr, i)?)?;
        }
        Ok(u32::from_le_bytes(bytes))
    }

    fn write_u32(&mut self, addr: u64, value: u32) -> SimResult<()> {
        for (i, b) in value.to_le_bytes().into_iter().enumerate() {
            self.write_u8(byte_addr(addr, i)?, b)?;
        }
        Ok(())
    }
}

/// Address of byte `i` of an access at `addr`; wrapping past the top of the
/// address space is a violation.
pub(crate) fn byte_addr(addr: u64, i: usize) -> SimResult<u64> {
    addr.checked_add(i as u64)
        .ok_or(SimulationError::MemoryViolation(addr))
}

/// A simulated board: the system bus plus a console driver whose output
/// register is the bus-mapped stdout sink.
pub struct Machine {
    pub bus: Arc<Mutex<bus::SystemBus>>,
    console: Console<BusPort>,
}

impl Machine {
    pub fn new() -> Self {
        Self::with_bus(bus::SystemBus::new())
    }

    /// Construct a machine around an existing bus. The console targets the
    /// bus's stdout sink, or an unmapped address if there is none (writes are
    /// then logged and dropped).
    pub fn with_bus(bus: bus::SystemBus) -> Self {
        let sink_base = bus.sink_base().unwrap_or_else(|| {
            tracing::warn!("No stdout sink mapped; console output will fault");
            putwire_config::DEFAULT_SINK_BASE
        });
        let bus = Arc::new(Mutex::new(bus));
        let console = Console::new(BusPort::new(bus.clone(), sink_base));
        Self { bus, console }
    }

    pub fn from_manifest(manifest: &putwire_config::SystemManifest) -> anyhow::Result<Self> {
        Ok(Self::with_bus(bus::SystemBus::from_config(manifest)?))
    }

    pub fn console(&self) -> &Console<BusPort> {
        &self.console
    }

    pub fn putchar(&self, c: c_int) -> c_int {
        self.console.putchar(c)
    }

    pub fn puts(&self, s: &CStr) -> c_int {
        self.console.puts(s)
    }

    pub fn flag_state(&self) -> FlagState {
        self.console.flag_state()
    }

    /// Store `bytes` plus a NUL terminator into simulated memory at `addr`.
    pub fn load_cstr(&self, addr: u64, bytes: &[u8]) -> SimResult<()> {
        let mut bus = self.lock_bus();
        for (i, &b) in bytes.iter().chain(std::iter::once(&0u8)).enumerate() {
            crate::Bus::write_u8(&mut *bus, byte_addr(addr, i)?, b)?;
        }
        Ok(())
    }

    /// `puts` on a string that lives in simulated memory. Bytes are read one at
    /// a time up to and including the terminator, never past it.
    pub fn puts_at(&self, addr: u64) -> SimResult<c_int> {
        let mut bytes = Vec::new();
        {
            let bus = self.lock_bus();
            let mut cursor = addr;
            loop {
                let b = match crate::Bus::read_u8(&*bus, cursor) {
                    Ok(b) => b,
                    Err(SimulationError::MemoryViolation(_)) => {
                        return Err(SimulationError::UnterminatedString(addr));
                    }
                    Err(e) => return Err(e),
                };
                if b == 0 {
                    break;
                }
                bytes.push(b);
                cursor = byte_addr(cursor, 1)
                    .map_err(|_| SimulationError::UnterminatedString(addr))?;
            }
        }

        // The loop stops at the first NUL, so `bytes` has none inside
        let s = CString::new(bytes).map_err(|_| SimulationError::UnterminatedString(addr))?;
        Ok(self.console.puts(&s))
    }

    pub fn step(&self) -> usize {
        let mut bus = self.lock_bus();
        crate::Bus::tick_peripherals(&mut *bus)
    }

    pub fn run_ticks(&self, ticks: u64) {
        for _ in 0..ticks {
            self.step();
        }
    }

    pub fn add_observer(&self, observer: Arc<dyn SinkObserver>) -> SimResult<()> {
        self.with_sink_mut(|sink| sink.add_observer(observer))
    }

    pub fn with_sink<T>(&self, f: impl FnOnce(&StdoutSink) -> T) -> SimResult<T> {
        let bus = self.lock_bus();
        bus.sink().map(f).ok_or(SimulationError::NoSink)
    }

    pub fn with_sink_mut<T>(&self, f: impl FnOnce(&mut StdoutSink) -> T) -> SimResult<T> {
        let mut bus = self.lock_bus();
        bus.sink_mut().map(f).ok_or(SimulationError::NoSink)
    }

    /// Values the sink has drained, in order.
    pub fn output(&self) -> SimResult<Vec<i32>> {
        self.with_sink(|sink| sink.captured().to_vec())
    }

    pub fn output_text(&self) -> SimResult<String> {
        self.with_sink(|sink| sink.text())
    }

    pub fn snapshot(&self) -> snapshot::MachineSnapshot {
        let bus = self.lock_bus();
        let peripherals: HashMap<String, serde_json::Value> = bus
            .peripherals
            .iter()
            .map(|p| (p.name.clone(), p.dev.snapshot()))
            .collect();
        snapshot::MachineSnapshot {
            console: snapshot::ConsoleSnapshot {
                register_addr: self.console.register().addr(),
                ready: self.console.flag_state() == FlagState::Ready,
            },
            ram_base: bus.ram.base_addr,
            ram_size: bus.ram.data.len() as u64,
            peripherals,
        }
    }

    fn lock_bus(&self) -> MutexGuard<'_, bus::SystemBus> {
        port::lock_recover(&self.bus)
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}
