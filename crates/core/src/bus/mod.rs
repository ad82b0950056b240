use crate::memory::LinearMemory;
use crate::peripherals::stdout_sink::StdoutSink;
use crate::{byte_addr, Peripheral, SimResult, SimulationError};
use putwire_config::{
    DrainPolicy, SystemManifest, DEFAULT_RAM_BASE, DEFAULT_RAM_BYTES, DEFAULT_SINK_BASE,
    SINK_WINDOW_SIZE,
};

pub const STDOUT_SINK_NAME: &str = "stdout";

#[derive(Debug)]
pub struct PeripheralEntry {
    pub name: String,
    pub base: u64,
    pub size: u64,
    pub dev: Box<dyn Peripheral>,
}

impl PeripheralEntry {
    fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr - self.base < self.size
    }
}

#[derive(Debug)]
pub struct SystemBus {
    pub ram: LinearMemory,
    pub peripherals: Vec<PeripheralEntry>,
}

impl SystemBus {
    /// Default board: 64KB of RAM at 0x2000_0000 and a synchronously drained
    /// stdout sink at 0x4000_C000.
    pub fn new() -> Self {
        Self::with_sink_at(DEFAULT_SINK_BASE, DrainPolicy::Synchronous, true)
    }

    pub fn from_config(manifest: &SystemManifest) -> anyhow::Result<Self> {
        manifest.validate()?;
        let ram_size = manifest.ram_size()?;

        tracing::info!(
            "Building '{}': RAM {:#x}+{:#x}, sink at {:#x} ({:?})",
            manifest.name,
            manifest.ram.base,
            ram_size,
            manifest.sink.base_address,
            manifest.sink.drain
        );

        Ok(Self {
            ram: LinearMemory::new(ram_size as usize, manifest.ram.base),
            peripherals: vec![PeripheralEntry {
                name: STDOUT_SINK_NAME.to_string(),
                base: manifest.sink.base_address,
                size: SINK_WINDOW_SIZE,
                dev: Box::new(StdoutSink::new(manifest.sink.drain, manifest.sink.echo)),
            }],
        })
    }

    /// A bus with the default RAM and a stdout sink mapped at `sink_base`,
    /// bypassing manifest validation.
    pub fn with_sink_at(sink_base: u64, drain: DrainPolicy, echo: bool) -> Self {
        Self {
            ram: LinearMemory::new(DEFAULT_RAM_BYTES as usize, DEFAULT_RAM_BASE),
            peripherals: vec![PeripheralEntry {
                name: STDOUT_SINK_NAME.to_string(),
                base: sink_base,
                size: SINK_WINDOW_SIZE,
                dev: Box::new(StdoutSink::new(drain, echo)),
            }],
        }
    }

    /// A bus with RAM only, for exercising the console without a consumer.
    pub fn without_sink() -> Self {
        Self {
            ram: LinearMemory::new(DEFAULT_RAM_BYTES as usize, DEFAULT_RAM_BASE),
            peripherals: Vec::new(),
        }
    }

    fn find_peripheral(&self, addr: u64) -> Option<usize> {
        self.peripherals.iter().position(|p| p.contains(addr))
    }

    fn sink_entry(&self) -> Option<&PeripheralEntry> {
        self.peripherals.iter().find(|p| p.name == STDOUT_SINK_NAME)
    }

    pub fn sink_base(&self) -> Option<u64> {
        self.sink_entry().map(|p| p.base)
    }

    pub fn sink(&self) -> Option<&StdoutSink> {
        self.sink_entry()
            .and_then(|p| p.dev.as_any())
            .and_then(|any| any.downcast_ref::<StdoutSink>())
    }

    pub fn sink_mut(&mut self) -> Option<&mut StdoutSink> {
        self.peripherals
            .iter_mut()
            .find(|p| p.name == STDOUT_SINK_NAME)
            .and_then(|p| p.dev.as_any_mut())
            .and_then(|any| any.downcast_mut::<StdoutSink>())
    }
}

impl Default for SystemBus {
    fn default() -> Self {
        Self::new()
    }
}

impl crate::Bus for SystemBus {
    fn read_u8(&self, addr: u64) -> SimResult<u8> {
        if let Some(byte) = self.ram.read_u8(addr) {
            return Ok(byte);
        }
        if let Some(idx) = self.find_peripheral(addr) {
            let p = &self.peripherals[idx];
            return p.dev.read(addr - p.base);
        }
        Err(SimulationError::MemoryViolation(addr))
    }

    fn write_u8(&mut self, addr: u64, value: u8) -> SimResult<()> {
        if self.ram.write_u8(addr, value) {
            return Ok(());
        }
        if let Some(idx) = self.find_peripheral(addr) {
            let p = &mut self.peripherals[idx];
            return p.dev.write(addr - p.base, value);
        }
        Err(SimulationError::MemoryViolation(addr))
    }

    // Word stores to a peripheral are delivered whole
    fn write_u32(&mut self, addr: u64, value: u32) -> SimResult<()> {
        if let Some(idx) = self.find_peripheral(addr) {
            let p = &mut self.peripherals[idx];
            if !p.contains(byte_addr(addr, 3)?) {
                return Err(SimulationError::MemoryViolation(addr));
            }
            return p.dev.write_word(addr - p.base, value);
        }
        for (i, b) in value.to_le_bytes().into_iter().enumerate() {
            self.write_u8(byte_addr(addr, i)?, b)?;
        }
        Ok(())
    }

    fn tick_peripherals(&mut self) -> usize {
        let mut active = 0;
        for p in self.peripherals.iter_mut() {
            if p.dev.tick() {
                tracing::trace!("Peripheral '{}' active", p.name);
                active += 1;
            }
        }
        active
    }
}
