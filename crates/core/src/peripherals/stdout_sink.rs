use std::any::Any;
use std::io::{self, Write};
use std::sync::Arc;

use bitflags::bitflags;
use putwire_config::DrainPolicy;

use crate::snapshot::SinkSnapshot;
use crate::{SimResult, SinkObserver};

pub const DATA_OFFSET: u64 = 0x00;
pub const STATUS_OFFSET: u64 = 0x04;

bitflags! {
    /// Sink status word at offset 0x4.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SinkStatus: u32 {
        /// The data register holds a value the consumer has not taken yet.
        const PENDING = 1 << 0;
        /// A pending value was overwritten. Sticky, write 1 to clear.
        const OVERRUN = 1 << 1;
    }
}

/// The external consumer of the console's output register.
///
/// Data register at 0x0 (word wide), status at 0x4. Values are never queued:
/// a store while a value is still pending replaces it and counts as lost.
#[derive(Debug)]
pub struct StdoutSink {
    drain: DrainPolicy,
    echo: bool,
    data: u32,
    status: SinkStatus,
    captured: Vec<i32>,
    writes: u64,
    lost: u64,
    observers: Vec<Arc<dyn SinkObserver>>,
}

impl StdoutSink {
    pub fn new(drain: DrainPolicy, echo: bool) -> Self {
        Self {
            drain,
            echo,
            data: 0,
            status: SinkStatus::empty(),
            captured: Vec::new(),
            writes: 0,
            lost: 0,
            observers: Vec::new(),
        }
    }

    pub fn add_observer(&mut self, observer: Arc<dyn SinkObserver>) {
        self.observers.push(observer);
    }

    pub fn drain_policy(&self) -> DrainPolicy {
        self.drain
    }

    pub fn set_echo(&mut self, echo: bool) {
        self.echo = echo;
    }

    /// Last value stored into the data register, drained or not.
    pub fn register(&self) -> i32 {
        self.data as i32
    }

    pub fn status(&self) -> SinkStatus {
        self.status
    }

    pub fn is_pending(&self) -> bool {
        self.status.contains(SinkStatus::PENDING)
    }

    pub fn captured(&self) -> &[i32] {
        &self.captured
    }

    /// Drained values that fit in a byte, decoded lossily as UTF-8.
    pub fn text(&self) -> String {
        let bytes: Vec<u8> = self
            .captured
            .iter()
            .filter_map(|&v| u8::try_from(v).ok())
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }

    pub fn lost(&self) -> u64 {
        self.lost
    }

    fn store(&mut self, value: u32) {
        let value_i = value as i32;
        self.writes += 1;
        for o in &self.observers {
            o.on_write(value_i);
        }

        if self.is_pending() {
            let overwritten = self.data as i32;
            self.lost += 1;
            self.status.insert(SinkStatus::OVERRUN);
            tracing::warn!(
                "stdout sink overrun: {:#x} overwritten before it was drained",
                overwritten
            );
            for o in &self.observers {
                o.on_overrun(overwritten);
            }
        }

        self.data = value;
        self.status.insert(SinkStatus::PENDING);
        tracing::debug!("stdout sink <- {:#x}", value);

        if self.drain == DrainPolicy::Synchronous {
            self.drain_one();
        }
    }

    /// Consume the pending value, if any.
    pub fn drain_one(&mut self) -> bool {
        if !self.is_pending() {
            return false;
        }
        let value = self.data as i32;
        self.status.remove(SinkStatus::PENDING);
        self.captured.push(value);
        for o in &self.observers {
            o.on_drain(value);
        }
        if self.echo {
            self.echo_value(value);
        }
        true
    }

    fn echo_value(&self, value: i32) {
        let Ok(byte) = u8::try_from(value) else {
            tracing::debug!("Not echoing non-byte value {:#x}", value);
            return;
        };
        let mut out = io::stdout().lock();
        if let Err(e) = out.write_all(&[byte]).and_then(|_| out.flush()) {
            tracing::warn!("Failed to echo sink output: {}", e);
        }
    }

    pub fn snapshot_state(&self) -> SinkSnapshot {
        SinkSnapshot {
            drain: self.drain,
            register: self.register(),
            status: self.status.bits(),
            captured: self.captured.clone(),
            text: self.text(),
            writes: self.writes,
            lost: self.lost,
        }
    }
}

impl crate::Peripheral for StdoutSink {
    fn read(&self, offset: u64) -> SimResult<u8> {
        let (word, byte) = (offset & !3, (offset % 4) as u32);
        let value = match word {
            DATA_OFFSET => self.data,
            STATUS_OFFSET => self.status.bits(),
            _ => 0,
        };
        Ok(((value >> (byte * 8)) & 0xFF) as u8)
    }

    fn write(&mut self, offset: u64, value: u8) -> SimResult<()> {
        match offset {
            // Byte store to the data register, zero-extended
            DATA_OFFSET => self.store(value as u32),
            STATUS_OFFSET => {
                let clear = SinkStatus::from_bits_truncate(value as u32) & SinkStatus::OVERRUN;
                self.status.remove(clear);
            }
            _ => {}
        }
        Ok(())
    }

    fn write_word(&mut self, offset: u64, value: u32) -> SimResult<()> {
        match offset {
            DATA_OFFSET => self.store(value),
            STATUS_OFFSET => {
                let clear = SinkStatus::from_bits_truncate(value) & SinkStatus::OVERRUN;
                self.status.remove(clear);
            }
            _ => {}
        }
        Ok(())
    }

    fn tick(&mut self) -> bool {
        match self.drain {
            DrainPolicy::OnTick => self.drain_one(),
            DrainPolicy::Synchronous | DrainPolicy::Never => false,
        }
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot_state()).unwrap_or(serde_json::Value::Null)
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }
}
