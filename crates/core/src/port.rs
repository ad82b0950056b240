use std::ffi::c_int;
use std::sync::{Arc, Mutex, MutexGuard};

use putwire_driver::OutputRegister;

use crate::bus::SystemBus;
use crate::Bus;

/// Output register backed by a word store on the simulated bus.
///
/// The driver cannot observe failures, so a faulting store is logged and
/// dropped, the same way a store to an unmapped address vanishes on hardware
/// without a bus fault handler.
#[derive(Debug, Clone)]
pub struct BusPort {
    bus: Arc<Mutex<SystemBus>>,
    addr: u64,
}

impl BusPort {
    pub fn new(bus: Arc<Mutex<SystemBus>>, addr: u64) -> Self {
        Self { bus, addr }
    }

    pub fn addr(&self) -> u64 {
        self.addr
    }
}

impl OutputRegister for BusPort {
    fn write(&self, value: c_int) {
        let mut bus = lock_recover(&self.bus);
        if let Err(e) = bus.write_u32(self.addr, value as u32) {
            tracing::error!("Output register store of {:#x} dropped: {}", value, e);
        }
    }
}

/// Lock the bus even if a previous holder panicked; bus state is plain data.
pub(crate) fn lock_recover(bus: &Mutex<SystemBus>) -> MutexGuard<'_, SystemBus> {
    match bus.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
