use core::ffi::c_int;

/// A one-value-wide output sink the driver writes characters into.
///
/// Writes overwrite: the register holds at most one value and does not queue.
/// Implementations must not fail; a sink that cannot accept the value simply
/// drops it.
pub trait OutputRegister {
    fn write(&self, value: c_int);
}

impl<R: OutputRegister + ?Sized> OutputRegister for &R {
    fn write(&self, value: c_int) {
        (**self).write(value)
    }
}

/// Memory-mapped output register at a fixed address.
#[derive(Debug)]
pub struct MmioRegister {
    addr: *mut c_int,
}

// SAFETY: the register is a fixed hardware location; writes are serialised
// by the console's ready flag.
unsafe impl Send for MmioRegister {}
unsafe impl Sync for MmioRegister {}

impl MmioRegister {
    /// Creates an accessor for the register at `addr`.
    ///
    /// # Safety
    ///
    /// `addr` must be valid for volatile `int`-sized writes, and suitably
    /// aligned, for as long as the accessor is used.
    pub const unsafe fn new(addr: *mut c_int) -> Self {
        Self { addr }
    }

    /// # Safety
    ///
    /// See [`MmioRegister::new`].
    pub const unsafe fn from_address(addr: usize) -> Self {
        Self::new(addr as *mut c_int)
    }

    pub fn address(&self) -> usize {
        self.addr as usize
    }
}

impl OutputRegister for MmioRegister {
    fn write(&self, value: c_int) {
        // SAFETY: validity of `addr` is guaranteed by the constructor contract.
        unsafe { self.addr.write_volatile(value) }
    }
}
