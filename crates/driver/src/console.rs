use core::ffi::{c_int, CStr};
use core::fmt;

use crate::flag::{FlagState, ReadyFlag};
use crate::register::OutputRegister;

/// Write one value to `register` under `flag`, spinning until it is free.
///
/// The flag is `Busy` for exactly the duration of the write.
pub fn write_guarded<R: OutputRegister + ?Sized>(flag: &ReadyFlag, register: &R, c: c_int) -> c_int {
    flag.acquire();
    register.write(c);
    flag.release();
    c
}

/// Write each byte of `s` followed by a newline.
pub fn puts_guarded<R: OutputRegister + ?Sized>(flag: &ReadyFlag, register: &R, s: &CStr) -> c_int {
    for &b in s.to_bytes() {
        write_guarded(flag, register, c_int::from(b));
    }
    write_guarded(flag, register, c_int::from(b'\n'));
    0
}

/// Character output driver over a single output register.
#[derive(Debug)]
pub struct Console<R> {
    flag: ReadyFlag,
    register: R,
}

impl<R: OutputRegister> Console<R> {
    pub const fn new(register: R) -> Self {
        Self {
            flag: ReadyFlag::new(),
            register,
        }
    }

    /// Spin until the register is free, write `c` as-is and return it.
    pub fn putchar(&self, c: c_int) -> c_int {
        write_guarded(&self.flag, &self.register, c)
    }

    /// Like [`Console::putchar`], but gives up instead of spinning when
    /// another write is in flight.
    pub fn try_putchar(&self, c: c_int) -> Option<c_int> {
        if !self.flag.try_acquire() {
            return None;
        }
        self.register.write(c);
        self.flag.release();
        Some(c)
    }

    /// Write `s` up to its terminator, then a newline. Always returns 0.
    pub fn puts(&self, s: &CStr) -> c_int {
        puts_guarded(&self.flag, &self.register, s)
    }

    pub fn flag_state(&self) -> FlagState {
        self.flag.state()
    }

    pub fn register(&self) -> &R {
        &self.register
    }

    pub fn into_register(self) -> R {
        self.register
    }
}

impl<R: OutputRegister> fmt::Write for Console<R> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        (&*self).write_str(s)
    }
}

impl<R: OutputRegister> fmt::Write for &Console<R> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            self.putchar(c_int::from(b));
        }
        Ok(())
    }
}
