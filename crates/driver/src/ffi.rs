//! C-linkage `putchar`/`puts` for freestanding builds.
//!
//! The output register is the linker symbol `putchar_stdout`, provided by the
//! target's linker script or by the simulator's memory map.

use core::ffi::{c_char, c_int, CStr};
use core::ptr::addr_of_mut;

use crate::console::{puts_guarded, write_guarded};
use crate::flag::ReadyFlag;
use crate::register::MmioRegister;

extern "C" {
    static mut putchar_stdout: c_int;
}

static STDOUT_READY: ReadyFlag = ReadyFlag::new();

fn stdout_register() -> MmioRegister {
    // SAFETY: `putchar_stdout` is an int-sized, int-aligned symbol that
    // lives for the whole program.
    unsafe { MmioRegister::new(addr_of_mut!(putchar_stdout)) }
}

#[no_mangle]
pub extern "C" fn putchar(c: c_int) -> c_int {
    write_guarded(&STDOUT_READY, &stdout_register(), c)
}

/// # Safety
///
/// `s` must point to a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn puts(s: *const c_char) -> c_int {
    let s = CStr::from_ptr(s);
    puts_guarded(&STDOUT_READY, &stdout_register(), s)
}
