//! Busy-wait character output over a single memory-mapped register.
//!
//! [`Console::putchar`] is the only primitive that touches the register; it
//! claims a [`ReadyFlag`], writes the value and releases the flag again.
//! [`Console::puts`] writes a NUL-terminated string through it, followed by a
//! newline.

#![cfg_attr(not(test), no_std)]

pub mod console;
pub mod flag;
pub mod register;

#[cfg(feature = "c-abi")]
pub mod ffi;


pub use console::{puts_guarded, write_guarded, Console};
pub use flag::{FlagState, ReadyFlag};
pub use register::{MmioRegister, OutputRegister};
