#![no_main]
#![no_std]

use core::fmt::Write;

use cortex_m_rt::entry;
use panic_halt as _;
use putwire_driver::{Console, MmioRegister};

// Matches `SystemBus::new()` default `stdout` sink base.
const STDOUT_ADDR: usize = 0x4000_C000;

static STDOUT: Console<MmioRegister> = Console::new(unsafe { MmioRegister::from_address(STDOUT_ADDR) });

#[entry]
fn main() -> ! {
    STDOUT.puts(c"Hello, Putwire!");

    for i in 0..3 {
        let mut console = &STDOUT;
        writeln!(console, "line {}", i).ok();
    }

    loop {
        cortex_m::asm::nop();
    }
}
