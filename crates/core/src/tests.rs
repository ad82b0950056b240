#[cfg(test)]
mod tests {
    use std::ffi::{c_int, CStr};
    use std::sync::Arc;

    use putwire_config::{DrainPolicy, SystemManifest};
    use putwire_driver::FlagState;

    use crate::bus::SystemBus;
    use crate::metrics::OutputMetrics;
    use crate::peripherals::stdout_sink::SinkStatus;
    use crate::{Bus, Machine, SimulationError};

    fn quiet_machine(drain: DrainPolicy) -> Machine {
        let mut manifest = SystemManifest::default();
        manifest.sink.drain = drain;
        manifest.sink.echo = false;
        Machine::from_manifest(&manifest).unwrap()
    }

    fn cstr(bytes: &[u8]) -> &CStr {
        CStr::from_bytes_until_nul(bytes).unwrap()
    }

    #[test]
    fn test_putchar_reaches_sink_register() {
        let machine = quiet_machine(DrainPolicy::Synchronous);

        assert_eq!(machine.putchar('A' as c_int), 'A' as c_int);
        let reg = machine.with_sink(|s| s.register()).unwrap();
        assert_eq!(reg, 'A' as i32);
        assert_eq!(machine.flag_state(), FlagState::Ready);

        assert_eq!(machine.putchar('B' as c_int), 'B' as c_int);
        assert_eq!(machine.output().unwrap(), vec!['A' as i32, 'B' as i32]);
        assert_eq!(machine.flag_state(), FlagState::Ready);
    }

    #[test]
    fn test_putchar_passes_any_int_through() {
        let machine = quiet_machine(DrainPolicy::Synchronous);
        for c in [-1, 0x1_0000, c_int::MIN, c_int::MAX] {
            assert_eq!(machine.putchar(c), c);
            assert_eq!(machine.with_sink(|s| s.register()).unwrap(), c);
        }
    }

    #[test]
    fn test_puts_hi() {
        let machine = quiet_machine(DrainPolicy::Synchronous);
        assert_eq!(machine.puts(cstr(b"hi\0")), 0);
        assert_eq!(
            machine.output().unwrap(),
            vec!['h' as i32, 'i' as i32, '\n' as i32]
        );
    }

    #[test]
    fn test_puts_empty() {
        let machine = quiet_machine(DrainPolicy::Synchronous);
        assert_eq!(machine.puts(cstr(b"\0")), 0);
        assert_eq!(machine.output_text().unwrap(), "\n");
    }

    #[test]
    fn test_puts_at_reads_from_simulated_memory() {
        let machine = quiet_machine(DrainPolicy::Synchronous);
        let addr = 0x2000_0100;
        machine.load_cstr(addr, b"Hello").unwrap();

        assert_eq!(machine.puts_at(addr).unwrap(), 0);
        assert_eq!(machine.output_text().unwrap(), "Hello\n");
    }

    #[test]
    fn test_puts_at_never_reads_past_terminator() {
        let machine = quiet_machine(DrainPolicy::Synchronous);

        // "hi\0" occupies the last three bytes of RAM; any read past the NUL
        // would be a memory violation.
        let end = machine.bus.lock().unwrap().ram.end_addr();
        let addr = end - 3;
        machine.load_cstr(addr, b"hi").unwrap();

        assert_eq!(machine.puts_at(addr).unwrap(), 0);
        assert_eq!(machine.output_text().unwrap(), "hi\n");
    }

    #[test]
    fn test_puts_at_ignores_bytes_after_nul() {
        let machine = quiet_machine(DrainPolicy::Synchronous);
        let addr = 0x2000_0000;
        machine.load_cstr(addr, b"0123456789ABCDEF").unwrap();
        // Terminate early, leaving the tail in memory
        machine.bus.lock().unwrap().write_u8(addr + 2, 0).unwrap();

        machine.puts_at(addr).unwrap();
        assert_eq!(machine.output_text().unwrap(), "01\n");
    }

    #[test]
    fn test_puts_at_unterminated() {
        let machine = quiet_machine(DrainPolicy::Synchronous);
        let end = machine.bus.lock().unwrap().ram.end_addr();
        let addr = end - 2;
        machine.bus.lock().unwrap().write_u8(addr, b'x').unwrap();
        machine.bus.lock().unwrap().write_u8(addr + 1, b'y').unwrap();

        let err = machine.puts_at(addr).unwrap_err();
        assert!(matches!(err, SimulationError::UnterminatedString(a) if a == addr));
        // Nothing was written to the sink
        assert!(machine.output().unwrap().is_empty());
    }

    #[test]
    fn test_on_tick_sink_loses_undrained_values() {
        let machine = quiet_machine(DrainPolicy::OnTick);
        machine.puts(cstr(b"ab\0"));

        assert!(machine.output().unwrap().is_empty());
        assert_eq!(machine.step(), 1);
        assert_eq!(machine.step(), 0);

        // Only the final newline survived
        assert_eq!(machine.output_text().unwrap(), "\n");
        assert_eq!(machine.with_sink(|s| s.lost()).unwrap(), 2);
    }

    #[test]
    fn test_on_tick_sink_keeps_up_when_ticked_per_char() {
        let machine = quiet_machine(DrainPolicy::OnTick);
        for &b in b"ok" {
            machine.putchar(b as c_int);
            machine.step();
        }
        assert_eq!(machine.output_text().unwrap(), "ok");
        assert_eq!(machine.with_sink(|s| s.lost()).unwrap(), 0);
    }

    #[test]
    fn test_never_drained_sink() {
        let machine = quiet_machine(DrainPolicy::Never);
        machine.puts(cstr(b"hi\0"));
        machine.run_ticks(10);

        assert!(machine.output().unwrap().is_empty());
        let (reg, status, lost) = machine
            .with_sink(|s| (s.register(), s.status(), s.lost()))
            .unwrap();
        assert_eq!(reg, '\n' as i32);
        assert!(status.contains(SinkStatus::PENDING | SinkStatus::OVERRUN));
        assert_eq!(lost, 2);
        // The driver is unaffected
        assert_eq!(machine.flag_state(), FlagState::Ready);
    }

    #[test]
    fn test_status_register_over_bus() {
        let machine = quiet_machine(DrainPolicy::Never);
        let base = machine.bus.lock().unwrap().sink_base().unwrap();

        machine.putchar(1);
        machine.putchar(2);
        let status = machine.bus.lock().unwrap().read_u32(base + 4).unwrap();
        assert_eq!(status, (SinkStatus::PENDING | SinkStatus::OVERRUN).bits());

        machine
            .bus
            .lock()
            .unwrap()
            .write_u32(base + 4, SinkStatus::OVERRUN.bits())
            .unwrap();
        let status = machine.bus.lock().unwrap().read_u32(base + 4).unwrap();
        assert_eq!(status, SinkStatus::PENDING.bits());
    }

    #[test]
    fn test_metrics_observer() {
        let machine = quiet_machine(DrainPolicy::OnTick);
        let metrics = Arc::new(OutputMetrics::new());
        machine.add_observer(metrics.clone()).unwrap();

        machine.putchar('a' as c_int);
        machine.step();
        machine.putchar('b' as c_int);
        machine.putchar('c' as c_int);
        machine.step();

        assert_eq!(metrics.get_writes(), 3);
        assert_eq!(metrics.get_drains(), 2);
        assert_eq!(metrics.get_overruns(), 1);
        assert!(metrics.get_wps().is_finite());
        assert_eq!(
            machine.with_sink(|s| s.drain_policy()).unwrap(),
            DrainPolicy::OnTick
        );

        metrics.reset();
        assert_eq!(metrics.get_writes(), 0);
        assert_eq!(metrics.get_wps(), 0.0);
    }

    #[test]
    fn test_console_without_sink_drops_writes() {
        let machine = Machine::with_bus(SystemBus::without_sink());
        // The store faults on the bus, but putchar itself cannot fail
        assert_eq!(machine.putchar('X' as c_int), 'X' as c_int);
        assert_eq!(machine.puts(cstr(b"lost\0")), 0);
        assert_eq!(machine.flag_state(), FlagState::Ready);
        assert!(matches!(machine.output(), Err(SimulationError::NoSink)));
    }

    #[test]
    fn test_custom_sink_address() {
        let mut manifest = SystemManifest::default();
        manifest.sink.base_address = 0x7000_0000;
        manifest.sink.echo = false;
        let machine = Machine::from_manifest(&manifest).unwrap();

        assert_eq!(machine.console().register().addr(), 0x7000_0000);
        machine.puts(cstr(b"vex\0"));
        assert_eq!(machine.output_text().unwrap(), "vex\n");
    }

    #[test]
    fn test_sink_at_top_of_address_space() {
        let top = u64::MAX - 7;
        let bus = SystemBus::with_sink_at(top, DrainPolicy::Synchronous, false);
        let machine = Machine::with_bus(bus);

        assert_eq!(machine.putchar('A' as c_int), 'A' as c_int);
        assert_eq!(machine.puts(cstr(b"hi\0")), 0);
        assert_eq!(machine.output_text().unwrap(), "Ahi\n");
        assert_eq!(machine.flag_state(), FlagState::Ready);

        // A word access straddling the end of the address space faults
        let bus = machine.bus.lock().unwrap();
        assert!(matches!(
            bus.read_u32(u64::MAX - 1),
            Err(SimulationError::MemoryViolation(_))
        ));
    }

    #[test]
    fn test_default_board_matches_default_manifest() {
        let board = SystemBus::new();
        let machine = Machine::from_manifest(&SystemManifest::default()).unwrap();
        let bus = machine.bus.lock().unwrap();
        assert_eq!(board.ram.data.len(), bus.ram.data.len());
        assert_eq!(board.ram.data.len() as u64, putwire_config::DEFAULT_RAM_BYTES);
        assert_eq!(board.sink_base(), bus.sink_base());
    }

    #[test]
    fn test_ram_word_access() {
        let mut bus = SystemBus::new();
        bus.write_u32(0x2000_0010, 0xDEADBEEF).unwrap();
        assert_eq!(bus.read_u32(0x2000_0010).unwrap(), 0xDEADBEEF);
        assert!(matches!(
            bus.read_u8(0x1000_0000),
            Err(SimulationError::MemoryViolation(0x1000_0000))
        ));
    }

    #[test]
    fn test_snapshot_serializes() {
        let machine = quiet_machine(DrainPolicy::Synchronous);
        machine.puts(cstr(b"hi\0"));

        let snap = machine.snapshot();
        assert!(snap.console.ready);
        assert_eq!(snap.console.register_addr, putwire_config::DEFAULT_SINK_BASE);

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["peripherals"]["stdout"]["text"], "hi\n");
        assert_eq!(json["peripherals"]["stdout"]["drain"], "synchronous");
        assert_eq!(json["peripherals"]["stdout"]["lost"], 0);
    }
}
