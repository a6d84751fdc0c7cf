//! Wiring diagnostics
//!
//! These print to stdout for the operator watching LEDs and flipping
//! switches on the bench. The input and OE# tests run until interrupted.

use nordump_core::address::AddressStrategy;
use nordump_core::diag;
use nordump_core::gpio::GpioBackend;
use nordump_core::nor::NorBus;
use std::fmt::Write as _;
use std::ops::ControlFlow;

/// Format a bus sample as its bits, DQ0 first, followed by the hex value
pub fn format_sample(value: u8) -> String {
    let mut line = String::with_capacity(16);
    for bit in 0..8 {
        line.push(if value & (1 << bit) != 0 { '1' } else { '0' });
    }
    let _ = write!(line, "\t0x{:02x}", value);
    line
}

pub fn run_input_test<B: GpioBackend, A: AddressStrategy>(bus: &mut NorBus<B, A>) {
    println!("Input test, press Ctrl-C to stop");
    diag::input_echo(bus, |value| {
        println!("{}", format_sample(value));
        ControlFlow::Continue(())
    });
}

pub fn run_output_test<B: GpioBackend, A: AddressStrategy>(bus: &mut NorBus<B, A>) {
    println!("Output test: {} patterns", diag::PATTERN_COUNT);
    diag::output_patterns(bus);
    println!("Output test done");
}

pub fn run_io_test<B: GpioBackend, A: AddressStrategy>(bus: &mut NorBus<B, A>) {
    println!(
        "Input/output test: set DQ0-DQ3 to 0x{:x}, 0x{:x}, 0x{:x} in turn",
        diag::HANDSHAKE[0],
        diag::HANDSHAKE[1],
        diag::HANDSHAKE[2]
    );
    let outcome = diag::io_handshake(bus, |value| {
        println!("{}", format_sample(value));
        ControlFlow::Continue(())
    });
    if outcome.is_continue() {
        println!("Input/output test done");
    }
}

/// OE# test, `cycles` low/high pairs or until interrupted
pub fn run_oe_test<B: GpioBackend, A: AddressStrategy>(
    bus: &mut NorBus<B, A>,
    cycles: Option<u32>,
) {
    println!("OE# test: toggling OE# at 1 Hz");
    diag::oe_isolation(bus, |cycle| {
        log::debug!("oe cycle {}", cycle);
        match cycles {
            Some(limit) if cycle >= limit => ControlFlow::Break(()),
            _ => ControlFlow::Continue(()),
        }
    });
}

pub fn run_address_test<B: GpioBackend, A: AddressStrategy>(
    bus: &mut NorBus<B, A>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut last_stage = None;
    diag::address_test(bus, |stage, address| {
        if last_stage != Some(stage) {
            println!("{} test", stage);
            last_stage = Some(stage);
        }
        println!("0x{:06x}", address);
    })?;
    println!("Address test passed");
    Ok(())
}

pub fn run_chip_id<B: GpioBackend, A: AddressStrategy>(
    bus: &mut NorBus<B, A>,
) -> Result<(), Box<dyn std::error::Error>> {
    let id = diag::chip_id(bus)?;
    match id.manufacturer_name() {
        Some(name) => println!("Manufacturer: 0x{:02x} ({})", id.manufacturer, name),
        None => println!("Manufacturer: 0x{:02x}", id.manufacturer),
    }
    println!(
        "Device: 0x{:02x} 0x{:02x} 0x{:02x}",
        id.device[0], id.device[1], id.device[2]
    );
    Ok(())
}
