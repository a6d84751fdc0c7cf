//! CLI command implementations
//!
//! Every command runs against a [`NorBus`]. The bus is generic over the
//! addressing strategy, so [`run`] picks the strategy matching the board's
//! wiring once and everything below is monomorphized for it.

mod diag;
mod dump;

use crate::cli::Action;
use crate::config::Board;
use nordump_core::address::{AddressStrategy, DirectAddress, LatchedShifter, SerialShifter};
use nordump_core::gpio::{AddressLines, GpioBackend, Port};
use nordump_core::nor::NorBus;

/// Run `action` on `port`
pub fn run<B: GpioBackend>(
    action: &Action,
    board: &Board,
    port: Port<B>,
) -> Result<(), Box<dyn std::error::Error>> {
    let bits = board.pins.address_bits();
    match board.pins.addressing {
        AddressLines::Serial { .. } => execute(action, board, port, SerialShifter::new(bits)),
        AddressLines::Latched { .. } => execute(action, board, port, LatchedShifter::new(bits)),
        AddressLines::Direct { .. } => execute(action, board, port, DirectAddress::new(bits)),
    }
}

fn execute<B: GpioBackend, A: AddressStrategy>(
    action: &Action,
    board: &Board,
    port: Port<B>,
    addressing: A,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut bus = NorBus::new(port, addressing, board.timing)?;

    match action {
        Action::Dump(path) => dump::run_dump(&mut bus, path, board.max_address),
        Action::ChipId => diag::run_chip_id(&mut bus),
        Action::InputTest => {
            diag::run_input_test(&mut bus);
            Ok(())
        }
        Action::OutputTest => {
            diag::run_output_test(&mut bus);
            Ok(())
        }
        Action::IoTest => {
            diag::run_io_test(&mut bus);
            Ok(())
        }
        Action::OeTest { cycles } => {
            diag::run_oe_test(&mut bus, *cycles);
            Ok(())
        }
        Action::AddressTest => diag::run_address_test(&mut bus),
        Action::Release => {
            bus.release();
            println!("All pins released (inputs)");
            Ok(())
        }
        Action::Setup => {
            bus.prepare_read();
            println!("Pins configured for reading");
            Ok(())
        }
    }
}
