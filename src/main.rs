//! nordump - Parallel NOR flash dumper over bit-banged GPIO
//!
//! Reads a parallel NOR flash chip wired to GPIO lines and writes its
//! contents to a file. The address is presented through a shift-register
//! chain (2-wire or latched 3-wire) or directly on GPIO lines; the data bus
//! and OE#/WE# are wired straight to GPIOs.
//!
//! # Architecture
//!
//! - `nordump-core` holds the bus sequencing, dump loop and diagnostics
//! - backends (`linux_gpio`, `dummy`) provide the physical pins
//! - the board file describes the wiring and timing; the reference
//!   Raspberry Pi wiring is used when none is given
//!
//! Exactly one action runs per invocation. Exit status is 0 on success and
//! 1 on any error, including argument errors.

mod backends;
mod cli;
mod commands;
mod config;

use clap::error::ErrorKind;
use clap::Parser;
use cli::Cli;
use config::Board;
use nordump_core::gpio::Port;

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
            _ => {
                // Usage goes to stdout, the status is always 1
                println!("{}", e.render());
                std::process::exit(1);
            }
        },
    };

    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let board = load_board(cli)?;
    let action = cli.action();
    log::debug!("action: {:?}", action);

    let mut backend = backends::open_backend(&cli.programmer, &board.pins)?;
    let port = Port::new(&mut *backend, board.pins.clone())?;
    commands::run(&action, &board, port)
}

/// Board from the config file (or the reference wiring) with the command
/// line overrides applied
fn load_board(cli: &Cli) -> Result<Board, config::ConfigError> {
    let board = match &cli.config {
        Some(path) => {
            log::info!("Loading board file {:?}", path);
            Board::from_toml_file(path)?
        }
        None => Board::default(),
    };

    let board = board.with_overrides(cli.settle_us, cli.pulse_us, cli.max_address);
    board.validate()?;
    log::debug!(
        "board: {} address bits, max address 0x{:06x}",
        board.pins.address_bits(),
        board.max_address
    );
    Ok(board)
}
