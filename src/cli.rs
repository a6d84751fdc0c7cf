//! CLI argument parsing

use clap::{ArgGroup, Parser};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Help text for the backend argument
const PROGRAMMER_HELP: &str = "GPIO backend to use \
    [linux_gpio[:dev=/dev/gpiochipN|gpiochip=N], dummy[:loopback,size=N]]";

#[derive(Parser, Debug)]
#[command(name = "nordump")]
#[command(
    author,
    version,
    about = "Parallel NOR flash dumper over bit-banged GPIO",
    long_about = "Dumps a parallel NOR flash chip to a file, or runs one of the wiring \
        diagnostics. Address lines are driven through a shift-register chain or \
        directly from GPIOs; DQ0-DQ7, OE# and WE# are wired to GPIOs."
)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .args([
            "dump_file",
            "chip_id",
            "input_test",
            "output_test",
            "io_test",
            "oe_test",
            "addr_test",
            "release",
            "setup",
        ])
))]
pub struct Cli {
    /// Dump the whole chip to this file
    pub dump_file: Option<PathBuf>,

    /// Get manufacturer and device IDs
    #[arg(short = 'd', long = "ids")]
    pub chip_id: bool,

    /// Input test: print the data bus once per second
    #[arg(short = 'i', long)]
    pub input_test: bool,

    /// Output test: walk test patterns over the data and control lines
    #[arg(short = 'o', long)]
    pub output_test: bool,

    /// Input/output test with operator handshake (0x0, 0x5, 0xA)
    #[arg(short = 'y', long)]
    pub io_test: bool,

    /// OE# test: toggle OE# at 1 Hz with pins in read configuration
    #[arg(short = 'e', long)]
    pub oe_test: bool,

    /// Address test (shift-register outputs looped back onto DQ0-DQ7)
    #[arg(short = 'a', long)]
    pub addr_test: bool,

    /// Set all used pins as inputs and exit
    #[arg(short = 'I', long)]
    pub release: bool,

    /// Configure pins for reading and exit
    #[arg(short = 's', long)]
    pub setup: bool,

    #[arg(short, long, default_value = "linux_gpio", help = PROGRAMMER_HELP)]
    pub programmer: String,

    /// Board file (TOML) with pin assignments, addressing mode and timing.
    /// Defaults to the reference Raspberry Pi wiring.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Settle time around OE#/WE# and address changes, in microseconds
    #[arg(long)]
    pub settle_us: Option<u32>,

    /// Address shift clock period, in microseconds
    #[arg(long)]
    pub pulse_us: Option<u32>,

    /// Last address to dump (hex with 0x prefix, or decimal)
    #[arg(long, value_parser = parse_hex_u32)]
    pub max_address: Option<u32>,

    /// Stop the OE# test after this many cycles (default: run until interrupted)
    #[arg(long, requires = "oe_test")]
    pub cycles: Option<u32>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// What to do, one per invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Dump(PathBuf),
    ChipId,
    InputTest,
    OutputTest,
    IoTest,
    OeTest { cycles: Option<u32> },
    AddressTest,
    Release,
    Setup,
}

impl Cli {
    /// The selected action
    ///
    /// The `action` group guarantees exactly one is set.
    pub fn action(&self) -> Action {
        if let Some(path) = &self.dump_file {
            Action::Dump(path.clone())
        } else if self.chip_id {
            Action::ChipId
        } else if self.input_test {
            Action::InputTest
        } else if self.output_test {
            Action::OutputTest
        } else if self.io_test {
            Action::IoTest
        } else if self.oe_test {
            Action::OeTest {
                cycles: self.cycles,
            }
        } else if self.addr_test {
            Action::AddressTest
        } else if self.release {
            Action::Release
        } else {
            Action::Setup
        }
    }
}
