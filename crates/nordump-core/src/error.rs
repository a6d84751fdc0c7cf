//! Error types for nordump-core
//!
//! Misuse of the pin roles (writing an input, reading an output, touching a
//! role that is not wired) is a programming error and panics. Everything
//! in here is a condition the operator can act on: a bad board description,
//! an address outside the chip, or a wiring check that did not pass.

use core::fmt;

use crate::address::AddressingKind;
use crate::chip::FlashIdentity;
use crate::diag::AddressTestStage;
use crate::gpio::{Pin, PinRole};

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Board description errors
    /// The same physical pin is assigned to two roles
    PinConflict {
        /// Offending pin
        pin: Pin,
        /// First role using it
        first: PinRole,
        /// Second role using it
        second: PinRole,
    },
    /// Address width is zero or larger than the supported maximum
    InvalidAddressWidth {
        /// Requested width in bits
        bits: u8,
    },
    /// A line required by the addressing strategy has no pin
    RoleNotWired(PinRole),

    // Addressing errors
    /// Address does not fit in the configured address width
    AddressOutOfRange {
        /// Requested address
        address: u32,
        /// Highest address the wiring can present
        max: u32,
    },
    /// Operation needs a different addressing mode
    UnsupportedAddressing(AddressingKind),

    // Verification errors
    /// Address-line loopback read back a different value
    AddressMismatch {
        /// Test stage that failed
        stage: AddressTestStage,
        /// Index of the failing step within the stage
        index: u8,
        /// Value that should have been on the bus
        expected: u8,
        /// Value actually sampled
        actual: u8,
    },
    /// Autoselect query returned a floating bus
    NoChipResponse(FlashIdentity),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PinConflict { pin, first, second } => {
                write!(f, "pin {} is assigned to both {} and {}", pin, first, second)
            }
            Self::InvalidAddressWidth { bits } => {
                write!(f, "invalid address width: {} bits", bits)
            }
            Self::RoleNotWired(role) => write!(f, "{} is not wired", role),
            Self::AddressOutOfRange { address, max } => write!(
                f,
                "address 0x{:06x} out of range (max 0x{:06x})",
                address, max
            ),
            Self::UnsupportedAddressing(kind) => {
                write!(f, "operation not supported with {} addressing", kind)
            }
            Self::AddressMismatch {
                stage,
                index,
                expected,
                actual,
            } => write!(
                f,
                "{} test #{:02} failed: expected 0x{:02x}, got 0x{:02x}",
                stage, index, expected, actual
            ),
            Self::NoChipResponse(id) => write!(f, "no response from flash chip ({})", id),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
