//! nordump-core - Bit-banged parallel NOR flash access
//!
//! This crate contains the address/data sequencing engine used to read a
//! parallel NOR flash chip through plain GPIO lines. Address lines are
//! driven either through an external shift-register chain or through
//! dedicated pins, the 8-bit data bus and the OE#/WE# control lines are
//! driven directly.
//!
//! It is `no_std` compatible: the physical pins and the delays are provided
//! by a [`gpio::GpioBackend`] implementation, and dumps are written to any
//! [`embedded_io::Write`] sink.
//!
//! # Layers
//!
//! - [`gpio`] - logical pin roles on top of a backend, direction checks
//! - [`address`] - address loading strategies (2-wire, 3-wire, direct)
//! - [`bus`] - the 8-line data bus as one unit
//! - [`nor`] - read/write cycles and the autoselect ID query
//! - [`dump`] - full address range walk into a byte sink
//! - [`diag`] - wiring diagnostics for the operator
//!
//! # Example
//!
//! ```ignore
//! use nordump_core::address::SerialShifter;
//! use nordump_core::gpio::{PinMap, Port};
//! use nordump_core::nor::NorBus;
//! use nordump_core::timing::Timing;
//!
//! let port = Port::new(backend, PinMap::reference())?;
//! let mut bus = NorBus::new(port, SerialShifter::new(24), Timing::default())?;
//! let id = bus.read_identity()?;
//! println!("{}", id);
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod address;
pub mod bus;
pub mod chip;
pub mod diag;
pub mod dump;
pub mod error;
pub mod gpio;
pub mod nor;
pub mod timing;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
