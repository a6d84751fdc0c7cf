//! nordump-linux-gpio - Linux GPIO backend for nordump
//!
//! This crate drives the NOR flash bench through the Linux character
//! device GPIO interface (gpiocdev), the modern replacement for the
//! deprecated sysfs interface.
//!
//! # Example
//!
//! ```no_run
//! use nordump_core::address::SerialShifter;
//! use nordump_core::gpio::{PinMap, Port};
//! use nordump_core::nor::NorBus;
//! use nordump_core::timing::Timing;
//! use nordump_linux_gpio::{LinuxGpio, LinuxGpioConfig};
//!
//! let pins = PinMap::reference();
//! let gpio = LinuxGpio::open(&LinuxGpioConfig::default(), &pins)?;
//! let port = Port::new(gpio, pins)?;
//! let mut bus = NorBus::new(port, SerialShifter::new(24), Timing::default())?;
//! println!("{}", bus.read_identity()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Usage with nordump CLI
//!
//! ```bash
//! # Reference wiring on /dev/gpiochip0
//! nordump -i
//!
//! # Another chip
//! nordump -p linux_gpio:gpiochip=1 flash.bin
//! ```
//!
//! # Reference wiring (Raspberry Pi, BCM numbering)
//!
//! | Signal     | GPIO |
//! |------------|------|
//! | DQ0-DQ7    | 2, 3, 4, 17, 18, 27, 22, 23 |
//! | OE#        | 24   |
//! | WE#        | 10   |
//! | ADDR_DATA  | 9    |
//! | ADDR_CLOCK | 25   |
//!
//! CE# is tied low. The flash runs at 3.3 V.
//!
//! # System Requirements
//!
//! - Linux kernel 4.8+ with GPIO character device support (kernel 5.5+ for v2 API)
//! - Access to `/dev/gpiochipN` devices (may require root or udev rules)

pub mod device;
pub mod error;

// Re-exports
pub use device::{parse_options, LinuxGpio, LinuxGpioConfig, DEFAULT_DEVICE};
pub use error::{LinuxGpioError, Result};

/// Open the Linux GPIO backend for `pins`
///
/// This is a convenience function for use in the CLI backend dispatch.
///
/// # Example Options
///
/// - `dev=/dev/gpiochip0` - GPIO chip device path (or use gpiochip=N)
/// - `gpiochip=0` - GPIO chip number (alternative to dev)
pub fn open_linux_gpio(
    options: &[(&str, &str)],
    pins: &nordump_core::gpio::PinMap,
) -> Result<LinuxGpio> {
    let config = parse_options(options)?;
    LinuxGpio::open(&config, pins)
}
