//! Linux GPIO backend implementation
//!
//! All lines of the pin map are requested at once from one GPIO chip, as
//! inputs. Direction changes rebuild the line configuration from the
//! tracked state of every line and apply it with a single reconfigure
//! call, so lines that do not change keep their direction and level.
//!
//! Pin numbers are line offsets on the chip. On a Raspberry Pi these are
//! the BCM GPIO numbers on `/dev/gpiochip0`.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{LinuxGpioError, Result};

use gpiocdev::line::{Offset, Value};
use gpiocdev::request::{Config, Request};

use nordump_core::gpio::{Direction, GpioBackend, Level, Pin, PinMap};

/// Default GPIO chip (Raspberry Pi header)
pub const DEFAULT_DEVICE: &str = "/dev/gpiochip0";

/// Consumer label shown by `gpioinfo`
const CONSUMER: &str = "nordump";

/// Configuration for opening the Linux GPIO backend
#[derive(Debug, Clone)]
pub struct LinuxGpioConfig {
    /// Device path (e.g., "/dev/gpiochip0")
    pub device: String,
}

impl Default for LinuxGpioConfig {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
        }
    }
}

impl LinuxGpioConfig {
    /// Create a new configuration for the given device path
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LineState {
    direction: Direction,
    level: Level,
}

fn to_value(level: Level) -> Value {
    match level {
        Level::High => Value::Active,
        Level::Low => Value::Inactive,
    }
}

/// Linux GPIO backend
///
/// Implements [`GpioBackend`] over the GPIO character device (gpiocdev).
/// Line access errors are logged, not returned.
pub struct LinuxGpio {
    request: Request,
    device: String,
    lines: BTreeMap<Offset, LineState>,
}

impl LinuxGpio {
    /// Request every line of `pins` on the configured chip, as inputs
    pub fn open(config: &LinuxGpioConfig, pins: &PinMap) -> Result<Self> {
        log::debug!("linux_gpio: Opening device {}", config.device);

        let mut lines = BTreeMap::new();
        for role in pins.roles() {
            if let Some(pin) = pins.pin(role) {
                lines.insert(
                    pin,
                    LineState {
                        direction: Direction::Input,
                        level: Level::Low,
                    },
                );
            }
        }

        let request = Request::from_config(Self::line_config(&lines))
            .on_chip(&config.device)
            .with_consumer(CONSUMER)
            .request()
            .map_err(|source| LinuxGpioError::LineRequestFailed {
                path: config.device.clone(),
                source,
            })?;

        log::info!(
            "linux_gpio: Opened {} ({} lines: {:?})",
            config.device,
            lines.len(),
            lines.keys().collect::<Vec<_>>()
        );

        Ok(Self {
            request,
            device: config.device.clone(),
            lines,
        })
    }

    fn line_config(lines: &BTreeMap<Offset, LineState>) -> Config {
        let mut cfg = Config::default();
        for (&offset, state) in lines {
            match state.direction {
                Direction::Output => {
                    cfg.with_line(offset).as_output(to_value(state.level));
                }
                Direction::Input => {
                    cfg.with_line(offset).as_input();
                }
            }
        }
        cfg
    }

    fn reconfigure(&mut self) {
        if let Err(e) = self.request.reconfigure(&Self::line_config(&self.lines)) {
            log::error!("Failed to reconfigure GPIO lines on {}: {}", self.device, e);
        }
    }

    fn state_mut(&mut self, pin: Pin) -> Option<&mut LineState> {
        let state = self.lines.get_mut(&pin);
        if state.is_none() {
            log::error!("linux_gpio: line {} was not requested", pin);
        }
        state
    }
}

impl GpioBackend for LinuxGpio {
    fn set_direction(&mut self, pin: Pin, direction: Direction) {
        let Some(state) = self.state_mut(pin) else {
            return;
        };
        if state.direction == direction {
            return;
        }
        state.direction = direction;
        self.reconfigure();
    }

    fn set_level(&mut self, pin: Pin, level: Level) {
        let Some(state) = self.state_mut(pin) else {
            return;
        };
        state.level = level;
        if state.direction == Direction::Output {
            if let Err(e) = self.request.set_value(pin, to_value(level)) {
                log::error!("Failed to set GPIO line {}: {}", pin, e);
            }
        }
    }

    fn get_level(&self, pin: Pin) -> Level {
        match self.request.value(pin) {
            Ok(Value::Active) => Level::High,
            Ok(Value::Inactive) => Level::Low,
            Err(e) => {
                log::error!("Failed to get GPIO line {}: {}", pin, e);
                Level::Low
            }
        }
    }

    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(Duration::from_micros(us as u64));
    }

    fn set_output(&mut self, pin: Pin, level: Level) {
        let Some(state) = self.state_mut(pin) else {
            return;
        };
        let new = LineState {
            direction: Direction::Output,
            level,
        };
        if *state == new {
            return;
        }
        let was_output = state.direction == Direction::Output;
        *state = new;

        if was_output {
            if let Err(e) = self.request.set_value(pin, to_value(level)) {
                log::error!("Failed to set GPIO line {}: {}", pin, e);
            }
        } else {
            // Direction and initial level applied together
            self.reconfigure();
        }
    }
}

/// Parse programmer options from a list of key-value pairs
///
/// # Supported Options
///
/// - `dev=/dev/gpiochipN` - GPIO chip device path
/// - `gpiochip=N` - GPIO chip number (alternative to dev)
///
/// Without either, [`DEFAULT_DEVICE`] is used. Pin assignments come from
/// the board configuration, not from these options.
pub fn parse_options(options: &[(&str, &str)]) -> Result<LinuxGpioConfig> {
    let mut device: Option<String> = None;
    let mut gpiochip: Option<u32> = None;

    for (key, value) in options {
        match *key {
            "dev" => {
                device = Some(value.to_string());
            }
            "gpiochip" => {
                gpiochip = Some(value.parse().map_err(|_| {
                    LinuxGpioError::InvalidParameter(format!("Invalid gpiochip value: {}", value))
                })?);
            }
            _ => {
                log::warn!("linux_gpio: Unknown option: {}={}", key, value);
            }
        }
    }

    match (device, gpiochip) {
        (Some(_), Some(_)) => Err(LinuxGpioError::ConflictingDevice),
        (Some(device), None) if device.is_empty() => Err(LinuxGpioError::InvalidParameter(
            "Empty dev value".to_string(),
        )),
        (Some(device), None) => Ok(LinuxGpioConfig::new(device)),
        (None, Some(n)) => Ok(LinuxGpioConfig::new(format!("/dev/gpiochip{}", n))),
        (None, None) => Ok(LinuxGpioConfig::default()),
    }
}
