//! Backend registration and dispatch
//!
//! This module provides a centralized registry for the GPIO backends, with
//! support for feature-gated inclusion.

use nordump_core::gpio::{GpioBackend, PinMap};

/// Information about a backend
pub struct BackendInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names/aliases
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Get information about all available backends (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_backends() -> Vec<BackendInfo> {
    let mut backends = Vec::new();

    #[cfg(feature = "linux-gpio")]
    backends.push(BackendInfo {
        name: "linux_gpio",
        aliases: &["linux-gpio", "gpiochip"],
        description: "Linux GPIO character device (dev=/dev/gpiochipN or gpiochip=N)",
    });

    #[cfg(feature = "dummy")]
    backends.push(BackendInfo {
        name: "dummy",
        aliases: &["sim"],
        description: "Simulated bench with an in-memory NOR chip (loopback, size=<bytes>)",
    });

    backends
}

/// Generate help text listing all available backends
pub fn backend_help() -> String {
    let backends = available_backends();

    if backends.is_empty() {
        return "No backends available (recompile with backend features enabled)".to_string();
    }

    let mut help = String::from("Available backends:\n");
    for b in &backends {
        help.push_str(&format!("  {:12} - {}\n", b.name, b.description));
    }
    help
}

/// Resolve a backend name or alias
pub fn find_backend(name: &str) -> Option<&'static str> {
    available_backends()
        .into_iter()
        .find(|b| b.name == name || b.aliases.contains(&name))
        .map(|b| b.name)
}

/// Parse a backend string like "linux_gpio:gpiochip=1" into name and options
///
/// Options without a value (e.g. "loopback") get an empty value.
pub fn parse_programmer_string(s: &str) -> (&str, Vec<(&str, &str)>) {
    if let Some((name, opts)) = s.split_once(':') {
        let options: Vec<_> = opts
            .split(',')
            .filter(|opt| !opt.is_empty())
            .map(|opt| opt.split_once('=').unwrap_or((opt, "")))
            .collect();
        (name, options)
    } else {
        (s, Vec::new())
    }
}

/// Open the backend named by `programmer` for the lines of `pins`
///
/// Nothing is driven: every requested line starts as an input.
pub fn open_backend(
    programmer: &str,
    pins: &PinMap,
) -> Result<Box<dyn GpioBackend>, Box<dyn std::error::Error>> {
    let (name, options) = parse_programmer_string(programmer);

    match find_backend(name) {
        #[cfg(feature = "linux-gpio")]
        Some("linux_gpio") => {
            let gpio = nordump_linux_gpio::open_linux_gpio(&options, pins)?;
            Ok(Box::new(gpio))
        }
        #[cfg(feature = "dummy")]
        Some("dummy") => {
            let config = parse_dummy_options(&options, pins)?;
            log::info!(
                "dummy: simulated bench, {} bytes{}",
                config.size,
                if config.loopback { ", loopback" } else { "" }
            );
            Ok(Box::new(nordump_dummy::DummyBench::new(config)))
        }
        _ => Err(unknown_backend_error(name)),
    }
}

/// Options of the simulated bench
///
/// - `loopback` - shift-register outputs looped back onto the data bus
/// - `size=N` - flash size in bytes (hex with 0x prefix, or decimal)
#[cfg(feature = "dummy")]
pub fn parse_dummy_options(
    options: &[(&str, &str)],
    pins: &PinMap,
) -> Result<nordump_dummy::DummyConfig, String> {
    let mut config = nordump_dummy::DummyConfig {
        pins: pins.clone(),
        ..Default::default()
    };

    for (key, value) in options {
        match *key {
            "loopback" => config.loopback = true,
            "size" => {
                let hex = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X"));
                config.size = match hex {
                    Some(hex) => usize::from_str_radix(hex, 16),
                    None => value.parse(),
                }
                .map_err(|_| format!("Invalid size value: {}", value))?;
            }
            _ => {
                log::warn!("dummy: Unknown option: {}={}", key, value);
            }
        }
    }

    Ok(config)
}

fn unknown_backend_error(name: &str) -> Box<dyn std::error::Error> {
    let mut msg = format!("Unknown backend: {}\n\n", name);
    msg.push_str(&backend_help());
    msg.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_programmer_string() {
        assert_eq!(parse_programmer_string("linux_gpio"), ("linux_gpio", vec![]));
        assert_eq!(
            parse_programmer_string("linux_gpio:dev=/dev/gpiochip1"),
            ("linux_gpio", vec![("dev", "/dev/gpiochip1")])
        );
        assert_eq!(
            parse_programmer_string("dummy:loopback,size=0x1000"),
            ("dummy", vec![("loopback", ""), ("size", "0x1000")])
        );
        assert_eq!(parse_programmer_string("dummy:"), ("dummy", vec![]));
    }

    #[test]
    fn test_unknown_backend() {
        assert!(find_backend("ch341a").is_none());
        assert!(open_backend("ch341a", &PinMap::reference()).is_err());
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_dummy_options() {
        let pins = PinMap::reference_direct();
        let config = parse_dummy_options(&[("loopback", ""), ("size", "0x4000")], &pins).unwrap();
        assert!(config.loopback);
        assert_eq!(config.size, 0x4000);
        assert_eq!(config.pins, pins);

        assert!(parse_dummy_options(&[("size", "lots")], &pins).is_err());
        assert_eq!(find_backend("sim"), Some("dummy"));
    }
}
