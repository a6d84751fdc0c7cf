//! Board configuration
//!
//! Describes how the flash chip is wired to the host. Loaded from a TOML
//! board file, or the reference Raspberry Pi wiring when none is given:
//!
//! ```toml
//! [pins]
//! data = [2, 3, 4, 17, 18, 27, 22, 23]
//! output_enable = 24
//! write_enable = 10
//!
//! [addressing]
//! mode = "serial"          # "serial", "latched" or "direct"
//! data = 9
//! clock = 25
//! # strobe = 11          # latched only
//! bits = 24
//! # lines = [9, 25, ...] # direct only, A-1 first
//!
//! [timing]
//! pulse_us = 2
//! settle_us = 100
//! setup_us = 10
//!
//! [chip]
//! max_address = "0xFFFFFF"
//! ```
//!
//! Every section is optional and falls back to the reference wiring.

use std::fs;
use std::path::{Path, PathBuf};

use nordump_core::address::max_address_for;
use nordump_core::gpio::{AddressLines, Pin, PinMap, DATA_LINES, MAX_ADDRESS_LINES};
use nordump_core::timing::Timing;
use thiserror::Error;

/// Board file errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the board file
    #[error("Failed to read board file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax or type error
    #[error("Failed to parse board file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A key the addressing mode needs is missing
    #[error("[addressing] mode \"{mode}\" requires '{key}'")]
    MissingKey {
        mode: &'static str,
        key: &'static str,
    },

    /// More direct address lines than supported
    #[error("Too many direct address lines: {0} (max {max})", max = MAX_ADDRESS_LINES)]
    TooManyLines(usize),

    /// Pin map rejected (conflicting pins, bad width)
    #[error("Invalid wiring: {0}")]
    Wiring(#[from] nordump_core::Error),

    /// The chip range does not fit the address lines
    #[error("max_address 0x{max_address:x} exceeds {bits} address bits (max 0x{limit:x})")]
    MaxAddress { max_address: u32, bits: u8, limit: u32 },
}

/// Board file structure
#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlBoard {
    pins: Option<TomlPins>,
    addressing: Option<TomlAddressing>,
    timing: Option<TomlTiming>,
    chip: Option<TomlChip>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlPins {
    data: Option<[Pin; DATA_LINES]>,
    output_enable: Option<Pin>,
    write_enable: Option<Pin>,
}

#[derive(Debug, Clone, Copy, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
enum TomlMode {
    Serial,
    Latched,
    Direct,
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlAddressing {
    mode: TomlMode,
    data: Option<Pin>,
    clock: Option<Pin>,
    strobe: Option<Pin>,
    bits: Option<u8>,
    lines: Option<Vec<Pin>>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlTiming {
    pulse_us: Option<u32>,
    settle_us: Option<u32>,
    setup_us: Option<u32>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlChip {
    #[serde(default, deserialize_with = "deserialize_opt_hex_u32")]
    max_address: Option<u32>,
}

/// Deserialize a u32 that can be hex (0x...) or decimal
fn deserialize_opt_hex_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    // Try to deserialize as a number first, then as a string
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HexOrInt {
        Int(u32),
        Str(String),
    }

    match HexOrInt::deserialize(deserializer)? {
        HexOrInt::Int(n) => Ok(Some(n)),
        HexOrInt::Str(s) => parse_number(&s).map(Some).map_err(serde::de::Error::custom),
    }
}

/// Parse a number that can be hex (0x...) or decimal
fn parse_number(s: &str) -> Result<u32, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("invalid hex: {}", e))
    } else {
        s.parse().map_err(|e| format!("invalid number: {}", e))
    }
}

/// Wiring, timing and chip range, fixed for the whole run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    /// Role to pin assignment
    pub pins: PinMap,
    /// Bus timing
    pub timing: Timing,
    /// Last address to read
    pub max_address: u32,
}

impl Default for Board {
    fn default() -> Self {
        let pins = PinMap::reference();
        let max_address = max_address_for(pins.address_bits());
        Self {
            pins,
            timing: Timing::default(),
            max_address,
        }
    }
}

impl Board {
    /// Load a board file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse a board description
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: TomlBoard = toml::from_str(content)?;
        let mut board = Board::default();

        if let Some(pins) = file.pins {
            if let Some(data) = pins.data {
                board.pins.data = data;
            }
            if let Some(pin) = pins.output_enable {
                board.pins.output_enable = pin;
            }
            if let Some(pin) = pins.write_enable {
                board.pins.write_enable = pin;
            }
        }

        if let Some(addressing) = file.addressing {
            board.pins.addressing = addressing_lines(addressing)?;
        }
        // The range follows the wiring unless given explicitly
        board.max_address = max_address_for(board.pins.address_bits());

        if let Some(timing) = file.timing {
            if let Some(us) = timing.pulse_us {
                board.timing.pulse_us = us;
            }
            if let Some(us) = timing.settle_us {
                board.timing.settle_us = us;
            }
            if let Some(us) = timing.setup_us {
                board.timing.setup_us = us;
            }
        }

        if let Some(max) = file.chip.and_then(|chip| chip.max_address) {
            board.max_address = max;
        }

        Ok(board)
    }

    /// Apply command line overrides
    pub fn with_overrides(
        mut self,
        settle_us: Option<u32>,
        pulse_us: Option<u32>,
        max_address: Option<u32>,
    ) -> Self {
        if let Some(us) = settle_us {
            self.timing = self.timing.with_settle_us(us);
        }
        if let Some(us) = pulse_us {
            self.timing = self.timing.with_pulse_us(us);
        }
        if let Some(max) = max_address {
            self.max_address = max;
        }
        self
    }

    /// Reject wiring that cannot work, before any pin is touched
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pins.validate()?;

        let bits = self.pins.address_bits();
        let limit = max_address_for(bits);
        if self.max_address > limit {
            return Err(ConfigError::MaxAddress {
                max_address: self.max_address,
                bits,
                limit,
            });
        }
        Ok(())
    }
}

fn addressing_lines(toml: TomlAddressing) -> Result<AddressLines, ConfigError> {
    let (ref_data, ref_clock, ref_bits) = match PinMap::reference().addressing {
        AddressLines::Serial { data, clock, bits }
        | AddressLines::Latched {
            data, clock, bits, ..
        } => (Some(data), Some(clock), bits),
        AddressLines::Direct { lines } => (None, None, lines.len() as u8),
    };

    let mode = match toml.mode {
        TomlMode::Serial => "serial",
        TomlMode::Latched => "latched",
        TomlMode::Direct => "direct",
    };
    let required = |value: Option<Pin>, key| value.ok_or(ConfigError::MissingKey { mode, key });
    let bits = toml.bits.unwrap_or(ref_bits);

    Ok(match toml.mode {
        TomlMode::Serial => AddressLines::Serial {
            data: required(toml.data.or(ref_data), "data")?,
            clock: required(toml.clock.or(ref_clock), "clock")?,
            bits,
        },
        TomlMode::Latched => AddressLines::Latched {
            data: required(toml.data.or(ref_data), "data")?,
            clock: required(toml.clock.or(ref_clock), "clock")?,
            strobe: required(toml.strobe, "strobe")?,
            bits,
        },
        TomlMode::Direct => {
            let pins = toml.lines.ok_or(ConfigError::MissingKey { mode, key: "lines" })?;
            let mut lines = heapless::Vec::new();
            for &pin in &pins {
                lines
                    .push(pin)
                    .map_err(|_| ConfigError::TooManyLines(pins.len()))?;
            }
            AddressLines::Direct { lines }
        }
    })
}
