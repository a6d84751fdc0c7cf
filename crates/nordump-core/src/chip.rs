//! NOR flash command protocol constants and chip identity
//!
//! Offsets are byte-mode addresses (A-1 is address bit 0) as used by the
//! common AMD/Spansion-style command set.

use core::fmt;

/// One command write: (address, data)
pub type CommandWrite = (u32, u8);

/// First unlock cycle
pub const UNLOCK_1: CommandWrite = (0xAAA, 0xAA);

/// Second unlock cycle
pub const UNLOCK_2: CommandWrite = (0x555, 0x55);

/// Autoselect entry cycle
pub const AUTOSELECT_ENTRY: CommandWrite = (0xAAA, 0x90);

/// Reset to read-array mode
pub const RESET: CommandWrite = (0x000, 0xF0);

/// Full autoselect entry sequence
pub const AUTOSELECT_SEQUENCE: [CommandWrite; 3] = [UNLOCK_1, UNLOCK_2, AUTOSELECT_ENTRY];

/// Manufacturer ID offset in autoselect mode
pub const MANUFACTURER_OFFSET: u32 = 0x00;

/// Device ID offsets in autoselect mode (cycle 1, 2, 3)
pub const DEVICE_OFFSETS: [u32; 3] = [0x02, 0x1C, 0x1E];

/// Highest address touched by the autoselect query
pub const AUTOSELECT_MAX_OFFSET: u32 = 0xAAA;

/// Result of an autoselect query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashIdentity {
    /// Manufacturer ID
    pub manufacturer: u8,
    /// Device ID cycles
    pub device: [u8; 3],
}

impl FlashIdentity {
    /// Vendor name for the manufacturer ID, if known
    pub fn manufacturer_name(&self) -> Option<&'static str> {
        manufacturer_name(self.manufacturer)
    }

    /// True when the manufacturer byte reads as an undriven bus
    pub fn is_floating(&self) -> bool {
        matches!(self.manufacturer, 0x00 | 0xFF)
    }
}

impl fmt::Display for FlashIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "manufacturer 0x{:02X}", self.manufacturer)?;
        if let Some(name) = self.manufacturer_name() {
            write!(f, " ({})", name)?;
        }
        write!(
            f,
            ", device 0x{:02X} 0x{:02X} 0x{:02X}",
            self.device[0], self.device[1], self.device[2]
        )
    }
}

/// JEDEC manufacturer IDs of common parallel NOR vendors
pub fn manufacturer_name(id: u8) -> Option<&'static str> {
    Some(match id {
        0x01 => "AMD/Spansion",
        0x04 => "Fujitsu",
        0x1C => "EON",
        0x1F => "Atmel",
        0x20 => "ST/Micron",
        0x37 => "AMIC",
        0x89 => "Intel",
        0x98 => "Toshiba",
        0xAD => "Hynix",
        0xBF => "SST",
        0xC2 => "Macronix",
        0xDA => "Winbond",
        0xEC => "Samsung",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::format;

    #[test]
    fn test_identity_display() {
        let id = FlashIdentity {
            manufacturer: 0x01,
            device: [0x7E, 0x21, 0x01],
        };
        assert_eq!(
            format!("{}", id),
            "manufacturer 0x01 (AMD/Spansion), device 0x7E 0x21 0x01"
        );

        let unknown = FlashIdentity {
            manufacturer: 0x42,
            device: [0, 0, 0],
        };
        assert_eq!(
            format!("{}", unknown),
            "manufacturer 0x42, device 0x00 0x00 0x00"
        );
    }

    #[test]
    fn test_floating_bus() {
        let pulled_up = FlashIdentity {
            manufacturer: 0xFF,
            device: [0xFF; 3],
        };
        assert!(pulled_up.is_floating());
        assert!(!FlashIdentity {
            manufacturer: 0xC2,
            device: [0x22, 0x7E, 0x01],
        }
        .is_floating());
    }
}
