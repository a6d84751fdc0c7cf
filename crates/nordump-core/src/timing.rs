//! Bus timing parameters
//!
//! All values are minimum wait times. The backend may sleep longer.

/// Default address clock period in microseconds (500 kHz)
pub const DEFAULT_PULSE_US: u32 = 2;

/// Default settle time around OE#/WE# transitions, in microseconds
pub const DEFAULT_SETTLE_US: u32 = 100;

/// Default wait after putting the pins in their read configuration
pub const DEFAULT_SETUP_US: u32 = 10;

/// Timing used by the sequencer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Full address clock period (two phases)
    pub pulse_us: u32,
    /// Settle time after every control or address change
    pub settle_us: u32,
    /// Wait after configuring the pins for reading
    pub setup_us: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            pulse_us: DEFAULT_PULSE_US,
            settle_us: DEFAULT_SETTLE_US,
            setup_us: DEFAULT_SETUP_US,
        }
    }
}

impl Timing {
    /// Duration of one clock phase
    #[inline]
    pub fn half_pulse_us(&self) -> u32 {
        self.pulse_us.div_ceil(2)
    }

    /// Set the address clock period
    pub fn with_pulse_us(mut self, us: u32) -> Self {
        self.pulse_us = us;
        self
    }

    /// Set the settle time
    pub fn with_settle_us(mut self, us: u32) -> Self {
        self.settle_us = us;
        self
    }

    /// Rough time needed to read one byte with the given address width,
    /// used for dump time estimates.
    pub fn read_cycle_estimate_us(&self, address_bits: u8) -> u64 {
        let shift = (address_bits as u64 + 1) * self.pulse_us as u64;
        shift + 4 * self.settle_us as u64
    }
}
