//! GPIO port abstraction
//!
//! A [`GpioBackend`] knows how to drive and sample physical pins. A [`Port`]
//! puts a [`PinMap`] on top of it so the rest of the engine talks in logical
//! [`PinRole`]s, and it keeps track of each role's direction so that driving
//! an input or sampling an output is caught on the spot.
//!
//! The pin map is fixed when the port is built. There is no global pin
//! table: every component reaches the pins through the port it was handed.

use core::fmt;

use heapless::Vec;

use crate::error::{Error, Result};

/// Physical pin number (line offset on the GPIO controller)
pub type Pin = u32;

/// Number of data bus lines (DQ0-DQ7)
pub const DATA_LINES: usize = 8;

/// Maximum number of address bits / direct address lines
pub const MAX_ADDRESS_LINES: usize = 32;

/// Fixed (non-address) roles: OE#, WE#, shift data, shift clock, shift strobe
const CONTROL_ROLES: usize = 5;

/// Upper bound on the number of roles a pin map can wire
pub const MAX_ROLES: usize = DATA_LINES + CONTROL_ROLES + MAX_ADDRESS_LINES;

/// Logic level of a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Logical low / 0
    Low,
    /// Logical high / 1
    High,
}

impl Level {
    /// Level of bit `bit` in `value`
    #[inline]
    pub fn of_bit(value: u32, bit: u32) -> Self {
        Self::from((value >> bit) & 1 != 0)
    }

    /// Returns true for [`Level::High`]
    #[inline]
    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

impl From<bool> for Level {
    #[inline]
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// Pin direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Pin is sampled
    Input,
    /// Pin is driven
    Output,
}

/// Logical function of a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinRole {
    /// Data bus line DQ0-DQ7
    Data(u8),
    /// Output enable (OE#, active low)
    OutputEnable,
    /// Write enable (WE#, active low)
    WriteEnable,
    /// Serial data input of the address shift-register chain
    ShiftData,
    /// Shift clock of the address shift-register chain
    ShiftClock,
    /// Storage/latch strobe of the address shift-register chain
    ShiftStrobe,
    /// Address bit wired straight to a pin
    Address(u8),
}

impl fmt::Display for PinRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data(i) => write!(f, "DQ{}", i),
            Self::OutputEnable => write!(f, "OE#"),
            Self::WriteEnable => write!(f, "WE#"),
            Self::ShiftData => write!(f, "ADDR_DATA"),
            Self::ShiftClock => write!(f, "ADDR_CLOCK"),
            Self::ShiftStrobe => write!(f, "ADDR_STROBE"),
            Self::Address(i) => write!(f, "A{}", i),
        }
    }
}

/// How the address lines are wired
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressLines {
    /// 2-wire shift-register chain (data + clock)
    Serial {
        /// Serial data pin
        data: Pin,
        /// Shift clock pin
        clock: Pin,
        /// Address width in bits
        bits: u8,
    },
    /// 3-wire shift-register chain with a separate latch strobe
    Latched {
        /// Serial data pin
        data: Pin,
        /// Shift clock pin
        clock: Pin,
        /// Latch strobe pin
        strobe: Pin,
        /// Address width in bits
        bits: u8,
    },
    /// One pin per address bit, bit 0 first
    Direct {
        /// Address pins, index = address bit
        lines: Vec<Pin, MAX_ADDRESS_LINES>,
    },
}

impl AddressLines {
    /// Address width in bits
    pub fn bits(&self) -> u8 {
        match self {
            Self::Serial { bits, .. } | Self::Latched { bits, .. } => *bits,
            Self::Direct { lines } => lines.len() as u8,
        }
    }
}

/// Role to physical pin assignment
///
/// Built once at startup and handed to [`Port::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinMap {
    /// DQ0-DQ7 pins
    pub data: [Pin; DATA_LINES],
    /// OE# pin
    pub output_enable: Pin,
    /// WE# pin
    pub write_enable: Pin,
    /// Address line wiring
    pub addressing: AddressLines,
}

impl PinMap {
    /// Reference wiring on a Raspberry Pi (BCM line offsets on gpiochip0)
    /// with a 24-bit 2-wire shift-register chain.
    pub fn reference() -> Self {
        Self {
            data: [2, 3, 4, 17, 18, 27, 22, 23],
            output_enable: 24,
            write_enable: 10,
            addressing: AddressLines::Serial {
                data: 9,
                clock: 25,
                bits: 24,
            },
        }
    }

    /// Reference wiring with A-1..A12 driven straight from GPIOs.
    ///
    /// The remaining address inputs of the chip must be tied to ground.
    pub fn reference_direct() -> Self {
        let mut lines = Vec::new();
        for pin in [9, 25, 11, 8, 7, 5, 6, 12, 13, 19, 16, 26, 20, 21] {
            // 14 lines always fit
            let _ = lines.push(pin);
        }
        Self {
            addressing: AddressLines::Direct { lines },
            ..Self::reference()
        }
    }

    /// Physical pin for `role`, if wired
    pub fn pin(&self, role: PinRole) -> Option<Pin> {
        match (role, &self.addressing) {
            (PinRole::Data(i), _) => self.data.get(i as usize).copied(),
            (PinRole::OutputEnable, _) => Some(self.output_enable),
            (PinRole::WriteEnable, _) => Some(self.write_enable),
            (
                PinRole::ShiftData,
                AddressLines::Serial { data, .. } | AddressLines::Latched { data, .. },
            ) => Some(*data),
            (
                PinRole::ShiftClock,
                AddressLines::Serial { clock, .. } | AddressLines::Latched { clock, .. },
            ) => Some(*clock),
            (PinRole::ShiftStrobe, AddressLines::Latched { strobe, .. }) => Some(*strobe),
            (PinRole::Address(i), AddressLines::Direct { lines }) => lines.get(i as usize).copied(),
            (
                PinRole::ShiftData
                | PinRole::ShiftClock
                | PinRole::ShiftStrobe
                | PinRole::Address(_),
                _,
            ) => None,
        }
    }

    /// Every wired role, in a fixed order (data, control, address)
    pub fn roles(&self) -> Vec<PinRole, MAX_ROLES> {
        let mut roles = Vec::new();
        let mut push = |role| {
            // MAX_ROLES covers every role a map can hold
            let _ = roles.push(role);
        };

        for i in 0..DATA_LINES as u8 {
            push(PinRole::Data(i));
        }
        push(PinRole::OutputEnable);
        push(PinRole::WriteEnable);
        match &self.addressing {
            AddressLines::Serial { .. } => {
                push(PinRole::ShiftData);
                push(PinRole::ShiftClock);
            }
            AddressLines::Latched { .. } => {
                push(PinRole::ShiftData);
                push(PinRole::ShiftClock);
                push(PinRole::ShiftStrobe);
            }
            AddressLines::Direct { lines } => {
                for i in 0..lines.len() as u8 {
                    push(PinRole::Address(i));
                }
            }
        }
        roles
    }

    /// Address width in bits
    pub fn address_bits(&self) -> u8 {
        self.addressing.bits()
    }

    /// Check that the map is usable: a sane address width and no pin
    /// assigned to two roles.
    pub fn validate(&self) -> Result<()> {
        let bits = self.address_bits();
        if bits == 0 || bits as usize > MAX_ADDRESS_LINES {
            return Err(Error::InvalidAddressWidth { bits });
        }

        let roles = self.roles();
        for (i, &first) in roles.iter().enumerate() {
            for &second in &roles[i + 1..] {
                let pin = self.pin(first);
                if pin.is_some() && pin == self.pin(second) {
                    return Err(Error::PinConflict {
                        pin: pin.unwrap_or_default(),
                        first,
                        second,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Physical pin access provided by a platform
///
/// Calls are synchronous; their latency is assumed negligible next to the
/// delays the engine inserts. Failures at this level are the backend's to
/// report (the Linux backend logs them).
pub trait GpioBackend {
    /// Set pin direction. An output keeps the level last written to the pin.
    fn set_direction(&mut self, pin: Pin, direction: Direction);

    /// Drive a pin (or latch the level an input will drive once switched)
    fn set_level(&mut self, pin: Pin, level: Level);

    /// Sample a pin
    fn get_level(&self, pin: Pin) -> Level;

    /// Block for at least `us` microseconds
    fn delay_us(&mut self, us: u32);

    /// Block for at least `ms` milliseconds
    fn delay_ms(&mut self, ms: u32) {
        self.delay_us(ms.saturating_mul(1000));
    }

    /// Switch a pin to output with a known initial level
    ///
    /// Default implementation latches the level first so the pin never
    /// glitches to a stale value.
    fn set_output(&mut self, pin: Pin, level: Level) {
        self.set_level(pin, level);
        self.set_direction(pin, Direction::Output);
    }
}

impl<T: GpioBackend + ?Sized> GpioBackend for &mut T {
    fn set_direction(&mut self, pin: Pin, direction: Direction) {
        (**self).set_direction(pin, direction)
    }

    fn set_level(&mut self, pin: Pin, level: Level) {
        (**self).set_level(pin, level)
    }

    fn get_level(&self, pin: Pin) -> Level {
        (**self).get_level(pin)
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }

    fn delay_ms(&mut self, ms: u32) {
        (**self).delay_ms(ms)
    }

    fn set_output(&mut self, pin: Pin, level: Level) {
        (**self).set_output(pin, level)
    }
}

/// Direction bookkeeping slot for a role
fn slot(role: PinRole) -> usize {
    match role {
        PinRole::Data(i) => i as usize,
        PinRole::OutputEnable => DATA_LINES,
        PinRole::WriteEnable => DATA_LINES + 1,
        PinRole::ShiftData => DATA_LINES + 2,
        PinRole::ShiftClock => DATA_LINES + 3,
        PinRole::ShiftStrobe => DATA_LINES + 4,
        PinRole::Address(i) => DATA_LINES + CONTROL_ROLES + i as usize,
    }
}

/// Logical view of the pins: a backend plus a pin map
///
/// The port owns the backend, so whoever owns the port has exclusive use
/// of the pins.
pub struct Port<B> {
    backend: B,
    map: PinMap,
    directions: [Option<Direction>; MAX_ROLES],
}

impl<B: GpioBackend> Port<B> {
    /// Bind `backend` to `map`
    ///
    /// No pin is touched; directions are unknown until configured.
    pub fn new(backend: B, map: PinMap) -> Result<Self> {
        map.validate()?;
        Ok(Self {
            backend,
            map,
            directions: [None; MAX_ROLES],
        })
    }

    /// Pin map in use
    pub fn map(&self) -> &PinMap {
        &self.map
    }

    /// Underlying backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Underlying backend (mutable)
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    fn resolve(&self, role: PinRole) -> Pin {
        match self.map.pin(role) {
            Some(pin) => pin,
            None => panic!("pin role {} is not wired", role),
        }
    }

    /// Last configured direction of `role`
    pub fn direction(&self, role: PinRole) -> Option<Direction> {
        self.map.pin(role)?;
        self.directions[slot(role)]
    }

    /// Set the direction of `role`
    ///
    /// # Panics
    ///
    /// If `role` is not wired.
    pub fn configure(&mut self, role: PinRole, direction: Direction) {
        let pin = self.resolve(role);
        self.backend.set_direction(pin, direction);
        self.directions[slot(role)] = Some(direction);
    }

    /// Make `role` an output driving `level`
    ///
    /// # Panics
    ///
    /// If `role` is not wired.
    pub fn drive(&mut self, role: PinRole, level: Level) {
        let pin = self.resolve(role);
        self.backend.set_output(pin, level);
        self.directions[slot(role)] = Some(Direction::Output);
    }

    /// Set every wired role to `direction`
    pub fn configure_all(&mut self, direction: Direction) {
        for role in self.map.roles() {
            self.configure(role, direction);
        }
    }

    /// Drive an output
    ///
    /// # Panics
    ///
    /// If `role` is not wired or not configured as an output.
    pub fn write(&mut self, role: PinRole, level: Level) {
        let pin = self.resolve(role);
        match self.directions[slot(role)] {
            Some(Direction::Output) => self.backend.set_level(pin, level),
            other => panic!("write to {} while configured as {:?}", role, other),
        }
    }

    /// Sample an input
    ///
    /// # Panics
    ///
    /// If `role` is not wired or not configured as an input.
    pub fn read(&self, role: PinRole) -> Level {
        let pin = self.resolve(role);
        match self.directions[slot(role)] {
            Some(Direction::Input) => self.backend.get_level(pin),
            other => panic!("read from {} while configured as {:?}", role, other),
        }
    }

    /// Block for `us` microseconds
    #[inline]
    pub fn delay_us(&mut self, us: u32) {
        if us > 0 {
            self.backend.delay_us(us);
        }
    }

    /// Block for `ms` milliseconds
    #[inline]
    pub fn delay_ms(&mut self, ms: u32) {
        if ms > 0 {
            self.backend.delay_ms(ms);
        }
    }
}
