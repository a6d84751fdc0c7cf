//! nordump-dummy - Simulated NOR flash test bench
//!
//! This crate provides a [`GpioBackend`] that emulates the whole bench in
//! memory: the address shift-register chain (or direct address wiring), a
//! parallel NOR flash chip with its autoselect command set, and the pull-ups
//! on the data bus. It's useful for testing and development without real
//! hardware.
//!
//! Time is virtual: delays advance a counter instead of sleeping, so the
//! bench can check that the host respects the settle times.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
use alloc::collections::BTreeMap;
#[cfg(feature = "alloc")]
use alloc::vec;
#[cfg(feature = "alloc")]
use alloc::vec::Vec;

use nordump_core::address::max_address_for;
use nordump_core::chip::{
    FlashIdentity, AUTOSELECT_ENTRY, DEVICE_OFFSETS, MANUFACTURER_OFFSET, UNLOCK_1, UNLOCK_2,
};
use nordump_core::gpio::{AddressLines, Direction, GpioBackend, Level, Pin, PinMap};

/// Command byte that returns the chip to read-array mode from any state
const RESET_COMMAND: u8 = 0xF0;

/// Configuration for the simulated bench
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Wiring between the host and the bench
    pub pins: PinMap,
    /// IDs returned in autoselect mode
    pub identity: FlashIdentity,
    /// Flash size in bytes. Higher addresses wrap around.
    pub size: usize,
    /// Shift-register outputs looped back onto DQ0-DQ7 instead of a chip
    pub loopback: bool,
    /// Address bits stuck low (broken chain stage or open line)
    pub stuck_low: u32,
    /// Record every bus cycle
    pub trace: bool,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            pins: PinMap::reference(),
            identity: FlashIdentity {
                // S29GL128 (AMD/Spansion)
                manufacturer: 0x01,
                device: [0x7E, 0x21, 0x01],
            },
            size: 64 * 1024,
            loopback: false,
            stuck_low: 0,
            trace: false,
        }
    }
}

/// Command state of the simulated chip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipMode {
    /// Read-array mode
    Read,
    /// First unlock cycle seen
    Unlocked1,
    /// Second unlock cycle seen
    Unlocked2,
    /// Autoselect (ID) mode
    Autoselect,
}

/// One bus cycle as seen by the chip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusCycle {
    /// WE# pulse with OE# high
    Write {
        /// Address latched on the falling WE# edge
        address: u32,
        /// Data latched on the rising WE# edge
        data: u8,
    },
    /// OE# pulse with WE# high
    Read {
        /// Address presented while OE# was low
        address: u32,
        /// Byte the chip drove
        data: u8,
        /// Time the address had been stable when OE# fell
        address_age_us: u64,
        /// Time OE# stayed low
        output_enable_us: u64,
    },
}

#[derive(Debug, Clone, Copy, Default)]
struct Line {
    direction: Option<Direction>,
    level: Option<Level>,
}

/// Levels of the edge-sensitive inputs of the bench
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Controls {
    output_enable: Level,
    write_enable: Level,
    clock: Level,
    strobe: Level,
}

#[derive(Debug, Clone, Copy)]
struct PendingRead {
    started_us: u64,
    address_age_us: u64,
}

/// Simulated bench
///
/// Implements [`GpioBackend`] on the host side of the wiring described by
/// [`DummyConfig::pins`].
#[cfg(feature = "alloc")]
pub struct DummyBench {
    config: DummyConfig,
    data: Vec<u8>,
    lines: BTreeMap<Pin, Line>,
    /// Shift stages of the chain
    chain: u32,
    /// Address currently on the chip's inputs
    address: u32,
    address_changed_us: u64,
    now_us: u64,
    mode: ChipMode,
    write_address: u32,
    pending_read: Option<PendingRead>,
    contended: bool,
    contentions: u32,
    clock_edges: u64,
    cycles: Vec<BusCycle>,
}

/// Deterministic fill used by [`DummyBench::new`]
pub fn fill_pattern(address: usize) -> u8 {
    (address ^ (address >> 8) ^ (address >> 16)) as u8
}

#[cfg(feature = "alloc")]
impl DummyBench {
    /// Create a bench whose flash holds [`fill_pattern`]
    pub fn new(config: DummyConfig) -> Self {
        let data = (0..config.size).map(fill_pattern).collect();
        Self::build(config, data)
    }

    /// Create a bench with the default configuration
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Create a bench with pre-filled flash data, erased (0xFF) beyond it
    pub fn with_data(config: DummyConfig, initial_data: &[u8]) -> Self {
        let mut data = vec![0xFF; config.size];
        let len = core::cmp::min(initial_data.len(), data.len());
        data[..len].copy_from_slice(&initial_data[..len]);
        Self::build(config, data)
    }

    fn build(config: DummyConfig, data: Vec<u8>) -> Self {
        Self {
            config,
            data,
            lines: BTreeMap::new(),
            chain: 0,
            address: 0,
            address_changed_us: 0,
            now_us: 0,
            mode: ChipMode::Read,
            write_address: 0,
            pending_read: None,
            contended: false,
            contentions: 0,
            clock_edges: 0,
            cycles: Vec::new(),
        }
    }

    /// Get a reference to the flash data
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get a mutable reference to the flash data
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Virtual time elapsed, in microseconds
    pub fn now_us(&self) -> u64 {
        self.now_us
    }

    /// Address currently presented to the chip
    pub fn address(&self) -> u32 {
        self.address
    }

    /// Chip command state
    pub fn mode(&self) -> ChipMode {
        self.mode
    }

    /// Rising edges seen on the shift clock
    pub fn clock_edges(&self) -> u64 {
        self.clock_edges
    }

    /// Number of times host and chip started driving the bus together
    pub fn contentions(&self) -> u32 {
        self.contentions
    }

    /// Recorded bus cycles (empty unless [`DummyConfig::trace`] is set)
    pub fn cycles(&self) -> &[BusCycle] {
        &self.cycles
    }

    /// Take the recorded bus cycles
    pub fn take_cycles(&mut self) -> Vec<BusCycle> {
        core::mem::take(&mut self.cycles)
    }

    fn line(&self, pin: Pin) -> Line {
        self.lines.get(&pin).copied().unwrap_or_default()
    }

    /// Level the host drives on `pin`, or `undriven` for an input
    fn host_level(&self, pin: Pin, undriven: Level) -> Level {
        match self.line(pin) {
            Line {
                direction: Some(Direction::Output),
                level: Some(level),
            } => level,
            Line {
                direction: Some(Direction::Output),
                level: None,
            } => Level::Low,
            _ => undriven,
        }
    }

    fn host_drives_bus(&self) -> bool {
        self.config
            .pins
            .data
            .iter()
            .any(|&pin| self.line(pin).direction == Some(Direction::Output))
    }

    /// Byte the host puts on the bus, pulled up where undriven
    fn host_byte(&self) -> u8 {
        self.config
            .pins
            .data
            .iter()
            .enumerate()
            .fold(0, |byte, (bit, &pin)| {
                if self.host_level(pin, Level::High).is_high() {
                    byte | (1 << bit)
                } else {
                    byte
                }
            })
    }

    fn controls(&self) -> Controls {
        let pins = &self.config.pins;
        let (clock, strobe) = match pins.addressing {
            AddressLines::Serial { clock, .. } => (self.host_level(clock, Level::Low), Level::Low),
            AddressLines::Latched { clock, strobe, .. } => (
                self.host_level(clock, Level::Low),
                self.host_level(strobe, Level::Low),
            ),
            AddressLines::Direct { .. } => (Level::Low, Level::Low),
        };
        // OE# and WE# are pulled up on the board
        Controls {
            output_enable: self.host_level(pins.output_enable, Level::High),
            write_enable: self.host_level(pins.write_enable, Level::High),
            clock,
            strobe,
        }
    }

    fn chip_drives_bus(&self, controls: &Controls) -> bool {
        self.config.loopback
            || (controls.output_enable == Level::Low && controls.write_enable == Level::High)
    }

    /// Byte the chip (or the loopback) drives for the current address
    fn chip_byte(&self) -> u8 {
        if self.config.loopback {
            return self.address as u8;
        }
        match self.mode {
            ChipMode::Autoselect => {
                if self.address == MANUFACTURER_OFFSET {
                    self.config.identity.manufacturer
                } else {
                    DEVICE_OFFSETS
                        .iter()
                        .position(|&offset| offset == self.address)
                        .map_or(0x00, |i| self.config.identity.device[i])
                }
            }
            _ => {
                if self.data.is_empty() {
                    0xFF
                } else {
                    self.data[self.address as usize % self.data.len()]
                }
            }
        }
    }

    fn present_address(&mut self, address: u32) {
        let mask = max_address_for(self.config.pins.address_bits());
        let address = address & !self.config.stuck_low & mask;
        if address != self.address {
            self.address = address;
            self.address_changed_us = self.now_us;
        }
    }

    fn command(&mut self, address: u32, data: u8) {
        if self.config.trace {
            self.cycles.push(BusCycle::Write { address, data });
        }

        let next = match (self.mode, (address, data)) {
            (_, (_, RESET_COMMAND)) => ChipMode::Read,
            (ChipMode::Read, UNLOCK_1) => ChipMode::Unlocked1,
            (ChipMode::Unlocked1, UNLOCK_2) => ChipMode::Unlocked2,
            (ChipMode::Unlocked2, AUTOSELECT_ENTRY) => ChipMode::Autoselect,
            (ChipMode::Autoselect, _) => ChipMode::Autoselect,
            _ => ChipMode::Read,
        };
        if next != self.mode {
            log::debug!("dummy: {:?} -> {:?}", self.mode, next);
        }
        self.mode = next;
    }

    fn shift_edge(&mut self, before: &Controls, after: &Controls) {
        let rising_clock = before.clock == Level::Low && after.clock == Level::High;
        match self.config.pins.addressing.clone() {
            AddressLines::Serial { data, bits, .. } => {
                if rising_clock {
                    self.clock_edges += 1;
                    // The output latch takes the stages from before the edge
                    self.present_address(self.chain);
                    let bit = self.host_level(data, Level::Low).is_high() as u32;
                    self.chain = (self.chain >> 1) | (bit << (bits - 1));
                }
            }
            AddressLines::Latched { data, bits, .. } => {
                let bytes = (bits as u32).div_ceil(8);
                if rising_clock {
                    self.clock_edges += 1;
                    let bit = self.host_level(data, Level::Low).is_high() as u32;
                    self.chain = ((self.chain << 1) | bit) & max_address_for((bytes * 8) as u8);
                }
                if before.strobe == Level::Low && after.strobe == Level::High {
                    // The byte shifted in first ends up furthest down the chain
                    let address = (0..bytes).fold(0, |address, i| {
                        let byte = (self.chain >> (8 * (bytes - 1 - i))) & 0xFF;
                        address | (byte << (8 * i))
                    });
                    self.present_address(address);
                }
            }
            AddressLines::Direct { lines } => {
                let address = lines.iter().enumerate().fold(0, |address, (bit, &pin)| {
                    if self.host_level(pin, Level::Low).is_high() {
                        address | (1 << bit)
                    } else {
                        address
                    }
                });
                self.present_address(address);
            }
        }
    }

    /// React to whatever the last host call changed
    fn update(&mut self, before: Controls) {
        let after = self.controls();
        self.shift_edge(&before, &after);

        if before.write_enable == Level::High && after.write_enable == Level::Low {
            self.write_address = self.address;
        }
        if before.write_enable == Level::Low
            && after.write_enable == Level::High
            && after.output_enable == Level::High
        {
            let data = self.host_byte();
            self.command(self.write_address, data);
        }

        if before.output_enable == Level::High
            && after.output_enable == Level::Low
            && after.write_enable == Level::High
        {
            self.pending_read = Some(PendingRead {
                started_us: self.now_us,
                address_age_us: self.now_us - self.address_changed_us,
            });
        }
        if before.output_enable == Level::Low && after.output_enable == Level::High {
            if let Some(read) = self.pending_read.take() {
                if self.config.trace {
                    self.cycles.push(BusCycle::Read {
                        address: self.address,
                        data: self.chip_byte(),
                        address_age_us: read.address_age_us,
                        output_enable_us: self.now_us - read.started_us,
                    });
                }
            }
        }

        let contended = self.chip_drives_bus(&after) && self.host_drives_bus();
        if contended && !self.contended {
            self.contentions += 1;
            log::warn!("dummy: bus contention at address 0x{:06x}", self.address);
        }
        self.contended = contended;
    }
}

#[cfg(feature = "alloc")]
impl GpioBackend for DummyBench {
    fn set_direction(&mut self, pin: Pin, direction: Direction) {
        let before = self.controls();
        self.lines.entry(pin).or_default().direction = Some(direction);
        self.update(before);
    }

    fn set_level(&mut self, pin: Pin, level: Level) {
        let before = self.controls();
        self.lines.entry(pin).or_default().level = Some(level);
        self.update(before);
    }

    fn get_level(&self, pin: Pin) -> Level {
        let controls = self.controls();
        match self.config.pins.data.iter().position(|&p| p == pin) {
            Some(bit) if self.chip_drives_bus(&controls) => {
                Level::of_bit(self.chip_byte() as u32, bit as u32)
            }
            // Pull-ups on the data bus
            Some(_) => self.host_level(pin, Level::High),
            None => self.host_level(pin, Level::Low),
        }
    }

    fn delay_us(&mut self, us: u32) {
        self.now_us += us as u64;
    }
}
