//! NOR flash read/write sequencer
//!
//! [`NorBus`] owns the [`Port`] and an [`AddressStrategy`] and performs
//! single bus cycles with the settle delays the chip needs between
//! transitions.
//!
//! Read cycle:
//!
//! ```text
//! bus input, WE#=1, OE#=1 | load address | OE#=0 | sample | OE#=1
//!             settle          settle       settle           settle
//! ```
//!
//! Write cycle (command sequences only, no programming):
//!
//! ```text
//! WE#=1, OE#=1 | bus output, address, data | WE#=0 | WE#=1
//!    settle              settle              settle  settle
//! ```
//!
//! Nothing is retried. An error leaves the pins as they are; callers
//! that need a safe state call [`NorBus::release`].

use crate::address::AddressStrategy;
use crate::bus;
use crate::chip::{
    FlashIdentity, AUTOSELECT_MAX_OFFSET, AUTOSELECT_SEQUENCE, DEVICE_OFFSETS,
    MANUFACTURER_OFFSET, RESET,
};
use crate::error::{Error, Result};
use crate::gpio::{Direction, GpioBackend, Level, PinRole, Port, MAX_ADDRESS_LINES};
use crate::timing::Timing;

/// Sequencer state, advanced by each cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    /// Between cycles, OE# and WE# inactive
    Idle,
    /// Address being loaded and settling
    AddressSettling,
    /// OE# asserted, chip driving the bus
    Reading,
    /// Host driving the bus for a command write
    Writing,
}

/// A NOR flash chip on GPIO lines
pub struct NorBus<B, A> {
    port: Port<B>,
    addressing: A,
    timing: Timing,
    state: CycleState,
}

impl<B: GpioBackend, A: AddressStrategy> NorBus<B, A> {
    /// Build a sequencer over `port`
    ///
    /// Fails if the addressing strategy needs a line the pin map does not
    /// provide. No pin is touched.
    pub fn new(port: Port<B>, addressing: A, timing: Timing) -> Result<Self> {
        let bits = addressing.bits();
        if bits == 0 || bits as usize > MAX_ADDRESS_LINES {
            return Err(Error::InvalidAddressWidth { bits });
        }
        for &role in addressing.lines() {
            if port.map().pin(role).is_none() {
                return Err(Error::RoleNotWired(role));
            }
        }

        log::debug!(
            "nor: {} addressing, {} bits, pulse {} us, settle {} us",
            addressing.kind(),
            bits,
            timing.pulse_us,
            timing.settle_us
        );

        Ok(Self {
            port,
            addressing,
            timing,
            state: CycleState::Idle,
        })
    }

    /// Current sequencer state
    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Timing in use
    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Addressing strategy in use
    pub fn addressing(&self) -> &A {
        &self.addressing
    }

    /// The underlying port
    pub fn port(&self) -> &Port<B> {
        &self.port
    }

    /// The underlying port (mutable)
    pub fn port_mut(&mut self) -> &mut Port<B> {
        &mut self.port
    }

    /// Highest address the wiring can present
    pub fn max_address(&self) -> u32 {
        self.addressing.max_address()
    }

    fn check_address(&self, address: u32) -> Result<()> {
        let max = self.max_address();
        if address > max {
            return Err(Error::AddressOutOfRange { address, max });
        }
        Ok(())
    }

    /// Put every pin in its read configuration
    ///
    /// All lines become inputs, then WE# and OE# are driven high and the
    /// address lines low, followed by the setup wait.
    pub fn prepare_read(&mut self) {
        log::debug!("nor: configuring pins for read");
        self.port.configure_all(Direction::Input);
        self.port.drive(PinRole::WriteEnable, Level::High);
        self.port.drive(PinRole::OutputEnable, Level::High);
        self.addressing.idle(&mut self.port);
        self.port.delay_us(self.timing.setup_us);
        self.state = CycleState::Idle;
    }

    /// Make every pin an input
    pub fn release(&mut self) {
        log::debug!("nor: releasing all pins");
        self.port.configure_all(Direction::Input);
        self.state = CycleState::Idle;
    }

    /// Load `address` onto the chip's address inputs without touching
    /// OE# or WE#.
    ///
    /// # Panics
    ///
    /// If [`prepare_read`](Self::prepare_read) has not been called.
    pub fn load_address(&mut self, address: u32) -> Result<()> {
        self.check_address(address)?;
        self.state = CycleState::AddressSettling;
        self.addressing.load(&mut self.port, &self.timing, address);
        self.port.delay_us(self.timing.half_pulse_us());
        self.state = CycleState::Idle;
        Ok(())
    }

    /// Switch the bus to input (if needed) and sample it
    pub fn sample_bus(&mut self) -> u8 {
        bus::set_direction(&mut self.port, Direction::Input);
        bus::read_byte(&self.port)
    }

    /// Perform one read cycle
    ///
    /// # Panics
    ///
    /// If [`prepare_read`](Self::prepare_read) has not been called.
    pub fn read(&mut self, address: u32) -> Result<u8> {
        self.check_address(address)?;
        let settle = self.timing.settle_us;

        bus::set_direction(&mut self.port, Direction::Input);
        self.port.write(PinRole::WriteEnable, Level::High);
        self.port.write(PinRole::OutputEnable, Level::High);
        self.port.delay_us(settle);

        self.state = CycleState::AddressSettling;
        self.addressing.load(&mut self.port, &self.timing, address);
        self.port.delay_us(settle);

        self.state = CycleState::Reading;
        self.port.write(PinRole::OutputEnable, Level::Low);
        self.port.delay_us(settle);
        let value = bus::read_byte(&self.port);
        self.port.write(PinRole::OutputEnable, Level::High);
        self.port.delay_us(settle);

        self.state = CycleState::Idle;
        log::trace!("nor: read 0x{:06x} -> 0x{:02x}", address, value);
        Ok(value)
    }

    /// Perform one write cycle (command write)
    ///
    /// # Panics
    ///
    /// If [`prepare_read`](Self::prepare_read) has not been called.
    pub fn write(&mut self, address: u32, data: u8) -> Result<()> {
        self.check_address(address)?;
        let settle = self.timing.settle_us;

        self.port.write(PinRole::WriteEnable, Level::High);
        self.port.write(PinRole::OutputEnable, Level::High);
        self.port.delay_us(settle);

        self.state = CycleState::Writing;
        bus::set_direction(&mut self.port, Direction::Output);
        self.addressing.load(&mut self.port, &self.timing, address);
        bus::write_byte(&mut self.port, data);
        self.port.delay_us(settle);

        // Address latched on the falling edge, data on the rising edge
        self.port.write(PinRole::WriteEnable, Level::Low);
        self.port.delay_us(settle);
        self.port.write(PinRole::WriteEnable, Level::High);
        self.port.delay_us(settle);

        self.state = CycleState::Idle;
        log::trace!("nor: write 0x{:06x} <- 0x{:02x}", address, data);
        Ok(())
    }

    /// Query manufacturer and device IDs through autoselect mode
    ///
    /// Every pin is an input afterwards, whatever the outcome.
    pub fn read_identity(&mut self) -> Result<FlashIdentity> {
        self.check_address(AUTOSELECT_MAX_OFFSET)?;
        self.prepare_read();
        let result = self.autoselect();
        self.release();
        result
    }

    fn autoselect(&mut self) -> Result<FlashIdentity> {
        log::debug!("nor: entering autoselect mode");
        for (address, data) in AUTOSELECT_SEQUENCE {
            self.write(address, data)?;
        }

        let manufacturer = self.read(MANUFACTURER_OFFSET)?;
        let mut device = [0u8; 3];
        for (byte, offset) in device.iter_mut().zip(DEVICE_OFFSETS) {
            *byte = self.read(offset)?;
        }

        let (address, data) = RESET;
        self.write(address, data)?;
        log::debug!("nor: back in read-array mode");

        Ok(FlashIdentity {
            manufacturer,
            device,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{DirectAddress, LatchedShifter, SerialShifter};
    use crate::gpio::{AddressLines, PinMap};
    use crate::testing::{Op, Recorder};

    const OE: u32 = 24;
    const WE: u32 = 10;
    const CLOCK: u32 = 25;

    fn serial_bus() -> NorBus<Recorder, SerialShifter> {
        let port = Port::new(Recorder::default(), PinMap::reference()).unwrap();
        let mut nor = NorBus::new(port, SerialShifter::new(24), Timing::default()).unwrap();
        nor.prepare_read();
        nor.port_mut().backend_mut().ops.clear();
        nor
    }

    fn position(ops: &[Op], op: Op) -> usize {
        ops.iter().position(|o| *o == op).unwrap()
    }

    #[test]
    fn test_prepare_read_configuration() {
        let port = Port::new(Recorder::default(), PinMap::reference()).unwrap();
        let mut nor = NorBus::new(port, SerialShifter::new(24), Timing::default()).unwrap();
        nor.prepare_read();

        let port = nor.port();
        assert_eq!(bus::direction(port), Some(Direction::Input));
        assert_eq!(port.direction(PinRole::OutputEnable), Some(Direction::Output));
        assert_eq!(port.direction(PinRole::WriteEnable), Some(Direction::Output));
        assert_eq!(port.direction(PinRole::ShiftClock), Some(Direction::Output));
        let rec = port.backend();
        assert_eq!(rec.levels[&OE], Level::High);
        assert_eq!(rec.levels[&WE], Level::High);
        assert_eq!(rec.levels[&CLOCK], Level::Low);
        assert_eq!(rec.ops.last(), Some(&Op::Delay(Timing::default().setup_us)));
    }

    #[test]
    fn test_read_cycle_order() {
        let mut nor = serial_bus();
        nor.read(0x123456).unwrap();
        assert_eq!(nor.state(), CycleState::Idle);

        let ops = &nor.port().backend().ops;
        let settle = Op::Delay(Timing::default().settle_us);

        // Controls inactive and settled before the address moves
        assert_eq!(ops[0], Op::Level(WE, Level::High));
        assert_eq!(ops[1], Op::Level(OE, Level::High));
        assert_eq!(ops[2], settle);

        // Address loaded and settled before OE# goes low
        let oe_low = position(ops, Op::Level(OE, Level::Low));
        let last_clock = ops
            .iter()
            .rposition(|op| matches!(op, Op::Level(CLOCK, _)))
            .unwrap();
        assert!(last_clock < oe_low);
        assert_eq!(ops[oe_low - 1], settle);
        assert_eq!(ops[oe_low + 1], settle);

        // OE# released and settled last
        assert_eq!(ops[ops.len() - 2], Op::Level(OE, Level::High));
        assert_eq!(ops[ops.len() - 1], settle);
    }

    #[test]
    fn test_read_cycle_timing() {
        let mut nor = serial_bus();
        nor.read(0).unwrap();
        let timing = Timing::default();
        assert_eq!(
            nor.port().backend().elapsed_us(),
            timing.read_cycle_estimate_us(24)
        );
    }

    #[test]
    fn test_read_out_of_range_touches_nothing() {
        let mut nor = serial_bus();
        assert_eq!(
            nor.read(0x100_0000),
            Err(Error::AddressOutOfRange {
                address: 0x100_0000,
                max: 0xFF_FFFF,
            })
        );
        assert!(nor.port().backend().ops.is_empty());
    }

    #[test]
    fn test_write_cycle_order() {
        let mut nor = serial_bus();
        nor.write(0x555, 0x55).unwrap();

        let ops = &nor.port().backend().ops;
        let map = PinMap::reference();

        // OE# stays high for the whole write
        assert!(!ops.contains(&Op::Level(OE, Level::Low)));

        // Bus turned around and data driven before WE# falls
        let we_low = position(ops, Op::Level(WE, Level::Low));
        let we_high = ops.iter().rposition(|o| *o == Op::Level(WE, Level::High)).unwrap();
        assert!(we_low < we_high);
        for (bit, &pin) in map.data.iter().enumerate() {
            let dir = position(ops, Op::Direction(pin, Direction::Output));
            let level = position(ops, Op::Level(pin, Level::of_bit(0x55, bit as u32)));
            assert!(dir < level && level < we_low);
        }
        assert_eq!(bus::direction(nor.port()), Some(Direction::Output));
    }

    #[test]
    fn test_read_after_write_turns_bus_around_first() {
        let mut nor = serial_bus();
        nor.write(0xAAA, 0xAA).unwrap();
        nor.port_mut().backend_mut().ops.clear();
        nor.read(0).unwrap();

        let ops = &nor.port().backend().ops;
        let map = PinMap::reference();
        for &pin in &map.data {
            assert!(position(ops, Op::Direction(pin, Direction::Input)) < 8);
        }
    }

    #[test]
    fn test_identity_sequence_counts() {
        let mut nor = serial_bus();
        nor.read_identity().unwrap();

        let rec = nor.port().backend();
        let falling = |pin| {
            let levels = rec.writes_to(pin);
            levels
                .windows(2)
                .filter(|w| w[0] == Level::High && w[1] == Level::Low)
                .count()
        };
        // Three unlock/entry writes plus the reset
        assert_eq!(falling(WE), 4);
        // Manufacturer plus three device cycles
        assert_eq!(falling(OE), 4);

        for role in PinMap::reference().roles() {
            assert_eq!(nor.port().direction(role), Some(Direction::Input));
        }
    }

    #[test]
    fn test_identity_needs_enough_address_bits() {
        let mut map = PinMap::reference();
        map.addressing = AddressLines::Serial {
            data: 9,
            clock: 25,
            bits: 11,
        };
        let port = Port::new(Recorder::default(), map).unwrap();
        let mut nor = NorBus::new(port, SerialShifter::new(11), Timing::default()).unwrap();
        assert_eq!(
            nor.read_identity(),
            Err(Error::AddressOutOfRange {
                address: 0xAAA,
                max: 0x7FF,
            })
        );
        assert!(nor.port().backend().ops.is_empty());
    }

    #[test]
    fn test_strategy_must_match_wiring() {
        let port = Port::new(Recorder::default(), PinMap::reference()).unwrap();
        assert!(matches!(
            NorBus::new(port, LatchedShifter::new(24), Timing::default()),
            Err(Error::RoleNotWired(PinRole::ShiftStrobe))
        ));

        let port = Port::new(Recorder::default(), PinMap::reference()).unwrap();
        assert!(matches!(
            NorBus::new(port, DirectAddress::new(14), Timing::default()),
            Err(Error::RoleNotWired(PinRole::Address(0)))
        ));
    }

    #[test]
    #[should_panic(expected = "write to WE#")]
    fn test_read_without_prepare_panics() {
        let port = Port::new(Recorder::default(), PinMap::reference()).unwrap();
        let mut nor = NorBus::new(port, SerialShifter::new(24), Timing::default()).unwrap();
        let _ = nor.read(0);
    }
}
