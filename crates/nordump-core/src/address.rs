//! Address loading strategies
//!
//! Three ways of presenting an address to the flash chip:
//!
//! - [`SerialShifter`] - 2-wire chain (data + clock), LSB first, with one
//!   extra clock pulse to move the last bit into the output latch
//! - [`LatchedShifter`] - 3-wire chain (data + clock + strobe), bytes LSB
//!   first, bits MSB first within a byte, committed by the strobe
//! - [`DirectAddress`] - one GPIO per address bit, all set at once
//!
//! The strategy is picked once when the [`NorBus`](crate::nor::NorBus) is
//! built; the hot path is monomorphized over it.

use core::fmt;

use heapless::Vec;

use crate::gpio::{GpioBackend, Level, PinRole, Port, MAX_ADDRESS_LINES};
use crate::timing::Timing;

/// Addressing mode tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingKind {
    /// 2-wire shift-register chain
    Serial,
    /// 3-wire shift-register chain with latch strobe
    Latched,
    /// Address pins driven directly
    Direct,
}

impl AddressingKind {
    /// Whether addresses go through a shift-register chain
    pub fn is_shifted(self) -> bool {
        matches!(self, Self::Serial | Self::Latched)
    }
}

impl fmt::Display for AddressingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial => write!(f, "2-wire shift register"),
            Self::Latched => write!(f, "3-wire shift register"),
            Self::Direct => write!(f, "direct pin"),
        }
    }
}

/// Highest address representable with `bits` address bits
#[inline]
pub fn max_address_for(bits: u8) -> u32 {
    if bits as u32 >= u32::BITS {
        u32::MAX
    } else {
        (1u32 << bits) - 1
    }
}

/// A way of putting an address on the chip's address inputs
pub trait AddressStrategy {
    /// Mode tag
    fn kind(&self) -> AddressingKind;

    /// Address width in bits
    fn bits(&self) -> u8;

    /// Pins this strategy drives, in a fixed order
    fn lines(&self) -> &[PinRole];

    /// Present `address` and leave it stable on the chip's inputs
    ///
    /// The address lines must already be outputs (see [`idle`](Self::idle)).
    fn load<B: GpioBackend>(&self, port: &mut Port<B>, timing: &Timing, address: u32);

    /// Highest address this strategy can present
    fn max_address(&self) -> u32 {
        max_address_for(self.bits())
    }

    /// Make every line an output and drive it low
    fn idle<B: GpioBackend>(&self, port: &mut Port<B>) {
        for &role in self.lines() {
            port.drive(role, Level::Low);
        }
    }
}

/// 2-wire shift-register chain, LSB first
#[derive(Debug, Clone)]
pub struct SerialShifter {
    bits: u8,
    lines: [PinRole; 2],
}

impl SerialShifter {
    /// Chain of `bits` stages
    pub fn new(bits: u8) -> Self {
        Self {
            bits,
            lines: [PinRole::ShiftData, PinRole::ShiftClock],
        }
    }
}

impl AddressStrategy for SerialShifter {
    fn kind(&self) -> AddressingKind {
        AddressingKind::Serial
    }

    fn bits(&self) -> u8 {
        self.bits
    }

    fn lines(&self) -> &[PinRole] {
        &self.lines
    }

    fn load<B: GpioBackend>(&self, port: &mut Port<B>, timing: &Timing, address: u32) {
        let half = timing.half_pulse_us();
        let mut value = address;

        // The storage latch shares the shift clock and captures the stage
        // contents from before each edge, so one more pulse than there are
        // bits is needed to get the last bit out.
        for _ in 0..=self.bits {
            port.write(PinRole::ShiftClock, Level::Low);
            port.write(PinRole::ShiftData, Level::of_bit(value, 0));
            port.delay_us(half);

            port.write(PinRole::ShiftClock, Level::High);
            port.delay_us(half);
            value >>= 1;
        }

        port.write(PinRole::ShiftClock, Level::Low);
    }
}

/// 3-wire shift-register chain with a latch strobe
#[derive(Debug, Clone)]
pub struct LatchedShifter {
    bits: u8,
    lines: [PinRole; 3],
}

impl LatchedShifter {
    /// Chain of `bits` stages (shifted in whole bytes)
    pub fn new(bits: u8) -> Self {
        Self {
            bits,
            lines: [PinRole::ShiftData, PinRole::ShiftClock, PinRole::ShiftStrobe],
        }
    }

    fn shift_byte<B: GpioBackend>(port: &mut Port<B>, half: u32, byte: u8) {
        for bit in (0..8).rev() {
            port.write(PinRole::ShiftClock, Level::Low);
            port.write(PinRole::ShiftData, Level::of_bit(byte as u32, bit));
            port.delay_us(half);
            port.write(PinRole::ShiftClock, Level::High);
            port.delay_us(half);
        }
    }
}

impl AddressStrategy for LatchedShifter {
    fn kind(&self) -> AddressingKind {
        AddressingKind::Latched
    }

    fn bits(&self) -> u8 {
        self.bits
    }

    fn lines(&self) -> &[PinRole] {
        &self.lines
    }

    fn load<B: GpioBackend>(&self, port: &mut Port<B>, timing: &Timing, address: u32) {
        let half = timing.half_pulse_us();
        let bytes = (self.bits as u32).div_ceil(8);

        for i in 0..bytes {
            Self::shift_byte(port, half, (address >> (8 * i)) as u8);
        }
        port.write(PinRole::ShiftClock, Level::Low);

        port.write(PinRole::ShiftStrobe, Level::High);
        port.delay_us(half);
        port.write(PinRole::ShiftStrobe, Level::Low);
        port.delay_us(half);
    }
}

/// One GPIO per address bit
#[derive(Debug, Clone)]
pub struct DirectAddress {
    lines: Vec<PinRole, MAX_ADDRESS_LINES>,
}

impl DirectAddress {
    /// `bits` address lines, `A0` being address bit 0
    pub fn new(bits: u8) -> Self {
        let mut lines = Vec::new();
        for i in 0..bits.min(MAX_ADDRESS_LINES as u8) {
            let _ = lines.push(PinRole::Address(i));
        }
        Self { lines }
    }
}

impl AddressStrategy for DirectAddress {
    fn kind(&self) -> AddressingKind {
        AddressingKind::Direct
    }

    fn bits(&self) -> u8 {
        self.lines.len() as u8
    }

    fn lines(&self) -> &[PinRole] {
        &self.lines
    }

    fn load<B: GpioBackend>(&self, port: &mut Port<B>, timing: &Timing, address: u32) {
        for (bit, &role) in self.lines.iter().enumerate() {
            port.write(role, Level::of_bit(address, bit as u32));
        }
        port.delay_us(timing.pulse_us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::{AddressLines, PinMap};
    use crate::testing::{Op, Recorder};
    use std::vec::Vec as StdVec;

    const DATA: u32 = 9;
    const CLOCK: u32 = 25;
    const STROBE: u32 = 11;

    fn serial_port() -> Port<Recorder> {
        let mut port = Port::new(Recorder::default(), PinMap::reference()).unwrap();
        SerialShifter::new(24).idle(&mut port);
        port.backend_mut().ops.clear();
        port
    }

    fn latched_port() -> Port<Recorder> {
        let mut map = PinMap::reference();
        map.addressing = AddressLines::Latched {
            data: DATA,
            clock: CLOCK,
            strobe: STROBE,
            bits: 24,
        };
        let mut port = Port::new(Recorder::default(), map).unwrap();
        LatchedShifter::new(24).idle(&mut port);
        port.backend_mut().ops.clear();
        port
    }

    /// Data bit present at each rising clock edge
    fn bits_at_rising_edges(rec: &Recorder) -> StdVec<bool> {
        let mut data = false;
        let mut clock = Level::Low;
        let mut bits = StdVec::new();
        for op in &rec.ops {
            match *op {
                Op::Level(DATA, level) => data = level.is_high(),
                Op::Level(CLOCK, level) => {
                    if clock == Level::Low && level == Level::High {
                        bits.push(data);
                    }
                    clock = level;
                }
                _ => {}
            }
        }
        bits
    }

    #[test]
    fn test_serial_extra_clock_pulse() {
        for bits in [8u8, 13, 24] {
            let mut port = serial_port();
            SerialShifter::new(bits).load(&mut port, &Timing::default(), 0x5A5A5A);
            assert_eq!(port.backend().rising_edges(CLOCK), bits as usize + 1);
        }
    }

    #[test]
    fn test_serial_lsb_first() {
        let mut port = serial_port();
        let address = 0x00C0_0003;
        SerialShifter::new(24).load(&mut port, &Timing::default(), address);

        let bits = bits_at_rising_edges(port.backend());
        assert_eq!(bits.len(), 25);
        for (i, &bit) in bits[..24].iter().enumerate() {
            assert_eq!(bit, (address >> i) & 1 != 0, "bit {}", i);
        }
        // The extra pulse shifts in a zero
        assert!(!bits[24]);
    }

    #[test]
    fn test_serial_ends_with_clock_low() {
        let mut port = serial_port();
        SerialShifter::new(24).load(&mut port, &Timing::default(), 0xFFFFFF);
        assert_eq!(port.backend().writes_to(CLOCK).last(), Some(&Level::Low));
    }

    #[test]
    fn test_serial_pulse_timing() {
        let mut port = serial_port();
        let timing = Timing::default();
        SerialShifter::new(24).load(&mut port, &timing, 0);
        // Two half periods per pulse
        assert_eq!(port.backend().elapsed_us(), 25 * timing.pulse_us as u64);
    }

    #[test]
    fn test_latched_byte_order() {
        let mut port = latched_port();
        let address = 0x00_81_42_C3;
        LatchedShifter::new(24).load(&mut port, &Timing::default(), address);

        let bits = bits_at_rising_edges(port.backend());
        assert_eq!(bits.len(), 24);

        // Bytes LSB first, bits MSB first within each byte
        let mut expected = StdVec::new();
        for byte in [0xC3u8, 0x42, 0x81] {
            for bit in (0..8).rev() {
                expected.push((byte >> bit) & 1 != 0);
            }
        }
        assert_eq!(bits, expected);
    }

    #[test]
    fn test_latched_strobe_commits_once() {
        let mut port = latched_port();
        LatchedShifter::new(24).load(&mut port, &Timing::default(), 0x123456);
        assert_eq!(
            port.backend().writes_to(STROBE),
            [Level::High, Level::Low]
        );
        // Strobe only after the clock is back low
        let ops = &port.backend().ops;
        let strobe_at = ops
            .iter()
            .position(|op| *op == Op::Level(STROBE, Level::High))
            .unwrap();
        let last_clock = ops
            .iter()
            .rposition(|op| matches!(op, Op::Level(CLOCK, _)))
            .unwrap();
        assert!(last_clock < strobe_at);
        assert_eq!(ops[last_clock], Op::Level(CLOCK, Level::Low));
    }

    #[test]
    fn test_direct_sets_all_lines_then_settles() {
        let mut port = Port::new(Recorder::default(), PinMap::reference_direct()).unwrap();
        let strategy = DirectAddress::new(14);
        strategy.idle(&mut port);
        port.backend_mut().ops.clear();

        let timing = Timing::default();
        strategy.load(&mut port, &timing, 0x2A5);

        let ops = &port.backend().ops;
        assert_eq!(ops.len(), 15);
        assert_eq!(ops[14], Op::Delay(timing.pulse_us));
        for i in 0..14u8 {
            let pin = port.map().pin(PinRole::Address(i)).unwrap();
            assert_eq!(ops[i as usize], Op::Level(pin, Level::of_bit(0x2A5, i as u32)));
        }
    }

    #[test]
    fn test_idle_drives_lines_low() {
        let mut port = Port::new(Recorder::default(), PinMap::reference()).unwrap();
        SerialShifter::new(24).idle(&mut port);
        assert_eq!(port.backend().levels.get(&DATA), Some(&Level::Low));
        assert_eq!(port.backend().levels.get(&CLOCK), Some(&Level::Low));
    }

    #[test]
    fn test_max_address() {
        assert_eq!(max_address_for(24), 0xFF_FFFF);
        assert_eq!(max_address_for(12), 0xFFF);
        assert_eq!(max_address_for(32), u32::MAX);
        assert_eq!(DirectAddress::new(14).max_address(), 0x3FFF);
    }
}
