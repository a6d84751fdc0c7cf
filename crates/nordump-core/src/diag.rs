//! Wiring diagnostics
//!
//! Operator-driven checks run before a long dump. They share the
//! sequencer's pins and timing but are independent of each other.
//!
//! Loops that only end when the operator says so (input echo, OE toggling)
//! hand every step to a callback returning [`ControlFlow`]; the CLI always
//! continues and relies on process interruption.

use core::fmt;
use core::ops::ControlFlow;

use crate::address::AddressStrategy;
use crate::bus;
use crate::chip::FlashIdentity;
use crate::error::{Error, Result};
use crate::gpio::{Direction, GpioBackend, Level, PinRole};
use crate::nor::NorBus;

/// Number of patterns in the output and address tests
pub const PATTERN_COUNT: usize = 32;

/// How long each output pattern is held, in milliseconds
pub const PATTERN_HOLD_MS: u32 = 500;

/// Sampling period of the input tests, in milliseconds
pub const SAMPLE_PERIOD_MS: u32 = 1000;

/// Half period of the OE# isolation toggle, in milliseconds
pub const OE_TOGGLE_MS: u32 = 500;

/// Low-nibble values the operator enters during the I/O handshake
pub const HANDSHAKE: [u8; 3] = [0x0, 0x5, 0xA];

/// Address patterns with no particular structure
pub const RANDOM_ADDRESSES: [u32; 8] = [
    0x0f0f0f, 0x111111, 0x121212, 0x747474, 0x898989, 0xa5a5a5, 0xc3c3c3, 0xf1f1f1,
];

/// Test pattern `i` of [`PATTERN_COUNT`]
///
/// - 0..16: every value in each nibble (`i | i << 4`)
/// - 16..24: all off / all on
/// - 24..32: alternating bits
pub fn test_pattern(i: usize) -> u8 {
    match i {
        0..=15 => (i | i << 4) as u8,
        16..=23 => {
            if i & 1 != 0 {
                0xff
            } else {
                0x00
            }
        }
        _ => {
            if i & 1 != 0 {
                0xaa
            } else {
                0x55
            }
        }
    }
}

/// Pattern repeated in every byte of a 24-bit address
#[inline]
pub fn broadcast(pattern: u8) -> u32 {
    let p = pattern as u32;
    p | p << 8 | p << 16
}

/// Lines the output test drives besides the data bus: OE#, WE#, then the
/// addressing lines. Bit `i % 8` of the pattern goes to line `i`.
fn control_lines<A: AddressStrategy>(addressing: &A) -> impl Iterator<Item = PinRole> + '_ {
    [PinRole::OutputEnable, PinRole::WriteEnable]
        .into_iter()
        .chain(addressing.lines().iter().copied())
}

fn drive_controls<B: GpioBackend, A: AddressStrategy>(bus: &mut NorBus<B, A>, pattern: u8) {
    let lines: heapless::Vec<PinRole, { crate::gpio::MAX_ROLES }> =
        control_lines(bus.addressing()).collect();
    for (i, role) in lines.into_iter().enumerate() {
        let level = Level::of_bit(pattern as u32, (i % 8) as u32);
        bus.port_mut().write(role, level);
    }
}

fn clear_outputs<B: GpioBackend, A: AddressStrategy>(bus: &mut NorBus<B, A>) {
    bus::write_byte(bus.port_mut(), 0);
    drive_controls(bus, 0);
}

/// Output test: walk the data bus and the control lines through the 32
/// test patterns for LEDs to show, then clear everything.
pub fn output_patterns<B: GpioBackend, A: AddressStrategy>(bus: &mut NorBus<B, A>) {
    log::info!("output_test:");
    bus.port_mut().configure_all(Direction::Output);

    for i in 0..PATTERN_COUNT {
        let pattern = test_pattern(i);
        log::debug!("pattern #{:02}: 0x{:02x}", i, pattern);
        bus::write_byte(bus.port_mut(), pattern);
        drive_controls(bus, pattern);
        bus.port_mut().delay_ms(PATTERN_HOLD_MS);
    }

    clear_outputs(bus);
}

/// Input test: sample the bus once per second and hand the value to
/// `on_sample` until it breaks.
pub fn input_echo<B, A, F>(bus: &mut NorBus<B, A>, mut on_sample: F)
where
    B: GpioBackend,
    A: AddressStrategy,
    F: FnMut(u8) -> ControlFlow<()>,
{
    log::info!("input_test:");
    bus.release();

    loop {
        let value = bus::read_byte(bus.port());
        if on_sample(value).is_break() {
            return;
        }
        bus.port_mut().delay_ms(SAMPLE_PERIOD_MS);
    }
}

/// Input/output test
///
/// 1. Short output test on the data bus.
/// 2. Bus as input; the operator sets the low nibble to 0x0, 0x5 and 0xA in
///    that order. Every sample goes to `on_sample`.
/// 3. Bus as output, everything blinks twice.
///
/// Returns `Break` if `on_sample` stopped the test before the handshake
/// completed.
pub fn io_handshake<B, A, F>(bus: &mut NorBus<B, A>, mut on_sample: F) -> ControlFlow<()>
where
    B: GpioBackend,
    A: AddressStrategy,
    F: FnMut(u8) -> ControlFlow<()>,
{
    log::info!("io_test:");

    bus.port_mut().configure_all(Direction::Output);
    for i in 16..PATTERN_COUNT {
        bus::write_byte(bus.port_mut(), test_pattern(i));
        bus.port_mut().delay_ms(PATTERN_HOLD_MS);
    }
    clear_outputs(bus);

    bus.port_mut().delay_ms(PATTERN_HOLD_MS);
    bus.port_mut().configure_all(Direction::Input);
    bus.port_mut().delay_ms(PATTERN_HOLD_MS);

    let mut stage = 0;
    while stage < HANDSHAKE.len() {
        let value = bus::read_byte(bus.port());
        on_sample(value)?;
        if value & 0xf == HANDSHAKE[stage] {
            log::debug!("handshake step {} ok", stage);
            stage += 1;
        }
        bus.port_mut().delay_ms(SAMPLE_PERIOD_MS);
    }

    bus.port_mut().delay_ms(PATTERN_HOLD_MS);
    bus.port_mut().configure_all(Direction::Output);
    bus.port_mut().delay_ms(PATTERN_HOLD_MS);

    for _ in 0..2 {
        bus::write_byte(bus.port_mut(), 0xff);
        bus.port_mut().delay_ms(PATTERN_HOLD_MS);
        bus::write_byte(bus.port_mut(), 0x00);
        bus.port_mut().delay_ms(PATTERN_HOLD_MS);
    }

    ControlFlow::Continue(())
}

/// OE# isolation test
///
/// With the pins in read configuration, OE# is held low then high for half
/// a second each. With LEDs to ground and to 3V3 on a data line, one LED
/// lights while OE# is low and both stay dark while it is high. `on_cycle`
/// is called with the cycle number after each low/high pair.
pub fn oe_isolation<B, A, F>(bus: &mut NorBus<B, A>, mut on_cycle: F)
where
    B: GpioBackend,
    A: AddressStrategy,
    F: FnMut(u32) -> ControlFlow<()>,
{
    log::info!("oe_test");
    bus.prepare_read();

    let mut cycle = 0;
    loop {
        bus.port_mut().write(PinRole::OutputEnable, Level::Low);
        bus.port_mut().delay_ms(OE_TOGGLE_MS);
        bus.port_mut().write(PinRole::OutputEnable, Level::High);
        bus.port_mut().delay_ms(OE_TOGGLE_MS);

        cycle += 1;
        if on_cycle(cycle).is_break() {
            return;
        }
    }
}

/// Address test stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressTestStage {
    /// The 32 broadcast test patterns
    Patterns,
    /// A single set bit walked upward through each byte
    Walking,
    /// Fixed pseudo-random addresses
    Random,
}

impl fmt::Display for AddressTestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Patterns => write!(f, "pattern"),
            Self::Walking => write!(f, "walking bit"),
            Self::Random => write!(f, "random"),
        }
    }
}

/// Address shift-register test
///
/// The outputs of one shift register are looped back onto DQ0-DQ7. Each
/// address is loaded and the low byte read back must match. `on_address`
/// sees every address before it is loaded. Stops at the first mismatch.
pub fn address_test<B, A, F>(bus: &mut NorBus<B, A>, mut on_address: F) -> Result<()>
where
    B: GpioBackend,
    A: AddressStrategy,
    F: FnMut(AddressTestStage, u32),
{
    let kind = bus.addressing().kind();
    if !kind.is_shifted() {
        return Err(Error::UnsupportedAddressing(kind));
    }

    log::info!("addr_test");
    bus.prepare_read();
    let mask = bus.max_address();

    let mut check = |bus: &mut NorBus<B, A>,
                     stage: AddressTestStage,
                     index: usize,
                     address: u32|
     -> Result<()> {
        let address = address & mask;
        on_address(stage, address);
        bus.load_address(address)?;

        let expected = address as u8;
        let actual = bus.sample_bus();
        if actual != expected {
            return Err(Error::AddressMismatch {
                stage,
                index: index as u8,
                expected,
                actual,
            });
        }
        Ok(())
    };

    for i in 0..PATTERN_COUNT {
        check(bus, AddressTestStage::Patterns, i, broadcast(test_pattern(i)))?;
    }

    for i in 0..8 {
        check(bus, AddressTestStage::Walking, i, 0x010101 << i)?;
    }

    for (i, &address) in RANDOM_ADDRESSES.iter().enumerate() {
        check(bus, AddressTestStage::Random, i, address)?;
    }

    Ok(())
}

/// Chip ID query
///
/// Runs the autoselect sequence. All pins are inputs afterwards. An all-0
/// or all-1 manufacturer byte means nothing answered.
pub fn chip_id<B: GpioBackend, A: AddressStrategy>(
    bus: &mut NorBus<B, A>,
) -> Result<FlashIdentity> {
    log::info!("get_ids:");
    let id = bus.read_identity()?;
    if id.is_floating() {
        return Err(Error::NoChipResponse(id));
    }
    Ok(id)
}
