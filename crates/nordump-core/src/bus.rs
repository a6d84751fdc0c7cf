//! Data bus helpers
//!
//! The 8 data lines are handled as a unit. Bit `i` of a byte always maps to
//! `DQi`, in both directions.

use crate::gpio::{Direction, GpioBackend, Level, PinRole, Port, DATA_LINES};

/// Data bus line roles, in configuration order
pub const LINES: [PinRole; DATA_LINES] = [
    PinRole::Data(0),
    PinRole::Data(1),
    PinRole::Data(2),
    PinRole::Data(3),
    PinRole::Data(4),
    PinRole::Data(5),
    PinRole::Data(6),
    PinRole::Data(7),
];

/// Current bus direction, `None` if the lines disagree or were never set
pub fn direction<B: GpioBackend>(port: &Port<B>) -> Option<Direction> {
    let first = port.direction(LINES[0])?;
    LINES[1..]
        .iter()
        .all(|&role| port.direction(role) == Some(first))
        .then_some(first)
}

/// Set all data lines to `dir`, DQ0 first
///
/// Does nothing when the bus is already in that direction.
pub fn set_direction<B: GpioBackend>(port: &mut Port<B>, dir: Direction) {
    if direction(port) == Some(dir) {
        return;
    }
    for role in LINES {
        port.configure(role, dir);
    }
}

/// Drive `value` onto the bus
///
/// # Panics
///
/// If any data line is not an output.
pub fn write_byte<B: GpioBackend>(port: &mut Port<B>, value: u8) {
    for (bit, role) in LINES.into_iter().enumerate() {
        port.write(role, Level::of_bit(value as u32, bit as u32));
    }
}

/// Sample the bus
///
/// # Panics
///
/// If any data line is not an input.
pub fn read_byte<B: GpioBackend>(port: &Port<B>) -> u8 {
    LINES
        .into_iter()
        .enumerate()
        .fold(0u8, |byte, (bit, role)| {
            if port.read(role).is_high() {
                byte | (1 << bit)
            } else {
                byte
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::PinMap;
    use crate::testing::{Op, Recorder};

    fn port() -> Port<Recorder> {
        Port::new(Recorder::default(), PinMap::reference()).unwrap()
    }

    #[test]
    fn test_write_then_read_loopback() {
        let mut port = port();
        for value in 0..=255u8 {
            set_direction(&mut port, Direction::Output);
            write_byte(&mut port, value);
            set_direction(&mut port, Direction::Input);
            assert_eq!(read_byte(&port), value);
        }
    }

    #[test]
    fn test_bit_to_line_mapping() {
        let mut port = port();
        set_direction(&mut port, Direction::Output);
        write_byte(&mut port, 0b1000_0001);
        let map = PinMap::reference();
        assert_eq!(port.backend().levels[&map.data[0]], Level::High);
        assert_eq!(port.backend().levels[&map.data[7]], Level::High);
        for i in 1..7 {
            assert_eq!(port.backend().levels[&map.data[i]], Level::Low);
        }
    }

    #[test]
    fn test_direction_is_deterministic_and_cached() {
        let mut port = port();
        assert_eq!(direction(&port), None);

        set_direction(&mut port, Direction::Input);
        let map = PinMap::reference();
        let expected: std::vec::Vec<_> = map
            .data
            .iter()
            .map(|&pin| Op::Direction(pin, Direction::Input))
            .collect();
        assert_eq!(port.backend().ops, expected);

        set_direction(&mut port, Direction::Input);
        assert_eq!(port.backend().ops.len(), DATA_LINES);
        assert_eq!(direction(&port), Some(Direction::Input));
    }

    #[test]
    fn test_mixed_directions_reported_as_none() {
        let mut port = port();
        set_direction(&mut port, Direction::Input);
        port.configure(PinRole::Data(5), Direction::Output);
        assert_eq!(direction(&port), None);

        // A mixed bus is fully reconfigured
        set_direction(&mut port, Direction::Input);
        assert_eq!(direction(&port), Some(Direction::Input));
    }

    #[test]
    fn test_every_line_rejects_write_while_input() {
        for line in 0..DATA_LINES as u8 {
            let result = std::panic::catch_unwind(|| {
                let mut port = port();
                set_direction(&mut port, Direction::Output);
                port.configure(PinRole::Data(line), Direction::Input);
                write_byte(&mut port, 0xFF);
            });
            assert!(result.is_err(), "DQ{} accepted a write while input", line);
        }
    }

    #[test]
    fn test_every_line_rejects_read_while_output() {
        for line in 0..DATA_LINES as u8 {
            let result = std::panic::catch_unwind(|| {
                let mut port = port();
                set_direction(&mut port, Direction::Input);
                port.configure(PinRole::Data(line), Direction::Output);
                read_byte(&port)
            });
            assert!(result.is_err(), "DQ{} was sampled while output", line);
        }
    }

    #[test]
    #[should_panic(expected = "read from DQ0")]
    fn test_read_after_write_without_turnaround_panics() {
        let mut port = port();
        set_direction(&mut port, Direction::Output);
        write_byte(&mut port, 0x55);
        read_byte(&port);
    }
}
