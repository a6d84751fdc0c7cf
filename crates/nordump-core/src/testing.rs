//! Recording backend for unit tests

use std::collections::BTreeMap;
use std::vec::Vec;

use crate::gpio::{Direction, GpioBackend, Level, Pin, DATA_LINES};

/// One backend call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Direction(Pin, Direction),
    Level(Pin, Level),
    Delay(u32),
}

/// Operator input on the data bus: `values[n]` is presented after the
/// n-th delay of `period_us`, the last value stays.
#[derive(Debug)]
pub struct BusScript {
    pub pins: [Pin; DATA_LINES],
    pub values: Vec<u8>,
    pub period_us: u32,
}

/// Records every call. Reading a pin returns the level last written to it,
/// which makes every line behave as if looped back onto itself, unless a
/// [`BusScript`] drives it.
#[derive(Debug, Default)]
pub struct Recorder {
    pub ops: Vec<Op>,
    pub levels: BTreeMap<Pin, Level>,
    pub script: Option<BusScript>,
}

impl Recorder {
    /// Rising edges seen on `pin`
    pub fn rising_edges(&self, pin: Pin) -> usize {
        let mut last = Level::Low;
        let mut edges = 0;
        for op in &self.ops {
            if let Op::Level(p, level) = *op {
                if p == pin {
                    if last == Level::Low && level == Level::High {
                        edges += 1;
                    }
                    last = level;
                }
            }
        }
        edges
    }

    /// Levels written to `pin`, in order
    pub fn writes_to(&self, pin: Pin) -> Vec<Level> {
        self.ops
            .iter()
            .filter_map(|op| match *op {
                Op::Level(p, level) if p == pin => Some(level),
                _ => None,
            })
            .collect()
    }

    /// Total delay requested, in microseconds
    pub fn elapsed_us(&self) -> u64 {
        self.ops
            .iter()
            .map(|op| match *op {
                Op::Delay(us) => us as u64,
                _ => 0,
            })
            .sum()
    }
}

impl GpioBackend for Recorder {
    fn set_direction(&mut self, pin: Pin, direction: Direction) {
        self.ops.push(Op::Direction(pin, direction));
    }

    fn set_level(&mut self, pin: Pin, level: Level) {
        self.ops.push(Op::Level(pin, level));
        self.levels.insert(pin, level);
    }

    fn get_level(&self, pin: Pin) -> Level {
        if let Some(script) = &self.script {
            if let Some(bit) = script.pins.iter().position(|&p| p == pin) {
                let step = self
                    .ops
                    .iter()
                    .filter(|op| **op == Op::Delay(script.period_us))
                    .count();
                let value = script.values[step.min(script.values.len() - 1)];
                return Level::of_bit(value as u32, bit as u32);
            }
        }
        self.levels.get(&pin).copied().unwrap_or(Level::Low)
    }

    fn delay_us(&mut self, us: u32) {
        self.ops.push(Op::Delay(us));
    }
}
