//! Coarse output stage
//!
//! Wraps the PWM/DAC primitive that feeds the LED driver's dim input.
//! The regulation loop only ever moves it one unit at a time.

use crate::OutputDriver;
use crate::state::Direction;

/// Default output resolution (8-bit DAC).
pub const DEFAULT_MAX_LEVEL: u16 = 255;

/// Relationship between drive level and the code written to hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polarity {
    /// Higher code gives more current
    #[default]
    Direct,
    /// Higher code gives less current (DAC pulling the dim input down)
    Inverted,
}

/// Output stage with a bounded drive level.
///
/// `level` is always expressed in drive space: 0 is the lowest current the
/// stage can request and `max_level` the highest, regardless of polarity.
#[derive(Debug)]
pub struct Output<O: OutputDriver> {
    driver: O,
    level: u16,
    max_level: u16,
    polarity: Polarity,
}

impl<O: OutputDriver> Output<O> {
    /// Create an output stage. Nothing is written until [`Self::apply`].
    pub const fn new(driver: O, max_level: u16, polarity: Polarity) -> Self {
        Self {
            driver,
            level: 0,
            max_level,
            polarity,
        }
    }

    /// Current drive level
    pub const fn level(&self) -> u16 {
        self.level
    }

    pub const fn max_level(&self) -> u16 {
        self.max_level
    }

    /// Whether the level is pinned at either rail
    pub const fn is_saturated(&self, direction: Direction) -> bool {
        match direction {
            Direction::Increase => self.level >= self.max_level,
            Direction::Decrease => self.level == 0,
            Direction::Undetermined => false,
        }
    }

    /// Move one unit in `direction`.
    ///
    /// Returns `false` without touching the hardware when the level already
    /// sits on the rail in that direction.
    pub fn step(&mut self, direction: Direction) -> bool {
        let next = match direction {
            Direction::Increase if self.level < self.max_level => self.level + 1,
            Direction::Decrease if self.level > 0 => self.level - 1,
            _ => return false,
        };
        self.level = next;
        self.write();
        true
    }

    /// Jump to `level` (clamped) and write it out.
    ///
    /// Used only to establish the initial level when a channel starts.
    pub fn apply(&mut self, level: u16) {
        self.level = level.min(self.max_level);
        self.write();
    }

    fn write(&mut self) {
        let code = match self.polarity {
            Polarity::Direct => self.level,
            Polarity::Inverted => self.max_level - self.level,
        };
        self.driver.write_level(code);
    }
}
