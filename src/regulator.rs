//! Direction-tracked hysteresis regulation
//!
//! Every completed sensor conversion feeds one [`Regulator::update`]. An
//! episode starts when the target changes or the reading leaves the
//! hysteresis band: the regulator picks a direction once, walks the output
//! one unit per sample while the reading is still short of the target, and
//! settles on the first sample that crosses the target or when the output
//! hits a rail. The direction never flips inside an episode, so the output
//! cannot oscillate around the target.

use crate::OutputDriver;
use crate::output::Output;
use crate::state::{Direction, Sample};

/// Smallest hysteresis band, mA
pub const HYSTERESIS_FLOOR: f32 = 5.0;

/// Band width as a fraction of the channel's maximum current
pub const HYSTERESIS_RATIO: f32 = 0.5;

/// Half-width of the band around the target in which a stable channel
/// stays stable
pub fn hysteresis(max_current: f32) -> f32 {
    (HYSTERESIS_RATIO * max_current).max(HYSTERESIS_FLOOR)
}

/// Target side of one evaluation, read from the shared state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegulationInput {
    /// mA
    pub target_current: f32,
    /// V
    pub max_voltage: f32,
    /// mA, sizes the hysteresis band
    pub max_current: f32,
    pub generation: u32,
}

/// Result of one evaluation, published back to the shared state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegulationReport {
    /// Generation of the input the decision was made against
    pub generation: u32,
    pub sample: Sample,
    pub level: u16,
    pub stable: bool,
    pub direction: Direction,
}

/// Hysteresis regulator for one channel.
///
/// Holds the episode state between samples; the output level itself lives
/// in [`Output`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Regulator {
    direction: Direction,
    stable: bool,
    generation: Option<u32>,
}

impl Regulator {
    pub const fn new() -> Self {
        Self {
            direction: Direction::Undetermined,
            stable: false,
            generation: None,
        }
    }

    pub const fn direction(&self) -> Direction {
        self.direction
    }

    pub const fn is_stable(&self) -> bool {
        self.stable
    }

    /// Forget the current episode
    pub fn reset(&mut self) {
        self.direction = Direction::Undetermined;
        self.stable = false;
    }

    /// Evaluate one sample and move the output by at most one unit
    pub fn update<O: OutputDriver>(
        &mut self,
        input: &RegulationInput,
        sample: Sample,
        output: &mut Output<O>,
    ) -> RegulationReport {
        if self.generation != Some(input.generation) {
            self.generation = Some(input.generation);
            self.reset();
        }

        if self.stable {
            let band = hysteresis(input.max_current);
            let outside = (sample.current - input.target_current).abs() > band;
            // A rail-bound output stays latched until the target changes
            if outside && !output.is_saturated(Self::correction(input, sample)) {
                debug!(
                    "[Regulator.update] {} mA left the band around {} mA",
                    sample.current, input.target_current
                );
                self.reset();
            }
        }

        if !self.stable {
            self.settle_step(input, sample, output);
        }

        RegulationReport {
            generation: input.generation,
            sample,
            level: output.level(),
            stable: self.stable,
            direction: self.direction,
        }
    }

    fn settle_step<O: OutputDriver>(
        &mut self,
        input: &RegulationInput,
        sample: Sample,
        output: &mut Output<O>,
    ) {
        let undershoot = Self::undershoots(input, sample);
        let overshoot =
            sample.current > input.target_current || sample.voltage > input.max_voltage;

        if self.direction == Direction::Undetermined {
            self.direction = Self::correction(input, sample);
        }

        let short_of_target = match self.direction {
            Direction::Increase => undershoot,
            Direction::Decrease => overshoot,
            Direction::Undetermined => false,
        };

        if !short_of_target || !output.step(self.direction) {
            self.stable = true;
        }
    }

    fn undershoots(input: &RegulationInput, sample: Sample) -> bool {
        sample.current < input.target_current && sample.voltage <= input.max_voltage
    }

    /// Direction a new episode would take for this sample
    fn correction(input: &RegulationInput, sample: Sample) -> Direction {
        if Self::undershoots(input, sample) {
            Direction::Increase
        } else {
            Direction::Decrease
        }
    }
}
