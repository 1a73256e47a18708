#[cfg(feature = "std")]
use serde::{Deserialize, Serialize};

/// Full scale of a 12 bit PWM channel.
pub const PWM_COUNTS: u16 = 4096;

/// Servo refresh rate.
pub const PWM_FREQ_HZ: u16 = 50;

/// Linear range of the servos, in counts out of 4096.
pub const LINEAR_MIN: u16 = 205;
pub const LINEAR_MAX: u16 = 410;

/// Mechanical end stops. Usable, but the response is no longer linear.
pub const FULL_MIN: u16 = 130;
pub const FULL_MAX: u16 = 600;

/// A commanded pulse width pair for one pan/tilt assembly.
#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub x: u16,
    pub y: u16,
}

impl Position {
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }
}

/// Pulse width bounds shared by every servo channel.
#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServoRange {
    min: u16,
    max: u16,
}

impl ServoRange {
    /// Bounds are swapped if given in the wrong order, and capped to what a
    /// 12 bit channel can express.
    pub const fn new(min: u16, max: u16) -> Self {
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        let hi = if hi >= PWM_COUNTS { PWM_COUNTS - 1 } else { hi };
        let lo = if lo > hi { hi } else { lo };
        Self { min: lo, max: hi }
    }

    pub const fn linear() -> Self {
        Self::new(LINEAR_MIN, LINEAR_MAX)
    }

    pub const fn full() -> Self {
        Self::new(FULL_MIN, FULL_MAX)
    }

    pub fn min(&self) -> u16 {
        self.min
    }

    pub fn max(&self) -> u16 {
        self.max
    }

    pub fn midpoint(&self) -> Position {
        let mid = ((self.min as u32 + self.max as u32) / 2) as u16;
        Position::new(mid, mid)
    }

    /// Saturate a requested pulse width into the range.
    pub fn clamp(&self, value: i32) -> u16 {
        value.clamp(self.min as i32, self.max as i32) as u16
    }

    pub fn contains(&self, value: u16) -> bool {
        value >= self.min && value <= self.max
    }
}

impl Default for ServoRange {
    fn default() -> Self {
        Self::linear()
    }
}

/// Sign convention for one coordinate of an assembly.
///
/// `Normal` means UP and LEFT decrease the pulse width. Mounting a servo the
/// other way round is handled by switching that coordinate to `Inverted`.
#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polarity {
    #[default]
    Normal,
    Inverted,
}

impl Polarity {
    pub fn apply(&self, delta: i32) -> i32 {
        match self {
            Polarity::Normal => delta,
            Polarity::Inverted => delta.saturating_neg(),
        }
    }
}
