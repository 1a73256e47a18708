//! The aiming model shared by every front end.
//!
//! [`AimController`] keeps one commanded [`Position`] per pan/tilt assembly,
//! saturates every request into the [`ServoRange`] and writes the result to a
//! [`PwmOutput`]. It also owns the PWM output-enable gate, the laser diode pin
//! and the preset banks. The controller is open loop: [`AimController::position`]
//! reports what was commanded, not where the horn physically is.

use core::fmt;

use embedded_hal::digital::OutputPin;
#[cfg(feature = "std")]
use serde::{Deserialize, Serialize};

use crate::preset::PresetStore;
use crate::servo::{Polarity, Position, ServoRange};

pub const DEFAULT_STEP: u16 = 10;

/// Which pan/tilt assembly.
#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Laser,
    Camera,
}

#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// Observed state of the PWM output-enable line.
#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Enabled,
    Disabled,
    /// The last write to the gate pin failed.
    Unknown,
}

/// Sink for servo pulse widths, one 12 bit value per channel.
pub trait PwmOutput {
    type Error;

    fn set_pulse(&mut self, channel: u8, pulse: u16) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AimError<P, G> {
    Pwm(P),
    Pin(G),
}

impl<P: fmt::Debug, G: fmt::Debug> fmt::Display for AimError<P, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AimError::Pwm(e) => write!(f, "pwm write failed: {:?}", e),
            AimError::Pin(e) => write!(f, "gpio write failed: {:?}", e),
        }
    }
}

/// Static description of one assembly.
#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisConfig {
    pub x_channel: u8,
    pub y_channel: u8,
    pub home: Position,
    pub x_polarity: Polarity,
    pub y_polarity: Polarity,
}

#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AimConfig {
    pub range: ServoRange,
    pub laser: AxisConfig,
    pub camera: AxisConfig,
}

impl AimConfig {
    /// Board wiring: camera on channels 0/1, laser on 2/3, both homed to the
    /// middle of the range.
    pub fn new(range: ServoRange) -> Self {
        let home = range.midpoint();
        Self {
            range,
            camera: AxisConfig {
                x_channel: 0,
                y_channel: 1,
                home,
                x_polarity: Polarity::Normal,
                y_polarity: Polarity::Normal,
            },
            laser: AxisConfig {
                x_channel: 2,
                y_channel: 3,
                home,
                x_polarity: Polarity::Normal,
                y_polarity: Polarity::Normal,
            },
        }
    }

    pub fn axis(&self, axis: Axis) -> &AxisConfig {
        match axis {
            Axis::Laser => &self.laser,
            Axis::Camera => &self.camera,
        }
    }
}

impl Default for AimConfig {
    fn default() -> Self {
        Self::new(ServoRange::default())
    }
}

#[derive(Debug, Clone, Copy)]
struct AxisState {
    target: Position,
    step: u16,
}

pub struct AimController<PWM, GATE, LASER> {
    pwm: PWM,
    gate: GATE,
    laser_pin: LASER,
    config: AimConfig,
    laser: AxisState,
    camera: AxisState,
    presets: PresetStore,
    gate_state: GateState,
    laser_on: bool,
    clamp_events: u32,
}

pub type AimResult<PWM, GATE> =
    Result<(), AimError<<PWM as PwmOutput>::Error, <GATE as embedded_hal::digital::ErrorType>::Error>>;

impl<PWM, GATE, LASER> AimController<PWM, GATE, LASER>
where
    PWM: PwmOutput,
    GATE: OutputPin,
    LASER: OutputPin<Error = GATE::Error>,
{
    /// Targets start at the middle of the range. Nothing is written until the
    /// first move or `set_power(true, true)`; the gate and laser are assumed
    /// to have been initialised off by the caller.
    pub fn new(pwm: PWM, gate: GATE, laser_pin: LASER, config: AimConfig) -> Self {
        let start = AxisState {
            target: config.range.midpoint(),
            step: DEFAULT_STEP,
        };
        Self {
            pwm,
            gate,
            laser_pin,
            config,
            laser: start,
            camera: start,
            presets: PresetStore::default(),
            gate_state: GateState::Disabled,
            laser_on: false,
            clamp_events: 0,
        }
    }

    pub fn config(&self) -> &AimConfig {
        &self.config
    }

    fn state(&self, axis: Axis) -> &AxisState {
        match axis {
            Axis::Laser => &self.laser,
            Axis::Camera => &self.camera,
        }
    }

    fn state_mut(&mut self, axis: Axis) -> &mut AxisState {
        match axis {
            Axis::Laser => &mut self.laser,
            Axis::Camera => &mut self.camera,
        }
    }

    pub fn position(&self, axis: Axis) -> Position {
        self.state(axis).target
    }

    pub fn step(&self, axis: Axis) -> u16 {
        self.state(axis).step
    }

    /// Steps below 1 are raised to 1.
    pub fn set_step(&mut self, axis: Axis, step: u16) {
        self.state_mut(axis).step = step.max(1);
    }

    /// Number of coordinates that had to be saturated so far.
    pub fn clamp_events(&self) -> u32 {
        self.clamp_events
    }

    pub fn move_axis(
        &mut self,
        axis: Axis,
        direction: Direction,
        step: Option<u16>,
    ) -> AimResult<PWM, GATE> {
        let step = step.unwrap_or(self.step(axis)) as i32;
        let (dx, dy) = match direction {
            Direction::Up => (0, -step),
            Direction::Down => (0, step),
            Direction::Left => (-step, 0),
            Direction::Right => (step, 0),
        };
        self.move_relative(axis, dx, dy)
    }

    pub fn move_relative(&mut self, axis: Axis, dx: i32, dy: i32) -> AimResult<PWM, GATE> {
        let cfg = *self.config.axis(axis);
        let current = self.position(axis);
        let x = (current.x as i32).saturating_add(cfg.x_polarity.apply(dx));
        let y = (current.y as i32).saturating_add(cfg.y_polarity.apply(dy));
        self.set_position(axis, x, y)
    }

    pub fn set_position(&mut self, axis: Axis, x: i32, y: i32) -> AimResult<PWM, GATE> {
        let target = Position::new(self.saturate(x), self.saturate(y));
        self.state_mut(axis).target = target;
        self.commit(axis)
    }

    pub fn home(&mut self, axis: Axis) -> AimResult<PWM, GATE> {
        let home = self.config.axis(axis).home;
        self.set_position(axis, home.x as i32, home.y as i32)
    }

    /// Returns false for a slot index outside the bank.
    pub fn store_preset(&mut self, axis: Axis, slot: usize) -> bool {
        let current = self.position(axis);
        self.presets.bank_mut(axis).set(slot, current)
    }

    /// Returns `Ok(false)` and leaves the target alone when the slot is empty.
    pub fn recall_preset(
        &mut self,
        axis: Axis,
        slot: usize,
    ) -> Result<bool, AimError<PWM::Error, GATE::Error>> {
        match self.presets.bank(axis).get(slot) {
            Some(p) => {
                self.set_position(axis, p.x as i32, p.y as i32)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn presets(&self) -> &PresetStore {
        &self.presets
    }

    pub fn load_presets(&mut self, presets: PresetStore) {
        self.presets = presets;
    }

    /// The gate is active low. With `update`, both targets are written again
    /// after enabling, since the PWM device may have been reset while off.
    pub fn set_power(&mut self, enabled: bool, update: bool) -> AimResult<PWM, GATE> {
        let written = if enabled {
            self.gate.set_low()
        } else {
            self.gate.set_high()
        };
        if let Err(e) = written {
            self.gate_state = GateState::Unknown;
            return Err(AimError::Pin(e));
        }
        self.gate_state = if enabled {
            GateState::Enabled
        } else {
            GateState::Disabled
        };

        if enabled && update {
            self.commit(Axis::Laser)?;
            self.commit(Axis::Camera)?;
        }
        Ok(())
    }

    pub fn power_state(&self) -> GateState {
        self.gate_state
    }

    pub fn is_power_enabled(&self) -> Option<bool> {
        match self.gate_state {
            GateState::Enabled => Some(true),
            GateState::Disabled => Some(false),
            GateState::Unknown => None,
        }
    }

    /// Independent of the power gate.
    pub fn set_laser(&mut self, enabled: bool) -> AimResult<PWM, GATE> {
        let written = if enabled {
            self.laser_pin.set_high()
        } else {
            self.laser_pin.set_low()
        };
        written.map_err(AimError::Pin)?;
        self.laser_on = enabled;
        Ok(())
    }

    pub fn is_laser_enabled(&self) -> bool {
        self.laser_on
    }

    /// Power the servos, send both assemblies home and switch the laser off.
    /// The gate is left on so the servos can travel; the caller turns it off
    /// once they have settled.
    pub fn park(&mut self) -> AimResult<PWM, GATE> {
        self.set_power(true, false)?;
        self.home(Axis::Camera)?;
        self.home(Axis::Laser)?;
        self.set_laser(false)
    }

    /// Write the target of one assembly to its two channels.
    pub fn commit(&mut self, axis: Axis) -> AimResult<PWM, GATE> {
        let cfg = *self.config.axis(axis);
        let target = self.position(axis);
        self.pwm
            .set_pulse(cfg.x_channel, target.x)
            .map_err(AimError::Pwm)?;
        self.pwm
            .set_pulse(cfg.y_channel, target.y)
            .map_err(AimError::Pwm)
    }

    fn saturate(&mut self, value: i32) -> u16 {
        let clamped = self.config.range.clamp(value);
        if clamped as i32 != value {
            self.clamp_events = self.clamp_events.wrapping_add(1);
        }
        clamped
    }

    /// Hand the collaborators back, e.g. to rebuild the controller.
    pub fn release(self) -> (PWM, GATE, LASER) {
        (self.pwm, self.gate, self.laser_pin)
    }
}
