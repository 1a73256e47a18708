//! One remote-control connection on top of the controller.
//!
//! The session adds the store-arm flags used by `L!`/`C!` and the connect and
//! disconnect sequences. Commands that belong to collaborators the controller
//! does not own (camera stream, camera LED, speech) are returned as an
//! [`Effect`] for the caller to carry out.

use embedded_hal::digital::OutputPin;
#[cfg(feature = "std")]
use serde::{Deserialize, Serialize};

use crate::aim::{AimController, AimError, Axis, PwmOutput};
use crate::cmd::Command;
use crate::preset::PresetStorage;

#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Stream(bool),
    CameraLed(bool),
    /// Phrase number, 1 to 9.
    Speak(u8),
}

#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// Unknown command, nothing changed.
    Ignored,
    Effect(Effect),
}

/// Failure of the connect or disconnect sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError<A, S> {
    Aim(A),
    Storage(S),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Session {
    store_laser: bool,
    store_camera: bool,
    /// Storage was read successfully on `open`, so the controller's presets
    /// are what storage holds plus this session's changes.
    presets_loaded: bool,
}

type AimErr<PWM, GATE> =
    AimError<<PWM as PwmOutput>::Error, <GATE as embedded_hal::digital::ErrorType>::Error>;

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self, axis: Axis) -> bool {
        match axis {
            Axis::Laser => self.store_laser,
            Axis::Camera => self.store_camera,
        }
    }

    fn armed_mut(&mut self, axis: Axis) -> &mut bool {
        match axis {
            Axis::Laser => &mut self.store_laser,
            Axis::Camera => &mut self.store_camera,
        }
    }

    /// Connect: bring in the saved presets, then power the servos and write
    /// the current targets out again. A storage failure leaves the presets the
    /// controller already had, and `close` will not overwrite storage with
    /// them.
    pub fn open<PWM, GATE, LASER, ST>(
        &mut self,
        aim: &mut AimController<PWM, GATE, LASER>,
        storage: &mut ST,
    ) -> Result<(), SessionError<AimErr<PWM, GATE>, ST::Error>>
    where
        PWM: PwmOutput,
        GATE: OutputPin,
        LASER: OutputPin<Error = GATE::Error>,
        ST: PresetStorage,
    {
        *self = Self::default();
        let loaded = match storage.load() {
            Ok(found) => {
                if let Some(presets) = found {
                    aim.load_presets(presets);
                }
                self.presets_loaded = true;
                Ok(())
            }
            Err(e) => Err(SessionError::Storage(e)),
        };
        aim.set_power(true, true).map_err(SessionError::Aim)?;
        loaded
    }

    /// True once `open` has read storage; `close` only saves then.
    pub fn presets_loaded(&self) -> bool {
        self.presets_loaded
    }

    /// Disconnect: park the mechanism and save the presets. The gate is left
    /// on; the caller switches it off once the servos have had time to move.
    /// Presets are saved even if parking failed, but never when `open` could
    /// not read them.
    pub fn close<PWM, GATE, LASER, ST>(
        &mut self,
        aim: &mut AimController<PWM, GATE, LASER>,
        storage: &mut ST,
    ) -> Result<(), SessionError<AimErr<PWM, GATE>, ST::Error>>
    where
        PWM: PwmOutput,
        GATE: OutputPin,
        LASER: OutputPin<Error = GATE::Error>,
        ST: PresetStorage,
    {
        let loaded = self.presets_loaded;
        *self = Self::default();
        let parked = aim.park();
        if loaded {
            storage
                .save(aim.presets())
                .map_err(SessionError::Storage)?;
        }
        parked.map_err(SessionError::Aim)
    }

    pub fn handle<PWM, GATE, LASER>(
        &mut self,
        aim: &mut AimController<PWM, GATE, LASER>,
        command: &Command,
    ) -> Result<Outcome, AimErr<PWM, GATE>>
    where
        PWM: PwmOutput,
        GATE: OutputPin,
        LASER: OutputPin<Error = GATE::Error>,
    {
        match *command {
            Command::Move(axis, direction) => aim.move_axis(axis, direction, None)?,
            Command::Laser(on) => aim.set_laser(on)?,
            Command::ArmStore(axis) => *self.armed_mut(axis) = true,
            Command::Preset(axis, slot) => {
                let armed = self.armed_mut(axis);
                if *armed {
                    *armed = false;
                    aim.store_preset(axis, slot as usize);
                } else {
                    aim.recall_preset(axis, slot as usize)?;
                }
            }
            Command::Power(on) => aim.set_power(on, false)?,
            Command::CameraMove { dx, dy } => aim.move_relative(Axis::Camera, dx, dy)?,
            Command::Stream(on) => return Ok(Outcome::Effect(Effect::Stream(on))),
            Command::CameraLed(on) => return Ok(Outcome::Effect(Effect::CameraLed(on))),
            Command::Speak(n) => return Ok(Outcome::Effect(Effect::Speak(n))),
            Command::Unknown => return Ok(Outcome::Ignored),
        }
        Ok(Outcome::Done)
    }
}
