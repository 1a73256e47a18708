#![cfg_attr(feature = "no_std", no_std)]

pub mod aim;
pub mod cmd;
pub mod msg;
pub mod preset;
pub mod protoc;
pub mod servo;
pub mod session;
pub mod watchdog;

pub use aim::{AimConfig, AimController, AimError, Axis, Direction, GateState, PwmOutput};
pub use cmd::Command;
pub use msg::{Reply, Request};
pub use preset::{PresetStorage, PresetStore};
pub use servo::{Polarity, Position, ServoRange};
pub use session::{Effect, Outcome, Session};

/// pid.codes open hardware VID
pub const USB_VID: u16 = 0x1209;
pub const USB_PID: u16 = 0x6EF2;
pub const USB_MANUFACTURER: &str = "lasercam";
pub const USB_PRODUCT: &str = "lasercam servo bridge";
