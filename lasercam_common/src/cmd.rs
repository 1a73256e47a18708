use core::fmt::Display;

#[cfg(feature = "std")]
use serde::{Deserialize, Serialize};

use crate::aim::{Axis, Direction};

/// Prefix of the streamed relative camera move, `CM:<dx>:<dy>`.
pub const CAMERA_MOVE_PREFIX: &str = "CM";

/// A remote-control command.
#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Move(Axis, Direction),
    Laser(bool),
    /// Recall, or store when armed. Slot is zero based.
    Preset(Axis, u8),
    ArmStore(Axis),
    Stream(bool),
    CameraLed(bool),
    Power(bool),
    CameraMove { dx: i32, dy: i32 },
    /// Phrase number, 1 to 9.
    Speak(u8),
    Unknown,
}

/// Every fixed two letter code. `CM:x:y` is the only parameterised command
/// and is parsed separately.
pub static COMMAND_TABLE: [(&str, Command); 37] = [
    ("LU", Command::Move(Axis::Laser, Direction::Up)),
    ("LD", Command::Move(Axis::Laser, Direction::Down)),
    ("LL", Command::Move(Axis::Laser, Direction::Left)),
    ("LR", Command::Move(Axis::Laser, Direction::Right)),
    ("LN", Command::Laser(true)),
    ("LO", Command::Laser(false)),
    ("L!", Command::ArmStore(Axis::Laser)),
    ("L1", Command::Preset(Axis::Laser, 0)),
    ("L2", Command::Preset(Axis::Laser, 1)),
    ("L3", Command::Preset(Axis::Laser, 2)),
    ("L4", Command::Preset(Axis::Laser, 3)),
    ("L5", Command::Preset(Axis::Laser, 4)),
    ("CU", Command::Move(Axis::Camera, Direction::Up)),
    ("CD", Command::Move(Axis::Camera, Direction::Down)),
    ("CL", Command::Move(Axis::Camera, Direction::Left)),
    ("CR", Command::Move(Axis::Camera, Direction::Right)),
    ("CN", Command::Stream(true)),
    ("CO", Command::Stream(false)),
    ("C!", Command::ArmStore(Axis::Camera)),
    ("C1", Command::Preset(Axis::Camera, 0)),
    ("C2", Command::Preset(Axis::Camera, 1)),
    ("C3", Command::Preset(Axis::Camera, 2)),
    ("C4", Command::Preset(Axis::Camera, 3)),
    ("C5", Command::Preset(Axis::Camera, 4)),
    ("QN", Command::CameraLed(true)),
    ("QO", Command::CameraLed(false)),
    ("SN", Command::Power(true)),
    ("SO", Command::Power(false)),
    ("S1", Command::Speak(1)),
    ("S2", Command::Speak(2)),
    ("S3", Command::Speak(3)),
    ("S4", Command::Speak(4)),
    ("S5", Command::Speak(5)),
    ("S6", Command::Speak(6)),
    ("S7", Command::Speak(7)),
    ("S8", Command::Speak(8)),
    ("S9", Command::Speak(9)),
];

impl Command {
    /// Whitespace is trimmed and case is ignored. Anything that is not in the
    /// table and not a well formed `CM:x:y` is `Unknown`.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if let Some(cmd) = COMMAND_TABLE
            .iter()
            .find(|(code, _)| code.eq_ignore_ascii_case(text))
            .map(|(_, cmd)| *cmd)
        {
            return cmd;
        }
        parse_camera_move(text).unwrap_or(Command::Unknown)
    }

    /// The code this command is sent as. `CM` moves and unknown commands
    /// have no fixed code.
    pub fn code(&self) -> Option<&'static str> {
        COMMAND_TABLE
            .iter()
            .find(|(_, cmd)| cmd == self)
            .map(|(code, _)| *code)
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match (self, self.code()) {
            (_, Some(code)) => write!(f, "{}", code),
            (Command::CameraMove { dx, dy }, None) => {
                write!(f, "{}:{}:{}", CAMERA_MOVE_PREFIX, dx, dy)
            }
            _ => write!(f, "??"),
        }
    }
}

fn parse_camera_move(text: &str) -> Option<Command> {
    let mut fields = text.split(':');
    let prefix = fields.next()?;
    if !prefix.eq_ignore_ascii_case(CAMERA_MOVE_PREFIX) {
        return None;
    }
    let dx = truncate(fields.next()?)?;
    let dy = truncate(fields.next()?)?;
    if fields.next().is_some() {
        return None;
    }
    Some(Command::CameraMove { dx, dy })
}

/// Parse a float and drop the fraction, rounding toward zero.
fn truncate(field: &str) -> Option<i32> {
    let value: f32 = field.trim().parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(value as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_case_and_space_insensitive() {
        assert_eq!(
            Command::parse(" lu\n"),
            Command::Move(Axis::Laser, Direction::Up)
        );
        assert_eq!(Command::parse("c!"), Command::ArmStore(Axis::Camera));
        assert_eq!(Command::parse("L5"), Command::Preset(Axis::Laser, 4));
        assert_eq!(Command::parse("s9"), Command::Speak(9));
    }

    #[test]
    fn every_code_maps_back_to_itself() {
        for (code, cmd) in COMMAND_TABLE.iter() {
            assert_eq!(Command::parse(code), *cmd);
            assert_eq!(cmd.code(), Some(*code));
        }
    }

    #[test]
    fn camera_move_truncates_toward_zero() {
        assert_eq!(
            Command::parse("CM:12.9:-3.7"),
            Command::CameraMove { dx: 12, dy: -3 }
        );
        assert_eq!(
            Command::parse("cm:0:4"),
            Command::CameraMove { dx: 0, dy: 4 }
        );
    }

    #[test]
    fn malformed_camera_moves_are_unknown() {
        for text in ["CM", "CM:1", "CM:a:2", "CM:1:2:3", "CM:inf:0", "CMX:1:2"] {
            assert_eq!(Command::parse(text), Command::Unknown, "{}", text);
        }
    }

    #[test]
    fn unlisted_codes_are_unknown() {
        for text in ["ZZ", "", "S0", "L6", "LUX"] {
            assert_eq!(Command::parse(text), Command::Unknown, "{}", text);
        }
    }

    #[test]
    fn display_uses_wire_form() {
        assert_eq!(Command::Power(false).to_string(), "SO");
        assert_eq!(Command::CameraMove { dx: 3, dy: -1 }.to_string(), "CM:3:-1");
        assert_eq!(Command::Unknown.to_string(), "??");
    }
}
