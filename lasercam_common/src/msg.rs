//! Payloads carried inside link packets.
//!
//! Host -> device: a [`Request`]. Device -> host: exactly one [`Reply`] per
//! request.

use core::fmt::Display;

#[cfg(feature = "std")]
use serde::{Deserialize, Serialize};

use crate::session::{Effect, Outcome};

/// Longest remote command forwarded to the device.
pub const MAX_COMMAND_LEN: usize = 32;
pub const MAX_REQUEST_LEN: usize = MAX_COMMAND_LEN + 1;
pub const REPLY_LEN: usize = 2;

const REQ_OPEN: u8 = 0x01;
const REQ_CLOSE: u8 = 0x02;
const REQ_REMOTE: u8 = 0x03;

const REP_DONE: u8 = 0x00;
const REP_IGNORED: u8 = 0x01;
const REP_FAULT: u8 = 0x02;
const REP_STREAM: u8 = 0x03;
const REP_SPEAK: u8 = 0x04;
const REP_CAMERA_LED: u8 = 0x05;

#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    Empty,
    UnknownTag(u8),
    TooLong(usize),
    NotAscii,
    Truncated,
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DecodeError::Empty => write!(f, "empty payload"),
            DecodeError::UnknownTag(t) => write!(f, "unknown tag 0x{:02x}", t),
            DecodeError::TooLong(n) => write!(f, "payload of {} bytes is too long", n),
            DecodeError::NotAscii => write!(f, "command is not ascii"),
            DecodeError::Truncated => write!(f, "payload truncated"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}

#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    /// A client connected.
    Open,
    /// The client went away.
    Close,
    /// A command line from the client, passed through untouched.
    Remote(&'a str),
}

impl<'a> Request<'a> {
    /// Write into `buf`, returning the number of bytes used.
    pub fn encode(&self, buf: &mut [u8; MAX_REQUEST_LEN]) -> Result<usize, DecodeError> {
        match self {
            Request::Open => {
                buf[0] = REQ_OPEN;
                Ok(1)
            }
            Request::Close => {
                buf[0] = REQ_CLOSE;
                Ok(1)
            }
            Request::Remote(text) => {
                let text = text.as_bytes();
                if text.len() > MAX_COMMAND_LEN {
                    return Err(DecodeError::TooLong(text.len()));
                }
                buf[0] = REQ_REMOTE;
                buf[1..1 + text.len()].copy_from_slice(text);
                Ok(1 + text.len())
            }
        }
    }

    pub fn decode(bytes: &'a [u8]) -> Result<Self, DecodeError> {
        let (&tag, rest) = bytes.split_first().ok_or(DecodeError::Empty)?;
        match tag {
            REQ_OPEN => Ok(Request::Open),
            REQ_CLOSE => Ok(Request::Close),
            REQ_REMOTE => {
                if rest.len() > MAX_COMMAND_LEN {
                    return Err(DecodeError::TooLong(rest.len()));
                }
                if !rest.is_ascii() {
                    return Err(DecodeError::NotAscii);
                }
                core::str::from_utf8(rest)
                    .map(Request::Remote)
                    .map_err(|_| DecodeError::NotAscii)
            }
            t => Err(DecodeError::UnknownTag(t)),
        }
    }
}

#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Done,
    Ignored,
    /// A hardware write failed; the command had no or partial effect.
    Fault,
    Stream(bool),
    Speak(u8),
    CameraLed(bool),
}

impl From<Outcome> for Reply {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Done => Reply::Done,
            Outcome::Ignored => Reply::Ignored,
            Outcome::Effect(Effect::Stream(on)) => Reply::Stream(on),
            Outcome::Effect(Effect::Speak(n)) => Reply::Speak(n),
            Outcome::Effect(Effect::CameraLed(on)) => Reply::CameraLed(on),
        }
    }
}

impl Reply {
    pub fn to_bytes(&self) -> [u8; REPLY_LEN] {
        match *self {
            Reply::Done => [REP_DONE, 0],
            Reply::Ignored => [REP_IGNORED, 0],
            Reply::Fault => [REP_FAULT, 0],
            Reply::Stream(on) => [REP_STREAM, on as u8],
            Reply::Speak(n) => [REP_SPEAK, n],
            Reply::CameraLed(on) => [REP_CAMERA_LED, on as u8],
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        match *bytes {
            [] => Err(DecodeError::Empty),
            [_] => Err(DecodeError::Truncated),
            [REP_DONE, _] => Ok(Reply::Done),
            [REP_IGNORED, _] => Ok(Reply::Ignored),
            [REP_FAULT, _] => Ok(Reply::Fault),
            [REP_STREAM, on] => Ok(Reply::Stream(on != 0)),
            [REP_SPEAK, n] => Ok(Reply::Speak(n)),
            [REP_CAMERA_LED, on] => Ok(Reply::CameraLed(on != 0)),
            [t, _] => Err(DecodeError::UnknownTag(t)),
            _ => Err(DecodeError::TooLong(bytes.len())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "std")]
    #[test]
    fn replies_have_a_stable_json_form() {
        assert_eq!(serde_json::to_string(&Reply::Done).unwrap(), r#""Done""#);
        assert_eq!(
            serde_json::to_string(&Reply::Stream(true)).unwrap(),
            r#"{"Stream":true}"#
        );
        let speak: Reply = serde_json::from_str(r#"{"Speak":3}"#).unwrap();
        assert_eq!(speak, Reply::Speak(3));
    }

    #[test]
    fn remote_request_carries_text() {
        let mut buf = [0u8; MAX_REQUEST_LEN];
        let n = Request::Remote("CM:1.5:-2").encode(&mut buf).unwrap();
        assert_eq!(buf[0], REQ_REMOTE);
        assert_eq!(Request::decode(&buf[..n]), Ok(Request::Remote("CM:1.5:-2")));
    }

    #[test]
    fn oversized_or_binary_commands_are_refused() {
        let mut buf = [0u8; MAX_REQUEST_LEN];
        let long = "L".repeat(MAX_COMMAND_LEN + 1);
        assert_eq!(
            Request::Remote(&long).encode(&mut buf),
            Err(DecodeError::TooLong(MAX_COMMAND_LEN + 1))
        );
        assert_eq!(
            Request::decode(&[REQ_REMOTE, 0xC3, 0xA9]),
            Err(DecodeError::NotAscii)
        );
        assert_eq!(Request::decode(&[0x7F]), Err(DecodeError::UnknownTag(0x7F)));
        assert_eq!(Request::decode(&[]), Err(DecodeError::Empty));
    }

    #[test]
    fn replies_decode_from_two_bytes() {
        assert_eq!(Reply::from_bytes(&[REP_STREAM, 1]), Ok(Reply::Stream(true)));
        assert_eq!(Reply::from_bytes(&[REP_SPEAK, 7]), Ok(Reply::Speak(7)));
        assert_eq!(Reply::from_bytes(&[REP_FAULT]), Err(DecodeError::Truncated));
        assert_eq!(Reply::from_bytes(&[0x42, 0]), Err(DecodeError::UnknownTag(0x42)));
        assert_eq!(Reply::from_bytes(&Reply::Ignored.to_bytes()), Ok(Reply::Ignored));
    }

    #[test]
    fn outcomes_map_onto_replies() {
        assert_eq!(Reply::from(Outcome::Done), Reply::Done);
        assert_eq!(
            Reply::from(Outcome::Effect(Effect::Stream(false))),
            Reply::Stream(false)
        );
    }
}
