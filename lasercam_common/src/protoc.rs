//! Packet framing for the serial link.
//!
//! Every packet is `crc32 u32 LE | len u16 LE | payload`. The receiver checks
//! the crc over the payload and answers with a single [`ACK`] or [`NACK`]
//! byte. The sender retries on `NACK`.

use core::fmt::Display;

use crc32fast::hash;

pub const ACK: u8 = 0xAA;
pub const NACK: u8 = 0xAB;
pub const HEADER_LEN: usize = 6;
/// Largest payload either side sends.
pub const MAX_PAYLOAD: usize = 64;
pub const PACKET_SIZE: usize = HEADER_LEN + MAX_PAYLOAD;

#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Fewer bytes than a header.
    Short(usize),
    /// Header announces more payload than fits in a packet.
    Oversize(usize),
    /// Header announces more payload than was received.
    Incomplete { expected: usize, got: usize },
    BadCrc { expected: u32, actual: u32 },
}

impl Display for FrameError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FrameError::Short(n) => write!(f, "{} bytes is shorter than a header", n),
            FrameError::Oversize(n) => write!(f, "payload of {} bytes exceeds {}", n, MAX_PAYLOAD),
            FrameError::Incomplete { expected, got } => {
                write!(f, "expected {} payload bytes, got {}", expected, got)
            }
            FrameError::BadCrc { expected, actual } => {
                write!(f, "crc mismatch: header {:08x}, payload {:08x}", expected, actual)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FrameError {}

#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub crc: u32,
    pub len: u16,
}

impl Header {
    pub fn for_payload(payload: &[u8]) -> Self {
        Self {
            crc: hash(payload),
            len: payload.len() as u16,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&self.crc.to_le_bytes());
        bytes[4..HEADER_LEN].copy_from_slice(&self.len.to_le_bytes());
        bytes
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < HEADER_LEN {
            return Err(FrameError::Short(bytes.len()));
        }
        let crc = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let len = u16::from_le_bytes([bytes[4], bytes[5]]);
        if len as usize > MAX_PAYLOAD {
            return Err(FrameError::Oversize(len as usize));
        }
        Ok(Self { crc, len })
    }

    /// Total packet length this header describes.
    pub fn packet_len(&self) -> usize {
        HEADER_LEN + self.len as usize
    }
}

/// Write a packet for `payload` into `buf` and return its length.
pub fn encode(payload: &[u8], buf: &mut [u8; PACKET_SIZE]) -> Result<usize, FrameError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::Oversize(payload.len()));
    }
    let header = Header::for_payload(payload);
    buf[..HEADER_LEN].copy_from_slice(&header.to_bytes());
    buf[HEADER_LEN..HEADER_LEN + payload.len()].copy_from_slice(payload);
    Ok(header.packet_len())
}

/// Check a received packet and return its payload.
pub fn decode(packet: &[u8]) -> Result<&[u8], FrameError> {
    let header = Header::parse(packet)?;
    let end = header.packet_len();
    if packet.len() < end {
        return Err(FrameError::Incomplete {
            expected: header.len as usize,
            got: packet.len() - HEADER_LEN,
        });
    }
    let payload = &packet[HEADER_LEN..end];
    let actual = hash(payload);
    if actual != header.crc {
        return Err(FrameError::BadCrc {
            expected: header.crc,
            actual,
        });
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_little_endian() {
        let header = Header {
            crc: 0x0403_0201,
            len: 0x0605,
        };
        assert_eq!(header.to_bytes(), [1, 2, 3, 4, 5, 6]);
        assert_eq!(Header::parse(&[1, 2, 3, 4, 5, 0]).unwrap().len, 5);
    }

    #[test]
    fn encoded_packet_decodes_to_payload() {
        let mut buf = [0u8; PACKET_SIZE];
        let n = encode(b"\x03LU", &mut buf).unwrap();
        assert_eq!(n, HEADER_LEN + 3);
        assert_eq!(decode(&buf[..n]), Ok(&b"\x03LU"[..]));
    }

    #[test]
    fn flipped_bit_fails_crc() {
        let mut buf = [0u8; PACKET_SIZE];
        let n = encode(&[0x01], &mut buf).unwrap();
        buf[HEADER_LEN] = 0x02;
        assert!(matches!(decode(&buf[..n]), Err(FrameError::BadCrc { .. })));
    }

    #[test]
    fn short_and_oversized_packets_are_rejected() {
        assert_eq!(decode(&[0xAA, 0xAA]), Err(FrameError::Short(2)));
        let mut header = Header::for_payload(&[]).to_bytes();
        header[4] = 0xFF;
        assert_eq!(decode(&header), Err(FrameError::Oversize(0xFF)));

        let mut buf = [0u8; PACKET_SIZE];
        assert_eq!(
            encode(&[0u8; MAX_PAYLOAD + 1], &mut buf),
            Err(FrameError::Oversize(MAX_PAYLOAD + 1))
        );

        let n = encode(&[1, 2, 3], &mut buf).unwrap();
        assert_eq!(
            decode(&buf[..n - 1]),
            Err(FrameError::Incomplete {
                expected: 3,
                got: 2
            })
        );
    }
}
