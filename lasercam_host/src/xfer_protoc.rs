/// Host side of the serial packet protocol.
///
/// Host -> Device
/// - host sends header + request payload
/// - device validates crc, answers ACK/NACK
/// - host resends on NACK
///
/// Device -> Host
/// - device sends header + reply payload
/// - host validates crc, answers ACK/NACK
///
use std::io::{self, Read, Write};

use lasercam_common::msg::{DecodeError, Reply, Request, MAX_REQUEST_LEN};
use lasercam_common::protoc::{self, FrameError, Header, ACK, HEADER_LEN, NACK, PACKET_SIZE};
use log::{debug, warn};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("serial i/o: {0}")]
    Io(#[from] io::Error),
    #[error("packet refused {0} times")]
    Nacked(u8),
    #[error("expected ack, got 0x{0:02x}")]
    BadAck(u8),
    #[error("bad packet: {0}")]
    Frame(#[from] FrameError),
    #[error("bad payload: {0}")]
    Decode(#[from] DecodeError),
}

/// Anything that can carry requests to the device and bring back replies.
pub trait Transport {
    fn request(&mut self, request: Request<'_>) -> Result<Reply, LinkError>;
}

/// A packet link over any byte stream, normally a serial port.
pub struct Link<P> {
    port: P,
    retries: u8,
}

impl<P: Read + Write> Link<P> {
    pub fn new(port: P, retries: u8) -> Self {
        Self { port, retries }
    }

    pub fn into_inner(self) -> P {
        self.port
    }

    /// Send one packet, resending until it is acknowledged.
    pub fn send(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        let mut packet = [0u8; PACKET_SIZE];
        let len = protoc::encode(payload, &mut packet)?;
        debug!("sending {} bytes", len);

        for attempt in 0..=self.retries {
            self.port.write_all(&packet[..len])?;
            self.port.flush()?;
            if self.wait_for_ack()? {
                return Ok(());
            }
            warn!("packet nacked (attempt {})", attempt + 1);
        }
        Err(LinkError::Nacked(self.retries + 1))
    }

    fn wait_for_ack(&mut self) -> Result<bool, LinkError> {
        let mut ack = [0u8; 1];
        self.port.read_exact(&mut ack)?;
        match ack[0] {
            ACK => Ok(true),
            NACK => Ok(false),
            other => Err(LinkError::BadAck(other)),
        }
    }

    /// Receive one packet, NACKing corrupted copies until a good one arrives
    /// or the retries run out.
    pub fn recv(&mut self) -> Result<Vec<u8>, LinkError> {
        let mut last = None;
        for _ in 0..=self.retries {
            let mut header = [0u8; HEADER_LEN];
            self.port.read_exact(&mut header)?;
            let len = Header::parse(&header)?.len as usize;

            let mut packet = vec![0u8; HEADER_LEN + len];
            packet[..HEADER_LEN].copy_from_slice(&header);
            self.port.read_exact(&mut packet[HEADER_LEN..])?;

            match protoc::decode(&packet) {
                Ok(payload) => {
                    self.port.write_all(&[ACK])?;
                    self.port.flush()?;
                    debug!("received {} bytes", len);
                    return Ok(payload.to_vec());
                }
                Err(e) => {
                    warn!("{}, sending nack", e);
                    self.port.write_all(&[NACK])?;
                    self.port.flush()?;
                    last = Some(e);
                }
            }
        }
        Err(last.map_or(LinkError::Nacked(self.retries + 1), LinkError::Frame))
    }
}

impl<P: Read + Write> Transport for Link<P> {
    fn request(&mut self, request: Request<'_>) -> Result<Reply, LinkError> {
        let mut buf = [0u8; MAX_REQUEST_LEN];
        let n = request.encode(&mut buf)?;
        self.send(&buf[..n])?;
        let reply = Reply::from_bytes(&self.recv()?)?;
        debug!("{:?} -> {:?}", request, reply);
        Ok(reply)
    }
}


#[cfg(test)]
mod tests {
    use super::mem::MemPort;
    use super::*;

    fn packet(payload: &[u8]) -> Vec<u8> {
        let mut buf = [0u8; PACKET_SIZE];
        let n = protoc::encode(payload, &mut buf).unwrap();
        buf[..n].to_vec()
    }

    #[test]
    fn request_is_framed_and_reply_acked() {
        let mut port = MemPort::default();
        port.push_answer(Reply::Stream(true));
        let mut link = Link::new(port, 2);

        let reply = link.request(Request::Remote("CN")).unwrap();
        assert_eq!(reply, Reply::Stream(true));

        let port = link.into_inner();
        let mut expected = packet(b"\x03CN");
        expected.push(ACK);
        assert_eq!(port.written, expected);
        assert!(port.incoming.is_empty());
    }

    #[test]
    fn nacked_request_is_resent() {
        let mut port = MemPort::default();
        port.push(&[NACK]);
        port.push_answer(Reply::Done);
        let mut link = Link::new(port, 2);

        assert_eq!(link.request(Request::Open).unwrap(), Reply::Done);
        let sent = packet(&[0x01]);
        let written = link.into_inner().written;
        assert_eq!(&written[..sent.len()], &sent[..]);
        assert_eq!(&written[sent.len()..2 * sent.len()], &sent[..]);
    }

    #[test]
    fn gives_up_after_retries() {
        let mut port = MemPort::default();
        port.push(&[NACK, NACK]);
        let mut link = Link::new(port, 1);
        assert!(matches!(link.send(&[0x02]), Err(LinkError::Nacked(2))));
    }

    #[test]
    fn corrupted_reply_is_nacked_then_accepted() {
        let mut port = MemPort::default();
        let good = packet(&Reply::Ignored.to_bytes());
        let mut bad = good.clone();
        bad[HEADER_LEN] ^= 0xFF;
        port.push(&bad);
        port.push(&good);
        let mut link = Link::new(port, 3);

        assert_eq!(link.recv().unwrap(), Reply::Ignored.to_bytes().to_vec());
        assert_eq!(link.into_inner().written, vec![NACK, ACK]);
    }

    #[test]
    fn garbage_ack_is_an_error() {
        let mut port = MemPort::default();
        port.push(&[0x42]);
        let mut link = Link::new(port, 0);
        assert!(matches!(link.send(&[0x01]), Err(LinkError::BadAck(0x42))));
    }

    #[test]
    fn silent_device_times_out() {
        let mut link = Link::new(MemPort::default(), 0);
        match link.request(Request::Close) {
            Err(LinkError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::TimedOut),
            other => panic!("unexpected {:?}", other),
        }
    }
}
