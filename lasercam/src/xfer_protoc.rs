/// Device side of the serial packet protocol.
///
/// Host -> Device
/// - device receives header + request
/// - device validates crc
/// - device sends ack/nack
///
/// Device -> Host
/// - device sends header + reply
/// - device waits for ack/nack, resends on nack
///
use defmt::{debug, error, warn};
use lasercam_common::protoc::{self, FrameError, Header, ACK, HEADER_LEN, NACK, PACKET_SIZE};
use rtic_monotonics::systick::prelude::*;
use stm32f4xx_hal::otg_fs::UsbBusType;
use usb_device::device::UsbDevice;
use usb_device::UsbError;

use crate::config::{ACK_TIMEOUT_MS, REPLY_RETRIES};
use crate::Mono;

// Delay between polls while waiting on the host
pub const POLL_DELAY_MS: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum XferError {
    Usb(UsbError),
    Frame(FrameError),
    /// The host sent something other than ACK/NACK.
    BadAck(u8),
    /// No acknowledgement arrived in time.
    Timeout,
    /// Every resend was refused.
    Nacked,
}

impl From<UsbError> for XferError {
    fn from(e: UsbError) -> Self {
        XferError::Usb(e)
    }
}

pub struct Xfer {
    pub dev: UsbDevice<'static, UsbBusType>,
    pub ser: usbd_serial::SerialPort<'static, UsbBusType>,
    tx_buf: [u8; PACKET_SIZE],
    rx_buf: [u8; PACKET_SIZE],
}

impl Xfer {
    pub fn new(
        dev: UsbDevice<'static, UsbBusType>,
        ser: usbd_serial::SerialPort<'static, UsbBusType>,
    ) -> Self {
        Self {
            dev,
            ser,
            tx_buf: [0u8; PACKET_SIZE],
            rx_buf: [0u8; PACKET_SIZE],
        }
    }

    /// Send a reply packet and wait for the host to take it.
    pub async fn send(&mut self, payload: &[u8]) -> Result<(), XferError> {
        let len = protoc::encode(payload, &mut self.tx_buf).map_err(XferError::Frame)?;
        debug!("sending {} bytes", len);

        for attempt in 0..=REPLY_RETRIES {
            self.write_all(len).await?;
            match self.wait_for_ack().await? {
                true => return Ok(()),
                false => warn!("reply nacked (attempt {})", attempt + 1),
            }
        }
        Err(XferError::Nacked)
    }

    async fn write_all(&mut self, end: usize) -> Result<(), XferError> {
        let mut nbytes = 0;
        while nbytes < end {
            self.dev.poll(&mut [&mut self.ser]);
            nbytes += match self.ser.write(&self.tx_buf[nbytes..end]) {
                Ok(n) => n,
                Err(UsbError::WouldBlock) => {
                    Mono::delay(POLL_DELAY_MS.millis()).await;
                    0
                }
                Err(e) => {
                    warn!("serial write failed");
                    return Err(e.into());
                }
            };
        }
        Ok(())
    }

    async fn wait_for_ack(&mut self) -> Result<bool, XferError> {
        let deadline = Mono::now() + ACK_TIMEOUT_MS.millis();
        let mut ack = [0u8; 1];
        loop {
            if Mono::now() > deadline {
                return Err(XferError::Timeout);
            }
            if self.dev.poll(&mut [&mut self.ser]) {
                match self.ser.read(&mut ack) {
                    Ok(1) => {
                        return match ack[0] {
                            ACK => Ok(true),
                            NACK => Ok(false),
                            other => {
                                warn!("invalid ack byte: {:x}", other);
                                Err(XferError::BadAck(other))
                            }
                        }
                    }
                    Ok(_) | Err(UsbError::WouldBlock) => {}
                    Err(e) => return Err(e.into()),
                }
            }
            Mono::delay(POLL_DELAY_MS.millis()).await;
        }
    }

    /// Read until `rx_buf[..end]` is filled. Waits as long as it takes.
    async fn read_into(&mut self, mut pos: usize, end: usize) -> Result<(), XferError> {
        while pos < end {
            if self.dev.poll(&mut [&mut self.ser]) {
                match self.ser.read(&mut self.rx_buf[pos..end]) {
                    Ok(n) => pos += n,
                    Err(UsbError::WouldBlock) => {}
                    Err(e) => {
                        error!("serial read failed");
                        return Err(e.into());
                    }
                }
                continue;
            }
            Mono::delay(POLL_DELAY_MS.millis()).await;
        }
        Ok(())
    }

    /// Wait for the next request packet, acknowledge it and copy its payload
    /// into `out`. Corrupted packets are NACKed and waited out.
    pub async fn receive(&mut self, out: &mut [u8]) -> Result<usize, XferError> {
        loop {
            self.read_into(0, HEADER_LEN).await?;
            let header = match Header::parse(&self.rx_buf[..HEADER_LEN]) {
                Ok(h) => h,
                Err(e) => {
                    // unusable length, drop whatever is queued
                    error!("bad header: {}", e);
                    self.drain();
                    self.ack(false).await?;
                    continue;
                }
            };
            self.read_into(HEADER_LEN, header.packet_len()).await?;

            match protoc::decode(&self.rx_buf[..header.packet_len()]) {
                Ok(payload) if payload.len() <= out.len() => {
                    out[..payload.len()].copy_from_slice(payload);
                    let n = payload.len();
                    self.ack(true).await?;
                    debug!("received {} bytes", n);
                    return Ok(n);
                }
                Ok(payload) => {
                    error!("payload of {} does not fit {}", payload.len(), out.len());
                    self.ack(false).await?;
                }
                Err(e) => {
                    warn!("{}", e);
                    self.ack(false).await?;
                }
            }
        }
    }

    fn drain(&mut self) {
        let mut scratch = [0u8; 64];
        while let Ok(n) = self.ser.read(&mut scratch) {
            if n == 0 {
                break;
            }
        }
    }

    async fn ack(&mut self, valid: bool) -> Result<(), XferError> {
        let byte = [if valid { ACK } else { NACK }];
        loop {
            self.dev.poll(&mut [&mut self.ser]);
            match self.ser.write(&byte) {
                Ok(1) => break,
                Ok(_) | Err(UsbError::WouldBlock) => Mono::delay(POLL_DELAY_MS.millis()).await,
                Err(e) => {
                    error!("ack write failed");
                    return Err(e.into());
                }
            }
        }
        let _ = self.ser.flush();
        Ok(())
    }
}
