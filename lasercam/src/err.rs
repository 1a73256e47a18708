use core::convert::Infallible;

use defmt::error;
use lasercam_common::session::SessionError;
use lasercam_common::AimError;
use stm32f4xx_hal::i2c;

use crate::pwm::PwmError;

/// Every fault the firmware reports, reduced to a code for the RTT log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum ErrLog {
    I2C(u8),
    Pca(u8),
    Pin,
    Flash,
    Usb(u8),
    OS(u8),
}

// handler for logging i2c errors
pub fn err_i2c_h(err: i2c::Error) -> ErrLog {
    let e: u8 = match err {
        i2c::Error::Overrun => 0x01,
        i2c::Error::Timeout => 0x02,
        i2c::Error::Bus => 0x03,
        i2c::Error::ArbitrationLoss => 0x04,
        i2c::Error::NoAcknowledge(source) => match source {
            i2c::NoAcknowledgeSource::Address => 0x05,
            i2c::NoAcknowledgeSource::Unknown => 0x06,
            i2c::NoAcknowledgeSource::Data => 0x07,
        },
        i2c::Error::Crc => 0x08,
        _ => 0x09,
    };
    ErrLog::I2C(e)
}

pub fn err_pwm_h(err: PwmError<i2c::Error>) -> ErrLog {
    match err {
        PwmError::Pca(pwm_pca9685::Error::I2C(e)) => err_i2c_h(e),
        PwmError::Pca(pwm_pca9685::Error::InvalidInputData) => ErrLog::Pca(0x01),
        PwmError::NoSuchChannel(ch) => ErrLog::Pca(0x10 | ch),
    }
}

pub fn err_aim_h(err: AimError<PwmError<i2c::Error>, Infallible>) -> ErrLog {
    match err {
        AimError::Pwm(e) => err_pwm_h(e),
        AimError::Pin(_) => ErrLog::Pin,
    }
}

pub fn err_session_h<S>(err: SessionError<AimError<PwmError<i2c::Error>, Infallible>, S>) -> ErrLog {
    match err {
        SessionError::Aim(e) => err_aim_h(e),
        SessionError::Storage(_) => ErrLog::Flash,
    }
}

pub fn err_usb_h(err: usb_device::UsbError) -> ErrLog {
    use usb_device::UsbError;
    let e: u8 = match err {
        UsbError::WouldBlock => 0x01,
        UsbError::ParseError => 0x02,
        UsbError::BufferOverflow => 0x03,
        UsbError::EndpointOverflow => 0x04,
        UsbError::EndpointMemoryOverflow => 0x05,
        UsbError::InvalidEndpoint => 0x06,
        UsbError::Unsupported => 0x07,
        UsbError::InvalidState => 0x08,
        #[allow(unreachable_patterns)]
        _ => 0x09,
    };
    ErrLog::Usb(e)
}

// os errors
pub enum RticErr {
    SpawnFail,
}

// handler for os errors
pub fn err_os_h(err: RticErr) -> ErrLog {
    ErrLog::OS(err as u8)
}

// For now, just print to the RTT console.
pub fn log_err(err: ErrLog) {
    error!("fault: {}", err);
}
