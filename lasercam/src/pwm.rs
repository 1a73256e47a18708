use embedded_hal::i2c::I2c;
use lasercam_common::PwmOutput;
use pwm_pca9685::{Channel, Error, Pca9685};

use crate::config::{PCA9685_ADDR, PCA9685_PRESCALE};

#[derive(Debug)]
pub enum PwmError<E> {
    Pca(Error<E>),
    NoSuchChannel(u8),
}

/// PCA9685 driving servos: every channel switches on at count 0 and off at
/// the pulse width.
pub struct ServoBoard<I2C> {
    pca: Pca9685<I2C>,
}

impl<I2C, E> ServoBoard<I2C>
where
    I2C: I2c<Error = E>,
{
    /// Wake the chip and set the 50 Hz frame. Outputs stay gated by OE.
    pub fn new(i2c: I2C) -> Result<Self, Error<E>> {
        let mut pca = Pca9685::new(i2c, PCA9685_ADDR)?;
        pca.set_prescale(PCA9685_PRESCALE)?;
        pca.enable()?;
        Ok(Self { pca })
    }
}

impl<I2C, E> PwmOutput for ServoBoard<I2C>
where
    I2C: I2c<Error = E>,
{
    type Error = PwmError<E>;

    fn set_pulse(&mut self, channel: u8, pulse: u16) -> Result<(), Self::Error> {
        let ch = channel_from_index(channel).ok_or(PwmError::NoSuchChannel(channel))?;
        self.pca.set_channel_on_off(ch, 0, pulse).map_err(PwmError::Pca)
    }
}

fn channel_from_index(index: u8) -> Option<Channel> {
    let ch = match index {
        0 => Channel::C0,
        1 => Channel::C1,
        2 => Channel::C2,
        3 => Channel::C3,
        4 => Channel::C4,
        5 => Channel::C5,
        6 => Channel::C6,
        7 => Channel::C7,
        8 => Channel::C8,
        9 => Channel::C9,
        10 => Channel::C10,
        11 => Channel::C11,
        12 => Channel::C12,
        13 => Channel::C13,
        14 => Channel::C14,
        15 => Channel::C15,
        _ => return None,
    };
    Some(ch)
}
