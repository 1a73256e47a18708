//! Board constants. Pin assignments live in `main.rs` next to the pin setup.

use lasercam_common::preset::PRESET_BLOB_SIZE;
use lasercam_common::servo::ServoRange;
use static_assertions::const_assert;

pub const HSE_MHZ: u32 = 16;
pub const SYSCLK_MHZ: u32 = 64;

/// PCA9685 with A0..A5 tied low.
pub const PCA9685_ADDR: u8 = 0x40;
/// 25 MHz / (4096 * 50 Hz) - 1
pub const PCA9685_PRESCALE: u8 = 121;
pub const I2C_KHZ: u32 = 400;

/// Travel allowed for both assemblies. The linear range keeps the horns away
/// from the end stops; `ServoRange::full()` opens it up to 130..600.
pub const SERVO_RANGE: ServoRange = ServoRange::linear();

/// First byte of the sector holding the preset blob.
pub const PRESET_ADDR: u32 = 0x0000_0000;
pub const FLASH_SPI_MHZ: u32 = 8;

/// Time the servos get to reach home before the gate is switched off.
pub const PARK_SETTLE_MS: u32 = 1_000;
pub const IDLE_TIMEOUT_MS: u32 = lasercam_common::watchdog::DEFAULT_IDLE_TIMEOUT_MS;
pub const WATCHDOG_PERIOD_MS: u32 = 1_000;
pub const BLINK_PERIOD_MS: u32 = 500;

/// Resends of a NACKed reply before the host is given up on.
pub const REPLY_RETRIES: u8 = 3;
/// How long the host gets to acknowledge a reply.
pub const ACK_TIMEOUT_MS: u32 = 500;

const_assert!(PRESET_BLOB_SIZE <= w25q::PAGE_SIZE as usize);
