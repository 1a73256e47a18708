#![no_std]

pub mod config;
pub mod err;
pub mod leds;
pub mod pwm;
pub mod storage;
pub mod usb;
pub mod xfer_protoc;

use rtic_monotonics::systick::prelude::*;

systick_monotonic!(Mono, 1000);

/// Milliseconds since boot; wraps after about 49 days.
pub fn now_ms() -> u32 {
    Mono::now().ticks()
}
