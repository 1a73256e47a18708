/// Default idle time before the servo power gate is switched off.
pub const DEFAULT_IDLE_TIMEOUT_MS: u32 = 600_000;

/// Tracks the time since the last command. Times are milliseconds from a
/// free-running counter and may wrap.
#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleWatchdog {
    timeout_ms: u32,
    last_ms: u32,
    tripped: bool,
}

impl IdleWatchdog {
    pub const fn new(timeout_ms: u32, now_ms: u32) -> Self {
        Self {
            timeout_ms,
            last_ms: now_ms,
            tripped: false,
        }
    }

    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    pub fn feed(&mut self, now_ms: u32) {
        self.last_ms = now_ms;
        self.tripped = false;
    }

    pub fn is_expired(&self, now_ms: u32) -> bool {
        now_ms.wrapping_sub(self.last_ms) >= self.timeout_ms
    }

    /// True once per idle period: the first poll after expiry. Feeding
    /// re-arms it.
    pub fn poll(&mut self, now_ms: u32) -> bool {
        if self.tripped || !self.is_expired(now_ms) {
            return false;
        }
        self.tripped = true;
        true
    }
}

impl Default for IdleWatchdog {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_TIMEOUT_MS, 0)
    }
}
