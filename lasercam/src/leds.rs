use stm32f4xx_hal::gpio::{ErasedPin, Output};

/// The three status LEDs on the front panel.
pub struct StatusLeds {
    running: ErasedPin<Output>,
    connected: ErasedPin<Output>,
    stream: ErasedPin<Output>,
    stream_lit: bool,
}

impl StatusLeds {
    /// All off.
    pub fn new(
        running: ErasedPin<Output>,
        connected: ErasedPin<Output>,
        stream: ErasedPin<Output>,
    ) -> Self {
        let mut leds = Self {
            running,
            connected,
            stream,
            stream_lit: true,
        };
        leds.set_running(false);
        leds.set_connected(false);
        leds.set_stream(false);
        leds
    }

    pub fn set_running(&mut self, on: bool) {
        self.running.set_state(on.into());
    }

    pub fn set_connected(&mut self, on: bool) {
        self.connected.set_state(on.into());
    }

    pub fn set_stream(&mut self, on: bool) {
        self.stream_lit = on;
        self.stream.set_state(on.into());
    }

    pub fn toggle_stream(&mut self) {
        self.set_stream(!self.stream_lit);
    }
}
