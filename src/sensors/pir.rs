//! PIR motion sensor, reported as edges.

use anyhow::Result;
use esp_idf_hal::gpio::{AnyIOPin, Input, PinDriver};

pub struct PirSensor {
    pin: PinDriver<'static, AnyIOPin, Input>,
    last: bool,
}

impl PirSensor {
    pub fn new(pin: AnyIOPin) -> Result<Self> {
        let pin = PinDriver::input(pin)?;
        Ok(Self { pin, last: false })
    }

    /// `Some(true)` on motion start, `Some(false)` on motion end.
    pub fn poll(&mut self) -> Option<bool> {
        let level = self.pin.is_high();
        if level == self.last {
            return None;
        }
        self.last = level;
        Some(level)
    }
}
