//! DHT22 humidity and temperature, sampled every 30 seconds.
//!
//! The single-wire protocol is timing critical, so reads are blocking but
//! short (a few milliseconds). The first read is deferred one interval to
//! give the sensor its power-up settling time.

use anyhow::Result;
use dht_sensor::dht22;
use esp_idf_hal::delay::Ets;
use esp_idf_hal::gpio::{AnyIOPin, InputOutput, PinDriver, Pull};

use sense_core::ClimateReading;

const READ_INTERVAL_MS: u64 = 30_000;

pub struct ClimateSensor {
    pin: PinDriver<'static, AnyIOPin, InputOutput>,
    delay: Ets,
    last_read_ms: Option<u64>,
}

impl ClimateSensor {
    pub fn new(pin: AnyIOPin) -> Result<Self> {
        let mut pin = PinDriver::input_output_od(pin)?;
        pin.set_pull(Pull::Up)?;
        pin.set_high()?;
        Ok(Self {
            pin,
            delay: Ets,
            last_read_ms: None,
        })
    }

    pub fn poll(&mut self, now_ms: u64) -> Option<ClimateReading> {
        match self.last_read_ms {
            None => {
                self.last_read_ms = Some(now_ms);
                return None;
            }
            Some(last) if now_ms.saturating_sub(last) < READ_INTERVAL_MS => return None,
            Some(_) => {}
        }
        self.last_read_ms = Some(now_ms);

        if let Err(e) = self.pin.set_high() {
            log::warn!("failed to raise DHT line before read: {e}");
            return None;
        }
        match dht22::blocking::read(&mut self.delay, &mut self.pin) {
            Ok(reading) => Some(ClimateReading {
                humidity: reading.relative_humidity,
                temperature: reading.temperature,
            }),
            Err(e) => {
                log::warn!("DHT22 read failed: {e:?}");
                None
            }
        }
    }
}
