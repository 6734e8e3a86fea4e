//! TEMT6000 ambient light sensor on ADC1, sampled every 10 seconds and
//! reported only when the value actually moved.

use esp_idf_hal::adc::oneshot::{AdcChannelDriver, AdcDriver};
use esp_idf_hal::adc::ADC1;
use esp_idf_hal::gpio::Gpio1;

const SAMPLE_INTERVAL_MS: u64 = 10_000;
/// Smaller swings than this are noise, not a lighting change.
const CHANGE_THRESHOLD_LUX: f32 = 5.0;

pub struct IlluminanceSensor {
    channel: AdcChannelDriver<'static, Gpio1, AdcDriver<'static, ADC1>>,
    last_sample_ms: Option<u64>,
    last_reported: Option<f32>,
}

impl IlluminanceSensor {
    pub fn new(channel: AdcChannelDriver<'static, Gpio1, AdcDriver<'static, ADC1>>) -> Self {
        Self {
            channel,
            last_sample_ms: None,
            last_reported: None,
        }
    }

    pub fn poll(&mut self, now_ms: u64) -> Option<f32> {
        match self.last_sample_ms {
            Some(last) if now_ms.saturating_sub(last) < SAMPLE_INTERVAL_MS => return None,
            _ => {}
        }
        self.last_sample_ms = Some(now_ms);

        let millivolts = match self.channel.read() {
            Ok(value) => value,
            Err(e) => {
                log::warn!("illuminance read failed: {e}");
                return None;
            }
        };
        let lux = millivolts_to_lux(millivolts);

        match self.last_reported {
            Some(previous) if (lux - previous).abs() < CHANGE_THRESHOLD_LUX => None,
            _ => {
                self.last_reported = Some(lux);
                Some(lux)
            }
        }
    }
}

/// TEMT6000 on 3.3V with a 10k load: 2uA per lux through the load resistor.
fn millivolts_to_lux(millivolts: u16) -> f32 {
    f32::from(millivolts) / 1000.0 * 200.0
}
