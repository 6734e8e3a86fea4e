//! RGB LED actuator on three LEDC PWM channels.

use esp_idf_hal::ledc::LedcDriver;

use sense_core::light::{LightActuator, Rgb};

pub struct RgbLed {
    red: LedcDriver<'static>,
    green: LedcDriver<'static>,
    blue: LedcDriver<'static>,
    on: bool,
    color: Rgb,
}

impl RgbLed {
    pub fn new(
        red: LedcDriver<'static>,
        green: LedcDriver<'static>,
        blue: LedcDriver<'static>,
    ) -> Self {
        let mut led = Self {
            red,
            green,
            blue,
            on: false,
            color: Rgb::WHITE,
        };
        led.apply();
        led
    }

    fn apply(&mut self) {
        let (r, g, b) = if self.on {
            (self.color.r, self.color.g, self.color.b)
        } else {
            (0, 0, 0)
        };
        set_channel(&mut self.red, r);
        set_channel(&mut self.green, g);
        set_channel(&mut self.blue, b);
    }
}

fn set_channel(channel: &mut LedcDriver<'static>, level: u8) {
    let duty = channel.get_max_duty() * u32::from(level) / 255;
    if let Err(e) = channel.set_duty(duty) {
        log::warn!("failed to set LED duty: {e}");
    }
}

impl LightActuator for RgbLed {
    fn turn_on(&mut self) {
        self.on = true;
        self.apply();
    }

    fn turn_off(&mut self) {
        self.on = false;
        self.apply();
    }

    fn commute(&mut self) {
        self.on = !self.on;
        self.apply();
    }

    fn is_on(&self) -> bool {
        self.on
    }

    fn color(&self) -> Rgb {
        self.color
    }

    fn set_color(&mut self, color: Rgb, transition_s: Option<u16>) {
        if let Some(seconds) = transition_s {
            // PWM fading is not wired up; transitions apply immediately.
            log::debug!("ignoring {seconds}s transition");
        }
        self.color = color;
        self.apply();
    }
}
