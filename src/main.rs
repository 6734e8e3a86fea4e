//! sense-node firmware entry point.
//!
//! All connectivity and lifecycle decisions live in the hardware-independent
//! `sense-core` runtime; this binary wires the ESP-IDF drivers into it and
//! spins the cooperative loop.

mod config;
mod light;
mod mqtt;
mod network;
mod ota;
mod sensors;
mod system;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use esp_idf_hal::adc::attenuation::DB_11;
use esp_idf_hal::adc::oneshot::config::AdcChannelConfig;
use esp_idf_hal::adc::oneshot::{AdcChannelDriver, AdcDriver};
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{IOPin, PinDriver, Pull};
use esp_idf_hal::ledc::config::TimerConfig;
use esp_idf_hal::ledc::{LedcDriver, LedcTimerDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::units::FromValueType;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::log::EspLogger;
use esp_idf_svc::nvs::EspDefaultNvsPartition;

use sense_core::{
    Collaborators, ConfigStore, DeviceConfig, GestureConfig, Identity, Runtime, TickInputs,
};

use crate::config::NvsConfigStore;
use crate::light::RgbLed;
use crate::mqtt::EspMqttDriver;
use crate::network::portal::HttpConfigPortal;
use crate::network::EspWifiDriver;
use crate::ota::HttpUpdateEndpoint;
use crate::sensors::climate::ClimateSensor;
use crate::sensors::illuminance::IlluminanceSensor;
use crate::sensors::pir::PirSensor;

const FIRMWARE: &str = env!("CARGO_PKG_NAME");
const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");
const HARDWARE: &str = "esp32s3";

/// Loop cadence. Short enough that 50ms button debouncing stays reliable.
const TICK_DELAY_MS: u32 = 20;

fn main() -> Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    log::info!(
        "{FIRMWARE} {FIRMWARE_VERSION} on {HARDWARE}, reset reason: {}",
        system::reset_reason()
    );

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    let mut store = NvsConfigStore::new(nvs_partition.clone())?;
    let config = match store.load()? {
        Some(config) => config,
        None => {
            log::warn!("no stored configuration, starting with defaults");
            DeviceConfig::default()
        }
    };

    let wifi = EspWifiDriver::new(
        peripherals.modem,
        sys_loop,
        nvs_partition,
        &config.device_name,
    )?;

    let ledc_timer = Arc::new(LedcTimerDriver::new(
        peripherals.ledc.timer0,
        &TimerConfig::default().frequency(5.kHz().into()),
    )?);
    let light = RgbLed::new(
        LedcDriver::new(
            peripherals.ledc.channel0,
            ledc_timer.clone(),
            peripherals.pins.gpio14,
        )?,
        LedcDriver::new(
            peripherals.ledc.channel1,
            ledc_timer.clone(),
            peripherals.pins.gpio13,
        )?,
        LedcDriver::new(
            peripherals.ledc.channel2,
            ledc_timer,
            peripherals.pins.gpio12,
        )?,
    );

    let identity = Identity {
        firmware: FIRMWARE.to_string(),
        firmware_version: FIRMWARE_VERSION.to_string(),
        hardware: HARDWARE.to_string(),
    };

    let mut runtime = Runtime::new(
        config.clone(),
        identity,
        GestureConfig::default(),
        Collaborators {
            wifi,
            mqtt: EspMqttDriver::new(),
            light,
            update_endpoint: HttpUpdateEndpoint::new(&config.ota_server),
            portal: HttpConfigPortal::new(),
            store,
        },
    )?;

    let mut button = PinDriver::input(peripherals.pins.gpio4)?;
    button.set_pull(Pull::Up)?;

    let mut pir = PirSensor::new(peripherals.pins.gpio5.downgrade())?;
    let mut climate = ClimateSensor::new(peripherals.pins.gpio6.downgrade())?;

    let adc = AdcDriver::new(peripherals.adc1)?;
    let adc_pin = AdcChannelDriver::new(
        adc,
        peripherals.pins.gpio1,
        &AdcChannelConfig {
            attenuation: DB_11,
            ..Default::default()
        },
    )?;
    let mut illuminance = IlluminanceSensor::new(adc_pin);

    let started = Instant::now();
    loop {
        let now_ms = started.elapsed().as_millis() as u64;
        let inputs = TickInputs {
            now_ms,
            // Active-low with the internal pull-up.
            button_pressed: button.is_low(),
            motion: pir.poll(),
            climate: climate.poll(now_ms),
            illuminance_lux: illuminance.poll(now_ms),
        };

        let outcome = runtime.tick(inputs);
        if let Some(reason) = outcome.restart {
            system::restart(reason);
        }

        FreeRtos::delay_ms(TICK_DELAY_MS);
    }
}
