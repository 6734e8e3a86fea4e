//! Device configuration.
//!
//! The full provisioning key set, read once at boot and written only through
//! the config portal's submit path (which always ends in a restart). Field
//! contents are deliberately not validated: bad credentials simply fail to
//! connect, which is recoverable by re-entering AP mode with the ultra-long
//! press.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::net::{StaticIpConfig, StationConfig};

pub const DEFAULT_MQTT_PORT: u16 = 1883;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    // Network
    pub wifi_ssid: String,
    pub wifi_password: String,
    pub ip: String,
    pub mask: String,
    pub gateway: String,
    pub ota_server: String,

    // Broker
    pub mqtt_server: String,
    pub mqtt_port: String,
    pub mqtt_username: String,
    pub mqtt_password: String,

    // Naming
    pub device_name: String,
    pub discovery_prefix: String,
    pub motion_name: String,
    pub humidity_name: String,
    pub temperature_name: String,
    pub illuminance_name: String,
    pub led_name: String,

    // Topics
    pub mqtt_status_sensors: String,
    pub mqtt_status_led: String,
    pub mqtt_button_toggle: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_password: String::new(),
            ip: String::new(),
            mask: String::new(),
            gateway: String::new(),
            ota_server: String::new(),
            mqtt_server: String::new(),
            mqtt_port: DEFAULT_MQTT_PORT.to_string(),
            mqtt_username: String::new(),
            mqtt_password: String::new(),
            device_name: "sense-node".into(),
            discovery_prefix: "homeassistant".into(),
            motion_name: "Motion".into(),
            humidity_name: "Humidity".into(),
            temperature_name: "Temperature".into(),
            illuminance_name: "Illuminance".into(),
            led_name: "Light".into(),
            mqtt_status_sensors: "sense-node/sensors".into(),
            mqtt_status_led: "sense-node/light".into(),
            mqtt_button_toggle: "sense-node/button".into(),
        }
    }
}

macro_rules! config_fields {
    ($($name:ident),* $(,)?) => {
        /// Field names in portal display order.
        const FIELDS: &[&str] = &[$(stringify!($name)),*];

        impl DeviceConfig {
            fn get_field(&self, key: &str) -> Option<&String> {
                match key {
                    $(stringify!($name) => Some(&self.$name),)*
                    _ => None,
                }
            }

            fn set_field(&mut self, key: &str, value: String) -> bool {
                match key {
                    $(stringify!($name) => { self.$name = value; true },)*
                    _ => false,
                }
            }
        }
    };
}

config_fields!(
    wifi_ssid,
    wifi_password,
    ip,
    mask,
    gateway,
    ota_server,
    mqtt_server,
    mqtt_port,
    mqtt_username,
    mqtt_password,
    device_name,
    discovery_prefix,
    motion_name,
    humidity_name,
    temperature_name,
    illuminance_name,
    mqtt_status_sensors,
    led_name,
    mqtt_status_led,
    mqtt_button_toggle,
);

impl DeviceConfig {
    /// Ordered (key, value) pairs for the provisioning portal, with the
    /// read-only firmware/hardware identity appended.
    pub fn pairs(&self, firmware_version: &str, hardware: &str) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = FIELDS
            .iter()
            .map(|&key| {
                (
                    key.to_string(),
                    self.get_field(key).cloned().unwrap_or_default(),
                )
            })
            .collect();
        pairs.push(("firmware_version".into(), firmware_version.to_string()));
        pairs.push(("hardware".into(), hardware.to_string()));
        pairs
    }

    /// Apply a submitted key->value mapping. Unknown keys (including the
    /// read-only identity pair) are ignored; values are accepted as-is.
    pub fn apply_pairs(&mut self, pairs: &[(String, String)]) {
        for (key, value) in pairs {
            if !self.set_field(key, value.clone()) {
                log::debug!("ignoring unknown config key '{key}'");
            }
        }
    }

    pub fn broker_port(&self) -> u16 {
        self.mqtt_port.parse().unwrap_or(DEFAULT_MQTT_PORT)
    }

    /// Static IP settings, or `None` (DHCP) when any field is blank.
    pub fn static_ip(&self) -> Option<StaticIpConfig> {
        if self.ip.is_empty() || self.mask.is_empty() || self.gateway.is_empty() {
            return None;
        }
        Some(StaticIpConfig {
            ip: self.ip.clone(),
            mask: self.mask.clone(),
            gateway: self.gateway.clone(),
        })
    }

    pub fn station(&self) -> StationConfig {
        StationConfig {
            ssid: self.wifi_ssid.clone(),
            password: self.wifi_password.clone(),
            static_ip: self.static_ip(),
            hostname: self.device_name.clone(),
        }
    }

    // Derived topics.

    pub fn motion_topic(&self) -> String {
        format!("{}/motion", self.mqtt_status_sensors)
    }

    pub fn humidity_topic(&self) -> String {
        format!("{}/humidity", self.mqtt_status_sensors)
    }

    pub fn temperature_topic(&self) -> String {
        format!("{}/temperature", self.mqtt_status_sensors)
    }

    pub fn illuminance_topic(&self) -> String {
        format!("{}/illuminance", self.mqtt_status_sensors)
    }

    /// Availability topic; also the last-will target.
    pub fn availability_topic(&self) -> String {
        format!("{}/status", self.mqtt_status_sensors)
    }

    pub fn led_status_topic(&self) -> String {
        self.mqtt_status_led.clone()
    }

    pub fn led_command_topic(&self) -> String {
        format!("{}/set", self.mqtt_status_led)
    }
}

/// Persistent key/value storage boundary (NVS on the device).
pub trait ConfigStore {
    fn load(&mut self) -> Result<Option<DeviceConfig>>;
    fn save(&mut self, config: &DeviceConfig) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_are_ordered_and_carry_identity() {
        let config = DeviceConfig::default();
        let pairs = config.pairs("0.1.0", "esp32s3");
        assert_eq!(pairs.first().unwrap().0, "wifi_ssid");
        assert_eq!(
            pairs.last().unwrap(),
            &("hardware".to_string(), "esp32s3".to_string())
        );
        assert!(pairs
            .iter()
            .any(|(k, v)| k == "firmware_version" && v == "0.1.0"));
    }

    #[test]
    fn apply_pairs_round_trips_and_ignores_unknown_keys() {
        let mut config = DeviceConfig::default();
        config.apply_pairs(&[
            ("wifi_ssid".into(), "attic".into()),
            ("mqtt_port".into(), "8883".into()),
            ("no_such_key".into(), "x".into()),
            ("firmware_version".into(), "9.9.9".into()),
        ]);
        assert_eq!(config.wifi_ssid, "attic");
        assert_eq!(config.broker_port(), 8883);
    }

    #[test]
    fn invalid_port_falls_back_to_default() {
        let mut config = DeviceConfig::default();
        config.mqtt_port = "not-a-port".into();
        assert_eq!(config.broker_port(), DEFAULT_MQTT_PORT);
    }

    #[test]
    fn static_ip_requires_all_three_fields() {
        let mut config = DeviceConfig::default();
        assert!(config.static_ip().is_none());
        config.ip = "192.168.1.50".into();
        config.mask = "255.255.255.0".into();
        assert!(config.static_ip().is_none());
        config.gateway = "192.168.1.1".into();
        assert!(config.static_ip().is_some());
    }

    #[test]
    fn derived_topics() {
        let config = DeviceConfig::default();
        assert_eq!(config.motion_topic(), "sense-node/sensors/motion");
        assert_eq!(config.led_command_topic(), "sense-node/light/set");
        assert_eq!(config.availability_topic(), "sense-node/sensors/status");
    }

    #[test]
    fn survives_serde_round_trip() {
        let mut config = DeviceConfig::default();
        config.wifi_ssid = "attic".into();
        let json = serde_json::to_string(&config).unwrap();
        let back: DeviceConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
