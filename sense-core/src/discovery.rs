//! Home-Assistant-style MQTT discovery announcements.
//!
//! One component per physical capability (motion, humidity, temperature,
//! illuminance, light). Each serializes to a retained JSON config published
//! at `{discovery_prefix}/{component}/{identity}/config` whenever the MQTT
//! session (re)connects.

use serde_json::{Map, Value};

/// Device metadata attached to every discovery payload so the hub groups all
/// capabilities under one device entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceData {
    pub name: String,
    pub hardware: String,
    pub firmware: String,
    pub firmware_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryComponent {
    /// Component kind as understood by the hub: "sensor", "binary_sensor",
    /// "light", ...
    pub component: String,
    /// Friendly name shown in the hub UI.
    pub name: String,
    pub discovery_prefix: String,
    /// Configuration variables in insertion order, e.g. ("state_topic", ..).
    options: Vec<(String, String)>,
}

impl DiscoveryComponent {
    pub fn new(component: &str, name: &str, discovery_prefix: &str) -> Self {
        Self {
            component: component.to_string(),
            name: name.to_string(),
            discovery_prefix: discovery_prefix.to_string(),
            options: Vec::new(),
        }
    }

    pub fn set_option(mut self, key: &str, value: &str) -> Self {
        self.options.push((key.to_string(), value.to_string()));
        self
    }

    /// Per-capability identity derived from the friendly name. Keeps two
    /// components of the same kind from colliding on one config topic.
    pub fn object_id(&self) -> String {
        self.name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect()
    }

    pub fn config_topic(&self) -> String {
        format!(
            "{}/{}/{}/config",
            self.discovery_prefix,
            self.component,
            self.object_id()
        )
    }

    /// Retained JSON payload. Option values that look like booleans or
    /// integers are emitted as such; everything else stays a string.
    pub fn config_payload(&self, device: Option<&DeviceData>) -> String {
        let mut root = Map::new();
        root.insert("name".into(), Value::String(self.name.clone()));
        root.insert(
            "unique_id".into(),
            Value::String(format!("{}_{}", self.component, self.object_id())),
        );
        for (key, value) in &self.options {
            root.insert(key.clone(), typed_value(value));
        }
        if let Some(device) = device {
            let mut dev = Map::new();
            dev.insert(
                "identifiers".into(),
                Value::Array(vec![Value::String(device.name.clone())]),
            );
            dev.insert("name".into(), Value::String(device.name.clone()));
            dev.insert("model".into(), Value::String(device.hardware.clone()));
            dev.insert("manufacturer".into(), Value::String(device.firmware.clone()));
            dev.insert(
                "sw_version".into(),
                Value::String(device.firmware_version.clone()),
            );
            root.insert("device".into(), Value::Object(dev));
        }
        Value::Object(root).to_string()
    }
}

fn typed_value(raw: &str) -> Value {
    if raw == "true" {
        return Value::Bool(true);
    }
    if raw == "false" {
        return Value::Bool(false);
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::Number(n.into());
    }
    Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_topic_uses_prefix_kind_and_identity() {
        let component = DiscoveryComponent::new("binary_sensor", "Hallway Motion", "homeassistant");
        assert_eq!(
            component.config_topic(),
            "homeassistant/binary_sensor/hallway_motion/config"
        );
    }

    #[test]
    fn payload_carries_typed_options_and_device_block() {
        let component = DiscoveryComponent::new("light", "Desk Light", "homeassistant")
            .set_option("state_topic", "node/light")
            .set_option("rgb", "true")
            .set_option("qos", "1");
        let device = DeviceData {
            name: "node".into(),
            hardware: "esp32s3".into(),
            firmware: "sense-node".into(),
            firmware_version: "0.1.0".into(),
        };

        let payload: serde_json::Value =
            serde_json::from_str(&component.config_payload(Some(&device))).unwrap();
        assert_eq!(payload["name"], "Desk Light");
        assert_eq!(payload["state_topic"], "node/light");
        assert_eq!(payload["rgb"], true);
        assert_eq!(payload["qos"], 1);
        assert_eq!(payload["device"]["model"], "esp32s3");
        assert_eq!(payload["device"]["sw_version"], "0.1.0");
    }

    #[test]
    fn payload_without_device_block() {
        let component = DiscoveryComponent::new("sensor", "Humidity", "ha")
            .set_option("unit_of_measurement", "%");
        let payload: serde_json::Value =
            serde_json::from_str(&component.config_payload(None)).unwrap();
        assert_eq!(payload["unit_of_measurement"], "%");
        assert!(payload.get("device").is_none());
    }
}
