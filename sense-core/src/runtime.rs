//! Orchestration loop.
//!
//! Single-threaded cooperative scheduler binding the gesture classifier,
//! network mode controller, MQTT session, OTA controller and liveness
//! watchdog into one device lifecycle. Each tick polls gestures first, so a
//! gesture-triggered mode change takes effect before the same tick's MQTT
//! and OTA servicing.
//!
//! The runtime never resets the chip itself: every fatal path surfaces as a
//! `RestartReason` in the tick outcome, and the firmware's single restart
//! function acts on it.

use anyhow::Result;

use crate::button::{GestureClassifier, GestureConfig, PressEvent};
use crate::config::{ConfigStore, DeviceConfig};
use crate::discovery::{DeviceData, DiscoveryComponent};
use crate::light::{self, LightActuator, Rgb};
use crate::mqtt::{InboundMessage, LastWill, MqttDriver, MqttSession, SessionOptions};
use crate::net::{NetworkController, NetworkMode, StationConfig, WifiDriver};
use crate::update::{UpdateController, UpdateEndpoint};
use crate::watchdog::{self, LivenessWatchdog};

/// Re-issue a station connection attempt at most this often while
/// disconnected.
pub const STATION_RETRY_INTERVAL_MS: u64 = 15_000;

/// Firmware identity, fixed per boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub firmware: String,
    pub firmware_version: String,
    pub hardware: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateReading {
    pub humidity: f32,
    pub temperature: f32,
}

/// Everything the loop needs to know about the world this tick. Sensor
/// readings are `Some` only when their external polling timer elapsed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickInputs {
    pub now_ms: u64,
    /// Raw (debounced by the runtime) button level, true = pressed.
    pub button_pressed: bool,
    /// Motion edge: `Some(true)` rising, `Some(false)` falling.
    pub motion: Option<bool>,
    pub climate: Option<ClimateReading>,
    pub illuminance_lux: Option<f32>,
}

impl TickInputs {
    pub fn quiet(now_ms: u64) -> Self {
        Self {
            now_ms,
            button_pressed: false,
            motion: None,
            climate: None,
            illuminance_lux: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    WatchdogTimeout,
    ButtonRequest,
    ConfigSubmitted,
    LeftConfigMode,
    UpdateApplied,
}

impl RestartReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartReason::WatchdogTimeout => "liveness watchdog timeout",
            RestartReason::ButtonRequest => "very-long button press",
            RestartReason::ConfigSubmitted => "new configuration submitted",
            RestartReason::LeftConfigMode => "left config mode",
            RestartReason::UpdateApplied => "firmware update applied",
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    pub restart: Option<RestartReason>,
}

impl TickOutcome {
    fn request_restart(&mut self, reason: RestartReason) {
        if self.restart.is_none() {
            self.restart = Some(reason);
        }
    }
}

/// Captive-portal collaborator boundary. The core supplies ordered config
/// pairs for rendering and consumes submitted key/value mappings; HTML and
/// HTTP live on the other side.
pub trait ConfigPortal {
    fn start(&mut self, pairs: &[(String, String)]) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    fn poll(&mut self) -> Option<Vec<(String, String)>>;
}

/// External collaborators handed to the runtime at construction.
pub struct Collaborators<W, M, L, U, P, S> {
    pub wifi: W,
    pub mqtt: M,
    pub light: L,
    pub update_endpoint: U,
    pub portal: P,
    pub store: S,
}

struct Topics {
    motion: String,
    humidity: String,
    temperature: String,
    illuminance: String,
    led_status: String,
    led_command: String,
    button_toggle: String,
}

/// Top-level context owning one instance of each component. Constructed once
/// at startup; there is no hidden global state.
pub struct Runtime<W, M, L, U, P, S>
where
    W: WifiDriver,
    M: MqttDriver,
    L: LightActuator,
    U: UpdateEndpoint,
    P: ConfigPortal,
    S: ConfigStore,
{
    config: DeviceConfig,
    identity: Identity,
    station: StationConfig,
    topics: Topics,
    button: GestureClassifier,
    net: NetworkController<W>,
    session: MqttSession<M>,
    updater: UpdateController<U>,
    watchdog: LivenessWatchdog,
    light: L,
    portal: P,
    store: S,
    last_station_attempt_ms: Option<u64>,
}

impl<W, M, L, U, P, S> Runtime<W, M, L, U, P, S>
where
    W: WifiDriver,
    M: MqttDriver,
    L: LightActuator,
    U: UpdateEndpoint,
    P: ConfigPortal,
    S: ConfigStore,
{
    pub fn new(
        config: DeviceConfig,
        identity: Identity,
        gesture: GestureConfig,
        parts: Collaborators<W, M, L, U, P, S>,
    ) -> Result<Self> {
        let station = config.station();
        let topics = Topics {
            motion: config.motion_topic(),
            humidity: config.humidity_topic(),
            temperature: config.temperature_topic(),
            illuminance: config.illuminance_topic(),
            led_status: config.led_status_topic(),
            led_command: config.led_command_topic(),
            button_toggle: config.mqtt_button_toggle.clone(),
        };

        let mut session = MqttSession::new(
            parts.mqtt,
            SessionOptions {
                broker_host: config.mqtt_server.clone(),
                broker_port: config.broker_port(),
                username: config.mqtt_username.clone(),
                password: config.mqtt_password.clone(),
                client_id: config.device_name.clone(),
                last_will: Some(LastWill {
                    topic: config.availability_topic(),
                    payload: "offline".into(),
                }),
            },
        );
        session.set_device_data(DeviceData {
            name: config.device_name.clone(),
            hardware: identity.hardware.clone(),
            firmware: identity.firmware.clone(),
            firmware_version: identity.firmware_version.clone(),
        });
        session.add_subscribe_topic(&topics.led_command);
        session.add_status_topic(&config.availability_topic());
        for component in build_discovery(&config, &topics) {
            session.add_discovery_component(component);
        }

        let updater = UpdateController::new(
            parts.update_endpoint,
            &identity.firmware,
            &identity.hardware,
            &identity.firmware_version,
        )?;

        let mut net = NetworkController::new(parts.wifi);
        let mut last_station_attempt_ms = None;
        if station.ssid.is_empty() {
            log::warn!("no WiFi credentials provisioned; waiting for config mode");
        } else {
            net.connect_station(&station);
            last_station_attempt_ms = Some(0);
        }
        session.start_connection();

        Ok(Self {
            config,
            identity,
            station,
            topics,
            button: GestureClassifier::new(gesture),
            net,
            session,
            updater,
            watchdog: LivenessWatchdog::new(watchdog::DEFAULT_TIMEOUT_MS),
            light: parts.light,
            portal: parts.portal,
            store: parts.store,
            last_station_attempt_ms,
        })
    }

    /// One cooperative tick. Bounded work; never blocks.
    pub fn tick(&mut self, inputs: TickInputs) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        let now = inputs.now_ms;

        // Gestures are dispatched before any network servicing so a mode
        // change requested this tick is already in force below.
        if let Some(event) = self.button.poll(inputs.button_pressed, now) {
            self.handle_gesture(event, &mut outcome);
        }

        self.net.poll();
        self.retry_station_if_due(now);
        if !self.net.connected() {
            // A session or reconnect in flight when the link went away is
            // abandoned, not drained.
            self.session.transport_lost();
        }

        self.publish_sensor_readings(&inputs);

        if self.net.connected() {
            if let Some(message) = self.session.poll(now) {
                self.handle_message(&message);
            }
            if self.updater.poll(now) {
                outcome.request_restart(RestartReason::UpdateApplied);
            }
        }

        if self.net.ap_mode_enabled() {
            if let Some(fields) = self.portal.poll() {
                self.apply_submitted_config(&fields, &mut outcome);
            }
        }

        // Watchdog policy: armed and fed while the device is in its
        // "should be reachable" state, disarmed in config mode.
        if self.session.connected() {
            self.watchdog.init(now);
            self.watchdog.feed(now);
        } else if self.net.ap_mode_enabled() {
            self.watchdog.deinit();
        }
        if self.watchdog.poll(now) {
            outcome.request_restart(RestartReason::WatchdogTimeout);
        }

        outcome
    }

    fn handle_gesture(&mut self, event: PressEvent, outcome: &mut TickOutcome) {
        log::info!("button: {event:?} press");
        match event {
            PressEvent::Short => {
                self.light.commute();
                self.publish_light_state();
                // Mirror onto the command topic too, so other listeners of
                // the command stream follow local toggles.
                let payload = light::state_payload(self.light.is_on(), self.light.color());
                let topic = self.topics.led_command.clone();
                self.session.publish(&topic, &payload);
            }
            PressEvent::Long => {
                let topic = self.topics.button_toggle.clone();
                self.session.publish(&topic, "TOGGLE");
            }
            PressEvent::VeryLong => {
                self.session.stop_connection();
                self.net.disconnect_station();
                outcome.request_restart(RestartReason::ButtonRequest);
            }
            PressEvent::UltraLong => {
                if self.net.ap_mode_enabled() {
                    self.leave_config_mode(outcome);
                } else {
                    self.enter_config_mode();
                }
            }
        }
    }

    fn enter_config_mode(&mut self) {
        log::info!("entering config mode");
        self.session.stop_connection();
        self.net.enter_access_point();
        if !self.net.ap_mode_enabled() {
            return;
        }
        let pairs = self
            .config
            .pairs(&self.identity.firmware_version, &self.identity.hardware);
        if let Err(e) = self.portal.start(&pairs) {
            log::error!("config portal failed to start: {e:#}");
        }
        // Solid white marks config mode.
        self.light.set_color(Rgb::WHITE, None);
        self.light.turn_on();
    }

    fn leave_config_mode(&mut self, outcome: &mut TickOutcome) {
        log::info!("leaving config mode");
        if let Err(e) = self.portal.stop() {
            log::warn!("config portal failed to stop: {e:#}");
        }
        self.net.exit_access_point();
        outcome.request_restart(RestartReason::LeftConfigMode);
    }

    fn apply_submitted_config(&mut self, fields: &[(String, String)], outcome: &mut TickOutcome) {
        log::info!("config submitted via portal, persisting");
        self.config.apply_pairs(fields);
        if let Err(e) = self.store.save(&self.config) {
            log::error!("failed to persist configuration: {e:#}");
        }
        // Always restart into the new configuration, even if persisting
        // failed - the portal flow must not leave the node half-configured.
        outcome.request_restart(RestartReason::ConfigSubmitted);
    }

    fn retry_station_if_due(&mut self, now_ms: u64) {
        if self.net.mode() != NetworkMode::Disconnected || self.station.ssid.is_empty() {
            return;
        }
        let due = match self.last_station_attempt_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= STATION_RETRY_INTERVAL_MS,
        };
        if due {
            self.last_station_attempt_ms = Some(now_ms);
            self.net.connect_station(&self.station);
        }
    }

    fn publish_sensor_readings(&mut self, inputs: &TickInputs) {
        if let Some(motion) = inputs.motion {
            let topic = self.topics.motion.clone();
            self.session
                .publish(&topic, if motion { "ON" } else { "OFF" });
        }
        if let Some(climate) = inputs.climate {
            // Sentinel/invalid readings are published as-is; validation is a
            // collaborator concern.
            let topic = self.topics.humidity.clone();
            self.session.publish(&topic, &format!("{:.1}", climate.humidity));
            let topic = self.topics.temperature.clone();
            self.session
                .publish(&topic, &format!("{:.1}", climate.temperature));
        }
        if let Some(lux) = inputs.illuminance_lux {
            let topic = self.topics.illuminance.clone();
            self.session.publish(&topic, &format!("{lux:.1}"));
        }
    }

    fn handle_message(&mut self, message: &InboundMessage) {
        if message.topic == self.topics.led_command {
            match light::parse_command(&message.payload) {
                Ok(request) => {
                    light::apply_request(&mut self.light, &request);
                    self.publish_light_state();
                }
                Err(e) => {
                    log::warn!("discarding malformed payload on '{}': {e:#}", message.topic);
                }
            }
        } else {
            log::debug!("message on unhandled topic '{}'", message.topic);
        }
    }

    fn publish_light_state(&mut self) {
        let payload = light::state_payload(self.light.is_on(), self.light.color());
        let topic = self.topics.led_status.clone();
        self.session.publish(&topic, &payload);
    }
}

fn build_discovery(config: &DeviceConfig, topics: &Topics) -> Vec<DiscoveryComponent> {
    let prefix = &config.discovery_prefix;
    vec![
        DiscoveryComponent::new("binary_sensor", &config.motion_name, prefix)
            .set_option("device_class", "motion")
            .set_option("state_topic", &topics.motion)
            .set_option("qos", "1"),
        DiscoveryComponent::new("sensor", &config.humidity_name, prefix)
            .set_option("state_topic", &topics.humidity)
            .set_option("unit_of_measurement", "%")
            .set_option("qos", "1"),
        DiscoveryComponent::new("sensor", &config.temperature_name, prefix)
            .set_option("state_topic", &topics.temperature)
            .set_option("unit_of_measurement", "ºC")
            .set_option("qos", "1"),
        DiscoveryComponent::new("sensor", &config.illuminance_name, prefix)
            .set_option("state_topic", &topics.illuminance)
            .set_option("unit_of_measurement", "lx")
            .set_option("qos", "1"),
        DiscoveryComponent::new("light", &config.led_name, prefix)
            .set_option("platform", "mqtt_json")
            .set_option("command_topic", &topics.led_command)
            .set_option("state_topic", &topics.led_status)
            .set_option("rgb", "true")
            .set_option("qos", "1")
            .set_option("retain", "true"),
    ]
}
