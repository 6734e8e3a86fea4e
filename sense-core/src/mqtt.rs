//! MQTT session manager.
//!
//! Owns the broker connection life-cycle over a non-blocking driver. On
//! every (re)connect the full subscription set is reissued before the
//! discovery announcements are published - subscriptions do not survive a
//! disconnect, and a hub that sees retained discovery configs before the
//! command subscriptions are active could race a lost subscription.
//!
//! Publishing while disconnected is a silent, logged no-op: there is no
//! outbound queue, a deliberate trade of delivery guarantees for memory.

use anyhow::Result;

use crate::discovery::{DeviceData, DiscoveryComponent};

/// Attempt a (re)connect at most this often.
pub const RETRY_INTERVAL_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    pub topic: String,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub broker_host: String,
    pub broker_port: u16,
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub last_will: Option<LastWill>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Transport-level MQTT operations. `connect` initiates and must not block;
/// progress is observed through `is_connected`. Inbound messages arrive
/// through `poll_inbound`, drained one per call from the session's loop.
pub trait MqttDriver {
    fn connect(&mut self, options: &SessionOptions) -> Result<()>;
    fn disconnect(&mut self) -> Result<()>;
    fn is_connected(&self) -> bool;
    fn subscribe(&mut self, topic: &str) -> Result<()>;
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<()>;
    fn poll_inbound(&mut self) -> Option<InboundMessage>;
}

pub struct MqttSession<D: MqttDriver> {
    driver: D,
    options: SessionOptions,
    device: Option<DeviceData>,
    subscribe_topics: Vec<String>,
    status_topics: Vec<String>,
    discovery: Vec<DiscoveryComponent>,
    state: ConnectionState,
    started: bool,
    last_attempt_ms: Option<u64>,
    retry_interval_ms: u64,
}

impl<D: MqttDriver> MqttSession<D> {
    pub fn new(driver: D, options: SessionOptions) -> Self {
        Self {
            driver,
            options,
            device: None,
            subscribe_topics: Vec::new(),
            status_topics: Vec::new(),
            discovery: Vec::new(),
            state: ConnectionState::Disconnected,
            started: false,
            last_attempt_ms: None,
            retry_interval_ms: RETRY_INTERVAL_MS,
        }
    }

    /// Device metadata attached to discovery announcements.
    pub fn set_device_data(&mut self, device: DeviceData) {
        self.device = Some(device);
    }

    pub fn add_subscribe_topic(&mut self, topic: &str) {
        self.subscribe_topics.push(topic.to_string());
    }

    /// Status topics get an "online" birth message on every connect; the
    /// last will covers the unclean-disconnect side.
    pub fn add_status_topic(&mut self, topic: &str) {
        self.status_topics.push(topic.to_string());
    }

    pub fn add_discovery_component(&mut self, component: DiscoveryComponent) {
        self.discovery.push(component);
    }

    /// Begin the connect/subscribe/announce sequence; actual work happens in
    /// `poll`.
    pub fn start_connection(&mut self) {
        self.started = true;
    }

    /// Disconnect cleanly. Publishing the configured last will is the
    /// broker's job per MQTT semantics, not ours.
    pub fn stop_connection(&mut self) {
        self.started = false;
        if self.state != ConnectionState::Disconnected {
            if let Err(e) = self.driver.disconnect() {
                log::warn!("mqtt disconnect failed: {e:#}");
            }
        }
        self.state = ConnectionState::Disconnected;
        self.last_attempt_ms = None;
    }

    /// The network link underneath the transport went away. Tear the
    /// connection down but keep the session started, so polling reconnects
    /// once the link returns.
    pub fn transport_lost(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        log::warn!("mqtt transport lost with the network link");
        self.teardown_for_retry();
    }

    pub fn connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Publish fire-and-forget. A publish while not Connected is discarded;
    /// callers must not assume delivery.
    pub fn publish(&mut self, topic: &str, payload: &str) {
        if self.state != ConnectionState::Connected {
            log::debug!("dropping publish to '{topic}' while disconnected");
            return;
        }
        if let Err(e) = self.driver.publish(topic, payload.as_bytes(), false) {
            log::warn!("publish to '{topic}' failed: {e:#}");
        }
    }

    /// Service the connection. Reconnect attempts fire at most once per
    /// retry interval. Returns one inbound message per call while connected.
    pub fn poll(&mut self, now_ms: u64) -> Option<InboundMessage> {
        match self.state {
            ConnectionState::Disconnected => {
                if self.started && self.retry_due(now_ms) {
                    self.attempt_connect(now_ms);
                }
            }
            ConnectionState::Connecting => {
                if self.driver.is_connected() {
                    self.establish();
                } else if self.retry_due(now_ms) {
                    self.attempt_connect(now_ms);
                }
            }
            ConnectionState::Connected => {
                if !self.driver.is_connected() {
                    log::warn!("mqtt connection lost");
                    self.state = ConnectionState::Disconnected;
                } else {
                    return self.driver.poll_inbound();
                }
            }
        }
        None
    }

    fn retry_due(&self, now_ms: u64) -> bool {
        match self.last_attempt_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.retry_interval_ms,
        }
    }

    fn attempt_connect(&mut self, now_ms: u64) {
        self.last_attempt_ms = Some(now_ms);
        match self.driver.connect(&self.options) {
            Ok(()) => self.state = ConnectionState::Connecting,
            Err(e) => {
                log::warn!("mqtt connect attempt failed: {e:#}");
                self.state = ConnectionState::Disconnected;
            }
        }
    }

    /// Transport is up: reissue every subscription, then announce every
    /// discovery component retained, then mark Connected. Any failure tears
    /// the session down for a retried attempt.
    fn establish(&mut self) {
        for topic in &self.subscribe_topics {
            if let Err(e) = self.driver.subscribe(topic) {
                log::warn!("subscribe to '{topic}' failed: {e:#}");
                self.teardown_for_retry();
                return;
            }
        }
        for topic in &self.status_topics {
            if let Err(e) = self.driver.publish(topic, b"online", true) {
                log::warn!("birth publish to '{topic}' failed: {e:#}");
                self.teardown_for_retry();
                return;
            }
        }
        for component in &self.discovery {
            let topic = component.config_topic();
            let payload = component.config_payload(self.device.as_ref());
            if let Err(e) = self.driver.publish(&topic, payload.as_bytes(), true) {
                log::warn!("discovery announce to '{topic}' failed: {e:#}");
                self.teardown_for_retry();
                return;
            }
        }
        log::info!(
            "mqtt session up: {} subscriptions, {} discovery components",
            self.subscribe_topics.len(),
            self.discovery.len()
        );
        self.state = ConnectionState::Connected;
    }

    fn teardown_for_retry(&mut self) {
        if let Err(e) = self.driver.disconnect() {
            log::debug!("mqtt teardown failed: {e:#}");
        }
        self.state = ConnectionState::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::DiscoveryComponent;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Op {
        Connect,
        Disconnect,
        Subscribe(String),
        Publish {
            topic: String,
            payload: Vec<u8>,
            retain: bool,
        },
    }

    #[derive(Default)]
    struct FakeDriver {
        connected: bool,
        /// When set, `connect` leaves the transport down.
        refuse: bool,
        ops: Vec<Op>,
        inbound: std::collections::VecDeque<InboundMessage>,
    }

    impl MqttDriver for FakeDriver {
        fn connect(&mut self, _options: &SessionOptions) -> Result<()> {
            self.ops.push(Op::Connect);
            if !self.refuse {
                self.connected = true;
            }
            Ok(())
        }

        fn disconnect(&mut self) -> Result<()> {
            self.ops.push(Op::Disconnect);
            self.connected = false;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn subscribe(&mut self, topic: &str) -> Result<()> {
            self.ops.push(Op::Subscribe(topic.to_string()));
            Ok(())
        }

        fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<()> {
            self.ops.push(Op::Publish {
                topic: topic.to_string(),
                payload: payload.to_vec(),
                retain,
            });
            Ok(())
        }

        fn poll_inbound(&mut self) -> Option<InboundMessage> {
            self.inbound.pop_front()
        }
    }

    fn options() -> SessionOptions {
        SessionOptions {
            broker_host: "broker.local".into(),
            broker_port: 1883,
            username: "user".into(),
            password: "pass".into(),
            client_id: "node".into(),
            last_will: Some(LastWill {
                topic: "node/status".into(),
                payload: "offline".into(),
            }),
        }
    }

    fn session_with_topics() -> MqttSession<FakeDriver> {
        let mut session = MqttSession::new(FakeDriver::default(), options());
        session.add_subscribe_topic("node/light/set");
        session.add_subscribe_topic("node/cmd");
        session.add_status_topic("node/status");
        session.add_discovery_component(
            DiscoveryComponent::new("sensor", "Humidity", "ha")
                .set_option("state_topic", "node/humidity"),
        );
        session.add_discovery_component(
            DiscoveryComponent::new("light", "Light", "ha")
                .set_option("command_topic", "node/light/set"),
        );
        session
    }

    #[test]
    fn connect_sequence_subscribes_before_announcing() {
        let mut session = session_with_topics();
        session.start_connection();
        assert!(session.poll(0).is_none()); // initiates connect
        assert!(!session.connected());
        assert!(session.poll(10).is_none()); // transport up -> establish
        assert!(session.connected());

        let ops = &session.driver.ops;
        let first_announce = ops
            .iter()
            .position(|op| matches!(op, Op::Publish { retain: true, .. }))
            .unwrap();
        let last_subscribe = ops
            .iter()
            .rposition(|op| matches!(op, Op::Subscribe(_)))
            .unwrap();
        assert!(last_subscribe < first_announce, "subscribe-before-announce");

        let subscribes: Vec<_> = ops
            .iter()
            .filter(|op| matches!(op, Op::Subscribe(_)))
            .collect();
        assert_eq!(subscribes.len(), 2);
        let retained_publishes = ops
            .iter()
            .filter(|op| matches!(op, Op::Publish { retain: true, .. }))
            .count();
        // birth message + two discovery configs
        assert_eq!(retained_publishes, 3);
    }

    #[test]
    fn discovery_announces_are_retained_configs() {
        let mut session = session_with_topics();
        session.start_connection();
        session.poll(0);
        session.poll(10);
        assert!(session.driver.ops.iter().any(|op| matches!(
            op,
            Op::Publish { topic, retain: true, .. } if topic == "ha/sensor/humidity/config"
        )));
    }

    #[test]
    fn reconnect_reissues_full_subscription_and_discovery_set() {
        let mut session = session_with_topics();
        session.start_connection();
        session.poll(0);
        session.poll(10);
        assert!(session.connected());

        // Broker drops us.
        session.driver.connected = false;
        assert!(session.poll(20).is_none());
        assert!(!session.connected());
        session.driver.ops.clear();

        // Next attempt waits for the retry interval, then replays the
        // sequence in full.
        assert!(session.poll(1_000).is_none());
        assert!(session.driver.ops.is_empty(), "retry cadence is bounded");
        session.poll(20 + RETRY_INTERVAL_MS);
        session.poll(21 + RETRY_INTERVAL_MS);
        assert!(session.connected());
        let subscribes = session
            .driver
            .ops
            .iter()
            .filter(|op| matches!(op, Op::Subscribe(_)))
            .count();
        assert_eq!(subscribes, 2);
    }

    #[test]
    fn publish_while_disconnected_is_a_silent_no_op() {
        let mut session = session_with_topics();
        session.publish("node/humidity", "42.0");
        assert!(session.driver.ops.is_empty());

        session.start_connection();
        session.publish("node/humidity", "42.0");
        assert!(session.driver.ops.is_empty());
    }

    #[test]
    fn publish_while_connected_is_fire_and_forget() {
        let mut session = session_with_topics();
        session.start_connection();
        session.poll(0);
        session.poll(10);
        session.driver.ops.clear();

        session.publish("node/humidity", "42.0");
        assert_eq!(
            session.driver.ops,
            vec![Op::Publish {
                topic: "node/humidity".into(),
                payload: b"42.0".to_vec(),
                retain: false,
            }]
        );
    }

    #[test]
    fn connect_attempts_fire_at_most_once_per_interval() {
        let mut session = session_with_topics();
        session.driver.refuse = true;
        session.start_connection();
        for t in (0..20_000).step_by(100) {
            session.poll(t);
        }
        let attempts = session
            .driver
            .ops
            .iter()
            .filter(|op| matches!(op, Op::Connect))
            .count();
        assert_eq!(attempts, 4); // t=0, 5000, 10000, 15000
    }

    #[test]
    fn inbound_messages_flow_only_while_connected() {
        let mut session = session_with_topics();
        session.driver.inbound.push_back(InboundMessage {
            topic: "node/light/set".into(),
            payload: b"TOGGLE".to_vec(),
        });
        assert!(session.poll(0).is_none());

        session.start_connection();
        session.poll(10);
        session.poll(20);
        assert!(session.connected());
        let message = session.poll(30).unwrap();
        assert_eq!(message.topic, "node/light/set");
    }

    #[test]
    fn transport_loss_tears_down_but_keeps_retrying() {
        let mut session = session_with_topics();
        session.start_connection();
        session.poll(0);
        session.poll(10);
        assert!(session.connected());

        session.transport_lost();
        assert!(!session.connected());
        assert!(matches!(session.driver.ops.last(), Some(Op::Disconnect)));

        // Still started: the next retry window reconnects in full.
        session.poll(RETRY_INTERVAL_MS);
        session.poll(RETRY_INTERVAL_MS + 10);
        assert!(session.connected());
    }

    #[test]
    fn stop_connection_disconnects_and_stops_retrying() {
        let mut session = session_with_topics();
        session.start_connection();
        session.poll(0);
        session.poll(10);
        assert!(session.connected());

        session.stop_connection();
        assert!(!session.connected());
        assert!(matches!(session.driver.ops.last(), Some(Op::Disconnect)));

        session.driver.ops.clear();
        for t in (0..60_000).step_by(1000) {
            session.poll(t);
        }
        assert!(session.driver.ops.is_empty());
    }
}
