//! ESP-IDF MQTT transport behind the core's session boundary.
//!
//! The IDF client runs its own task and reports through a callback; this
//! adapter folds that back into the poll-driven world with an atomic
//! connected flag and a bounded inbound queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use esp_idf_svc::mqtt::client::{
    EspMqttClient, EventPayload, LwtConfiguration, MqttClientConfiguration, QoS,
};

use sense_core::mqtt::{InboundMessage, MqttDriver, SessionOptions};

const INBOUND_QUEUE_LEN: usize = 16;

pub struct EspMqttDriver {
    client: Option<EspMqttClient<'static>>,
    connected: Arc<AtomicBool>,
    inbound: Arc<Mutex<heapless::Deque<InboundMessage, INBOUND_QUEUE_LEN>>>,
}

impl EspMqttDriver {
    pub fn new() -> Self {
        Self {
            client: None,
            connected: Arc::new(AtomicBool::new(false)),
            inbound: Arc::new(Mutex::new(heapless::Deque::new())),
        }
    }
}

impl MqttDriver for EspMqttDriver {
    fn connect(&mut self, options: &SessionOptions) -> Result<()> {
        let url = format!("mqtt://{}:{}", options.broker_host, options.broker_port);
        let conf = MqttClientConfiguration {
            client_id: Some(&options.client_id),
            username: if options.username.is_empty() {
                None
            } else {
                Some(&options.username)
            },
            password: if options.password.is_empty() {
                None
            } else {
                Some(&options.password)
            },
            lwt: options.last_will.as_ref().map(|will| LwtConfiguration {
                topic: &will.topic,
                payload: will.payload.as_bytes(),
                qos: QoS::AtLeastOnce,
                retain: true,
            }),
            ..Default::default()
        };

        self.connected.store(false, Ordering::SeqCst);
        let connected = self.connected.clone();
        let inbound = self.inbound.clone();
        let client = EspMqttClient::new_cb(&url, &conf, move |event| match event.payload() {
            EventPayload::Connected(_) => connected.store(true, Ordering::SeqCst),
            EventPayload::Disconnected => connected.store(false, Ordering::SeqCst),
            EventPayload::Received { topic, data, .. } => {
                if let Some(topic) = topic {
                    let message = InboundMessage {
                        topic: topic.to_string(),
                        payload: data.to_vec(),
                    };
                    if let Ok(mut queue) = inbound.lock() {
                        if queue.push_back(message).is_err() {
                            log::warn!("inbound mqtt queue full, dropping message");
                        }
                    }
                }
            }
            EventPayload::Error(e) => log::warn!("mqtt event error: {e:?}"),
            _ => {}
        })?;

        self.client = Some(client);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        // Dropping the client tears the task and socket down.
        self.client = None;
        self.connected.store(false, Ordering::SeqCst);
        if let Ok(mut queue) = self.inbound.lock() {
            queue.clear();
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&mut self, topic: &str) -> Result<()> {
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| anyhow!("mqtt client not started"))?;
        client.subscribe(topic, QoS::AtLeastOnce)?;
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<()> {
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| anyhow!("mqtt client not started"))?;
        // enqueue never blocks the loop.
        client.enqueue(topic, QoS::AtLeastOnce, retain, payload)?;
        Ok(())
    }

    fn poll_inbound(&mut self) -> Option<InboundMessage> {
        self.inbound.lock().ok()?.pop_front()
    }
}
