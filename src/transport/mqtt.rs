//! MQTT publishing over rumqttc.
//!
//! The client's event loop runs on a helper thread and `publish` only
//! enqueues the message. When the request queue is full (broker down or
//! slow) the publish fails instead of blocking the sweep.

use anyhow::{anyhow, Context, Result};
use rumqttc::{Client, Connection, Event, MqttOptions, Outgoing, QoS, Transport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::Publisher;
use crate::config::MqttSettings;

/// Upper bound for outgoing packets; snapshots are sent as one payload.
const MAX_OUTGOING_PACKET_BYTES: usize = 8 * 1024 * 1024;
const MAX_INCOMING_PACKET_BYTES: usize = 64 * 1024;
const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const REQUEST_QUEUE_CAPACITY: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttEndpoint {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

/// Parse `host:port`, `[v6]:port`, or a `mqtt://` / `mqtts://` URL.
pub fn parse_mqtt_endpoint(addr: &str) -> Result<MqttEndpoint> {
    let mut use_tls = false;
    let mut remainder = addr.trim();

    if let Some((scheme, rest)) = remainder.split_once("://") {
        match scheme {
            "mqtt" | "tcp" => {}
            "mqtts" | "ssl" => use_tls = true,
            other => return Err(anyhow!("unsupported MQTT scheme: {}", other)),
        }
        remainder = rest;
    }

    let (host, port) = split_host_port(remainder)?;
    if host.is_empty() {
        return Err(anyhow!("missing MQTT host in {}", addr));
    }
    Ok(MqttEndpoint {
        host,
        port,
        use_tls,
    })
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
        let port: u16 = port.parse().context("invalid MQTT port")?;
        return Ok((host.to_string(), port));
    }

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
    let port: u16 = port.parse().context("invalid MQTT port")?;
    Ok((host.to_string(), port))
}

/// Publisher backed by a live MQTT client.
pub struct MqttPublisher {
    client: Client,
    closing: Arc<AtomicBool>,
    connection_handle: Option<JoinHandle<()>>,
}

impl MqttPublisher {
    pub fn connect(settings: &MqttSettings) -> Result<Self> {
        let endpoint = parse_mqtt_endpoint(&settings.broker)?;
        let mut options = MqttOptions::new(&settings.client_id, &endpoint.host, endpoint.port);
        options.set_keep_alive(Duration::from_secs(60));
        options.set_clean_session(true);
        options.set_max_packet_size(MAX_INCOMING_PACKET_BYTES, MAX_OUTGOING_PACKET_BYTES);
        if let Some(user) = settings.username.as_deref() {
            options.set_credentials(user, settings.password.as_deref().unwrap_or_default());
        }
        if endpoint.use_tls {
            options.set_transport(Transport::tls_with_default_config());
        }

        let (client, connection) = Client::new(options, REQUEST_QUEUE_CAPACITY);
        let closing = Arc::new(AtomicBool::new(false));
        let handle = spawn_event_loop(connection, Arc::clone(&closing));
        log::info!(
            "MQTT client {} targeting {}:{} (TLS: {}, auth: {})",
            settings.client_id,
            endpoint.host,
            endpoint.port,
            endpoint.use_tls,
            settings.username.is_some()
        );
        Ok(Self {
            client,
            closing,
            connection_handle: Some(handle),
        })
    }
}

impl Publisher for MqttPublisher {
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<()> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, retain, payload.to_vec())
            .map_err(|e| anyhow!("failed to queue MQTT publish to {}: {}", topic, e))?;
        Ok(())
    }

    /// Queue a disconnect behind any pending publishes and wait for the event
    /// loop to write them out. If the broker is unreachable the loop gives up
    /// at its next connection error.
    fn close(&mut self) -> Result<()> {
        let Some(handle) = self.connection_handle.take() else {
            return Ok(());
        };
        self.closing.store(true, Ordering::SeqCst);
        if let Err(e) = self.client.try_disconnect() {
            log::warn!("MQTT disconnect not queued: {}", e);
        }
        handle
            .join()
            .map_err(|_| anyhow!("MQTT event loop thread panicked"))?;
        log::info!("MQTT client disconnected");
        Ok(())
    }
}

fn spawn_event_loop(mut connection: Connection, closing: Arc<AtomicBool>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for notification in connection.iter() {
            match notification {
                Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                Ok(_) => {}
                Err(rumqttc::ConnectionError::RequestsDone) => break,
                Err(e) if closing.load(Ordering::SeqCst) => {
                    log::warn!("MQTT connection error during shutdown: {}", e);
                    break;
                }
                Err(e) => {
                    log::warn!("MQTT connection error: {}", e);
                    std::thread::sleep(RECONNECT_DELAY);
                }
            }
        }
    })
}
