//! Alert delivery.
//!
//! The sweep controller only sees [`AlertEmitter`]. The MQTT emitter sends the
//! snapshot image to one topic and a motion trigger to another through a
//! [`Publisher`], which tests replace with a recording fake.

pub mod mqtt;

use anyhow::{anyhow, Context, Result};
use std::path::Path;

pub use mqtt::{parse_mqtt_endpoint, MqttEndpoint, MqttPublisher};

/// Payload sent on the motion topic for every detection.
pub const MOTION_ON: &[u8] = b"ON";

/// Narrow pub/sub capability.
pub trait Publisher {
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<()>;

    /// Deliver anything still queued and release the connection.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<P: Publisher + ?Sized> Publisher for Box<P> {
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<()> {
        (**self).publish(topic, payload, retain)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Announces a new detection to the outside world.
pub trait AlertEmitter {
    fn emit(&mut self, snapshot: &Path) -> Result<()>;

    /// Called once before the process exits.
    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Publishes the snapshot bytes and a retained `ON` motion signal.
pub struct MqttAlertEmitter<P> {
    publisher: P,
    image_topic: String,
    motion_topic: String,
}

impl<P: Publisher> MqttAlertEmitter<P> {
    pub fn new(publisher: P, image_topic: &str, motion_topic: &str) -> Self {
        Self {
            publisher,
            image_topic: image_topic.to_string(),
            motion_topic: motion_topic.to_string(),
        }
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }
}

impl<P: Publisher> AlertEmitter for MqttAlertEmitter<P> {
    /// Both topics are attempted even if the first publish fails.
    fn emit(&mut self, snapshot: &Path) -> Result<()> {
        let image = std::fs::read(snapshot)
            .with_context(|| format!("failed to read snapshot {}", snapshot.display()))
            .and_then(|bytes| self.publisher.publish(&self.image_topic, &bytes, true));
        let motion = self.publisher.publish(&self.motion_topic, MOTION_ON, true);

        match (image, motion) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Err(image), Err(motion)) => Err(anyhow!(
                "image publish failed: {:#}; motion publish failed: {:#}",
                image,
                motion
            )),
        }
    }

    fn shutdown(&mut self) -> Result<()> {
        self.publisher.close()
    }
}

/// Used when no broker is configured: detections are only logged.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogAlertEmitter;

impl AlertEmitter for LogAlertEmitter {
    fn emit(&mut self, snapshot: &Path) -> Result<()> {
        log::info!("alert (no broker configured): {}", snapshot.display());
        Ok(())
    }
}
