use std::fmt::Display;
use std::sync::Arc;
use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};
use tracing::{debug, error, info};
use crate::errors::BridgeResult;
use crate::models::timestamp;

/// Transport used to put a message on the bus.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, topic: &str, payload: String, retain: bool) -> BridgeResult<()>;

    async fn subscribe(&self, topic: &str) -> BridgeResult<()>;

    /// Flushes queued messages and closes the connection.
    async fn disconnect(&self) -> BridgeResult<()> {
        Ok(())
    }
}

/// [`MessageSink`] backed by the rumqttc client.
pub struct MqttSink {
    client: AsyncClient,
    qos: QoS,
}

impl MqttSink {
    pub fn new(client: AsyncClient) -> Self {
        Self { client, qos: QoS::AtMostOnce }
    }
}

#[async_trait]
impl MessageSink for MqttSink {
    async fn send(&self, topic: &str, payload: String, retain: bool) -> BridgeResult<()> {
        self.client.publish(topic, self.qos, retain, payload.into_bytes()).await?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> BridgeResult<()> {
        self.client.subscribe(topic, self.qos).await?;
        Ok(())
    }

    async fn disconnect(&self) -> BridgeResult<()> {
        self.client.disconnect().await?;
        Ok(())
    }
}

/// Publishes bridge messages below the configured topic base.
///
/// Every message is followed by a `{topic}_ts` message carrying the publication time. Publication failures
/// are logged and swallowed: losing a status message must never abort the operation that produced it.
#[derive(Clone)]
pub struct BusPublisher {
    sink: Arc<dyn MessageSink>,
    topic_base: String,
}

impl BusPublisher {
    pub fn new(sink: Arc<dyn MessageSink>, topic_base: impl Into<String>) -> Self {
        Self { sink, topic_base: topic_base.into() }
    }

    pub fn topic_base(&self) -> &str {
        &self.topic_base
    }

    /// Subscribes to `{topic_base}/{topic}`.
    pub async fn subscribe(&self, topic: &str) -> BridgeResult<()> {
        let full_topic = format!("{}/{}", self.topic_base, topic);
        info!("Subscribing to {}", full_topic);
        self.sink.subscribe(&full_topic).await
    }

    pub async fn disconnect(&self) {
        if let Err(e) = self.sink.disconnect().await {
            error!("Error while disconnecting from the broker: {}", e);
        }
    }

    /// Publishes `payload` to `{topic_base}/{topic}` followed by its timestamp.
    pub async fn publish(&self, topic: &str, payload: impl Display) {
        self.publish_with(&self.topic_base, topic, payload.to_string(), false).await;
    }

    /// Same as [`publish`](Self::publish), with the retain flag set.
    pub async fn publish_retained(&self, topic: &str, payload: impl Display) {
        self.publish_with(&self.topic_base, topic, payload.to_string(), true).await;
    }

    /// Publishes `payload` below another base, e.g. the discovery prefix.
    pub async fn publish_under(&self, base: &str, topic: &str, payload: impl Display) {
        self.publish_with(base, topic, payload.to_string(), false).await;
    }

    /// Publishes only the `{topic}_ts` timestamp.
    pub async fn publish_timestamp(&self, topic: &str) {
        let full_topic = format!("{}/{}_ts", self.topic_base, topic);
        self.send_logged(&full_topic, timestamp(), false).await;
    }

    async fn publish_with(&self, base: &str, topic: &str, payload: String, retain: bool) {
        let full_topic = format!("{}/{}", base, topic);
        self.send_logged(&full_topic, payload, retain).await;
        self.send_logged(&format!("{}_ts", full_topic), timestamp(), retain).await;
    }

    async fn send_logged(&self, topic: &str, payload: String, retain: bool) {
        debug!("---> MQTT pub: {} {}", topic, payload);
        if let Err(e) = self.sink.send(topic, payload.clone(), retain).await {
            error!("Error in topic: {}, payload: {}: {}", topic, payload, e);
        }
    }
}
