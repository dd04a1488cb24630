use std::sync::Arc;
use std::time::Duration;
use futures::future::join_all;
use tracing::{error, info, warn};
use crate::config::Settings;
use crate::errors::BridgeResult;
use crate::models::Command;
use crate::services::discovery::publish_discovery;
use crate::services::mqtt::BusEvent;
use crate::services::{BusPublisher, DoorStatusReader, GatewaySession};
use crate::state_management::DoorRegistry;
use super::command_dispatcher::{CommandDispatcher, COMMAND_SUBTOPIC};

/// Longest wait for the tracking tasks to end on shutdown.
const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Connects the bus to the gateway: reacts to connection changes and inbound commands, and runs the
/// startup and shutdown sequences.
pub struct BridgeController {
    settings: Arc<Settings>,
    publisher: BusPublisher,
    session: Arc<GatewaySession>,
    reader: Arc<DoorStatusReader>,
    dispatcher: Arc<CommandDispatcher>,
    registry: Arc<DoorRegistry>,
}

impl BridgeController {
    pub fn new(
        settings: Arc<Settings>,
        publisher: BusPublisher,
        session: Arc<GatewaySession>,
        reader: Arc<DoorStatusReader>,
        dispatcher: Arc<CommandDispatcher>,
        registry: Arc<DoorRegistry>,
    ) -> Self {
        Self { settings, publisher, session, reader, dispatcher, registry }
    }

    fn ports(&self) -> &[u8] {
        &self.settings.doors.ports
    }

    /// Logs in to the gateway and publishes the status of every door once.
    ///
    /// # Returns
    ///
    /// * `Err(BridgeError)` if the gateway session cannot be established; fatal errors end the process
    pub async fn start(&self) -> BridgeResult<()> {
        self.session.initialize(false).await?;
        for port in self.ports() {
            self.reader.read_status(*port).await;
        }
        Ok(())
    }

    pub async fn handle_event(&self, event: BusEvent) {
        match event {
            BusEvent::Connected => self.on_connect().await,
            BusEvent::Message { topic, payload } => self.on_message(&topic, &payload).await,
            BusEvent::Disconnected(reason) => self.on_disconnect(&reason).await,
        }
    }

    async fn on_connect(&self) {
        let command_topic = format!("{}/command", COMMAND_SUBTOPIC);
        info!("Connected to MQTT broker, subscribing to '{}/{}'", self.publisher.topic_base(), command_topic);
        if let Err(e) = self.publisher.subscribe(&command_topic).await {
            error!("Subscription to the command topic failed: {}", e);
        }

        let gw_hw_version = match self.dispatcher.get_gw_version().await {
            Ok((_, version)) => version,
            Err(e) => {
                warn!("Could not read the gateway version for discovery: {}", e);
                None
            }
        };
        for port in self.ports() {
            self.publisher.publish_retained(&format!("{}/state", port), "online").await;
            publish_discovery(&self.publisher, &self.settings, *port, gw_hw_version.clone()).await;
        }
    }

    async fn on_message(&self, topic: &str, payload: &str) {
        info!("---> Topic '{}' received command '{}'", topic, payload);
        match Command::parse(payload) {
            Some(command) => {
                self.dispatcher.dispatch(&command.token, command.door).await;
            }
            None => warn!("Received invalid command format: {}", payload),
        }
    }

    async fn on_disconnect(&self, reason: &str) {
        info!("MQTT session disconnected: {}", reason);
        for port in self.ports() {
            self.publisher.publish_retained(&format!("{}/state", port), "offline").await;
        }
    }

    /// Marks every door offline, stops the tracking tasks and releases the gateway session.
    pub async fn shutdown(&self) {
        info!("Exiting. Changing MQTT state to 'offline'");
        for port in self.ports() {
            self.publisher.publish_retained(&format!("{}/state", port), "offline").await;
        }

        let monitors = self.registry.take_monitors().await;
        info!("Stopping {} tracking task(s)", monitors.len());
        for monitor in &monitors {
            monitor.cancel();
        }
        let joins = join_all(monitors.into_iter().map(|monitor| monitor.join()));
        if tokio::time::timeout(SHUTDOWN_JOIN_TIMEOUT, joins).await.is_err() {
            warn!("Tracking tasks did not stop within {:?}", SHUTDOWN_JOIN_TIMEOUT);
        }

        self.session.shutdown().await;
        self.publisher.disconnect().await;
    }
}
