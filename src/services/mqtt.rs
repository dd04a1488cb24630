use std::time::Duration;
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet, QoS, Transport};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use crate::config::Settings;
use crate::errors::BridgeResult;

/// Notifications forwarded from the MQTT event loop to the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// The broker acknowledged a (re)connection.
    Connected,
    /// A message arrived on a subscribed topic.
    Message { topic: String, payload: String },
    /// The connection was lost; the event loop reconnects on its own.
    Disconnected(String),
}

/// Builds the rumqttc options from the settings.
///
/// The session is persistent so that commands published while the bridge reconnects are not lost, and the
/// last will marks the first configured door offline if the bridge disappears without a clean shutdown.
pub fn mqtt_options(settings: &Settings) -> BridgeResult<MqttOptions> {
    let (host, port, tls) = settings.mqtt.endpoint()?;
    let mut options = MqttOptions::new(settings.mqtt.client_id(), host, port);
    options.set_keep_alive(Duration::from_secs(settings.mqtt.keep_alive_secs));
    options.set_clean_session(false);

    if let Some((username, password)) = settings.mqtt.credentials() {
        options.set_credentials(username, password);
    }
    if tls {
        options.set_transport(Transport::tls_with_default_config());
    }
    if let Some(port) = settings.doors.ports.first() {
        options.set_last_will(LastWill::new(
            format!("{}/{}/state", settings.mqtt.topic_base, port),
            "offline",
            QoS::AtMostOnce,
            true,
        ));
    }
    Ok(options)
}

/// Creates the MQTT client and spawns the task driving its event loop.
///
/// # Returns
///
/// The client used for publishing and subscribing, the receiver of [`BusEvent`]s and the handle of the
/// event loop task.
pub fn connect(settings: &Settings) -> BridgeResult<(AsyncClient, mpsc::Receiver<BusEvent>, JoinHandle<()>)> {
    let options = mqtt_options(settings)?;
    info!("Connecting to MQTT broker {}:{}", options.broker_address().0, options.broker_address().1);
    let (client, event_loop) = AsyncClient::new(options, 64);
    let (sender, receiver) = mpsc::channel(100);
    let reconnect_delay = Duration::from_secs(settings.mqtt.reconnect_delay_secs);
    let handle = tokio::spawn(drive_event_loop(event_loop, sender, reconnect_delay));
    Ok((client, receiver, handle))
}

async fn drive_event_loop(mut event_loop: EventLoop, sender: mpsc::Sender<BusEvent>, reconnect_delay: Duration) {
    loop {
        let event = match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => Some(BusEvent::Connected),
            Ok(Event::Incoming(Packet::Publish(publish))) => Some(BusEvent::Message {
                topic: publish.topic,
                payload: String::from_utf8_lossy(&publish.payload).into_owned(),
            }),
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => None,
            Err(e) => {
                error!("MQTT connection error: {}", e);
                if sender.send(BusEvent::Disconnected(e.to_string())).await.is_err() {
                    break;
                }
                warn!("Retrying MQTT connection in {:?}", reconnect_delay);
                tokio::time::sleep(reconnect_delay).await;
                None
            }
        };
        if let Some(event) = event {
            if sender.send(event).await.is_err() {
                break;
            }
        }
    }
    info!("MQTT event loop stopped");
}
