//! Home Assistant discovery for the garage doors.

use serde::Serialize;
use tracing::{error, info};
use crate::config::{normalize_mac, Settings};
use crate::services::publisher::BusPublisher;

pub const SYSTEM_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Cover configuration published to `{discovery_topic}/cover/bisecur/{door}/config`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverDiscovery {
    pub name: String,
    pub unique_id: String,
    pub device_class: &'static str,
    pub schema: &'static str,
    pub command_topic: String,
    pub state_topic: String,
    pub position_topic: String,
    pub json_attributes_topic: String,
    pub availability_topic: String,
    pub payload_available: &'static str,
    pub payload_not_available: &'static str,
    pub payload_open: &'static str,
    pub payload_close: &'static str,
    pub payload_stop: &'static str,
    pub position_open: f32,
    pub position_closed: f32,
    pub door_commands_list: Vec<&'static str>,
    pub supported_features: Vec<&'static str>,
    pub connections: Vec<String>,
    pub sw_version: &'static str,
    pub gw_hw_version: Option<String>,
}

impl CoverDiscovery {
    pub fn new(settings: &Settings, door: u8, gw_hw_version: Option<String>) -> Self {
        let base = &settings.mqtt.topic_base;
        Self {
            name: format!("Bisecur Gateway: Garage Door {}", door),
            unique_id: format!("bs_garage_door_{}", door),
            device_class: "garage",
            schema: "state",
            command_topic: format!("{}/send_command/command", base),
            state_topic: format!("{}/garage_door/{}/state", base, door),
            position_topic: format!("{}/garage_door/{}/position", base, door),
            json_attributes_topic: format!("{}/{}/attributes", base, door),
            availability_topic: format!("{}/{}/state", base, door),
            payload_available: "online",
            payload_not_available: "offline",
            payload_open: "up",
            payload_close: "down",
            payload_stop: "impulse",
            position_open: 100.0,
            position_closed: 0.0,
            door_commands_list: vec!["impulse", "up", "down", "partial", "stop", "light"],
            supported_features: vec![
                "impulse", "up", "down", "partial", "stop", "light", "get_door_state", "get_ports", "login",
                "sys_restart",
            ],
            connections: vec![
                "mac".to_string(),
                gateway_mac(settings),
                "ip".to_string(),
                settings.gateway.ip.clone().unwrap_or_default(),
            ],
            sw_version: SYSTEM_VERSION,
            gw_hw_version,
        }
    }
}

fn gateway_mac(settings: &Settings) -> String {
    settings.gateway.mac.as_deref().map(normalize_mac).unwrap_or_default()
}

/// Publishes the discovery descriptor of `door` and the bridge's informational attributes.
pub async fn publish_discovery(publisher: &BusPublisher, settings: &Settings, door: u8, gw_hw_version: Option<String>) {
    let descriptor = CoverDiscovery::new(settings, door, gw_hw_version);
    match serde_json::to_string(&descriptor) {
        Ok(json) => {
            info!("Publishing discovery for door {}", door);
            publisher
                .publish_under(&settings.mqtt.discovery_topic, &format!("cover/bisecur/{}/config", door), json)
                .await;
        }
        Err(e) => error!("Failed to serialize discovery for door {}: {}", door, e),
    }
    publisher.publish("attributes/system_version", SYSTEM_VERSION).await;
    publisher.publish("attributes/gw_ip_address", settings.gateway.ip.clone().unwrap_or_default()).await;
    publisher.publish("attributes/gw_mac_address", gateway_mac(settings)).await;
}
