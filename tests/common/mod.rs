#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use bisecur2mqtt::config::{DoorSettings, GatewayAddress, GatewaySettings, LoggingSettings, MqttSettings, Settings};
use bisecur2mqtt::errors::{BridgeError, BridgeResult};
use bisecur2mqtt::init::{self, AppContext};
use bisecur2mqtt::models::{CommandData, GatewayResponse, McpErrorCode};
use bisecur2mqtt::services::gateway::{GatewayClient, GatewayConnector};
use bisecur2mqtt::services::MessageSink;

pub const BASE: &str = "bisecur2mqtt";

pub fn create_mock_settings() -> Settings {
    Settings {
        mqtt: MqttSettings {
            broker: "localhost".to_string(),
            port: 1883,
            client_id: Some("bisecur2mqtt-test".to_string()),
            username: None,
            password: None,
            tls: false,
            keep_alive_secs: 60,
            topic_base: BASE.to_string(),
            discovery_topic: "homeassistant".to_string(),
            reconnect_delay_secs: 5,
        },
        gateway: GatewaySettings {
            ip: Some("192.168.1.20".to_string()),
            port: 4000,
            mac: Some("54:10:EC:00:11:22".to_string()),
            src_mac: "FF:FF:FF:FF:FF:FF".to_string(),
            user: "admin".to_string(),
            password: None,
            timeout_ms: 5000,
            max_retries: 5,
            retry_delay_ms: 800,
        },
        doors: DoorSettings::default(),
        logging: LoggingSettings::default(),
    }
}

/// One scripted answer to a transition query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    Position(u8),
    ErrorFrame(u8),
    BrokenPipe,
}

/// What the fake gateway answers, and what it was asked.
///
/// Transition queries consume the per-port queue; once a queue is empty its last step repeats.
#[derive(Debug)]
pub struct GatewayScript {
    pub transitions: HashMap<u8, VecDeque<Step>>,
    last_steps: HashMap<u8, Step>,
    pub set_state_position: Option<u8>,
    pub set_state_error: Option<u8>,
    pub login_token: Option<u32>,
    pub refused_connects: u32,
    pub version: String,
    pub connects: u32,
    pub logins: u32,
    pub logouts: u32,
    pub transition_calls: Vec<u8>,
    pub set_state_calls: Vec<u8>,
}

impl Default for GatewayScript {
    fn default() -> Self {
        Self {
            transitions: HashMap::new(),
            last_steps: HashMap::new(),
            set_state_position: None,
            set_state_error: None,
            login_token: Some(0x1234),
            refused_connects: 0,
            version: "HW-2.1".to_string(),
            connects: 0,
            logins: 0,
            logouts: 0,
            transition_calls: Vec::new(),
            set_state_calls: Vec::new(),
        }
    }
}

impl GatewayScript {
    pub fn script(&mut self, port: u8, steps: impl IntoIterator<Item = Step>) {
        self.transitions.entry(port).or_default().extend(steps);
    }

    pub fn positions(&mut self, port: u8, positions: impl IntoIterator<Item = u8>) {
        self.script(port, positions.into_iter().map(Step::Position));
    }

    fn next_step(&mut self, port: u8) -> Step {
        let step = self.transitions
            .get_mut(&port)
            .and_then(|queue| queue.pop_front())
            .or_else(|| self.last_steps.get(&port).copied())
            .unwrap_or(Step::Position(0));
        self.last_steps.insert(port, step);
        step
    }
}

pub type SharedScript = Arc<Mutex<GatewayScript>>;

pub struct FakeClient {
    script: SharedScript,
    last_error: Option<McpErrorCode>,
}

impl FakeClient {
    fn answer(&mut self, response: GatewayResponse) -> BridgeResult<GatewayResponse> {
        self.last_error = response.error_code().cloned();
        Ok(response)
    }
}

#[async_trait]
impl GatewayClient for FakeClient {
    async fn login(&mut self, _user: &str, _password: &str) -> BridgeResult<Option<u32>> {
        let mut script = self.script.lock();
        script.logins += 1;
        Ok(script.login_token)
    }

    async fn logout(&mut self) -> BridgeResult<()> {
        self.script.lock().logouts += 1;
        Ok(())
    }

    async fn get_transition(&mut self, port: u8) -> BridgeResult<GatewayResponse> {
        let step = {
            let mut script = self.script.lock();
            script.transition_calls.push(port);
            script.next_step(port)
        };
        match step {
            Step::Position(percent) => self.answer(GatewayResponse::new(
                0x70,
                CommandData { percent_open: Some(percent), ..CommandData::default() },
            )),
            Step::ErrorFrame(code) => self.answer(GatewayResponse::error(0x01, code)),
            Step::BrokenPipe => Err(BridgeError::IoError(io::Error::from(io::ErrorKind::BrokenPipe))),
        }
    }

    async fn set_state(&mut self, port: u8) -> BridgeResult<GatewayResponse> {
        let (position, error) = {
            let mut script = self.script.lock();
            script.set_state_calls.push(port);
            (script.set_state_position, script.set_state_error)
        };
        match error {
            Some(code) => self.answer(GatewayResponse::error(0x01, code)),
            None => self.answer(GatewayResponse::new(
                0x33,
                CommandData { percent_open: position, ..CommandData::default() },
            )),
        }
    }

    async fn get_gw_version(&mut self) -> BridgeResult<GatewayResponse> {
        let version = self.script.lock().version.clone();
        self.answer(GatewayResponse::new(
            0x04,
            CommandData { gw_version: Some(version), ..CommandData::default() },
        ))
    }

    async fn jmcp(&mut self, _request: &serde_json::Value) -> BridgeResult<GatewayResponse> {
        self.answer(GatewayResponse::new(
            0x06,
            CommandData { json: Some(json!({"0": {"name": "Garage", "ports": [0, 1]}})), ..CommandData::default() },
        ))
    }

    fn last_error(&self) -> Option<McpErrorCode> {
        self.last_error.clone()
    }
}

pub struct FakeConnector {
    pub script: SharedScript,
}

#[async_trait]
impl GatewayConnector for FakeConnector {
    async fn connect(&self, _address: &GatewayAddress) -> BridgeResult<Box<dyn GatewayClient>> {
        {
            let mut script = self.script.lock();
            script.connects += 1;
            if script.refused_connects > 0 {
                script.refused_connects -= 1;
                return Err(BridgeError::IoError(io::Error::from(io::ErrorKind::ConnectionRefused)));
            }
        }
        Ok(Box::new(FakeClient { script: self.script.clone(), last_error: None }))
    }
}

/// A published message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

#[derive(Default)]
pub struct RecordingSink {
    pub messages: Mutex<Vec<Published>>,
    pub subscriptions: Mutex<Vec<String>>,
}

impl RecordingSink {
    /// Payloads published to `{BASE}/{topic}`, in order.
    pub fn payloads(&self, topic: &str) -> Vec<String> {
        self.payloads_at(&format!("{}/{}", BASE, topic))
    }

    pub fn payloads_at(&self, full_topic: &str) -> Vec<String> {
        self.messages.lock()
            .iter()
            .filter(|m| m.topic == full_topic)
            .map(|m| m.payload.clone())
            .collect()
    }

    pub fn last(&self, topic: &str) -> Option<String> {
        self.payloads(topic).pop()
    }

    pub fn find(&self, topic: &str) -> Option<Published> {
        let full_topic = format!("{}/{}", BASE, topic);
        self.messages.lock().iter().rev().find(|m| m.topic == full_topic).cloned()
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn send(&self, topic: &str, payload: String, retain: bool) -> BridgeResult<()> {
        self.messages.lock().push(Published { topic: topic.to_string(), payload, retain });
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> BridgeResult<()> {
        self.subscriptions.lock().push(topic.to_string());
        Ok(())
    }
}

pub struct Harness {
    pub context: AppContext,
    pub sink: Arc<RecordingSink>,
    pub script: SharedScript,
}

impl Harness {
    pub fn new(settings: Settings) -> Self {
        let script: SharedScript = Arc::new(Mutex::new(GatewayScript::default()));
        let sink = Arc::new(RecordingSink::default());
        let connector = Arc::new(FakeConnector { script: script.clone() });
        let context = init::initialize(Arc::new(settings), connector, sink.clone());
        Self { context, sink, script }
    }

    /// A harness with a logged-in gateway session.
    pub async fn logged_in() -> Self {
        let harness = Self::new(create_mock_settings());
        harness.context.session.initialize(false).await.unwrap();
        harness
    }

    pub async fn dispatch(&self, token: &str, door: u8) -> Option<bisecur2mqtt::controllers::CommandReply> {
        self.context.dispatcher.dispatch(token, door).await
    }

    /// Waits for every tracking task to end and returns how they ended.
    pub async fn join_monitors(&self) -> Vec<bisecur2mqtt::monitoring::MonitorExit> {
        let mut exits = Vec::new();
        for monitor in self.context.registry.take_monitors().await {
            if let Some(exit) = monitor.join().await {
                exits.push(exit);
            }
        }
        exits
    }
}
