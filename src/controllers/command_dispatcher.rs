use std::fmt;
use std::sync::Arc;
use serde_json::json;
use tracing::{error, info, warn};
use crate::errors::{BridgeResult, FATAL_EXIT_CODE};
use crate::models::{Action, GatewayResponse};
use crate::services::{ActionOutcome, BusPublisher, DoorActionExecutor, DoorStatusReader, ErrorClassifier, GatewaySession};
use crate::state_management::BridgeLifecycle;

/// Subtopic of every command-related topic.
pub const COMMAND_SUBTOPIC: &str = "send_command";

/// What a command produced, published on `send_command/{door}/response`.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandReply {
    Response(GatewayResponse),
    Message(String),
    Token(u32),
    NoResponse,
}

impl CommandReply {
    pub fn response(&self) -> Option<&GatewayResponse> {
        match self {
            CommandReply::Response(response) => Some(response),
            _ => None,
        }
    }
}

impl From<Option<GatewayResponse>> for CommandReply {
    fn from(response: Option<GatewayResponse>) -> Self {
        response.map_or(CommandReply::NoResponse, CommandReply::Response)
    }
}

impl fmt::Display for CommandReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandReply::Response(response) => write!(f, "{}", response),
            CommandReply::Message(message) => f.write_str(message),
            CommandReply::Token(token) => write!(f, "{}", token),
            CommandReply::NoResponse => f.write_str("No response"),
        }
    }
}

/// Routes bus commands to the gateway and publishes their outcome.
///
/// This is the one place where failures stop: whatever happens below, the dispatcher logs it and
/// publishes either a response or an error record.
pub struct CommandDispatcher {
    session: Arc<GatewaySession>,
    publisher: BusPublisher,
    classifier: Arc<ErrorClassifier>,
    reader: Arc<DoorStatusReader>,
    executor: Arc<DoorActionExecutor>,
    lifecycle: Arc<BridgeLifecycle>,
}

impl CommandDispatcher {
    pub fn new(
        session: Arc<GatewaySession>,
        publisher: BusPublisher,
        classifier: Arc<ErrorClassifier>,
        reader: Arc<DoorStatusReader>,
        executor: Arc<DoorActionExecutor>,
        lifecycle: Arc<BridgeLifecycle>,
    ) -> Self {
        Self { session, publisher, classifier, reader, executor, lifecycle }
    }

    /// Executes `token` for `door` and publishes the reply.
    pub async fn dispatch(&self, token: &str, door: u8) -> Option<CommandReply> {
        let token = token.trim().to_lowercase();
        info!("Command '{}' for door {}", token, door);
        self.publisher.publish_timestamp(&format!("{}/command", COMMAND_SUBTOPIC)).await;

        match self.execute(&token, door).await {
            Ok(reply) => {
                if reply == CommandReply::NoResponse {
                    self.classifier.classify_missing().await;
                } else {
                    self.classifier.classify(reply.response()).await;
                }
                self.publisher.publish(&format!("{}/{}/response", COMMAND_SUBTOPIC, door), &reply).await;
                Some(reply)
            }
            Err(e) => {
                error!("Command '{}' for door {} failed: {}", token, door, e);
                if e.is_fatal() {
                    self.lifecycle.trigger_shutdown(FATAL_EXIT_CODE);
                }
                self.classifier.report_fault(&e).await;
                None
            }
        }
    }

    async fn execute(&self, token: &str, door: u8) -> BridgeResult<CommandReply> {
        let action = match token.parse::<Action>() {
            Ok(action) => action,
            Err(unknown) => {
                warn!("{}", unknown);
                return Ok(CommandReply::Message(unknown.to_string()));
            }
        };

        match action {
            Action::GetDoorState | Action::GetDoorPosition => Ok(self.reader.read_status(door).await.response.into()),
            Action::GetPorts => self.get_ports().await.map(CommandReply::Response),
            Action::GetVersion => self.get_gw_version().await.map(|(response, _)| CommandReply::Response(response)),
            Action::Login => Ok(match self.session.login().await? {
                Some(token) => CommandReply::Token(token),
                None => CommandReply::NoResponse,
            }),
            Action::SysRestart => self.session.initialize(true).await.map(CommandReply::Token),
            motion => Ok(match self.executor.execute(motion, door).await {
                ActionOutcome::Submitted(response) => CommandReply::Response(response),
                ActionOutcome::Refused(message) => CommandReply::Message(message),
                ActionOutcome::Failed => CommandReply::NoResponse,
            }),
        }
    }

    /// Reads the ports assigned to user 0 and publishes them on `attributes/user0_ports`.
    pub async fn get_ports(&self) -> BridgeResult<GatewayResponse> {
        let response = self.session.jmcp(&json!({"CMD": "GET_GROUPS", "FORUSER": 0})).await?;
        match response.json() {
            Some(ports) => {
                info!("Ports of user 0: {}", serde_json::to_string_pretty(ports)?);
                self.publisher.publish("attributes/user0_ports", ports).await;
            }
            None => warn!("No port list in response: {}", response),
        }
        Ok(response)
    }

    /// Reads the gateway's hardware version and publishes it on `attributes/gw_hw_version`.
    pub async fn get_gw_version(&self) -> BridgeResult<(GatewayResponse, Option<String>)> {
        let response = self.session.get_gw_version().await?;
        let version = response.gw_version().map(str::to_string);
        match &version {
            Some(version) => {
                info!("Gateway hardware version: {}", version);
                self.publisher.publish("attributes/gw_hw_version", version).await;
            }
            None => warn!("No version in response: {}", response),
        }
        Ok((response, version))
    }
}
