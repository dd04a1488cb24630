use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use crate::config::GatewaySettings;
use crate::errors::BridgeError;
use crate::models::{DoorState, GatewayResponse, UNKNOWN_POSITION};
use crate::services::gateway::GatewaySession;
use crate::services::publisher::BusPublisher;

pub fn position_topic(door: u8) -> String {
    format!("garage_door/{}/position", door)
}

pub fn state_topic(door: u8) -> String {
    format!("garage_door/{}/state", door)
}

/// Result of a single status read.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReading {
    /// The gateway's answer, absent if every attempt failed.
    pub response: Option<GatewayResponse>,
    /// Reported position, or [`UNKNOWN_POSITION`].
    pub position: i32,
    /// State implied by the position alone, if it is conclusive.
    pub state: Option<DoorState>,
}

impl StatusReading {
    pub fn failed() -> Self {
        Self { response: None, position: UNKNOWN_POSITION, state: None }
    }
}

/// Reads door positions from the gateway and publishes them.
pub struct DoorStatusReader {
    session: Arc<GatewaySession>,
    publisher: BusPublisher,
    max_retries: u32,
    retry_delay: Duration,
}

impl DoorStatusReader {
    pub fn new(session: Arc<GatewaySession>, publisher: BusPublisher, settings: &GatewaySettings) -> Self {
        Self {
            session,
            publisher,
            max_retries: settings.max_retries,
            retry_delay: settings.retry_delay(),
        }
    }

    /// Queries the position of `door` and publishes it, plus the state when the position is an end stop.
    ///
    /// An error frame counts as a failed request. A failed request is retried while the session reports an
    /// unresolved gateway error, up to the configured number of attempts. A broken connection re-initialises
    /// the session and ends the read.
    pub async fn read_status(&self, door: u8) -> StatusReading {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = self.session.get_transition(door).await.and_then(|response| match response.error_code() {
                Some(error) => Err(BridgeError::ProtocolError { code: error.code, name: error.name.clone() }),
                None => Ok(response),
            });
            match result {
                Ok(response) => return self.report(door, response).await,
                Err(e) => {
                    error!("Status read for door {} failed (attempt {}): {}", door, attempts, e);
                    if e.is_broken_pipe() {
                        error!("Gateway connection broken, restarting the session");
                        match self.session.reinitialize().await {
                            Ok(_) => info!("Gateway session restored, status read for door {} abandoned", door),
                            Err(e) => warn!("Gateway session still down, status read for door {} abandoned: {}", door, e),
                        }
                        break;
                    }
                    if self.session.has_unresolved_error() && attempts < self.max_retries {
                        warn!("Retrying status read for door {} in {:?}", door, self.retry_delay);
                        tokio::time::sleep(self.retry_delay).await;
                        continue;
                    }
                    break;
                }
            }
        }
        StatusReading::failed()
    }

    async fn report(&self, door: u8, response: GatewayResponse) -> StatusReading {
        let position = match response.percent_open() {
            Some(percent) => i32::from(percent),
            None => {
                warn!("No position in status response for door {}: {}", door, response);
                UNKNOWN_POSITION
            }
        };
        let state = DoorState::from_position(position);
        info!("Door {} position {} state {:?}", door, position, state);

        self.publisher.publish(&position_topic(door), position).await;
        if let Some(state) = state {
            self.publisher.publish(&state_topic(door), state).await;
        }
        StatusReading { response: Some(response), position, state }
    }
}
