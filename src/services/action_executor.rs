use std::sync::Arc;
use tracing::{debug, error, info, warn};
use crate::models::{Action, DoorState, GatewayResponse, UNKNOWN_POSITION};
use crate::monitoring::PositionTracker;
use crate::services::error_classifier::ErrorClassifier;
use crate::services::gateway::GatewaySession;
use crate::state_management::DoorRegistry;

/// Result of a door action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// The gateway accepted the request; tracking was restarted unless the response carried an error.
    Submitted(GatewayResponse),
    /// The action was not sent to the gateway.
    Refused(String),
    /// The request failed without a response.
    Failed,
}

/// Sends door actions to the gateway and hands the door over to position tracking.
pub struct DoorActionExecutor {
    session: Arc<GatewaySession>,
    registry: Arc<DoorRegistry>,
    classifier: Arc<ErrorClassifier>,
    tracker: PositionTracker,
}

impl DoorActionExecutor {
    pub fn new(
        session: Arc<GatewaySession>,
        registry: Arc<DoorRegistry>,
        classifier: Arc<ErrorClassifier>,
        tracker: PositionTracker,
    ) -> Self {
        Self { session, registry, classifier, tracker }
    }

    /// Executes a motion action on `door`.
    ///
    /// `stop` is resolved against the last derived state: a door that is opening is sent down, a door that is
    /// closing is sent up, and a door with no known direction is left alone.
    pub async fn execute(&self, action: Action, door: u8) -> ActionOutcome {
        let action = match action {
            Action::Stop => match self.resolve_stop(door) {
                Ok(action) => action,
                Err(message) => {
                    warn!("{}", message);
                    return ActionOutcome::Refused(message);
                }
            },
            other => other,
        };
        if !action.is_motion() {
            error!("Action '{}' cannot be sent to door {}", action, door);
            return ActionOutcome::Failed;
        }

        info!("Sending '{}' to door {}", action, door);
        match self.session.set_state(door).await {
            Ok(response) => {
                if self.classifier.classify(Some(&response)).await.is_none() {
                    let position = response.percent_open().map(i32::from).unwrap_or(UNKNOWN_POSITION);
                    if let Some(previous) = self.tracker.supersede(door, position, action).await {
                        debug!("Previous tracking of door {} ended: {:?}", door, previous);
                    }
                }
                ActionOutcome::Submitted(response)
            }
            Err(e) => {
                error!("Action '{}' on door {} failed: {}", action, door, e);
                if e.is_broken_pipe() {
                    error!("Gateway connection broken, restarting the session");
                    match self.session.reinitialize().await {
                        Ok(_) => info!("Gateway session restored after failed action on door {}", door),
                        Err(e) => warn!("Gateway session still down after failed action on door {}: {}", door, e),
                    }
                }
                ActionOutcome::Failed
            }
        }
    }

    fn resolve_stop(&self, door: u8) -> Result<Action, String> {
        match self.registry.last_state(door) {
            DoorState::Opening => Ok(Action::Down),
            DoorState::Closing => Ok(Action::Up),
            other => Err(format!(
                "Ignoring 'stop' command as current door movement direction unknown (last state is '{}')",
                other
            )),
        }
    }
}
