use std::sync::Arc;
use tracing::{error, warn};
use crate::errors::BridgeError;
use crate::models::{ErrorCodeValue, ErrorRecord, GatewayResponse};
use crate::services::gateway::GatewaySession;
use crate::services::publisher::BusPublisher;

/// Topic (below the topic base) carrying the last normalized error.
pub const ERROR_TOPIC: &str = "send_command/error";

/// Normalizes gateway errors and reports them on the error topic.
///
/// Every classification publishes: the error record as JSON, or an empty payload once things are fine
/// again, so the topic always reflects the last operation.
pub struct ErrorClassifier {
    session: Arc<GatewaySession>,
    publisher: BusPublisher,
}

impl ErrorClassifier {
    pub fn new(session: Arc<GatewaySession>, publisher: BusPublisher) -> Self {
        Self { session, publisher }
    }

    /// Classifies the outcome of the last gateway operation.
    ///
    /// # Returns
    ///
    /// * `Some(ErrorRecord)` if the session has an unresolved error or the response carries an error code
    /// * `None` if the operation succeeded
    pub async fn classify(&self, response: Option<&GatewayResponse>) -> Option<ErrorRecord> {
        let record = self.pending_error(response);
        self.report(record.as_ref()).await;
        record
    }

    /// Classifies an operation that ended without any gateway response.
    ///
    /// Without an unresolved gateway error the record carries the last transport failure of the session.
    pub async fn classify_missing(&self) -> ErrorRecord {
        let record = self.pending_error(None).unwrap_or_else(|| {
            ErrorRecord::unknown(self.session.last_fault().unwrap_or_else(|| "No response".to_string()))
        });
        self.report(Some(&record)).await;
        record
    }

    fn pending_error(&self, response: Option<&GatewayResponse>) -> Option<ErrorRecord> {
        let embedded = response.and_then(|r| r.error_code());
        if self.session.has_unresolved_error() {
            Some(match embedded {
                Some(code) => ErrorRecord::from(code),
                None => ErrorRecord::unknown(
                    response.map(|r| r.to_string()).unwrap_or_else(|| "Unknown error".to_string()),
                ),
            })
        } else {
            embedded.map(ErrorRecord::from)
        }
    }

    async fn report(&self, record: Option<&ErrorRecord>) {
        match record {
            Some(record) => {
                error!("Gateway reported error {:?}: {}", record.code, record.name);
                if record.is_permission_denied() {
                    warn!("Permission denied by the gateway, session will be logged out on shutdown");
                    self.session.mark_logout_on_shutdown();
                }
                self.publish(record).await;
            }
            None => self.publisher.publish(ERROR_TOPIC, "").await,
        }
    }

    /// Reports a failure that prevented an operation from producing a response.
    pub async fn report_fault(&self, fault: &BridgeError) -> ErrorRecord {
        let record = match fault {
            BridgeError::ProtocolError { code, name } => ErrorRecord {
                code: ErrorCodeValue::Code(*code),
                name: name.clone(),
            },
            other => ErrorRecord::unknown(other.to_string()),
        };
        self.publish(&record).await;
        record
    }

    async fn publish(&self, record: &ErrorRecord) {
        match serde_json::to_string(record) {
            Ok(json) => self.publisher.publish(ERROR_TOPIC, json).await,
            Err(e) => error!("Failed to serialize error record {:?}: {}", record, e),
        }
    }
}
