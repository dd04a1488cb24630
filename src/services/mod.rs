pub mod action_executor;
pub mod discovery;
pub mod error_classifier;
pub mod gateway;
pub mod mqtt;
pub mod publisher;
pub mod status_reader;

pub use action_executor::{ActionOutcome, DoorActionExecutor};
pub use error_classifier::ErrorClassifier;
pub use gateway::GatewaySession;
pub use publisher::{BusPublisher, MessageSink, MqttSink};
pub use status_reader::{DoorStatusReader, StatusReading};
