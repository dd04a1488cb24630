use std::sync::Arc;
use crate::config::Settings;
use crate::controllers::{BridgeController, CommandDispatcher};
use crate::monitoring::PositionTracker;
use crate::services::gateway::GatewayConnector;
use crate::services::{BusPublisher, DoorActionExecutor, DoorStatusReader, ErrorClassifier, GatewaySession, MessageSink};
use crate::state_management::{BridgeLifecycle, DoorRegistry};

pub struct AppContext {
    pub settings: Arc<Settings>,
    pub lifecycle: Arc<BridgeLifecycle>,
    pub registry: Arc<DoorRegistry>,
    pub tracker: PositionTracker,
    pub session: Arc<GatewaySession>,
    pub publisher: BusPublisher,
    pub dispatcher: Arc<CommandDispatcher>,
    pub bridge: Arc<BridgeController>,
}

/// Wires the bridge components around a gateway connector and a bus sink.
pub fn initialize(
    settings: Arc<Settings>,
    connector: Arc<dyn GatewayConnector>,
    sink: Arc<dyn MessageSink>,
) -> AppContext {
    let lifecycle = Arc::new(BridgeLifecycle::new());
    let registry = Arc::new(DoorRegistry::from_ports(&settings.doors.ports));
    let publisher = BusPublisher::new(sink, settings.mqtt.topic_base.clone());

    let session = Arc::new(GatewaySession::new(
        connector,
        settings.gateway.clone(),
        Arc::clone(&lifecycle),
    ));
    let classifier = Arc::new(ErrorClassifier::new(Arc::clone(&session), publisher.clone()));
    let reader = Arc::new(DoorStatusReader::new(
        Arc::clone(&session),
        publisher.clone(),
        &settings.gateway,
    ));
    let tracker = PositionTracker::new(
        Arc::clone(&registry),
        Arc::clone(&reader),
        Arc::clone(&classifier),
        publisher.clone(),
        settings.doors.clone(),
    );
    let executor = Arc::new(DoorActionExecutor::new(
        Arc::clone(&session),
        Arc::clone(&registry),
        Arc::clone(&classifier),
        tracker.clone(),
    ));
    let dispatcher = Arc::new(CommandDispatcher::new(
        Arc::clone(&session),
        publisher.clone(),
        classifier,
        Arc::clone(&reader),
        executor,
        Arc::clone(&lifecycle),
    ));
    let bridge = Arc::new(BridgeController::new(
        Arc::clone(&settings),
        publisher.clone(),
        Arc::clone(&session),
        reader,
        Arc::clone(&dispatcher),
        Arc::clone(&registry),
    ));

    AppContext {
        settings,
        lifecycle,
        registry,
        tracker,
        session,
        publisher,
        dispatcher,
        bridge,
    }
}
