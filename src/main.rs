use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use tracing::{error, info, warn};
use tokio::signal::ctrl_c;
use bisecur2mqtt::config::Settings;
use bisecur2mqtt::errors::FATAL_EXIT_CODE;
use bisecur2mqtt::init;
use bisecur2mqtt::services::gateway::McpConnector;
use bisecur2mqtt::services::mqtt;
use bisecur2mqtt::services::MqttSink;
use bisecur2mqtt::utils::logging;

/// Time given to the MQTT event loop to flush the last messages on shutdown.
const MQTT_FLUSH_TIMEOUT: Duration = Duration::from_secs(3);

/// The main entry point of the bisecur2mqtt bridge
#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Application error: {}", e);
            std::process::exit(1);
        }
    }
}

/// The core logic of the bridge
///
/// 1. Loads the settings and initializes logging
/// 2. Connects to the MQTT broker and wires the bridge components
/// 3. Logs in to the gateway and publishes the status of every door
/// 4. Handles bus events until ctrl-c or a fatal error requests shutdown
/// 5. Marks the doors offline, stops tracking and releases the gateway session
///
/// # Returns
///
/// * `Ok(exit_code)`: 0 after a clean shutdown, 2 if the gateway addressing is missing or the login fails
/// * `Err(anyhow::Error)` if any other error occurs during startup
async fn run() -> Result<i32> {
    let settings = Arc::new(Settings::new()?);
    let _guard = logging::init_logger(settings.logging.path.clone(), settings.logging.level.as_deref())?;
    info!("Starting bisecur2mqtt {}", env!("CARGO_PKG_VERSION"));
    info!("Gateway: {}", settings.gateway);

    let (client, mut events, mqtt_task) = mqtt::connect(&settings)?;
    let connector = Arc::new(McpConnector::new(Duration::from_millis(settings.gateway.timeout_ms)));
    let context = init::initialize(Arc::clone(&settings), connector, Arc::new(MqttSink::new(client)));

    if let Err(e) = context.bridge.start().await {
        error!("Gateway startup failed: {}", e);
        if e.is_fatal() {
            return Ok(FATAL_EXIT_CODE);
        }
        return Err(e.into());
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => context.bridge.handle_event(event).await,
                None => {
                    warn!("MQTT event loop ended");
                    break;
                }
            },
            _ = context.lifecycle.wait_for_shutdown() => break,
            _ = ctrl_c() => {
                info!("Received shutdown signal. Shutting down gracefully...");
                context.lifecycle.trigger_shutdown(0);
                break;
            }
        }
    }

    context.bridge.shutdown().await;
    if tokio::time::timeout(MQTT_FLUSH_TIMEOUT, mqtt_task).await.is_err() {
        warn!("MQTT event loop did not stop within {:?}", MQTT_FLUSH_TIMEOUT);
    }
    Ok(context.lifecycle.exit_code())
}
