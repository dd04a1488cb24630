pub mod client;
pub mod mcp;
pub mod session;

use async_trait::async_trait;
use crate::config::GatewayAddress;
use crate::errors::BridgeResult;
use crate::models::{GatewayResponse, McpErrorCode};

pub use client::{McpClient, McpConnector};
pub use session::GatewaySession;

/// Request/response contract of an authenticated gateway connection.
///
/// Protocol-level failures come back as `Ok` responses carrying an error code and are remembered in
/// [`last_error`](GatewayClient::last_error); `Err` is reserved for transport and framing faults.
#[async_trait]
pub trait GatewayClient: Send {
    /// Logs in and returns the session token, or `None` if the gateway refused the credentials.
    async fn login(&mut self, user: &str, password: &str) -> BridgeResult<Option<u32>>;

    async fn logout(&mut self) -> BridgeResult<()>;

    /// Queries the current transition (position) of the door behind `port`.
    async fn get_transition(&mut self, port: u8) -> BridgeResult<GatewayResponse>;

    /// Triggers the actuator behind `port`.
    async fn set_state(&mut self, port: u8) -> BridgeResult<GatewayResponse>;

    async fn get_gw_version(&mut self) -> BridgeResult<GatewayResponse>;

    /// Sends a JSON command (JMCP) and returns the gateway's JSON answer.
    async fn jmcp(&mut self, request: &serde_json::Value) -> BridgeResult<GatewayResponse>;

    /// The error code of the last response, if it was an error frame.
    fn last_error(&self) -> Option<McpErrorCode>;
}

/// Opens new gateway connections; used on startup and every time the session is re-initialised.
#[async_trait]
pub trait GatewayConnector: Send + Sync {
    async fn connect(&self, address: &GatewayAddress) -> BridgeResult<Box<dyn GatewayClient>>;
}
