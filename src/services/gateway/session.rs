use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use crate::config::GatewaySettings;
use crate::errors::{BridgeError, BridgeResult, FATAL_EXIT_CODE};
use crate::models::{GatewayResponse, McpErrorCode};
use crate::state_management::BridgeLifecycle;
use super::{GatewayClient, GatewayConnector};

/// The single authenticated gateway session shared by every task.
///
/// All requests go through one async mutex, so at most one request is in flight at a time and a
/// re-initialisation never interleaves with a status read or a door action.
pub struct GatewaySession {
    connector: Arc<dyn GatewayConnector>,
    settings: GatewaySettings,
    client: Mutex<Option<Box<dyn GatewayClient>>>,
    last_error: parking_lot::Mutex<Option<McpErrorCode>>,
    last_fault: parking_lot::Mutex<Option<String>>,
    logout_on_shutdown: AtomicBool,
    lifecycle: Arc<BridgeLifecycle>,
}

impl GatewaySession {
    pub fn new(connector: Arc<dyn GatewayConnector>, settings: GatewaySettings, lifecycle: Arc<BridgeLifecycle>) -> Self {
        Self {
            connector,
            settings,
            client: Mutex::new(None),
            last_error: parking_lot::Mutex::new(None),
            last_fault: parking_lot::Mutex::new(None),
            logout_on_shutdown: AtomicBool::new(false),
            lifecycle,
        }
    }

    /// Opens a connection and logs in, replacing any previous connection.
    ///
    /// On a restart the previous session is logged out first, unless it is in an error state.
    ///
    /// # Returns
    ///
    /// * `Ok(token)` once the gateway accepted the login
    /// * `Err(BridgeError::MissingAddressing)` if the gateway IP or MAC is not configured
    /// * `Err(BridgeError::LoginFailed)` if the gateway did not hand out a token
    pub async fn initialize(&self, is_restart: bool) -> BridgeResult<u32> {
        let mut guard = self.client.lock().await;
        if is_restart {
            if let Some(mut previous) = guard.take() {
                if previous.last_error().is_none() {
                    info!("Logging out of the previous gateway session");
                    if let Err(e) = previous.logout().await {
                        warn!("Logout of the previous gateway session failed: {}", e);
                    }
                }
            }
        }

        let (client, token) = self.open().await?;
        *guard = Some(client);
        Ok(token)
    }

    /// Re-initialises the session after a transport fault.
    ///
    /// A fatal failure (missing addressing, refused login) requests process shutdown with the fatal exit code.
    /// Any other failure leaves the session disconnected; the next request reconnects.
    pub async fn reinitialize(&self) -> BridgeResult<u32> {
        info!("Re-initialising gateway session");
        self.initialize(true).await.map_err(|e| self.escalate(e))
    }

    /// Logs in again on the current connection.
    pub async fn login(&self) -> BridgeResult<Option<u32>> {
        let mut guard = self.client.lock().await;
        let client = self.connected(&mut guard).await?;
        let token = client.login(&self.settings.user, self.settings.password()).await;
        self.remember(&**client, &token);
        token
    }

    pub async fn logout(&self) -> BridgeResult<()> {
        let mut guard = self.client.lock().await;
        let client = guard.as_mut().ok_or(BridgeError::NotConnected)?;
        let result = client.logout().await;
        self.remember(&**client, &result);
        result
    }

    pub async fn get_transition(&self, port: u8) -> BridgeResult<GatewayResponse> {
        let mut guard = self.client.lock().await;
        let client = self.connected(&mut guard).await?;
        let response = client.get_transition(port).await;
        self.remember(&**client, &response);
        response
    }

    pub async fn set_state(&self, port: u8) -> BridgeResult<GatewayResponse> {
        let mut guard = self.client.lock().await;
        let client = self.connected(&mut guard).await?;
        let response = client.set_state(port).await;
        self.remember(&**client, &response);
        response
    }

    pub async fn get_gw_version(&self) -> BridgeResult<GatewayResponse> {
        let mut guard = self.client.lock().await;
        let client = self.connected(&mut guard).await?;
        let response = client.get_gw_version().await;
        self.remember(&**client, &response);
        response
    }

    pub async fn jmcp(&self, request: &serde_json::Value) -> BridgeResult<GatewayResponse> {
        let mut guard = self.client.lock().await;
        let client = self.connected(&mut guard).await?;
        let response = client.jmcp(request).await;
        self.remember(&**client, &response);
        response
    }

    /// Error code of the last gateway response, while it is unresolved.
    pub fn last_error(&self) -> Option<McpErrorCode> {
        self.last_error.lock().clone()
    }

    pub fn has_unresolved_error(&self) -> bool {
        self.last_error.lock().is_some()
    }

    /// Text of the last transport failure, until a request succeeds again.
    pub fn last_fault(&self) -> Option<String> {
        self.last_fault.lock().clone()
    }

    /// Marks the session to be logged out when the bridge shuts down.
    pub fn mark_logout_on_shutdown(&self) {
        self.logout_on_shutdown.store(true, Ordering::SeqCst);
    }

    pub fn logout_on_shutdown(&self) -> bool {
        self.logout_on_shutdown.load(Ordering::SeqCst)
            || self.last_error().is_some_and(|e| e.is_permission_denied())
    }

    /// Releases the gateway session on shutdown if it was marked for logout.
    pub async fn shutdown(&self) {
        if !self.logout_on_shutdown() {
            return;
        }
        info!("Logging out of the gateway");
        if let Err(e) = self.logout().await {
            warn!("Gateway logout failed: {}", e);
        }
    }

    async fn open(&self) -> BridgeResult<(Box<dyn GatewayClient>, u32)> {
        let address = self.settings.address()?;
        let mut client = self.connector.connect(&address).await?;
        let token = client.login(&self.settings.user, self.settings.password()).await?;
        *self.last_error.lock() = client.last_error();
        let token = token.ok_or_else(|| BridgeError::LoginFailed(self.settings.user.clone()))?;
        info!("Logged in to gateway {} as '{}'", address.ip, self.settings.user);
        Ok((client, token))
    }

    /// The current client, reconnecting first if an earlier re-initialisation left the session without one.
    async fn connected<'a>(
        &self,
        slot: &'a mut Option<Box<dyn GatewayClient>>,
    ) -> BridgeResult<&'a mut Box<dyn GatewayClient>> {
        if slot.is_none() {
            warn!("No gateway connection, reconnecting");
            let (client, _) = self.open().await.map_err(|e| self.escalate(e))?;
            *slot = Some(client);
        }
        slot.as_mut().ok_or(BridgeError::NotConnected)
    }

    fn escalate(&self, e: BridgeError) -> BridgeError {
        error!("Gateway session re-initialisation failed: {}", e);
        *self.last_fault.lock() = Some(e.to_string());
        if e.is_fatal() {
            self.lifecycle.trigger_shutdown(FATAL_EXIT_CODE);
        }
        e
    }

    fn remember<T>(&self, client: &dyn GatewayClient, result: &BridgeResult<T>) {
        *self.last_error.lock() = client.last_error();
        *self.last_fault.lock() = result.as_ref().err().map(|e| e.to_string());
    }
}
