use std::time::Duration;
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use crate::config::GatewayAddress;
use crate::errors::{BridgeError, BridgeResult};
use crate::models::{GatewayResponse, McpErrorCode};
use super::mcp::{self, Frame, Package};
use super::{GatewayClient, GatewayConnector};

/// MCP client over a single TCP connection to the gateway.
pub struct McpClient {
    stream: TcpStream,
    src_mac: [u8; 6],
    dst_mac: [u8; 6],
    tag: u8,
    token: Option<u32>,
    last_error: Option<McpErrorCode>,
    timeout: Duration,
}

impl McpClient {
    pub async fn connect(address: &GatewayAddress, request_timeout: Duration) -> BridgeResult<Self> {
        let src_mac = mcp::parse_mac(&address.src_mac)?;
        let dst_mac = mcp::parse_mac(&address.mac)?;
        info!("Connecting to gateway {}:{} ({})", address.ip, address.port, address.mac);
        let stream = timeout(request_timeout, TcpStream::connect((address.ip.as_str(), address.port)))
            .await
            .map_err(|_| BridgeError::Timeout(request_timeout.as_millis() as u64))??;
        Ok(Self { stream, src_mac, dst_mac, tag: 0, token: None, last_error: None, timeout: request_timeout })
    }

    /// Sends one request and waits for its response, remembering an embedded error code.
    async fn request(&mut self, command_id: u8, payload: Vec<u8>) -> BridgeResult<GatewayResponse> {
        self.tag = self.tag.wrapping_add(1);
        let frame = Frame {
            src_mac: self.src_mac,
            dst_mac: self.dst_mac,
            package: Package::request(self.tag, self.token.unwrap_or(0), command_id, payload),
        };
        let limit = self.timeout;
        let reply = timeout(limit, self.exchange(frame.encode(), self.tag))
            .await
            .map_err(|_| BridgeError::Timeout(limit.as_millis() as u64))??;

        let response = mcp::decode_response(command_id, &reply.package)?;
        self.last_error = response.error_code().cloned();
        if let Some(error) = &self.last_error {
            warn!("Gateway answered command {:#04x} with error {}", command_id, error);
        }
        Ok(response)
    }

    /// Writes `request` and reads frames until the one answering `tag` arrives.
    ///
    /// Replies to earlier requests that timed out are still queued on the socket; they are skipped.
    async fn exchange(&mut self, request: String, tag: u8) -> BridgeResult<Frame> {
        debug!("---> MCP {}", request);
        self.stream.write_all(request.as_bytes()).await?;

        loop {
            let reply = self.read_frame().await?;
            if reply.package.tag == tag {
                return Ok(reply);
            }
            warn!("Discarding stale gateway reply with tag {} (waiting for {})", reply.package.tag, tag);
        }
    }

    async fn read_frame(&mut self) -> BridgeResult<Frame> {
        let mut header = vec![0u8; mcp::HEADER_HEX_LEN];
        self.stream.read_exact(&mut header).await?;
        let header = String::from_utf8(header)
            .map_err(|e| BridgeError::DecodeError(format!("non-ASCII frame header: {}", e)))?;
        let total = mcp::frame_len(&header)
            .ok_or_else(|| BridgeError::DecodeError(format!("unreadable frame header {:?}", header)))?;
        if total < header.len() {
            return Err(BridgeError::DecodeError(format!("frame length {} shorter than its header", total)));
        }

        let mut rest = vec![0u8; total - header.len()];
        self.stream.read_exact(&mut rest).await?;
        let mut text = header;
        text.push_str(&String::from_utf8_lossy(&rest));
        debug!("<--- MCP {}", text);
        Frame::decode(&text)
    }
}

#[async_trait]
impl GatewayClient for McpClient {
    async fn login(&mut self, user: &str, password: &str) -> BridgeResult<Option<u32>> {
        self.token = None;
        let response = self.request(mcp::LOGIN, mcp::login_payload(user, password)).await?;
        self.token = response.token();
        Ok(self.token)
    }

    async fn logout(&mut self) -> BridgeResult<()> {
        self.request(mcp::LOGOUT, Vec::new()).await?;
        self.token = None;
        Ok(())
    }

    async fn get_transition(&mut self, port: u8) -> BridgeResult<GatewayResponse> {
        self.request(mcp::HM_GET_TRANSITION, vec![port]).await
    }

    async fn set_state(&mut self, port: u8) -> BridgeResult<GatewayResponse> {
        self.request(mcp::SET_STATE, vec![port, mcp::SET_STATE_TRIGGER]).await
    }

    async fn get_gw_version(&mut self) -> BridgeResult<GatewayResponse> {
        self.request(mcp::GET_GW_VERSION, Vec::new()).await
    }

    async fn jmcp(&mut self, request: &serde_json::Value) -> BridgeResult<GatewayResponse> {
        self.request(mcp::JMCP, serde_json::to_vec(request)?).await
    }

    fn last_error(&self) -> Option<McpErrorCode> {
        self.last_error.clone()
    }
}

/// Opens [`McpClient`] connections with a fixed request timeout.
pub struct McpConnector {
    timeout: Duration,
}

impl McpConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl GatewayConnector for McpConnector {
    async fn connect(&self, address: &GatewayAddress) -> BridgeResult<Box<dyn GatewayClient>> {
        Ok(Box::new(McpClient::connect(address, self.timeout).await?))
    }
}
