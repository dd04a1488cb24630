//! # Gateway Responses
//!
//! The gateway answers every request with a frame whose payload may or may not carry the fields a caller is
//! interested in. `GatewayResponse` keeps that shape explicit: every level is optional and callers ask for
//! `percent_open()` or `error_code()` instead of probing for fields.

use std::fmt;
use serde::Serialize;

/// MCP error code reported when the user lacks the permission for a request.
pub const PERMISSION_DENIED: u8 = 12;

/// An error code embedded in a gateway response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct McpErrorCode {
    pub code: u8,
    pub name: String,
}

impl McpErrorCode {
    /// Builds an error code, resolving its symbolic name.
    pub fn new(code: u8) -> Self {
        Self { code, name: error_name(code).to_string() }
    }

    pub fn is_permission_denied(&self) -> bool {
        self.code == PERMISSION_DENIED
    }
}

impl fmt::Display for McpErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.code)
    }
}

/// Symbolic names of the MCP error codes.
pub fn error_name(code: u8) -> &'static str {
    match code {
        0 => "COMMAND_NOT_FOUND",
        1 => "INVALID_PASSWORD",
        2 => "LOGIN_FAILED",
        3 => "USER_NOT_FOUND",
        4 => "ADDRESS_NOT_FOUND",
        5 => "PORT_NOT_FOUND",
        6 => "GROUP_NOT_FOUND",
        7 => "PAYLOAD_TOO_SHORT",
        8 => "OUT_OF_MEMORY",
        9 => "INVALID_VALUE",
        10 => "TIMEOUT",
        11 => "PORT_NOT_OWNED_BY_USER",
        PERMISSION_DENIED => "PERMISSION_DENIED",
        13 => "HM_TIMEOUT",
        _ => "UNKNOWN_ERROR",
    }
}

/// The command-specific part of a response payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandData {
    /// Door opening percentage reported by a transition query.
    pub percent_open: Option<u8>,
    /// Error code carried by an error frame.
    pub error_code: Option<McpErrorCode>,
    /// Hardware version reported by the gateway.
    pub gw_version: Option<String>,
    /// Session token handed out by a login.
    pub token: Option<u32>,
    /// JSON document returned by a JMCP request.
    pub json: Option<serde_json::Value>,
}

/// The decoded payload of a response frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponsePayload {
    /// Command id of the response, without the response flag.
    pub command_id: u8,
    pub command: Option<CommandData>,
}

/// A response received from the gateway.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GatewayResponse {
    pub payload: Option<ResponsePayload>,
}

impl GatewayResponse {
    pub fn new(command_id: u8, command: CommandData) -> Self {
        Self {
            payload: Some(ResponsePayload { command_id, command: Some(command) }),
        }
    }

    /// A response carrying an error frame.
    pub fn error(command_id: u8, code: u8) -> Self {
        Self::new(command_id, CommandData { error_code: Some(McpErrorCode::new(code)), ..CommandData::default() })
    }

    fn command(&self) -> Option<&CommandData> {
        self.payload.as_ref().and_then(|p| p.command.as_ref())
    }

    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    pub fn percent_open(&self) -> Option<u8> {
        self.command().and_then(|c| c.percent_open)
    }

    pub fn error_code(&self) -> Option<&McpErrorCode> {
        self.command().and_then(|c| c.error_code.as_ref())
    }

    pub fn gw_version(&self) -> Option<&str> {
        self.command().and_then(|c| c.gw_version.as_deref())
    }

    pub fn token(&self) -> Option<u32> {
        self.command().and_then(|c| c.token)
    }

    pub fn json(&self) -> Option<&serde_json::Value> {
        self.command().and_then(|c| c.json.as_ref())
    }
}

impl fmt::Display for GatewayResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(payload) = &self.payload else {
            return f.write_str("<empty response>");
        };
        write!(f, "command={}", payload.command_id)?;
        if let Some(error) = self.error_code() {
            write!(f, " error={}", error)?;
        }
        if let Some(position) = self.percent_open() {
            write!(f, " percent_open={}", position)?;
        }
        if let Some(version) = self.gw_version() {
            write!(f, " gw_version={}", version)?;
        }
        if let Some(json) = self.json() {
            write!(f, " json={}", json)?;
        }
        Ok(())
    }
}

/// The code of a normalized error record: the gateway's number, or `"Unknown"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ErrorCodeValue {
    Unknown,
    #[serde(untagged)]
    Code(u8),
}

/// A normalized error, published as `{"error_code": .., "error": ..}` on the error topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    #[serde(rename = "error_code")]
    pub code: ErrorCodeValue,
    #[serde(rename = "error")]
    pub name: String,
}

impl ErrorRecord {
    pub fn unknown(name: impl Into<String>) -> Self {
        Self { code: ErrorCodeValue::Unknown, name: name.into() }
    }

    pub fn is_permission_denied(&self) -> bool {
        self.code == ErrorCodeValue::Code(PERMISSION_DENIED)
    }
}

impl From<&McpErrorCode> for ErrorRecord {
    fn from(error: &McpErrorCode) -> Self {
        Self { code: ErrorCodeValue::Code(error.code), name: error.name.clone() }
    }
}
