//! # MCP Framing
//!
//! The gateway speaks MCP over TCP. Every message is a transport container rendered as upper-case ASCII hex:
//!
//! ```text
//! source MAC (6) | destination MAC (6) | package | container checksum (1)
//! package = length (2, BE) | tag (1) | token (4, BE) | command (1) | payload | package checksum (1)
//! ```
//!
//! The package checksum is the byte sum of the package, the container checksum is the sum of the ASCII hex
//! characters preceding it. Responses carry the request's command id with the high bit set.

use crate::errors::{BridgeError, BridgeResult};
use crate::models::{CommandData, GatewayResponse};

pub const ERROR: u8 = 0x01;
pub const GET_GW_VERSION: u8 = 0x04;
pub const JMCP: u8 = 0x06;
pub const LOGIN: u8 = 0x10;
pub const LOGOUT: u8 = 0x11;
pub const SET_STATE: u8 = 0x33;
pub const HM_GET_TRANSITION: u8 = 0x70;

pub const RESPONSE_FLAG: u8 = 0x80;

/// Value sent with `SET_STATE` to trigger a port.
pub const SET_STATE_TRIGGER: u8 = 0xFF;

/// Bytes of a package that are not payload: length, tag, token, command, checksum.
const PACKAGE_OVERHEAD: usize = 9;
const MAC_LEN: usize = 6;
/// Hex characters before the package length field.
const ADDRESS_HEX_LEN: usize = MAC_LEN * 2 * 2;
/// Hex characters needed to know the full frame length.
pub const HEADER_HEX_LEN: usize = ADDRESS_HEX_LEN + 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub tag: u8,
    pub token: u32,
    pub command_id: u8,
    pub is_response: bool,
    pub payload: Vec<u8>,
}

impl Package {
    pub fn request(tag: u8, token: u32, command_id: u8, payload: Vec<u8>) -> Self {
        Self { tag, token, command_id, is_response: false, payload }
    }

    pub fn encode(&self) -> Vec<u8> {
        let length = (PACKAGE_OVERHEAD + self.payload.len()) as u16;
        let mut bytes = Vec::with_capacity(length as usize);
        bytes.extend_from_slice(&length.to_be_bytes());
        bytes.push(self.tag);
        bytes.extend_from_slice(&self.token.to_be_bytes());
        bytes.push(if self.is_response { self.command_id | RESPONSE_FLAG } else { self.command_id });
        bytes.extend_from_slice(&self.payload);
        bytes.push(checksum(&bytes));
        bytes
    }

    pub fn decode(bytes: &[u8]) -> BridgeResult<Self> {
        if bytes.len() < PACKAGE_OVERHEAD {
            return Err(BridgeError::DecodeError(format!("package too short: {} bytes", bytes.len())));
        }
        let length = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
        if length != bytes.len() {
            return Err(BridgeError::DecodeError(format!(
                "package length {} does not match {} received bytes", length, bytes.len()
            )));
        }
        let (body, expected) = bytes.split_at(bytes.len() - 1);
        if checksum(body) != expected[0] {
            return Err(BridgeError::DecodeError("package checksum mismatch".to_string()));
        }
        let command = body[7];
        Ok(Self {
            tag: body[2],
            token: u32::from_be_bytes([body[3], body[4], body[5], body[6]]),
            command_id: command & !RESPONSE_FLAG,
            is_response: command & RESPONSE_FLAG != 0,
            payload: body[8..].to_vec(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub src_mac: [u8; MAC_LEN],
    pub dst_mac: [u8; MAC_LEN],
    pub package: Package,
}

impl Frame {
    /// Renders the frame as the ASCII hex text sent on the wire.
    pub fn encode(&self) -> String {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.src_mac);
        bytes.extend_from_slice(&self.dst_mac);
        bytes.extend_from_slice(&self.package.encode());
        let mut text = hex::encode_upper(bytes);
        let sum = checksum(text.as_bytes());
        text.push_str(&format!("{:02X}", sum));
        text
    }

    pub fn decode(text: &str) -> BridgeResult<Self> {
        let total = frame_len(text)
            .ok_or_else(|| BridgeError::DecodeError(format!("frame header incomplete: {:?}", text)))?;
        if text.len() != total {
            return Err(BridgeError::DecodeError(format!("expected {} characters, got {}", total, text.len())));
        }
        let (body, sum) = text.split_at(total - 2);
        let expected = u8::from_str_radix(sum, 16)
            .map_err(|e| BridgeError::DecodeError(format!("invalid frame checksum '{}': {}", sum, e)))?;
        if checksum(body.as_bytes()) != expected {
            return Err(BridgeError::DecodeError("frame checksum mismatch".to_string()));
        }
        let bytes = hex::decode(body).map_err(|e| BridgeError::DecodeError(e.to_string()))?;
        let (addresses, package) = bytes.split_at(MAC_LEN * 2);
        let mut src_mac = [0u8; MAC_LEN];
        let mut dst_mac = [0u8; MAC_LEN];
        src_mac.copy_from_slice(&addresses[..MAC_LEN]);
        dst_mac.copy_from_slice(&addresses[MAC_LEN..]);
        Ok(Self { src_mac, dst_mac, package: Package::decode(package)? })
    }
}

/// Total number of hex characters of the frame starting with `header`, once the length field is readable.
pub fn frame_len(header: &str) -> Option<usize> {
    let length_hex = header.get(ADDRESS_HEX_LEN..HEADER_HEX_LEN)?;
    let package_len = usize::from_str_radix(length_hex, 16).ok()?;
    Some(ADDRESS_HEX_LEN + package_len * 2 + 2)
}

/// Parses a bare hex MAC address (`5410EC001122`).
pub fn parse_mac(mac: &str) -> BridgeResult<[u8; MAC_LEN]> {
    let bytes = hex::decode(mac)
        .map_err(|e| BridgeError::ConfigError(format!("invalid MAC address '{}': {}", mac, e)))?;
    bytes.try_into()
        .map_err(|_| BridgeError::ConfigError(format!("MAC address '{}' must have 6 bytes", mac)))
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// `LOGIN` payload: user name length, user name, password.
pub fn login_payload(user: &str, password: &str) -> Vec<u8> {
    let mut payload = Vec::with_capacity(1 + user.len() + password.len());
    payload.push(user.len() as u8);
    payload.extend_from_slice(user.as_bytes());
    payload.extend_from_slice(password.as_bytes());
    payload
}

/// Interprets a response package for the request that was sent with `request_id`.
pub fn decode_response(request_id: u8, package: &Package) -> BridgeResult<GatewayResponse> {
    let payload = &package.payload;
    if package.command_id == ERROR {
        let code = *payload.first()
            .ok_or_else(|| BridgeError::DecodeError("error frame without error code".to_string()))?;
        return Ok(GatewayResponse::error(ERROR, code));
    }
    if package.command_id != request_id {
        return Err(BridgeError::DecodeError(format!(
            "response command {:#04x} does not answer request {:#04x}", package.command_id, request_id
        )));
    }
    let data = match request_id {
        LOGIN => CommandData {
            token: payload.get(1..5).map(|t| u32::from_be_bytes([t[0], t[1], t[2], t[3]])),
            ..CommandData::default()
        },
        HM_GET_TRANSITION => CommandData {
            percent_open: payload.get(1).map(|p| (*p).min(100)),
            ..CommandData::default()
        },
        GET_GW_VERSION => CommandData {
            gw_version: Some(String::from_utf8_lossy(payload).trim_matches(char::from(0)).trim().to_string()),
            ..CommandData::default()
        },
        JMCP => CommandData {
            json: Some(serde_json::from_slice(payload)
                .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(payload).into_owned()))),
            ..CommandData::default()
        },
        _ => CommandData::default(),
    };
    Ok(GatewayResponse::new(package.command_id, data))
}
