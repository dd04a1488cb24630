//! # Bus Commands

//! Commands arrive on the bus as `{action}_{door}` tokens, e.g. `up_0` or `get_door_state_1`.
//! This module splits such a token into a [`Command`] and normalizes the action word into the fixed [`Action`]
//! vocabulary. Membership is an exact match against the vocabulary, aliases included.

use std::fmt;
use std::str::FromStr;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static COMMAND_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-zA-Z][a-zA-Z_]*)_(\d+)$").expect("command pattern is valid")
});

/// The normalized command vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Up,
    Down,
    Stop,
    Impulse,
    Partial,
    Light,
    GetDoorState,
    GetDoorPosition,
    GetPorts,
    GetVersion,
    Login,
    SysRestart,
}

impl Action {
    /// Every token accepted from the bus, aliases included.
    pub const ACCEPTED_TOKENS: [&'static str; 16] = [
        "up", "down", "open", "close", "stop", "impulse", "partial", "light",
        "get_door_state", "get_door_position", "get_ports", "get_version", "get_gw_version",
        "login", "sys_restart", "init_bisecur_gw",
    ];

    /// Actions that move the door and are therefore followed by position tracking.
    pub fn is_motion(&self) -> bool {
        matches!(
            self,
            Action::Up | Action::Down | Action::Stop | Action::Impulse | Action::Partial | Action::Light
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Up => "up",
            Action::Down => "down",
            Action::Stop => "stop",
            Action::Impulse => "impulse",
            Action::Partial => "partial",
            Action::Light => "light",
            Action::GetDoorState => "get_door_state",
            Action::GetDoorPosition => "get_door_position",
            Action::GetPorts => "get_ports",
            Action::GetVersion => "get_version",
            Action::Login => "login",
            Action::SysRestart => "sys_restart",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a token is not part of the vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAction(pub String);

impl fmt::Display for UnknownAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command '{}' is not recognised", self.0)
    }
}

impl FromStr for Action {
    type Err = UnknownAction;

    /// Parses a trimmed, case-insensitive token, applying the `open`/`close`/`get_gw_version`/`init_bisecur_gw` aliases.
    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let token = token.trim().to_lowercase();
        let action = match token.as_str() {
            "up" | "open" => Action::Up,
            "down" | "close" => Action::Down,
            "stop" => Action::Stop,
            "impulse" => Action::Impulse,
            "partial" => Action::Partial,
            "light" => Action::Light,
            "get_door_state" => Action::GetDoorState,
            "get_door_position" => Action::GetDoorPosition,
            "get_ports" => Action::GetPorts,
            "get_version" | "get_gw_version" => Action::GetVersion,
            "login" => Action::Login,
            "sys_restart" | "init_bisecur_gw" => Action::SysRestart,
            _ => return Err(UnknownAction(token)),
        };
        Ok(action)
    }
}

/// A raw command token addressed to one door.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// The action word as received, before normalization.
    pub token: String,
    /// The door the command targets.
    pub door: u8,
}

impl Command {
    pub fn new(token: impl Into<String>, door: u8) -> Self {
        Self { token: token.into(), door }
    }

    /// Parses a bus payload of the form `{action}_{door}`.
    ///
    /// The action may itself contain underscores (`get_door_state_1`); the door is the trailing number.
    /// Returns `None` for payloads that do not have this shape or whose door does not fit a port id.
    pub fn parse(payload: &str) -> Option<Command> {
        let captures = COMMAND_PATTERN.captures(payload.trim())?;
        let door = captures[2].parse::<u8>().ok()?;
        Some(Command::new(&captures[1], door))
    }
}
