//! # Door State Representation

//! This module defines the discrete states a door can be reported in, the last-known record kept for every door,
//! and the two mappings from raw positions to states: the absolute one used by a single status read and the
//! relative one used while a door is being tracked.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Sentinel position published when the gateway did not report one.
pub const UNKNOWN_POSITION: i32 = -1;

/// Position of a fully open door.
pub const FULLY_OPEN: i32 = 100;

/// Position of a fully closed door.
pub const FULLY_CLOSED: i32 = 0;

/// Represents the discrete states a door can be reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoorState {
    #[display("open")]
    Open,
    #[display("closed")]
    Closed,
    #[display("opening")]
    Opening,
    #[display("closing")]
    Closing,
    #[display("unknown")]
    Unknown,
    /// Nothing has been observed yet.
    #[default]
    #[display("")]
    Unset,
}

impl DoorState {
    /// Maps a single position reading to a discrete state.
    ///
    /// Only the end stops are conclusive: 0 is `Closed`, 100 is `Open`. Anything else means the door is
    /// somewhere in its travel and a single reading cannot tell the direction.
    pub fn from_position(position: i32) -> Option<DoorState> {
        match position {
            FULLY_CLOSED => Some(DoorState::Closed),
            FULLY_OPEN => Some(DoorState::Open),
            _ => None,
        }
    }

    /// Derives the state of a moving door by comparing two consecutive readings.
    ///
    /// Movement wins over the end stops; an unchanged position at an end stop is `Open`/`Closed`,
    /// an unchanged position anywhere else is `Unknown`.
    pub fn from_movement(previous: i32, current: i32) -> DoorState {
        if current < previous {
            DoorState::Closing
        } else if current > previous {
            DoorState::Opening
        } else if current == FULLY_OPEN {
            DoorState::Open
        } else if current == FULLY_CLOSED {
            DoorState::Closed
        } else {
            DoorState::Unknown
        }
    }
}

/// The last-known observation of a single door.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoorRecord {
    /// Gateway port of the door.
    pub port: u8,
    /// Last reported position, or [`UNKNOWN_POSITION`].
    pub last_position: i32,
    /// Last derived state.
    pub last_state: DoorState,
}

impl DoorRecord {
    pub fn new(port: u8) -> Self {
        Self {
            port,
            last_position: UNKNOWN_POSITION,
            last_state: DoorState::Unset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_stops_map_to_discrete_states() {
        assert_eq!(DoorState::from_position(0), Some(DoorState::Closed));
        assert_eq!(DoorState::from_position(100), Some(DoorState::Open));
        for position in 1..100 {
            assert_eq!(DoorState::from_position(position), None, "position {}", position);
        }
        assert_eq!(DoorState::from_position(UNKNOWN_POSITION), None);
    }

    #[test]
    fn movement_is_derived_from_consecutive_readings() {
        assert_eq!(DoorState::from_movement(40, 60), DoorState::Opening);
        assert_eq!(DoorState::from_movement(60, 100), DoorState::Opening);
        assert_eq!(DoorState::from_movement(60, 0), DoorState::Closing);
        assert_eq!(DoorState::from_movement(100, 100), DoorState::Open);
        assert_eq!(DoorState::from_movement(0, 0), DoorState::Closed);
        assert_eq!(DoorState::from_movement(45, 45), DoorState::Unknown);
    }

    #[test]
    fn states_display_as_bus_payloads() {
        assert_eq!(DoorState::Opening.to_string(), "opening");
        assert_eq!(DoorState::Closed.to_string(), "closed");
        assert_eq!(DoorState::Unset.to_string(), "");
    }
}
