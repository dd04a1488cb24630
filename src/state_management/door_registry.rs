use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use dashmap::DashMap;
use tracing::debug;
use crate::models::{DoorRecord, DoorState};
use crate::monitoring::TrackingSession;

/// Everything the bridge keeps for one door.
///
/// Every tracking task is started under a new generation. Writes from a task whose generation is no longer
/// current are dropped, so a superseded task that outlives its wait cannot overwrite the new one's record.
pub struct DoorSlot {
    record: parking_lot::Mutex<DoorRecord>,
    generation: AtomicU64,
    /// Tracking task currently attached to the door.
    pub(crate) monitor: tokio::sync::Mutex<Option<TrackingSession>>,
}

impl DoorSlot {
    fn new(port: u8) -> Self {
        Self {
            record: parking_lot::Mutex::new(DoorRecord::new(port)),
            generation: AtomicU64::new(0),
            monitor: tokio::sync::Mutex::new(None),
        }
    }

    /// Whether `generation` is still the generation of the door's latest tracking task.
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }
}

/// Per-door records and tracking slots, keyed by gateway port.
pub struct DoorRegistry {
    doors: DashMap<u8, Arc<DoorSlot>>,
}

impl Default for DoorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DoorRegistry {
    pub fn new() -> Self {
        Self { doors: DashMap::new() }
    }

    pub fn from_ports(ports: &[u8]) -> Self {
        let registry = Self::new();
        for port in ports {
            registry.slot(*port);
        }
        registry
    }

    /// The slot of `port`, created on first use.
    pub fn slot(&self, port: u8) -> Arc<DoorSlot> {
        self.doors
            .entry(port)
            .or_insert_with(|| Arc::new(DoorSlot::new(port)))
            .clone()
    }

    pub fn get(&self, port: u8) -> DoorRecord {
        *self.slot(port).record.lock()
    }

    pub fn last_state(&self, port: u8) -> DoorState {
        self.get(port).last_state
    }

    pub fn ports(&self) -> Vec<u8> {
        let mut ports: Vec<u8> = self.doors.iter().map(|entry| *entry.key()).collect();
        ports.sort_unstable();
        ports
    }

    /// Starts a new generation for `port`, invalidating writes of earlier tracking tasks.
    pub fn next_generation(&self, port: u8) -> u64 {
        self.slot(port).generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Stores a position and state observed by the tracking task of `generation`.
    ///
    /// Returns `false` if the write was dropped because a newer task owns the door.
    pub fn record_reading(&self, port: u8, generation: u64, position: i32, state: DoorState) -> bool {
        let slot = self.slot(port);
        let mut record = slot.record.lock();
        if !slot.is_current(generation) {
            debug!("Dropping stale reading for door {} (generation {})", port, generation);
            return false;
        }
        record.last_position = position;
        record.last_state = state;
        true
    }

    /// Stores only the state, keeping the last position.
    pub fn record_state(&self, port: u8, generation: u64, state: DoorState) -> bool {
        let position = self.get(port).last_position;
        self.record_reading(port, generation, position, state)
    }

    /// Detaches every tracking task, leaving the slots empty.
    pub async fn take_monitors(&self) -> Vec<TrackingSession> {
        let slots: Vec<Arc<DoorSlot>> = self.doors.iter().map(|entry| entry.value().clone()).collect();
        let mut sessions = Vec::new();
        for slot in slots {
            if let Some(session) = slot.monitor.lock().await.take() {
                sessions.push(session);
            }
        }
        sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UNKNOWN_POSITION;

    #[test]
    fn unknown_doors_start_unset() {
        let registry = DoorRegistry::from_ports(&[1, 0]);
        assert_eq!(registry.ports(), vec![0, 1]);
        let record = registry.get(1);
        assert_eq!(record.last_position, UNKNOWN_POSITION);
        assert_eq!(record.last_state, DoorState::Unset);
    }

    #[test]
    fn stale_generations_cannot_write() {
        let registry = DoorRegistry::new();
        let old = registry.next_generation(0);
        assert!(registry.record_reading(0, old, 40, DoorState::Opening));

        let new = registry.next_generation(0);
        assert!(!registry.slot(0).is_current(old));
        assert!(!registry.record_state(0, old, DoorState::Unknown));
        assert_eq!(registry.last_state(0), DoorState::Opening);

        assert!(registry.record_state(0, new, DoorState::Closing));
        assert_eq!(registry.get(0).last_position, 40);
        assert_eq!(registry.last_state(0), DoorState::Closing);
    }
}
