use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use crate::config::DoorSettings;
use crate::models::{Action, DoorState};
use crate::services::error_classifier::ErrorClassifier;
use crate::services::publisher::BusPublisher;
use crate::services::status_reader::{position_topic, state_topic, DoorStatusReader};
use crate::state_management::DoorRegistry;

/// Cooperative cancellation shared between a tracking task and whoever supersedes it.
#[derive(Debug, Default)]
pub struct CancellationFlag {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// How a tracking task ended, with the last state it derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    /// The door reached the expected end stop or stopped moving.
    Settled(DoorState),
    /// A newer command superseded the task, or the bridge is shutting down.
    Cancelled(DoorState),
    /// The status read failed.
    GatewayError(DoorState),
    /// The door kept moving for longer than the configured number of reads.
    TimedOut(DoorState),
}

impl MonitorExit {
    pub fn state(&self) -> DoorState {
        match self {
            MonitorExit::Settled(state)
            | MonitorExit::Cancelled(state)
            | MonitorExit::GatewayError(state)
            | MonitorExit::TimedOut(state) => *state,
        }
    }
}

/// A running tracking task for one door.
pub struct TrackingSession {
    pub door: u8,
    pub action: Action,
    pub generation: u64,
    flag: Arc<CancellationFlag>,
    handle: JoinHandle<MonitorExit>,
}

impl TrackingSession {
    pub fn cancel(&self) {
        self.flag.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the task to end.
    pub async fn join(self) -> Option<MonitorExit> {
        match self.handle.await {
            Ok(exit) => Some(exit),
            Err(e) => {
                warn!("Tracking task for door {} ended abnormally: {}", self.door, e);
                None
            }
        }
    }
}

/// Follows a door after an action until it settles, publishing its position and derived state.
///
/// At most one tracking task runs per door: starting a new one cancels the previous task and waits a
/// bounded time for it to end.
#[derive(Clone)]
pub struct PositionTracker {
    registry: Arc<DoorRegistry>,
    reader: Arc<DoorStatusReader>,
    classifier: Arc<ErrorClassifier>,
    publisher: BusPublisher,
    settings: DoorSettings,
}

impl PositionTracker {
    pub fn new(
        registry: Arc<DoorRegistry>,
        reader: Arc<DoorStatusReader>,
        classifier: Arc<ErrorClassifier>,
        publisher: BusPublisher,
        settings: DoorSettings,
    ) -> Self {
        Self { registry, reader, classifier, publisher, settings }
    }

    /// Replaces the tracking task of `door` by a new one seeded with `start_position` and `action`.
    ///
    /// The previous task has ended (or been abandoned) before the new one starts. Returns how the previous
    /// task ended, if there was one and it ended in time.
    pub async fn supersede(&self, door: u8, start_position: i32, action: Action) -> Option<MonitorExit> {
        let slot = self.registry.slot(door);
        let mut monitor = slot.monitor.lock().await;
        let previous = match monitor.take() {
            Some(previous) => self.cancel_and_wait(previous).await,
            None => None,
        };
        *monitor = Some(self.start(door, start_position, action));
        previous
    }

    fn start(&self, door: u8, start_position: i32, action: Action) -> TrackingSession {
        let generation = self.registry.next_generation(door);
        let flag = Arc::new(CancellationFlag::new());
        info!("Tracking door {} after '{}' from position {}", door, action, start_position);
        let handle = tokio::spawn(self.clone().track(door, start_position, action, generation, flag.clone()));
        TrackingSession { door, action, generation, flag, handle }
    }

    /// Cancels `session` and polls for its end, abandoning it after the configured number of polls.
    pub async fn cancel_and_wait(&self, session: TrackingSession) -> Option<MonitorExit> {
        session.cancel();
        let mut polls = 0;
        while !session.is_finished() && polls < self.settings.supersede_max_polls {
            tokio::time::sleep(self.settings.supersede_poll()).await;
            polls += 1;
        }
        if session.is_finished() {
            debug!(
                "Tracking task {} for door {} ended after {} polls",
                session.generation, session.door, polls
            );
            session.join().await
        } else {
            warn!(
                "Tracking task {} for door {} did not end in time, abandoning it",
                session.generation, session.door
            );
            None
        }
    }

    async fn track(
        self,
        door: u8,
        start_position: i32,
        action: Action,
        generation: u64,
        flag: Arc<CancellationFlag>,
    ) -> MonitorExit {
        self.publisher.publish(&position_topic(door), start_position).await;
        let seed_state = self.registry.last_state(door);
        self.registry.record_reading(door, generation, start_position, seed_state);

        let mut state = DoorState::Unset;
        let mut current = start_position;
        let mut previous: Option<i32> = None;
        let mut polls = 0;

        let exit = loop {
            if flag.is_cancelled() {
                break MonitorExit::Cancelled(state);
            }
            let awaiting_end_stop = match action {
                Action::Up => state != DoorState::Open,
                Action::Down => state != DoorState::Closed,
                _ => false,
            };
            if !awaiting_end_stop && previous == Some(current) {
                break MonitorExit::Settled(state);
            }
            if polls >= self.settings.max_tracking_polls {
                warn!("Door {} did not settle after {} reads", door, polls);
                break MonitorExit::TimedOut(state);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.poll_interval()) => {}
                _ = flag.cancelled() => break MonitorExit::Cancelled(state),
            }
            polls += 1;

            let last = current;
            previous = Some(last);
            let reading = self.reader.read_status(door).await;
            let Some(response) = reading.response else {
                break MonitorExit::GatewayError(state);
            };
            current = reading.position;
            if flag.is_cancelled() {
                break MonitorExit::Cancelled(state);
            }

            if self.classifier.classify(Some(&response)).await.is_none() {
                state = DoorState::from_movement(last, current);
                if self.registry.record_reading(door, generation, current, state) {
                    self.publisher.publish(&position_topic(door), current).await;
                    self.publisher.publish(&state_topic(door), state).await;
                }
            }
        };

        self.registry.record_state(door, generation, exit.state());
        info!("Stopped tracking door {}: {:?}", door, exit);
        exit
    }
}
