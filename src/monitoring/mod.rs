pub mod position_monitor;

pub use position_monitor::{CancellationFlag, MonitorExit, PositionTracker, TrackingSession};
