pub mod door_registry;
pub mod lifecycle;

pub use door_registry::{DoorRegistry, DoorSlot};
pub use lifecycle::BridgeLifecycle;
