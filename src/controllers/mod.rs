pub mod bridge;
pub mod command_dispatcher;

pub use bridge::BridgeController;
pub use command_dispatcher::{CommandDispatcher, CommandReply};
