pub mod command;
pub mod door;
pub mod response;

pub use command::*;
pub use door::*;
pub use response::*;

use chrono::Local;

/// Current local time in the format used for every `_ts` topic.
pub fn timestamp() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}
