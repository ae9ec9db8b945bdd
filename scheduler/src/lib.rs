//! When runs happen and where the settings live.

pub mod message;
pub mod store;
pub mod trigger;

pub use message::{TriggerMessage, TriggerReply};
pub use store::{ConfigStore, JsonFileStore};
pub use trigger::{DEFAULT_LEAD, TriggerSource};
