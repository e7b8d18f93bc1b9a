//! In-memory state containers.

mod directory;
mod global;

pub use directory::{DirectoryStore, MessageWindow, StoreChange, StoreStatus};
pub use global::GlobalStore;
