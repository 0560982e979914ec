pub mod config;
pub mod layout;
pub mod log;
pub mod rect;
pub mod window;

pub use layout::{Snapshot, SnapshotRecord};
pub use rect::Rect;
pub use window::{Window, WindowResult};
