//! Windows implementation of the Specchio window-geometry publisher.
//!
//! The crate is Windows-only; on other targets it compiles to nothing.
#![cfg(windows)]

/// C ABI surface and DLL lifecycle.
pub mod ffi;

/// Start/stop lifecycle of window monitoring.
pub mod publisher;

/// The named shared-memory region holding the snapshot record.
pub mod region;

/// Window type wrapping a Win32 `HWND`.
pub mod window;

pub use publisher::{Publisher, publisher};
pub use region::SharedRegion;
pub use window::Window;
