use specchio_core::{Rect, WindowResult};

use windows::Win32::Foundation::{HWND, RECT};
use windows::Win32::UI::WindowsAndMessaging::{GetWindowRect, IsWindowVisible};

/// The tracked window, wrapping a Win32 `HWND`.
///
/// The handle is minted by the host and owned by whatever process created
/// the window; this type holds it without any lifetime claim. Every query
/// goes to the OS, and `rect()` stays fallible because the window can be
/// destroyed between any two calls.
#[derive(Debug, Clone, Copy)]
pub struct Window {
    hwnd: HWND,
}

impl Window {
    /// Creates a new `Window` from a raw `HWND`.
    pub fn new(hwnd: HWND) -> Self {
        Self { hwnd }
    }

    /// Creates a new `Window` from a raw handle value (pointer-sized integer).
    ///
    /// This allows hosts to hand over a window without depending on the
    /// `windows` crate directly.
    pub fn from_raw(handle: usize) -> Self {
        Self {
            hwnd: HWND(handle as *mut _),
        }
    }

    /// Returns the raw window handle.
    pub fn hwnd(&self) -> HWND {
        self.hwnd
    }
}

impl specchio_core::Window for Window {
    fn rect(&self) -> WindowResult<Rect> {
        let mut rect = RECT::default();

        // SAFETY: GetWindowRect only reads window state; it fails cleanly
        // for a destroyed or otherwise invalid handle.
        unsafe { GetWindowRect(self.hwnd, &mut rect)? };

        Ok(Rect::new(
            rect.left,
            rect.top,
            rect.right - rect.left,
            rect.bottom - rect.top,
        ))
    }

    fn is_visible(&self) -> bool {
        // SAFETY: IsWindowVisible is a simple query that returns a BOOL.
        unsafe { IsWindowVisible(self.hwnd).as_bool() }
    }
}
