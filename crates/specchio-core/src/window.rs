use crate::Rect;

/// A boxed error type for window and region operations.
pub type WindowResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Platform-agnostic view of the tracked window.
///
/// The platform crate (e.g. `specchio-windows`) provides the implementation.
/// Both queries hit the OS on every call: the handle belongs to a foreign
/// process and can become invalid between any two calls, which is why
/// `rect()` is fallible rather than cached.
pub trait Window {
    /// Returns the window's current bounding rectangle in screen coordinates.
    fn rect(&self) -> WindowResult<Rect>;

    /// Returns whether the window is currently visible.
    fn is_visible(&self) -> bool;
}
