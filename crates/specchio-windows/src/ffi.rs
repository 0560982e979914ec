//! C ABI for non-Rust hosts embedding the publisher as a DLL.
//!
//! Mirrors the publisher's two entry points: `specchio_start` returns 0 on
//! success and nonzero on failure, `specchio_stop` never fails. `DllMain`
//! forces a stop at process detach so a host that forgets to call stop does
//! not leak the hook or the region handle.

use std::ffi::{CStr, c_char, c_void};

use specchio_core::log_error;

use windows::Win32::Foundation::{BOOL, HINSTANCE, TRUE};
use windows::Win32::System::SystemServices::DLL_PROCESS_DETACH;

use crate::publisher::publisher;

/// Starts publishing the given window's geometry into the named region.
///
/// `region_name` is a NUL-terminated UTF-8 kernel object name (e.g.
/// `Local\...`), passed through to the OS untouched. Returns 0 on success,
/// 1 on failure; starting while already running returns 0 without effect.
///
/// # Safety
/// `region_name` must point to a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn specchio_start(window: i64, region_name: *const c_char) -> i32 {
    if region_name.is_null() {
        return 1;
    }
    // SAFETY: per the contract above, the pointer is NUL-terminated.
    let name = unsafe { CStr::from_ptr(region_name) };
    let Ok(name) = name.to_str() else {
        return 1;
    };

    match publisher().start(window as usize, name) {
        Ok(()) => 0,
        Err(e) => {
            log_error!("start failed: {e}");
            1
        }
    }
}

/// Stops publishing. Safe to call at any time, from any thread; stopping
/// while idle is a no-op.
#[unsafe(no_mangle)]
pub extern "C" fn specchio_stop() {
    publisher().stop();
}

/// DLL entry point.
///
/// Nothing to set up at attach; the publisher's state is a const-initialized
/// static. Detach forces a stop so the hook and region handle are released
/// even if the host never called `specchio_stop`.
///
/// # Safety
/// Called by the Windows loader with valid parameters.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn DllMain(
    _module: HINSTANCE,
    reason: u32,
    _reserved: *const c_void,
) -> BOOL {
    if reason == DLL_PROCESS_DETACH {
        publisher().stop();
    }
    TRUE
}
