//! The event-driven publisher: subscribes to location-change notifications
//! for one target window and republishes its geometry into the shared
//! region.
//!
//! The WinEvent hook is registered with `WINEVENT_OUTOFCONTEXT`, so the
//! callback is dispatched on the registering thread's message pump (the
//! host's UI thread, which must keep pumping for events to arrive). Stop can
//! be called from any thread, which is why every piece of mutable state
//! lives behind one mutex.

use std::sync::{Mutex, Once};

use specchio_core::window::Window as _;
use specchio_core::{Snapshot, WindowResult, log_debug, log_info};

use windows::Win32::Foundation::HWND;
use windows::Win32::UI::Accessibility::{HWINEVENTHOOK, SetWinEventHook, UnhookWinEvent};
use windows::Win32::UI::WindowsAndMessaging::{EVENT_OBJECT_LOCATIONCHANGE, WINEVENT_OUTOFCONTEXT};

use crate::region::SharedRegion;
use crate::window::Window;

/// Object ID indicating the event applies to the window itself, not a child
/// object. `EVENT_OBJECT_LOCATIONCHANGE` also fires for carets and cursors.
const OBJID_WINDOW: i32 = 0;

/// The one publisher instance of this process.
///
/// The WinEvent callback carries no user-data pointer, so it has to reach
/// the state through a process-wide instance; everything else treats it as
/// an ordinary object.
static PUBLISHER: Publisher = Publisher {
    state: Mutex::new(None),
};

/// Returns the process-wide publisher.
pub fn publisher() -> &'static Publisher {
    &PUBLISHER
}

/// Monitoring state while running.
struct Active {
    /// Raw handle of the tracked window.
    target: usize,
    region: SharedRegion,
    /// The WinEvent hook handle, stored as an integer so the state is Send.
    hook: isize,
}

/// Publishes one window's geometry into a shared region, driven by
/// location-change events.
///
/// Two states: idle (`state` is `None`) and running. Start and stop are
/// idempotent; the mutex serializes them against the event callback.
pub struct Publisher {
    state: Mutex<Option<Active>>,
}

impl Publisher {
    /// Starts monitoring `target` and publishing into the region named
    /// `region_name`. Calling start while already running is a no-op that
    /// reports success.
    ///
    /// On any setup failure the publisher stays idle with nothing retained:
    /// a region opened before a failed hook registration is released before
    /// returning.
    pub fn start(&self, target: usize, region_name: &str) -> WindowResult<()> {
        init_logging();

        let mut state = self.state.lock().map_err(|_| "publisher state poisoned")?;
        if state.is_some() {
            log_debug!("start ignored: already running");
            return Ok(());
        }

        let mut region = SharedRegion::open_or_create(region_name)?;
        region.ensure_initialized();

        // SAFETY: win_event_proc is a valid WINEVENTPROC and stays alive for
        // the program's lifetime; the hook is removed in stop(). Process and
        // thread scope are 0 (system-wide); the callback filters by window.
        let hook = unsafe {
            SetWinEventHook(
                EVENT_OBJECT_LOCATIONCHANGE,
                EVENT_OBJECT_LOCATIONCHANGE,
                None,
                Some(win_event_proc),
                0,
                0,
                WINEVENT_OUTOFCONTEXT,
            )
        };
        if hook.is_invalid() {
            region.close();
            return Err("failed to register WinEvent hook".into());
        }

        // One unconditional initial publication, so a reader that attaches
        // before the first move sees real geometry. Skipped only if the
        // window is already gone. Activation is unknown here; assume active,
        // matching the event path.
        let window = Window::from_raw(target);
        match window.rect() {
            Ok(rect) => {
                let snap = Snapshot::new(rect, window.is_visible(), true, target as i64);
                region.write_snapshot(&snap);
            }
            Err(e) => log_debug!("initial rect query for 0x{target:X} failed: {e}"),
        }

        log_info!(
            "publishing 0x{target:X} into {region_name:?} from sequence {}",
            region.sequence()
        );

        *state = Some(Active {
            target,
            region,
            hook: hook.0 as isize,
        });
        Ok(())
    }

    /// Stops monitoring: unregisters the hook and releases the region.
    /// Stopping while idle is a no-op.
    ///
    /// Does not wait for an in-flight callback; one that fires after this
    /// returns finds the state empty and writes nothing.
    pub fn stop(&self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let Some(mut active) = state.take() else {
            return;
        };

        if active.hook != 0 {
            // SAFETY: the handle came from SetWinEventHook and is unhooked
            // exactly once, here.
            unsafe {
                let _ = UnhookWinEvent(HWINEVENTHOOK(active.hook as *mut _));
            }
        }
        active.region.close();

        log_info!("stopped publishing 0x{:X}", active.target);
    }

    /// Whether monitoring is currently running.
    pub fn is_running(&self) -> bool {
        self.state.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    /// Reacts to one location-change notification.
    ///
    /// Events for other windows are ignored: the hook is system-wide, so
    /// most deliveries are for unrelated windows. A failed rect query drops
    /// the event entirely: the window was likely just destroyed, and stale
    /// geometry must never be republished as current.
    fn handle_location_change(&self, hwnd: usize) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let Some(active) = state.as_mut() else {
            // Fired after stop (or before start finished); nothing to do.
            return;
        };
        if hwnd != active.target {
            return;
        }

        let window = Window::from_raw(hwnd);
        let Ok(rect) = window.rect() else {
            log_debug!("dropping event for 0x{hwnd:X}: rect query failed");
            return;
        };
        let visible = window.is_visible();

        // The location-change event carries no activation information, so
        // every event-driven write reports active. A second subscription
        // would be needed to track real activation.
        let snap = Snapshot::new(rect, visible, true, active.target as i64);
        active.region.write_snapshot(&snap);
    }
}

/// The WinEvent callback. Runs during message dispatch on the thread that
/// registered the hook.
unsafe extern "system" fn win_event_proc(
    _hook: HWINEVENTHOOK,
    event: u32,
    hwnd: HWND,
    id_object: i32,
    _id_child: i32,
    _event_thread: u32,
    _event_time: u32,
) {
    if event != EVENT_OBJECT_LOCATIONCHANGE || id_object != OBJID_WINDOW {
        return;
    }
    publisher().handle_location_change(hwnd.0 as usize);
}

/// Loads the host config and brings up the file logger, once per process.
fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let config = specchio_core::config::load();
        specchio_core::log::init(&config.log);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use windows::Win32::UI::WindowsAndMessaging::GetDesktopWindow;

    // The publisher is process-wide state; serialize the tests that touch it.
    static TEST_GUARD: Mutex<()> = Mutex::new(());
    static NAME_COUNTER: AtomicU32 = AtomicU32::new(0);

    fn unique_name() -> String {
        format!(
            "Local\\specchio-pub-test-{}-{}",
            std::process::id(),
            NAME_COUNTER.fetch_add(1, Ordering::Relaxed)
        )
    }

    fn desktop_hwnd() -> usize {
        // SAFETY: GetDesktopWindow always returns a valid, visible window.
        unsafe { GetDesktopWindow().0 as usize }
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let _guard = TEST_GUARD.lock().unwrap();
        let name = unique_name();

        assert!(publisher().start(desktop_hwnd(), &name).is_ok());
        assert!(publisher().is_running());

        // Second start: success without effect.
        assert!(publisher().start(desktop_hwnd(), &name).is_ok());
        assert!(publisher().is_running());

        publisher().stop();
        assert!(!publisher().is_running());
        publisher().stop();
        assert!(!publisher().is_running());
    }

    #[test]
    fn start_publishes_an_initial_snapshot() {
        let _guard = TEST_GUARD.lock().unwrap();
        let name = unique_name();
        let target = desktop_hwnd();

        // Observer opens first so the region survives the publisher's stop.
        let mut observer = SharedRegion::open_or_create(&name).unwrap();
        observer.ensure_initialized();

        publisher().start(target, &name).unwrap();
        let (seq, snap) = observer.read_snapshot().expect("initial snapshot");

        assert_eq!(seq, 1);
        assert_eq!(snap.owner, target as i64);
        assert!(snap.visible);
        assert!(snap.active);
        assert!(snap.rect.width > 0 && snap.rect.height > 0);

        publisher().stop();
    }

    #[test]
    fn events_for_other_windows_are_filtered_out() {
        let _guard = TEST_GUARD.lock().unwrap();
        let name = unique_name();
        let target = desktop_hwnd();

        let mut observer = SharedRegion::open_or_create(&name).unwrap();
        observer.ensure_initialized();

        publisher().start(target, &name).unwrap();
        let (seq_before, _) = observer.read_snapshot().unwrap();

        publisher().handle_location_change(target.wrapping_add(2));
        let (seq_after, _) = observer.read_snapshot().unwrap();
        assert_eq!(seq_after, seq_before);

        publisher().stop();
    }

    #[test]
    fn matching_event_publishes_a_snapshot() {
        let _guard = TEST_GUARD.lock().unwrap();
        let name = unique_name();
        let target = desktop_hwnd();

        let mut observer = SharedRegion::open_or_create(&name).unwrap();
        observer.ensure_initialized();

        publisher().start(target, &name).unwrap();
        publisher().handle_location_change(target);

        let (seq, snap) = observer.read_snapshot().unwrap();
        assert_eq!(seq, 2); // initial write + one event
        assert_eq!(snap.owner, target as i64);

        publisher().stop();
    }

    #[test]
    fn event_after_stop_writes_nothing() {
        let _guard = TEST_GUARD.lock().unwrap();
        let name = unique_name();
        let target = desktop_hwnd();

        let mut observer = SharedRegion::open_or_create(&name).unwrap();
        observer.ensure_initialized();

        publisher().start(target, &name).unwrap();
        publisher().stop();

        let (seq_before, _) = observer.read_snapshot().unwrap();
        publisher().handle_location_change(target);
        let (seq_after, _) = observer.read_snapshot().unwrap();
        assert_eq!(seq_after, seq_before);
    }

    #[test]
    fn failed_region_setup_leaves_the_publisher_idle() {
        let _guard = TEST_GUARD.lock().unwrap();

        let result = publisher().start(desktop_hwnd(), "Local\\specchio\\nested");
        assert!(result.is_err());
        assert!(!publisher().is_running());

        // A clean start still works afterwards.
        let name = unique_name();
        publisher().start(desktop_hwnd(), &name).unwrap();
        assert!(publisher().is_running());
        publisher().stop();
    }

    #[test]
    fn restart_continues_the_sequence() {
        let _guard = TEST_GUARD.lock().unwrap();
        let name = unique_name();
        let target = desktop_hwnd();

        let mut observer = SharedRegion::open_or_create(&name).unwrap();
        observer.ensure_initialized();

        publisher().start(target, &name).unwrap();
        publisher().handle_location_change(target);
        publisher().stop();
        let (seq, _) = observer.read_snapshot().unwrap();
        assert_eq!(seq, 2);

        // A new session against the surviving region picks up at 2.
        publisher().start(target, &name).unwrap();
        let (seq, snap) = observer.read_snapshot().unwrap();
        assert_eq!(seq, 3);
        assert_eq!(snap.owner, target as i64);
        publisher().stop();
    }
}
