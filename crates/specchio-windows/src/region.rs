//! The named shared-memory region holding one snapshot record.
//!
//! One process publishes into the region; any number of processes open the
//! same name and poll the sequence counter. The region is reference-counted
//! by the kernel: it outlives this handle as long as any reader still holds
//! one, and vanishes with the last close. Writers must be serialized by the
//! caller (the publisher holds its state mutex across every write); readers
//! need no lock at all.

use std::ptr;
use std::sync::atomic::{Ordering, fence};

use specchio_core::layout::{self, SnapshotRecord};
use specchio_core::{Rect, Snapshot, WindowResult};

use windows::Win32::Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE};
use windows::Win32::System::Memory::{
    CreateFileMappingW, FILE_MAP_ALL_ACCESS, FlushViewOfFile, MEMORY_MAPPED_VIEW_ADDRESS,
    MapViewOfFile, OpenFileMappingW, PAGE_READWRITE, UnmapViewOfFile,
};
use windows::core::PCWSTR;

/// Attempts before an optimistic read gives up on a contended region.
const READ_RETRIES: usize = 16;

/// A mapped view of the named snapshot region.
///
/// `seq` is this writer's continuation counter: adopted from the region at
/// initialization so a restarted writer never rewinds the sequence a reader
/// may already be tracking.
pub struct SharedRegion {
    handle: HANDLE,
    view: *mut u8,
    seq: u32,
}

// SAFETY: the raw view pointer and HANDLE are created and released only by
// this type, and Win32 file-mapping handles may be used from any thread. All
// mutation goes through &mut self, so the usual aliasing rules hold within
// this process; cross-process concurrency is what the sequence protocol is
// for.
unsafe impl Send for SharedRegion {}

impl SharedRegion {
    /// Opens the named region, creating it at the fixed size if it does not
    /// exist yet.
    pub fn open_or_create(name: &str) -> WindowResult<Self> {
        let wide = to_wide(name);

        // SAFETY: the name buffer is NUL-terminated and outlives both calls.
        // Open first so an existing region (and its contents) is adopted
        // rather than recreated.
        let handle = unsafe {
            match OpenFileMappingW(FILE_MAP_ALL_ACCESS.0, false, PCWSTR(wide.as_ptr())) {
                Ok(h) if !h.is_invalid() => h,
                _ => CreateFileMappingW(
                    INVALID_HANDLE_VALUE,
                    None,
                    PAGE_READWRITE,
                    0,
                    layout::REGION_SIZE as u32,
                    PCWSTR(wide.as_ptr()),
                )
                .map_err(|e| format!("create file mapping {name:?}: {e}"))?,
            }
        };

        Self::map(handle, name)
    }

    /// Opens an existing named region. Fails if no process has created it.
    ///
    /// This is the reader-side entry point; it never creates or initializes.
    pub fn open_existing(name: &str) -> WindowResult<Self> {
        let wide = to_wide(name);

        // SAFETY: the name buffer is NUL-terminated and outlives the call.
        let handle = unsafe {
            OpenFileMappingW(FILE_MAP_ALL_ACCESS.0, false, PCWSTR(wide.as_ptr()))
                .map_err(|e| format!("open file mapping {name:?}: {e}"))?
        };

        Self::map(handle, name)
    }

    fn map(handle: HANDLE, name: &str) -> WindowResult<Self> {
        if handle.is_invalid() {
            return Err(format!("invalid mapping handle for {name:?}").into());
        }

        // SAFETY: the handle is a valid file-mapping handle; the view is
        // unmapped in close().
        let view = unsafe {
            MapViewOfFile(handle, FILE_MAP_ALL_ACCESS, 0, 0, layout::REGION_SIZE).Value as *mut u8
        };

        if view.is_null() {
            // SAFETY: we own the handle and it is not yet stored anywhere.
            unsafe {
                let _ = CloseHandle(handle);
            }
            return Err(format!("map view of {name:?} failed").into());
        }

        Ok(Self {
            handle,
            view,
            seq: 0,
        })
    }

    /// Writes the canonical header if the region is fresh (or carries a
    /// foreign layout), zeroing every field including the sequence counter.
    /// If the header already matches, adopts the existing sequence value as
    /// this writer's continuation point instead.
    ///
    /// The two cases cover the two notions of "first writer": a truly new
    /// region, and one abandoned by a previous writer instance that readers
    /// may still be tracking.
    pub fn ensure_initialized(&mut self) {
        if self.view.is_null() {
            return;
        }
        let record = self.record();

        // SAFETY: `record` points at REGION_SIZE bytes of mapped memory and
        // SnapshotRecord fits within them; all accesses are volatile or
        // atomic because another process may fault the same pages.
        unsafe {
            let magic = ptr::addr_of!((*record).magic).read_volatile();
            let version = ptr::addr_of!((*record).version).read_volatile();

            if magic == layout::MAGIC && version == layout::VERSION {
                self.seq = (*record).sequence.load(Ordering::Acquire);
                return;
            }

            ptr::addr_of_mut!((*record).magic).write_volatile(layout::MAGIC);
            ptr::addr_of_mut!((*record).version).write_volatile(layout::VERSION);
            (*record).sequence.store(0, Ordering::Release);
            ptr::addr_of_mut!((*record).x).write_volatile(0);
            ptr::addr_of_mut!((*record).y).write_volatile(0);
            ptr::addr_of_mut!((*record).width).write_volatile(0);
            ptr::addr_of_mut!((*record).height).write_volatile(0);
            ptr::addr_of_mut!((*record).reserved).write_volatile(0);
            ptr::addr_of_mut!((*record).flags).write_volatile(0);
            ptr::addr_of_mut!((*record).owner).write_volatile(0);

            let _ = FlushViewOfFile(self.view as *const _, layout::REGION_SIZE);
        }
        self.seq = 0;
    }

    /// Publishes one snapshot.
    ///
    /// Data fields go first (geometry, then flags, then owner); the sequence
    /// counter is incremented last, behind a release fence, so a reader that
    /// sees an unchanged sequence around its reads has not observed a write
    /// in progress.
    ///
    /// A closed (or never-mapped) region makes this a silent no-op: a
    /// notification handler may race a teardown, and that race is benign by
    /// contract.
    pub fn write_snapshot(&mut self, snap: &Snapshot) {
        if self.view.is_null() {
            return;
        }
        let record = self.record();

        // SAFETY: same mapping argument as ensure_initialized; the caller
        // serializes writers, so only field-level ordering matters here.
        unsafe {
            ptr::addr_of_mut!((*record).x).write_volatile(snap.rect.x);
            ptr::addr_of_mut!((*record).y).write_volatile(snap.rect.y);
            ptr::addr_of_mut!((*record).width).write_volatile(snap.rect.width);
            ptr::addr_of_mut!((*record).height).write_volatile(snap.rect.height);
            ptr::addr_of_mut!((*record).flags).write_volatile(snap.flags());
            ptr::addr_of_mut!((*record).owner).write_volatile(snap.owner);

            fence(Ordering::Release);
            self.seq = self.seq.wrapping_add(1);
            (*record).sequence.store(self.seq, Ordering::Release);
        }
    }

    /// Reads one coherent snapshot, together with the sequence value that
    /// validated it.
    ///
    /// Optimistic-read loop: capture the sequence, read every data field,
    /// re-check the sequence; equal means no writer published in between.
    /// Gives up after a bounded number of attempts on a hot region, and
    /// returns `None` for a closed region or one carrying a foreign header.
    pub fn read_snapshot(&self) -> Option<(u32, Snapshot)> {
        if self.view.is_null() {
            return None;
        }
        let record = self.record();

        // SAFETY: same mapping argument as ensure_initialized; reads are
        // volatile because a writer in another process mutates these bytes.
        unsafe {
            if ptr::addr_of!((*record).magic).read_volatile() != layout::MAGIC
                || ptr::addr_of!((*record).version).read_volatile() != layout::VERSION
            {
                return None;
            }

            for _ in 0..READ_RETRIES {
                let before = (*record).sequence.load(Ordering::Acquire);

                let x = ptr::addr_of!((*record).x).read_volatile();
                let y = ptr::addr_of!((*record).y).read_volatile();
                let width = ptr::addr_of!((*record).width).read_volatile();
                let height = ptr::addr_of!((*record).height).read_volatile();
                let flags = ptr::addr_of!((*record).flags).read_volatile();
                let owner = ptr::addr_of!((*record).owner).read_volatile();

                fence(Ordering::Acquire);
                let after = (*record).sequence.load(Ordering::Acquire);

                if before == after {
                    let rect = Rect::new(x, y, width, height);
                    return Some((before, Snapshot::from_wire(rect, flags, owner)));
                }
            }
        }
        None
    }

    /// The sequence value of this writer's most recent publication.
    pub fn sequence(&self) -> u32 {
        self.seq
    }

    /// Whether the region is currently mapped.
    pub fn is_mapped(&self) -> bool {
        !self.view.is_null()
    }

    /// Unmaps the view and releases the mapping handle. Idempotent; the
    /// kernel keeps the region alive while any other process holds it.
    pub fn close(&mut self) {
        if !self.view.is_null() {
            // SAFETY: the view was produced by MapViewOfFile and is unmapped
            // exactly once (the pointer is nulled below).
            unsafe {
                let _ = UnmapViewOfFile(MEMORY_MAPPED_VIEW_ADDRESS {
                    Value: self.view as *mut _,
                });
            }
            self.view = ptr::null_mut();
        }
        if !self.handle.is_invalid() {
            // SAFETY: we own the handle; it is closed exactly once.
            unsafe {
                let _ = CloseHandle(self.handle);
            }
            self.handle = HANDLE(ptr::null_mut());
        }
    }

    fn record(&self) -> *mut SnapshotRecord {
        self.view as *mut SnapshotRecord
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        self.close();
    }
}

fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}
