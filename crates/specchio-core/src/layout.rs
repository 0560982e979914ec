//! The shared snapshot record: the one compatibility contract between the
//! writer process and any reader process.
//!
//! Both sides map the same named 64-byte region and agree only on the byte
//! offsets below; no types are shared across the process boundary. The
//! sequence counter is the last field a writer touches, so a reader that
//! observes the same sequence value before and after reading the data fields
//! can accept them as a coherent snapshot.

use std::sync::atomic::AtomicU32;

use crate::Rect;

/// Total size of the shared region in bytes. Fixed forever for version 1.
pub const REGION_SIZE: usize = 64;

/// Format identity tag: "SPC1", little-endian.
pub const MAGIC: u32 = 0x3143_5053;

/// Layout revision. Readers must reject any other value.
pub const VERSION: u32 = 1;

/// The tracked window was visible at the time of the write.
pub const FLAG_VISIBLE: u32 = 1 << 0;

/// The tracked window was active (foreground) at the time of the write.
pub const FLAG_ACTIVE: u32 = 1 << 1;

/// The shared record as it lives in mapped memory.
///
/// Field order and padding reproduce the published offsets exactly:
/// magic 0, version 4, sequence 8, x 12, y 16, width 20, height 24,
/// reserved 28, flags 32, owner 40. The record occupies the first 48 bytes
/// of the 64-byte region; the tail is unused.
///
/// `sequence` is atomic because readers in other processes poll it without
/// any lock; everything else is published through plain (volatile) stores
/// ordered before the sequence increment.
#[repr(C)]
pub struct SnapshotRecord {
    pub magic: u32,
    pub version: u32,
    pub sequence: AtomicU32,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    /// Always zero. Reserved for a future revision.
    pub reserved: i32,
    pub flags: u32,
    _pad: u32,
    pub owner: i64,
}

/// One decoded snapshot: geometry, state flags, and the handle of the window
/// that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub rect: Rect,
    pub visible: bool,
    pub active: bool,
    /// The tracked window's native handle, reinterpreted as an integer.
    /// Opaque; no ownership or lifetime is implied.
    pub owner: i64,
}

impl Snapshot {
    pub fn new(rect: Rect, visible: bool, active: bool, owner: i64) -> Self {
        Self {
            rect,
            visible,
            active,
            owner,
        }
    }

    /// Packs the visibility/activation state into the wire flag bits.
    pub fn flags(&self) -> u32 {
        let mut flags = 0;
        if self.visible {
            flags |= FLAG_VISIBLE;
        }
        if self.active {
            flags |= FLAG_ACTIVE;
        }
        flags
    }

    /// Rebuilds a snapshot from the raw wire fields.
    pub fn from_wire(rect: Rect, flags: u32, owner: i64) -> Self {
        Self {
            rect,
            visible: flags & FLAG_VISIBLE != 0,
            active: flags & FLAG_ACTIVE != 0,
            owner,
        }
    }
}
