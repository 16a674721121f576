//! # Signals
//!
//! A signal names the condition a blocked context waits on (wait kind plus
//! resource descriptor) together with the status to hand over on wake-up.

use vmrelay_hal::WaitKind;

/// Status reported by collaborators that completed normally
pub const STATUS_OK: i32 = 0;

// =============================================================================
// Opaque Result
// =============================================================================

/// Opaque value produced by the platform and handed to a woken context.
///
/// Owned and deliberately not `Clone`: it is either moved into exactly one
/// context or released through the VM's release hook.
#[derive(Debug, PartialEq, Eq)]
pub struct OpaqueResult(u64);

impl OpaqueResult {
    /// Wrap a raw platform value
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Wrap a raw value where zero means "no result"
    pub const fn from_nonzero(raw: u64) -> Option<Self> {
        if raw == 0 {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// Peek at the raw value
    pub const fn raw(&self) -> u64 {
        self.0
    }

    /// Give up ownership and return the raw value
    pub fn into_raw(self) -> u64 {
        self.0
    }
}

// =============================================================================
// Signal
// =============================================================================

/// Normalized wake-up request decoded from one record
#[derive(Debug, PartialEq, Eq)]
pub struct Signal {
    /// Condition being satisfied
    pub waiting_for: WaitKind,
    /// Resource descriptor (socket handle, stub, composite media id, ...)
    pub descriptor: i32,
    /// Status handed to the woken context
    pub status: i32,
    /// Optional opaque result
    pub result: Option<OpaqueResult>,
}

impl Signal {
    /// Create a signal without a result
    pub const fn new(waiting_for: WaitKind, descriptor: i32, status: i32) -> Self {
        Self {
            waiting_for,
            descriptor,
            status,
            result: None,
        }
    }

    /// Signal carrying only a wait kind
    pub const fn kind(waiting_for: WaitKind) -> Self {
        Self::new(waiting_for, 0, 0)
    }

    /// Attach an opaque result
    pub fn with_result(mut self, result: Option<OpaqueResult>) -> Self {
        self.result = result;
        self
    }
}

// =============================================================================
// Media Descriptors
// =============================================================================

/// Compose the descriptor a blocked media operation waits on.
///
/// The low 16 bits of the isolate id land in the high half, the low 16 bits
/// of the player id in the low half.
pub const fn pack_media_descriptor(isolate_id: i32, player_id: i32) -> i32 {
    ((((isolate_id as u32) & 0xFFFF) << 16) | ((player_id as u32) & 0xFFFF)) as i32
}

static_assertions::const_assert_eq!(pack_media_descriptor(1, 2), 0x0001_0002);

/// Split a composite media descriptor into `(isolate_id, player_id)`
pub const fn unpack_media_descriptor(descriptor: i32) -> (i32, i32) {
    let raw = descriptor as u32;
    ((raw >> 16) as i32, (raw & 0xFFFF) as i32)
}
