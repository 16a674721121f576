//! # Time-Slice Gate
//!
//! Bridges the VM's time-slice requests and the platform's wait contract.
//!
//! ```text
//!   next_time_slice()
//!          │
//!          ├── -2 ──────────▶ measure_stack(false) → check_in_all()
//!          │                  → finalize() → cancel_waits()   (once)
//!          │
//!          ├── < 0 or > i32::MAX ──▶ WaitTimeout::Forever
//!          │
//!          └── otherwise ──────────▶ WaitTimeout::Millis(v)
//! ```

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::collab::PushRegistry;

/// Slice value the VM returns when it wants to shut down
pub const SHUTDOWN_SENTINEL: i64 = -2;

/// Largest wait the platform accepts in milliseconds
pub const MAX_WAIT_MILLIS: i64 = 0x7FFF_FFFF;

// =============================================================================
// Wait Timeout
// =============================================================================

/// How long the platform may block waiting for the next record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTimeout {
    /// Bounded wait
    Millis(u32),
    /// Wait until a record arrives
    Forever,
}

impl WaitTimeout {
    /// Do not wait at all
    pub const IMMEDIATE: Self = Self::Millis(0);

    /// Convert a VM wait request.
    ///
    /// Negative values and values beyond [`MAX_WAIT_MILLIS`] mean forever.
    pub const fn from_requested(requested: i64) -> Self {
        if requested < 0 || requested > MAX_WAIT_MILLIS {
            Self::Forever
        } else {
            Self::Millis(requested as u32)
        }
    }

    /// Check if this timeout forbids waiting
    pub const fn is_immediate(self) -> bool {
        matches!(self, Self::Millis(0))
    }

    /// Milliseconds, `None` for forever
    pub const fn as_millis(self) -> Option<u32> {
        match self {
            Self::Millis(ms) => Some(ms),
            Self::Forever => None,
        }
    }
}

// =============================================================================
// Gate Collaborators
// =============================================================================

/// Source of VM time slices
pub trait SliceSource {
    /// Run the VM for one slice and return how long it may now sleep
    fn next_time_slice(&self) -> i64;
}

/// VM shutdown steps
pub trait Finalizer {
    /// Enable or disable stack measurement
    fn measure_stack(&self, enabled: bool);

    /// Tear the VM down
    fn finalize(&self);
}

/// Something platform waits can block on
pub trait WaitCancel: Send + Sync {
    /// Release pending waits and stop future ones
    fn cancel_waits(&self);
}

/// Platform hook asking for a time slice as soon as possible
pub trait ScheduleNotifier: Send + Sync {
    /// Request a slice
    fn schedule(&self);
}

// =============================================================================
// Gate
// =============================================================================

/// What the caller should do after a slice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slice {
    /// VM finished; stop driving it
    Shutdown,
    /// Wait for the next record at most this long
    Run(WaitTimeout),
}

/// Outcome of one [`TimeSliceGate::time_slice`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSlice {
    /// Value returned by the VM
    pub raw: i64,
    /// Decision derived from it
    pub decision: Slice,
}

/// Time-slice gate
pub struct TimeSliceGate {
    /// Shutdown steps already ran
    finalized: AtomicBool,
    /// A slice was requested and not yet taken
    schedule_pending: AtomicBool,
    push: Option<Arc<dyn PushRegistry>>,
    cancel: Option<Arc<dyn WaitCancel>>,
    notifier: Option<Arc<dyn ScheduleNotifier>>,
}

impl TimeSliceGate {
    /// Gate with no collaborators
    pub const fn new() -> Self {
        Self {
            finalized: AtomicBool::new(false),
            schedule_pending: AtomicBool::new(false),
            push: None,
            cancel: None,
            notifier: None,
        }
    }

    /// Check push connections in on shutdown
    pub fn with_push(mut self, push: Arc<dyn PushRegistry>) -> Self {
        self.push = Some(push);
        self
    }

    /// Cancel waits on this target on shutdown
    pub fn with_wait_cancel(mut self, cancel: Arc<dyn WaitCancel>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Forward schedule requests to the platform
    pub fn with_notifier(mut self, notifier: Arc<dyn ScheduleNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Run one VM slice and decide how long to wait afterwards
    pub fn time_slice<S, F>(&self, source: &S, finalizer: &F) -> TimeSlice
    where
        S: SliceSource + ?Sized,
        F: Finalizer + ?Sized,
    {
        let raw = source.next_time_slice();

        if raw == SHUTDOWN_SENTINEL {
            if !self.finalized.swap(true, Ordering::AcqRel) {
                self.shutdown(finalizer);
            }
            return TimeSlice {
                raw,
                decision: Slice::Shutdown,
            };
        }

        TimeSlice {
            raw,
            decision: Slice::Run(WaitTimeout::from_requested(raw)),
        }
    }

    fn shutdown<F: Finalizer + ?Sized>(&self, finalizer: &F) {
        log::info!("TimeSlice: VM requested shutdown, finalizing");

        finalizer.measure_stack(false);
        if let Some(push) = &self.push {
            push.check_in_all();
        }
        finalizer.finalize();
        if let Some(cancel) = &self.cancel {
            cancel.cancel_waits();
        }
    }

    /// Check if the shutdown steps already ran
    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    /// Ask for a time slice as soon as possible
    pub fn schedule_time_slice(&self) {
        self.schedule_pending.store(true, Ordering::Release);
        if let Some(notifier) = &self.notifier {
            notifier.schedule();
        }
    }

    /// Consume a pending schedule request
    pub fn take_schedule_request(&self) -> bool {
        self.schedule_pending.swap(false, Ordering::AcqRel)
    }
}

impl Default for TimeSliceGate {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for TimeSliceGate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TimeSliceGate")
            .field("finalized", &self.is_finalized())
            .field(
                "schedule_pending",
                &self.schedule_pending.load(Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}
