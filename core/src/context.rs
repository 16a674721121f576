//! # Blocked Contexts
//!
//! Views of the VM's blocked execution contexts. The VM owns the contexts;
//! the relay reads their reentry data, updates status and result, and asks
//! the VM to unblock them.

use alloc::sync::Arc;

use spin::{Mutex, MutexGuard};
use vmrelay_hal::WaitKind;

use crate::signal::OpaqueResult;

/// Identity of a VM execution context
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextId(pub u32);

/// What a blocked context is waiting for, and where its wake-up data goes
#[derive(Debug, PartialEq, Eq)]
pub struct ReentryData {
    /// Awaited condition; `None` once a wildcard wake consumed it
    pub waiting_for: Option<WaitKind>,
    /// Awaited resource
    pub descriptor: i32,
    /// Status delivered on wake-up
    pub status: i32,
    /// Result delivered on wake-up
    pub result: Option<OpaqueResult>,
}

impl ReentryData {
    /// Reentry data of a context waiting on `(kind, descriptor)`
    pub const fn waiting(kind: WaitKind, descriptor: i32) -> Self {
        Self {
            waiting_for: Some(kind),
            descriptor,
            status: 0,
            result: None,
        }
    }

    /// Check if a wildcard wake already consumed this context
    pub const fn is_consumed(&self) -> bool {
        self.waiting_for.is_none()
    }

    /// Store a wake-up status, and the result if one is delivered.
    ///
    /// A result already held is kept when none is delivered. Returns the
    /// result displaced by a new one.
    pub(crate) fn deliver(
        &mut self,
        status: i32,
        result: Option<OpaqueResult>,
    ) -> Option<OpaqueResult> {
        self.status = status;
        match result {
            Some(result) => self.result.replace(result),
            None => None,
        }
    }
}

/// Shared handle to reentry data; the VM keeps the other end
pub type ReentryHandle = Arc<Mutex<ReentryData>>;

/// One entry of the VM's blocked-context list
#[derive(Debug, Clone)]
pub struct BlockedContext {
    /// Context identity
    pub id: ContextId,
    /// Reentry data, absent for contexts blocked outside the relay
    pub reentry: Option<ReentryHandle>,
}

impl BlockedContext {
    /// Context blocked on `(kind, descriptor)`
    pub fn waiting(id: ContextId, kind: WaitKind, descriptor: i32) -> Self {
        Self {
            id,
            reentry: Some(Arc::new(Mutex::new(ReentryData::waiting(kind, descriptor)))),
        }
    }

    /// Context without reentry data
    pub const fn detached(id: ContextId) -> Self {
        Self { id, reentry: None }
    }

    /// Lock the reentry data, if any
    pub fn reentry(&self) -> Option<MutexGuard<'_, ReentryData>> {
        self.reentry.as_ref().map(|data| data.lock())
    }
}
