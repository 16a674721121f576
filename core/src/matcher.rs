//! # Blocked-Context Matcher
//!
//! Finds the blocked context a signal is meant for and wakes it.
//!
//! - **Exact**: reentry descriptor and wait kind both equal the signal's.
//! - **Wildcard**: a `NoSignal` signal matches on descriptor alone and marks
//!   the context consumed so it cannot be woken twice.
//! - **Range**: like exact (or wildcard), restricted to contexts waiting on
//!   a kind inside the multimedia range.
//!
//! At most one context is woken per call, the first in list order. Nothing
//! here allocates.

use vmrelay_hal::WaitKind;

use crate::collab::ThreadControl;
use crate::context::{BlockedContext, ContextId, ReentryData};
use crate::error::{RelayError, RelayResult};
use crate::signal::OpaqueResult;

/// Result of one match attempt
#[derive(Debug, PartialEq, Eq)]
pub enum MatchOutcome {
    /// This context was woken and took the result
    Matched(ContextId),
    /// Nothing matched; the result is handed back
    NoMatch(Option<OpaqueResult>),
}

impl MatchOutcome {
    /// Check if a context was woken
    pub const fn is_matched(&self) -> bool {
        matches!(self, Self::Matched(_))
    }

    /// Result no context took, if any
    pub fn into_unclaimed(self) -> Option<OpaqueResult> {
        match self {
            Self::Matched(_) => None,
            Self::NoMatch(result) => result,
        }
    }

    /// Woken context, or [`RelayError::NoMatch`] with any result released
    /// through `vm`
    pub fn into_result<T: ThreadControl + ?Sized>(
        self,
        vm: &T,
        kind: WaitKind,
    ) -> RelayResult<ContextId> {
        match self {
            Self::Matched(id) => Ok(id),
            Self::NoMatch(result) => {
                if let Some(result) = result {
                    vm.free_result(kind, result);
                }
                Err(RelayError::NoMatch)
            },
        }
    }
}

/// Wake the first context waiting on exactly `(kind, descriptor)`.
///
/// With `kind == NoSignal` the first armed context on `descriptor` is woken
/// regardless of its wait kind.
pub fn unblock_context<T: ThreadControl + ?Sized>(
    vm: &T,
    contexts: &[BlockedContext],
    kind: WaitKind,
    descriptor: i32,
    status: i32,
    result: Option<OpaqueResult>,
) -> MatchOutcome {
    wake_first(vm, contexts, kind, status, result, |data| {
        if data.descriptor != descriptor {
            return Wake::Skip;
        }
        if data.waiting_for == Some(kind) {
            Wake::Keep
        } else if kind.is_wildcard() && !data.is_consumed() {
            Wake::Consume
        } else {
            Wake::Skip
        }
    })
}

/// Wake the first multimedia-range context on `descriptor`
pub fn unblock_media_context<T: ThreadControl + ?Sized>(
    vm: &T,
    contexts: &[BlockedContext],
    kind: WaitKind,
    descriptor: i32,
    status: i32,
) -> MatchOutcome {
    wake_first(vm, contexts, kind, status, None, |data| match data.waiting_for {
        Some(waiting)
            if data.descriptor == descriptor
                && (waiting == kind || kind.is_wildcard())
                && waiting.is_media() =>
        {
            Wake::Keep
        },
        _ => Wake::Skip,
    })
}

/// Per-context verdict of a match predicate
enum Wake {
    Skip,
    /// Wake, leave the wait kind as is
    Keep,
    /// Wake and mark consumed
    Consume,
}

fn wake_first<T, F>(
    vm: &T,
    contexts: &[BlockedContext],
    kind: WaitKind,
    status: i32,
    result: Option<OpaqueResult>,
    mut predicate: F,
) -> MatchOutcome
where
    T: ThreadControl + ?Sized,
    F: FnMut(&ReentryData) -> Wake,
{
    for context in contexts {
        let Some(mut data) = context.reentry() else {
            continue;
        };

        match predicate(&*data) {
            Wake::Skip => continue,
            Wake::Keep => {},
            Wake::Consume => {
                log::info!(
                    "Matcher: waking context {} on descriptor {} without signal",
                    context.id.0,
                    data.descriptor
                );
                data.waiting_for = None;
            },
        }

        let displaced = data.deliver(status, result);
        drop(data);
        if let Some(displaced) = displaced {
            vm.free_result(kind, displaced);
        }
        vm.unblock(context.id);
        return MatchOutcome::Matched(context.id);
    }

    MatchOutcome::NoMatch(result)
}
