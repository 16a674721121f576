//! # Collaborators
//!
//! Interfaces the relay calls out to. The VM provides thread control and
//! event queues; optional protocol subsystems are installed as capability
//! objects in [`Protocols`]. An absent collaborator behaves as one that
//! declines every request.

use alloc::sync::Arc;
use alloc::vec::Vec;

use bitflags::bitflags;
use vmrelay_hal::WaitKind;

use crate::context::{BlockedContext, ContextId};
use crate::event::VmEvent;
use crate::signal::OpaqueResult;
use crate::timeslice::WaitTimeout;

// =============================================================================
// VM Interfaces
// =============================================================================

/// VM thread subsystem
pub trait ThreadControl {
    /// Snapshot of the currently blocked contexts
    fn blocked_contexts(&self) -> Vec<BlockedContext>;

    /// Make a context runnable again. Unblocking twice is harmless.
    fn unblock(&self, id: ContextId);

    /// Wake every context waiting on `(kind, descriptor)` with `status`.
    ///
    /// Returns the number of contexts woken.
    fn signal_all(
        &self,
        contexts: &[BlockedContext],
        kind: WaitKind,
        descriptor: i32,
        status: i32,
    ) -> usize {
        let mut woken = 0;
        for context in contexts {
            let Some(mut data) = context.reentry() else {
                continue;
            };
            if data.waiting_for == Some(kind) && data.descriptor == descriptor {
                data.status = status;
                drop(data);
                self.unblock(context.id);
                woken += 1;
            }
        }
        woken
    }

    /// Release a result no context took ownership of
    fn free_result(&self, _kind: WaitKind, result: OpaqueResult) {
        drop(result);
    }
}

/// Target queue for a VM event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventQueue {
    /// Application lifecycle (AMS) queue
    Ams,
    /// Queue of the foreground application
    Foreground,
    /// Queue serviced by the VM thread
    VmThread,
}

/// Owner of a posted event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOwner {
    /// Not tied to an isolate
    Any,
    /// Delivered to one isolate
    Isolate(i32),
}

/// VM event queues
pub trait EventQueues {
    /// Post an event. Must not block.
    fn post(&self, queue: EventQueue, event: VmEvent, owner: EventOwner);
}

/// Everything the dispatcher needs from the VM
pub trait VmRuntime: ThreadControl + EventQueues {}

impl<T: ThreadControl + EventQueues + ?Sized> VmRuntime for T {}

// =============================================================================
// Protocol Collaborators
// =============================================================================

/// Push registry
pub trait PushRegistry: Send + Sync {
    /// Check if the push subsystem waits for a read on `descriptor`
    fn find_blocked_handle(&self, descriptor: i32) -> bool;

    /// Check if the push subsystem owns the alarm `alarm_handle`
    fn find_timer_handle(&self, alarm_handle: i32) -> bool;

    /// Check every push connection back in before shutdown
    fn check_in_all(&self) {}
}

/// Optional protocol subsystem (messaging, location, card reader, ...)
pub trait ProtocolHandler: Send + Sync {
    /// Collaborator name, for logs
    fn name(&self) -> &'static str;

    /// Offer a signal. Return `true` if the subsystem claimed it.
    fn try_handle(&self, kind: WaitKind, descriptor: i32, status: i32) -> bool;
}

/// Storage roots watcher
pub trait StorageWatcher: Send + Sync {
    /// File-system roots were added or removed
    fn roots_changed(&self);
}

/// Debugger agent
pub trait DebugAgent: Send + Sync {
    /// Check if a debugger session is attached
    fn is_active(&self) -> bool;

    /// Process pending debugger commands
    fn process_commands(&self);
}

/// Platform wait primitive used while the event buffer is empty
pub trait EventWaiter: Send + Sync {
    /// Block until a record may be available or `timeout` elapses
    fn wait(&self, timeout: WaitTimeout);
}

// =============================================================================
// Capabilities
// =============================================================================

bitflags! {
    /// Installed optional collaborators
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ProtocolCaps: u32 {
        /// Push registry
        const PUSH = 1 << 0;
        /// Messaging (SMS/CBS/MMS)
        const MESSAGING = 1 << 1;
        /// Location provider
        const LOCATION = 1 << 2;
        /// Smart card reader
        const CARD_READER = 1 << 3;
        /// Sensors
        const SENSOR = 1 << 4;
        /// Advanced multimedia
        const ADVANCED_MEDIA = 1 << 5;
        /// Storage roots watcher
        const STORAGE = 1 << 6;
        /// Debugger agent
        const DEBUGGER = 1 << 7;
        /// Platform event waiter
        const WAITER = 1 << 8;
    }
}

/// Set of installed collaborators
#[derive(Clone, Default)]
pub struct Protocols {
    push: Option<Arc<dyn PushRegistry>>,
    messaging: Option<Arc<dyn ProtocolHandler>>,
    location: Option<Arc<dyn ProtocolHandler>>,
    card_reader: Option<Arc<dyn ProtocolHandler>>,
    sensor: Option<Arc<dyn ProtocolHandler>>,
    advanced_media: Option<Arc<dyn ProtocolHandler>>,
    storage: Option<Arc<dyn StorageWatcher>>,
    debugger: Option<Arc<dyn DebugAgent>>,
    waiter: Option<Arc<dyn EventWaiter>>,
}

impl Protocols {
    /// No collaborators installed
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the push registry
    pub fn with_push(mut self, push: Arc<dyn PushRegistry>) -> Self {
        self.push = Some(push);
        self
    }

    /// Install the messaging subsystem
    pub fn with_messaging(mut self, handler: Arc<dyn ProtocolHandler>) -> Self {
        self.messaging = Some(handler);
        self
    }

    /// Install the location subsystem
    pub fn with_location(mut self, handler: Arc<dyn ProtocolHandler>) -> Self {
        self.location = Some(handler);
        self
    }

    /// Install the card reader subsystem
    pub fn with_card_reader(mut self, handler: Arc<dyn ProtocolHandler>) -> Self {
        self.card_reader = Some(handler);
        self
    }

    /// Install the sensor subsystem
    pub fn with_sensor(mut self, handler: Arc<dyn ProtocolHandler>) -> Self {
        self.sensor = Some(handler);
        self
    }

    /// Install the advanced multimedia subsystem
    pub fn with_advanced_media(mut self, handler: Arc<dyn ProtocolHandler>) -> Self {
        self.advanced_media = Some(handler);
        self
    }

    /// Install the storage watcher
    pub fn with_storage(mut self, watcher: Arc<dyn StorageWatcher>) -> Self {
        self.storage = Some(watcher);
        self
    }

    /// Install the debugger agent
    pub fn with_debugger(mut self, agent: Arc<dyn DebugAgent>) -> Self {
        self.debugger = Some(agent);
        self
    }

    /// Install the platform event waiter
    pub fn with_waiter(mut self, waiter: Arc<dyn EventWaiter>) -> Self {
        self.waiter = Some(waiter);
        self
    }

    /// Installed collaborators
    pub fn caps(&self) -> ProtocolCaps {
        let mut caps = ProtocolCaps::empty();
        caps.set(ProtocolCaps::PUSH, self.push.is_some());
        caps.set(ProtocolCaps::MESSAGING, self.messaging.is_some());
        caps.set(ProtocolCaps::LOCATION, self.location.is_some());
        caps.set(ProtocolCaps::CARD_READER, self.card_reader.is_some());
        caps.set(ProtocolCaps::SENSOR, self.sensor.is_some());
        caps.set(ProtocolCaps::ADVANCED_MEDIA, self.advanced_media.is_some());
        caps.set(ProtocolCaps::STORAGE, self.storage.is_some());
        caps.set(ProtocolCaps::DEBUGGER, self.debugger.is_some());
        caps.set(ProtocolCaps::WAITER, self.waiter.is_some());
        caps
    }

    /// Push registry, if installed
    pub fn push(&self) -> Option<&Arc<dyn PushRegistry>> {
        self.push.as_ref()
    }

    /// Platform event waiter, if installed
    pub fn waiter(&self) -> Option<&dyn EventWaiter> {
        self.waiter.as_deref()
    }

    pub(crate) fn storage(&self) -> Option<&dyn StorageWatcher> {
        self.storage.as_deref()
    }

    pub(crate) fn debugger(&self) -> Option<&dyn DebugAgent> {
        self.debugger.as_deref()
    }

    /// Handler responsible for `kind`, if installed
    pub(crate) fn handler_for(&self, kind: WaitKind) -> Option<&dyn ProtocolHandler> {
        let handler = match kind {
            WaitKind::NetworkRead | WaitKind::NetworkWrite | WaitKind::HostNameLookup => {
                &self.messaging
            },
            kind if kind.is_messaging() => &self.messaging,
            WaitKind::Location => &self.location,
            WaitKind::CardReaderData => &self.card_reader,
            WaitKind::Sensor => &self.sensor,
            WaitKind::MediaEvent => &self.advanced_media,
            _ => return None,
        };
        handler.as_deref()
    }

    /// Offer a signal to the handler responsible for `kind`.
    ///
    /// Returns `false` when no handler is installed or it declined.
    pub(crate) fn offer(&self, kind: WaitKind, descriptor: i32, status: i32) -> bool {
        match self.handler_for(kind) {
            Some(handler) => {
                let claimed = handler.try_handle(kind, descriptor, status);
                log::debug!(
                    "Protocols: {} {} {:?} on {}",
                    handler.name(),
                    if claimed { "claimed" } else { "declined" },
                    kind,
                    descriptor
                );
                claimed
            },
            None => false,
        }
    }
}

impl core::fmt::Debug for Protocols {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Protocols").field("caps", &self.caps()).finish()
    }
}
