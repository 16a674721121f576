//! # vmrelay Core
//!
//! Event routing core of a cooperative ("slave-mode") VM runtime. The
//! platform pushes raw event records into a bounded buffer; the VM's polling
//! cycle drains them, decodes each into a wake-up signal and/or an
//! application event, and wakes the blocked execution contexts the signal
//! was meant for.
//!
//! ## Components
//!
//! - **Event Buffer**: bounded record store shared with the platform thread
//! - **Decoder**: pure mapping from a record to a signal and/or VM event
//! - **Matcher**: exact, wildcard and multimedia-range context wake-up
//! - **Dispatcher**: routes decoded records to the VM and to collaborators
//! - **Time-Slice Gate**: wait-timeout conversion and the shutdown sentinel
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vmrelay_core::{Dispatcher, Protocols, RelayConfig, PlatformEvent};
//!
//! let mut dispatcher: Dispatcher = Dispatcher::new(RelayConfig::default(), Protocols::new());
//!
//! // Platform side
//! dispatcher.buffer().send(&PlatformEvent::Resume)?;
//!
//! // VM side, once notified
//! dispatcher.inform_event(&vm);
//!
//! // VM side, from the outer loop
//! let gate = dispatcher.time_slice_gate();
//! match gate.time_slice(&vm, &vm).decision {
//!     Slice::Shutdown => return,
//!     Slice::Run(timeout) => { dispatcher.handle_events(&vm, timeout); },
//! }
//! ```

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

pub mod buffer;
pub mod collab;
pub mod config;
pub mod context;
pub mod decode;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod matcher;
pub mod signal;
pub mod timeslice;

pub use buffer::{BufferStats, EventBuffer, SharedEventBuffer};
pub use collab::{
    DebugAgent, EventOwner, EventQueue, EventQueues, EventWaiter, ProtocolCaps, ProtocolHandler,
    Protocols, PushRegistry, StorageWatcher, ThreadControl, VmRuntime,
};
pub use config::{RelayConfig, RemovalOrder, DEFAULT_MAX_EVENTS};
pub use context::{BlockedContext, ContextId, ReentryData, ReentryHandle};
pub use decode::{decode, try_decode, Decoded};
pub use dispatch::{DispatchState, DispatchStats, Dispatcher, Poll, Route};
pub use error::{RelayError, RelayResult};
pub use event::VmEvent;
pub use matcher::{unblock_context, unblock_media_context, MatchOutcome};
pub use signal::{pack_media_descriptor, unpack_media_descriptor, OpaqueResult, Signal};
pub use timeslice::{
    Finalizer, ScheduleNotifier, Slice, SliceSource, TimeSlice, TimeSliceGate, WaitCancel,
    WaitTimeout, SHUTDOWN_SENTINEL,
};
pub use vmrelay_hal::{
    CardOperation, EventTag, MediaCode, MediaPayload, PlatformEvent, RecordError, WaitKind,
    MAX_RECORD_LEN,
};
