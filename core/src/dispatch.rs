//! # Dispatch Loop
//!
//! Drains the event buffer and routes every decoded record.
//!
//! ```text
//!  SharedEventBuffer ──remove──▶ decode ──▶ route
//!                                             │
//!          ┌──────────────┬───────────────────┼──────────────┬──────────────┐
//!          ▼              ▼                   ▼              ▼              ▼
//!    VM event queues   Matcher          signal_all     collaborators   free_result
//!    (AMS, UI, VM)   (exact/wild/range)  (broadcast)   (push, WMA...)  (leftovers)
//! ```
//!
//! One [`Dispatcher::handle_events`] call handles at most one record.
//! [`Dispatcher::inform_event`] repeats it without waiting until the buffer
//! reports empty.

use alloc::sync::Arc;

use vmrelay_hal::{WaitKind, MAX_RECORD_LEN};

use crate::buffer::SharedEventBuffer;
use crate::collab::{EventOwner, EventQueue, Protocols, PushRegistry, VmRuntime};
use crate::config::{RelayConfig, DEFAULT_MAX_EVENTS};
use crate::context::{BlockedContext, ContextId};
use crate::decode::{self, Decoded};
use crate::error::RelayError;
use crate::event::VmEvent;
use crate::matcher::{unblock_context, unblock_media_context, MatchOutcome};
use crate::signal::{OpaqueResult, Signal};
use crate::timeslice::{TimeSliceGate, WaitTimeout};

// =============================================================================
// Outcomes
// =============================================================================

/// Dispatcher state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// Last call handled a record
    Draining,
    /// Last call found nothing to do, or handled a lifecycle event
    Idle,
}

/// Outcome of one [`Dispatcher::handle_events`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// Buffer was empty
    Idle,
    /// One record was handled
    Handled(Route),
}

/// Where a record went
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// VM event posted to a queue
    Posted(EventQueue),
    /// One blocked context was woken
    Woken(ContextId),
    /// Broadcast to every waiter of a kind; number woken
    Broadcast(usize),
    /// Socket exception; read and write waiters woken
    Exception {
        /// Read waiter, if any
        read: Option<ContextId>,
        /// Write waiter, if any
        write: Option<ContextId>,
    },
    /// Basic multimedia event posted, range waiter woken if any
    Media(Option<ContextId>),
    /// A protocol collaborator claimed the signal
    Claimed,
    /// Debugger commands processed
    Debugger,
    /// Storage watcher notified
    Storage,
    /// Nobody took the record
    Unmatched,
    /// Record could not be decoded
    Unrecognized,
}

/// Dispatcher statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Records removed from the buffer
    pub records: u64,
    /// Contexts woken through the matcher
    pub matched: u64,
    /// Records nobody took
    pub unmatched: u64,
    /// Broadcast wake-ups
    pub broadcasts: u64,
    /// Signals claimed by collaborators
    pub forwarded: u64,
    /// VM events posted
    pub posted: u64,
    /// Records that failed to decode
    pub unrecognized: u64,
    /// Results handed to `free_result`
    pub released: u64,
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Event dispatcher over a buffer of `N` records
#[derive(Debug)]
pub struct Dispatcher<const N: usize = DEFAULT_MAX_EVENTS> {
    buffer: Arc<SharedEventBuffer<N>>,
    config: RelayConfig,
    protocols: Protocols,
    state: DispatchState,
    stats: DispatchStats,
    /// Destination of `remove`
    scratch: [u8; MAX_RECORD_LEN],
}

impl<const N: usize> Dispatcher<N> {
    /// Create a dispatcher with its own buffer
    pub fn new(config: RelayConfig, protocols: Protocols) -> Self {
        let buffer = Arc::new(SharedEventBuffer::new(config.removal_order));
        Self::with_buffer(buffer, config, protocols)
    }

    /// Create a dispatcher over an existing buffer
    pub fn with_buffer(
        buffer: Arc<SharedEventBuffer<N>>,
        config: RelayConfig,
        protocols: Protocols,
    ) -> Self {
        log::debug!(
            "Dispatch: {} slots, {:?} removal, batch {:?}, caps {:?}",
            N,
            config.removal_order,
            config.max_drain_batch,
            protocols.caps()
        );

        Self {
            buffer,
            config,
            protocols,
            state: DispatchState::Idle,
            stats: DispatchStats::default(),
            scratch: [0; MAX_RECORD_LEN],
        }
    }

    /// Buffer the platform appends to
    pub fn buffer(&self) -> &Arc<SharedEventBuffer<N>> {
        &self.buffer
    }

    /// Installed collaborators
    pub fn protocols(&self) -> &Protocols {
        &self.protocols
    }

    /// Current state
    pub fn state(&self) -> DispatchState {
        self.state
    }

    /// Statistics so far
    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Time-slice gate wired to this dispatcher's buffer and push registry
    pub fn time_slice_gate(&self) -> TimeSliceGate {
        let gate = TimeSliceGate::new().with_wait_cancel(self.buffer.clone());
        match self.protocols.push() {
            Some(push) => gate.with_push(push.clone()),
            None => gate,
        }
    }

    /// Handle at most one record, waiting up to `timeout` for it
    pub fn handle_events<V>(&mut self, vm: &V, timeout: WaitTimeout) -> Poll
    where
        V: VmRuntime + ?Sized,
    {
        let contexts = vm.blocked_contexts();

        let len = match self
            .buffer
            .receive(&mut self.scratch, timeout, self.protocols.waiter())
        {
            Ok(len) => len,
            Err(RelayError::Empty) => {
                self.state = DispatchState::Idle;
                return Poll::Idle;
            },
            Err(err) => {
                log::error!("Dispatch: cannot remove record: {}", err);
                self.state = DispatchState::Idle;
                return Poll::Idle;
            },
        };

        self.state = DispatchState::Draining;
        self.stats.records += 1;

        let decoded = match decode::try_decode(&self.scratch[..len]) {
            Ok(decoded) => decoded,
            Err(err) => {
                log::error!("Dispatch: dropping {} byte record: {}", len, err);
                self.stats.unrecognized += 1;
                return Poll::Handled(Route::Unrecognized);
            },
        };
        log::trace!("Dispatch: {:?}", decoded);

        let route = self.route(vm, &contexts, decoded);
        match route {
            Route::Unmatched => self.stats.unmatched += 1,
            Route::Claimed => self.stats.forwarded += 1,
            _ => {},
        }
        Poll::Handled(route)
    }

    /// Handle every pending record without waiting.
    ///
    /// Stops when the buffer is empty or the configured batch is reached.
    /// Returns the number of records handled.
    pub fn inform_event<V: VmRuntime + ?Sized>(&mut self, vm: &V) -> usize {
        let mut handled = 0;
        loop {
            if self.config.max_drain_batch.is_some_and(|cap| handled >= cap) {
                break;
            }
            match self.handle_events(vm, WaitTimeout::IMMEDIATE) {
                Poll::Idle => break,
                Poll::Handled(_) => handled += 1,
            }
        }
        handled
    }

    // =========================================================================
    // Routing
    // =========================================================================

    fn route<V: VmRuntime + ?Sized>(
        &mut self,
        vm: &V,
        contexts: &[BlockedContext],
        decoded: Decoded,
    ) -> Route {
        let Decoded { signal, event } = decoded;

        if let Some(VmEvent::Media { isolate_id, .. }) = event {
            return self.route_media(vm, contexts, signal, event, isolate_id);
        }

        let Some(mut signal) = signal else {
            return match event {
                Some(VmEvent::RootsChanged) => self.roots_changed(),
                _ => Route::Unmatched,
            };
        };

        let mut result = signal.result.take();
        let route = self.route_signal(vm, contexts, &signal, event, &mut result);

        if let Some(result) = result {
            log::warn!(
                "Dispatch: releasing unclaimed result of {:?} on {}",
                signal.waiting_for,
                signal.descriptor
            );
            self.stats.released += 1;
            vm.free_result(signal.waiting_for, result);
        }

        route
    }

    fn route_signal<V: VmRuntime + ?Sized>(
        &mut self,
        vm: &V,
        contexts: &[BlockedContext],
        signal: &Signal,
        event: Option<VmEvent>,
        result: &mut Option<OpaqueResult>,
    ) -> Route {
        let Signal {
            waiting_for: kind,
            descriptor,
            status,
            ..
        } = *signal;

        match kind {
            WaitKind::Ams => {
                let route = self.post(vm, EventQueue::Ams, event, EventOwner::Any);
                self.state = DispatchState::Idle;
                route
            },
            WaitKind::Ui => self.post(vm, EventQueue::Foreground, event, EventOwner::Any),
            WaitKind::NetworkRead => {
                match self.unblock(vm, contexts, kind, descriptor, status, result) {
                    Some(id) => Route::Woken(id),
                    None if self.push_wants(|push| push.find_blocked_handle(descriptor)) => {
                        self.broadcast(vm, contexts, WaitKind::Push, 0, 0)
                    },
                    None => self.offer(kind, descriptor, status),
                }
            },
            WaitKind::NetworkWrite | WaitKind::HostNameLookup => {
                if self.protocols.offer(kind, descriptor, status) {
                    Route::Claimed
                } else {
                    self.broadcast(vm, contexts, kind, descriptor, status)
                }
            },
            WaitKind::NetworkException => {
                let read = self.unblock(
                    vm,
                    contexts,
                    WaitKind::NetworkRead,
                    descriptor,
                    status,
                    result,
                );
                let write = self.unblock(
                    vm,
                    contexts,
                    WaitKind::NetworkWrite,
                    descriptor,
                    status,
                    result,
                );
                if read.is_none() && write.is_none() {
                    Route::Unmatched
                } else {
                    Route::Exception { read, write }
                }
            },
            WaitKind::PushAlarm => {
                if self.push_wants(|push| push.find_timer_handle(descriptor)) {
                    self.broadcast(vm, contexts, WaitKind::Push, 0, 0)
                } else {
                    Route::Unmatched
                }
            },
            kind if kind.is_messaging() => self.offer(kind, descriptor, status),
            WaitKind::Location | WaitKind::CardReaderData => {
                if self.protocols.offer(kind, descriptor, status) {
                    Route::Claimed
                } else {
                    self.broadcast(vm, contexts, kind, descriptor, status)
                }
            },
            WaitKind::Sensor => match event {
                Some(event) => self.post(vm, EventQueue::VmThread, Some(event), EventOwner::Any),
                None if self.protocols.offer(kind, descriptor, status) => Route::Claimed,
                None => self.broadcast(vm, contexts, kind, descriptor, status),
            },
            WaitKind::MediaEvent => {
                if self.protocols.offer(kind, descriptor, status) {
                    return Route::Claimed;
                }
                let owner = event
                    .and_then(|event| event.isolate())
                    .map_or(EventOwner::Any, EventOwner::Isolate);
                self.post(vm, EventQueue::VmThread, event, owner)
            },
            WaitKind::VmDebug => match self.protocols.debugger() {
                Some(agent) if agent.is_active() => {
                    agent.process_commands();
                    Route::Debugger
                },
                _ => Route::Unmatched,
            },
            kind if kind.is_media() => {
                match unblock_media_context(vm, contexts, kind, descriptor, status) {
                    MatchOutcome::Matched(id) => {
                        self.stats.matched += 1;
                        Route::Woken(id)
                    },
                    MatchOutcome::NoMatch(_) => Route::Unmatched,
                }
            },
            WaitKind::NoSignal => {
                match self.unblock(vm, contexts, kind, descriptor, status, result) {
                    Some(id) => Route::Woken(id),
                    None => Route::Unmatched,
                }
            },
            _ => {
                log::debug!("Dispatch: no route for {:?} on {}", kind, descriptor);
                Route::Unmatched
            },
        }
    }

    /// Post the event to the owning isolate and wake a range waiter if the
    /// notification ends a blocked operation
    fn route_media<V: VmRuntime + ?Sized>(
        &mut self,
        vm: &V,
        contexts: &[BlockedContext],
        signal: Option<Signal>,
        event: Option<VmEvent>,
        isolate_id: i32,
    ) -> Route {
        self.post(vm, EventQueue::VmThread, event, EventOwner::Isolate(isolate_id));

        let woken = signal.and_then(|signal| {
            match unblock_media_context(
                vm,
                contexts,
                signal.waiting_for,
                signal.descriptor,
                signal.status,
            ) {
                MatchOutcome::Matched(id) => {
                    self.stats.matched += 1;
                    Some(id)
                },
                MatchOutcome::NoMatch(_) => None,
            }
        });

        Route::Media(woken)
    }

    fn roots_changed(&mut self) -> Route {
        match self.protocols.storage() {
            Some(watcher) => {
                watcher.roots_changed();
                Route::Storage
            },
            None => Route::Unmatched,
        }
    }

    fn post<V: VmRuntime + ?Sized>(
        &mut self,
        vm: &V,
        queue: EventQueue,
        event: Option<VmEvent>,
        owner: EventOwner,
    ) -> Route {
        match event {
            Some(event) => {
                log::debug!("Dispatch: posting {:?} to {:?} ({:?})", event, queue, owner);
                vm.post(queue, event, owner);
                self.stats.posted += 1;
                Route::Posted(queue)
            },
            None => Route::Unmatched,
        }
    }

    /// Exact (or wildcard) match, moving the result on success
    fn unblock<V: VmRuntime + ?Sized>(
        &mut self,
        vm: &V,
        contexts: &[BlockedContext],
        kind: WaitKind,
        descriptor: i32,
        status: i32,
        result: &mut Option<OpaqueResult>,
    ) -> Option<ContextId> {
        match unblock_context(vm, contexts, kind, descriptor, status, result.take()) {
            MatchOutcome::Matched(id) => {
                self.stats.matched += 1;
                Some(id)
            },
            MatchOutcome::NoMatch(unclaimed) => {
                *result = unclaimed;
                None
            },
        }
    }

    fn broadcast<V: VmRuntime + ?Sized>(
        &mut self,
        vm: &V,
        contexts: &[BlockedContext],
        kind: WaitKind,
        descriptor: i32,
        status: i32,
    ) -> Route {
        let woken = vm.signal_all(contexts, kind, descriptor, status);
        self.stats.broadcasts += 1;
        log::debug!("Dispatch: {:?} on {} woke {}", kind, descriptor, woken);
        Route::Broadcast(woken)
    }

    fn offer(&self, kind: WaitKind, descriptor: i32, status: i32) -> Route {
        if self.protocols.offer(kind, descriptor, status) {
            Route::Claimed
        } else {
            Route::Unmatched
        }
    }

    fn push_wants<F>(&self, check: F) -> bool
    where
        F: FnOnce(&dyn PushRegistry) -> bool,
    {
        self.protocols.push().is_some_and(|push| check(&**push))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{DebugAgent, EventQueues, ProtocolHandler, StorageWatcher, ThreadControl};
    use crate::config::RemovalOrder;
    use crate::signal::pack_media_descriptor;
    use crate::timeslice::{Finalizer, Slice, SliceSource, SHUTDOWN_SENTINEL};
    use alloc::vec;
    use alloc::vec::Vec;
    use spin::Mutex;
    use vmrelay_hal::record::MediaPayload;
    use vmrelay_hal::{CardOperation, MediaCode, PlatformEvent};

    // -------------------------------------------------------------------------
    // Mocks
    // -------------------------------------------------------------------------

    #[derive(Default)]
    struct MockVm {
        contexts: Mutex<Vec<BlockedContext>>,
        unblocked: Mutex<Vec<ContextId>>,
        posted: Mutex<Vec<(EventQueue, VmEvent, EventOwner)>>,
        freed: Mutex<Vec<(WaitKind, u64)>>,
        finalized: Mutex<bool>,
    }

    impl MockVm {
        fn with(contexts: Vec<BlockedContext>) -> Self {
            let vm = Self::default();
            *vm.contexts.lock() = contexts;
            vm
        }

        fn unblocked(&self) -> Vec<ContextId> {
            self.unblocked.lock().clone()
        }

        fn posted(&self) -> Vec<(EventQueue, VmEvent, EventOwner)> {
            self.posted.lock().clone()
        }
    }

    impl ThreadControl for MockVm {
        fn blocked_contexts(&self) -> Vec<BlockedContext> {
            self.contexts.lock().clone()
        }

        fn unblock(&self, id: ContextId) {
            self.unblocked.lock().push(id);
        }

        fn free_result(&self, kind: WaitKind, result: OpaqueResult) {
            self.freed.lock().push((kind, result.into_raw()));
        }
    }

    impl EventQueues for MockVm {
        fn post(&self, queue: EventQueue, event: VmEvent, owner: EventOwner) {
            self.posted.lock().push((queue, event, owner));
        }
    }

    impl SliceSource for MockVm {
        fn next_time_slice(&self) -> i64 {
            SHUTDOWN_SENTINEL
        }
    }

    impl Finalizer for MockVm {
        fn measure_stack(&self, _enabled: bool) {}

        fn finalize(&self) {
            *self.finalized.lock() = true;
        }
    }

    #[derive(Default)]
    struct MockPush {
        read_handles: Vec<i32>,
        alarms: Vec<i32>,
    }

    impl PushRegistry for MockPush {
        fn find_blocked_handle(&self, descriptor: i32) -> bool {
            self.read_handles.contains(&descriptor)
        }

        fn find_timer_handle(&self, alarm_handle: i32) -> bool {
            self.alarms.contains(&alarm_handle)
        }
    }

    struct MockHandler {
        claims: bool,
        calls: Mutex<Vec<(WaitKind, i32, i32)>>,
    }

    impl MockHandler {
        fn new(claims: bool) -> Arc<Self> {
            Arc::new(Self {
                claims,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    impl ProtocolHandler for MockHandler {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn try_handle(&self, kind: WaitKind, descriptor: i32, status: i32) -> bool {
            self.calls.lock().push((kind, descriptor, status));
            self.claims
        }
    }

    #[derive(Default)]
    struct Counter(Mutex<usize>);

    impl StorageWatcher for Counter {
        fn roots_changed(&self) {
            *self.0.lock() += 1;
        }
    }

    impl DebugAgent for Counter {
        fn is_active(&self) -> bool {
            true
        }

        fn process_commands(&self) {
            *self.0.lock() += 1;
        }
    }

    fn dispatcher(protocols: Protocols) -> Dispatcher<8> {
        Dispatcher::new(RelayConfig::default(), protocols)
    }

    fn waiting(id: u32, kind: WaitKind, descriptor: i32) -> BlockedContext {
        BlockedContext::waiting(ContextId(id), kind, descriptor)
    }

    fn socket(kind: WaitKind, handle: i32, status: i32, extra: u64) -> PlatformEvent {
        PlatformEvent::Socket {
            handle,
            waiting_for: kind.code(),
            status,
            extra,
        }
    }

    fn handle_one(dispatcher: &mut Dispatcher<8>, vm: &MockVm, event: PlatformEvent) -> Poll {
        dispatcher.buffer().send(&event).unwrap();
        dispatcher.handle_events(vm, WaitTimeout::IMMEDIATE)
    }

    // -------------------------------------------------------------------------
    // Scenarios
    // -------------------------------------------------------------------------

    #[test]
    fn test_shutdown_posts_to_ams() {
        let vm = MockVm::default();
        let mut dispatcher = dispatcher(Protocols::new());

        let poll = handle_one(&mut dispatcher, &vm, PlatformEvent::End);

        assert_eq!(poll, Poll::Handled(Route::Posted(EventQueue::Ams)));
        assert_eq!(
            vm.posted(),
            [(EventQueue::Ams, VmEvent::Shutdown, EventOwner::Any)]
        );
        assert!(vm.unblocked().is_empty());
        assert_eq!(dispatcher.state(), DispatchState::Idle);
    }

    #[test]
    fn test_key_posts_to_foreground() {
        let vm = MockVm::default();
        let mut dispatcher = dispatcher(Protocols::new());

        let poll = handle_one(&mut dispatcher, &vm, PlatformEvent::Key { key: 49, action: 1 });

        assert_eq!(poll, Poll::Handled(Route::Posted(EventQueue::Foreground)));
        assert_eq!(vm.posted()[0].1, VmEvent::Key { code: 49, action: 1 });
        assert_eq!(dispatcher.state(), DispatchState::Draining);
    }

    #[test]
    fn test_socket_read_wakes_exact_context() {
        let contexts = vec![
            waiting(1, WaitKind::NetworkWrite, 7),
            waiting(2, WaitKind::NetworkRead, 7),
            waiting(3, WaitKind::NetworkRead, 8),
        ];
        let vm = MockVm::with(contexts.clone());
        let mut dispatcher = dispatcher(Protocols::new());

        let poll = handle_one(
            &mut dispatcher,
            &vm,
            socket(WaitKind::NetworkRead, 7, 64, 0x55),
        );

        assert_eq!(poll, Poll::Handled(Route::Woken(ContextId(2))));
        assert_eq!(vm.unblocked(), [ContextId(2)]);
        let data = contexts[1].reentry().unwrap();
        assert_eq!(data.status, 64);
        assert_eq!(data.result, Some(OpaqueResult::new(0x55)));
        assert!(vm.freed.lock().is_empty());
    }

    #[test]
    fn test_socket_read_falls_back_to_push() {
        let vm = MockVm::with(vec![
            waiting(1, WaitKind::Push, 0),
            waiting(2, WaitKind::NetworkRead, 3),
        ]);
        let push = MockPush {
            read_handles: vec![9],
            ..MockPush::default()
        };
        let mut dispatcher = dispatcher(Protocols::new().with_push(Arc::new(push)));

        let poll = handle_one(&mut dispatcher, &vm, socket(WaitKind::NetworkRead, 9, 0, 0));

        assert_eq!(poll, Poll::Handled(Route::Broadcast(1)));
        assert_eq!(vm.unblocked(), [ContextId(1)]);
    }

    #[test]
    fn test_socket_read_falls_back_to_messaging() {
        let vm = MockVm::default();
        let messaging = MockHandler::new(true);
        let mut dispatcher = dispatcher(Protocols::new().with_messaging(messaging.clone()));

        let poll = handle_one(&mut dispatcher, &vm, socket(WaitKind::NetworkRead, 9, 1, 0));

        assert_eq!(poll, Poll::Handled(Route::Claimed));
        assert_eq!(*messaging.calls.lock(), [(WaitKind::NetworkRead, 9, 1)]);
        assert_eq!(dispatcher.stats().forwarded, 1);
    }

    #[test]
    fn test_unclaimed_result_released() {
        let vm = MockVm::default();
        let mut dispatcher = dispatcher(Protocols::new());

        let poll = handle_one(
            &mut dispatcher,
            &vm,
            socket(WaitKind::NetworkRead, 9, 0, 0xBEEF),
        );

        assert_eq!(poll, Poll::Handled(Route::Unmatched));
        assert_eq!(*vm.freed.lock(), [(WaitKind::NetworkRead, 0xBEEF)]);
        assert_eq!(dispatcher.stats().released, 1);
        assert_eq!(dispatcher.stats().unmatched, 1);
    }

    #[test]
    fn test_network_exception_wakes_read_and_write() {
        let vm = MockVm::with(vec![
            waiting(1, WaitKind::NetworkRead, 7),
            waiting(2, WaitKind::NetworkWrite, 7),
            waiting(3, WaitKind::NetworkRead, 8),
            waiting(4, WaitKind::HostNameLookup, 7),
        ]);
        let mut dispatcher = dispatcher(Protocols::new());

        let poll = handle_one(
            &mut dispatcher,
            &vm,
            socket(WaitKind::NetworkException, 7, -5, 0),
        );

        assert_eq!(
            poll,
            Poll::Handled(Route::Exception {
                read: Some(ContextId(1)),
                write: Some(ContextId(2)),
            })
        );
        assert_eq!(vm.unblocked(), [ContextId(1), ContextId(2)]);
    }

    #[test]
    fn test_network_write_broadcast_when_declined() {
        let vm = MockVm::with(vec![
            waiting(1, WaitKind::NetworkWrite, 7),
            waiting(2, WaitKind::NetworkWrite, 7),
        ]);
        let messaging = MockHandler::new(false);
        let mut dispatcher = dispatcher(Protocols::new().with_messaging(messaging.clone()));

        let poll = handle_one(&mut dispatcher, &vm, socket(WaitKind::NetworkWrite, 7, 0, 0));

        assert_eq!(poll, Poll::Handled(Route::Broadcast(2)));
        assert_eq!(messaging.calls.lock().len(), 1);
    }

    #[test]
    fn test_push_alarm() {
        let vm = MockVm::with(vec![waiting(1, WaitKind::Push, 0)]);
        let push = MockPush {
            alarms: vec![4],
            ..MockPush::default()
        };
        let mut dispatcher = dispatcher(Protocols::new().with_push(Arc::new(push)));

        let unknown = handle_one(&mut dispatcher, &vm, PlatformEvent::Push { alarm_handle: 5 });
        assert_eq!(unknown, Poll::Handled(Route::Unmatched));

        let known = handle_one(&mut dispatcher, &vm, PlatformEvent::Push { alarm_handle: 4 });
        assert_eq!(known, Poll::Handled(Route::Broadcast(1)));
    }

    #[test]
    fn test_messaging_forwarded() {
        let vm = MockVm::default();
        let messaging = MockHandler::new(true);
        let mut dispatcher = dispatcher(Protocols::new().with_messaging(messaging.clone()));

        handle_one(&mut dispatcher, &vm, PlatformEvent::SmsIncoming { stub: 21 });
        handle_one(
            &mut dispatcher,
            &vm,
            PlatformEvent::MmsSendingResult {
                handle: 2,
                result: 0,
            },
        );

        assert_eq!(
            *messaging.calls.lock(),
            [(WaitKind::SmsRead, 21, 0), (WaitKind::MmsWrite, 2, 0)]
        );
    }

    #[test]
    fn test_location_without_collaborator_broadcasts() {
        let vm = MockVm::with(vec![waiting(1, WaitKind::Location, 3)]);
        let mut dispatcher = dispatcher(Protocols::new());

        let poll = handle_one(
            &mut dispatcher,
            &vm,
            PlatformEvent::Location {
                provider: 3,
                operation_result: 1,
            },
        );

        assert_eq!(poll, Poll::Handled(Route::Broadcast(1)));
        assert_eq!(vm.contexts.lock()[0].reentry().unwrap().status, 1);
    }

    #[test]
    fn test_card_reader_result_released_after_broadcast() {
        let vm = MockVm::default();
        let mut dispatcher = dispatcher(Protocols::new());

        handle_one(
            &mut dispatcher,
            &vm,
            PlatformEvent::CardDevice {
                operation: 1,
                handle: 0x77,
            },
        );

        assert_eq!(*vm.freed.lock(), [(WaitKind::CardReaderData, 0x77)]);
    }

    #[test]
    fn test_multimedia_end_of_media() {
        let descriptor = pack_media_descriptor(1, 2);
        let vm = MockVm::with(vec![
            waiting(1, WaitKind::MediaEvent, descriptor),
            waiting(2, WaitKind::MediaStop, descriptor),
        ]);
        let mut dispatcher = dispatcher(Protocols::new());

        let poll = handle_one(
            &mut dispatcher,
            &vm,
            PlatformEvent::Multimedia(MediaPayload {
                media_code: MediaCode::EndOfMedia.code(),
                app_id: 1,
                player_id: 2,
                status: 0,
                data: 10,
            }),
        );

        assert_eq!(poll, Poll::Handled(Route::Media(Some(ContextId(2)))));
        assert_eq!(
            vm.posted(),
            [(
                EventQueue::VmThread,
                VmEvent::Media {
                    kind: MediaCode::EndOfMedia,
                    player_id: 2,
                    data: 10,
                    isolate_id: 1,
                },
                EventOwner::Isolate(1),
            )]
        );
    }

    #[test]
    fn test_multimedia_duration_only_posts() {
        let vm = MockVm::with(vec![waiting(1, WaitKind::MediaStop, pack_media_descriptor(1, 2))]);
        let mut dispatcher = dispatcher(Protocols::new());

        let poll = handle_one(
            &mut dispatcher,
            &vm,
            PlatformEvent::Multimedia(MediaPayload {
                media_code: MediaCode::DurationUpdated.code(),
                app_id: 1,
                player_id: 2,
                status: 0,
                data: 10,
            }),
        );

        assert_eq!(poll, Poll::Handled(Route::Media(None)));
        assert!(vm.unblocked().is_empty());
        assert_eq!(vm.posted().len(), 1);
    }

    #[test]
    fn test_advanced_media() {
        let payload = MediaPayload {
            media_code: 3,
            app_id: 5,
            player_id: 6,
            status: 0,
            data: 0,
        };
        let vm = MockVm::default();

        let mut declined = dispatcher(Protocols::new().with_advanced_media(MockHandler::new(false)));
        let poll = handle_one(&mut declined, &vm, PlatformEvent::AdvancedMultimedia(payload));
        assert_eq!(poll, Poll::Handled(Route::Posted(EventQueue::VmThread)));
        assert_eq!(vm.posted()[0].2, EventOwner::Isolate(5));

        let handler = MockHandler::new(true);
        let mut claimed = dispatcher(Protocols::new().with_advanced_media(handler.clone()));
        let poll = handle_one(&mut claimed, &vm, PlatformEvent::AdvancedMultimedia(payload));
        assert_eq!(poll, Poll::Handled(Route::Claimed));
        assert_eq!(
            *handler.calls.lock(),
            [(WaitKind::MediaEvent, pack_media_descriptor(5, 6), 0)]
        );
        assert_eq!(vm.posted().len(), 1);
    }

    #[test]
    fn test_sensor_routes() {
        let vm = MockVm::with(vec![waiting(1, WaitKind::Sensor, 6)]);
        let mut dispatcher = dispatcher(Protocols::new());

        let available = handle_one(
            &mut dispatcher,
            &vm,
            PlatformEvent::SensorAvailable {
                sensor_type: 2,
                is_available: 0,
            },
        );
        assert_eq!(available, Poll::Handled(Route::Posted(EventQueue::VmThread)));
        assert_eq!(vm.posted()[0].2, EventOwner::Any);

        let opened = handle_one(&mut dispatcher, &vm, PlatformEvent::SensorOpenClose { sensor: 6 });
        assert_eq!(opened, Poll::Handled(Route::Broadcast(1)));
    }

    #[test]
    fn test_host_lookup_claimed_by_messaging() {
        let vm = MockVm::with(vec![waiting(1, WaitKind::HostNameLookup, 4)]);
        let messaging = MockHandler::new(true);
        let mut dispatcher = dispatcher(Protocols::new().with_messaging(messaging.clone()));

        let poll = handle_one(&mut dispatcher, &vm, socket(WaitKind::HostNameLookup, 4, 0, 0));

        assert_eq!(poll, Poll::Handled(Route::Claimed));
        assert_eq!(*messaging.calls.lock(), [(WaitKind::HostNameLookup, 4, 0)]);
        assert!(vm.unblocked().is_empty());
        assert_eq!(dispatcher.stats().forwarded, 1);
    }

    #[test]
    fn test_host_lookup_broadcast_when_declined() {
        let vm = MockVm::with(vec![
            waiting(1, WaitKind::HostNameLookup, 4),
            waiting(2, WaitKind::NetworkRead, 4),
        ]);
        let messaging = MockHandler::new(false);
        let mut dispatcher = dispatcher(Protocols::new().with_messaging(messaging.clone()));

        let poll = handle_one(&mut dispatcher, &vm, socket(WaitKind::HostNameLookup, 4, 5, 0));

        assert_eq!(poll, Poll::Handled(Route::Broadcast(1)));
        assert_eq!(messaging.calls.lock().len(), 1);
        assert_eq!(vm.contexts.lock()[0].reentry().unwrap().status, 5);
    }

    #[test]
    fn test_location_claimed() {
        let vm = MockVm::with(vec![waiting(1, WaitKind::Location, 3)]);
        let location = MockHandler::new(true);
        let mut dispatcher = dispatcher(Protocols::new().with_location(location.clone()));

        let poll = handle_one(
            &mut dispatcher,
            &vm,
            PlatformEvent::Location {
                provider: 3,
                operation_result: 1,
            },
        );

        assert_eq!(poll, Poll::Handled(Route::Claimed));
        assert_eq!(*location.calls.lock(), [(WaitKind::Location, 3, 1)]);
        assert!(vm.unblocked().is_empty());
        assert_eq!(vm.contexts.lock()[0].reentry().unwrap().status, 0);
    }

    #[test]
    fn test_card_reader_claimed() {
        let code = CardOperation::SIGNAL_XFER;
        let vm = MockVm::with(vec![waiting(1, WaitKind::CardReaderData, code)]);
        let card_reader = MockHandler::new(true);
        let mut dispatcher = dispatcher(Protocols::new().with_card_reader(card_reader.clone()));

        let poll = handle_one(
            &mut dispatcher,
            &vm,
            PlatformEvent::CardDevice {
                operation: CardOperation::Xfer.code(),
                handle: 0x55,
            },
        );

        assert_eq!(poll, Poll::Handled(Route::Claimed));
        assert_eq!(*card_reader.calls.lock(), [(WaitKind::CardReaderData, code, code)]);
        assert!(vm.unblocked().is_empty());
        assert_eq!(*vm.freed.lock(), [(WaitKind::CardReaderData, 0x55)]);
    }

    #[test]
    fn test_sensor_claimed() {
        let vm = MockVm::with(vec![waiting(1, WaitKind::Sensor, 6)]);
        let sensor = MockHandler::new(true);
        let mut dispatcher = dispatcher(Protocols::new().with_sensor(sensor.clone()));

        let poll = handle_one(&mut dispatcher, &vm, PlatformEvent::SensorOpenClose { sensor: 6 });

        assert_eq!(poll, Poll::Handled(Route::Claimed));
        assert_eq!(*sensor.calls.lock(), [(WaitKind::Sensor, 6, 0)]);
        assert!(vm.unblocked().is_empty());
    }

    #[test]
    fn test_wildcard_socket_signal() {
        let contexts = vec![waiting(1, WaitKind::NetworkWrite, 11)];
        let vm = MockVm::with(contexts.clone());
        let mut dispatcher = dispatcher(Protocols::new());

        let poll = handle_one(&mut dispatcher, &vm, socket(WaitKind::NoSignal, 11, 3, 0));

        assert_eq!(poll, Poll::Handled(Route::Woken(ContextId(1))));
        assert!(contexts[0].reentry().unwrap().is_consumed());

        let again = handle_one(&mut dispatcher, &vm, socket(WaitKind::NoSignal, 11, 3, 0));
        assert_eq!(again, Poll::Handled(Route::Unmatched));
    }

    #[test]
    fn test_roots_changed_and_debugger() {
        let vm = MockVm::default();
        let storage = Arc::new(Counter::default());
        let debugger = Arc::new(Counter::default());
        let mut dispatcher = dispatcher(
            Protocols::new()
                .with_storage(storage.clone())
                .with_debugger(debugger.clone()),
        );

        let poll = handle_one(&mut dispatcher, &vm, PlatformEvent::RootsChanged);
        assert_eq!(poll, Poll::Handled(Route::Storage));
        assert_eq!(*storage.0.lock(), 1);

        let poll = handle_one(&mut dispatcher, &vm, socket(WaitKind::VmDebug, 0, 0, 0));
        assert_eq!(poll, Poll::Handled(Route::Debugger));
        assert_eq!(*debugger.0.lock(), 1);
    }

    #[test]
    fn test_empty_buffer_is_idle() {
        let vm = MockVm::default();
        let mut dispatcher = dispatcher(Protocols::new());

        assert_eq!(dispatcher.handle_events(&vm, WaitTimeout::Forever), Poll::Idle);
        assert_eq!(dispatcher.state(), DispatchState::Idle);
        assert_eq!(dispatcher.stats(), &DispatchStats::default());
    }

    #[test]
    fn test_inform_event_drains_past_bad_records() {
        let vm = MockVm::default();
        let mut dispatcher = dispatcher(Protocols::new());
        let buffer = dispatcher.buffer().clone();

        buffer.send(&PlatformEvent::Pause).unwrap();
        buffer.append(&0x99u32.to_le_bytes()).unwrap();
        buffer.send(&PlatformEvent::Rotation).unwrap();

        assert_eq!(dispatcher.inform_event(&vm), 3);
        assert_eq!(dispatcher.state(), DispatchState::Idle);
        assert_eq!(dispatcher.stats().records, 3);
        assert_eq!(dispatcher.stats().unrecognized, 1);
        assert_eq!(
            vm.posted(),
            [
                (EventQueue::Foreground, VmEvent::Rotation, EventOwner::Any),
                (EventQueue::Ams, VmEvent::PauseAll, EventOwner::Any),
            ]
        );
    }

    #[test]
    fn test_inform_event_fifo_with_batch_cap() {
        let vm = MockVm::default();
        let config = RelayConfig::new()
            .with_removal_order(RemovalOrder::Fifo)
            .with_max_drain_batch(2);
        let mut dispatcher = Dispatcher::<8>::new(config, Protocols::new());

        for event in [PlatformEvent::Pause, PlatformEvent::Resume, PlatformEvent::End] {
            dispatcher.buffer().send(&event).unwrap();
        }

        assert_eq!(dispatcher.inform_event(&vm), 2);
        assert_eq!(dispatcher.buffer().len(), 1);
        let events: Vec<VmEvent> = vm.posted().into_iter().map(|(_, event, _)| event).collect();
        assert_eq!(events, [VmEvent::PauseAll, VmEvent::ActivateAll]);
    }

    #[test]
    fn test_gate_shutdown_closes_buffer() {
        let vm = MockVm::default();
        let dispatcher = dispatcher(Protocols::new());
        let gate = dispatcher.time_slice_gate();

        let slice = gate.time_slice(&vm, &vm);

        assert_eq!(slice.decision, Slice::Shutdown);
        assert!(*vm.finalized.lock());
        assert!(dispatcher.buffer().is_closed());
    }
}
