//! # Event Buffer
//!
//! Fixed-capacity store of raw event records between the platform (producer)
//! and the dispatcher (consumer).
//!
//! ## Layout
//!
//! ```text
//!            cursor (next write)
//!               │
//!   ┌─────┬─────┼─────┬─────┐
//!   │ r0  │ r1  │     │     │   count = 2, N = 4
//!   └─────┴─────┴─────┴─────┘
//!           ▲
//!           └── Lifo removes cursor - 1, Fifo removes cursor - count
//! ```
//!
//! Failed operations never change `count` or `cursor`.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use heapless::Vec;
use spin::Mutex;
use vmrelay_hal::{PlatformEvent, MAX_RECORD_LEN};

use crate::collab::EventWaiter;
use crate::config::RemovalOrder;
use crate::error::{RelayError, RelayResult};
use crate::timeslice::{WaitCancel, WaitTimeout};

/// Storage of one record
type Slot = Vec<u8, MAX_RECORD_LEN>;

// =============================================================================
// Event Buffer
// =============================================================================

/// Bounded record buffer with `N` slots
#[derive(Debug)]
pub struct EventBuffer<const N: usize> {
    slots: [Slot; N],
    /// Records currently stored
    count: usize,
    /// Next write position
    cursor: usize,
    order: RemovalOrder,
}

impl<const N: usize> EventBuffer<N> {
    const NON_EMPTY: () = assert!(N > 0, "event buffer needs at least one slot");

    /// Create an empty buffer
    pub fn new(order: RemovalOrder) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::NON_EMPTY;
        Self {
            slots: core::array::from_fn(|_| Vec::new()),
            count: 0,
            cursor: 0,
            order,
        }
    }

    /// Store a copy of `record`
    pub fn append(&mut self, record: &[u8]) -> RelayResult<()> {
        if self.count == N {
            return Err(RelayError::Full);
        }
        if record.len() > MAX_RECORD_LEN {
            return Err(RelayError::Oversize {
                len: record.len(),
                max: MAX_RECORD_LEN,
            });
        }

        let slot = &mut self.slots[self.cursor];
        slot.clear();
        slot.extend_from_slice(record).map_err(|()| RelayError::Oversize {
            len: record.len(),
            max: MAX_RECORD_LEN,
        })?;

        self.cursor = (self.cursor + 1) % N;
        self.count += 1;
        Ok(())
    }

    /// Copy the next record into `dest` and discard it.
    ///
    /// Returns the record length. On `TooLarge` the record stays queued.
    pub fn remove(&mut self, dest: &mut [u8]) -> RelayResult<usize> {
        if self.count == 0 {
            return Err(RelayError::Empty);
        }

        let index = self.read_index();
        let slot = &mut self.slots[index];
        let len = slot.len();
        if len > dest.len() {
            return Err(RelayError::TooLarge {
                required: len,
                available: dest.len(),
            });
        }

        dest[..len].copy_from_slice(&slot[..]);
        slot.clear();
        self.count -= 1;
        if self.order == RemovalOrder::Lifo {
            self.cursor = index;
        }
        Ok(len)
    }

    /// Length of the record `remove` would return next
    pub fn peek_len(&self) -> Option<usize> {
        if self.count == 0 {
            None
        } else {
            Some(self.slots[self.read_index()].len())
        }
    }

    fn read_index(&self) -> usize {
        match self.order {
            RemovalOrder::Lifo => (self.cursor + N - 1) % N,
            RemovalOrder::Fifo => (self.cursor + N - self.count) % N,
        }
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.count
    }

    /// Check if no record is stored
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Check if every slot is in use
    pub fn is_full(&self) -> bool {
        self.count == N
    }

    /// Number of slots
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Next write position
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Removal order
    pub fn order(&self) -> RemovalOrder {
        self.order
    }
}

// =============================================================================
// Shared Buffer
// =============================================================================

/// Event buffer shared between the platform thread and the dispatcher
#[derive(Debug)]
pub struct SharedEventBuffer<const N: usize> {
    buffer: Mutex<EventBuffer<N>>,
    /// Waits are cancelled
    closed: AtomicBool,
    appended: AtomicU64,
    removed: AtomicU64,
    rejected_full: AtomicU64,
    rejected_oversize: AtomicU64,
    too_large: AtomicU64,
}

impl<const N: usize> SharedEventBuffer<N> {
    /// Create an empty shared buffer
    pub fn new(order: RemovalOrder) -> Self {
        Self {
            buffer: Mutex::new(EventBuffer::new(order)),
            closed: AtomicBool::new(false),
            appended: AtomicU64::new(0),
            removed: AtomicU64::new(0),
            rejected_full: AtomicU64::new(0),
            rejected_oversize: AtomicU64::new(0),
            too_large: AtomicU64::new(0),
        }
    }

    /// Store a raw record (platform side)
    pub fn append(&self, record: &[u8]) -> RelayResult<()> {
        let result = self.buffer.lock().append(record);
        match result {
            Ok(()) => {
                self.appended.fetch_add(1, Ordering::Relaxed);
            },
            Err(RelayError::Full) => {
                self.rejected_full.fetch_add(1, Ordering::Relaxed);
                log::warn!("EventBuffer: full, dropping {} byte record", record.len());
            },
            Err(RelayError::Oversize { len, max }) => {
                self.rejected_oversize.fetch_add(1, Ordering::Relaxed);
                log::warn!("EventBuffer: record of {} bytes exceeds {}", len, max);
            },
            Err(_) => {},
        }
        result
    }

    /// Encode and store a platform event
    pub fn send(&self, event: &PlatformEvent) -> RelayResult<()> {
        let mut scratch = [0u8; MAX_RECORD_LEN];
        let len = event.encode(&mut scratch)?;
        self.append(&scratch[..len])
    }

    /// Remove the next record without waiting
    pub fn try_receive(&self, dest: &mut [u8]) -> RelayResult<usize> {
        let result = self.buffer.lock().remove(dest);
        match result {
            Ok(_) => {
                self.removed.fetch_add(1, Ordering::Relaxed);
            },
            Err(RelayError::TooLarge { .. }) => {
                self.too_large.fetch_add(1, Ordering::Relaxed);
            },
            Err(_) => {},
        }
        result
    }

    /// Remove the next record, waiting once through `waiter` if empty.
    ///
    /// The lock is not held while waiting. A closed buffer never waits.
    pub fn receive(
        &self,
        dest: &mut [u8],
        timeout: WaitTimeout,
        waiter: Option<&dyn EventWaiter>,
    ) -> RelayResult<usize> {
        match self.try_receive(dest) {
            Err(RelayError::Empty) if !timeout.is_immediate() && !self.is_closed() => {
                match waiter {
                    Some(waiter) => {
                        waiter.wait(timeout);
                        self.try_receive(dest)
                    },
                    None => Err(RelayError::Empty),
                }
            },
            other => other,
        }
    }

    /// Stop all future waits
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Check if the buffer was closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Check if no record is stored
    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    /// Buffer statistics
    pub fn stats(&self) -> BufferStats {
        BufferStats {
            appended: self.appended.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
            rejected_full: self.rejected_full.load(Ordering::Relaxed),
            rejected_oversize: self.rejected_oversize.load(Ordering::Relaxed),
            too_large: self.too_large.load(Ordering::Relaxed),
            len: self.len(),
            capacity: N,
        }
    }
}

impl<const N: usize> WaitCancel for SharedEventBuffer<N> {
    fn cancel_waits(&self) {
        self.close();
    }
}

/// Event buffer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Records accepted
    pub appended: u64,
    /// Records handed out
    pub removed: u64,
    /// Appends rejected because the buffer was full
    pub rejected_full: u64,
    /// Appends rejected because the record was too long
    pub rejected_oversize: u64,
    /// Removals refused because the destination was too short
    pub too_large: u64,
    /// Current number of records
    pub len: usize,
    /// Capacity
    pub capacity: usize,
}
