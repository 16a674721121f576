//! # Relay Configuration
//!
//! Runtime knobs of the dispatcher and event buffer. Buffer capacity is a
//! const generic; see [`DEFAULT_MAX_EVENTS`].

/// Default number of record slots in an event buffer
pub const DEFAULT_MAX_EVENTS: usize = 32;

static_assertions::const_assert!(DEFAULT_MAX_EVENTS > 0);

/// Order in which the event buffer hands out records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemovalOrder {
    /// Most recently appended record first
    #[default]
    Lifo,
    /// Oldest record first
    Fifo,
}

/// Relay configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelayConfig {
    /// Removal order of the event buffer
    pub removal_order: RemovalOrder,
    /// Maximum records handled by one `inform_event` call (`None` = until idle)
    pub max_drain_batch: Option<usize>,
}

impl RelayConfig {
    /// Create the default configuration
    pub const fn new() -> Self {
        Self {
            removal_order: RemovalOrder::Lifo,
            max_drain_batch: None,
        }
    }

    /// Set the removal order
    pub const fn with_removal_order(mut self, order: RemovalOrder) -> Self {
        self.removal_order = order;
        self
    }

    /// Cap the number of records handled per drain
    pub const fn with_max_drain_batch(mut self, batch: usize) -> Self {
        self.max_drain_batch = Some(batch);
        self
    }
}
