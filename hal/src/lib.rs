//! # vmrelay Platform Boundary
//!
//! Everything both sides of the platform/VM boundary must agree on lives in
//! this crate: the numeric wait-kind codes, the event tags, and the binary
//! layout of a raw event record.
//!
//! ## Record Flow
//!
//! ```text
//! ┌───────────────┐  encode()  ┌──────────────┐  append()  ┌──────────────┐
//! │   Platform    │ ─────────▶ │  raw bytes   │ ─────────▶ │ Event Buffer │
//! │ PlatformEvent │            │ (≤ 100 bytes)│            │ vmrelay-core │
//! └───────────────┘            └──────────────┘            └──────┬───────┘
//!                                                                 │ remove()
//!                                                                 ▼
//!                                                       PlatformEvent::parse()
//! ```
//!
//! The layout is an internal schema, not a public format: it only has to be
//! stable between the producer and the decoder of one deployment.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod abi;
pub mod record;

pub use abi::{CardOperation, EventTag, MediaCode, WaitKind};
pub use record::{MediaPayload, PlatformEvent, RecordError};

/// Maximum size of one raw event record in bytes
pub const MAX_RECORD_LEN: usize = 100;

/// Size of the tag header that starts every record
pub const RECORD_HEADER_LEN: usize = 4;

static_assertions::const_assert!(record::MAX_ENCODED_LEN <= MAX_RECORD_LEN);
static_assertions::const_assert!(RECORD_HEADER_LEN < MAX_RECORD_LEN);
