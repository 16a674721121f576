//! # Raw Event Records
//!
//! Binary schema of one platform event. Every record starts with a
//! little-endian `u32` tag followed by the fixed payload of that tag.
//!
//! ## Payload Layout
//!
//! | Tag | Payload (little endian) | Bytes |
//! |-----|-------------------------|-------|
//! | Key | key `i32`, action `i32` | 8 |
//! | Pen | action `i32`, x `i32`, y `i32` | 12 |
//! | Socket | handle `i32`, wait kind `i32`, status `i32`, extra `u64` | 20 |
//! | End, Pause, Resume, Rotation, RootsChanged, SwitchForeground, SelectApp | - | 0 |
//! | Push | alarm handle `i32` | 4 |
//! | SmsIncoming, CbsIncoming, MmsIncoming | stub `i32` | 4 |
//! | SmsSendingResult, MmsSendingResult | handle `i32`, result `i32` | 8 |
//! | Multimedia, AdvancedMultimedia | code `u32`, app `i32`, player `i32`, status `i32`, data `i64` | 24 |
//! | Location | provider `i32`, result `i32` | 8 |
//! | CardDevice | operation `u32`, handle `u64` | 12 |
//! | SensorAvailable | sensor type `i32`, available `i32` | 8 |
//! | SensorOpenClose | sensor `i32` | 4 |
//!
//! Sub-codes (socket wait kind, media code, card operation) travel raw; the
//! decoder in `vmrelay-core` validates them.

use core::fmt;

use crate::abi::EventTag;
use crate::RECORD_HEADER_LEN;

/// Largest payload of any tag
pub const MAX_PAYLOAD_LEN: usize = 24;

/// Largest encoded record
pub const MAX_ENCODED_LEN: usize = RECORD_HEADER_LEN + MAX_PAYLOAD_LEN;

// =============================================================================
// Errors
// =============================================================================

/// Record schema errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordError {
    /// Tag is not part of the schema
    UnknownTag(u32),
    /// Socket record names a wait kind that does not exist
    UnknownWaitKind(i32),
    /// Multimedia record carries an unknown notification code
    UnknownMediaCode(u32),
    /// Card device record carries an unknown operation
    UnknownCardOperation(u32),
    /// Record ends before its payload does
    Truncated {
        /// Bytes the tag requires
        expected: usize,
        /// Bytes present
        actual: usize,
    },
    /// Destination is too small for the encoded record
    BufferTooSmall {
        /// Bytes needed
        required: usize,
        /// Bytes available
        available: usize,
    },
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTag(tag) => write!(f, "unknown event tag {}", tag),
            Self::UnknownWaitKind(code) => write!(f, "unknown wait kind {}", code),
            Self::UnknownMediaCode(code) => write!(f, "unknown media code {}", code),
            Self::UnknownCardOperation(code) => {
                write!(f, "invalid card device event type {}", code)
            },
            Self::Truncated { expected, actual } => {
                write!(f, "record truncated: expected {} bytes, got {}", expected, actual)
            },
            Self::BufferTooSmall {
                required,
                available,
            } => write!(
                f,
                "buffer too small: need {} bytes, have {}",
                required, available
            ),
        }
    }
}

// =============================================================================
// Platform Events
// =============================================================================

/// One platform event, as produced by the platform side.
///
/// Fields are kept in their wire form; interpretation belongs to the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformEvent {
    /// Key input
    Key {
        /// Key code
        key: i32,
        /// Press, release or repeat
        action: i32,
    },
    /// Pointer input
    Pen {
        /// Press, release or drag
        action: i32,
        /// Horizontal position
        x: i32,
        /// Vertical position
        y: i32,
    },
    /// Socket readiness
    Socket {
        /// Platform socket handle
        handle: i32,
        /// Raw wait kind the readiness satisfies
        waiting_for: i32,
        /// Operation status
        status: i32,
        /// Opaque result value, zero when absent
        extra: u64,
    },
    /// VM shutdown requested
    End,
    /// Pause all applications
    Pause,
    /// Resume all applications
    Resume,
    /// Push alarm expired
    Push {
        /// Alarm handle
        alarm_handle: i32,
    },
    /// Screen rotation
    Rotation,
    /// File-system roots changed
    RootsChanged,
    /// SMS arrived
    SmsIncoming {
        /// Messaging connection stub
        stub: i32,
    },
    /// Cell broadcast arrived
    CbsIncoming {
        /// Messaging connection stub
        stub: i32,
    },
    /// SMS send finished
    SmsSendingResult {
        /// Send handle
        handle: i32,
        /// Send result
        result: i32,
    },
    /// MMS arrived
    MmsIncoming {
        /// Messaging connection stub
        stub: i32,
    },
    /// MMS send finished
    MmsSendingResult {
        /// Send handle
        handle: i32,
        /// Send result
        result: i32,
    },
    /// Basic multimedia notification
    Multimedia(MediaPayload),
    /// Advanced multimedia notification
    AdvancedMultimedia(MediaPayload),
    /// Location provider event
    Location {
        /// Provider handle
        provider: i32,
        /// Operation result
        operation_result: i32,
    },
    /// Smart card device event
    CardDevice {
        /// Raw card operation
        operation: u32,
        /// Device handle
        handle: u64,
    },
    /// Bring the running application to the foreground
    SwitchForeground,
    /// Show the application selector
    SelectApp,
    /// Sensor availability changed
    SensorAvailable {
        /// Sensor type
        sensor_type: i32,
        /// Non-zero if available
        is_available: i32,
    },
    /// Sensor opened or closed
    SensorOpenClose {
        /// Sensor handle
        sensor: i32,
    },
}

/// Payload shared by both multimedia record kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaPayload {
    /// Raw media notification code
    pub media_code: u32,
    /// Owning isolate (application) id
    pub app_id: i32,
    /// Player id inside the isolate
    pub player_id: i32,
    /// Operation status
    pub status: i32,
    /// Notification data (duration, volume, ...)
    pub data: i64,
}

impl PlatformEvent {
    /// Tag of this event
    pub fn tag(&self) -> EventTag {
        match self {
            Self::Key { .. } => EventTag::Key,
            Self::Pen { .. } => EventTag::Pen,
            Self::Socket { .. } => EventTag::Socket,
            Self::End => EventTag::End,
            Self::Pause => EventTag::Pause,
            Self::Resume => EventTag::Resume,
            Self::Push { .. } => EventTag::Push,
            Self::Rotation => EventTag::Rotation,
            Self::RootsChanged => EventTag::RootsChanged,
            Self::SmsIncoming { .. } => EventTag::SmsIncoming,
            Self::CbsIncoming { .. } => EventTag::CbsIncoming,
            Self::SmsSendingResult { .. } => EventTag::SmsSendingResult,
            Self::MmsIncoming { .. } => EventTag::MmsIncoming,
            Self::MmsSendingResult { .. } => EventTag::MmsSendingResult,
            Self::Multimedia(_) => EventTag::Multimedia,
            Self::AdvancedMultimedia(_) => EventTag::AdvancedMultimedia,
            Self::Location { .. } => EventTag::Location,
            Self::CardDevice { .. } => EventTag::CardDevice,
            Self::SwitchForeground => EventTag::SwitchForeground,
            Self::SelectApp => EventTag::SelectApp,
            Self::SensorAvailable { .. } => EventTag::SensorAvailable,
            Self::SensorOpenClose { .. } => EventTag::SensorOpenClose,
        }
    }

    /// Encoded length of this event in bytes
    pub fn encoded_len(&self) -> usize {
        RECORD_HEADER_LEN + payload_len(self.tag())
    }

    /// Encode into `out`, returning the number of bytes written
    pub fn encode(&self, out: &mut [u8]) -> Result<usize, RecordError> {
        let len = self.encoded_len();
        if out.len() < len {
            return Err(RecordError::BufferTooSmall {
                required: len,
                available: out.len(),
            });
        }

        let mut w = Writer::new(&mut out[..len]);
        w.u32(self.tag().code());
        match *self {
            Self::Key { key, action } => {
                w.i32(key);
                w.i32(action);
            },
            Self::Pen { action, x, y } => {
                w.i32(action);
                w.i32(x);
                w.i32(y);
            },
            Self::Socket {
                handle,
                waiting_for,
                status,
                extra,
            } => {
                w.i32(handle);
                w.i32(waiting_for);
                w.i32(status);
                w.u64(extra);
            },
            Self::Push { alarm_handle } => w.i32(alarm_handle),
            Self::SmsIncoming { stub } | Self::CbsIncoming { stub } | Self::MmsIncoming { stub } => {
                w.i32(stub)
            },
            Self::SmsSendingResult { handle, result } | Self::MmsSendingResult { handle, result } => {
                w.i32(handle);
                w.i32(result);
            },
            Self::Multimedia(media) | Self::AdvancedMultimedia(media) => {
                w.u32(media.media_code);
                w.i32(media.app_id);
                w.i32(media.player_id);
                w.i32(media.status);
                w.i64(media.data);
            },
            Self::Location {
                provider,
                operation_result,
            } => {
                w.i32(provider);
                w.i32(operation_result);
            },
            Self::CardDevice { operation, handle } => {
                w.u32(operation);
                w.u64(handle);
            },
            Self::SensorAvailable {
                sensor_type,
                is_available,
            } => {
                w.i32(sensor_type);
                w.i32(is_available);
            },
            Self::SensorOpenClose { sensor } => w.i32(sensor),
            Self::End
            | Self::Pause
            | Self::Resume
            | Self::Rotation
            | Self::RootsChanged
            | Self::SwitchForeground
            | Self::SelectApp => {},
        }

        Ok(len)
    }

    /// Parse one record. Trailing bytes after the payload are ignored.
    pub fn parse(bytes: &[u8]) -> Result<Self, RecordError> {
        if bytes.len() < RECORD_HEADER_LEN {
            return Err(RecordError::Truncated {
                expected: RECORD_HEADER_LEN,
                actual: bytes.len(),
            });
        }

        let mut r = Reader::new(bytes);
        let tag = EventTag::try_from(r.u32())?;
        let expected = RECORD_HEADER_LEN + payload_len(tag);
        if bytes.len() < expected {
            return Err(RecordError::Truncated {
                expected,
                actual: bytes.len(),
            });
        }

        let event = match tag {
            EventTag::Key => Self::Key {
                key: r.i32(),
                action: r.i32(),
            },
            EventTag::Pen => Self::Pen {
                action: r.i32(),
                x: r.i32(),
                y: r.i32(),
            },
            EventTag::Socket => Self::Socket {
                handle: r.i32(),
                waiting_for: r.i32(),
                status: r.i32(),
                extra: r.u64(),
            },
            EventTag::End => Self::End,
            EventTag::Pause => Self::Pause,
            EventTag::Resume => Self::Resume,
            EventTag::Push => Self::Push {
                alarm_handle: r.i32(),
            },
            EventTag::Rotation => Self::Rotation,
            EventTag::RootsChanged => Self::RootsChanged,
            EventTag::SmsIncoming => Self::SmsIncoming { stub: r.i32() },
            EventTag::CbsIncoming => Self::CbsIncoming { stub: r.i32() },
            EventTag::SmsSendingResult => Self::SmsSendingResult {
                handle: r.i32(),
                result: r.i32(),
            },
            EventTag::MmsIncoming => Self::MmsIncoming { stub: r.i32() },
            EventTag::MmsSendingResult => Self::MmsSendingResult {
                handle: r.i32(),
                result: r.i32(),
            },
            EventTag::Multimedia => Self::Multimedia(r.media()),
            EventTag::AdvancedMultimedia => Self::AdvancedMultimedia(r.media()),
            EventTag::Location => Self::Location {
                provider: r.i32(),
                operation_result: r.i32(),
            },
            EventTag::CardDevice => Self::CardDevice {
                operation: r.u32(),
                handle: r.u64(),
            },
            EventTag::SwitchForeground => Self::SwitchForeground,
            EventTag::SelectApp => Self::SelectApp,
            EventTag::SensorAvailable => Self::SensorAvailable {
                sensor_type: r.i32(),
                is_available: r.i32(),
            },
            EventTag::SensorOpenClose => Self::SensorOpenClose { sensor: r.i32() },
        };

        Ok(event)
    }
}

/// Payload length for a tag
pub const fn payload_len(tag: EventTag) -> usize {
    match tag {
        EventTag::Key => 8,
        EventTag::Pen => 12,
        EventTag::Socket => 20,
        EventTag::End
        | EventTag::Pause
        | EventTag::Resume
        | EventTag::Rotation
        | EventTag::RootsChanged
        | EventTag::SwitchForeground
        | EventTag::SelectApp => 0,
        EventTag::Push
        | EventTag::SmsIncoming
        | EventTag::CbsIncoming
        | EventTag::MmsIncoming
        | EventTag::SensorOpenClose => 4,
        EventTag::SmsSendingResult
        | EventTag::MmsSendingResult
        | EventTag::Location
        | EventTag::SensorAvailable => 8,
        EventTag::Multimedia | EventTag::AdvancedMultimedia => MAX_PAYLOAD_LEN,
        EventTag::CardDevice => 12,
    }
}

// =============================================================================
// Wire Cursors
// =============================================================================

/// Little-endian writer over a slice already checked for length
struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn put<const W: usize>(&mut self, bytes: [u8; W]) {
        self.buf[self.pos..self.pos + W].copy_from_slice(&bytes);
        self.pos += W;
    }

    fn u32(&mut self, v: u32) {
        self.put(v.to_le_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.put(v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.put(v.to_le_bytes());
    }

    fn i64(&mut self, v: i64) {
        self.put(v.to_le_bytes());
    }
}

/// Little-endian reader over a slice already checked for length
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const W: usize>(&mut self) -> [u8; W] {
        let mut out = [0u8; W];
        out.copy_from_slice(&self.buf[self.pos..self.pos + W]);
        self.pos += W;
        out
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.take())
    }

    fn u64(&mut self) -> u64 {
        u64::from_le_bytes(self.take())
    }

    fn i64(&mut self) -> i64 {
        i64::from_le_bytes(self.take())
    }

    fn media(&mut self) -> MediaPayload {
        MediaPayload {
            media_code: self.u32(),
            app_id: self.i32(),
            player_id: self.i32(),
            status: self.i32(),
            data: self.i64(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
