//! # Boundary Codes
//!
//! Numeric codes shared by the platform and the VM: what a blocked context
//! can wait for, which kind of record arrived, and the sub-codes carried by
//! multimedia and card-device records.

use crate::record::RecordError;

// =============================================================================
// Wait Kinds
// =============================================================================

/// The condition a blocked execution context is waiting on.
///
/// `NoSignal` doubles as the wildcard: a signal carrying it matches on
/// descriptor alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum WaitKind {
    /// No specific wait kind (wildcard)
    NoSignal           = 0,
    /// User interface input
    Ui                 = 1,
    /// Application lifecycle (AMS)
    Ams                = 2,
    /// Socket readable
    NetworkRead        = 3,
    /// Socket writable
    NetworkWrite       = 4,
    /// Socket error condition
    NetworkException   = 5,
    /// Host name resolution finished
    HostNameLookup     = 6,
    /// Generic push wake-up
    Push               = 7,
    /// Push alarm fired
    PushAlarm          = 8,
    /// Media player started
    MediaStart         = 9,
    /// Media player stopped
    MediaStop          = 10,
    /// Media player closed
    MediaClose         = 11,
    /// Camera snapshot finished
    MediaSnapshot      = 12,
    /// Recording state changed
    MediaRecord        = 13,
    /// Media position set
    MediaSetPosition   = 14,
    /// Long MIDI event processed
    MediaLongMidiEvent = 15,
    /// Advanced multimedia notification
    MediaEvent         = 16,
    /// Location provider result
    Location           = 17,
    /// Smart card reader data
    CardReaderData     = 18,
    /// Sensor state change
    Sensor             = 19,
    /// Incoming SMS
    SmsRead            = 20,
    /// Incoming cell broadcast
    CbsRead            = 21,
    /// Incoming MMS
    MmsRead            = 22,
    /// SMS send completed
    SmsWrite           = 23,
    /// MMS send completed
    MmsWrite           = 24,
    /// Debugger command pending
    VmDebug            = 25,
}

impl WaitKind {
    /// First wait kind of the multimedia range
    pub const MEDIA_FIRST: WaitKind = WaitKind::MediaStart;
    /// Last wait kind of the multimedia range
    pub const MEDIA_LAST: WaitKind = WaitKind::MediaLongMidiEvent;

    /// Raw wire code
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Check if this is the wildcard kind
    pub const fn is_wildcard(self) -> bool {
        matches!(self, WaitKind::NoSignal)
    }

    /// Check if this kind lies in the contiguous multimedia range
    pub fn is_media(self) -> bool {
        (Self::MEDIA_FIRST..=Self::MEDIA_LAST).contains(&self)
    }

    /// Check if this kind belongs to the messaging protocols
    pub const fn is_messaging(self) -> bool {
        matches!(
            self,
            WaitKind::SmsRead
                | WaitKind::CbsRead
                | WaitKind::MmsRead
                | WaitKind::SmsWrite
                | WaitKind::MmsWrite
        )
    }
}

impl TryFrom<i32> for WaitKind {
    type Error = RecordError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        let kind = match code {
            0 => WaitKind::NoSignal,
            1 => WaitKind::Ui,
            2 => WaitKind::Ams,
            3 => WaitKind::NetworkRead,
            4 => WaitKind::NetworkWrite,
            5 => WaitKind::NetworkException,
            6 => WaitKind::HostNameLookup,
            7 => WaitKind::Push,
            8 => WaitKind::PushAlarm,
            9 => WaitKind::MediaStart,
            10 => WaitKind::MediaStop,
            11 => WaitKind::MediaClose,
            12 => WaitKind::MediaSnapshot,
            13 => WaitKind::MediaRecord,
            14 => WaitKind::MediaSetPosition,
            15 => WaitKind::MediaLongMidiEvent,
            16 => WaitKind::MediaEvent,
            17 => WaitKind::Location,
            18 => WaitKind::CardReaderData,
            19 => WaitKind::Sensor,
            20 => WaitKind::SmsRead,
            21 => WaitKind::CbsRead,
            22 => WaitKind::MmsRead,
            23 => WaitKind::SmsWrite,
            24 => WaitKind::MmsWrite,
            25 => WaitKind::VmDebug,
            other => return Err(RecordError::UnknownWaitKind(other)),
        };
        Ok(kind)
    }
}

// =============================================================================
// Event Tags
// =============================================================================

/// Tag at the head of every raw record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum EventTag {
    /// Key press/release/repeat
    Key                = 1,
    /// Pointer (pen) input
    Pen                = 2,
    /// Socket readiness or error
    Socket             = 3,
    /// VM shutdown requested
    End                = 4,
    /// Pause all applications
    Pause              = 5,
    /// Resume all applications
    Resume             = 6,
    /// Push alarm expired
    Push               = 7,
    /// Screen rotated
    Rotation           = 8,
    /// File-system roots changed
    RootsChanged       = 9,
    /// SMS arrived
    SmsIncoming        = 10,
    /// Cell broadcast arrived
    CbsIncoming        = 11,
    /// SMS send result
    SmsSendingResult   = 12,
    /// MMS arrived
    MmsIncoming        = 13,
    /// MMS send result
    MmsSendingResult   = 14,
    /// Basic multimedia notification
    Multimedia         = 15,
    /// Advanced multimedia notification
    AdvancedMultimedia = 16,
    /// Location provider event
    Location           = 17,
    /// Smart card device event
    CardDevice         = 18,
    /// Bring the current application to the foreground
    SwitchForeground   = 19,
    /// Show the application selector
    SelectApp          = 20,
    /// Sensor availability changed
    SensorAvailable    = 21,
    /// Sensor opened or closed
    SensorOpenClose    = 22,
}

impl EventTag {
    /// Raw wire code
    pub const fn code(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for EventTag {
    type Error = RecordError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        let tag = match code {
            1 => EventTag::Key,
            2 => EventTag::Pen,
            3 => EventTag::Socket,
            4 => EventTag::End,
            5 => EventTag::Pause,
            6 => EventTag::Resume,
            7 => EventTag::Push,
            8 => EventTag::Rotation,
            9 => EventTag::RootsChanged,
            10 => EventTag::SmsIncoming,
            11 => EventTag::CbsIncoming,
            12 => EventTag::SmsSendingResult,
            13 => EventTag::MmsIncoming,
            14 => EventTag::MmsSendingResult,
            15 => EventTag::Multimedia,
            16 => EventTag::AdvancedMultimedia,
            17 => EventTag::Location,
            18 => EventTag::CardDevice,
            19 => EventTag::SwitchForeground,
            20 => EventTag::SelectApp,
            21 => EventTag::SensorAvailable,
            22 => EventTag::SensorOpenClose,
            other => return Err(RecordError::UnknownTag(other)),
        };
        Ok(tag)
    }
}

// =============================================================================
// Multimedia Codes
// =============================================================================

/// Notification carried by a multimedia record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MediaCode {
    /// Playback reached the end of media
    EndOfMedia        = 1,
    /// Media duration became known or changed
    DurationUpdated   = 2,
    /// Recording hit its size limit
    RecordSizeLimit   = 3,
    /// Recording failed
    RecordError       = 4,
    /// Player started buffering
    BufferingStarted  = 5,
    /// Player stopped buffering
    BufferingStopped  = 6,
    /// Volume changed
    VolumeChanged     = 7,
    /// Unspecified player error
    GeneralError      = 8,
}

impl MediaCode {
    /// Raw wire code
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Notifications that also end a blocked media operation
    pub const fn ends_operation(self) -> bool {
        matches!(
            self,
            MediaCode::GeneralError | MediaCode::RecordError | MediaCode::EndOfMedia
        )
    }
}

impl TryFrom<u32> for MediaCode {
    type Error = RecordError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        let media = match code {
            1 => MediaCode::EndOfMedia,
            2 => MediaCode::DurationUpdated,
            3 => MediaCode::RecordSizeLimit,
            4 => MediaCode::RecordError,
            5 => MediaCode::BufferingStarted,
            6 => MediaCode::BufferingStopped,
            7 => MediaCode::VolumeChanged,
            8 => MediaCode::GeneralError,
            other => return Err(RecordError::UnknownMediaCode(other)),
        };
        Ok(media)
    }
}

// =============================================================================
// Card Device Operations
// =============================================================================

/// Sub-type of a smart card device record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CardOperation {
    /// Card reset finished
    Reset  = 1,
    /// APDU transfer finished
    Xfer   = 2,
    /// Slot unlocked
    Unlock = 3,
}

impl CardOperation {
    /// Card reset completion descriptor and status
    pub const SIGNAL_RESET: i32 = 0x7FFF_FFF1;
    /// APDU transfer completion descriptor and status
    pub const SIGNAL_XFER: i32 = 0x7FFF_FFF2;
    /// Slot unlock descriptor and status
    pub const SIGNAL_LOCK: i32 = 0x7FFF_FFF0;

    /// Raw wire code
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Descriptor (and status) used to signal card-reader waiters
    pub const fn signal_code(self) -> i32 {
        match self {
            CardOperation::Reset => Self::SIGNAL_RESET,
            CardOperation::Xfer => Self::SIGNAL_XFER,
            CardOperation::Unlock => Self::SIGNAL_LOCK,
        }
    }

    /// Whether the record's device handle travels with the signal
    pub const fn carries_handle(self) -> bool {
        !matches!(self, CardOperation::Unlock)
    }
}

impl TryFrom<u32> for CardOperation {
    type Error = RecordError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(CardOperation::Reset),
            2 => Ok(CardOperation::Xfer),
            3 => Ok(CardOperation::Unlock),
            other => Err(RecordError::UnknownCardOperation(other)),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
