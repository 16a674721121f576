//! # VM Events
//!
//! Events the application-visible event loop receives. Produced by the
//! decoder, posted to the VM's queues by the dispatcher.

use vmrelay_hal::MediaCode;

/// Application-visible event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmEvent {
    /// Key input
    Key {
        /// Key code
        code: i32,
        /// Press, release or repeat
        action: i32,
    },
    /// Pointer input
    Pointer {
        /// Press, release or drag
        action: i32,
        /// Horizontal position
        x: i32,
        /// Vertical position
        y: i32,
    },
    /// Screen rotated
    Rotation,
    /// VM is shutting down
    Shutdown,
    /// Pause every application
    PauseAll,
    /// Resume every application
    ActivateAll,
    /// Foreground selection
    SelectForeground {
        /// `true` brings the current application forward, `false` opens the selector
        to_foreground: bool,
    },
    /// Sensor availability changed
    Sensor {
        /// Sensor type
        sensor_type: i32,
        /// Whether the sensor is now available
        available: bool,
    },
    /// Basic multimedia notification
    Media {
        /// Notification kind
        kind: MediaCode,
        /// Player id inside the isolate
        player_id: i32,
        /// Notification data
        data: i64,
        /// Owning isolate
        isolate_id: i32,
    },
    /// Advanced multimedia notification
    AdvancedMedia {
        /// Raw media code, interpreted by the advanced media stack
        media_code: u32,
        /// Player id inside the isolate
        player_id: i32,
        /// Notification data
        data: i64,
        /// Owning isolate
        isolate_id: i32,
    },
    /// File-system roots changed
    RootsChanged,
}

impl VmEvent {
    /// Isolate that owns this event, if it is isolate-specific
    pub const fn isolate(&self) -> Option<i32> {
        match self {
            Self::Media { isolate_id, .. } | Self::AdvancedMedia { isolate_id, .. } => {
                Some(*isolate_id)
            },
            _ => None,
        }
    }
}
