//! # Event Decoder
//!
//! Maps one raw record to a normalized [`Signal`] and/or [`VmEvent`].
//! Decoding is pure: it reads the record and nothing else.
//!
//! | Record | Signal | VM event |
//! |--------|--------|----------|
//! | key, pen, rotation | UI | key, pointer, rotation |
//! | end, pause, resume | AMS | shutdown, pause-all, activate-all |
//! | switch foreground, select app | AMS | select-foreground |
//! | socket | payload kind on handle, extra data as result | - |
//! | push | push alarm on alarm handle | - |
//! | SMS/CBS/MMS | messaging kind on stub or handle | - |
//! | multimedia | wildcard on composite id, only when the operation ends | media |
//! | advanced multimedia | media event | advanced media |
//! | location | location on provider | - |
//! | card device | card reader on operation code | - |
//! | sensor available / open-close | sensor | sensor / - |
//! | roots changed | - | roots changed |

use vmrelay_hal::abi::{CardOperation, MediaCode, WaitKind};
use vmrelay_hal::record::{MediaPayload, PlatformEvent};

use crate::error::RelayResult;
use crate::event::VmEvent;
use crate::signal::{pack_media_descriptor, OpaqueResult, Signal, STATUS_OK};

/// Decoder output
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Decoded {
    /// Wake-up request, if the record carries one
    pub signal: Option<Signal>,
    /// Application-visible event, if the record carries one
    pub event: Option<VmEvent>,
}

impl Decoded {
    fn signal(signal: Signal) -> Self {
        Self {
            signal: Some(signal),
            event: None,
        }
    }

    fn both(signal: Signal, event: VmEvent) -> Self {
        Self {
            signal: Some(signal),
            event: Some(event),
        }
    }

    /// Check if neither a signal nor an event was produced
    pub fn is_empty(&self) -> bool {
        self.signal.is_none() && self.event.is_none()
    }
}

/// Decode a raw record, logging and discarding unrecognized ones
pub fn decode(record: &[u8]) -> Decoded {
    match try_decode(record) {
        Ok(decoded) => decoded,
        Err(err) => {
            log::error!("Decoder: {}", err);
            Decoded::default()
        },
    }
}

/// Decode a raw record
pub fn try_decode(record: &[u8]) -> RelayResult<Decoded> {
    let event = PlatformEvent::parse(record)?;
    decode_event(event)
}

/// Decode an already parsed platform event
pub fn decode_event(event: PlatformEvent) -> RelayResult<Decoded> {
    let decoded = match event {
        PlatformEvent::Key { key, action } => Decoded::both(
            Signal::kind(WaitKind::Ui),
            VmEvent::Key { code: key, action },
        ),
        PlatformEvent::Pen { action, x, y } => Decoded::both(
            Signal::kind(WaitKind::Ui),
            VmEvent::Pointer { action, x, y },
        ),
        PlatformEvent::Socket {
            handle,
            waiting_for,
            status,
            extra,
        } => Decoded::signal(
            Signal::new(WaitKind::try_from(waiting_for)?, handle, status)
                .with_result(OpaqueResult::from_nonzero(extra)),
        ),
        PlatformEvent::End => Decoded::both(Signal::kind(WaitKind::Ams), VmEvent::Shutdown),
        PlatformEvent::Pause => Decoded::both(Signal::kind(WaitKind::Ams), VmEvent::PauseAll),
        PlatformEvent::Resume => {
            Decoded::both(Signal::kind(WaitKind::Ams), VmEvent::ActivateAll)
        },
        PlatformEvent::Push { alarm_handle } => {
            Decoded::signal(Signal::new(WaitKind::PushAlarm, alarm_handle, 0))
        },
        PlatformEvent::Rotation => Decoded::both(Signal::kind(WaitKind::Ui), VmEvent::Rotation),
        PlatformEvent::RootsChanged => Decoded {
            signal: None,
            event: Some(VmEvent::RootsChanged),
        },
        PlatformEvent::SmsIncoming { stub } => {
            Decoded::signal(Signal::new(WaitKind::SmsRead, stub, 0))
        },
        PlatformEvent::CbsIncoming { stub } => {
            Decoded::signal(Signal::new(WaitKind::CbsRead, stub, 0))
        },
        PlatformEvent::SmsSendingResult { handle, result } => {
            Decoded::signal(Signal::new(WaitKind::SmsWrite, handle, result))
        },
        PlatformEvent::MmsIncoming { stub } => {
            Decoded::signal(Signal::new(WaitKind::MmsRead, stub, 0))
        },
        PlatformEvent::MmsSendingResult { handle, result } => {
            Decoded::signal(Signal::new(WaitKind::MmsWrite, handle, result))
        },
        PlatformEvent::Multimedia(media) => decode_media(media)?,
        PlatformEvent::AdvancedMultimedia(media) => Decoded::both(
            Signal::new(
                WaitKind::MediaEvent,
                pack_media_descriptor(media.app_id, media.player_id),
                STATUS_OK,
            ),
            VmEvent::AdvancedMedia {
                media_code: media.media_code,
                player_id: media.player_id,
                data: media.data,
                isolate_id: media.app_id,
            },
        ),
        PlatformEvent::Location {
            provider,
            operation_result,
        } => Decoded::signal(Signal::new(WaitKind::Location, provider, operation_result)),
        PlatformEvent::CardDevice { operation, handle } => {
            let operation = CardOperation::try_from(operation)?;
            let code = operation.signal_code();
            let result = if operation.carries_handle() {
                OpaqueResult::from_nonzero(handle)
            } else {
                None
            };
            Decoded::signal(Signal::new(WaitKind::CardReaderData, code, code).with_result(result))
        },
        PlatformEvent::SwitchForeground => Decoded::both(
            Signal::kind(WaitKind::Ams),
            VmEvent::SelectForeground {
                to_foreground: true,
            },
        ),
        PlatformEvent::SelectApp => Decoded::both(
            Signal::kind(WaitKind::Ams),
            VmEvent::SelectForeground {
                to_foreground: false,
            },
        ),
        PlatformEvent::SensorAvailable {
            sensor_type,
            is_available,
        } => Decoded::both(
            Signal::kind(WaitKind::Sensor),
            VmEvent::Sensor {
                sensor_type,
                available: is_available != 0,
            },
        ),
        PlatformEvent::SensorOpenClose { sensor } => {
            Decoded::signal(Signal::new(WaitKind::Sensor, sensor, 0))
        },
    };

    Ok(decoded)
}

/// Basic multimedia: always an event, a wake-up only when the operation ends
fn decode_media(media: MediaPayload) -> RelayResult<Decoded> {
    let kind = MediaCode::try_from(media.media_code)?;
    let signal = kind.ends_operation().then(|| {
        Signal::new(
            WaitKind::NoSignal,
            pack_media_descriptor(media.app_id, media.player_id),
            media.status,
        )
    });

    Ok(Decoded {
        signal,
        event: Some(VmEvent::Media {
            kind,
            player_id: media.player_id,
            data: media.data,
            isolate_id: media.app_id,
        }),
    })
}
