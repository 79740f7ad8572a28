//! Telemetry Decoder
//!
//! Turns inbound persistent-channel events and control-channel response
//! bodies into typed records. Every function either yields a complete record
//! or a [`DecodeError`]; nothing here holds state.

use base64::Engine as _;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::codec::Envelope;
use crate::{events, limits};

/// JPEG start-of-image marker
const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// Errors produced while decoding telemetry payloads
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("{event}: malformed payload: {source}")]
    Payload {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("video frame is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Last known battery level
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum BatteryLevel {
    /// No reading received since startup
    #[default]
    NoConnection,
    /// Percentage as reported by the vehicle
    Percent(f64),
}

impl BatteryLevel {
    /// Whether the reading lies in the documented 0-100 range
    pub fn in_range(&self) -> bool {
        match self {
            BatteryLevel::NoConnection => true,
            BatteryLevel::Percent(p) => limits::BATTERY_RANGE.contains(p),
        }
    }

    pub fn is_low(&self) -> bool {
        matches!(self, BatteryLevel::Percent(p) if *p <= limits::BATTERY_LOW_PERCENT)
    }
}

impl fmt::Display for BatteryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatteryLevel::NoConnection => write!(f, "No Connection"),
            BatteryLevel::Percent(p) => write!(f, "{}%", p),
        }
    }
}

/// One JPEG frame from the vehicle camera
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub jpeg: Bytes,
}

/// A single surface distance measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    pub timestamp: DateTime<Utc>,
    /// Distance in centimetres
    pub distance: f64,
}

impl TelemetrySample {
    pub fn new(timestamp: DateTime<Utc>, distance: f64) -> Self {
        Self {
            timestamp,
            distance,
        }
    }

    /// Whether the sample is excluded from charts
    pub fn is_outlier(&self) -> bool {
        self.distance > limits::OUTLIER_THRESHOLD_CM
    }
}

/// Position of the vehicle relative to a detected mission pad, in cm
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MissionPadFix {
    pub id: i64,
    pub dist_x: f64,
    pub dist_y: f64,
    pub dist_z: f64,
}

impl fmt::Display for MissionPadFix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pad {} x={}cm y={}cm z={}cm",
            self.id, self.dist_x, self.dist_y, self.dist_z
        )
    }
}

/// Typed telemetry record ready to be applied to the session
#[derive(Debug, Clone, PartialEq)]
pub enum Telemetry {
    Battery(BatteryLevel),
    Frame(VideoFrame),
    Distance(TelemetrySample),
    /// `None` when no pad is in view
    MissionPad(Option<MissionPadFix>),
}

/// Driver acknowledgement of a streamed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    pub ok: bool,
    pub command: Option<String>,
    pub message: Option<String>,
}

/// Everything that can arrive on the persistent channel
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Telemetry(Telemetry),
    CommandResponse(CommandResponse),
    StreamResponse { status: String },
    /// Event name this client does not handle
    Unknown(String),
}

/// Outcome reported by the toggle-recording endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingAction {
    Started,
    Stopped,
    Unchanged,
}

/// Result of a mission-pad query
#[derive(Debug, Clone, PartialEq)]
pub struct MissionPadReport {
    pub fix: Option<MissionPadFix>,
    pub message: Option<String>,
}

#[derive(Deserialize)]
struct BatteryPayload {
    battery_level: f64,
}

#[derive(Deserialize)]
struct FramePayload {
    image: String,
}

#[derive(Deserialize)]
struct DistancePayload {
    timestamp: WireTimestamp,
    distance: f64,
}

#[derive(Deserialize)]
struct MissionPadPayload {
    pad_id: i64,
    dist_x: Option<f64>,
    dist_y: Option<f64>,
    dist_z: Option<f64>,
}

#[derive(Deserialize)]
struct CommandResponsePayload {
    status: String,
    command: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct StreamResponsePayload {
    status: String,
}

/// Timestamps as drivers emit them: HTTP dates, RFC 3339 or epoch millis
#[derive(Deserialize)]
#[serde(untagged)]
enum WireTimestamp {
    Millis(i64),
    Fractional(f64),
    Text(String),
}

impl WireTimestamp {
    fn parse(&self) -> Result<DateTime<Utc>, DecodeError> {
        let invalid = |reason: String| DecodeError::InvalidField {
            field: "timestamp",
            reason,
        };
        match self {
            WireTimestamp::Millis(ms) => Utc
                .timestamp_millis_opt(*ms)
                .single()
                .ok_or_else(|| invalid(format!("{} out of range", ms))),
            WireTimestamp::Fractional(ms) => Utc
                .timestamp_millis_opt(ms.round() as i64)
                .single()
                .ok_or_else(|| invalid(format!("{} out of range", ms))),
            WireTimestamp::Text(text) => DateTime::parse_from_rfc2822(text)
                .or_else(|_| DateTime::parse_from_rfc3339(text))
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| invalid(format!("{:?}: {}", text, e))),
        }
    }
}

fn payload<T: serde::de::DeserializeOwned>(
    event: &'static str,
    data: &Value,
) -> Result<T, DecodeError> {
    T::deserialize(data).map_err(|source| DecodeError::Payload { event, source })
}

fn pad_fix(pad: MissionPadPayload) -> Result<Option<MissionPadFix>, DecodeError> {
    if pad.pad_id == limits::NO_MISSION_PAD {
        return Ok(None);
    }
    Ok(Some(MissionPadFix {
        id: pad.pad_id,
        dist_x: pad.dist_x.ok_or(DecodeError::MissingField("dist_x"))?,
        dist_y: pad.dist_y.ok_or(DecodeError::MissingField("dist_y"))?,
        dist_z: pad.dist_z.ok_or(DecodeError::MissingField("dist_z"))?,
    }))
}

/// Decode a base64 JPEG into a frame
pub fn decode_frame(image: &str) -> Result<VideoFrame, DecodeError> {
    let jpeg = base64::engine::general_purpose::STANDARD.decode(image)?;
    if !jpeg.starts_with(&JPEG_SOI) {
        return Err(DecodeError::InvalidField {
            field: "image",
            reason: "not a JPEG image".into(),
        });
    }
    Ok(VideoFrame { jpeg: jpeg.into() })
}

/// Decode one persistent-channel envelope
pub fn decode_event(envelope: &Envelope) -> Result<Inbound, DecodeError> {
    let data = &envelope.data;
    let inbound = match envelope.event.as_str() {
        events::BATTERY_UPDATE => {
            let p: BatteryPayload = payload(events::BATTERY_UPDATE, data)?;
            Inbound::Telemetry(Telemetry::Battery(BatteryLevel::Percent(p.battery_level)))
        }
        events::VIDEO_FRAME => {
            let p: FramePayload = payload(events::VIDEO_FRAME, data)?;
            Inbound::Telemetry(Telemetry::Frame(decode_frame(&p.image)?))
        }
        events::DISTANCE_SAMPLE => {
            let p: DistancePayload = payload(events::DISTANCE_SAMPLE, data)?;
            Inbound::Telemetry(Telemetry::Distance(TelemetrySample::new(
                p.timestamp.parse()?,
                p.distance,
            )))
        }
        events::MISSION_PAD => {
            let p: MissionPadPayload = payload(events::MISSION_PAD, data)?;
            Inbound::Telemetry(Telemetry::MissionPad(pad_fix(p)?))
        }
        events::COMMAND_RESPONSE => {
            let p: CommandResponsePayload = payload(events::COMMAND_RESPONSE, data)?;
            Inbound::CommandResponse(CommandResponse {
                ok: p.status == "success",
                command: p.command,
                message: p.message,
            })
        }
        events::STREAM_RESPONSE => {
            let p: StreamResponsePayload = payload(events::STREAM_RESPONSE, data)?;
            Inbound::StreamResponse { status: p.status }
        }
        other => Inbound::Unknown(other.to_string()),
    };
    Ok(inbound)
}

/// `message` field of a control response, if any
pub fn response_message(body: &Value) -> Option<String> {
    body.get("message")
        .or_else(|| body.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Decode the toggle-recording response
pub fn decode_recording(body: &Value) -> Result<RecordingAction, DecodeError> {
    let action = body
        .get("action")
        .ok_or(DecodeError::MissingField("action"))?;
    match action.as_str() {
        Some("started") => Ok(RecordingAction::Started),
        Some("stopped") => Ok(RecordingAction::Stopped),
        Some("unchanged") => Ok(RecordingAction::Unchanged),
        _ => Err(DecodeError::InvalidField {
            field: "action",
            reason: format!("unexpected value {}", action),
        }),
    }
}

/// Decode the samples returned by the stop-collecting response
pub fn decode_collected(body: &Value) -> Result<Vec<TelemetrySample>, DecodeError> {
    let data = body.get("data").ok_or(DecodeError::MissingField("data"))?;
    if data.is_null() {
        return Ok(Vec::new());
    }
    let rows: Vec<(WireTimestamp, f64)> = payload("stop_collecting", data)?;
    rows.into_iter()
        .map(|(ts, distance)| Ok(TelemetrySample::new(ts.parse()?, distance)))
        .collect()
}

/// Decode the get-mission-pad-data response
pub fn decode_mission_pad(body: &Value) -> Result<MissionPadReport, DecodeError> {
    let message = response_message(body);
    let success = body
        .get("success")
        .and_then(Value::as_bool)
        .ok_or(DecodeError::MissingField("success"))?;

    let fix = match body.get("data") {
        Some(data) if success && !data.is_null() => {
            pad_fix(payload("get_mission_pad_data", data)?)?
        }
        _ => None,
    };
    Ok(MissionPadReport { fix, message })
}
