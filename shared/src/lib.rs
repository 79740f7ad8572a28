//! Teleoperation Shared Protocol Types
//!
//! This crate provides the command vocabulary, telemetry decoding and the
//! persistent-channel framing shared between the teleoperation client and the
//! vehicle driver process.

pub mod codec;
pub mod command;
pub mod state_machine;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use codec::{CodecError, Envelope};
pub use command::{Command, ControlEndpoint, Direction, Motion, RoverDirection, Rotation};
pub use state_machine::ConnectionState;
pub use telemetry::{
    BatteryLevel, DecodeError, MissionPadFix, Telemetry, TelemetrySample, VideoFrame,
};

/// Protocol limits and thresholds
pub mod limits {
    /// Distance samples above this value (cm) are left out of charts
    pub const OUTLIER_THRESHOLD_CM: f64 = 500.0;

    /// Battery percentage at or below which a low-battery warning is logged
    pub const BATTERY_LOW_PERCENT: f64 = 20.0;

    /// Valid battery percentage range reported by the vehicle
    pub const BATTERY_RANGE: std::ops::RangeInclusive<f64> = 0.0..=100.0;

    /// Mission pad id reported by the driver when no pad is in view
    pub const NO_MISSION_PAD: i64 = -1;
}

/// Persistent channel event names
pub mod events {
    pub const BATTERY_UPDATE: &str = "battery_update";
    pub const VIDEO_FRAME: &str = "video_frame";
    pub const DISTANCE_SAMPLE: &str = "distance_sample";
    pub const MISSION_PAD: &str = "mission_pad";
    pub const COMMAND_RESPONSE: &str = "command_response";
    pub const STREAM_RESPONSE: &str = "stream_response";

    pub const START_STREAM: &str = "start_stream";
    pub const STOP_STREAM: &str = "stop_stream";
    pub const DRONE_COMMAND: &str = "drone_command";
}
