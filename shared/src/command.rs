//! Command Codec
//!
//! Pure mapping between logical commands and the protocol forms the vehicle
//! driver understands: `drone_command` codes on the persistent channel and
//! endpoints on the control channel.

use std::fmt;
use thiserror::Error;

/// Prefix for the code that ends a held movement
pub const RELEASE_PREFIX: &str = "release-";

/// Translational direction for the aerial vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Back,
    Left,
    Right,
    Up,
    Down,
}

/// Yaw direction for the aerial vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rotation {
    /// Counter-clockwise
    Left,
    /// Clockwise
    Right,
}

/// A logical movement that can be held down and released
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Motion {
    Move(Direction),
    Rotate(Rotation),
}

impl Motion {
    /// Every held movement the aerial vehicle supports
    pub const ALL: [Motion; 8] = [
        Motion::Move(Direction::Forward),
        Motion::Move(Direction::Back),
        Motion::Move(Direction::Left),
        Motion::Move(Direction::Right),
        Motion::Move(Direction::Up),
        Motion::Move(Direction::Down),
        Motion::Rotate(Rotation::Left),
        Motion::Rotate(Rotation::Right),
    ];

    /// Wire code sent when the movement starts
    pub fn code(&self) -> &'static str {
        match self {
            Motion::Move(Direction::Forward) => "Up",
            Motion::Move(Direction::Back) => "Down",
            Motion::Move(Direction::Left) => "Left",
            Motion::Move(Direction::Right) => "Right",
            Motion::Move(Direction::Up) => "w",
            Motion::Move(Direction::Down) => "s",
            Motion::Rotate(Rotation::Left) => "a",
            Motion::Rotate(Rotation::Right) => "d",
        }
    }

    /// Wire code sent when the movement ends
    pub fn release_code(&self) -> String {
        format!("{RELEASE_PREFIX}{}", self.code())
    }

    /// Inverse of [`Motion::code`]
    pub fn from_code(code: &str) -> Option<Motion> {
        Motion::ALL.into_iter().find(|m| m.code() == code)
    }
}

impl fmt::Display for Motion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Motion::Move(d) => write!(f, "move {:?}", d),
            Motion::Rotate(r) => write!(f, "rotate {:?}", r),
        }
    }
}

/// Ground rover drive direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoverDirection {
    Forward,
    Backward,
    Left,
    Right,
}

/// HTTP verb used by a control endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Request/response actions exposed by the vehicle driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEndpoint {
    ConnectVehicle,
    TakeSnapshot,
    ChangeCameraDirection,
    StartCollecting,
    StopCollecting,
    ToggleRecording,
    TakeoffLand,
    EnableMissionPads,
    GetMissionPadData,
    NavigateToMissionPad,
    Rover(RoverDirection),
    RoverStop,
}

impl ControlEndpoint {
    /// Request path relative to the driver's base URL
    pub fn path(&self) -> &'static str {
        match self {
            ControlEndpoint::ConnectVehicle => "/connect_drone",
            ControlEndpoint::TakeSnapshot => "/take_snapshot",
            ControlEndpoint::ChangeCameraDirection => "/change_camera_direction",
            ControlEndpoint::StartCollecting => "/start_collecting",
            ControlEndpoint::StopCollecting => "/stop_collecting",
            ControlEndpoint::ToggleRecording => "/toggle_recording",
            ControlEndpoint::TakeoffLand => "/takeoff_land",
            ControlEndpoint::EnableMissionPads => "/enable_mission_pads",
            ControlEndpoint::GetMissionPadData => "/get_mission_pad_data",
            ControlEndpoint::NavigateToMissionPad => "/navigate_to_mission_pad",
            ControlEndpoint::Rover(RoverDirection::Forward) => "/husky/move_forward",
            ControlEndpoint::Rover(RoverDirection::Backward) => "/husky/move_backward",
            ControlEndpoint::Rover(RoverDirection::Left) => "/husky/turn_left",
            ControlEndpoint::Rover(RoverDirection::Right) => "/husky/turn_right",
            ControlEndpoint::RoverStop => "/husky/stop",
        }
    }

    pub fn method(&self) -> HttpMethod {
        match self {
            ControlEndpoint::TakeSnapshot | ControlEndpoint::GetMissionPadData => HttpMethod::Get,
            _ => HttpMethod::Post,
        }
    }

    /// Collection endpoint that flips the current collecting flag
    pub fn collecting(active: bool) -> Self {
        if active {
            ControlEndpoint::StopCollecting
        } else {
            ControlEndpoint::StartCollecting
        }
    }
}

impl fmt::Display for ControlEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path().trim_start_matches('/'))
    }
}

/// A command bound for one of the vehicles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Move(Direction),
    Rotate(Rotation),
    /// Ends the held movement that was started by the same motion
    Release(Motion),
    /// Halts the rover
    Stop,
    TakeSnapshot,
    TakeoffLand,
    ToggleRecording,
    ToggleCollecting,
    ChangeCameraDirection,
    EnableMissionPad,
    GetMissionPadData,
    NavigateToMissionPad,
    RoverMove(RoverDirection),
}

/// A stream code that does not name any command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown command code: {0:?}")]
pub struct UnknownCommand(pub String);

impl Command {
    /// Command that starts a held motion
    pub fn press(motion: Motion) -> Self {
        match motion {
            Motion::Move(d) => Command::Move(d),
            Motion::Rotate(r) => Command::Rotate(r),
        }
    }

    /// Command that ends a held motion
    pub fn release(motion: Motion) -> Self {
        Command::Release(motion)
    }

    /// Whether this command travels over the persistent channel
    pub fn is_streamed(&self) -> bool {
        matches!(self, Command::Move(_) | Command::Rotate(_) | Command::Release(_))
    }

    /// `drone_command` code for streamed commands
    pub fn stream_code(&self) -> Option<String> {
        match self {
            Command::Move(d) => Some(Motion::Move(*d).code().to_string()),
            Command::Rotate(r) => Some(Motion::Rotate(*r).code().to_string()),
            Command::Release(m) => Some(m.release_code()),
            _ => None,
        }
    }

    /// Control endpoint for single-shot commands
    ///
    /// `collecting` selects between the start and stop collection endpoints.
    pub fn endpoint(&self, collecting: bool) -> Option<ControlEndpoint> {
        let endpoint = match self {
            Command::Move(_) | Command::Rotate(_) | Command::Release(_) => return None,
            Command::Stop => ControlEndpoint::RoverStop,
            Command::TakeSnapshot => ControlEndpoint::TakeSnapshot,
            Command::TakeoffLand => ControlEndpoint::TakeoffLand,
            Command::ToggleRecording => ControlEndpoint::ToggleRecording,
            Command::ToggleCollecting => ControlEndpoint::collecting(collecting),
            Command::ChangeCameraDirection => ControlEndpoint::ChangeCameraDirection,
            Command::EnableMissionPad => ControlEndpoint::EnableMissionPads,
            Command::GetMissionPadData => ControlEndpoint::GetMissionPadData,
            Command::NavigateToMissionPad => ControlEndpoint::NavigateToMissionPad,
            Command::RoverMove(d) => ControlEndpoint::Rover(*d),
        };
        Some(endpoint)
    }

    /// Parse a `drone_command` code back into a command
    pub fn parse_stream_code(code: &str) -> Result<Command, UnknownCommand> {
        let unknown = || UnknownCommand(code.to_string());
        match code.strip_prefix(RELEASE_PREFIX) {
            Some(rest) => Motion::from_code(rest)
                .map(Command::Release)
                .ok_or_else(unknown),
            None => Motion::from_code(code).map(Command::press).ok_or_else(unknown),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stream_code() {
            Some(code) => f.write_str(&code),
            None => write!(f, "{:?}", self),
        }
    }
}
