//! Error taxonomy for user-triggered actions
//!
//! Malformed telemetry is not represented here: it is dropped and logged by
//! the dispatch path (see `teleop_shared::DecodeError`).

use teleop_shared::{ControlEndpoint, DecodeError};
use thiserror::Error;

/// A control-channel action that did not complete
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("{0} unavailable: not connected to a vehicle")]
    NotConnected(ControlEndpoint),

    #[error("{endpoint} failed (HTTP {status}): {message}")]
    Status {
        endpoint: ControlEndpoint,
        status: u16,
        message: String,
    },

    #[error("{endpoint} request failed: {reason}")]
    Transport {
        endpoint: ControlEndpoint,
        reason: String,
    },

    #[error("{endpoint} returned a malformed response: {source}")]
    Malformed {
        endpoint: ControlEndpoint,
        #[source]
        source: DecodeError,
    },
}

/// Establishing the vehicle link failed
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("a connection attempt is already in progress")]
    InProgress,

    #[error("connection failed: {0}")]
    Refused(#[source] RequestError),

    #[error("link was dropped before the connection completed")]
    Superseded,

    #[error("persistent channel is closed")]
    ChannelClosed,

    #[error("persistent channel is backed up, stream not started")]
    ChannelBacklogged,
}

/// An input event with no command mapping
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no command mapped to key {0}")]
pub struct UnmappedInput(pub String);
