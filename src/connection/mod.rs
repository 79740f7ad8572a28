//! Connection management
//!
//! This module handles:
//! - The persistent channel, reconnected automatically in the background
//! - The request/response control channel
//! - The vehicle link lifecycle and all outbound command traffic

mod control;
mod controller;
mod manager;

pub use control::{ControlChannel, HttpControlChannel};
pub use controller::ConnectionController;
pub use manager::{ChannelEvent, ChannelManager};

#[cfg(test)]
pub(crate) use control::tests::ScriptedChannel;
