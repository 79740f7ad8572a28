//! Connection Controller
//!
//! Owns the vehicle link lifecycle and is the only path for outbound
//! traffic: streamed movement codes go over the persistent channel, every
//! other action is a control-channel round trip. Session writes happen here
//! and only after a confirmed response.

use serde_json::Value;
use std::fmt;
use teleop_shared::state_machine::{LinkEvent, TransitionResult};
use teleop_shared::telemetry::{
    decode_collected, decode_event, decode_mission_pad, decode_recording, response_message,
    Inbound, MissionPadReport, RecordingAction,
};
use teleop_shared::{
    events, Command, ConnectionState, ControlEndpoint, Envelope, Telemetry, TelemetrySample,
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use super::control::ControlChannel;
use crate::error::{ConnectionError, RequestError};
use crate::session::{
    CollectMode, ControlWriter, LinkWriter, SessionStore, SessionWriters, TelemetryWriter,
};

/// Acknowledgement of a successful vehicle connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedAck {
    pub message: String,
}

/// Result of a confirmed control-channel action
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Message(String),
    Recording { recording: bool, message: String },
    Collecting {
        collecting: bool,
        /// Full series when collection stops
        samples: Vec<TelemetrySample>,
    },
    MissionPad(MissionPadReport),
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionOutcome::Message(message) => f.write_str(message),
            ActionOutcome::Recording { message, .. } => f.write_str(message),
            ActionOutcome::Collecting { collecting: true, .. } => {
                f.write_str("Data collection started")
            }
            ActionOutcome::Collecting { samples, .. } => {
                write!(f, "Data collection stopped: {} samples", samples.len())
            }
            ActionOutcome::MissionPad(report) => match (&report.fix, &report.message) {
                (Some(fix), _) => write!(f, "Mission {}", fix),
                (None, Some(message)) => f.write_str(message),
                (None, None) => f.write_str("No mission pad detected"),
            },
        }
    }
}

pub struct ConnectionController<C> {
    control: C,
    outbound: mpsc::Sender<Envelope>,
    store: SessionStore,
    link: LinkWriter,
    control_state: ControlWriter,
    telemetry: TelemetryWriter,
}

impl<C: ControlChannel> ConnectionController<C> {
    pub fn new(
        control: C,
        outbound: mpsc::Sender<Envelope>,
        store: SessionStore,
        writers: SessionWriters,
    ) -> Self {
        Self {
            control,
            outbound,
            store,
            link: writers.link,
            control_state: writers.control,
            telemetry: writers.telemetry,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Establish the vehicle link and start the video stream
    ///
    /// While already connected this confirms the link and restarts the
    /// stream; the link stays up for the whole round trip.
    pub async fn connect(&self) -> Result<ConnectedAck, ConnectionError> {
        if let TransitionResult::Invalid { .. } = self.link.apply(LinkEvent::ConnectRequested) {
            return Err(ConnectionError::InProgress);
        }

        let body = match self.checked(ControlEndpoint::ConnectVehicle).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Vehicle connect failed: {}", e);
                self.link.apply(LinkEvent::ConnectFailed);
                return Err(ConnectionError::Refused(e));
            }
        };

        let link = self.store.connection();
        if link == ConnectionState::Disconnected {
            info!("Connect completed after the link went {}, ignoring", link);
            return Err(ConnectionError::Superseded);
        }

        // The stream must be queued before the link reports Connected
        match self.outbound.try_send(Envelope::bare(events::START_STREAM)) {
            Ok(()) => {}
            Err(e) => {
                self.link.apply(LinkEvent::ConnectFailed);
                return Err(match e {
                    TrySendError::Full(_) => ConnectionError::ChannelBacklogged,
                    TrySendError::Closed(_) => ConnectionError::ChannelClosed,
                });
            }
        }
        self.link.apply(LinkEvent::ConnectSucceeded);

        let message = response_message(&body).unwrap_or_else(|| "Connected".into());
        info!("Vehicle connected: {}", message);
        Ok(ConnectedAck { message })
    }

    /// Drop the vehicle link locally; the persistent channel stays open
    pub fn disconnect(&self) {
        let was = self.store.connection();
        self.link.apply(LinkEvent::DisconnectRequested);
        if was.is_connected() {
            self.push(Envelope::bare(events::STOP_STREAM));
        }
    }

    /// Forward a streamed movement command
    ///
    /// Returns `false` if the command was dropped.
    pub fn send_command(&self, cmd: Command) -> bool {
        if !self.store.connection().is_connected() {
            warn!("Not connected, dropping command {}", cmd);
            return false;
        }
        match cmd.stream_code() {
            Some(code) => self.push(Envelope::drone_command(code)),
            None => {
                warn!("{} is not a streamed command, dropping", cmd);
                false
            }
        }
    }

    /// Issue a control request that requires a live vehicle link
    pub async fn send_control_request(&self, endpoint: ControlEndpoint) -> Result<Value, RequestError> {
        if !self.store.connection().is_connected() {
            return Err(RequestError::NotConnected(endpoint));
        }
        self.checked(endpoint).await
    }

    /// Run a single-shot command and apply its confirmed result
    pub async fn perform(&self, cmd: Command) -> Result<ActionOutcome, RequestError> {
        let endpoint = match cmd.endpoint(self.store.is_collecting()) {
            Some(endpoint) => endpoint,
            None => {
                let message = if self.send_command(cmd) {
                    format!("Sent {}", cmd)
                } else {
                    format!("{} not sent", cmd)
                };
                return Ok(ActionOutcome::Message(message));
            }
        };

        let body = self.send_control_request(endpoint).await?;
        let malformed = |source| RequestError::Malformed { endpoint, source };
        let message = || response_message(&body).unwrap_or_else(|| format!("{} ok", endpoint));

        let outcome = match cmd {
            Command::ToggleRecording => {
                let recording = match decode_recording(&body).map_err(malformed)? {
                    RecordingAction::Started => true,
                    RecordingAction::Stopped => false,
                    RecordingAction::Unchanged => self.store.snapshot().recording,
                };
                self.control_state.set_recording(recording);
                ActionOutcome::Recording {
                    recording,
                    message: message(),
                }
            }
            Command::ToggleCollecting if endpoint == ControlEndpoint::StopCollecting => {
                let reported = decode_collected(&body).map_err(malformed)?;
                let samples = self.control_state.stop_collecting(reported);
                info!("Collection stopped with {} samples", samples.len());
                ActionOutcome::Collecting {
                    collecting: false,
                    samples,
                }
            }
            Command::ToggleCollecting => {
                self.control_state.start_collecting(CollectMode::Fresh);
                ActionOutcome::Collecting {
                    collecting: true,
                    samples: Vec::new(),
                }
            }
            Command::GetMissionPadData => {
                let report = decode_mission_pad(&body).map_err(malformed)?;
                self.telemetry.apply(Telemetry::MissionPad(report.fix));
                ActionOutcome::MissionPad(report)
            }
            _ => ActionOutcome::Message(message()),
        };
        Ok(outcome)
    }

    /// Apply one persistent-channel event
    ///
    /// Returns a notice for the operator when the driver reports a problem.
    pub fn handle_inbound(&self, envelope: &Envelope) -> Option<String> {
        match decode_event(envelope) {
            Ok(Inbound::Telemetry(telemetry)) => {
                self.telemetry.apply(telemetry);
                None
            }
            Ok(Inbound::CommandResponse(response)) if response.ok => {
                debug!("Driver accepted {:?}", response.command);
                None
            }
            Ok(Inbound::CommandResponse(response)) => {
                let notice = format!(
                    "Command {} rejected: {}",
                    response.command.as_deref().unwrap_or("?"),
                    response.message.as_deref().unwrap_or("no reason given")
                );
                warn!("{}", notice);
                Some(notice)
            }
            Ok(Inbound::StreamResponse { status }) => {
                info!("Stream: {}", status);
                None
            }
            Ok(Inbound::Unknown(event)) => {
                debug!("Ignoring unknown event {}", event);
                None
            }
            Err(e) => {
                warn!("Dropping malformed {} event: {}", envelope.event, e);
                None
            }
        }
    }

    /// Round trip with the non-2xx check, no link guard
    async fn checked(&self, endpoint: ControlEndpoint) -> Result<Value, RequestError> {
        let reply = self.control.request(endpoint).await?;
        if reply.is_success() {
            return Ok(reply.body);
        }

        let message = response_message(&reply.body)
            .or_else(|| match &reply.body {
                Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
                _ => None,
            })
            .unwrap_or_else(|| {
                reqwest::StatusCode::from_u16(reply.status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("request failed")
                    .to_string()
            });
        Err(RequestError::Status {
            endpoint,
            status: reply.status,
            message,
        })
    }

    fn push(&self, envelope: Envelope) -> bool {
        match self.outbound.try_send(envelope) {
            Ok(()) => true,
            Err(TrySendError::Full(envelope)) => {
                warn!("Persistent channel backed up, dropping {}", envelope.event);
                false
            }
            Err(TrySendError::Closed(envelope)) => {
                warn!("Persistent channel closed, dropping {}", envelope.event);
                false
            }
        }
    }
}
