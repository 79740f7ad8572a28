//! Session State Store
//!
//! The session lives in a `watch` channel so observers are notified of every
//! change and can always read a consistent snapshot. Mutation is split by
//! field owner:
//!
//! - [`LinkWriter`]: `connection`, driven by the connection controller
//! - [`ControlWriter`]: `recording` and the collecting flag, on confirmed
//!   control-channel responses only
//! - [`TelemetryWriter`]: battery, last frame, mission pad and live samples

use std::sync::Arc;
use teleop_shared::state_machine::{self, LinkEvent, TransitionResult};
use teleop_shared::{
    BatteryLevel, ConnectionState, MissionPadFix, Telemetry, TelemetrySample, VideoFrame,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::buffer::{CollectMode, SampleRejected, TelemetryBuffer};

/// Current session flags and last-known telemetry
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub connection: ConnectionState,
    pub recording: bool,
    pub battery: BatteryLevel,
    pub last_frame: Option<VideoFrame>,
    pub mission_pad: Option<MissionPadFix>,
    pub samples: TelemetryBuffer,
}

impl Session {
    pub fn collecting(&self) -> bool {
        self.samples.is_collecting()
    }

    /// One-line status summary for display
    pub fn summary(&self) -> String {
        let pad = match &self.mission_pad {
            Some(fix) => fix.to_string(),
            None => "none".into(),
        };
        format!(
            "link: {} | battery: {} | recording: {} | collecting: {} ({} samples) | mission pad: {}",
            self.connection,
            self.battery,
            on_off(self.recording),
            on_off(self.collecting()),
            self.samples.len(),
            pad
        )
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

type Shared = Arc<watch::Sender<Session>>;

/// Read side of the session
#[derive(Clone)]
pub struct SessionStore {
    tx: Shared,
}

/// Writer handles for a new store, one per field owner
pub struct SessionWriters {
    pub link: LinkWriter,
    pub control: ControlWriter,
    pub telemetry: TelemetryWriter,
}

impl SessionStore {
    /// Create the session and its writer handles
    pub fn new() -> (Self, SessionWriters) {
        let (tx, _rx) = watch::channel(Session::default());
        let tx = Arc::new(tx);
        let writers = SessionWriters {
            link: LinkWriter { tx: tx.clone() },
            control: ControlWriter { tx: tx.clone() },
            telemetry: TelemetryWriter { tx: tx.clone() },
        };
        (Self { tx }, writers)
    }

    pub fn snapshot(&self) -> Session {
        self.tx.borrow().clone()
    }

    pub fn connection(&self) -> ConnectionState {
        self.tx.borrow().connection
    }

    pub fn is_collecting(&self) -> bool {
        self.tx.borrow().collecting()
    }

    /// Buffered samples with outliers removed
    pub fn chart_series(&self) -> Vec<TelemetrySample> {
        self.tx.borrow().samples.chart_series().copied().collect()
    }

    /// Observe session changes
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }
}

/// Sole writer of `Session::connection`
pub struct LinkWriter {
    tx: Shared,
}

impl LinkWriter {
    /// Apply a lifecycle event, leaving the state untouched if it is invalid
    pub fn apply(&self, event: LinkEvent) -> TransitionResult {
        let mut result = TransitionResult::Invalid {
            from: ConnectionState::default(),
            event,
        };
        self.tx.send_if_modified(|session| {
            result = state_machine::transition(session.connection, event);
            match result {
                TransitionResult::Success(next) if next != session.connection => {
                    info!("Vehicle link {} -> {} ({:?})", session.connection, next, event);
                    session.connection = next;
                    true
                }
                TransitionResult::Success(_) => false,
                TransitionResult::Invalid { from, event } => {
                    debug!("Ignoring {:?} while {}", event, from);
                    false
                }
            }
        });
        result
    }
}

/// Sole writer of `Session::recording` and the collecting flag
pub struct ControlWriter {
    tx: Shared,
}

impl ControlWriter {
    pub fn set_recording(&self, recording: bool) {
        self.tx.send_if_modified(|session| {
            let changed = session.recording != recording;
            session.recording = recording;
            changed
        });
    }

    pub fn start_collecting(&self, mode: CollectMode) {
        self.tx.send_modify(|session| session.samples.start(mode));
    }

    /// Stop collecting, merge the driver's series and return the buffer
    pub fn stop_collecting(&self, reported: Vec<TelemetrySample>) -> Vec<TelemetrySample> {
        let mut series = Vec::new();
        self.tx.send_modify(|session| series = session.samples.stop(reported));
        series
    }
}

/// Sole writer of battery, frame, mission pad and live samples
pub struct TelemetryWriter {
    tx: Shared,
}

impl TelemetryWriter {
    pub fn apply(&self, telemetry: Telemetry) {
        match telemetry {
            Telemetry::Battery(level) => {
                if !level.in_range() {
                    warn!("Battery level {} outside 0-100, storing as received", level);
                } else if level.is_low() {
                    warn!("Battery low: {}", level);
                }
                self.tx.send_if_modified(|session| {
                    let changed = session.battery != level;
                    session.battery = level;
                    changed
                });
            }
            Telemetry::Frame(frame) => {
                debug!("Video frame: {} bytes", frame.jpeg.len());
                self.tx.send_modify(|session| session.last_frame = Some(frame));
            }
            Telemetry::Distance(sample) => {
                self.tx.send_if_modified(|session| match session.samples.append(sample) {
                    Ok(()) => true,
                    Err(SampleRejected::NotCollecting) => false,
                    Err(e) => {
                        warn!("Dropping distance sample: {}", e);
                        false
                    }
                });
            }
            Telemetry::MissionPad(fix) => {
                self.tx.send_if_modified(|session| {
                    let changed = session.mission_pad != fix;
                    session.mission_pad = fix;
                    changed
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_initial_session() {
        let (store, _writers) = SessionStore::new();
        let session = store.snapshot();
        assert_eq!(session.connection, ConnectionState::Disconnected);
        assert_eq!(session.battery, BatteryLevel::NoConnection);
        assert!(!session.recording);
        assert!(!session.collecting());
        assert!(session.mission_pad.is_none());
    }

    #[test]
    fn test_link_writer_follows_state_machine() {
        let (store, writers) = SessionStore::new();

        assert!(matches!(
            writers.link.apply(LinkEvent::ConnectSucceeded),
            TransitionResult::Invalid { .. }
        ));
        assert_eq!(store.connection(), ConnectionState::Disconnected);

        writers.link.apply(LinkEvent::ConnectRequested);
        assert_eq!(store.connection(), ConnectionState::Connecting);
        writers.link.apply(LinkEvent::ConnectSucceeded);
        assert_eq!(store.connection(), ConnectionState::Connected);
    }

    #[test]
    fn test_battery_applied_and_out_of_range_kept() {
        let (store, writers) = SessionStore::new();

        writers
            .telemetry
            .apply(Telemetry::Battery(BatteryLevel::Percent(87.0)));
        assert_eq!(store.snapshot().battery, BatteryLevel::Percent(87.0));

        writers
            .telemetry
            .apply(Telemetry::Battery(BatteryLevel::Percent(130.0)));
        assert_eq!(store.snapshot().battery, BatteryLevel::Percent(130.0));
    }

    #[test]
    fn test_distance_samples_only_while_collecting() {
        let (store, writers) = SessionStore::new();
        let sample = TelemetrySample::new(Utc::now() + Duration::seconds(1), 42.0);

        writers.telemetry.apply(Telemetry::Distance(sample));
        assert!(store.snapshot().samples.is_empty());

        writers.control.start_collecting(CollectMode::Fresh);
        assert!(store.is_collecting());
        writers.telemetry.apply(Telemetry::Distance(sample));

        let series = writers.control.stop_collecting(Vec::new());
        assert_eq!(series, vec![sample]);
        assert!(!store.is_collecting());
    }

    #[test]
    fn test_chart_series_filters_outliers() {
        let (store, writers) = SessionStore::new();
        let now = Utc::now() + Duration::seconds(1);

        writers.control.start_collecting(CollectMode::Fresh);
        writers
            .telemetry
            .apply(Telemetry::Distance(TelemetrySample::new(now, 40.0)));
        writers.telemetry.apply(Telemetry::Distance(TelemetrySample::new(
            now + Duration::seconds(1),
            750.0,
        )));

        assert_eq!(store.chart_series().len(), 1);
        assert_eq!(store.snapshot().samples.len(), 2);
    }

    #[tokio::test]
    async fn test_observers_see_changes() {
        let (store, writers) = SessionStore::new();
        let mut rx = store.subscribe();

        writers.control.set_recording(true);
        rx.changed().await.expect("store alive");
        assert!(rx.borrow_and_update().recording);

        // Writing the same value does not notify
        writers.control.set_recording(true);
        assert!(!rx.has_changed().expect("store alive"));
    }

    #[test]
    fn test_summary() {
        let (store, writers) = SessionStore::new();
        writers
            .telemetry
            .apply(Telemetry::Battery(BatteryLevel::Percent(87.0)));
        let summary = store.snapshot().summary();
        assert!(summary.contains("battery: 87%"));
        assert!(summary.contains("link: disconnected"));
    }
}
