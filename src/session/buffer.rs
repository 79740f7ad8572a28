//! Telemetry Buffer
//!
//! Append-only series of distance samples recorded while collection is
//! active. The charted view is derived on demand and never touches the
//! underlying samples.

use chrono::{DateTime, Utc};
use teleop_shared::TelemetrySample;
use thiserror::Error;

/// How a new collection session treats earlier samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectMode {
    /// Clear prior samples and start a new series
    Fresh,
    /// Keep prior samples and continue the series
    Resume,
}

/// Why a sample was not appended
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SampleRejected {
    #[error("not collecting")]
    NotCollecting,

    #[error("sample at {0} precedes the last buffered sample")]
    OutOfOrder(DateTime<Utc>),
}

#[derive(Debug, Clone, Default)]
pub struct TelemetryBuffer {
    samples: Vec<TelemetrySample>,
    collecting: bool,
    /// Index of the first sample of the current collection session
    session_start: usize,
    /// Newest timestamp the driver has already reported, on the driver's
    /// clock; its history is cumulative across sessions
    reported_upto: Option<DateTime<Utc>>,
}

impl TelemetryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_collecting(&self) -> bool {
        self.collecting
    }

    pub fn samples(&self) -> &[TelemetrySample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Begin collecting
    pub fn start(&mut self, mode: CollectMode) {
        if mode == CollectMode::Fresh {
            self.samples.clear();
        }
        self.session_start = self.samples.len();
        self.collecting = true;
    }

    /// Append one live sample
    pub fn append(&mut self, sample: TelemetrySample) -> Result<(), SampleRejected> {
        if !self.collecting {
            return Err(SampleRejected::NotCollecting);
        }
        if let Some(last) = self.samples.last() {
            if sample.timestamp < last.timestamp {
                return Err(SampleRejected::OutOfOrder(sample.timestamp));
            }
        }
        self.samples.push(sample);
        Ok(())
    }

    /// Stop collecting and take the series reported by the driver
    ///
    /// Entries the driver already returned from an earlier stop are skipped.
    /// When anything new remains it replaces the live samples of this
    /// session; otherwise the live samples are kept. Returns the full buffer
    /// contents.
    pub fn stop<I>(&mut self, reported: I) -> Vec<TelemetrySample>
    where
        I: IntoIterator<Item = TelemetrySample>,
    {
        self.collecting = false;

        let mark = self.reported_upto;
        let mut fresh: Vec<TelemetrySample> = Vec::new();
        for sample in reported {
            self.reported_upto = Some(match self.reported_upto {
                Some(upto) => upto.max(sample.timestamp),
                None => sample.timestamp,
            });
            if mark.map_or(false, |mark| sample.timestamp <= mark) {
                continue;
            }
            let floor = fresh
                .last()
                .or_else(|| self.samples[..self.session_start].last())
                .map(|s| s.timestamp);
            if floor.map_or(true, |floor| sample.timestamp >= floor) {
                fresh.push(sample);
            }
        }

        if !fresh.is_empty() {
            self.samples.truncate(self.session_start);
            self.samples.extend(fresh);
        }

        self.samples.clone()
    }

    /// Samples shown on charts: everything except distance outliers
    pub fn chart_series(&self) -> impl Iterator<Item = &TelemetrySample> + '_ {
        self.samples.iter().filter(|s| !s.is_outlier())
    }
}
