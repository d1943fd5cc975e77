pub mod delegate;
pub mod dns;
pub mod download;
pub mod ping;
pub mod quality;
pub mod upload;

use crate::error::{ProbeError, ProbeResult};
use dns::DnsTiming;
use ping::LatencyReport;
use quality::Quality;
use std::time::Duration;

/// Transfers shorter than this are too noisy to turn into a throughput.
pub const MIN_SAMPLE_DURATION: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Speedtest,
    Cdn,
}

impl Source {
    pub fn label(&self) -> &'static str {
        match self {
            Source::Speedtest => "speedtest",
            Source::Cdn => "CDN",
        }
    }
}

/// One accepted bandwidth sample in one direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Bandwidth {
    pub mbps: f64,
    pub source: Source,
    /// Bytes moved by the winning probe, when the probe knows it.
    pub bytes: Option<u64>,
    pub elapsed: Option<Duration>,
}

impl Bandwidth {
    pub fn from_speedtest(mbps: f64) -> Self {
        Self {
            mbps,
            source: Source::Speedtest,
            bytes: None,
            elapsed: None,
        }
    }

    /// Builds a CDN sample, applying the minimum duration rule.
    pub fn from_transfer(bytes: u64, elapsed: Duration) -> ProbeResult<Self> {
        let mbps = throughput_mbps(bytes, elapsed).ok_or(ProbeError::TooShort(elapsed))?;
        Ok(Self {
            mbps,
            source: Source::Cdn,
            bytes: Some(bytes),
            elapsed: Some(elapsed),
        })
    }
}

/// Megabits per second for a transfer, or `None` if it was under a second.
pub fn throughput_mbps(bytes: u64, elapsed: Duration) -> Option<f64> {
    if elapsed < MIN_SAMPLE_DURATION {
        return None;
    }
    Some((bytes as f64 * 8.0) / (elapsed.as_secs_f64() * 1_000_000.0))
}

/// The CDN result wins only when it is strictly faster.
pub fn combine_download(delegate: Option<Bandwidth>, cdn: Option<Bandwidth>) -> Option<Bandwidth> {
    match (delegate, cdn) {
        (Some(d), Some(c)) if c.mbps > d.mbps => Some(c),
        (Some(d), _) => Some(d),
        (None, c) => c,
    }
}

/// Keeps `prior` unless the upload sample clears the plausibility floor.
pub fn adopt_upload(
    prior: Option<Bandwidth>,
    sample: Option<Bandwidth>,
    floor_mbps: f64,
) -> Option<Bandwidth> {
    match sample {
        Some(s) if s.mbps > floor_mbps => Some(s),
        _ => prior,
    }
}

/// Everything one run collected, as handed to the report printer.
#[derive(Debug, Clone, Default)]
pub struct SpeedTestResult {
    pub latency: Option<LatencyReport>,
    pub dns: Option<DnsTiming>,
    pub download: Option<Bandwidth>,
    pub upload: Option<Bandwidth>,
    /// Server the speedtest utility ran against, if it ran.
    pub speedtest_server: Option<String>,
    pub speedtest_ping_ms: Option<f64>,
    pub notes: Vec<String>,
}

impl SpeedTestResult {
    pub fn loss_percent(&self) -> u32 {
        self.latency.as_ref().map_or(0, |l| l.loss_percent)
    }

    pub fn quality(&self) -> Quality {
        let avg = self.latency.as_ref().and_then(LatencyReport::avg_ms);
        Quality::classify(avg, self.loss_percent())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPhase {
    Idle,
    Latency,
    Dns,
    Speedtest,
    Download,
    Upload,
    Complete,
}

impl TestPhase {
    pub fn label(&self) -> &'static str {
        match self {
            TestPhase::Idle => "Ready",
            TestPhase::Latency => "Measuring latency...",
            TestPhase::Dns => "Timing DNS lookup...",
            TestPhase::Speedtest => "Running speedtest utility...",
            TestPhase::Download => "Testing CDN download...",
            TestPhase::Upload => "Testing upload...",
            TestPhase::Complete => "Complete",
        }
    }
}
