use crate::error::{ProbeError, ProbeResult};
use crate::settings::Settings;
use log::{debug, info, warn};
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;

const PING_TOOL: &str = "ping";

fn loss_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)% packet loss").expect("static pattern"))
}

// Linux "rtt min/avg/max/mdev", BSD/macOS "round-trip min/avg/max/stddev",
// BusyBox "round-trip min/avg/max".
fn rtt_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"(?:rtt|round-trip) min/avg/max(?:/(?:mdev|stddev))? = ",
            r"(\d+(?:\.\d+)?)/(\d+(?:\.\d+)?)/(\d+(?:\.\d+)?)",
        ))
        .expect("static pattern")
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RttStats {
    pub min_ms: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
}

impl RttStats {
    pub fn jitter_ms(&self) -> f64 {
        self.max_ms - self.min_ms
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LatencyReport {
    pub target: String,
    /// `None` when no round-trip summary could be read.
    pub stats: Option<RttStats>,
    pub loss_percent: u32,
}

impl LatencyReport {
    pub fn unavailable(target: &str) -> Self {
        Self {
            target: target.to_string(),
            stats: None,
            loss_percent: 0,
        }
    }

    pub fn avg_ms(&self) -> Option<f64> {
        self.stats.map(|s| s.avg_ms)
    }
}

/// Reads the summary block of a `ping` run.
///
/// A missing loss line reads as 0% and a missing RTT line leaves the
/// statistics unavailable, so the report can still be produced.
pub fn parse_ping_output(target: &str, output: &str) -> LatencyReport {
    let loss_percent = loss_regex()
        .captures(output)
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .map(|loss| loss as u32)
        .unwrap_or(0);

    let stats = rtt_regex().captures(output).and_then(|caps| {
        Some(RttStats {
            min_ms: caps[1].parse().ok()?,
            avg_ms: caps[2].parse().ok()?,
            max_ms: caps[3].parse().ok()?,
        })
    });

    LatencyReport {
        target: target.to_string(),
        stats,
        loss_percent,
    }
}

pub struct PingTest {
    program: String,
    ping_count: usize,
    timeout: Duration,
}

impl PingTest {
    pub fn new(program: &str, ping_count: usize, timeout: Duration) -> Self {
        Self {
            program: program.to_string(),
            ping_count,
            timeout,
        }
    }

    pub async fn run(&self, target: &str) -> ProbeResult<LatencyReport> {
        debug!("Pinging {} ({} echoes)", target, self.ping_count);

        let child = Command::new(&self.program)
            .arg("-c")
            .arg(self.ping_count.to_string())
            .arg(target)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(result) => result.map_err(|e| ProbeError::from_spawn(PING_TOOL, e))?,
            Err(_) => {
                return Err(ProbeError::Timeout {
                    what: PING_TOOL,
                    after: self.timeout,
                })
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let report = parse_ping_output(target, &stdout);
        debug!(
            "ping {} exited with {}: {:?}",
            target, output.status, report
        );
        Ok(report)
    }
}

/// Pings the primary target, retrying once against the fallback target if
/// the primary produced no round-trip statistics.
pub async fn probe_latency(settings: &Settings) -> ProbeResult<LatencyReport> {
    let test = PingTest::new(
        &settings.ping_program,
        settings.ping_count,
        settings.ping_timeout(),
    );

    let primary = match test.run(&settings.ping_target).await {
        Ok(report) if report.stats.is_some() => return Ok(report),
        Err(ProbeError::ToolMissing(tool)) => return Err(ProbeError::ToolMissing(tool)),
        other => other,
    };

    let (target, fallback) = (&settings.ping_target, &settings.ping_fallback_target);
    match &primary {
        Ok(_) => info!("{} unreachable, trying {}", target, fallback),
        Err(e) => warn!("ping {} failed ({}), trying {}", target, e, fallback),
    }

    match test.run(&settings.ping_fallback_target).await {
        Ok(report) if report.stats.is_some() => Ok(report),
        Ok(report) => primary.or(Ok(report)),
        Err(e) => {
            warn!("ping {} failed: {}", settings.ping_fallback_target, e);
            primary.map_err(|_| e)
        }
    }
}
