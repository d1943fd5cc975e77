use crate::speedtest::delegate::ServerEntry;
use crate::speedtest::quality::Quality;
use crate::speedtest::{Bandwidth, SpeedTestResult};
use crossterm::style::{Color, Stylize};

const SUCCESS: Color = Color::Rgb { r: 134, g: 194, b: 156 }; // Soft green
const INFO: Color = Color::Rgb { r: 147, g: 180, b: 220 }; // Soft blue
const WARN: Color = Color::Rgb { r: 220, g: 180, b: 130 }; // Soft amber
const ALERT: Color = Color::Rgb { r: 220, g: 120, b: 110 }; // Soft red
const TEXT_MUTED: Color = Color::Rgb { r: 100, g: 100, b: 100 };

const NOT_AVAILABLE: &str = "N/A";
const RULE_WIDTH: usize = 44;

fn quality_color(quality: Quality) -> Color {
    match quality {
        Quality::Excellent => SUCCESS,
        Quality::Good => INFO,
        Quality::Fair => WARN,
        Quality::Poor => ALERT,
    }
}

fn row(label: &str, value: impl AsRef<str>) -> String {
    format!("  {:<14}{}", label, value.as_ref())
}

fn format_bandwidth(bandwidth: Option<&Bandwidth>) -> String {
    match bandwidth {
        Some(b) => format!("{:.2} Mbit/s ({})", b.mbps, b.source.label()),
        None => NOT_AVAILABLE.to_string(),
    }
}

fn format_transfer(bandwidth: &Bandwidth) -> Option<String> {
    let bytes = bandwidth.bytes?;
    let elapsed = bandwidth.elapsed?;
    Some(format!(
        "{:.1} MB in {:.2}s",
        bytes as f64 / 1_000_000.0,
        elapsed.as_secs_f64()
    ))
}

fn push_bandwidth(lines: &mut Vec<String>, label: &str, bandwidth: Option<&Bandwidth>) {
    lines.push(row(label, format_bandwidth(bandwidth)));
    if let Some(transfer) = bandwidth.and_then(format_transfer) {
        lines.push(row("", transfer));
    }
}

/// Lays out one run as the fixed multi-section text report.
pub fn render_report(result: &SpeedTestResult, tip_loss_threshold: u32, color: bool) -> String {
    let mut lines = Vec::new();
    let rule = "─".repeat(RULE_WIDTH);

    lines.push("netcheck · network quality report".to_string());
    lines.push(rule.clone());

    // Latency
    let loss = result.loss_percent();
    let quality = result.quality();
    let stats = result.latency.as_ref().and_then(|l| l.stats);

    lines.push(String::new());
    lines.push("Latency".to_string());
    if let Some(latency) = &result.latency {
        lines.push(row("Target", &latency.target));
    }
    match stats {
        Some(s) => {
            lines.push(row("Average", format!("{:.1} ms", s.avg_ms)));
            lines.push(row("Min / Max", format!("{:.1} / {:.1} ms", s.min_ms, s.max_ms)));
            lines.push(row("Jitter", format!("{:.1} ms", s.jitter_ms())));
        }
        None => {
            lines.push(row("Average", NOT_AVAILABLE));
            lines.push(row("Jitter", NOT_AVAILABLE));
        }
    }
    lines.push(row("Packet loss", format!("{}%", loss)));
    let label = if color {
        quality.label().with(quality_color(quality)).bold().to_string()
    } else {
        quality.label().to_string()
    };
    lines.push(row("Quality", label));

    // DNS
    lines.push(String::new());
    lines.push("DNS".to_string());
    let dns = match result.dns {
        Some(d) if d.fallback => format!("{} ms (default, probe failed)", d.elapsed_ms),
        Some(d) => format!("{} ms", d.elapsed_ms),
        None => NOT_AVAILABLE.to_string(),
    };
    lines.push(row("Lookup", dns));

    // Bandwidth
    lines.push(String::new());
    lines.push("Bandwidth".to_string());
    push_bandwidth(&mut lines, "Download", result.download.as_ref());
    push_bandwidth(&mut lines, "Upload", result.upload.as_ref());
    if let Some(server) = &result.speedtest_server {
        let value = match result.speedtest_ping_ms {
            Some(ping) => format!("{}, ping {:.1} ms", server, ping),
            None => server.clone(),
        };
        lines.push(row("Speedtest", value));
    }

    if !result.notes.is_empty() {
        lines.push(String::new());
        lines.push("Notes".to_string());
        for note in &result.notes {
            lines.push(format!("  - {}", note));
        }
    }

    lines.push(String::new());
    if loss < tip_loss_threshold {
        lines.push("Tips".to_string());
        lines.push("  - A wired connection gives the most stable latency.".to_string());
        lines.push(
            "  - Use --list-servers and --server=ID to pin a nearby speedtest server.".to_string(),
        );
        if quality <= Quality::Fair {
            lines.push(
                "  - Pause background downloads or restart the router, then test again."
                    .to_string(),
            );
        }
    } else {
        let warning = format!(
            "Packet loss is {}%: the figures above are unreliable. \
             Check cabling or Wi-Fi signal, or contact your provider.",
            loss
        );
        lines.push(if color {
            warning.with(ALERT).to_string()
        } else {
            warning
        });
    }
    lines.push(rule);

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Listing printed by `--list-servers`.
pub fn render_server_list(entries: &[ServerEntry], color: bool) -> String {
    if entries.is_empty() {
        return "No speedtest servers found.\n".to_string();
    }

    let mut out = String::new();
    for entry in entries {
        out.push_str(&entry.line);
        if entry.distance_km.is_none() && color {
            out.push_str(&format!(" {}", "(distance unknown)".with(TEXT_MUTED)));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speedtest::dns::DnsTiming;
    use crate::speedtest::ping::{LatencyReport, RttStats};
    use crate::speedtest::Source;
    use std::time::Duration;

    fn latency(avg: f64, loss: u32) -> LatencyReport {
        LatencyReport {
            target: "8.8.8.8".to_string(),
            stats: Some(RttStats {
                min_ms: avg - 5.0,
                avg_ms: avg,
                max_ms: avg + 5.0,
            }),
            loss_percent: loss,
        }
    }

    #[test]
    fn test_everything_unavailable() {
        let report = render_report(&SpeedTestResult::default(), 10, false);
        assert!(report.contains("Average       N/A"));
        assert!(report.contains("Quality       POOR"));
        assert!(report.contains("Lookup        N/A"));
        assert!(report.contains("Download      N/A"));
        assert!(report.contains("Upload        N/A"));
        assert!(report.contains("Tips"));
        assert!(!report.contains("Notes"));
    }

    #[test]
    fn test_latency_section() {
        let result = SpeedTestResult {
            latency: Some(latency(80.0, 2)),
            ..Default::default()
        };
        let report = render_report(&result, 10, false);
        assert!(report.contains("Target        8.8.8.8"));
        assert!(report.contains("Average       80.0 ms"));
        assert!(report.contains("Min / Max     75.0 / 85.0 ms"));
        assert!(report.contains("Jitter        10.0 ms"));
        assert!(report.contains("Packet loss   2%"));
        assert!(report.contains("Quality       GOOD"));
    }

    #[test]
    fn test_high_loss_replaces_tips_with_warning() {
        let result = SpeedTestResult {
            latency: Some(latency(30.0, 12)),
            ..Default::default()
        };
        let report = render_report(&result, 10, false);
        assert!(!report.contains("Tips"));
        assert!(report.contains("Packet loss is 12%"));
    }

    #[test]
    fn test_bandwidth_annotations() {
        let result = SpeedTestResult {
            download: Some(Bandwidth {
                mbps: 100.0,
                source: Source::Cdn,
                bytes: Some(125_000_000),
                elapsed: Some(Duration::from_secs(10)),
            }),
            upload: Some(Bandwidth::from_speedtest(41.07)),
            speedtest_server: Some("server 18312 (nearest)".to_string()),
            speedtest_ping_ms: Some(14.2),
            dns: Some(DnsTiming {
                elapsed_ms: 1000,
                fallback: true,
            }),
            notes: vec!["ping is not installed".to_string()],
            ..Default::default()
        };
        let report = render_report(&result, 10, false);
        assert!(report.contains("Download      100.00 Mbit/s (CDN)"));
        assert!(report.contains("125.0 MB in 10.00s"));
        assert!(report.contains("Upload        41.07 Mbit/s (speedtest)"));
        assert!(report.contains("Speedtest     server 18312 (nearest), ping 14.2 ms"));
        assert!(report.contains("1000 ms (default, probe failed)"));
        assert!(report.contains("  - ping is not installed"));
    }

    #[test]
    fn test_plain_report_has_no_escape_codes() {
        let result = SpeedTestResult {
            latency: Some(latency(20.0, 0)),
            ..Default::default()
        };
        assert!(!render_report(&result, 10, false).contains('\u{1b}'));
    }

    #[test]
    fn test_server_list() {
        let entries = vec![ServerEntry {
            id: "12".to_string(),
            distance_km: Some(3.0),
            line: "12) Alpha (Town) [3.00 km]".to_string(),
        }];
        assert_eq!(render_server_list(&entries, false), "12) Alpha (Town) [3.00 km]\n");
        assert_eq!(render_server_list(&[], false), "No speedtest servers found.\n");
    }
}
