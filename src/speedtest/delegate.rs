//! Delegation to an installed `speedtest-cli`.
//!
//! Server listings are free text. The distance annotation is read
//! best-effort: the tool guarantees neither its units nor its layout, so the
//! nearest-server pick is a heuristic and not an exact ranking.

use super::Bandwidth;
use crate::error::{ProbeError, ProbeResult};
use crate::settings::Settings;
use log::{debug, info, warn};
use regex::Regex;
use std::process::Output;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;

const SPEEDTEST_TOOL: &str = "speedtest-cli";

fn server_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(\d+)\)").expect("static pattern"))
}

fn distance_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[\[(]\s*(\d+(?:\.\d+)?)\s*km\s*[\])]").expect("static pattern")
    })
}

fn simple_field_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*(Ping|Download|Upload):\s*(\d+(?:\.\d+)?)\s*(ms|Mbit/s)")
            .expect("static pattern")
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerEntry {
    pub id: String,
    pub distance_km: Option<f64>,
    pub line: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerChoice {
    UserSupplied(String),
    Nearest(String),
    FirstListed(String),
    UtilityDefault,
}

impl ServerChoice {
    pub fn id(&self) -> Option<&str> {
        match self {
            ServerChoice::UserSupplied(id)
            | ServerChoice::Nearest(id)
            | ServerChoice::FirstListed(id) => Some(id),
            ServerChoice::UtilityDefault => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ServerChoice::UserSupplied(id) => format!("server {} (requested)", id),
            ServerChoice::Nearest(id) => format!("server {} (nearest)", id),
            ServerChoice::FirstListed(id) => format!("server {} (first listed)", id),
            ServerChoice::UtilityDefault => "default server".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DelegateResult {
    pub server: ServerChoice,
    pub ping_ms: Option<f64>,
    pub download: Option<Bandwidth>,
    pub upload: Option<Bandwidth>,
}

/// Keeps the lines of a `--list` run that start with a numeric server ID.
pub fn parse_server_list(output: &str) -> Vec<ServerEntry> {
    output
        .lines()
        .filter_map(|line| {
            let id = server_id_regex().captures(line)?[1].to_string();
            let distance_km = distance_regex()
                .captures(line)
                .and_then(|caps| caps[1].parse().ok());
            Some(ServerEntry {
                id,
                distance_km,
                line: line.trim().to_string(),
            })
        })
        .collect()
}

/// Requested ID, then nearest listed, then first listed, then the tool's
/// own default.
pub fn select_server(requested: Option<&str>, listing: Option<&[ServerEntry]>) -> ServerChoice {
    if let Some(id) = requested {
        return ServerChoice::UserSupplied(id.to_string());
    }

    let Some(entries) = listing.filter(|e| !e.is_empty()) else {
        return ServerChoice::UtilityDefault;
    };

    let nearest = entries
        .iter()
        .filter_map(|e| e.distance_km.map(|d| (d, e)))
        .fold(None::<(f64, &ServerEntry)>, |best, (d, e)| match best {
            Some((bd, _)) if d >= bd => best,
            _ => Some((d, e)),
        });

    match nearest {
        Some((_, entry)) => ServerChoice::Nearest(entry.id.clone()),
        None => ServerChoice::FirstListed(entries[0].id.clone()),
    }
}

/// Reads the `Ping:`/`Download:`/`Upload:` lines of `--simple` output.
pub fn parse_simple_output(server: ServerChoice, output: &str) -> ProbeResult<DelegateResult> {
    let mut result = DelegateResult {
        server,
        ping_ms: None,
        download: None,
        upload: None,
    };

    for caps in simple_field_regex().captures_iter(output) {
        let Ok(value) = caps[2].parse::<f64>() else {
            continue;
        };
        match &caps[1] {
            "Ping" => result.ping_ms = Some(value),
            "Download" => result.download = Some(Bandwidth::from_speedtest(value)),
            "Upload" => result.upload = Some(Bandwidth::from_speedtest(value)),
            _ => {}
        }
    }

    if result.download.is_none() && result.upload.is_none() {
        return Err(ProbeError::Unparseable(SPEEDTEST_TOOL));
    }
    Ok(result)
}

async fn run_tool(program: &str, args: &[&str], timeout: Duration) -> ProbeResult<Output> {
    let child = Command::new(program).args(args).kill_on_drop(true).output();

    match tokio::time::timeout(timeout, child).await {
        Ok(result) => result.map_err(|e| ProbeError::from_spawn(SPEEDTEST_TOOL, e)),
        Err(_) => Err(ProbeError::Timeout {
            what: SPEEDTEST_TOOL,
            after: timeout,
        }),
    }
}

pub async fn list_servers(settings: &Settings) -> ProbeResult<Vec<ServerEntry>> {
    let output = run_tool(
        &settings.speedtest_program,
        &["--list"],
        settings.server_list_timeout,
    )
    .await?;

    if !output.status.success() {
        return Err(ProbeError::Unparseable(SPEEDTEST_TOOL));
    }
    Ok(parse_server_list(&String::from_utf8_lossy(&output.stdout)))
}

/// Picks a server and runs the utility once.
pub async fn run_delegate(settings: &Settings) -> ProbeResult<DelegateResult> {
    let server = match settings.speedtest_server.as_deref() {
        Some(id) => select_server(Some(id), None),
        None => match list_servers(settings).await {
            Ok(entries) => select_server(None, Some(entries.as_slice())),
            Err(ProbeError::ToolMissing(tool)) => return Err(ProbeError::ToolMissing(tool)),
            Err(e) => {
                warn!("Server listing failed ({}), using utility default", e);
                ServerChoice::UtilityDefault
            }
        },
    };
    info!("speedtest-cli using {}", server.describe());

    let mut args = vec!["--simple"];
    if let Some(id) = server.id() {
        args.push("--server");
        args.push(id);
    }

    let output = run_tool(&settings.speedtest_program, &args, settings.speedtest_timeout).await?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    debug!("speedtest-cli exited with {}: {}", output.status, stdout.trim());

    parse_simple_output(server, &stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
Retrieving speedtest.net configuration...
 21541) Telia (Stockholm, Sweden) [12.40 km]
 18312) Bahnhof AB (Stockholm, Sweden) [3.05 km]
  4247) Ownit (Stockholm, Sweden) [3.05 km]
 30593) Tele2 (Uppsala, Sweden) [66.12 km]
";

    #[test]
    fn test_parse_server_list() {
        let entries = parse_server_list(LISTING);
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].id, "21541");
        assert_eq!(entries[0].distance_km, Some(12.4));
        assert_eq!(entries[2].id, "4247");
        assert!(entries[0].line.starts_with("21541)"));
    }

    #[test]
    fn test_parenthesised_distance() {
        let entries = parse_server_list("  77) Provider, City (5.5 km)\n");
        assert_eq!(entries[0].distance_km, Some(5.5));
    }

    #[test]
    fn test_nearest_server_tie_keeps_first() {
        let entries = parse_server_list(LISTING);
        assert_eq!(
            select_server(None, Some(entries.as_slice())),
            ServerChoice::Nearest("18312".to_string())
        );
    }

    #[test]
    fn test_requested_server_wins() {
        let entries = parse_server_list(LISTING);
        assert_eq!(
            select_server(Some("999"), Some(entries.as_slice())),
            ServerChoice::UserSupplied("999".to_string())
        );
    }

    #[test]
    fn test_first_listed_without_distances() {
        let entries = parse_server_list(" 12) Alpha (Town)\n 34) Beta (City)\n");
        assert_eq!(
            select_server(None, Some(entries.as_slice())),
            ServerChoice::FirstListed("12".to_string())
        );
    }

    #[test]
    fn test_utility_default_when_listing_missing_or_empty() {
        assert_eq!(select_server(None, None), ServerChoice::UtilityDefault);
        assert_eq!(select_server(None, Some(&[][..])), ServerChoice::UtilityDefault);
        assert_eq!(ServerChoice::UtilityDefault.id(), None);
    }

    #[test]
    fn test_parse_simple_output() {
        let out = "Ping: 14.211 ms\nDownload: 93.52 Mbit/s\nUpload: 41.07 Mbit/s\n";
        let result = parse_simple_output(ServerChoice::UtilityDefault, out).unwrap();
        assert_eq!(result.ping_ms, Some(14.211));
        assert_eq!(result.download.unwrap().mbps, 93.52);
        assert_eq!(result.upload.unwrap().mbps, 41.07);
    }

    #[test]
    fn test_parse_simple_output_garbage() {
        let err = parse_simple_output(ServerChoice::UtilityDefault, "Cannot retrieve config")
            .unwrap_err();
        assert!(matches!(err, ProbeError::Unparseable(_)));
    }

    #[tokio::test]
    async fn test_missing_tool_is_reported() {
        let settings = Settings {
            speedtest_program: "netcheck-no-such-speedtest".to_string(),
            ..Settings::default()
        };
        assert!(matches!(
            run_delegate(&settings).await,
            Err(ProbeError::ToolMissing(_))
        ));

        let settings = settings.with_server(Some("1234".to_string()));
        assert!(matches!(
            run_delegate(&settings).await,
            Err(ProbeError::ToolMissing(_))
        ));
    }

    /// Installs a stand-in `speedtest-cli` that prints `listing` for
    /// `--list` and records the arguments of any other run in `args`.
    #[cfg(unix)]
    fn fake_speedtest(dir: &tempfile::TempDir, listing: &str, list_exit: i32) -> Settings {
        use std::os::unix::fs::PermissionsExt;

        let listing_path = dir.path().join("listing.txt");
        std::fs::write(&listing_path, listing).unwrap();

        let script = format!(
            r#"#!/bin/sh
if [ "$1" = "--list" ]; then
  cat "{listing}"
  exit {list_exit}
fi
echo "$@" > "{args}"
echo "Ping: 9.500 ms"
echo "Download: 88.10 Mbit/s"
echo "Upload: 31.20 Mbit/s"
"#,
            listing = listing_path.display(),
            list_exit = list_exit,
            args = dir.path().join("args").display(),
        );
        let path = dir.path().join("speedtest-cli");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        Settings {
            speedtest_program: path.to_string_lossy().into_owned(),
            ..Settings::default()
        }
    }

    #[cfg(unix)]
    fn recorded_args(dir: &tempfile::TempDir) -> String {
        std::fs::read_to_string(dir.path().join("args"))
            .unwrap()
            .trim()
            .to_string()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_requested_server_is_passed_through() {
        let dir = tempfile::tempdir().unwrap();
        let settings = fake_speedtest(&dir, LISTING, 0).with_server(Some("999".to_string()));

        let result = run_delegate(&settings).await.unwrap();
        assert_eq!(result.server, ServerChoice::UserSupplied("999".to_string()));
        assert_eq!(recorded_args(&dir), "--simple --server 999");
        assert_eq!(result.download.unwrap().mbps, 88.1);
        assert_eq!(result.upload.unwrap().mbps, 31.2);
        assert_eq!(result.ping_ms, Some(9.5));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_listing_picks_nearest_server() {
        let dir = tempfile::tempdir().unwrap();
        let settings = fake_speedtest(&dir, LISTING, 0);

        let result = run_delegate(&settings).await.unwrap();
        assert_eq!(result.server, ServerChoice::Nearest("18312".to_string()));
        assert_eq!(recorded_args(&dir), "--simple --server 18312");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_listing_uses_utility_default() {
        let dir = tempfile::tempdir().unwrap();
        let settings = fake_speedtest(&dir, "", 1);

        let result = run_delegate(&settings).await.unwrap();
        assert_eq!(result.server, ServerChoice::UtilityDefault);
        assert_eq!(recorded_args(&dir), "--simple");
    }
}
