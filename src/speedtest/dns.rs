use crate::error::{ProbeError, ProbeResult};
use crate::settings::Settings;
use log::{debug, warn};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DnsTiming {
    pub elapsed_ms: u64,
    /// Set when the request failed and the default duration was substituted.
    pub fallback: bool,
}

async fn timed_get(url: &str, timeout: Duration) -> ProbeResult<Duration> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;

    let start = Instant::now();
    let response = client.get(url).send().await?;
    let elapsed = start.elapsed();

    if !response.status().is_success() && !response.status().is_redirection() {
        return Err(ProbeError::Status(response.status()));
    }
    Ok(elapsed)
}

/// Times one request to a well-known host as a stand-in for resolver speed.
pub async fn time_dns(settings: &Settings) -> DnsTiming {
    match timed_get(&settings.dns_url, settings.dns_timeout).await {
        Ok(elapsed) => {
            debug!("DNS probe {} took {:?}", settings.dns_url, elapsed);
            DnsTiming {
                elapsed_ms: elapsed.as_millis() as u64,
                fallback: false,
            }
        }
        Err(e) => {
            warn!("DNS probe failed: {}", e);
            DnsTiming {
                elapsed_ms: settings.dns_fallback_ms,
                fallback: true,
            }
        }
    }
}
