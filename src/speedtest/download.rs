use super::Bandwidth;
use crate::error::{ProbeError, ProbeResult};
use crate::settings::{CdnEndpoint, Settings};
use futures::StreamExt;
use log::{debug, info, warn};
use std::time::{Duration, Instant};

pub struct DownloadTest {
    endpoints: Vec<CdnEndpoint>,
    connect_timeout: Duration,
    transfer_timeout: Duration,
}

impl DownloadTest {
    pub fn new(settings: &Settings) -> Self {
        Self {
            endpoints: settings.cdn_endpoints.clone(),
            connect_timeout: settings.connect_timeout,
            transfer_timeout: settings.transfer_timeout,
        }
    }

    /// Tries every endpoint in order and returns the fastest accepted sample.
    pub async fn run(&self) -> ProbeResult<Option<Bandwidth>> {
        let client = reqwest::Client::builder()
            .timeout(self.transfer_timeout)
            .connect_timeout(self.connect_timeout)
            .build()?;

        let mut samples = Vec::with_capacity(self.endpoints.len());
        for endpoint in &self.endpoints {
            match probe_endpoint(&client, &endpoint.url).await {
                Ok(sample) => {
                    info!("{}: {:.2} Mbit/s", endpoint.name, sample.mbps);
                    samples.push(sample);
                }
                Err(e) => warn!("{} download skipped: {}", endpoint.name, e),
            }
        }

        Ok(pick_best(samples))
    }
}

/// Streams one URL to completion and turns it into a CDN sample.
pub async fn probe_endpoint(client: &reqwest::Client, url: &str) -> ProbeResult<Bandwidth> {
    debug!("Downloading {}", url);

    let start = Instant::now();
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(ProbeError::Status(response.status()));
    }

    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;
    while let Some(chunk) = stream.next().await {
        downloaded += chunk?.len() as u64;
    }

    Bandwidth::from_transfer(downloaded, start.elapsed())
}

/// Highest throughput wins; on a tie the earlier sample is kept.
pub fn pick_best(samples: impl IntoIterator<Item = Bandwidth>) -> Option<Bandwidth> {
    samples.into_iter().fold(None, |best, sample| match best {
        Some(b) if sample.mbps <= b.mbps => Some(b),
        _ => Some(sample),
    })
}
