use super::Bandwidth;
use crate::error::{ProbeError, ProbeResult};
use crate::settings::Settings;
use log::debug;
use rand::{RngCore, SeedableRng};
use std::io::Write;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;

const CHUNK_SIZE: usize = 64 * 1024;

pub struct UploadTest {
    url: String,
    upload_size: usize,
    connect_timeout: Duration,
    transfer_timeout: Duration,
}

impl UploadTest {
    pub fn new(settings: &Settings) -> Self {
        Self {
            url: settings.upload_url.clone(),
            upload_size: settings.upload_size_bytes(),
            connect_timeout: settings.connect_timeout,
            transfer_timeout: settings.transfer_timeout,
        }
    }

    /// Posts a random payload once. The payload file is removed when this
    /// returns, whatever the outcome.
    pub async fn run(&self) -> ProbeResult<Bandwidth> {
        let payload = write_payload(self.upload_size)?;
        let body = tokio::fs::read(payload.path()).await?;
        debug!(
            "Uploading {} bytes from {} to {}",
            body.len(),
            payload.path().display(),
            self.url
        );

        let client = reqwest::Client::builder()
            .timeout(self.transfer_timeout)
            .connect_timeout(self.connect_timeout)
            .build()?;

        let uploaded = body.len() as u64;
        let start = Instant::now();
        let response = client
            .post(&self.url)
            .header("Content-Type", "application/octet-stream")
            .body(body)
            .send()
            .await?;
        let elapsed = start.elapsed();

        if !response.status().is_success() {
            return Err(ProbeError::Status(response.status()));
        }

        Bandwidth::from_transfer(uploaded, elapsed)
    }
}

/// Fills a temporary file with `size` random bytes.
pub fn write_payload(size: usize) -> ProbeResult<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    let mut rng = rand::rngs::StdRng::from_entropy();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut written = 0;

    while written < size {
        rng.fill_bytes(&mut buffer);
        let to_write = (size - written).min(buffer.len());
        file.write_all(&buffer[..to_write])?;
        written += to_write;
    }
    file.flush()?;

    Ok(file)
}
