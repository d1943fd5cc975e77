use crate::error::ProbeError;
use crate::settings::Settings;
use crate::speedtest::{
    adopt_upload, combine_download,
    delegate::{run_delegate, DelegateResult},
    dns::{time_dns, DnsTiming},
    download::DownloadTest,
    ping::{probe_latency, LatencyReport},
    upload::UploadTest,
    Bandwidth, SpeedTestResult, TestPhase,
};
use anyhow::Result;
use log::warn;
use tokio::sync::mpsc;

pub struct App {
    pub phase: TestPhase,
    pub result: SpeedTestResult,
    pub settings: Settings,

    // Raw per-strategy results, combined as they arrive
    delegate_download: Option<Bandwidth>,
    cdn_download: Option<Bandwidth>,
}

impl App {
    pub fn new(settings: Settings) -> Self {
        Self {
            phase: TestPhase::Idle,
            result: SpeedTestResult::default(),
            settings,
            delegate_download: None,
            cdn_download: None,
        }
    }

    pub fn handle_update(&mut self, update: TestUpdate) {
        match update {
            TestUpdate::Phase(phase) => self.phase = phase,
            TestUpdate::LatencyComplete(report) => self.result.latency = Some(report),
            TestUpdate::DnsComplete(timing) => self.result.dns = Some(timing),
            TestUpdate::DelegateComplete(delegate) => {
                self.result.speedtest_server = Some(delegate.server.describe());
                self.result.speedtest_ping_ms = delegate.ping_ms;
                self.delegate_download = delegate.download;
                // the upload probe may still replace this
                self.result.upload = delegate.upload;
                self.refresh_download();
            }
            TestUpdate::CdnDownloadComplete(best) => {
                self.cdn_download = best;
                self.refresh_download();
            }
            TestUpdate::UploadComplete(sample) => {
                self.result.upload = adopt_upload(
                    self.result.upload.take(),
                    sample,
                    self.settings.upload_floor_mbps,
                );
            }
            TestUpdate::Note(note) => self.result.notes.push(note),
        }
    }

    fn refresh_download(&mut self) {
        self.result.download =
            combine_download(self.delegate_download.clone(), self.cdn_download.clone());
    }

    pub fn complete_test(&mut self) {
        self.phase = TestPhase::Complete;
    }
}

#[derive(Debug)]
pub enum TestUpdate {
    Phase(TestPhase),
    LatencyComplete(LatencyReport),
    DnsComplete(DnsTiming),
    DelegateComplete(DelegateResult),
    CdnDownloadComplete(Option<Bandwidth>),
    UploadComplete(Option<Bandwidth>),
    Note(String),
}

fn skip_note(what: &str, err: &ProbeError) -> String {
    match err {
        ProbeError::ToolMissing(tool) => format!("{} not installed, {} skipped", tool, what),
        other => format!("{} unavailable: {}", what, other),
    }
}

/// Runs every probe in order, reporting each result over `update_tx`.
///
/// A failing probe never stops the run; it is logged, noted and reported as
/// unavailable.
pub async fn run_network_check(
    update_tx: mpsc::Sender<TestUpdate>,
    settings: Settings,
) -> Result<()> {
    // Latency
    update_tx.send(TestUpdate::Phase(TestPhase::Latency)).await?;
    let latency = match probe_latency(&settings).await {
        Ok(report) => report,
        Err(e) => {
            warn!("Latency probe failed: {}", e);
            update_tx.send(TestUpdate::Note(skip_note("latency probe", &e))).await?;
            LatencyReport::unavailable(&settings.ping_target)
        }
    };
    update_tx.send(TestUpdate::LatencyComplete(latency)).await?;

    // DNS
    update_tx.send(TestUpdate::Phase(TestPhase::Dns)).await?;
    let dns = time_dns(&settings).await;
    update_tx.send(TestUpdate::DnsComplete(dns)).await?;

    // Speedtest utility
    update_tx.send(TestUpdate::Phase(TestPhase::Speedtest)).await?;
    match run_delegate(&settings).await {
        Ok(delegate) => update_tx.send(TestUpdate::DelegateComplete(delegate)).await?,
        Err(e) => {
            warn!("Speedtest utility failed: {}", e);
            update_tx.send(TestUpdate::Note(skip_note("speedtest", &e))).await?;
        }
    }

    // Direct CDN download
    update_tx.send(TestUpdate::Phase(TestPhase::Download)).await?;
    let best = match DownloadTest::new(&settings).run().await {
        Ok(best) => best,
        Err(e) => {
            warn!("CDN download probe failed: {}", e);
            None
        }
    };
    if best.is_none() {
        update_tx
            .send(TestUpdate::Note("no CDN download produced a usable sample".to_string()))
            .await?;
    }
    update_tx.send(TestUpdate::CdnDownloadComplete(best)).await?;

    // Upload
    update_tx.send(TestUpdate::Phase(TestPhase::Upload)).await?;
    let sample = match UploadTest::new(&settings).run().await {
        Ok(sample) => {
            if sample.mbps <= settings.upload_floor_mbps {
                update_tx
                    .send(TestUpdate::Note(format!(
                        "upload probe measured {:.2} Mbit/s, below the {:.0} Mbit/s floor",
                        sample.mbps, settings.upload_floor_mbps
                    )))
                    .await?;
            }
            Some(sample)
        }
        Err(e) => {
            warn!("Upload probe failed: {}", e);
            update_tx.send(TestUpdate::Note(skip_note("upload probe", &e))).await?;
            None
        }
    };
    update_tx.send(TestUpdate::UploadComplete(sample)).await?;

    Ok(())
}
