use std::time::Duration;

/// A large static file on a public CDN used for direct download probing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdnEndpoint {
    pub name: String,
    pub url: String,
}

impl CdnEndpoint {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub ping_program: String,
    pub ping_target: String,
    pub ping_fallback_target: String,
    pub ping_count: usize,

    pub dns_url: String,
    pub dns_timeout: Duration,
    pub dns_fallback_ms: u64,

    pub speedtest_program: String,
    pub speedtest_server: Option<String>,
    pub server_list_timeout: Duration,
    pub speedtest_timeout: Duration,

    pub cdn_endpoints: Vec<CdnEndpoint>,
    pub connect_timeout: Duration,
    pub transfer_timeout: Duration,

    pub upload_url: String,
    pub upload_size_mib: usize,
    pub upload_floor_mbps: f64,

    /// Tips are printed only while packet loss stays under this percentage.
    pub tip_loss_threshold: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ping_program: "ping".to_string(),
            ping_target: "8.8.8.8".to_string(),
            ping_fallback_target: "1.1.1.1".to_string(),
            ping_count: 20,
            dns_url: "https://www.google.com".to_string(),
            dns_timeout: Duration::from_secs(10),
            dns_fallback_ms: 1000,
            speedtest_program: "speedtest-cli".to_string(),
            speedtest_server: None,
            server_list_timeout: Duration::from_secs(10),
            speedtest_timeout: Duration::from_secs(120),
            cdn_endpoints: vec![
                CdnEndpoint::new(
                    "Cloudflare",
                    "https://speed.cloudflare.com/__down?bytes=100000000",
                ),
                CdnEndpoint::new("OVH", "https://proof.ovh.net/files/100Mb.dat"),
                CdnEndpoint::new("Hetzner", "https://fsn1-speed.hetzner.com/100MB.bin"),
                CdnEndpoint::new("Tele2", "http://speedtest.tele2.net/100MB.zip"),
            ],
            connect_timeout: Duration::from_secs(15),
            transfer_timeout: Duration::from_secs(120),
            upload_url: "https://speed.cloudflare.com/__up".to_string(),
            upload_size_mib: 10,
            upload_floor_mbps: 10.0,
            tip_loss_threshold: 10,
        }
    }
}

impl Settings {
    pub fn with_server(mut self, server: Option<String>) -> Self {
        self.speedtest_server = server;
        self
    }

    pub fn upload_size_bytes(&self) -> usize {
        self.upload_size_mib * 1024 * 1024
    }

    /// Overall cap for one `ping` run: one second per echo plus slack.
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_count as u64 + 15)
    }
}
