/// Connection quality rating derived from average latency and packet loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Quality {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl Quality {
    /// Rules are checked top to bottom; unavailable latency is always Poor.
    pub fn classify(avg_ms: Option<f64>, loss_percent: u32) -> Self {
        let Some(avg) = avg_ms else {
            return Quality::Poor;
        };

        if loss_percent == 0 && avg < 50.0 {
            Quality::Excellent
        } else if loss_percent < 3 && avg < 100.0 {
            Quality::Good
        } else if loss_percent < 5 && avg < 150.0 {
            Quality::Fair
        } else {
            Quality::Poor
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Quality::Excellent => "EXCELLENT",
            Quality::Good => "GOOD",
            Quality::Fair => "FAIR",
            Quality::Poor => "POOR",
        }
    }
}
