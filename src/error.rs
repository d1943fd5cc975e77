use std::time::Duration;
use thiserror::Error;

/// Why a single probe produced no value.
///
/// None of these abort the run; the orchestrator logs them and reports the
/// affected measurement as unavailable.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{0} is not installed")]
    ToolMissing(&'static str),

    #[error("{what} timed out after {}s", .after.as_secs())]
    Timeout { what: &'static str, after: Duration },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server responded with {0}")]
    Status(reqwest::StatusCode),

    #[error("could not parse {0} output")]
    Unparseable(&'static str),

    #[error("transfer finished in {:.2}s, too short to measure", .0.as_secs_f64())]
    TooShort(Duration),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type ProbeResult<T> = Result<T, ProbeError>;

impl ProbeError {
    /// Maps a spawn failure to `ToolMissing` when the binary is not on PATH.
    pub fn from_spawn(tool: &'static str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            ProbeError::ToolMissing(tool)
        } else {
            ProbeError::Io(err)
        }
    }
}
