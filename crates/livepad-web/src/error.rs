use std::path::PathBuf;
use thiserror::Error;

/// Failures while resolving initial editor content. Callers log these and
/// fall back; they never reach the user as a blocking error.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid #code= payload: {0}")]
    Decode(String),

    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("{url} returned an empty snippet")]
    EmptySnippet { url: String },

    #[error("store I/O failed for {}: {source}", path.display())]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("debounceMs must be greater than zero")]
    ZeroDebounce,
}

#[derive(Debug, Error)]
pub enum CompilerError {
    #[error("failed to start component compiler `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("component compiler I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("component compiler `{program}` timed out after {timeout_ms} ms")]
    Timeout { program: String, timeout_ms: u64 },

    #[error("component compiler exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error("component compiler produced unreadable output: {0}")]
    Protocol(#[from] serde_json::Error),
}
