use std::time::Duration;

use hyper::StatusCode;

/// Failure of a single poll step. None of these stop the loop.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("could not build request for {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: hyper::http::Error,
    },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: hyper::Error,
    },
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: StatusCode },
    #[error("invalid JSON exchanged with {url}: {source}")]
    Json {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("memory statistics unavailable: {0}")]
    Memory(String),
}

/// Invalid startup configuration. Fatal.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no servers configured")]
    NoServers,
    #[error("invalid server address '{0}'")]
    InvalidAddress(String),
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}
