// CMCVAR Exporter - Prometheus exporter for CMC III sockets
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for the exporter

use reqwest::StatusCode;
use thiserror::Error;

/// Main error type for exporter operations
#[derive(Error, Debug)]
pub enum ExporterError {
    /// Backend unreachable, timed out or connection dropped
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Backend answered with a non-2xx status
    #[error("{url} returned {status}")]
    Status { url: String, status: StatusCode },

    /// Body is not the JSON we expect
    #[error("Malformed response from {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// Body parsed but the API reported a failure or left out `data`
    #[error("Unexpected response from {url}: {reason}")]
    Schema { url: String, reason: String },

    /// Tree build, join, binding or bindings-file error
    #[error(transparent)]
    Core(#[from] cmcvar::Error),

    /// Metric registration or encoding failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Rejected runtime configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ExporterError {
    /// Whether repeating the request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ExporterError::Network(_) => true,
            ExporterError::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}

/// Result type alias for exporter operations
pub type Result<T> = std::result::Result<T, ExporterError>;
