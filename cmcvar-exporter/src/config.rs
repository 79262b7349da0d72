// CMCVAR Exporter - Prometheus exporter for CMC III sockets
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Runtime configuration and bindings store

use crate::error::{ExporterError, Result};
use crate::retry::RetryStrategy;
use clap::Parser;
use cmcvar::{AssembleOptions, Binding, BindingsFile, JoinPolicy};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// CMC III socket exporter
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Port to serve /metrics on
    #[arg(short, long, env = "PORT", default_value = "8123")]
    pub port: u16,

    /// Base URL of the Prometheus holding the CMC III series
    #[arg(long, env = "PROMETHEUS_URL", default_value = "http://10.10.2.107:9090")]
    pub prometheus_url: String,

    /// Seconds between two poll cycles
    #[arg(short = 'u', long, env = "UPDATE_PERIOD_S", default_value = "60")]
    pub update_period: u64,

    /// Bindings file mapping socket numbers to machines
    #[arg(short, long, env = "BINDINGS_CONFIG", default_value = "config.json")]
    pub config: PathBuf,

    /// cmcIIIVarDeviceIndex of the PDU on the CMC
    #[arg(long, env = "DEVICE_INDEX", default_value = "2")]
    pub device_index: String,

    /// Top-level key whose children are the socket slots
    #[arg(long, env = "SECTION_KEY", default_value = cmcvar::DEFAULT_SECTION)]
    pub section: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_S", default_value = "10")]
    pub request_timeout: u64,

    /// Only series seen in the last this many seconds are read
    #[arg(long, env = "SERIES_LOOKBACK_S", default_value = "300")]
    pub series_lookback: u64,

    /// Retries per request on network errors and 5xx
    #[arg(long, env = "FETCH_RETRIES", default_value = "3")]
    pub retries: u32,

    /// Abort the cycle when a value or unit names an unknown variable
    #[arg(long, env = "FAIL_FAST_JOINS", action = clap::ArgAction::Set, default_value_t = false)]
    pub fail_fast_joins: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    pub port: u16,
    pub prometheus_url: String,
    pub update_period: Duration,
    pub bindings_path: PathBuf,
    pub device_index: String,
    pub request_timeout: Duration,
    /// Window of the series query, ending now
    pub series_lookback: Duration,
    pub retry: RetryStrategy,
    pub assemble: AssembleOptions,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            port: 8123,
            prometheus_url: "http://10.10.2.107:9090".to_string(),
            update_period: Duration::from_secs(60),
            bindings_path: PathBuf::from("config.json"),
            device_index: "2".to_string(),
            request_timeout: Duration::from_secs(10),
            series_lookback: Duration::from_secs(300),
            retry: RetryStrategy::exponential(3, Duration::from_millis(500)),
            assemble: AssembleOptions::default(),
        }
    }
}

impl TryFrom<&Args> for ExporterConfig {
    type Error = ExporterError;

    fn try_from(args: &Args) -> Result<Self> {
        if args.update_period == 0 {
            return Err(ExporterError::InvalidConfig(
                "update period must be at least one second".to_string(),
            ));
        }
        if args.series_lookback == 0 {
            return Err(ExporterError::InvalidConfig(
                "series lookback must be at least one second".to_string(),
            ));
        }
        if args.request_timeout == 0 {
            return Err(ExporterError::InvalidConfig(
                "request timeout must be at least one second".to_string(),
            ));
        }
        let prometheus_url = args.prometheus_url.trim_end_matches('/').to_string();
        if !prometheus_url.starts_with("http://") && !prometheus_url.starts_with("https://") {
            return Err(ExporterError::InvalidConfig(format!(
                "prometheus url must be http(s): {}",
                args.prometheus_url
            )));
        }

        Ok(Self {
            port: args.port,
            prometheus_url,
            update_period: Duration::from_secs(args.update_period),
            bindings_path: args.config.clone(),
            device_index: args.device_index.clone(),
            request_timeout: Duration::from_secs(args.request_timeout),
            series_lookback: Duration::from_secs(args.series_lookback),
            retry: if args.retries == 0 {
                RetryStrategy::None
            } else {
                RetryStrategy::exponential(args.retries, Duration::from_millis(500))
            },
            assemble: AssembleOptions {
                section_key: args.section.clone(),
                join_policy: if args.fail_fast_joins {
                    JoinPolicy::FailFast
                } else {
                    JoinPolicy::SkipMissing
                },
            },
        })
    }
}

/// Bindings reloaded every cycle, falling back to the last good copy.
///
/// Loading must succeed once at startup; afterwards a missing or broken
/// file only logs a warning.
#[derive(Debug)]
pub struct BindingsStore {
    path: PathBuf,
    current: Vec<Binding>,
}

impl BindingsStore {
    /// Load the bindings for the first time
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = BindingsFile::load(&path)?;
        info!("Loaded {} bindings from {}", file.bindings.len(), path.display());
        Ok(Self {
            path,
            current: file.bindings,
        })
    }

    /// Re-read the file; keep the previous bindings if that fails
    pub async fn refresh(&mut self) -> &[Binding] {
        match self.reload().await {
            Ok(file) => {
                if file.bindings != self.current {
                    info!(
                        "Bindings changed: {} -> {} entries",
                        self.current.len(),
                        file.bindings.len()
                    );
                }
                self.current = file.bindings;
            }
            Err(e) => warn!("Keeping previous bindings: {}", e),
        }
        &self.current
    }

    async fn reload(&self) -> Result<BindingsFile> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            cmcvar::Error::Config(format!("{}: {}", self.path.display(), e))
        })?;
        Ok(BindingsFile::from_json(&text)?)
    }
}
