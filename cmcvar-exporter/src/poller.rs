// CMCVAR Exporter - Poll loop
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Poll loop feeding the metric registry.
//!
//! Every cycle fetches the three datasets, assembles them into leaf
//! records and publishes them. A cycle that fails anywhere before publish
//! leaves the registry exactly as the previous successful cycle left it.

use crate::client::BackendClient;
use crate::config::{BindingsStore, ExporterConfig};
use crate::error::Result;
use crate::metrics::{CycleOutcome, SocketMetrics};
use cmcvar::{assemble, Assembly};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{watch, RwLock};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Summary of the most recent cycles, served on /status.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LastCycle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_unix: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Leaves published by the last successful cycle
    pub leaves: usize,
    /// Slots bound by the last successful cycle
    pub slots: Vec<String>,
    /// Series records left out of the tree
    pub rejected_series: usize,
    pub skipped_values: usize,
    pub skipped_units: usize,
    pub duration_ms: u64,
}

/// State of the poll loop shared with the HTTP handlers.
#[derive(Debug, Default)]
pub struct PollerState {
    /// Whether the loop is running
    pub running: AtomicBool,
    pub cycles_ok: AtomicU64,
    pub cycles_failed: AtomicU64,
    pub last: RwLock<LastCycle>,
    /// JSON rendering of the last successfully assembled tree
    pub tree_json: RwLock<Option<String>>,
}

impl PollerState {
    /// True once a cycle has been published
    pub fn is_ready(&self) -> bool {
        self.cycles_ok.load(Ordering::SeqCst) > 0
    }
}

/// Poll loop that fetches, assembles and publishes.
pub struct Poller {
    config: ExporterConfig,
    client: BackendClient,
    bindings: BindingsStore,
    metrics: Arc<SocketMetrics>,
    state: Arc<PollerState>,
}

impl Poller {
    /// Create a poller; bindings must already be loaded.
    pub fn new(
        config: ExporterConfig,
        bindings: BindingsStore,
        metrics: Arc<SocketMetrics>,
    ) -> Result<Self> {
        let client = BackendClient::new(&config)?;
        Ok(Self {
            config,
            client,
            bindings,
            metrics,
            state: Arc::new(PollerState::default()),
        })
    }

    /// Get the poller state.
    pub fn state(&self) -> Arc<PollerState> {
        Arc::clone(&self.state)
    }

    /// Poll until `shutdown` fires.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        self.state.running.store(true, Ordering::SeqCst);
        info!(
            "Polling {} every {:?}",
            self.config.prometheus_url, self.config.update_period
        );

        loop {
            self.poll_once().await;

            tokio::select! {
                _ = sleep(self.config.update_period) => {}
                _ = shutdown.changed() => {
                    info!("Shutdown requested, stopping poller");
                    break;
                }
            }
        }

        self.state.running.store(false, Ordering::SeqCst);
    }

    /// Run one cycle and record its outcome. Returns whether it published.
    pub async fn poll_once(&mut self) -> bool {
        let started = Instant::now();

        match self.cycle().await {
            Ok(assembly) => {
                self.publish(&assembly, started.elapsed()).await;
                true
            }
            Err(e) => {
                let message = e.to_string();
                error!("Poll cycle failed, keeping previous values: {}", message);
                self.metrics.record_cycle(CycleOutcome::Failure);
                self.state.cycles_failed.fetch_add(1, Ordering::SeqCst);
                self.state.last.write().await.last_error = Some(message);
                false
            }
        }
    }

    async fn cycle(&mut self) -> Result<Assembly> {
        let bindings = self.bindings.refresh().await.to_vec();
        let input = self.client.fetch(bindings).await?;
        Ok(assemble(&input, &self.config.assemble)?)
    }

    async fn publish(&self, assembly: &Assembly, elapsed: Duration) {
        for rejected in &assembly.build.rejected {
            warn!(
                "Skipped series {} ({}): {}",
                rejected.name, rejected.index, rejected.error
            );
        }
        for report in [&assembly.values, &assembly.units] {
            for index in &report.missing {
                warn!("Skipped {} for unknown index {}", report.attribute, index);
            }
            for index in &report.invalid {
                warn!("Skipped unreadable {} for index {}", report.attribute, index);
            }
        }
        for collision in &assembly.collisions {
            warn!(
                "Slot {} matched several bindings: {} replaced by {}",
                collision.key, collision.replaced, collision.entity
            );
        }

        let report = self.metrics.publish(&assembly.leaves);
        self.metrics.record_cycle(CycleOutcome::Success);
        self.metrics.record_success(
            report.published,
            assembly.build.rejected.len(),
            &[&assembly.values, &assembly.units],
        );
        self.state.cycles_ok.fetch_add(1, Ordering::SeqCst);

        match assembly.tree.to_json() {
            Ok(json) => *self.state.tree_json.write().await = Some(json),
            Err(e) => debug!("Cannot render tree: {}", e),
        }

        {
            let mut last = self.state.last.write().await;
            *last = LastCycle {
                last_success_unix: SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .ok()
                    .map(|d| d.as_secs()),
                last_error: None,
                leaves: report.published,
                slots: assembly.slots.clone(),
                rejected_series: assembly.build.rejected.len(),
                skipped_values: assembly.values.skipped(),
                skipped_units: assembly.units.skipped(),
                duration_ms: elapsed.as_millis() as u64,
            };
        }

        info!(
            "Published {} leaves from {} slots in {:?} ({} skipped)",
            report.published,
            assembly.slots.len(),
            elapsed,
            report.skipped
        );
    }
}
