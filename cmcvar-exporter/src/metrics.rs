// CMCVAR Exporter - Prometheus metrics definitions
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Prometheus metrics for the re-exported socket leaves.
//!
//! One gauge vector per leaf metric name, created on first sight and kept
//! for the life of the process, plus a handful of metrics about the
//! exporter itself. Everything lives in one [`Registry`] owned by
//! [`SocketMetrics`]; the poll loop writes to it and the HTTP handler
//! reads from it.

use crate::error::{ExporterError, Result};
use cmcvar::{JoinReport, LeafRecord};
use prometheus::{
    Encoder, Gauge, GaugeVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Labels of every leaf gauge
pub const LEAF_LABELS: [&str; 3] = ["key", "index", "node"];

/// Metric name for a leaf.
///
/// Drops the first two dotted segments (site and device), joins the rest
/// with `_`, lowercases and turns spaces into `_`:
/// `A.B.Sockets.01.Temperature` becomes `sockets_01_temperature`.
pub fn metric_name(long_key: &str) -> String {
    long_key
        .to_lowercase()
        .split('.')
        .skip(2)
        .collect::<Vec<_>>()
        .join("_")
        .replace(' ', "_")
}

/// How a poll cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Success,
    Failure,
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleOutcome::Success => "success",
            CycleOutcome::Failure => "failure",
        }
    }
}

/// Counts from one [`SocketMetrics::publish`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub published: usize,
    pub skipped: usize,
}

/// Process-wide metric registry
pub struct SocketMetrics {
    registry: Registry,
    gauges: Mutex<HashMap<String, GaugeVec>>,
    cycles_total: IntCounterVec,
    last_success: Gauge,
    leaves: IntGauge,
    join_skipped_total: IntCounterVec,
    series_rejected_total: IntCounter,
}

impl SocketMetrics {
    /// Create the registry and register the exporter's own metrics.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let cycles_total = IntCounterVec::new(
            Opts::new("cmcvar_exporter_cycles_total", "Poll cycles by outcome"),
            &["outcome"],
        )?;
        let last_success = Gauge::new(
            "cmcvar_exporter_last_success_timestamp_seconds",
            "Unix time of the last successful poll cycle",
        )?;
        let leaves = IntGauge::new(
            "cmcvar_exporter_leaves",
            "Leaves published by the last successful poll cycle",
        )?;
        let join_skipped_total = IntCounterVec::new(
            Opts::new(
                "cmcvar_exporter_join_skipped_total",
                "Samples dropped because their index or value did not join",
            ),
            &["attribute"],
        )?;

        let series_rejected_total = IntCounter::new(
            "cmcvar_exporter_series_rejected_total",
            "Series records left out of the tree",
        )?;

        registry.register(Box::new(cycles_total.clone()))?;
        registry.register(Box::new(last_success.clone()))?;
        registry.register(Box::new(leaves.clone()))?;
        registry.register(Box::new(join_skipped_total.clone()))?;
        registry.register(Box::new(series_rejected_total.clone()))?;

        for outcome in [CycleOutcome::Success, CycleOutcome::Failure] {
            cycles_total.with_label_values(&[outcome.as_str()]);
        }

        Ok(Self {
            registry,
            gauges: Mutex::new(HashMap::new()),
            cycles_total,
            last_success,
            leaves,
            join_skipped_total,
            series_rejected_total,
        })
    }

    /// Set one gauge per leaf under `(key, index, node)`.
    ///
    /// Leaves without a value or whose name is not a valid metric name are
    /// skipped with a warning.
    pub fn publish(&self, leaves: &[LeafRecord]) -> PublishReport {
        let mut report = PublishReport::default();
        let mut gauges = self.gauges.lock().unwrap_or_else(PoisonError::into_inner);

        for leaf in leaves {
            let Some(value) = leaf.value else {
                warn!("Skipping {}: no value", leaf.long_key.as_deref().unwrap_or(&leaf.key));
                report.skipped += 1;
                continue;
            };

            let long_key = leaf.long_key.as_deref().unwrap_or(&leaf.key);
            let name = metric_name(long_key);
            let gauge = match self.gauge(&mut gauges, &name, long_key) {
                Ok(gauge) => gauge,
                Err(e) => {
                    warn!("Skipping {}: cannot export as {:?}: {}", long_key, name, e);
                    report.skipped += 1;
                    continue;
                }
            };

            gauge
                .with_label_values(&[
                    leaf.key.as_str(),
                    leaf.index.as_deref().unwrap_or_default(),
                    leaf.entity.as_deref().unwrap_or_default(),
                ])
                .set(value);
            report.published += 1;
        }

        report
    }

    fn gauge(
        &self,
        gauges: &mut HashMap<String, GaugeVec>,
        name: &str,
        help: &str,
    ) -> Result<GaugeVec> {
        if let Some(gauge) = gauges.get(name) {
            return Ok(gauge.clone());
        }
        let gauge = GaugeVec::new(Opts::new(name, help), &LEAF_LABELS)?;
        self.registry.register(Box::new(gauge.clone()))?;
        gauges.insert(name.to_string(), gauge.clone());
        Ok(gauge)
    }

    /// Count a finished cycle
    pub fn record_cycle(&self, outcome: CycleOutcome) {
        self.cycles_total
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    /// Update the success gauges after a published cycle
    pub fn record_success(&self, leaves: usize, rejected: usize, joins: &[&JoinReport]) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        self.last_success.set(now);
        self.leaves.set(leaves as i64);
        self.series_rejected_total.inc_by(rejected as u64);

        for report in joins {
            self.join_skipped_total
                .with_label_values(&[report.attribute.as_str()])
                .inc_by(report.skipped() as u64);
        }
    }

    /// Encode all metrics to Prometheus text format.
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| ExporterError::Metrics(prometheus::Error::Msg(e.to_string())))
    }
}
