// CMCVAR Exporter - Prometheus exporter for CMC III sockets
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Prometheus API client for the three CMC III queries.

use crate::config::ExporterConfig;
use crate::error::{ExporterError, Result};
use crate::retry::{with_retry, RetryStrategy};
use cmcvar::record::DEVICE_INDEX_LABEL;
use cmcvar::{Binding, CycleInput, Envelope, QueryData, SeriesRecord, UnitSample, ValueSample};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Series whose labels carry the variable names
pub const NAME_METRIC: &str = "cmcIIIVarName";
/// Integer value of every variable
pub const VALUE_METRIC: &str = "cmcIIIVarValueInt";
/// Unit of every variable, as a label
pub const UNIT_METRIC: &str = "cmcIIIVarUnit";

const SERIES_PATH: &str = "/api/v1/series";
const QUERY_PATH: &str = "/api/v1/query";

/// Backend client bound to one device
pub struct BackendClient {
    http: Client,
    base_url: String,
    device_index: String,
    series_lookback: Duration,
    retry: RetryStrategy,
}

impl BackendClient {
    /// Create a new client
    pub fn new(config: &ExporterConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("cmcvar-exporter/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: config.prometheus_url.trim_end_matches('/').to_string(),
            device_index: config.device_index.clone(),
            series_lookback: config.series_lookback,
            retry: config.retry.clone(),
        })
    }

    /// `metric{cmcIIIVarDeviceIndex="<device>"}`
    pub fn selector(&self, metric: &str) -> String {
        format!(
            "{}{{{}=\"{}\"}}",
            metric, DEVICE_INDEX_LABEL, self.device_index
        )
    }

    /// Names and indices of every variable of the device.
    ///
    /// Only series seen within the lookback window are returned, so names
    /// retired on the device drop out instead of clashing with their
    /// successors' indices.
    pub async fn series(&self) -> Result<Vec<SeriesRecord>> {
        let selector = self.selector(NAME_METRIC);
        let query = [("match[]", selector), ("start", self.series_start())];
        self.get(SERIES_PATH, &query).await
    }

    /// Unix time the series window opens at
    fn series_start(&self) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        now.saturating_sub(self.series_lookback).as_secs().to_string()
    }

    /// Current value of every variable
    pub async fn values(&self) -> Result<Vec<ValueSample>> {
        let selector = self.selector(VALUE_METRIC);
        let data: QueryData<ValueSample> = self.get(QUERY_PATH, &[("query", selector)]).await?;
        Ok(data.result)
    }

    /// Units, for the variables that have one
    pub async fn units(&self) -> Result<Vec<UnitSample>> {
        let selector = self.selector(UNIT_METRIC);
        let data: QueryData<UnitSample> = self.get(QUERY_PATH, &[("query", selector)]).await?;
        Ok(data.result)
    }

    /// Run the three queries one after the other
    pub async fn fetch(&self, bindings: Vec<Binding>) -> Result<CycleInput> {
        let series = self.series().await?;
        let values = self.values().await?;
        let units = self.units().await?;
        debug!(
            "Fetched {} series, {} values, {} units",
            series.len(),
            values.len(),
            units.len()
        );

        Ok(CycleInput {
            series,
            values,
            units,
            bindings,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        with_retry(&self.retry, ExporterError::is_transient, || {
            self.get_once(&url, query)
        })
        .await
    }

    async fn get_once<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        debug!("GET {} {:?}", url, query);

        let response = self.http.get(url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExporterError::Status {
                url: url.to_string(),
                status,
            });
        }

        let body = response.bytes().await?;
        let envelope: Envelope<T> =
            serde_json::from_slice(&body).map_err(|source| ExporterError::Parse {
                url: url.to_string(),
                source,
            })?;

        envelope.into_data().map_err(|reason| ExporterError::Schema {
            url: url.to_string(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Query, State};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::Router;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    const SERIES: &str = r#"{"status": "success", "data": [
        {"__name__": "cmcIIIVarName", "cmcIIIVarName": "A.B.Sockets.01.Power", "cmcIIIVarIndex": "7", "cmcIIIVarDeviceIndex": "2"}
    ]}"#;
    const VALUES: &str = r#"{"status": "success", "data": {"resultType": "vector", "result": [
        {"metric": {"cmcIIIVarIndex": "7"}, "value": [1700000000, "120"]}
    ]}}"#;
    const UNITS: &str = r#"{"status": "success", "data": {"resultType": "vector", "result": [
        {"metric": {"cmcIIIVarIndex": "7", "cmcIIIVarUnit": "W"}, "value": [1700000000, "1"]}
    ]}}"#;

    async fn spawn_backend(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client(base_url: String) -> BackendClient {
        BackendClient::new(&ExporterConfig {
            prometheus_url: base_url,
            request_timeout: Duration::from_secs(2),
            retry: RetryStrategy::fixed(2, Duration::from_millis(5)),
            ..Default::default()
        })
        .unwrap()
    }

    async fn series(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
        if params.get("match[]").map(String::as_str) != Some(r#"cmcIIIVarName{cmcIIIVarDeviceIndex="2"}"#) {
            return (StatusCode::BAD_REQUEST, "bad selector").into_response();
        }
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        match params.get("start").and_then(|s| s.parse::<u64>().ok()) {
            Some(start) if start <= now - 300 && start + 310 >= now => {}
            _ => return (StatusCode::BAD_REQUEST, "bad start").into_response(),
        }
        SERIES.into_response()
    }

    async fn query(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
        match params.get("query").map(String::as_str) {
            Some(r#"cmcIIIVarValueInt{cmcIIIVarDeviceIndex="2"}"#) => VALUES.into_response(),
            Some(r#"cmcIIIVarUnit{cmcIIIVarDeviceIndex="2"}"#) => UNITS.into_response(),
            _ => (StatusCode::BAD_REQUEST, "bad query").into_response(),
        }
    }

    #[test]
    fn test_selector() {
        let client = client("http://prom:9090".to_string());
        assert_eq!(
            client.selector(VALUE_METRIC),
            r#"cmcIIIVarValueInt{cmcIIIVarDeviceIndex="2"}"#
        );
    }

    #[tokio::test]
    async fn test_fetch_all_queries() {
        let app = Router::new()
            .route("/api/v1/series", get(series))
            .route("/api/v1/query", get(query));
        let client = client(spawn_backend(app).await);

        let input = client.fetch(vec![Binding::new(1, "n1")]).await.unwrap();
        assert_eq!(input.series, vec![SeriesRecord::new("A.B.Sockets.01.Power", "7")]);
        assert_eq!(input.values[0].parse(), Some(120.0));
        assert_eq!(input.units[0].unit(), Some("W"));
        assert_eq!(input.bindings.len(), 1);
    }

    #[tokio::test]
    async fn test_retries_server_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let app = Router::new()
            .route(
                "/api/v1/series",
                get(|State(calls): State<Arc<AtomicU32>>| async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        (StatusCode::SERVICE_UNAVAILABLE, "warming up").into_response()
                    } else {
                        SERIES.into_response()
                    }
                }),
            )
            .with_state(Arc::clone(&calls));
        let client = client(spawn_backend(app).await);

        let series = client.series().await.unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let app = Router::new()
            .route(
                "/api/v1/series",
                get(|State(calls): State<Arc<AtomicU32>>| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::BAD_REQUEST, "nope")
                }),
            )
            .with_state(Arc::clone(&calls));
        let client = client(spawn_backend(app).await);

        let err = client.series().await.unwrap_err();
        assert!(matches!(err, ExporterError::Status { status, .. } if status == reqwest::StatusCode::BAD_REQUEST));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_malformed_and_failed_bodies() {
        let app = Router::new()
            .route("/api/v1/series", get(|| async { "not json" }))
            .route(
                "/api/v1/query",
                get(|| async { r#"{"status": "error", "errorType": "bad_data", "error": "boom"}"# }),
            );
        let client = client(spawn_backend(app).await);

        assert!(matches!(
            client.series().await.unwrap_err(),
            ExporterError::Parse { .. }
        ));
        assert!(matches!(
            client.values().await.unwrap_err(),
            ExporterError::Schema { .. }
        ));
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(format!("http://{}", addr)).series().await.unwrap_err();
        assert!(err.is_transient());
    }
}
