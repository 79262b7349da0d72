// CMCVAR - CMC III variable hierarchy engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Backend record schema
//!
//! Shapes returned by the Prometheus HTTP API for the three CMC III queries.
//! Label names follow the SNMP exporter's CMC III module.

use crate::tree::VarRecord;
use serde::{Deserialize, Serialize};

/// Label carrying the dotted variable name
pub const NAME_LABEL: &str = "cmcIIIVarName";
/// Label carrying the backend index
pub const INDEX_LABEL: &str = "cmcIIIVarIndex";
/// Label carrying the unit string
pub const UNIT_LABEL: &str = "cmcIIIVarUnit";
/// Label selecting the device on the CMC
pub const DEVICE_INDEX_LABEL: &str = "cmcIIIVarDeviceIndex";

/// `{"status": ..., "data": ...}` wrapper around every API response
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Envelope<T> {
    pub status: String,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default, rename = "errorType", skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> Envelope<T> {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }

    /// Unwrap the payload, or describe why there is none
    pub fn into_data(self) -> Result<T, String> {
        if !self.is_success() {
            return Err(format!(
                "status {}: {}",
                self.status,
                self.error.as_deref().unwrap_or("no error message")
            ));
        }
        self.data.ok_or_else(|| "missing data".to_string())
    }
}

/// `data` body of an instant query
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryData<T> {
    #[serde(rename = "resultType")]
    pub result_type: String,
    pub result: Vec<T>,
}

/// One series from `/api/v1/series`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SeriesRecord {
    #[serde(rename = "cmcIIIVarName")]
    pub name: String,
    #[serde(rename = "cmcIIIVarIndex")]
    pub index: String,
}

impl SeriesRecord {
    pub fn new(name: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: index.into(),
        }
    }
}

impl VarRecord for SeriesRecord {
    fn name(&self) -> &str {
        &self.name
    }

    fn index(&self) -> &str {
        &self.index
    }
}

/// Labels of a value sample
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ValueLabels {
    #[serde(rename = "cmcIIIVarIndex")]
    pub index: String,
}

/// One vector element of the value query
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ValueSample {
    pub metric: ValueLabels,
    /// `[unix timestamp, "number"]`
    pub value: (f64, String),
}

impl ValueSample {
    pub fn new(index: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            metric: ValueLabels {
                index: index.into(),
            },
            value: (0.0, raw.into()),
        }
    }

    pub fn index(&self) -> &str {
        &self.metric.index
    }

    /// Sample value as sent, before parsing
    pub fn raw(&self) -> &str {
        &self.value.1
    }

    pub fn parse(&self) -> Option<f64> {
        self.raw().trim().parse().ok()
    }
}

/// Labels of a unit sample; `unit` is absent for unitless variables
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UnitLabels {
    #[serde(rename = "cmcIIIVarIndex")]
    pub index: String,
    #[serde(
        rename = "cmcIIIVarUnit",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub unit: Option<String>,
}

/// One vector element of the unit query
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UnitSample {
    pub metric: UnitLabels,
}

impl UnitSample {
    pub fn new(index: impl Into<String>, unit: Option<&str>) -> Self {
        Self {
            metric: UnitLabels {
                index: index.into(),
                unit: unit.map(str::to_string),
            },
        }
    }

    pub fn index(&self) -> &str {
        &self.metric.index
    }

    pub fn unit(&self) -> Option<&str> {
        self.metric.unit.as_deref()
    }
}
