//! OOM kill counters, keyed by pod labels.
//!
//! The aggregator owns its own prometheus registry rather than the process
//! wide default one, so it can be handed to the pipeline and the HTTP server
//! explicitly.

use crate::types::LabelSet;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use std::collections::HashMap;
use thiserror::Error;

pub const METRIC_NAME: &str = "klog_pod_oomkill";
pub const METRIC_HELP: &str = "Extract metrics for OOMKilled pods from kernel log";

/// The closed label schema of [`METRIC_NAME`].
pub const LABEL_NAMES: [&str; 6] = [
    "pod_name",
    "node_name",
    "namespace",
    "container_name",
    "pod_uuid",
    "unit",
];

#[derive(Error, Debug)]
pub enum MetricsError {
    /// Label keys differ from [`LABEL_NAMES`]
    #[error("label set {got:?} does not match the {METRIC_NAME} label schema", METRIC_NAME = METRIC_NAME)]
    Schema { got: Vec<String> },

    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("metrics encoding is not valid utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Label-keyed OOM kill counters. Safe to share between the pipeline and scrapers.
pub struct Aggregator {
    registry: Registry,
    kills: IntCounterVec,
}

impl Aggregator {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();
        let kills = IntCounterVec::new(Opts::new(METRIC_NAME, METRIC_HELP), &LABEL_NAMES)?;
        registry.register(Box::new(kills.clone()))?;
        Ok(Self { registry, kills })
    }

    /// Count one kill under `labels`, returning the new total for that label set.
    ///
    /// A label set outside the schema is rejected and no counter is touched.
    pub fn record(&self, labels: &LabelSet) -> Result<u64, MetricsError> {
        if labels.len() != LABEL_NAMES.len()
            || !LABEL_NAMES.iter().all(|name| labels.contains_key(*name))
        {
            return Err(MetricsError::Schema {
                got: labels.keys().cloned().collect(),
            });
        }

        let values: HashMap<&str, &str> = labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let counter = self.kills.get_metric_with(&values)?;
        counter.inc();
        Ok(counter.get())
    }

    /// Every label set seen so far with its current count.
    #[cfg(test)]
    pub fn snapshot(&self) -> Vec<(LabelSet, u64)> {
        let families = self.registry.gather();
        families
            .iter()
            .filter(|mf| mf.get_name() == METRIC_NAME)
            .flat_map(|mf| mf.get_metric().iter())
            .map(|m| {
                let labels = m
                    .get_label()
                    .iter()
                    .map(|pair| (pair.get_name().to_string(), pair.get_value().to_string()))
                    .collect();
                (labels, m.get_counter().get_value() as u64)
            })
            .collect()
    }

    /// Render all counters in the prometheus text exposition format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
