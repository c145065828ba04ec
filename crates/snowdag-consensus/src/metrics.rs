//! In-process metrics.
//!
//! A small counter/gauge registry with Prometheus text export. Registration
//! is fallible: a second metric under an already-taken name is an error, and
//! graph initialization surfaces it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{ConsensusError, Result};

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn inc(&self) {
        self.add(1);
    }

    pub fn add(&self, v: u64) {
        self.value.fetch_add(v, Ordering::Relaxed);
    }

    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A value that can move both ways.
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicI64,
}

impl Gauge {
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn set(&self, v: i64) {
        self.value.store(v, Ordering::Relaxed);
    }

    #[must_use]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

enum Metric {
    Counter { help: String, metric: Arc<Counter> },
    Gauge { help: String, metric: Arc<Gauge> },
}

/// A named collection of metrics.
#[derive(Default)]
pub struct Registry {
    namespace: String,
    metrics: RwLock<BTreeMap<String, Metric>>,
}

impl Registry {
    #[must_use]
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            metrics: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn register_counter(&self, name: &str, help: &str) -> Result<Arc<Counter>> {
        let mut metrics = self.metrics.write();
        if metrics.contains_key(name) {
            return Err(ConsensusError::DuplicateMetric(name.to_string()));
        }
        let metric = Arc::new(Counter::default());
        metrics.insert(
            name.to_string(),
            Metric::Counter {
                help: help.to_string(),
                metric: metric.clone(),
            },
        );
        Ok(metric)
    }

    pub fn register_gauge(&self, name: &str, help: &str) -> Result<Arc<Gauge>> {
        let mut metrics = self.metrics.write();
        if metrics.contains_key(name) {
            return Err(ConsensusError::DuplicateMetric(name.to_string()));
        }
        let metric = Arc::new(Gauge::default());
        metrics.insert(
            name.to_string(),
            Metric::Gauge {
                help: help.to_string(),
                metric: metric.clone(),
            },
        );
        Ok(metric)
    }

    /// Prometheus text exposition of every registered metric.
    #[must_use]
    pub fn export(&self) -> String {
        let mut out = String::new();
        let prefix = if self.namespace.is_empty() {
            String::new()
        } else {
            format!("{}_", self.namespace)
        };
        for (name, metric) in self.metrics.read().iter() {
            let full = format!("{prefix}{name}");
            match metric {
                Metric::Counter { help, metric } => {
                    out.push_str(&format!("# HELP {full} {help}\n"));
                    out.push_str(&format!("# TYPE {full} counter\n"));
                    out.push_str(&format!("{full} {}\n", metric.get()));
                }
                Metric::Gauge { help, metric } => {
                    out.push_str(&format!("# HELP {full} {help}\n"));
                    out.push_str(&format!("# TYPE {full} gauge\n"));
                    out.push_str(&format!("{full} {}\n", metric.get()));
                }
            }
        }
        out
    }
}
