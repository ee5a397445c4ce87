//! Operational counters
//!
//! Counters only, monotonic, reset on process start. Relaxed ordering is
//! enough: no decision is ever taken from a counter value.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    plans_executed: AtomicU64,
    plans_denied: AtomicU64,
    plans_failed: AtomicU64,
    views_materialized: AtomicU64,
    views_released: AtomicU64,
    views_leaked: AtomicU64,
    noise_samples: AtomicU64,
    tuples_ingested: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_plans_executed(&self) {
        self.plans_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_plans_denied(&self) {
        self.plans_denied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_plans_failed(&self) {
        self.plans_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_views_materialized(&self) {
        self.views_materialized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_views_released(&self) {
        self.views_released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_views_leaked(&self) {
        self.views_leaked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_noise_samples(&self, count: u64) {
        self.noise_samples.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_tuples_ingested(&self, count: u64) {
        self.tuples_ingested.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            plans_executed: self.plans_executed.load(Ordering::Relaxed),
            plans_denied: self.plans_denied.load(Ordering::Relaxed),
            plans_failed: self.plans_failed.load(Ordering::Relaxed),
            views_materialized: self.views_materialized.load(Ordering::Relaxed),
            views_released: self.views_released.load(Ordering::Relaxed),
            views_leaked: self.views_leaked.load(Ordering::Relaxed),
            noise_samples: self.noise_samples.load(Ordering::Relaxed),
            tuples_ingested: self.tuples_ingested.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of every counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub plans_executed: u64,
    pub plans_denied: u64,
    pub plans_failed: u64,
    pub views_materialized: u64,
    pub views_released: u64,
    pub views_leaked: u64,
    pub noise_samples: u64,
    pub tuples_ingested: u64,
}

impl MetricsSnapshot {
    /// Views created but not yet released or written off
    pub fn views_outstanding(&self) -> u64 {
        self.views_materialized
            .saturating_sub(self.views_released + self.views_leaked)
    }
}
