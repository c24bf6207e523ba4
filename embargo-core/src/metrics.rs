// SPDX-License-Identifier: MIT
//
// Embargo Gate: Time-Gated Request Admission
// Copyright (c) 2025 Valer Bocan, PhD, CSSLP
// Email: valer.bocan@upt.ro
//
// Department of Computer and Information Technology
// Politehnica University of Timisoara

//! Admission metrics collection and reporting

use crate::gate::{Decision, PassReason};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Decision counters shared across requests
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    start_time: Instant,

    passes_bypass: AtomicU64,
    passes_out_of_scope: AtomicU64,
    passes_lifted: AtomicU64,
    passes_fail_open: AtomicU64,
    blocks_total: AtomicU64,

    resolution_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                start_time: Instant::now(),
                passes_bypass: AtomicU64::new(0),
                passes_out_of_scope: AtomicU64::new(0),
                passes_lifted: AtomicU64::new(0),
                passes_fail_open: AtomicU64::new(0),
                blocks_total: AtomicU64::new(0),
                resolution_failures: AtomicU64::new(0),
            }),
        }
    }

    pub fn record_decision(&self, decision: &Decision) {
        let counter = match decision {
            Decision::Pass(PassReason::Bypass) => &self.inner.passes_bypass,
            Decision::Pass(PassReason::OutOfScope) => &self.inner.passes_out_of_scope,
            Decision::Pass(PassReason::Lifted) => &self.inner.passes_lifted,
            Decision::Pass(PassReason::ResolverFailOpen) => &self.inner.passes_fail_open,
            Decision::Block(_) => &self.inner.blocks_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resolution_failure(&self) {
        self.inner.resolution_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn passes(&self, reason: PassReason) -> u64 {
        let counter = match reason {
            PassReason::Bypass => &self.inner.passes_bypass,
            PassReason::OutOfScope => &self.inner.passes_out_of_scope,
            PassReason::Lifted => &self.inner.passes_lifted,
            PassReason::ResolverFailOpen => &self.inner.passes_fail_open,
        };
        counter.load(Ordering::Relaxed)
    }

    pub fn passes_total(&self) -> u64 {
        [
            PassReason::Bypass,
            PassReason::OutOfScope,
            PassReason::Lifted,
            PassReason::ResolverFailOpen,
        ]
        .into_iter()
        .map(|reason| self.passes(reason))
        .sum()
    }

    pub fn blocks_total(&self) -> u64 {
        self.inner.blocks_total.load(Ordering::Relaxed)
    }

    pub fn resolution_failures(&self) -> u64 {
        self.inner.resolution_failures.load(Ordering::Relaxed)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.inner.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-compatible metrics output
    pub fn prometheus_format(&self) -> String {
        let mut output = String::new();

        output.push_str("# HELP embargo_passes_total Requests allowed through the gate\n");
        output.push_str("# TYPE embargo_passes_total counter\n");
        for (label, reason) in [
            ("bypass", PassReason::Bypass),
            ("out_of_scope", PassReason::OutOfScope),
            ("lifted", PassReason::Lifted),
            ("fail_open", PassReason::ResolverFailOpen),
        ] {
            output.push_str(&format!(
                "embargo_passes_total{{reason=\"{}\"}} {}\n",
                label,
                self.passes(reason)
            ));
        }

        output.push_str("# HELP embargo_blocks_total Requests answered with the embargo payload\n");
        output.push_str("# TYPE embargo_blocks_total counter\n");
        output.push_str(&format!("embargo_blocks_total {}\n", self.blocks_total()));

        output.push_str("# HELP embargo_resolution_failures_total Failed dynamic deadline resolutions\n");
        output.push_str("# TYPE embargo_resolution_failures_total counter\n");
        output.push_str(&format!(
            "embargo_resolution_failures_total {}\n",
            self.resolution_failures()
        ));

        output.push_str("# HELP embargo_uptime_seconds Service uptime in seconds\n");
        output.push_str("# TYPE embargo_uptime_seconds gauge\n");
        output.push_str(&format!("embargo_uptime_seconds {}\n", self.uptime_seconds()));

        output
    }
}
