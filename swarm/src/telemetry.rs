//! Telemetry and metrics collection
//!
//! Counters and a latency histogram for the daemon, rendered in the
//! Prometheus text format at `GET /metrics`. Backend calls are measured by
//! wrapping the backend in [`InstrumentedBackend`].

use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sysinfo::System;

use crate::backend::{Backend, Credentials, RunOptions};

/// Prefix of every exported metric
const PREFIX: &str = "proxmox_swarm";

/// Host name of the machine the daemon runs on
pub fn hostname() -> String {
    System::host_name().unwrap_or_else(|| "unknown".to_string())
}

/// Atomic counter
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Counter split by one label value
#[derive(Debug, Default)]
pub struct LabeledCounter {
    values: Mutex<BTreeMap<String, u64>>,
}

impl LabeledCounter {
    pub fn inc(&self, label: &str) {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        *values.entry(label.to_string()).or_insert(0) += 1;
    }

    pub fn get(&self, label: &str) -> u64 {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.get(label).copied().unwrap_or(0)
    }

    /// Label values in sorted order
    pub fn snapshot(&self) -> Vec<(String, u64)> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }
}

/// Latency histogram with fixed buckets
#[derive(Debug)]
pub struct Histogram {
    /// Bucket upper bounds in microseconds
    bounds: Vec<u64>,
    /// Non-cumulative count per bucket
    counts: Vec<AtomicU64>,
    sum_micros: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    /// Buckets sized for backend calls: 0.1s to 60s
    pub fn backend_latency() -> Self {
        Self::with_bounds(&[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0])
    }

    pub fn with_bounds(bounds_secs: &[f64]) -> Self {
        let bounds: Vec<u64> = bounds_secs
            .iter()
            .map(|secs| (secs * 1_000_000.0) as u64)
            .collect();
        let counts = bounds.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            bounds,
            counts,
            sum_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.sum_micros.fetch_add(micros, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        if let Some(i) = self.bounds.iter().position(|&bound| micros <= bound) {
            self.counts[i].fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    fn write_prometheus(&self, out: &mut String, name: &str, help: &str) {
        let _ = writeln!(out, "# HELP {} {}", name, help);
        let _ = writeln!(out, "# TYPE {} histogram", name);

        let mut cumulative = 0;
        for (bound, count) in self.bounds.iter().zip(&self.counts) {
            cumulative += count.load(Ordering::Relaxed);
            let le = *bound as f64 / 1_000_000.0;
            let _ = writeln!(out, "{}_bucket{{le=\"{}\"}} {}", name, le, cumulative);
        }
        let total = self.count();
        let _ = writeln!(out, "{}_bucket{{le=\"+Inf\"}} {}", name, total);
        let sum = self.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        let _ = writeln!(out, "{}_sum {:.6}", name, sum);
        let _ = writeln!(out, "{}_count {}", name, total);
        let _ = writeln!(out);
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::backend_latency()
    }
}

/// All daemon metrics
#[derive(Debug, Default)]
pub struct SwarmMetrics {
    /// Requests handled, by route
    pub requests: LabeledCounter,

    /// Backend invocations, by sub-command
    pub backend_calls: LabeledCounter,

    /// Backend invocations that exited non-zero, by sub-command
    pub backend_failures: LabeledCounter,

    pub backend_latency: Histogram,

    pub deploys_total: Counter,
    pub deploys_failed: Counter,
}

impl SwarmMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Count one handled request
    pub fn record_request(&self, route: &str) {
        self.requests.inc(route);
    }

    pub fn record_deploy(&self, status: i32) {
        self.deploys_total.inc();
        if status != 0 {
            self.deploys_failed.inc();
        }
    }

    pub fn to_prometheus(&self) -> String {
        let mut out = String::with_capacity(2048);

        write_labeled(
            &mut out,
            "requests_total",
            "Requests handled by the daemon",
            "route",
            &self.requests,
        );
        write_labeled(
            &mut out,
            "backend_calls_total",
            "Backend tool invocations",
            "command",
            &self.backend_calls,
        );
        write_labeled(
            &mut out,
            "backend_failures_total",
            "Backend tool invocations with a non-zero exit status",
            "command",
            &self.backend_failures,
        );
        self.backend_latency.write_prometheus(
            &mut out,
            &format!("{}_backend_duration_seconds", PREFIX),
            "Backend tool invocation latency",
        );
        write_counter(&mut out, "deploys_total", "Deploy requests", &self.deploys_total);
        write_counter(
            &mut out,
            "deploys_failed_total",
            "Deploy requests that ended with a non-zero status",
            &self.deploys_failed,
        );

        out
    }
}

fn write_counter(out: &mut String, name: &str, help: &str, counter: &Counter) {
    let _ = writeln!(out, "# HELP {}_{} {}", PREFIX, name, help);
    let _ = writeln!(out, "# TYPE {}_{} counter", PREFIX, name);
    let _ = writeln!(out, "{}_{} {}", PREFIX, name, counter.get());
    let _ = writeln!(out);
}

fn write_labeled(out: &mut String, name: &str, help: &str, label: &str, counter: &LabeledCounter) {
    let _ = writeln!(out, "# HELP {}_{} {}", PREFIX, name, help);
    let _ = writeln!(out, "# TYPE {}_{} counter", PREFIX, name);
    for (value, count) in counter.snapshot() {
        let _ = writeln!(out, "{}_{}{{{}=\"{}\"}} {}", PREFIX, name, label, value, count);
    }
    let _ = writeln!(out);
}

/// Backend decorator recording call counts, failures and latency
pub struct InstrumentedBackend {
    inner: Arc<dyn Backend>,
    metrics: Arc<SwarmMetrics>,
}

impl InstrumentedBackend {
    pub fn new(inner: Arc<dyn Backend>, metrics: Arc<SwarmMetrics>) -> Self {
        Self { inner, metrics }
    }

    fn record(&self, command: &str, status: i32, started: Instant) {
        self.metrics.backend_latency.observe(started.elapsed());
        self.metrics.backend_calls.inc(command);
        if status != 0 {
            self.metrics.backend_failures.inc(command);
        }
    }
}

#[async_trait]
impl Backend for InstrumentedBackend {
    async fn run(
        &self,
        sub_command: &str,
        args: &[String],
        credentials: &Credentials,
        options: &RunOptions,
    ) -> i32 {
        let started = Instant::now();
        let status = self.inner.run(sub_command, args, credentials, options).await;
        self.record(sub_command, status, started);
        status
    }

    async fn sdn(&self, args: &[String], credentials: &Credentials) -> i32 {
        let started = Instant::now();
        let status = self.inner.sdn(args, credentials).await;
        self.record("sdn", status, started);
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedBackend(i32);

    #[async_trait]
    impl Backend for FixedBackend {
        async fn run(&self, _: &str, _: &[String], _: &Credentials, _: &RunOptions) -> i32 {
            self.0
        }
    }

    #[test]
    fn test_histogram_buckets_are_cumulative() {
        let histogram = Histogram::backend_latency();
        histogram.observe(Duration::from_millis(50));
        histogram.observe(Duration::from_millis(700));
        histogram.observe(Duration::from_secs(120));

        let mut out = String::new();
        histogram.write_prometheus(&mut out, "h", "help");
        assert!(out.contains("h_bucket{le=\"0.1\"} 1"));
        assert!(out.contains("h_bucket{le=\"1\"} 2"));
        assert!(out.contains("h_bucket{le=\"60\"} 2"));
        assert!(out.contains("h_bucket{le=\"+Inf\"} 3"));
        assert!(out.contains("h_count 3"));
    }

    #[test]
    fn test_prometheus_output() {
        let metrics = SwarmMetrics::default();
        metrics.record_request("/deploy");
        metrics.record_request("/deploy");
        metrics.record_deploy(0);
        metrics.record_deploy(4);

        let out = metrics.to_prometheus();
        assert!(out.contains("# TYPE proxmox_swarm_requests_total counter"));
        assert!(out.contains("proxmox_swarm_requests_total{route=\"/deploy\"} 2"));
        assert!(out.contains("proxmox_swarm_deploys_total 2"));
        assert!(out.contains("proxmox_swarm_deploys_failed_total 1"));
        assert!(out.contains("# TYPE proxmox_swarm_backend_duration_seconds histogram"));
    }

    #[tokio::test]
    async fn test_instrumented_backend_counts_calls() {
        let metrics = SwarmMetrics::shared();
        let backend = InstrumentedBackend::new(Arc::new(FixedBackend(3)), metrics.clone());
        let creds = Credentials::default();

        assert_eq!(backend.run("deploy", &[], &creds, &RunOptions::default()).await, 3);
        assert_eq!(backend.sdn(&[], &creds).await, 3);

        assert_eq!(metrics.backend_calls.get("deploy"), 1);
        assert_eq!(metrics.backend_calls.get("sdn"), 1);
        assert_eq!(metrics.backend_failures.get("deploy"), 1);
        assert_eq!(metrics.backend_latency.count(), 2);
    }
}
