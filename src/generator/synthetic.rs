//! In-process synthetic e-commerce logs

use std::collections::{BTreeMap, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use super::LogGenerator;
use crate::models::{
    ConfigMap, GenerationResult, LogEntry, LogStats, Metric, MetricKind, ScenarioConfig,
};

const SERVICES: [&str; 8] = [
    "api-gateway",
    "auth-service",
    "user-service",
    "product-service",
    "cart-service",
    "order-service",
    "payment-service",
    "search-service",
];

const ROUTES: [(&str, &str); 8] = [
    ("POST", "/api/v1/auth/login"),
    ("GET", "/api/v1/users/profile"),
    ("GET", "/api/v1/products"),
    ("GET", "/api/v1/products/{id}"),
    ("POST", "/api/v1/cart/items"),
    ("POST", "/api/v1/orders"),
    ("POST", "/api/v1/payments"),
    ("GET", "/api/v1/search"),
];

const DEFAULT_ERROR_RATE: f64 = 0.05;

#[derive(Debug, Default)]
struct Counters {
    requests: u64,
    errors: u64,
    total_duration_ms: u64,
    by_service: BTreeMap<String, u64>,
    by_status: BTreeMap<u16, u64>,
    by_level: BTreeMap<String, u64>,
}

/// Generator backed by a bounded ring buffer of recent logs
pub struct SyntheticLogGenerator {
    capacity: usize,
    logs: RwLock<VecDeque<LogEntry>>,
    counters: RwLock<Counters>,
}

impl SyntheticLogGenerator {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            logs: RwLock::new(VecDeque::new()),
            counters: RwLock::new(Counters::default()),
        }
    }

    /// Generate and retain `count` entries in one go
    pub fn generate(
        &self,
        count: usize,
        scenario: Option<&str>,
        params: &ConfigMap,
    ) -> Vec<LogEntry> {
        let error_rate = params
            .get("error_rate")
            .and_then(|v| v.as_f64())
            .unwrap_or(DEFAULT_ERROR_RATE)
            .clamp(0.0, 1.0);
        let extra_latency = params
            .get("response_delay")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        let entries: Vec<LogEntry> = {
            let mut rng = rand::thread_rng();
            (0..count)
                .map(|_| random_entry(&mut rng, scenario, error_rate, extra_latency))
                .collect()
        };
        self.record(&entries);
        entries
    }

    /// Most recent `limit` entries matching the filters, oldest first
    pub fn recent_logs(
        &self,
        limit: usize,
        service: Option<&str>,
        level: Option<&str>,
    ) -> Vec<LogEntry> {
        let logs = self.read_logs();
        let mut matched: Vec<LogEntry> = logs
            .iter()
            .rev()
            .filter(|e| service.map_or(true, |s| e.service == s))
            .filter(|e| level.map_or(true, |l| e.level.eq_ignore_ascii_case(l)))
            .take(limit)
            .cloned()
            .collect();
        matched.reverse();
        matched
    }

    pub fn stats(&self) -> LogStats {
        let logs = self.read_logs();
        let mut stats = LogStats {
            total_logs: logs.len(),
            ..LogStats::default()
        };
        for entry in logs.iter() {
            *stats.levels.entry(entry.level.clone()).or_default() += 1;
            *stats.services.entry(entry.service.clone()).or_default() += 1;
            if let Some(status) = entry.status {
                *stats.statuses.entry(status).or_default() += 1;
            }
        }
        stats
    }

    /// Current metric snapshot derived from everything generated so far
    pub fn metrics(&self) -> Vec<Metric> {
        let counters = self.counters.read().unwrap_or_else(|e| e.into_inner());
        let mut metrics = vec![Metric {
            name: "ecommerce_http_requests_total".to_string(),
            value: counters.requests as f64,
            kind: MetricKind::Counter,
            labels: BTreeMap::new(),
        }];

        for (status, count) in &counters.by_status {
            metrics.push(Metric {
                name: "ecommerce_http_responses_total".to_string(),
                value: *count as f64,
                kind: MetricKind::Counter,
                labels: BTreeMap::from([("status".to_string(), status.to_string())]),
            });
        }
        for (service, count) in &counters.by_service {
            metrics.push(Metric {
                name: "ecommerce_service_requests_total".to_string(),
                value: *count as f64,
                kind: MetricKind::Counter,
                labels: BTreeMap::from([("service".to_string(), service.clone())]),
            });
        }
        for (level, count) in &counters.by_level {
            metrics.push(Metric {
                name: "ecommerce_logs_total".to_string(),
                value: *count as f64,
                kind: MetricKind::Counter,
                labels: BTreeMap::from([("level".to_string(), level.clone())]),
            });
        }

        if counters.requests > 0 {
            metrics.push(Metric {
                name: "ecommerce_http_request_duration_ms".to_string(),
                value: counters.total_duration_ms as f64 / counters.requests as f64,
                kind: MetricKind::Gauge,
                labels: BTreeMap::new(),
            });
            metrics.push(Metric {
                name: "ecommerce_error_rate".to_string(),
                value: counters.errors as f64 * 100.0 / counters.requests as f64,
                kind: MetricKind::Gauge,
                labels: BTreeMap::new(),
            });
        }
        metrics
    }

    fn record(&self, entries: &[LogEntry]) {
        if entries.is_empty() {
            return;
        }
        {
            let mut logs = self.logs.write().unwrap_or_else(|e| e.into_inner());
            logs.extend(entries.iter().cloned());
            while logs.len() > self.capacity {
                logs.pop_front();
            }
        }

        let mut counters = self.write_counters();
        for entry in entries {
            counters.requests += 1;
            if entry.level == "ERROR" {
                counters.errors += 1;
            }
            counters.total_duration_ms += entry.duration.unwrap_or(0);
            *counters.by_service.entry(entry.service.clone()).or_default() += 1;
            *counters.by_level.entry(entry.level.clone()).or_default() += 1;
            if let Some(status) = entry.status {
                *counters.by_status.entry(status).or_default() += 1;
            }
        }
    }

    fn read_logs(&self) -> RwLockReadGuard<'_, VecDeque<LogEntry>> {
        self.logs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_counters(&self) -> RwLockWriteGuard<'_, Counters> {
        self.counters.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl LogGenerator for SyntheticLogGenerator {
    async fn run(&self, scenario_type: &str, config: &ScenarioConfig) -> GenerationResult {
        let count = config.log_count as usize;
        let pacing = config
            .parameters
            .get("interval_ms")
            .and_then(|v| v.as_u64())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        let mut result = GenerationResult::default();
        match pacing {
            // Spread the batch out; the runner cancels by dropping this future
            Some(gap) => {
                for _ in 0..count {
                    let mut batch = self.generate(1, Some(scenario_type), &config.parameters);
                    result.generated += batch.len();
                    if result.sample_log.is_none() {
                        result.sample_log = batch.pop();
                    }
                    tokio::time::sleep(gap).await;
                }
            }
            None => {
                let batch = self.generate(count, Some(scenario_type), &config.parameters);
                result.generated = batch.len();
                result.sample_log = batch.into_iter().next();
            }
        }

        debug!(scenario = %scenario_type, generated = result.generated, "Generated batch");
        result
    }
}

fn random_entry(
    rng: &mut impl Rng,
    scenario: Option<&str>,
    error_rate: f64,
    extra_latency: u64,
) -> LogEntry {
    let service = SERVICES.choose(rng).copied().unwrap_or("api-gateway");
    let (method, path) = ROUTES.choose(rng).copied().unwrap_or(("GET", "/"));

    let roll: f64 = rng.gen();
    let (level, status) = if roll < error_rate {
        ("ERROR", *[500u16, 502, 503, 504].choose(rng).unwrap_or(&500))
    } else if roll < error_rate + 0.15 {
        ("WARN", *[400u16, 401, 404, 429].choose(rng).unwrap_or(&400))
    } else if roll < error_rate + 0.20 {
        ("DEBUG", 200)
    } else {
        ("INFO", *[200u16, 200, 201, 204].choose(rng).unwrap_or(&200))
    };

    let duration = rng.gen_range(5..250) + extra_latency;
    let message = match level {
        "ERROR" => format!("{method} {path} failed with {status} after {duration}ms"),
        "WARN" => format!("{method} {path} rejected with {status}"),
        _ => format!("{method} {path} completed in {duration}ms"),
    };

    LogEntry {
        timestamp: Utc::now(),
        level: level.to_string(),
        service: service.to_string(),
        message,
        scenario: scenario.map(str::to_string),
        trace_id: Some(format!("{:016x}", rng.gen::<u64>())),
        method: Some(method.to_string()),
        path: Some(path.to_string()),
        status: Some(status),
        duration: Some(duration),
    }
}

/// Prometheus text exposition for a metric snapshot
pub fn render_prometheus(metrics: &[Metric]) -> String {
    let mut grouped: BTreeMap<&str, Vec<&Metric>> = BTreeMap::new();
    for metric in metrics {
        grouped.entry(metric.name.as_str()).or_default().push(metric);
    }

    let mut out = String::new();
    for (name, samples) in grouped {
        let kind = samples.first().map(|m| m.kind).unwrap_or(MetricKind::Gauge);
        out.push_str(&format!("# TYPE {name} {kind}\n"));
        for sample in samples {
            if sample.labels.is_empty() {
                out.push_str(&format!("{name} {:.2}\n", sample.value));
            } else {
                let labels: Vec<String> = sample
                    .labels
                    .iter()
                    .map(|(k, v)| format!("{k}=\"{v}\""))
                    .collect();
                out.push_str(&format!("{name}{{{}}} {:.2}\n", labels.join(","), sample.value));
            }
        }
    }
    out
}
