//! Process-wide request metrics.
//!
//! Hot counters are atomics; the per-client and per-method aggregates sit
//! behind plain mutexes (updates are tiny and never overlap an outbound
//! call). Rolling request windows are pruned on write and on snapshot.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const WINDOW_1M: Duration = Duration::from_secs(60);
const WINDOW_60M: Duration = Duration::from_secs(60 * 60);
const WINDOW_180M: Duration = Duration::from_secs(180 * 60);

#[derive(Debug, Default, Clone, Serialize)]
pub struct ClientAggregate {
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub active_connections: u64,
    pub total_connections: u64,
    pub tool_calls: u64,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct MethodAggregate {
    pub count: u64,
    pub errors: u64,
    total_latency_ms: u64,
    pub by_client: HashMap<String, u64>,
}

impl MethodAggregate {
    pub fn avg_latency_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.count as f64
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodSnapshot {
    pub count: u64,
    pub errors: u64,
    pub avg_latency_ms: f64,
    pub by_client: HashMap<String, u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: u64,
    pub requests_total: u64,
    pub requests_last_1m: usize,
    pub requests_last_60m: usize,
    pub requests_last_180m: usize,
    pub connections_authenticated: u64,
    pub connections_anonymous: u64,
    pub errors_4xx: u64,
    pub errors_5xx: u64,
    pub sessions_created: u64,
    pub sessions_resume_failed: u64,
    pub sessions_deleted: u64,
    pub sessions_cleaned: u64,
    pub pings_sent: u64,
    pub pings_ok: u64,
    pub pings_failed: u64,
    pub gradio_failures: u64,
    pub unique_ips: usize,
    pub clients: HashMap<String, ClientAggregate>,
    pub methods: HashMap<String, MethodSnapshot>,
}

#[derive(Debug)]
pub struct ServerMetrics {
    started_at: Instant,
    requests_total: AtomicU64,
    connections_authenticated: AtomicU64,
    connections_anonymous: AtomicU64,
    errors_4xx: AtomicU64,
    errors_5xx: AtomicU64,
    sessions_created: AtomicU64,
    sessions_resume_failed: AtomicU64,
    sessions_deleted: AtomicU64,
    sessions_cleaned: AtomicU64,
    pings_sent: AtomicU64,
    pings_ok: AtomicU64,
    pings_failed: AtomicU64,
    gradio_failures: AtomicU64,
    clients: Mutex<HashMap<String, ClientAggregate>>,
    methods: Mutex<HashMap<String, MethodAggregate>>,
    request_times: Mutex<VecDeque<Instant>>,
    unique_ips: Mutex<HashSet<String>>,
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            requests_total: AtomicU64::new(0),
            connections_authenticated: AtomicU64::new(0),
            connections_anonymous: AtomicU64::new(0),
            errors_4xx: AtomicU64::new(0),
            errors_5xx: AtomicU64::new(0),
            sessions_created: AtomicU64::new(0),
            sessions_resume_failed: AtomicU64::new(0),
            sessions_deleted: AtomicU64::new(0),
            sessions_cleaned: AtomicU64::new(0),
            pings_sent: AtomicU64::new(0),
            pings_ok: AtomicU64::new(0),
            pings_failed: AtomicU64::new(0),
            gradio_failures: AtomicU64::new(0),
            clients: Mutex::new(HashMap::new()),
            methods: Mutex::new(HashMap::new()),
            request_times: Mutex::new(VecDeque::new()),
            unique_ips: Mutex::new(HashSet::new()),
        }
    }

    pub fn record_request(
        &self,
        method: &str,
        client: Option<&str>,
        latency: Duration,
        is_error: bool,
        ip: Option<&str>,
    ) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        {
            let mut times = self.request_times.lock().unwrap();
            let now = Instant::now();
            times.push_back(now);
            while times
                .front()
                .is_some_and(|t| now.duration_since(*t) > WINDOW_180M)
            {
                times.pop_front();
            }
        }

        {
            let mut methods = self.methods.lock().unwrap();
            let aggregate = methods.entry(method.to_string()).or_default();
            aggregate.count += 1;
            aggregate.total_latency_ms += latency.as_millis() as u64;
            if is_error {
                aggregate.errors += 1;
            }
            if let Some(client) = client {
                *aggregate.by_client.entry(client.to_string()).or_default() += 1;
            }
        }

        if let Some(client) = client {
            let mut clients = self.clients.lock().unwrap();
            let aggregate = clients.entry(client.to_string()).or_default();
            aggregate.last_seen = Some(Utc::now());
            if aggregate.first_seen.is_none() {
                aggregate.first_seen = aggregate.last_seen;
            }
        }

        if let Some(ip) = ip {
            self.unique_ips.lock().unwrap().insert(ip.to_string());
        }
    }

    pub fn record_connection(&self, authenticated: bool, client: Option<&str>) {
        if authenticated {
            self.connections_authenticated.fetch_add(1, Ordering::Relaxed);
        } else {
            self.connections_anonymous.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(client) = client {
            let mut clients = self.clients.lock().unwrap();
            let aggregate = clients.entry(client.to_string()).or_default();
            aggregate.active_connections += 1;
            aggregate.total_connections += 1;
            aggregate.last_seen = Some(Utc::now());
            if aggregate.first_seen.is_none() {
                aggregate.first_seen = aggregate.last_seen;
            }
        }
    }

    pub fn record_disconnect(&self, client: Option<&str>) {
        if let Some(client) = client {
            let mut clients = self.clients.lock().unwrap();
            if let Some(aggregate) = clients.get_mut(client) {
                aggregate.active_connections = aggregate.active_connections.saturating_sub(1);
            }
        }
    }

    pub fn record_tool_call(&self, client: Option<&str>) {
        if let Some(client) = client {
            let mut clients = self.clients.lock().unwrap();
            clients.entry(client.to_string()).or_default().tool_calls += 1;
        }
    }

    pub fn record_http_error(&self, status: u16) {
        if (400..500).contains(&status) {
            self.errors_4xx.fetch_add(1, Ordering::Relaxed);
        } else if status >= 500 {
            self.errors_5xx.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_session_created(&self) {
        self.sessions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_resume_failed(&self) {
        self.sessions_resume_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_deleted(&self) {
        self.sessions_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_cleaned(&self) {
        self.sessions_cleaned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ping(&self, ok: bool) {
        self.pings_sent.fetch_add(1, Ordering::Relaxed);
        if ok {
            self.pings_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.pings_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Upstream tool invocation failures. Cancellations are not failures and
    /// must not be recorded here.
    pub fn record_gradio_failure(&self) {
        self.gradio_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn gradio_failures(&self) -> u64 {
        self.gradio_failures.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = Instant::now();
        let (last_1m, last_60m, last_180m) = {
            let times = self.request_times.lock().unwrap();
            let count_within = |window: Duration| {
                times
                    .iter()
                    .rev()
                    .take_while(|t| now.duration_since(**t) <= window)
                    .count()
            };
            (
                count_within(WINDOW_1M),
                count_within(WINDOW_60M),
                count_within(WINDOW_180M),
            )
        };

        let methods = self
            .methods
            .lock()
            .unwrap()
            .iter()
            .map(|(name, agg)| {
                (
                    name.clone(),
                    MethodSnapshot {
                        count: agg.count,
                        errors: agg.errors,
                        avg_latency_ms: agg.avg_latency_ms(),
                        by_client: agg.by_client.clone(),
                    },
                )
            })
            .collect();

        MetricsSnapshot {
            uptime_seconds: self.started_at.elapsed().as_secs(),
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_last_1m: last_1m,
            requests_last_60m: last_60m,
            requests_last_180m: last_180m,
            connections_authenticated: self.connections_authenticated.load(Ordering::Relaxed),
            connections_anonymous: self.connections_anonymous.load(Ordering::Relaxed),
            errors_4xx: self.errors_4xx.load(Ordering::Relaxed),
            errors_5xx: self.errors_5xx.load(Ordering::Relaxed),
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            sessions_resume_failed: self.sessions_resume_failed.load(Ordering::Relaxed),
            sessions_deleted: self.sessions_deleted.load(Ordering::Relaxed),
            sessions_cleaned: self.sessions_cleaned.load(Ordering::Relaxed),
            pings_sent: self.pings_sent.load(Ordering::Relaxed),
            pings_ok: self.pings_ok.load(Ordering::Relaxed),
            pings_failed: self.pings_failed.load(Ordering::Relaxed),
            gradio_failures: self.gradio_failures.load(Ordering::Relaxed),
            unique_ips: self.unique_ips.lock().unwrap().len(),
            clients: self.clients.lock().unwrap().clone(),
            methods,
        }
    }
}
