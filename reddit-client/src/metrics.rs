use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    RateLimited,
    Failed,
}

/// One finished Reddit call. `route` is the call kind ("listing" or
/// "search"), never the full path, so subreddit names stay out of the map.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub route: String,
    pub status_code: Option<u16>,
    pub elapsed: Duration,
    pub outcome: CallOutcome,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteStats {
    pub calls: u64,
    pub failures: u64,
    pub slowest: Duration,
    total_time: Duration,
}

impl RouteStats {
    fn add(&mut self, record: &CallRecord) {
        self.calls += 1;
        self.total_time += record.elapsed;
        self.slowest = self.slowest.max(record.elapsed);
        if record.outcome != CallOutcome::Success {
            self.failures += 1;
        }
    }

    pub fn mean_time(&self) -> Duration {
        mean(self.total_time, self.calls)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApiMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub rate_limited_requests: u64,
    pub last_request_time: Option<SystemTime>,
    pub routes: HashMap<String, RouteStats>,
    total_time: Duration,
}

impl ApiMetrics {
    pub fn average_response_time(&self) -> Duration {
        mean(self.total_time, self.total_requests)
    }
}

impl fmt::Display for ApiMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} requests ({} ok, {} failed, {} rate limited), avg {}ms",
            self.total_requests,
            self.successful_requests,
            self.failed_requests,
            self.rate_limited_requests,
            self.average_response_time().as_millis()
        )?;
        let mut routes: Vec<_> = self.routes.iter().collect();
        routes.sort_by(|a, b| a.0.cmp(b.0));
        for (route, stats) in routes {
            write!(
                f,
                "; {}: {} calls, {} failed, slowest {}ms",
                route,
                stats.calls,
                stats.failures,
                stats.slowest.as_millis()
            )?;
        }
        Ok(())
    }
}

fn mean(total: Duration, count: u64) -> Duration {
    if count == 0 {
        Duration::ZERO
    } else {
        total / count as u32
    }
}

/// Shared, cloneable tally of Reddit calls.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    metrics: Arc<RwLock<ApiMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, record: CallRecord) {
        let mut metrics = self.metrics.write().await;

        metrics.total_requests += 1;
        metrics.total_time += record.elapsed;
        metrics.last_request_time = Some(SystemTime::now());
        match record.outcome {
            CallOutcome::Success => metrics.successful_requests += 1,
            CallOutcome::RateLimited => {
                metrics.failed_requests += 1;
                metrics.rate_limited_requests += 1;
            }
            CallOutcome::Failed => metrics.failed_requests += 1,
        }

        metrics
            .routes
            .entry(record.route.clone())
            .or_default()
            .add(&record);
    }

    pub async fn snapshot(&self) -> ApiMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn route(&self, route: &str) -> Option<RouteStats> {
        self.metrics.read().await.routes.get(route).cloned()
    }
}
