//! Serving-side metrics scraper.
//!
//! While the load generator runs, a background task polls the model
//! service's Prometheus text endpoint and samples KV-cache utilization and
//! queue depth. Only two metric-name prefixes are recognized; this is a
//! line scanner, not a Prometheus client.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use accelbench_core::error::{CoreError, CoreResult};
use accelbench_core::metrics::AcceleratorTelemetry;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Seconds between samples. The interval itself rate-limits; failed
/// scrapes are skipped without back-off.
const SCRAPE_INTERVAL: Duration = Duration::from_secs(5);

/// Per-request timeout for one scrape.
const SCRAPE_TIMEOUT: Duration = Duration::from_secs(3);

/// Metric prefix for the KV-cache utilization gauge (a 0-1 ratio).
const CACHE_USAGE_PREFIX: &str = "vllm:gpu_cache_usage_perc";

/// Metric prefix for the queued-request gauge.
const WAITING_PREFIX: &str = "vllm:num_requests_waiting";

#[derive(Default)]
struct Samples {
    utilization: Vec<f64>,
    waiting: Vec<i64>,
}

/// Background sampler for a model service's `/metrics` endpoint.
///
/// Start and stop are each called once per run; the sample buffers are
/// mutex-guarded so stop-side aggregation is linearizable with the last
/// in-flight sample.
pub struct GpuScraper {
    metrics_url: String,
    total_memory_gib: f64,
    samples: Arc<Mutex<Samples>>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl GpuScraper {
    /// Create a scraper targeting `http://{host}:{port}/metrics`.
    ///
    /// `total_memory_gib` is the instance's total accelerator memory, used
    /// to convert the 0-1 cache-utilization ratio into GiB.
    pub fn new(host: &str, port: u16, total_memory_gib: f64) -> Self {
        Self {
            metrics_url: format!("http://{host}:{port}/metrics"),
            total_memory_gib,
            samples: Arc::new(Mutex::new(Samples::default())),
            cancel: CancellationToken::new(),
            handle: None,
        }
    }

    /// Spawn the sampling task. The first sample is taken immediately,
    /// then every five seconds.
    pub fn start(&mut self) -> CoreResult<()> {
        let client = reqwest::Client::builder()
            .timeout(SCRAPE_TIMEOUT)
            .build()
            .map_err(|e| CoreError::Internal(format!("build scrape client: {e}")))?;

        let url = self.metrics_url.clone();
        let samples = Arc::clone(&self.samples);
        let cancel = self.cancel.clone();

        self.handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SCRAPE_INTERVAL);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => scrape(&client, &url, &samples).await,
                }
            }
        }));
        Ok(())
    }

    /// Signal the task to exit, join it, and aggregate the samples.
    ///
    /// Returns `None` when no sample was ever collected.
    pub async fn stop(mut self) -> Option<AcceleratorTelemetry> {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        let samples = self.samples.lock().unwrap();
        aggregate(&samples, self.total_memory_gib)
    }
}

/// Take one sample. Transport errors and non-2xx responses are logged and
/// skipped.
async fn scrape(client: &reqwest::Client, url: &str, samples: &Arc<Mutex<Samples>>) {
    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(error = %err, "Metrics scrape failed");
            return;
        }
    };
    if !response.status().is_success() {
        tracing::warn!(status = %response.status(), "Metrics endpoint returned non-success");
        return;
    }
    let body = match response.text().await {
        Ok(body) => body,
        Err(err) => {
            tracing::warn!(error = %err, "Failed to read metrics body");
            return;
        }
    };

    let (utilization, waiting) = parse_exposition(&body);
    let mut samples = samples.lock().unwrap();
    if let Some(value) = utilization {
        samples.utilization.push(value);
    }
    if let Some(value) = waiting {
        samples.waiting.push(value);
    }
}

/// Scan Prometheus text exposition for the two gauges we care about.
///
/// The value is the trailing whitespace-separated field of a matching
/// non-comment line (`metric{labels} value [timestamp]` also works: the
/// parse takes the last field).
fn parse_exposition(body: &str) -> (Option<f64>, Option<i64>) {
    let mut utilization = None;
    let mut waiting = None;

    for line in body.lines() {
        if line.starts_with('#') {
            continue;
        }
        if line.starts_with(CACHE_USAGE_PREFIX) {
            if let Some(value) = last_field_f64(line) {
                utilization = Some(value);
            }
        } else if line.starts_with(WAITING_PREFIX) {
            if let Some(value) = last_field_f64(line) {
                waiting = Some(value as i64);
            }
        }
    }
    (utilization, waiting)
}

fn last_field_f64(line: &str) -> Option<f64> {
    line.split_whitespace().last()?.parse().ok()
}

/// Aggregate raw samples into run-level telemetry.
///
/// Utilization ratios (0-1) become percentages; peak memory is the peak
/// ratio times total accelerator memory.
fn aggregate(samples: &Samples, total_memory_gib: f64) -> Option<AcceleratorTelemetry> {
    if samples.utilization.is_empty() {
        return None;
    }

    let peak = samples.utilization.iter().cloned().fold(0.0f64, f64::max);
    let avg = samples.utilization.iter().sum::<f64>() / samples.utilization.len() as f64;
    let waiting_max = samples.waiting.iter().copied().max().unwrap_or(0);

    Some(AcceleratorTelemetry {
        utilization_peak_pct: peak * 100.0,
        utilization_avg_pct: avg * 100.0,
        memory_peak_gib: peak * total_memory_gib,
        waiting_requests_max: waiting_max,
    })
}
