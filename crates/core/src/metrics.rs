//! Load-generator output parsing and metric aggregation.
//!
//! The load generator is a black box that prints a JSON document somewhere
//! on its output stream, optionally delimited by `ACCELBENCH_JSON_BEGIN` /
//! `ACCELBENCH_JSON_END` sentinels and usually interleaved with progress
//! lines. Parsing tolerates all of that; aggregation computes nearest-rank
//! percentiles over the successful requests only.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Sentinel marking the start of the JSON payload in the loadgen log stream.
pub const JSON_BEGIN_MARKER: &[u8] = b"ACCELBENCH_JSON_BEGIN";
/// Sentinel marking the end of the JSON payload.
pub const JSON_END_MARKER: &[u8] = b"ACCELBENCH_JSON_END";

/// How many bytes of each end of the log to keep in diagnostic snippets.
const SNIPPET_BYTES: usize = 250;

/// Per-request measurements reported by the load generator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestResult {
    #[serde(default)]
    pub ttft_ms: f64,
    #[serde(default)]
    pub e2e_latency_ms: f64,
    #[serde(default)]
    pub itl_ms: f64,
    #[serde(default)]
    pub input_tokens: i64,
    #[serde(default)]
    pub output_tokens: i64,
    #[serde(default)]
    pub duration_seconds: f64,
    #[serde(default)]
    pub success: bool,
}

/// Aggregate counters reported by the load generator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Summary {
    #[serde(default)]
    pub total_duration_seconds: f64,
    #[serde(default)]
    pub total_requests: i64,
    #[serde(default)]
    pub successful_requests: i64,
    #[serde(default)]
    pub failed_requests: i64,
    #[serde(default)]
    pub throughput_aggregate_tps: f64,
    #[serde(default)]
    pub requests_per_second: f64,
    /// Optional client-side accelerator estimates; the scraper's direct
    /// observations overwrite these when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accelerator_utilization_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accelerator_memory_peak_gib: Option<f64>,
}

/// The complete JSON document emitted by the load generator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadgenOutput {
    #[serde(default)]
    pub requests: Vec<RequestResult>,
    #[serde(default)]
    pub summary: Summary,
}

/// Aggregated serving-side accelerator telemetry from the scraper.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceleratorTelemetry {
    /// Peak KV-cache utilization as a percentage (0-100).
    pub utilization_peak_pct: f64,
    /// Average KV-cache utilization as a percentage (0-100).
    pub utilization_avg_pct: f64,
    /// Peak memory in GiB, derived from peak utilization x total memory.
    pub memory_peak_gib: f64,
    /// Maximum queue depth observed.
    pub waiting_requests_max: i64,
}

/// Computed benchmark metrics, ready for persistence.
///
/// Every field is optional: `None` means "no data", which is distinct from
/// zero and survives JSON round-trips as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComputedMetrics {
    pub ttft_p50_ms: Option<f64>,
    pub ttft_p90_ms: Option<f64>,
    pub ttft_p95_ms: Option<f64>,
    pub ttft_p99_ms: Option<f64>,
    pub e2e_latency_p50_ms: Option<f64>,
    pub e2e_latency_p90_ms: Option<f64>,
    pub e2e_latency_p95_ms: Option<f64>,
    pub e2e_latency_p99_ms: Option<f64>,
    pub itl_p50_ms: Option<f64>,
    pub itl_p90_ms: Option<f64>,
    pub itl_p95_ms: Option<f64>,
    pub itl_p99_ms: Option<f64>,
    pub throughput_per_request_tps: Option<f64>,
    pub throughput_aggregate_tps: Option<f64>,
    pub requests_per_second: Option<f64>,
    pub accelerator_utilization_pct: Option<f64>,
    pub accelerator_utilization_avg_pct: Option<f64>,
    pub accelerator_memory_peak_gib: Option<f64>,
    pub waiting_requests_max: Option<i64>,
    pub successful_requests: Option<i64>,
    pub failed_requests: Option<i64>,
    pub total_duration_seconds: Option<f64>,
}

impl ComputedMetrics {
    /// Merge serving-side scraper telemetry into the computed metrics.
    ///
    /// The scraper's peak overwrites any utilization the loadgen may have
    /// reported; it observes the server directly and is authoritative.
    pub fn merge_telemetry(&mut self, telemetry: &AcceleratorTelemetry) {
        self.accelerator_utilization_pct = Some(telemetry.utilization_peak_pct);
        self.accelerator_utilization_avg_pct = Some(telemetry.utilization_avg_pct);
        self.accelerator_memory_peak_gib = Some(telemetry.memory_peak_gib);
        self.waiting_requests_max = Some(telemetry.waiting_requests_max);
    }
}

/// Parse the load generator's log stream into a [`LoadgenOutput`].
///
/// Three strategies are tried in order, first success wins:
/// 1. content between the `ACCELBENCH_JSON_BEGIN` / `ACCELBENCH_JSON_END`
///    sentinels;
/// 2. the entire buffer (fast path for clean output);
/// 3. a line-by-line scan for the first `{`-prefixed line that parses and
///    carries a non-empty request array.
pub fn parse_loadgen_output(data: &[u8]) -> CoreResult<LoadgenOutput> {
    // Strategy 1: marker-delimited payload.
    if let Some(begin) = find_subslice(data, JSON_BEGIN_MARKER) {
        let rest = &data[begin + JSON_BEGIN_MARKER.len()..];
        if let Some(end) = find_subslice(rest, JSON_END_MARKER) {
            let payload = rest[..end].trim_ascii();
            if let Ok(out) = serde_json::from_slice::<LoadgenOutput>(payload) {
                if !out.requests.is_empty() {
                    return Ok(out);
                }
            }
        }
    }

    // Strategy 2: the whole buffer.
    if let Ok(out) = serde_json::from_slice::<LoadgenOutput>(data) {
        return Ok(out);
    }

    // Strategy 3: line-by-line scan.
    for line in data.split(|&b| b == b'\n') {
        let line = line.trim_ascii();
        if line.first() != Some(&b'{') {
            continue;
        }
        if let Ok(out) = serde_json::from_slice::<LoadgenOutput>(line) {
            if !out.requests.is_empty() {
                return Ok(out);
            }
        }
    }

    Err(CoreError::Data(format!(
        "no valid JSON payload found in {} bytes of log output",
        data.len()
    )))
}

/// A diagnostic snippet of the raw log: the first and last 250 bytes,
/// lossily decoded, with a truncation marker in between.
pub fn log_snippet(data: &[u8]) -> String {
    if data.len() <= 2 * SNIPPET_BYTES {
        return String::from_utf8_lossy(data).into_owned();
    }
    format!(
        "{}\n...[truncated]...\n{}",
        String::from_utf8_lossy(&data[..SNIPPET_BYTES]),
        String::from_utf8_lossy(&data[data.len() - SNIPPET_BYTES..]),
    )
}

/// Compute the full metric set from parsed loadgen output.
///
/// Only requests with `success == true` contribute to percentiles and
/// per-request throughput. Percentile fields are `None` (not zero) when the
/// successful set is empty; aggregate counters pass through from the
/// summary.
pub fn compute_metrics(output: &LoadgenOutput) -> ComputedMetrics {
    let successful: Vec<&RequestResult> =
        output.requests.iter().filter(|r| r.success).collect();

    let ttfts: Vec<f64> = successful.iter().map(|r| r.ttft_ms).collect();
    let e2es: Vec<f64> = successful.iter().map(|r| r.e2e_latency_ms).collect();
    let itls: Vec<f64> = successful.iter().map(|r| r.itl_ms).collect();

    let ttft = percentile_set(&ttfts);
    let e2e = percentile_set(&e2es);
    let itl = percentile_set(&itls);

    // Per-request throughput: average output tokens / average duration.
    let throughput_per_request = if successful.is_empty() {
        None
    } else {
        let avg_tokens = successful.iter().map(|r| r.output_tokens as f64).sum::<f64>()
            / successful.len() as f64;
        let avg_duration = successful.iter().map(|r| r.duration_seconds).sum::<f64>()
            / successful.len() as f64;
        (avg_duration > 0.0).then(|| avg_tokens / avg_duration)
    };

    let summary = &output.summary;
    ComputedMetrics {
        ttft_p50_ms: ttft.map(|p| p.p50),
        ttft_p90_ms: ttft.map(|p| p.p90),
        ttft_p95_ms: ttft.map(|p| p.p95),
        ttft_p99_ms: ttft.map(|p| p.p99),
        e2e_latency_p50_ms: e2e.map(|p| p.p50),
        e2e_latency_p90_ms: e2e.map(|p| p.p90),
        e2e_latency_p95_ms: e2e.map(|p| p.p95),
        e2e_latency_p99_ms: e2e.map(|p| p.p99),
        itl_p50_ms: itl.map(|p| p.p50),
        itl_p90_ms: itl.map(|p| p.p90),
        itl_p95_ms: itl.map(|p| p.p95),
        itl_p99_ms: itl.map(|p| p.p99),
        throughput_per_request_tps: throughput_per_request,
        throughput_aggregate_tps: Some(summary.throughput_aggregate_tps),
        requests_per_second: Some(summary.requests_per_second),
        accelerator_utilization_pct: summary.accelerator_utilization_pct,
        accelerator_utilization_avg_pct: None,
        accelerator_memory_peak_gib: summary.accelerator_memory_peak_gib,
        waiting_requests_max: None,
        successful_requests: Some(summary.successful_requests),
        failed_requests: Some(summary.failed_requests),
        total_duration_seconds: Some(summary.total_duration_seconds),
    }
}

/// The four percentiles persisted for each latency series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentileSet {
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Compute p50/p90/p95/p99 from an unsorted series.
///
/// Returns `None` for an empty series. The input is copied and sorted; the
/// caller's slice is never mutated.
pub fn percentile_set(values: &[f64]) -> Option<PercentileSet> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    Some(PercentileSet {
        p50: nearest_rank(&sorted, 50.0),
        p90: nearest_rank(&sorted, 90.0),
        p95: nearest_rank(&sorted, 95.0),
        p99: nearest_rank(&sorted, 99.0),
    })
}

/// Nearest-rank percentile over a sorted slice:
/// index = ceil(p * n / 100) - 1, clamped to the valid range.
fn nearest_rank(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p / 100.0) * sorted.len() as f64;
    let idx = (rank.ceil() as isize - 1).clamp(0, sorted.len() as isize - 1);
    sorted[idx as usize]
}

/// First index of `needle` within `haystack`, if any.
fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
