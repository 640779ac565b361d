//! The run lifecycle state machine.
//!
//! One [`Orchestrator::execute`] call drives a single run:
//!
//! ```text
//! mark running -> deploy -> wait ready -> [start scraper]
//!     -> launch loadgen -> wait & collect -> stop scraper
//!     -> parse -> compute -> persist -> teardown
//! ```
//!
//! Teardown runs on every exit path — normal return, error, cancellation,
//! and panic — against a context that is never tied to the run's
//! cancellation token, so cleanup cannot itself be cancelled.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use accelbench_cluster::{ClusterApi, ClusterError, JobState};
use accelbench_core::error::{CoreError, CoreResult};
use accelbench_core::manifest::{
    self, LoadgenJobParams, ModelWorkloadParams, DEFAULT_WARMUP_REQUESTS,
};
use accelbench_core::metrics::{compute_metrics, log_snippet, parse_loadgen_output};
use accelbench_core::types::{is_neuron, MODEL_SERVER_PORT};
use accelbench_db::models::instance_type::InstanceType;
use accelbench_db::models::model::Model;
use accelbench_db::models::run::RunRequest;
use accelbench_db::models::status::RunStatus;
use accelbench_db::repositories::{MetricsRepo, RunRepo};
use accelbench_db::DbPool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::scraper::GpuScraper;

/// Everything needed to execute one benchmark run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub run_id: Uuid,
    pub model: Model,
    pub instance_type: InstanceType,
    pub request: RunRequest,
}

/// Tunable orchestration parameters. The defaults are production values;
/// tests shrink the poll intervals.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Namespace all run resources are created in.
    pub namespace: String,
    /// Image URI for the load-generator job.
    pub loadgen_image: String,
    pub readiness_timeout: Duration,
    pub readiness_poll: Duration,
    pub job_timeout: Duration,
    pub job_poll: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            namespace: "accelbench".to_string(),
            loadgen_image: "ghcr.io/accelbench/loadgen:latest".to_string(),
            readiness_timeout: Duration::from_secs(25 * 60),
            readiness_poll: Duration::from_secs(10),
            job_timeout: Duration::from_secs(2 * 60 * 60),
            job_poll: Duration::from_secs(15),
        }
    }
}

/// Cluster resource names for one run, derived from the run id.
///
/// The 128-bit id makes collisions negligible; an "already exists" on
/// create therefore indicates leaked resources and is a hard error.
#[derive(Debug, Clone)]
pub struct ResourceNames {
    /// Deployment and Service name (`bench-<short>`).
    pub model: String,
    /// Job name (`loadgen-<short>`).
    pub loadgen: String,
    /// First eight characters of the run id, used as a log tag.
    pub short: String,
}

impl ResourceNames {
    pub fn for_run(run_id: Uuid) -> Self {
        let short: String = run_id.to_string().chars().take(8).collect();
        Self {
            model: format!("bench-{short}"),
            loadgen: format!("loadgen-{short}"),
            short,
        }
    }
}

/// Container name of the load generator inside its job pod.
const LOADGEN_CONTAINER: &str = "loadgen";

/// The benchmark lifecycle engine.
///
/// Runs execute on independent tasks and share nothing beyond the
/// repository pool and the cancellation registry.
pub struct Orchestrator {
    pool: DbPool,
    cluster: Arc<dyn ClusterApi>,
    config: OrchestratorConfig,
    cancels: Arc<Mutex<HashMap<Uuid, CancellationToken>>>,
}

impl Orchestrator {
    pub fn new(pool: DbPool, cluster: Arc<dyn ClusterApi>, config: OrchestratorConfig) -> Self {
        Self {
            pool,
            cluster,
            config,
            cancels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Cancel a run by id. Non-blocking and idempotent; a no-op when the
    /// run has already reached a terminal state. Returns whether a live
    /// run was found.
    pub fn cancel_run(&self, run_id: Uuid) -> bool {
        let token = self.cancels.lock().unwrap().get(&run_id).cloned();
        match token {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Execute the full lifecycle of one run.
    ///
    /// Produces exactly one terminal status (`completed` or `failed`) and
    /// tears down every cluster resource the run created, on every exit
    /// path.
    pub async fn execute(&self, cfg: RunConfig) -> CoreResult<()> {
        let names = ResourceNames::for_run(cfg.run_id);

        let cancel = CancellationToken::new();
        self.cancels
            .lock()
            .unwrap()
            .insert(cfg.run_id, cancel.clone());

        // The guard removes the registry entry and, if we unwind before the
        // explicit teardown below, spawns the same teardown detached.
        let mut guard = RunGuard {
            cluster: Arc::clone(&self.cluster),
            cancels: Arc::clone(&self.cancels),
            run_id: cfg.run_id,
            names: names.clone(),
            teardown_done: false,
        };

        let outcome = self.drive(&cancel, &cfg, &names).await;

        // Unconditional teardown, detached from the run's (possibly
        // cancelled) token.
        teardown(self.cluster.as_ref(), &names).await;
        guard.teardown_done = true;
        drop(guard);

        match outcome {
            Ok(()) => {
                tracing::info!(run = %names.short, "Benchmark run completed");
                Ok(())
            }
            Err(err) => {
                self.mark_failed(cfg.run_id, &names).await;
                tracing::warn!(run = %names.short, error = %err, "Benchmark run failed");
                Err(err)
            }
        }
    }

    /// Phases 1-10. Any error is fatal to the run; there are no per-phase
    /// retries, because the run's cluster load is externally observable and
    /// opaque retries risk double-billing.
    async fn drive(
        &self,
        cancel: &CancellationToken,
        cfg: &RunConfig,
        names: &ResourceNames,
    ) -> CoreResult<()> {
        // Phase 1: mark running. Failing here aborts the run before any
        // cluster mutation.
        RunRepo::update_status(&self.pool, cfg.run_id, RunStatus::Running)
            .await
            .map_err(|e| CoreError::Internal(format!("update status to running: {e}")))?;

        // Phase 2: deploy the model workload.
        tracing::info!(
            run = %names.short,
            model = %cfg.request.model_hf_id,
            instance = %cfg.request.instance_type_name,
            "Deploying model workload",
        );
        self.deploy_model(cancel, cfg, names).await?;

        // Phase 3: wait for readiness.
        tracing::info!(run = %names.short, "Waiting for model readiness");
        self.wait_for_ready(cancel, &names.model).await?;

        // Phase 4: start the scraper (GPU only; non-fatal on failure).
        let scraper = self.start_scraper(cfg, names);

        // Phases 5-6: drive the load generator while the scraper samples.
        let collected = self.launch_and_collect(cancel, cfg, names).await;

        // Phase 7: stop the scraper before looking at the loadgen outcome,
        // so its samples are final whatever happened.
        let telemetry = match scraper {
            Some(scraper) => scraper.stop().await,
            None => None,
        };
        match &telemetry {
            Some(t) => tracing::info!(
                run = %names.short,
                utilization_peak_pct = t.utilization_peak_pct,
                utilization_avg_pct = t.utilization_avg_pct,
                memory_peak_gib = t.memory_peak_gib,
                waiting_max = t.waiting_requests_max,
                "Accelerator telemetry collected",
            ),
            None => tracing::debug!(run = %names.short, "No accelerator telemetry collected"),
        }

        let log_data = collected?;
        tracing::info!(
            run = %names.short,
            bytes = log_data.len(),
            "Collected loadgen output",
        );

        // Phase 8: parse.
        let output = parse_loadgen_output(&log_data).map_err(|err| {
            tracing::warn!(
                run = %names.short,
                error = %err,
                snippet = %log_snippet(&log_data),
                "Failed to parse loadgen output",
            );
            err
        })?;

        // Phase 9: compute and merge telemetry.
        let mut metrics = compute_metrics(&output);
        if let Some(telemetry) = &telemetry {
            metrics.merge_telemetry(telemetry);
        }

        // Phase 10: persist. On failure the computed value is discarded —
        // a run is never marked completed without durable metrics.
        MetricsRepo::persist(&self.pool, cfg.run_id, &metrics)
            .await
            .map_err(|err| {
                let discarded = serde_json::to_vec(&metrics).map(|v| v.len()).unwrap_or(0);
                tracing::error!(
                    run = %names.short,
                    error = %err,
                    discarded_bytes = discarded,
                    "Failed to persist metrics; value discarded",
                );
                CoreError::Data(format!("persist metrics: {err}"))
            })?;

        Ok(())
    }

    /// Render and apply the model Deployment + Service.
    async fn deploy_model(
        &self,
        cancel: &CancellationToken,
        cfg: &RunConfig,
        names: &ResourceNames,
    ) -> CoreResult<()> {
        // Reserve headroom for kubelet, kube-proxy, and OS overhead:
        // request ~75% of instance vCPUs and ~85% of memory.
        let instance = &cfg.instance_type;
        let cpu_request = (instance.vcpus * 3 / 4).max(1).to_string();
        let memory_request = format!("{}Gi", (instance.memory_gib * 85 / 100).max(1));

        let manifest = manifest::render_model_workload(&ModelWorkloadParams {
            name: names.model.clone(),
            namespace: self.config.namespace.clone(),
            model_hf_id: cfg.request.model_hf_id.clone(),
            hf_token: cfg.request.hf_token.clone(),
            framework: cfg.request.framework.clone(),
            framework_version: cfg.request.framework_version.clone(),
            tensor_parallel_degree: cfg.request.tensor_parallel_degree,
            quantization: cfg.request.quantization.clone().unwrap_or_default(),
            accelerator_type: instance.accelerator_type.clone(),
            accelerator_count: instance.accelerator_count,
            instance_type_name: instance.name.clone(),
            max_model_len: cfg.request.max_model_len,
            cpu_request,
            memory_request,
        })?;

        self.apply(cancel, &manifest).await
    }

    /// Render and apply the load-generator Job, then wait for its terminal
    /// condition and return the pod's log stream.
    async fn launch_and_collect(
        &self,
        cancel: &CancellationToken,
        cfg: &RunConfig,
        names: &ResourceNames,
    ) -> CoreResult<Vec<u8>> {
        tracing::info!(run = %names.short, "Launching load generator");

        let manifest = manifest::render_loadgen_job(&LoadgenJobParams {
            name: names.loadgen.clone(),
            namespace: self.config.namespace.clone(),
            loadgen_image: self.config.loadgen_image.clone(),
            target_host: names.model.clone(),
            target_port: MODEL_SERVER_PORT,
            model_hf_id: cfg.request.model_hf_id.clone(),
            concurrency: cfg.request.concurrency,
            input_sequence_length: cfg.request.input_sequence_length,
            output_sequence_length: cfg.request.output_sequence_length,
            dataset_name: cfg.request.dataset_name.clone(),
            num_requests: manifest::num_requests_for(cfg.request.concurrency),
            warmup_requests: DEFAULT_WARMUP_REQUESTS,
            min_duration_seconds: cfg.request.min_duration_seconds,
        })?;
        self.apply(cancel, &manifest).await?;

        tracing::info!(run = %names.short, "Waiting for load generator completion");
        self.wait_and_collect(cancel, names).await
    }

    /// Poll the deployment's ready-replica count until at least one pod is
    /// ready or the readiness timeout elapses.
    async fn wait_for_ready(&self, cancel: &CancellationToken, name: &str) -> CoreResult<()> {
        let deadline = tokio::time::Instant::now() + self.config.readiness_timeout;

        while tokio::time::Instant::now() < deadline {
            let ready = tokio::select! {
                _ = cancel.cancelled() => return Err(run_cancelled()),
                result = self.cluster.deployment_ready_replicas(name) => {
                    result.map_err(infra)?
                }
            };
            if ready >= 1 {
                return Ok(());
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(run_cancelled()),
                _ = tokio::time::sleep(self.config.readiness_poll) => {}
            }
        }

        Err(CoreError::Infrastructure(format!(
            "model deployment {name} not ready after {:?}",
            self.config.readiness_timeout
        )))
    }

    /// Poll the job's conditions until `Complete` (return the first pod's
    /// log) or `Failed` (surface the condition message), up to the job
    /// timeout.
    async fn wait_and_collect(
        &self,
        cancel: &CancellationToken,
        names: &ResourceNames,
    ) -> CoreResult<Vec<u8>> {
        let deadline = tokio::time::Instant::now() + self.config.job_timeout;

        while tokio::time::Instant::now() < deadline {
            let state = tokio::select! {
                _ = cancel.cancelled() => return Err(run_cancelled()),
                result = self.cluster.job_state(&names.loadgen) => result.map_err(infra)?,
            };
            match state {
                JobState::Complete => {
                    return tokio::select! {
                        _ = cancel.cancelled() => Err(run_cancelled()),
                        logs = self.cluster.job_logs(&names.loadgen, LOADGEN_CONTAINER) => {
                            logs.map_err(infra)
                        }
                    };
                }
                JobState::Failed { message } => {
                    return Err(CoreError::Infrastructure(format!(
                        "loadgen job failed: {message}"
                    )));
                }
                JobState::Active => {}
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(run_cancelled()),
                _ = tokio::time::sleep(self.config.job_poll) => {}
            }
        }

        Err(CoreError::Infrastructure(format!(
            "loadgen job {} timed out after {:?}",
            names.loadgen, self.config.job_timeout
        )))
    }

    /// Start the serving-side scraper for GPU instances. Failure to start
    /// is recorded but never fails the run.
    fn start_scraper(&self, cfg: &RunConfig, names: &ResourceNames) -> Option<GpuScraper> {
        if is_neuron(&cfg.instance_type.accelerator_type) {
            return None;
        }
        let mut scraper = GpuScraper::new(
            &names.model,
            MODEL_SERVER_PORT,
            cfg.instance_type.accelerator_memory_gib as f64,
        );
        match scraper.start() {
            Ok(()) => {
                tracing::info!(run = %names.short, "Started accelerator metrics scraper");
                Some(scraper)
            }
            Err(err) => {
                tracing::warn!(
                    run = %names.short,
                    error = %err,
                    "Could not start metrics scraper; continuing without telemetry",
                );
                None
            }
        }
    }

    /// Apply a manifest, aborting promptly on cancellation.
    async fn apply(&self, cancel: &CancellationToken, manifest: &str) -> CoreResult<()> {
        tokio::select! {
            _ = cancel.cancelled() => Err(run_cancelled()),
            result = self.cluster.apply_manifest(manifest) => result.map_err(infra),
        }
    }

    async fn mark_failed(&self, run_id: Uuid, names: &ResourceNames) {
        if let Err(err) = RunRepo::update_status(&self.pool, run_id, RunStatus::Failed).await {
            tracing::error!(run = %names.short, error = %err, "Failed to mark run as failed");
        }
    }
}

/// Delete the job, service, and deployment of a run. Idempotent;
/// "not found" responses are normal.
async fn teardown(cluster: &dyn ClusterApi, names: &ResourceNames) {
    tracing::info!(
        run = %names.short,
        model = %names.model,
        loadgen = %names.loadgen,
        "Tearing down run resources",
    );
    if let Err(err) = cluster.delete_job(&names.loadgen).await {
        tracing::warn!(run = %names.short, error = %err, "Failed to delete loadgen job");
    }
    if let Err(err) = cluster.delete_service(&names.model).await {
        tracing::warn!(run = %names.short, error = %err, "Failed to delete model service");
    }
    if let Err(err) = cluster.delete_deployment(&names.model).await {
        tracing::warn!(run = %names.short, error = %err, "Failed to delete model deployment");
    }
}

/// Scope guard for one run.
///
/// Always removes the cancellation-registry entry. If the run unwound
/// before the explicit teardown (a panic in a phase), spawns the teardown
/// on a detached task so cleanup still happens with a fresh context.
struct RunGuard {
    cluster: Arc<dyn ClusterApi>,
    cancels: Arc<Mutex<HashMap<Uuid, CancellationToken>>>,
    run_id: Uuid,
    names: ResourceNames,
    teardown_done: bool,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.cancels.lock().unwrap().remove(&self.run_id);
        if !self.teardown_done {
            let cluster = Arc::clone(&self.cluster);
            let names = self.names.clone();
            // Drop can run while the runtime itself is shutting down; only
            // spawn when a handle is still available.
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    teardown(cluster.as_ref(), &names).await;
                });
            }
        }
    }
}

fn run_cancelled() -> CoreError {
    CoreError::Cancelled("run cancelled".to_string())
}

fn infra(err: ClusterError) -> CoreError {
    CoreError::Infrastructure(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_names_use_the_short_run_id() {
        let run_id: Uuid = "12345678-abcd-1234-abcd-1234567890ab".parse().unwrap();
        let names = ResourceNames::for_run(run_id);
        assert_eq!(names.model, "bench-12345678");
        assert_eq!(names.loadgen, "loadgen-12345678");
        assert_eq!(names.short, "12345678");
    }

    #[test]
    fn default_config_matches_production_timeouts() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.readiness_timeout, Duration::from_secs(1500));
        assert_eq!(config.readiness_poll, Duration::from_secs(10));
        assert_eq!(config.job_timeout, Duration::from_secs(7200));
        assert_eq!(config.job_poll, Duration::from_secs(15));
    }
}
