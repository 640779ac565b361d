//! In-memory [`ClusterApi`] implementation for tests.
//!
//! Tracks applied resources by kind and name, with knobs for simulating
//! readiness, job completion, and log output. Shipped as a normal module so
//! downstream crates (orchestrator, api) can drive their tests against it.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{document_kind_and_name, manifest_documents, ClusterApi, ClusterError, JobState};

#[derive(Default)]
struct State {
    deployments: HashMap<String, i32>,
    services: HashSet<String>,
    jobs: HashMap<String, JobState>,
    job_logs: HashMap<String, Vec<u8>>,
    fail_applies: bool,
    auto_ready_deployments: bool,
    job_state_on_create: Option<JobState>,
    fallback_job_logs: Option<Vec<u8>>,
}

/// A fake cluster holding resources in memory.
#[derive(Default)]
pub struct MockCluster {
    state: Mutex<State>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `apply_manifest` fail with an API error.
    pub fn fail_applies(&self) {
        self.state.lock().unwrap().fail_applies = true;
    }

    /// Report every deployment as ready the moment it is created.
    pub fn auto_ready_deployments(&self) {
        self.state.lock().unwrap().auto_ready_deployments = true;
    }

    /// Move every job to `state` the moment it is created, instead of
    /// leaving it `Active`.
    pub fn complete_jobs_on_create(&self, state: JobState) {
        self.state.lock().unwrap().job_state_on_create = Some(state);
    }

    /// Simulate the deployment reaching readiness.
    pub fn set_ready_replicas(&self, name: &str, replicas: i32) {
        self.state
            .lock()
            .unwrap()
            .deployments
            .insert(name.to_string(), replicas);
    }

    /// Move a job to the given state.
    pub fn set_job_state(&self, name: &str, state: JobState) {
        self.state
            .lock()
            .unwrap()
            .jobs
            .insert(name.to_string(), state);
    }

    /// Log stream returned for any job without an explicit entry. Useful
    /// when the job name (derived from a server-assigned run id) is not
    /// known up front.
    pub fn set_fallback_job_logs(&self, logs: impl Into<Vec<u8>>) {
        self.state.lock().unwrap().fallback_job_logs = Some(logs.into());
    }

    /// Set the log stream the job's pod will return.
    pub fn set_job_logs(&self, name: &str, logs: impl Into<Vec<u8>>) {
        self.state
            .lock()
            .unwrap()
            .job_logs
            .insert(name.to_string(), logs.into());
    }

    pub fn deployment_exists(&self, name: &str) -> bool {
        self.state.lock().unwrap().deployments.contains_key(name)
    }

    pub fn service_exists(&self, name: &str) -> bool {
        self.state.lock().unwrap().services.contains(name)
    }

    pub fn job_exists(&self, name: &str) -> bool {
        self.state.lock().unwrap().jobs.contains_key(name)
    }

    /// Total number of live resources; zero after a full teardown.
    pub fn resource_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.deployments.len() + state.services.len() + state.jobs.len()
    }
}

#[async_trait]
impl ClusterApi for MockCluster {
    async fn apply_manifest(&self, manifest: &str) -> Result<(), ClusterError> {
        let documents = manifest_documents(manifest)?;
        let mut state = self.state.lock().unwrap();
        if state.fail_applies {
            return Err(ClusterError::Api("injected apply failure".into()));
        }
        for document in documents {
            let (kind, name) = document_kind_and_name(&document)?;
            let exists = match kind.as_str() {
                "Deployment" => state.deployments.contains_key(&name),
                "Service" => state.services.contains(&name),
                "Job" => state.jobs.contains_key(&name),
                other => {
                    return Err(ClusterError::Manifest(format!(
                        "unsupported resource kind: {other}"
                    )));
                }
            };
            if exists {
                return Err(ClusterError::AlreadyExists { kind, name });
            }
            match kind.as_str() {
                "Deployment" => {
                    let replicas = if state.auto_ready_deployments { 1 } else { 0 };
                    state.deployments.insert(name, replicas);
                }
                "Service" => {
                    state.services.insert(name);
                }
                "Job" => {
                    let job_state = state
                        .job_state_on_create
                        .clone()
                        .unwrap_or(JobState::Active);
                    state.jobs.insert(name, job_state);
                }
                _ => unreachable!(),
            }
        }
        Ok(())
    }

    async fn deployment_ready_replicas(&self, name: &str) -> Result<i32, ClusterError> {
        self.state
            .lock()
            .unwrap()
            .deployments
            .get(name)
            .copied()
            .ok_or_else(|| ClusterError::Api(format!("deployment {name} not found")))
    }

    async fn job_state(&self, name: &str) -> Result<JobState, ClusterError> {
        self.state
            .lock()
            .unwrap()
            .jobs
            .get(name)
            .cloned()
            .ok_or_else(|| ClusterError::Api(format!("job {name} not found")))
    }

    async fn job_logs(&self, job_name: &str, _container: &str) -> Result<Vec<u8>, ClusterError> {
        let state = self.state.lock().unwrap();
        state
            .job_logs
            .get(job_name)
            .or(state.fallback_job_logs.as_ref())
            .cloned()
            .ok_or_else(|| ClusterError::Api(format!("no pods found for job {job_name}")))
    }

    async fn delete_deployment(&self, name: &str) -> Result<(), ClusterError> {
        self.state.lock().unwrap().deployments.remove(name);
        Ok(())
    }

    async fn delete_service(&self, name: &str) -> Result<(), ClusterError> {
        self.state.lock().unwrap().services.remove(name);
        Ok(())
    }

    async fn delete_job(&self, name: &str) -> Result<(), ClusterError> {
        let mut state = self.state.lock().unwrap();
        state.jobs.remove(name);
        state.job_logs.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = "\
kind: Deployment
metadata:
  name: bench-abc
---
kind: Service
metadata:
  name: bench-abc
";

    #[tokio::test]
    async fn apply_tracks_resources_by_kind() {
        let cluster = MockCluster::new();
        cluster.apply_manifest(MANIFEST).await.unwrap();
        assert!(cluster.deployment_exists("bench-abc"));
        assert!(cluster.service_exists("bench-abc"));
        assert_eq!(cluster.resource_count(), 2);
    }

    #[tokio::test]
    async fn reapplying_is_an_already_exists_error() {
        let cluster = MockCluster::new();
        cluster.apply_manifest(MANIFEST).await.unwrap();
        let err = cluster.apply_manifest(MANIFEST).await.unwrap_err();
        assert!(matches!(err, ClusterError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn deletes_are_idempotent() {
        let cluster = MockCluster::new();
        cluster.apply_manifest(MANIFEST).await.unwrap();
        cluster.delete_deployment("bench-abc").await.unwrap();
        cluster.delete_deployment("bench-abc").await.unwrap();
        cluster.delete_service("bench-abc").await.unwrap();
        assert_eq!(cluster.resource_count(), 0);
    }
}
