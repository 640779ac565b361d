//! Kubernetes-backed [`ClusterApi`] implementation.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::{DeleteParams, ListParams, LogParams, PostParams};
use kube::{Api, Client};

use crate::{document_kind_and_name, manifest_documents, ClusterApi, ClusterError, JobState};

/// Namespaced Kubernetes client for benchmark resources.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    namespace: String,
}

impl KubeCluster {
    /// Wrap an existing client, scoping all operations to `namespace`.
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn deployments(&self) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn services(&self) -> Api<Service> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn jobs(&self) -> Api<Job> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

/// Translate a kube error on create, distinguishing "already exists".
fn create_error(err: kube::Error, kind: &str, name: &str) -> ClusterError {
    if let kube::Error::Api(ref response) = err {
        if response.code == 409 {
            return ClusterError::AlreadyExists {
                kind: kind.to_string(),
                name: name.to_string(),
            };
        }
    }
    ClusterError::Api(format!("create {kind}/{name}: {err}"))
}

/// Deletions treat "not found" as success; teardown is idempotent.
fn ignore_not_found(result: Result<(), kube::Error>, what: &str) -> Result<(), ClusterError> {
    match result {
        Ok(()) => Ok(()),
        Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
        Err(err) => Err(ClusterError::Api(format!("delete {what}: {err}"))),
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn apply_manifest(&self, manifest: &str) -> Result<(), ClusterError> {
        for document in manifest_documents(manifest)? {
            let (kind, name) = document_kind_and_name(&document)?;
            match kind.as_str() {
                "Deployment" => {
                    let deployment: Deployment = serde_yaml::from_value(document)
                        .map_err(|e| ClusterError::Manifest(format!("decode deployment: {e}")))?;
                    self.deployments()
                        .create(&PostParams::default(), &deployment)
                        .await
                        .map_err(|e| create_error(e, &kind, &name))?;
                }
                "Service" => {
                    let service: Service = serde_yaml::from_value(document)
                        .map_err(|e| ClusterError::Manifest(format!("decode service: {e}")))?;
                    self.services()
                        .create(&PostParams::default(), &service)
                        .await
                        .map_err(|e| create_error(e, &kind, &name))?;
                }
                "Job" => {
                    let job: Job = serde_yaml::from_value(document)
                        .map_err(|e| ClusterError::Manifest(format!("decode job: {e}")))?;
                    self.jobs()
                        .create(&PostParams::default(), &job)
                        .await
                        .map_err(|e| create_error(e, &kind, &name))?;
                }
                other => {
                    return Err(ClusterError::Manifest(format!(
                        "unsupported resource kind: {other}"
                    )));
                }
            }
        }
        Ok(())
    }

    async fn deployment_ready_replicas(&self, name: &str) -> Result<i32, ClusterError> {
        let deployment = self
            .deployments()
            .get(name)
            .await
            .map_err(|e| ClusterError::Api(format!("get deployment {name}: {e}")))?;
        Ok(deployment
            .status
            .and_then(|s| s.ready_replicas)
            .unwrap_or(0))
    }

    async fn job_state(&self, name: &str) -> Result<JobState, ClusterError> {
        let job = self
            .jobs()
            .get(name)
            .await
            .map_err(|e| ClusterError::Api(format!("get job {name}: {e}")))?;

        let conditions = job
            .status
            .and_then(|s| s.conditions)
            .unwrap_or_default();
        for condition in conditions {
            if condition.status != "True" {
                continue;
            }
            match condition.type_.as_str() {
                "Complete" => return Ok(JobState::Complete),
                "Failed" => {
                    return Ok(JobState::Failed {
                        message: condition.message.unwrap_or_default(),
                    });
                }
                _ => {}
            }
        }
        Ok(JobState::Active)
    }

    async fn job_logs(&self, job_name: &str, container: &str) -> Result<Vec<u8>, ClusterError> {
        let pods = self
            .pods()
            .list(&ListParams::default().labels(&format!("job-name={job_name}")))
            .await
            .map_err(|e| ClusterError::Api(format!("list pods for job {job_name}: {e}")))?;

        let pod_name = pods
            .items
            .first()
            .and_then(|pod| pod.metadata.name.clone())
            .ok_or_else(|| ClusterError::Api(format!("no pods found for job {job_name}")))?;

        let logs = self
            .pods()
            .logs(
                &pod_name,
                &LogParams {
                    container: Some(container.to_string()),
                    ..LogParams::default()
                },
            )
            .await
            .map_err(|e| ClusterError::Api(format!("read logs of pod {pod_name}: {e}")))?;
        Ok(logs.into_bytes())
    }

    async fn delete_deployment(&self, name: &str) -> Result<(), ClusterError> {
        let result = self
            .deployments()
            .delete(name, &DeleteParams::background())
            .await
            .map(|_| ());
        ignore_not_found(result, &format!("deployment {name}"))
    }

    async fn delete_service(&self, name: &str) -> Result<(), ClusterError> {
        let result = self
            .services()
            .delete(name, &DeleteParams::background())
            .await
            .map(|_| ());
        ignore_not_found(result, &format!("service {name}"))
    }

    async fn delete_job(&self, name: &str) -> Result<(), ClusterError> {
        let result = self
            .jobs()
            .delete(name, &DeleteParams::background())
            .await
            .map(|_| ());
        ignore_not_found(result, &format!("job {name}"))
    }
}
