//! Cluster contract for the benchmark orchestrator.
//!
//! [`ClusterApi`] is the seam between the lifecycle engine and Kubernetes:
//! production uses the [`KubeCluster`] implementation, tests use the
//! in-memory [`mock::MockCluster`]. The orchestrator only ever speaks in
//! terms of this trait.

use async_trait::async_trait;

mod kube_cluster;
pub mod mock;

pub use kube_cluster::KubeCluster;

/// Errors surfaced by cluster operations.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// Creating a resource that already exists. This is always a hard
    /// error: run names derive from the run id, so a collision means
    /// leaked resources from an earlier run.
    #[error("resource {kind}/{name} already exists")]
    AlreadyExists { kind: String, name: String },

    /// A manifest could not be parsed or named an unsupported kind.
    #[error("manifest error: {0}")]
    Manifest(String),

    /// Any other API failure (transport, server-side, missing resource).
    #[error("cluster api error: {0}")]
    Api(String),
}

/// Observed state of a batch job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// No terminal condition yet.
    Active,
    /// The `Complete` condition is true.
    Complete,
    /// The `Failed` condition is true; carries the condition message.
    Failed { message: String },
}

/// Operations the orchestrator needs from the container orchestrator.
///
/// All methods are scoped to the namespace the implementation was built
/// with. Deletions are best-effort with background propagation and treat
/// "not found" as success.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Apply a multi-document YAML manifest (Deployment, Service, Job).
    async fn apply_manifest(&self, manifest: &str) -> Result<(), ClusterError>;

    /// Number of ready replicas for a deployment.
    async fn deployment_ready_replicas(&self, name: &str) -> Result<i32, ClusterError>;

    /// Current terminal-condition state of a job.
    async fn job_state(&self, name: &str) -> Result<JobState, ClusterError>;

    /// Full log of the named container in the job's first pod.
    async fn job_logs(&self, job_name: &str, container: &str) -> Result<Vec<u8>, ClusterError>;

    async fn delete_deployment(&self, name: &str) -> Result<(), ClusterError>;
    async fn delete_service(&self, name: &str) -> Result<(), ClusterError>;
    async fn delete_job(&self, name: &str) -> Result<(), ClusterError>;
}

/// Split a multi-document YAML string into its non-empty documents.
pub(crate) fn manifest_documents(
    manifest: &str,
) -> Result<Vec<serde_yaml::Value>, ClusterError> {
    use serde::Deserialize;

    let mut documents = Vec::new();
    for deserializer in serde_yaml::Deserializer::from_str(manifest) {
        let value = serde_yaml::Value::deserialize(deserializer)
            .map_err(|e| ClusterError::Manifest(format!("decode YAML: {e}")))?;
        if !value.is_null() {
            documents.push(value);
        }
    }
    Ok(documents)
}

/// The `kind` and `metadata.name` of a manifest document.
pub(crate) fn document_kind_and_name(
    document: &serde_yaml::Value,
) -> Result<(String, String), ClusterError> {
    let kind = document
        .get("kind")
        .and_then(|k| k.as_str())
        .ok_or_else(|| ClusterError::Manifest("document has no kind".into()))?;
    let name = document
        .get("metadata")
        .and_then(|m| m.get("name"))
        .and_then(|n| n.as_str())
        .ok_or_else(|| ClusterError::Manifest("document has no metadata.name".into()))?;
    Ok((kind.to_string(), name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_multi_document_manifests() {
        let docs = manifest_documents(
            "kind: Deployment\nmetadata:\n  name: a\n---\nkind: Service\nmetadata:\n  name: b\n",
        )
        .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(
            document_kind_and_name(&docs[0]).unwrap(),
            ("Deployment".to_string(), "a".to_string())
        );
        assert_eq!(
            document_kind_and_name(&docs[1]).unwrap(),
            ("Service".to_string(), "b".to_string())
        );
    }

    #[test]
    fn rejects_documents_without_kind() {
        let docs = manifest_documents("metadata:\n  name: a\n").unwrap();
        assert!(document_kind_and_name(&docs[0]).is_err());
    }
}
