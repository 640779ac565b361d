//! Kubernetes manifest rendering for benchmark runs.
//!
//! Renders the model-server Deployment + Service and the load-generator Job
//! as multi-document YAML. Rendering is a pure function of the parameter
//! structs: the same input always produces byte-identical output, and no
//! value reaches the manifest that was not explicitly passed in.

use crate::error::{CoreError, CoreResult};
use crate::types::{is_neuron, MODEL_SERVER_PORT};

/// Parameters for rendering the model-server Deployment + Service.
#[derive(Debug, Clone, Default)]
pub struct ModelWorkloadParams {
    pub name: String,
    pub namespace: String,
    pub model_hf_id: String,
    /// HuggingFace token for gated models. Empty = omit the env var.
    pub hf_token: String,
    /// `"vllm"` or `"vllm-neuron"`.
    pub framework: String,
    pub framework_version: String,
    pub tensor_parallel_degree: i32,
    /// `"fp16"`, `"fp8"`, `"int8"`, `"int4"`, or empty for native precision.
    pub quantization: String,
    /// `"gpu"` or `"neuron"`.
    pub accelerator_type: String,
    pub accelerator_count: i32,
    pub instance_type_name: String,
    /// 0 = let the server auto-detect from the model config.
    pub max_model_len: i32,
    /// CPU request, e.g. `"8"` (about 75% of instance vCPUs).
    pub cpu_request: String,
    /// Memory request, e.g. `"32Gi"` (about 85% of instance memory).
    pub memory_request: String,
}

/// Parameters for rendering the load-generator Job.
#[derive(Debug, Clone, Default)]
pub struct LoadgenJobParams {
    pub name: String,
    pub namespace: String,
    /// Full image URI for the load generator.
    pub loadgen_image: String,
    /// Model Service name to target.
    pub target_host: String,
    pub target_port: u16,
    pub model_hf_id: String,
    pub concurrency: i32,
    pub input_sequence_length: i32,
    pub output_sequence_length: i32,
    pub dataset_name: String,
    pub num_requests: i32,
    pub warmup_requests: i32,
    pub min_duration_seconds: i32,
}

/// Default number of warmup requests sent before measurement starts.
pub const DEFAULT_WARMUP_REQUESTS: i32 = 10;

/// Total request count for a run: at least 200, scaling with concurrency.
pub fn num_requests_for(concurrency: i32) -> i32 {
    200.max(concurrency * 10)
}

/// Render the model-server Deployment and fronting Service.
///
/// GPU instances get a single `model-server` container; Neuron instances
/// additionally get a `neuron-monitor` sidecar. The pod is pinned to the
/// requested instance type via the `node.kubernetes.io/instance-type` node
/// selector and tolerates the matching accelerator taint.
pub fn render_model_workload(params: &ModelWorkloadParams) -> CoreResult<String> {
    if params.name.is_empty() || params.namespace.is_empty() {
        return Err(CoreError::Validation(
            "manifest name and namespace are required".into(),
        ));
    }
    if params.model_hf_id.is_empty() {
        return Err(CoreError::Validation("model hf_id is required".into()));
    }
    if params.accelerator_count < 1 {
        return Err(CoreError::Validation(format!(
            "accelerator_count must be at least 1, got {}",
            params.accelerator_count
        )));
    }

    let neuron = is_neuron(&params.accelerator_type);
    let (image, toleration_key, device_resource) = if neuron {
        (
            format!("vllm/vllm-neuron:{}", params.framework_version),
            "aws.amazon.com/neuron",
            "aws.amazon.com/neuron",
        )
    } else {
        (
            format!("vllm/vllm-openai:{}", params.framework_version),
            "nvidia.com/gpu",
            "nvidia.com/gpu",
        )
    };

    let mut out = String::with_capacity(4096);
    out.push_str(&format!(
        "\
apiVersion: apps/v1
kind: Deployment
metadata:
  name: {name}
  namespace: {ns}
  labels:
    app: {name}
    accelbench/component: model-server
spec:
  replicas: 1
  selector:
    matchLabels:
      app: {name}
  template:
    metadata:
      labels:
        app: {name}
    spec:
      nodeSelector:
        node.kubernetes.io/instance-type: {instance}
      tolerations:
        - key: {toleration}
          operator: Exists
          effect: NoSchedule
      containers:
        - name: model-server
          image: {image}
          args:
",
        name = params.name,
        ns = params.namespace,
        instance = params.instance_type_name,
        toleration = toleration_key,
        image = image,
    ));

    for arg in server_args(params) {
        out.push_str(&format!("            - {arg}\n"));
    }

    if !params.hf_token.is_empty() {
        out.push_str(&format!(
            "\
          env:
            - name: HF_TOKEN
              value: \"{token}\"
",
            token = params.hf_token,
        ));
    }

    out.push_str(&format!(
        "\
          ports:
            - containerPort: {port}
          readinessProbe:
            httpGet:
              path: /health
              port: {port}
            initialDelaySeconds: 60
            periodSeconds: 10
          resources:
            requests:
              cpu: \"{cpu}\"
              memory: {mem}
              {device}: \"{count}\"
            limits:
              {device}: \"{count}\"
",
        port = MODEL_SERVER_PORT,
        cpu = params.cpu_request,
        mem = params.memory_request,
        device = device_resource,
        count = params.accelerator_count,
    ));

    if neuron {
        out.push_str(
            "\
        - name: neuron-monitor
          image: public.ecr.aws/neuron/neuron-monitor:latest
          ports:
            - containerPort: 8001
",
        );
    }

    out.push_str(&format!(
        "\
---
apiVersion: v1
kind: Service
metadata:
  name: {name}
  namespace: {ns}
  labels:
    app: {name}
spec:
  selector:
    app: {name}
  ports:
    - port: {port}
      targetPort: {port}
",
        name = params.name,
        ns = params.namespace,
        port = MODEL_SERVER_PORT,
    ));

    Ok(out)
}

/// Command-line arguments for the model-server container.
///
/// Quantization mapping: `fp16` selects the dtype flag (`--dtype float16`);
/// any other non-empty value is passed through `--quantization`; empty means
/// native precision and neither flag is emitted.
fn server_args(params: &ModelWorkloadParams) -> Vec<String> {
    let mut args = vec![
        "--model".to_string(),
        params.model_hf_id.clone(),
        "--tensor-parallel-size".to_string(),
        format!("\"{}\"", params.tensor_parallel_degree),
        "--port".to_string(),
        format!("\"{MODEL_SERVER_PORT}\""),
    ];
    if params.max_model_len > 0 {
        args.push("--max-model-len".to_string());
        args.push(format!("\"{}\"", params.max_model_len));
    }
    match params.quantization.as_str() {
        "" => {}
        "fp16" => {
            args.push("--dtype".to_string());
            args.push("\"float16\"".to_string());
        }
        other => {
            args.push("--quantization".to_string());
            args.push(format!("\"{other}\""));
        }
    }
    args
}

/// Render the load-generator Job.
///
/// The job is pinned to a non-accelerated system node, never restarts on
/// failure (`backoffLimit: 0`), and receives its entire configuration as
/// environment variables.
pub fn render_loadgen_job(params: &LoadgenJobParams) -> CoreResult<String> {
    if params.name.is_empty() || params.namespace.is_empty() {
        return Err(CoreError::Validation(
            "manifest name and namespace are required".into(),
        ));
    }
    if params.target_host.is_empty() {
        return Err(CoreError::Validation("loadgen target host is required".into()));
    }
    if params.concurrency < 1 {
        return Err(CoreError::Validation(format!(
            "concurrency must be at least 1, got {}",
            params.concurrency
        )));
    }

    let target_url = format!(
        "http://{}:{}/v1/completions",
        params.target_host, params.target_port
    );

    let env: Vec<(&str, String)> = vec![
        ("TARGET_URL", target_url),
        ("MODEL_ID", params.model_hf_id.clone()),
        ("CONCURRENCY", params.concurrency.to_string()),
        ("INPUT_SEQ_LEN", params.input_sequence_length.to_string()),
        ("OUTPUT_SEQ_LEN", params.output_sequence_length.to_string()),
        ("DATASET", params.dataset_name.clone()),
        ("NUM_REQUESTS", params.num_requests.to_string()),
        ("WARMUP_REQUESTS", params.warmup_requests.to_string()),
        (
            "MIN_DURATION_SECONDS",
            params.min_duration_seconds.to_string(),
        ),
        ("OUTPUT_FORMAT", "json".to_string()),
    ];

    let mut out = String::with_capacity(2048);
    out.push_str(&format!(
        "\
apiVersion: batch/v1
kind: Job
metadata:
  name: {name}
  namespace: {ns}
  labels:
    accelbench/component: loadgen
spec:
  backoffLimit: 0
  template:
    metadata:
      labels:
        app: {name}
    spec:
      restartPolicy: Never
      nodeSelector:
        accelbench/node-type: system
      containers:
        - name: loadgen
          image: {image}
          env:
",
        name = params.name,
        ns = params.namespace,
        image = params.loadgen_image,
    ));

    for (key, value) in env {
        out.push_str(&format!(
            "\
            - name: {key}
              value: \"{value}\"
",
        ));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gpu_params() -> ModelWorkloadParams {
        ModelWorkloadParams {
            name: "bench-test123".into(),
            namespace: "accelbench".into(),
            model_hf_id: "meta-llama/Llama-3.1-70B-Instruct".into(),
            hf_token: "hf_test_token".into(),
            framework: "vllm".into(),
            framework_version: "v0.6.0".into(),
            tensor_parallel_degree: 8,
            quantization: "fp16".into(),
            accelerator_type: "gpu".into(),
            accelerator_count: 8,
            instance_type_name: "p5.48xlarge".into(),
            max_model_len: 0,
            cpu_request: "8".into(),
            memory_request: "32Gi".into(),
        }
    }

    #[test]
    fn model_workload_gpu_contains_expected_fields() {
        let out = render_model_workload(&gpu_params()).unwrap();

        for want in [
            "name: bench-test123",
            "namespace: accelbench",
            "meta-llama/Llama-3.1-70B-Instruct",
            "vllm/vllm-openai:v0.6.0",
            "nvidia.com/gpu",
            "nvidia.com/gpu: \"8\"",
            "\"8\"",
            "\"float16\"",
            "node.kubernetes.io/instance-type: p5.48xlarge",
            "hf_test_token",
            "kind: Service",
            "port: 8000",
            "/health",
        ] {
            assert!(out.contains(want), "output missing {want:?}:\n{out}");
        }

        // GPU deployments carry no Neuron-specific content.
        assert!(!out.contains("aws.amazon.com/neuron"));
        assert!(!out.contains("neuron-monitor"));
    }

    #[test]
    fn model_workload_neuron_swaps_device_and_adds_sidecar() {
        let params = ModelWorkloadParams {
            name: "bench-neuron".into(),
            namespace: "accelbench".into(),
            model_hf_id: "meta-llama/Llama-3.1-8B-Instruct".into(),
            hf_token: String::new(),
            framework: "vllm-neuron".into(),
            framework_version: "v0.6.0".into(),
            tensor_parallel_degree: 2,
            quantization: String::new(),
            accelerator_type: "neuron".into(),
            accelerator_count: 2,
            instance_type_name: "inf2.xlarge".into(),
            max_model_len: 0,
            cpu_request: "4".into(),
            memory_request: "16Gi".into(),
        };
        let out = render_model_workload(&params).unwrap();

        for want in [
            "vllm/vllm-neuron:v0.6.0",
            "aws.amazon.com/neuron",
            "aws.amazon.com/neuron: \"2\"",
            "node.kubernetes.io/instance-type: inf2.xlarge",
            "neuron-monitor",
        ] {
            assert!(out.contains(want), "output missing {want:?}:\n{out}");
        }

        assert!(!out.contains("nvidia.com/gpu"));
    }

    #[test]
    fn model_workload_without_quantization_omits_flags() {
        let params = ModelWorkloadParams {
            quantization: String::new(),
            hf_token: String::new(),
            ..gpu_params()
        };
        let out = render_model_workload(&params).unwrap();
        assert!(!out.contains("--dtype"));
        assert!(!out.contains("--quantization"));
        assert!(!out.contains("HF_TOKEN"));
    }

    #[test]
    fn model_workload_is_a_multi_document_manifest() {
        let out = render_model_workload(&gpu_params()).unwrap();
        assert!(out.contains("kind: Deployment"));
        assert!(out.contains("kind: Service"));
        assert!(out.contains("---"));
    }

    #[test]
    fn model_workload_rendering_is_deterministic() {
        let a = render_model_workload(&gpu_params()).unwrap();
        let b = render_model_workload(&gpu_params()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn model_workload_rejects_zero_accelerators() {
        let params = ModelWorkloadParams {
            accelerator_count: 0,
            ..gpu_params()
        };
        assert!(render_model_workload(&params).is_err());
    }

    #[test]
    fn loadgen_job_contains_expected_fields() {
        let params = LoadgenJobParams {
            name: "loadgen-abc123".into(),
            namespace: "accelbench".into(),
            loadgen_image: "ghcr.io/accelbench/loadgen:latest".into(),
            target_host: "bench-test123".into(),
            target_port: 8000,
            model_hf_id: "meta-llama/Llama-3.1-70B-Instruct".into(),
            concurrency: 16,
            input_sequence_length: 512,
            output_sequence_length: 256,
            dataset_name: "sharegpt".into(),
            num_requests: 200,
            warmup_requests: 10,
            min_duration_seconds: 60,
        };
        let out = render_loadgen_job(&params).unwrap();

        for want in [
            "name: loadgen-abc123",
            "namespace: accelbench",
            "http://bench-test123:8000/v1/completions",
            "meta-llama/Llama-3.1-70B-Instruct",
            "value: \"16\"",
            "value: \"512\"",
            "value: \"256\"",
            "value: \"sharegpt\"",
            "value: \"200\"",
            "value: \"10\"",
            "accelbench/node-type",
            "value: \"json\"",
            "MIN_DURATION_SECONDS",
            "backoffLimit: 0",
            "restartPolicy: Never",
        ] {
            assert!(out.contains(want), "output missing {want:?}:\n{out}");
        }
    }

    #[test]
    fn num_requests_floors_at_200() {
        assert_eq!(num_requests_for(1), 200);
        assert_eq!(num_requests_for(16), 200);
        assert_eq!(num_requests_for(20), 200);
        assert_eq!(num_requests_for(32), 320);
        assert_eq!(num_requests_for(64), 640);
    }
}
