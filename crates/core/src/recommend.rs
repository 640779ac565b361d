//! Deterministic benchmark-configuration recommender.
//!
//! Given model architecture metadata (fetched from the HuggingFace Hub by
//! the API layer) and the specs of an accelerated instance type, computes a
//! tensor-parallel degree, quantization, max model length, and concurrency
//! that fit in accelerator memory, with human-readable explanations.
//!
//! Only GPU instances are considered; Neuron support is deferred.

use serde::{Deserialize, Serialize};

use crate::types::is_neuron;

/// Model architecture metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    pub parameter_count: i64,
    pub hidden_size: i64,
    pub num_attention_heads: i64,
    pub num_key_value_heads: i64,
    pub num_hidden_layers: i64,
    pub max_position_embeddings: i64,
    pub torch_dtype: String,
    pub model_type: String,
}

/// Accelerator specs of an instance type, as stored in the repository.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub name: String,
    pub accelerator_type: String,
    pub accelerator_name: String,
    pub accelerator_count: i64,
    pub accelerator_memory_gib: i64,
}

/// The recommended configuration plus reasoning.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Recommendation {
    pub tensor_parallel_degree: i64,
    pub quantization: Option<String>,
    pub max_model_len: i64,
    pub concurrency: i64,
    pub input_sequence_length: i64,
    pub output_sequence_length: i64,

    pub explanation: Explanation,
    pub model_info: ModelInfo,
    pub instance_info: InstanceInfo,

    /// Present when the model does not fit at native precision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternatives: Option<Alternatives>,
}

/// Human-readable reasoning for each recommended value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Explanation {
    pub tensor_parallel_degree: String,
    pub quantization: String,
    pub max_model_len: String,
    pub concurrency: String,
    pub feasible: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub suggested_instance: String,
}

/// Model metadata summary echoed in the response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelInfo {
    pub parameter_count: i64,
    pub native_dtype: String,
    pub max_position_embeddings: i64,
    pub architecture: String,
}

/// Instance spec summary echoed in the response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub accelerator_count: i64,
    pub accelerator_memory_gib: i64,
    pub accelerator_name: String,
}

/// Options when the model does not fit at native precision.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Alternatives {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantization_option: Option<QuantizationOption>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub larger_instance: String,
}

/// A quantization level under which the model fits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuantizationOption {
    pub quantization: String,
    pub estimated_mem_gib: f64,
}

/// Fraction of accelerator memory reserved for runtime overhead
/// (CUDA context, activations).
const OVERHEAD_FRACTION: f64 = 0.10;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Common context lengths, largest first.
const COMMON_CONTEXT_LENGTHS: [i64; 9] =
    [131_072, 65_536, 32_768, 16_384, 8_192, 4_096, 2_048, 1_024, 512];

/// Upper bound on recommended concurrency.
const MAX_CONCURRENCY: i64 = 64;

/// Bytes per parameter for a dtype or quantization level.
fn bytes_per_param(quant: &str) -> f64 {
    match quant {
        "fp32" => 4.0,
        "" | "fp16" | "bfloat16" | "float16" => 2.0,
        "fp8" | "int8" => 1.0,
        "int4" => 0.5,
        // Unknown dtypes are assumed half precision.
        _ => 2.0,
    }
}

/// Whether the accelerator has native FP8 support.
fn supports_fp8(accelerator_name: &str) -> bool {
    matches!(accelerator_name, "H100" | "H200" | "L40S")
}

fn model_memory_bytes(params: i64, quant: &str) -> f64 {
    params as f64 * bytes_per_param(quant)
}

/// KV cache bytes per token:
/// 2 (K+V) x layers x kv_heads x head_dim x 2 (FP16 bytes).
fn kv_cache_per_token_bytes(cfg: &ModelConfig) -> f64 {
    if cfg.num_attention_heads == 0 {
        return 0.0;
    }
    let head_dim = cfg.hidden_size as f64 / cfg.num_attention_heads as f64;
    2.0 * cfg.num_hidden_layers as f64 * cfg.num_key_value_heads as f64 * head_dim * 2.0
}

fn native_dtype(cfg: &ModelConfig) -> &str {
    if cfg.torch_dtype.is_empty() {
        "bfloat16"
    } else {
        &cfg.torch_dtype
    }
}

/// Smallest TP degree >= `min_tp` that evenly divides both head counts and
/// fits on the instance. Falls back to the device count when nothing
/// divides evenly.
fn valid_tp_degree(min_tp: i64, num_heads: i64, num_kv_heads: i64, max_devices: i64) -> i64 {
    for tp in min_tp..=max_devices {
        if num_heads % tp == 0 && num_kv_heads % tp == 0 {
            return tp;
        }
    }
    max_devices
}

/// Round a token budget down to the nearest common context length.
fn round_down_context(tokens: i64) -> i64 {
    for c in COMMON_CONTEXT_LENGTHS {
        if tokens >= c {
            return c;
        }
    }
    512
}

/// Compute a configuration recommendation.
///
/// `all_instances` supplies candidates for the "try a larger instance"
/// alternative; only GPU entries are considered.
pub fn recommend(
    cfg: &ModelConfig,
    inst: &InstanceSpec,
    all_instances: &[InstanceSpec],
) -> Recommendation {
    let dtype = native_dtype(cfg).to_string();
    let per_device_gib = inst.accelerator_memory_gib as f64 / inst.accelerator_count.max(1) as f64;
    let usable_per_device = per_device_gib * GIB * (1.0 - OVERHEAD_FRACTION);
    let total_usable = usable_per_device * inst.accelerator_count as f64;

    let model_mem_native = model_memory_bytes(cfg.parameter_count, &dtype);
    let min_devices = ((model_mem_native / usable_per_device).ceil() as i64).max(1);

    let mut rec = Recommendation {
        input_sequence_length: 512,
        output_sequence_length: 256,
        model_info: ModelInfo {
            parameter_count: cfg.parameter_count,
            native_dtype: dtype.clone(),
            max_position_embeddings: cfg.max_position_embeddings,
            architecture: cfg.model_type.clone(),
        },
        instance_info: InstanceInfo {
            accelerator_count: inst.accelerator_count,
            accelerator_memory_gib: inst.accelerator_memory_gib,
            accelerator_name: inst.accelerator_name.clone(),
        },
        ..Recommendation::default()
    };

    // Choose precision and tensor-parallel degree.
    let chosen_quant: String;
    if model_mem_native <= total_usable {
        let tp = valid_tp_degree(
            min_devices,
            cfg.num_attention_heads,
            cfg.num_key_value_heads,
            inst.accelerator_count,
        );
        rec.tensor_parallel_degree = tp;
        rec.quantization = None;
        chosen_quant = dtype.clone();
        rec.explanation.quantization = format!(
            "Model fits in native {dtype} precision ({:.1} GiB weights, {:.0} GiB available).",
            model_mem_native / GIB,
            total_usable / GIB,
        );
        rec.explanation.tensor_parallel_degree = format!(
            "TP={tp}: model requires {:.1} GiB, each {} has {:.0} GiB.",
            model_mem_native / GIB,
            inst.accelerator_name,
            per_device_gib,
        );
    } else {
        // Does not fit natively: walk the quantization ladder.
        let mut alternatives = Alternatives::default();

        let ladder = [
            ("fp8", supports_fp8(&inst.accelerator_name)),
            ("int8", true),
            ("int4", true),
        ];
        let fitted = ladder.iter().copied().find(|(name, supported)| {
            *supported && model_memory_bytes(cfg.parameter_count, name) <= total_usable
        });

        if let Some((name, _)) = fitted {
            alternatives.quantization_option = Some(QuantizationOption {
                quantization: name.to_string(),
                estimated_mem_gib: model_memory_bytes(cfg.parameter_count, name) / GIB,
            });
        }

        // A larger GPU instance that fits the model at native precision.
        if let Some(alt) = all_instances.iter().find(|alt| {
            !is_neuron(&alt.accelerator_type)
                && alt.accelerator_memory_gib > inst.accelerator_memory_gib
                && model_mem_native
                    <= alt.accelerator_memory_gib as f64 * GIB * (1.0 - OVERHEAD_FRACTION)
        }) {
            alternatives.larger_instance = alt.name.clone();
        }

        match fitted {
            Some((name, _)) => {
                chosen_quant = name.to_string();
                rec.quantization = Some(chosen_quant.clone());
                let q_mem = model_memory_bytes(cfg.parameter_count, &chosen_quant);
                let min_devices_q = ((q_mem / usable_per_device).ceil() as i64).max(1);
                let tp = valid_tp_degree(
                    min_devices_q,
                    cfg.num_attention_heads,
                    cfg.num_key_value_heads,
                    inst.accelerator_count,
                );
                rec.tensor_parallel_degree = tp;
                rec.explanation.quantization = format!(
                    "Model requires {:.1} GiB in {dtype} but only {:.0} GiB available. \
                     Using {chosen_quant} quantization ({:.1} GiB).",
                    model_mem_native / GIB,
                    total_usable / GIB,
                    q_mem / GIB,
                );
                rec.explanation.tensor_parallel_degree = format!(
                    "TP={tp} with {chosen_quant} quantization: {:.1} GiB model across {} x {}.",
                    q_mem / GIB,
                    inst.accelerator_count,
                    inst.accelerator_name,
                );
                rec.alternatives = Some(alternatives);
            }
            None => {
                // Nothing fits on this instance.
                rec.explanation.feasible = false;
                rec.explanation.reason = format!(
                    "Model requires {:.1} GiB in {dtype}. Even INT4 ({:.1} GiB) exceeds \
                     {:.0} GiB available on {}.",
                    model_mem_native / GIB,
                    model_memory_bytes(cfg.parameter_count, "int4") / GIB,
                    total_usable / GIB,
                    inst.name,
                );
                rec.explanation.suggested_instance = alternatives.larger_instance.clone();
                rec.alternatives = Some(alternatives);
                return rec;
            }
        }
    }

    rec.explanation.feasible = true;

    // Max model length from the memory left over for KV cache.
    let kv_per_token = kv_cache_per_token_bytes(cfg);
    let effective_model_mem = model_memory_bytes(cfg.parameter_count, &chosen_quant);
    let remaining = (total_usable - effective_model_mem).max(0.0);

    let mut max_model_len = cfg.max_position_embeddings;
    if kv_per_token > 0.0 {
        max_model_len = max_model_len.min((remaining / kv_per_token) as i64);
    }
    max_model_len = round_down_context(max_model_len);
    rec.max_model_len = max_model_len;
    rec.explanation.max_model_len = format!(
        "{:.1} GiB available for KV cache after model weights. \
         Supports up to {max_model_len} tokens (capped by context window).",
        remaining / GIB,
    );

    // Shrink the sequence split when the context is tight.
    if max_model_len < rec.input_sequence_length + rec.output_sequence_length {
        rec.input_sequence_length = max_model_len * 2 / 3;
        rec.output_sequence_length = max_model_len / 3;
    }

    // Concurrency from KV memory per sequence.
    let avg_seq_len = (rec.input_sequence_length + rec.output_sequence_length) as f64;
    let mem_per_seq = kv_per_token * avg_seq_len;
    rec.concurrency = if mem_per_seq > 0.0 {
        ((remaining / mem_per_seq) as i64).clamp(1, MAX_CONCURRENCY)
    } else {
        1
    };
    rec.explanation.concurrency = format!(
        "Based on {:.1} GiB KV cache memory with {}-token average sequence length.",
        remaining / GIB,
        avg_seq_len as i64,
    );

    rec
}

/// The response returned for Neuron instances, where recommendations are
/// not yet supported.
pub fn neuron_unsupported() -> Recommendation {
    Recommendation {
        explanation: Explanation {
            feasible: false,
            reason: "Configuration suggestions are not yet available for Neuron instances."
                .to_string(),
            ..Explanation::default()
        },
        ..Recommendation::default()
    }
}
