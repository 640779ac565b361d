//! HuggingFace Hub metadata client for the recommender.
//!
//! Fetches a model's safetensors metadata and `config.json` concurrently
//! and folds them into a [`ModelConfig`]. Upstream auth failures keep their
//! status codes so handlers can forward them.

use std::time::Duration;

use accelbench_core::recommend::ModelConfig;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Request timeout for Hub calls.
const HF_TIMEOUT: Duration = Duration::from_secs(15);

/// An error from the HuggingFace API, carrying the status to surface.
#[derive(Debug, thiserror::Error)]
#[error("huggingface API {status}: {message}")]
pub struct HfError {
    pub status: u16,
    pub message: String,
}

/// Client for the HuggingFace Hub.
pub struct HfClient {
    client: reqwest::Client,
    base_url: String,
}

/// Subset of the `/api/models/{id}` response.
#[derive(Debug, Deserialize)]
struct HfModelResponse {
    safetensors: Option<HfSafetensors>,
    config: Option<HfModelConfigStub>,
    /// `false` for public models, `"auto"`/`"manual"` for gated ones.
    #[serde(default)]
    gated: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct HfSafetensors {
    #[serde(default)]
    total: i64,
}

#[derive(Debug, Deserialize)]
struct HfModelConfigStub {
    #[serde(default)]
    model_type: String,
}

/// Subset of a model's `config.json`.
#[derive(Debug, Default, Deserialize)]
struct HfConfigJson {
    #[serde(default)]
    hidden_size: i64,
    #[serde(default)]
    num_attention_heads: i64,
    #[serde(default)]
    num_key_value_heads: i64,
    #[serde(default)]
    num_hidden_layers: i64,
    #[serde(default)]
    max_position_embeddings: i64,
    #[serde(default)]
    torch_dtype: String,
    #[serde(default)]
    model_type: String,
    #[serde(default)]
    vocab_size: i64,
    #[serde(default)]
    intermediate_size: i64,

    // MoE fields (DeepSeek, Mixtral).
    #[serde(default)]
    n_routed_experts: i64,
    #[serde(default)]
    n_shared_experts: i64,
    #[serde(default)]
    moe_intermediate_size: i64,
    #[serde(default)]
    first_k_dense_replace: i64,
    #[serde(default)]
    num_local_experts: i64,
}

impl HfClient {
    /// Create a client against the given Hub base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(HF_TIMEOUT)
                .build()
                .expect("build HF client"),
            base_url: base_url.into(),
        }
    }

    /// Fetch and assemble model architecture metadata.
    ///
    /// Two concurrent requests: the model API (for the safetensors
    /// parameter count and gating info) and `config.json` (for the
    /// architecture fields).
    pub async fn fetch_model_config(
        &self,
        model_id: &str,
        hf_token: &str,
    ) -> Result<ModelConfig, HfError> {
        let model_url = format!(
            "{}/api/models/{}?expand[]=safetensors",
            self.base_url, model_id
        );
        let config_url = format!("{}/{}/resolve/main/config.json", self.base_url, model_id);

        let (model, config) = tokio::join!(
            self.get_json::<HfModelResponse>(&model_url, hf_token),
            self.get_json::<HfConfigJson>(&config_url, hf_token),
        );

        let model = model?;
        let config = match config {
            Ok(config) => config,
            Err(err) => {
                // If the model API succeeded and the model is gated, give a
                // clearer message than the raw config.json failure.
                if is_gated(&model.gated) {
                    return Err(HfError {
                        status: 403,
                        message: "This model is gated on HuggingFace. Provide an HF token \
                                  with access and try again."
                            .to_string(),
                    });
                }
                return Err(err);
            }
        };

        let mut parameter_count = model
            .safetensors
            .as_ref()
            .map(|s| s.total)
            .filter(|total| *total > 0)
            .unwrap_or(0);
        if parameter_count == 0 {
            // Safetensors metadata unavailable (common for MoE models);
            // estimate from the architecture config.
            parameter_count = estimate_parameter_count(&config);
        }

        let mut model_type = config.model_type.clone();
        if model_type.is_empty() {
            if let Some(stub) = &model.config {
                model_type = stub.model_type.clone();
            }
        }

        // Non-GQA models omit num_key_value_heads.
        let num_key_value_heads = if config.num_key_value_heads == 0 {
            config.num_attention_heads
        } else {
            config.num_key_value_heads
        };

        Ok(ModelConfig {
            parameter_count,
            hidden_size: config.hidden_size,
            num_attention_heads: config.num_attention_heads,
            num_key_value_heads,
            num_hidden_layers: config.num_hidden_layers,
            max_position_embeddings: config.max_position_embeddings,
            torch_dtype: config.torch_dtype,
            model_type,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, token: &str) -> Result<T, HfError> {
        let mut request = self.client.get(url);
        if !token.is_empty() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|err| HfError {
            status: 502,
            message: format!("request failed: {err}"),
        })?;

        match response.status().as_u16() {
            200 => response.json().await.map_err(|err| HfError {
                status: 502,
                message: format!("decode response: {err}"),
            }),
            status @ (401 | 403) => Err(HfError {
                status,
                message: "model is gated — provide an HF token with access".to_string(),
            }),
            404 => {
                let mut message = "Model not found on HuggingFace.".to_string();
                if token.is_empty() {
                    message.push_str(
                        " If this is a private or gated model, provide an HF token and try again.",
                    );
                }
                Err(HfError {
                    status: 404,
                    message,
                })
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                let mut message: String = body.chars().take(512).collect();
                if message.is_empty() {
                    message = "unexpected response".to_string();
                }
                Err(HfError { status, message })
            }
        }
    }
}

/// Whether the Hub's `gated` field marks the model as gated: `false` for
/// public models, a string like `"auto"` or `"manual"` otherwise.
fn is_gated(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(gated) => *gated,
        serde_json::Value::String(s) => !s.is_empty() && s != "false",
        _ => false,
    }
}

/// Estimate total parameters from architecture fields, used when
/// safetensors metadata is missing.
fn estimate_parameter_count(config: &HfConfigJson) -> i64 {
    if config.hidden_size == 0 || config.num_hidden_layers == 0 {
        return 0;
    }

    let h = config.hidden_size;
    let layers = config.num_hidden_layers;

    let mut total = 0i64;

    // Embeddings + LM head.
    if config.vocab_size > 0 {
        total += 2 * config.vocab_size * h;
    }

    // Per-layer attention: Q, K, V, O projections.
    let attn_per_layer = 4 * h * h;
    let norm_per_layer = 2 * h;

    // MoE expert count; DeepSeek and Mixtral use different field names.
    let num_experts = if config.n_routed_experts > 0 {
        config.n_routed_experts
    } else {
        config.num_local_experts
    };
    let moe_inter_size = if config.moe_intermediate_size > 0 {
        config.moe_intermediate_size
    } else {
        config.intermediate_size
    };

    if num_experts > 0 && moe_inter_size > 0 {
        // MoE model; the first k layers may be dense.
        let dense_layers = config.first_k_dense_replace.min(layers).max(0);
        let moe_layers = layers - dense_layers;

        let dense_ffn = 3 * h * config.intermediate_size;
        let routed_ffn = num_experts * 3 * h * moe_inter_size;
        let shared_ffn = config.n_shared_experts * 3 * h * config.intermediate_size;

        total += dense_layers * (attn_per_layer + dense_ffn + norm_per_layer);
        total += moe_layers * (attn_per_layer + routed_ffn + shared_ffn + norm_per_layer);
    } else if config.intermediate_size > 0 {
        // Dense model: gate + up + down projections.
        let ffn_per_layer = 3 * h * config.intermediate_size;
        total += layers * (attn_per_layer + ffn_per_layer + norm_per_layer);
    } else {
        // No intermediate_size; rough transformer estimate.
        total += layers * 12 * h * h;
    }

    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gated_field_variants() {
        assert!(is_gated(&serde_json::json!("auto")));
        assert!(is_gated(&serde_json::json!("manual")));
        assert!(is_gated(&serde_json::json!(true)));
        assert!(!is_gated(&serde_json::json!(false)));
        assert!(!is_gated(&serde_json::json!(null)));
        assert!(!is_gated(&serde_json::json!("")));
    }

    #[test]
    fn dense_estimate_is_in_the_right_ballpark() {
        // Llama-3.1-8B-like config should land near 8B parameters.
        let config = HfConfigJson {
            hidden_size: 4096,
            num_attention_heads: 32,
            num_key_value_heads: 8,
            num_hidden_layers: 32,
            vocab_size: 128_256,
            intermediate_size: 14_336,
            ..HfConfigJson::default()
        };
        let estimate = estimate_parameter_count(&config);
        assert!(estimate > 6_000_000_000, "estimate too low: {estimate}");
        assert!(estimate < 11_000_000_000, "estimate too high: {estimate}");
    }

    #[test]
    fn estimate_without_architecture_is_zero() {
        assert_eq!(estimate_parameter_count(&HfConfigJson::default()), 0);
    }

    #[test]
    fn moe_estimate_counts_experts() {
        let dense = HfConfigJson {
            hidden_size: 4096,
            num_hidden_layers: 32,
            intermediate_size: 14_336,
            ..HfConfigJson::default()
        };
        let moe = HfConfigJson {
            hidden_size: 4096,
            num_hidden_layers: 32,
            intermediate_size: 14_336,
            num_local_experts: 8,
            ..HfConfigJson::default()
        };
        assert!(estimate_parameter_count(&moe) > estimate_parameter_count(&dense));
    }
}
