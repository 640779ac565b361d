/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for in-cluster deployment; override
/// via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8080`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Namespace benchmark resources are created in.
    pub namespace: String,
    /// Image URI for the load-generator job.
    pub loadgen_image: String,
    /// Base URL of the HuggingFace Hub (overridable for tests).
    pub hf_base_url: String,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                              |
    /// |------------------------|--------------------------------------|
    /// | `HOST`                 | `0.0.0.0`                            |
    /// | `PORT`                 | `8080`                               |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`              |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                                 |
    /// | `BENCH_NAMESPACE`      | `accelbench`                         |
    /// | `LOADGEN_IMAGE`        | `ghcr.io/accelbench/loadgen:latest`  |
    /// | `HF_BASE_URL`          | `https://huggingface.co`             |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let namespace =
            std::env::var("BENCH_NAMESPACE").unwrap_or_else(|_| "accelbench".into());

        let loadgen_image = std::env::var("LOADGEN_IMAGE")
            .unwrap_or_else(|_| "ghcr.io/accelbench/loadgen:latest".into());

        let hf_base_url =
            std::env::var("HF_BASE_URL").unwrap_or_else(|_| "https://huggingface.co".into());

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            namespace,
            loadgen_image,
            hf_base_url,
        }
    }
}
