use std::net::SocketAddr;
use std::sync::Arc;

use accelbench_api::config::ServerConfig;
use accelbench_api::hf::HfClient;
use accelbench_api::router::build_app_router;
use accelbench_api::state::AppState;
use accelbench_cluster::KubeCluster;
use accelbench_orchestrator::{Orchestrator, OrchestratorConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "accelbench_api=debug,accelbench_orchestrator=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = accelbench_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    accelbench_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    accelbench_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Kubernetes client ---
    // In-cluster configuration when deployed; kubeconfig for local dev.
    let kube_client = kube::Client::try_default()
        .await
        .expect("Failed to create kubernetes client");
    let cluster = Arc::new(KubeCluster::new(kube_client, config.namespace.clone()));
    tracing::info!(namespace = %config.namespace, "Kubernetes client ready");

    // --- Orchestrator ---
    let orchestrator = Arc::new(Orchestrator::new(
        pool.clone(),
        cluster,
        OrchestratorConfig {
            namespace: config.namespace.clone(),
            loadgen_image: config.loadgen_image.clone(),
            ..OrchestratorConfig::default()
        },
    ));

    // --- App state ---
    let hf = Arc::new(HfClient::new(config.hf_base_url.clone()));
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        orchestrator,
        hf,
    };

    let app = build_app_router(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting AccelBench API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server shuts
/// down cleanly whether stopped interactively or by the cluster.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
