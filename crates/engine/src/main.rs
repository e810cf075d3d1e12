//! Visual DM Engine - Main entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use visualdm_engine::infrastructure::{
    config::EngineConfig,
    ollama::OllamaClient,
    ports::LlmPort,
    resilient_llm::{ResilientLlmClient, RetryConfig},
    sqlite::SqliteRepositories,
};
use visualdm_engine::{api, App};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from repo root (the binary may run from `crates/engine`).
    load_dotenv_from_repo_root();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "visualdm_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Visual DM Engine");

    let config = EngineConfig::from_env();

    tracing::info!("Opening arc database at {}", config.database_path);
    let repos = SqliteRepositories::connect(&config.database_path).await?;

    let llm: Option<Arc<dyn LlmPort>> = if config.llm_enabled {
        let ollama_client = Arc::new(OllamaClient::new(
            &config.ollama_base_url,
            &config.ollama_model,
        ));
        let retry_config = RetryConfig {
            max_retries: config.llm_max_retries,
            ..Default::default()
        };
        tracing::info!(
            model = ollama_client.model(),
            max_retries = retry_config.max_retries,
            base_delay_ms = retry_config.base_delay_ms,
            "LLM client configured"
        );
        Some(Arc::new(ResilientLlmClient::new(ollama_client, retry_config)))
    } else {
        None
    };

    let app = Arc::new(App::with_defaults(repos, llm));

    let mut router = api::http::routes()
        .with_state(app)
        .layer(TraceLayer::new_for_http());

    if let Some(cors) = build_cors_layer(config.cors_allowed_origins.as_deref()) {
        router = router.layer(cors);
    }

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    // Prefer local overrides.
    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
}

fn build_cors_layer(allowed_origins: Option<&str>) -> Option<CorsLayer> {
    let allowed_origins = allowed_origins?;

    let mut cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    if allowed_origins == "*" {
        cors = cors.allow_origin(Any);
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| HeaderValue::from_str(s).ok())
            .collect();

        if origins.is_empty() {
            return None;
        }

        cors = cors.allow_origin(origins);
    }

    Some(cors)
}
