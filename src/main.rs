use anyhow::Context;
use sponge::api::{self, app_state::AppState};
use sponge::config::loader::ConfigLoader;
use sponge::index::create_embedding_model;
use sponge::llm::create_language_model;
use sponge::observability::{PipelineMetrics, init_tracing};
use sponge::services::{SessionLocks, TurnOrchestrator, create_nugget_service};
use sponge::storage::{StorageFactory, factory::check_backend};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::load().context("failed to load configuration")?;
    ConfigLoader::validate(&config).context("invalid configuration")?;
    check_backend(&config.database)?;

    let _log_guard = init_tracing(&config.logging);
    info!(
        "Starting {} ({} environment)...",
        config.app_name, config.environment
    );

    let store = StorageFactory::create(&config.database).await?;
    info!("Graph store initialized ({:?})", config.database.backend);

    let embedding = create_embedding_model(&config.embedding)?;
    info!(
        "Embedding model initialized: {} (backend: {})",
        config.embedding.model_name, config.embedding.backend
    );

    let llm = create_language_model(&config.llm)?;
    info!(
        "Language model initialized: {} (provider: {})",
        config.llm.model, config.llm.provider
    );

    let locks = SessionLocks::new();
    let metrics = Arc::new(PipelineMetrics::default());
    let orchestrator = TurnOrchestrator::new(
        store.clone(),
        llm,
        embedding,
        config.pipeline.clone(),
        locks.clone(),
        metrics,
    );
    let nugget_service = create_nugget_service(store, locks);
    let app_state = AppState::new(orchestrator, nugget_service);
    info!("Application state created");

    let router = api::initialize_api(app_state).await?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, router).await?;

    Ok(())
}
