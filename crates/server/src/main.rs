use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tracing::info;

use bioflow_algorithms::AlgorithmRegistry;
use bioflow_core::config::EngineConfig;
use bioflow_engine::{MemoryScenarioCatalog, Orchestrator, TokioWorkerPool};
use bioflow_layers::{
    JobRecordStore, LayerStore, MemoryJobRecordStore, MemoryLayerStore, PgJobRecordStore,
    PgLayerStore,
};

use bioflow_server::state::AppState;
use bioflow_server::{db, sources};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    bioflow_core::config::load_dotenv();
    let config = bioflow_core::Config::from_env();
    config.log_summary();

    let pg_pool = db::init_pg_pool(&config.postgres).await;

    let (layers, jobs): (Arc<dyn LayerStore>, Arc<dyn JobRecordStore>) = match &pg_pool {
        Some(pool) => (
            Arc::new(PgLayerStore::new(pool.clone())),
            Arc::new(PgJobRecordStore::new(pool.clone())),
        ),
        None => (
            Arc::new(MemoryLayerStore::new()),
            Arc::new(MemoryJobRecordStore::new()),
        ),
    };

    let registry = Arc::new(AlgorithmRegistry::builtin());
    let source_registry = Arc::new(sources::build_sources(pg_pool.as_ref()));
    let catalog = Arc::new(MemoryScenarioCatalog::new());

    let pool = Arc::new(TokioWorkerPool::new(
        registry.clone(),
        source_registry,
        catalog.clone(),
        layers.clone(),
    ));

    let engine_config: EngineConfig = config.engine.clone();
    let orchestrator = Arc::new(Orchestrator::new(
        catalog.clone(),
        registry,
        pool,
        layers,
        jobs,
        engine_config,
    ));

    let state = Arc::new(AppState {
        catalog,
        orchestrator,
    });

    let app = bioflow_server::router(state).layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://localhost:{}", config.server.port);
    axum::serve(listener, app).await?;

    Ok(())
}
