use std::sync::Arc;

use axum::{routing::get, Json, Router};
use clap::Args;
use tracing::{debug, info};
use utoipa::OpenApi;

use faultline_ingest::handlers::{configure_routes, ApiDoc, AppState};
use faultline_ingest::service::IngestionService;
use faultline_ingest::worker::spawn_workers;
use faultline_queue::{DeadLetterStore, QueueService};

#[derive(Args)]
pub struct ServeCommand {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1:3000", env = "FAULTLINE_ADDRESS")]
    pub address: String,

    /// Database connection URL
    #[arg(long, env = "FAULTLINE_DATABASE_URL")]
    pub database_url: String,

    /// Number of background ingestion workers
    #[arg(long, default_value_t = 4, env = "FAULTLINE_INGEST_WORKERS")]
    pub workers: usize,

    /// Capacity of the ingestion queue
    #[arg(long, default_value_t = 1024, env = "FAULTLINE_QUEUE_CAPACITY")]
    pub queue_capacity: usize,
}

impl ServeCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.run())
    }

    async fn run(self) -> anyhow::Result<()> {
        debug!("Initializing database connection...");
        let db = faultline_database::establish_connection(&self.database_url).await?;

        let (queue, receiver) = QueueService::create_channel(self.queue_capacity);
        let service = Arc::new(IngestionService::new(db));
        let dead_letter = DeadLetterStore::new();

        let worker_handles = spawn_workers(
            self.workers,
            receiver,
            queue.clone(),
            service,
            dead_letter,
        );
        info!("Started {} ingestion workers", worker_handles.len());

        let state = Arc::new(AppState { queue });
        let app = Router::new()
            .route(
                "/api/openapi.json",
                get(|| async { Json(ApiDoc::openapi()) }),
            )
            .nest("/api", configure_routes().with_state(state));

        info!("Starting Faultline server on {}", self.address);
        let listener = tokio::net::TcpListener::bind(&self.address).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
