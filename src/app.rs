//! Wiring of storage, background workers and routers into one application

use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::create_api_router;
use crate::auth::AuthService;
use crate::config::{Config, DatabaseBackend, DatabaseConfig};
use crate::redirect::{create_redirect_router, RedirectState};
use crate::service::{LinkService, ServiceError};
use crate::storage::{CachedStorage, PostgresStorage, SqliteStorage, Storage};
use crate::sweeper::Sweeper;
use crate::visits::VisitRecorder;

/// Connect to the configured backend and create the schema.
pub async fn open_storage(config: &DatabaseConfig) -> Result<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match config.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.url);
            Arc::new(SqliteStorage::new(&config.url, config.max_connections).await?)
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL storage");
            Arc::new(PostgresStorage::new(&config.url, config.max_connections).await?)
        }
    };

    storage.init().await?;
    info!("Database initialized successfully");
    Ok(storage)
}

pub struct App {
    pub router: Router,
    pub service: Arc<LinkService>,
    pub sweeper: Arc<Sweeper>,
    pub storage: Arc<dyn Storage>,
    recorder: Arc<VisitRecorder>,
    recorder_task: JoinHandle<()>,
}

impl App {
    /// Assemble the application on top of an initialised store. Must run
    /// inside a tokio runtime: the visit recorder is spawned here.
    pub fn build(config: &Config, storage: Arc<dyn Storage>) -> Result<Self> {
        let storage: Arc<dyn Storage> = Arc::new(CachedStorage::new(
            storage,
            config.cache.max_entries,
            config.cache.ttl_secs,
        ));

        let (recorder, recorder_task) = VisitRecorder::spawn(Arc::clone(&storage), &config.visits);
        let recorder = Arc::new(recorder);
        let sweeper = Arc::new(Sweeper::new(Arc::clone(&storage), config.sweeper.clone()));

        let service = Arc::new(
            LinkService::new(
                config,
                Arc::clone(&storage),
                Arc::clone(&recorder),
                Arc::clone(&sweeper),
            )
            .map_err(|e: ServiceError| anyhow::anyhow!("invalid service configuration: {e}"))?,
        );

        let auth_service = Arc::new(AuthService::new(&config.auth));
        let redirect_state = Arc::new(RedirectState {
            service: Arc::clone(&service),
            visits: config.visits.clone(),
            status: config.redirect_status.status_code(),
        });

        let router = Router::new()
            .nest("/api", create_api_router(Arc::clone(&service), auth_service))
            .merge(create_redirect_router(redirect_state))
            .layer(TraceLayer::new_for_http());

        Ok(Self {
            router,
            service,
            sweeper,
            storage,
            recorder,
            recorder_task,
        })
    }

    pub fn recorder(&self) -> &Arc<VisitRecorder> {
        &self.recorder
    }

    /// Flush pending visits and stop the recorder.
    pub async fn shutdown(self) {
        self.recorder.shutdown().await;
        if let Err(e) = self.recorder_task.await {
            tracing::error!("Visit recorder task failed: {e}");
        }
        let stats = self.recorder.stats();
        info!(
            persisted = stats.persisted,
            dropped = stats.dropped,
            failed = stats.failed,
            "Visit recorder stopped"
        );
    }
}
