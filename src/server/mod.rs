//! HTTP surface: JSON API under `/api`, uploaded images under `/uploads`.

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};

pub mod handlers;

use crate::auth::CredentialTable;
use crate::classify::{Classifier, HttpClassifier};
use crate::config::{load_credentials, ServeArgs, ServerConfig};
use crate::db::Database;
use crate::error::AppError;
use crate::uploads::{ImageStore, UPLOADS_ROUTE};

pub struct AppState {
    pub db: Arc<Database>,
    pub credentials: CredentialTable,
    pub classifier: Arc<dyn Classifier>,
    pub images: ImageStore,
}

impl AppState {
    pub fn new(
        db: Database,
        credentials: CredentialTable,
        classifier: Arc<dyn Classifier>,
        images: ImageStore,
    ) -> Arc<Self> {
        Arc::new(AppState {
            db: Arc::new(db),
            credentials,
            classifier,
            images,
        })
    }

    /// Runs a store operation on the blocking pool.
    pub async fn with_db<T, F>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| AppError::Persistence(e.into()))?
            .map_err(AppError::Persistence)
    }
}

pub fn build_router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    let api = Router::new()
        .route("/login", post(handlers::login))
        .route(
            "/issues",
            get(handlers::list_issues).post(handlers::create_issue),
        )
        .route("/issues/by/{author}", get(handlers::list_issues_by_author))
        .route("/issues/{id}", get(handlers::get_issue))
        .route("/issues/{id}/vote", put(handlers::vote))
        .route("/issues/{id}/status", put(handlers::update_status));

    let mut app = Router::new()
        .nest("/api", api)
        .route("/health", get(handlers::health))
        .nest_service(UPLOADS_ROUTE, ServeDir::new(state.images.dir()));

    if let Some(client_dir) = &config.client_dir {
        app = app.fallback_service(ServeDir::new(client_dir));
    }

    app.layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(db: Database, args: &ServeArgs) -> Result<()> {
    let config = ServerConfig::from_args(args);
    let credentials = load_credentials(args)?;

    let classifier = HttpClassifier::new(&config.classifier_url, config.classifier_timeout)
        .context("Failed to build classification client")?;
    info!(endpoint = classifier.endpoint(), "Using classification service");

    let images = ImageStore::new(&config.uploads_dir, &config.public_url);
    images.ensure_dir().await?;

    let state = AppState::new(db, credentials, Arc::new(classifier), images);
    let app = build_router(state, &config);

    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    info!("Server running on {}", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
