use std::{net::SocketAddr, sync::Arc};

use notes_api::{
    app::{self, AppState},
    auth::GoogleTokenVerifier,
    config::{self, StoreBackend},
    rate_limit::RateLimits,
    repository::{MemoryNoteStore, NoteStore, PgNoteStore, ResilientStore},
    service::NoteService,
};

#[tokio::main]
async fn main() {
    // Log setup
    tracing_subscriber::fmt::init();

    let cfg = config::load_config().unwrap_or_else(|e| {
        tracing::error!("Failed to load config: {e}");
        panic!("failed to load config: {e}");
    });
    tracing::info!("Successfully loaded notes-api config");

    // Store creation and migration
    let policy = cfg.store.retry_policy();
    let store: Arc<dyn NoteStore> = match cfg.store.backend {
        StoreBackend::Postgres => {
            let dsn = cfg.store.pg_dsn.as_deref().unwrap_or_default();
            let mut repo = PgNoteStore::connect(dsn).await.unwrap_or_else(|e| {
                tracing::error!("Failed to establish database connection: {e}");
                panic!("failed to establish database connection: {e}");
            });

            repo.migrate().await.unwrap_or_else(|e| {
                tracing::error!("Failed to migrate database: {e}");
                panic!("failed to migrate database: {e}");
            });

            Arc::new(ResilientStore::new(repo, policy))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store, notes will not survive a restart");
            Arc::new(ResilientStore::new(MemoryNoteStore::new(), policy))
        }
    };

    // Service creation
    let identity = GoogleTokenVerifier::new(
        cfg.auth.google_client_id.clone(),
        cfg.auth.tokeninfo_url.clone(),
        cfg.auth.request_timeout,
    )
    .unwrap_or_else(|e| {
        tracing::error!("Failed to build token verifier: {e}");
        panic!("failed to build token verifier: {e}");
    });
    if cfg.auth.google_client_id.is_none() {
        tracing::warn!("GOOGLE_CLIENT_ID is not configured, bearer tokens will be refused");
    }

    let state = Arc::new(AppState::new(
        NoteService::new(store),
        Arc::new(identity),
        cfg.environment,
        RateLimits::new(cfg.rate_limit.clone()),
    ));
    let router = app::router(state, &cfg.allowed_origin);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cfg.port))
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to bind port {}: {e}", cfg.port);
            panic!("failed to bind port {}: {e}", cfg.port);
        });

    tracing::info!(
        "Notes API listening on {} (environment: {}, store: {:?})",
        cfg.port,
        cfg.environment,
        cfg.store.backend
    );

    let app = router.into_make_service_with_connect_info::<SocketAddr>();
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("HTTP server error: {e}");
        panic!("failed to start HTTP server: {e}");
    }

    tracing::info!("HTTP server closed");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, closing HTTP server");
}
