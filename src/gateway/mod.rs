//! HTTP gateway for the vault RPC surface.
//!
//! Unary calls are `POST /rpc/<Method>` with JSON bodies. The three
//! streaming calls get their own sub-router with the stream interceptor and
//! without the unary body limit and timeout. With `[gateway.tls]` enabled
//! the same router is served over HTTPS.

pub mod files;
pub mod interceptor;
pub mod secrets;
pub mod status;
pub mod subscribe;
pub mod tls;

use crate::auth::TokenService;
use crate::config::Config;
use crate::storage::{FsObjectStore, ObjectStore, Repository, SqliteRepository};
use crate::sync::ChangeNotifier;
use crate::transfer::FileTransferService;
use crate::vault::SecretService;
use anyhow::{Context, Result};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use interceptor::{AuthInterceptor, RpcMethod, StreamAuthInterceptor};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Maximum request body size for unary calls (64KB).
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout for unary calls (30s).
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthInterceptor,
    pub stream_auth: StreamAuthInterceptor,
    pub notifier: Arc<ChangeNotifier>,
    pub secrets: Arc<SecretService>,
    pub files: Arc<FileTransferService>,
    /// Cancelled once at shutdown; ends every open subscription.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        tokens: Arc<TokenService>,
        repo: Arc<dyn Repository>,
        objects: Arc<dyn ObjectStore>,
    ) -> Self {
        let notifier = Arc::new(ChangeNotifier::new());
        Self {
            auth: AuthInterceptor::new(Arc::clone(&tokens)),
            stream_auth: StreamAuthInterceptor::new(Arc::clone(&tokens)),
            secrets: Arc::new(SecretService::new(
                repo,
                Arc::clone(&objects),
                Arc::clone(&notifier),
                tokens,
            )),
            files: Arc::new(FileTransferService::new(objects, Arc::clone(&notifier))),
            notifier,
            shutdown: CancellationToken::new(),
        }
    }
}

/// Build the full route table.
pub fn router(state: AppState) -> Router {
    let unary = Router::new()
        .route(RpcMethod::SignUp.path(), post(secrets::sign_up))
        .route(RpcMethod::SignIn.path(), post(secrets::sign_in))
        .route(RpcMethod::CreateCredentials.path(), post(secrets::create_credentials))
        .route(RpcMethod::GetCredentials.path(), post(secrets::get_credentials))
        .route(RpcMethod::UpdateCredentials.path(), post(secrets::update_credentials))
        .route(RpcMethod::DeleteCredentials.path(), post(secrets::delete_credentials))
        .route(RpcMethod::CreateCard.path(), post(secrets::create_card))
        .route(RpcMethod::GetCards.path(), post(secrets::get_cards))
        .route(RpcMethod::UpdateCard.path(), post(secrets::update_card))
        .route(RpcMethod::DeleteCard.path(), post(secrets::delete_card))
        .route(RpcMethod::GetFiles.path(), post(secrets::get_files))
        .route(RpcMethod::DeleteFile.path(), post(secrets::delete_file))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            interceptor::unary_auth,
        ))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ));

    let streaming = Router::new()
        .route(RpcMethod::SubscribeToChanges.path(), get(subscribe::subscribe))
        .route(
            RpcMethod::UploadFile.path(),
            post(files::upload_file).layer(DefaultBodyLimit::disable()),
        )
        .route(RpcMethod::DownloadFile.path(), get(files::download_file))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            interceptor::stream_auth,
        ));

    Router::new()
        .route("/health", get(handle_health))
        .merge(unary)
        .merge(streaming)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// GET /health: always public.
async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "shutting_down": state.shutdown.is_cancelled(),
    }))
}

/// Run the HTTP gateway until Ctrl-C / SIGTERM.
pub async fn run_gateway(host: &str, port: u16, config: Config) -> Result<()> {
    let tokens = Arc::new(
        TokenService::new(
            &config.auth.secret,
            Duration::from_secs(config.auth.token_ttl_secs),
        )
        .context("building token service")?,
    );
    let repo: Arc<dyn Repository> = Arc::new(
        SqliteRepository::open(&config.storage.database_path).context("opening vault database")?,
    );
    tokio::fs::create_dir_all(&config.storage.objects_dir)
        .await
        .with_context(|| format!("creating {}", config.storage.objects_dir.display()))?;
    let objects: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(&config.storage.objects_dir));

    let tls = match config.gateway.tls.paths() {
        Some((cert, key)) => Some(tls::load_server_config(cert, key).context("loading TLS config")?),
        None => None,
    };
    tracing::info!(token_ttl_secs = tokens.ttl().as_secs(), "Session tokens configured");

    let state = AppState::new(tokens, repo, objects);
    let shutdown = state.shutdown.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("binding {host}:{port}"))?;
    let addr = listener.local_addr()?;

    match tls {
        Some(tls) => {
            tracing::info!("vaultkeep gateway listening on https://{addr}");
            let listener = tls::TlsListener::new(listener, tls, shutdown.clone())?;
            axum::serve(listener, app)
                .with_graceful_shutdown(graceful(shutdown))
                .await?;
        }
        None => {
            if !addr.ip().is_loopback() {
                tracing::warn!("Serving plain HTTP on {addr}; enable [gateway.tls] for remote clients");
            }
            tracing::info!("vaultkeep gateway listening on http://{addr}");
            axum::serve(listener, app)
                .with_graceful_shutdown(graceful(shutdown))
                .await?;
        }
    }

    tracing::info!("vaultkeep gateway stopped");
    Ok(())
}

/// Resolves on Ctrl-C / SIGTERM after cancelling every open subscription.
async fn graceful(shutdown: CancellationToken) {
    shutdown_signal().await;
    tracing::info!("Shutdown requested, closing subscriptions");
    shutdown.cancel();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Ctrl-C handler unavailable: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
