//! Request-boundary token checks for unary and streaming calls.
//!
//! Both interceptors run the same gate: one `authorization` header, a
//! `Bearer ` token, a valid signature and expiry, and non-empty user and
//! session ids. On success the caller's [`Identity`] is put into the request
//! extensions for the handler. Only unary `SignUp`/`SignIn` are exempt.

use super::status::Status;
use super::AppState;
use crate::auth::{Identity, TokenService};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

const MISSING_METADATA: &str = "couldn't extract metadata from req";
const MISSING_AUTHORIZATION: &str = "authorization not exists";
const INVALID_TOKEN: &str = "token empty or not valid";

/// Every callable method, addressed as `/rpc/<name>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcMethod {
    SignUp,
    SignIn,
    CreateCredentials,
    GetCredentials,
    UpdateCredentials,
    DeleteCredentials,
    CreateCard,
    GetCards,
    UpdateCard,
    DeleteCard,
    GetFiles,
    DeleteFile,
    SubscribeToChanges,
    UploadFile,
    DownloadFile,
}

impl RpcMethod {
    pub const ALL: [Self; 15] = [
        Self::SignUp,
        Self::SignIn,
        Self::CreateCredentials,
        Self::GetCredentials,
        Self::UpdateCredentials,
        Self::DeleteCredentials,
        Self::CreateCard,
        Self::GetCards,
        Self::UpdateCard,
        Self::DeleteCard,
        Self::GetFiles,
        Self::DeleteFile,
        Self::SubscribeToChanges,
        Self::UploadFile,
        Self::DownloadFile,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Self::SignUp => "/rpc/SignUp",
            Self::SignIn => "/rpc/SignIn",
            Self::CreateCredentials => "/rpc/CreateCredentials",
            Self::GetCredentials => "/rpc/GetCredentials",
            Self::UpdateCredentials => "/rpc/UpdateCredentials",
            Self::DeleteCredentials => "/rpc/DeleteCredentials",
            Self::CreateCard => "/rpc/CreateCard",
            Self::GetCards => "/rpc/GetCards",
            Self::UpdateCard => "/rpc/UpdateCard",
            Self::DeleteCard => "/rpc/DeleteCard",
            Self::GetFiles => "/rpc/GetFiles",
            Self::DeleteFile => "/rpc/DeleteFile",
            Self::SubscribeToChanges => "/rpc/SubscribeToChanges",
            Self::UploadFile => "/rpc/UploadFile",
            Self::DownloadFile => "/rpc/DownloadFile",
        }
    }

    pub fn name(self) -> &'static str {
        &self.path()["/rpc/".len()..]
    }

    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.path() == path)
    }

    /// Callable without a token. Applies to unary calls only.
    pub fn is_public(self) -> bool {
        matches!(self, Self::SignUp | Self::SignIn)
    }
}

/// Resolve the caller from request metadata. `None` means the call arrived
/// with no metadata at all.
fn identify(tokens: &TokenService, metadata: Option<&HeaderMap>) -> Result<Identity, Status> {
    let headers = metadata.ok_or_else(|| Status::internal(MISSING_METADATA))?;

    let mut values = headers.get_all(header::AUTHORIZATION).iter();
    let (Some(value), None) = (values.next(), values.next()) else {
        return Err(Status::unauthenticated(MISSING_AUTHORIZATION));
    };

    let token = value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Status::unauthenticated(INVALID_TOKEN))?;

    let claims = tokens.verify(token).map_err(|e| {
        tracing::debug!("Rejected bearer token: {e}");
        Status::unauthenticated(INVALID_TOKEN)
    })?;
    if claims.user_id.is_empty() || claims.session_id.is_empty() {
        tracing::debug!("Rejected bearer token without user or session id");
        return Err(Status::unauthenticated(INVALID_TOKEN));
    }

    Ok(claims.into())
}

/// Headers as call metadata: an entirely empty header map counts as absent.
fn metadata(headers: &HeaderMap) -> Option<&HeaderMap> {
    (!headers.is_empty()).then_some(headers)
}

/// Gate for unary calls.
#[derive(Debug, Clone)]
pub struct AuthInterceptor {
    tokens: Arc<TokenService>,
}

impl AuthInterceptor {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }

    /// `Ok(None)` for exempt methods, `Ok(Some(identity))` for verified callers.
    pub fn authorize(
        &self,
        method: Option<RpcMethod>,
        metadata: Option<&HeaderMap>,
    ) -> Result<Option<Identity>, Status> {
        if method.is_some_and(RpcMethod::is_public) {
            return Ok(None);
        }
        identify(&self.tokens, metadata).map(Some)
    }
}

/// Gate for streaming calls, checked once when the stream is established.
#[derive(Debug, Clone)]
pub struct StreamAuthInterceptor {
    tokens: Arc<TokenService>,
}

impl StreamAuthInterceptor {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }

    pub fn authorize(&self, metadata: Option<&HeaderMap>) -> Result<Identity, Status> {
        identify(&self.tokens, metadata)
    }
}

// ── axum middleware ─────────────────────────────────────────────

/// Unary middleware: `from_fn_with_state(state, unary_auth)`.
pub async fn unary_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let method = RpcMethod::from_path(req.uri().path());
    match state.auth.authorize(method, metadata(req.headers())) {
        Ok(Some(identity)) => {
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        Ok(None) => next.run(req).await,
        Err(status) => {
            tracing::debug!(
                method = method.map_or("unknown", RpcMethod::name),
                "Call rejected: {}",
                status.message()
            );
            status.into_response()
        }
    }
}

/// Streaming middleware: `from_fn_with_state(state, stream_auth)`.
pub async fn stream_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    match state.stream_auth.authorize(metadata(req.headers())) {
        Ok(identity) => {
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        Err(status) => {
            tracing::debug!(
                method = RpcMethod::from_path(req.uri().path()).map_or("unknown", RpcMethod::name),
                "Stream rejected: {}",
                status.message()
            );
            status.into_response()
        }
    }
}
