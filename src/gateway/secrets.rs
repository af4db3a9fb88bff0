//! Unary RPC handlers. Each one unpacks the request, hands it to
//! [`SecretService`](crate::vault::SecretService) and returns JSON.

use super::status::Status;
use super::AppState;
use crate::auth::Identity;
use crate::vault::{
    CardInput, CardList, CardSummary, CredentialInput, CredentialList, CredentialSummary,
    DeleteFileRequest, DeleteRequest, Empty, FileList, SignInRequest, SignUpRequest, TokenResponse,
    UpdateCardRequest, UpdateCredentialsRequest,
};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{Extension, Json};

type RpcResult<T> = Result<Json<T>, Status>;

/// Unwrap a JSON body, turning a rejection into `InvalidArgument`.
fn body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, Status> {
    body.map(|Json(inner)| inner).map_err(|e| {
        tracing::debug!("Rejected request body: {e}");
        Status::invalid_argument("request body is not valid")
    })
}

/// POST /rpc/SignUp
pub async fn sign_up(
    State(state): State<AppState>,
    req: Result<Json<SignUpRequest>, JsonRejection>,
) -> RpcResult<TokenResponse> {
    state.secrets.sign_up(body(req)?).await.map(Json)
}

/// POST /rpc/SignIn
pub async fn sign_in(
    State(state): State<AppState>,
    req: Result<Json<SignInRequest>, JsonRejection>,
) -> RpcResult<TokenResponse> {
    state.secrets.sign_in(body(req)?).await.map(Json)
}

// ── Credentials ─────────────────────────────────────────────────

/// POST /rpc/CreateCredentials
pub async fn create_credentials(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    req: Result<Json<CredentialInput>, JsonRejection>,
) -> RpcResult<CredentialSummary> {
    state
        .secrets
        .create_credentials(&identity, body(req)?)
        .await
        .map(Json)
}

/// POST /rpc/GetCredentials
pub async fn get_credentials(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> RpcResult<CredentialList> {
    state.secrets.get_credentials(&identity).await.map(Json)
}

/// POST /rpc/UpdateCredentials
pub async fn update_credentials(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    req: Result<Json<UpdateCredentialsRequest>, JsonRejection>,
) -> RpcResult<CredentialSummary> {
    state
        .secrets
        .update_credentials(&identity, body(req)?)
        .await
        .map(Json)
}

/// POST /rpc/DeleteCredentials
pub async fn delete_credentials(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    req: Result<Json<DeleteRequest>, JsonRejection>,
) -> RpcResult<Empty> {
    state
        .secrets
        .delete_credentials(&identity, body(req)?)
        .await
        .map(Json)
}

// ── Cards ───────────────────────────────────────────────────────

/// POST /rpc/CreateCard
pub async fn create_card(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    req: Result<Json<CardInput>, JsonRejection>,
) -> RpcResult<CardSummary> {
    state.secrets.create_card(&identity, body(req)?).await.map(Json)
}

/// POST /rpc/GetCards
pub async fn get_cards(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> RpcResult<CardList> {
    state.secrets.get_cards(&identity).await.map(Json)
}

/// POST /rpc/UpdateCard
pub async fn update_card(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    req: Result<Json<UpdateCardRequest>, JsonRejection>,
) -> RpcResult<CardSummary> {
    state.secrets.update_card(&identity, body(req)?).await.map(Json)
}

/// POST /rpc/DeleteCard
pub async fn delete_card(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    req: Result<Json<DeleteRequest>, JsonRejection>,
) -> RpcResult<Empty> {
    state.secrets.delete_card(&identity, body(req)?).await.map(Json)
}

// ── Files ───────────────────────────────────────────────────────

/// POST /rpc/GetFiles
pub async fn get_files(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> RpcResult<FileList> {
    state.secrets.get_files(&identity).await.map(Json)
}

/// POST /rpc/DeleteFile
pub async fn delete_file(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    req: Result<Json<DeleteFileRequest>, JsonRejection>,
) -> RpcResult<Empty> {
    state.secrets.delete_file(&identity, body(req)?).await.map(Json)
}
