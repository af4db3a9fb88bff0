//! Vault records and the request/response shapes of the secret RPCs.

pub mod service;
pub mod validation;

pub use service::SecretService;
pub use validation::ValidationError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Stored records ──────────────────────────────────────────────

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub email: String,
    /// `salt$digest`, see [`crate::auth::password`].
    pub password_hash: String,
}

/// A saved login for some external service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    pub service_name: String,
    pub identity: String,
    pub password: String,
    #[serde(with = "crate::util::rfc3339")]
    pub uploaded_at: DateTime<Utc>,
}

/// A saved payment card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub number: String,
    pub expiration_date: String,
    pub holder_name: String,
    pub cvv: String,
    #[serde(with = "crate::util::rfc3339")]
    pub uploaded_at: DateTime<Utc>,
}

impl Card {
    /// Final four digits of the card number.
    pub fn last_digits(&self) -> &str {
        let start = self.number.len().saturating_sub(4);
        self.number.get(start..).unwrap_or_default()
    }
}

/// A stored file object as listed by the object store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub name: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
}

// ── Requests ────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// Fields of a credential as written by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CredentialInput {
    pub service_name: String,
    pub identity: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateCredentialsRequest {
    pub id: String,
    #[serde(flatten)]
    pub fields: CredentialInput,
}

/// Fields of a card as written by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CardInput {
    pub number: String,
    pub expiration_date: String,
    pub holder_name: String,
    pub cvv: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateCardRequest {
    pub id: String,
    #[serde(flatten)]
    pub fields: CardInput,
}

/// Delete by id (credentials, cards).
#[derive(Debug, Clone, Deserialize)]
pub struct DeleteRequest {
    pub id: String,
}

/// Delete by object name (files).
#[derive(Debug, Clone, Deserialize)]
pub struct DeleteFileRequest {
    pub name: String,
}

// ── Responses ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CredentialSummary {
    pub id: String,
    pub service_name: String,
    #[serde(with = "crate::util::rfc3339")]
    pub uploaded_at: DateTime<Utc>,
}

impl From<&Credential> for CredentialSummary {
    fn from(credential: &Credential) -> Self {
        Self {
            id: credential.id.clone(),
            service_name: credential.service_name.clone(),
            uploaded_at: credential.uploaded_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CardSummary {
    pub id: String,
    pub last_digits: String,
    pub expiration_date: String,
    #[serde(with = "crate::util::rfc3339")]
    pub uploaded_at: DateTime<Utc>,
}

impl From<&Card> for CardSummary {
    fn from(card: &Card) -> Self {
        Self {
            id: card.id.clone(),
            last_digits: card.last_digits().to_owned(),
            expiration_date: card.expiration_date.clone(),
            uploaded_at: card.uploaded_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CredentialList {
    pub credentials: Vec<Credential>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CardList {
    pub cards: Vec<Card>,
}

/// One row of `GetFiles`; size is human readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub size: String,
    pub uploaded_at: String,
}

impl From<&FileMeta> for FileEntry {
    fn from(meta: &FileMeta) -> Self {
        Self {
            name: meta.name.clone(),
            size: crate::util::human_readable_size(meta.size),
            uploaded_at: crate::util::format_timestamp(meta.uploaded_at),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileList {
    pub files: Vec<FileEntry>,
}

/// Body of every `Delete*` response.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Empty {}
