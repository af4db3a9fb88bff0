//! Persistence collaborators: the record [`Repository`] and the blob
//! [`ObjectStore`](objects::ObjectStore).
//!
//! Both are traits so the service layer can be tested against in-memory
//! doubles; the shipped implementations are [`SqliteRepository`] and
//! [`FsObjectStore`].

pub mod objects;
pub mod sqlite;

pub use objects::{FsObjectStore, ObjectReader, ObjectStore};
pub use sqlite::SqliteRepository;

use crate::vault::{Card, CardInput, Credential, CredentialInput, User};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// A uniqueness constraint was violated.
    #[error("record already exists")]
    AlreadyExists,
    #[error("record not found")]
    NotFound,
    #[error("invalid object name `{0}`")]
    InvalidName(String),
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => Self::NotFound,
            rusqlite::Error::SqliteFailure(e, _)
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                Self::AlreadyExists
            }
            other => Self::Backend(other.to_string()),
        }
    }
}

/// User, credential and card records. Every secret record is scoped to the
/// owning `user_id`; a record of another user behaves as absent.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<User, StorageError>;
    async fn find_user(&self, email: &str) -> Result<User, StorageError>;

    async fn create_credential(
        &self,
        user_id: &str,
        input: &CredentialInput,
    ) -> Result<Credential, StorageError>;
    async fn list_credentials(&self, user_id: &str) -> Result<Vec<Credential>, StorageError>;
    async fn update_credential(
        &self,
        user_id: &str,
        id: &str,
        input: &CredentialInput,
    ) -> Result<Credential, StorageError>;
    async fn delete_credential(&self, user_id: &str, id: &str) -> Result<(), StorageError>;

    async fn create_card(&self, user_id: &str, input: &CardInput) -> Result<Card, StorageError>;
    async fn list_cards(&self, user_id: &str) -> Result<Vec<Card>, StorageError>;
    async fn update_card(
        &self,
        user_id: &str,
        id: &str,
        input: &CardInput,
    ) -> Result<Card, StorageError>;
    async fn delete_card(&self, user_id: &str, id: &str) -> Result<(), StorageError>;
}
