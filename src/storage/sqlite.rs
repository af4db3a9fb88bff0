//! SQLite-backed record store.
//!
//! Tables:
//! - `users`: id, email (unique, case-insensitive), password_hash, created_at
//! - `credentials`: unique per (user_id, service_name, identity)
//! - `cards`: unique per (user_id, number)

use super::{Repository, StorageError};
use crate::util::from_epoch_secs;
use crate::vault::{Card, CardInput, Credential, CredentialInput, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

pub struct SqliteRepository {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteRepository {
    /// Open (or create) the database at `db_path` and ensure the schema.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {}", parent.display()))?;
        }
        let conn = rusqlite::Connection::open(db_path)
            .with_context(|| format!("opening database {}", db_path.display()))?;

        // WAL mode for concurrent reads + crash safety
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;
        Self::migrate(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory database, used by tests.
    pub fn in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn migrate(conn: &rusqlite::Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS credentials (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                service_name TEXT NOT NULL,
                identity TEXT NOT NULL,
                password TEXT NOT NULL,
                uploaded_at INTEGER NOT NULL,
                UNIQUE (user_id, service_name, identity)
            );
            CREATE INDEX IF NOT EXISTS idx_credentials_user ON credentials(user_id);

            CREATE TABLE IF NOT EXISTS cards (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                number TEXT NOT NULL,
                expiration_date TEXT NOT NULL,
                holder_name TEXT NOT NULL,
                cvv TEXT NOT NULL,
                uploaded_at INTEGER NOT NULL,
                UNIQUE (user_id, number)
            );
            CREATE INDEX IF NOT EXISTS idx_cards_user ON cards(user_id);",
        )
        .context("creating schema")?;
        Ok(())
    }

    fn credential_by_id(
        conn: &rusqlite::Connection,
        user_id: &str,
        id: &str,
    ) -> Result<Credential, StorageError> {
        conn.query_row(
            "SELECT id, service_name, identity, password, uploaded_at
             FROM credentials WHERE user_id = ?1 AND id = ?2",
            rusqlite::params![user_id, id],
            credential_from_row,
        )
        .map_err(Into::into)
    }

    fn card_by_id(conn: &rusqlite::Connection, user_id: &str, id: &str) -> Result<Card, StorageError> {
        conn.query_row(
            "SELECT id, number, expiration_date, holder_name, cvv, uploaded_at
             FROM cards WHERE user_id = ?1 AND id = ?2",
            rusqlite::params![user_id, id],
            card_from_row,
        )
        .map_err(Into::into)
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    // ── Users ───────────────────────────────────────────────────────

    async fn create_user(&self, email: &str, password_hash: &str) -> Result<User, StorageError> {
        let id = uuid::Uuid::new_v4().to_string();
        let email = email.trim();

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (id, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id, email, password_hash, epoch_secs()],
        )?;

        Ok(User {
            id,
            email: email.to_owned(),
            password_hash: password_hash.to_owned(),
        })
    }

    async fn find_user(&self, email: &str) -> Result<User, StorageError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, email, password_hash FROM users WHERE email = ?1 COLLATE NOCASE",
            rusqlite::params![email.trim()],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    password_hash: row.get(2)?,
                })
            },
        )
        .map_err(Into::into)
    }

    // ── Credentials ─────────────────────────────────────────────────

    async fn create_credential(
        &self,
        user_id: &str,
        input: &CredentialInput,
    ) -> Result<Credential, StorageError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = epoch_secs();

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO credentials (id, user_id, service_name, identity, password, uploaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![id, user_id, input.service_name, input.identity, input.password, now],
        )?;

        Ok(Credential {
            id,
            service_name: input.service_name.clone(),
            identity: input.identity.clone(),
            password: input.password.clone(),
            uploaded_at: from_epoch_secs(now),
        })
    }

    async fn list_credentials(&self, user_id: &str) -> Result<Vec<Credential>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, service_name, identity, password, uploaded_at
             FROM credentials WHERE user_id = ?1 ORDER BY uploaded_at, rowid",
        )?;
        let credentials = stmt
            .query_map(rusqlite::params![user_id], credential_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(credentials)
    }

    async fn update_credential(
        &self,
        user_id: &str,
        id: &str,
        input: &CredentialInput,
    ) -> Result<Credential, StorageError> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE credentials SET service_name = ?1, identity = ?2, password = ?3
             WHERE user_id = ?4 AND id = ?5",
            rusqlite::params![input.service_name, input.identity, input.password, user_id, id],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound);
        }
        Self::credential_by_id(&conn, user_id, id)
    }

    async fn delete_credential(&self, user_id: &str, id: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM credentials WHERE user_id = ?1 AND id = ?2",
            rusqlite::params![user_id, id],
        )?;
        if deleted == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    // ── Cards ───────────────────────────────────────────────────────

    async fn create_card(&self, user_id: &str, input: &CardInput) -> Result<Card, StorageError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = epoch_secs();

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO cards (id, user_id, number, expiration_date, holder_name, cvv, uploaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                id,
                user_id,
                input.number,
                input.expiration_date,
                input.holder_name,
                input.cvv,
                now,
            ],
        )?;

        Ok(Card {
            id,
            number: input.number.clone(),
            expiration_date: input.expiration_date.clone(),
            holder_name: input.holder_name.clone(),
            cvv: input.cvv.clone(),
            uploaded_at: from_epoch_secs(now),
        })
    }

    async fn list_cards(&self, user_id: &str) -> Result<Vec<Card>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, number, expiration_date, holder_name, cvv, uploaded_at
             FROM cards WHERE user_id = ?1 ORDER BY uploaded_at, rowid",
        )?;
        let cards = stmt
            .query_map(rusqlite::params![user_id], card_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(cards)
    }

    async fn update_card(
        &self,
        user_id: &str,
        id: &str,
        input: &CardInput,
    ) -> Result<Card, StorageError> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE cards SET number = ?1, expiration_date = ?2, holder_name = ?3, cvv = ?4
             WHERE user_id = ?5 AND id = ?6",
            rusqlite::params![
                input.number,
                input.expiration_date,
                input.holder_name,
                input.cvv,
                user_id,
                id,
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound);
        }
        Self::card_by_id(&conn, user_id, id)
    }

    async fn delete_card(&self, user_id: &str, id: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM cards WHERE user_id = ?1 AND id = ?2",
            rusqlite::params![user_id, id],
        )?;
        if deleted == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}

// ── Row mapping ─────────────────────────────────────────────────────

fn credential_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Credential> {
    Ok(Credential {
        id: row.get(0)?,
        service_name: row.get(1)?,
        identity: row.get(2)?,
        password: row.get(3)?,
        uploaded_at: from_epoch_secs(row.get(4)?),
    })
}

fn card_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Card> {
    Ok(Card {
        id: row.get(0)?,
        number: row.get(1)?,
        expiration_date: row.get(2)?,
        holder_name: row.get(3)?,
        cvv: row.get(4)?,
        uploaded_at: from_epoch_secs(row.get(5)?),
    })
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_repo() -> (TempDir, SqliteRepository) {
        let tmp = TempDir::new().unwrap();
        let repo = SqliteRepository::open(&tmp.path().join("vault.db")).unwrap();
        (tmp, repo)
    }

    fn credential(service: &str, identity: &str) -> CredentialInput {
        CredentialInput {
            service_name: service.into(),
            identity: identity.into(),
            password: "pw".into(),
        }
    }

    fn card(number: &str) -> CardInput {
        CardInput {
            number: number.into(),
            expiration_date: "01/30".into(),
            holder_name: "John Doe".into(),
            cvv: "737".into(),
        }
    }

    #[tokio::test]
    async fn create_and_find_user() {
        let (_tmp, repo) = test_repo();
        let created = repo.create_user("a@example.com", "salt$hash").await.unwrap();
        let found = repo.find_user("A@Example.com").await.unwrap();

        assert_eq!(found.id, created.id);
        assert_eq!(found.password_hash, "salt$hash");
    }

    #[tokio::test]
    async fn duplicate_email_is_conflict() {
        let (_tmp, repo) = test_repo();
        repo.create_user("a@example.com", "h").await.unwrap();
        let err = repo.create_user("a@example.com", "h").await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists));
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let (_tmp, repo) = test_repo();
        assert!(matches!(
            repo.find_user("nobody@example.com").await,
            Err(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn credential_lifecycle() {
        let (_tmp, repo) = test_repo();
        let user = repo.create_user("a@example.com", "h").await.unwrap();

        let created = repo
            .create_credential(&user.id, &credential("mail", "me"))
            .await
            .unwrap();
        assert_eq!(repo.list_credentials(&user.id).await.unwrap(), vec![created.clone()]);

        let mut changed = credential("mail", "me");
        changed.password = "new".into();
        let updated = repo
            .update_credential(&user.id, &created.id, &changed)
            .await
            .unwrap();
        assert_eq!(updated.password, "new");
        assert_eq!(updated.uploaded_at, created.uploaded_at);

        repo.delete_credential(&user.id, &created.id).await.unwrap();
        assert!(repo.list_credentials(&user.id).await.unwrap().is_empty());
        assert!(matches!(
            repo.delete_credential(&user.id, &created.id).await,
            Err(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn duplicate_credential_is_conflict() {
        let (_tmp, repo) = test_repo();
        let user = repo.create_user("a@example.com", "h").await.unwrap();
        repo.create_credential(&user.id, &credential("mail", "me")).await.unwrap();

        let err = repo
            .create_credential(&user.id, &credential("mail", "me"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists));

        // Same service with another identity is fine.
        repo.create_credential(&user.id, &credential("mail", "work")).await.unwrap();
    }

    #[tokio::test]
    async fn records_are_scoped_per_user() {
        let (_tmp, repo) = test_repo();
        let alice = repo.create_user("alice@example.com", "h").await.unwrap();
        let bob = repo.create_user("bob@example.com", "h").await.unwrap();

        let secret = repo
            .create_credential(&alice.id, &credential("mail", "alice"))
            .await
            .unwrap();

        assert!(repo.list_credentials(&bob.id).await.unwrap().is_empty());
        assert!(matches!(
            repo.update_credential(&bob.id, &secret.id, &credential("x", "y")).await,
            Err(StorageError::NotFound)
        ));
        assert!(matches!(
            repo.delete_credential(&bob.id, &secret.id).await,
            Err(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn card_lifecycle() {
        let (_tmp, repo) = test_repo();
        let user = repo.create_user("a@example.com", "h").await.unwrap();

        let created = repo.create_card(&user.id, &card("4242424242424242")).await.unwrap();
        assert!(matches!(
            repo.create_card(&user.id, &card("4242424242424242")).await,
            Err(StorageError::AlreadyExists)
        ));

        let mut changed = card("4242424242424242");
        changed.cvv = "123".into();
        let updated = repo.update_card(&user.id, &created.id, &changed).await.unwrap();
        assert_eq!(updated.cvv, "123");

        assert_eq!(repo.list_cards(&user.id).await.unwrap().len(), 1);
        repo.delete_card(&user.id, &created.id).await.unwrap();
        assert!(repo.list_cards(&user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn record_for_unknown_user_is_backend_error() {
        let repo = SqliteRepository::in_memory().unwrap();
        let err = repo
            .create_credential("ghost", &credential("mail", "me"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Backend(_)));
    }

    #[tokio::test]
    async fn schema_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("vault.db");
        {
            let repo = SqliteRepository::open(&path).unwrap();
            repo.create_user("a@example.com", "h").await.unwrap();
        }
        let repo = SqliteRepository::open(&path).unwrap();
        assert!(repo.find_user("a@example.com").await.is_ok());
    }
}
