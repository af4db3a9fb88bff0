//! Business logic behind the secret RPCs.
//!
//! Every mutating handler follows the same shape: validate, call the
//! repository or object store, broadcast a [`ChangeEvent`] on success, and
//! turn failures into a caller-facing [`Status`].

use super::validation::{validate_card, validate_credential};
use super::{
    CardInput, CardList, CardSummary, CredentialInput, CredentialList, CredentialSummary,
    DeleteFileRequest, DeleteRequest, Empty, FileEntry, FileList, SignInRequest, SignUpRequest,
    TokenResponse, UpdateCardRequest, UpdateCredentialsRequest,
};
use crate::auth::{password, Identity, TokenService};
use crate::gateway::status::Status;
use crate::storage::{ObjectStore, Repository, StorageError};
use crate::sync::{ChangeEvent, ChangeNotifier, ResourceKind};
use std::sync::Arc;

const SIGN_IN_FAILED: &str = "User with such credentials can not be logined";
const EMAIL_TAKEN: &str = "User with such email already exists";
const CREDENTIALS_TAKEN: &str = "User already created credentials with such service name and identity";
const CARD_TAKEN: &str = "User already created card with such number";

/// Map a storage failure: conflicts get their own status, everything else
/// collapses to a generic per-operation message.
fn storage_status(err: &StorageError, operation: &'static str, conflict: Option<&'static str>) -> Status {
    match (err, conflict) {
        (StorageError::AlreadyExists, Some(message)) => Status::already_exists(message),
        _ => {
            tracing::warn!("{operation}: {err}");
            Status::invalid_argument(operation)
        }
    }
}

pub struct SecretService {
    repo: Arc<dyn Repository>,
    objects: Arc<dyn ObjectStore>,
    notifier: Arc<ChangeNotifier>,
    tokens: Arc<TokenService>,
}

impl SecretService {
    pub fn new(
        repo: Arc<dyn Repository>,
        objects: Arc<dyn ObjectStore>,
        notifier: Arc<ChangeNotifier>,
        tokens: Arc<TokenService>,
    ) -> Self {
        Self {
            repo,
            objects,
            notifier,
            tokens,
        }
    }

    async fn notify(&self, identity: &Identity, kind: ResourceKind, resource_id: &str) {
        let event = ChangeEvent::new(kind, resource_id, identity.session_id.as_str());
        let delivered = self
            .notifier
            .broadcast(&identity.user_id, &identity.session_id, &event)
            .await;
        tracing::debug!(
            user_id = identity.user_id.as_str(),
            kind = %kind,
            delivered,
            "Change broadcast"
        );
    }

    /// Mint a token for a brand new session of `user_id`.
    fn new_session_token(&self, user_id: &str) -> Result<TokenResponse, Status> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let token = self.tokens.issue(user_id, &session_id).map_err(|e| {
            tracing::error!("Token issue failed: {e}");
            Status::internal("Can not build auth token")
        })?;
        Ok(TokenResponse { token })
    }

    // ── Accounts ────────────────────────────────────────────────────

    pub async fn sign_up(&self, req: SignUpRequest) -> Result<TokenResponse, Status> {
        if req.email.trim().is_empty() || req.password.is_empty() {
            return Err(Status::invalid_argument("email and password are required"));
        }

        let hash = password::hash_password(&req.password);
        let user = match self.repo.create_user(&req.email, &hash).await {
            Ok(user) => user,
            Err(StorageError::AlreadyExists) => return Err(Status::invalid_argument(EMAIL_TAKEN)),
            Err(e) => {
                tracing::error!("User creation failed: {e}");
                return Err(Status::internal("User can not be created"));
            }
        };

        if let Err(e) = self.objects.create_namespace(&user.id).await {
            tracing::error!(user_id = user.id.as_str(), "File namespace creation failed: {e}");
            return Err(Status::internal("User storage can not be prepared"));
        }

        tracing::info!(user_id = user.id.as_str(), "User signed up");
        self.new_session_token(&user.id)
    }

    pub async fn sign_in(&self, req: SignInRequest) -> Result<TokenResponse, Status> {
        let user = match self.repo.find_user(&req.email).await {
            Ok(user) => user,
            Err(e) => {
                password::burn_verification(&req.password);
                tracing::debug!("Sign-in lookup failed: {e}");
                return Err(Status::unavailable(SIGN_IN_FAILED));
            }
        };
        if !password::verify_password(&req.password, &user.password_hash) {
            tracing::debug!(user_id = user.id.as_str(), "Sign-in password mismatch");
            return Err(Status::unavailable(SIGN_IN_FAILED));
        }

        tracing::info!(user_id = user.id.as_str(), "User signed in");
        self.new_session_token(&user.id)
    }

    // ── Credentials ─────────────────────────────────────────────────

    pub async fn create_credentials(
        &self,
        identity: &Identity,
        input: CredentialInput,
    ) -> Result<CredentialSummary, Status> {
        validate_credential(&input).map_err(|e| Status::invalid_argument(e.to_string()))?;

        let created = self
            .repo
            .create_credential(&identity.user_id, &input)
            .await
            .map_err(|e| storage_status(&e, "credentials can not be created", Some(CREDENTIALS_TAKEN)))?;

        self.notify(identity, ResourceKind::Credential, &created.id).await;
        Ok(CredentialSummary::from(&created))
    }

    pub async fn get_credentials(&self, identity: &Identity) -> Result<CredentialList, Status> {
        let credentials = self
            .repo
            .list_credentials(&identity.user_id)
            .await
            .map_err(|e| storage_status(&e, "credentials can not be retrieved", None))?;
        Ok(CredentialList { credentials })
    }

    pub async fn update_credentials(
        &self,
        identity: &Identity,
        req: UpdateCredentialsRequest,
    ) -> Result<CredentialSummary, Status> {
        validate_credential(&req.fields).map_err(|e| Status::invalid_argument(e.to_string()))?;

        let updated = self
            .repo
            .update_credential(&identity.user_id, &req.id, &req.fields)
            .await
            .map_err(|e| storage_status(&e, "credentials can not be updated", Some(CREDENTIALS_TAKEN)))?;

        self.notify(identity, ResourceKind::Credential, &updated.id).await;
        Ok(CredentialSummary::from(&updated))
    }

    pub async fn delete_credentials(
        &self,
        identity: &Identity,
        req: DeleteRequest,
    ) -> Result<Empty, Status> {
        self.repo
            .delete_credential(&identity.user_id, &req.id)
            .await
            .map_err(|e| storage_status(&e, "credentials can not be deleted", None))?;

        self.notify(identity, ResourceKind::Credential, &req.id).await;
        Ok(Empty {})
    }

    // ── Cards ───────────────────────────────────────────────────────

    pub async fn create_card(&self, identity: &Identity, input: CardInput) -> Result<CardSummary, Status> {
        let input = validate_card(&input).map_err(|e| Status::invalid_argument(e.to_string()))?;

        let created = self
            .repo
            .create_card(&identity.user_id, &input)
            .await
            .map_err(|e| storage_status(&e, "card can not be created", Some(CARD_TAKEN)))?;

        self.notify(identity, ResourceKind::Card, &created.id).await;
        Ok(CardSummary::from(&created))
    }

    pub async fn get_cards(&self, identity: &Identity) -> Result<CardList, Status> {
        let cards = self
            .repo
            .list_cards(&identity.user_id)
            .await
            .map_err(|e| storage_status(&e, "cards can not be retrieved", None))?;
        Ok(CardList { cards })
    }

    pub async fn update_card(
        &self,
        identity: &Identity,
        req: UpdateCardRequest,
    ) -> Result<CardSummary, Status> {
        let input = validate_card(&req.fields).map_err(|e| Status::invalid_argument(e.to_string()))?;

        let updated = self
            .repo
            .update_card(&identity.user_id, &req.id, &input)
            .await
            .map_err(|e| storage_status(&e, "card can not be updated", Some(CARD_TAKEN)))?;

        self.notify(identity, ResourceKind::Card, &updated.id).await;
        Ok(CardSummary::from(&updated))
    }

    pub async fn delete_card(&self, identity: &Identity, req: DeleteRequest) -> Result<Empty, Status> {
        self.repo
            .delete_card(&identity.user_id, &req.id)
            .await
            .map_err(|e| storage_status(&e, "card can not be deleted", None))?;

        self.notify(identity, ResourceKind::Card, &req.id).await;
        Ok(Empty {})
    }

    // ── Files ───────────────────────────────────────────────────────

    pub async fn get_files(&self, identity: &Identity) -> Result<FileList, Status> {
        let files = self
            .objects
            .list(&identity.user_id)
            .await
            .map_err(|e| storage_status(&e, "files can not be retrieved", None))?;
        Ok(FileList {
            files: files.iter().map(FileEntry::from).collect(),
        })
    }

    pub async fn delete_file(&self, identity: &Identity, req: DeleteFileRequest) -> Result<Empty, Status> {
        self.objects
            .delete(&identity.user_id, &req.name)
            .await
            .map_err(|e| storage_status(&e, "file can not be deleted", None))?;

        self.notify(identity, ResourceKind::File, &req.name).await;
        Ok(Empty {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TOKEN_TTL;
    use crate::gateway::status::Code;
    use crate::storage::{FsObjectStore, SqliteRepository};
    use crate::sync::ChannelSink;
    use bytes::Bytes;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    struct Fixture {
        _tmp: TempDir,
        service: SecretService,
        notifier: Arc<ChangeNotifier>,
        objects: Arc<FsObjectStore>,
        tokens: Arc<TokenService>,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let repo = Arc::new(SqliteRepository::open(&tmp.path().join("vault.db")).unwrap());
        let objects = Arc::new(FsObjectStore::new(tmp.path().join("objects")));
        let notifier = Arc::new(ChangeNotifier::new());
        let tokens = Arc::new(TokenService::new("service-secret", TOKEN_TTL).unwrap());
        let service = SecretService::new(
            repo,
            objects.clone(),
            Arc::clone(&notifier),
            Arc::clone(&tokens),
        );
        Fixture {
            _tmp: tmp,
            service,
            notifier,
            objects,
            tokens,
        }
    }

    impl Fixture {
        /// Sign up and return the identity of that first session.
        async fn user(&self, email: &str) -> Identity {
            let token = self
                .service
                .sign_up(SignUpRequest {
                    email: email.into(),
                    password: "pw".into(),
                })
                .await
                .unwrap()
                .token;
            self.tokens.verify(&token).unwrap().into()
        }

        fn watch(&self, identity: &Identity, session_id: &str) -> mpsc::Receiver<ChangeEvent> {
            let (sink, rx) = ChannelSink::channel(8);
            self.notifier
                .register(&identity.user_id, session_id, Arc::new(sink));
            rx
        }
    }

    fn credential(service: &str) -> CredentialInput {
        CredentialInput {
            service_name: service.into(),
            identity: "me@example.com".into(),
            password: "hunter2".into(),
        }
    }

    fn card() -> CardInput {
        CardInput {
            number: "4242 4242 4242 4242".into(),
            expiration_date: "01/23".into(),
            holder_name: "John Doe".into(),
            cvv: "737".into(),
        }
    }

    #[tokio::test]
    async fn sign_up_then_sign_in_issues_distinct_sessions() {
        let fx = fixture();
        let first = fx.user("a@example.com").await;

        let token = fx
            .service
            .sign_in(SignInRequest {
                email: "a@example.com".into(),
                password: "pw".into(),
            })
            .await
            .unwrap()
            .token;
        let second: Identity = fx.tokens.verify(&token).unwrap().into();

        assert_eq!(first.user_id, second.user_id);
        assert_ne!(first.session_id, second.session_id);
    }

    #[tokio::test]
    async fn sign_up_creates_file_namespace() {
        let fx = fixture();
        let me = fx.user("a@example.com").await;
        assert!(fx.objects.root().join(&me.user_id).is_dir());
    }

    #[tokio::test]
    async fn duplicate_sign_up_is_invalid_argument() {
        let fx = fixture();
        fx.user("a@example.com").await;
        let err = fx
            .service
            .sign_up(SignUpRequest {
                email: "a@example.com".into(),
                password: "other".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
        assert_eq!(err.message(), EMAIL_TAKEN);
    }

    #[tokio::test]
    async fn bad_sign_in_is_unavailable() {
        let fx = fixture();
        fx.user("a@example.com").await;

        for (email, password) in [("a@example.com", "wrong"), ("nobody@example.com", "pw")] {
            let err = fx
                .service
                .sign_in(SignInRequest {
                    email: email.into(),
                    password: password.into(),
                })
                .await
                .unwrap_err();
            assert_eq!(err.code(), Code::Unavailable);
            assert_eq!(err.message(), SIGN_IN_FAILED);
        }
    }

    #[tokio::test]
    async fn credential_mutations_notify_other_sessions() {
        let fx = fixture();
        let me = fx.user("a@example.com").await;
        let mut own = fx.watch(&me, &me.session_id);
        let mut peer = fx.watch(&me, "laptop");

        let created = fx.service.create_credentials(&me, credential("mail")).await.unwrap();
        assert_eq!(created.service_name, "mail");

        let event = peer.try_recv().unwrap();
        assert_eq!(event.kind, ResourceKind::Credential);
        assert_eq!(event.resource_id, created.id);
        assert!(own.try_recv().is_err());

        fx.service
            .update_credentials(
                &me,
                UpdateCredentialsRequest {
                    id: created.id.clone(),
                    fields: credential("mail-2"),
                },
            )
            .await
            .unwrap();
        fx.service
            .delete_credentials(&me, DeleteRequest { id: created.id.clone() })
            .await
            .unwrap();
        assert_eq!(peer.try_recv().unwrap().resource_id, created.id);
        assert_eq!(peer.try_recv().unwrap().resource_id, created.id);
    }

    #[tokio::test]
    async fn reads_and_failures_do_not_notify() {
        let fx = fixture();
        let me = fx.user("a@example.com").await;
        let mut peer = fx.watch(&me, "laptop");

        fx.service.get_credentials(&me).await.unwrap();
        fx.service.get_cards(&me).await.unwrap();
        fx.service.get_files(&me).await.unwrap();
        let _ = fx
            .service
            .delete_credentials(&me, DeleteRequest { id: "missing".into() })
            .await;
        let _ = fx.service.create_credentials(&me, credential("")).await;

        assert!(peer.try_recv().is_err());
    }

    #[tokio::test]
    async fn duplicate_credential_is_already_exists() {
        let fx = fixture();
        let me = fx.user("a@example.com").await;
        fx.service.create_credentials(&me, credential("mail")).await.unwrap();

        let err = fx
            .service
            .create_credentials(&me, credential("mail"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::AlreadyExists);
        assert_eq!(err.message(), CREDENTIALS_TAKEN);
    }

    #[tokio::test]
    async fn missing_record_is_generic_invalid_argument() {
        let fx = fixture();
        let me = fx.user("a@example.com").await;
        let err = fx
            .service
            .update_credentials(
                &me,
                UpdateCredentialsRequest {
                    id: "missing".into(),
                    fields: credential("mail"),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
        assert_eq!(err.message(), "credentials can not be updated");
    }

    #[tokio::test]
    async fn card_flow_reports_last_digits() {
        let fx = fixture();
        let me = fx.user("a@example.com").await;
        let mut peer = fx.watch(&me, "phone");

        let created = fx.service.create_card(&me, card()).await.unwrap();
        assert_eq!(created.last_digits, "4242");
        assert_eq!(peer.try_recv().unwrap().kind, ResourceKind::Card);

        let cards = fx.service.get_cards(&me).await.unwrap().cards;
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].number, "4242424242424242");

        let err = fx.service.create_card(&me, card()).await.unwrap_err();
        assert_eq!(err.code(), Code::AlreadyExists);

        fx.service
            .delete_card(&me, DeleteRequest { id: created.id })
            .await
            .unwrap();
        assert!(fx.service.get_cards(&me).await.unwrap().cards.is_empty());
    }

    #[tokio::test]
    async fn invalid_card_is_rejected_with_reason() {
        let fx = fixture();
        let me = fx.user("a@example.com").await;
        let mut bad = card();
        bad.cvv = "12345".into();

        let err = fx.service.create_card(&me, bad).await.unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
        assert_eq!(err.message(), "invalid CVV");
    }

    #[tokio::test]
    async fn files_list_and_delete() {
        let fx = fixture();
        let me = fx.user("a@example.com").await;
        fx.objects
            .put(&me.user_id, "report.pdf", Bytes::from(vec![0u8; 1536]))
            .await
            .unwrap();
        let mut peer = fx.watch(&me, "phone");

        let files = fx.service.get_files(&me).await.unwrap().files;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "report.pdf");
        assert_eq!(files[0].size, "1.5 KB");

        fx.service
            .delete_file(&me, DeleteFileRequest { name: "report.pdf".into() })
            .await
            .unwrap();
        let event = peer.try_recv().unwrap();
        assert_eq!(event.kind, ResourceKind::File);
        assert_eq!(event.resource_id, "report.pdf");

        let err = fx
            .service
            .delete_file(&me, DeleteFileRequest { name: "report.pdf".into() })
            .await
            .unwrap_err();
        assert_eq!(err.message(), "file can not be deleted");
    }
}
