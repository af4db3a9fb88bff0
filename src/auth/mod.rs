//! Authentication primitives.
//!
//! - [`token`]: stateless HS256 session tokens (`UserID`, `SessionID`, `exp`)
//! - [`password`]: salted, iterated SHA-256 password hashes
//!
//! ## Design Decisions
//! - Tokens are self-contained; there is no server-side session table and no
//!   revocation before expiry.
//! - Every sign-in mints a fresh session id, so two clients of the same user
//!   are always distinguishable for change notifications.

pub mod password;
pub mod token;

pub use token::{SessionClaims, TokenError, TokenService, TOKEN_TTL};

/// Verified caller identity, attached to a request once its token checks out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub session_id: String,
}

impl From<SessionClaims> for Identity {
    fn from(claims: SessionClaims) -> Self {
        Self {
            user_id: claims.user_id,
            session_id: claims.session_id,
        }
    }
}
