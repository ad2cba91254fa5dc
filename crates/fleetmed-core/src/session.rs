//! Consumed collaborator contract for operator sessions.
//!
//! Login, password storage, and cookie plumbing live outside the core.
//! The core receives an already-authenticated [`Principal`] and trusts
//! it; the trait below is the seam the external session subsystem
//! implements.

use serde::{Deserialize, Serialize};

use crate::policy::Role;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// An authenticated caller of the query service. Used only as input to
/// policy decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
}

/// Opaque operator credentials as presented at the transport layer.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credentials(..)")
    }
}

/// `AuthenticateUser(credentials) -> (UserID, Role)`, supplied by the
/// excluded login subsystem. `None` means the caller is not
/// authenticated; the core does not distinguish why.
pub trait UserAuthenticator: Send + Sync {
    fn authenticate_user(&self, credentials: &Credentials) -> Option<Principal>;
}
