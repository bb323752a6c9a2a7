//! Identity seam. The session core only ever asks for the current owner id;
//! the account operations exist for the host application.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use thiserror::Error;

use crate::db::User;

mod local;
pub mod validation;

pub use local::LocalAuth;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("{message}")]
    InvalidInput {
        field: &'static str,
        message: String,
    },
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("An account with this email already exists")]
    EmailTaken,
    #[error("No account found for this email")]
    UnknownAccount,
    #[error("This reset link is invalid or has expired")]
    InvalidResetToken,
    #[error("{0} is not supported by this identity provider")]
    Unsupported(&'static str),
    #[error("{0}")]
    Backend(String),
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        AuthError::Backend(format!("{err:#}"))
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Id of the signed-in owner, if anyone is signed in.
    fn current_owner_id(&self) -> Option<String>;

    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<User>;

    async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> AuthResult<User>;

    fn sign_out(&self);

    async fn send_password_reset(&self, email: &str) -> AuthResult<()>;
}

/// Identity handed in by an embedding host that manages accounts itself.
#[derive(Debug, Default)]
pub struct FixedIdentity {
    owner_id: RwLock<Option<String>>,
}

impl FixedIdentity {
    pub fn signed_in(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: RwLock::new(Some(owner_id.into())),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn set_owner(&self, owner_id: Option<String>) {
        *self.write() = owner_id;
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<String>> {
        self.owner_id.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<String>> {
        self.owner_id.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl IdentityProvider for FixedIdentity {
    fn current_owner_id(&self) -> Option<String> {
        self.read().clone()
    }

    async fn sign_in(&self, _email: &str, _password: &str) -> AuthResult<User> {
        Err(AuthError::Unsupported("sign in"))
    }

    async fn sign_up(&self, _email: &str, _password: &str, _display_name: &str) -> AuthResult<User> {
        Err(AuthError::Unsupported("sign up"))
    }

    fn sign_out(&self) {
        self.set_owner(None);
    }

    async fn send_password_reset(&self, _email: &str) -> AuthResult<()> {
        Err(AuthError::Unsupported("password reset"))
    }
}
