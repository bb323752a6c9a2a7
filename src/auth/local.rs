use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::db::{helpers::to_hex, Database, User};

use super::{
    validation::{validate_display_name, validate_email, validate_password},
    AuthError, AuthResult, IdentityProvider,
};

// Set to false to silence this module.
const ENABLE_LOGS: bool = true;

use crate::log_info;

const RESET_TOKEN_BYTES: usize = 32;
const RESET_TOKEN_TTL_HOURS: i64 = 1;

/// Email/password accounts stored in the local database.
pub struct LocalAuth {
    db: Database,
    current: RwLock<Option<User>>,
}

impl LocalAuth {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            current: RwLock::new(None),
        }
    }

    pub fn current_user(&self) -> Option<User> {
        self.read().clone()
    }

    /// Creates a reset token for `email` and returns it in the clear for
    /// delivery. Only its SHA-256 digest is stored.
    pub async fn issue_password_reset(&self, email: &str) -> AuthResult<String> {
        validate_email(email)?;
        let credentials = self
            .db
            .find_user_by_email(email.trim())
            .await?
            .ok_or(AuthError::UnknownAccount)?;

        let purged = self.db.delete_expired_password_resets(Utc::now()).await?;
        if purged > 0 {
            log_info!("Purged {purged} expired password resets");
        }

        let mut raw = [0u8; RESET_TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut raw);
        let token = to_hex(&raw);

        let expires_at = Utc::now() + Duration::hours(RESET_TOKEN_TTL_HOURS);
        self.db
            .insert_password_reset(
                &Uuid::new_v4().to_string(),
                &credentials.user.uid,
                &hash_token(&token),
                expires_at,
            )
            .await?;

        Ok(token)
    }

    /// Redeems a reset token issued by [`issue_password_reset`](Self::issue_password_reset)
    /// and replaces the account password. A token works once and only until
    /// it expires. The current sign-in state is left alone.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> AuthResult<()> {
        validate_password(new_password)?;

        let token_hash = hash_token(token.trim());
        let (uid, expires_at) = self
            .db
            .find_password_reset(&token_hash)
            .await?
            .ok_or(AuthError::InvalidResetToken)?;

        if expires_at <= Utc::now() {
            self.db.delete_password_reset(&token_hash).await?;
            return Err(AuthError::InvalidResetToken);
        }

        let password_hash = hash_password(new_password)?;
        self.db.complete_password_reset(&uid, &password_hash).await?;
        log_info!("Password reset completed for {uid}");
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<User>> {
        self.current.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<User>> {
        self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn hash_password(password: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AuthError::Backend(format!("Password hashing failed: {err}")))
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    to_hex(&hasher.finalize())
}

#[async_trait]
impl IdentityProvider for LocalAuth {
    fn current_owner_id(&self) -> Option<String> {
        self.read().as_ref().map(|user| user.uid.clone())
    }

    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<User> {
        validate_email(email)?;
        if password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let credentials = self
            .db
            .find_user_by_email(email.trim())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let parsed_hash = PasswordHash::new(&credentials.password_hash)
            .map_err(|err| AuthError::Backend(format!("Password hash parse error: {err}")))?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| AuthError::InvalidCredentials)?;

        log_info!("User {} signed in", credentials.user.uid);
        *self.write() = Some(credentials.user.clone());
        Ok(credentials.user)
    }

    async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> AuthResult<User> {
        validate_display_name(display_name)?;
        validate_email(email)?;
        validate_password(password)?;

        let email = email.trim();
        if self.db.find_user_by_email(email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = hash_password(password)?;

        let user = User {
            uid: Uuid::new_v4().to_string(),
            email: email.to_string(),
            display_name: Some(display_name.trim().to_string()),
        };
        self.db.insert_user(&user, &password_hash).await?;

        log_info!("User {} registered", user.uid);
        *self.write() = Some(user.clone());
        Ok(user)
    }

    fn sign_out(&self) {
        if let Some(user) = self.write().take() {
            log_info!("User {} signed out", user.uid);
        }
    }

    async fn send_password_reset(&self, email: &str) -> AuthResult<()> {
        self.issue_password_reset(email).await?;
        log_info!("Password reset issued for {}", email.trim());
        Ok(())
    }
}
