use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{connection::Database, helpers::parse_datetime, models::User};

/// A user row together with its stored Argon2 hash.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

fn row_to_credentials(row: &Row) -> rusqlite::Result<UserCredentials> {
    Ok(UserCredentials {
        user: User {
            uid: row.get("uid")?,
            email: row.get("email")?,
            display_name: row.get("display_name")?,
        },
        password_hash: row.get("password_hash")?,
    })
}

impl Database {
    pub async fn insert_user(&self, user: &User, password_hash: &str) -> Result<()> {
        let user = user.clone();
        let password_hash = password_hash.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO users (uid, email, display_name, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    user.uid,
                    user.email,
                    user.display_name,
                    password_hash,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<UserCredentials>> {
        let email = email.to_string();
        self.execute(move |conn| {
            let credentials = conn
                .query_row(
                    "SELECT uid, email, display_name, password_hash FROM users WHERE email = ?1",
                    params![email],
                    row_to_credentials,
                )
                .optional()?;
            Ok(credentials)
        })
        .await
    }

    pub async fn insert_password_reset(
        &self,
        id: &str,
        uid: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let (id, uid, token_hash) = (id.to_string(), uid.to_string(), token_hash.to_string());
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO password_resets (id, uid, token_hash, expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id,
                    uid,
                    token_hash,
                    expires_at.to_rfc3339(),
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Owner and expiry of the reset stored under `token_hash`.
    pub async fn find_password_reset(
        &self,
        token_hash: &str,
    ) -> Result<Option<(String, DateTime<Utc>)>> {
        let token_hash = token_hash.to_string();
        self.execute(move |conn| {
            let row = conn
                .query_row(
                    "SELECT uid, expires_at FROM password_resets WHERE token_hash = ?1",
                    params![token_hash],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()?;
            match row {
                Some((uid, expires_at)) => {
                    Ok(Some((uid, parse_datetime(&expires_at, "expires_at")?)))
                }
                None => Ok(None),
            }
        })
        .await
    }

    pub async fn delete_password_reset(&self, token_hash: &str) -> Result<()> {
        let token_hash = token_hash.to_string();
        self.execute(move |conn| {
            conn.execute(
                "DELETE FROM password_resets WHERE token_hash = ?1",
                params![token_hash],
            )?;
            Ok(())
        })
        .await
    }

    /// Stores the new hash and drops every outstanding reset of the user in
    /// one transaction.
    pub async fn complete_password_reset(&self, uid: &str, password_hash: &str) -> Result<()> {
        let (uid, password_hash) = (uid.to_string(), password_hash.to_string());
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE users SET password_hash = ?1 WHERE uid = ?2",
                params![password_hash, uid],
            )?;
            tx.execute("DELETE FROM password_resets WHERE uid = ?1", params![uid])?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Removes resets that expired at or before `now`. Returns how many went.
    pub async fn delete_expired_password_resets(&self, now: DateTime<Utc>) -> Result<usize> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare("SELECT id, expires_at FROM password_resets")?;
            let mut rows = stmt.query([])?;
            let mut expired = Vec::new();
            while let Some(row) = rows.next()? {
                let id: String = row.get(0)?;
                let expires_at: String = row.get(1)?;
                if parse_datetime(&expires_at, "expires_at")? <= now {
                    expired.push(id);
                }
            }
            drop(rows);
            drop(stmt);

            for id in &expired {
                conn.execute("DELETE FROM password_resets WHERE id = ?1", params![id])?;
            }
            Ok(expired.len())
        })
        .await
    }

    pub async fn count_password_resets(&self, uid: &str) -> Result<u64> {
        let uid = uid.to_string();
        self.execute(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM password_resets WHERE uid = ?1",
                params![uid],
                |row| row.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
        .await
    }
}
