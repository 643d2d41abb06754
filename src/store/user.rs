//! User accounts.

use crate::error::{ForecastError, Result};
use crate::store::db::SharedConnection;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored user. The password hash never leaves the process.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub last_login: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Check a plaintext password against the stored hash.
    pub fn verify_password(&self, password: &str) -> bool {
        PasswordHash::new(&self.password_hash)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let id: String = row.get("id")?;
        Ok(Self {
            id: Uuid::parse_str(&id).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
            })?,
            username: row.get("username")?,
            email: row.get("email")?,
            name: row.get("name")?,
            password_hash: row.get("password_hash")?,
            last_login: parse_time(row, "last_login")?,
            created_at: parse_time(row, "created_at")?,
            updated_at: parse_time(row, "updated_at")?,
        })
    }
}

fn parse_time(row: &Row<'_>, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(column)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Sign-up payload. Fields are optional so that missing ones are reported
/// as a validation failure rather than a deserialization error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUser {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// A sign-up payload that passed validation, normalized for storage.
#[derive(Debug, Clone)]
pub struct ValidatedUser {
    pub username: String,
    pub email: String,
    pub name: String,
    pub password: String,
}

impl NewUser {
    /// Require every field and normalize: usernames and emails are trimmed
    /// and lowercased, names trimmed, passwords kept verbatim.
    pub fn validate(&self) -> Result<ValidatedUser> {
        fn present(v: &Option<String>) -> Option<&str> {
            v.as_deref().filter(|s| !s.trim().is_empty())
        }

        match (
            present(&self.username),
            present(&self.email),
            present(&self.name),
            present(&self.password),
        ) {
            (Some(username), Some(email), Some(name), Some(password)) => Ok(ValidatedUser {
                username: normalize_key(username),
                email: normalize_key(email),
                name: name.trim().to_string(),
                password: password.to_string(),
            }),
            _ => Err(ForecastError::Validation {
                message: "Missing required fields".to_string(),
            }),
        }
    }
}

fn normalize_key(value: &str) -> String {
    value.trim().to_lowercase()
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ForecastError::Internal {
            message: format!("Failed to hash password: {}", e),
        })
}

/// User collection over the shared connection.
///
/// SQLite calls and argon2 work are blocking, so every operation runs on the
/// blocking pool and takes the connection lock there.
#[derive(Clone)]
pub struct UserStore {
    conn: SharedConnection,
}

impl UserStore {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.blocking_lock();
            f(&guard)
        })
        .await
        .map_err(|e| ForecastError::Internal {
            message: format!("User store task failed: {}", e),
        })?
    }

    /// Find a user whose email or username matches.
    pub async fn find_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> Result<Option<User>> {
        let (email, username) = (normalize_key(email), normalize_key(username));
        self.blocking(move |conn| {
            let user = conn
                .query_row(
                    "SELECT * FROM users WHERE email = ?1 OR username = ?2 LIMIT 1",
                    params![email, username],
                    User::from_row,
                )
                .optional()?;
            Ok(user)
        })
        .await
    }

    /// Resolve a sign-in. `login` may be an email or a username; an email
    /// match is tried before a username match, and the first candidate whose
    /// password verifies wins.
    pub async fn authenticate(&self, login: &str, password: &str) -> Result<Option<User>> {
        let login = normalize_key(login);
        let password = password.to_string();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM users WHERE email = ?1 OR username = ?1
                 ORDER BY CASE WHEN email = ?1 THEN 0 ELSE 1 END",
            )?;
            let candidates = stmt
                .query_map(params![login], User::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(candidates
                .into_iter()
                .find(|user| user.verify_password(&password)))
        })
        .await
    }

    /// Insert a validated user. Duplicate usernames or emails are a conflict.
    pub async fn create(&self, new_user: ValidatedUser) -> Result<User> {
        self.blocking(move |conn| {
            let now = Utc::now();
            let user = User {
                id: Uuid::new_v4(),
                username: new_user.username,
                email: new_user.email,
                name: new_user.name,
                password_hash: hash_password(&new_user.password)?,
                last_login: now,
                created_at: now,
                updated_at: now,
            };

            conn.execute(
                "INSERT INTO users (
                    id, username, email, name, password_hash, last_login, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    user.id.to_string(),
                    user.username,
                    user.email,
                    user.name,
                    user.password_hash,
                    user.last_login.to_rfc3339(),
                    user.created_at.to_rfc3339(),
                    user.updated_at.to_rfc3339(),
                ],
            )?;

            Ok(user)
        })
        .await
    }

    /// Stamp a successful sign-in.
    pub async fn record_login(&self, user: &mut User) -> Result<()> {
        let id = user.id.to_string();
        let now = self
            .blocking(move |conn| {
                let now = Utc::now();
                conn.execute(
                    "UPDATE users SET last_login = ?1, updated_at = ?1 WHERE id = ?2",
                    params![now.to_rfc3339(), id],
                )?;
                Ok(now)
            })
            .await?;
        user.last_login = now;
        user.updated_at = now;
        Ok(())
    }
}
