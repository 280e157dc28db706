//! User repository for database operations

use anyhow::Result;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use chrono::Utc;
use common::models::{AdminUserUpdate, NewUser, Role, UpdateProfile, User};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::info;
use uuid::Uuid;

use super::{is_unique_violation, parse_column};

const USER_COLUMNS: &str = "id, email, full_name, role, whatsapp_number, is_approved, \
     is_blocked, email_verified, created_at, updated_at";

/// User repository
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Register a student account. Returns `None` when the email is taken.
    pub async fn create(&self, new_user: &NewUser) -> Result<Option<User>> {
        info!("Creating new user: {}", new_user.email);

        let password_hash = hash_password(&new_user.password)?;
        let now = Utc::now();

        let result = sqlx::query(&format!(
            r#"
            INSERT INTO users (id, email, password_hash, full_name, role, whatsapp_number,
                               is_approved, is_blocked, email_verified, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, TRUE, FALSE, FALSE, $7, $7)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(normalize_email(&new_user.email))
        .bind(&password_hash)
        .bind(new_user.full_name.trim())
        .bind(Role::Student.as_str())
        .bind(&new_user.whatsapp_number)
        .bind(now)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(Some(user_from_row(&row)?)),
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Find a user and their password hash by email
    pub async fn find_credentials(&self, email: &str) -> Result<Option<(User, String)>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = $1"
        ))
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let hash: String = row.try_get("password_hash")?;
                Ok(Some((user_from_row(&row)?, hash)))
            }
            None => Ok(None),
        }
    }

    /// Find a user by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    /// Self-service profile edit. Absent fields keep their value.
    pub async fn update_profile(&self, id: Uuid, update: &UpdateProfile) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE users
            SET full_name = COALESCE($2, full_name),
                whatsapp_number = COALESCE($3, whatsapp_number),
                updated_at = $4
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(update.full_name.as_deref().map(str::trim))
        .bind(&update.whatsapp_number)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    /// Admin edit of role and account flags. Absent fields keep their value.
    pub async fn admin_update(&self, id: Uuid, update: &AdminUserUpdate) -> Result<Option<User>> {
        info!("Admin update of user {}: {:?}", id, update);

        let row = sqlx::query(&format!(
            r#"
            UPDATE users
            SET role = COALESCE($2, role),
                is_approved = COALESCE($3, is_approved),
                is_blocked = COALESCE($4, is_blocked),
                updated_at = $5
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(update.role.map(|r| r.as_str()))
        .bind(update.is_approved)
        .bind(update.is_blocked)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(user_from_row).transpose()
    }
}

fn user_from_row(row: &PgRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        full_name: row.try_get("full_name")?,
        role: parse_column(row, "role")?,
        whatsapp_number: row.try_get("whatsapp_number")?,
        is_approved: row.try_get("is_approved")?,
        is_blocked: row.try_get("is_blocked")?,
        email_verified: row.try_get("email_verified")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Hash a password with Argon2 and a random salt
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string())
}

/// Check a password against a stored Argon2 hash
pub fn verify_password(password_hash: &str, password: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| anyhow::anyhow!("Failed to parse password hash: {}", e))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("Correct1pass").unwrap();

        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(&hash, "Correct1pass").unwrap());
        assert!(!verify_password(&hash, "Wrong1pass").unwrap());
    }

    #[test]
    fn test_same_password_gets_distinct_hashes() {
        assert_ne!(
            hash_password("Correct1pass").unwrap(),
            hash_password("Correct1pass").unwrap()
        );
    }

    #[test]
    fn test_garbage_hash_is_an_error() {
        assert!(verify_password("not-a-hash", "Correct1pass").is_err());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Student@MedHome.TEST "), "student@medhome.test");
    }
}
