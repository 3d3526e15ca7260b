use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, Role, User};

const USER_COLUMNS: &str = "id, email, first_name, last_name, avatar_url, password_hash, \
     role, is_active, is_verified, verification_token, verification_expires_at, \
     last_login, created_at, updated_at";

impl User {
    /// Find a user by (already normalized) email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    /// Insert a fresh, unverified account.
    pub async fn create(db: &PgPool, new: NewUser) -> anyhow::Result<User> {
        let sql = format!(
            "INSERT INTO users \
               (email, first_name, last_name, password_hash, role, \
                verification_token, verification_expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(&new.email)
            .bind(&new.first_name)
            .bind(&new.last_name)
            .bind(&new.password_hash)
            .bind(new.role)
            .bind(&new.verification_token)
            .bind(new.verification_expires_at)
            .fetch_one(db)
            .await?;
        Ok(user)
    }

    /// Consume a verification token. The token and its expiry are cleared in
    /// the same statement that flips the flag, so a token can only ever verify
    /// once; an expired token fails the timestamp predicate and is never
    /// cleared separately.
    pub async fn consume_verification_token(
        db: &PgPool,
        token: &str,
    ) -> anyhow::Result<Option<User>> {
        let sql = format!(
            "UPDATE users \
             SET is_verified = TRUE, verification_token = NULL, \
                 verification_expires_at = NULL, updated_at = now() \
             WHERE verification_token = $1 AND verification_expires_at > $2 \
             RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(token)
            .bind(OffsetDateTime::now_utc())
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    /// Replace the verification token for an unverified account (resend flow).
    pub async fn rotate_verification_token(
        db: &PgPool,
        id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE users \
             SET verification_token = $2, verification_expires_at = $3, updated_at = now() \
             WHERE id = $1 AND is_verified = FALSE",
        )
        .bind(id)
        .bind(token)
        .bind(expires_at)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn touch_last_login(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET last_login = now() WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Self-service profile update. Absent fields are left untouched;
    /// last write wins on the ones supplied.
    pub async fn update_profile(
        db: &PgPool,
        id: Uuid,
        first_name: Option<&str>,
        last_name: Option<&str>,
        avatar_url: Option<&str>,
    ) -> anyhow::Result<Option<User>> {
        let sql = format!(
            "UPDATE users \
             SET first_name = COALESCE($2, first_name), \
                 last_name = COALESCE($3, last_name), \
                 avatar_url = COALESCE($4, avatar_url), \
                 updated_at = now() \
             WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(first_name)
            .bind(last_name)
            .bind(avatar_url)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    pub async fn set_password_hash(db: &PgPool, id: Uuid, hash: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(hash)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Admin commands take any executor so the mutation and its audit row can
    /// share one transaction.
    pub async fn set_role<'e, E>(db: E, id: Uuid, role: Role) -> anyhow::Result<Option<User>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let sql = format!(
            "UPDATE users SET role = $2, updated_at = now() WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(role)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    pub async fn set_active<'e, E>(db: E, id: Uuid, active: bool) -> anyhow::Result<Option<User>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let sql = format!(
            "UPDATE users SET is_active = $2, updated_at = now() WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(active)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    /// Admin override of email verification, clearing any outstanding token.
    pub async fn mark_verified<'e, E>(db: E, id: Uuid) -> anyhow::Result<Option<User>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let sql = format!(
            "UPDATE users \
             SET is_verified = TRUE, verification_token = NULL, \
                 verification_expires_at = NULL, updated_at = now() \
             WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    pub async fn list(db: &PgPool, limit: i64, offset: i64) -> anyhow::Result<Vec<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        );
        let rows = sqlx::query_as::<_, User>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(db)
            .await?;
        Ok(rows)
    }
}
