/// User (principal) model and database operations
///
/// Users are owned by the identity subsystem. The access core only reads them:
/// memberships reference them by ID and invitations are matched against their
/// email address. Inserts exist for provisioning and test harnesses.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY,
///     email TEXT NOT NULL,
///     name VARCHAR(255),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
///
/// CREATE UNIQUE INDEX users_email_lower_idx ON users (lower(email));
/// ```
///
/// # Example
///
/// ```no_run
/// use tasklane_access::models::user::{User, CreateUser};
/// use tasklane_access::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
/// let mut conn = pool.acquire().await?;
///
/// let user = User::new(CreateUser {
///     email: "Ada@Example.com".to_string(),
///     name: Some("Ada".to_string()),
/// });
/// User::insert(&mut conn, &user).await?;
///
/// // Lookup is case-insensitive
/// let found = User::find_by_email(&mut conn, "ada@example.com").await?;
/// assert!(found.is_some());
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use uuid::Uuid;

/// An authenticated identity known to the identity subsystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique user ID
    pub id: Uuid,

    /// Email address as provided by the identity subsystem
    ///
    /// Comparisons are always case-insensitive; see [`normalize_email`].
    pub email: String,

    /// Optional display name
    pub name: Option<String>,

    /// When the user was provisioned
    pub created_at: DateTime<Utc>,
}

/// Input for provisioning a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    /// Email address
    pub email: String,

    /// Optional display name
    pub name: Option<String>,
}

/// Lowercases and trims an email address for comparison and storage
///
/// # Example
///
/// ```
/// use tasklane_access::models::user::normalize_email;
///
/// assert_eq!(normalize_email("  A@X.com "), "a@x.com");
/// ```
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl User {
    /// Builds a new user record with a fresh ID
    pub fn new(data: CreateUser) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: data.email.trim().to_string(),
            name: data.name,
            created_at: Utc::now(),
        }
    }

    /// Inserts a user row
    ///
    /// # Errors
    ///
    /// Returns a unique-violation database error if the email (case-insensitive)
    /// or ID is already taken.
    pub async fn insert(conn: &mut PgConnection, user: &User) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Finds a user by ID
    pub async fn find_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, name, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(user)
    }

    /// Finds a user by email address (case-insensitive)
    pub async fn find_by_email(
        conn: &mut PgConnection,
        email: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, name, created_at
            FROM users
            WHERE lower(email) = $1
            "#,
        )
        .bind(normalize_email(email))
        .fetch_optional(&mut *conn)
        .await?;

        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("User@Example.COM"), "user@example.com");
        assert_eq!(normalize_email(" a@b.c\n"), "a@b.c");
    }

    #[test]
    fn test_new_user_has_fresh_id() {
        let a = User::new(CreateUser {
            email: "a@x.com".to_string(),
            name: None,
        });
        let b = User::new(CreateUser {
            email: "a@x.com".to_string(),
            name: None,
        });
        assert_ne!(a.id, b.id);
    }
}
