/// Project model and database operations
///
/// Projects group tasks and own the membership and invitation rows that gate
/// access to them.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE projects (
///     id UUID PRIMARY KEY,
///     name VARCHAR(255) NOT NULL,
///     owner_id UUID NOT NULL REFERENCES users(id),
///     archived BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Ownership
///
/// `owner_id` is a denormalized pointer at one of the project's owner members.
/// The membership table is canonical; `owner_id` is written at creation and
/// afterwards only by the membership mutator when that owner loses the role.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use uuid::Uuid;

/// A project owned by one or more members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    /// Unique project ID
    pub id: Uuid,

    /// Display name
    pub name: String,

    /// Cached reference to a current owner (initially the creator)
    pub owner_id: Uuid,

    /// Whether the project has been archived
    pub archived: bool,

    /// When the project was created
    pub created_at: DateTime<Utc>,

    /// When the project was last updated
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProject {
    /// Display name
    pub name: String,
}

impl Project {
    /// Builds a new, unarchived project owned by `creator_id`
    pub fn new(creator_id: Uuid, data: CreateProject, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: data.name.trim().to_string(),
            owner_id: creator_id,
            archived: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Inserts a project row
    pub async fn insert(conn: &mut PgConnection, project: &Project) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO projects (id, name, owner_id, archived, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(project.id)
        .bind(&project.name)
        .bind(project.owner_id)
        .bind(project.archived)
        .bind(project.created_at)
        .bind(project.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Finds a project by ID
    pub async fn find_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let project = sqlx::query_as::<_, Project>(
            r#"
            SELECT id, name, owner_id, archived, created_at, updated_at
            FROM projects
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(project)
    }

    /// Finds a project by ID and takes a row lock on it
    ///
    /// Must be called inside a transaction. Every membership and invitation
    /// mutation for a project locks the project row first, so such mutations
    /// are serialized per project until the transaction ends.
    pub async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let project = sqlx::query_as::<_, Project>(
            r#"
            SELECT id, name, owner_id, archived, created_at, updated_at
            FROM projects
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(project)
    }

    /// Writes back the mutable columns (name, owner_id, archived, updated_at)
    ///
    /// Returns false if the project no longer exists.
    pub async fn update(conn: &mut PgConnection, project: &Project) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE projects
            SET name = $2, owner_id = $3, archived = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(project.id)
        .bind(&project.name)
        .bind(project.owner_id)
        .bind(project.archived)
        .bind(project.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes a project; memberships, tasks and invitations cascade
    pub async fn delete(conn: &mut PgConnection, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_project_is_owned_by_creator() {
        let creator = Uuid::new_v4();
        let now = Utc::now();
        let project = Project::new(
            creator,
            CreateProject {
                name: "  Launch  ".to_string(),
            },
            now,
        );

        assert_eq!(project.owner_id, creator);
        assert_eq!(project.name, "Launch");
        assert!(!project.archived);
        assert_eq!(project.created_at, now);
        assert_eq!(project.updated_at, now);
    }
}
