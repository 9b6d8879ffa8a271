/// Membership model and database operations
///
/// This module provides the Membership model for user-project relationships
/// with role-based access control. A membership is the (user, project, role)
/// association; the composite primary key makes duplicate rows impossible.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE project_role AS ENUM ('owner', 'collaborator', 'member', 'viewer');
///
/// CREATE TABLE memberships (
///     project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     role project_role NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     PRIMARY KEY (project_id, user_id)
/// );
/// ```
///
/// # Roles
///
/// - **owner**: Full control, including members, invitations, archive and delete
/// - **collaborator**: Edit the project, full control over its tasks
/// - **member**: View the project, work on tasks they created or are assigned
/// - **viewer**: Read-only access
///
/// Rows are written exclusively by [`crate::membership`] (`add_member`, `remove_member`, `change_role`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use std::fmt;
use uuid::Uuid;

/// Roles a principal can hold within a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "project_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProjectRole {
    /// Full control over the project
    Owner,

    /// Can edit the project and manage every task
    Collaborator,

    /// Can work on tasks they created or are assigned to
    Member,

    /// Read-only access
    Viewer,
}

impl ProjectRole {
    /// Converts role to string for display
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectRole::Owner => "owner",
            ProjectRole::Collaborator => "collaborator",
            ProjectRole::Member => "member",
            ProjectRole::Viewer => "viewer",
        }
    }

    /// Whether an invitation may offer this role
    ///
    /// Ownership is never granted through an invitation.
    pub fn is_invitable(&self) -> bool {
        !matches!(self, ProjectRole::Owner)
    }
}

impl fmt::Display for ProjectRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Membership model representing a user-project relationship with role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Membership {
    /// Project ID
    pub project_id: Uuid,

    /// User ID
    pub user_id: Uuid,

    /// Role within the project
    pub role: ProjectRole,

    /// When the membership was created
    pub created_at: DateTime<Utc>,
}

impl Membership {
    /// Builds a membership row
    pub fn new(project_id: Uuid, user_id: Uuid, role: ProjectRole, now: DateTime<Utc>) -> Self {
        Self {
            project_id,
            user_id,
            role,
            created_at: now,
        }
    }

    /// Inserts a membership row
    ///
    /// # Errors
    ///
    /// Returns a unique-violation database error if the (project, user) pair
    /// already exists, or a foreign-key violation if either side is missing.
    pub async fn insert(conn: &mut PgConnection, membership: &Membership) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO memberships (project_id, user_id, role, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(membership.project_id)
        .bind(membership.user_id)
        .bind(membership.role)
        .bind(membership.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Finds a specific membership by project and user
    pub async fn find(
        conn: &mut PgConnection,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let membership = sqlx::query_as::<_, Membership>(
            r#"
            SELECT project_id, user_id, role, created_at
            FROM memberships
            WHERE project_id = $1 AND user_id = $2
            "#,
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(membership)
    }

    /// Updates a user's role in a project
    ///
    /// Returns false if the membership doesn't exist.
    pub async fn update_role(
        conn: &mut PgConnection,
        project_id: Uuid,
        user_id: Uuid,
        role: ProjectRole,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE memberships
            SET role = $3
            WHERE project_id = $1 AND user_id = $2
            "#,
        )
        .bind(project_id)
        .bind(user_id)
        .bind(role)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes a membership (removes user from project)
    ///
    /// Returns false if the membership didn't exist.
    pub async fn delete(
        conn: &mut PgConnection,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM memberships WHERE project_id = $1 AND user_id = $2")
            .bind(project_id)
            .bind(user_id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists all members of a project, oldest first
    pub async fn list_by_project(
        conn: &mut PgConnection,
        project_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let memberships = sqlx::query_as::<_, Membership>(
            r#"
            SELECT project_id, user_id, role, created_at
            FROM memberships
            WHERE project_id = $1
            ORDER BY created_at ASC, user_id ASC
            "#,
        )
        .bind(project_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(memberships)
    }

    /// Counts members holding `role` in a project
    pub async fn count_by_role(
        conn: &mut PgConnection,
        project_id: Uuid,
        role: ProjectRole,
    ) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM memberships WHERE project_id = $1 AND role = $2",
        )
        .bind(project_id)
        .bind(role)
        .fetch_one(&mut *conn)
        .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_role_as_str() {
        assert_eq!(ProjectRole::Owner.as_str(), "owner");
        assert_eq!(ProjectRole::Collaborator.as_str(), "collaborator");
        assert_eq!(ProjectRole::Member.as_str(), "member");
        assert_eq!(ProjectRole::Viewer.as_str(), "viewer");
    }

    #[test]
    fn test_owner_is_not_invitable() {
        assert!(!ProjectRole::Owner.is_invitable());
        assert!(ProjectRole::Collaborator.is_invitable());
        assert!(ProjectRole::Member.is_invitable());
        assert!(ProjectRole::Viewer.is_invitable());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&ProjectRole::Collaborator).unwrap();
        assert_eq!(json, "\"collaborator\"");
    }
}
