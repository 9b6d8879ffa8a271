/// Invitation model and database operations
///
/// An invitation offers a non-owner role in a project to an email address,
/// guarded by a single-use, time-bounded token.
///
/// # State Machine
///
/// ```text
/// pending → accepted   (terminal)
/// pending → expired    (terminal, applied lazily when read past expires_at)
/// pending → revoked    (terminal)
/// pending → pending    (resend: new token and expiry, same row)
/// expired → pending    (resend)
/// ```
///
/// # Schema
///
/// ```sql
/// CREATE TYPE invitation_status AS ENUM ('pending', 'accepted', 'expired', 'revoked');
///
/// CREATE TABLE invitations (
///     id UUID PRIMARY KEY,
///     project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
///     email TEXT NOT NULL CHECK (email = lower(email)),
///     role project_role NOT NULL CHECK (role <> 'owner'),
///     token_hash TEXT NOT NULL UNIQUE,
///     status invitation_status NOT NULL DEFAULT 'pending',
///     expires_at TIMESTAMPTZ NOT NULL,
///     invited_by UUID NOT NULL REFERENCES users(id),
///     accepted_by UUID REFERENCES users(id) ON DELETE SET NULL,
///     accepted_at TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
///
/// CREATE UNIQUE INDEX invitations_one_pending_per_email
///     ON invitations (project_id, email) WHERE status = 'pending';
/// ```
///
/// # Token Storage
///
/// Only the SHA-256 digest of the token is stored. The plaintext token is
/// handed out once, by [`crate::invitations::InvitationManager::create`] and
/// `resend`, and is never serialized from a stored row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use uuid::Uuid;

use super::membership::ProjectRole;

/// Invitation lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "invitation_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    /// Outstanding, may be accepted
    Pending,

    /// Accepted; membership exists
    Accepted,

    /// Passed its expiry before being accepted
    Expired,

    /// Withdrawn by a project owner
    Revoked,
}

impl InvitationStatus {
    /// Converts status to string for display
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Expired => "expired",
            InvitationStatus::Revoked => "revoked",
        }
    }

}

/// Invitation record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Invitation {
    /// Unique invitation ID
    pub id: Uuid,

    /// Project the invitation grants access to
    pub project_id: Uuid,

    /// Invited email address, lowercase
    pub email: String,

    /// Role granted on acceptance (never owner)
    pub role: ProjectRole,

    /// SHA-256 hex digest of the current token
    #[serde(skip_serializing, default)]
    pub token_hash: String,

    /// Current status
    pub status: InvitationStatus,

    /// When the current token stops being accepted
    pub expires_at: DateTime<Utc>,

    /// User who sent the invitation
    pub invited_by: Uuid,

    /// User who accepted the invitation
    pub accepted_by: Option<Uuid>,

    /// When the invitation was accepted
    pub accepted_at: Option<DateTime<Utc>>,

    /// When the invitation was created
    pub created_at: DateTime<Utc>,

    /// When the invitation was last updated
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to insert a new pending invitation
#[derive(Debug, Clone)]
pub struct NewInvitation {
    pub project_id: Uuid,
    pub email: String,
    pub role: ProjectRole,
    pub token_hash: String,
    pub invited_by: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl Invitation {
    /// Builds a pending invitation row
    pub fn new(data: NewInvitation, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id: data.project_id,
            email: data.email,
            role: data.role,
            token_hash: data.token_hash,
            status: InvitationStatus::Pending,
            expires_at: data.expires_at,
            invited_by: data.invited_by,
            accepted_by: None,
            accepted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A pending invitation whose expiry has passed
    ///
    /// Such a row is still stored as pending until something reads it.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == InvitationStatus::Pending && now > self.expires_at
    }

    /// The status a reader should observe at `now`
    pub fn effective_status(&self, now: DateTime<Utc>) -> InvitationStatus {
        if self.is_overdue(now) {
            InvitationStatus::Expired
        } else {
            self.status
        }
    }

    /// Inserts an invitation row
    ///
    /// # Errors
    ///
    /// Returns a unique-violation database error on a token hash collision or
    /// when another pending invitation exists for the same project and email.
    pub async fn insert(conn: &mut PgConnection, invitation: &Invitation) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO invitations (id, project_id, email, role, token_hash, status, expires_at,
                                     invited_by, accepted_by, accepted_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(invitation.id)
        .bind(invitation.project_id)
        .bind(&invitation.email)
        .bind(invitation.role)
        .bind(&invitation.token_hash)
        .bind(invitation.status)
        .bind(invitation.expires_at)
        .bind(invitation.invited_by)
        .bind(invitation.accepted_by)
        .bind(invitation.accepted_at)
        .bind(invitation.created_at)
        .bind(invitation.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Finds an invitation by ID
    pub async fn find_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let invitation = sqlx::query_as::<_, Invitation>(
            r#"
            SELECT id, project_id, email, role, token_hash, status, expires_at,
                   invited_by, accepted_by, accepted_at, created_at, updated_at
            FROM invitations
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(invitation)
    }

    /// Finds an invitation by the digest of its current token
    pub async fn find_by_token_hash(
        conn: &mut PgConnection,
        token_hash: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let invitation = sqlx::query_as::<_, Invitation>(
            r#"
            SELECT id, project_id, email, role, token_hash, status, expires_at,
                   invited_by, accepted_by, accepted_at, created_at, updated_at
            FROM invitations
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(invitation)
    }

    /// Finds the pending invitation for an email in a project, if any
    pub async fn find_pending(
        conn: &mut PgConnection,
        project_id: Uuid,
        email: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let invitation = sqlx::query_as::<_, Invitation>(
            r#"
            SELECT id, project_id, email, role, token_hash, status, expires_at,
                   invited_by, accepted_by, accepted_at, created_at, updated_at
            FROM invitations
            WHERE project_id = $1 AND email = $2 AND status = 'pending'
            "#,
        )
        .bind(project_id)
        .bind(email)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(invitation)
    }

    /// Lists a project's invitations, newest first
    pub async fn list_by_project(
        conn: &mut PgConnection,
        project_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let invitations = sqlx::query_as::<_, Invitation>(
            r#"
            SELECT id, project_id, email, role, token_hash, status, expires_at,
                   invited_by, accepted_by, accepted_at, created_at, updated_at
            FROM invitations
            WHERE project_id = $1
            ORDER BY created_at DESC, id ASC
            "#,
        )
        .bind(project_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(invitations)
    }

    /// Applies a transition if the row is still in `expected` status
    ///
    /// Returns `None` when the row is missing or another writer already moved
    /// it out of `expected`; callers report that as a conflict.
    pub async fn transition(
        conn: &mut PgConnection,
        id: Uuid,
        expected: InvitationStatus,
        change: &InvitationTransition,
    ) -> Result<Option<Self>, sqlx::Error> {
        let invitation = sqlx::query_as::<_, Invitation>(
            r#"
            UPDATE invitations
            SET status = $3,
                token_hash = COALESCE($4, token_hash),
                expires_at = COALESCE($5, expires_at),
                accepted_by = COALESCE($6, accepted_by),
                accepted_at = COALESCE($7, accepted_at),
                updated_at = $8
            WHERE id = $1 AND status = $2
            RETURNING id, project_id, email, role, token_hash, status, expires_at,
                      invited_by, accepted_by, accepted_at, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(change.status)
        .bind(&change.token_hash)
        .bind(change.expires_at)
        .bind(change.accepted_by)
        .bind(change.accepted_at)
        .bind(change.at)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(invitation)
    }
}

/// A status change plus the columns that change with it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvitationTransition {
    pub status: InvitationStatus,
    pub token_hash: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub accepted_by: Option<Uuid>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub at: DateTime<Utc>,
}

impl InvitationTransition {
    fn to(status: InvitationStatus, at: DateTime<Utc>) -> Self {
        Self {
            status,
            token_hash: None,
            expires_at: None,
            accepted_by: None,
            accepted_at: None,
            at,
        }
    }

    pub fn expire(at: DateTime<Utc>) -> Self {
        Self::to(InvitationStatus::Expired, at)
    }

    pub fn revoke(at: DateTime<Utc>) -> Self {
        Self::to(InvitationStatus::Revoked, at)
    }

    pub fn accept(user_id: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            accepted_by: Some(user_id),
            accepted_at: Some(at),
            ..Self::to(InvitationStatus::Accepted, at)
        }
    }

    /// Back to pending under a fresh token
    pub fn reissue(token_hash: String, expires_at: DateTime<Utc>, at: DateTime<Utc>) -> Self {
        Self {
            token_hash: Some(token_hash),
            expires_at: Some(expires_at),
            ..Self::to(InvitationStatus::Pending, at)
        }
    }

    /// Applies the change to an in-memory row, mirroring the SQL update
    pub fn apply(&self, invitation: &mut Invitation) {
        invitation.status = self.status;
        if let Some(hash) = &self.token_hash {
            invitation.token_hash = hash.clone();
        }
        if let Some(expires_at) = self.expires_at {
            invitation.expires_at = expires_at;
        }
        if let Some(accepted_by) = self.accepted_by {
            invitation.accepted_by = Some(accepted_by);
        }
        if let Some(accepted_at) = self.accepted_at {
            invitation.accepted_at = Some(accepted_at);
        }
        invitation.updated_at = self.at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pending(now: DateTime<Utc>) -> Invitation {
        Invitation::new(
            NewInvitation {
                project_id: Uuid::new_v4(),
                email: "a@x.com".to_string(),
                role: ProjectRole::Member,
                token_hash: "ab".repeat(32),
                invited_by: Uuid::new_v4(),
                expires_at: now + Duration::hours(72),
            },
            now,
        )
    }

    #[test]
    fn test_effective_status_expires_lazily() {
        let now = Utc::now();
        let inv = pending(now);

        assert_eq!(inv.effective_status(now), InvitationStatus::Pending);
        assert_eq!(
            inv.effective_status(now + Duration::hours(72)),
            InvitationStatus::Pending
        );
        assert_eq!(
            inv.effective_status(now + Duration::hours(73)),
            InvitationStatus::Expired
        );
    }

    #[test]
    fn test_token_hash_not_serialized() {
        let inv = pending(Utc::now());
        let json = serde_json::to_value(&inv).unwrap();
        assert!(json.get("token_hash").is_none());
        assert_eq!(json["status"], "pending");
        assert_eq!(json["role"], "member");
    }

    #[test]
    fn test_apply_accept_and_reissue() {
        let now = Utc::now();
        let mut inv = pending(now);
        let user = Uuid::new_v4();

        InvitationTransition::accept(user, now).apply(&mut inv);
        assert_eq!(inv.status, InvitationStatus::Accepted);
        assert_eq!(inv.accepted_by, Some(user));
        assert_eq!(inv.accepted_at, Some(now));

        let mut inv = pending(now);
        let later = now + Duration::hours(1);
        InvitationTransition::reissue("cd".repeat(32), later + Duration::hours(72), later)
            .apply(&mut inv);
        assert_eq!(inv.status, InvitationStatus::Pending);
        assert_eq!(inv.token_hash, "cd".repeat(32));
        assert_eq!(inv.expires_at, later + Duration::hours(72));
        assert_eq!(inv.updated_at, later);
    }
}
