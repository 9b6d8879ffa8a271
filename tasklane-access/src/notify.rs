/// Invitation delivery
///
/// Sending the invitation email belongs to the surrounding application. The
/// core hands it an [`InvitationNotice`] through the [`Notifier`] trait once
/// the invitation is committed. Delivery failure never undoes the invitation;
/// the inviter can resend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::ProjectRole;

/// Everything a notifier needs to tell the invitee
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvitationNotice {
    /// Invited email address
    pub recipient: String,

    /// Accept link carrying the plaintext token
    pub link: String,

    pub project_id: Uuid,
    pub role: ProjectRole,
    pub expires_at: DateTime<Utc>,
}

/// Error reported by a notifier
#[derive(Debug, thiserror::Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Delivers invitation notices
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_invitation(&self, notice: &InvitationNotice) -> Result<(), NotifyError>;
}

/// Notifier that only records the notice in the log
///
/// The link is left out of the log line since it carries the token.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_invitation(&self, notice: &InvitationNotice) -> Result<(), NotifyError> {
        info!(
            recipient = %notice.recipient,
            project_id = %notice.project_id,
            role = %notice.role,
            expires_at = %notice.expires_at,
            "Invitation notice issued"
        );
        Ok(())
    }
}

/// Sends a notice, logging and swallowing failure
///
/// Returns whether delivery succeeded.
pub async fn notify_best_effort(notifier: &dyn Notifier, notice: &InvitationNotice) -> bool {
    match notifier.send_invitation(notice).await {
        Ok(()) => true,
        Err(e) => {
            warn!(
                error = %e,
                recipient = %notice.recipient,
                project_id = %notice.project_id,
                "Failed to deliver invitation notice"
            );
            false
        }
    }
}
