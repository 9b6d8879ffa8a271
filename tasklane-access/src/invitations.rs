/// Invitation lifecycle
///
/// Owners invite an email address into a project with a non-owner role. The
/// invitee proves receipt by presenting the token, and must be signed in with
/// the invited address to accept.
///
/// # State Machine
///
/// ```text
/// pending ──accept──▶ accepted
///    │ ──revoke──▶ revoked
///    │ ──(read after expires_at)──▶ expired
///    └──resend──▶ pending (new token and expiry)
/// expired ──resend──▶ pending
/// ```
///
/// Expiry is applied lazily: whichever operation first reads an overdue
/// pending invitation persists the `expired` status. There is no background
/// sweep.
///
/// # Concurrency
///
/// Every status change is a conditional update guarded on the status the
/// caller observed; losing a race yields `Conflict`. Accept, revoke and
/// resend also lock the project row so they serialize with membership
/// changes.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tasklane_access::clock::SystemClock;
/// use tasklane_access::config::InvitationConfig;
/// use tasklane_access::invitations::InvitationManager;
/// use tasklane_access::models::ProjectRole;
/// use tasklane_access::store::memory::MemoryStore;
/// use uuid::Uuid;
///
/// # async fn example(owner: Uuid, project_id: Uuid, invitee: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let manager = InvitationManager::new(
///     Arc::new(MemoryStore::new()),
///     Arc::new(SystemClock),
///     InvitationConfig::default(),
/// );
///
/// let issued = manager
///     .create(project_id, "a@x.com", ProjectRole::Member, owner)
///     .await?;
/// manager.accept(&issued.token, invitee, "A@x.com").await?;
/// # Ok(())
/// # }
/// ```

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use crate::auth::permissions::{require, ProjectAction, Resource};
use crate::auth::roles::role_in_project;
use crate::auth::token::{generate_invitation_token, hash_token, validate_token_format};
use crate::clock::Clock;
use crate::config::InvitationConfig;
use crate::error::{AccessError, AccessResult};
use crate::membership::{insert_membership, lock_existing_project};
use crate::models::user::normalize_email;
use crate::models::{
    Invitation, InvitationStatus, InvitationTransition, Membership, NewInvitation, Project,
    ProjectRole,
};
use crate::notify::{notify_best_effort, InvitationNotice, Notifier};
use crate::store::{Store, StoreError, UnitOfWork};

#[derive(Debug, Validate)]
struct InviteeEmail {
    #[validate(email)]
    email: String,
}

/// A freshly issued invitation together with its plaintext token
///
/// This is the only place the plaintext token ever appears. Hand it to the
/// inviter or the notifier, never to anyone else.
#[derive(Clone)]
pub struct IssuedInvitation {
    pub invitation: Invitation,
    pub token: String,
}

impl fmt::Debug for IssuedInvitation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedInvitation")
            .field("invitation", &self.invitation)
            .field("token", &"[redacted]")
            .finish()
    }
}

impl IssuedInvitation {
    /// Accept link: `{base_url}/{token}`
    pub fn link(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.token)
    }

    /// What the notifier needs to reach the invitee
    pub fn notice(&self, base_url: &str) -> InvitationNotice {
        InvitationNotice {
            recipient: self.invitation.email.clone(),
            link: self.link(base_url),
            project_id: self.invitation.project_id,
            role: self.invitation.role,
            expires_at: self.invitation.expires_at,
        }
    }
}

/// Creates, resolves and transitions invitations
#[derive(Clone)]
pub struct InvitationManager {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    config: InvitationConfig,
}

impl InvitationManager {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, config: InvitationConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &InvitationConfig {
        &self.config
    }

    /// Invites `email` into a project
    ///
    /// # Errors
    ///
    /// - `Invalid` if `role` is owner or the email is malformed
    /// - `NotFound` if the project doesn't exist
    /// - `Forbidden` unless `inviter` may invite users
    /// - `Conflict` if the address already belongs to a member, or an
    ///   unexpired invitation for it is pending
    pub async fn create(
        &self,
        project_id: Uuid,
        email: &str,
        role: ProjectRole,
        inviter: Uuid,
    ) -> AccessResult<IssuedInvitation> {
        if !role.is_invitable() {
            return Err(AccessError::Invalid(
                "Cannot invite with the owner role".to_string(),
            ));
        }

        let email = normalize_email(email);
        let input = InviteeEmail { email };
        if input.validate().is_err() {
            return Err(AccessError::Invalid("Invalid email address".to_string()));
        }
        let email = input.email;

        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        let project = lock_existing_project(uow.as_mut(), project_id).await?;
        require(
            uow.as_mut(),
            inviter,
            ProjectAction::InviteUsers.into(),
            Resource::Project(project_id),
        )
        .await?;

        ensure_not_member(uow.as_mut(), &project, &email).await?;

        if let Some(existing) = uow.find_pending_invitation(project_id, &email).await? {
            if !existing.is_overdue(now) {
                return Err(AccessError::Conflict(
                    "An invitation is already pending for this email".to_string(),
                ));
            }
            expire(uow.as_mut(), &existing, now).await?;
        }

        let (token, token_hash) = generate_invitation_token();
        let invitation = Invitation::new(
            NewInvitation {
                project_id,
                email,
                role,
                token_hash,
                invited_by: inviter,
                expires_at: now + self.config.ttl(),
            },
            now,
        );

        match uow.insert_invitation(&invitation).await {
            Ok(()) => {}
            Err(StoreError::AlreadyExists) => {
                return Err(AccessError::Conflict(
                    "An invitation is already pending for this email".to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        }
        uow.commit().await?;

        info!(
            invitation_id = %invitation.id,
            project_id = %project_id,
            role = %role,
            invited_by = %inviter,
            expires_at = %invitation.expires_at,
            "Invitation created"
        );

        Ok(IssuedInvitation { invitation, token })
    }

    /// Creates an invitation and hands the notice to `notifier`
    ///
    /// The invitation stands even when delivery fails.
    pub async fn create_and_notify(
        &self,
        project_id: Uuid,
        email: &str,
        role: ProjectRole,
        inviter: Uuid,
        notifier: &dyn Notifier,
    ) -> AccessResult<IssuedInvitation> {
        let issued = self.create(project_id, email, role, inviter).await?;
        notify_best_effort(notifier, &issued.notice(&self.config.base_url)).await;
        Ok(issued)
    }

    /// Looks an invitation up by its token
    ///
    /// An overdue pending invitation is transitioned to expired, and that
    /// change is persisted before it is returned.
    pub async fn get_by_token(&self, token: &str) -> AccessResult<Invitation> {
        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        let invitation = find_by_token(uow.as_mut(), token).await?;

        if !invitation.is_overdue(now) {
            return Ok(invitation);
        }

        let invitation = expire(uow.as_mut(), &invitation, now).await?;
        uow.commit().await?;
        Ok(invitation)
    }

    /// Accepts an invitation on behalf of `principal`
    ///
    /// Accepting again as the same principal returns the accepted invitation
    /// without touching memberships.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown token
    /// - `Expired` once the invitation has expired
    /// - `Conflict` if it was revoked, used by someone else, or changed concurrently
    /// - `Forbidden` if `principal_email` isn't the invited address
    pub async fn accept(
        &self,
        token: &str,
        principal: Uuid,
        principal_email: &str,
    ) -> AccessResult<Invitation> {
        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        let found = find_by_token(uow.as_mut(), token).await?;
        let (project, invitation) = lock_and_reload(uow.as_mut(), &found).await?;

        match invitation.status {
            InvitationStatus::Accepted if invitation.accepted_by == Some(principal) => {
                debug!(invitation_id = %invitation.id, "Invitation already accepted by caller");
                return Ok(invitation);
            }
            InvitationStatus::Accepted => {
                return Err(AccessError::Conflict(
                    "Invitation has already been used".to_string(),
                ))
            }
            InvitationStatus::Revoked => {
                return Err(AccessError::Conflict(
                    "Invitation has been revoked".to_string(),
                ))
            }
            InvitationStatus::Expired => return Err(expired_error()),
            InvitationStatus::Pending if invitation.is_overdue(now) => {
                expire(uow.as_mut(), &invitation, now).await?;
                uow.commit().await?;
                return Err(expired_error());
            }
            InvitationStatus::Pending => {}
        }

        if normalize_email(principal_email) != invitation.email {
            return Err(AccessError::Forbidden);
        }

        if role_in_project(uow.as_mut(), principal, &project).await?.is_some() {
            debug!(
                project_id = %project.id,
                user_id = %principal,
                "Invitee is already a member; marking invitation accepted"
            );
        } else {
            insert_membership(
                uow.as_mut(),
                Membership::new(project.id, principal, invitation.role, now),
            )
            .await?;
        }

        let accepted = uow
            .transition_invitation(
                invitation.id,
                InvitationStatus::Pending,
                &InvitationTransition::accept(principal, now),
            )
            .await?
            .ok_or_else(concurrent_change)?;
        uow.commit().await?;

        info!(
            invitation_id = %accepted.id,
            project_id = %accepted.project_id,
            user_id = %principal,
            role = %accepted.role,
            "Invitation accepted"
        );

        Ok(accepted)
    }

    /// Revokes a pending invitation
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown invitation
    /// - `Forbidden` unless `caller` may invite users
    /// - `Expired` if it already expired, which is persisted if it was overdue
    /// - `Conflict` if it was accepted or revoked
    pub async fn revoke(&self, invitation_id: Uuid, caller: Uuid) -> AccessResult<Invitation> {
        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        let invitation = self.load_managed(uow.as_mut(), invitation_id, caller).await?;

        match invitation.status {
            InvitationStatus::Pending if invitation.is_overdue(now) => {
                expire(uow.as_mut(), &invitation, now).await?;
                uow.commit().await?;
                return Err(expired_error());
            }
            InvitationStatus::Pending => {}
            InvitationStatus::Expired => return Err(expired_error()),
            InvitationStatus::Accepted | InvitationStatus::Revoked => {
                return Err(AccessError::Conflict(format!(
                    "Invitation is already {}",
                    invitation.status.as_str()
                )))
            }
        }

        let revoked = uow
            .transition_invitation(
                invitation.id,
                InvitationStatus::Pending,
                &InvitationTransition::revoke(now),
            )
            .await?
            .ok_or_else(concurrent_change)?;
        uow.commit().await?;

        info!(
            invitation_id = %revoked.id,
            project_id = %revoked.project_id,
            revoked_by = %caller,
            "Invitation revoked"
        );

        Ok(revoked)
    }

    /// Issues a new token and expiry for a pending or expired invitation
    ///
    /// The previous token stops working.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown invitation
    /// - `Forbidden` unless `caller` may invite users
    /// - `Conflict` if it was accepted or revoked, the address has joined in
    ///   the meantime, or another invitation for it is pending
    pub async fn resend(&self, invitation_id: Uuid, caller: Uuid) -> AccessResult<IssuedInvitation> {
        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        let invitation = self.load_managed(uow.as_mut(), invitation_id, caller).await?;

        match invitation.status {
            InvitationStatus::Pending | InvitationStatus::Expired => {}
            InvitationStatus::Accepted | InvitationStatus::Revoked => {
                return Err(AccessError::Conflict(format!(
                    "Invitation is already {}",
                    invitation.status.as_str()
                )))
            }
        }

        if let Some(project) = uow.get_project(invitation.project_id).await? {
            ensure_not_member(uow.as_mut(), &project, &invitation.email).await?;
        }

        let (token, token_hash) = generate_invitation_token();
        let change = InvitationTransition::reissue(token_hash, now + self.config.ttl(), now);

        let reissued = match uow
            .transition_invitation(invitation.id, invitation.status, &change)
            .await
        {
            Ok(Some(reissued)) => reissued,
            Ok(None) => return Err(concurrent_change()),
            Err(StoreError::AlreadyExists) => {
                return Err(AccessError::Conflict(
                    "Another invitation is already pending for this email".to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        };
        uow.commit().await?;

        info!(
            invitation_id = %reissued.id,
            project_id = %reissued.project_id,
            resent_by = %caller,
            expires_at = %reissued.expires_at,
            "Invitation resent"
        );

        Ok(IssuedInvitation {
            invitation: reissued,
            token,
        })
    }

    /// Lists a project's invitations, newest first
    ///
    /// Overdue pending rows are reported as expired without being written.
    pub async fn list_for_project(
        &self,
        project_id: Uuid,
        caller: Uuid,
    ) -> AccessResult<Vec<Invitation>> {
        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        if uow.get_project(project_id).await?.is_none() {
            return Err(AccessError::not_found("Project"));
        }
        require(
            uow.as_mut(),
            caller,
            ProjectAction::InviteUsers.into(),
            Resource::Project(project_id),
        )
        .await?;

        let invitations = uow.list_invitations(project_id).await?;
        Ok(invitations
            .into_iter()
            .map(|mut invitation| {
                invitation.status = invitation.effective_status(now);
                invitation
            })
            .collect())
    }

    /// Loads an invitation for an owner-side operation with its project locked
    async fn load_managed(
        &self,
        uow: &mut dyn UnitOfWork,
        invitation_id: Uuid,
        caller: Uuid,
    ) -> AccessResult<Invitation> {
        let found = uow
            .get_invitation(invitation_id)
            .await?
            .ok_or_else(|| AccessError::not_found("Invitation"))?;
        let (project, invitation) = lock_and_reload(uow, &found).await?;

        require(
            uow,
            caller,
            ProjectAction::InviteUsers.into(),
            Resource::Project(project.id),
        )
        .await?;

        Ok(invitation)
    }
}

fn expired_error() -> AccessError {
    AccessError::Expired("Invitation has expired; ask the project owner to resend it".to_string())
}

fn concurrent_change() -> AccessError {
    AccessError::Conflict("Invitation was modified concurrently".to_string())
}

/// Resolves a plaintext token to its invitation
///
/// Malformed tokens are reported the same way as unknown ones.
async fn find_by_token(uow: &mut dyn UnitOfWork, token: &str) -> AccessResult<Invitation> {
    if !validate_token_format(token) {
        return Err(AccessError::not_found("Invitation"));
    }

    uow.find_invitation_by_token_hash(&hash_token(token))
        .await?
        .ok_or_else(|| AccessError::not_found("Invitation"))
}

/// Locks the invitation's project, then re-reads the invitation under the lock
async fn lock_and_reload(
    uow: &mut dyn UnitOfWork,
    found: &Invitation,
) -> AccessResult<(Project, Invitation)> {
    let project = lock_existing_project(uow, found.project_id).await?;
    let invitation = uow
        .get_invitation(found.id)
        .await?
        .ok_or_else(|| AccessError::not_found("Invitation"))?;
    Ok((project, invitation))
}

/// Persists the expiry of an overdue pending invitation
///
/// If a concurrent writer already moved the row on, returns the row as it
/// now stands.
async fn expire(
    uow: &mut dyn UnitOfWork,
    invitation: &Invitation,
    now: chrono::DateTime<chrono::Utc>,
) -> AccessResult<Invitation> {
    let updated = uow
        .transition_invitation(
            invitation.id,
            InvitationStatus::Pending,
            &InvitationTransition::expire(now),
        )
        .await?;

    match updated {
        Some(expired) => {
            info!(
                invitation_id = %expired.id,
                project_id = %expired.project_id,
                "Invitation expired"
            );
            Ok(expired)
        }
        None => uow
            .get_invitation(invitation.id)
            .await?
            .ok_or_else(|| AccessError::not_found("Invitation")),
    }
}

/// Fails with `Conflict` if a user with `email` already has a role in `project`
async fn ensure_not_member(
    uow: &mut dyn UnitOfWork,
    project: &Project,
    email: &str,
) -> AccessResult<()> {
    let Some(user) = uow.find_user_by_email(email).await? else {
        return Ok(());
    };

    if role_in_project(uow, user.id, project).await?.is_some() {
        return Err(AccessError::Conflict(
            "User is already a member of this project".to_string(),
        ));
    }

    Ok(())
}
