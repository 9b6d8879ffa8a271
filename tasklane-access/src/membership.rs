/// Membership mutation
///
/// Membership rows are written only from this module. The free functions
/// operate on an open [`UnitOfWork`] so callers (this module's
/// [`MembershipService`], project creation, invitation acceptance) can make
/// them part of a larger transaction.
///
/// # Last-Owner Invariant
///
/// Every project keeps at least one owner. Removing or demoting an owner
/// first locks the project row, then counts owners inside the same
/// transaction. Two concurrent removals therefore serialize on the lock, and
/// the second one observes the first one's result.
///
/// # Owner Cache
///
/// `Project.owner_id` always points at a current owner. When the referenced
/// owner loses the role, it is repointed at the longest-standing remaining
/// owner.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::permissions::{require, ProjectAction, Resource};
use crate::auth::roles::role_in_project;
use crate::clock::Clock;
use crate::error::{AccessError, AccessResult};
use crate::models::{Membership, Project, ProjectRole};
use crate::store::{Store, StoreError, UnitOfWork};

/// Locks a project for mutation, or reports it missing
pub(crate) async fn lock_existing_project(
    uow: &mut dyn UnitOfWork,
    project_id: Uuid,
) -> AccessResult<Project> {
    uow.lock_project(project_id)
        .await?
        .ok_or_else(|| AccessError::not_found("Project"))
}

/// Adds `user_id` to a project
///
/// # Errors
///
/// - `NotFound` if the project or user doesn't exist
/// - `Conflict` if the user is already a member
pub async fn add_member(
    uow: &mut dyn UnitOfWork,
    project_id: Uuid,
    user_id: Uuid,
    role: ProjectRole,
    now: DateTime<Utc>,
) -> AccessResult<Membership> {
    lock_existing_project(uow, project_id).await?;
    insert_membership(uow, Membership::new(project_id, user_id, role, now)).await
}

/// Inserts a membership row into an already locked project
pub(crate) async fn insert_membership(
    uow: &mut dyn UnitOfWork,
    membership: Membership,
) -> AccessResult<Membership> {
    if uow
        .get_membership(membership.project_id, membership.user_id)
        .await?
        .is_some()
    {
        return Err(AccessError::Conflict(
            "User is already a member of this project".to_string(),
        ));
    }

    match uow.insert_membership(&membership).await {
        Ok(()) => {}
        Err(StoreError::AlreadyExists) => {
            return Err(AccessError::Conflict(
                "User is already a member of this project".to_string(),
            ))
        }
        Err(StoreError::NotFound) => return Err(AccessError::not_found("User")),
        Err(e) => return Err(e.into()),
    }

    info!(
        project_id = %membership.project_id,
        user_id = %membership.user_id,
        role = %membership.role,
        "Member added"
    );

    Ok(membership)
}

/// Removes `user_id` from a project
///
/// # Errors
///
/// - `NotFound` if the project or membership doesn't exist
/// - `Conflict` if the user is the last owner
pub async fn remove_member(
    uow: &mut dyn UnitOfWork,
    project_id: Uuid,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> AccessResult<()> {
    let mut project = lock_existing_project(uow, project_id).await?;

    let membership = uow
        .get_membership(project_id, user_id)
        .await?
        .ok_or_else(|| AccessError::not_found("Member"))?;

    if membership.role == ProjectRole::Owner {
        ensure_another_owner(uow, project_id).await?;
    }

    if !uow.delete_membership(project_id, user_id).await? {
        return Err(AccessError::not_found("Member"));
    }

    info!(project_id = %project_id, user_id = %user_id, "Member removed");

    refresh_owner_cache(uow, &mut project, now).await
}

/// Changes the role of an existing member
///
/// Setting the role a member already has is a no-op.
///
/// # Errors
///
/// - `NotFound` if the project or membership doesn't exist
/// - `Conflict` if this would demote the last owner
pub async fn change_role(
    uow: &mut dyn UnitOfWork,
    project_id: Uuid,
    user_id: Uuid,
    role: ProjectRole,
    now: DateTime<Utc>,
) -> AccessResult<Membership> {
    let mut project = lock_existing_project(uow, project_id).await?;

    let mut membership = uow
        .get_membership(project_id, user_id)
        .await?
        .ok_or_else(|| AccessError::not_found("Member"))?;

    if membership.role == role {
        return Ok(membership);
    }

    if membership.role == ProjectRole::Owner {
        ensure_another_owner(uow, project_id).await?;
    }

    if !uow.update_membership_role(project_id, user_id, role).await? {
        return Err(AccessError::not_found("Member"));
    }

    info!(
        project_id = %project_id,
        user_id = %user_id,
        from = %membership.role,
        to = %role,
        "Member role changed"
    );
    membership.role = role;

    refresh_owner_cache(uow, &mut project, now).await?;
    Ok(membership)
}

/// Fails with `Conflict` unless an owner other than the one being changed remains
async fn ensure_another_owner(uow: &mut dyn UnitOfWork, project_id: Uuid) -> AccessResult<()> {
    let owners = uow
        .count_members_with_role(project_id, ProjectRole::Owner)
        .await?;

    if owners <= 1 {
        return Err(AccessError::Conflict(
            "A project must keep at least one owner".to_string(),
        ));
    }

    Ok(())
}

/// Points `project.owner_id` at a current owner if it no longer is one
async fn refresh_owner_cache(
    uow: &mut dyn UnitOfWork,
    project: &mut Project,
    now: DateTime<Utc>,
) -> AccessResult<()> {
    let members = uow.list_memberships(project.id).await?;

    let cached_is_owner = members
        .iter()
        .any(|m| m.user_id == project.owner_id && m.role == ProjectRole::Owner);
    if cached_is_owner {
        return Ok(());
    }

    // Memberships are listed oldest first
    let Some(next) = members.iter().find(|m| m.role == ProjectRole::Owner) else {
        warn!(project_id = %project.id, "Project has no owner membership");
        return Ok(());
    };

    info!(
        project_id = %project.id,
        from = %project.owner_id,
        to = %next.user_id,
        "Repointing project owner"
    );

    project.owner_id = next.user_id;
    project.updated_at = now;
    if !uow.update_project(project).await? {
        return Err(AccessError::not_found("Project"));
    }

    Ok(())
}

/// Authorized membership operations
///
/// Managing members requires [`ProjectAction::ManageMembers`] (owners).
/// Anyone may leave a project, unless they are its last owner.
#[derive(Clone)]
pub struct MembershipService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl MembershipService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn add_member(
        &self,
        caller: Uuid,
        project_id: Uuid,
        user_id: Uuid,
        role: ProjectRole,
    ) -> AccessResult<Membership> {
        let mut uow = self.store.begin().await?;
        lock_existing_project(uow.as_mut(), project_id).await?;
        require(
            uow.as_mut(),
            caller,
            ProjectAction::ManageMembers.into(),
            Resource::Project(project_id),
        )
        .await?;

        let membership = add_member(uow.as_mut(), project_id, user_id, role, self.clock.now()).await?;
        uow.commit().await?;
        Ok(membership)
    }

    pub async fn change_role(
        &self,
        caller: Uuid,
        project_id: Uuid,
        user_id: Uuid,
        role: ProjectRole,
    ) -> AccessResult<Membership> {
        let mut uow = self.store.begin().await?;
        lock_existing_project(uow.as_mut(), project_id).await?;
        require(
            uow.as_mut(),
            caller,
            ProjectAction::ManageMembers.into(),
            Resource::Project(project_id),
        )
        .await?;

        let membership =
            change_role(uow.as_mut(), project_id, user_id, role, self.clock.now()).await?;
        uow.commit().await?;
        Ok(membership)
    }

    /// Removes a member; `caller == user_id` means leaving the project
    ///
    /// Leaving requires a role in the project, otherwise `Forbidden`.
    pub async fn remove_member(
        &self,
        caller: Uuid,
        project_id: Uuid,
        user_id: Uuid,
    ) -> AccessResult<()> {
        let mut uow = self.store.begin().await?;
        let project = lock_existing_project(uow.as_mut(), project_id).await?;
        if caller == user_id {
            if role_in_project(uow.as_mut(), caller, &project).await?.is_none() {
                return Err(AccessError::Forbidden);
            }
        } else {
            require(
                uow.as_mut(),
                caller,
                ProjectAction::ManageMembers.into(),
                Resource::Project(project_id),
            )
            .await?;
        }

        remove_member(uow.as_mut(), project_id, user_id, self.clock.now()).await?;
        uow.commit().await?;
        Ok(())
    }

    /// Lists members, oldest first
    pub async fn list_members(&self, caller: Uuid, project_id: Uuid) -> AccessResult<Vec<Membership>> {
        let mut uow = self.store.begin().await?;
        if uow.get_project(project_id).await?.is_none() {
            return Err(AccessError::not_found("Project"));
        }
        require(
            uow.as_mut(),
            caller,
            ProjectAction::View.into(),
            Resource::Project(project_id),
        )
        .await?;

        Ok(uow.list_memberships(project_id).await?)
    }
}
