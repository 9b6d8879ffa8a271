/// In-memory storage backend
///
/// Mirrors the Postgres schema constraints (primary keys, foreign keys, the
/// case-insensitive email index, unique token digests and one pending
/// invitation per email) without a database. Used by tests and local tooling.
///
/// A unit of work holds the store's async mutex for its whole lifetime and
/// writes straight into the shared state, recording the previous version of
/// every row it touches. `commit` forgets that log; dropping the unit of work
/// replays it backwards. Units of work are therefore fully serialized, and
/// starting one costs nothing regardless of how many rows are stored.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{Store, StoreError, UnitOfWork};
use crate::models::user::normalize_email;
use crate::models::{
    Invitation, InvitationStatus, InvitationTransition, Membership, Project, ProjectRole, Task,
    User,
};

type MembershipKey = (Uuid, Uuid);

/// Rows plus the secondary indexes backing the unique constraints
#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    user_emails: HashMap<String, Uuid>,
    projects: HashMap<Uuid, Project>,
    memberships: HashMap<MembershipKey, Membership>,
    tasks: HashMap<Uuid, Task>,
    invitations: HashMap<Uuid, Invitation>,
    invitation_tokens: HashMap<String, Uuid>,
    pending_invitations: HashMap<(Uuid, String), Uuid>,
}

// Each `put_*` replaces (or with `None` removes) one row, keeps the indexes in
// step, and returns the row it replaced. Callers check constraints first.
impl MemoryState {
    fn put_user(&mut self, id: Uuid, row: Option<User>) -> Option<User> {
        let old = self.users.remove(&id);
        if let Some(old) = &old {
            self.user_emails.remove(&normalize_email(&old.email));
        }
        if let Some(user) = row {
            self.user_emails.insert(normalize_email(&user.email), id);
            self.users.insert(id, user);
        }
        old
    }

    fn put_project(&mut self, id: Uuid, row: Option<Project>) -> Option<Project> {
        match row {
            Some(project) => self.projects.insert(id, project),
            None => self.projects.remove(&id),
        }
    }

    fn put_membership(&mut self, key: MembershipKey, row: Option<Membership>) -> Option<Membership> {
        match row {
            Some(membership) => self.memberships.insert(key, membership),
            None => self.memberships.remove(&key),
        }
    }

    fn put_task(&mut self, id: Uuid, row: Option<Task>) -> Option<Task> {
        match row {
            Some(task) => self.tasks.insert(id, task),
            None => self.tasks.remove(&id),
        }
    }

    fn put_invitation(&mut self, id: Uuid, row: Option<Invitation>) -> Option<Invitation> {
        let old = self.invitations.remove(&id);
        if let Some(old) = &old {
            self.invitation_tokens.remove(&old.token_hash);
            if old.status == InvitationStatus::Pending {
                self.pending_invitations
                    .remove(&(old.project_id, old.email.clone()));
            }
        }
        if let Some(invitation) = row {
            self.invitation_tokens
                .insert(invitation.token_hash.clone(), id);
            if invitation.status == InvitationStatus::Pending {
                self.pending_invitations
                    .insert((invitation.project_id, invitation.email.clone()), id);
            }
            self.invitations.insert(id, invitation);
        }
        old
    }
}

/// Previous version of a row written by an open unit of work
#[derive(Debug)]
enum Undo {
    User(Uuid, Option<User>),
    Project(Uuid, Option<Project>),
    Membership(MembershipKey, Option<Membership>),
    Task(Uuid, Option<Task>),
    Invitation(Uuid, Option<Invitation>),
}

/// Store keeping every row in process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let state = self.state.clone().lock_owned().await;
        Ok(Box::new(MemoryUnitOfWork {
            state,
            undo: Vec::new(),
        }))
    }
}

/// Exclusive view of the in-memory state
pub struct MemoryUnitOfWork {
    state: OwnedMutexGuard<MemoryState>,
    undo: Vec<Undo>,
}

impl Drop for MemoryUnitOfWork {
    fn drop(&mut self) {
        while let Some(entry) = self.undo.pop() {
            match entry {
                Undo::User(id, row) => {
                    self.state.put_user(id, row);
                }
                Undo::Project(id, row) => {
                    self.state.put_project(id, row);
                }
                Undo::Membership(key, row) => {
                    self.state.put_membership(key, row);
                }
                Undo::Task(id, row) => {
                    self.state.put_task(id, row);
                }
                Undo::Invitation(id, row) => {
                    self.state.put_invitation(id, row);
                }
            }
        }
    }
}

impl MemoryUnitOfWork {
    fn require_project(&self, id: Uuid) -> Result<(), StoreError> {
        if self.state.projects.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }

    fn require_user(&self, id: Uuid) -> Result<(), StoreError> {
        if self.state.users.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }

    fn write_user(&mut self, id: Uuid, row: Option<User>) {
        let old = self.state.put_user(id, row);
        self.undo.push(Undo::User(id, old));
    }

    fn write_project(&mut self, id: Uuid, row: Option<Project>) {
        let old = self.state.put_project(id, row);
        self.undo.push(Undo::Project(id, old));
    }

    fn write_membership(&mut self, key: MembershipKey, row: Option<Membership>) {
        let old = self.state.put_membership(key, row);
        self.undo.push(Undo::Membership(key, old));
    }

    fn write_task(&mut self, id: Uuid, row: Option<Task>) {
        let old = self.state.put_task(id, row);
        self.undo.push(Undo::Task(id, old));
    }

    fn write_invitation(&mut self, id: Uuid, row: Option<Invitation>) {
        let old = self.state.put_invitation(id, row);
        self.undo.push(Undo::Invitation(id, old));
    }

    fn sorted<T, K: Ord>(mut rows: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
        rows.sort_by_key(key);
        rows
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn insert_user(&mut self, user: &User) -> Result<(), StoreError> {
        let taken = self.state.users.contains_key(&user.id)
            || self
                .state
                .user_emails
                .contains_key(&normalize_email(&user.email));
        if taken {
            return Err(StoreError::AlreadyExists);
        }
        self.write_user(user.id, Some(user.clone()));
        Ok(())
    }

    async fn get_user(&mut self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.state.users.get(&id).cloned())
    }

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .state
            .user_emails
            .get(&normalize_email(email))
            .and_then(|id| self.state.users.get(id))
            .cloned())
    }

    async fn insert_project(&mut self, project: &Project) -> Result<(), StoreError> {
        self.require_user(project.owner_id)?;
        if self.state.projects.contains_key(&project.id) {
            return Err(StoreError::AlreadyExists);
        }
        self.write_project(project.id, Some(project.clone()));
        Ok(())
    }

    async fn get_project(&mut self, id: Uuid) -> Result<Option<Project>, StoreError> {
        Ok(self.state.projects.get(&id).cloned())
    }

    async fn lock_project(&mut self, id: Uuid) -> Result<Option<Project>, StoreError> {
        // the unit of work already holds the store-wide lock
        self.get_project(id).await
    }

    async fn update_project(&mut self, project: &Project) -> Result<bool, StoreError> {
        self.require_user(project.owner_id)?;
        let Some(mut row) = self.state.projects.get(&project.id).cloned() else {
            return Ok(false);
        };
        row.name = project.name.clone();
        row.owner_id = project.owner_id;
        row.archived = project.archived;
        row.updated_at = project.updated_at;
        self.write_project(project.id, Some(row));
        Ok(true)
    }

    async fn delete_project(&mut self, id: Uuid) -> Result<bool, StoreError> {
        if !self.state.projects.contains_key(&id) {
            return Ok(false);
        }

        let memberships: Vec<MembershipKey> = self
            .state
            .memberships
            .keys()
            .filter(|(project_id, _)| *project_id == id)
            .copied()
            .collect();
        let tasks: Vec<Uuid> = self
            .state
            .tasks
            .values()
            .filter(|t| t.project_id == Some(id))
            .map(|t| t.id)
            .collect();
        let invitations: Vec<Uuid> = self
            .state
            .invitations
            .values()
            .filter(|i| i.project_id == id)
            .map(|i| i.id)
            .collect();

        for key in memberships {
            self.write_membership(key, None);
        }
        for task_id in tasks {
            self.write_task(task_id, None);
        }
        for invitation_id in invitations {
            self.write_invitation(invitation_id, None);
        }
        self.write_project(id, None);
        Ok(true)
    }

    async fn get_membership(
        &mut self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, StoreError> {
        Ok(self.state.memberships.get(&(project_id, user_id)).cloned())
    }

    async fn list_memberships(&mut self, project_id: Uuid) -> Result<Vec<Membership>, StoreError> {
        let rows = self
            .state
            .memberships
            .values()
            .filter(|m| m.project_id == project_id)
            .cloned()
            .collect();
        Ok(Self::sorted(rows, |m: &Membership| (m.created_at, m.user_id)))
    }

    async fn insert_membership(&mut self, membership: &Membership) -> Result<(), StoreError> {
        self.require_project(membership.project_id)?;
        self.require_user(membership.user_id)?;
        let key = (membership.project_id, membership.user_id);
        if self.state.memberships.contains_key(&key) {
            return Err(StoreError::AlreadyExists);
        }
        self.write_membership(key, Some(membership.clone()));
        Ok(())
    }

    async fn update_membership_role(
        &mut self,
        project_id: Uuid,
        user_id: Uuid,
        role: ProjectRole,
    ) -> Result<bool, StoreError> {
        let key = (project_id, user_id);
        let Some(mut row) = self.state.memberships.get(&key).cloned() else {
            return Ok(false);
        };
        row.role = role;
        self.write_membership(key, Some(row));
        Ok(true)
    }

    async fn delete_membership(
        &mut self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, StoreError> {
        let key = (project_id, user_id);
        if !self.state.memberships.contains_key(&key) {
            return Ok(false);
        }
        self.write_membership(key, None);
        Ok(true)
    }

    async fn count_members_with_role(
        &mut self,
        project_id: Uuid,
        role: ProjectRole,
    ) -> Result<i64, StoreError> {
        let count = self
            .state
            .memberships
            .values()
            .filter(|m| m.project_id == project_id && m.role == role)
            .count();
        Ok(count as i64)
    }

    async fn insert_task(&mut self, task: &Task) -> Result<(), StoreError> {
        if let Some(project_id) = task.project_id {
            self.require_project(project_id)?;
        }
        self.require_user(task.creator_id)?;
        if let Some(assignee_id) = task.assignee_id {
            self.require_user(assignee_id)?;
        }
        if self.state.tasks.contains_key(&task.id) {
            return Err(StoreError::AlreadyExists);
        }
        self.write_task(task.id, Some(task.clone()));
        Ok(())
    }

    async fn get_task(&mut self, id: Uuid) -> Result<Option<Task>, StoreError> {
        Ok(self.state.tasks.get(&id).cloned())
    }

    async fn list_project_tasks(&mut self, project_id: Uuid) -> Result<Vec<Task>, StoreError> {
        let rows = self
            .state
            .tasks
            .values()
            .filter(|t| t.project_id == Some(project_id))
            .cloned()
            .collect();
        Ok(Self::sorted(rows, |t: &Task| (std::cmp::Reverse(t.created_at), t.id)))
    }

    async fn list_personal_tasks(&mut self, creator_id: Uuid) -> Result<Vec<Task>, StoreError> {
        let rows = self
            .state
            .tasks
            .values()
            .filter(|t| t.project_id.is_none() && t.creator_id == creator_id)
            .cloned()
            .collect();
        Ok(Self::sorted(rows, |t: &Task| (std::cmp::Reverse(t.created_at), t.id)))
    }

    async fn insert_invitation(&mut self, invitation: &Invitation) -> Result<(), StoreError> {
        self.require_project(invitation.project_id)?;
        self.require_user(invitation.invited_by)?;

        let pending_clash = invitation.status == InvitationStatus::Pending
            && self
                .state
                .pending_invitations
                .contains_key(&(invitation.project_id, invitation.email.clone()));
        let duplicate = self.state.invitations.contains_key(&invitation.id)
            || self
                .state
                .invitation_tokens
                .contains_key(&invitation.token_hash)
            || pending_clash;
        if duplicate {
            return Err(StoreError::AlreadyExists);
        }

        self.write_invitation(invitation.id, Some(invitation.clone()));
        Ok(())
    }

    async fn get_invitation(&mut self, id: Uuid) -> Result<Option<Invitation>, StoreError> {
        Ok(self.state.invitations.get(&id).cloned())
    }

    async fn find_invitation_by_token_hash(
        &mut self,
        token_hash: &str,
    ) -> Result<Option<Invitation>, StoreError> {
        Ok(self
            .state
            .invitation_tokens
            .get(token_hash)
            .and_then(|id| self.state.invitations.get(id))
            .cloned())
    }

    async fn find_pending_invitation(
        &mut self,
        project_id: Uuid,
        email: &str,
    ) -> Result<Option<Invitation>, StoreError> {
        Ok(self
            .state
            .pending_invitations
            .get(&(project_id, email.to_string()))
            .and_then(|id| self.state.invitations.get(id))
            .cloned())
    }

    async fn list_invitations(&mut self, project_id: Uuid) -> Result<Vec<Invitation>, StoreError> {
        let rows = self
            .state
            .invitations
            .values()
            .filter(|i| i.project_id == project_id)
            .cloned()
            .collect();
        Ok(Self::sorted(rows, |i: &Invitation| {
            (std::cmp::Reverse(i.created_at), i.id)
        }))
    }

    async fn transition_invitation(
        &mut self,
        id: Uuid,
        expected: InvitationStatus,
        change: &InvitationTransition,
    ) -> Result<Option<Invitation>, StoreError> {
        let mut row = match self.state.invitations.get(&id) {
            Some(row) if row.status == expected => row.clone(),
            _ => return Ok(None),
        };

        // the same constraints as insert: unique token digest, one pending per email
        let held_by_other = |owner: Option<&Uuid>| owner.is_some_and(|other| *other != id);
        let token_clash = change
            .token_hash
            .as_ref()
            .is_some_and(|hash| held_by_other(self.state.invitation_tokens.get(hash)));
        let pending_clash = change.status == InvitationStatus::Pending
            && held_by_other(
                self.state
                    .pending_invitations
                    .get(&(row.project_id, row.email.clone())),
            );
        if token_clash || pending_clash {
            return Err(StoreError::AlreadyExists);
        }

        change.apply(&mut row);
        self.write_invitation(id, Some(row.clone()));
        Ok(Some(row))
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.undo.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::generate_invitation_token;
    use crate::models::{CreateProject, CreateUser, NewInvitation};
    use chrono::{Duration, Utc};

    async fn seed(store: &MemoryStore) -> (User, Project) {
        let user = User::new(CreateUser {
            email: "Owner@Example.com".to_string(),
            name: None,
        });
        let project = Project::new(
            user.id,
            CreateProject {
                name: "Alpha".to_string(),
            },
            Utc::now(),
        );

        let mut uow = store.begin().await.unwrap();
        uow.insert_user(&user).await.unwrap();
        uow.insert_project(&project).await.unwrap();
        uow.commit().await.unwrap();

        (user, project)
    }

    fn invitation(project: &Project, inviter: &User, email: &str) -> Invitation {
        let (_, token_hash) = generate_invitation_token();
        let now = Utc::now();
        Invitation::new(
            NewInvitation {
                project_id: project.id,
                email: email.to_string(),
                role: ProjectRole::Member,
                token_hash,
                invited_by: inviter.id,
                expires_at: now + Duration::hours(72),
            },
            now,
        )
    }

    #[tokio::test]
    async fn test_dropped_unit_of_work_rolls_back() {
        let store = MemoryStore::new();
        let (user, project) = seed(&store).await;

        {
            let mut uow = store.begin().await.unwrap();
            let m = Membership::new(project.id, user.id, ProjectRole::Owner, Utc::now());
            uow.insert_membership(&m).await.unwrap();
            // dropped without commit
        }

        let mut uow = store.begin().await.unwrap();
        assert!(uow.get_membership(project.id, user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_committed_changes_are_visible() {
        let store = MemoryStore::new();
        let (user, project) = seed(&store).await;

        let mut uow = store.begin().await.unwrap();
        let m = Membership::new(project.id, user.id, ProjectRole::Owner, Utc::now());
        uow.insert_membership(&m).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        assert_eq!(uow.get_membership(project.id, user.id).await.unwrap(), Some(m));
        assert_eq!(
            uow.count_members_with_role(project.id, ProjectRole::Owner)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_duplicate_membership_rejected() {
        let store = MemoryStore::new();
        let (user, project) = seed(&store).await;

        let mut uow = store.begin().await.unwrap();
        let m = Membership::new(project.id, user.id, ProjectRole::Owner, Utc::now());
        uow.insert_membership(&m).await.unwrap();
        let err = uow.insert_membership(&m).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists));
    }

    #[tokio::test]
    async fn test_membership_requires_existing_rows() {
        let store = MemoryStore::new();
        let (_, project) = seed(&store).await;

        let mut uow = store.begin().await.unwrap();
        let m = Membership::new(project.id, Uuid::new_v4(), ProjectRole::Member, Utc::now());
        let err = uow.insert_membership(&m).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_user_email_unique_case_insensitive() {
        let store = MemoryStore::new();
        seed(&store).await;

        let mut uow = store.begin().await.unwrap();
        let dup = User::new(CreateUser {
            email: "owner@example.COM".to_string(),
            name: None,
        });
        let err = uow.insert_user(&dup).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists));

        let found = uow.find_user_by_email("OWNER@example.com").await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_delete_project_cascades() {
        let store = MemoryStore::new();
        let (user, project) = seed(&store).await;

        let mut uow = store.begin().await.unwrap();
        let m = Membership::new(project.id, user.id, ProjectRole::Owner, Utc::now());
        uow.insert_membership(&m).await.unwrap();
        assert!(uow.delete_project(project.id).await.unwrap());
        assert!(uow.list_memberships(project.id).await.unwrap().is_empty());
        assert!(!uow.delete_project(project.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_rollback_restores_invitation_indexes() {
        let store = MemoryStore::new();
        let (user, project) = seed(&store).await;
        let inv = invitation(&project, &user, "guest@x.com");

        {
            let mut uow = store.begin().await.unwrap();
            uow.insert_invitation(&inv).await.unwrap();
        }

        let mut uow = store.begin().await.unwrap();
        assert!(uow
            .find_invitation_by_token_hash(&inv.token_hash)
            .await
            .unwrap()
            .is_none());
        assert!(uow
            .find_pending_invitation(project.id, "guest@x.com")
            .await
            .unwrap()
            .is_none());
        uow.insert_invitation(&inv).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        let found = uow
            .find_invitation_by_token_hash(&inv.token_hash)
            .await
            .unwrap();
        assert_eq!(found.map(|i| i.id), Some(inv.id));
    }

    #[tokio::test]
    async fn test_rollback_restores_transitioned_invitation() {
        let store = MemoryStore::new();
        let (user, project) = seed(&store).await;
        let inv = invitation(&project, &user, "guest@x.com");

        let mut uow = store.begin().await.unwrap();
        uow.insert_invitation(&inv).await.unwrap();
        uow.commit().await.unwrap();

        {
            let mut uow = store.begin().await.unwrap();
            let (_, new_hash) = generate_invitation_token();
            let change = InvitationTransition::reissue(new_hash, Utc::now(), Utc::now());
            let reissued = uow
                .transition_invitation(inv.id, InvitationStatus::Pending, &change)
                .await
                .unwrap();
            assert!(reissued.is_some());
            assert!(uow
                .find_invitation_by_token_hash(&inv.token_hash)
                .await
                .unwrap()
                .is_none());
        }

        let mut uow = store.begin().await.unwrap();
        let found = uow
            .find_invitation_by_token_hash(&inv.token_hash)
            .await
            .unwrap();
        assert_eq!(found, Some(inv.clone()));

        // the pending slot is still held by the original row
        let second = invitation(&project, &user, "guest@x.com");
        let err = uow.insert_invitation(&second).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists));
    }

    #[tokio::test]
    async fn test_rollback_restores_deleted_project() {
        let store = MemoryStore::new();
        let (user, project) = seed(&store).await;

        let mut uow = store.begin().await.unwrap();
        let m = Membership::new(project.id, user.id, ProjectRole::Owner, Utc::now());
        uow.insert_membership(&m).await.unwrap();
        uow.insert_invitation(&invitation(&project, &user, "guest@x.com"))
            .await
            .unwrap();
        uow.commit().await.unwrap();

        {
            let mut uow = store.begin().await.unwrap();
            assert!(uow.delete_project(project.id).await.unwrap());
        }

        let mut uow = store.begin().await.unwrap();
        assert!(uow.get_project(project.id).await.unwrap().is_some());
        assert_eq!(uow.get_membership(project.id, user.id).await.unwrap(), Some(m));
        assert!(uow
            .find_pending_invitation(project.id, "guest@x.com")
            .await
            .unwrap()
            .is_some());
    }
}
