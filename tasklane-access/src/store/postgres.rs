/// PostgreSQL storage backend
///
/// Each unit of work is a `sqlx` transaction. Queries live on the model types
/// (`models::*`); this module only routes them through the open transaction.
///
/// # Isolation
///
/// Transactions run at Postgres' default READ COMMITTED level. Correctness of
/// the access rules under concurrency relies on:
///
/// - `SELECT ... FOR UPDATE` on the project row before any membership or
///   invitation mutation (see [`UnitOfWork::lock_project`])
/// - conditional `UPDATE ... WHERE status = $expected` for invitation
///   transitions
/// - the partial unique index allowing one pending invitation per
///   (project, email), and the composite membership primary key
///
/// # Example
///
/// ```no_run
/// use tasklane_access::db::pool::{create_pool, DatabaseConfig};
/// use tasklane_access::store::postgres::PgStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
/// let store = PgStore::new(pool);
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::{Store, StoreError, UnitOfWork};
use crate::models::{
    Invitation, InvitationStatus, InvitationTransition, Membership, Project, ProjectRole, Task,
    User,
};

/// Store backed by a Postgres connection pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

/// An open Postgres transaction; rolled back on drop unless committed
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn insert_user(&mut self, user: &User) -> Result<(), StoreError> {
        Ok(User::insert(&mut self.tx, user).await?)
    }

    async fn get_user(&mut self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(User::find_by_id(&mut self.tx, id).await?)
    }

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(User::find_by_email(&mut self.tx, email).await?)
    }

    async fn insert_project(&mut self, project: &Project) -> Result<(), StoreError> {
        Ok(Project::insert(&mut self.tx, project).await?)
    }

    async fn get_project(&mut self, id: Uuid) -> Result<Option<Project>, StoreError> {
        Ok(Project::find_by_id(&mut self.tx, id).await?)
    }

    async fn lock_project(&mut self, id: Uuid) -> Result<Option<Project>, StoreError> {
        debug!(project_id = %id, "Locking project row");
        Ok(Project::lock(&mut self.tx, id).await?)
    }

    async fn update_project(&mut self, project: &Project) -> Result<bool, StoreError> {
        Ok(Project::update(&mut self.tx, project).await?)
    }

    async fn delete_project(&mut self, id: Uuid) -> Result<bool, StoreError> {
        Ok(Project::delete(&mut self.tx, id).await?)
    }

    async fn get_membership(
        &mut self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, StoreError> {
        Ok(Membership::find(&mut self.tx, project_id, user_id).await?)
    }

    async fn list_memberships(&mut self, project_id: Uuid) -> Result<Vec<Membership>, StoreError> {
        Ok(Membership::list_by_project(&mut self.tx, project_id).await?)
    }

    async fn insert_membership(&mut self, membership: &Membership) -> Result<(), StoreError> {
        Ok(Membership::insert(&mut self.tx, membership).await?)
    }

    async fn update_membership_role(
        &mut self,
        project_id: Uuid,
        user_id: Uuid,
        role: ProjectRole,
    ) -> Result<bool, StoreError> {
        Ok(Membership::update_role(&mut self.tx, project_id, user_id, role).await?)
    }

    async fn delete_membership(
        &mut self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, StoreError> {
        Ok(Membership::delete(&mut self.tx, project_id, user_id).await?)
    }

    async fn count_members_with_role(
        &mut self,
        project_id: Uuid,
        role: ProjectRole,
    ) -> Result<i64, StoreError> {
        Ok(Membership::count_by_role(&mut self.tx, project_id, role).await?)
    }

    async fn insert_task(&mut self, task: &Task) -> Result<(), StoreError> {
        Ok(Task::insert(&mut self.tx, task).await?)
    }

    async fn get_task(&mut self, id: Uuid) -> Result<Option<Task>, StoreError> {
        Ok(Task::find_by_id(&mut self.tx, id).await?)
    }

    async fn list_project_tasks(&mut self, project_id: Uuid) -> Result<Vec<Task>, StoreError> {
        Ok(Task::list_by_project(&mut self.tx, project_id).await?)
    }

    async fn list_personal_tasks(&mut self, creator_id: Uuid) -> Result<Vec<Task>, StoreError> {
        Ok(Task::list_personal(&mut self.tx, creator_id).await?)
    }

    async fn insert_invitation(&mut self, invitation: &Invitation) -> Result<(), StoreError> {
        Ok(Invitation::insert(&mut self.tx, invitation).await?)
    }

    async fn get_invitation(&mut self, id: Uuid) -> Result<Option<Invitation>, StoreError> {
        Ok(Invitation::find_by_id(&mut self.tx, id).await?)
    }

    async fn find_invitation_by_token_hash(
        &mut self,
        token_hash: &str,
    ) -> Result<Option<Invitation>, StoreError> {
        Ok(Invitation::find_by_token_hash(&mut self.tx, token_hash).await?)
    }

    async fn find_pending_invitation(
        &mut self,
        project_id: Uuid,
        email: &str,
    ) -> Result<Option<Invitation>, StoreError> {
        Ok(Invitation::find_pending(&mut self.tx, project_id, email).await?)
    }

    async fn list_invitations(&mut self, project_id: Uuid) -> Result<Vec<Invitation>, StoreError> {
        Ok(Invitation::list_by_project(&mut self.tx, project_id).await?)
    }

    async fn transition_invitation(
        &mut self,
        id: Uuid,
        expected: InvitationStatus,
        change: &InvitationTransition,
    ) -> Result<Option<Invitation>, StoreError> {
        Ok(Invitation::transition(&mut self.tx, id, expected, change).await?)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
