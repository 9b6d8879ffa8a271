/// Storage abstraction for the access core
///
/// Every read and write happens inside a [`UnitOfWork`] opened with
/// [`Store::begin`]. A unit of work is either committed or dropped; dropping
/// it discards every change made through it, so a failed operation never
/// leaves partial state behind.
///
/// # Backends
///
/// - [`postgres::PgStore`]: sqlx transactions, row locks on the project row
/// - [`memory::MemoryStore`]: a single async mutex serializes units of work
///
/// # Example
///
/// ```no_run
/// use tasklane_access::store::{memory::MemoryStore, Store};
/// use uuid::Uuid;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryStore::new();
///
/// let mut uow = store.begin().await?;
/// let project = uow.get_project(Uuid::new_v4()).await?;
/// assert!(project.is_none());
/// uow.commit().await?;
/// # Ok(())
/// # }
/// ```

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    Invitation, InvitationStatus, InvitationTransition, Membership, Project, ProjectRole, Task,
    User,
};

/// Uniform error type for all storage backends
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A referenced row does not exist
    #[error("not found")]
    NotFound,

    /// A uniqueness constraint rejected the write
    #[error("already exists")]
    AlreadyExists,

    /// A concurrent writer got there first
    #[error("conflict")]
    Conflict,

    /// Anything else the backend reports
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    StoreError::AlreadyExists
                } else if db_err.is_foreign_key_violation() {
                    StoreError::NotFound
                } else {
                    StoreError::Backend(db_err.to_string())
                }
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Entry point of a storage backend
#[async_trait]
pub trait Store: Send + Sync {
    /// Opens a unit of work
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;
}

/// An open transaction against the store
///
/// Lookups return `Ok(None)` for missing rows. Writes that violate a
/// uniqueness constraint return [`StoreError::AlreadyExists`].
#[async_trait]
pub trait UnitOfWork: Send {
    // Users

    async fn insert_user(&mut self, user: &User) -> Result<(), StoreError>;

    async fn get_user(&mut self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Case-insensitive email lookup
    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError>;

    // Projects

    async fn insert_project(&mut self, project: &Project) -> Result<(), StoreError>;

    async fn get_project(&mut self, id: Uuid) -> Result<Option<Project>, StoreError>;

    /// Loads a project and holds it locked until the unit of work ends
    ///
    /// Membership and invitation mutations call this first so that
    /// concurrent mutations of the same project are serialized.
    async fn lock_project(&mut self, id: Uuid) -> Result<Option<Project>, StoreError>;

    /// Returns false if the project no longer exists
    async fn update_project(&mut self, project: &Project) -> Result<bool, StoreError>;

    async fn delete_project(&mut self, id: Uuid) -> Result<bool, StoreError>;

    // Memberships

    async fn get_membership(
        &mut self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, StoreError>;

    async fn list_memberships(&mut self, project_id: Uuid) -> Result<Vec<Membership>, StoreError>;

    async fn insert_membership(&mut self, membership: &Membership) -> Result<(), StoreError>;

    async fn update_membership_role(
        &mut self,
        project_id: Uuid,
        user_id: Uuid,
        role: ProjectRole,
    ) -> Result<bool, StoreError>;

    async fn delete_membership(&mut self, project_id: Uuid, user_id: Uuid)
        -> Result<bool, StoreError>;

    async fn count_members_with_role(
        &mut self,
        project_id: Uuid,
        role: ProjectRole,
    ) -> Result<i64, StoreError>;

    // Tasks

    async fn insert_task(&mut self, task: &Task) -> Result<(), StoreError>;

    async fn get_task(&mut self, id: Uuid) -> Result<Option<Task>, StoreError>;

    async fn list_project_tasks(&mut self, project_id: Uuid) -> Result<Vec<Task>, StoreError>;

    async fn list_personal_tasks(&mut self, creator_id: Uuid) -> Result<Vec<Task>, StoreError>;

    // Invitations

    async fn insert_invitation(&mut self, invitation: &Invitation) -> Result<(), StoreError>;

    async fn get_invitation(&mut self, id: Uuid) -> Result<Option<Invitation>, StoreError>;

    async fn find_invitation_by_token_hash(
        &mut self,
        token_hash: &str,
    ) -> Result<Option<Invitation>, StoreError>;

    /// The stored-pending invitation for a normalized email, if any
    async fn find_pending_invitation(
        &mut self,
        project_id: Uuid,
        email: &str,
    ) -> Result<Option<Invitation>, StoreError>;

    async fn list_invitations(&mut self, project_id: Uuid) -> Result<Vec<Invitation>, StoreError>;

    /// Conditional update guarded on the row still being in `expected`
    ///
    /// Returns `None` if the row is missing or no longer in `expected`.
    async fn transition_invitation(
        &mut self,
        id: Uuid,
        expected: InvitationStatus,
        change: &InvitationTransition,
    ) -> Result<Option<Invitation>, StoreError>;

    /// Makes every change visible to other units of work
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
