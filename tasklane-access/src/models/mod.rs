/// Database models for Tasklane access control
///
/// This module contains the persisted entities and their Postgres queries.
/// Queries take a `&mut PgConnection` so they can run inside the transaction
/// opened by [`crate::store::postgres::PgStore`].
///
/// # Models
///
/// - `user`: Principals known to the identity subsystem
/// - `project`: Projects and their cached owner reference
/// - `membership`: User-project relationships with roles
/// - `task`: Project and personal tasks
/// - `invitation`: Time-bounded invitation tokens

pub mod invitation;
pub mod membership;
pub mod project;
pub mod task;
pub mod user;

pub use invitation::{Invitation, InvitationStatus, InvitationTransition, NewInvitation};
pub use membership::{Membership, ProjectRole};
pub use project::{CreateProject, Project};
pub use task::{CreateTask, Task, TaskStatus};
pub use user::{CreateUser, User};
