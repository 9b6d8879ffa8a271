/// Role resolution
///
/// A principal's role in a project comes from its membership row. The
/// project's `owner_id` column is only a cache kept current by
/// [`crate::membership`]; it is consulted when the row is missing so that the
/// project creator is never locked out, and that case is logged as a
/// consistency problem.
///
/// # Example
///
/// ```no_run
/// use tasklane_access::auth::roles::resolve_role;
/// use tasklane_access::store::memory::MemoryStore;
/// use uuid::Uuid;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryStore::new();
/// let role = resolve_role(&store, Uuid::new_v4(), Uuid::new_v4()).await?;
/// assert!(role.is_none());
/// # Ok(())
/// # }
/// ```

use tracing::warn;
use uuid::Uuid;

use crate::error::AccessResult;
use crate::models::{Project, ProjectRole};
use crate::store::{Store, StoreError, UnitOfWork};

/// Role of `principal` in an already loaded project
pub async fn role_in_project(
    uow: &mut dyn UnitOfWork,
    principal: Uuid,
    project: &Project,
) -> Result<Option<ProjectRole>, StoreError> {
    if let Some(membership) = uow.get_membership(project.id, principal).await? {
        return Ok(Some(membership.role));
    }

    if project.owner_id == principal {
        warn!(
            project_id = %project.id,
            user_id = %principal,
            "Project owner has no membership row; falling back to owner_id"
        );
        return Ok(Some(ProjectRole::Owner));
    }

    Ok(None)
}

/// Role of `principal` in `project_id`, or `None` if the project is unknown
pub async fn resolve_role_in(
    uow: &mut dyn UnitOfWork,
    principal: Uuid,
    project_id: Uuid,
) -> Result<Option<ProjectRole>, StoreError> {
    match uow.get_project(project_id).await? {
        Some(project) => role_in_project(uow, principal, &project).await,
        None => Ok(None),
    }
}

/// Resolves a role in its own read-only unit of work
///
/// Meant for UI hints. Authorization decisions go through
/// [`crate::auth::permissions::can`] instead.
pub async fn resolve_role(
    store: &dyn Store,
    principal: Uuid,
    project_id: Uuid,
) -> AccessResult<Option<ProjectRole>> {
    let mut uow = store.begin().await?;
    let role = resolve_role_in(uow.as_mut(), principal, project_id).await?;
    // Read-only: dropping the unit of work rolls back nothing
    drop(uow);
    Ok(role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateProject, CreateUser, Membership, User};
    use crate::store::memory::MemoryStore;
    use chrono::Utc;

    async fn seed(store: &MemoryStore) -> (User, Project) {
        let owner = User::new(CreateUser {
            email: "owner@x.com".to_string(),
            name: None,
        });
        let project = Project::new(
            owner.id,
            CreateProject {
                name: "Roadmap".to_string(),
            },
            Utc::now(),
        );

        let mut uow = store.begin().await.unwrap();
        uow.insert_user(&owner).await.unwrap();
        uow.insert_project(&project).await.unwrap();
        uow.commit().await.unwrap();

        (owner, project)
    }

    #[tokio::test]
    async fn test_membership_row_is_canonical() {
        let store = MemoryStore::new();
        let (owner, project) = seed(&store).await;

        let viewer = User::new(CreateUser {
            email: "viewer@x.com".to_string(),
            name: None,
        });
        let mut uow = store.begin().await.unwrap();
        uow.insert_user(&viewer).await.unwrap();
        uow.insert_membership(&Membership::new(
            project.id,
            owner.id,
            ProjectRole::Owner,
            Utc::now(),
        ))
        .await
        .unwrap();
        uow.insert_membership(&Membership::new(
            project.id,
            viewer.id,
            ProjectRole::Viewer,
            Utc::now(),
        ))
        .await
        .unwrap();
        uow.commit().await.unwrap();

        assert_eq!(
            resolve_role(&store, owner.id, project.id).await.unwrap(),
            Some(ProjectRole::Owner)
        );
        assert_eq!(
            resolve_role(&store, viewer.id, project.id).await.unwrap(),
            Some(ProjectRole::Viewer)
        );
    }

    #[tokio::test]
    async fn test_owner_fallback_without_membership_row() {
        let store = MemoryStore::new();
        let (owner, project) = seed(&store).await;

        assert_eq!(
            resolve_role(&store, owner.id, project.id).await.unwrap(),
            Some(ProjectRole::Owner)
        );
    }

    #[tokio::test]
    async fn test_unknown_principal_and_project() {
        let store = MemoryStore::new();
        let (_, project) = seed(&store).await;

        assert_eq!(
            resolve_role(&store, Uuid::new_v4(), project.id).await.unwrap(),
            None
        );
        assert_eq!(
            resolve_role(&store, Uuid::new_v4(), Uuid::new_v4())
                .await
                .unwrap(),
            None
        );
    }
}
