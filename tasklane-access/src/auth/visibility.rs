/// Task list visibility
///
/// Bulk task lists are narrowed here, inside the data-access path, so tasks a
/// principal may not see never reach a response payload.
///
/// - A role granting `viewAll` (owner, collaborator) sees every task.
/// - A member sees the tasks they created or are assigned to.
/// - Anyone else gets an empty list. Viewers can still open individual
///   tasks through [`crate::auth::permissions::can`].

use tracing::debug;
use uuid::Uuid;

use super::permissions::{decide, TaskAction};
use super::roles::resolve_role_in;
use crate::error::AccessResult;
use crate::models::{ProjectRole, Task};
use crate::store::Store;

/// Narrows `tasks` to what `role` lets `principal` see in a bulk list
pub fn filter_visible_tasks(
    principal: Uuid,
    role: Option<ProjectRole>,
    tasks: Vec<Task>,
) -> Vec<Task> {
    match role {
        Some(role) if decide(Some(role), principal, TaskAction::ViewAll.into(), None) => tasks,
        Some(ProjectRole::Member) => tasks
            .into_iter()
            .filter(|task| task.involves(principal))
            .collect(),
        _ => Vec::new(),
    }
}

/// Lists the tasks of a project visible to `principal`
///
/// The role is resolved once, in the same unit of work that reads the tasks.
/// An unknown project yields an empty list.
pub async fn list_visible_tasks(
    store: &dyn Store,
    principal: Uuid,
    project_id: Uuid,
) -> AccessResult<Vec<Task>> {
    let mut uow = store.begin().await?;

    let role = resolve_role_in(uow.as_mut(), principal, project_id).await?;
    if role.is_none() {
        return Ok(Vec::new());
    }

    let tasks = uow.list_project_tasks(project_id).await?;
    let total = tasks.len();
    let visible = filter_visible_tasks(principal, role, tasks);

    debug!(
        user_id = %principal,
        project_id = %project_id,
        total,
        visible = visible.len(),
        "Filtered project tasks"
    );

    Ok(visible)
}

/// Lists the principal's own personal tasks
pub async fn list_personal_tasks(store: &dyn Store, principal: Uuid) -> AccessResult<Vec<Task>> {
    let mut uow = store.begin().await?;
    let tasks = uow.list_personal_tasks(principal).await?;

    // The store already filters by creator; keep the check next to the rule
    Ok(tasks
        .into_iter()
        .filter(|task| task.is_personal() && task.creator_id == principal)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateTask;
    use chrono::Utc;

    fn task(project_id: Uuid, creator: Uuid, assignee: Option<Uuid>) -> Task {
        Task::new(
            creator,
            CreateTask {
                project_id: Some(project_id),
                title: "Write release notes".to_string(),
                assignee_id: assignee,
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_filter_by_role() {
        let project = Uuid::new_v4();
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let tasks = vec![
            task(project, me, None),
            task(project, other, Some(me)),
            task(project, other, None),
        ];

        assert_eq!(
            filter_visible_tasks(me, Some(ProjectRole::Owner), tasks.clone()).len(),
            3
        );
        assert_eq!(
            filter_visible_tasks(me, Some(ProjectRole::Collaborator), tasks.clone()).len(),
            3
        );

        let member_view = filter_visible_tasks(me, Some(ProjectRole::Member), tasks.clone());
        assert_eq!(member_view.len(), 2);
        assert!(member_view.iter().all(|t| t.involves(me)));

        assert!(filter_visible_tasks(me, Some(ProjectRole::Viewer), tasks.clone()).is_empty());
        assert!(filter_visible_tasks(me, None, tasks).is_empty());
    }
}
