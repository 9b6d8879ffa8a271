/// Project and task operations
///
/// Creating a project also creates the creator's owner membership, in the
/// same unit of work, so a project is never visible without an owner.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tasklane_access::clock::SystemClock;
/// use tasklane_access::models::CreateProject;
/// use tasklane_access::projects::ProjectService;
/// use tasklane_access::store::memory::MemoryStore;
/// use uuid::Uuid;
///
/// # async fn example(creator: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let service = ProjectService::new(Arc::new(MemoryStore::new()), Arc::new(SystemClock));
/// let project = service
///     .create_project(creator, CreateProject { name: "Launch".to_string() })
///     .await?;
/// assert_eq!(project.owner_id, creator);
/// # Ok(())
/// # }
/// ```

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::permissions::{require, ProjectAction, Resource, TaskAction};
use crate::clock::Clock;
use crate::error::{AccessError, AccessResult};
use crate::membership::{insert_membership, lock_existing_project};
use crate::models::{CreateProject, CreateTask, Membership, Project, ProjectRole, Task};
use crate::store::{Store, StoreError};

/// Longest accepted project or task name, matching the `VARCHAR(255)` columns
const MAX_NAME_LENGTH: usize = 255;

fn validate_name(what: &str, name: &str) -> AccessResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AccessError::Invalid(format!("{} must not be empty", what)));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(AccessError::Invalid(format!(
            "{} must be at most {} characters",
            what, MAX_NAME_LENGTH
        )));
    }
    Ok(name.to_string())
}

/// Authorized project and task operations
#[derive(Clone)]
pub struct ProjectService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl ProjectService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Creates a project owned by `creator`
    ///
    /// # Errors
    ///
    /// - `Invalid` if the name is empty or too long
    /// - `NotFound` if `creator` is not a known user
    pub async fn create_project(&self, creator: Uuid, data: CreateProject) -> AccessResult<Project> {
        let name = validate_name("Project name", &data.name)?;
        let now = self.clock.now();
        let project = Project::new(creator, CreateProject { name }, now);

        let mut uow = self.store.begin().await?;
        match uow.insert_project(&project).await {
            Ok(()) => {}
            Err(StoreError::NotFound) => return Err(AccessError::not_found("User")),
            Err(e) => return Err(e.into()),
        }
        insert_membership(
            uow.as_mut(),
            Membership::new(project.id, creator, ProjectRole::Owner, now),
        )
        .await?;
        uow.commit().await?;

        info!(project_id = %project.id, owner_id = %creator, "Project created");
        Ok(project)
    }

    /// Marks a project archived; archiving twice is a no-op
    pub async fn archive_project(&self, caller: Uuid, project_id: Uuid) -> AccessResult<Project> {
        let mut uow = self.store.begin().await?;
        let mut project = lock_existing_project(uow.as_mut(), project_id).await?;
        require(
            uow.as_mut(),
            caller,
            ProjectAction::Archive.into(),
            Resource::Project(project_id),
        )
        .await?;

        if project.archived {
            return Ok(project);
        }

        project.archived = true;
        project.updated_at = self.clock.now();
        if !uow.update_project(&project).await? {
            return Err(AccessError::not_found("Project"));
        }
        uow.commit().await?;

        info!(project_id = %project_id, user_id = %caller, "Project archived");
        Ok(project)
    }

    /// Deletes a project with its memberships, tasks and invitations
    pub async fn delete_project(&self, caller: Uuid, project_id: Uuid) -> AccessResult<()> {
        let mut uow = self.store.begin().await?;
        lock_existing_project(uow.as_mut(), project_id).await?;
        require(
            uow.as_mut(),
            caller,
            ProjectAction::Delete.into(),
            Resource::Project(project_id),
        )
        .await?;

        if !uow.delete_project(project_id).await? {
            return Err(AccessError::not_found("Project"));
        }
        uow.commit().await?;

        info!(project_id = %project_id, user_id = %caller, "Project deleted");
        Ok(())
    }

    /// Creates a task, personal when `data.project_id` is `None`
    ///
    /// Assigning the task to someone other than the creator also requires
    /// `changeAssignee`, and the assignee must belong to the project. A
    /// personal task can only be assigned to its creator.
    pub async fn create_task(&self, caller: Uuid, data: CreateTask) -> AccessResult<Task> {
        let title = validate_name("Task title", &data.title)?;
        let data = CreateTask { title, ..data };

        let mut uow = self.store.begin().await?;

        if let Some(project_id) = data.project_id {
            if uow.get_project(project_id).await?.is_none() {
                return Err(AccessError::not_found("Project"));
            }
        }
        require(
            uow.as_mut(),
            caller,
            TaskAction::Create.into(),
            Resource::TaskDraft(&data),
        )
        .await?;

        if let Some(assignee) = data.assignee_id.filter(|&a| a != caller) {
            let Some(project_id) = data.project_id else {
                return Err(AccessError::Invalid(
                    "Personal tasks cannot be assigned to others".to_string(),
                ));
            };
            require(
                uow.as_mut(),
                caller,
                TaskAction::ChangeAssignee.into(),
                Resource::TaskDraft(&data),
            )
            .await?;
            if uow.get_membership(project_id, assignee).await?.is_none() {
                return Err(AccessError::Invalid(
                    "Assignee is not a member of this project".to_string(),
                ));
            }
        }

        let task = Task::new(caller, data, self.clock.now());
        uow.insert_task(&task).await?;
        uow.commit().await?;

        info!(
            task_id = %task.id,
            project_id = ?task.project_id,
            creator_id = %caller,
            "Task created"
        );
        Ok(task)
    }

    /// Loads a task the caller may view
    pub async fn get_task(&self, caller: Uuid, task_id: Uuid) -> AccessResult<Task> {
        let mut uow = self.store.begin().await?;
        let task = uow
            .get_task(task_id)
            .await?
            .ok_or_else(|| AccessError::not_found("Task"))?;

        require(uow.as_mut(), caller, TaskAction::View.into(), Resource::Task(&task)).await?;
        Ok(task)
    }
}
