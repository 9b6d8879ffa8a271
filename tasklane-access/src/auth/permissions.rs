/// Permission evaluation
///
/// Every route handler calls [`can`] (or [`require`] inside a unit of work)
/// before mutating or returning data. The decision itself is the pure
/// function [`decide`]; everything else only gathers its inputs.
///
/// # Permission Matrix
///
/// | Role | Project actions | Task actions |
/// |---|---|---|
/// | owner | all | all |
/// | collaborator | view, edit | all |
/// | member | view | view/edit if creator or assignee; create; never delete, viewAll, changeAssignee |
/// | viewer | view | view |
/// | none | nothing | personal tasks: creator only |
///
/// Inviting users and managing members are owner-only.
///
/// # Failing Closed
///
/// A resource that cannot be loaded, whether missing or because the store
/// failed, is denied.
///
/// # Example
///
/// ```no_run
/// use tasklane_access::auth::permissions::{can, Action, ProjectAction, Resource};
/// use tasklane_access::store::memory::MemoryStore;
/// use uuid::Uuid;
///
/// # async fn example(principal: Uuid, project_id: Uuid) {
/// let store = MemoryStore::new();
/// let allowed = can(
///     &store,
///     principal,
///     Action::Project(ProjectAction::InviteUsers),
///     Resource::Project(project_id),
/// )
/// .await;
/// # }
/// ```

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};
use uuid::Uuid;

use super::roles::{resolve_role_in, role_in_project};
use crate::error::{AccessError, AccessResult};
use crate::models::{CreateTask, ProjectRole, Task};
use crate::store::{Store, StoreError, UnitOfWork};

/// Actions on a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ProjectAction {
    View,
    Edit,
    Archive,
    Delete,
    InviteUsers,
    ManageMembers,
}

impl ProjectAction {
    pub const ALL: [ProjectAction; 6] = [
        ProjectAction::View,
        ProjectAction::Edit,
        ProjectAction::Archive,
        ProjectAction::Delete,
        ProjectAction::InviteUsers,
        ProjectAction::ManageMembers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectAction::View => "view",
            ProjectAction::Edit => "edit",
            ProjectAction::Archive => "archive",
            ProjectAction::Delete => "delete",
            ProjectAction::InviteUsers => "inviteUsers",
            ProjectAction::ManageMembers => "manageMembers",
        }
    }
}

/// Actions on tasks
///
/// `ViewAll` governs bulk listing; the others apply to a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskAction {
    View,
    Create,
    Edit,
    Delete,
    ViewAll,
    ChangeAssignee,
}

impl TaskAction {
    pub const ALL: [TaskAction; 6] = [
        TaskAction::View,
        TaskAction::Create,
        TaskAction::Edit,
        TaskAction::Delete,
        TaskAction::ViewAll,
        TaskAction::ChangeAssignee,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskAction::View => "view",
            TaskAction::Create => "create",
            TaskAction::Edit => "edit",
            TaskAction::Delete => "delete",
            TaskAction::ViewAll => "viewAll",
            TaskAction::ChangeAssignee => "changeAssignee",
        }
    }
}

/// Any action the evaluator understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Project(ProjectAction),
    Task(TaskAction),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Project(action) => write!(f, "project:{}", action.as_str()),
            Action::Task(action) => write!(f, "task:{}", action.as_str()),
        }
    }
}

impl From<ProjectAction> for Action {
    fn from(action: ProjectAction) -> Self {
        Action::Project(action)
    }
}

impl From<TaskAction> for Action {
    fn from(action: TaskAction) -> Self {
        Action::Task(action)
    }
}

/// What an action is attempted on
#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    /// A project by id; task actions against it carry no specific task
    Project(Uuid),

    /// A task already loaded by the caller
    Task(&'a Task),

    /// A task to be loaded through the store
    TaskId(Uuid),

    /// A task about to be created by the principal
    TaskDraft(&'a CreateTask),
}

/// The parts of a task that decisions depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSubject {
    pub project_id: Option<Uuid>,
    pub creator_id: Uuid,
    pub assignee_id: Option<Uuid>,
}

impl TaskSubject {
    /// A draft is always created by the principal submitting it
    pub fn draft(principal: Uuid, draft: &CreateTask) -> Self {
        Self {
            project_id: draft.project_id,
            creator_id: principal,
            assignee_id: draft.assignee_id,
        }
    }

    fn involves(&self, user_id: Uuid) -> bool {
        self.creator_id == user_id || self.assignee_id == Some(user_id)
    }
}

impl From<&Task> for TaskSubject {
    fn from(task: &Task) -> Self {
        Self {
            project_id: task.project_id,
            creator_id: task.creator_id,
            assignee_id: task.assignee_id,
        }
    }
}

/// The permission matrix
///
/// `role` is the principal's role in the project the resource belongs to.
/// `task` is the task acted on, if any. Task actions without a task (listing
/// or creating against a project) only pass for roles that don't need
/// ownership, plus `Create` for members, whose draft is theirs by definition.
pub fn decide(
    role: Option<ProjectRole>,
    principal: Uuid,
    action: Action,
    task: Option<&TaskSubject>,
) -> bool {
    if let Some(task) = task {
        if task.project_id.is_none() {
            // Personal task: roles don't apply
            return matches!(action, Action::Task(_)) && task.creator_id == principal;
        }
    }

    let Some(role) = role else {
        return false;
    };

    match action {
        Action::Project(action) => decide_project(role, action),
        Action::Task(action) => decide_task(role, principal, action, task),
    }
}

fn decide_project(role: ProjectRole, action: ProjectAction) -> bool {
    match role {
        ProjectRole::Owner => true,
        ProjectRole::Collaborator => matches!(action, ProjectAction::View | ProjectAction::Edit),
        ProjectRole::Member | ProjectRole::Viewer => action == ProjectAction::View,
    }
}

fn decide_task(
    role: ProjectRole,
    principal: Uuid,
    action: TaskAction,
    task: Option<&TaskSubject>,
) -> bool {
    match role {
        ProjectRole::Owner | ProjectRole::Collaborator => true,
        ProjectRole::Member => match action {
            TaskAction::View | TaskAction::Create | TaskAction::Edit => match task {
                Some(task) => task.involves(principal),
                None => action == TaskAction::Create,
            },
            TaskAction::Delete | TaskAction::ViewAll | TaskAction::ChangeAssignee => false,
        },
        ProjectRole::Viewer => action == TaskAction::View,
    }
}

/// Evaluates a permission inside an open unit of work
///
/// Returns `Ok(false)` for missing resources; store failures propagate.
pub async fn can_in(
    uow: &mut dyn UnitOfWork,
    principal: Uuid,
    action: Action,
    resource: Resource<'_>,
) -> Result<bool, StoreError> {
    let subject = match resource {
        Resource::Project(project_id) => {
            // Unknown project resolves to no role
            let role = resolve_role_in(uow, principal, project_id).await?;
            return Ok(decide(role, principal, action, None));
        }
        Resource::Task(task) => TaskSubject::from(task),
        Resource::TaskId(task_id) => match uow.get_task(task_id).await? {
            Some(task) => TaskSubject::from(&task),
            None => return Ok(false),
        },
        Resource::TaskDraft(draft) => TaskSubject::draft(principal, draft),
    };

    let role = match subject.project_id {
        Some(project_id) => match uow.get_project(project_id).await? {
            Some(project) => role_in_project(uow, principal, &project).await?,
            None => return Ok(false),
        },
        None => None,
    };

    Ok(decide(role, principal, action, Some(&subject)))
}

/// The guard route handlers call
///
/// Opens its own read-only unit of work. Any failure denies.
pub async fn can(store: &dyn Store, principal: Uuid, action: Action, resource: Resource<'_>) -> bool {
    let mut uow = match store.begin().await {
        Ok(uow) => uow,
        Err(e) => {
            warn!(error = %e, %action, "Permission check failed to open unit of work; denying");
            return false;
        }
    };

    match can_in(uow.as_mut(), principal, action, resource).await {
        Ok(allowed) => {
            debug!(user_id = %principal, %action, allowed, "Permission evaluated");
            allowed
        }
        Err(e) => {
            warn!(error = %e, user_id = %principal, %action, "Permission check failed; denying");
            false
        }
    }
}

/// Like [`can_in`] but turns a denial into [`AccessError::Forbidden`]
pub async fn require(
    uow: &mut dyn UnitOfWork,
    principal: Uuid,
    action: Action,
    resource: Resource<'_>,
) -> AccessResult<()> {
    if can_in(uow, principal, action, resource).await? {
        Ok(())
    } else {
        debug!(user_id = %principal, %action, "Permission denied");
        Err(AccessError::Forbidden)
    }
}

/// Advisory copy of the matrix for one role, for client-side UI
///
/// Generated from [`decide`], so it can't drift from the server. It is a
/// display aid only; the server re-checks every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionHints {
    pub role: ProjectRole,

    /// Project actions
    pub project: BTreeMap<ProjectAction, bool>,

    /// Task actions on tasks the principal created or is assigned to
    pub own_tasks: BTreeMap<TaskAction, bool>,

    /// Task actions on everyone else's tasks
    pub other_tasks: BTreeMap<TaskAction, bool>,
}

impl PermissionHints {
    pub fn for_role(role: ProjectRole) -> Self {
        let principal = Uuid::nil();
        let project_id = Some(Uuid::nil());
        let own = TaskSubject {
            project_id,
            creator_id: principal,
            assignee_id: None,
        };
        let other = TaskSubject {
            project_id,
            creator_id: Uuid::from_u128(1),
            assignee_id: None,
        };

        let project = ProjectAction::ALL
            .iter()
            .map(|&a| (a, decide(Some(role), principal, a.into(), None)))
            .collect();
        let own_tasks = TaskAction::ALL
            .iter()
            .map(|&a| (a, decide(Some(role), principal, a.into(), Some(&own))))
            .collect();
        let other_tasks = TaskAction::ALL
            .iter()
            .map(|&a| (a, decide(Some(role), principal, a.into(), Some(&other))))
            .collect();

        Self {
            role,
            project,
            own_tasks,
            other_tasks,
        }
    }
}
