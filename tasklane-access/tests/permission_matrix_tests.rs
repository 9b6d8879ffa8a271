/// Integration tests for the permission matrix
///
/// Enumerates every role against every project and task action, through the
/// same `can` guard route handlers use.
///
/// Run with: cargo test --test permission_matrix_tests

mod common;

use async_trait::async_trait;
use common::TestContext;
use tasklane_access::auth::permissions::{
    can, Action, PermissionHints, ProjectAction, Resource, TaskAction,
};
use tasklane_access::models::{CreateTask, Project, ProjectRole, Task, User};
use tasklane_access::store::{Store, StoreError, UnitOfWork};
use uuid::Uuid;

const T: bool = true;
const F: bool = false;

/// Columns follow `ProjectAction::ALL`: view, edit, archive, delete, inviteUsers, manageMembers
const PROJECT_MATRIX: [(Option<ProjectRole>, [bool; 6]); 5] = [
    (Some(ProjectRole::Owner), [T, T, T, T, T, T]),
    (Some(ProjectRole::Collaborator), [T, T, F, F, F, F]),
    (Some(ProjectRole::Member), [T, F, F, F, F, F]),
    (Some(ProjectRole::Viewer), [T, F, F, F, F, F]),
    (None, [F, F, F, F, F, F]),
];

/// Columns follow `TaskAction::ALL`: view, create, edit, delete, viewAll, changeAssignee
///
/// Each row is (role, on a task the principal created, on someone else's task).
const TASK_MATRIX: [(Option<ProjectRole>, [bool; 6], [bool; 6]); 5] = [
    (Some(ProjectRole::Owner), [T, T, T, T, T, T], [T, T, T, T, T, T]),
    (Some(ProjectRole::Collaborator), [T, T, T, T, T, T], [T, T, T, T, T, T]),
    (Some(ProjectRole::Member), [T, T, T, F, F, F], [F, F, F, F, F, F]),
    (Some(ProjectRole::Viewer), [T, F, F, F, F, F], [T, F, F, F, F, F]),
    (None, [F, F, F, F, F, F], [F, F, F, F, F, F]),
];

/// A project with one principal per role, plus an outsider
struct Fixture {
    ctx: TestContext,
    project: Project,
    project_id: Uuid,
    collaborator: User,
    principals: Vec<(Option<ProjectRole>, User)>,
}

async fn fixture() -> Fixture {
    let ctx = TestContext::new();
    let (owner, project) = ctx.create_project().await;

    let collaborator = ctx
        .add_member(&owner, &project, ProjectRole::Collaborator)
        .await;
    let member = ctx.add_member(&owner, &project, ProjectRole::Member).await;
    let viewer = ctx.add_member(&owner, &project, ProjectRole::Viewer).await;
    let outsider = ctx.create_user("outsider@example.com").await;

    let principals = vec![
        (Some(ProjectRole::Owner), owner),
        (Some(ProjectRole::Collaborator), collaborator.clone()),
        (Some(ProjectRole::Member), member),
        (Some(ProjectRole::Viewer), viewer),
        (None, outsider),
    ];

    Fixture {
        ctx,
        project_id: project.id,
        project,
        collaborator,
        principals,
    }
}

impl Fixture {
    fn principal(&self, role: Option<ProjectRole>) -> &User {
        &self
            .principals
            .iter()
            .find(|(r, _)| *r == role)
            .expect("principal for role")
            .1
    }

    async fn task_by(&self, creator: &User) -> Task {
        self.ctx.insert_task(&self.project, creator, None).await
    }
}

#[tokio::test]
async fn test_project_actions_for_every_role() {
    let f = fixture().await;

    for (role, row) in PROJECT_MATRIX {
        let principal = f.principal(role);
        for (action, expected) in ProjectAction::ALL.into_iter().zip(row) {
            let allowed = can(
                f.ctx.store(),
                principal.id,
                Action::Project(action),
                Resource::Project(f.project_id),
            )
            .await;
            assert_eq!(
                allowed, expected,
                "role {:?}, project action {}",
                role,
                action.as_str()
            );
        }
    }
}

#[tokio::test]
async fn test_task_actions_for_every_role() {
    let f = fixture().await;
    let theirs = f.task_by(&f.collaborator).await;

    for (role, own_row, other_row) in TASK_MATRIX {
        let principal = f.principal(role);
        let own = f.task_by(principal).await;

        for (i, action) in TaskAction::ALL.into_iter().enumerate() {
            let on_own = can(
                f.ctx.store(),
                principal.id,
                Action::Task(action),
                Resource::Task(&own),
            )
            .await;
            assert_eq!(
                on_own, own_row[i],
                "role {:?}, task action {} on own task",
                role,
                action.as_str()
            );

            // The collaborator's own task is "own" for them
            if role == Some(ProjectRole::Collaborator) {
                continue;
            }

            let on_other = can(
                f.ctx.store(),
                principal.id,
                Action::Task(action),
                Resource::TaskId(theirs.id),
            )
            .await;
            assert_eq!(
                on_other, other_row[i],
                "role {:?}, task action {} on another user's task",
                role,
                action.as_str()
            );
        }
    }
}

#[tokio::test]
async fn test_member_assigned_task_counts_as_own() {
    let f = fixture().await;
    let member = f.principal(Some(ProjectRole::Member)).clone();
    let task = f
        .ctx
        .insert_task(&f.project, &f.collaborator, Some(&member))
        .await;

    for (action, expected) in [
        (TaskAction::View, true),
        (TaskAction::Edit, true),
        (TaskAction::Delete, false),
        (TaskAction::ChangeAssignee, false),
    ] {
        assert_eq!(
            can(f.ctx.store(), member.id, action.into(), Resource::Task(&task)).await,
            expected,
            "{}",
            action.as_str()
        );
    }
}

#[tokio::test]
async fn test_member_may_create_tasks_in_project() {
    let f = fixture().await;
    let member = f.principal(Some(ProjectRole::Member));
    let viewer = f.principal(Some(ProjectRole::Viewer));
    let outsider = f.principal(None);

    let draft = CreateTask {
        project_id: Some(f.project_id),
        title: "Book venue".to_string(),
        assignee_id: None,
    };

    let create = Action::Task(TaskAction::Create);
    assert!(can(f.ctx.store(), member.id, create, Resource::TaskDraft(&draft)).await);
    assert!(can(f.ctx.store(), member.id, create, Resource::Project(f.project_id)).await);
    assert!(!can(f.ctx.store(), viewer.id, create, Resource::TaskDraft(&draft)).await);
    assert!(!can(f.ctx.store(), outsider.id, create, Resource::TaskDraft(&draft)).await);
}

#[tokio::test]
async fn test_scenario_member_and_viewer_on_assigned_task() {
    let f = fixture().await;
    let member = f.principal(Some(ProjectRole::Member)).clone();
    let viewer = f.principal(Some(ProjectRole::Viewer)).clone();

    let task = f
        .ctx
        .projects
        .create_task(
            member.id,
            CreateTask {
                project_id: Some(f.project_id),
                title: "Collect quotes".to_string(),
                assignee_id: Some(member.id),
            },
        )
        .await
        .expect("member creates task");

    let store = f.ctx.store();
    assert!(can(store, member.id, TaskAction::Edit.into(), Resource::Task(&task)).await);
    assert!(!can(store, member.id, TaskAction::Delete.into(), Resource::Task(&task)).await);
    assert!(can(store, viewer.id, TaskAction::View.into(), Resource::Task(&task)).await);
    assert!(!can(store, viewer.id, TaskAction::Edit.into(), Resource::Task(&task)).await);
}

#[tokio::test]
async fn test_personal_tasks_belong_to_their_creator() {
    let f = fixture().await;
    let owner = f.principal(Some(ProjectRole::Owner)).clone();
    let outsider = f.principal(None).clone();

    let personal = f
        .ctx
        .projects
        .create_task(
            outsider.id,
            CreateTask {
                project_id: None,
                title: "Renew passport".to_string(),
                assignee_id: None,
            },
        )
        .await
        .expect("create personal task");

    for action in TaskAction::ALL {
        assert!(can(f.ctx.store(), outsider.id, action.into(), Resource::Task(&personal)).await);
        assert!(!can(f.ctx.store(), owner.id, action.into(), Resource::Task(&personal)).await);
    }
}

#[tokio::test]
async fn test_missing_resources_are_denied() {
    let f = fixture().await;
    let owner = f.principal(Some(ProjectRole::Owner));

    assert!(
        !can(
            f.ctx.store(),
            owner.id,
            ProjectAction::View.into(),
            Resource::Project(Uuid::new_v4())
        )
        .await
    );
    assert!(
        !can(
            f.ctx.store(),
            owner.id,
            TaskAction::View.into(),
            Resource::TaskId(Uuid::new_v4())
        )
        .await
    );
}

struct UnavailableStore;

#[async_trait]
impl Store for UnavailableStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        Err(StoreError::Backend("connection refused".to_string()))
    }
}

#[tokio::test]
async fn test_store_failure_denies() {
    for action in ProjectAction::ALL {
        assert!(
            !can(
                &UnavailableStore,
                Uuid::new_v4(),
                action.into(),
                Resource::Project(Uuid::new_v4())
            )
            .await
        );
    }
}

#[test]
fn test_permission_hints_mirror_matrix() {
    for (role, row) in PROJECT_MATRIX {
        let Some(role) = role else { continue };
        let hints = PermissionHints::for_role(role);
        for (action, expected) in ProjectAction::ALL.into_iter().zip(row) {
            assert_eq!(hints.project[&action], expected, "{:?} {}", role, action.as_str());
        }
    }

    for (role, own_row, other_row) in TASK_MATRIX {
        let Some(role) = role else { continue };
        let hints = PermissionHints::for_role(role);
        for (i, action) in TaskAction::ALL.into_iter().enumerate() {
            assert_eq!(hints.own_tasks[&action], own_row[i], "{:?} {}", role, action.as_str());
            assert_eq!(hints.other_tasks[&action], other_row[i], "{:?} {}", role, action.as_str());
        }
    }
}
