#![allow(dead_code)]

/// Common test utilities for integration tests
///
/// This module provides shared infrastructure for integration tests:
/// - An in-memory store and a manually driven clock
/// - The services wired to both
/// - User, project and membership fixtures

use chrono::{TimeZone, Utc};
use std::sync::Arc;
use tasklane_access::clock::ManualClock;
use tasklane_access::config::InvitationConfig;
use tasklane_access::invitations::InvitationManager;
use tasklane_access::membership::MembershipService;
use tasklane_access::models::{
    CreateProject, CreateTask, CreateUser, Project, ProjectRole, Task, User,
};
use tasklane_access::projects::ProjectService;
use tasklane_access::store::memory::MemoryStore;
use tasklane_access::store::Store;
use uuid::Uuid;

/// Test context containing all necessary resources
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub clock: ManualClock,
    pub projects: ProjectService,
    pub members: MembershipService,
    pub invitations: InvitationManager,
}

impl TestContext {
    /// Creates a context over an empty store, with the clock at a fixed instant
    pub fn new() -> Self {
        init_tracing();

        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());

        let projects = ProjectService::new(store.clone(), Arc::new(clock.clone()));
        let members = MembershipService::new(store.clone(), Arc::new(clock.clone()));
        let invitations = InvitationManager::new(
            store.clone(),
            Arc::new(clock.clone()),
            InvitationConfig::default(),
        );

        Self {
            store,
            clock,
            projects,
            members,
            invitations,
        }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Provisions a user the way the identity subsystem would
    pub async fn create_user(&self, email: &str) -> User {
        let user = User::new(CreateUser {
            email: email.to_string(),
            name: None,
        });

        let mut uow = self.store.begin().await.expect("begin");
        uow.insert_user(&user).await.expect("insert user");
        uow.commit().await.expect("commit");

        user
    }

    /// Creates a project owned by a fresh user
    pub async fn create_project(&self) -> (User, Project) {
        let owner = self
            .create_user(&format!("owner-{}@example.com", Uuid::new_v4()))
            .await;
        let project = self
            .projects
            .create_project(
                owner.id,
                CreateProject {
                    name: "Spring launch".to_string(),
                },
            )
            .await
            .expect("create project");

        (owner, project)
    }

    /// Adds a fresh user to `project` with `role`
    pub async fn add_member(&self, owner: &User, project: &Project, role: ProjectRole) -> User {
        let user = self
            .create_user(&format!("{}-{}@example.com", role, Uuid::new_v4()))
            .await;
        self.members
            .add_member(owner.id, project.id, user.id, role)
            .await
            .expect("add member");
        user
    }

    /// Creates a project task as `creator`, bypassing permission checks
    pub async fn insert_task(
        &self,
        project: &Project,
        creator: &User,
        assignee: Option<&User>,
    ) -> Task {
        let task = Task::new(
            creator.id,
            CreateTask {
                project_id: Some(project.id),
                title: "Draft announcement".to_string(),
                assignee_id: assignee.map(|u| u.id),
            },
            self.clock_now(),
        );

        let mut uow = self.store.begin().await.expect("begin");
        uow.insert_task(&task).await.expect("insert task");
        uow.commit().await.expect("commit");

        task
    }

    pub fn clock_now(&self) -> chrono::DateTime<Utc> {
        use tasklane_access::clock::Clock;
        self.clock.now()
    }

    /// Number of owner memberships in `project`
    pub async fn owner_count(&self, project: &Project) -> i64 {
        let mut uow = self.store.begin().await.expect("begin");
        uow.count_members_with_role(project.id, ProjectRole::Owner)
            .await
            .expect("count owners")
    }

    pub async fn membership_count(&self, project: &Project) -> usize {
        let mut uow = self.store.begin().await.expect("begin");
        uow.list_memberships(project.id)
            .await
            .expect("list memberships")
            .len()
    }

    pub async fn reload_project(&self, project: &Project) -> Project {
        let mut uow = self.store.begin().await.expect("begin");
        uow.get_project(project.id)
            .await
            .expect("get project")
            .expect("project exists")
    }
}

/// Installs a test subscriber once; `RUST_LOG` controls verbosity
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
