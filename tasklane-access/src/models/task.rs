/// Task model and database operations
///
/// Tasks either belong to a project (role-gated) or are personal (no project,
/// visible only to their creator).
///
/// # Schema
///
/// ```sql
/// CREATE TYPE task_status AS ENUM ('todo', 'in_progress', 'done');
///
/// CREATE TABLE tasks (
///     id UUID PRIMARY KEY,
///     project_id UUID REFERENCES projects(id) ON DELETE CASCADE,
///     creator_id UUID NOT NULL REFERENCES users(id),
///     assignee_id UUID REFERENCES users(id) ON DELETE SET NULL,
///     title VARCHAR(255) NOT NULL,
///     status task_status NOT NULL DEFAULT 'todo',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use uuid::Uuid;

/// Task progress status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started
    Todo,

    /// Being worked on
    InProgress,

    /// Finished
    Done,
}

impl TaskStatus {
    /// Converts status to string for display
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
        }
    }
}

/// A unit of work, optionally scoped to a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    /// Unique task ID
    pub id: Uuid,

    /// Owning project; `None` for personal tasks
    pub project_id: Option<Uuid>,

    /// User who created the task
    pub creator_id: Uuid,

    /// User the task is assigned to, if any
    pub assignee_id: Option<Uuid>,

    /// Short description
    pub title: String,

    /// Current status
    pub status: TaskStatus,

    /// When the task was created
    pub created_at: DateTime<Utc>,

    /// When the task was last updated
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTask {
    /// Owning project (`None` for a personal task)
    pub project_id: Option<Uuid>,

    /// Short description
    pub title: String,

    /// Initial assignee
    pub assignee_id: Option<Uuid>,
}

impl Task {
    /// Builds a new task created by `creator_id`
    pub fn new(creator_id: Uuid, data: CreateTask, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id: data.project_id,
            creator_id,
            assignee_id: data.assignee_id,
            title: data.title,
            status: TaskStatus::Todo,
            created_at: now,
            updated_at: now,
        }
    }

    /// Personal tasks have no project
    pub fn is_personal(&self) -> bool {
        self.project_id.is_none()
    }

    /// Whether `user_id` created this task or is assigned to it
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.creator_id == user_id || self.assignee_id == Some(user_id)
    }

    /// Inserts a task row
    pub async fn insert(conn: &mut PgConnection, task: &Task) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO tasks (id, project_id, creator_id, assignee_id, title, status,
                               created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(task.id)
        .bind(task.project_id)
        .bind(task.creator_id)
        .bind(task.assignee_id)
        .bind(&task.title)
        .bind(task.status)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Finds a task by ID
    pub async fn find_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let task = sqlx::query_as::<_, Task>(
            r#"
            SELECT id, project_id, creator_id, assignee_id, title, status,
                   created_at, updated_at
            FROM tasks
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(task)
    }

    /// Lists every task of a project, newest first
    ///
    /// Callers returning data across the trust boundary must go through
    /// [`crate::auth::visibility::list_visible_tasks`] instead.
    pub async fn list_by_project(
        conn: &mut PgConnection,
        project_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let tasks = sqlx::query_as::<_, Task>(
            r#"
            SELECT id, project_id, creator_id, assignee_id, title, status,
                   created_at, updated_at
            FROM tasks
            WHERE project_id = $1
            ORDER BY created_at DESC, id ASC
            "#,
        )
        .bind(project_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(tasks)
    }

    /// Lists personal tasks created by `creator_id`, newest first
    pub async fn list_personal(
        conn: &mut PgConnection,
        creator_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let tasks = sqlx::query_as::<_, Task>(
            r#"
            SELECT id, project_id, creator_id, assignee_id, title, status,
                   created_at, updated_at
            FROM tasks
            WHERE project_id IS NULL AND creator_id = $1
            ORDER BY created_at DESC, id ASC
            "#,
        )
        .bind(creator_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(tasks)
    }
}
