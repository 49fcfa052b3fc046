//! Local handlers for the functions the gateway may call.
//!
//! Every handler produces text. Failures, including unknown tool names and
//! malformed arguments, come back as an error line in the reply rather than
//! failing the chat request.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use super::gateway::{FunctionDefinition, ToolCall, ToolDefinition};
use crate::activity::ActivityLog;
use crate::aggregator::MiningAggregator;
use crate::cache::SnapshotCache;
use crate::error::{ProxyError, Result};
use crate::presenter::summary_markdown;

const DEFAULT_LOG_LIMIT: usize = 10;
const MAX_LOG_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Blocked => "blocked",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: TaskPriority,
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create(&self, task: NewTask) -> Result<Task>;
    async fn list(&self, status: Option<TaskStatus>) -> Result<Vec<Task>>;
    async fn update_status(&self, id: Uuid, status: TaskStatus) -> Result<Task>;
}

/// Process-local task list.
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<Vec<Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, task: NewTask) -> Result<Task> {
        let title = task.title.trim();
        if title.is_empty() {
            return Err(ProxyError::Tool("task title must not be empty".into()));
        }
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: task.description,
            status: TaskStatus::Pending,
            priority: task.priority,
            created_at: now,
            updated_at: now,
        };
        self.tasks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(task.clone());
        Ok(task)
    }

    async fn list(&self, status: Option<TaskStatus>) -> Result<Vec<Task>> {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        Ok(tasks
            .iter()
            .filter(|t| status.map_or(true, |s| t.status == s))
            .cloned()
            .collect())
    }

    async fn update_status(&self, id: Uuid, status: TaskStatus) -> Result<Task> {
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| ProxyError::Tool(format!("task {id} not found")))?;
        task.status = status;
        task.updated_at = Utc::now();
        Ok(task.clone())
    }
}

#[derive(Debug, Deserialize)]
struct ListTasksArgs {
    #[serde(default)]
    status: Option<TaskStatus>,
}

#[derive(Debug, Deserialize)]
struct UpdateTaskArgs {
    task_id: Uuid,
    status: TaskStatus,
}

#[derive(Debug, Deserialize)]
struct QueryLogsArgs {
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    filter: Option<String>,
}

/// Schemas advertised to the gateway.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    let function = |name: &str, description: &str, parameters| ToolDefinition {
        kind: "function".to_string(),
        function: FunctionDefinition {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        },
    };
    let statuses = json!(["pending", "in_progress", "completed", "blocked"]);

    vec![
        function(
            "get_mining_stats",
            "Current mining statistics for the DAO wallet on SupportXMR",
            json!({ "type": "object", "properties": {} }),
        ),
        function(
            "create_task",
            "Create a task for the DAO team",
            json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string" },
                    "description": { "type": "string" },
                    "priority": { "type": "string", "enum": ["low", "medium", "high"] }
                },
                "required": ["title"]
            }),
        ),
        function(
            "list_tasks",
            "List tasks, optionally only those with a given status",
            json!({
                "type": "object",
                "properties": { "status": { "type": "string", "enum": statuses } }
            }),
        ),
        function(
            "update_task_status",
            "Move a task to a new status",
            json!({
                "type": "object",
                "properties": {
                    "task_id": { "type": "string" },
                    "status": { "type": "string", "enum": statuses }
                },
                "required": ["task_id", "status"]
            }),
        ),
        function(
            "query_logs",
            "Recent service activity, newest first",
            json!({
                "type": "object",
                "properties": {
                    "limit": { "type": "integer", "minimum": 1, "maximum": MAX_LOG_LIMIT },
                    "filter": { "type": "string" }
                }
            }),
        ),
    ]
}

pub struct ToolDispatcher {
    tasks: Arc<dyn TaskStore>,
    activity: Arc<ActivityLog>,
    cache: Arc<SnapshotCache>,
    aggregator: Arc<MiningAggregator>,
}

impl ToolDispatcher {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        cache: Arc<SnapshotCache>,
        aggregator: Arc<MiningAggregator>,
    ) -> Self {
        Self {
            tasks,
            activity: aggregator.activity_log(),
            cache,
            aggregator,
        }
    }

    pub async fn dispatch(&self, call: &ToolCall) -> String {
        let name = call.function.name.as_str();
        info!("Dispatching tool call {}", name);
        match self.run(call).await {
            Ok(text) => {
                self.activity.record("chat", "tool", name);
                text
            }
            Err(e) => {
                warn!("Tool {} failed: {}", name, e);
                self.activity.record("chat", "tool_error", format!("{name}: {e}"));
                format!("Error running {name}: {e}")
            }
        }
    }

    async fn run(&self, call: &ToolCall) -> Result<String> {
        let args = call.function.arguments.trim();
        let args = if args.is_empty() { "{}" } else { args };

        match call.function.name.as_str() {
            "get_mining_stats" => {
                let result = self.cache.get_or_refresh(&self.aggregator).await;
                Ok(summary_markdown(Some(&result), Utc::now().timestamp()))
            }
            "create_task" => {
                let task = self.tasks.create(parse_args(args)?).await?;
                Ok(format!("Created task \"{}\" ({}) with status {}", task.title, task.id, task.status.as_str()))
            }
            "list_tasks" => {
                let ListTasksArgs { status } = parse_args(args)?;
                let tasks = self.tasks.list(status).await?;
                if tasks.is_empty() {
                    return Ok("No tasks found.".to_string());
                }
                let lines: Vec<String> = tasks
                    .iter()
                    .map(|t| format!("- [{}] {} ({})", t.status.as_str(), t.title, t.id))
                    .collect();
                Ok(format!("Tasks:\n{}", lines.join("\n")))
            }
            "update_task_status" => {
                let UpdateTaskArgs { task_id, status } = parse_args(args)?;
                let task = self.tasks.update_status(task_id, status).await?;
                Ok(format!("Task \"{}\" is now {}", task.title, task.status.as_str()))
            }
            "query_logs" => {
                let QueryLogsArgs { limit, filter } = parse_args(args)?;
                let limit = limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);
                let entries = self.activity.recent(limit, filter.as_deref());
                if entries.is_empty() {
                    return Ok("No matching log entries.".to_string());
                }
                let lines: Vec<String> = entries
                    .iter()
                    .map(|e| format!("- {} [{}/{}] {}", e.at.format("%Y-%m-%d %H:%M:%S"), e.source, e.status, e.message))
                    .collect();
                Ok(format!("Recent activity:\n{}", lines.join("\n")))
            }
            other => Err(ProxyError::Tool(format!("unknown tool '{other}'"))),
        }
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(args: &str) -> Result<T> {
    serde_json::from_str(args).map_err(|e| ProxyError::Tool(format!("invalid arguments: {e}")))
}
