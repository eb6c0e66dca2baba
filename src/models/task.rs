//! Task model
//!
//! Work items assigned by an administrator to one or more employees.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in-progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            _ => Err(anyhow::anyhow!("Invalid task status: {}", s)),
        }
    }
}

/// An assigned work item
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(with = "crate::models::id_string")]
    pub id: i64,
    pub title: Option<String>,
    pub client: Option<String>,
    /// Admin who created the task; cleared if that account is deleted
    #[serde(with = "crate::models::id_string::option")]
    pub assigned_by: Option<i64>,
    pub assigned_at: DateTime<Utc>,
    pub due_at: Option<DateTime<Utc>>,
    #[serde(with = "crate::models::id_string::vec")]
    pub assignees: Vec<i64>,
    pub high_priority: bool,
    pub note: Option<String>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn is_assigned_to(&self, user_id: i64) -> bool {
        self.assignees.contains(&user_id)
    }
}

/// Input for creating a task
#[derive(Debug, Clone, Default)]
pub struct CreateTaskInput {
    pub title: Option<String>,
    pub client: Option<String>,
    pub due_at: Option<DateTime<Utc>>,
    pub assignees: Vec<i64>,
    pub high_priority: bool,
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings() {
        assert_eq!(TaskStatus::from_str("in-progress").unwrap(), TaskStatus::InProgress);
        assert_eq!(TaskStatus::from_str("completed").unwrap(), TaskStatus::Completed);
        assert!(TaskStatus::from_str("done").is_err());
        assert_eq!(TaskStatus::InProgress.to_string(), "in-progress");
    }

    #[test]
    fn test_task_json_shape() {
        let now = Utc::now();
        let task = Task {
            id: 3,
            title: Some("Inventory".into()),
            client: None,
            assigned_by: Some(1),
            assigned_at: now,
            due_at: None,
            assignees: vec![2, 5],
            high_priority: true,
            note: None,
            status: TaskStatus::InProgress,
            created_at: now,
            completed_at: None,
        };

        assert!(task.is_assigned_to(5));
        assert!(!task.is_assigned_to(1));

        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["id"], "3");
        assert_eq!(json["assignedBy"], "1");
        assert_eq!(json["assignees"], serde_json::json!(["2", "5"]));
        assert_eq!(json["highPriority"], true);
        assert_eq!(json["status"], "in-progress");
    }
}
