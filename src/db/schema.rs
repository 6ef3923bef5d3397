use chrono::{DateTime, Utc};

/// A reusable task definition. `weight == 0` marks the task as ineligible
/// for rotation and voting while staying referenceable by ID.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: i32,
    pub description: String,
    pub instruction: String,
    pub weight: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Standard,
    Bonus,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Standard => "standard",
            TaskType::Bonus => "bonus",
        }
    }

    pub fn from_db(value: &str) -> Self {
        match value {
            "bonus" => TaskType::Bonus,
            _ => TaskType::Standard,
        }
    }
}

/// One time-boxed occurrence of a task. `evaluated_task` is frozen at
/// creation so later rotation never rewrites the wording.
#[derive(Debug, Clone)]
pub struct TaskInstance {
    pub id: i32,
    pub task_id: Option<i32>,
    pub task_type: TaskType,
    pub evaluated_task: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub channel_id: Option<String>,
    pub message_id: Option<String>,
    pub drawn_prize: bool,
}

#[derive(Debug, Clone)]
pub struct TaskVote {
    pub id: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub completed: bool,
    pub voting_channel_id: Option<String>,
    pub voting_message_id: Option<String>,
    pub selected_option_id: Option<i32>,
    pub options: Vec<TaskVoteOption>,
}

#[derive(Debug, Clone)]
pub struct TaskVoteOption {
    pub id: i32,
    pub vote_id: i32,
    pub option_index: i32,
    pub task_id: Option<i32>,
    pub evaluated_task: String,
}

#[derive(Debug, Clone)]
pub struct TaskCompletion {
    pub id: i32,
    pub instance_id: i32,
    pub user_id: String,
    pub approver_id: String,
    pub completion_time: DateTime<Utc>,
    pub evidence_channel_id: String,
    pub evidence_message_id: String,
}
