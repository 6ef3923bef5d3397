use std::env;

use chrono::Duration;

use crate::support::ballot;

/// Runtime configuration, read once from the environment in `main` and
/// carried through `BotData`.
pub struct BotConfig {
    pub task_channel: u64,
    pub vote_channel: u64,
    pub approver_role: u64,
    pub tasks_file: String,

    pub task_duration: Duration,
    pub bonus_duration: Duration,
    pub voting_window: Duration,
    pub task_start_delay: Duration,
    pub voting_task_count: usize,
    pub poll_interval: std::time::Duration,
}

fn required(name: &str) -> String {
    env::var(name).unwrap_or_else(|_| panic!("expected {}", name))
}

fn required_u64(name: &str) -> u64 {
    required(name).parse().unwrap_or_else(|_| panic!("{} is not a valid ID", name))
}

fn seconds_or(name: &str, default: i64) -> i64 {
    match env::var(name) {
        Ok(v) => v.parse().unwrap_or_else(|_| panic!("{} is not a valid number of seconds", name)),
        Err(_) => default,
    }
}

impl BotConfig {
    pub fn from_env() -> Self {
        let voting_task_count = seconds_or("TASKCYCLE_VOTING_TASK_COUNT", 3) as usize;
        if voting_task_count == 0 || voting_task_count > ballot::BALLOT_SYMBOLS.len() {
            panic!(
                "TASKCYCLE_VOTING_TASK_COUNT must be between 1 and {}",
                ballot::BALLOT_SYMBOLS.len()
            );
        }

        Self {
            task_channel: required_u64("TASKCYCLE_TASK_CHANNEL"),
            vote_channel: required_u64("TASKCYCLE_VOTE_CHANNEL"),
            approver_role: required_u64("TASKCYCLE_APPROVER_ROLE"),
            tasks_file: required("TASKCYCLE_TASKS_FILE"),

            task_duration: Duration::seconds(seconds_or("TASKCYCLE_TASK_DURATION", 3600)),
            bonus_duration: Duration::seconds(seconds_or("TASKCYCLE_BONUS_DURATION", 3600)),
            voting_window: Duration::seconds(seconds_or("TASKCYCLE_VOTING_WINDOW", 1800)),
            task_start_delay: Duration::seconds(seconds_or("TASKCYCLE_TASK_START_DELAY", 60)),
            voting_task_count,
            poll_interval: std::time::Duration::from_secs(seconds_or("TASKCYCLE_POLL_INTERVAL", 3) as u64),
        }
    }
}
