use std::collections::HashMap;

use chrono::{DateTime, Utc};
use evlog::meta;
use itertools::Itertools;
use rand::Rng;
use serenity::client::Context;
use serenity::model::user::User;
use sqlx::PgPool;

use crate::db::model;
use crate::db::schema::{TaskCompletion, TaskInstance, TaskType};
use crate::runtime::get_logger;

/// Audit numbers for a prize draw pool.
pub struct DrawReport {
    pub standard_completions: usize,
    pub bonus_completions: usize,
    pub unique_participants: usize,
}

pub struct DrawOutcome {
    pub winner: Option<(User, TaskCompletion)>,
    pub report: DrawReport,
}

pub fn build_report(instances: &[TaskInstance], completions: &[TaskCompletion]) -> DrawReport {
    let types: HashMap<i32, TaskType> = instances.iter().map(|i| (i.id, i.task_type)).collect();

    DrawReport {
        standard_completions: completions
            .iter()
            .filter(|c| types.get(&c.instance_id) == Some(&TaskType::Standard))
            .count(),
        bonus_completions: completions
            .iter()
            .filter(|c| types.get(&c.instance_id) == Some(&TaskType::Bonus))
            .count(),
        unique_participants: completions.iter().map(|c| c.user_id.as_str()).unique().count(),
    }
}

/// Draws one winning completion uniformly from the pool. A draw over
/// `window = None` covers every not-yet-rewarded instance and, when
/// `update_tasks` is set, marks them rewarded afterwards; a windowed draw
/// re-runs history by start-time range instead.
///
/// The draw is per completion, not per participant: submitting more
/// completions proportionally raises the odds. Completions whose user cannot
/// be resolved anymore are dropped from the pool and the draw repeats; an
/// exhausted pool reports no winner.
pub async fn draw_winner(
    ctx: &Context,
    conn: &PgPool,
    window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    update_tasks: bool,
) -> anyhow::Result<DrawOutcome> {
    let instances = match window {
        None => model::get_unclaimed_instances(conn).await?,
        Some((from, to)) => model::get_instances_started_between(conn, from, to).await?,
    };

    let instance_ids: Vec<i32> = instances.iter().map(|i| i.id).collect();
    let completions = if instance_ids.is_empty() {
        Vec::new()
    } else {
        model::get_completions_for_instances(conn, &instance_ids).await?
    };

    let report = build_report(&instances, &completions);

    let mut pool = completions;
    let mut winner = None;

    while !pool.is_empty() {
        let index = rand::thread_rng().gen_range(0..pool.len());
        let candidate = pool.swap_remove(index);

        let user_id: u64 = match candidate.user_id.parse() {
            Ok(v) => v,
            Err(_) => continue,
        };

        match ctx.http.get_user(user_id).await {
            Ok(user) => {
                winner = Some((user, candidate));
                break;
            }
            Err(e) => {
                get_logger().debug("Drawn user could not be resolved; excluded from pool.", meta! {
                    "UserID" => candidate.user_id,
                    "Error" => e,
                });
            }
        }
    }

    if update_tasks && !instance_ids.is_empty() {
        model::mark_instances_drawn(conn, &instance_ids).await?;
    }

    get_logger().info("Prize draw finished.", meta! {
        "Instances" => instance_ids.len(),
        "StandardCompletions" => report.standard_completions,
        "BonusCompletions" => report.bonus_completions,
        "UniqueParticipants" => report.unique_participants,
        "WinnerFound" => winner.is_some(),
    });

    Ok(DrawOutcome { winner, report })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;

    fn instance(id: i32, task_type: TaskType) -> TaskInstance {
        let now = Utc::now();
        TaskInstance {
            id,
            task_id: Some(1),
            task_type,
            evaluated_task: "Kill 2 goblins".to_owned(),
            start_time: now - Duration::hours(2),
            end_time: now - Duration::hours(1),
            channel_id: None,
            message_id: None,
            drawn_prize: false,
        }
    }

    fn completion(id: i32, instance_id: i32, user_id: &str) -> TaskCompletion {
        TaskCompletion {
            id,
            instance_id,
            user_id: user_id.to_owned(),
            approver_id: "42".to_owned(),
            completion_time: Utc::now(),
            evidence_channel_id: "1".to_owned(),
            evidence_message_id: "2".to_owned(),
        }
    }

    #[test]
    fn report_splits_by_instance_type_and_deduplicates_users() {
        let instances = vec![instance(1, TaskType::Standard), instance(2, TaskType::Bonus)];
        let completions = vec![
            completion(1, 1, "100"),
            completion(2, 1, "200"),
            completion(3, 2, "100"),
        ];

        let report = build_report(&instances, &completions);
        assert_eq!(report.standard_completions, 2);
        assert_eq!(report.bonus_completions, 1);
        assert_eq!(report.unique_participants, 2);
    }

    #[test]
    fn empty_pool_reports_zero() {
        let report = build_report(&[], &[]);
        assert_eq!(report.standard_completions, 0);
        assert_eq!(report.bonus_completions, 0);
        assert_eq!(report.unique_participants, 0);
    }

    #[test]
    fn completions_of_unknown_instances_count_nowhere() {
        let instances = vec![instance(1, TaskType::Standard)];
        let completions = vec![completion(1, 9, "100")];

        let report = build_report(&instances, &completions);
        assert_eq!(report.standard_completions, 0);
        assert_eq!(report.bonus_completions, 0);
        // Still a participant in the pool, even if the instance vanished.
        assert_eq!(report.unique_participants, 1);
    }
}
