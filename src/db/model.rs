use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tokio_stream::StreamExt;

use crate::db::schema::{Task, TaskCompletion, TaskInstance, TaskType, TaskVote, TaskVoteOption};

fn map_task(row: PgRow) -> Task {
    Task {
        id: row.get("id"),
        description: row.get("description"),
        instruction: row.get("instruction"),
        weight: row.get("weight"),
    }
}

fn map_instance(row: PgRow) -> TaskInstance {
    TaskInstance {
        id: row.get("id"),
        task_id: row.get("task_id"),
        task_type: TaskType::from_db(row.get::<String, _>("task_type").as_str()),
        evaluated_task: row.get("evaluated_task"),
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        channel_id: row.get("channel_id"),
        message_id: row.get("message_id"),
        drawn_prize: row.get("drawn_prize"),
    }
}

fn map_vote(row: PgRow) -> TaskVote {
    TaskVote {
        id: row.get("id"),
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        completed: row.get("completed"),
        voting_channel_id: row.get("voting_channel_id"),
        voting_message_id: row.get("voting_message_id"),
        selected_option_id: row.get("selected_option_id"),
        options: Vec::new(),
    }
}

fn map_vote_option(row: PgRow) -> TaskVoteOption {
    TaskVoteOption {
        id: row.get("id"),
        vote_id: row.get("vote_id"),
        option_index: row.get("option_index"),
        task_id: row.get("task_id"),
        evaluated_task: row.get("evaluated_task"),
    }
}

fn map_completion(row: PgRow) -> TaskCompletion {
    TaskCompletion {
        id: row.get("id"),
        instance_id: row.get("instance_id"),
        user_id: row.get("user_id"),
        approver_id: row.get("approver_id"),
        completion_time: row.get("completion_time"),
        evidence_channel_id: row.get("evidence_channel_id"),
        evidence_message_id: row.get("evidence_message_id"),
    }
}

//
// Tasks
//

pub async fn get_tasks(conn: &PgPool) -> anyhow::Result<Vec<Task>> {
    let tasks = sqlx::query("SELECT * FROM tasks ORDER BY id;")
        .map(map_task)
        .fetch_all(conn)
        .await?;

    Ok(tasks)
}

pub async fn get_task_by_id(conn: &PgPool, task_id: i32) -> anyhow::Result<Option<Task>> {
    let task = sqlx::query("SELECT * FROM tasks WHERE id = $1;")
        .bind(task_id)
        .map(map_task)
        .fetch_optional(conn)
        .await?;

    Ok(task)
}

pub async fn get_max_task_id(conn: &PgPool) -> anyhow::Result<i32> {
    let row = sqlx::query("SELECT COALESCE(MAX(id), 0) AS max_id FROM tasks;")
        .fetch_one(conn)
        .await?;

    Ok(row.get("max_id"))
}

pub async fn upsert_task(conn: &PgPool, task: &Task) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO tasks (id, description, instruction, weight)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (id) DO UPDATE
         SET description = EXCLUDED.description,
             instruction = EXCLUDED.instruction,
             weight = EXCLUDED.weight;",
    )
    .bind(task.id)
    .bind(&task.description)
    .bind(&task.instruction)
    .bind(task.weight)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn replace_all_tasks(conn: &PgPool, tasks: &[Task]) -> anyhow::Result<()> {
    let mut tx = conn.begin().await?;

    sqlx::query("DELETE FROM tasks;").execute(&mut tx).await?;

    for task in tasks {
        sqlx::query(
            "INSERT INTO tasks (id, description, instruction, weight)
             VALUES ($1, $2, $3, $4);",
        )
        .bind(task.id)
        .bind(&task.description)
        .bind(&task.instruction)
        .bind(task.weight)
        .execute(&mut tx)
        .await?;
    }

    tx.commit().await?;

    Ok(())
}

//
// Task instances
//

pub async fn get_active_instance(conn: &PgPool, task_type: TaskType) -> anyhow::Result<Option<TaskInstance>> {
    let instance = sqlx::query(
        "SELECT * FROM task_instances
         WHERE task_type = $1 AND end_time > NOW()
         ORDER BY end_time DESC
         LIMIT 1;",
    )
    .bind(task_type.as_str())
    .map(map_instance)
    .fetch_optional(conn)
    .await?;

    Ok(instance)
}

pub async fn get_latest_instance(conn: &PgPool, task_type: TaskType) -> anyhow::Result<Option<TaskInstance>> {
    let instance = sqlx::query(
        "SELECT * FROM task_instances
         WHERE task_type = $1
         ORDER BY end_time DESC
         LIMIT 1;",
    )
    .bind(task_type.as_str())
    .map(map_instance)
    .fetch_optional(conn)
    .await?;

    Ok(instance)
}

pub async fn get_instance_covering(
    conn: &PgPool,
    task_type: TaskType,
    at: DateTime<Utc>,
) -> anyhow::Result<Option<TaskInstance>> {
    let instance = sqlx::query(
        "SELECT * FROM task_instances
         WHERE task_type = $1 AND start_time <= $2 AND end_time > $2
         ORDER BY start_time DESC
         LIMIT 1;",
    )
    .bind(task_type.as_str())
    .bind(at)
    .map(map_instance)
    .fetch_optional(conn)
    .await?;

    Ok(instance)
}

pub async fn get_unclaimed_instances(conn: &PgPool) -> anyhow::Result<Vec<TaskInstance>> {
    let instances = sqlx::query("SELECT * FROM task_instances WHERE drawn_prize = FALSE ORDER BY start_time;")
        .map(map_instance)
        .fetch_all(conn)
        .await?;

    Ok(instances)
}

pub async fn get_instances_started_between(
    conn: &PgPool,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> anyhow::Result<Vec<TaskInstance>> {
    let instances = sqlx::query(
        "SELECT * FROM task_instances
         WHERE start_time >= $1 AND start_time < $2
         ORDER BY start_time;",
    )
    .bind(from)
    .bind(to)
    .map(map_instance)
    .fetch_all(conn)
    .await?;

    Ok(instances)
}

/// Announcement location of an instance retired by [`create_task_instance`],
/// so the caller can re-render its message as ended.
pub struct RetiredInstance {
    pub id: i32,
    pub evaluated_task: String,
    pub channel_id: Option<String>,
    pub message_id: Option<String>,
}

/// Retires any active instance of the same type and inserts the new one in a
/// single transaction. The serialization point is what upholds the "at most
/// one active instance per type" invariant under concurrent watchers.
pub async fn create_task_instance(
    conn: &PgPool,
    task_id: Option<i32>,
    task_type: TaskType,
    evaluated_task: &str,
    duration: Duration,
) -> anyhow::Result<(TaskInstance, Vec<RetiredInstance>)> {
    let mut tx = conn.begin().await?;

    let retired = sqlx::query(
        "UPDATE task_instances SET end_time = NOW()
         WHERE task_type = $1 AND end_time > NOW()
         RETURNING id, evaluated_task, channel_id, message_id;",
    )
    .bind(task_type.as_str())
    .map(|row: PgRow| RetiredInstance {
        id: row.get("id"),
        evaluated_task: row.get("evaluated_task"),
        channel_id: row.get("channel_id"),
        message_id: row.get("message_id"),
    })
    .fetch_all(&mut tx)
    .await?;

    let instance = sqlx::query(
        "INSERT INTO task_instances (task_id, task_type, evaluated_task, start_time, end_time, drawn_prize)
         VALUES ($1, $2, $3, NOW(), NOW() + make_interval(secs => $4::float8), FALSE)
         RETURNING *;",
    )
    .bind(task_id)
    .bind(task_type.as_str())
    .bind(evaluated_task)
    .bind(duration.num_seconds() as f64)
    .map(map_instance)
    .fetch_one(&mut tx)
    .await?;

    tx.commit().await?;

    Ok((instance, retired))
}

pub async fn set_instance_message(
    conn: &PgPool,
    instance_id: i32,
    channel_id: &str,
    message_id: &str,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE task_instances SET channel_id = $2, message_id = $3 WHERE id = $1;")
        .bind(instance_id)
        .bind(channel_id)
        .bind(message_id)
        .execute(conn)
        .await?;

    Ok(())
}

/// Idempotent: ending an instance that already ended changes nothing and
/// reports `false`.
pub async fn end_instance(conn: &PgPool, instance_id: i32) -> anyhow::Result<bool> {
    let r = sqlx::query("UPDATE task_instances SET end_time = NOW() WHERE id = $1 AND end_time > NOW();")
        .bind(instance_id)
        .execute(conn)
        .await?;

    Ok(r.rows_affected() > 0)
}

pub async fn mark_instances_drawn(conn: &PgPool, instance_ids: &[i32]) -> anyhow::Result<()> {
    sqlx::query("UPDATE task_instances SET drawn_prize = TRUE WHERE id = ANY($1);")
        .bind(instance_ids.to_vec())
        .execute(conn)
        .await?;

    Ok(())
}

//
// Votes
//

async fn load_vote_options(conn: &PgPool, vote: &mut TaskVote) -> anyhow::Result<()> {
    let mut stream = sqlx::query("SELECT * FROM task_vote_options WHERE vote_id = $1 ORDER BY option_index;")
        .bind(vote.id)
        .map(map_vote_option)
        .fetch(conn);

    while let Some(option) = stream.next().await {
        vote.options.push(option?);
    }

    Ok(())
}

pub async fn get_open_vote(conn: &PgPool) -> anyhow::Result<Option<TaskVote>> {
    let vote = sqlx::query("SELECT * FROM task_votes WHERE completed = FALSE ORDER BY end_time DESC LIMIT 1;")
        .map(map_vote)
        .fetch_optional(conn)
        .await?;

    let mut vote = match vote {
        None => return Ok(None),
        Some(v) => v,
    };

    load_vote_options(conn, &mut vote).await?;

    Ok(Some(vote))
}

pub async fn get_latest_vote(conn: &PgPool) -> anyhow::Result<Option<TaskVote>> {
    let vote = sqlx::query("SELECT * FROM task_votes ORDER BY end_time DESC LIMIT 1;")
        .map(map_vote)
        .fetch_optional(conn)
        .await?;

    let mut vote = match vote {
        None => return Ok(None),
        Some(v) => v,
    };

    load_vote_options(conn, &mut vote).await?;

    Ok(Some(vote))
}

pub struct NewVoteOption {
    pub task_id: i32,
    pub evaluated_task: String,
}

pub async fn create_vote(
    conn: &PgPool,
    end_time: DateTime<Utc>,
    options: &[NewVoteOption],
) -> anyhow::Result<TaskVote> {
    let mut tx = conn.begin().await?;

    let row = sqlx::query(
        "INSERT INTO task_votes (start_time, end_time, completed)
         VALUES (NOW(), $1, FALSE)
         RETURNING id, start_time;",
    )
    .bind(end_time)
    .fetch_one(&mut tx)
    .await?;

    let vote_id: i32 = row.get("id");
    let start_time: DateTime<Utc> = row.get("start_time");

    let mut opt_result = Vec::new();

    for (index, option) in options.iter().enumerate() {
        let option_row = sqlx::query(
            "INSERT INTO task_vote_options (vote_id, option_index, task_id, evaluated_task)
             VALUES ($1, $2, $3, $4)
             RETURNING id;",
        )
        .bind(vote_id)
        .bind(index as i32)
        .bind(option.task_id)
        .bind(&option.evaluated_task)
        .fetch_one(&mut tx)
        .await?;

        opt_result.push(TaskVoteOption {
            id: option_row.get("id"),
            vote_id,
            option_index: index as i32,
            task_id: Some(option.task_id),
            evaluated_task: option.evaluated_task.clone(),
        });
    }

    tx.commit().await?;

    Ok(TaskVote {
        id: vote_id,
        start_time,
        end_time,
        completed: false,
        voting_channel_id: None,
        voting_message_id: None,
        selected_option_id: None,
        options: opt_result,
    })
}

pub async fn set_vote_message(
    conn: &PgPool,
    vote_id: i32,
    channel_id: &str,
    message_id: &str,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE task_votes SET voting_channel_id = $2, voting_message_id = $3 WHERE id = $1;")
        .bind(vote_id)
        .bind(channel_id)
        .bind(message_id)
        .execute(conn)
        .await?;

    Ok(())
}

/// Marks the vote tallied. The `completed = FALSE` guard re-validates the
/// precondition at write time, so a second concurrent tally is a no-op.
pub async fn complete_vote(
    conn: &PgPool,
    vote_id: i32,
    selected_option_id: Option<i32>,
) -> anyhow::Result<bool> {
    let r = sqlx::query(
        "UPDATE task_votes SET completed = TRUE, selected_option_id = $2
         WHERE id = $1 AND completed = FALSE;",
    )
    .bind(vote_id)
    .bind(selected_option_id)
    .execute(conn)
    .await?;

    Ok(r.rows_affected() > 0)
}

/// Cancellation removes the vote outright; no instance ever results from a
/// cancelled vote.
pub async fn delete_vote(conn: &PgPool, vote_id: i32) -> anyhow::Result<()> {
    let mut tx = conn.begin().await?;

    sqlx::query("DELETE FROM task_vote_options WHERE vote_id = $1;")
        .bind(vote_id)
        .execute(&mut tx)
        .await?;
    sqlx::query("DELETE FROM task_votes WHERE id = $1;")
        .bind(vote_id)
        .execute(&mut tx)
        .await?;

    tx.commit().await?;

    Ok(())
}

pub async fn get_vote_option(conn: &PgPool, option_id: i32) -> anyhow::Result<Option<TaskVoteOption>> {
    let option = sqlx::query("SELECT * FROM task_vote_options WHERE id = $1;")
        .bind(option_id)
        .map(map_vote_option)
        .fetch_optional(conn)
        .await?;

    Ok(option)
}

pub async fn has_instance_started_since(
    conn: &PgPool,
    task_type: TaskType,
    since: DateTime<Utc>,
) -> anyhow::Result<bool> {
    let r = sqlx::query(
        "SELECT EXISTS(SELECT 1 FROM task_instances WHERE task_type = $1 AND start_time >= $2) AS known;",
    )
    .bind(task_type.as_str())
    .bind(since)
    .fetch_one(conn)
    .await?;

    Ok(r.get("known"))
}

//
// Completions
//

pub struct NewCompletion {
    pub instance_id: i32,
    pub user_id: String,
    pub approver_id: String,
    pub completion_time: DateTime<Utc>,
    pub evidence_channel_id: String,
    pub evidence_message_id: String,
}

/// Records an attested completion. A `(instance_id, user_id)` conflict is the
/// expected duplicate-approval race and reports `false` instead of failing.
pub async fn add_completion(conn: &PgPool, completion: &NewCompletion) -> anyhow::Result<bool> {
    let r = sqlx::query(
        "INSERT INTO task_completions
             (instance_id, user_id, approver_id, completion_time, evidence_channel_id, evidence_message_id)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (instance_id, user_id) DO NOTHING;",
    )
    .bind(completion.instance_id)
    .bind(&completion.user_id)
    .bind(&completion.approver_id)
    .bind(completion.completion_time)
    .bind(&completion.evidence_channel_id)
    .bind(&completion.evidence_message_id)
    .execute(conn)
    .await?;

    Ok(r.rows_affected() > 0)
}

pub async fn remove_completions_by_evidence_message(
    conn: &PgPool,
    evidence_message_id: &str,
) -> anyhow::Result<Vec<TaskCompletion>> {
    let removed = sqlx::query("DELETE FROM task_completions WHERE evidence_message_id = $1 RETURNING *;")
        .bind(evidence_message_id)
        .map(map_completion)
        .fetch_all(conn)
        .await?;

    Ok(removed)
}

pub async fn get_completions_for_instance(conn: &PgPool, instance_id: i32) -> anyhow::Result<Vec<TaskCompletion>> {
    let completions = sqlx::query("SELECT * FROM task_completions WHERE instance_id = $1 ORDER BY completion_time;")
        .bind(instance_id)
        .map(map_completion)
        .fetch_all(conn)
        .await?;

    Ok(completions)
}

pub async fn get_completions_for_instances(
    conn: &PgPool,
    instance_ids: &[i32],
) -> anyhow::Result<Vec<TaskCompletion>> {
    let mut stream = sqlx::query("SELECT * FROM task_completions WHERE instance_id = ANY($1) ORDER BY id;")
        .bind(instance_ids.to_vec())
        .map(map_completion)
        .fetch(conn);

    let mut completions = Vec::new();
    while let Some(completion) = stream.next().await {
        completions.push(completion?);
    }

    Ok(completions)
}
