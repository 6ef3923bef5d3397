use std::sync::Arc;

use chrono::Utc;
use evlog::meta;
use serenity::client::Context;
use sqlx::PgPool;

use crate::config::BotConfig;
use crate::db::dbclient::DBClient;
use crate::db::model;
use crate::db::schema::TaskType;
use crate::rotation::vote;
use crate::runtime::get_logger;

/// Spawns the three timed watchers. Each one is an independent loop that
/// re-reads persisted state every poll interval and recomputes what is due
/// from stored timestamps, so a process restart resumes cleanly with no
/// in-memory timers to rebuild. A failed iteration is logged and the loop
/// carries on at the next tick.
pub fn spawn_watchers(ctx: Context, db: Arc<DBClient>, config: Arc<BotConfig>) {
    get_logger().info("Starting rotation watchers.", meta! {
        "PollIntervalSecs" => config.poll_interval.as_secs(),
    });

    {
        let ctx = ctx.clone();
        let db = db.clone();
        let config = config.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(config.poll_interval).await;
                if let Err(e) = vote_start_tick(&ctx, db.conn(), &config).await {
                    get_logger().error_with_err("Vote start watcher iteration failed.", &*e, None);
                }
            }
        });
    }

    {
        let ctx = ctx.clone();
        let db = db.clone();
        let config = config.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(config.poll_interval).await;
                if let Err(e) = vote_end_tick(&ctx, db.conn()).await {
                    get_logger().error_with_err("Vote end watcher iteration failed.", &*e, None);
                }
            }
        });
    }

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(config.poll_interval).await;
            if let Err(e) = task_start_tick(&ctx, db.conn(), &config).await {
                get_logger().error_with_err("Task start watcher iteration failed.", &*e, None);
            }
        }
    });
}

/// Opens a vote when none is open, the previous vote's result has been
/// consumed, and the active standard task (if any) is inside its final
/// voting window.
async fn vote_start_tick(ctx: &Context, conn: &PgPool, config: &BotConfig) -> anyhow::Result<()> {
    if model::get_open_vote(conn).await?.is_some() {
        return Ok(());
    }

    // A completed vote with a selection that has not yet produced an
    // instance parks the rotation until the task-start watcher consumes it.
    if let Some(latest) = model::get_latest_vote(conn).await? {
        if latest.completed
            && latest.selected_option_id.is_some()
            && !model::has_instance_started_since(conn, TaskType::Standard, latest.end_time).await?
        {
            return Ok(());
        }
    }

    if let Some(active) = model::get_active_instance(conn, TaskType::Standard).await? {
        if active.end_time - Utc::now() > config.voting_window {
            return Ok(());
        }
    }

    let tasks = model::get_tasks(conn).await?;
    let standard_count = tasks.iter().filter(|t| t.weight > 0).count();
    if standard_count < config.voting_task_count {
        get_logger().debug("Not enough standard tasks to open a vote.", meta! {
            "Standard" => standard_count,
            "Needed" => config.voting_task_count,
        });
        return Ok(());
    }

    vote::open_vote(ctx, conn, config).await?;

    Ok(())
}

async fn vote_end_tick(ctx: &Context, conn: &PgPool) -> anyhow::Result<()> {
    let open = match model::get_open_vote(conn).await? {
        None => return Ok(()),
        Some(v) => v,
    };

    if open.end_time > Utc::now() {
        return Ok(());
    }

    vote::tally_vote(ctx, conn, &open).await?;

    Ok(())
}

/// Starts the task a completed vote selected, once the grace delay past the
/// vote's end has elapsed and no standard instance has started since.
async fn task_start_tick(ctx: &Context, conn: &PgPool, config: &BotConfig) -> anyhow::Result<()> {
    let latest = match model::get_latest_vote(conn).await? {
        None => return Ok(()),
        Some(v) => v,
    };

    if !latest.completed || latest.selected_option_id.is_none() {
        return Ok(());
    }

    if Utc::now() < latest.end_time + config.task_start_delay {
        return Ok(());
    }

    // Re-validated right before acting: another watcher iteration (or a
    // restart race) may already have started this task.
    if model::has_instance_started_since(conn, TaskType::Standard, latest.end_time).await? {
        return Ok(());
    }

    vote::start_selected_task(ctx, conn, config, &latest).await?;

    Ok(())
}
