use chrono::Duration;
use evlog::meta;
use serenity::client::Context;
use serenity::model::id::{ChannelId, MessageId};
use sqlx::PgPool;

use crate::db::model;
use crate::db::schema::{TaskInstance, TaskType};
use crate::runtime::get_logger;

/// Starts a new instance of `task_type`, retiring whatever was active. The
/// retire-then-insert runs in one store transaction; the announcement and
/// message bookkeeping happen after commit.
pub async fn start_instance(
    ctx: &Context,
    conn: &PgPool,
    task_id: Option<i32>,
    task_type: TaskType,
    evaluated_task: &str,
    instruction: Option<&str>,
    duration: Duration,
    announce_channel: u64,
) -> anyhow::Result<TaskInstance> {
    let (instance, retired) =
        model::create_task_instance(conn, task_id, task_type, evaluated_task, duration).await?;

    for old in &retired {
        mark_announcement_ended(ctx, old.channel_id.as_deref(), old.message_id.as_deref(), &old.evaluated_task).await;
    }

    get_logger().info("Started task instance.", meta! {
        "InstanceID" => instance.id,
        "TaskType" => task_type.as_str(),
        "EndTime" => instance.end_time,
    });

    let title = match task_type {
        TaskType::Standard => "New task",
        TaskType::Bonus => "Bonus task",
    };

    let channel = ChannelId(announce_channel);
    let message = channel
        .send_message(&ctx.http, |m| {
            m.embed(|e| {
                e.title(title);
                e.description(&instance.evaluated_task);
                if let Some(instruction) = instruction {
                    e.field("How to submit", instruction, false);
                }
                e.field("Ends", format!("<t:{}>", instance.end_time.timestamp()), false);
                e
            })
        })
        .await?;

    model::set_instance_message(conn, instance.id, &channel.to_string(), &message.id.to_string()).await?;

    Ok(instance)
}

/// Ends an instance ahead of its scheduled end. Ending twice is a no-op; the
/// second call observes `end_time` already in the past and changes nothing.
pub async fn end(ctx: &Context, conn: &PgPool, instance: &TaskInstance) -> anyhow::Result<bool> {
    let ended_now = model::end_instance(conn, instance.id).await?;

    if ended_now {
        get_logger().info("Ended task instance.", meta! {
            "InstanceID" => instance.id,
            "TaskType" => instance.task_type.as_str(),
        });
        mark_announcement_ended(
            ctx,
            instance.channel_id.as_deref(),
            instance.message_id.as_deref(),
            &instance.evaluated_task,
        )
        .await;
    }

    Ok(ended_now)
}

/// Re-renders an instance announcement as ended. A missing message or
/// channel means the target is already gone, which is fine.
pub async fn mark_announcement_ended(
    ctx: &Context,
    channel_id: Option<&str>,
    message_id: Option<&str>,
    evaluated_task: &str,
) {
    let (channel_id, message_id) = match (channel_id, message_id) {
        (Some(c), Some(m)) => (c, m),
        _ => return,
    };

    let channel: u64 = match channel_id.parse() {
        Ok(v) => v,
        Err(_) => return,
    };
    let message: u64 = match message_id.parse() {
        Ok(v) => v,
        Err(_) => return,
    };

    let r = ChannelId(channel)
        .edit_message(&ctx.http, MessageId(message), |m| {
            m.embed(|e| {
                e.title("Task ended");
                e.description(evaluated_task);
                e
            })
        })
        .await;

    if let Err(e) = r {
        get_logger().debug("Could not re-render ended task announcement; target assumed gone.", meta! {
            "ChannelID" => channel,
            "MessageID" => message,
            "Error" => e,
        });
    }
}
