use chrono::Utc;
use evlog::meta;
use serenity::model::channel::Message;
use serenity::model::id::UserId;
use sqlx::PgPool;

use crate::db::model;
use crate::db::model::NewCompletion;
use crate::db::schema::{TaskCompletion, TaskType};
use crate::runtime::get_logger;

/// Records an attested completion for the instance of `task_type` covering
/// the evidence message's timestamp. A duplicate attestation for the same
/// `(instance, participant)` pair is an expected race between approvers and
/// only gets logged.
pub async fn approve_evidence(
    conn: &PgPool,
    message: &Message,
    task_type: TaskType,
    approver: UserId,
) -> anyhow::Result<()> {
    let posted_at = message.timestamp.with_timezone(&Utc);

    let instance = match model::get_instance_covering(conn, task_type, posted_at).await? {
        None => {
            get_logger().info("Approval had no covering task instance; ignored.", meta! {
                "TaskType" => task_type.as_str(),
                "MessageID" => message.id,
                "PostedAt" => posted_at,
            });
            return Ok(());
        }
        Some(v) => v,
    };

    let recorded = model::add_completion(conn, &NewCompletion {
        instance_id: instance.id,
        user_id: message.author.id.to_string(),
        approver_id: approver.to_string(),
        completion_time: Utc::now(),
        evidence_channel_id: message.channel_id.to_string(),
        evidence_message_id: message.id.to_string(),
    })
    .await?;

    if recorded {
        get_logger().info("Recorded task completion.", meta! {
            "InstanceID" => instance.id,
            "UserID" => message.author.id,
            "ApproverID" => approver,
        });
    } else {
        get_logger().debug("Completion already recorded.", meta! {
            "InstanceID" => instance.id,
            "UserID" => message.author.id,
        });
    }

    Ok(())
}

/// Retracts every completion recorded against an evidence message.
pub async fn retract_evidence(conn: &PgPool, evidence_message_id: &str) -> anyhow::Result<Vec<TaskCompletion>> {
    let removed = model::remove_completions_by_evidence_message(conn, evidence_message_id).await?;

    if !removed.is_empty() {
        get_logger().info("Retracted task completions.", meta! {
            "EvidenceMessageID" => evidence_message_id,
            "Removed" => removed.len(),
        });
    }

    Ok(removed)
}
