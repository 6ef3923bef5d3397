use chrono::Utc;
use evlog::meta;
use itertools::Itertools;
use serenity::client::Context;
use serenity::model::channel::ReactionType;
use serenity::model::id::{ChannelId, MessageId};
use sqlx::PgPool;

use crate::catalog;
use crate::config::BotConfig;
use crate::db::model;
use crate::db::model::NewVoteOption;
use crate::db::schema::{TaskInstance, TaskType, TaskVote, TaskVoteOption};
use crate::rotation::instance;
use crate::runtime::get_logger;
use crate::support::ballot;
use crate::support::time::round_to_minute;
use crate::template::ParsedTemplate;

/// Winning option index for a set of per-option ballot counts: highest count
/// wins, ties go to the lowest index. All-zero counts mean nobody voted at
/// all, which is an explicit no-winner outcome.
pub fn pick_winning_option(counts: &[u64]) -> Option<usize> {
    if counts.iter().all(|&c| c == 0) {
        return None;
    }

    // Stable sort keeps index order within equal counts.
    counts
        .iter()
        .enumerate()
        .sorted_by_key(|&(_, &count)| std::cmp::Reverse(count))
        .next()
        .map(|(index, _)| index)
}

/// Opens a new vote: samples distinct standard tasks, freezes each option's
/// wording with a single template evaluation, persists vote and options in
/// one transaction, then announces with one ballot reaction per option.
pub async fn open_vote(ctx: &Context, conn: &PgPool, config: &BotConfig) -> anyhow::Result<TaskVote> {
    let tasks = model::get_tasks(conn).await?;
    let picked = catalog::pick_random_tasks(&tasks, config.voting_task_count)?;

    let mut options = Vec::new();
    for task in &picked {
        let template = ParsedTemplate::new(&task.description)?;
        options.push(NewVoteOption {
            task_id: task.id,
            evaluated_task: template.evaluate(),
        });
    }

    let end_time = round_to_minute(Utc::now() + config.voting_window);
    let vote = model::create_vote(conn, end_time, &options).await?;

    get_logger().info("Opened task vote.", meta! {
        "VoteID" => vote.id,
        "Options" => vote.options.len(),
        "EndTime" => vote.end_time,
    });

    let channel = ChannelId(config.vote_channel);
    let message = channel
        .send_message(&ctx.http, |m| {
            m.embed(|e| {
                e.title("Vote for the next task");

                let mut opt_string = String::new();
                for option in &vote.options {
                    if let Some(symbol) = ballot::symbol_for_index(option.option_index as usize) {
                        opt_string.push_str(&format!("{} {}\n", symbol, option.evaluated_task));
                    }
                }
                e.description(opt_string);

                e.field("Voting ends", format!("<t:{}>", vote.end_time.timestamp()), false);
                e
            })
        })
        .await?;

    for option in &vote.options {
        if let Some(symbol) = ballot::symbol_for_index(option.option_index as usize) {
            ctx.http
                .create_reaction(channel.0, message.id.0, &ReactionType::Unicode(symbol.to_owned()))
                .await?;
        }
    }

    model::set_vote_message(conn, vote.id, &channel.to_string(), &message.id.to_string()).await?;

    Ok(vote)
}

/// Tallies a vote whose end time has passed and marks it completed. Ballot
/// counts exclude the bot's own seed reactions.
pub async fn tally_vote(
    ctx: &Context,
    conn: &PgPool,
    vote: &TaskVote,
) -> anyhow::Result<Option<TaskVoteOption>> {
    let counts = match fetch_ballot_counts(ctx, vote).await {
        Some(v) => v,
        // Announcement gone: nothing was voted on.
        None => vec![0; vote.options.len()],
    };

    let selected = pick_winning_option(&counts).and_then(|index| vote.options.get(index)).cloned();

    let completed_now = model::complete_vote(conn, vote.id, selected.as_ref().map(|o| o.id)).await?;
    if !completed_now {
        // Another watcher iteration tallied this vote first.
        get_logger().debug("Vote was already completed; skipping tally.", meta! {
            "VoteID" => vote.id,
        });
        return Ok(None);
    }

    match &selected {
        None => {
            get_logger().info("Vote closed with no ballots cast.", meta! {
                "VoteID" => vote.id,
            });
        }
        Some(option) => {
            get_logger().info("Vote closed.", meta! {
                "VoteID" => vote.id,
                "SelectedOptionIndex" => option.option_index,
                "SelectedTask" => option.evaluated_task,
            });
        }
    }

    edit_vote_announcement(ctx, vote, selected.as_ref()).await;

    Ok(selected)
}

async fn fetch_ballot_counts(ctx: &Context, vote: &TaskVote) -> Option<Vec<u64>> {
    let channel: u64 = vote.voting_channel_id.as_ref()?.parse().ok()?;
    let message_id: u64 = vote.voting_message_id.as_ref()?.parse().ok()?;

    let message = ChannelId(channel).message(&ctx.http, MessageId(message_id)).await.ok()?;

    let mut counts = vec![0u64; vote.options.len()];
    for reaction in &message.reactions {
        let symbol = match &reaction.reaction_type {
            ReactionType::Unicode(s) => s.as_str(),
            _ => continue,
        };
        let index = match ballot::index_for_symbol(symbol) {
            Some(v) if v < counts.len() => v,
            _ => continue,
        };

        let mut count = reaction.count;
        if reaction.me {
            count = count.saturating_sub(1);
        }
        counts[index] = count;
    }

    Some(counts)
}

async fn edit_vote_announcement(ctx: &Context, vote: &TaskVote, selected: Option<&TaskVoteOption>) {
    let (channel, message_id) = match (
        vote.voting_channel_id.as_ref().and_then(|v| v.parse::<u64>().ok()),
        vote.voting_message_id.as_ref().and_then(|v| v.parse::<u64>().ok()),
    ) {
        (Some(c), Some(m)) => (c, m),
        _ => return,
    };

    let r = ChannelId(channel)
        .edit_message(&ctx.http, MessageId(message_id), |m| {
            m.embed(|e| {
                e.title("Voting closed");
                match selected {
                    None => e.description("No ballots were cast; no task was selected."),
                    Some(option) => e.description(format!("Winning task: {}", option.evaluated_task)),
                }
            })
        })
        .await;

    if let Err(e) = r {
        get_logger().debug("Could not edit vote announcement; target assumed gone.", meta! {
            "VoteID" => vote.id,
            "Error" => e,
        });
    }
}

/// Cancels an open vote: the announcement and the vote rows are removed and
/// none of its options ever becomes a task.
pub async fn cancel_vote(ctx: &Context, conn: &PgPool, vote: &TaskVote) -> anyhow::Result<()> {
    if let (Some(channel), Some(message_id)) = (
        vote.voting_channel_id.as_ref().and_then(|v| v.parse::<u64>().ok()),
        vote.voting_message_id.as_ref().and_then(|v| v.parse::<u64>().ok()),
    ) {
        if let Err(e) = ctx.http.delete_message(channel, message_id).await {
            get_logger().debug("Could not delete vote announcement; target assumed gone.", meta! {
                "VoteID" => vote.id,
                "Error" => e,
            });
        }
    }

    model::delete_vote(conn, vote.id).await?;

    get_logger().info("Cancelled task vote.", meta! {
        "VoteID" => vote.id,
    });

    Ok(())
}

/// Starts the standard instance a completed vote selected. Called by the
/// task-start watcher once the post-vote grace delay has elapsed.
pub async fn start_selected_task(
    ctx: &Context,
    conn: &PgPool,
    config: &BotConfig,
    vote: &TaskVote,
) -> anyhow::Result<Option<TaskInstance>> {
    let option_id = match vote.selected_option_id {
        None => return Ok(None),
        Some(v) => v,
    };

    let option = match model::get_vote_option(conn, option_id).await? {
        None => {
            get_logger().info("Selected vote option no longer exists.", meta! {
                "VoteID" => vote.id,
                "OptionID" => option_id,
            });
            return Ok(None);
        }
        Some(v) => v,
    };

    let task = match option.task_id {
        None => None,
        Some(task_id) => model::get_task_by_id(conn, task_id).await?,
    };

    let started = instance::start_instance(
        ctx,
        conn,
        option.task_id,
        TaskType::Standard,
        &option.evaluated_task,
        task.as_ref().map(|t| t.instruction.as_str()),
        config.task_duration,
        config.task_channel,
    )
    .await?;

    Ok(Some(started))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highest_count_wins() {
        assert_eq!(pick_winning_option(&[1, 4, 2]), Some(1));
        assert_eq!(pick_winning_option(&[0, 0, 3]), Some(2));
    }

    #[test]
    fn ties_go_to_the_lowest_index() {
        assert_eq!(pick_winning_option(&[3, 3, 1]), Some(0));
        assert_eq!(pick_winning_option(&[2, 5, 5]), Some(1));
        assert_eq!(pick_winning_option(&[1, 1, 1]), Some(0));
    }

    #[test]
    fn zero_ballots_selects_nothing() {
        assert_eq!(pick_winning_option(&[0, 0, 0]), None);
        assert_eq!(pick_winning_option(&[]), None);
    }

    #[test]
    fn single_option_votes_resolve() {
        assert_eq!(pick_winning_option(&[2]), Some(0));
        assert_eq!(pick_winning_option(&[0]), None);
    }
}
