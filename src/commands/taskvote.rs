use serenity::builder::CreateApplicationCommand;
use serenity::client::Context;
use serenity::model::interactions::application_command::{
    ApplicationCommandInteraction, ApplicationCommandOptionType,
};

use crate::db::model;
use crate::handler::BotData;
use crate::helpers::{command_perm, command_resp};
use crate::rotation::vote;
use crate::support::ballot;

pub const TASKVOTE: &str = "taskvote";

pub fn taskvote_builder(cmd: &mut CreateApplicationCommand) -> &mut CreateApplicationCommand {
    cmd.name(TASKVOTE)
        .description("Votes on the next task")
        .create_option(|opt| {
            opt.name("status")
                .description("Show the currently open vote")
                .kind(ApplicationCommandOptionType::SubCommand)
        })
        .create_option(|opt| {
            opt.name("start")
                .description("Open a new vote now, cancelling any open one")
                .kind(ApplicationCommandOptionType::SubCommand)
        })
        .create_option(|opt| {
            opt.name("cancel")
                .description("Cancel the open vote")
                .kind(ApplicationCommandOptionType::SubCommand)
        })
}

async fn taskvote_status(ctx: &Context, interaction: &ApplicationCommandInteraction, data: &BotData) -> anyhow::Result<()> {
    let open = match model::get_open_vote(data.db_client.conn()).await? {
        None => {
            command_resp::reply_deferred_result(ctx, interaction, "No vote is currently open.").await?;
            return Ok(());
        }
        Some(v) => v,
    };

    interaction.create_followup_message(&ctx.http, |r| r.create_embed(|e| {
        e.title("Open vote");

        let mut opt_string = String::new();
        for option in &open.options {
            if let Some(symbol) = ballot::symbol_for_index(option.option_index as usize) {
                opt_string.push_str(&format!("{} {}\n", symbol, option.evaluated_task));
            }
        }
        e.description(opt_string);

        e.field("Voting ends", format!("<t:{}>", open.end_time.timestamp()), false);
        e
    })).await?;

    Ok(())
}

async fn taskvote_start(ctx: &Context, interaction: &ApplicationCommandInteraction, data: &BotData) -> anyhow::Result<()> {
    let conn = data.db_client.conn();

    let tasks = model::get_tasks(conn).await?;
    let standard_count = tasks.iter().filter(|t| t.weight > 0).count();
    if standard_count < data.config.voting_task_count {
        command_resp::reply_deferred_result(ctx, interaction, format!(
            "Not enough standard tasks to open a vote; need {}, have {}.",
            data.config.voting_task_count, standard_count
        )).await?;
        return Ok(());
    }

    // A new vote supersedes any vote still open.
    if let Some(open) = model::get_open_vote(conn).await? {
        vote::cancel_vote(ctx, conn, &open).await?;
    }

    let opened = match vote::open_vote(ctx, conn, &data.config).await {
        Ok(v) => v,
        Err(e) => {
            command_resp::reply_deferred_result(ctx, interaction, "Error occurred upon attempt to open a vote.").await?;
            return Err(e);
        }
    };

    command_resp::reply_deferred_result(ctx, interaction, format!(
        "Vote opened with {} options; voting ends <t:{}>.",
        opened.options.len(),
        opened.end_time.timestamp()
    )).await?;

    Ok(())
}

async fn taskvote_cancel(ctx: &Context, interaction: &ApplicationCommandInteraction, data: &BotData) -> anyhow::Result<()> {
    let conn = data.db_client.conn();

    let open = match model::get_open_vote(conn).await? {
        None => {
            command_resp::reply_deferred_result(ctx, interaction, "No vote is currently open.").await?;
            return Ok(());
        }
        Some(v) => v,
    };

    vote::cancel_vote(ctx, conn, &open).await?;
    command_resp::reply_deferred_result(ctx, interaction, "Vote cancelled; no task will result from it.").await?;

    Ok(())
}

pub async fn taskvote(ctx: Context, interaction: ApplicationCommandInteraction) -> anyhow::Result<()> {
    command_resp::reply_deferred_ack(&ctx, &interaction).await?;

    let sub = &interaction.data.options[0];

    let data = ctx.data.read().await;
    let data = data.get::<BotData>().unwrap();

    match sub.name.as_str() {
        "status" => taskvote_status(&ctx, &interaction, data).await?,
        "start" => {
            if command_perm::require_admin(&ctx, &interaction).await? {
                taskvote_start(&ctx, &interaction, data).await?;
            }
        }
        "cancel" => {
            if command_perm::require_admin(&ctx, &interaction).await? {
                taskvote_cancel(&ctx, &interaction, data).await?;
            }
        }
        _ => {}
    }

    Ok(())
}
