use chrono::{Duration, Utc};
use serenity::builder::CreateApplicationCommand;
use serenity::client::Context;
use serenity::model::interactions::application_command::{
    ApplicationCommandInteraction, ApplicationCommandInteractionDataOption, ApplicationCommandOptionType,
};

use crate::handler::BotData;
use crate::helpers::{command_opt, command_perm, command_resp};
use crate::rotation::winner;
use crate::rotation::winner::DrawOutcome;

pub const PRIZE: &str = "prize";

pub fn prize_builder(cmd: &mut CreateApplicationCommand) -> &mut CreateApplicationCommand {
    cmd.name(PRIZE)
        .description("Prize draws over recorded completions")
        .create_option(|opt| {
            opt.name("draw")
                .description("Draw a winner from all not-yet-rewarded tasks")
                .kind(ApplicationCommandOptionType::SubCommand)
        })
        .create_option(|opt| {
            opt.name("redraw")
                .description("Re-run a draw over a historical window")
                .kind(ApplicationCommandOptionType::SubCommand)
                .create_sub_option(|opt| opt
                    .name("days")
                    .description("How many days back the window reaches")
                    .required(true)
                    .kind(ApplicationCommandOptionType::Integer))
                .create_sub_option(|opt| opt
                    .name("update-tasks")
                    .description("Also mark the included tasks as rewarded (default: false)")
                    .required(false)
                    .kind(ApplicationCommandOptionType::Boolean))
        })
}

async fn announce_outcome(
    ctx: &Context,
    interaction: &ApplicationCommandInteraction,
    outcome: &DrawOutcome,
) -> anyhow::Result<()> {
    interaction.create_followup_message(&ctx.http, |r| r.create_embed(|e| {
        e.title("Prize draw");

        match &outcome.winner {
            None => {
                e.description("No winners: there were no eligible completions.");
            }
            Some((user, completion)) => {
                e.description(format!("Winner: <@{}>", user.id));
                e.field("Winning completion", format!("Instance {}", completion.instance_id), false);
            }
        }

        e.field("Pool", format!(
            "{} standard / {} bonus completions from {} participants",
            outcome.report.standard_completions,
            outcome.report.bonus_completions,
            outcome.report.unique_participants,
        ), false);

        e
    })).await?;

    Ok(())
}

async fn prize_draw(ctx: &Context, interaction: &ApplicationCommandInteraction, data: &BotData) -> anyhow::Result<()> {
    let outcome = match winner::draw_winner(ctx, data.db_client.conn(), None, true).await {
        Ok(v) => v,
        Err(e) => {
            command_resp::reply_deferred_result(ctx, interaction, "Error occurred upon attempt to draw a winner.").await?;
            return Err(e);
        }
    };

    announce_outcome(ctx, interaction, &outcome).await?;

    Ok(())
}

async fn prize_redraw(
    ctx: &Context,
    interaction: &ApplicationCommandInteraction,
    sub: &ApplicationCommandInteractionDataOption,
    data: &BotData,
) -> anyhow::Result<()> {
    let days = command_opt::find_required(ctx, interaction, &sub.options, command_opt::find_integer_opt, "days").await?.unwrap();
    if days < 1 {
        command_resp::reply_deferred_result(ctx, interaction, format!("`days` must be at least 1; got {}.", days)).await?;
        return Ok(());
    }

    let update_tasks = command_opt::find_bool_opt(&sub.options, "update-tasks").unwrap_or(false);

    let now = Utc::now();
    let window = Some((now - Duration::days(days), now));

    let outcome = match winner::draw_winner(ctx, data.db_client.conn(), window, update_tasks).await {
        Ok(v) => v,
        Err(e) => {
            command_resp::reply_deferred_result(ctx, interaction, "Error occurred upon attempt to re-run the draw.").await?;
            return Err(e);
        }
    };

    announce_outcome(ctx, interaction, &outcome).await?;

    Ok(())
}

pub async fn prize(ctx: Context, interaction: ApplicationCommandInteraction) -> anyhow::Result<()> {
    command_resp::reply_deferred_ack(&ctx, &interaction).await?;

    let sub = &interaction.data.options[0];

    let data = ctx.data.read().await;
    let data = data.get::<BotData>().unwrap();

    if !command_perm::require_admin(&ctx, &interaction).await? {
        return Ok(());
    }

    match sub.name.as_str() {
        "draw" => prize_draw(&ctx, &interaction, data).await?,
        "redraw" => prize_redraw(&ctx, &interaction, sub, data).await?,
        _ => {}
    }

    Ok(())
}
