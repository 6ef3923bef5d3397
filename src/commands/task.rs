use chrono::Duration;
use evlog::meta;
use serenity::builder::CreateApplicationCommand;
use serenity::client::Context;
use serenity::model::interactions::application_command::{
    ApplicationCommandInteraction, ApplicationCommandInteractionDataOption, ApplicationCommandOptionType,
};

use crate::catalog;
use crate::db::model;
use crate::db::schema::{Task, TaskInstance, TaskType};
use crate::handler::BotData;
use crate::helpers::{command_opt, command_perm, command_resp};
use crate::rotation::instance;
use crate::runtime::get_logger;
use crate::support::taskfile;
use crate::template::ParsedTemplate;

pub const TASK: &str = "task";

pub fn task_builder(cmd: &mut CreateApplicationCommand) -> &mut CreateApplicationCommand {
    cmd.name(TASK)
        .description("Rotating community tasks")
        .create_option(|opt| {
            opt.name("show")
                .description("Show the currently active task")
                .kind(ApplicationCommandOptionType::SubCommand)
        })
        .create_option(|opt| {
            opt.name("completions")
                .description("List completions recorded for the active task")
                .kind(ApplicationCommandOptionType::SubCommand)
        })
        .create_option(|opt| {
            opt.name("add")
                .description("Add a task to the catalog")
                .kind(ApplicationCommandOptionType::SubCommand)
                .create_sub_option(|opt| opt
                    .name("description")
                    .description("Task text; may contain {min,max} or {min,max,round} placeholders")
                    .required(true)
                    .kind(ApplicationCommandOptionType::String))
                .create_sub_option(|opt| opt
                    .name("instruction")
                    .description("How participants submit this task")
                    .required(true)
                    .kind(ApplicationCommandOptionType::String))
                .create_sub_option(|opt| opt
                    .name("weight")
                    .description("Rotation weight; 0 removes the task from rotation (default: 1)")
                    .required(false)
                    .kind(ApplicationCommandOptionType::Integer))
        })
        .create_option(|opt| {
            opt.name("edit")
                .description("Edit an existing task")
                .kind(ApplicationCommandOptionType::SubCommand)
                .create_sub_option(|opt| opt
                    .name("id")
                    .description("ID of the task to edit")
                    .required(true)
                    .kind(ApplicationCommandOptionType::Integer))
                .create_sub_option(|opt| opt
                    .name("description")
                    .description("New task text")
                    .required(false)
                    .kind(ApplicationCommandOptionType::String))
                .create_sub_option(|opt| opt
                    .name("instruction")
                    .description("New submission instruction")
                    .required(false)
                    .kind(ApplicationCommandOptionType::String))
                .create_sub_option(|opt| opt
                    .name("weight")
                    .description("New rotation weight")
                    .required(false)
                    .kind(ApplicationCommandOptionType::Integer))
        })
        .create_option(|opt| {
            opt.name("reload")
                .description("Replace the catalog from the configured task file")
                .kind(ApplicationCommandOptionType::SubCommand)
        })
        .create_option(|opt| {
            opt.name("bonus")
                .description("Start a bonus task instance")
                .kind(ApplicationCommandOptionType::SubCommand)
                .create_sub_option(|opt| opt
                    .name("task-id")
                    .description("Catalog ID of the task to run (default: random)")
                    .required(false)
                    .kind(ApplicationCommandOptionType::Integer))
                .create_sub_option(|opt| opt
                    .name("hours")
                    .description("How long the bonus task runs")
                    .required(false)
                    .kind(ApplicationCommandOptionType::Integer))
        })
        .create_option(|opt| {
            opt.name("end")
                .description("End an active task instance early")
                .kind(ApplicationCommandOptionType::SubCommand)
                .create_sub_option(|opt| opt
                    .name("bonus")
                    .description("End the bonus instance instead of the standard one")
                    .required(false)
                    .kind(ApplicationCommandOptionType::Boolean))
        })
}

async fn task_show(ctx: &Context, interaction: &ApplicationCommandInteraction, data: &BotData) -> anyhow::Result<()> {
    let conn = data.db_client.conn();

    let standard = model::get_active_instance(conn, TaskType::Standard).await?;
    let bonus = model::get_active_instance(conn, TaskType::Bonus).await?;

    if standard.is_none() && bonus.is_none() {
        match model::get_latest_instance(conn, TaskType::Standard).await? {
            None => {
                command_resp::reply_deferred_result(ctx, interaction, "No task is currently active.").await?;
            }
            Some(last) => {
                command_resp::reply_deferred_result(ctx, interaction, format!(
                    "No task is currently active. The last task ended <t:{}>: {}",
                    last.end_time.timestamp(),
                    last.evaluated_task
                )).await?;
            }
        }
        return Ok(());
    }

    let mut fields: Vec<(String, String)> = Vec::new();
    for (label, active) in [("Current task", &standard), ("Bonus task", &bonus)] {
        let active = match active {
            None => continue,
            Some(v) => v,
        };

        let mut body = active.evaluated_task.clone();
        if let Some(task) = lookup_task(conn, active).await? {
            body.push_str(&format!("\n*{}*", task.instruction));
        }
        body.push_str(&format!("\nEnds <t:{}>", active.end_time.timestamp()));

        fields.push((label.to_owned(), body));
    }

    interaction.create_followup_message(&ctx.http, |r| r.create_embed(|e| {
        e.title("Active tasks");
        for (label, body) in &fields {
            e.field(label, body, false);
        }
        e
    })).await?;

    Ok(())
}

async fn lookup_task(conn: &sqlx::PgPool, active: &TaskInstance) -> anyhow::Result<Option<Task>> {
    match active.task_id {
        None => Ok(None),
        Some(task_id) => model::get_task_by_id(conn, task_id).await,
    }
}

async fn task_completions(ctx: &Context, interaction: &ApplicationCommandInteraction, data: &BotData) -> anyhow::Result<()> {
    let conn = data.db_client.conn();

    let active = match model::get_active_instance(conn, TaskType::Standard).await? {
        None => {
            command_resp::reply_deferred_result(ctx, interaction, "No task is currently active.").await?;
            return Ok(());
        }
        Some(v) => v,
    };

    let completions = model::get_completions_for_instance(conn, active.id).await?;

    if completions.is_empty() {
        command_resp::reply_deferred_result(ctx, interaction, "No completions have been recorded yet.").await?;
        return Ok(());
    }

    interaction.create_followup_message(&ctx.http, |r| r.create_embed(|e| {
        e.title("Completions");
        e.description(&active.evaluated_task);

        let mut lines = String::new();
        for completion in &completions {
            lines.push_str(&format!(
                "<@{}> (approved by <@{}>)\n",
                completion.user_id, completion.approver_id
            ));
        }
        e.field("Participants", lines, false);
        e
    })).await?;

    Ok(())
}

async fn task_add(
    ctx: &Context,
    interaction: &ApplicationCommandInteraction,
    opt: &ApplicationCommandInteractionDataOption,
    data: &BotData,
) -> anyhow::Result<()> {
    let description = command_opt::find_required(ctx, interaction, &opt.options, command_opt::find_string_opt, "description").await?.unwrap();
    let instruction = command_opt::find_required(ctx, interaction, &opt.options, command_opt::find_string_opt, "instruction").await?.unwrap();
    let weight = command_opt::find_integer_opt(&opt.options, "weight").unwrap_or(1);

    if weight < 0 {
        command_resp::reply_deferred_result(ctx, interaction, format!("`weight` must not be negative; got {}.", weight)).await?;
        return Ok(());
    }

    let description = description.trim().to_owned();
    let instruction = instruction.trim().to_owned();

    if let Err(e) = ParsedTemplate::new(&description) {
        get_logger().info("Invalid template passed to /task add.", meta! {
            "InteractionID" => interaction.id,
            "Template" => description,
        });
        command_resp::reply_deferred_result(ctx, interaction, e.to_string()).await?;
        return Ok(());
    }

    let conn = data.db_client.conn();
    let task_id = match model::get_max_task_id(conn).await {
        Ok(v) => v + 1,
        Err(e) => {
            command_resp::reply_deferred_result(ctx, interaction, "Error occurred upon attempt to allocate a task ID.").await?;
            return Err(e);
        }
    };

    let task = Task {
        id: task_id,
        description,
        instruction,
        weight: weight as i32,
    };

    match model::upsert_task(conn, &task).await {
        Ok(()) => {}
        Err(e) => {
            command_resp::reply_deferred_result(ctx, interaction, "Error occurred upon attempt to add task.").await?;
            return Err(e);
        }
    }

    command_resp::reply_deferred_result(ctx, interaction, format!("Added task **{}**: {}", task.id, task.description)).await?;

    Ok(())
}

async fn task_edit(
    ctx: &Context,
    interaction: &ApplicationCommandInteraction,
    opt: &ApplicationCommandInteractionDataOption,
    data: &BotData,
) -> anyhow::Result<()> {
    let task_id = command_opt::find_required(ctx, interaction, &opt.options, command_opt::find_integer_opt, "id").await?.unwrap();

    let conn = data.db_client.conn();
    let mut task = match model::get_task_by_id(conn, task_id as i32).await? {
        None => {
            command_resp::reply_deferred_result(ctx, interaction, format!("No task with ID **{}** exists.", task_id)).await?;
            return Ok(());
        }
        Some(v) => v,
    };

    if let Some(description) = command_opt::find_string_opt(&opt.options, "description") {
        let description = description.trim().to_owned();
        if let Err(e) = ParsedTemplate::new(&description) {
            command_resp::reply_deferred_result(ctx, interaction, e.to_string()).await?;
            return Ok(());
        }
        task.description = description;
    }
    if let Some(instruction) = command_opt::find_string_opt(&opt.options, "instruction") {
        task.instruction = instruction.trim().to_owned();
    }
    if let Some(weight) = command_opt::find_integer_opt(&opt.options, "weight") {
        if weight < 0 {
            command_resp::reply_deferred_result(ctx, interaction, format!("`weight` must not be negative; got {}.", weight)).await?;
            return Ok(());
        }
        task.weight = weight as i32;
    }

    match model::upsert_task(conn, &task).await {
        Ok(()) => {}
        Err(e) => {
            command_resp::reply_deferred_result(ctx, interaction, "Error occurred upon attempt to update task.").await?;
            return Err(e);
        }
    }

    command_resp::reply_deferred_result(ctx, interaction, format!("Updated task **{}**.", task.id)).await?;

    Ok(())
}

async fn task_reload(ctx: &Context, interaction: &ApplicationCommandInteraction, data: &BotData) -> anyhow::Result<()> {
    let contents = match std::fs::read_to_string(&data.config.tasks_file) {
        Ok(v) => v,
        Err(e) => {
            get_logger().error_with_err("Could not read tasks file.", &e, None);
            command_resp::reply_deferred_result(ctx, interaction, "Could not read the configured tasks file.").await?;
            return Ok(());
        }
    };

    let loaded = match taskfile::parse_tasks(&contents) {
        Ok(v) => v,
        Err(e) => {
            command_resp::reply_deferred_result(ctx, interaction, e.to_string()).await?;
            return Ok(());
        }
    };

    match model::replace_all_tasks(data.db_client.conn(), loaded.tasks()).await {
        Ok(()) => {}
        Err(e) => {
            command_resp::reply_deferred_result(ctx, interaction, "Error occurred upon attempt to replace the task catalog.").await?;
            return Err(e);
        }
    }

    get_logger().info("Task catalog reloaded.", meta! {
        "Count" => loaded.tasks().len(),
    });
    command_resp::reply_deferred_result(ctx, interaction, format!("Reloaded **{}** tasks.", loaded.tasks().len())).await?;

    Ok(())
}

async fn task_bonus(
    ctx: &Context,
    interaction: &ApplicationCommandInteraction,
    opt: &ApplicationCommandInteractionDataOption,
    data: &BotData,
) -> anyhow::Result<()> {
    let conn = data.db_client.conn();

    let task = match command_opt::find_integer_opt(&opt.options, "task-id") {
        Some(task_id) => match model::get_task_by_id(conn, task_id as i32).await? {
            None => {
                command_resp::reply_deferred_result(ctx, interaction, format!("No task with ID **{}** exists.", task_id)).await?;
                return Ok(());
            }
            Some(v) => v,
        },
        None => {
            let tasks = model::get_tasks(conn).await?;
            match catalog::pick_random_task(&tasks) {
                Ok(v) => v.clone(),
                Err(e) => {
                    command_resp::reply_deferred_result(ctx, interaction, e.to_string()).await?;
                    return Ok(());
                }
            }
        }
    };

    let duration = match command_opt::find_integer_opt(&opt.options, "hours") {
        None => data.config.bonus_duration,
        Some(hours) if hours > 0 => Duration::hours(hours),
        Some(hours) => {
            command_resp::reply_deferred_result(ctx, interaction, format!("`hours` must be positive; got {}.", hours)).await?;
            return Ok(());
        }
    };

    let evaluated = match ParsedTemplate::new(&task.description) {
        Ok(template) => template.evaluate(),
        Err(e) => {
            command_resp::reply_deferred_result(ctx, interaction, e.to_string()).await?;
            return Ok(());
        }
    };

    let started = instance::start_instance(
        ctx,
        conn,
        Some(task.id),
        TaskType::Bonus,
        &evaluated,
        Some(task.instruction.as_str()),
        duration,
        data.config.task_channel,
    )
    .await?;

    command_resp::reply_deferred_result(ctx, interaction, format!("Bonus task started: {}", started.evaluated_task)).await?;

    Ok(())
}

async fn task_end(
    ctx: &Context,
    interaction: &ApplicationCommandInteraction,
    opt: &ApplicationCommandInteractionDataOption,
    data: &BotData,
) -> anyhow::Result<()> {
    let task_type = match command_opt::find_bool_opt(&opt.options, "bonus") {
        Some(true) => TaskType::Bonus,
        _ => TaskType::Standard,
    };

    let conn = data.db_client.conn();
    let active = match model::get_active_instance(conn, task_type).await? {
        None => {
            command_resp::reply_deferred_result(ctx, interaction, format!("No {} task is currently active.", task_type.as_str())).await?;
            return Ok(());
        }
        Some(v) => v,
    };

    let ended_now = instance::end(ctx, conn, &active).await?;

    if ended_now {
        command_resp::reply_deferred_result(ctx, interaction, format!("Ended: {}", active.evaluated_task)).await?;
    } else {
        command_resp::reply_deferred_result(ctx, interaction, "That task instance had already ended.").await?;
    }

    Ok(())
}

pub async fn task(ctx: Context, interaction: ApplicationCommandInteraction) -> anyhow::Result<()> {
    command_resp::reply_deferred_ack(&ctx, &interaction).await?;

    let sub = &interaction.data.options[0];

    let data = ctx.data.read().await;
    let data = data.get::<BotData>().unwrap();

    match sub.name.as_str() {
        "show" => task_show(&ctx, &interaction, data).await?,
        "completions" => task_completions(&ctx, &interaction, data).await?,
        "add" => {
            if command_perm::require_admin(&ctx, &interaction).await? {
                task_add(&ctx, &interaction, sub, data).await?;
            }
        }
        "edit" => {
            if command_perm::require_admin(&ctx, &interaction).await? {
                task_edit(&ctx, &interaction, sub, data).await?;
            }
        }
        "reload" => {
            if command_perm::require_admin(&ctx, &interaction).await? {
                task_reload(&ctx, &interaction, data).await?;
            }
        }
        "bonus" => {
            if command_perm::require_admin(&ctx, &interaction).await? {
                task_bonus(&ctx, &interaction, sub, data).await?;
            }
        }
        "end" => {
            if command_perm::require_admin(&ctx, &interaction).await? {
                task_end(&ctx, &interaction, sub, data).await?;
            }
        }
        _ => {}
    }

    Ok(())
}
