use serenity::client::Context;
use serenity::model::interactions::application_command::{
    ApplicationCommandInteraction, ApplicationCommandInteractionDataOption,
    ApplicationCommandInteractionDataOptionValue,
};

use crate::helpers::command_resp;

pub fn find_string_opt(options: &[ApplicationCommandInteractionDataOption], name: &str) -> Option<String> {
    options.iter().find(|o| o.name == name).and_then(|o| match o.resolved.as_ref() {
        Some(ApplicationCommandInteractionDataOptionValue::String(v)) => Some(v.clone()),
        _ => None,
    })
}

pub fn find_integer_opt(options: &[ApplicationCommandInteractionDataOption], name: &str) -> Option<i64> {
    options.iter().find(|o| o.name == name).and_then(|o| match o.resolved.as_ref() {
        Some(ApplicationCommandInteractionDataOptionValue::Integer(v)) => Some(*v),
        _ => None,
    })
}

pub fn find_bool_opt(options: &[ApplicationCommandInteractionDataOption], name: &str) -> Option<bool> {
    options.iter().find(|o| o.name == name).and_then(|o| match o.resolved.as_ref() {
        Some(ApplicationCommandInteractionDataOptionValue::Boolean(v)) => Some(*v),
        _ => None,
    })
}

/// Looks up a required option; reports to the requester and fails when it is
/// absent, so callers can safely unwrap the `Some`.
pub async fn find_required<T>(
    ctx: &Context,
    interaction: &ApplicationCommandInteraction,
    options: &[ApplicationCommandInteractionDataOption],
    finder: fn(&[ApplicationCommandInteractionDataOption], &str) -> Option<T>,
    name: &str,
) -> anyhow::Result<Option<T>> {
    match finder(options, name) {
        Some(v) => Ok(Some(v)),
        None => {
            command_resp::reply_deferred_result(
                ctx,
                interaction,
                format!("Required option '{}' was not provided.", name),
            )
            .await?;
            Err(anyhow::Error::msg(format!("required option '{}' missing", name)))
        }
    }
}
