use evlog::meta;
use serenity::client::Context;
use serenity::model::interactions::application_command::ApplicationCommandInteraction;
use serenity::model::Permissions;

use crate::helpers::command_resp;
use crate::runtime::get_logger;

/// Admin gate for management subcommands. Replies to the requester and
/// reports `false` when the invoker may not proceed.
pub async fn require_admin(ctx: &Context, interaction: &ApplicationCommandInteraction) -> anyhow::Result<bool> {
    let member = match interaction.member.as_ref() {
        None => {
            command_resp::reply_deferred_result(ctx, interaction, "This command may only be used in a server.").await?;
            return Ok(false);
        }
        Some(v) => v,
    };

    let permissions = match member.permissions {
        None => {
            get_logger().info("Could not read interaction invoker's permissions.", meta! {
                "InteractionID" => interaction.id,
            });
            command_resp::reply_deferred_result(ctx, interaction, "Could not read interaction invoker's permissions.").await?;
            return Ok(false);
        }
        Some(v) => v,
    };

    if !permissions.contains(Permissions::ADMINISTRATOR) {
        get_logger().info("Non-administrator attempted to use a management subcommand.", meta! {
            "InteractionID" => interaction.id,
            "UserID" => member.user.id,
        });
        command_resp::reply_deferred_result(
            ctx,
            interaction,
            "Only members with the 'Administrator' permission may use this subcommand.",
        )
        .await?;
        return Ok(false);
    }

    Ok(true)
}
