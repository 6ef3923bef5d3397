use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use evlog::meta;
use serenity::async_trait;
use serenity::client::{Context, EventHandler};
use serenity::model::channel::{Reaction, ReactionType};
use serenity::model::guild::Guild;
use serenity::model::id::{GuildId, RoleId, UserId};
use serenity::model::interactions::{Interaction, InteractionResponseType, InteractionType};
use serenity::prelude::TypeMapKey;

use crate::commands;
use crate::config::BotConfig;
use crate::db::dbclient::DBClient;
use crate::db::schema::TaskType;
use crate::rotation::{completion, watchers};
use crate::runtime::get_logger;
use crate::support::ballot;

pub struct BotData {
    pub db_client: Arc<DBClient>,
    pub config: Arc<BotConfig>,
}

impl BotData {
    pub async fn new(db_client: DBClient, config: BotConfig) -> Self {
        Self {
            db_client: Arc::new(db_client),
            config: Arc::new(config),
        }
    }
}

impl TypeMapKey for BotData {
    type Value = BotData;
}

#[derive(Default)]
pub struct BotHandler {
    watchers_started: AtomicBool,
}

impl BotHandler {
    /// Whether a reaction came from a member holding the approver role.
    async fn is_approver(&self, ctx: &Context, guild_id: GuildId, user_id: UserId, role: u64) -> bool {
        let member = match guild_id.member(ctx, user_id).await {
            Ok(v) => v,
            Err(e) => {
                get_logger().debug("Could not resolve reacting member.", meta! {
                    "GuildID" => guild_id,
                    "UserID" => user_id,
                    "Error" => e,
                });
                return false;
            }
        };

        member.roles.contains(&RoleId(role))
    }

    async fn handle_approval_added(&self, ctx: &Context, reaction: &Reaction, task_type: TaskType) {
        let data = ctx.data.read().await;
        let data = data.get::<BotData>().unwrap();

        let user_id = match reaction.user_id {
            None => return,
            Some(v) => v,
        };
        let guild_id = match reaction.guild_id {
            None => return,
            Some(v) => v,
        };

        if !self.is_approver(ctx, guild_id, user_id, data.config.approver_role).await {
            return;
        }

        let message = match ctx.http.get_message(reaction.channel_id.0, reaction.message_id.0).await {
            Ok(v) => v,
            Err(e) => {
                get_logger().debug("Evidence message is already gone; ignoring approval.", meta! {
                    "MessageID" => reaction.message_id,
                    "Error" => e,
                });
                return;
            }
        };

        // Announcements and other bot posts are not evidence.
        if message.author.bot {
            return;
        }

        if let Err(e) = completion::approve_evidence(data.db_client.conn(), &message, task_type, user_id).await {
            get_logger().error_with_err("Failed to record approved completion.", &*e, None);
        }
    }

    async fn handle_approval_removed(&self, ctx: &Context, reaction: &Reaction) {
        let data = ctx.data.read().await;
        let data = data.get::<BotData>().unwrap();

        let user_id = match reaction.user_id {
            None => return,
            Some(v) => v,
        };
        let guild_id = match reaction.guild_id {
            None => return,
            Some(v) => v,
        };

        if !self.is_approver(ctx, guild_id, user_id, data.config.approver_role).await {
            return;
        }

        if let Err(e) = completion::retract_evidence(data.db_client.conn(), &reaction.message_id.to_string()).await {
            get_logger().error_with_err("Failed to retract completions.", &*e, None);
        }
    }
}

#[async_trait]
impl EventHandler for BotHandler {
    async fn cache_ready(&self, ctx: Context, _guilds: Vec<GuildId>) {
        if self.watchers_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let (db_client, config) = {
            let data = ctx.data.read().await;
            let data = data.get::<BotData>().unwrap();
            (data.db_client.clone(), data.config.clone())
        };

        watchers::spawn_watchers(ctx, db_client, config);
    }

    async fn guild_create(&self, ctx: Context, guild: Guild, _is_new: bool) {
        get_logger().info("Guild ready.", meta![
            "ID" => guild.id,
            "Name" => guild.name,
        ]);

        let existing_cmds = guild.get_application_commands(&ctx).await.unwrap();

        let existing_map = existing_cmds.iter()
            .map(|v| (v.name.clone(), v))
            .collect::<HashMap<_, _>>();

        for cmd in commands::COMMANDS {
            let whitelisted = match cmd.whitelisted_servers {
                None => true,
                Some(servers) => servers.iter().any(|v| v.as_u64() == guild.id.as_u64()),
            };

            if !whitelisted {
                get_logger().debug("Command is not allowed in this server.", meta! {
                    "GuildID" => guild.id,
                    "GuildName" => guild.name,
                    "Command" => cmd.name
                });
                continue;
            }

            if existing_map.contains_key(cmd.name) {
                if !cmd.re_register {
                    get_logger().debug("Command already registered in this server.", meta! {
                        "GuildID" => guild.id,
                        "GuildName" => guild.name,
                        "Command" => cmd.name
                    });
                    continue;
                }
            }

            let created = guild.create_application_command(&ctx.http, |c| {
                (cmd.builder)(c)
            }).await.unwrap();

            get_logger().debug("Registered command in server.", meta! {
                "GuildID" => guild.id,
                "GuildName" => guild.name,
                "Command" => cmd.name,
                "ID" => created.id
            });
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::ApplicationCommand(interaction) = interaction {
            let guild = ctx.cache.guild(interaction.guild_id.unwrap()).await.unwrap();

            if interaction.kind == InteractionType::Ping {
                get_logger().info("Interaction ping.", meta! {
                    "GuildID" => guild.id,
                    "GuildName" => guild.name,
                    "InteractionID" => interaction.id
                });

                interaction.create_interaction_response(ctx.http.as_ref(), |r| {
                    r.kind(InteractionResponseType::Pong)
                }).await.unwrap();
            } else if interaction.kind == InteractionType::ApplicationCommand {
                get_logger().info("Interaction received.", meta! {
                    "GuildID" => guild.id,
                    "GuildName" => guild.name,
                    "InteractionID" => interaction.id,
                    "CommandID" => interaction.data.id,
                    "CommandName" => interaction.data.name
                });

                let handler = match commands::get_handler(&interaction.data.name) {
                    None => return,
                    Some(v) => v,
                };

                let interaction_id = interaction.id;
                let command_id = interaction.data.id.clone();
                let command_name = interaction.data.name.clone();

                let r: anyhow::Result<()> = handler(ctx, interaction).await;
                match r {
                    Ok(()) => {}
                    Err(e) => {
                        get_logger().error("Error occurred in interaction processor.", meta! {
                            "GuildID" => guild.id,
                            "GuildName" => guild.name,
                            "InteractionID" => interaction_id,
                            "CommandID" => command_id,
                            "CommandName" => command_name,
                            "Error" => e,
                        });
                    }
                }
            }
        }
    }

    async fn reaction_add(&self, ctx: Context, reaction: Reaction) {
        let reactor = match reaction.user_id {
            None => return,
            Some(v) => v,
        };
        if reactor == ctx.cache.current_user().await.id {
            return;
        }

        let symbol = match &reaction.emoji {
            ReactionType::Unicode(s) => s.clone(),
            _ => return,
        };

        let task_channel = {
            let data = ctx.data.read().await;
            let data = data.get::<BotData>().unwrap();
            data.config.task_channel
        };

        // Ballot reactions on the vote announcement are read in bulk at
        // tally time; only approvals in the task channel matter here.
        if reaction.channel_id.0 != task_channel {
            return;
        }

        let task_type = match ballot::approval_task_type(&symbol) {
            None => return,
            Some(v) => v,
        };

        self.handle_approval_added(&ctx, &reaction, task_type).await;
    }

    async fn reaction_remove(&self, ctx: Context, reaction: Reaction) {
        let reactor = match reaction.user_id {
            None => return,
            Some(v) => v,
        };
        if reactor == ctx.cache.current_user().await.id {
            return;
        }

        let symbol = match &reaction.emoji {
            ReactionType::Unicode(s) => s.clone(),
            _ => return,
        };

        let task_channel = {
            let data = ctx.data.read().await;
            let data = data.get::<BotData>().unwrap();
            data.config.task_channel
        };

        if reaction.channel_id.0 != task_channel {
            return;
        }

        if ballot::approval_task_type(&symbol).is_none() {
            return;
        }

        self.handle_approval_removed(&ctx, &reaction).await;
    }
}
