use std::env;

use evlog::{meta, LogEventConsolePrinter, Logger};
use serenity::Client;

use crate::config::BotConfig;
use crate::db::dbclient::DBClient;
use crate::handler::{BotData, BotHandler};
use crate::runtime::{get_logger, set_logger};

mod catalog;
mod commands;
mod config;
mod db;
mod handler;
mod helpers;
mod rotation;
mod runtime;
mod support;
mod template;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let appl: u64 = env::var("TASKCYCLE_APPL").expect("expected TASKCYCLE_APPL").parse().expect("application ID is invalid");
    let token = env::var("TASKCYCLE_TOKEN").expect("expected TASKCYCLE_TOKEN");
    let db_url = env::var("TASKCYCLE_DATABASE_URL").expect("expected TASKCYCLE_DATABASE_URL");
    let config = BotConfig::from_env();

    let mut logger = Logger::default();
    logger.register(LogEventConsolePrinter::default());
    set_logger(logger);

    let db_client = DBClient::new(&db_url).await
        .expect("failed to connect to database");
    db_client.initialize().await
        .expect("failed to initialize database schema");

    seed_catalog(&db_client, &config).await;

    let data = BotData::new(db_client, config).await;

    let mut client = Client::builder(&token)
        .event_handler(BotHandler::default())
        .application_id(appl)
        .await
        .unwrap_or_else(|e| {
            get_logger().error_with_err("Client initialization error.", &e, None);
            panic!("{}", e)
        });
    client.data.write().await.insert::<BotData>(data);

    if let Err(e) = client.start().await {
        get_logger().error_with_err("Client error.", e, None);
    }
}

/// First-boot convenience: an empty catalog is filled from the configured
/// task file. Reloads after that are explicit (`/task reload`).
async fn seed_catalog(db_client: &DBClient, config: &BotConfig) {
    let existing = db::model::get_tasks(db_client.conn()).await
        .expect("failed to query task catalog");
    if !existing.is_empty() {
        return;
    }

    let contents = match std::fs::read_to_string(&config.tasks_file) {
        Ok(v) => v,
        Err(e) => {
            get_logger().error_with_err("Could not read tasks file; starting with an empty catalog.", &e, None);
            return;
        }
    };

    match support::taskfile::parse_tasks(&contents) {
        Ok(loaded) => {
            db::model::replace_all_tasks(db_client.conn(), loaded.tasks()).await
                .expect("failed to seed task catalog");
            get_logger().info("Seeded task catalog from file.", meta! {
                "File" => config.tasks_file,
                "Count" => loaded.tasks().len(),
            });
        }
        Err(e) => {
            get_logger().error_with_err("Tasks file is invalid; starting with an empty catalog.", &*e, None);
        }
    }
}
