use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub struct DBClient {
    pool: PgPool,
}

impl DBClient {
    pub async fn new(url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    pub fn conn(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the schema on startup. Safe to run on every boot.
    pub async fn initialize(&self) -> anyhow::Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY,
                description VARCHAR(255) NOT NULL,
                instruction VARCHAR(255) NOT NULL,
                weight INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS task_instances (
                id SERIAL PRIMARY KEY,
                task_id INTEGER REFERENCES tasks(id) ON DELETE SET NULL,
                task_type VARCHAR(16) NOT NULL,
                evaluated_task VARCHAR(255) NOT NULL,
                start_time TIMESTAMPTZ NOT NULL,
                end_time TIMESTAMPTZ NOT NULL,
                channel_id VARCHAR(128),
                message_id VARCHAR(128),
                drawn_prize BOOLEAN NOT NULL DEFAULT FALSE
            );",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS task_votes (
                id SERIAL PRIMARY KEY,
                start_time TIMESTAMPTZ NOT NULL,
                end_time TIMESTAMPTZ NOT NULL,
                completed BOOLEAN NOT NULL DEFAULT FALSE,
                voting_channel_id VARCHAR(128),
                voting_message_id VARCHAR(128),
                selected_option_id INTEGER
            );",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS task_vote_options (
                id SERIAL PRIMARY KEY,
                vote_id INTEGER NOT NULL REFERENCES task_votes(id) ON DELETE CASCADE,
                option_index INTEGER NOT NULL,
                task_id INTEGER REFERENCES tasks(id) ON DELETE SET NULL,
                evaluated_task VARCHAR(255) NOT NULL,
                UNIQUE (vote_id, option_index)
            );",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS task_completions (
                id SERIAL PRIMARY KEY,
                instance_id INTEGER NOT NULL REFERENCES task_instances(id),
                user_id VARCHAR(128) NOT NULL,
                approver_id VARCHAR(128) NOT NULL,
                completion_time TIMESTAMPTZ NOT NULL,
                evidence_channel_id VARCHAR(128) NOT NULL,
                evidence_message_id VARCHAR(128) NOT NULL,
                UNIQUE (instance_id, user_id)
            );",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
