use rollout_db::migrations;
use tracing::info;

use crate::commands::{run_with_pool, CommandFailure, CommandResult};

pub fn run() -> CommandResult {
    run_with_pool("migrate", |config, pool| async move {
        migrations::run_pending(&pool)
            .await
            .map_err(|error| CommandFailure::new("migration", error.to_string(), 5))?;

        info!(
            event_name = "system.migrate.applied",
            correlation_id = "cli",
            database_url = %config.database.url,
            "applied pending migrations"
        );
        Ok(CommandResult::success("migrate", "applied pending migrations"))
    })
}
