use rollout_core::AccountId;
use rollout_db::SqlAccountDirectory;
use tracing::info;

use crate::commands::{run_with_pool, CommandFailure, CommandResult};

pub fn add(id: &str, display_name: Option<&str>) -> CommandResult {
    let id = id.trim().to_owned();
    if id.is_empty() {
        return CommandResult::failure("account.add", "VALIDATION", "account id is blank", 6);
    }
    let display_name = display_name.map(str::trim).unwrap_or(&id).to_owned();

    run_with_pool("account.add", |_config, pool| async move {
        let record = SqlAccountDirectory::new(pool)
            .register(&AccountId(id), &display_name)
            .await
            .map_err(|error| CommandFailure::new("persistence", error.to_string(), 8))?;

        info!(
            event_name = "directory.account.registered",
            correlation_id = "cli",
            account_id = %record.id,
            "account registered"
        );
        Ok(CommandResult::success_with_data(
            "account.add",
            format!("registered account {}", record.id),
            &record,
        ))
    })
}

pub fn list() -> CommandResult {
    run_with_pool("account.list", |_config, pool| async move {
        let accounts = SqlAccountDirectory::new(pool)
            .list()
            .await
            .map_err(|error| CommandFailure::new("persistence", error.to_string(), 8))?;
        Ok(CommandResult::success_with_data(
            "account.list",
            format!("{} account(s)", accounts.len()),
            &accounts,
        ))
    })
}
