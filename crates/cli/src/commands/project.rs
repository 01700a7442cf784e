use rollout_core::ProjectId;
use rollout_db::SqlProjectDirectory;
use tracing::info;

use crate::commands::{run_with_pool, CommandFailure, CommandResult};

/// Mirrors a project from the project service so bans and documents can reference it.
pub fn add(id: i64, name: &str) -> CommandResult {
    let name = name.trim().to_owned();
    if name.is_empty() {
        return CommandResult::failure("project.add", "VALIDATION", "project name is blank", 6);
    }

    run_with_pool("project.add", |_config, pool| async move {
        let record = SqlProjectDirectory::new(pool)
            .register(ProjectId(id), &name)
            .await
            .map_err(|error| CommandFailure::new("persistence", error.to_string(), 8))?;

        info!(
            event_name = "directory.project.registered",
            correlation_id = "cli",
            project_id = record.id.0,
            "project registered"
        );
        Ok(CommandResult::success_with_data(
            "project.add",
            format!("registered project {}", record.id),
            &record,
        ))
    })
}

pub fn list() -> CommandResult {
    run_with_pool("project.list", |_config, pool| async move {
        let projects = SqlProjectDirectory::new(pool)
            .list()
            .await
            .map_err(|error| CommandFailure::new("persistence", error.to_string(), 8))?;
        Ok(CommandResult::success_with_data(
            "project.list",
            format!("{} project(s)", projects.len()),
            &projects,
        ))
    })
}
