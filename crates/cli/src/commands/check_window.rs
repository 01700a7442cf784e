use std::collections::BTreeSet;

use rollout_core::chrono::NaiveDateTime;
use rollout_core::presentation::conflict_label;
use rollout_core::{ApplicationError, DocumentId, ProjectId, ScheduleWindow, WindowCheck};
use serde::Serialize;

use crate::commands::{correlation_id, run_with_pool, workflow, CommandFailure, CommandResult};

#[derive(Debug, Serialize)]
struct WindowReport {
    result: &'static str,
    project_ids: BTreeSet<ProjectId>,
    window: ScheduleWindow,
}

pub fn run(
    project_ids: Vec<i64>,
    start: NaiveDateTime,
    end: NaiveDateTime,
    exclude: Option<String>,
) -> CommandResult {
    run_with_pool("check-window", |config, pool| async move {
        let correlation_id = correlation_id("check-window");
        let window = ScheduleWindow::new(start, end).map_err(|error| {
            CommandFailure::from_application(ApplicationError::from(error), &correlation_id)
        })?;
        let project_ids: BTreeSet<ProjectId> = project_ids.into_iter().map(ProjectId).collect();
        let exclude = exclude.map(DocumentId);

        let check = workflow(&config, &pool)
            .check_window(&project_ids, &window, exclude.as_ref())
            .await
            .map_err(|error| CommandFailure::from_application(error, &correlation_id))?;

        match check {
            WindowCheck::Accept => Ok(CommandResult::success_with_data(
                "check-window",
                "window is free",
                &WindowReport { result: "ACCEPT", project_ids, window },
            )),
            WindowCheck::Conflict(conflict) => Err(CommandFailure::new(
                "SCHEDULE_CONFLICT",
                format!("{}: {conflict}", conflict_label(conflict.reason())),
                7,
            )),
        }
    })
}
