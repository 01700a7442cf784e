use rollout_core::chrono::NaiveDateTime;
use rollout_core::{BanId, BanType, CommandContext, NewBanPeriod, ProjectId};

use crate::commands::{correlation_id, run_with_pool, workflow, CommandFailure, CommandResult};

#[derive(Clone, Debug)]
pub struct AddBan {
    pub title: String,
    pub ban_type: BanType,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub project_ids: Vec<i64>,
    pub actor: String,
}

pub fn add(request: AddBan) -> CommandResult {
    run_with_pool("ban.add", |config, pool| async move {
        let workflow = workflow(&config, &pool);
        let ctx = CommandContext::new(request.actor, correlation_id("ban.add"));

        let ban = workflow
            .create_ban(&ctx, NewBanPeriod {
                title: request.title,
                ban_type: request.ban_type,
                start_date: request.start.date(),
                start_time: request.start.time(),
                end_date: request.end.date(),
                end_time: request.end.time(),
                related_project_ids: request.project_ids.into_iter().map(ProjectId).collect(),
            })
            .await
            .map_err(|error| CommandFailure::from_application(error, &ctx.correlation_id))?;

        Ok(CommandResult::success_with_data("ban.add", format!("created ban {}", ban.id.0), &ban))
    })
}

pub fn list(include_deleted: bool) -> CommandResult {
    run_with_pool("ban.list", |config, pool| async move {
        let workflow = workflow(&config, &pool);
        let bans = workflow
            .ban_registry()
            .list(include_deleted)
            .await
            .map_err(|error| CommandFailure::from_application(error, "cli-ban.list"))?;

        Ok(CommandResult::success_with_data("ban.list", format!("{} ban(s)", bans.len()), &bans))
    })
}

pub fn remove(ban_id: &str, actor: &str) -> CommandResult {
    let ban_id = BanId(ban_id.trim().to_owned());
    let actor = actor.to_owned();

    run_with_pool("ban.remove", |config, pool| async move {
        let workflow = workflow(&config, &pool);
        let ctx = CommandContext::new(actor, correlation_id("ban.remove"));

        let ban = workflow
            .delete_ban(&ctx, &ban_id)
            .await
            .map_err(|error| CommandFailure::from_application(error, &ctx.correlation_id))?;

        Ok(CommandResult::success_with_data(
            "ban.remove",
            format!("ban {} is deleted", ban.id.0),
            &ban,
        ))
    })
}
