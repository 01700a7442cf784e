pub mod account;
pub mod ban;
pub mod check_window;
pub mod config;
pub mod doctor;
pub mod document;
pub mod migrate;
pub mod project;

use std::future::Future;
use std::sync::Arc;

use rollout_core::chrono::NaiveDateTime;
use rollout_core::config::{AppConfig, LoadOptions};
use rollout_core::{
    ApplicationError, ApprovalWorkflow, BanType, DocumentType, InterfaceError, LineType,
    NewApprovalLine,
};
use rollout_db::{
    connect_with_settings, DbPool, SqlAccountDirectory, SqlBanStore, SqlDocumentStore,
    SqlProjectDirectory,
};
use serde::Serialize;
use serde_json::Value;

pub type SqlWorkflow =
    ApprovalWorkflow<SqlDocumentStore, SqlBanStore, SqlProjectDirectory, SqlAccountDirectory>;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

/// Failure raised inside a command body, before it is rendered.
#[derive(Debug)]
pub struct CommandFailure {
    pub error_class: String,
    pub message: String,
    pub exit_code: u8,
}

impl CommandFailure {
    pub fn new(error_class: impl Into<String>, message: impl Into<String>, exit_code: u8) -> Self {
        Self { error_class: error_class.into(), message: message.into(), exit_code }
    }

    pub fn from_application(error: ApplicationError, correlation_id: &str) -> Self {
        let interface = error.into_interface(correlation_id);
        let exit_code = match interface {
            InterfaceError::BadRequest { .. } => 6,
            InterfaceError::Conflict { .. } => 7,
            InterfaceError::ServiceUnavailable { .. } | InterfaceError::Internal { .. } => 8,
        };
        let message = match &interface {
            InterfaceError::BadRequest { message, .. }
            | InterfaceError::Conflict { message, .. }
            | InterfaceError::ServiceUnavailable { message, .. }
            | InterfaceError::Internal { message, .. } => message.clone(),
        };
        Self::new(interface.error_class(), message, exit_code)
    }
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::render(command, "ok", None, message.into(), None, 0)
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: &impl Serialize,
    ) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self::render(command, "ok", None, message.into(), Some(data), 0),
            Err(error) => Self::failure(command, "serialization", error.to_string(), 9),
        }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let error_class = Some(error_class.to_string());
        Self::render(command, "error", error_class, message.into(), None, exit_code)
    }

    fn render(
        command: &str,
        status: &str,
        error_class: Option<String>,
        message: String,
        data: Option<Value>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: status.to_string(),
            error_class,
            message,
            data,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

impl From<(&str, CommandFailure)> for CommandResult {
    fn from((command, failure): (&str, CommandFailure)) -> Self {
        Self::failure(command, &failure.error_class, failure.message, failure.exit_code)
    }
}

/// Loads config, opens the pool and drives `task` on a current-thread runtime.
pub fn run_with_pool<F, Fut>(command: &str, task: F) -> CommandResult
where
    F: FnOnce(AppConfig, DbPool) -> Fut,
    Fut: Future<Output = Result<CommandResult, CommandFailure>>,
{
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                command,
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async move {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| CommandFailure::new("db_connectivity", error.to_string(), 4))?;
        let outcome = task(config, pool.clone()).await;
        pool.close().await;
        outcome
    });

    result.unwrap_or_else(|failure| CommandResult::from((command, failure)))
}

pub fn workflow(config: &AppConfig, pool: &DbPool) -> SqlWorkflow {
    ApprovalWorkflow::new(
        Arc::new(SqlDocumentStore::new(pool.clone())),
        Arc::new(SqlBanStore::new(pool.clone())),
        Arc::new(SqlProjectDirectory::new(pool.clone())),
        Arc::new(SqlAccountDirectory::new(pool.clone())),
    )
    .with_settings(config.workflow)
}

pub fn correlation_id(command: &str) -> String {
    format!("cli-{command}-{}", uuid::Uuid::new_v4())
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Accepts `2024-06-01T22:00`, `2024-06-01 22:00` and the same with seconds.
pub fn parse_local_datetime(value: &str) -> Result<NaiveDateTime, String> {
    const FORMATS: [&str; 4] =
        ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S"];

    let trimmed = value.trim();
    FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| format!("`{value}` is not a local datetime (expected YYYY-MM-DDTHH:MM)"))
}

pub fn parse_ban_type(value: &str) -> Result<BanType, String> {
    BanType::parse(value).ok_or_else(|| {
        format!(
            "unsupported ban type `{value}` \
             (expected regular_maintenance|emergency_maintenance|holiday|freeze|other)"
        )
    })
}

pub fn parse_document_type(value: &str) -> Result<DocumentType, String> {
    DocumentType::parse(value).ok_or_else(|| {
        format!(
            "unsupported document type `{value}` \
             (expected plan|deployment|report|retry|rollback|draft)"
        )
    })
}

/// Parses `<line type>:<account>`, e.g. `approve:bob`.
pub fn parse_approval_line(value: &str) -> Result<NewApprovalLine, String> {
    let (line_type, account) = value
        .split_once(':')
        .ok_or_else(|| format!("`{value}` is not a line (expected TYPE:ACCOUNT)"))?;
    let line_type = LineType::parse(line_type).ok_or_else(|| {
        format!("unsupported line type `{line_type}` (expected draft|approve|consent|cc)")
    })?;
    let account = account.trim();
    if account.is_empty() {
        return Err(format!("`{value}` names no account"));
    }
    Ok(NewApprovalLine::new(line_type, account))
}
