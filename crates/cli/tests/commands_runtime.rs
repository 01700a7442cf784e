use std::env;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use rollout_cli::commands::{
    account, ban, check_window, config, doctor, document, migrate, parse_approval_line, project,
};
use rollout_core::chrono::NaiveDateTime;
use rollout_core::{BanType, DocumentType};
use serde_json::Value;
use tempfile::TempDir;

#[test]
fn migrate_returns_success_with_file_database() {
    let dir = TempDir::new().expect("tempdir");
    let url = database_url(dir.path());
    with_env(&[("ROLLOUT_DATABASE_URL", url.as_str())], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_invalid_override() {
    with_env(&[("ROLLOUT_DATABASE_MAX_CONNECTIONS", "many")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn ban_lifecycle_drives_window_checks() {
    let dir = TempDir::new().expect("tempdir");
    let url = database_url(dir.path());
    with_env(&[("ROLLOUT_DATABASE_URL", url.as_str())], || {
        assert_eq!(migrate::run().exit_code, 0);
        assert_eq!(project::add(7, "payments-api").exit_code, 0);

        let created = ban::add(ban::AddBan {
            title: "Core switch replacement".to_owned(),
            ban_type: BanType::RegularMaintenance,
            start: at("2024-06-01 22:00"),
            end: at("2024-06-02 02:00"),
            project_ids: vec![7],
            actor: "scheduler".to_owned(),
        });
        assert_eq!(created.exit_code, 0, "ban add failed: {}", created.output);
        let payload = parse_payload(&created.output);
        let ban_id = payload["data"]["id"].as_str().expect("ban id").to_owned();
        assert!(ban_id.starts_with("BAN-"));

        let listed = parse_payload(&ban::list(false).output);
        assert_eq!(listed["data"].as_array().map(Vec::len), Some(1));

        let blocked =
            check_window::run(vec![7], at("2024-06-01 23:00"), at("2024-06-02 00:30"), None);
        assert_eq!(blocked.exit_code, 7);
        let payload = parse_payload(&blocked.output);
        assert_eq!(payload["error_class"], "SCHEDULE_CONFLICT");
        assert!(payload["message"].as_str().unwrap_or_default().contains(&ban_id));

        let touching =
            check_window::run(vec![7], at("2024-06-02 02:00"), at("2024-06-02 03:00"), None);
        assert_eq!(touching.exit_code, 0, "touching window should be free: {}", touching.output);

        assert_eq!(ban::remove(&ban_id, "scheduler").exit_code, 0);
        let freed =
            check_window::run(vec![7], at("2024-06-01 23:00"), at("2024-06-02 00:30"), None);
        assert_eq!(freed.exit_code, 0);
        assert_eq!(parse_payload(&freed.output)["data"]["result"], "ACCEPT");

        let with_deleted = parse_payload(&ban::list(true).output);
        assert_eq!(with_deleted["data"][0]["deleted"], true);
    });
}

#[test]
fn document_commands_drive_approval_and_refuse_settled_repeats() {
    let dir = TempDir::new().expect("tempdir");
    let url = database_url(dir.path());
    with_env(&[("ROLLOUT_DATABASE_URL", url.as_str())], || {
        assert_eq!(migrate::run().exit_code, 0);
        assert_eq!(project::add(7, "payments-api").exit_code, 0);
        for id in ["alice", "bob", "erin"] {
            assert_eq!(account::add(id, None).exit_code, 0);
        }

        let created = document::create(document::CreateDocument {
            document_type: DocumentType::Deployment,
            title: "Settlement batcher".to_owned(),
            content: "Rolls out the new batcher.".to_owned(),
            deployment_id: None,
            project_ids: vec![7],
            start: Some(at("2024-06-03 10:00")),
            end: Some(at("2024-06-03 11:00")),
            lines: vec![
                parse_approval_line("approve:bob").expect("approve line"),
                parse_approval_line("consent:erin").expect("consent line"),
            ],
            actor: "alice".to_owned(),
        });
        assert_eq!(created.exit_code, 0, "create failed: {}", created.output);
        let payload = parse_payload(&created.output);
        let document_id = payload["data"]["id"].as_str().expect("document id").to_owned();
        let consent_line =
            payload["data"]["lines"][1]["id"].as_str().expect("line id").to_owned();

        let submitted = parse_payload(&document::submit(&document_id, 1, "alice").output);
        assert_eq!(submitted["data"]["document"]["status"], "pending");

        let reject = |version: u32| {
            document::decide(document::Decide {
                document_id: document_id.clone(),
                version,
                line_id: consent_line.clone(),
                approve: false,
                comment: None,
                actor: "erin".to_owned(),
            })
        };
        let rejected = reject(2);
        assert_eq!(rejected.exit_code, 0, "reject failed: {}", rejected.output);
        assert_eq!(parse_payload(&rejected.output)["data"]["document"]["status"], "rejected");

        let repeated = reject(3);
        assert_eq!(repeated.exit_code, 7);
        assert_eq!(parse_payload(&repeated.output)["error_class"], "INVALID_TRANSITION");

        let shown = parse_payload(&document::show(&document_id).output);
        assert_eq!(shown["data"]["document"]["version"], 3);
        assert_eq!(shown["data"]["preview"]["derived"], "rejected");
    });
}

#[test]
fn ban_add_rejects_unknown_project() {
    let dir = TempDir::new().expect("tempdir");
    let url = database_url(dir.path());
    with_env(&[("ROLLOUT_DATABASE_URL", url.as_str())], || {
        assert_eq!(migrate::run().exit_code, 0);

        let result = ban::add(ban::AddBan {
            title: "Holiday freeze".to_owned(),
            ban_type: BanType::Freeze,
            start: at("2024-12-24 00:00"),
            end: at("2024-12-27 00:00"),
            project_ids: vec![42],
            actor: "scheduler".to_owned(),
        });
        assert_eq!(result.exit_code, 6);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "VALIDATION");
    });
}

#[test]
fn doctor_reports_pending_migrations_until_migrate_runs() {
    let dir = TempDir::new().expect("tempdir");
    let url = database_url(dir.path());
    with_env(&[("ROLLOUT_DATABASE_URL", url.as_str())], || {
        let before: Value = serde_json::from_str(&doctor::run(true)).expect("doctor json");
        assert_eq!(before["overall_status"], "fail");

        assert_eq!(migrate::run().exit_code, 0);

        let after: Value = serde_json::from_str(&doctor::run(true)).expect("doctor json");
        assert_eq!(after["overall_status"], "pass");
        assert_eq!(after["checks"].as_array().map(Vec::len), Some(3));
    });
}

#[test]
fn config_reports_env_sources() {
    with_env(&[("ROLLOUT_LOG_LEVEL", "debug")], || {
        let output = config::run();
        assert!(output.contains("- logging.level = debug (source: env (ROLLOUT_LOG_LEVEL))"));
        assert!(output.contains("- workflow.lock_projects_on_submit = true (source: default)"));
    });
}

fn at(value: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M").expect("valid timestamp")
}

fn database_url(dir: &Path) -> String {
    format!("sqlite://{}?mode=rwc", dir.join("rollout.db").display())
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "ROLLOUT_DATABASE_URL",
        "ROLLOUT_DATABASE_MAX_CONNECTIONS",
        "ROLLOUT_DATABASE_TIMEOUT_SECS",
        "ROLLOUT_LOGGING_LEVEL",
        "ROLLOUT_LOGGING_FORMAT",
        "ROLLOUT_LOG_LEVEL",
        "ROLLOUT_LOG_FORMAT",
        "ROLLOUT_WORKFLOW_CHECK_SCHEDULE_ON_CREATE",
        "ROLLOUT_WORKFLOW_LOCK_PROJECTS_ON_SUBMIT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
