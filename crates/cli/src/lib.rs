pub mod commands;

use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use rollout_core::chrono::NaiveDateTime;
use rollout_core::config::{AppConfig, LoadOptions, LogFormat};
use rollout_core::{BanType, DocumentType, NewApprovalLine};
use tracing_subscriber::EnvFilter;

use commands::{parse_approval_line, parse_ban_type, parse_document_type, parse_local_datetime};

#[derive(Debug, Parser)]
#[command(
    name = "rollout",
    about = "Rollout operator CLI",
    long_about = "Operate the release approval store: migrations, config inspection, readiness \
                  checks, approval documents, ban periods and schedule window checks.",
    after_help = "Examples:\n  rollout doctor --json\n  rollout ban add --title 'DB failover' \
                  --type regular_maintenance --start 2024-06-01T22:00 --end 2024-06-02T02:00 \
                  --project 7\n  rollout check-window --project 7 --start 2024-06-01T23:00 \
                  --end 2024-06-02T00:30"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, DB connectivity and schema migrations")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(subcommand, about = "Mirror projects from the project service")]
    Project(ProjectCommand),
    #[command(subcommand, about = "Mirror accounts from the account service")]
    Account(AccountCommand),
    #[command(subcommand, about = "Draft approval documents and move them through approval")]
    Document(DocumentCommand),
    #[command(subcommand, about = "Manage deployment ban periods")]
    Ban(BanCommand),
    #[command(about = "Check whether a window is free of bans and scheduled deployments")]
    CheckWindow(CheckWindowArgs),
}

#[derive(Debug, Subcommand)]
enum ProjectCommand {
    #[command(about = "Register or rename a project")]
    Add {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        name: String,
    },
    #[command(about = "List registered projects")]
    List,
}

#[derive(Debug, Subcommand)]
enum AccountCommand {
    #[command(about = "Register an account")]
    Add {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: Option<String>,
    },
    #[command(about = "List registered accounts")]
    List,
}

#[derive(Debug, Subcommand)]
enum DocumentCommand {
    #[command(about = "Draft a document with its ordered approval lines")]
    Create(CreateDocumentArgs),
    #[command(about = "Show a document with its derived status and next approver")]
    Show { document_id: String },
    #[command(about = "Submit a draft for approval")]
    Submit(DocumentVersionArgs),
    #[command(about = "Record a decision on one approval line")]
    Decide(DecideArgs),
    #[command(about = "Cancel an open document (drafter only)")]
    Cancel(DocumentVersionArgs),
}

#[derive(Debug, Args)]
struct CreateDocumentArgs {
    #[arg(long = "type", value_parser = parse_document_type)]
    document_type: DocumentType,
    #[arg(long)]
    title: String,
    #[arg(long, default_value = "")]
    content: String,
    #[arg(long)]
    deployment: Option<String>,
    #[arg(long = "project")]
    projects: Vec<i64>,
    #[arg(long, value_parser = parse_local_datetime)]
    start: Option<NaiveDateTime>,
    #[arg(long, value_parser = parse_local_datetime)]
    end: Option<NaiveDateTime>,
    #[arg(long = "line", value_parser = parse_approval_line, help = "TYPE:ACCOUNT, in order")]
    lines: Vec<NewApprovalLine>,
    #[arg(long)]
    actor: String,
}

#[derive(Debug, Args)]
struct DocumentVersionArgs {
    document_id: String,
    #[arg(long, help = "Version the caller last read")]
    version: u32,
    #[arg(long)]
    actor: String,
}

#[derive(Debug, Args)]
struct DecideArgs {
    document_id: String,
    #[arg(long, help = "Version the caller last read")]
    version: u32,
    #[arg(long)]
    line: String,
    #[arg(long, help = "Reject instead of approve")]
    reject: bool,
    #[arg(long)]
    comment: Option<String>,
    #[arg(long)]
    actor: String,
}

#[derive(Debug, Subcommand)]
enum BanCommand {
    #[command(about = "Declare a ban period over one or more projects")]
    Add(AddBanArgs),
    #[command(about = "List ban periods ordered by start")]
    List {
        #[arg(long, help = "Include soft-deleted bans")]
        include_deleted: bool,
    },
    #[command(about = "Soft-delete a ban period")]
    Remove {
        ban_id: String,
        #[arg(long, default_value = "operator")]
        actor: String,
    },
}

#[derive(Debug, Args)]
struct AddBanArgs {
    #[arg(long)]
    title: String,
    #[arg(long = "type", value_parser = parse_ban_type)]
    ban_type: BanType,
    #[arg(long, value_parser = parse_local_datetime)]
    start: NaiveDateTime,
    #[arg(long, value_parser = parse_local_datetime)]
    end: NaiveDateTime,
    #[arg(long = "project", required = true)]
    projects: Vec<i64>,
    #[arg(long, default_value = "operator")]
    actor: String,
}

#[derive(Debug, Args)]
struct CheckWindowArgs {
    #[arg(long = "project", required = true)]
    projects: Vec<i64>,
    #[arg(long, value_parser = parse_local_datetime)]
    start: NaiveDateTime,
    #[arg(long, value_parser = parse_local_datetime)]
    end: NaiveDateTime,
    #[arg(long, help = "Document id to ignore, e.g. the one being rescheduled")]
    exclude: Option<String>,
}

pub fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // A second init (e.g. in tests) keeps the first subscriber.
    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

fn init_from_config() -> anyhow::Result<()> {
    let config =
        AppConfig::load(LoadOptions::default()).context("logging is disabled: invalid config")?;
    init_logging(&config);
    Ok(())
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    if let Err(error) = init_from_config() {
        eprintln!("{error:#}");
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Project(ProjectCommand::Add { id, name }) => commands::project::add(id, &name),
        Command::Project(ProjectCommand::List) => commands::project::list(),
        Command::Account(AccountCommand::Add { id, name }) => {
            commands::account::add(&id, name.as_deref())
        }
        Command::Account(AccountCommand::List) => commands::account::list(),
        Command::Document(DocumentCommand::Create(args)) => {
            commands::document::create(commands::document::CreateDocument {
                document_type: args.document_type,
                title: args.title,
                content: args.content,
                deployment_id: args.deployment,
                project_ids: args.projects,
                start: args.start,
                end: args.end,
                lines: args.lines,
                actor: args.actor,
            })
        }
        Command::Document(DocumentCommand::Show { document_id }) => {
            commands::document::show(&document_id)
        }
        Command::Document(DocumentCommand::Submit(args)) => {
            commands::document::submit(&args.document_id, args.version, &args.actor)
        }
        Command::Document(DocumentCommand::Decide(args)) => {
            commands::document::decide(commands::document::Decide {
                document_id: args.document_id,
                version: args.version,
                line_id: args.line,
                approve: !args.reject,
                comment: args.comment,
                actor: args.actor,
            })
        }
        Command::Document(DocumentCommand::Cancel(args)) => {
            commands::document::cancel(&args.document_id, args.version, &args.actor)
        }
        Command::Ban(BanCommand::Add(args)) => commands::ban::add(commands::ban::AddBan {
            title: args.title,
            ban_type: args.ban_type,
            start: args.start,
            end: args.end,
            project_ids: args.projects,
            actor: args.actor,
        }),
        Command::Ban(BanCommand::List { include_deleted }) => {
            commands::ban::list(include_deleted)
        }
        Command::Ban(BanCommand::Remove { ban_id, actor }) => {
            commands::ban::remove(&ban_id, &actor)
        }
        Command::CheckWindow(args) => {
            commands::check_window::run(args.projects, args.start, args.end, args.exclude)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
