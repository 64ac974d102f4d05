pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::process::ExitCode;

use commands::decide::DecideArgs;
use commands::status::StatusTarget;

#[derive(Debug, Parser)]
#[command(
    name = "diplomas",
    about = "Diploma validation operator CLI",
    long_about = "Operate the diploma validation workflow: migrations, demo data, config inspection, request intake, approvals and tracking.",
    after_help = "Examples:\n  diplomas migrate\n  diplomas submit --student STU-2026-010\n  diplomas decide VR-SEED-002 --decision approve --name \"Mme Faye\" --role comptabilite\n  diplomas status --student STU-2026-002"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load deterministic demo validation requests (idempotent)")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Open a new validation request for a student")]
    Submit {
        #[arg(long, help = "Student identifier")]
        student: String,
    },
    #[command(about = "Show the tracking summary of a request, or of a student's latest request")]
    Status {
        #[arg(required_unless_present = "student", help = "Validation request id")]
        request_id: Option<String>,
        #[arg(long, conflicts_with = "request_id", help = "Use this student's latest request")]
        student: Option<String>,
    },
    #[command(about = "Approve or reject the active step of a request")]
    Decide(DecideCommandArgs),
    #[command(about = "List pending requests an approver may act on, oldest first")]
    Pending {
        #[arg(long, help = "Approver display name")]
        name: String,
        #[arg(long, help = "Approver role, e.g. scolarite")]
        role: String,
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    #[command(about = "List decision notifications sent to a student")]
    Notifications {
        #[arg(long)]
        student: String,
        #[arg(long, help = "Only unread notifications")]
        unread: bool,
    },
}

#[derive(Debug, Args)]
struct DecideCommandArgs {
    request_id: String,
    #[arg(long, help = "approve or reject")]
    decision: String,
    #[arg(long, help = "Approver display name")]
    name: String,
    #[arg(long, help = "Approver role")]
    role: String,
    #[arg(long, default_value = "")]
    comment: String,
    #[arg(long, help = "Refuse the decision if the request moved past this version")]
    expected_version: Option<u64>,
    #[arg(long, default_value_t = diplomas_db::DEFAULT_MAX_ATTEMPTS)]
    attempts: u32,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Submit { student } => commands::submit::run(&student),
        Command::Status { request_id, student } => match (request_id, student) {
            (Some(request_id), _) => commands::status::run(StatusTarget::Request(request_id)),
            (None, Some(student)) => {
                commands::status::run(StatusTarget::LatestForStudent(student))
            }
            (None, None) => unreachable!("clap requires a request id or --student"),
        },
        Command::Decide(args) => commands::decide::run(DecideArgs {
            request_id: args.request_id,
            decision: args.decision,
            approver_name: args.name,
            approver_role: args.role,
            comment: args.comment,
            expected_version: args.expected_version,
            attempts: args.attempts,
        }),
        Command::Pending { name, role, limit } => commands::pending::run(&name, &role, limit),
        Command::Notifications { student, unread } => {
            commands::notifications::run(&student, unread)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn decide_parses_flags_and_defaults() {
        let cli = Cli::try_parse_from([
            "diplomas",
            "decide",
            "VR-1",
            "--decision",
            "reject",
            "--name",
            "Pr. Ndiaye",
            "--role",
            "chef_departement",
        ])
        .expect("parse");

        let Command::Decide(args) = cli.command else {
            panic!("expected decide");
        };
        assert_eq!(args.request_id, "VR-1");
        assert_eq!(args.comment, "");
        assert_eq!(args.expected_version, None);
        assert_eq!(args.attempts, 3);
    }

    #[test]
    fn status_needs_a_request_or_a_student() {
        assert!(Cli::try_parse_from(["diplomas", "status"]).is_err());
        assert!(Cli::try_parse_from(["diplomas", "status", "--student", "STU-1"]).is_ok());
        let both = Cli::try_parse_from(["diplomas", "status", "VR-1", "--student", "STU-1"]);
        assert!(both.is_err());
    }
}
