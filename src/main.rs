use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

mod auth;
mod db;
mod error;
mod models;
mod pipeline;
mod report;
mod repository;
mod risk;
mod service;

use auth::{Caller, Role, RolePolicy};
use db::PgStore;
use models::{AlertFilter, BatchOutcome, ScoreResult};
use pipeline::BatchRunner;
use repository::StudentRepository;
use service::RetentionService;

#[derive(Parser)]
#[command(name = "student-retention")]
#[command(about = "Dropout risk scoring and counselor alerts", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Settings {
    /// Postgres connection string
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    #[arg(long, global = true, default_value_t = 5)]
    max_connections: u32,

    /// Identity of the person running the command
    #[arg(long, global = true, env = "RETENTION_CALLER")]
    caller: Option<String>,

    /// admin, mentor or user
    #[arg(long, global = true, env = "RETENTION_ROLE", default_value = "user")]
    role: Role,
}

impl Settings {
    fn caller(&self) -> Option<Caller> {
        self.caller.as_ref().map(|user_id| Caller {
            user_id: user_id.clone(),
            role: self.role,
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load development students, optionally scoring them afterwards
    Seed {
        #[arg(long)]
        compute: bool,
    },
    /// Upsert students from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Recompute risk for one student or everyone
    #[command(group(
        ArgGroup::new("scope")
            .args(["student_id", "all"])
            .required(true)
            .multiple(false)
    ))]
    Score {
        student_id: Option<String>,
        #[arg(long)]
        all: bool,
        #[arg(long)]
        json: bool,
    },
    /// List alerts
    Alerts {
        #[arg(long)]
        unread: bool,
        #[arg(long)]
        alert_type: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Raise an alert for a student by hand
    Alert {
        #[arg(long)]
        student: String,
        #[arg(long)]
        message: String,
        #[arg(long)]
        mentor: Option<String>,
        #[arg(long, default_value = "manual")]
        alert_type: String,
    },
    /// Route an existing alert to a mentor
    Assign {
        alert_id: Uuid,
        #[arg(long)]
        mentor: String,
    },
    /// Mark an alert as read, or resolve it
    Ack {
        alert_id: Uuid,
        #[arg(long)]
        resolve: bool,
    },
    /// Show prediction history for a student
    History {
        student_id: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("RETENTION_LOG")
        .unwrap_or_else(|_| EnvFilter::new("student_retention=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn print_outcome(outcome: &BatchOutcome) {
    for result in outcome.results.iter() {
        print_result(result);
    }
    println!(
        "Processed {} students: {} low, {} medium, {} high.",
        outcome.results.len(),
        outcome.distribution.low,
        outcome.distribution.medium,
        outcome.distribution.high
    );
}

fn print_result(result: &ScoreResult) {
    println!(
        "- {} score {:.2} ({})",
        result.student_id, result.risk_score, result.risk_level
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let database_url = cli
        .settings
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(cli.settings.max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")?;

    let caller = cli.settings.caller();
    let caller = caller.as_ref();
    let service = RetentionService::new(PgStore::new(pool), RolePolicy);

    match cli.command {
        Commands::InitDb => {
            db::init_db(service.repo().pool()).await?;
            println!("Schema ready.");
        }
        Commands::Seed { compute } => {
            let seeded = db::seed(service.repo()).await?;
            println!("Seeded {seeded} students.");

            // Development path: scores everyone without an access check.
            if compute {
                let outcome = BatchRunner::new(service.repo()).run_all().await?;
                print_outcome(&outcome);
            }
        }
        Commands::Import { csv } => {
            let file = std::fs::File::open(&csv)
                .with_context(|| format!("failed to open {}", csv.display()))?;
            let upserted = service
                .import_students(caller, file)
                .await
                .with_context(|| format!("failed to import {}", csv.display()))?;
            println!("Upserted {upserted} students from {}.", csv.display());
        }
        Commands::Score {
            student_id,
            all,
            json,
        } => {
            if all {
                let outcome = service.compute_all(caller).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                } else {
                    print_outcome(&outcome);
                }
            } else {
                let student_id = student_id.context("a student id or --all is required")?;
                let result = service.compute_one(caller, &student_id).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                } else {
                    print_result(&result);
                }
            }
        }
        Commands::Alerts {
            unread,
            alert_type,
            limit,
            json,
        } => {
            let filter = AlertFilter {
                is_read: unread.then_some(false),
                alert_type,
                assigned_mentor_id: None,
            };
            let alerts = service.list_alerts(caller, filter).await?;

            if json {
                let shown = &alerts[..alerts.len().min(limit)];
                println!("{}", serde_json::to_string_pretty(shown)?);
                return Ok(());
            }
            if alerts.is_empty() {
                println!("No alerts found.");
                return Ok(());
            }

            for alert in alerts.iter().take(limit) {
                let status = match (alert.is_read, alert.resolved_at) {
                    (_, Some(_)) => "resolved",
                    (true, None) => "read",
                    (false, None) => "unread",
                };
                println!(
                    "- [{}] {} {} ({}) {}",
                    status,
                    alert.id,
                    alert.created_at.format("%Y-%m-%d %H:%M"),
                    alert.alert_type,
                    alert.message
                );
            }
        }
        Commands::Alert {
            student,
            message,
            mentor,
            alert_type,
        } => {
            let alert = service
                .create_alert(caller, &student, &alert_type, &message, mentor.as_deref())
                .await?;
            match alert.assigned_mentor_id.as_deref() {
                Some(mentor) => {
                    println!("Alert {} created for {student}, assigned to {mentor}.", alert.id)
                }
                None => println!("Alert {} created for {student}.", alert.id),
            }
        }
        Commands::Assign { alert_id, mentor } => {
            service.assign_alert(caller, alert_id, &mentor).await?;
            println!("Alert {alert_id} assigned to {mentor}.");
        }
        Commands::Ack { alert_id, resolve } => {
            if resolve {
                service.resolve_alert(caller, alert_id).await?;
                println!("Alert {alert_id} resolved.");
            } else {
                service.mark_alert_read(caller, alert_id).await?;
                println!("Alert {alert_id} marked as read.");
            }
        }
        Commands::History {
            student_id,
            limit,
            json,
        } => {
            let history = service.prediction_history(caller, &student_id).await?;

            if json {
                let shown = &history[..history.len().min(limit)];
                println!("{}", serde_json::to_string_pretty(shown)?);
                return Ok(());
            }

            if history.is_empty() {
                println!("No predictions recorded for {student_id}.");
                return Ok(());
            }

            println!("Predictions for {student_id}:");
            for prediction in history.iter().take(limit) {
                println!(
                    "- {} score {:.2} ({}) attendance {:.0}%, GPA {:.2}, trend {:+}",
                    prediction.predicted_at.format("%Y-%m-%d %H:%M"),
                    prediction.risk_score,
                    prediction.model_version,
                    prediction.features.attendance_percentage,
                    prediction.features.gpa,
                    prediction.features.gpa_trend
                );
            }
        }
        Commands::Report { out } => {
            let distribution = service.risk_distribution(caller).await?;
            let high_risk = service.high_risk_students(caller).await?;
            let unread = service
                .list_alerts(
                    caller,
                    AlertFilter {
                        is_read: Some(false),
                        ..AlertFilter::default()
                    },
                )
                .await?;
            let students = service.repo().list_students().await?;

            let report = report::build_report(
                chrono::Utc::now(),
                &distribution,
                &students,
                &high_risk,
                &unread,
            );
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
