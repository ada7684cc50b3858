//! lifeplan CLI: daily plans, tasks and suggestions.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use lifeplan::client::{self, PlannerClient};
use lifeplan::config::PlannerConfig;
use lifeplan::paths::LifeplanPaths;
use lifeplan::plan::{self, DailyPlan};
use lifeplan::planner::Planner;
use lifeplan::session::Session;
use lifeplan::settings::SettingsPatch;
use lifeplan::task::{NewTask, Task, TaskFilter, TaskPatch, TaskSource, TaskStatus};

#[derive(Parser)]
#[command(name = "lifeplan", version, about = "Daily planning engine")]
struct Cli {
    /// Root directory for config, data and state (default: XDG directories).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// User to act as (default: $LIFEPLAN_USER, then $USER).
    #[arg(long, global = true)]
    user: Option<String>,

    /// Use a throwaway in-memory planner, ignoring any running daemon.
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file if none exists.
    Init,

    /// Show today's committed plan.
    Today,

    /// Rebuild the plan for a date (default: today).
    Regenerate {
        /// Plan date, YYYY-MM-DD.
        #[arg(long)]
        date: Option<String>,
    },

    /// Show the committed plan for a date.
    Plan {
        /// Plan date, YYYY-MM-DD.
        date: String,
    },

    /// Manage tasks.
    Tasks {
        #[command(subcommand)]
        action: TaskAction,
    },

    /// List or dismiss suggestions.
    Suggestions {
        #[command(subcommand)]
        action: SuggestionAction,
    },

    /// Show or change planner settings.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Show planner info.
    Info,
}

#[derive(Subcommand)]
enum TaskAction {
    /// List tasks, newest first.
    List {
        /// Filter by status (pending, in_progress, completed).
        #[arg(long)]
        status: Option<String>,
        /// Filter by approval state.
        #[arg(long)]
        approved: Option<bool>,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        page_size: Option<u32>,
    },
    /// Show one task.
    Show { id: String },
    /// Create a task.
    Add {
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// Priority 0-100 (suggested from the deadline when omitted).
        #[arg(long)]
        priority: Option<i64>,
        /// Estimated duration in minutes.
        #[arg(long)]
        duration: Option<i64>,
        /// Deadline, RFC 3339 or YYYY-MM-DD (end of day, UTC).
        #[arg(long)]
        due: Option<String>,
        /// Origin: manual, email, document, calendar.
        #[arg(long)]
        source: Option<String>,
        /// Mark as an AI-extracted draft awaiting approval.
        #[arg(long)]
        draft: bool,
    },
    /// Update fields of a task.
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        priority: Option<i64>,
        #[arg(long)]
        duration: Option<i64>,
        #[arg(long)]
        due: Option<String>,
        /// Remove the deadline.
        #[arg(long, conflicts_with = "due")]
        clear_due: bool,
        #[arg(long)]
        status: Option<String>,
    },
    /// Approve a draft so it can be planned.
    Approve { id: String },
    /// Mark a task completed.
    Complete { id: String },
    /// Delete a task.
    Delete { id: String },
}

#[derive(Subcommand)]
enum SuggestionAction {
    /// List active suggestions.
    List,
    /// Dismiss a suggestion by id.
    Dismiss { id: String },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Show current settings.
    Show,
    /// Change settings.
    Set {
        /// Daily time budget in minutes.
        #[arg(long)]
        budget: Option<u32>,
        /// Local start of the working day, HH:MM.
        #[arg(long)]
        day_start: Option<String>,
        /// IANA timezone name.
        #[arg(long)]
        timezone: Option<String>,
        /// Whether a partly fitting task may be scheduled.
        #[arg(long)]
        allow_partial: Option<bool>,
    },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let paths = match &cli.data_dir {
        Some(root) => LifeplanPaths::rooted(root),
        None => LifeplanPaths::resolve()?,
    };

    if let Commands::Init = cli.command {
        paths.ensure_dirs()?;
        let file = paths.config_file();
        if file.exists() {
            println!("Config already present at {}", file.display());
        } else {
            PlannerConfig::default().save(&file)?;
            println!("Wrote default config to {}", file.display());
        }
        return Ok(());
    }

    let user = cli
        .user
        .clone()
        .or_else(|| std::env::var("LIFEPLAN_USER").ok())
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "local".to_string());
    let session = Session::new(user)?;
    let client = connect(&cli, &paths, session)?;

    match cli.command {
        Commands::Init => unreachable!("handled above"),

        Commands::Today => print_plan(&client.today()?),

        Commands::Regenerate { date } => {
            let date = date.as_deref().map(plan::parse_date).transpose()?;
            print_plan(&client.regenerate(date)?);
        }

        Commands::Plan { date } => print_plan(&client.plan_for(plan::parse_date(&date)?)?),

        Commands::Tasks { action } => run_task_action(&client, action)?,

        Commands::Suggestions { action } => match action {
            SuggestionAction::List => {
                let suggestions = client.suggestions()?;
                if suggestions.is_empty() {
                    println!("No suggestions.");
                }
                for s in &suggestions {
                    println!("[{}] {} ({})", s.id, s.title, s.kind.as_str());
                    println!("    {}", s.description);
                }
            }
            SuggestionAction::Dismiss { id } => {
                client.dismiss_suggestion(&id)?;
                println!("Dismissed {id}");
            }
        },

        Commands::Settings { action } => {
            let settings = match action {
                SettingsAction::Show => client.settings()?,
                SettingsAction::Set {
                    budget,
                    day_start,
                    timezone,
                    allow_partial,
                } => client.update_settings(&SettingsPatch {
                    daily_budget_minutes: budget,
                    day_start,
                    timezone,
                    allow_partial,
                })?,
            };
            println!("{}", serde_json::to_string_pretty(&settings).into_diagnostic()?);
        }

        Commands::Info => {
            let info = client.info()?;
            println!("lifeplan {}", info.version);
            println!("  backend:         {}", if client.is_remote() { "daemon" } else { "local" });
            println!("  persistent:      {}", info.persistent);
            println!("  tasks:           {}", info.task_count);
            println!("  last generation: {}", info.last_generation);
            println!("  recommender:     {}", info.recommender);
        }
    }

    Ok(())
}

/// Prefer a running daemon; otherwise open the planner in-process.
fn connect(cli: &Cli, paths: &LifeplanPaths, session: Session) -> Result<PlannerClient> {
    let mut config = PlannerConfig::load_or_default(&paths.config_file())?;
    config.apply_env()?;

    if cli.memory {
        let planner = Planner::in_memory(config)?;
        return Ok(PlannerClient::local(Arc::new(planner), session));
    }
    if let Some(info) = client::discover_server(paths) {
        tracing::debug!(pid = info.pid, url = %info.base_url(), "using running daemon");
        return Ok(PlannerClient::remote(&info, session));
    }
    paths.ensure_dirs()?;
    let planner = Planner::open(config, &paths.db_dir())?;
    Ok(PlannerClient::local(Arc::new(planner), session))
}

fn run_task_action(client: &PlannerClient, action: TaskAction) -> Result<()> {
    match action {
        TaskAction::List {
            status,
            approved,
            page,
            page_size,
        } => {
            let filter = TaskFilter {
                status: status.as_deref().map(parse_status).transpose()?,
                is_approved: approved,
                page,
                page_size,
            };
            let result = client.list_tasks(&filter)?;
            println!(
                "Tasks {} of page {} ({} total):",
                result.tasks.len(),
                result.page,
                result.total
            );
            for task in &result.tasks {
                print_task_line(task);
            }
        }
        TaskAction::Show { id } => {
            let task = client.get_task(&id)?;
            println!("{}", serde_json::to_string_pretty(&task).into_diagnostic()?);
        }
        TaskAction::Add {
            title,
            description,
            priority,
            duration,
            due,
            source,
            draft,
        } => {
            let new = NewTask {
                description,
                priority,
                estimated_duration: duration,
                due_date: due.as_deref().map(parse_due).transpose()?,
                source: source.as_deref().map(parse_source).transpose()?,
                ai_generated: draft,
                ..NewTask::titled(title)
            };
            let task = client.create_task(&new)?;
            println!("Created {}", task.id);
            print_task_line(&task);
        }
        TaskAction::Update {
            id,
            title,
            priority,
            duration,
            due,
            clear_due,
            status,
        } => {
            let due_date = if clear_due {
                Some(None)
            } else {
                due.as_deref().map(parse_due).transpose()?.map(Some)
            };
            let patch = TaskPatch {
                title,
                priority,
                estimated_duration: duration,
                due_date,
                status: status.as_deref().map(parse_status).transpose()?,
                ..TaskPatch::default()
            };
            print_task_line(&client.update_task(&id, &patch)?);
        }
        TaskAction::Approve { id } => print_task_line(&client.approve_task(&id)?),
        TaskAction::Complete { id } => print_task_line(&client.complete_task(&id)?),
        TaskAction::Delete { id } => {
            client.delete_task(&id)?;
            println!("Deleted {id}");
        }
    }
    Ok(())
}

fn parse_status(s: &str) -> Result<TaskStatus> {
    s.parse::<TaskStatus>().into_diagnostic()
}

fn parse_source(s: &str) -> Result<TaskSource> {
    match s.trim().to_ascii_lowercase().as_str() {
        "manual" => Ok(TaskSource::Manual),
        "email" => Ok(TaskSource::Email),
        "document" => Ok(TaskSource::Document),
        "calendar" => Ok(TaskSource::Calendar),
        other => miette::bail!("unknown task source: {other}"),
    }
}

fn parse_due(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").into_diagnostic()?;
    match date.and_hms_opt(23, 59, 59) {
        Some(end) => Ok(end.and_utc()),
        None => miette::bail!("invalid due date: {s}"),
    }
}

fn print_task_line(task: &Task) {
    let due = task
        .due_date
        .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".into());
    let approval = if task.is_approved { "" } else { " [draft]" };
    println!(
        "  {}  {:<11} p{:<3} r{:<3} {:>4}m  due {}  {}{}",
        task.id,
        task.status.as_str(),
        task.priority,
        task.risk_level,
        task.estimated_duration,
        due,
        task.title,
        approval
    );
}

fn print_plan(plan: &DailyPlan) {
    println!(
        "Plan for {} (generation {}, {}/{} min)",
        plan.date, plan.generation, plan.total_duration, plan.budget_minutes
    );
    if plan.tasks.is_empty() {
        println!("  (nothing scheduled)");
    }
    for entry in &plan.tasks {
        let partial = if entry.partial {
            format!(" (partial, {} of {} min)", entry.scheduled_duration, entry.estimated_duration)
        } else {
            String::new()
        };
        println!(
            "  {}  {:>4}m  p{:<3} r{:<3} {}{}",
            entry.scheduled_time.format("%H:%M"),
            entry.scheduled_duration,
            entry.priority,
            entry.risk_level,
            entry.title,
            partial
        );
    }
    if !plan.deferred.is_empty() {
        println!("  deferred: {}", plan.deferred.len());
    }
    if let Some(info) = &plan.overload_info {
        println!(
            "Load {:.0}%  burnout risk {}  {}",
            info.load_percentage,
            info.burnout_risk.as_str(),
            info.recommendation
        );
        for warning in &info.regret_warnings {
            println!("  ! {warning}");
        }
    }
    if let Some(text) = &plan.ai_recommendations {
        println!("\n{text}");
    }
}
