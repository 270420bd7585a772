//! CLI module
//!
//! This module provides the command-line interface for the nudge tool: the
//! `serve` command that runs the reminder service, and client commands that
//! talk to a running server.

use chrono::NaiveDateTime;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;
use std::io;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use crate::{
    api::{serve, Client, ClientConfig, HttpClientImpl, ServerConfig},
    models::{Core, HistoryEntry, Priority, Task, TaskDraft, TaskId, TaskStatus, UserId},
    notify::{LogNotifier, Notifier, WebhookNotifier},
    phrases,
    schedule::{JobKind, ReminderJob, ReminderSettings},
    store::{MemoryStore, TaskStore},
};

const DEADLINE_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API server URL
    #[arg(short, long, env = "NUDGE_SERVER", default_value = "http://localhost:3000")]
    server: String,

    /// Chat user id the client commands act for
    #[arg(short, long, env = "NUDGE_USER")]
    user: Option<i64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the reminder service and its API server
    Serve(ServeArgs),

    /// Create a task and schedule its reminders
    Add {
        /// What needs doing
        text: String,

        /// Number of days to keep reminding (1-30)
        #[arg(short, long, default_value_t = 1)]
        days: u32,

        /// normal (7-8 reminders a day) or important (8-10)
        #[arg(short, long, default_value = "normal")]
        priority: Priority,

        /// Optional deadline, "YYYY-MM-DD HH:MM"
        #[arg(long, value_parser = parse_deadline)]
        deadline: Option<NaiveDateTime>,

        /// Checklist item; repeat or separate with commas
        #[arg(short, long = "item")]
        items: Vec<String>,

        /// Reference to an attached file
        #[arg(long = "attach")]
        attachments: Vec<String>,
    },

    /// List active tasks
    List,

    /// Show one task
    Show { id: u64 },

    /// Mark a task done, optionally with a report
    Done {
        id: u64,

        /// Short report on how it went
        #[arg(short, long)]
        report: Option<String>,
    },

    /// Attach or replace the report of a task
    Report { id: u64, text: String },

    /// Replace the text of a task
    Edit { id: u64, text: String },

    /// Replace the checklist of a task
    Checklist {
        id: u64,

        /// Items; separate with spaces or commas
        #[arg(required = true)]
        items: Vec<String>,
    },

    /// Delete a task and its pending reminders
    Delete { id: u64 },

    /// Show pending reminders of a task
    Reminders { id: u64 },

    /// Completion statistics
    Stats,

    /// Tasks of the last month
    History,

    /// A motivation quote
    Motivation,

    /// Whether today counts as a weekend
    Weekend,

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
struct ServeArgs {
    /// Port to listen on
    #[arg(short, long, env = "NUDGE_PORT", default_value_t = 3000)]
    port: u16,

    /// Address to bind to
    #[arg(long, env = "NUDGE_BIND", default_value = "127.0.0.1")]
    bind: IpAddr,

    /// JSON file tasks are persisted to; in-memory only when omitted
    #[arg(long, env = "NUDGE_STATE_FILE")]
    state_file: Option<PathBuf>,

    /// Chat bridge URL reminders are POSTed to; logged when omitted
    #[arg(long, env = "NUDGE_WEBHOOK_URL")]
    webhook_url: Option<String>,

    /// Offset of the reference time zone from UTC, in hours
    #[arg(long, env = "NUDGE_UTC_OFFSET", default_value_t = 3, allow_negative_numbers = true)]
    utc_offset: i32,

    /// First local hour of the reminder window
    #[arg(long, env = "NUDGE_WINDOW_START", default_value_t = 7)]
    window_start: u32,

    /// Local hour the reminder window closes
    #[arg(long, env = "NUDGE_WINDOW_END", default_value_t = 21)]
    window_end: u32,

    /// Minutes between creating a task and its first reminder
    #[arg(long, env = "NUDGE_FIRST_DELAY_MINUTES", default_value_t = 20)]
    first_delay: i64,

    /// Days without completion before reminders escalate
    #[arg(long, env = "NUDGE_ESCALATION_DAYS", default_value_t = 3)]
    escalation_days: i64,

    /// Chance of adding a light remark to a regular reminder
    #[arg(long, env = "NUDGE_ASIDE_PROBABILITY", default_value_t = 0.4)]
    aside_probability: f64,

    /// Seed for reproducible reminder times and wording
    #[arg(long, env = "NUDGE_SEED")]
    seed: Option<u64>,
}

impl ServeArgs {
    fn settings(&self) -> Result<ReminderSettings, String> {
        if self.window_start >= self.window_end || self.window_end > 24 {
            return Err(format!(
                "invalid reminder window {}:00-{}:00",
                self.window_start, self.window_end
            ));
        }
        if !(-14..=14).contains(&self.utc_offset) {
            return Err(format!("UTC offset out of range: {}", self.utc_offset));
        }
        if !(0.0..=1.0).contains(&self.aside_probability) {
            return Err(format!(
                "aside probability must be within 0..1, got {}",
                self.aside_probability
            ));
        }

        Ok(ReminderSettings {
            window_start_hour: self.window_start,
            window_end_hour: self.window_end,
            first_delay_minutes: self.first_delay,
            utc_offset_secs: self.utc_offset * 3600,
            escalation_days: self.escalation_days,
            aside_probability: self.aside_probability,
            ..ReminderSettings::default()
        })
    }
}

fn parse_deadline(value: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(value.trim(), DEADLINE_FORMAT)
        .map_err(|e| format!("expected \"YYYY-MM-DD HH:MM\": {}", e))
}

/// Run the CLI application
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve(args) => run_server(args).await,

        Commands::Completions { shell } => {
            // Generate completions for the specified shell
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, bin_name, &mut io::stdout());
            Ok(())
        }

        Commands::Motivation => {
            let client = create_client(&cli.server);
            println!("{}", client.motivation().await?.italic());
            Ok(())
        }

        command => {
            let client = create_client(&cli.server);
            run_client_command(&client, command, cli.user).await
        }
    }
}

async fn run_server(args: &ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let settings = args.settings()?;
    let store: Arc<dyn TaskStore> = match &args.state_file {
        Some(path) => Arc::new(MemoryStore::open(path)?),
        None => Arc::new(MemoryStore::new()),
    };
    let notifier: Arc<dyn Notifier> = match &args.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => Arc::new(LogNotifier),
    };

    let core = Core::new(store, notifier, settings, args.seed);
    core.resume().await?;
    let _timer = core.start();

    println!("Starting nudge server on port {}...", args.port);
    let config = ServerConfig {
        address: (args.bind, args.port).into(),
    };
    serve(core, config).await?;
    Ok(())
}

fn require_user(user: Option<i64>) -> Result<UserId, Box<dyn std::error::Error>> {
    user.map(UserId::new)
        .ok_or_else(|| "no user given; pass --user or set NUDGE_USER".into())
}

async fn run_client_command<C: Client + Sync>(
    client: &C,
    command: &Commands,
    user: Option<i64>,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Add {
            text,
            days,
            priority,
            deadline,
            items,
            attachments,
        } => {
            let draft = TaskDraft {
                deadline: *deadline,
                checklist: items.clone(),
                attachments: attachments.clone(),
                ..TaskDraft::new(text.clone(), *days, *priority)
            };
            let created = client.create_task(require_user(user)?, draft).await?;

            println!(
                "{} task {}: \"{}\" for {} day(s), {} reminders scheduled",
                "Added".green().bold(),
                created.task.id,
                created.task.text,
                created.task.days,
                created.reminders
            );
            println!("{} {}", "Hint:".cyan(), created.hint);
        }

        Commands::List => {
            let tasks = client.list_tasks(require_user(user)?).await?;
            if tasks.is_empty() {
                println!("No active tasks. Add one with 'nudge add'");
            }
            for task in &tasks {
                print_task_line(task);
            }
        }

        Commands::Show { id } => {
            let task = client.get_task(TaskId::new(*id)).await?;
            print_task(&task);
        }

        Commands::Done { id, report } => {
            let id = TaskId::new(*id);
            let completion = client.complete_task(id).await?;
            if completion.already_completed {
                println!("Task {} was already done.", id);
            } else {
                println!("{} {}", "✓".green().bold(), completion.praise);
            }

            match report {
                Some(report) => {
                    client.submit_report(id, report.clone()).await?;
                    println!("Report saved.");
                }
                None => println!("{}", phrases::REPORT_PROMPT.dimmed()),
            }
        }

        Commands::Report { id, text } => {
            client.submit_report(TaskId::new(*id), text.clone()).await?;
            println!("Report saved.");
        }

        Commands::Edit { id, text } => {
            let task = client.edit_text(TaskId::new(*id), text.clone()).await?;
            println!("Task {} is now \"{}\"", task.id, task.text);
        }

        Commands::Checklist { id, items } => {
            let task = client.set_checklist(TaskId::new(*id), items.clone()).await?;
            print_task(&task);
        }

        Commands::Delete { id } => {
            let task = client.delete_task(TaskId::new(*id)).await?;
            println!("{} task {}: \"{}\"", "Deleted".red(), task.id, task.text);
        }

        Commands::Reminders { id } => {
            let jobs = client.pending_reminders(TaskId::new(*id)).await?;
            if jobs.is_empty() {
                println!("No pending reminders.");
            }
            for job in &jobs {
                print_job(job);
            }
        }

        Commands::Stats => {
            let stats = client.stats(require_user(user)?).await?;
            println!("{}", "Statistics".bold());
            println!("  Total:     {}", stats.total);
            println!("  Completed: {}", stats.completed.to_string().green());
            println!("  Active:    {}", stats.active.to_string().yellow());
            println!("  Success:   {:.1}%", stats.percent);
        }

        Commands::History => {
            let history = client.history(require_user(user)?).await?;
            if history.is_empty() {
                println!("Nothing in the last month.");
            }
            for entry in &history {
                print_history_entry(entry);
            }
        }

        Commands::Weekend => {
            let status = client.weekend().await?;
            let label = if status.weekend { "weekend".cyan() } else { "workday".normal() };
            println!("{} ({})", status.date, label);
            println!("{}", status.message);
        }

        Commands::Serve(_) | Commands::Motivation | Commands::Completions { .. } => {}
    }

    Ok(())
}

fn create_client(server_url: &str) -> HttpClientImpl {
    let config = ClientConfig {
        base_url: server_url.to_string(),
    };

    HttpClientImpl::with_config(config)
}

fn status_mark(status: TaskStatus) -> String {
    match status {
        TaskStatus::Active => "[ ]".to_string(),
        TaskStatus::Completed => "[✓]".green().to_string(),
    }
}

fn print_task_line(task: &Task) {
    let priority = match task.priority {
        Priority::Important => " !".red().bold().to_string(),
        Priority::Normal => String::new(),
    };
    println!(
        "{} {:>4}. {}{} ({} days from {})",
        status_mark(task.status),
        task.id,
        task.text,
        priority,
        task.days,
        task.created_at.format(DEADLINE_FORMAT)
    );
}

fn print_task(task: &Task) {
    print_task_line(task);
    println!("  Priority: {}", task.priority);
    if let Some(deadline) = task.deadline {
        println!("  Deadline: {}", deadline.format(DEADLINE_FORMAT));
    }

    let items = task.checklist_items();
    if !items.is_empty() {
        println!("  Checklist:");
        for item in items {
            println!("    • {}", item);
        }
    }
    for attachment in &task.attachments {
        println!("  Attachment: {}", attachment);
    }
    if let Some(report) = &task.report {
        println!("  Report: {}", report);
    }
}

fn print_job(job: &ReminderJob) {
    let label = match job.key.kind {
        JobKind::First => "first".bold().to_string(),
        JobKind::Window { day, slot } => format!("day {} #{}", day, slot),
    };
    println!("  {}  {}", job.run_at.format("%Y-%m-%d %H:%M UTC"), label);
}

fn print_history_entry(entry: &HistoryEntry) {
    println!(
        "{} {} {}",
        status_mark(entry.status),
        entry.created_at.format("%Y-%m-%d").to_string().dimmed(),
        entry.text
    );
    if let Some(report) = &entry.report {
        println!("      {}", report.italic());
    }
}
