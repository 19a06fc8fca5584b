use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use plan_tracker::config::TrackerConfig;
use plan_tracker::db::Database;
use plan_tracker::engine::{StatusEngine, Transition};
use plan_tracker::models::*;
use plan_tracker::plan::{self, PlanDocument};
use plan_tracker::remote::{GitHubClient, SyncCoordinator, SyncReport, SyncScope};
use plan_tracker::{api, report};

/// Rows shown in the "current work" part of the dashboard.
const CURRENT_WORK_ROWS: usize = 10;

#[derive(Parser)]
#[command(name = "tracker")]
#[command(about = "Track epics, stories, tasks and subtasks, and mirror them to GitHub issues")]
struct Cli {
    /// Config file (default: <config dir>/plan-tracker/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the progress dashboard
    #[command(alias = "p")]
    Progress,
    /// List items of one kind
    List {
        /// epics, stories, tasks or subtasks
        #[arg(value_parser = parse_kind)]
        kind: ItemKind,

        /// Only children of this item
        #[arg(long)]
        parent: Option<String>,

        /// Only items with this status
        #[arg(long)]
        status: Option<String>,
    },
    /// Show one item and its children
    Show { key: String },
    /// Mark an item IN_PROGRESS
    Start { key: String },
    /// Mark an item DONE
    Done { key: String },
    /// Set any status (BACKLOG, TODO, IN_PROGRESS, DONE)
    Update { key: String, status: String },
    /// Delete an item
    Delete {
        key: String,

        /// Also delete everything below it
        #[arg(long)]
        cascade: bool,
    },
    /// Print a flat task export
    Export,
    /// Create items from a JSON seed plan
    Seed {
        file: PathBuf,

        /// Replace every existing item
        #[arg(long)]
        reset: bool,
    },
    /// Copy descriptions from the plan documents into the store
    Describe,
    /// Mirror the store to the issue tracker
    Sync {
        #[command(subcommand)]
        pass: SyncPass,
    },
    /// Start the HTTP API
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

#[derive(Subcommand)]
enum SyncPass {
    /// Create or update repository labels
    Labels,
    /// Create or update one milestone per epic
    Milestones,
    /// Labels, milestones, then issues for items that have none
    All(ScopeArgs),
    /// Open issues for items that have none
    Create(ScopeArgs),
    /// Mirror status labels and close finished issues
    Status(ScopeArgs),
    /// Re-render issue bodies
    Content(ScopeArgs),
}

#[derive(Args)]
struct ScopeArgs {
    /// Only these kinds (repeatable)
    #[arg(long, value_parser = parse_kind)]
    kind: Vec<ItemKind>,

    /// Only items under this epic
    #[arg(long)]
    epic: Option<String>,

    /// At most this many items
    #[arg(short, long)]
    limit: Option<usize>,
}

impl ScopeArgs {
    fn into_scope(self) -> anyhow::Result<SyncScope> {
        let epic = self.epic.as_deref().map(ItemKey::parse).transpose()?;
        if let Some(ref epic) = epic {
            if epic.kind() != ItemKind::Epic {
                anyhow::bail!("--epic expects an epic key, got {}", epic);
            }
        }
        let mut scope = SyncScope {
            epic,
            limit: self.limit,
            ..Default::default()
        };
        if !self.kind.is_empty() {
            scope.kinds = self.kind;
        }
        Ok(scope)
    }
}

fn parse_kind(s: &str) -> Result<ItemKind, String> {
    ItemKind::from_plural(s)
        .ok_or_else(|| format!("unknown kind {:?} (expected epics, stories, tasks or subtasks)", s))
}

/// Logs go to stderr so stdout carries only command output.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "plan_tracker=info".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = TrackerConfig::load(cli.config.as_deref())?;

    let db = match config.database_path {
        Some(ref path) => Database::open(path.clone())?,
        None => Database::open_default()?,
    };
    db.migrate()?;

    match cli.command.unwrap_or(Commands::Progress) {
        Commands::Progress => show_progress(&db)?,
        Commands::List {
            kind,
            parent,
            status,
        } => {
            let filter = ItemFilter {
                parent: parent.as_deref().map(ItemKey::parse).transpose()?,
                status: status.as_deref().map(str::parse::<Status>).transpose()?,
            };
            list_items(&db, kind, &filter)?;
        }
        Commands::Show { key } => show_item(&db, &ItemKey::parse(&key)?)?,
        Commands::Start { key } => set_status(&db, &key, Status::InProgress)?,
        Commands::Done { key } => set_status(&db, &key, Status::Done)?,
        Commands::Update { key, status } => set_status(&db, &key, status.parse()?)?,
        Commands::Delete { key, cascade } => {
            let key = ItemKey::parse(&key)?;
            let removed = db.delete(&key, cascade)?;
            println!("Deleted {} ({} item(s) removed)", key, removed);
        }
        Commands::Export => print!("{}", report::export(&db)?),
        Commands::Seed { file, reset } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read seed file {}", file.display()))?;
            let seed: SeedPlan = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse seed file {}", file.display()))?;
            let summary = if reset {
                db.reseed(&seed)?
            } else {
                db.seed(&seed)?
            };
            println!(
                "Seeded {} epics, {} stories, {} tasks, {} subtasks",
                summary.epics, summary.stories, summary.tasks, summary.subtasks
            );
        }
        Commands::Describe => {
            let plan = load_plan(&config)?;
            let updated = plan::apply_descriptions(&db, &plan)?;
            println!("Updated {} descriptions", updated);
        }
        Commands::Sync { pass } => run_sync(&db, &config, pass).await?,
        Commands::Serve { port } => {
            tracing::info!("Starting tracker API on port {}", port);

            let app = api::create_router(db);

            let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
            tracing::info!("Tracker API listening on http://127.0.0.1:{}", port);

            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}

fn load_plan(config: &TrackerConfig) -> anyhow::Result<PlanDocument> {
    if config.plan_files.is_empty() {
        tracing::warn!("No plan files configured (set plan_files or TRACKER_PLAN_FILES)");
    }
    PlanDocument::load(&config.plan_files)
}

async fn run_sync(db: &Database, config: &TrackerConfig, pass: SyncPass) -> anyhow::Result<()> {
    let tracker = GitHubClient::from_config(config)?;
    let plan = load_plan(config)?;
    let mut sync = SyncCoordinator::new(db, &plan, &tracker, config.sync_delay());

    let report = match pass {
        SyncPass::Labels => sync.ensure_labels().await?,
        SyncPass::Milestones => sync.ensure_milestones().await?,
        SyncPass::All(scope) => sync.run_all(&scope.into_scope()?).await?,
        SyncPass::Create(scope) => sync.create_missing(&scope.into_scope()?).await?,
        SyncPass::Status(scope) => sync.mirror_status(&scope.into_scope()?).await?,
        SyncPass::Content(scope) => sync.refresh_content(&scope.into_scope()?).await?,
    };
    print_report(&report);
    Ok(())
}

fn print_report(report: &SyncReport) {
    for synced in &report.succeeded {
        match synced.issue {
            Some(number) => println!("  ok   {} -> #{}", synced.target, number),
            None => println!("  ok   {}", synced.target),
        }
    }
    for failure in &report.failed {
        println!("  FAIL {}: {}", failure.target, failure.message);
    }
    println!("\n{}", report.summary());
}

fn set_status(db: &Database, key: &str, target: Status) -> anyhow::Result<()> {
    let key = ItemKey::parse(key)?;
    match StatusEngine::new(db).transition(&key, target)? {
        Transition::Changed { from, to } => {
            let item = db.get(&key)?;
            println!("Updated {}: {} -> {}", key, from, to);
            println!("  {}", item.title);
        }
        Transition::Unchanged { status } => println!("Status already {}", status),
    }
    Ok(())
}

fn truncate(s: &str, width: usize) -> String {
    s.chars().take(width).collect()
}

fn show_progress(db: &Database) -> anyhow::Result<()> {
    let overall = db.overall_progress()?;

    println!("Implementation Progress");
    println!("{}", "=".repeat(80));
    println!(
        "Overall: {:.1}% ({}/{} tasks)",
        overall.percent, overall.done_tasks, overall.total_tasks
    );
    println!(
        "Epics: {}/{}  Stories: {}/{}  Tasks: {}/{}  Subtasks: {}/{}",
        overall.done_epics,
        overall.total_epics,
        overall.done_stories,
        overall.total_stories,
        overall.done_tasks,
        overall.total_tasks,
        overall.done_subtasks,
        overall.total_subtasks
    );

    println!("\nEpics");
    println!("{}", "-".repeat(80));
    for epic in db.epic_progress()? {
        println!(
            "{:<5} {:<45} {:>5.1}%  {:>3}/{:<3} tasks  [{}]",
            epic.key.to_string(),
            truncate(&epic.title, 45),
            epic.percent,
            epic.done_tasks,
            epic.total_tasks,
            epic.status
        );
    }

    let work = db.current_work()?;
    if !work.is_empty() {
        println!("\nIn progress");
        println!("{}", "-".repeat(80));
        for entry in work.iter().take(CURRENT_WORK_ROWS) {
            println!(
                "{:<10} {:<50} ({})",
                entry.key.to_string(),
                truncate(&entry.title, 50),
                entry.parent_title
            );
        }
        if work.len() > CURRENT_WORK_ROWS {
            println!("... and {} more", work.len() - CURRENT_WORK_ROWS);
        }
    }
    Ok(())
}

fn list_items(db: &Database, kind: ItemKind, filter: &ItemFilter) -> anyhow::Result<()> {
    let items = db.list_items(kind, filter)?;
    for item in &items {
        println!(
            "{:<10} {:<60} [{}]",
            item.key.to_string(),
            truncate(&item.title, 60),
            item.status
        );
    }
    println!("\nTotal: {} {}", items.len(), kind.plural());
    Ok(())
}

fn show_item(db: &Database, key: &ItemKey) -> anyhow::Result<()> {
    let detail = db.get_detail(key)?;
    let item = &detail.item;

    println!("{}", "=".repeat(80));
    println!("{} {}: {}", item.kind(), item.key, item.title);
    println!("{}", "=".repeat(80));
    println!();
    println!("Status:      {}", item.status);
    if let Some(priority) = item.priority {
        println!("Priority:    {}", priority);
    }
    if let Some(ref parent) = item.parent {
        let parent = db.get(parent)?;
        println!("Parent:      {} - {}", parent.key, parent.title);
    }
    if item.kind().has_effort() {
        let hours = |h: Option<f64>| h.map(|h| h.to_string()).unwrap_or_else(|| "N/A".into());
        println!("Estimated:   {} hours", hours(item.estimated_hours));
        println!("Actual:      {} hours", hours(item.actual_hours));
    }
    if item.kind().is_detailed() {
        let started = item.started_at.map(|t| t.to_rfc3339());
        println!("Started:     {}", started.as_deref().unwrap_or("Not started"));
    }
    let completed = item.completed_at.map(|t| t.to_rfc3339());
    println!("Completed:   {}", completed.as_deref().unwrap_or("Not completed"));
    if let Some(number) = item.remote_ref {
        println!("Issue:       #{}", number);
    }
    if item.kind().is_detailed() {
        println!();
        println!("Description:");
        println!("{}", item.description.as_deref().unwrap_or("No description"));
    }

    if !detail.children.is_empty() {
        println!();
        println!("Children:");
        for child in &detail.children {
            println!("  {:<12} {} [{}]", child.key.to_string(), child.title, child.status);
        }
    }
    Ok(())
}
