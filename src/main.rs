use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use buildboard::client::DashboardClient;
use buildboard::config::Config;
use buildboard::poll::{Fetch, PollingStore};
use buildboard::queue::ScheduledBuild;
use buildboard::report::view::{NightlyRow, WeeklyRow};
use buildboard::report::{group_and_sort, view, RunRecord, WeeklyBuildRecord};
use buildboard::{ingest, storage};

#[derive(Parser)]
#[command(
    name = "buildboard",
    about = "CI build and test status dashboard service",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (API server + heartbeat sweeper)
    Serve {
        /// Bind address
        #[arg(long)]
        bind: Option<String>,

        /// SQLite database path
        #[arg(long)]
        db: Option<String>,
    },

    /// Ingest the CI result JSON directory into the database,
    /// externalizing inline logs into stored references
    Migrate {
        /// Data directory (contains nightly-tests/, weekly-builds/, logs/)
        #[arg(long)]
        data_dir: Option<String>,

        /// SQLite database path
        #[arg(long)]
        db: Option<String>,
    },

    /// Offline report: group, sort, and classify result files from disk
    Report {
        /// Data directory
        #[arg(long)]
        data_dir: Option<String>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Follow a remote server's build queue and activity log
    Watch {
        /// Base URL of the buildboard server
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        server: String,

        /// Refresh interval in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,
    },
}

struct BuildsFetcher {
    client: Arc<DashboardClient>,
}

#[async_trait::async_trait]
impl Fetch for BuildsFetcher {
    type Item = Vec<ScheduledBuild>;

    async fn fetch(&self) -> Result<Vec<ScheduledBuild>> {
        self.client.builds().await
    }
}

struct SystemLogFetcher {
    client: Arc<DashboardClient>,
}

#[async_trait::async_trait]
impl Fetch for SystemLogFetcher {
    type Item = Vec<String>;

    async fn fetch(&self) -> Result<Vec<String>> {
        self.client.system_log().await
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut cfg = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { bind, db } => {
            if let Some(bind) = bind {
                cfg.bind = bind;
            }
            if let Some(db) = db {
                cfg.db_path = db;
            }
            tracing::info!(bind = %cfg.bind, "Starting buildboard daemon");
            buildboard::serve(&cfg).await?;
        }
        Commands::Migrate { data_dir, db } => {
            if let Some(data_dir) = data_dir {
                cfg.data_dir = data_dir;
            }
            if let Some(db) = db {
                cfg.db_path = db;
            }
            let pool = storage::open_pool(&cfg.db_path)?;
            let summary = ingest::migrate(&pool, std::path::Path::new(&cfg.data_dir))?;
            println!(
                "Migrated {} nightly and {} weekly records ({} logs externalized).",
                summary.nightly, summary.weekly, summary.logs
            );
        }
        Commands::Report { data_dir, json } => {
            if let Some(data_dir) = data_dir {
                cfg.data_dir = data_dir;
            }
            let data_dir = std::path::Path::new(&cfg.data_dir);
            let nightly: Vec<RunRecord> =
                ingest::read_dir_records(&data_dir.join(ingest::NIGHTLY_DIR))?;
            let weekly: Vec<WeeklyBuildRecord> =
                ingest::read_dir_records(&data_dir.join(ingest::WEEKLY_DIR))?;

            let nightly: Vec<(String, Vec<NightlyRow>)> = group_and_sort(nightly)
                .iter()
                .map(|(p, records)| (p.clone(), records.iter().map(view::nightly_row).collect()))
                .collect();
            let weekly: Vec<(String, Vec<WeeklyRow>)> = group_and_sort(weekly)
                .iter()
                .map(|(p, records)| (p.clone(), records.iter().map(view::weekly_row).collect()))
                .collect();

            if json {
                let out = serde_json::json!({ "nightly": nightly, "weekly": weekly });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print_nightly(&nightly);
                print_weekly(&weekly);
            }
        }
        Commands::Watch {
            server,
            interval_ms,
        } => {
            if let Some(interval_ms) = interval_ms {
                cfg.poll_interval_ms = interval_ms;
            }
            watch(&server, cfg.poll_interval()).await?;
        }
    }

    Ok(())
}

fn print_nightly(groups: &[(String, Vec<NightlyRow>)]) {
    println!("\nNightly Tests");
    for (project, rows) in groups {
        println!("\n{}", project);
        for row in rows {
            let when = row
                .time_stamp
                .map(|t| t.format("%a %b %d %Y %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string());
            print!("  {:<22} | Compilation: {}", when, row.compilation.text);
            for slot in &row.platform_builds {
                print!(" | {}: {}", slot.title, slot.text);
            }
            println!(
                " | Packaging: {} | Tests: {}",
                row.packaging.text, row.tests.text
            );
        }
    }
}

fn print_weekly(groups: &[(String, Vec<WeeklyRow>)]) {
    println!("\nWeekly Builds");
    for (project, rows) in groups {
        println!("\n{}", project);
        for row in rows {
            let when = row
                .time_stamp
                .map(|t| t.format("%a %b %d %Y %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string());
            print!("  {:<22}", when);
            for slot in &row.platforms {
                print!(" | {}: {}", slot.title, slot.text);
            }
            println!();
        }
    }
}

/// Live view of the remote build queue and activity log, refreshed by two
/// independent polling stores until interrupted.
async fn watch(server: &str, interval: std::time::Duration) -> Result<()> {
    let client = Arc::new(DashboardClient::new(server)?);

    let builds = PollingStore::spawn(
        BuildsFetcher {
            client: client.clone(),
        },
        interval,
    );
    let log = PollingStore::spawn(
        SystemLogFetcher {
            client: client.clone(),
        },
        interval,
    );

    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {}
        }

        let builds_snap = builds.snapshot();
        let log_snap = log.snapshot();

        println!("\x1B[2J\x1B[H== buildboard watch ({}) ==", server);
        println!("\nBuild Queue [{:?}]", builds_snap.state);
        match builds_snap.value {
            Some(list) if !list.is_empty() => {
                println!(
                    "{:<20} | {:<15} | {:<10} | Date",
                    "Project", "Preset", "Status"
                );
                println!("{:-<20}-|-{:-<15}-|-{:-<10}-|-{:-<20}", "", "", "", "");
                for b in &list {
                    println!(
                        "{:<20} | {:<15} | {:<10} | {}",
                        b.project,
                        b.preset,
                        b.status.to_string(),
                        b.time_stamp.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }
            Some(_) => println!("(queue is empty)"),
            None => println!("(waiting for first snapshot)"),
        }

        println!("\nActivity [{:?}]", log_snap.state);
        for line in log_snap.value.unwrap_or_default().iter().take(15) {
            println!("  {}", line);
        }
    }

    builds.stop().await;
    log.stop().await;
    Ok(())
}
