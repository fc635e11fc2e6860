mod config;
mod db;
mod harvest;
mod page;
mod selectors;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::bail;
use chrono::{DateTime, TimeZone};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::task::JoinHandle;

use harvest::{Event, Harvester, Notice, Status, TriggerOutcome};

#[derive(Parser)]
#[command(name = "gemini_harvest", about = "Harvest Gemini conversation links into a local store")]
struct Cli {
    /// SQLite store path
    #[arg(long, global = true, env = "HARVEST_DB", default_value = db::DEFAULT_DB_PATH)]
    db: PathBuf,
    /// TOML file overriding timing and threshold defaults
    #[arg(long, global = true, env = "HARVEST_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Attach to a running Chrome and harvest the live sidebar
    #[cfg(feature = "browser")]
    Harvest {
        /// DevTools endpoint (http://host:port or ws:// debugger URL)
        #[arg(long, env = "HARVEST_REMOTE", default_value = "http://127.0.0.1:9222")]
        remote: String,
        /// Re-run every N seconds until interrupted
        #[arg(long)]
        every: Option<u64>,
    },
    /// Harvest from a saved HTML snapshot of the app
    Import {
        file: PathBuf,
    },
    /// Stored conversations, most recently seen first
    List {
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
        /// Case-insensitive title/URL filter
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Show store statistics
    Stats,
    /// Print the whole store as JSON
    Export,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let tuning = config::load(cli.config.as_deref())?;

    let result = match cli.command {
        #[cfg(feature = "browser")]
        Commands::Harvest { remote, every } => {
            let conn = open_store(&cli.db)?;
            let page = page::cdp::CdpPage::attach(&remote, harvest::identity::APP_BASE_URL).await?;

            let (tx, rx) = unbounded_channel();
            let follower = follow_events(rx)?;
            let harvester = Harvester::new(tuning, tx);

            let result = match every {
                None => {
                    let outcome = harvester.trigger(&page, &conn).await;
                    drop(harvester);
                    let _ = follower.await;
                    report(outcome)
                }
                Some(secs) => {
                    let mut ticker = tokio::time::interval(Duration::from_secs(secs.max(1)));
                    loop {
                        tokio::select! {
                            _ = ticker.tick() => {
                                harvester.trigger(&page, &conn).await;
                            }
                            _ = tokio::signal::ctrl_c() => {
                                println!("Interrupted, stopping.");
                                break;
                            }
                        }
                    }
                    drop(harvester);
                    let _ = follower.await;
                    Ok(())
                }
            };

            if let Err(e) = page.close().await {
                tracing::warn!("{:#}", e);
            }
            result
        }
        Commands::Import { file } => {
            let conn = open_store(&cli.db)?;
            let page = page::html::HtmlPage::open(&file)?;

            let (tx, rx) = unbounded_channel();
            let follower = follow_events(rx)?;
            let harvester = Harvester::new(tuning.immediate(), tx);
            let outcome = harvester.trigger(&page, &conn).await;
            drop(harvester);
            let _ = follower.await;
            report(outcome)
        }
        Commands::List { limit, search } => {
            let conn = open_store(&cli.db)?;
            let rows = db::list_recent(&conn, search.as_deref(), limit)?;
            if rows.is_empty() {
                println!("No conversations found.");
                return Ok(());
            }

            println!("{:>3} | {:<48} | {:<16} | {}", "#", "Title", "Last seen", "URL");
            println!("{}", "-".repeat(110));
            for (i, r) in rows.iter().enumerate() {
                let seen = r.last_seen.get(..16).unwrap_or(&r.last_seen).replace('T', " ");
                println!("{:>3} | {:<48} | {:<16} | {}", i + 1, truncate(&r.title, 45), seen, r.url);
            }
            println!("\n{} conversations", rows.len());
            Ok(())
        }
        Commands::Stats => {
            let conn = open_store(&cli.db)?;
            let s = db::get_stats(&conn)?;
            println!("Conversations: {}", s.total);
            println!(
                "Last updated:  {}",
                humanize_updated(s.last_updated.as_deref(), &chrono::Local::now())
            );
            Ok(())
        }
        Commands::Export => {
            let conn = open_store(&cli.db)?;
            let snapshot = db::load_snapshot(&conn)?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn open_store(path: &Path) -> anyhow::Result<rusqlite::Connection> {
    let conn = db::connect(path)?;
    db::init_schema(&conn)?;
    Ok(conn)
}

/// Print status events under a spinner until the harvester goes away.
fn follow_events(mut rx: UnboundedReceiver<Event>) -> anyhow::Result<JoinHandle<()>> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);

    Ok(tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                Event::Status(Status::Started) => {
                    pb.reset_elapsed();
                    pb.enable_steady_tick(Duration::from_millis(120));
                    pb.set_message("Harvesting conversations...");
                }
                Event::Notice(Notice::RecordsUpdated { count }) => {
                    pb.set_message(format!("Store updated ({} conversations)", count));
                }
                Event::Status(Status::Completed { count }) => {
                    pb.println(format!("Harvest complete: {} conversations", count));
                    pb.set_message("Idle");
                }
                Event::Status(Status::Error { message }) => {
                    pb.println(format!("Harvest failed: {}", message));
                    pb.set_message("Idle");
                }
            }
        }
        pb.finish_and_clear();
    }))
}

fn report(outcome: TriggerOutcome) -> anyhow::Result<()> {
    match outcome {
        TriggerOutcome::Completed { count } => {
            println!("{}", completed_summary(count));
            Ok(())
        }
        TriggerOutcome::Failed { message } => bail!(message),
        TriggerOutcome::Rejected => bail!("a harvest is already running"),
    }
}

/// A zero count also covers a page that never became ready, which leaves the
/// store as it was.
fn completed_summary(count: usize) -> String {
    if count == 0 {
        "Nothing harvested (sidebar empty or unavailable).".to_string()
    } else {
        format!("Store now holds {} conversations.", count)
    }
}

/// "Today at 14:05", "Yesterday at 09:30", else the full date. `now` fixes
/// both the reference day and the display timezone.
fn humanize_updated<Tz: TimeZone>(raw: Option<&str>, now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let Some(raw) = raw else {
        return "Never".to_string();
    };
    let Ok(ts) = DateTime::parse_from_rfc3339(raw) else {
        return raw.to_string();
    };
    let ts = ts.with_timezone(&now.timezone());

    let today = now.date_naive();
    let day = ts.date_naive();
    if day == today {
        format!("Today at {}", ts.format("%H:%M"))
    } else if today.pred_opt() == Some(day) {
        format!("Yesterday at {}", ts.format("%H:%M"))
    } else {
        ts.format("%B %-d, %Y at %H:%M").to_string()
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
