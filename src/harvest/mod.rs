pub mod extract;
pub mod identity;
pub mod locator;
pub mod merge;
pub mod pagination;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::config::Tuning;
use crate::db;
use crate::page::Page;
use extract::ScrapeSession;
use locator::Readiness;

/// Status transitions reported to whoever triggered the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Status {
    Started,
    Completed { count: usize },
    Error { message: String },
}

/// Everything the pipeline tells the outside world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Event {
    Status(Status),
    Notice(Notice),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Notice {
    RecordsUpdated { count: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Completed { count: usize },
    Failed { message: String },
    /// Another run was still in flight; nothing was done.
    Rejected,
}

/// Runs the harvest pipeline on demand, one invocation at a time.
pub struct Harvester {
    tuning: Tuning,
    events: UnboundedSender<Event>,
    in_flight: AtomicBool,
}

impl Harvester {
    pub fn new(tuning: Tuning, events: UnboundedSender<Event>) -> Self {
        Self {
            tuning,
            events,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Run the pipeline once against `page`, merging into the store on `conn`.
    pub async fn trigger<P: Page + ?Sized>(&self, page: &P, conn: &Connection) -> TriggerOutcome {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            warn!("Harvest already running, ignoring trigger");
            return TriggerOutcome::Rejected;
        }
        let _guard = InFlight(&self.in_flight);

        self.emit(Event::Status(Status::Started));
        match self.run(page, conn).await {
            Ok(count) => {
                self.emit(Event::Status(Status::Completed { count }));
                TriggerOutcome::Completed { count }
            }
            Err(e) => {
                let message = format!("{:#}", e);
                warn!("Harvest failed: {}", message);
                self.emit(Event::Status(Status::Error {
                    message: message.clone(),
                }));
                TriggerOutcome::Failed { message }
            }
        }
    }

    async fn run<P: Page + ?Sized>(&self, page: &P, conn: &Connection) -> Result<usize> {
        page.begin_run().await?;
        let stored = db::load_snapshot(conn)?;
        info!("Store holds {} conversations", stored.len());

        let list = match locator::ensure_ready(page, &self.tuning).await? {
            Readiness::Ready { list } => list,
            Readiness::NotReady => {
                warn!("Page not ready, nothing extracted and store left untouched");
                return Ok(0);
            }
        };

        let known: HashSet<String> = stored.records.keys().cloned().collect();
        let report = pagination::disclose(page, list, &known, &self.tuning).await?;
        info!(
            "Disclosure finished: {:?} mode, {} rounds, {} actuations, stopped on {:?}",
            report.mode, report.rounds, report.actuations, report.stop
        );

        tokio::time::sleep(self.tuning.render_wait()).await;

        let mut session = ScrapeSession::new();
        extract::extract_batch(page, list, &mut session).await?;

        let merged = merge::merge(&stored.records, &session.batch);
        let now = chrono::Utc::now().to_rfc3339();
        let total = db::commit(conn, &merged, &session.batch, &now)?;
        info!(
            "Merged {} scraped into {} stored conversations ({} total)",
            session.batch.len(),
            stored.len(),
            total
        );

        self.emit(Event::Notice(Notice::RecordsUpdated { count: total }));
        Ok(total)
    }

    fn emit(&self, event: Event) {
        // A closed receiver only means nobody is listening any more.
        let _ = self.events.send(event);
    }
}

/// Clears the in-flight flag however the run ends, including cancellation.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
