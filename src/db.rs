use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};

use crate::harvest::identity::ConversationRecord;
use crate::harvest::merge::StoreSnapshot;

pub const DEFAULT_DB_PATH: &str = "data/conversations.sqlite";

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open store {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS conversations (
            url        TEXT PRIMARY KEY,
            title      TEXT NOT NULL,
            first_seen TEXT NOT NULL,
            last_seen  TEXT NOT NULL,
            position   INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_conversations_recent
            ON conversations(last_seen DESC, position);

        CREATE TABLE IF NOT EXISTS store_meta (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

// ── Store ──

pub fn load_snapshot(conn: &Connection) -> Result<StoreSnapshot> {
    let mut stmt = conn.prepare("SELECT url, title FROM conversations")?;
    let records = stmt
        .query_map([], |row| {
            let url: String = row.get(0)?;
            let title: String = row.get(1)?;
            Ok((url.clone(), ConversationRecord { title, url }))
        })?
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    Ok(StoreSnapshot {
        records,
        last_updated: last_updated(conn)?,
    })
}

pub fn last_updated(conn: &Connection) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT value FROM store_meta WHERE key = 'last_updated'",
            [],
            |r| r.get(0),
        )
        .optional()?)
}

/// Write the merged mapping and the new timestamp in one transaction.
/// Records in `batch` are stamped as seen at `now`, in batch order.
pub fn commit(
    conn: &Connection,
    merged: &BTreeMap<String, ConversationRecord>,
    batch: &[ConversationRecord],
    now: &str,
) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut upsert = tx.prepare(
            "INSERT INTO conversations (url, title, first_seen, last_seen)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(url) DO UPDATE SET title = excluded.title",
        )?;
        for r in merged.values() {
            upsert.execute(rusqlite::params![r.url, r.title, now])?;
        }

        let mut touch =
            tx.prepare("UPDATE conversations SET last_seen = ?2, position = ?3 WHERE url = ?1")?;
        for (i, r) in batch.iter().enumerate() {
            touch.execute(rusqlite::params![r.url, now, i as i64])?;
        }

        tx.execute(
            "INSERT INTO store_meta (key, value) VALUES ('last_updated', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            rusqlite::params![now],
        )?;
    }
    let total: usize = tx.query_row("SELECT COUNT(*) FROM conversations", [], |r| r.get(0))?;
    tx.commit()?;
    Ok(total)
}

// ── Viewer ──

pub struct ListedRow {
    pub title: String,
    pub url: String,
    pub last_seen: String,
}

/// Conversations in recency order, optionally filtered to those whose title
/// or URL contains `search` as a case-insensitive substring.
pub fn list_recent(conn: &Connection, search: Option<&str>, limit: usize) -> Result<Vec<ListedRow>> {
    let needle = search
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());
    let mut stmt = conn.prepare(
        "SELECT title, url, last_seen FROM conversations
         ORDER BY last_seen DESC, COALESCE(position, 0), url",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(ListedRow {
            title: row.get(0)?,
            url: row.get(1)?,
            last_seen: row.get(2)?,
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        if out.len() >= limit {
            break;
        }
        let row = row?;
        if let Some(needle) = &needle {
            if !row.title.to_lowercase().contains(needle.as_str())
                && !row.url.to_lowercase().contains(needle.as_str())
            {
                continue;
            }
        }
        out.push(row);
    }
    Ok(out)
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub last_updated: Option<String>,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let total: usize = conn.query_row("SELECT COUNT(*) FROM conversations", [], |r| r.get(0))?;
    Ok(Stats {
        total,
        last_updated: last_updated(conn)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(title: &str, url: &str) -> ConversationRecord {
        ConversationRecord {
            title: title.to_string(),
            url: url.to_string(),
        }
    }

    fn mem() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn commit_batch(conn: &Connection, batch: &[ConversationRecord], now: &str) -> usize {
        let stored = load_snapshot(conn).unwrap();
        let merged = crate::harvest::merge::merge(&stored.records, batch);
        commit(conn, &merged, batch, now).unwrap()
    }

    #[test]
    fn fresh_store_is_empty() {
        let conn = mem();
        let snap = load_snapshot(&conn).unwrap();
        assert!(snap.is_empty());
        assert_eq!(snap.last_updated, None);
    }

    #[test]
    fn commit_persists_records_and_timestamp() {
        let conn = mem();
        let total = commit_batch(&conn, &[rec("A", "u1"), rec("B", "u2")], "2026-10-18T09:00:00Z");
        assert_eq!(total, 2);

        let snap = load_snapshot(&conn).unwrap();
        assert_eq!(snap.records["u1"].title, "A");
        assert_eq!(snap.last_updated.as_deref(), Some("2026-10-18T09:00:00Z"));
    }

    #[test]
    fn overwrite_keeps_first_seen() {
        let conn = mem();
        commit_batch(&conn, &[rec("A", "u1")], "2026-10-18T09:00:00Z");
        commit_batch(&conn, &[rec("A2", "u1")], "2026-10-18T10:00:00Z");

        let (title, first, last): (String, String, String) = conn
            .query_row(
                "SELECT title, first_seen, last_seen FROM conversations WHERE url = 'u1'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(title, "A2");
        assert_eq!(first, "2026-10-18T09:00:00Z");
        assert_eq!(last, "2026-10-18T10:00:00Z");
    }

    #[test]
    fn recency_order_and_search() {
        let conn = mem();
        commit_batch(&conn, &[rec("Old one", "u1"), rec("Old two", "u2")], "2026-10-17T09:00:00Z");
        commit_batch(&conn, &[rec("Newest", "u3"), rec("Old two", "u2")], "2026-10-18T09:00:00Z");

        let rows = list_recent(&conn, None, 10).unwrap();
        let urls: Vec<&str> = rows.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["u3", "u2", "u1"]);

        let rows = list_recent(&conn, Some("old"), 10).unwrap();
        assert_eq!(rows.len(), 2);

        let rows = list_recent(&conn, None, 1).unwrap();
        assert_eq!(rows[0].title, "Newest");
    }

    #[test]
    fn search_is_a_literal_substring() {
        let conn = mem();
        commit_batch(
            &conn,
            &[
                rec("Budget 100% done", "u1"),
                rec("Trip planning", "u2"),
                rec("snake_case names", "u3"),
                rec("Été à Paris", "u4"),
            ],
            "2026-10-18T09:00:00Z",
        );

        let titles = |q: &str| -> Vec<String> {
            list_recent(&conn, Some(q), 10)
                .unwrap()
                .into_iter()
                .map(|r| r.title)
                .collect()
        };
        assert_eq!(titles("_"), vec!["snake_case names"]);
        assert_eq!(titles("%"), vec!["Budget 100% done"]);
        assert_eq!(titles("ÉTÉ"), vec!["Été à Paris"]);
        assert_eq!(titles("  ").len(), 4);
    }

    #[test]
    fn stats_reflect_store() {
        let conn = mem();
        commit_batch(&conn, &[rec("A", "u1")], "2026-10-18T09:00:00Z");
        commit_batch(&conn, &[], "2026-10-18T11:00:00Z");
        let s = get_stats(&conn).unwrap();
        assert_eq!(s.total, 1);
        assert_eq!(s.last_updated.as_deref(), Some("2026-10-18T11:00:00Z"));
    }
}
