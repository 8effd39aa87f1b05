use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Mutex, MutexGuard};

use crate::data::types::{MetricSample, Metrics, Subject, SyntheticMask};
use crate::store::{sort_by_base_score, MetricStore, SubjectRegistry};

/// SQLite-backed registry and metric history.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path))?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS creators (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                handle TEXT NOT NULL,
                platforms TEXT NOT NULL DEFAULT '[]',
                base_score REAL NOT NULL,
                avatar TEXT,
                category TEXT NOT NULL,
                verified INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL
            );

            CREATE TABLE IF NOT EXISTS creator_metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                creator_id TEXT NOT NULL,
                google_trends REAL NOT NULL,
                twitter_mentions REAL NOT NULL,
                reddit_posts REAL NOT NULL,
                youtube_views REAL NOT NULL,
                reach_score REAL NOT NULL,
                synthetic_mask INTEGER NOT NULL DEFAULT 0,
                synced_at TIMESTAMP NOT NULL,
                FOREIGN KEY(creator_id) REFERENCES creators(id)
            );

            CREATE INDEX IF NOT EXISTS idx_creators_base_score ON creators(base_score);
            CREATE INDEX IF NOT EXISTS idx_metrics_creator_synced ON creator_metrics(creator_id, synced_at);
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("SQLite connection mutex poisoned"))
    }

    /// Number of stored samples across all subjects.
    pub fn count_samples(&self) -> Result<usize> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM creator_metrics",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn subject_from_row(row: &Row<'_>) -> rusqlite::Result<Subject> {
    let platforms: String = row.get(3)?;
    let platforms: Vec<String> = serde_json::from_str(&platforms).unwrap_or_default();
    Ok(Subject {
        id: row.get(0)?,
        name: row.get(1)?,
        handle: row.get(2)?,
        platforms,
        base_score: row.get(4)?,
        avatar: row.get(5)?,
        category: row.get(6)?,
        verified: row.get(7)?,
    })
}

fn sample_from_row(row: &Row<'_>) -> rusqlite::Result<MetricSample> {
    let synced_at: String = row.get(7)?;
    let mask: u8 = row.get(6)?;
    Ok(MetricSample {
        subject_id: row.get(0)?,
        metrics: Metrics {
            google_trends: row.get(1)?,
            twitter_mentions: row.get(2)?,
            reddit_posts: row.get(3)?,
            youtube_views: row.get(4)?,
        },
        reach_score: row.get(5)?,
        synthetic: SyntheticMask::from_bits(mask),
        timestamp: parse_ts(&synced_at)?,
    })
}

const SUBJECT_COLUMNS: &str = "id, name, handle, platforms, base_score, avatar, category, verified";
const SAMPLE_COLUMNS: &str = "creator_id, google_trends, twitter_mentions, reddit_posts, youtube_views, reach_score, synthetic_mask, synced_at";

impl SubjectRegistry for SqliteStore {
    fn list_subjects(&self) -> Result<Vec<Subject>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {SUBJECT_COLUMNS} FROM creators"))?;
        let rows = stmt.query_map([], subject_from_row)?;
        let mut subjects = rows.collect::<Result<Vec<_>, _>>()?;
        sort_by_base_score(&mut subjects);
        Ok(subjects)
    }

    fn get_subject(&self, id: &str) -> Result<Option<Subject>> {
        let conn = self.conn()?;
        let subject = conn
            .query_row(
                &format!("SELECT {SUBJECT_COLUMNS} FROM creators WHERE id = ?1"),
                params![id],
                subject_from_row,
            )
            .optional()?;
        Ok(subject)
    }

    fn register_subject(&self, subject: &Subject) -> Result<bool> {
        let platforms = serde_json::to_string(&subject.platforms)?;
        let inserted = self.conn()?.execute(
            "INSERT OR IGNORE INTO creators (id, name, handle, platforms, base_score, avatar, category, verified, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                subject.id,
                subject.name,
                subject.handle,
                platforms,
                subject.base_score,
                subject.avatar,
                subject.category,
                subject.verified,
                format_ts(&Utc::now()),
            ],
        )?;
        Ok(inserted > 0)
    }

    fn correct_subject(&self, id: &str, category: &str, verified: bool) -> Result<bool> {
        let updated = self.conn()?.execute(
            "UPDATE creators SET category = ?1, verified = ?2 WHERE id = ?3",
            params![category, verified, id],
        )?;
        Ok(updated > 0)
    }
}

impl MetricStore for SqliteStore {
    fn append(&self, samples: &[MetricSample]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO creator_metrics ({SAMPLE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
            ))?;
            for s in samples {
                stmt.execute(params![
                    s.subject_id,
                    s.metrics.google_trends,
                    s.metrics.twitter_mentions,
                    s.metrics.reddit_posts,
                    s.metrics.youtube_views,
                    s.reach_score,
                    s.synthetic.bits(),
                    format_ts(&s.timestamp),
                ])?;
            }
        }
        tx.commit().context("Failed to commit metric batch")?;
        Ok(())
    }

    fn latest(&self, subject_id: &str) -> Result<Option<MetricSample>> {
        let conn = self.conn()?;
        let sample = conn
            .query_row(
                &format!(
                    "SELECT {SAMPLE_COLUMNS} FROM creator_metrics
                     WHERE creator_id = ?1
                     ORDER BY synced_at DESC, id DESC
                     LIMIT 1"
                ),
                params![subject_id],
                sample_from_row,
            )
            .optional()?;
        Ok(sample)
    }

    fn trailing_window(&self, subject_id: &str, n: usize) -> Result<Vec<MetricSample>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SAMPLE_COLUMNS} FROM creator_metrics
             WHERE creator_id = ?1
             ORDER BY synced_at DESC, id DESC
             LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![subject_id, n as i64], sample_from_row)?;
        let mut samples = rows.collect::<Result<Vec<_>, _>>()?;
        samples.reverse();
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::SignalKind;
    use crate::store::seed_registry;
    use chrono::Duration;
    use tempfile::TempDir;

    fn subject(id: &str, base_score: f64) -> Subject {
        Subject {
            id: id.to_string(),
            name: format!("Creator {id}"),
            handle: format!("@{id}"),
            platforms: vec!["Twitter".to_string(), "YouTube".to_string()],
            base_score,
            avatar: None,
            category: "Gaming".to_string(),
            verified: true,
        }
    }

    fn sample(subject_id: &str, score: f64, ts: DateTime<Utc>) -> MetricSample {
        let mut synthetic = SyntheticMask::default();
        synthetic.set(SignalKind::Views);
        MetricSample {
            subject_id: subject_id.to_string(),
            metrics: Metrics {
                google_trends: 60.0,
                twitter_mentions: 400.0,
                reddit_posts: 20.0,
                youtube_views: 12_000.0,
            },
            reach_score: score,
            synthetic,
            timestamp: ts,
        }
    }

    #[test]
    fn test_register_is_insert_once() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.register_subject(&subject("cr1", 89.0)).unwrap());

        let mut changed = subject("cr1", 10.0);
        changed.name = "Renamed".to_string();
        assert!(!store.register_subject(&changed).unwrap());

        let stored = store.get_subject("cr1").unwrap().unwrap();
        assert_eq!(stored.name, "Creator cr1");
        assert_eq!(stored.base_score, 89.0);
        assert_eq!(stored.platforms, vec!["Twitter", "YouTube"]);
    }

    #[test]
    fn test_list_orders_by_base_score() {
        let store = SqliteStore::in_memory().unwrap();
        let seeded = seed_registry(
            &store,
            &[subject("a", 76.0), subject("b", 94.0), subject("c", 89.0)],
        )
        .unwrap();
        assert_eq!(seeded, 3);

        let ids: Vec<_> = store.list_subjects().unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_correct_subject() {
        let store = SqliteStore::in_memory().unwrap();
        store.register_subject(&subject("cr3", 76.0)).unwrap();
        assert!(store.correct_subject("cr3", "Viral", false).unwrap());
        assert!(!store.correct_subject("missing", "Viral", false).unwrap());

        let s = store.get_subject("cr3").unwrap().unwrap();
        assert_eq!(s.category, "Viral");
        assert!(!s.verified);
    }

    #[test]
    fn test_trailing_window_oldest_first() {
        let store = SqliteStore::in_memory().unwrap();
        store.register_subject(&subject("cr1", 89.0)).unwrap();

        let now = Utc::now();
        let batch: Vec<_> = (0..30)
            .map(|i| sample("cr1", i as f64, now - Duration::hours(30 - i)))
            .collect();
        store.append(&batch).unwrap();

        let window = store.trailing_window("cr1", 24).unwrap();
        assert_eq!(window.len(), 24);
        assert_eq!(window.first().unwrap().reach_score, 6.0);
        assert_eq!(window.last().unwrap().reach_score, 29.0);
        assert!(window.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

        let latest = store.latest("cr1").unwrap().unwrap();
        assert_eq!(latest.reach_score, 29.0);
        assert!(latest.synthetic.contains(SignalKind::Views));
        assert_eq!(store.count_samples().unwrap(), 30);
    }

    #[test]
    fn test_latest_for_unknown_subject() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.latest("nobody").unwrap().is_none());
        assert!(store.trailing_window("nobody", 24).unwrap().is_empty());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reach.db");
        let path = path.to_str().unwrap();

        {
            let store = SqliteStore::new(path).unwrap();
            store.register_subject(&subject("cr5", 93.0)).unwrap();
            store.append(&[sample("cr5", 71.5, Utc::now())]).unwrap();
        }

        let store = SqliteStore::new(path).unwrap();
        assert_eq!(store.list_subjects().unwrap().len(), 1);
        assert_eq!(store.latest("cr5").unwrap().unwrap().reach_score, 71.5);
    }
}
