//! Month-partitioned forecast point store.
//!
//! Each calendar month lives in its own table `pv_forecast_points_YYYY_MM`,
//! registered with its `[start, end)` range in `pv_forecast_partitions`.
//! Writes into a month that was never ensured are refused.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{Datelike, Days, Months, NaiveDate, NaiveDateTime};
use rusqlite::{Connection, params, params_from_iter, types::Value};

use crate::error::StoreError;
use crate::models::forecast::{AvailableSummary, CacheStats, Coverage, ForecastRow, TopicSample};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const PARTITION_PREFIX: &str = "pv_forecast_points_";

/// Filters of the availability summary. All optional; `date_to` is exclusive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AvailableFilter {
    pub topic: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

pub trait ForecastCache: Send + Sync {
    /// Creates the partition registry. Idempotent.
    fn migrate(&self) -> Result<(), StoreError>;

    /// Creates every monthly partition touching `[start, end]`. Idempotent.
    fn ensure_partitions(&self, start: NaiveDateTime, end: NaiveDateTime) -> Result<(), StoreError>;

    /// Inserts or overwrites `(topic, ts)` rows; returns the number written.
    fn upsert(&self, rows: &[ForecastRow]) -> Result<usize, StoreError>;

    /// Rows with `start <= ts < end`, keyed by topic. Every requested topic is present.
    fn select(
        &self,
        topics: &[String],
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<BTreeMap<String, Vec<ForecastRow>>, StoreError>;

    /// Removes every row with `ts >= cutoff`; returns the number removed.
    fn delete_from(&self, cutoff: NaiveDateTime) -> Result<usize, StoreError>;

    fn available_summary(&self, filter: &AvailableFilter) -> Result<AvailableSummary, StoreError>;

    fn stats(&self) -> Result<CacheStats, StoreError>;

    /// Row count and time span per topic, in tag order, at most `limit` topics.
    fn topic_samples(&self, limit: usize) -> Result<Vec<TopicSample>, StoreError>;

    /// Row count and time span of one topic-day.
    fn coverage(&self, topic: &str, date: NaiveDate) -> Result<Coverage, StoreError>;

    fn ping(&self) -> Result<(), StoreError>;
}

// ─── Partition naming ────────────────────────────────────────────────────────

pub fn partition_name(year: i32, month: u32) -> String {
    format!("{PARTITION_PREFIX}{year:04}_{month:02}")
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.day0()))
}

fn format_ts(ts: NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

fn parse_ts(raw: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TS_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

/// `YYYY-MM-DD HH:MM:SS` -> `YYYY-MM-DD HH:MM`
fn minute_prefix(raw: String) -> String {
    raw.get(..16).map(str::to_string).unwrap_or(raw)
}

#[derive(Debug, Clone)]
struct Partition {
    name: String,
    start: String,
    end: String,
}

impl Partition {
    fn overlaps(&self, from: &str, to: &str) -> bool {
        self.start.as_str() < to && from < self.end.as_str()
    }
}

// ─── SQLite implementation ───────────────────────────────────────────────────

pub struct SqliteForecastCache {
    conn: Mutex<Connection>,
}

impl SqliteForecastCache {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            tracing::warn!("cannot create {}: {e}", parent.display());
        }
        Ok(Self { conn: Mutex::new(Connection::open(path)?) })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self { conn: Mutex::new(Connection::open_in_memory()?) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn partitions(conn: &Connection) -> Result<Vec<Partition>, StoreError> {
        let mut stmt = conn.prepare("SELECT name, range_start, range_end FROM pv_forecast_partitions ORDER BY range_start")?;
        let parts = stmt
            .query_map([], |row| Ok(Partition { name: row.get(0)?, start: row.get(1)?, end: row.get(2)? }))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parts)
    }

    fn create_partition(conn: &Connection, first: NaiveDate) -> Result<(), StoreError> {
        let name = partition_name(first.year(), first.month());
        let next = first + Months::new(1);
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {name} (
                topic      TEXT NOT NULL,
                ts         TEXT NOT NULL,
                power      REAL,
                source     TEXT NOT NULL,
                written_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (topic, ts)
            );"
        ))?;
        conn.execute(
            "INSERT OR IGNORE INTO pv_forecast_partitions (name, range_start, range_end) VALUES (?1, ?2, ?3)",
            params![name, format_ts(first.and_time(chrono::NaiveTime::MIN)), format_ts(next.and_time(chrono::NaiveTime::MIN))],
        )?;
        Ok(())
    }
}

impl ForecastCache for SqliteForecastCache {
    fn migrate(&self) -> Result<(), StoreError> {
        self.lock()?.execute_batch(
            "CREATE TABLE IF NOT EXISTS pv_forecast_partitions (
                name        TEXT PRIMARY KEY,
                range_start TEXT NOT NULL,
                range_end   TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    fn ensure_partitions(&self, start: NaiveDateTime, end: NaiveDateTime) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let mut cursor = month_start(start.date());
        while cursor <= end.date() {
            Self::create_partition(&conn, cursor)?;
            cursor = cursor + Months::new(1);
        }
        Ok(())
    }

    fn upsert(&self, rows: &[ForecastRow]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut conn = self.lock()?;
        let known: BTreeSet<String> = Self::partitions(&conn)?.into_iter().map(|p| p.name).collect();

        let tx = conn.transaction()?;
        for row in rows {
            let table = partition_name(row.ts.year(), row.ts.month());
            if !known.contains(&table) {
                return Err(StoreError::MissingPartition { ts: format_ts(row.ts) });
            }
            tx.execute(
                &format!(
                    "INSERT INTO {table} (topic, ts, power, source, written_at)
                     VALUES (?1, ?2, ?3, ?4, datetime('now'))
                     ON CONFLICT (topic, ts) DO UPDATE SET
                       power = excluded.power,
                       source = excluded.source,
                       written_at = excluded.written_at"
                ),
                params![row.topic, format_ts(row.ts), row.power, row.source],
            )?;
        }
        tx.commit()?;
        Ok(rows.len())
    }

    fn select(
        &self,
        topics: &[String],
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<BTreeMap<String, Vec<ForecastRow>>, StoreError> {
        let mut out: BTreeMap<String, Vec<ForecastRow>> = topics.iter().map(|t| (t.clone(), Vec::new())).collect();
        if topics.is_empty() {
            return Ok(out);
        }

        let conn = self.lock()?;
        let (from, to) = (format_ts(start), format_ts(end));
        let placeholders = vec!["?"; topics.len()].join(", ");

        // Partitions come back in month order, so per-topic rows stay time-sorted
        for part in Self::partitions(&conn)?.iter().filter(|p| p.overlaps(&from, &to)) {
            let sql = format!(
                "SELECT topic, ts, power, source FROM {} \
                 WHERE ts >= ? AND ts < ? AND topic IN ({placeholders}) \
                 ORDER BY topic, ts",
                part.name
            );
            let mut bind: Vec<Value> = vec![Value::Text(from.clone()), Value::Text(to.clone())];
            bind.extend(topics.iter().map(|t| Value::Text(t.clone())));

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(bind), |row| {
                Ok(ForecastRow {
                    topic: row.get(0)?,
                    ts: parse_ts(&row.get::<_, String>(1)?)?,
                    power: row.get(2)?,
                    source: row.get(3)?,
                })
            })?;
            for row in rows {
                let row = row?;
                out.entry(row.topic.clone()).or_default().push(row);
            }
        }
        Ok(out)
    }

    fn delete_from(&self, cutoff: NaiveDateTime) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let cutoff = format_ts(cutoff);
        let mut removed = 0;
        for part in Self::partitions(&conn)?.iter().filter(|p| p.end > cutoff) {
            removed += conn.execute(&format!("DELETE FROM {} WHERE ts >= ?1", part.name), params![cutoff])?;
        }
        Ok(removed)
    }

    fn available_summary(&self, filter: &AvailableFilter) -> Result<AvailableSummary, StoreError> {
        let conn = self.lock()?;
        let from = filter.date_from.map_or_else(|| "0000-01-01 00:00:00".to_string(), |d| format_ts(d.and_time(chrono::NaiveTime::MIN)));
        let to = filter.date_to.map_or_else(|| "9999-12-31 23:59:59".to_string(), |d| format_ts(d.and_time(chrono::NaiveTime::MIN)));

        let mut count = 0u64;
        let mut topics = BTreeSet::new();
        let mut dates = BTreeSet::new();
        for part in Self::partitions(&conn)?.iter().filter(|p| p.overlaps(&from, &to)) {
            let sql = format!(
                "SELECT topic, substr(ts, 1, 10), COUNT(*) FROM {} \
                 WHERE ts >= ?1 AND ts < ?2 AND (?3 IS NULL OR topic = ?3) \
                 GROUP BY topic, substr(ts, 1, 10)",
                part.name
            );
            let mut stmt = conn.prepare(&sql)?;
            let groups = stmt.query_map(params![from, to, filter.topic], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
            })?;
            for group in groups {
                let (topic, day, n) = group?;
                count += n.max(0) as u64;
                topics.insert(topic);
                dates.insert(day);
            }
        }

        Ok(AvailableSummary {
            count,
            topics: topics.into_iter().collect(),
            dates: dates.into_iter().collect(),
        })
    }

    fn stats(&self) -> Result<CacheStats, StoreError> {
        let conn = self.lock()?;
        let mut stats = CacheStats::default();
        let mut topics = BTreeSet::new();
        for part in Self::partitions(&conn)? {
            let (n, min, max): (i64, Option<String>, Option<String>) = conn.query_row(
                &format!("SELECT COUNT(*), MIN(ts), MAX(ts) FROM {}", part.name),
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
            stats.points_count += n.max(0) as u64;
            // Partitions are month-ordered: first non-empty min, last non-empty max
            if stats.min_ts.is_none() {
                stats.min_ts = min.map(minute_prefix);
            }
            if let Some(max) = max {
                stats.max_ts = Some(minute_prefix(max));
            }

            let mut stmt = conn.prepare(&format!("SELECT DISTINCT topic FROM {}", part.name))?;
            for topic in stmt.query_map([], |row| row.get::<_, String>(0))? {
                topics.insert(topic?);
            }
        }
        stats.topics_count = topics.len() as u64;
        Ok(stats)
    }

    fn topic_samples(&self, limit: usize) -> Result<Vec<TopicSample>, StoreError> {
        let conn = self.lock()?;
        let mut merged: BTreeMap<String, TopicSample> = BTreeMap::new();
        for part in Self::partitions(&conn)? {
            let mut stmt = conn.prepare(&format!(
                "SELECT topic, COUNT(*), MIN(ts), MAX(ts) FROM {} GROUP BY topic",
                part.name
            ))?;
            let groups = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, row.get::<_, String>(2)?, row.get::<_, String>(3)?))
            })?;
            for group in groups {
                let (topic, n, min, max) = group?;
                let entry = merged.entry(topic.clone()).or_insert_with(|| TopicSample { topic, ..TopicSample::default() });
                entry.points_count += n.max(0) as u64;
                // Month order: keep the first min, overwrite the max
                if entry.min_ts.is_none() {
                    entry.min_ts = Some(minute_prefix(min));
                }
                entry.max_ts = Some(minute_prefix(max));
            }
        }
        Ok(merged.into_values().take(limit).collect())
    }

    fn coverage(&self, topic: &str, date: NaiveDate) -> Result<Coverage, StoreError> {
        let conn = self.lock()?;
        let table = partition_name(date.year(), date.month());
        if !Self::partitions(&conn)?.iter().any(|p| p.name == table) {
            return Ok(Coverage::default());
        }
        let day = date.format("%Y-%m-%d").to_string();
        let (n, min, max): (i64, Option<String>, Option<String>) = conn.query_row(
            &format!("SELECT COUNT(*), MIN(ts), MAX(ts) FROM {table} WHERE topic = ?1 AND substr(ts, 1, 10) = ?2"),
            params![topic, day],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(Coverage {
            count: n.max(0) as u64,
            min_ts: min.map(minute_prefix),
            max_ts: max.map(minute_prefix),
        })
    }

    fn ping(&self) -> Result<(), StoreError> {
        self.lock()?.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::forecast::SOURCE_CACHE;

    fn ts(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, 0).unwrap()
    }

    fn row(topic: &str, at: NaiveDateTime, power: Option<f64>) -> ForecastRow {
        ForecastRow { topic: topic.to_string(), ts: at, power, source: "archive_db".to_string() }
    }

    fn cache() -> SqliteForecastCache {
        let c = SqliteForecastCache::open_in_memory().unwrap();
        c.migrate().unwrap();
        c
    }

    fn table_count(c: &SqliteForecastCache) -> i64 {
        c.lock()
            .unwrap()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name LIKE 'pv_forecast_points_%'",
                [],
                |r| r.get(0),
            )
            .unwrap()
    }

    #[test]
    fn partition_names_are_zero_padded() {
        assert_eq!(partition_name(2024, 1), "pv_forecast_points_2024_01");
        assert_eq!(partition_name(2024, 12), "pv_forecast_points_2024_12");
    }

    #[test]
    fn ensure_partitions_spans_months_and_is_idempotent() {
        let c = cache();
        c.ensure_partitions(ts(2023, 12, 31, 0, 0), ts(2024, 2, 1, 0, 0)).unwrap();
        c.ensure_partitions(ts(2024, 1, 15, 0, 0), ts(2024, 1, 16, 0, 0)).unwrap();
        assert_eq!(table_count(&c), 3);
    }

    #[test]
    fn repeated_upserts_keep_one_row_with_latest_value() {
        let c = cache();
        let at = ts(2024, 1, 1, 12, 0);
        c.ensure_partitions(at, at).unwrap();
        for power in [100.0, 200.0, 300.0] {
            c.upsert(&[row("T1", at, Some(power))]).unwrap();
        }

        let out = c.select(&["T1".to_string()], ts(2024, 1, 1, 0, 0), ts(2024, 1, 2, 0, 0)).unwrap();
        assert_eq!(out["T1"].len(), 1);
        assert_eq!(out["T1"][0].power, Some(300.0));
    }

    #[test]
    fn upsert_refreshes_written_at() {
        let c = cache();
        let at = ts(2024, 1, 1, 12, 0);
        c.ensure_partitions(at, at).unwrap();
        c.upsert(&[row("T1", at, Some(1.0))]).unwrap();

        let written_at = |c: &SqliteForecastCache| -> String {
            c.lock()
                .unwrap()
                .query_row("SELECT written_at FROM pv_forecast_points_2024_01 WHERE topic = 'T1'", [], |r| r.get(0))
                .unwrap()
        };
        c.lock()
            .unwrap()
            .execute("UPDATE pv_forecast_points_2024_01 SET written_at = '2000-01-01 00:00:00'", [])
            .unwrap();
        assert_eq!(written_at(&c), "2000-01-01 00:00:00");

        c.upsert(&[row("T1", at, Some(2.0))]).unwrap();
        assert!(written_at(&c).as_str() > "2000-01-01 00:00:00");
    }

    #[test]
    fn topic_samples_merge_months_and_respect_limit() {
        let c = cache();
        c.ensure_partitions(ts(2024, 1, 1, 0, 0), ts(2024, 2, 1, 0, 0)).unwrap();
        c.upsert(&[
            row("B", ts(2024, 1, 5, 6, 0), Some(1.0)),
            row("A", ts(2024, 1, 31, 23, 45), Some(1.0)),
            row("A", ts(2024, 2, 1, 0, 15), None),
            row("A", ts(2024, 1, 2, 6, 0), Some(1.0)),
        ])
        .unwrap();

        let all = c.topic_samples(50).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(
            all[0],
            TopicSample {
                topic: "A".into(),
                points_count: 3,
                min_ts: Some("2024-01-02 06:00".into()),
                max_ts: Some("2024-02-01 00:15".into()),
            }
        );
        assert_eq!(all[1].points_count, 1);

        let first = c.topic_samples(1).unwrap();
        assert_eq!(first.iter().map(|t| t.topic.as_str()).collect::<Vec<_>>(), vec!["A"]);
    }

    #[test]
    fn upsert_into_unknown_month_is_refused() {
        let c = cache();
        let err = c.upsert(&[row("T1", ts(2024, 5, 1, 0, 0), Some(1.0))]).unwrap_err();
        assert!(matches!(err, StoreError::MissingPartition { .. }));
    }

    #[test]
    fn select_is_half_open_sorted_and_keeps_empty_topics() {
        let c = cache();
        c.ensure_partitions(ts(2024, 1, 31, 0, 0), ts(2024, 2, 1, 0, 0)).unwrap();
        c.upsert(&[
            row("B", ts(2024, 2, 1, 0, 15), Some(2.0)),
            row("A", ts(2024, 2, 1, 0, 0), None),
            row("A", ts(2024, 1, 31, 23, 45), Some(1.0)),
            row("A", ts(2024, 2, 1, 1, 0), Some(9.0)),
        ])
        .unwrap();

        let topics = vec!["B".to_string(), "A".to_string(), "EMPTY".to_string()];
        let out = c.select(&topics, ts(2024, 1, 31, 23, 45), ts(2024, 2, 1, 1, 0)).unwrap();

        let a: Vec<NaiveDateTime> = out["A"].iter().map(|r| r.ts).collect();
        assert_eq!(a, vec![ts(2024, 1, 31, 23, 45), ts(2024, 2, 1, 0, 0)]);
        assert_eq!(out["A"][1].power, None);
        assert_eq!(out["B"].len(), 1);
        assert!(out["EMPTY"].is_empty());
        assert_eq!(out.keys().cloned().collect::<Vec<_>>(), vec!["A", "B", "EMPTY"]);
    }

    #[test]
    fn delete_from_drops_future_rows_only() {
        let c = cache();
        c.ensure_partitions(ts(2024, 1, 1, 0, 0), ts(2024, 2, 28, 0, 0)).unwrap();
        c.upsert(&[
            row("T1", ts(2024, 1, 10, 12, 0), Some(1.0)),
            row("T1", ts(2024, 1, 20, 12, 0), Some(1.0)),
            row("T1", ts(2024, 2, 5, 12, 0), Some(1.0)),
        ])
        .unwrap();

        assert_eq!(c.delete_from(ts(2024, 1, 20, 0, 0)).unwrap(), 2);
        assert_eq!(c.stats().unwrap().points_count, 1);
    }

    #[test]
    fn summary_applies_filters() {
        let c = cache();
        c.ensure_partitions(ts(2024, 1, 1, 0, 0), ts(2024, 1, 3, 0, 0)).unwrap();
        c.upsert(&[
            row("T1", ts(2024, 1, 1, 12, 0), Some(1.0)),
            row("T1", ts(2024, 1, 2, 12, 0), Some(1.0)),
            row("T2", ts(2024, 1, 2, 13, 0), Some(1.0)),
        ])
        .unwrap();

        let all = c.available_summary(&AvailableFilter::default()).unwrap();
        assert_eq!(all.count, 3);
        assert_eq!(all.topics, vec!["T1", "T2"]);
        assert_eq!(all.dates, vec!["2024-01-01", "2024-01-02"]);

        let filtered = c
            .available_summary(&AvailableFilter {
                topic: Some("T1".to_string()),
                date_from: NaiveDate::from_ymd_opt(2024, 1, 2),
                date_to: NaiveDate::from_ymd_opt(2024, 1, 3),
            })
            .unwrap();
        assert_eq!(filtered.count, 1);
        assert_eq!(filtered.dates, vec!["2024-01-02"]);
    }

    #[test]
    fn stats_and_coverage() {
        let c = cache();
        assert_eq!(c.stats().unwrap(), CacheStats::default());

        c.ensure_partitions(ts(2024, 1, 1, 0, 0), ts(2024, 2, 1, 0, 0)).unwrap();
        c.upsert(&[
            row("T1", ts(2024, 1, 1, 6, 0), Some(1.0)),
            row("T1", ts(2024, 1, 1, 6, 15), Some(1.0)),
            ForecastRow { source: SOURCE_CACHE.to_string(), ..row("T2", ts(2024, 2, 1, 0, 0), None) },
        ])
        .unwrap();

        let stats = c.stats().unwrap();
        assert_eq!(stats.points_count, 3);
        assert_eq!(stats.topics_count, 2);
        assert_eq!(stats.min_ts.as_deref(), Some("2024-01-01 06:00"));
        assert_eq!(stats.max_ts.as_deref(), Some("2024-02-01 00:00"));

        let cov = c.coverage("T1", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()).unwrap();
        assert_eq!(cov.count, 2);
        assert_eq!(cov.max_ts.as_deref(), Some("2024-01-01 06:15"));
        assert_eq!(c.coverage("T1", NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()).unwrap(), Coverage::default());
    }

    #[test]
    fn ping_and_missing_registry() {
        let c = SqliteForecastCache::open_in_memory().unwrap();
        assert!(c.ping().is_ok());
        assert!(matches!(c.stats(), Err(StoreError::Sqlite(_))));
    }

    #[test]
    fn file_backed_cache_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("forecast.db");
        let path = path.to_str().unwrap();
        let at = ts(2024, 3, 1, 12, 0);
        {
            let c = SqliteForecastCache::open(path).unwrap();
            c.migrate().unwrap();
            c.ensure_partitions(at, at).unwrap();
            c.upsert(&[row("T1", at, Some(5.0))]).unwrap();
        }
        let c = SqliteForecastCache::open(path).unwrap();
        c.migrate().unwrap();
        assert_eq!(c.stats().unwrap().points_count, 1);
    }
}
