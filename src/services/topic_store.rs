use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::StoreError;
use crate::models::topic::TopicSpec;

/// Read-only access to installation specs.
pub trait TopicStore: Send + Sync {
    fn get(&self, tag: &str) -> Result<Option<TopicSpec>, StoreError>;

    /// Specs ordered by tag. `filter` is a case-insensitive substring of the tag.
    fn list(&self, filter: Option<&str>, limit: usize) -> Result<Vec<TopicSpec>, StoreError>;
}

// ─── Config-backed ───────────────────────────────────────────────────────────

/// Topics declared in the `topics` section of the config file.
#[derive(Debug, Clone, Default)]
pub struct StaticTopicStore {
    specs: BTreeMap<String, TopicSpec>,
}

impl StaticTopicStore {
    pub fn new(specs: impl IntoIterator<Item = TopicSpec>) -> Self {
        Self {
            specs: specs
                .into_iter()
                .map(|mut s| {
                    s.total_panels = s.total_panels.max(1);
                    (s.tag.clone(), s)
                })
                .collect(),
        }
    }
}

impl TopicStore for StaticTopicStore {
    fn get(&self, tag: &str) -> Result<Option<TopicSpec>, StoreError> {
        Ok(self.specs.get(tag).cloned())
    }

    fn list(&self, filter: Option<&str>, limit: usize) -> Result<Vec<TopicSpec>, StoreError> {
        let needle = filter.map(str::to_lowercase);
        Ok(self
            .specs
            .values()
            .filter(|s| needle.as_deref().is_none_or(|n| s.tag.to_lowercase().contains(n)))
            .take(limit)
            .cloned()
            .collect())
    }
}

// ─── SQLite-backed ───────────────────────────────────────────────────────────

const SPEC_COLUMNS: &str = "tag, sm_user_object_id, latitude, longitude, tilt, azimuth, \
     module_length, module_width, module_efficiency, total_panels, \
     commissioning_date, degradation_rate, model_name";

/// Reads the `tag_specification` table.
pub struct SqliteTopicStore {
    conn: Mutex<Connection>,
}

impl SqliteTopicStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self::with_connection(Connection::open(path)?))
    }

    pub fn with_connection(conn: Connection) -> Self {
        Self { conn: Mutex::new(conn) }
    }

    fn spec_from_row(row: &Row<'_>) -> rusqlite::Result<TopicSpec> {
        let mut spec = TopicSpec::new(row.get::<_, String>(0)?);
        spec.user_object_id = row.get(1)?;
        spec.latitude = row.get(2)?;
        spec.longitude = row.get(3)?;
        if let Some(v) = row.get::<_, Option<f64>>(4)? {
            spec.tilt = v;
        }
        if let Some(v) = row.get::<_, Option<f64>>(5)? {
            spec.azimuth = v;
        }
        if let Some(v) = row.get::<_, Option<f64>>(6)?.filter(|v| *v > 0.0) {
            spec.module_length = v;
        }
        if let Some(v) = row.get::<_, Option<f64>>(7)?.filter(|v| *v > 0.0) {
            spec.module_width = v;
        }
        if let Some(v) = row.get::<_, Option<f64>>(8)?.filter(|v| *v > 0.0) {
            spec.module_efficiency = v;
        }
        spec.total_panels = row.get::<_, Option<i64>>(9)?.map_or(1, |n| n.clamp(1, i64::from(u32::MAX)) as u32);
        // Stored as TEXT; either a bare date or a timestamp
        spec.commissioning_date = row
            .get::<_, Option<String>>(10)?
            .and_then(|raw| NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d").ok());
        spec.degradation_rate = row.get::<_, Option<f64>>(11)?.unwrap_or(0.0);
        spec.model_name = row.get(12)?;
        Ok(spec)
    }
}

impl TopicStore for SqliteTopicStore {
    fn get(&self, tag: &str) -> Result<Option<TopicSpec>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let sql = format!("SELECT {SPEC_COLUMNS} FROM tag_specification WHERE tag = ?1 LIMIT 1");
        Ok(conn.query_row(&sql, params![tag], Self::spec_from_row).optional()?)
    }

    fn list(&self, filter: Option<&str>, limit: usize) -> Result<Vec<TopicSpec>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let sql = format!(
            "SELECT {SPEC_COLUMNS} FROM tag_specification \
             WHERE tag IS NOT NULL AND (?1 IS NULL OR lower(tag) LIKE '%' || lower(?1) || '%') \
             ORDER BY tag LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let specs = stmt
            .query_map(params![filter, limit], Self::spec_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(specs)
    }
}
