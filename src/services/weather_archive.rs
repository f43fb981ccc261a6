use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, params, types::Value};

use crate::error::FetchError;
use crate::models::weather::{ForecastDocument, RawWeatherRecord};

/// Stored weather keyed by the installation's external object id.
#[async_trait]
pub trait ArchiveWeatherProvider: Send + Sync {
    async fn fetch(&self, object_id: i64, date: NaiveDate) -> Result<Vec<RawWeatherRecord>, FetchError>;
}

/// Turns one stored archive blob into records.
pub trait ArchiveDecoder: Send + Sync {
    fn decode(&self, blob: &[u8]) -> Result<Vec<RawWeatherRecord>, FetchError>;
}

/// Decodes blobs holding a weatherapi.com `forecast.json` document.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonArchiveDecoder;

impl ArchiveDecoder for JsonArchiveDecoder {
    fn decode(&self, blob: &[u8]) -> Result<Vec<RawWeatherRecord>, FetchError> {
        if blob.iter().all(u8::is_ascii_whitespace) {
            return Err(FetchError::new("archive_decode", "empty archive payload"));
        }
        let doc: ForecastDocument = serde_json::from_slice(blob)
            .map_err(|e| FetchError::new("archive_decode", format!("cannot decode archive payload: {e}")))?;
        doc.into_records("timeseries_parse")
    }
}

// ─── SQLite-backed archive ───────────────────────────────────────────────────

const ARCHIVE_QUERY: &str = "SELECT current_data FROM weather_data \
     WHERE user_object_id = ?1 AND date(date) = ?2 \
     ORDER BY date ASC LIMIT 1";

pub struct SqliteArchiveStore {
    conn: Arc<Mutex<Connection>>,
    decoder: Arc<dyn ArchiveDecoder>,
}

impl SqliteArchiveStore {
    pub fn open(path: impl AsRef<Path>, decoder: Arc<dyn ArchiveDecoder>) -> rusqlite::Result<Self> {
        Ok(Self::with_connection(Connection::open(path)?, decoder))
    }

    pub fn with_connection(conn: Connection, decoder: Arc<dyn ArchiveDecoder>) -> Self {
        Self { conn: Arc::new(Mutex::new(conn)), decoder }
    }

    fn load_blob(conn: &Mutex<Connection>, object_id: i64, date: NaiveDate) -> Result<Option<Vec<u8>>, FetchError> {
        let conn = conn
            .lock()
            .map_err(|_| FetchError::new("archive_query", "archive connection lock poisoned"))?;
        let day = date.format("%Y-%m-%d").to_string();
        let value = conn
            .query_row(ARCHIVE_QUERY, params![object_id, day], |row| row.get::<_, Value>(0))
            .optional()
            .map_err(|e| FetchError::new("archive_query", e.to_string()))?;
        // Archives written by other tools store the payload as TEXT or BLOB
        Ok(match value {
            Some(Value::Blob(bytes)) => Some(bytes),
            Some(Value::Text(text)) => Some(text.into_bytes()),
            _ => None,
        })
    }
}

#[async_trait]
impl ArchiveWeatherProvider for SqliteArchiveStore {
    async fn fetch(&self, object_id: i64, date: NaiveDate) -> Result<Vec<RawWeatherRecord>, FetchError> {
        let conn = Arc::clone(&self.conn);
        let decoder = Arc::clone(&self.decoder);
        tokio::task::spawn_blocking(move || match Self::load_blob(&conn, object_id, date)? {
            Some(blob) => decoder.decode(&blob),
            None => Ok(Vec::new()),
        })
        .await
        .map_err(|e| FetchError::new("archive_query", format!("archive task failed: {e}")))?
    }
}
