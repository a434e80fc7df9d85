//! Embedded document store.
//!
//! SQLite-backed persistence for enriched records, keyed by document id.
//! Writes are upsert-merges: re-analyzing a document replaces its verdict
//! fields in place, while optional contextual fields never regress from a
//! value back to NULL.

use std::path::Path;
use std::sync::Mutex;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, error, info};

use crate::error::StoreError;
use crate::types::{EnrichedRecord, SourceType};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    id                TEXT PRIMARY KEY,
    title             TEXT NOT NULL,
    summary           TEXT NOT NULL,
    published         TEXT,
    authors           TEXT NOT NULL,
    source            TEXT NOT NULL,
    trl               INTEGER NOT NULL,
    strategic_summary TEXT NOT NULL,
    technologies      TEXT NOT NULL,
    key_relationships TEXT NOT NULL,
    country           TEXT,
    provider_company  TEXT,
    funding_details   TEXT,
    updated_at        TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_documents_published ON documents(published);
";

/// Outcome of a batch upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertStats {
    pub inserted: usize,
    pub updated: usize,
    /// Records that failed to encode or write and were skipped.
    pub failed: usize,
}

/// Handle to the documents database.
///
/// The connection sits behind a mutex so the store can be shared across
/// tasks; batch operations hold the lock for their whole transaction.
pub struct DocumentStore {
    conn: Mutex<Connection>,
}

impl DocumentStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::OpenFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        }
        let conn = Connection::open(path).map_err(|e| StoreError::OpenFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::init(conn)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Upsert a batch of records in one transaction.
    ///
    /// A record that fails to encode or write is logged and skipped; the
    /// rest of the batch still lands.
    pub fn upsert_batch(&self, records: &[EnrichedRecord]) -> Result<UpsertStats, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let mut stats = UpsertStats::default();

        for record in records {
            match upsert_one(&tx, record) {
                Ok(true) => stats.inserted += 1,
                Ok(false) => stats.updated += 1,
                Err(e) => {
                    error!(id = %record.id, error = %e, "Failed to store record");
                    stats.failed += 1;
                }
            }
        }

        tx.commit()?;
        info!(
            inserted = stats.inserted,
            updated = stats.updated,
            failed = stats.failed,
            "Upsert batch committed"
        );
        Ok(stats)
    }

    /// Every stored record, in insertion order.
    pub fn all_records(&self) -> Result<Vec<EnrichedRecord>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, title, summary, published, authors, source, trl, strategic_summary,
                    technologies, key_relationships, country, provider_company, funding_details
             FROM documents ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], row_to_record)?;
        collect_rows(rows)
    }

    /// Records whose title, summary, or technologies mention `topic`,
    /// newest first.
    pub fn search(&self, topic: &str, limit: usize) -> Result<Vec<EnrichedRecord>, StoreError> {
        let pattern = format!("%{}%", topic.trim());
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, title, summary, published, authors, source, trl, strategic_summary,
                    technologies, key_relationships, country, provider_company, funding_details
             FROM documents
             WHERE title LIKE ?1 OR summary LIKE ?1 OR technologies LIKE ?1
             ORDER BY published DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![pattern, limit as i64], row_to_record)?;
        let records = collect_rows(rows)?;
        debug!(topic, hits = records.len(), "Store search");
        Ok(records)
    }

    /// Number of stored records.
    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

/// Returns `Ok(true)` on insert, `Ok(false)` on update of an existing row.
fn upsert_one(conn: &Connection, record: &EnrichedRecord) -> Result<bool, StoreError> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM documents WHERE id = ?1",
            params![record.id],
            |row| row.get(0),
        )
        .optional()?;
    let is_insert = existing.is_none();

    let authors = encode_json(&record.authors)?;
    let technologies = encode_json(&record.technologies)?;
    let key_relationships = encode_json(&record.key_relationships)?;
    let published = record.published.map(|d| d.format("%Y-%m-%d").to_string());
    let updated_at = chrono::Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO documents
            (id, title, summary, published, authors, source, trl, strategic_summary,
             technologies, key_relationships, country, provider_company, funding_details, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
         ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            summary = excluded.summary,
            published = COALESCE(excluded.published, documents.published),
            authors = excluded.authors,
            source = excluded.source,
            trl = excluded.trl,
            strategic_summary = excluded.strategic_summary,
            technologies = excluded.technologies,
            key_relationships = excluded.key_relationships,
            country = COALESCE(excluded.country, documents.country),
            provider_company = COALESCE(excluded.provider_company, documents.provider_company),
            funding_details = COALESCE(excluded.funding_details, documents.funding_details),
            updated_at = excluded.updated_at",
        params![
            record.id,
            record.title,
            record.summary,
            published,
            authors,
            record.source.as_str(),
            record.technology_readiness_level as i64,
            record.strategic_summary,
            technologies,
            key_relationships,
            record.country,
            record.provider_company,
            record.funding_details,
            updated_at,
        ],
    )?;

    Ok(is_insert)
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Encoding {
        message: e.to_string(),
    })
}

fn decode_json<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, StoreError> {
    serde_json::from_str(text).map_err(|e| StoreError::Encoding {
        message: e.to_string(),
    })
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        title: row.get(1)?,
        summary: row.get(2)?,
        published: row.get(3)?,
        authors: row.get(4)?,
        source: row.get(5)?,
        trl: row.get(6)?,
        strategic_summary: row.get(7)?,
        technologies: row.get(8)?,
        key_relationships: row.get(9)?,
        country: row.get(10)?,
        provider_company: row.get(11)?,
        funding_details: row.get(12)?,
    })
}

/// Column values before JSON decoding, so decode errors can carry the
/// store's own error type instead of rusqlite's.
struct RawRow {
    id: String,
    title: String,
    summary: String,
    published: Option<String>,
    authors: String,
    source: String,
    trl: i64,
    strategic_summary: String,
    technologies: String,
    key_relationships: String,
    country: Option<String>,
    provider_company: Option<String>,
    funding_details: Option<String>,
}

impl RawRow {
    fn into_record(self) -> Result<EnrichedRecord, StoreError> {
        Ok(EnrichedRecord {
            id: self.id,
            title: self.title,
            summary: self.summary,
            published: self
                .published
                .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
            authors: decode_json(&self.authors)?,
            source: SourceType::from_str_loose(&self.source),
            technology_readiness_level: self.trl.clamp(0, 9) as u8,
            strategic_summary: self.strategic_summary,
            technologies: decode_json(&self.technologies)?,
            key_relationships: decode_json(&self.key_relationships)?,
            country: self.country,
            provider_company: self.provider_company,
            funding_details: self.funding_details,
        })
    }
}

fn collect_rows(
    rows: impl Iterator<Item = rusqlite::Result<RawRow>>,
) -> Result<Vec<EnrichedRecord>, StoreError> {
    let mut records = Vec::new();
    for row in rows {
        records.push(row?.into_record()?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KeyRelationship;
    use pretty_assertions::assert_eq;

    fn record(id: &str, trl: u8) -> EnrichedRecord {
        EnrichedRecord {
            id: id.to_string(),
            title: format!("Paper {id}"),
            summary: "A sufficiently long abstract about the subject.".to_string(),
            published: NaiveDate::from_ymd_opt(2022, 3, 15),
            authors: vec!["A. Researcher".to_string()],
            source: SourceType::AcademicPaper,
            technology_readiness_level: trl,
            strategic_summary: "Significant.".to_string(),
            technologies: vec!["photonics".to_string()],
            key_relationships: vec![KeyRelationship {
                subject: "Lab".to_string(),
                relationship: "develops".to_string(),
                object: "photonics".to_string(),
            }],
            country: Some("DE".to_string()),
            provider_company: None,
            funding_details: None,
        }
    }

    #[test]
    fn test_insert_then_read_back() {
        let store = DocumentStore::open_in_memory().unwrap();
        let stats = store.upsert_batch(&[record("a", 4), record("b", 6)]).unwrap();
        assert_eq!(stats, UpsertStats { inserted: 2, updated: 0, failed: 0 });

        let all = store.all_records().unwrap();
        assert_eq!(all.len(), 2);
        let a = &all[0];
        assert_eq!(a.id, "a");
        assert_eq!(a.technology_readiness_level, 4);
        assert_eq!(a.technologies, vec!["photonics"]);
        assert_eq!(a.key_relationships[0].relationship, "develops");
        assert_eq!(a.published, NaiveDate::from_ymd_opt(2022, 3, 15));
        assert_eq!(a.country.as_deref(), Some("DE"));
    }

    #[test]
    fn test_upsert_replaces_verdict() {
        let store = DocumentStore::open_in_memory().unwrap();
        store.upsert_batch(&[record("a", 4)]).unwrap();

        let mut revised = record("a", 7);
        revised.strategic_summary = "Matured considerably.".to_string();
        revised.technologies = vec!["photonics".to_string(), "lasers".to_string()];
        let stats = store.upsert_batch(&[revised]).unwrap();
        assert_eq!(stats, UpsertStats { inserted: 0, updated: 1, failed: 0 });

        let all = store.all_records().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].technology_readiness_level, 7);
        assert_eq!(all[0].strategic_summary, "Matured considerably.");
        assert_eq!(all[0].technologies.len(), 2);
    }

    #[test]
    fn test_upsert_preserves_optional_fields_on_null() {
        let store = DocumentStore::open_in_memory().unwrap();
        store.upsert_batch(&[record("a", 4)]).unwrap();

        // New verdict lacks the country; the stored value must survive.
        let mut revised = record("a", 5);
        revised.country = None;
        store.upsert_batch(&[revised]).unwrap();

        let all = store.all_records().unwrap();
        assert_eq!(all[0].country.as_deref(), Some("DE"));
        assert_eq!(all[0].technology_readiness_level, 5);
    }

    #[test]
    fn test_optional_field_can_be_set_later() {
        let store = DocumentStore::open_in_memory().unwrap();
        let mut first = record("a", 4);
        first.provider_company = None;
        store.upsert_batch(&[first]).unwrap();

        let mut revised = record("a", 4);
        revised.provider_company = Some("Acme Photonics".to_string());
        store.upsert_batch(&[revised]).unwrap();

        let all = store.all_records().unwrap();
        assert_eq!(all[0].provider_company.as_deref(), Some("Acme Photonics"));
    }

    #[test]
    fn test_search_matches_title_and_technologies() {
        let store = DocumentStore::open_in_memory().unwrap();
        let mut other = record("b", 3);
        other.title = "Unrelated work".to_string();
        other.summary = "Nothing to see.".to_string();
        other.technologies = vec!["agriculture".to_string()];
        store.upsert_batch(&[record("a", 4), other]).unwrap();

        let hits = store.search("photonics", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");

        let misses = store.search("blockchain", 10).unwrap();
        assert!(misses.is_empty());
    }

    #[test]
    fn test_search_limit() {
        let store = DocumentStore::open_in_memory().unwrap();
        let records: Vec<_> = (0..5).map(|i| record(&format!("r{i}"), 4)).collect();
        store.upsert_batch(&records).unwrap();
        assert_eq!(store.search("photonics", 2).unwrap().len(), 2);
        assert_eq!(store.count().unwrap(), 5);
    }

    #[test]
    fn test_missing_published_round_trips_as_none() {
        let store = DocumentStore::open_in_memory().unwrap();
        let mut r = record("a", 4);
        r.published = None;
        store.upsert_batch(&[r]).unwrap();
        assert_eq!(store.all_records().unwrap()[0].published, None);
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("documents.db");
        let store = DocumentStore::open(&path).unwrap();
        store.upsert_batch(&[record("a", 4)]).unwrap();
        drop(store);

        let reopened = DocumentStore::open(&path).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
    }
}
