//! Recording metadata persistence.
//!
//! Every finished recording becomes a `MetadataRecord`, written twice:
//! a human-readable JSON file next to the videos, and a complete row
//! in a SQLite database that also carries the append-only index with
//! its running aggregates. The two encodings are written together but
//! never reconciled afterwards; SQLite is the lookup path and the JSON
//! file is the fallback.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// Fixed encoding parameters of one recording.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RecordingParams {
    pub fps: f64,
    pub codec: String,
    pub container: String,
}

/// Finalized description of one completed recording.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MetadataRecord {
    /// Output filename (full path as recorded).
    pub filename: String,
    /// ISO-8601 session start, absent when bookkeeping never started.
    pub start_time: Option<String>,
    /// ISO-8601 session end.
    pub end_time: String,
    /// Recorded wall-clock duration in seconds.
    pub duration: f64,
    /// "camera" or "video".
    pub input_type: String,
    /// Source description snapshot taken at stop time.
    pub source_info: serde_json::Value,
    pub recording_params: RecordingParams,
}

/// One line of the recording index.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    pub filename: String,
    pub timestamp: String,
    pub duration: f64,
    pub resolution: String,
    pub fps: f64,
}

/// Append-only summary of all persisted records.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RecordingIndex {
    pub recordings: Vec<IndexEntry>,
    pub total_count: u64,
    pub total_duration: f64,
}

pub struct MetadataStore {
    base_dir: PathBuf,
    video_dir: PathBuf,
    metadata_dir: PathBuf,
    conn: Connection,
}

impl MetadataStore {
    /// Open the store rooted at `base_dir`, creating the directory
    /// layout and database schema as needed.
    pub fn open(base_dir: &Path) -> Result<Self> {
        let video_dir = base_dir.join("videos");
        let metadata_dir = base_dir.join("metadata");
        for dir in [base_dir, &video_dir, &metadata_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create data directory {}", dir.display()))?;
        }
        let conn = Connection::open(base_dir.join("recordings.db"))?;
        let mut store = Self {
            base_dir: base_dir.to_path_buf(),
            video_dir,
            metadata_dir,
            conn,
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS recordings (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              filename TEXT NOT NULL,
              base_name TEXT NOT NULL,
              created_at TEXT NOT NULL,
              duration REAL NOT NULL,
              resolution TEXT NOT NULL,
              fps REAL NOT NULL,
              payload_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_recordings_base ON recordings(base_name);
            "#,
        )?;
        Ok(())
    }

    /// Timestamp-based output path under the videos directory.
    ///
    /// Resolution is one second: two calls within the same second
    /// produce the same name. Callers needing faster turnaround must
    /// vary the prefix.
    pub fn generate_filename(&self, prefix: &str, container: &str) -> PathBuf {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        self.video_dir
            .join(format!("{}_{}.{}", prefix, stamp, container))
    }

    /// Persist a record in both encodings and append it to the index.
    pub fn save_metadata(&mut self, record: &MetadataRecord) -> Result<()> {
        let base = base_stem(&record.filename)?;
        let video_name = file_name(&record.filename)?;

        let json = serde_json::to_string_pretty(record)?;
        let json_path = self.metadata_dir.join(format!("{}.json", base));
        std::fs::write(&json_path, &json)
            .with_context(|| format!("write metadata file {}", json_path.display()))?;

        let timestamp = record
            .start_time
            .clone()
            .unwrap_or_else(|| record.end_time.clone());
        let resolution = record.source_info["resolution"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        self.conn.execute(
            r#"
            INSERT INTO recordings(filename, base_name, created_at, duration, resolution, fps, payload_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                video_name,
                base,
                timestamp,
                record.duration,
                resolution,
                record.recording_params.fps,
                json,
            ],
        )?;

        // Keep the human-readable index mirror current.
        let index = self.index()?;
        let index_path = self.base_dir.join("index.json");
        std::fs::write(&index_path, serde_json::to_string_pretty(&index)?)
            .with_context(|| format!("write index file {}", index_path.display()))?;
        Ok(())
    }

    /// The full index in insertion order, with running aggregates.
    pub fn index(&self) -> Result<RecordingIndex> {
        let mut stmt = self.conn.prepare(
            "SELECT filename, created_at, duration, resolution, fps FROM recordings ORDER BY id ASC",
        )?;
        let mut rows = stmt.query([])?;
        let mut index = RecordingIndex::default();
        while let Some(row) = rows.next()? {
            let entry = IndexEntry {
                filename: row.get(0)?,
                timestamp: row.get(1)?,
                duration: row.get(2)?,
                resolution: row.get(3)?,
                fps: row.get(4)?,
            };
            index.total_count += 1;
            index.total_duration += entry.duration;
            index.recordings.push(entry);
        }
        Ok(index)
    }

    /// Index entries in insertion order.
    pub fn get_recording_history(&self) -> Result<Vec<IndexEntry>> {
        Ok(self.index()?.recordings)
    }

    /// Look up a full record by (base) filename; latest entry wins
    /// when same-second collisions produced duplicates.
    pub fn load_metadata(&self, filename: &str) -> Result<Option<MetadataRecord>> {
        let base = base_stem(filename)?;
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload_json FROM recordings WHERE base_name = ?1 ORDER BY id DESC LIMIT 1",
                params![base],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(payload) = payload {
            return Ok(Some(serde_json::from_str(&payload)?));
        }

        let json_path = self.metadata_dir.join(format!("{}.json", base));
        if json_path.exists() {
            let raw = std::fs::read_to_string(&json_path)?;
            return Ok(Some(serde_json::from_str(&raw)?));
        }
        Ok(None)
    }

    /// Write every stored record as one JSON array; returns the count.
    pub fn export_records(&self, output: &Path) -> Result<usize> {
        let mut stmt = self
            .conn
            .prepare("SELECT payload_json FROM recordings ORDER BY id ASC")?;
        let mut rows = stmt.query([])?;
        let mut records: Vec<serde_json::Value> = Vec::new();
        while let Some(row) = rows.next()? {
            let payload: String = row.get(0)?;
            records.push(serde_json::from_str(&payload)?);
        }
        std::fs::write(output, serde_json::to_string_pretty(&records)?)
            .with_context(|| format!("write export file {}", output.display()))?;
        Ok(records.len())
    }

    pub fn video_dir(&self) -> &Path {
        &self.video_dir
    }

    pub fn metadata_dir(&self) -> &Path {
        &self.metadata_dir
    }
}

fn base_stem(filename: &str) -> Result<String> {
    Path::new(filename)
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| anyhow!("metadata record has no usable filename: {:?}", filename))
}

fn file_name(filename: &str) -> Result<String> {
    Path::new(filename)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| anyhow!("metadata record has no usable filename: {:?}", filename))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_record(filename: &str, duration: f64) -> MetadataRecord {
        MetadataRecord {
            filename: filename.to_string(),
            start_time: Some("2026-08-08T10:00:00+00:00".to_string()),
            end_time: "2026-08-08T10:00:02+00:00".to_string(),
            duration,
            input_type: "camera".to_string(),
            source_info: json!({
                "type": "camera",
                "device": "stub://cam",
                "resolution": "1280x720",
                "fps": 30,
            }),
            recording_params: RecordingParams {
                fps: 30.0,
                codec: "mp4v".to_string(),
                container: "mp4".to_string(),
            },
        }
    }

    #[test]
    fn metadata_round_trips_through_the_store() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut store = MetadataStore::open(dir.path())?;

        let record = sample_record("/data/videos/recording_20260808_100000.mp4", 2.0);
        store.save_metadata(&record)?;

        let loaded = store
            .load_metadata("recording_20260808_100000.mp4")?
            .expect("record exists");
        assert_eq!(loaded, record);
        Ok(())
    }

    #[test]
    fn json_fallback_when_database_row_is_missing() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut store = MetadataStore::open(dir.path())?;
        let record = sample_record("/data/videos/clip.mp4", 1.5);
        store.save_metadata(&record)?;

        // Simulate a lost database row; the JSON twin still answers.
        store.conn.execute("DELETE FROM recordings", [])?;
        let loaded = store.load_metadata("clip.mp4")?.expect("json fallback");
        assert_eq!(loaded, record);
        Ok(())
    }

    #[test]
    fn index_appends_in_order_and_tracks_aggregates() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut store = MetadataStore::open(dir.path())?;
        store.save_metadata(&sample_record("/videos/a.mp4", 1.0))?;
        store.save_metadata(&sample_record("/videos/b.mp4", 2.5))?;
        store.save_metadata(&sample_record("/videos/c.mp4", 0.5))?;

        let index = store.index()?;
        assert_eq!(index.total_count, 3);
        assert!((index.total_duration - 4.0).abs() < 1e-9);
        let names: Vec<_> = index.recordings.iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(names, ["a.mp4", "b.mp4", "c.mp4"]);
        assert_eq!(index.recordings[0].resolution, "1280x720");

        // The human-readable mirror exists and parses.
        let raw = std::fs::read_to_string(dir.path().join("index.json"))?;
        let mirrored: RecordingIndex = serde_json::from_str(&raw)?;
        assert_eq!(mirrored.total_count, 3);
        Ok(())
    }

    #[test]
    fn generated_filenames_carry_prefix_and_container() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::open(dir.path()).unwrap();
        let path = store.generate_filename("recording", "mp4");
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("recording_"));
        assert!(name.ends_with(".mp4"));
        // prefix + "_" + YYYYmmdd_HHMMSS + ".mp4"
        assert_eq!(name.len(), "recording_".len() + 15 + ".mp4".len());
        assert!(path.starts_with(store.video_dir()));
    }

    #[test]
    fn missing_records_load_as_none() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = MetadataStore::open(dir.path())?;
        assert!(store.load_metadata("nothing.mp4")?.is_none());
        Ok(())
    }

    #[test]
    fn export_writes_all_records_as_one_array() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut store = MetadataStore::open(dir.path())?;
        store.save_metadata(&sample_record("/videos/a.mp4", 1.0))?;
        store.save_metadata(&sample_record("/videos/b.mp4", 2.0))?;

        let out = dir.path().join("export.json");
        assert_eq!(store.export_records(&out)?, 2);
        let exported: Vec<MetadataRecord> =
            serde_json::from_str(&std::fs::read_to_string(&out)?)?;
        assert_eq!(exported.len(), 2);
        assert_eq!(exported[1].filename, "/videos/b.mp4");
        Ok(())
    }
}
