//! Durable storage for speed test results
//!
//! One SQLite file, one table, one connection per store instance. WAL
//! journal mode plus a five second busy timeout let multiple store
//! instances (even in different processes) share the same backing file
//! without in-process coordination.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use chrono::Local;
use log::{debug, info, warn};
use rusqlite::{params, Connection, Row};
use serde::Serialize;

use crate::engine::result::TestResult;
use crate::storage::schema::create_tables;

/// Rows fetched per batch during streaming exports.
const EXPORT_BATCH_SIZE: usize = 1000;

const SELECT_COLUMNS: &str =
    "id, timestamp, download_mbps, upload_mbps, ping_ms, server_info, is_valid, warnings, test_date";

/// A persisted test result plus its identifier and derived date.
#[derive(Debug, Clone, Serialize)]
pub struct StoredRecord {
    pub id: i64,
    pub timestamp: f64,
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub ping_ms: f64,
    pub server_info: String,
    pub is_valid: bool,
    pub warnings: Vec<String>,
    pub test_date: String,
}

/// Min/max/mean/median over one metric. A zero count means no data; the
/// other fields are zero in that case.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct MetricStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub count: usize,
}

/// Aggregate statistics over the valid records of a recent period.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatistics {
    pub count: usize,
    pub period_days: u32,
    pub first_test: Option<String>,
    pub last_test: Option<String>,
    pub download: MetricStats,
    pub upload: MetricStats,
    pub ping: MetricStats,
}

/// Summary information about the backing database file.
#[derive(Debug, Clone, Serialize)]
pub struct DbInfo {
    pub database_path: String,
    pub database_size_bytes: u64,
    pub database_size_mb: f64,
    pub total_records: i64,
    pub valid_records: i64,
    pub first_test: Option<String>,
    pub last_test: Option<String>,
}

/// Handles storage and retrieval of speed test results over a single
/// reused connection.
pub struct ResultStore {
    db_path: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl ResultStore {
    /// Opens (creating if needed) the database at `db_path`, enabling WAL
    /// mode and a bounded busy timeout for concurrent writers.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create database directory")?;
            }
        }

        let conn = Connection::open(&db_path).context("Failed to open database connection")?;

        // WAL is unavailable for in-memory databases; ignore the error.
        let _ = conn.pragma_update(None, "journal_mode", "WAL");

        conn.busy_timeout(Duration::from_secs(5))
            .context("Failed to set busy timeout")?;

        create_tables(&conn).context("Failed to create database tables")?;

        info!("Result store opened at {}", db_path.display());
        Ok(Self {
            db_path,
            conn: Mutex::new(Some(conn)),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Runs `operation` against the connection, failing when the store
    /// has been closed.
    fn with_conn<T>(&self, operation: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.conn.lock().unwrap();
        let conn = guard.as_ref().context("Result store is closed")?;
        operation(conn)
    }

    /// Saves one result as a transactional single-row insert and returns
    /// the new record id. A failed save leaves `result` untouched.
    pub fn save(&self, result: &TestResult) -> Result<i64> {
        let test_date = derive_test_date(result.timestamp);
        let warnings_json = if result.warnings.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&result.warnings)?)
        };

        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO test_results
                 (timestamp, download_mbps, upload_mbps, ping_ms, server_info,
                  is_valid, warnings, test_date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    result.timestamp,
                    result.download_mbps,
                    result.upload_mbps,
                    result.ping_ms,
                    result.server_info,
                    result.is_valid,
                    warnings_json,
                    test_date,
                ],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;
            debug!("Saved test result as record {id}");
            Ok(id)
        })
    }

    /// Most recent valid records, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<StoredRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM test_results
                 WHERE is_valid = 1
                 ORDER BY timestamp DESC
                 LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![limit as i64], row_to_record)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
        })
    }

    /// Valid records with `timestamp` in `[start, end]`, newest first.
    pub fn by_date_range(&self, start: f64, end: f64) -> Result<Vec<StoredRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM test_results
                 WHERE timestamp BETWEEN ?1 AND ?2 AND is_valid = 1
                 ORDER BY timestamp DESC"
            ))?;
            let rows = stmt.query_map(params![start, end], row_to_record)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
        })
    }

    /// Per-metric statistics over the valid records of the last `days`
    /// days. Returns the explicit no-data shape instead of failing when
    /// nothing qualifies.
    pub fn statistics(&self, days: u32) -> Result<StoreStatistics> {
        let end = now_epoch_seconds();
        let start = end - f64::from(days) * 86_400.0;
        let records = self.by_date_range(start, end)?;

        if records.is_empty() {
            return Ok(StoreStatistics {
                count: 0,
                period_days: days,
                first_test: None,
                last_test: None,
                download: MetricStats::default(),
                upload: MetricStats::default(),
                ping: MetricStats::default(),
            });
        }

        let downloads: Vec<f64> = records.iter().map(|r| r.download_mbps).collect();
        let uploads: Vec<f64> = records.iter().map(|r| r.upload_mbps).collect();
        let pings: Vec<f64> = records.iter().map(|r| r.ping_ms).collect();

        Ok(StoreStatistics {
            count: records.len(),
            period_days: days,
            // Records are newest first.
            first_test: records.last().map(|r| r.test_date.clone()),
            last_test: records.first().map(|r| r.test_date.clone()),
            download: metric_stats(downloads),
            upload: metric_stats(uploads),
            ping: metric_stats(pings),
        })
    }

    /// Exports valid records (optionally bounded to the last `days` days)
    /// to CSV, oldest first, in fixed batches. Returns the exported count.
    pub fn export_csv<P: AsRef<Path>>(&self, output: P, days: Option<u32>) -> Result<usize> {
        let cutoff = days_cutoff(days);
        let file = File::create(output.as_ref()).context("Failed to create CSV export file")?;
        let mut writer = BufWriter::new(file);
        writeln!(
            writer,
            "test_date,download_mbps,upload_mbps,ping_ms,server_info,warnings"
        )?;

        let mut exported = 0;
        self.with_conn(|conn| {
            let mut offset = 0;
            loop {
                let batch = fetch_batch(conn, cutoff, offset, EXPORT_BATCH_SIZE)?;
                if batch.is_empty() {
                    break;
                }
                for record in &batch {
                    writeln!(
                        writer,
                        "{},{},{},{},{},{}",
                        csv_field(&record.test_date),
                        record.download_mbps,
                        record.upload_mbps,
                        record.ping_ms,
                        csv_field(&record.server_info),
                        csv_field(&record.warnings.join("; ")),
                    )?;
                    exported += 1;
                }
                offset += EXPORT_BATCH_SIZE;
            }
            Ok(())
        })?;

        writer.flush()?;
        info!("Exported {exported} results to {}", output.as_ref().display());
        Ok(exported)
    }

    /// Exports valid records to a JSON document
    /// `{export_date, export_period_days, total_results, results}`,
    /// oldest first, streamed in fixed batches. Returns the exported count.
    pub fn export_json<P: AsRef<Path>>(&self, output: P, days: Option<u32>) -> Result<usize> {
        let cutoff = days_cutoff(days);
        let file = File::create(output.as_ref()).context("Failed to create JSON export file")?;
        let mut writer = BufWriter::new(file);

        let mut exported = 0;
        self.with_conn(|conn| {
            let total = count_valid(conn, cutoff)?;

            writeln!(writer, "{{")?;
            writeln!(
                writer,
                "  \"export_date\": {},",
                serde_json::to_string(&Local::now().naive_local().to_string())?
            )?;
            writeln!(
                writer,
                "  \"export_period_days\": {},",
                serde_json::to_string(&days)?
            )?;
            writeln!(writer, "  \"total_results\": {total},")?;
            writeln!(writer, "  \"results\": [")?;

            let mut offset = 0;
            loop {
                let batch = fetch_batch(conn, cutoff, offset, EXPORT_BATCH_SIZE)?;
                if batch.is_empty() {
                    break;
                }
                for record in &batch {
                    if exported > 0 {
                        writeln!(writer, ",")?;
                    }
                    write!(writer, "    {}", serde_json::to_string(record)?)?;
                    exported += 1;
                }
                offset += EXPORT_BATCH_SIZE;
            }

            if exported > 0 {
                writeln!(writer)?;
            }
            writeln!(writer, "  ]")?;
            writeln!(writer, "}}")?;
            Ok(())
        })?;

        writer.flush()?;
        info!("Exported {exported} results to {}", output.as_ref().display());
        Ok(exported)
    }

    /// Deletes records older than `keep_days` days. Returns the number of
    /// deleted rows.
    pub fn cleanup(&self, keep_days: u32) -> Result<usize> {
        let cutoff = now_epoch_seconds() - f64::from(keep_days) * 86_400.0;
        let deleted = self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let deleted = tx.execute("DELETE FROM test_results WHERE timestamp < ?1", params![cutoff])?;
            tx.commit()?;
            Ok(deleted)
        })?;
        info!("Cleaned up {deleted} records older than {keep_days} days");
        Ok(deleted)
    }

    /// Record counts, file size, and the date range of valid results.
    pub fn info(&self) -> Result<DbInfo> {
        let (total, valid, first, last) = self.with_conn(|conn| {
            let total: i64 =
                conn.query_row("SELECT COUNT(*) FROM test_results", [], |row| row.get(0))?;
            let valid: i64 = conn.query_row(
                "SELECT COUNT(*) FROM test_results WHERE is_valid = 1",
                [],
                |row| row.get(0),
            )?;
            let (first, last): (Option<String>, Option<String>) = conn.query_row(
                "SELECT MIN(test_date), MAX(test_date) FROM test_results WHERE is_valid = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok((total, valid, first, last))
        })?;

        let size_bytes = std::fs::metadata(&self.db_path).map(|m| m.len()).unwrap_or(0);

        Ok(DbInfo {
            database_path: self.db_path.display().to_string(),
            database_size_bytes: size_bytes,
            database_size_mb: (size_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
            total_records: total,
            valid_records: valid,
            first_test: first,
            last_test: last,
        })
    }

    /// Releases the connection. Safe to call more than once; operations
    /// after close report an error.
    pub fn close(&self) {
        let taken = self.conn.lock().unwrap().take();
        if let Some(conn) = taken {
            if let Err((_conn, e)) = conn.close() {
                warn!("Error closing result store: {e}");
            } else {
                debug!("Result store at {} closed", self.db_path.display());
            }
        }
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<StoredRecord> {
    let warnings_text: Option<String> = row.get(7)?;
    let warnings = warnings_text
        .map(|text| serde_json::from_str(&text).unwrap_or_default())
        .unwrap_or_default();
    Ok(StoredRecord {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        download_mbps: row.get(2)?,
        upload_mbps: row.get(3)?,
        ping_ms: row.get(4)?,
        server_info: row.get(5)?,
        is_valid: row.get(6)?,
        warnings,
        test_date: row.get(8)?,
    })
}

/// One page of valid records for streaming export, oldest first.
fn fetch_batch(
    conn: &Connection,
    cutoff: Option<f64>,
    offset: usize,
    limit: usize,
) -> Result<Vec<StoredRecord>> {
    let mut records = Vec::new();
    match cutoff {
        Some(cutoff) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM test_results
                 WHERE is_valid = 1 AND timestamp >= ?1
                 ORDER BY timestamp ASC
                 LIMIT ?2 OFFSET ?3"
            ))?;
            let rows = stmt.query_map(params![cutoff, limit as i64, offset as i64], row_to_record)?;
            for row in rows {
                records.push(row?);
            }
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM test_results
                 WHERE is_valid = 1
                 ORDER BY timestamp ASC
                 LIMIT ?1 OFFSET ?2"
            ))?;
            let rows = stmt.query_map(params![limit as i64, offset as i64], row_to_record)?;
            for row in rows {
                records.push(row?);
            }
        }
    }
    Ok(records)
}

fn count_valid(conn: &Connection, cutoff: Option<f64>) -> Result<usize> {
    let count: i64 = match cutoff {
        Some(cutoff) => conn.query_row(
            "SELECT COUNT(*) FROM test_results WHERE is_valid = 1 AND timestamp >= ?1",
            params![cutoff],
            |row| row.get(0),
        )?,
        None => conn.query_row(
            "SELECT COUNT(*) FROM test_results WHERE is_valid = 1",
            [],
            |row| row.get(0),
        )?,
    };
    Ok(count as usize)
}

fn metric_stats(mut values: Vec<f64>) -> MetricStats {
    if values.is_empty() {
        return MetricStats::default();
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let count = values.len();
    let mean = values.iter().sum::<f64>() / count as f64;
    let median = if count % 2 == 0 {
        (values[count / 2 - 1] + values[count / 2]) / 2.0
    } else {
        values[count / 2]
    };
    MetricStats {
        min: values[0],
        max: values[count - 1],
        mean,
        median,
        count,
    }
}

/// ISO-8601 local date-time string derived from an epoch timestamp.
fn derive_test_date(timestamp: f64) -> String {
    let secs = timestamp.trunc() as i64;
    let nanos = (timestamp.fract() * 1e9) as u32;
    chrono::DateTime::from_timestamp(secs, nanos)
        .map(|dt| {
            dt.with_timezone(&Local)
                .naive_local()
                .format("%Y-%m-%dT%H:%M:%S%.6f")
                .to_string()
        })
        .unwrap_or_default()
}

fn days_cutoff(days: Option<u32>) -> Option<f64> {
    days.map(|d| now_epoch_seconds() - f64::from(d) * 86_400.0)
}

fn now_epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Quotes a CSV field when it contains a delimiter, quote, or newline.
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn result_at(timestamp: f64, download: f64, upload: f64, ping: f64) -> TestResult {
        TestResult {
            download_mbps: download,
            upload_mbps: upload,
            ping_ms: ping,
            server_info: "Example ISP (Helsinki)".to_string(),
            is_valid: true,
            warnings: Vec::new(),
            is_cancelled: false,
            timestamp,
        }
    }

    fn open_store(dir: &tempfile::TempDir) -> ResultStore {
        ResultStore::open(dir.path().join("test.db")).unwrap()
    }

    #[test]
    fn test_store_creation() {
        let dir = tempdir().unwrap();
        let store = ResultStore::open(dir.path().join("nested").join("test.db"));
        assert!(store.is_ok());
    }

    #[test]
    fn test_save_and_recent() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let now = now_epoch_seconds();

        let first = store.save(&result_at(now - 10.0, 100.0, 20.0, 15.0)).unwrap();
        let second = store.save(&result_at(now, 200.0, 40.0, 10.0)).unwrap();
        assert!(second > first);

        let records = store.recent(10).unwrap();
        assert_eq!(records.len(), 2);
        // Newest first.
        assert_eq!(records[0].download_mbps, 200.0);
        assert_eq!(records[1].download_mbps, 100.0);
        assert!(!records[0].test_date.is_empty());
    }

    #[test]
    fn test_recent_excludes_invalid_records() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let now = now_epoch_seconds();

        store.save(&result_at(now, 100.0, 20.0, 15.0)).unwrap();
        let mut invalid = result_at(now, 0.0, 0.0, 0.0);
        invalid.is_valid = false;
        invalid.warnings = vec!["Extremely high ping detected - likely measurement error".into()];
        store.save(&invalid).unwrap();

        assert_eq!(store.recent(10).unwrap().len(), 1);
        let info = store.info().unwrap();
        assert_eq!(info.total_records, 2);
        assert_eq!(info.valid_records, 1);
    }

    #[test]
    fn test_warnings_round_trip() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let mut result = result_at(now_epoch_seconds(), 2000.0, 100.0, 15.0);
        result.warnings = vec![
            "Unusually high speed (2.0 Gbps) - please verify results".to_string(),
            "High latency (1500 ms) detected - connection may be slow".to_string(),
        ];
        store.save(&result).unwrap();

        let records = store.recent(1).unwrap();
        assert_eq!(records[0].warnings, result.warnings);
    }

    #[test]
    fn test_by_date_range() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let now = now_epoch_seconds();

        store.save(&result_at(now - 3600.0, 100.0, 20.0, 15.0)).unwrap();
        store.save(&result_at(now - 60.0, 200.0, 40.0, 10.0)).unwrap();
        store.save(&result_at(now, 300.0, 60.0, 5.0)).unwrap();

        let records = store.by_date_range(now - 120.0, now).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].download_mbps, 300.0);
        assert_eq!(records[1].download_mbps, 200.0);
    }

    #[test]
    fn test_statistics_empty_store() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let stats = store.statistics(7).unwrap();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.period_days, 7);
        assert_eq!(stats.download, MetricStats::default());
        assert_eq!(stats.upload, MetricStats::default());
        assert_eq!(stats.ping, MetricStats::default());
        assert!(stats.first_test.is_none());
    }

    #[test]
    fn test_statistics_values() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let now = now_epoch_seconds();

        store.save(&result_at(now - 30.0, 100.0, 10.0, 20.0)).unwrap();
        store.save(&result_at(now - 20.0, 200.0, 20.0, 30.0)).unwrap();
        store.save(&result_at(now - 10.0, 300.0, 30.0, 10.0)).unwrap();
        store.save(&result_at(now, 400.0, 40.0, 40.0)).unwrap();

        let stats = store.statistics(7).unwrap();
        assert_eq!(stats.count, 4);
        assert_eq!(stats.download.min, 100.0);
        assert_eq!(stats.download.max, 400.0);
        assert_eq!(stats.download.mean, 250.0);
        // Even count: median is the mean of the two middle values.
        assert_eq!(stats.download.median, 250.0);
        assert_eq!(stats.ping.median, 25.0);
        assert_eq!(stats.download.count, 4);
        assert!(stats.first_test.is_some());
        assert!(stats.last_test.is_some());
        assert!(stats.first_test <= stats.last_test);
    }

    #[test]
    fn test_export_csv() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let now = now_epoch_seconds();

        let mut with_warning = result_at(now - 10.0, 100.0, 20.0, 15.0);
        with_warning.warnings = vec!["Very low speeds detected - check network connection".into()];
        store.save(&with_warning).unwrap();
        store.save(&result_at(now, 200.0, 40.0, 10.0)).unwrap();

        let output = dir.path().join("export.csv");
        let count = store.export_csv(&output, None).unwrap();
        assert_eq!(count, 2);

        let contents = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(
            lines[0],
            "test_date,download_mbps,upload_mbps,ping_ms,server_info,warnings"
        );
        assert_eq!(lines.len(), 3);
        // Oldest first, warnings joined with semicolons.
        assert!(lines[1].contains("100"));
        assert!(lines[1].contains("Very low speeds"));
        assert!(lines[2].contains("200"));
    }

    #[test]
    fn test_export_csv_quotes_embedded_commas() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let mut result = result_at(now_epoch_seconds(), 100.0, 20.0, 15.0);
        result.server_info = "Example ISP (Helsinki, FI)".to_string();
        store.save(&result).unwrap();

        let output = dir.path().join("export.csv");
        store.export_csv(&output, None).unwrap();
        let contents = std::fs::read_to_string(&output).unwrap();
        assert!(contents.contains("\"Example ISP (Helsinki, FI)\""));
    }

    #[test]
    fn test_export_json_round_trip() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let now = now_epoch_seconds();

        let mut with_warning = result_at(now - 10.0, 100.0, 20.0, 15.0);
        with_warning.warnings = vec!["Very low speeds detected - check network connection".into()];
        store.save(&with_warning).unwrap();
        store.save(&result_at(now, 200.0, 40.0, 10.0)).unwrap();

        let output = dir.path().join("export.json");
        let count = store.export_json(&output, Some(7)).unwrap();
        assert_eq!(count, 2);

        let contents = std::fs::read_to_string(&output).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed["total_results"], 2);
        assert_eq!(parsed["export_period_days"], 7);

        let results = parsed["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        // Oldest first in exports, newest first in queries.
        let queried = store.recent(10).unwrap();
        assert_eq!(results[0]["download_mbps"], queried[1].download_mbps);
        assert_eq!(results[1]["download_mbps"], queried[0].download_mbps);
        assert_eq!(
            results[0]["warnings"].as_array().unwrap().len(),
            queried[1].warnings.len()
        );
    }

    #[test]
    fn test_cleanup_old_records() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let now = now_epoch_seconds();

        store.save(&result_at(now - 400.0 * 86_400.0, 100.0, 20.0, 15.0)).unwrap();
        store.save(&result_at(now, 200.0, 40.0, 10.0)).unwrap();

        let deleted = store.cleanup(365).unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.recent(10).unwrap().len(), 1);
    }

    #[test]
    fn test_info_reports_counts_and_size() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        store.save(&result_at(now_epoch_seconds(), 100.0, 20.0, 15.0)).unwrap();

        let info = store.info().unwrap();
        assert_eq!(info.total_records, 1);
        assert_eq!(info.valid_records, 1);
        assert!(info.database_size_bytes > 0);
        assert!(info.first_test.is_some());
    }

    #[test]
    fn test_double_close_is_noop() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        store.close();
        store.close();

        // Operations after close surface an error instead of panicking.
        assert!(store.recent(1).is_err());
        assert!(store.save(&result_at(now_epoch_seconds(), 1.0, 1.0, 1.0)).is_err());
    }

    #[test]
    fn test_two_store_instances_share_one_file() {
        // Separate instances over the same file rely on WAL plus the busy
        // timeout, not in-process locking.
        let dir = tempdir().unwrap();
        let path = dir.path().join("shared.db");
        let writer = ResultStore::open(&path).unwrap();
        let reader = ResultStore::open(&path).unwrap();

        writer.save(&result_at(now_epoch_seconds(), 100.0, 20.0, 15.0)).unwrap();
        assert_eq!(reader.recent(10).unwrap().len(), 1);
    }

    #[test]
    fn test_metric_stats_odd_count_median() {
        let stats = metric_stats(vec![30.0, 10.0, 20.0]);
        assert_eq!(stats.median, 20.0);
        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 30.0);
        assert_eq!(stats.count, 3);
    }
}
