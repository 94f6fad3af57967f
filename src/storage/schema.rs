use anyhow::Result;
use rusqlite::Connection;

/// Creates the results table and its indexes. Idempotent.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS test_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp REAL NOT NULL,
            download_mbps REAL NOT NULL,
            upload_mbps REAL NOT NULL,
            ping_ms REAL NOT NULL,
            server_info TEXT NOT NULL,
            is_valid BOOLEAN NOT NULL,
            warnings TEXT,
            test_date TEXT NOT NULL
        )",
        [],
    )?;

    create_indexes(conn)?;

    Ok(())
}

fn create_indexes(conn: &Connection) -> Result<()> {
    // Index on timestamp for recency and range queries
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_timestamp
         ON test_results(timestamp)",
        [],
    )?;

    // Index on the derived date string for date-keyed queries
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_test_date
         ON test_results(test_date)",
        [],
    )?;

    Ok(())
}
