use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (clients, files)");
        conn.execute_batch(
            "
            CREATE TABLE clients (
                id              BLOB PRIMARY KEY,
                name            TEXT NOT NULL UNIQUE,
                public_key      BLOB,
                last_seen       TEXT NOT NULL,
                symmetric_key   BLOB NOT NULL
            );

            CREATE TABLE files (
                client_id   BLOB NOT NULL REFERENCES clients(id),
                file_name   TEXT NOT NULL,
                path_name   TEXT NOT NULL,
                verified    INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (client_id, file_name)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
