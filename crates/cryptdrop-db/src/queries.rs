use crate::Database;
use crate::models::{ClientRow, FileRow};
use anyhow::Result;
use cryptdrop_protocol::ClientId;
use rusqlite::{Connection, OptionalExtension, Row};

const CLIENT_COLUMNS: &str = "id, name, public_key, last_seen, symmetric_key";

impl Database {
    // -- Clients --

    pub fn get_client(&self, id: &ClientId) -> Result<Option<ClientRow>> {
        self.with_conn(|conn| query_client(conn, "id = ?1", id.as_bytes().as_slice()))
    }

    pub fn get_client_by_name(&self, name: &str) -> Result<Option<ClientRow>> {
        self.with_conn(|conn| query_client(conn, "name = ?1", name))
    }

    /// Insert a freshly registered client.
    /// Returns false if the id or the name is already taken.
    pub fn add_client(&self, id: &ClientId, name: &str, symmetric_key: &[u8]) -> Result<bool> {
        self.with_conn(|conn| {
            let result = conn.execute(
                "INSERT INTO clients (id, name, last_seen, symmetric_key) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id.as_bytes().as_slice(), name, now(), symmetric_key],
            );
            match result {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Store a client's public key and refresh `last_seen`.
    /// Returns false if no such client exists.
    pub fn update_client_key(&self, id: &ClientId, public_key: &[u8]) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE clients SET public_key = ?1, last_seen = ?2 WHERE id = ?3",
                rusqlite::params![public_key, now(), id.as_bytes().as_slice()],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn touch_client(&self, id: &ClientId) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE clients SET last_seen = ?1 WHERE id = ?2",
                rusqlite::params![now(), id.as_bytes().as_slice()],
            )?;
            Ok(())
        })
    }

    pub fn get_symmetric_key(&self, id: &ClientId) -> Result<Option<Vec<u8>>> {
        self.with_conn(|conn| {
            let key = conn
                .query_row(
                    "SELECT symmetric_key FROM clients WHERE id = ?1",
                    [id.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(key)
        })
    }

    // -- Files --

    /// Insert or replace the record for (client, file name).
    pub fn add_or_update_file(
        &self,
        client_id: &ClientId,
        file_name: &str,
        path_name: &str,
        verified: bool,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO files (client_id, file_name, path_name, verified)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![client_id.as_bytes().as_slice(), file_name, path_name, verified],
            )?;
            Ok(())
        })
    }

    pub fn get_file(&self, client_id: &ClientId, file_name: &str) -> Result<Option<FileRow>> {
        self.with_conn(|conn| {
            let file = conn
                .query_row(
                    "SELECT client_id, file_name, path_name, verified FROM files
                     WHERE client_id = ?1 AND file_name = ?2",
                    rusqlite::params![client_id.as_bytes().as_slice(), file_name],
                    |row| {
                        Ok(FileRow {
                            client_id: client_id_column(row, 0)?,
                            file_name: row.get(1)?,
                            path_name: row.get(2)?,
                            verified: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(file)
        })
    }
}

fn query_client<P: rusqlite::ToSql>(
    conn: &Connection,
    predicate: &str,
    param: P,
) -> Result<Option<ClientRow>> {
    let sql = format!("SELECT {} FROM clients WHERE {}", CLIENT_COLUMNS, predicate);
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([param], |row| {
            Ok(ClientRow {
                id: client_id_column(row, 0)?,
                name: row.get(1)?,
                public_key: row.get(2)?,
                last_seen: row.get(3)?,
                symmetric_key: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn client_id_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<ClientId> {
    let bytes: Vec<u8> = row.get(idx)?;
    ClientId::try_from(bytes.as_slice()).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Blob, Box::new(e))
    })
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}
