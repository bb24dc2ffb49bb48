use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use cryptdrop_crypto::checksum::Checksum;
use cryptdrop_protocol::ClientId;
use tracing::{info, warn};

/// Manages on-disk storage of received files.
///
/// Each upload is stored as `{storage_dir}/{client_id_hex}_{sanitized_name}`.
/// Calls are blocking; they run inside a single request's handling.
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)?;
        info!("File storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    /// Path of the stored copy of `file_name` for `client_id`.
    pub fn file_path(&self, client_id: &ClientId, file_name: &str) -> PathBuf {
        let safe_name = sanitize_file_name(file_name);
        if safe_name != file_name {
            warn!(
                "File name was sanitized. Original: {:?}, sanitized: {:?}",
                file_name, safe_name
            );
        }
        self.dir.join(format!("{}_{}", client_id.to_hex(), safe_name))
    }

    /// Write a complete file, replacing any earlier upload of the same name.
    pub fn store(&self, client_id: &ClientId, file_name: &str, data: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.file_path(client_id, file_name);
        fs::File::create(&path)?;
        self.append(&path, data)?;
        Ok(path)
    }

    /// Append bytes to an existing (or new) stored file.
    pub fn append(&self, path: &Path, data: &[u8]) -> Result<()> {
        let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(data)?;
        file.flush()?;
        Ok(())
    }

    /// CRC-32 of a stored file, read back from disk in blocks.
    pub fn checksum(&self, path: &Path) -> Result<u32> {
        let mut file = fs::File::open(path)?;
        let mut crc = Checksum::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            crc.update(&buf[..n]);
        }
        Ok(crc.finalize())
    }
}

/// Replace every character outside word characters, `-`, `_`, `.` and space
/// with `_`. Path separators and drive prefixes cannot survive this.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
