use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Result, bail};
use cryptdrop_protocol::codec::DEFAULT_MAX_PAYLOAD;
use tracing::warn;

use crate::transfer::TransferLimits;

/// Port used when the port file is missing or unreadable.
pub const DEFAULT_PORT: u16 = 1256;

/// What to do when a decrypted upload's length differs from the size the
/// client declared for the original file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizeMismatchPolicy {
    /// Log a warning and keep the file.
    #[default]
    Warn,
    /// Answer with a general error and store nothing.
    Reject,
}

impl FromStr for SizeMismatchPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" => Ok(Self::Warn),
            "reject" => Ok(Self::Reject),
            other => bail!("unknown size mismatch policy '{}' (expected warn or reject)", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub storage_dir: PathBuf,
    pub max_payload: usize,
    pub size_policy: SizeMismatchPolicy,
    pub transfer_limits: TransferLimits,
}

impl Config {
    /// Build the configuration from the environment. The port comes from the
    /// port file, read once here.
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("CRYPTDROP_HOST").unwrap_or_else(|_| "127.0.0.1".into());
        let port_file: PathBuf = std::env::var("CRYPTDROP_PORT_FILE")
            .unwrap_or_else(|_| "port.info".into())
            .into();
        let db_path: PathBuf = std::env::var("CRYPTDROP_DB_PATH")
            .unwrap_or_else(|_| "cryptdrop.db".into())
            .into();
        let storage_dir: PathBuf = std::env::var("CRYPTDROP_STORAGE_DIR")
            .unwrap_or_else(|_| "uploads".into())
            .into();
        let max_payload: usize = match std::env::var("CRYPTDROP_MAX_PAYLOAD") {
            Ok(v) => v.trim().parse()?,
            Err(_) => DEFAULT_MAX_PAYLOAD,
        };
        let size_policy = match std::env::var("CRYPTDROP_SIZE_POLICY") {
            Ok(v) => v.parse()?,
            Err(_) => SizeMismatchPolicy::default(),
        };
        let mut transfer_limits = TransferLimits::default();
        if let Ok(v) = std::env::var("CRYPTDROP_MAX_FILE_SIZE") {
            transfer_limits.max_content_size = v.trim().parse()?;
        }
        if let Ok(v) = std::env::var("CRYPTDROP_MAX_TRANSFERS") {
            transfer_limits.max_transfers_per_connection = v.trim().parse()?;
        }

        Ok(Self {
            host,
            port: read_port(&port_file),
            db_path,
            storage_dir,
            max_payload,
            size_policy,
            transfer_limits,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            db_path: "cryptdrop.db".into(),
            storage_dir: "uploads".into(),
            max_payload: DEFAULT_MAX_PAYLOAD,
            size_policy: SizeMismatchPolicy::Warn,
            transfer_limits: TransferLimits::default(),
        }
    }
}

/// Read the listening port from `path`, falling back to [`DEFAULT_PORT`].
pub fn read_port(path: &Path) -> u16 {
    match std::fs::read_to_string(path) {
        Ok(contents) => match contents.trim().parse() {
            Ok(port) => port,
            Err(_) => {
                warn!(
                    "Invalid port in {}. Using default port {}.",
                    path.display(),
                    DEFAULT_PORT
                );
                DEFAULT_PORT
            }
        },
        Err(_) => {
            warn!("{} not found. Using default port {}.", path.display(), DEFAULT_PORT);
            DEFAULT_PORT
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_file_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("port.info");
        std::fs::write(&path, "4321\n").unwrap();
        assert_eq!(read_port(&path), 4321);
    }

    #[test]
    fn missing_or_bad_port_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("port.info");
        assert_eq!(read_port(&path), DEFAULT_PORT);

        std::fs::write(&path, "not-a-port").unwrap();
        assert_eq!(read_port(&path), DEFAULT_PORT);

        std::fs::write(&path, "70000").unwrap();
        assert_eq!(read_port(&path), DEFAULT_PORT);
    }

    #[test]
    fn parses_size_policy() {
        assert_eq!("warn".parse::<SizeMismatchPolicy>().unwrap(), SizeMismatchPolicy::Warn);
        assert_eq!(" REJECT ".parse::<SizeMismatchPolicy>().unwrap(), SizeMismatchPolicy::Reject);
        assert!("strict".parse::<SizeMismatchPolicy>().is_err());
    }
}
