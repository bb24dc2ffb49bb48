//! Finishing an upload and the checksum handshake that follows it.
//!
//! After a 1603 the client compares checksums and answers 900 (match),
//! 901 (mismatch, will resend) or 902 (mismatch, giving up). The server
//! acknowledges all three and only records whether the file was verified.

use cryptdrop_crypto::encrypt::decrypt;
use cryptdrop_db::{ClientRow, Database};
use cryptdrop_protocol::{CrcStatus, Response};
use tracing::{info, warn};

use crate::config::SizeMismatchPolicy;
use crate::session::SessionError;
use crate::storage::Storage;
use crate::transfer::CompletedTransfer;

/// Decrypt, persist and checksum a fully received upload.
pub fn finish_upload(
    db: &Database,
    storage: &Storage,
    policy: SizeMismatchPolicy,
    client: &ClientRow,
    done: CompletedTransfer,
) -> Result<Response, SessionError> {
    let plain = decrypt(&client.symmetric_key, &done.content)?;

    let expected = done.orig_file_size as usize;
    if plain.len() != expected {
        match policy {
            SizeMismatchPolicy::Warn => warn!(
                "Decrypted {} from client '{}' is {} bytes, client declared {}",
                done.file_name,
                client.name,
                plain.len(),
                expected
            ),
            SizeMismatchPolicy::Reject => {
                return Err(SessionError::OriginalSizeMismatch {
                    file_name: done.file_name,
                    expected,
                    actual: plain.len(),
                });
            }
        }
    }

    let path = storage.store(&client.id, &done.file_name, &plain)?;
    db.add_or_update_file(&client.id, &done.file_name, &path.to_string_lossy(), false)?;
    let checksum = storage.checksum(&path)?;

    info!(
        "Received {} from client '{}' ({}): {} bytes in {} chunks, crc {:08x}",
        done.file_name,
        client.name,
        client.id,
        plain.len(),
        done.chunks_received,
        checksum
    );

    Ok(Response::FileAccepted {
        client_id: client.id,
        content_size: done.content_size,
        file_name: done.file_name,
        checksum,
    })
}

/// Record the client's checksum verdict. Always acknowledged.
pub fn acknowledge(
    db: &Database,
    client: &ClientRow,
    status: CrcStatus,
    file_name: &str,
) -> Result<Response, SessionError> {
    match status {
        CrcStatus::Valid => match db.get_file(&client.id, file_name)? {
            Some(file) => {
                db.add_or_update_file(&file.client_id, &file.file_name, &file.path_name, true)?;
                info!("Client '{}' verified {}", client.name, file_name);
            }
            None => warn!(
                "Client '{}' confirmed {}, which has no stored record",
                client.name, file_name
            ),
        },
        CrcStatus::Retry => info!(
            "Checksum mismatch on {} from client '{}', client will resend",
            file_name, client.name
        ),
        CrcStatus::Abort => warn!(
            "Upload of {} from client '{}' failed: checksum mismatch after final retry",
            file_name, client.name
        ),
    }

    Ok(Response::Accepted {
        client_id: client.id,
    })
}
