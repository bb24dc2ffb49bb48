//! Registration, public-key binding and reconnect.
//!
//! A client moves from unregistered to registered (825), then to
//! key-negotiated once it has bound a public key (826). Reconnect (827)
//! re-wraps the stored symmetric key under the stored public key only.

use bytes::Bytes;
use cryptdrop_crypto::keys::{generate_symmetric_key, wrap_key};
use cryptdrop_db::{ClientRow, Database, KeyState};
use cryptdrop_protocol::{ClientId, Response};
use tracing::{info, warn};
use uuid::Uuid;

use crate::session::SessionError;

pub fn register(db: &Database, name: &str) -> Result<Response, SessionError> {
    if name.is_empty() {
        return Err(SessionError::InvalidName);
    }
    if db.get_client_by_name(name)?.is_some() {
        return Err(SessionError::NameTaken(name.to_string()));
    }

    let client_id = ClientId::from_bytes(Uuid::new_v4().into_bytes());
    if db.get_client(&client_id)?.is_some() {
        return Err(SessionError::IdentityCollision(client_id));
    }

    let symmetric_key = generate_symmetric_key();
    if !db.add_client(&client_id, name, &symmetric_key)? {
        // Lost a race with another registration between lookup and insert.
        return Err(match db.get_client(&client_id)? {
            Some(_) => SessionError::IdentityCollision(client_id),
            None => SessionError::NameTaken(name.to_string()),
        });
    }

    info!("Registered client '{}' as {}", name, client_id);
    Ok(Response::RegistrationOk { client_id })
}

/// Bind `public_key` to an existing client and send back its symmetric key
/// wrapped under that key. A key that cannot be parsed is not stored.
pub fn accept_public_key(
    db: &Database,
    client: &ClientRow,
    name: &str,
    public_key: &Bytes,
) -> Result<Response, SessionError> {
    if client.name != name {
        warn!(
            "Public key for client '{}' ({}) sent under name '{}'",
            client.name, client.id, name
        );
    }

    let encrypted_key = wrap_key(&client.symmetric_key, public_key)?;
    if !db.update_client_key(&client.id, public_key)? {
        return Err(SessionError::UnknownIdentity(client.id));
    }

    if client.key_state() == KeyState::KeyNegotiated {
        info!("Client '{}' ({}) replaced its public key", client.name, client.id);
    } else {
        info!("Client '{}' ({}) bound a public key", client.name, client.id);
    }

    Ok(Response::PublicKeyAccepted {
        client_id: client.id,
        encrypted_key: Bytes::from(encrypted_key),
    })
}

/// Re-issue the existing symmetric key to a returning client.
pub fn reconnect(db: &Database, client: &ClientRow, name: &str) -> Result<Response, SessionError> {
    if client.name != name {
        return Err(SessionError::NameMismatch {
            client_id: client.id,
            stored: client.name.clone(),
            presented: name.to_string(),
        });
    }
    let Some(public_key) = client.public_key.as_deref() else {
        return Err(SessionError::NoPublicKey(client.id));
    };

    let encrypted_key = wrap_key(&client.symmetric_key, public_key)?;
    db.touch_client(&client.id)?;

    info!("Client '{}' ({}) reconnected", client.name, client.id);
    Ok(Response::ReconnectOk {
        client_id: client.id,
        encrypted_key: Bytes::from(encrypted_key),
    })
}
