//! End-to-end: a real listener on loopback, driven by a raw socket that
//! splits its writes at awkward boundaries.

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use cryptdrop_crypto::checksum::checksum;
use cryptdrop_crypto::encrypt::encrypt;
use cryptdrop_crypto::keys::{generate_keypair, public_key_der, unwrap_key};
use cryptdrop_db::Database;
use cryptdrop_protocol::request::encode_str;
use cryptdrop_protocol::{
    ClientId, NAME_LEN, PUBLIC_KEY_LEN, RESPONSE_HEADER_LEN, RequestHeader, Response,
    ResponseHeader, SERVER_VERSION,
};
use cryptdrop_server::{Server, ServerState, SizeMismatchPolicy, Storage};

fn private_key() -> &'static rsa::RsaPrivateKey {
    static KEY: OnceLock<rsa::RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| generate_keypair(1024).unwrap())
}

struct TestServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    _dir: tempfile::TempDir,
}

async fn start(max_payload: usize) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(&dir.path().join("test.db")).unwrap();
    let storage = Storage::new(dir.path().join("uploads")).unwrap();
    let state = Arc::new(ServerState::new(db, storage, SizeMismatchPolicy::Warn));

    let server = Server::bind("127.0.0.1:0", state.clone(), max_payload)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());

    TestServer {
        addr,
        state,
        _dir: dir,
    }
}

struct Client {
    stream: TcpStream,
    id: ClientId,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        Self {
            stream: TcpStream::connect(addr).await.unwrap(),
            id: ClientId::ZERO,
        }
    }

    fn frame(&self, code: u16, payload: &[u8]) -> Vec<u8> {
        let header = RequestHeader {
            client_id: self.id,
            version: SERVER_VERSION,
            code,
            payload_len: payload.len() as u32,
        };
        let mut out = header.to_bytes().to_vec();
        out.extend_from_slice(payload);
        out
    }

    /// Write a frame in several pieces, yielding between them so the server
    /// sees separate reads.
    async fn send_split(&mut self, code: u16, payload: &[u8]) {
        let bytes = self.frame(code, payload);
        for piece in bytes.chunks(97) {
            self.stream.write_all(piece).await.unwrap();
            self.stream.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    async fn recv(&mut self) -> Response {
        let mut head = [0u8; RESPONSE_HEADER_LEN];
        self.stream.read_exact(&mut head).await.unwrap();
        let header = ResponseHeader::decode(&head).unwrap();
        assert_eq!(header.version, SERVER_VERSION);

        let mut payload = vec![0u8; header.payload_len as usize];
        self.stream.read_exact(&mut payload).await.unwrap();
        Response::decode(&header, &payload).unwrap()
    }

    async fn request(&mut self, code: u16, payload: &[u8]) -> Response {
        self.send_split(code, payload).await;
        self.recv().await
    }
}

fn name_field(name: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_str(&mut buf, name, NAME_LEN);
    buf
}

fn chunk(content_size: usize, orig: usize, seq: u16, total: u16, name: &str, data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(content_size as u32).to_le_bytes());
    buf.extend_from_slice(&(orig as u32).to_le_bytes());
    buf.extend_from_slice(&seq.to_le_bytes());
    buf.extend_from_slice(&total.to_le_bytes());
    encode_str(&mut buf, name, NAME_LEN);
    buf.extend_from_slice(data);
    buf
}

/// Register `name` and bind the shared test key. Returns the AES key.
async fn handshake(client: &mut Client, name: &str) -> Vec<u8> {
    let Response::RegistrationOk { client_id } = client.request(825, &name_field(name)).await
    else {
        panic!("registration failed");
    };
    client.id = client_id;

    let mut payload = name_field(name);
    payload.extend_from_slice(&public_key_der(private_key()).unwrap());
    payload.resize(NAME_LEN + PUBLIC_KEY_LEN, 0);

    let Response::PublicKeyAccepted {
        client_id,
        encrypted_key,
    } = client.request(826, &payload).await
    else {
        panic!("public key rejected");
    };
    assert_eq!(client_id, client.id);
    assert!(!encrypted_key.is_empty());
    unwrap_key(&encrypted_key, private_key()).unwrap()
}

#[tokio::test]
async fn register_exchange_upload_and_verify() {
    let server = start(1024 * 1024).await;
    let mut client = Client::connect(server.addr).await;

    let key = handshake(&mut client, "alice").await;
    assert_eq!(
        key,
        server.state.db().get_symmetric_key(&client.id).unwrap().unwrap()
    );

    let plain: Vec<u8> = (0..10_000u32).map(|i| (i * 31 % 256) as u8).collect();
    let ciphertext = encrypt(&key, &plain).unwrap();
    let pieces: Vec<&[u8]> = ciphertext.chunks(ciphertext.len().div_ceil(3)).collect();
    assert_eq!(pieces.len(), 3);

    for (i, piece) in pieces.iter().enumerate() {
        let payload = chunk(ciphertext.len(), plain.len(), i as u16 + 1, 3, "data.bin", piece);
        let response = client.request(828, &payload).await;
        if i < 2 {
            assert_eq!(response, Response::Accepted { client_id: client.id });
        } else {
            assert_eq!(
                response,
                Response::FileAccepted {
                    client_id: client.id,
                    content_size: ciphertext.len() as u32,
                    file_name: "data.bin".into(),
                    checksum: checksum(&plain),
                }
            );
        }
    }

    let ack = client.request(900, &name_field("data.bin")).await;
    assert_eq!(ack, Response::Accepted { client_id: client.id });

    let file = server
        .state
        .db()
        .get_file(&client.id, "data.bin")
        .unwrap()
        .unwrap();
    assert!(file.verified);
    assert_eq!(std::fs::read(&file.path_name).unwrap(), plain);
}

#[tokio::test]
async fn reconnect_on_new_connection() {
    let server = start(1024 * 1024).await;
    let mut first = Client::connect(server.addr).await;
    let key = handshake(&mut first, "bob").await;
    let id = first.id;
    drop(first);

    let mut second = Client::connect(server.addr).await;
    second.id = id;
    let Response::ReconnectOk {
        client_id,
        encrypted_key,
    } = second.request(827, &name_field("bob")).await
    else {
        panic!("reconnect refused");
    };
    assert_eq!(client_id, id);
    assert_eq!(unwrap_key(&encrypted_key, private_key()).unwrap(), key);

    let denied = second.request(827, &name_field("mallory")).await;
    assert_eq!(denied, Response::ReconnectDenied { client_id: id });
}

#[tokio::test]
async fn errors_do_not_close_the_connection() {
    let server = start(512).await;
    let mut client = Client::connect(server.addr).await;

    // Unknown code.
    assert_eq!(
        client.request(1234, b"whatever").await,
        Response::GeneralError {
            client_id: ClientId::ZERO
        }
    );

    // Truncated registration.
    assert_eq!(
        client.request(825, b"short").await,
        Response::GeneralError {
            client_id: ClientId::ZERO
        }
    );

    // Payload above the limit is skipped without being buffered.
    assert_eq!(
        client.request(828, &vec![0u8; 4096]).await,
        Response::GeneralError {
            client_id: ClientId::ZERO
        }
    );

    // The stream is still in sync afterwards.
    let Response::RegistrationOk { .. } = client.request(825, &name_field("carol")).await else {
        panic!("registration failed after errors");
    };
}

#[tokio::test]
async fn back_to_back_frames_in_one_write() {
    let server = start(1024 * 1024).await;
    let mut client = Client::connect(server.addr).await;

    let mut bytes = client.frame(825, &name_field("dave"));
    bytes.extend(client.frame(825, &name_field("dave")));
    client.stream.write_all(&bytes).await.unwrap();

    assert!(matches!(client.recv().await, Response::RegistrationOk { .. }));
    assert_eq!(client.recv().await, Response::RegistrationFailed);
}

#[tokio::test]
async fn disconnect_discards_partial_upload() {
    let server = start(1024 * 1024).await;
    let mut first = Client::connect(server.addr).await;
    let key = handshake(&mut first, "erin").await;
    let id = first.id;

    let ciphertext = encrypt(&key, b"0123456789abcdef").unwrap();
    let (head, tail) = ciphertext.split_at(10);
    let partial = chunk(ciphertext.len(), 16, 1, 2, "f.txt", head);
    assert_eq!(
        first.request(828, &partial).await,
        Response::Accepted { client_id: id }
    );

    // Same file from a second connection while the first still owns it.
    let mut second = Client::connect(server.addr).await;
    second.id = id;
    assert_eq!(
        second.request(828, &partial).await,
        Response::GeneralError { client_id: id }
    );

    drop(first);
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The orphaned buffer is gone: the second connection starts afresh.
    assert_eq!(
        second.request(828, &partial).await,
        Response::Accepted { client_id: id }
    );
    let done = chunk(ciphertext.len(), 16, 2, 2, "f.txt", tail);
    let Response::FileAccepted { checksum: crc, .. } = second.request(828, &done).await else {
        panic!("upload not accepted");
    };
    assert_eq!(crc, checksum(b"0123456789abcdef"));
}
