//! TCP listener and per-connection loop.
//!
//! Runs on a single-threaded runtime: one task per connection, and handlers
//! are synchronous, so at most one request is being handled at any moment.
//! Frames on one connection are handled strictly in arrival order.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tracing::{error, info, warn};

use cryptdrop_protocol::{Inbound, Response, ServerCodec};

use crate::session::ServerState;
use crate::transfer::ConnectionId;

pub struct Server {
    listener: TcpListener,
    state: Arc<ServerState>,
    max_payload: usize,
    next_conn: AtomicU64,
}

impl Server {
    pub async fn bind(addr: &str, state: Arc<ServerState>, max_payload: usize) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            state,
            max_payload,
            next_conn: AtomicU64::new(1),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the task is cancelled.
    pub async fn run(self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let conn = ConnectionId(self.next_conn.fetch_add(1, Ordering::Relaxed));
                    info!("{}: new connection from {}", conn, addr);
                    let state = self.state.clone();
                    let max_payload = self.max_payload;
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(stream, conn, state, max_payload).await {
                            warn!("{}: connection error: {:#}", conn, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    conn: ConnectionId,
    state: Arc<ServerState>,
    max_payload: usize,
) -> Result<()> {
    socket2::SockRef::from(&stream).set_nodelay(true)?;

    let mut framed = Framed::new(stream, ServerCodec::new(max_payload));
    let result = read_loop(&mut framed, conn, &state).await;

    state.connection_closed(conn);
    info!("{}: disconnected", conn);

    result
}

async fn read_loop(
    framed: &mut Framed<TcpStream, ServerCodec>,
    conn: ConnectionId,
    state: &ServerState,
) -> Result<()> {
    while let Some(inbound) = framed.next().await {
        let response = match inbound? {
            Inbound::Frame { header, payload } => state.handle(conn, &header, payload),
            Inbound::Oversized(header) => {
                warn!(
                    "{}: request {} from {} declares {} payload bytes, above the limit; skipping",
                    conn,
                    header.code,
                    state.client_info(&header.client_id),
                    header.payload_len
                );
                Response::GeneralError {
                    client_id: state.known_identity(&header.client_id),
                }
            }
        };
        framed.send(response).await?;
    }
    Ok(())
}
