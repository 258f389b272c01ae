//! WebSocket transport
//!
//! Accepts TCP connections, upgrades them to WebSocket and runs one task per
//! connection:
//! - a writer task drains the connection's bounded outbound queue into the
//!   socket
//! - the read loop feeds text frames to the connection's `Session`
//! - unauthenticated connections that stay silent past the handshake timeout
//!   are told so and closed; sockets that never finish the WebSocket upgrade
//!   within the same window are dropped
//!
//! Closing the socket unregisters the connection; a send that was already
//! accepted still completes because persistence happens before any await.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::auth::Authenticator;
use crate::broker::DeliveryEngine;
use crate::client::Connection;
use crate::config::Settings;
use crate::transport::session::Session;
use crate::utils::ChatError;

/// Bind `addr` and serve connections until the task is dropped.
pub async fn start_websocket_server(
    addr: &str,
    engine: Arc<DeliveryEngine>,
    auth: Arc<Authenticator>,
    settings: Settings,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("WebSocket server listening on ws://{}", listener.local_addr()?);
    serve(listener, engine, auth, settings).await;
    Ok(())
}

/// Accept loop over an already bound listener.
pub async fn serve(
    listener: TcpListener,
    engine: Arc<DeliveryEngine>,
    auth: Arc<Authenticator>,
    settings: Settings,
) {
    let active = Arc::new(AtomicUsize::new(0));

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "Failed to accept connection");
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };

        if active.load(Ordering::SeqCst) >= settings.server.max_connections {
            warn!(%peer, limit = settings.server.max_connections, "Connection limit reached; refusing");
            continue;
        }
        let slot = ActiveSlot::claim(&active);

        let engine = engine.clone();
        let auth = auth.clone();
        let settings = settings.clone();
        tokio::spawn(async move {
            let _slot = slot;
            handle_connection(stream, engine, auth, &settings).await;
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    engine: Arc<DeliveryEngine>,
    auth: Arc<Authenticator>,
    settings: &Settings,
) {
    let idle = Duration::from_secs(settings.server.handshake_timeout_secs);

    // a peer that never completes the upgrade must not hold its slot
    let ws_stream = match tokio::time::timeout(idle, accept_async(stream)).await {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            warn!(error = %e, "WebSocket handshake error");
            return;
        }
        Err(_) => {
            info!("Dropping connection that never completed the WebSocket upgrade");
            return;
        }
    };
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let (conn, mut rx) = Connection::new(settings.server.outbound_buffer);
    let connection_id = conn.id.clone();
    debug!(%connection_id, "Connection opened");

    {
        let connection_id = connection_id.clone();
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = ws_sender.send(msg).await {
                    debug!(%connection_id, error = %e, "Failed to write frame");
                    break;
                }
            }
            let _ = ws_sender.close().await;
            debug!(%connection_id, "Send loop closed");
        });
    }

    // the session holds the connection; once it and the registry entry are
    // gone the writer drains its queue and closes the socket
    let mut session = Session::new(engine, auth, Arc::new(conn));

    loop {
        let next = if session.is_authenticated() {
            ws_receiver.next().await
        } else {
            match tokio::time::timeout(idle, ws_receiver.next()).await {
                Ok(next) => next,
                Err(_) => {
                    info!(%connection_id, "Closing idle unauthenticated connection");
                    session.reply_error(&ChatError::HandshakeTimeout);
                    break;
                }
            }
        };

        match next {
            Some(Ok(WsMessage::Text(text))) => session.handle_text(text.as_str()).await,
            Some(Ok(WsMessage::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                debug!(%connection_id, error = %e, "Read error");
                break;
            }
        }
    }

    session.close();
    debug!(%connection_id, "Connection closed");
}

/// Counts a connection against `server.max_connections` while alive.
struct ActiveSlot(Arc<AtomicUsize>);

impl ActiveSlot {
    fn claim(active: &Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(active))
    }
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
