//! WebSocket transport
//!
//! Accepts TCP connections, performs the WebSocket handshake and hands each
//! socket to its own session task. Nothing here knows about the protocol
//! beyond the handshake.

use tokio::net::TcpListener;
use tokio_tungstenite::accept_async_with_config;
use tracing::{error, info, warn};
use tungstenite::protocol::WebSocketConfig;

use crate::config::SessionSettings;
use crate::session::{SessionContext, run_session};
use crate::utils::Result;

pub async fn start_websocket_server(addr: &str, ctx: SessionContext) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("WebSocket server listening on ws://{}", listener.local_addr()?);
    serve(listener, ctx).await;
    Ok(())
}

/// Caps inbound messages and frames at `max_message_bytes`, so an oversized
/// frame is refused while it is being read rather than after it is buffered.
pub fn websocket_config(settings: &SessionSettings) -> WebSocketConfig {
    WebSocketConfig::default()
        .max_message_size(Some(settings.max_message_bytes))
        .max_frame_size(Some(settings.max_message_bytes))
}

/// Accept loop over an already bound listener. Returns when accepting fails.
pub async fn serve(listener: TcpListener, ctx: SessionContext) {
    let config = websocket_config(&ctx.settings);
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
                return;
            }
        };
        let ctx = ctx.clone();

        tokio::spawn(async move {
            let ws_stream = match accept_async_with_config(stream, Some(config)).await {
                Ok(ws) => ws,
                Err(e) => {
                    warn!(%peer, error = %e, "WebSocket handshake error");
                    return;
                }
            };
            run_session(ws_stream, ctx).await;
        });
    }
}
