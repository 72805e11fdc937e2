//! Endpoint side of the host WebSocket.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use shared::{
    domain::EndpointId,
    protocol::{ClientRequest, ServerEvent},
};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

/// Outbound half of the connection to the host.
#[async_trait]
pub trait HostLink: Send + Sync {
    async fn send(&self, request: ClientRequest) -> Result<()>;

    /// Wait until everything sent so far has been written out.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

enum Outbound {
    Request(ClientRequest),
    Flush(oneshot::Sender<()>),
}

/// Requests are handed to a writer task; `send` never blocks on the socket.
pub struct WsHostLink {
    outbound: mpsc::UnboundedSender<Outbound>,
}

#[async_trait]
impl HostLink for WsHostLink {
    async fn send(&self, request: ClientRequest) -> Result<()> {
        self.outbound
            .send(Outbound::Request(request))
            .map_err(|_| anyhow!("host connection closed"))
    }

    async fn flush(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.outbound
            .send(Outbound::Flush(done_tx))
            .map_err(|_| anyhow!("host connection closed"))?;
        done_rx
            .await
            .map_err(|_| anyhow!("host connection closed before flush"))
    }
}

/// Build `ws[s]://host/ws?endpoint=<id>` from the host's http(s) base URL.
pub fn ws_url(server_url: &str, endpoint: EndpointId) -> Result<Url> {
    let mut url = Url::parse(server_url)
        .with_context(|| format!("invalid server url: {server_url}"))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(anyhow!("unsupported server url scheme: {other}")),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow!("cannot switch {server_url} to {scheme}"))?;
    url.set_path("/ws");
    url.query_pairs_mut()
        .clear()
        .append_pair("endpoint", endpoint.as_str());
    Ok(url)
}

/// Connect to the host and return the outbound link plus the inbound event stream.
pub async fn connect(
    server_url: &str,
    endpoint: EndpointId,
) -> Result<(WsHostLink, mpsc::UnboundedReceiver<ServerEvent>)> {
    let url = ws_url(server_url, endpoint)?;
    let (ws_stream, _) = connect_async(url.as_str())
        .await
        .with_context(|| format!("failed to connect websocket: {url}"))?;
    let (mut ws_writer, mut ws_reader) = ws_stream.split();

    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
    tokio::spawn(async move {
        while let Some(item) = outbound_rx.recv().await {
            let request = match item {
                Outbound::Request(request) => request,
                Outbound::Flush(done) => {
                    if ws_writer.flush().await.is_err() {
                        break;
                    }
                    let _ = done.send(());
                    continue;
                }
            };
            let text = match serde_json::to_string(&request) {
                Ok(text) => text,
                Err(error) => {
                    warn!(%error, "transport: failed to encode request");
                    continue;
                }
            };
            if ws_writer.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = ws_writer.close().await;
    });

    let (inbound, inbound_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(frame) = ws_reader.next().await {
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                    Ok(event) => {
                        if inbound.send(event).is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        warn!(endpoint = %endpoint, %error, "transport: dropping malformed event")
                    }
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(error) => {
                    warn!(endpoint = %endpoint, %error, "transport: websocket read failed");
                    break;
                }
            }
        }
        debug!(endpoint = %endpoint, "transport: reader finished");
    });

    Ok((WsHostLink { outbound }, inbound_rx))
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
