//! Websocket realtime pump with reconnect backoff.
//!
//! Connects to the server's push channel, decodes each text frame as a
//! `RealtimeEvent`, and hands it to the engine's reconciler in arrival
//! order. A bad frame or a refused merge is logged and skipped; the stream
//! itself is the unit of failure, and every disconnect goes through the
//! same jittered exponential backoff before reconnecting.

use crate::config::{AuthConfig, ClientConfig};
use futures_util::StreamExt;
use ripple_core::RealtimeEvent;
use ripple_engine::SessionEngine;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

pub fn spawn_realtime(config: &ClientConfig, engine: Arc<SessionEngine>) -> JoinHandle<()> {
    let endpoint = config.ws_endpoint.clone();
    let auth = config.auth.clone();
    let reconnect = config.reconnect.clone();
    tokio::spawn(async move {
        let mut backoff = reconnect.initial_ms;
        loop {
            match connect(&endpoint, &auth).await {
                Ok(mut stream) => {
                    info!("realtime connected");
                    backoff = reconnect.initial_ms;

                    while let Some(message) = stream.next().await {
                        match message {
                            Ok(Message::Text(text)) => {
                                match serde_json::from_str::<RealtimeEvent>(&text) {
                                    Ok(event) => {
                                        if let Err(err) = engine.apply_realtime(event) {
                                            warn!(error = %err, "realtime merge failed");
                                        }
                                    }
                                    Err(err) => warn!(error = %err, "realtime decode failed"),
                                }
                            }
                            Ok(Message::Close(_)) => break,
                            Ok(_) => {}
                            Err(err) => {
                                warn!(error = %err, "realtime stream error");
                                break;
                            }
                        }
                    }

                    info!("realtime disconnected");
                }
                Err(err) => warn!(error = %err, "realtime connect failed"),
            }

            let delay = jittered_backoff(backoff, reconnect.jitter_ms);
            debug!(delay_ms = delay, "realtime reconnect backoff");
            tokio::time::sleep(Duration::from_millis(delay)).await;

            let next = (backoff as f64 * reconnect.multiplier) as u64;
            backoff = next.min(reconnect.max_ms);
        }
    })
}

async fn connect(
    endpoint: &str,
    auth: &AuthConfig,
) -> Result<WsStream, tokio_tungstenite::tungstenite::Error> {
    let mut request = endpoint.into_client_request()?;
    let headers = request.headers_mut();
    if let Some(api_key) = &auth.api_key {
        if let Ok(value) = HeaderValue::from_str(api_key) {
            headers.insert("x-api-key", value);
        }
    }
    if let Some(token) = &auth.bearer_token {
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
            headers.insert("authorization", value);
        }
    }
    let (stream, _) = tokio_tungstenite::connect_async(request).await?;
    Ok(stream)
}

pub fn jittered_backoff(base_ms: u64, jitter_ms: u64) -> u64 {
    if jitter_ms == 0 {
        return base_ms;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_nanos(0))
        .subsec_nanos() as u64;
    let jitter = nanos % jitter_ms;
    base_ms.saturating_add(jitter)
}
