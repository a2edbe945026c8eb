//! RIPPLE Client - Network Adapters
//!
//! Everything that talks to the outside world on behalf of a session: the
//! HTTP transport the engine mutates through, the websocket pump that feeds
//! server pushes into the reconciler, and the cached identity resolver the
//! mutation gate consults. The engine itself stays transport-agnostic;
//! this crate wires it to a real server.

pub mod config;
pub mod error;
pub mod http;
pub mod identity;
pub mod realtime;

pub use config::{AuthConfig, ClientConfig, ConfigError, ReconnectConfig};
pub use error::ClientError;
pub use http::HttpTransport;
pub use identity::SessionIdentity;
pub use realtime::spawn_realtime;

use ripple_engine::SessionEngine;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A live session: the engine, the identity slot, and the realtime pump.
pub struct SessionHandle {
    pub engine: Arc<SessionEngine>,
    pub identity: Arc<SessionIdentity>,
    pub realtime: JoinHandle<()>,
}

/// Wire a full session from configuration. The identity slot starts empty,
/// so every view works immediately while mutations fail fast until the
/// caller resolves an identity via `SessionIdentity::fetch` or `set`.
///
/// Must be called inside a tokio runtime; the realtime pump is spawned
/// onto it.
pub fn start_session(config: &ClientConfig) -> Result<SessionHandle, ClientError> {
    let transport = Arc::new(HttpTransport::new(config)?);
    let identity = Arc::new(SessionIdentity::new());
    let engine = Arc::new(SessionEngine::new(transport, identity.clone()));
    let realtime = spawn_realtime(config, engine.clone());
    Ok(SessionHandle {
        engine,
        identity,
        realtime,
    })
}
