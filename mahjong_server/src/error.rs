// Server-level errors.
//
// Per-connection failures (a peer closing, a bad frame, a failed write) are
// not errors at this level: the reactor handles them by dropping that
// connection. `ServerError` covers the failures that stop the server itself:
// startup problems and a broken poll loop.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("listener setup failed on {addr}: {source}")]
    Listener {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("poll failed: {0}")]
    Poll(#[source] io::Error),

    #[error("failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("server thread panicked")]
    Panicked,
}
