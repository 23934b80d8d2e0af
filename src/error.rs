//! Service-level errors.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("failed to bind listener on {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("failed to connect to upstream {addr}: {source}")]
    UpstreamConnect { addr: SocketAddr, source: io::Error },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("snapshot format error: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("unsupported snapshot version {0}")]
    SnapshotVersion(u32),
}
