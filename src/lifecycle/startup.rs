//! Listener binding.
//!
//! The socket is bound before the controller reports `Serving`; a bind
//! failure is fatal and no request is ever accepted.

use std::net::SocketAddr;

use tokio::net::TcpListener;

use super::LifecycleError;

/// Bind the listening socket for `address`.
pub async fn bind(address: &str) -> Result<TcpListener, LifecycleError> {
    let addr: SocketAddr = address.parse().map_err(|e| LifecycleError::ListenerBindFailure {
        address: address.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
    })?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| LifecycleError::ListenerBindFailure {
            address: address.to_string(),
            source,
        })?;

    tracing::debug!(address = %addr, "Listener bound");
    Ok(listener)
}
