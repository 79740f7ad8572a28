//! Byte-stream seam under the driver's persistent event channel
//!
//! The channel manager frames envelopes over any [`TransportStream`]; TCP in
//! production, an in-memory duplex pipe in tests.

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// Open link to the driver's event socket
#[async_trait]
pub trait TransportStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    /// Close the transport gracefully
    async fn shutdown(&mut self) -> Result<()>;
}

/// Dials the driver's event socket; called again on every reconnect
#[async_trait]
pub trait TransportConnector: Send + Sync + 'static {
    /// The stream type this connector produces
    type Stream: TransportStream;

    /// Attempt to connect, returning a stream on success
    async fn connect(&self) -> Result<Self::Stream>;

    /// Address of the driver's event socket, for logs
    fn describe(&self) -> String;
}
