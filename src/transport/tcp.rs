//! TCP transport for the persistent channel

use crate::transport::traits::{TransportConnector, TransportStream};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

#[async_trait]
impl TransportStream for TcpStream {
    async fn shutdown(&mut self) -> Result<()> {
        AsyncWriteExt::shutdown(self).await?;
        Ok(())
    }
}

/// Connects to the vehicle driver's event socket
pub struct TcpConnector {
    address: String,
}

impl TcpConnector {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

#[async_trait]
impl TransportConnector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self) -> Result<Self::Stream> {
        let stream = TcpStream::connect(&self.address)
            .await
            .with_context(|| format!("failed to connect to {}", self.address))?;
        // Movement commands are tiny and latency sensitive
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_describe() {
        let connector = TcpConnector::new("127.0.0.1:5001");
        assert_eq!(connector.describe(), "tcp://127.0.0.1:5001");
    }

    #[tokio::test]
    async fn test_connect_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        let connector = TcpConnector::new(addr.to_string());
        let (client, accepted) = tokio::join!(connector.connect(), listener.accept());
        let mut client = client.expect("connect");
        accepted.expect("accept");

        TransportStream::shutdown(&mut client).await.expect("shutdown");
    }

    #[tokio::test]
    async fn test_connect_failure_names_address() {
        // Bind then drop to get a port nobody listens on
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
            listener.local_addr().expect("addr")
        };
        let err = TcpConnector::new(addr.to_string())
            .connect()
            .await
            .expect_err("nothing is listening");
        assert!(err.to_string().contains(&addr.to_string()));
    }
}
