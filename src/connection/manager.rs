//! Persistent channel manager with automatic reconnection
//!
//! The channel is opened at startup and kept up for the life of the process,
//! independent of the vehicle link. Messages queued while the channel is down
//! are discarded on reconnect, except the newest stream start or stop, which
//! is replayed first; delivery is best-effort.

use anyhow::{anyhow, Result};
use teleop_shared::codec::{self, FrameDecoder};
use teleop_shared::{events, Envelope};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::transport::{TransportConnector, TransportStream};

/// Events emitted by the channel manager
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// Persistent channel is up
    Connected { peer: String },
    /// Persistent channel dropped
    Disconnected { reason: String },
    /// A connection attempt failed; another will follow after a backoff
    ConnectionFailed { reason: String },
    /// Received an envelope from the driver
    Received(Envelope),
}

/// Owns the persistent channel's connection loop
pub struct ChannelManager {
    /// Channel to send envelopes to the driver
    outbound_tx: mpsc::Sender<Envelope>,
    /// Channel to receive channel events
    event_rx: mpsc::Receiver<ChannelEvent>,
}

impl ChannelManager {
    /// Create a new channel manager and start the connection loop
    pub fn new<C: TransportConnector>(connector: C, config: StreamConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel::<Envelope>(100);
        let (event_tx, event_rx) = mpsc::channel::<ChannelEvent>(100);

        tokio::spawn(async move {
            connection_loop(connector, config, outbound_rx, event_tx).await;
        });

        Self {
            outbound_tx,
            event_rx,
        }
    }

    /// Receive the next channel event
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.event_rx.recv().await
    }

    /// Get a clone of the sender for outbound messages
    pub fn sender(&self) -> mpsc::Sender<Envelope> {
        self.outbound_tx.clone()
    }
}

/// Main connection loop with reconnection logic
async fn connection_loop<C: TransportConnector>(
    connector: C,
    config: StreamConfig,
    mut outbound_rx: mpsc::Receiver<Envelope>,
    event_tx: mpsc::Sender<ChannelEvent>,
) {
    let peer = connector.describe();
    let mut reconnect_delay = config.reconnect_delay;

    loop {
        let event = match timeout(config.connect_timeout, connector.connect()).await {
            Ok(Ok(mut stream)) => {
                reconnect_delay = config.reconnect_delay;
                info!("[Channel] Connected to {}", peer);

                let (stale, replay) = drain(&mut outbound_rx);
                if stale > 0 {
                    warn!("[Channel] Discarded {} message(s) queued while offline", stale);
                }

                if event_tx
                    .send(ChannelEvent::Connected { peer: peer.clone() })
                    .await
                    .is_err()
                {
                    break;
                }

                let reason = match handle_connection(&mut stream, replay, &mut outbound_rx, &event_tx)
                    .await
                {
                    Ok(()) => {
                        // Every sender is gone; the client is shutting down
                        let _ = TransportStream::shutdown(&mut stream).await;
                        break;
                    }
                    Err(e) => e.to_string(),
                };
                warn!("[Channel] Disconnected from {}: {}", peer, reason);
                ChannelEvent::Disconnected { reason }
            }
            Ok(Err(e)) => {
                debug!("[Channel] Connect to {} failed: {:#}", peer, e);
                ChannelEvent::ConnectionFailed {
                    reason: format!("{:#}", e),
                }
            }
            Err(_) => ChannelEvent::ConnectionFailed {
                reason: format!("connect to {} timed out", peer),
            },
        };

        if event_tx.send(event).await.is_err() {
            break;
        }

        // Wait before reconnecting
        tokio::time::sleep(reconnect_delay).await;

        // Exponential backoff
        reconnect_delay = std::cmp::min(reconnect_delay * 2, config.max_reconnect_delay);
    }

    debug!("[Channel] Connection loop stopped");
}

/// Empty the outbound queue, keeping the newest stream start or stop
///
/// Returns how many envelopes were discarded and the one to replay.
fn drain(outbound_rx: &mut mpsc::Receiver<Envelope>) -> (usize, Option<Envelope>) {
    let mut count = 0;
    let mut replay: Option<Envelope> = None;
    while let Ok(envelope) = outbound_rx.try_recv() {
        if is_stream_control(&envelope) {
            if replay.replace(envelope).is_some() {
                count += 1;
            }
        } else {
            count += 1;
        }
    }
    (count, replay)
}

fn is_stream_control(envelope: &Envelope) -> bool {
    envelope.event == events::START_STREAM || envelope.event == events::STOP_STREAM
}

async fn write_envelope<W: AsyncWrite + Unpin>(
    writer: &mut W,
    envelope: &Envelope,
) -> Result<()> {
    match codec::encode(envelope) {
        Ok(encoded) => {
            writer.write_all(&encoded).await?;
            debug!("[Channel] Sent {}", envelope.event);
        }
        Err(e) => warn!("[Channel] Dropping outbound {}: {}", envelope.event, e),
    }
    Ok(())
}

/// Run one connection until it fails
///
/// Returns `Ok(())` only when the outbound side has been closed by the client.
async fn handle_connection<S: TransportStream>(
    stream: &mut S,
    replay: Option<Envelope>,
    outbound_rx: &mut mpsc::Receiver<Envelope>,
    event_tx: &mpsc::Sender<ChannelEvent>,
) -> Result<()> {
    let (mut reader, mut writer) = tokio::io::split(stream);
    if let Some(envelope) = replay {
        write_envelope(&mut writer, &envelope).await?;
    }

    let mut decoder = FrameDecoder::new();
    let mut read_buf = vec![0u8; 4096];

    loop {
        tokio::select! {
            // Send outbound messages
            outbound = outbound_rx.recv() => {
                let envelope = match outbound {
                    Some(envelope) => envelope,
                    None => return Ok(()),
                };
                write_envelope(&mut writer, &envelope).await?;
            }

            // Read incoming messages
            result = reader.read(&mut read_buf) => {
                let n = result.map_err(|e| anyhow!("read error: {}", e))?;
                if n == 0 {
                    return Err(anyhow!("driver closed the channel"));
                }
                decoder.extend(&read_buf[..n]);

                // Process all complete frames
                loop {
                    match decoder.decode_next() {
                        Ok(Some(envelope)) => {
                            if event_tx.send(ChannelEvent::Received(envelope)).await.is_err() {
                                return Ok(());
                            }
                        }
                        Ok(None) => break,
                        Err(e) if e.is_fatal() => {
                            debug!("[Channel] Discarding {} buffered bytes", decoder.buffer_len());
                            decoder.reset();
                            return Err(anyhow!("stream corrupted: {}", e));
                        }
                        Err(e) => warn!("[Channel] Dropping inbound frame: {}", e),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::{BufMut, BytesMut};
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::io::DuplexStream;

    #[async_trait]
    impl TransportStream for DuplexStream {
        async fn shutdown(&mut self) -> Result<()> {
            AsyncWriteExt::shutdown(self).await?;
            Ok(())
        }
    }

    /// Hands out one in-memory stream, then refuses
    struct DuplexConnector {
        stream: Mutex<Option<DuplexStream>>,
    }

    #[async_trait]
    impl TransportConnector for DuplexConnector {
        type Stream = DuplexStream;

        async fn connect(&self) -> Result<DuplexStream> {
            self.stream
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| anyhow!("connection refused"))
        }

        fn describe(&self) -> String {
            "duplex".into()
        }
    }

    fn fast_config() -> StreamConfig {
        StreamConfig {
            address: "duplex".into(),
            reconnect_delay: Duration::from_millis(10),
            max_reconnect_delay: Duration::from_millis(20),
            connect_timeout: Duration::from_secs(1),
        }
    }

    fn manager() -> (ChannelManager, DuplexStream) {
        let (client, driver) = tokio::io::duplex(64 * 1024);
        let connector = DuplexConnector {
            stream: Mutex::new(Some(client)),
        };
        (ChannelManager::new(connector, fast_config()), driver)
    }

    async fn next_received(manager: &mut ChannelManager) -> Envelope {
        loop {
            match manager.recv().await.expect("manager alive") {
                ChannelEvent::Received(envelope) => return envelope,
                ChannelEvent::Connected { .. } => continue,
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_outbound_is_framed() {
        let (mut manager, mut driver) = manager();
        assert!(matches!(
            manager.recv().await,
            Some(ChannelEvent::Connected { .. })
        ));

        manager
            .sender()
            .send(Envelope::drone_command("w"))
            .await
            .expect("send");

        let mut decoder = FrameDecoder::new();
        let mut buf = [0u8; 256];
        let envelope = loop {
            let n = driver.read(&mut buf).await.expect("read");
            decoder.extend(&buf[..n]);
            if let Some(envelope) = decoder.decode_next().expect("decode") {
                break envelope;
            }
        };
        assert_eq!(envelope, Envelope::drone_command("w"));
    }

    #[tokio::test]
    async fn test_bad_frame_dropped_and_stream_continues() {
        let (mut manager, mut driver) = manager();

        let mut bytes = BytesMut::new();
        bytes.put_u32(5);
        bytes.put_slice(b"nope!");
        let battery = Envelope::new(events::BATTERY_UPDATE, json!({ "battery_level": 87 }));
        bytes.extend_from_slice(&codec::encode(&battery).expect("encode"));
        driver.write_all(&bytes).await.expect("write");

        assert_eq!(next_received(&mut manager).await, battery);
    }

    #[tokio::test]
    async fn test_corrupt_length_forces_reconnect() {
        let (mut manager, mut driver) = manager();

        let mut bytes = BytesMut::new();
        bytes.put_u32(u32::MAX);
        driver.write_all(&bytes).await.expect("write");

        let mut saw_disconnect = false;
        while let Some(event) = manager.recv().await {
            match event {
                ChannelEvent::Disconnected { reason } => {
                    assert!(reason.contains("corrupted"));
                    saw_disconnect = true;
                }
                // The connector has no second stream to give out
                ChannelEvent::ConnectionFailed { .. } => break,
                _ => {}
            }
        }
        assert!(saw_disconnect);
    }

    #[test]
    fn test_drain_counts_stale_messages() {
        let (tx, mut rx) = mpsc::channel(4);
        tx.try_send(Envelope::drone_command("w")).expect("send");
        tx.try_send(Envelope::drone_command("release-w")).expect("send");
        assert_eq!(drain(&mut rx), (2, None));
        assert_eq!(drain(&mut rx), (0, None));
    }

    #[test]
    fn test_drain_keeps_newest_stream_control() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.try_send(Envelope::bare(events::START_STREAM)).expect("send");
        tx.try_send(Envelope::drone_command("w")).expect("send");
        tx.try_send(Envelope::bare(events::STOP_STREAM)).expect("send");
        tx.try_send(Envelope::bare(events::START_STREAM)).expect("send");
        tx.try_send(Envelope::drone_command("release-w")).expect("send");

        assert_eq!(
            drain(&mut rx),
            (4, Some(Envelope::bare(events::START_STREAM)))
        );
    }

    #[tokio::test]
    async fn test_start_stream_queued_offline_sent_after_connect() {
        let (client, mut driver) = tokio::io::duplex(64 * 1024);
        let connector = DuplexConnector {
            stream: Mutex::new(Some(client)),
        };
        let (outbound_tx, outbound_rx) = mpsc::channel(8);
        let (event_tx, mut event_rx) = mpsc::channel(8);
        outbound_tx
            .try_send(Envelope::drone_command("w"))
            .expect("send");
        outbound_tx
            .try_send(Envelope::bare(events::START_STREAM))
            .expect("send");
        tokio::spawn(connection_loop(connector, fast_config(), outbound_rx, event_tx));

        assert!(matches!(
            event_rx.recv().await,
            Some(ChannelEvent::Connected { .. })
        ));
        outbound_tx
            .send(Envelope::drone_command("a"))
            .await
            .expect("send");

        let mut decoder = FrameDecoder::new();
        let mut buf = [0u8; 256];
        let mut seen = Vec::new();
        while seen.len() < 2 {
            let n = driver.read(&mut buf).await.expect("read");
            decoder.extend(&buf[..n]);
            while let Some(envelope) = decoder.decode_next().expect("decode") {
                seen.push(envelope);
            }
        }
        assert_eq!(
            seen,
            vec![Envelope::bare(events::START_STREAM), Envelope::drone_command("a")]
        );
    }
}
