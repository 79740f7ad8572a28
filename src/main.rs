mod app;
mod config;
mod connection;
mod error;
mod input;
mod session;
mod terminal;
mod transport;

use app::{App, Flow};
use clap::Parser;
use config::{Args, ClientConfig};
use connection::{ChannelManager, ConnectionController, HttpControlChannel};
use crossterm::event::EventStream;
use futures::StreamExt;
use session::SessionStore;
use std::sync::Arc;
use terminal::Terminal;
use tokio::sync::mpsc;
use transport::TcpConnector;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = ClientConfig::from(Args::parse());

    // Log to a file; the terminal is in raw mode
    config.ensure_log_dir()?;
    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "teleop-client.log");
    let (log_writer, _log_guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(log_writer).with_ansi(false))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    info!("Teleop client starting");
    info!("  control channel: {}", config.control_url);
    info!("  event channel: {}", config.stream.address);

    let mut channel = ChannelManager::new(
        TcpConnector::new(config.stream.address.clone()),
        config.stream.clone(),
    );
    let control = HttpControlChannel::new(&config.control_url, config.request_timeout)?;

    let (store, writers) = SessionStore::new();
    let mut session_rx = store.subscribe();
    let controller = Arc::new(ConnectionController::new(
        control,
        channel.sender(),
        store,
        writers,
    ));

    let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();
    let mut app = App::new(controller, notice_tx);

    let mut term = Terminal::enter()?;
    term.print_help()?;
    term.print_status(&session_rx.borrow_and_update().clone())?;

    let mut keys = EventStream::new();

    // Main event loop
    'main: loop {
        tokio::select! {
            key = keys.next() => match key {
                Some(Ok(event)) => {
                    for input in term.translate(&event) {
                        if app.handle_input(input) == Flow::Quit {
                            break 'main;
                        }
                    }
                }
                Some(Err(e)) => {
                    error!("Terminal input failed: {}", e);
                    break;
                }
                None => break,
            },
            Some(event) = channel.recv() => app.handle_channel(event),
            Some(notice) = notice_rx.recv() => term.print_notice(&notice)?,
            changed = session_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let session = session_rx.borrow_and_update().clone();
                term.print_status(&session)?;
            }
        }
    }

    info!("Teleop client shutting down");
    Ok(())
}
