//! Application glue between operator input, the persistent channel and the
//! connection controller

use std::sync::Arc;
use teleop_shared::TelemetrySample;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::connection::{ChannelEvent, ConnectionController, ControlChannel};
use crate::error::UnmappedInput;
use crate::input::{InputEvent, InputRouter, Routed, UiAction};

/// Something the operator should see
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Info(String),
    Error(String),
    /// Charted distance series (outliers removed)
    Chart(Vec<TelemetrySample>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct App<C> {
    controller: Arc<ConnectionController<C>>,
    router: InputRouter,
    notices: mpsc::UnboundedSender<Notice>,
}

impl<C: ControlChannel + 'static> App<C> {
    pub fn new(
        controller: Arc<ConnectionController<C>>,
        notices: mpsc::UnboundedSender<Notice>,
    ) -> Self {
        Self {
            controller,
            router: InputRouter::new(),
            notices,
        }
    }

    pub fn handle_input(&mut self, event: InputEvent) -> Flow {
        let link = self.controller.store().connection();
        match event {
            InputEvent::KeyDown(key) => {
                let routed = self.router.key_down(&key, link);
                self.route(routed);
            }
            InputEvent::KeyUp(key) => {
                let routed = self.router.key_up(&key, link);
                self.route(routed);
            }
            InputEvent::Action(UiAction::Connect) => {
                let controller = self.controller.clone();
                let notices = self.notices.clone();
                tokio::spawn(async move {
                    let notice = match controller.connect().await {
                        Ok(ack) => Notice::Info(ack.message),
                        Err(e) => Notice::Error(e.to_string()),
                    };
                    let _ = notices.send(notice);
                });
            }
            InputEvent::Action(UiAction::Disconnect) => {
                self.controller.disconnect();
                self.router.reset();
                self.notify(Notice::Info("Disconnected".into()));
            }
            InputEvent::Action(UiAction::Command(cmd)) => {
                let controller = self.controller.clone();
                let notices = self.notices.clone();
                tokio::spawn(async move {
                    let notice = match controller.perform(cmd).await {
                        Ok(outcome) => Notice::Info(outcome.to_string()),
                        Err(e) => {
                            warn!("{}", e);
                            Notice::Error(e.to_string())
                        }
                    };
                    let _ = notices.send(notice);
                });
            }
            InputEvent::Action(UiAction::ShowChart) => {
                self.notify(Notice::Chart(self.controller.store().chart_series()));
            }
            InputEvent::Action(UiAction::Quit) => return Flow::Quit,
        }
        Flow::Continue
    }

    pub fn handle_channel(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected { peer } => {
                self.notify(Notice::Info(format!("Event channel up ({})", peer)));
            }
            ChannelEvent::Disconnected { reason } => {
                self.notify(Notice::Error(format!("Event channel down: {}", reason)));
            }
            ChannelEvent::ConnectionFailed { reason } => {
                debug!("Event channel unavailable: {}", reason);
            }
            ChannelEvent::Received(envelope) => {
                if let Some(notice) = self.controller.handle_inbound(&envelope) {
                    self.notify(Notice::Error(notice));
                }
            }
        }
    }

    fn route(&self, routed: Result<Routed, UnmappedInput>) {
        match routed {
            Ok(Routed::Emit(cmd)) => {
                self.controller.send_command(cmd);
            }
            Ok(Routed::Suppressed(cmd)) => debug!("Link down, not sending {}", cmd),
            Ok(Routed::NoTransition) => {}
            Err(unmapped) => debug!("{}", unmapped),
        }
    }

    fn notify(&self, notice: Notice) {
        if self.notices.send(notice).is_err() {
            info!("Notice dropped: front end has gone away");
        }
    }
}
