//! Session driver - feeds transport traffic, local input, bomb ticks and the
//! sprite load into the sync controller, one event at a time

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::game::bomb::{BombId, BombSprite, SpriteError};
use crate::game::countdown::CountdownScheduler;
use crate::game::grid::Direction;
use crate::game::presenter::Presenter;
use crate::metrics::Metrics;
use crate::net::connection::Connection;
use crate::net::protocol::{ClientEvent, ServerEvent};
use crate::net::sync::{ApplyOutcome, SyncController};
use crate::net::transport::{Transport, TransportError, TransportEvent};

/// Pending sprite load
pub type SpriteTask = JoinHandle<Result<BombSprite, SpriteError>>;

/// Everything the session loop listens to
pub struct SessionInputs {
    pub events: mpsc::Receiver<TransportEvent>,
    pub directions: mpsc::Receiver<Direction>,
    pub ticks: mpsc::UnboundedReceiver<BombId>,
    pub sprite: Option<SpriteTask>,
}

/// One client session against one server connection
pub struct Session<P, S, T> {
    controller: SyncController<P, S>,
    transport: T,
    connection: Connection,
    metrics: Arc<Metrics>,
}

impl<P: Presenter, S: CountdownScheduler, T: Transport> Session<P, S, T> {
    pub fn new(controller: SyncController<P, S>, transport: T, url: impl Into<String>, metrics: Arc<Metrics>) -> Self {
        Self {
            controller,
            transport,
            connection: Connection::new(url),
            metrics,
        }
    }

    pub fn controller(&self) -> &SyncController<P, S> {
        &self.controller
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Run until the transport closes.
    ///
    /// Returns an error only if sending fails; bad server input is logged,
    /// counted and skipped.
    pub async fn run(&mut self, inputs: SessionInputs) -> anyhow::Result<()> {
        let SessionInputs {
            mut events,
            mut directions,
            mut ticks,
            mut sprite,
        } = inputs;

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        debug!("Transport event stream ended");
                        self.connection.mark_disconnected(None);
                        break;
                    };
                    if !self.handle_transport(event)? {
                        break;
                    }
                }
                Some(direction) = directions.recv() => {
                    self.handle_direction(direction)?;
                }
                Some(id) = ticks.recv() => {
                    self.handle_tick(&id);
                }
                loaded = sprite_ready(&mut sprite), if sprite.is_some() => {
                    sprite = None;
                    match loaded {
                        Some(result) => self.handle_sprite(result),
                        None => warn!("Bomb sprite task failed"),
                    }
                }
            }
        }

        info!(
            "Session ended after {} messages in / {} out{}",
            self.connection.messages_received,
            self.connection.messages_sent,
            self.connection
                .close_reason
                .as_deref()
                .map(|r| format!(" ({})", r))
                .unwrap_or_default()
        );
        Ok(())
    }

    /// Handle one transport notification. Returns false once the connection is gone.
    pub fn handle_transport(&mut self, event: TransportEvent) -> Result<bool, TransportError> {
        match event {
            TransportEvent::Connected => {
                self.connection.mark_connected();
                self.send(ClientEvent::Init)?;
                Ok(true)
            }
            TransportEvent::Message(text) => {
                self.handle_message(&text);
                Ok(true)
            }
            TransportEvent::Closed(reason) => {
                info!("Connection closed{}", reason.as_deref().map(|r| format!(": {}", r)).unwrap_or_default());
                self.connection.mark_disconnected(reason);
                Ok(false)
            }
        }
    }

    /// Decode and apply one server message
    pub fn handle_message(&mut self, text: &str) {
        self.connection.record_received(text.len());
        self.metrics.record_received(text.len());

        let event = match ServerEvent::decode(text) {
            Ok(event) => event,
            Err(e) => {
                warn!("Discarding server message: {}", e);
                self.metrics.protocol_errors.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let name = event.name();
        let start = Instant::now();
        let result = self.controller.apply(event);
        self.metrics.record_apply_time(start.elapsed());

        match result {
            Ok(ApplyOutcome::Applied) => {}
            Ok(ApplyOutcome::DroppedWhileLoading) => {
                self.metrics.dropped_while_loading.fetch_add(1, Ordering::Relaxed);
            }
            Ok(ApplyOutcome::Ignored) => {
                debug!("Ignored {} for local worm", name);
                self.metrics.ignored_events.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                error!("Rejected {}: {}", name, e);
                self.metrics.controller_errors.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.refresh_gauges();
    }

    /// Handle a pressed direction and send whatever the controller produces
    pub fn handle_direction(&mut self, direction: Direction) -> Result<(), TransportError> {
        let outbound = self.controller.on_direction(direction);
        if !outbound.is_empty() {
            self.metrics.local_moves.fetch_add(1, Ordering::Relaxed);
        }
        for event in outbound {
            self.send(event)?;
        }
        self.refresh_gauges();
        Ok(())
    }

    pub fn handle_tick(&mut self, id: &BombId) {
        if self.controller.tick_bomb(id) {
            self.metrics.bomb_ticks.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn handle_sprite(&mut self, result: Result<BombSprite, SpriteError>) {
        match result {
            Ok(sprite) => {
                info!("Bomb sprite {} loaded ({} bytes)", sprite.name(), sprite.len());
                self.controller.attach_bomb_sprite(sprite);
            }
            // Bombs keep rendering without an image
            Err(e) => warn!("Bomb sprite unavailable: {}", e),
        }
    }

    fn send(&mut self, event: ClientEvent) -> Result<(), TransportError> {
        let text = event.encode();
        let len = text.len();
        self.transport.send(text)?;
        self.connection.record_sent(len);
        self.metrics.record_sent(len);
        Ok(())
    }

    fn refresh_gauges(&self) {
        let world = self.controller.world();
        self.metrics.set_world(
            self.controller.is_running(),
            world.worm_count(),
            world.food().len(),
            world.bomb_count(),
        );
    }
}

async fn sprite_ready(task: &mut Option<SpriteTask>) -> Option<Result<BombSprite, SpriteError>> {
    match task.as_mut() {
        Some(handle) => handle.await.ok(),
        None => std::future::pending().await,
    }
}
