//! High-level runtime orchestrator.
//!
//! The runtime owns the session worker, wires up command/event channels, and
//! exposes a builder-based API for hosting or joining a session.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::ToSocketAddrs;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use game_core::{CommandRegistry, GameConfig, GameState, PlayerId};

use crate::api::{Result, RuntimeHandle, SessionError};
use crate::config::RuntimeConfig;
use crate::events::EventBus;
use crate::net::{ClientLink, ConnectionString, tcp};
use crate::session::{AuthoritySession, FollowerSession, Session};
use crate::workers::SessionWorker;

/// Running session plus the task that drives it.
///
/// [`RuntimeHandle`] provides a cloneable façade for clients.
pub struct Runtime {
    handle: RuntimeHandle,
    local_addr: Option<SocketAddr>,
    worker: JoinHandle<Result<()>>,
}

impl Runtime {
    /// Create a new runtime builder
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Get a cloneable handle to this runtime
    pub fn handle(&self) -> RuntimeHandle {
        self.handle.clone()
    }

    /// Listening address when hosting over TCP.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Waits until the session ends on its own and returns why.
    pub async fn wait(self) -> Result<()> {
        self.worker.await.map_err(SessionError::WorkerJoin)?
    }

    /// Closes or leaves the session and waits for the worker.
    pub async fn shutdown(self) -> Result<()> {
        // The worker may already have stopped; its result is what matters.
        let _ = self.handle.shutdown().await;
        drop(self.handle);
        self.worker.await.map_err(SessionError::WorkerJoin)?
    }
}

/// Builder for [`Runtime`] with flexible configuration.
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    game_config: GameConfig,
    state: Option<GameState>,
    registry: Option<Arc<CommandRegistry>>,
    player: PlayerId,
    name: String,
}

impl RuntimeBuilder {
    fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            game_config: GameConfig::default(),
            state: None,
            registry: None,
            player: PlayerId(0),
            name: String::from("player"),
        }
    }

    /// Override runtime configuration
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// World parameters used when hosting without an explicit state.
    pub fn game_config(mut self, game_config: GameConfig) -> Self {
        self.game_config = game_config;
        self
    }

    /// Provide the initial world when hosting.
    pub fn initial_state(mut self, state: GameState) -> Self {
        self.state = Some(state);
        self
    }

    /// Command table; defaults to [`CommandRegistry::standard`]. Every
    /// instance of a session must use the same table.
    pub fn registry(mut self, registry: CommandRegistry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    /// Participant this instance acts for.
    pub fn player(mut self, player: PlayerId) -> Self {
        self.player = player;
        self
    }

    /// Name announced to the other peers when joining.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Hosts a session, accepting followers on `addr`.
    pub async fn host<A: ToSocketAddrs>(self, addr: A) -> Result<Runtime> {
        self.config.validate()?;
        let acceptor = tcp::Acceptor::bind(addr, self.config.net.max_packet_size).await?;
        let local_addr = acceptor.local_addr();
        let mut runtime = self.spawn_with(|builder, registry, events| {
            let state = builder
                .state
                .take()
                .unwrap_or_else(|| GameState::new(&builder.game_config));
            Ok(Box::new(
                AuthoritySession::new(
                    builder.config.clone(),
                    registry,
                    state,
                    builder.player,
                    events,
                )
                .with_acceptor(acceptor),
            ))
        })?;
        runtime.local_addr = Some(local_addr);
        Ok(runtime)
    }

    /// Runs an authority without a listener. Until a peer is attached,
    /// commands are committed on the tick they are issued.
    pub fn spawn_authority(self) -> Result<Runtime> {
        self.config.validate()?;
        self.spawn_with(|builder, registry, events| {
            let state = builder
                .state
                .take()
                .unwrap_or_else(|| GameState::new(&builder.game_config));
            Ok(Box::new(AuthoritySession::new(
                builder.config.clone(),
                registry,
                state,
                builder.player,
                events,
            )))
        })
    }

    /// Joins the session at `address` over TCP.
    pub async fn join(mut self, address: &ConnectionString) -> Result<Runtime> {
        self.config.validate()?;
        if let Some(player) = address.player {
            self.player = player;
        }
        let link = tcp::connect(address.socket_addr(), self.config.net.max_packet_size).await?;
        info!(target: "runtime", %address, "connected to authority");
        self.spawn_follower(link)
    }

    /// Joins a session over an existing link.
    pub fn spawn_follower(self, link: ClientLink) -> Result<Runtime> {
        self.config.validate()?;
        self.spawn_with(|builder, registry, events| {
            Ok(Box::new(FollowerSession::join(
                builder.config.clone(),
                registry,
                link,
                &builder.name,
                builder.player,
                events,
            )?))
        })
    }

    fn spawn_with<F>(mut self, make: F) -> Result<Runtime>
    where
        F: FnOnce(&mut Self, Arc<CommandRegistry>, EventBus) -> Result<Box<dyn Session>>,
    {
        let registry = self
            .registry
            .take()
            .unwrap_or_else(|| Arc::new(CommandRegistry::standard()));
        let events = EventBus::with_capacity(self.config.event_capacity);
        let session = make(&mut self, registry, events.clone())?;

        let (command_tx, command_rx) = mpsc::channel(self.config.command_buffer.max(1));
        let worker = SessionWorker::new(session, command_rx, self.config.tick_interval);
        let worker = tokio::spawn(worker.run());

        Ok(Runtime {
            handle: RuntimeHandle::new(command_tx, events),
            local_addr: None,
            worker,
        })
    }
}
