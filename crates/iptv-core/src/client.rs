//! Cloneable front door to a running SessionCore.
//!
//! Every method enqueues a command and waits for the loop to reply, so calls
//! from different tasks are applied in arrival order.

use std::sync::Arc;

use iptv_proto::catalog::Catalog;
use iptv_proto::protocol::{Command, Direction, LifecycleSignal, SessionState};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::error::SessionError;
use crate::session::{CoreEvent, Outcome, Selected};
use crate::state::StateManager;
use crate::switcher::StepOutcome;
use crate::BroadcastMessage;

#[derive(Clone)]
pub struct SessionClient {
    event_tx: mpsc::Sender<CoreEvent>,
    state_manager: Arc<StateManager>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
}

impl SessionClient {
    pub fn new(
        event_tx: mpsc::Sender<CoreEvent>,
        state_manager: Arc<StateManager>,
        broadcast_tx: broadcast::Sender<BroadcastMessage>,
    ) -> Self {
        Self {
            event_tx,
            state_manager,
            broadcast_tx,
        }
    }

    /// Enqueue a command and wait for its result.
    pub async fn send(&self, command: Command) -> Result<Outcome, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.event_tx
            .send(CoreEvent::Command {
                command,
                reply: Some(reply),
            })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    pub async fn select_channel(&self, url: &str) -> Result<Selected, SessionError> {
        match self
            .send(Command::Select {
                url: url.to_string(),
            })
            .await?
        {
            Outcome::Selected(selected) => Ok(selected),
            _ => Err(SessionError::Closed),
        }
    }

    pub async fn pick(&self, index: usize) -> Result<Selected, SessionError> {
        match self.send(Command::Pick { index }).await? {
            Outcome::Selected(selected) => Ok(selected),
            _ => Err(SessionError::Closed),
        }
    }

    pub async fn step(&self, direction: Direction) -> Result<StepOutcome, SessionError> {
        match self.send(Command::Step { direction }).await? {
            Outcome::Stepped(outcome) => Ok(outcome),
            _ => Err(SessionError::Closed),
        }
    }

    pub async fn pause(&self) -> Result<(), SessionError> {
        self.send(Command::Pause).await.map(|_| ())
    }

    pub async fn resume(&self) -> Result<(), SessionError> {
        self.send(Command::Resume).await.map(|_| ())
    }

    pub async fn stop(&self) -> Result<(), SessionError> {
        self.send(Command::Stop).await.map(|_| ())
    }

    pub async fn release(&self) -> Result<(), SessionError> {
        self.send(Command::Release).await.map(|_| ())
    }

    pub async fn lifecycle(&self, signal: LifecycleSignal) -> Result<(), SessionError> {
        self.send(Command::Lifecycle { signal }).await.map(|_| ())
    }

    /// Start fetching the configured playlist.  Returns once the fetch is
    /// under way; the result arrives as a state update.
    pub async fn reload_playlist(&self) -> Result<(), SessionError> {
        self.send(Command::ReloadPlaylist).await.map(|_| ())
    }

    /// Hand the core a channel list obtained elsewhere.
    pub async fn load_catalog(&self, catalog: Catalog) -> Result<(), SessionError> {
        self.event_tx
            .send(CoreEvent::CatalogLoaded(catalog))
            .await
            .map_err(|_| SessionError::Closed)?;
        // Round-trip so the catalog is installed when this returns.
        self.send(Command::GetState).await.map(|_| ())
    }

    pub async fn shutdown(&self) {
        let _ = self.event_tx.send(CoreEvent::Shutdown).await;
    }

    pub async fn snapshot(&self) -> SessionState {
        self.state_manager.get_state().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastMessage> {
        self.broadcast_tx.subscribe()
    }

    pub fn state_manager(&self) -> Arc<StateManager> {
        Arc::clone(&self.state_manager)
    }
}
