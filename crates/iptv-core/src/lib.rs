pub mod backend;
pub mod client;
pub mod error;
pub mod overlay;
pub mod session;
pub mod state;
pub mod switcher;

use iptv_proto::protocol::PlaybackEvent;

pub use backend::{EngineEvent, PlayerBackend};
pub use client::SessionClient;
pub use error::{EngineError, SessionError};
pub use session::{CoreEvent, Outcome, Selected, SessionCore};
pub use state::StateManager;

/// Messages broadcast from the SessionCore to all listeners.
#[derive(Debug, Clone)]
pub enum BroadcastMessage {
    /// The SessionState has changed; receivers should fetch from StateManager.
    StateUpdated,
    /// A playback transition of the active session.
    Playback(PlaybackEvent),
    /// A log message, forwarded to connected clients.
    Log(String),
}
