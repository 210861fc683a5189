//! Capability boundary between the session manager and a native player.
//!
//! A backend builds opaque handles, one per decode/render pipeline.  The
//! session manager is the only caller and never holds more than one live
//! handle.  `release` consumes the handle, so a released handle cannot be
//! touched again.

use async_trait::async_trait;
use iptv_proto::locator::MediaLocator;
use iptv_proto::protocol::PlaybackStatus;
use tokio::sync::mpsc;

use crate::error::EngineError;

/// State changes observed on a native player (not controlled by the core).
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// First frames are flowing, or flowing again after a stall.
    Ready,
    /// Playback stalled waiting for data.
    Buffering,
    /// The source reached its end.
    Ended,
    /// Mid-playback failure.  The handle stays allocated.
    Error(String),
}

impl EngineEvent {
    /// Next status after this event, or `None` when the event does not move
    /// the state machine from `current`.
    pub fn next_status(&self, current: PlaybackStatus) -> Option<PlaybackStatus> {
        use PlaybackStatus::*;
        match (self, current) {
            (EngineEvent::Ready, Loading | Buffering) => Some(Ready),
            (EngineEvent::Buffering, Ready) => Some(Buffering),
            (EngineEvent::Ended, Ready | Buffering) => Some(Ended),
            // A live source that ends before its first frame never became ready.
            (EngineEvent::Ended, Loading) => Some(Error),
            (EngineEvent::Error(_), Loading | Ready | Buffering) => Some(Error),
            _ => None,
        }
    }
}

#[async_trait]
pub trait PlayerBackend: Send + Sync + 'static {
    type Handle: Send + 'static;

    /// Construct a new native player prepared for `locator`'s pipeline.
    async fn build(&self, locator: &MediaLocator) -> Result<Self::Handle, EngineError>;

    /// Route the handle's engine events to `listener`.  Called once per handle.
    fn subscribe(&self, handle: &mut Self::Handle, listener: mpsc::Sender<EngineEvent>);

    /// Give the handle a resource to load, replacing whatever it had.
    async fn load(&self, handle: &mut Self::Handle, locator: &MediaLocator)
        -> Result<(), EngineError>;

    async fn play(&self, handle: &mut Self::Handle) -> Result<(), EngineError>;

    async fn pause(&self, handle: &mut Self::Handle) -> Result<(), EngineError>;

    /// Halt playback, keeping the handle allocated.
    async fn stop(&self, handle: &mut Self::Handle) -> Result<(), EngineError>;

    /// Stop, clear queued media and free the native resources.
    async fn release(&self, handle: Self::Handle);
}
