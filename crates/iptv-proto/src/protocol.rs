use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current protocol version.  Bump this when the wire format changes in a
/// breaking way.  Clients check this on connect and can refuse to talk to an
/// incompatible daemon.
pub const PROTOCOL_VERSION: u32 = 1;

/// Messages sent from a screen/client to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Command {
    /// Play an arbitrary url (validated by the core).
    Select { url: String },
    /// Direct pick from a channel list; bypasses the switch debounce.
    Pick { index: usize },
    /// Directional channel stepping (remote control up/down).
    Step { direction: Direction },
    Pause,
    Resume,
    Stop,
    Release,
    Lifecycle { signal: LifecycleSignal },
    ReloadPlaylist,
    GetState,
}

/// Messages sent from the daemon to clients (broadcasts)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "broadcast")]
pub enum Broadcast {
    /// Sent immediately on connect: daemon version + full state snapshot.
    Hello {
        protocol_version: u32,
        daemon_rev: u64,
        state: SessionState,
    },
    State {
        data: SessionState,
    },
    Playback {
        event: PlaybackEvent,
    },
    Log {
        message: String,
    },
    Error {
        message: String,
    },
}

/// Lifecycle of the single playback session.
///
/// Transitions:
///   Idle -> Loading -> Ready | Error
///   Ready -> Buffering | Ended | Error
///   Buffering -> Ready | Ended | Error
///   * -> Idle   (explicit stop / release)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Buffering,
    Ended,
    Error,
}

impl PlaybackStatus {
    /// True while a handle is expected to be producing (or about to produce) video.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            PlaybackStatus::Loading | PlaybackStatus::Ready | PlaybackStatus::Buffering
        )
    }
}

/// Playback transitions pushed to observers (overlays, status lines).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum PlaybackEvent {
    Loading { url: String },
    Ready { url: String },
    Buffering,
    Ended,
    Error { message: String },
    Idle,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl std::str::FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" | "prev" => Ok(Direction::Up),
            "down" | "next" => Ok(Direction::Down),
            other => anyhow::bail!("unknown direction '{}'", other),
        }
    }
}

/// Screen visibility signals forwarded by the presentation layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleSignal {
    EnteredForeground,
    EnteredBackground,
    Stopped,
    Destroyed,
}

impl std::str::FromStr for LifecycleSignal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "foreground" | "entered_foreground" | "resume" => Ok(Self::EnteredForeground),
            "background" | "entered_background" | "pause" => Ok(Self::EnteredBackground),
            "stopped" | "stop" => Ok(Self::Stopped),
            "destroyed" | "destroy" => Ok(Self::Destroyed),
            other => anyhow::bail!("unknown lifecycle signal '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "state")]
pub enum CatalogStatus {
    #[default]
    Empty,
    Loading,
    Loaded {
        count: usize,
    },
    Failed {
        message: String,
    },
}

/// Overlay hint for the channel banner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "show")]
pub enum Indicator {
    #[default]
    Hidden,
    /// A switch is pending; show the candidate channel as "selecting…".
    Selecting { index: usize },
    /// A switch was committed recently; show "now playing".
    NowPlaying { index: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingSwitchInfo {
    pub requested_index: usize,
    pub requested_at: DateTime<Utc>,
}

/// Full state of the playback core.  `rev` is a monotonically increasing
/// counter incremented every time the state changes.  Clients can use it to
/// detect missed updates and request a resync.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionState {
    #[serde(default)]
    pub rev: u64,
    pub channels: Vec<ChannelRecord>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub catalog_status: CatalogStatus,
    pub active_url: Option<String>,
    /// Catalog index of `active_url`, when it is a catalog channel.
    pub active_index: Option<usize>,
    pub status: PlaybackStatus,
    #[serde(default)]
    pub paused: bool,
    pub last_error: Option<String>,
    /// Last url that reached `Ready`; the retry candidate.
    pub last_good_url: Option<String>,
    /// Index shown in the channel banner (moves synchronously with input).
    pub display_index: Option<usize>,
    pub pending: Option<PendingSwitchInfo>,
    pub committed_index: Option<usize>,
    #[serde(default)]
    pub indicator: Indicator,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ChannelRecord {
    pub name: String,
    pub url: String,
    pub logo: Option<String>,
    pub group: Option<String>,
}

/// Wrapper for socket communication
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Command(Command),
    Broadcast(Broadcast),
}

impl Message {
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        let len = json.len() as u32;
        let mut result = Vec::with_capacity(4 + json.len());
        result.extend_from_slice(&len.to_be_bytes());
        result.extend_from_slice(&json);
        Ok(result)
    }

    /// Length of the first frame in `data` (header included), or `None`
    /// while the frame is still incomplete.
    pub fn frame_len(data: &[u8]) -> Option<usize> {
        if data.len() < 4 {
            return None;
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        (data.len() >= 4 + len).then_some(4 + len)
    }

    pub fn decode(data: &[u8]) -> anyhow::Result<(Self, usize)> {
        if data.len() < 4 {
            anyhow::bail!("Insufficient data for length header");
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if data.len() < 4 + len {
            anyhow::bail!("Insufficient data for message");
        }
        let msg: Self = serde_json::from_slice(&data[4..4 + len])?;
        Ok((msg, 4 + len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_encode_decode() {
        let msg = Message::Command(Command::Step {
            direction: Direction::Down,
        });
        let encoded = msg.encode().unwrap();
        let (decoded, len) = Message::decode(&encoded).unwrap();
        assert_eq!(len, encoded.len());
        match decoded {
            Message::Command(Command::Step { direction }) => assert_eq!(direction, Direction::Down),
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_hello_encode_decode() {
        let state = SessionState {
            rev: 42,
            status: PlaybackStatus::Buffering,
            indicator: Indicator::Selecting { index: 3 },
            ..Default::default()
        };
        let msg = Message::Broadcast(Broadcast::Hello {
            protocol_version: PROTOCOL_VERSION,
            daemon_rev: 42,
            state,
        });
        let encoded = msg.encode().unwrap();
        let (decoded, _) = Message::decode(&encoded).unwrap();
        match decoded {
            Message::Broadcast(Broadcast::Hello {
                protocol_version,
                daemon_rev,
                state,
            }) => {
                assert_eq!(protocol_version, PROTOCOL_VERSION);
                assert_eq!(daemon_rev, 42);
                assert_eq!(state.status, PlaybackStatus::Buffering);
                assert_eq!(state.indicator, Indicator::Selecting { index: 3 });
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_partial_frame_is_rejected() {
        let encoded = Message::Command(Command::Pause).encode().unwrap();
        assert!(Message::decode(&encoded[..2]).is_err());
        assert!(Message::decode(&encoded[..encoded.len() - 1]).is_err());
    }

    #[test]
    fn test_frame_len_covers_malformed_body() {
        let mut data = vec![0, 0, 0, 4];
        data.extend_from_slice(b"{bad");
        assert_eq!(Message::frame_len(&data[..3]), None);
        assert_eq!(Message::frame_len(&data[..6]), None);
        assert_eq!(Message::frame_len(&data), Some(8));
        assert!(Message::decode(&data).is_err());
    }

    #[test]
    fn test_lifecycle_wire_names() {
        let json = serde_json::to_string(&Command::Lifecycle {
            signal: LifecycleSignal::EnteredBackground,
        })
        .unwrap();
        assert_eq!(json, r#"{"cmd":"Lifecycle","signal":"entered_background"}"#);
        assert_eq!(
            "destroy".parse::<LifecycleSignal>().unwrap(),
            LifecycleSignal::Destroyed
        );
        assert!("sideways".parse::<Direction>().is_err());
    }
}
