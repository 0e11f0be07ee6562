use serde::{Deserialize, Serialize};

/// Current protocol version.  Bump this when the wire format changes in a
/// breaking way.  Knob bridges and panel drivers check this on connect.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest frame body accepted from a peer.  Knob commands are a few dozen
/// bytes; anything near this is a broken or hostile client.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Which of the two physical encoders an input came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Knob {
    /// Rotation changes volume, release toggles mute.
    Volume,
    /// Rotation browses stations, short press confirms, long press refreshes.
    Channel,
}

/// Raw encoder input.  One detent of rotation is a delta of ±1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum KnobAction {
    Rotate { delta: i32 },
    Pressed,
    Released,
}

/// Messages sent from a knob bridge (or any client) to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Command {
    Knob { knob: Knob, action: KnobAction },
    /// Re-announce the current station list (same as a long press).
    Refresh,
    /// Reload the station list from its configured source, then refresh.
    ReloadCatalog,
    GetStatus,
}

/// Messages sent from the daemon to clients (broadcasts)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "broadcast")]
pub enum Broadcast {
    /// Sent immediately on connect: protocol version + full status snapshot.
    Hello {
        protocol_version: u32,
        status: PlayerStatus,
    },
    Status {
        data: PlayerStatus,
    },
    /// The view the panel should show right now, already laid out as text.
    View {
        view: View,
        lines: Vec<String>,
    },
    Log {
        message: String,
    },
}

/// What the display shows.  Exactly one of these is active at any time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum View {
    EmptyCatalog,
    Offline,
    Muted,
    Normal {
        name: String,
        volume: u8,
        title: String,
    },
    Volume {
        volume: u8,
    },
    Pick {
        index: usize,
        name: String,
    },
    Title {
        title: String,
    },
}

impl View {
    /// Short mode label for status lines and logs.
    pub fn label(&self) -> &'static str {
        match self {
            View::EmptyCatalog => "EMPTY",
            View::Offline => "OFFLINE",
            View::Muted => "MUTE",
            View::Normal { .. } => "NORMAL",
            View::Volume { .. } => "VOLUME",
            View::Pick { .. } => "PICK",
            View::Title { .. } => "TITLE",
        }
    }
}

/// Snapshot of the controller published after every handled event.  `rev` is
/// a monotonically increasing counter so clients can detect missed updates.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlayerStatus {
    #[serde(default)]
    pub rev: u64,
    pub stations: Vec<Station>,
    pub playing_index: Option<usize>,
    pub picking_index: Option<usize>,
    pub volume: u8,
    pub muted: bool,
    pub title: String,
    pub online: bool,
    pub view: Option<View>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Station {
    pub name: String,
    pub url: String,
    /// Short description / blurb
    #[serde(default)]
    pub description: String,
    /// Parent network or brand (e.g. "SomaFM", "BBC")
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
}

impl Station {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            ..Self::default()
        }
    }
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

    pub fn decode(data: &[u8]) -> anyhow::Result<(Self, usize)> {
        if data.len() < 4 {
            anyhow::bail!("Insufficient data for length header");
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if len > MAX_FRAME_LEN {
            anyhow::bail!("Frame of {} bytes exceeds limit of {}", len, MAX_FRAME_LEN);
        }
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
    fn test_knob_command_encode_decode() {
        let msg = Message::Command(Command::Knob {
            knob: Knob::Channel,
            action: KnobAction::Rotate { delta: -1 },
        });
        let encoded = msg.encode().unwrap();
        let (decoded, len) = Message::decode(&encoded).unwrap();
        assert_eq!(len, encoded.len());
        match decoded {
            Message::Command(Command::Knob { knob, action }) => {
                assert_eq!(knob, Knob::Channel);
                assert_eq!(action, KnobAction::Rotate { delta: -1 });
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_decode_rejects_oversized_frame() {
        let mut frame = ((MAX_FRAME_LEN + 1) as u32).to_be_bytes().to_vec();
        frame.extend_from_slice(b"{}");
        assert!(Message::decode(&frame).is_err());
    }

    #[test]
    fn test_knob_command_wire_shape() {
        let json = r#"{"cmd":"Knob","knob":"volume","action":{"kind":"released"}}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        match msg {
            Message::Command(Command::Knob { knob, action }) => {
                assert_eq!(knob, Knob::Volume);
                assert_eq!(action, KnobAction::Released);
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_hello_encode_decode() {
        let status = PlayerStatus {
            rev: 42,
            view: Some(View::Muted),
            ..Default::default()
        };
        let msg = Message::Broadcast(Broadcast::Hello {
            protocol_version: PROTOCOL_VERSION,
            status,
        });
        let encoded = msg.encode().unwrap();
        let (decoded, _) = Message::decode(&encoded).unwrap();
        match decoded {
            Message::Broadcast(Broadcast::Hello {
                protocol_version,
                status,
            }) => {
                assert_eq!(protocol_version, PROTOCOL_VERSION);
                assert_eq!(status.rev, 42);
                assert_eq!(status.view, Some(View::Muted));
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_decode_waits_for_full_frame() {
        let encoded = Message::Command(Command::Refresh).encode().unwrap();
        assert!(Message::decode(&encoded[..3]).is_err());
        assert!(Message::decode(&encoded[..encoded.len() - 1]).is_err());
    }
}
