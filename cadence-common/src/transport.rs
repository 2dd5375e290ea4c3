//! Host/UI boundary types
//!
//! Inbound: the `player-cmd` envelope `{ "cmd": ..., "payload": ... }` sent by
//! the host (tray, media keys, extensions) to the player core.
//! Outbound: notifications the core sends back on every state transition.
//!
//! Commands are a closed set; unknown tags and malformed payloads are rejected
//! at decode time rather than passed through.

use serde::{Deserialize, Serialize};

use crate::events::{CadenceEvent, PlayerState, RepeatMode};
use crate::media::MediaItem;
use crate::{Error, Result};

/// Player command received over the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "payload", rename_all = "kebab-case")]
pub enum PlayerCommand {
    SkipNext,
    SkipPrev,
    SetRepeatMode(RepeatMode),
    /// `Playing` resumes; any other state pauses
    SetPlayerState(PlayerState),
}

impl PlayerCommand {
    /// Decode a command envelope from an already-parsed JSON value
    pub fn decode(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| Error::InvalidCommand(e.to_string()))
    }

    /// Decode a command envelope from raw JSON text
    pub fn decode_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::InvalidCommand(e.to_string()))
    }
}

/// Notification pushed from the player core to the host process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "data", rename_all = "kebab-case")]
pub enum HostNotification {
    SyncCurrentMusic(Option<MediaItem>),
    SyncCurrentPlayingState(PlayerState),
    SyncCurrentRepeatMode(RepeatMode),
}

impl HostNotification {
    /// Map a core event to the host notification it implies, if any
    pub fn from_event(event: &CadenceEvent) -> Option<Self> {
        match event {
            CadenceEvent::CurrentMediaChanged { item, .. } => {
                Some(HostNotification::SyncCurrentMusic(item.clone()))
            }
            CadenceEvent::PlayerStateChanged { new_state, .. } => {
                Some(HostNotification::SyncCurrentPlayingState(*new_state))
            }
            CadenceEvent::RepeatModeChanged { mode, .. } => {
                Some(HostNotification::SyncCurrentRepeatMode(*mode))
            }
            _ => None,
        }
    }
}
