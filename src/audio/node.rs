use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::time::Duration;
use thiserror::Error;

use super::queue::Track;

/// Conexión de un guild con el nodo de audio. El nodo identifica al player
/// por guild, el canal se guarda para los movimientos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHandle {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
}

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("el nodo de audio todavía no tiene sesión")]
    NotReady,
    #[error("no se pudo conectar al canal de voz: {0}")]
    Voice(String),
    #[error("error de websocket: {0}")]
    Socket(String),
    #[error("error HTTP con el nodo: {0}")]
    Http(#[from] reqwest::Error),
    #[error("el nodo respondió {status}: {body}")]
    Status { status: u16, body: String },
    #[error("payload inválido del nodo: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Motivo de fin de track reportado por el nodo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackEndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup,
}

impl TrackEndReason {
    /// Fin natural: solo estos motivos avanzan la cola
    pub fn may_start_next(self) -> bool {
        matches!(self, TrackEndReason::Finished | TrackEndReason::LoadFailed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    TrackStarted {
        guild_id: GuildId,
        track: Track,
    },
    TrackFinished {
        guild_id: GuildId,
        track: Track,
        reason: TrackEndReason,
    },
    TrackStuck {
        guild_id: GuildId,
        track: Track,
        threshold: Duration,
    },
    TrackException {
        guild_id: GuildId,
        track: Track,
        message: String,
    },
    PlayerUpdated {
        guild_id: GuildId,
        position: Duration,
    },
    /// El socket de voz de Discord de un guild se cerró
    VoiceClosed {
        guild_id: GuildId,
        code: u16,
        reason: String,
        by_remote: bool,
    },
    /// Se perdió la conexión con el nodo: afecta a todos los guilds
    SocketClosed {
        code: u16,
        reason: String,
        by_remote: bool,
    },
}

/// Resultado de resolver un identificador o búsqueda en el nodo
#[derive(Debug, Clone, PartialEq)]
pub enum LoadResult {
    Track(Track),
    Playlist { name: String, tracks: Vec<Track> },
    Search(Vec<Track>),
    Empty,
    Error(String),
}

impl LoadResult {
    /// Primer track reproducible del resultado
    pub fn first_track(self) -> Option<Track> {
        match self {
            LoadResult::Track(track) => Some(track),
            LoadResult::Playlist { tracks, .. } | LoadResult::Search(tracks) => {
                tracks.into_iter().next()
            }
            LoadResult::Empty | LoadResult::Error(_) => None,
        }
    }
}

/// Cliente del nodo de streaming. Los eventos llegan por un canal aparte
/// (ver [`super::lavalink::LavalinkNode::new`]).
#[async_trait]
pub trait AudioNode: Send + Sync {
    async fn connect(
        &self,
        guild_id: GuildId,
        voice_channel: ChannelId,
    ) -> Result<NodeHandle, NodeError>;

    async fn disconnect(&self, handle: &NodeHandle) -> Result<(), NodeError>;

    async fn move_channel(
        &self,
        handle: &NodeHandle,
        channel_id: ChannelId,
    ) -> Result<NodeHandle, NodeError>;

    async fn play(&self, handle: &NodeHandle, track: &Track) -> Result<(), NodeError>;

    async fn pause(&self, handle: &NodeHandle) -> Result<(), NodeError>;

    async fn resume(&self, handle: &NodeHandle) -> Result<(), NodeError>;

    async fn stop(&self, handle: &NodeHandle) -> Result<(), NodeError>;

    async fn seek(&self, handle: &NodeHandle, position: Duration) -> Result<(), NodeError>;

    async fn set_volume(&self, handle: &NodeHandle, volume: u16) -> Result<(), NodeError>;

    async fn load_tracks(&self, identifier: &str) -> Result<LoadResult, NodeError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::queue::tests::track;

    #[test]
    fn test_only_natural_end_starts_next() {
        assert!(TrackEndReason::Finished.may_start_next());
        assert!(TrackEndReason::LoadFailed.may_start_next());
        assert!(!TrackEndReason::Stopped.may_start_next());
        assert!(!TrackEndReason::Replaced.may_start_next());
        assert!(!TrackEndReason::Cleanup.may_start_next());
    }

    #[test]
    fn test_first_track_of_results() {
        let playlist = LoadResult::Playlist {
            name: "mix".to_string(),
            tracks: vec![track("a"), track("b")],
        };
        assert_eq!(playlist.first_track().map(|t| t.title), Some("a".to_string()));
        assert_eq!(LoadResult::Search(vec![]).first_track(), None);
        assert_eq!(LoadResult::Error("boom".into()).first_track(), None);
    }
}
