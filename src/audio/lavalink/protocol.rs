//! Modelos del protocolo Lavalink v4 (websocket y REST).

use serde::{Deserialize, Serialize};
use serenity::model::id::GuildId;
use std::time::Duration;

use crate::audio::{
    node::{LoadResult, NodeEvent, TrackEndReason},
    queue::Track,
};

/// Mensajes que el nodo envía por websocket
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum IncomingMessage {
    #[serde(rename_all = "camelCase")]
    Ready { resumed: bool, session_id: String },
    #[serde(rename_all = "camelCase")]
    PlayerUpdate { guild_id: String, state: PlayerState },
    Stats(serde_json::Value),
    Event(LavalinkEvent),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub time: u64,
    #[serde(default)]
    pub position: u64,
    pub connected: bool,
    #[serde(default)]
    pub ping: i64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum LavalinkEvent {
    #[serde(rename = "TrackStartEvent", rename_all = "camelCase")]
    TrackStart { guild_id: String, track: LavalinkTrack },
    #[serde(rename = "TrackEndEvent", rename_all = "camelCase")]
    TrackEnd {
        guild_id: String,
        track: LavalinkTrack,
        reason: EndReason,
    },
    #[serde(rename = "TrackExceptionEvent", rename_all = "camelCase")]
    TrackException {
        guild_id: String,
        track: LavalinkTrack,
        exception: Exception,
    },
    #[serde(rename = "TrackStuckEvent", rename_all = "camelCase")]
    TrackStuck {
        guild_id: String,
        track: LavalinkTrack,
        threshold_ms: u64,
    },
    #[serde(rename = "WebSocketClosedEvent", rename_all = "camelCase")]
    WebSocketClosed {
        guild_id: String,
        code: u16,
        reason: String,
        by_remote: bool,
    },
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup,
}

impl From<EndReason> for TrackEndReason {
    fn from(reason: EndReason) -> Self {
        match reason {
            EndReason::Finished => TrackEndReason::Finished,
            EndReason::LoadFailed => TrackEndReason::LoadFailed,
            EndReason::Stopped => TrackEndReason::Stopped,
            EndReason::Replaced => TrackEndReason::Replaced,
            EndReason::Cleanup => TrackEndReason::Cleanup,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exception {
    pub message: Option<String>,
    pub severity: String,
    pub cause: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LavalinkTrack {
    pub encoded: String,
    pub info: TrackInfo,
    #[serde(default)]
    pub user_data: TrackUserData,
}

/// Datos propios que el nodo guarda junto al track y devuelve en cada evento
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackUserData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub play_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub identifier: String,
    pub is_seekable: bool,
    pub author: String,
    pub length: u64,
    pub is_stream: bool,
    pub position: u64,
    pub title: String,
    pub uri: Option<String>,
    pub source_name: String,
}

impl From<LavalinkTrack> for Track {
    fn from(track: LavalinkTrack) -> Self {
        let info = track.info;
        let duration = (!info.is_stream && info.length > 0).then(|| Duration::from_millis(info.length));
        Track {
            encoded: track.encoded,
            identifier: info.identifier,
            title: info.title,
            author: info.author,
            duration,
            uri: info.uri,
            source_name: info.source_name,
            is_stream: info.is_stream,
            play_id: track.user_data.play_id,
        }
    }
}

/// Respuesta de `GET /v4/loadtracks`
#[derive(Debug, Deserialize)]
#[serde(tag = "loadType", content = "data", rename_all = "camelCase")]
pub enum LoadResponse {
    Track(LavalinkTrack),
    Playlist(PlaylistData),
    Search(Vec<LavalinkTrack>),
    Empty {},
    Error(Exception),
}

#[derive(Debug, Deserialize)]
pub struct PlaylistData {
    pub info: PlaylistInfo,
    pub tracks: Vec<LavalinkTrack>,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistInfo {
    pub name: String,
}

impl From<LoadResponse> for LoadResult {
    fn from(response: LoadResponse) -> Self {
        match response {
            LoadResponse::Track(track) => LoadResult::Track(track.into()),
            LoadResponse::Playlist(playlist) => LoadResult::Playlist {
                name: playlist.info.name,
                tracks: playlist.tracks.into_iter().map(Track::from).collect(),
            },
            LoadResponse::Search(tracks) => {
                LoadResult::Search(tracks.into_iter().map(Track::from).collect())
            }
            LoadResponse::Empty {} => LoadResult::Empty,
            LoadResponse::Error(exception) => LoadResult::Error(
                exception.message.unwrap_or(exception.cause),
            ),
        }
    }
}

/// Cuerpo de `PATCH /v4/sessions/{session}/players/{guild}`
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlayer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<UpdateTrack>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoiceCredentials>,
}

/// `encoded: null` detiene el track actual
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTrack {
    pub encoded: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<TrackUserData>,
}

impl UpdateTrack {
    pub fn play(track: &Track) -> Self {
        Self {
            encoded: Some(track.encoded.clone()),
            user_data: track.play_id.map(|play_id| TrackUserData {
                play_id: Some(play_id),
            }),
        }
    }

    pub fn stop() -> Self {
        Self {
            encoded: None,
            user_data: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceCredentials {
    pub token: String,
    pub endpoint: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
}

pub fn parse_guild_id(raw: &str) -> Option<GuildId> {
    raw.parse::<u64>().ok().filter(|id| *id != 0).map(GuildId::new)
}

impl LavalinkEvent {
    pub fn into_node_event(self) -> Option<NodeEvent> {
        let event = match self {
            LavalinkEvent::TrackStart { guild_id, track } => NodeEvent::TrackStarted {
                guild_id: parse_guild_id(&guild_id)?,
                track: track.into(),
            },
            LavalinkEvent::TrackEnd {
                guild_id,
                track,
                reason,
            } => NodeEvent::TrackFinished {
                guild_id: parse_guild_id(&guild_id)?,
                track: track.into(),
                reason: reason.into(),
            },
            LavalinkEvent::TrackException {
                guild_id,
                track,
                exception,
            } => NodeEvent::TrackException {
                guild_id: parse_guild_id(&guild_id)?,
                track: track.into(),
                message: exception.message.unwrap_or(exception.cause),
            },
            LavalinkEvent::TrackStuck {
                guild_id,
                track,
                threshold_ms,
            } => NodeEvent::TrackStuck {
                guild_id: parse_guild_id(&guild_id)?,
                track: track.into(),
                threshold: Duration::from_millis(threshold_ms),
            },
            LavalinkEvent::WebSocketClosed {
                guild_id,
                code,
                reason,
                by_remote,
            } => NodeEvent::VoiceClosed {
                guild_id: parse_guild_id(&guild_id)?,
                code,
                reason,
                by_remote,
            },
        };
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TRACK_JSON: &str = r#"{
        "encoded": "QAAAjQIAJVJpY2sgQXN0bGV5",
        "info": {
            "identifier": "dQw4w9WgXcQ",
            "isSeekable": true,
            "author": "RickAstleyVEVO",
            "length": 212000,
            "isStream": false,
            "position": 0,
            "title": "Never Gonna Give You Up",
            "uri": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "artworkUrl": null,
            "isrc": null,
            "sourceName": "youtube"
        },
        "pluginInfo": {},
        "userData": {}
    }"#;

    #[test]
    fn test_track_end_event_maps_to_node_event() {
        let raw = format!(
            r#"{{"op":"event","type":"TrackEndEvent","guildId":"81384788765712384","track":{TRACK_JSON},"reason":"finished"}}"#
        );
        let message: IncomingMessage = serde_json::from_str(&raw).unwrap();
        let IncomingMessage::Event(event) = message else {
            panic!("se esperaba un evento");
        };

        match event.into_node_event() {
            Some(NodeEvent::TrackFinished {
                guild_id,
                track,
                reason,
            }) => {
                assert_eq!(guild_id, GuildId::new(81384788765712384));
                assert_eq!(track.title, "Never Gonna Give You Up");
                assert_eq!(track.duration, Some(Duration::from_secs(212)));
                assert_eq!(reason, TrackEndReason::Finished);
            }
            other => panic!("evento inesperado: {other:?}"),
        }
    }

    #[test]
    fn test_ready_and_player_update() {
        let ready: IncomingMessage =
            serde_json::from_str(r#"{"op":"ready","resumed":false,"sessionId":"la3kfsdf5eafe848"}"#)
                .unwrap();
        assert!(matches!(
            ready,
            IncomingMessage::Ready { ref session_id, resumed: false } if session_id == "la3kfsdf5eafe848"
        ));

        let update: IncomingMessage = serde_json::from_str(
            r#"{"op":"playerUpdate","guildId":"1","state":{"time":1500467109,"position":60000,"connected":true,"ping":50}}"#,
        )
        .unwrap();
        match update {
            IncomingMessage::PlayerUpdate { guild_id, state } => {
                assert_eq!(guild_id, "1");
                assert_eq!(state.position, 60000);
            }
            other => panic!("mensaje inesperado: {other:?}"),
        }
    }

    #[test]
    fn test_exception_without_message_uses_cause() {
        let raw = format!(
            r#"{{"op":"event","type":"TrackExceptionEvent","guildId":"7","track":{TRACK_JSON},
                "exception":{{"message":null,"severity":"suspicious","cause":"java.io.IOException"}}}}"#
        );
        let IncomingMessage::Event(event) = serde_json::from_str(&raw).unwrap() else {
            panic!("se esperaba un evento");
        };
        assert!(matches!(
            event.into_node_event(),
            Some(NodeEvent::TrackException { message, .. }) if message == "java.io.IOException"
        ));
    }

    #[test]
    fn test_load_response_variants() {
        let empty: LoadResponse =
            serde_json::from_str(r#"{"loadType":"empty","data":{}}"#).unwrap();
        assert_eq!(LoadResult::from(empty), LoadResult::Empty);

        let playlist: LoadResponse = serde_json::from_str(&format!(
            r#"{{"loadType":"playlist","data":{{"info":{{"name":"Mix","selectedTrack":-1}},"pluginInfo":{{}},"tracks":[{TRACK_JSON}]}}}}"#
        ))
        .unwrap();
        match LoadResult::from(playlist) {
            LoadResult::Playlist { name, tracks } => {
                assert_eq!(name, "Mix");
                assert_eq!(tracks.len(), 1);
            }
            other => panic!("resultado inesperado: {other:?}"),
        }
    }

    #[test]
    fn test_stop_serializes_null_track() {
        let body = UpdatePlayer {
            track: Some(UpdateTrack::stop()),
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&body).unwrap(), r#"{"track":{"encoded":null}}"#);
    }

    #[test]
    fn test_play_id_round_trips_through_user_data() {
        let mut track = Track::from(serde_json::from_str::<LavalinkTrack>(TRACK_JSON).unwrap());
        assert_eq!(track.play_id, None);

        track.play_id = Some(7);
        let body = UpdatePlayer {
            track: Some(UpdateTrack::play(&track)),
            ..Default::default()
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["track"]["userData"]["playId"], 7);

        let raw = format!(
            r#"{{"op":"event","type":"TrackEndEvent","guildId":"1","track":{},"reason":"finished"}}"#,
            TRACK_JSON.replace(r#""userData": {}"#, r#""userData": {"playId": 7}"#)
        );
        let IncomingMessage::Event(event) = serde_json::from_str(&raw).unwrap() else {
            panic!("se esperaba un evento");
        };
        match event.into_node_event() {
            Some(NodeEvent::TrackFinished { track, .. }) => assert_eq!(track.play_id, Some(7)),
            other => panic!("evento inesperado: {other:?}"),
        }
    }

    #[test]
    fn test_zero_guild_id_is_rejected() {
        assert_eq!(parse_guild_id("0"), None);
        assert_eq!(parse_guild_id("abc"), None);
        assert_eq!(parse_guild_id("42"), Some(GuildId::new(42)));
    }
}
