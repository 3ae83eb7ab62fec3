use serenity::{
    model::id::{ChannelId, GuildId},
    prelude::TypeMapKey,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{
    error::PlayerError,
    node::{LoadResult, NodeError, NodeEvent},
    queue::Track,
    registry::SessionRegistry,
    session::{PlayerContext, PlayerSession, SessionTarget},
};
use crate::ui::embeds::create_node_outage_embed;

/// Aviso a cada guild cuando se pierde el nodo
pub const NODE_OUTAGE_NOTICE: &str = "El streaming de música no está disponible, desconectando.";

/// Códigos de cierre de voz tras los cuales la conexión ya no sirve
const STALE_VOICE_CODES: [u16; 2] = [4006, 4009];

/// Punto de entrada del bot al núcleo de reproducción
#[derive(Clone)]
pub struct AudioPlayer {
    registry: SessionRegistry,
}

impl TypeMapKey for AudioPlayer {
    type Value = Arc<AudioPlayer>;
}

impl AudioPlayer {
    pub fn new(ctx: PlayerContext) -> Self {
        Self {
            registry: SessionRegistry::new(ctx),
        }
    }

    /// Sesión del guild, creándola y conectando a voz si hace falta
    pub async fn session(&self, target: SessionTarget) -> Option<Arc<PlayerSession>> {
        self.registry.connect(target).await
    }

    /// Sesión existente, sin crear nada
    pub fn existing(&self, guild_id: GuildId) -> Option<Arc<PlayerSession>> {
        self.registry.get(guild_id)
    }

    /// Resuelve una URL o búsqueda (`ytsearch:...`) en el nodo
    pub async fn load_tracks(&self, identifier: &str) -> Result<LoadResult, NodeError> {
        self.registry.context().node.load_tracks(identifier).await
    }

    pub async fn disconnect(&self, guild_id: GuildId) -> bool {
        self.registry.disconnect(guild_id).await
    }

    pub async fn disconnect_all(&self, reason: &str) -> usize {
        debug!("Cerrando {} sesiones activas", self.registry.active_sessions());
        let closed = self.registry.disconnect_all(reason).await;
        if closed > 0 {
            info!("👋 {} sesiones cerradas: {}", closed, reason);
        }
        closed
    }

    pub async fn disconnect_guilds(&self, guilds: &[GuildId], reason: &str) -> usize {
        self.registry.disconnect_guilds(guilds, reason).await
    }

    /// Conteo de oyentes (sin bots) del canal relevante de un guild
    pub fn on_voice_occupancy(&self, guild_id: GuildId, channel_id: ChannelId, listeners: usize) {
        self.registry
            .observe_occupancy(guild_id, channel_id, listeners);
    }

    /// Consume los eventos del nodo hasta que el canal se cierre. Cada evento
    /// se atiende en su propia tarea para no frenar al lector del socket.
    pub async fn run_node_events(self, events: flume::Receiver<NodeEvent>) {
        while let Ok(event) = events.recv_async().await {
            let player = self.clone();
            tokio::spawn(async move { player.handle_node_event(event).await });
        }
        debug!("Canal de eventos del nodo cerrado");
    }

    pub async fn handle_node_event(&self, event: NodeEvent) {
        match event {
            NodeEvent::TrackStarted { guild_id, track } => {
                debug!("▶️ Nodo inició {} en guild {}", track.title, guild_id);
            }
            NodeEvent::TrackFinished {
                guild_id,
                track,
                reason,
            } => {
                let Some(session) = self.existing(guild_id) else {
                    return;
                };
                if let Err(e) = session.on_track_finished(&track, reason).await {
                    error!("❌ Error avanzando la cola en guild {}: {:#}", guild_id, e);
                }
            }
            NodeEvent::TrackStuck {
                guild_id,
                track,
                threshold,
            } => {
                let reason = format!(
                    "El track se quedó atascado más de {} ms.",
                    threshold.as_millis()
                );
                self.report_failure(guild_id, &track, &reason).await;
            }
            NodeEvent::TrackException {
                guild_id,
                track,
                message,
            } => {
                self.report_failure(guild_id, &track, &message).await;
            }
            NodeEvent::PlayerUpdated { guild_id, position } => {
                let Some(session) = self.existing(guild_id) else {
                    return;
                };
                self.registry.arm_inactivity(&session);
                session.on_player_update(position).await;
            }
            NodeEvent::VoiceClosed {
                guild_id,
                code,
                reason,
                by_remote,
            } => {
                warn!(
                    "🔌 Voz cerrada en guild {} ({}, remoto: {}): {}",
                    guild_id, code, by_remote, reason
                );
                if STALE_VOICE_CODES.contains(&code) {
                    if let Some(session) = self.existing(guild_id) {
                        session.connection_lost();
                    }
                }
            }
            NodeEvent::SocketClosed {
                code,
                reason,
                by_remote,
            } => {
                let outage = PlayerError::NodeOutage {
                    code,
                    reason: reason.clone(),
                };
                error!("🚨 {}", outage);

                self.disconnect_all(NODE_OUTAGE_NOTICE).await;
                self.report_outage(code, &reason, by_remote).await;
            }
        }
    }

    async fn report_failure(&self, guild_id: GuildId, track: &Track, reason: &str) {
        match self.existing(guild_id) {
            Some(session) => session.report_track_failure(track, reason).await,
            None => debug!("Fallo de track sin sesión en guild {}: {}", guild_id, reason),
        }
    }

    async fn report_outage(&self, code: u16, reason: &str, by_remote: bool) {
        let ctx = self.registry.context();
        let Some(channel) = ctx.settings.outage_channel else {
            return;
        };
        let embed = create_node_outage_embed(code, reason, by_remote);
        if let Err(e) = ctx.chat.send_embed(channel, embed).await {
            warn!("⚠️ No se pudo enviar el reporte de caída: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{
            autoplay::MockAutoplayLookup, node::TrackEndReason, queue::tests::track,
            session::PlayerSettings,
        },
        testing::{ChatCall, FakeChat, FakeNode, NodeCall},
    };
    use std::time::Duration;

    const GUILD: GuildId = GuildId::new(1);
    const BUGS: ChannelId = ChannelId::new(99);

    fn target() -> SessionTarget {
        SessionTarget {
            guild_id: GUILD,
            voice_channel: ChannelId::new(10),
            text_channel: ChannelId::new(20),
        }
    }

    fn player() -> (AudioPlayer, Arc<FakeNode>, Arc<FakeChat>) {
        let node = Arc::new(FakeNode::default());
        let chat = Arc::new(FakeChat::default());
        let settings = PlayerSettings {
            autoplay_by_default: false,
            outage_channel: Some(BUGS),
            inactivity_timeout: Duration::from_secs(180),
            ..PlayerSettings::default()
        };
        let player = AudioPlayer::new(PlayerContext {
            node: node.clone(),
            chat: chat.clone(),
            autoplay: Arc::new(MockAutoplayLookup::new()),
            settings,
        });
        (player, node, chat)
    }

    #[tokio::test]
    async fn test_socket_close_disconnects_everything() {
        let (player, node, chat) = player();
        player.session(target()).await.unwrap();

        player
            .handle_node_event(NodeEvent::SocketClosed {
                code: 1006,
                reason: "reset".to_string(),
                by_remote: true,
            })
            .await;

        assert!(player.existing(GUILD).is_none());
        assert_eq!(node.count(|c| matches!(c, NodeCall::Disconnect(_))), 1);
        assert_eq!(chat.titles_in(BUGS).len(), 1);
    }

    #[tokio::test]
    async fn test_voice_close_is_not_fatal() {
        let (player, _node, _chat) = player();
        player.session(target()).await.unwrap();

        player
            .handle_node_event(NodeEvent::VoiceClosed {
                guild_id: GUILD,
                code: 4006,
                reason: "session invalid".to_string(),
                by_remote: true,
            })
            .await;

        assert!(player.existing(GUILD).is_some());
        // El próximo comando reconecta
        player.session(target()).await.unwrap();
    }

    #[tokio::test]
    async fn test_finished_event_advances_session() {
        let (player, node, _chat) = player();
        let session = player.session(target()).await.unwrap();
        session.add_track(track("a")).await.unwrap();
        session.add_track(track("b")).await.unwrap();

        player
            .handle_node_event(NodeEvent::TrackFinished {
                guild_id: GUILD,
                track: track("a"),
                reason: TrackEndReason::Finished,
            })
            .await;

        assert_eq!(node.played(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_exception_is_reported_in_text_channel() {
        let (player, _node, chat) = player();
        player.session(target()).await.unwrap();

        player
            .handle_node_event(NodeEvent::TrackException {
                guild_id: GUILD,
                track: track("a"),
                message: "Video unavailable".to_string(),
            })
            .await;

        assert_eq!(
            chat.count(|c| matches!(c, ChatCall::Send(channel, _) if *channel == target().text_channel)),
            1
        );
    }

    #[tokio::test]
    async fn test_stuck_track_is_reported_in_text_channel() {
        let (player, _node, chat) = player();
        let session = player.session(target()).await.unwrap();
        session.add_track(track("a")).await.unwrap();
        let before = chat.count(|c| matches!(c, ChatCall::Send(..)));

        player
            .handle_node_event(NodeEvent::TrackStuck {
                guild_id: GUILD,
                track: track("a"),
                threshold: Duration::from_millis(10_000),
            })
            .await;

        assert_eq!(
            chat.count(|c| matches!(c, ChatCall::Send(..))),
            before + 1
        );
        assert!(chat
            .titles_in(target().text_channel)
            .iter()
            .any(|t| t.contains("No se pudo reproducir")));
        assert!(chat.titles_in(BUGS).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_player_updates_restart_inactivity() {
        let (player, _node, _chat) = player();
        let session = player.session(target()).await.unwrap();

        tokio::time::sleep(Duration::from_secs(120)).await;
        player
            .handle_node_event(NodeEvent::PlayerUpdated {
                guild_id: GUILD,
                position: Duration::from_secs(5),
            })
            .await;

        // Sin la actualización habría vencido a los 180 s
        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;
        assert!(!session.is_disconnected());

        tokio::time::sleep(Duration::from_secs(120)).await;
        tokio::task::yield_now().await;
        assert!(session.is_disconnected());
        assert!(player.existing(GUILD).is_none());
    }

    #[tokio::test]
    async fn test_events_for_unknown_guild_are_ignored() {
        let (player, node, _chat) = player();

        player
            .handle_node_event(NodeEvent::PlayerUpdated {
                guild_id: GUILD,
                position: Duration::from_secs(5),
            })
            .await;

        assert!(node.calls().is_empty());
    }
}
