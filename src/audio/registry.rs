use dashmap::DashMap;
use futures::future::join_all;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::{Arc, Weak};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::{
    error::PlayerError,
    node::NodeHandle,
    occupancy::{OccupancyTransition, VoiceOccupancyTracker},
    session::{PlayerContext, PlayerSession, SessionTarget},
    watchdog::WatchdogKind,
};
use crate::ui::embeds::create_warning_embed;

/// Slot por guild. La celda se inicializa una sola vez aunque varios
/// comandos pidan la sesión al mismo tiempo.
type SessionSlot = Arc<OnceCell<Arc<PlayerSession>>>;

/// Registro de sesiones activas: a lo sumo una por guild
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<GuildId, SessionSlot>>,
    occupancy: Arc<VoiceOccupancyTracker>,
    ctx: Arc<PlayerContext>,
}

impl SessionRegistry {
    pub fn new(ctx: PlayerContext) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            occupancy: Arc::new(VoiceOccupancyTracker::default()),
            ctx: Arc::new(ctx),
        }
    }

    pub fn context(&self) -> &Arc<PlayerContext> {
        &self.ctx
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<PlayerSession>> {
        self.sessions
            .get(&guild_id)
            .and_then(|slot| slot.get().cloned())
    }

    /// Cantidad de sesiones ya creadas
    pub fn active_sessions(&self) -> usize {
        self.sessions
            .iter()
            .filter(|slot| slot.value().initialized())
            .count()
    }

    /// Devuelve la sesión del guild, creándola si no existe.
    ///
    /// `None` si la conexión de voz falló o si la sesión se cerró mientras
    /// se creaba; en ambos casos no queda nada registrado.
    pub async fn connect(&self, target: SessionTarget) -> Option<Arc<PlayerSession>> {
        let guild_id = target.guild_id;
        let slot = self.sessions.entry(guild_id).or_default().clone();

        let mut created = false;
        let result = slot
            .get_or_try_init(|| {
                created = true;
                self.open_session(target)
            })
            .await
            .cloned();

        let session = match result {
            Ok(session) => session,
            Err(e) => {
                warn!("❌ {}", e);
                self.sessions
                    .remove_if(&guild_id, |_, current| Arc::ptr_eq(current, &slot));

                let handle = NodeHandle {
                    guild_id,
                    channel_id: target.voice_channel,
                };
                if let Err(e) = self.ctx.node.disconnect(&handle).await {
                    debug!("Limpieza tras fallo de conexión en guild {}: {}", guild_id, e);
                }
                return None;
            }
        };

        // Un disconnect concurrente pudo quitar el slot mientras se creaba
        let registered = self
            .sessions
            .get(&guild_id)
            .is_some_and(|current| Arc::ptr_eq(current.value(), &slot));
        if !registered {
            debug!("Sesión huérfana en guild {}, cerrando", guild_id);
            session.teardown().await;
            return None;
        }

        if created {
            self.arm_inactivity(&session);
        } else {
            match session.reattach(target).await {
                Ok(true) => self.occupancy.forget(guild_id),
                Ok(false) => {}
                Err(e) => {
                    warn!("⚠️ No se pudo reutilizar la sesión de guild {}: {:#}", guild_id, e);
                    self.disconnect(guild_id).await;
                    return None;
                }
            }
        }

        Some(session)
    }

    async fn open_session(&self, target: SessionTarget) -> Result<Arc<PlayerSession>, PlayerError> {
        let handle = self
            .ctx
            .node
            .connect(target.guild_id, target.voice_channel)
            .await
            .map_err(|source| PlayerError::ConnectionFailure {
                guild_id: target.guild_id,
                source,
            })?;

        self.occupancy.forget(target.guild_id);
        info!(
            "🎧 Nueva sesión en guild {} (canal de voz {})",
            target.guild_id, target.voice_channel
        );
        Ok(Arc::new(PlayerSession::new(target, handle, self.ctx.clone())))
    }

    /// Cierra la sesión del guild. Llamarlo de nuevo no hace nada.
    pub async fn disconnect(&self, guild_id: GuildId) -> bool {
        self.occupancy.forget(guild_id);
        let Some((_, slot)) = self.sessions.remove(&guild_id) else {
            return false;
        };
        match slot.get() {
            Some(session) => session.teardown().await,
            None => false,
        }
    }

    /// Cierra exactamente esta sesión, si sigue registrada
    pub async fn disconnect_session(&self, session: &Arc<PlayerSession>) -> bool {
        let guild_id = session.guild_id();
        let removed = self.sessions.remove_if(&guild_id, |_, slot| {
            slot.get().is_some_and(|current| Arc::ptr_eq(current, session))
        });
        if removed.is_some() {
            self.occupancy.forget(guild_id);
        }
        session.teardown().await
    }

    /// Cierra todas las sesiones avisando `reason` en cada canal de texto
    pub async fn disconnect_all(&self, reason: &str) -> usize {
        let sessions: Vec<Arc<PlayerSession>> = self
            .sessions
            .iter()
            .filter_map(|slot| slot.value().get().cloned())
            .collect();
        self.close_with_notice(sessions, reason).await
    }

    /// Cierra las sesiones de los guilds indicados
    pub async fn disconnect_guilds(&self, guilds: &[GuildId], reason: &str) -> usize {
        let sessions: Vec<Arc<PlayerSession>> =
            guilds.iter().filter_map(|guild| self.get(*guild)).collect();
        self.close_with_notice(sessions, reason).await
    }

    async fn close_with_notice(&self, sessions: Vec<Arc<PlayerSession>>, reason: &str) -> usize {
        let closed = join_all(sessions.iter().map(|session| async move {
            let closed = self.disconnect_session(session).await;
            if closed {
                session
                    .notify(create_warning_embed("Desconectado", reason))
                    .await;
            }
            closed
        }))
        .await;

        closed.into_iter().filter(|closed| *closed).count()
    }

    /// Reinicia el temporizador de inactividad
    pub fn arm_inactivity(&self, session: &Arc<PlayerSession>) {
        self.arm(session, WatchdogKind::Inactivity);
    }

    fn arm(&self, session: &Arc<PlayerSession>, kind: WatchdogKind) {
        let registry = self.clone();
        let weak = Arc::downgrade(session);
        session.arm_watchdog(kind, move |epoch| async move {
            registry.expire(weak, kind, epoch).await;
        });
    }

    async fn expire(&self, session: Weak<PlayerSession>, kind: WatchdogKind, epoch: u64) {
        let Some(session) = session.upgrade() else {
            return;
        };
        if !session.claim_watchdog(kind, epoch) {
            return;
        }

        let reason = match kind {
            WatchdogKind::Inactivity => "Me desconecté por inactividad.",
            WatchdogKind::EmptyChannel => "Me desconecté porque el canal de voz quedó vacío.",
        };
        info!("⏰ Watchdog {:?} venció en guild {}", kind, session.guild_id());
        if self.disconnect_session(&session).await {
            session.notify(create_warning_embed("Desconectado", reason)).await;
        }
    }

    /// Aplica un conteo de oyentes del canal relevante: vacío arma el
    /// temporizador, ocupado lo cancela
    pub fn observe_occupancy(&self, guild_id: GuildId, channel_id: ChannelId, listeners: usize) {
        let Some(session) = self.get(guild_id) else {
            return;
        };
        if session.voice_channel() != channel_id {
            return;
        }

        match self.occupancy.observe(guild_id, channel_id, listeners) {
            Some(OccupancyTransition::BecameEmpty(_)) => {
                info!("🔇 Canal de voz vacío en guild {}", guild_id);
                self.arm(&session, WatchdogKind::EmptyChannel);
            }
            Some(OccupancyTransition::BecameOccupied(_)) => {
                if session.cancel_watchdog(WatchdogKind::EmptyChannel) {
                    debug!("Alguien volvió al canal en guild {}", guild_id);
                }
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{autoplay::MockAutoplayLookup, session::PlayerSettings},
        testing::{FakeChat, FakeNode, NodeCall},
    };
    use std::time::Duration;

    const GUILD: GuildId = GuildId::new(1);
    const VOICE: ChannelId = ChannelId::new(10);
    const TEXT: ChannelId = ChannelId::new(20);

    fn target() -> SessionTarget {
        SessionTarget {
            guild_id: GUILD,
            voice_channel: VOICE,
            text_channel: TEXT,
        }
    }

    fn registry(node: Arc<FakeNode>) -> SessionRegistry {
        let settings = PlayerSettings {
            inactivity_timeout: Duration::from_secs(180),
            empty_channel_timeout: Duration::from_secs(60),
            ..PlayerSettings::default()
        };
        SessionRegistry::new(PlayerContext {
            node,
            chat: Arc::new(FakeChat::default()),
            autoplay: Arc::new(MockAutoplayLookup::new()),
            settings,
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_connect_creates_one_session() {
        let node = Arc::new(FakeNode::default());
        node.set_connect_delay(Duration::from_millis(50));
        let registry = registry(node.clone());

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.connect(target()).await })
            })
            .collect();

        let mut sessions = Vec::new();
        for task in tasks {
            sessions.push(task.await.unwrap().unwrap());
        }

        assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
        assert_eq!(node.count(|c| matches!(c, NodeCall::Connect(..))), 1);
        assert_eq!(registry.active_sessions(), 1);
    }

    #[tokio::test]
    async fn test_failed_connect_leaves_no_entry() {
        let node = Arc::new(FakeNode::default());
        node.set_fail_connect(true);
        let registry = registry(node.clone());

        assert!(registry.connect(target()).await.is_none());
        assert!(registry.get(GUILD).is_none());
        assert_eq!(registry.active_sessions(), 0);
        // Limpieza best-effort en el nodo
        assert_eq!(node.count(|c| matches!(c, NodeCall::Disconnect(_))), 1);

        node.set_fail_connect(false);
        assert!(registry.connect(target()).await.is_some());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let node = Arc::new(FakeNode::default());
        let registry = registry(node.clone());
        let session = registry.connect(target()).await.unwrap();

        assert!(registry.disconnect(GUILD).await);
        assert!(!registry.disconnect(GUILD).await);
        assert!(session.is_disconnected());
        assert_eq!(node.count(|c| matches!(c, NodeCall::Disconnect(_))), 1);
    }

    #[tokio::test]
    async fn test_reconnect_moves_voice_channel() {
        let node = Arc::new(FakeNode::default());
        let registry = registry(node.clone());
        registry.connect(target()).await.unwrap();

        let other = ChannelId::new(11);
        let session = registry
            .connect(SessionTarget {
                voice_channel: other,
                ..target()
            })
            .await
            .unwrap();

        assert_eq!(session.voice_channel(), other);
        assert!(node.calls().contains(&NodeCall::Move(GUILD, other)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_channel_cancelled_before_expiry() {
        let node = Arc::new(FakeNode::default());
        let registry = registry(node.clone());
        let session = registry.connect(target()).await.unwrap();

        registry.observe_occupancy(GUILD, VOICE, 0);
        tokio::time::sleep(Duration::from_secs(30)).await;
        registry.observe_occupancy(GUILD, VOICE, 1);
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert!(!session.is_disconnected());
        assert!(registry.get(GUILD).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_channel_expiry_tears_down_once() {
        let node = Arc::new(FakeNode::default());
        let registry = registry(node.clone());
        let session = registry.connect(target()).await.unwrap();

        registry.observe_occupancy(GUILD, VOICE, 0);
        // Mismo estado: no rearma
        registry.observe_occupancy(GUILD, VOICE, 0);
        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert!(session.is_disconnected());
        assert!(registry.get(GUILD).is_none());
        assert_eq!(node.count(|c| matches!(c, NodeCall::Disconnect(_))), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_drops_countdown_of_previous_channel() {
        let node = Arc::new(FakeNode::default());
        let registry = registry(node.clone());
        let session = registry.connect(target()).await.unwrap();

        registry.observe_occupancy(GUILD, VOICE, 0);
        tokio::time::sleep(Duration::from_secs(30)).await;

        let other = ChannelId::new(11);
        registry
            .connect(SessionTarget {
                voice_channel: other,
                ..target()
            })
            .await
            .unwrap();
        registry.observe_occupancy(GUILD, other, 2);
        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert!(!session.is_disconnected());

        // El canal nuevo sí arma su propio temporizador
        registry.observe_occupancy(GUILD, other, 0);
        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert!(session.is_disconnected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_without_occupancy_update_keeps_session() {
        let node = Arc::new(FakeNode::default());
        let registry = registry(node.clone());
        let session = registry.connect(target()).await.unwrap();

        registry.observe_occupancy(GUILD, VOICE, 0);
        registry
            .connect(SessionTarget {
                voice_channel: ChannelId::new(11),
                ..target()
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert!(!session.is_disconnected());
        assert!(registry.get(GUILD).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactivity_expires_idle_session() {
        let node = Arc::new(FakeNode::default());
        let registry = registry(node.clone());
        let session = registry.connect(target()).await.unwrap();

        tokio::time::sleep(Duration::from_secs(181)).await;
        tokio::task::yield_now().await;

        assert!(session.is_disconnected());
        assert!(registry.get(GUILD).is_none());
    }

    #[tokio::test]
    async fn test_disconnect_all_closes_every_session() {
        let node = Arc::new(FakeNode::default());
        let registry = registry(node.clone());
        registry.connect(target()).await.unwrap();
        registry
            .connect(SessionTarget {
                guild_id: GuildId::new(2),
                ..target()
            })
            .await
            .unwrap();

        assert_eq!(registry.disconnect_all("Nodo caído").await, 2);
        assert_eq!(registry.active_sessions(), 0);
        assert_eq!(registry.disconnect_all("Nodo caído").await, 0);
    }

    #[tokio::test]
    async fn test_disconnect_guilds_closes_only_listed() {
        let node = Arc::new(FakeNode::default());
        let registry = registry(node.clone());
        let kept = registry.connect(target()).await.unwrap();
        let closed = registry
            .connect(SessionTarget {
                guild_id: GuildId::new(2),
                ..target()
            })
            .await
            .unwrap();

        let guilds = [GuildId::new(2), GuildId::new(3)];
        assert_eq!(registry.disconnect_guilds(&guilds, "Guild eliminado").await, 1);

        assert!(closed.is_disconnected());
        assert!(!kept.is_disconnected());
        assert!(registry.get(GUILD).is_some());
        assert!(registry.get(GuildId::new(2)).is_none());
        assert_eq!(node.count(|c| matches!(c, NodeCall::Disconnect(_))), 1);
    }
}
