//! Sesión de reproducción de un guild.
//!
//! Todo el estado mutable vive detrás de un único `parking_lot::Mutex` que
//! nunca se sostiene a través de un `.await`: cada operación decide qué hacer
//! bajo el lock, lo suelta y recién entonces habla con el nodo o con Discord.

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use serenity::{
    builder::CreateEmbed,
    model::id::{ChannelId, GuildId, MessageId},
};
use std::{future::Future, sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{
    autoplay::AutoplayLookup,
    error::PlayerError,
    node::{AudioNode, NodeHandle, TrackEndReason},
    queue::{MusicQueue, QueueItem, QueuePage, RadioStream, Track},
    state::PlaybackState,
    watchdog::{Watchdog, WatchdogKind},
};
use crate::{
    bot::chat::ChatPlatform,
    config::Config,
    ui::{
        controls::ControlAction,
        embeds::{
            create_playlist_added_embed, create_track_added_embed, create_track_failure_embed,
            create_warning_embed,
        },
        player_view::{PlayerSnapshot, TrackPlayerView},
    },
};

const SOUNDCLOUD_HINT: &str =
    "Probablemente este track de SoundCloud no se puede reproducir fuera de SoundCloud.";

/// Parámetros de sesión derivados de la configuración
#[derive(Debug, Clone)]
pub struct PlayerSettings {
    pub default_volume: u16,
    pub max_queue_size: usize,
    pub autoplay_by_default: bool,
    pub inactivity_timeout: Duration,
    pub empty_channel_timeout: Duration,
    pub player_refresh_interval: Duration,
    pub outage_channel: Option<ChannelId>,
}

impl From<&Config> for PlayerSettings {
    fn from(config: &Config) -> Self {
        Self {
            default_volume: config.default_volume,
            max_queue_size: config.max_queue_size,
            autoplay_by_default: config.enable_autoplay,
            inactivity_timeout: config.inactivity_timeout,
            empty_channel_timeout: config.empty_channel_timeout,
            player_refresh_interval: config.player_refresh_interval,
            outage_channel: config.bug_report_channel_id.map(ChannelId::new),
        }
    }
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Dependencias compartidas por todas las sesiones
pub struct PlayerContext {
    pub node: Arc<dyn AudioNode>,
    pub chat: Arc<dyn ChatPlatform>,
    pub autoplay: Arc<dyn AutoplayLookup>,
    pub settings: PlayerSettings,
}

/// Guild y canales con los que un comando pide una sesión
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTarget {
    pub guild_id: GuildId,
    pub voice_channel: ChannelId,
    pub text_channel: ChannelId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Empezó a sonar de inmediato
    NowPlaying,
    /// Quedó en la cola en esta posición (1 = la siguiente)
    Queued(usize),
    QueueFull,
    /// La sesión ya se desconectó
    Closed,
}

/// Copia del estado visible de una sesión
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub current: Option<QueueItem>,
    pub queue: Vec<QueueItem>,
    pub paused: bool,
    pub looping: bool,
    pub autoplay: bool,
    pub volume: u16,
    pub position: Duration,
    pub voice_channel: ChannelId,
    pub text_channel: ChannelId,
}

struct SessionState {
    voice_channel: ChannelId,
    text_channel: ChannelId,
    connection: Option<NodeHandle>,
    queue: MusicQueue,
    playback: PlaybackState,
    view: TrackPlayerView,
    inactivity: Watchdog,
    empty_channel: Watchdog,
    disconnected: bool,
    reconnecting: bool,
}

impl SessionState {
    fn player_snapshot(&self) -> Option<PlayerSnapshot> {
        let item = self.playback.current.clone()?;
        Some(PlayerSnapshot {
            item,
            volume: self.playback.volume,
            paused: self.playback.paused,
            looping: self.playback.looping,
            autoplay: self.playback.autoplay,
            position: self.playback.position,
            queued: self.queue.len(),
        })
    }

    fn watchdog(&mut self, kind: WatchdogKind) -> &mut Watchdog {
        match kind {
            WatchdogKind::Inactivity => &mut self.inactivity,
            WatchdogKind::EmptyChannel => &mut self.empty_channel,
        }
    }

    fn handle(&self) -> Option<NodeHandle> {
        if self.disconnected {
            None
        } else {
            self.connection
        }
    }
}

pub struct PlayerSession {
    guild_id: GuildId,
    ctx: Arc<PlayerContext>,
    state: Mutex<SessionState>,
}

impl PlayerSession {
    pub(crate) fn new(target: SessionTarget, handle: NodeHandle, ctx: Arc<PlayerContext>) -> Self {
        let settings = &ctx.settings;
        let state = SessionState {
            voice_channel: handle.channel_id,
            text_channel: target.text_channel,
            connection: Some(handle),
            queue: MusicQueue::new(settings.max_queue_size),
            playback: PlaybackState::new(settings.default_volume, settings.autoplay_by_default),
            view: TrackPlayerView::new(settings.player_refresh_interval),
            inactivity: Watchdog::new(WatchdogKind::Inactivity, settings.inactivity_timeout),
            empty_channel: Watchdog::new(WatchdogKind::EmptyChannel, settings.empty_channel_timeout),
            disconnected: false,
            reconnecting: false,
        };

        Self {
            guild_id: target.guild_id,
            ctx,
            state: Mutex::new(state),
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn voice_channel(&self) -> ChannelId {
        self.state.lock().voice_channel
    }

    pub fn text_channel(&self) -> ChannelId {
        self.state.lock().text_channel
    }

    pub fn is_disconnected(&self) -> bool {
        self.state.lock().disconnected
    }

    pub fn is_radio(&self) -> bool {
        self.state.lock().playback.is_radio()
    }

    pub fn volume(&self) -> u16 {
        self.state.lock().playback.volume
    }

    /// Mensaje "reproduciendo ahora" vigente
    pub fn player_message_id(&self) -> Option<MessageId> {
        self.state.lock().view.message_id()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock();
        SessionSnapshot {
            current: state.playback.current.clone(),
            queue: state.queue.iter().cloned().collect(),
            paused: state.playback.paused,
            looping: state.playback.looping,
            autoplay: state.playback.autoplay,
            volume: state.playback.volume,
            position: state.playback.position,
            voice_channel: state.voice_channel,
            text_channel: state.text_channel,
        }
    }

    pub fn now_playing(&self) -> Option<PlayerSnapshot> {
        self.state.lock().player_snapshot()
    }

    pub fn queue_page(&self, page: usize, per_page: usize) -> (Option<QueueItem>, QueuePage) {
        let state = self.state.lock();
        (state.playback.current.clone(), state.queue.page(page, per_page))
    }

    // ----- Cola y reproducción -----

    /// Reproduce el track si la sesión está libre; si no, lo encola
    pub async fn add_track(&self, track: Track) -> Result<AddOutcome> {
        let item = QueueItem::Track(track.clone());

        let (outcome, resume) = {
            let mut state = self.state.lock();
            if state.disconnected {
                return Ok(AddOutcome::Closed);
            }
            if state.playback.is_playing() {
                let outcome = match state.queue.enqueue(item) {
                    Ok(position) => AddOutcome::Queued(position),
                    Err(_) => AddOutcome::QueueFull,
                };
                (outcome, None)
            } else if state.queue.is_empty() {
                let item = state.playback.start(item);
                (AddOutcome::NowPlaying, Some(item))
            } else {
                // Quedaron items sin sonar: el nuevo va detrás y arranca el primero
                let outcome = match state.queue.enqueue(item) {
                    Ok(position) => AddOutcome::Queued(position - 1),
                    Err(_) => AddOutcome::QueueFull,
                };
                let resume = state.queue.dequeue().ok().map(|next| state.playback.start(next));
                (outcome, resume)
            }
        };

        match (&outcome, resume) {
            (AddOutcome::NowPlaying, Some(item)) => {
                self.play_item(&item).await?;
                self.show_player().await;
            }
            (_, Some(item)) => self.play_from(item).await?,
            _ => {}
        }

        match outcome {
            AddOutcome::NowPlaying | AddOutcome::Closed => {}
            AddOutcome::Queued(position) => {
                info!("➕ {} agregado a la cola (posición {})", track.title, position);
                self.notify(create_track_added_embed(&track, position)).await;
            }
            AddOutcome::QueueFull => {
                self.notify(create_warning_embed(
                    "Cola llena",
                    &format!(
                        "La cola ya tiene el máximo de {} canciones.",
                        self.ctx.settings.max_queue_size
                    ),
                ))
                .await;
            }
        }

        Ok(outcome)
    }

    /// Encola todos los tracks de una playlist; el primero suena de
    /// inmediato si la sesión estaba libre. Devuelve cuántos se agregaron.
    pub async fn add_playlist(&self, name: &str, tracks: Vec<Track>) -> Result<usize> {
        if tracks.is_empty() {
            self.notify(create_warning_embed(
                "Playlist vacía",
                "La playlist no contiene tracks.",
            ))
            .await;
            return Ok(0);
        }

        let (first, added) = {
            let mut state = self.state.lock();
            if state.disconnected {
                return Ok(0);
            }

            let mut items = tracks.into_iter().map(QueueItem::Track);
            let first = if state.playback.is_playing() {
                None
            } else {
                items.next().map(|item| state.playback.start(item))
            };
            let queued = state.queue.extend(items);
            (first.clone(), queued + usize::from(first.is_some()))
        };

        info!("📋 Playlist {} agregada: {} tracks", name, added);
        self.notify(create_playlist_added_embed(name, added)).await;

        if let Some(item) = first {
            self.play_from(item).await?;
        }
        Ok(added)
    }

    /// Reemplaza todo por una radio en vivo
    pub async fn play_radio(&self, radio: RadioStream) -> Result<()> {
        let item = {
            let mut state = self.state.lock();
            if state.disconnected {
                return Ok(());
            }
            state.queue.clear();
            state.playback.start(QueueItem::Radio(radio))
        };

        self.play_item(&item).await?;
        self.show_player().await;
        Ok(())
    }

    /// Pasa al siguiente item de la cola; con la cola vacía detiene y, si el
    /// autoplay está activo, busca un relacionado. También retoma una cola
    /// que quedó sin nada sonando.
    pub async fn skip(&self) -> Result<()> {
        enum Step {
            Next(QueueItem),
            Stop { previous: Option<QueueItem>, autoplay: bool },
        }

        let step = {
            let mut state = self.state.lock();
            if state.disconnected || (!state.playback.is_playing() && state.queue.is_empty()) {
                return Ok(());
            }

            let previous = state.playback.finish();
            match state.queue.dequeue() {
                Ok(next) => Step::Next(state.playback.start(next)),
                Err(_) => Step::Stop {
                    previous,
                    autoplay: state.playback.autoplay,
                },
            }
        };

        match step {
            Step::Next(item) => self.play_from(item).await?,
            Step::Stop { previous, autoplay } => {
                self.stop_node().await?;
                self.hide_player().await;

                let finished = previous.filter(|item| !item.is_radio());
                if let (true, Some(item)) = (autoplay, finished) {
                    self.start_autoplay(item.playable().clone()).await?;
                }
            }
        }
        Ok(())
    }

    /// Vacía la cola y detiene la reproducción
    pub async fn stop(&self) -> Result<()> {
        let was_playing = {
            let mut state = self.state.lock();
            if state.disconnected {
                return Ok(());
            }
            state.queue.clear();
            state.playback.finish().is_some()
        };

        if was_playing {
            self.stop_node().await?;
            self.hide_player().await;
        }
        Ok(())
    }

    pub fn toggle_loop(&self) -> bool {
        self.state.lock().playback.toggle_loop()
    }

    pub fn toggle_autoplay(&self) -> bool {
        self.state.lock().playback.toggle_autoplay()
    }

    pub fn shuffle(&self) -> usize {
        let mut state = self.state.lock();
        state.queue.shuffle();
        state.queue.len()
    }

    pub fn clear(&self) -> usize {
        self.state.lock().queue.clear()
    }

    /// Pausa si hay algo sonando y no estaba pausado
    pub async fn pause(&self) -> Result<bool> {
        let handle = {
            let mut state = self.state.lock();
            if !state.playback.is_playing() || state.playback.paused {
                return Ok(false);
            }
            let Some(handle) = state.handle() else {
                return Ok(false);
            };
            state.playback.paused = true;
            handle
        };

        if let Err(e) = self.ctx.node.pause(&handle).await {
            self.state.lock().playback.paused = false;
            return Err(e).context("No se pudo pausar");
        }
        info!("⏸️ Pausado en guild {}", self.guild_id);
        Ok(true)
    }

    /// Reanuda si estaba pausado
    pub async fn resume(&self) -> Result<bool> {
        let handle = {
            let mut state = self.state.lock();
            if !state.playback.is_playing() || !state.playback.paused {
                return Ok(false);
            }
            let Some(handle) = state.handle() else {
                return Ok(false);
            };
            state.playback.paused = false;
            handle
        };

        if let Err(e) = self.ctx.node.resume(&handle).await {
            self.state.lock().playback.paused = true;
            return Err(e).context("No se pudo reanudar");
        }
        info!("▶️ Reanudado en guild {}", self.guild_id);
        Ok(true)
    }

    pub async fn toggle_pause(&self) -> Result<bool> {
        let paused = self.state.lock().playback.paused;
        if paused {
            self.resume().await
        } else {
            self.pause().await
        }
    }

    /// Fija el volumen, recortado a 0..=200
    pub async fn set_volume(&self, volume: i32) -> Result<u16> {
        self.apply_volume(|_| volume).await
    }

    /// Suma `delta` al volumen actual
    pub async fn adjust_volume(&self, delta: i32) -> Result<u16> {
        self.apply_volume(|current| i32::from(current).saturating_add(delta))
            .await
    }

    async fn apply_volume(&self, target: impl FnOnce(u16) -> i32) -> Result<u16> {
        let (applied, handle) = {
            let mut state = self.state.lock();
            let requested = target(state.playback.volume);
            (state.playback.set_volume(requested), state.handle())
        };

        if let Some(handle) = handle {
            self.ctx
                .node
                .set_volume(&handle, applied)
                .await
                .context("No se pudo cambiar el volumen")?;
        }
        Ok(applied)
    }

    /// Adelanta o retrocede `delta_secs`. Un destino fuera del track se
    /// ignora y devuelve `None`.
    pub async fn seek(&self, delta_secs: i64) -> Result<Option<Duration>> {
        let (handle, target) = {
            let state = self.state.lock();
            let Some(handle) = state.handle() else {
                return Ok(None);
            };
            let Some(item) = state.playback.current.as_ref() else {
                return Ok(None);
            };
            let Some(duration) = item.duration().filter(|_| item.playable().is_seekable()) else {
                return Ok(None);
            };

            match seek_target(state.playback.position, duration, delta_secs) {
                Ok(target) => (handle, target),
                Err(e) => {
                    debug!("⏩ Seek ignorado en guild {}: {}", self.guild_id, e);
                    return Ok(None);
                }
            }
        };

        self.ctx
            .node
            .seek(&handle, target)
            .await
            .context("No se pudo mover la posición")?;
        self.state.lock().playback.position = target;
        Ok(Some(target))
    }

    // ----- Eventos del nodo -----

    /// Un track terminó en el nodo. Solo los finales naturales o fallidos del
    /// item actual avanzan la sesión; el resto es ruido de reemplazos.
    pub async fn on_track_finished(&self, finished: &Track, reason: TrackEndReason) -> Result<()> {
        enum Next {
            Replay(QueueItem),
            Play(QueueItem),
            Autoplay(Track),
            Idle,
        }

        if !reason.may_start_next() {
            debug!("Fin de track ignorado ({:?}) en guild {}", reason, self.guild_id);
            return Ok(());
        }

        let next = {
            let mut state = self.state.lock();
            if state.disconnected {
                return Ok(());
            }

            if !state.playback.is_current_play(finished) {
                debug!("Fin de track obsoleto en guild {}: {}", self.guild_id, finished.title);
                return Ok(());
            }

            let replay = state.playback.looping
                && reason == TrackEndReason::Finished
                && !state.playback.is_radio();

            if replay {
                // Cada vuelta es una reproducción nueva
                match state.playback.current.take() {
                    Some(item) => Next::Replay(state.playback.start(item)),
                    None => Next::Idle,
                }
            } else {
                let previous = state.playback.finish();
                match state.queue.dequeue() {
                    Ok(item) => Next::Play(state.playback.start(item)),
                    Err(_) if state.playback.autoplay && !previous.as_ref().is_some_and(QueueItem::is_radio) => {
                        Next::Autoplay(finished.clone())
                    }
                    Err(_) => Next::Idle,
                }
            }
        };

        match next {
            Next::Replay(item) => {
                debug!("🔁 Repitiendo {}", item.title());
                self.play_item(&item).await?;
            }
            Next::Play(item) => self.play_from(item).await?,
            Next::Autoplay(track) => self.start_autoplay(track).await?,
            Next::Idle => {
                info!("🏁 Cola terminada en guild {}", self.guild_id);
                self.hide_player().await;
            }
        }
        Ok(())
    }

    /// Avisa en el canal de texto que un track no se pudo reproducir
    pub async fn report_track_failure(&self, failed: &Track, reason: &str) {
        let uri = failed.display_uri();
        let reason = if failed.source_name == "soundcloud" || uri.contains("soundcloud.com") {
            format!("{}\n{}", reason, SOUNDCLOUD_HINT)
        } else {
            reason.to_string()
        };

        let error = PlayerError::TrackPlaybackFailure {
            uri: uri.to_string(),
            reason: reason.clone(),
        };
        warn!("⚠️ Guild {}: {}", self.guild_id, error);

        self.notify(create_track_failure_embed(uri, &reason)).await;
    }

    /// Actualización periódica de posición del nodo
    pub async fn on_player_update(&self, position: Duration) {
        let refresh = {
            let mut state = self.state.lock();
            if state.disconnected {
                return;
            }
            state.playback.position = position;

            let live = state
                .playback
                .current
                .as_ref()
                .is_some_and(|item| item.playable().is_stream);
            state.view.has_message() && !live && !state.playback.paused
        };

        if refresh {
            self.refresh_player().await;
        }
    }

    // ----- Vista del reproductor -----

    /// Reemplaza el mensaje "reproduciendo ahora" por uno nuevo al final del
    /// canal y le agrega los controles por reacción
    pub async fn show_player(&self) {
        let (channel, snapshot, previous) = {
            let mut state = self.state.lock();
            if state.disconnected {
                return;
            }
            let Some(snapshot) = state.player_snapshot() else {
                return;
            };
            (state.text_channel, snapshot, state.view.take_message())
        };

        if let Some((old_channel, old_message)) = previous {
            self.delete_message(old_channel, old_message).await;
        }

        let embed = {
            let mut state = self.state.lock();
            state.view.rebuild(&snapshot)
        };

        let message = match self.ctx.chat.send_embed(channel, embed).await {
            Ok(message) => message,
            Err(e) => {
                warn!("⚠️ No se pudo mostrar el reproductor en {}: {:#}", channel, e);
                return;
            }
        };

        // La sesión pudo cerrarse mientras se enviaba
        let displaced = {
            let mut state = self.state.lock();
            if state.disconnected {
                Err((channel, message))
            } else {
                Ok(state.view.attach(channel, message, Instant::now()))
            }
        };

        match displaced {
            Err((channel, message)) => self.delete_message(channel, message).await,
            Ok(previous) => {
                if let Some((old_channel, old_message)) = previous {
                    self.delete_message(old_channel, old_message).await;
                }
                self.spawn_controls(channel, message, snapshot.item.is_radio());
            }
        }
    }

    /// Edita el mensaje vigente si pasó el intervalo mínimo desde la última
    /// edición
    pub async fn refresh_player(&self) {
        let edit = {
            let mut state = self.state.lock();
            if state.disconnected {
                return;
            }
            let Some(snapshot) = state.player_snapshot() else {
                return;
            };
            state.view.throttled_update(&snapshot, Instant::now())
        };

        if let Some(edit) = edit {
            if let Err(e) = self
                .ctx
                .chat
                .edit_embed(edit.channel, edit.message, edit.embed)
                .await
            {
                debug!("No se pudo actualizar el reproductor: {:#}", e);
            }
        }
    }

    /// Borra el mensaje "reproduciendo ahora", si hay
    pub async fn hide_player(&self) {
        let message = self.state.lock().view.take_message();
        if let Some((channel, message)) = message {
            self.delete_message(channel, message).await;
        }
    }

    fn spawn_controls(&self, channel: ChannelId, message: MessageId, is_radio: bool) {
        let chat = self.ctx.chat.clone();
        tokio::spawn(async move {
            if !chat.can_add_reactions(channel) {
                debug!("Sin permiso para agregar reacciones en {}", channel);
                return;
            }
            for action in ControlAction::available(is_radio) {
                if let Err(e) = chat.add_reaction(channel, message, action.glyph()).await {
                    warn!("⚠️ No se pudieron agregar los controles: {:#}", e);
                    break;
                }
            }
        });
    }

    // ----- Ciclo de vida -----

    /// Envía un embed al canal de texto de la sesión; los errores solo se
    /// registran
    pub(crate) async fn notify(&self, embed: CreateEmbed) {
        let channel = self.text_channel();
        if !self.ctx.chat.can_send(channel) {
            debug!("Sin permiso para escribir en {}", channel);
            return;
        }
        if let Err(e) = self.ctx.chat.send_embed(channel, embed).await {
            warn!("⚠️ No se pudo enviar mensaje a {}: {:#}", channel, e);
        }
    }

    /// Actualiza canales y conexión para un comando que reutiliza la sesión.
    /// Devuelve verdadero si la sesión quedó en otro canal de voz.
    pub(crate) async fn reattach(&self, target: SessionTarget) -> Result<bool> {
        enum Plan {
            Reconnect,
            Move(NodeHandle),
            Keep,
        }

        let plan = {
            let mut state = self.state.lock();
            if state.disconnected {
                bail!("La sesión de guild {} ya fue cerrada", self.guild_id);
            }
            state.text_channel = target.text_channel;

            match state.connection {
                None if state.reconnecting => Plan::Keep,
                None => {
                    state.reconnecting = true;
                    Plan::Reconnect
                }
                Some(handle) if handle.channel_id != target.voice_channel => Plan::Move(handle),
                Some(_) => Plan::Keep,
            }
        };

        let connected = match plan {
            Plan::Keep => return Ok(false),
            Plan::Reconnect => {
                info!("🔌 Reconectando sesión de guild {}", self.guild_id);
                let result = self
                    .ctx
                    .node
                    .connect(self.guild_id, target.voice_channel)
                    .await;
                self.state.lock().reconnecting = false;
                result
            }
            Plan::Move(handle) => {
                info!("🔀 Moviendo sesión de guild {} a {}", self.guild_id, target.voice_channel);
                self.ctx.node.move_channel(&handle, target.voice_channel).await
            }
        };

        let handle = connected.map_err(|source| PlayerError::ConnectionFailure {
            guild_id: self.guild_id,
            source,
        })?;

        let mut state = self.state.lock();
        if state.disconnected {
            return Ok(false);
        }
        let moved = state.voice_channel != handle.channel_id;
        state.connection = Some(handle);
        state.voice_channel = handle.channel_id;
        if moved {
            // El conteo del canal anterior ya no aplica
            state.empty_channel.cancel();
        }
        Ok(moved)
    }

    /// Marca la conexión de voz como perdida sin cerrar la sesión
    pub(crate) fn connection_lost(&self) {
        self.state.lock().connection = None;
    }

    pub(crate) fn arm_watchdog<F, Fut>(&self, kind: WatchdogKind, on_expire: F) -> Option<u64>
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.state.lock();
        if state.disconnected {
            return None;
        }
        Some(state.watchdog(kind).restart(on_expire))
    }

    pub(crate) fn cancel_watchdog(&self, kind: WatchdogKind) -> bool {
        self.state.lock().watchdog(kind).cancel()
    }

    /// Verdadero una sola vez por disparo vigente
    pub(crate) fn claim_watchdog(&self, kind: WatchdogKind, epoch: u64) -> bool {
        let mut state = self.state.lock();
        !state.disconnected && state.watchdog(kind).claim(epoch)
    }

    /// Cierra la sesión: desconecta del nodo y borra el reproductor.
    /// Devuelve falso si ya estaba cerrada.
    pub(crate) async fn teardown(&self) -> bool {
        let (handle, message) = {
            let mut state = self.state.lock();
            if state.disconnected {
                return false;
            }
            state.disconnected = true;
            state.inactivity.cancel();
            state.empty_channel.cancel();
            state.queue.clear();
            state.playback.finish();
            (state.connection.take(), state.view.take_message())
        };

        if let Some(handle) = handle {
            if let Err(e) = self.ctx.node.disconnect(&handle).await {
                warn!("⚠️ Error desconectando guild {} del nodo: {}", self.guild_id, e);
            }
        }
        if let Some((channel, message)) = message {
            self.delete_message(channel, message).await;
        }

        info!("👋 Sesión de guild {} cerrada", self.guild_id);
        true
    }

    async fn play_item(&self, item: &QueueItem) -> Result<()> {
        let Some(handle) = self.state.lock().handle() else {
            bail!("La sesión de guild {} no tiene conexión de voz", self.guild_id);
        };

        let result = self
            .ctx
            .node
            .play(&handle, item.playable())
            .await
            .with_context(|| format!("No se pudo reproducir {}", item.title()));

        match &result {
            Ok(()) => info!("🎵 Reproduciendo en guild {}: {}", self.guild_id, item.title()),
            Err(_) => {
                let mut state = self.state.lock();
                if state.playback.current.as_ref() == Some(item) {
                    state.playback.finish();
                }
            }
        }
        result
    }

    /// Reproduce `item` y, si el nodo lo rechaza, sigue con la cola hasta
    /// que algo suene o no quede nada
    async fn play_from(&self, mut item: QueueItem) -> Result<()> {
        loop {
            let error = match self.play_item(&item).await {
                Ok(()) => {
                    self.show_player().await;
                    return Ok(());
                }
                Err(e) => e,
            };

            let next = {
                let mut state = self.state.lock();
                // Sin voz o con otro item ya sonando no hay nada que retomar
                if state.handle().is_none() || state.playback.is_playing() {
                    return Err(error);
                }
                state.queue.dequeue().ok().map(|next| state.playback.start(next))
            };

            warn!("⚠️ Guild {}: {:#}", self.guild_id, error);
            let reason = format!("{:#}", error);
            self.notify(create_track_failure_embed(item.playable().display_uri(), &reason))
                .await;

            match next {
                Some(next) => item = next,
                None => {
                    self.hide_player().await;
                    return Err(error);
                }
            }
        }
    }

    async fn stop_node(&self) -> Result<()> {
        let handle = self.state.lock().handle();
        if let Some(handle) = handle {
            self.ctx
                .node
                .stop(&handle)
                .await
                .context("No se pudo detener la reproducción")?;
        }
        Ok(())
    }

    async fn start_autoplay(&self, finished: Track) -> Result<()> {
        debug!("🎲 Buscando autoplay tras {}", finished.title);
        match self.ctx.autoplay.related(&finished).await {
            Some(track) => {
                self.add_track(track).await?;
            }
            None => {
                self.hide_player().await;
                self.notify(create_warning_embed(
                    "Autoplay",
                    "No se encontró una canción relacionada para continuar.",
                ))
                .await;
            }
        }
        Ok(())
    }

    async fn delete_message(&self, channel: ChannelId, message: MessageId) {
        if let Err(e) = self.ctx.chat.delete_message(channel, message).await {
            debug!("No se pudo borrar el mensaje {}: {:#}", message, e);
        }
    }
}

/// Destino absoluto de un seek relativo; debe caer dentro del track
pub fn seek_target(
    position: Duration,
    duration: Duration,
    delta_secs: i64,
) -> Result<Duration, PlayerError> {
    let position_ms = i64::try_from(position.as_millis()).unwrap_or(i64::MAX);
    let target_ms = position_ms.saturating_add(delta_secs.saturating_mul(1000));
    let duration_ms = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);

    if target_ms < 0 || target_ms >= duration_ms {
        return Err(PlayerError::SeekOutOfRange {
            target_ms,
            duration,
        });
    }
    Ok(Duration::from_millis(target_ms.unsigned_abs()))
}
