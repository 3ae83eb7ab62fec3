use serenity::{
    builder::CreateEmbed,
    model::id::{ChannelId, MessageId},
};
use std::time::Duration;
use tokio::time::Instant;

use super::embeds::create_now_playing_embed;
use crate::audio::queue::QueueItem;

/// Lo que el reproductor necesita para dibujarse
#[derive(Debug, Clone)]
pub struct PlayerSnapshot {
    pub item: QueueItem,
    pub volume: u16,
    pub paused: bool,
    pub looping: bool,
    pub autoplay: bool,
    pub position: Duration,
    pub queued: usize,
}

/// Edición remota pendiente, a ejecutar fuera del lock de la sesión
#[derive(Debug)]
pub struct PendingEdit {
    pub channel: ChannelId,
    pub message: MessageId,
    pub embed: CreateEmbed,
}

/// Asocia una sesión con su único mensaje "reproduciendo ahora".
///
/// Reconstruir el embed siempre está permitido; editar el mensaje remoto se
/// limita a una vez por `min_edit_interval`, contado desde la última edición
/// enviada.
#[derive(Debug)]
pub struct TrackPlayerView {
    message: Option<(ChannelId, MessageId)>,
    embed: Option<CreateEmbed>,
    last_edit: Option<Instant>,
    min_edit_interval: Duration,
}

impl TrackPlayerView {
    pub fn new(min_edit_interval: Duration) -> Self {
        Self {
            message: None,
            embed: None,
            last_edit: None,
            min_edit_interval,
        }
    }

    pub fn message_id(&self) -> Option<MessageId> {
        self.message.map(|(_, message)| message)
    }

    pub fn has_message(&self) -> bool {
        self.message.is_some()
    }

    /// Reconstruye el embed local a partir del estado
    pub fn rebuild(&mut self, snapshot: &PlayerSnapshot) -> CreateEmbed {
        let embed = create_now_playing_embed(snapshot);
        self.embed = Some(embed.clone());
        embed
    }

    /// Reconstruye el embed y devuelve la edición remota si el intervalo
    /// mínimo ya pasó
    pub fn throttled_update(&mut self, snapshot: &PlayerSnapshot, now: Instant) -> Option<PendingEdit> {
        let embed = self.rebuild(snapshot);
        let (channel, message) = self.message?;

        if let Some(last) = self.last_edit {
            if now.saturating_duration_since(last) < self.min_edit_interval {
                return None;
            }
        }

        self.last_edit = Some(now);
        Some(PendingEdit {
            channel,
            message,
            embed,
        })
    }

    /// Asocia el mensaje recién enviado. Devuelve el mensaje que reemplaza,
    /// si había otro, para borrarlo.
    pub fn attach(&mut self, channel: ChannelId, message: MessageId, now: Instant) -> Option<(ChannelId, MessageId)> {
        self.last_edit = Some(now);
        self.message.replace((channel, message))
    }

    /// Suelta la referencia local; el borrado remoto queda a cargo de quien llama
    pub fn take_message(&mut self) -> Option<(ChannelId, MessageId)> {
        self.last_edit = None;
        self.embed = None;
        self.message.take()
    }
}
