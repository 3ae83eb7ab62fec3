use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId, UserId};

/// Cambio de estado de voz de un usuario, ya separado del modelo de serenity
#[derive(Debug, Clone, Copy)]
pub struct VoiceStateChange {
    pub user_id: UserId,
    pub old_channel: Option<ChannelId>,
    pub new_channel: Option<ChannelId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccupancyTransition {
    BecameEmpty(ChannelId),
    BecameOccupied(ChannelId),
}

/// Canal cuyo conteo de oyentes puede haber cambiado para el bot.
///
/// - El bot se movió: su canal nuevo.
/// - Alguien entró o salió del canal del bot: el canal del bot.
/// - Cualquier otro movimiento no importa.
pub fn relevant_channel(
    change: &VoiceStateChange,
    bot_id: UserId,
    bot_channel: Option<ChannelId>,
) -> Option<ChannelId> {
    if change.user_id == bot_id {
        return change.new_channel;
    }

    let bot_channel = bot_channel?;
    let joined = change.new_channel == Some(bot_channel);
    let left = change.old_channel == Some(bot_channel);
    (joined || left).then_some(bot_channel)
}

/// Recuerda si el canal del bot estaba vacío en cada guild y reporta solo
/// las transiciones
#[derive(Debug, Default)]
pub struct VoiceOccupancyTracker {
    channels: DashMap<GuildId, (ChannelId, bool)>,
}

impl VoiceOccupancyTracker {
    pub fn observe(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        listeners: usize,
    ) -> Option<OccupancyTransition> {
        let empty = listeners == 0;
        let previous = self.channels.insert(guild_id, (channel_id, empty));

        match previous {
            Some((previous_channel, was_empty))
                if previous_channel == channel_id && was_empty == empty =>
            {
                None
            }
            _ if empty => Some(OccupancyTransition::BecameEmpty(channel_id)),
            _ => Some(OccupancyTransition::BecameOccupied(channel_id)),
        }
    }

    pub fn forget(&self, guild_id: GuildId) {
        self.channels.remove(&guild_id);
    }
}
