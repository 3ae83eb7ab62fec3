//! Traducción de eventos de serenity a los tipos del núcleo.
//!
//! Todas las funciones leen la caché y sueltan sus referencias antes de
//! volver, así nunca cruzan un `.await`.

use serenity::{
    model::{
        channel::{Reaction, ReactionType},
        id::{ChannelId, GuildId, UserId},
        voice::VoiceState,
    },
    prelude::Context,
};

use super::reactions::ReactionEvent;
use crate::audio::occupancy::VoiceStateChange;

pub fn reaction_event(ctx: &Context, reaction: &Reaction) -> ReactionEvent {
    let glyph = match &reaction.emoji {
        ReactionType::Unicode(glyph) => Some(glyph.clone()),
        _ => None,
    };

    let reactor_is_bot = match reaction.user_id {
        Some(user_id) => {
            user_id == ctx.cache.current_user().id
                || reaction
                    .member
                    .as_ref()
                    .map(|member| member.user.bot)
                    .or_else(|| ctx.cache.user(user_id).map(|user| user.bot))
                    .unwrap_or(false)
        }
        // Sin autor conocido se trata como webhook
        None => true,
    };

    let reactor_voice_channel = reaction
        .guild_id
        .zip(reaction.user_id)
        .and_then(|(guild_id, user_id)| voice_channel_of(ctx, guild_id, user_id));

    ReactionEvent {
        guild_id: reaction.guild_id,
        message_id: reaction.message_id,
        glyph,
        reactor_is_bot,
        reactor_voice_channel,
    }
}

pub fn voice_change(old: Option<&VoiceState>, new: &VoiceState) -> VoiceStateChange {
    VoiceStateChange {
        user_id: new.user_id,
        old_channel: old.and_then(|state| state.channel_id),
        new_channel: new.channel_id,
    }
}

/// Canal de voz en el que está un usuario según la caché
pub fn voice_channel_of(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = ctx.cache.guild(guild_id)?;
    guild.voice_states.get(&user_id)?.channel_id
}

/// Oyentes humanos en un canal de voz
pub fn listeners_in(ctx: &Context, guild_id: GuildId, channel_id: ChannelId) -> usize {
    let Some(guild) = ctx.cache.guild(guild_id) else {
        return 0;
    };

    guild
        .voice_states
        .values()
        .filter(|state| state.channel_id == Some(channel_id))
        .filter(|state| !is_bot(ctx, state))
        .count()
}

fn is_bot(ctx: &Context, state: &VoiceState) -> bool {
    state
        .member
        .as_ref()
        .map(|member| member.user.bot)
        .or_else(|| ctx.cache.user(state.user_id).map(|user| user.bot))
        .unwrap_or(false)
}

/// Guilds atendidos por un shard
pub fn shard_guilds(ctx: &Context, shard: u32) -> Vec<GuildId> {
    let total = ctx.cache.shard_count();
    ctx.cache
        .guilds()
        .into_iter()
        .filter(|guild_id| serenity::utils::shard_id(*guild_id, total) == shard)
        .collect()
}
