use anyhow::{Context, Result};
use async_trait::async_trait;
use serenity::{
    all::{Cache, Http, Permissions, ReactionType},
    builder::{CreateEmbed, CreateMessage, EditMessage},
    model::id::{ChannelId, MessageId},
};
use std::sync::Arc;

/// Operaciones de Discord que usa el núcleo de sesiones
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn send_embed(&self, channel: ChannelId, embed: CreateEmbed) -> Result<MessageId>;

    async fn edit_embed(
        &self,
        channel: ChannelId,
        message: MessageId,
        embed: CreateEmbed,
    ) -> Result<()>;

    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> Result<()>;

    async fn add_reaction(&self, channel: ChannelId, message: MessageId, glyph: &str)
        -> Result<()>;

    fn can_send(&self, channel: ChannelId) -> bool;

    fn can_add_reactions(&self, channel: ChannelId) -> bool;
}

pub struct SerenityChat {
    http: Arc<Http>,
    cache: Arc<Cache>,
}

impl SerenityChat {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>) -> Self {
        Self { http, cache }
    }

    /// Permisos del bot en un canal de guild. `None` si el canal no está en
    /// caché (por ejemplo un DM).
    fn permissions_in(&self, channel: ChannelId) -> Option<Permissions> {
        let guild_id = self.cache.channel(channel)?.guild_id;
        let bot_id = self.cache.current_user().id;

        let guild = self.cache.guild(guild_id)?;
        let channel = guild.channels.get(&channel)?;
        let member = guild.members.get(&bot_id)?;
        Some(guild.user_permissions_in(channel, member))
    }
}

#[async_trait]
impl ChatPlatform for SerenityChat {
    async fn send_embed(&self, channel: ChannelId, embed: CreateEmbed) -> Result<MessageId> {
        let message = channel
            .send_message(&self.http, CreateMessage::new().embed(embed))
            .await
            .with_context(|| format!("Error enviando embed a {}", channel))?;
        Ok(message.id)
    }

    async fn edit_embed(
        &self,
        channel: ChannelId,
        message: MessageId,
        embed: CreateEmbed,
    ) -> Result<()> {
        channel
            .edit_message(&self.http, message, EditMessage::new().embed(embed))
            .await
            .with_context(|| format!("Error editando mensaje {}", message))?;
        Ok(())
    }

    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> Result<()> {
        channel
            .delete_message(&self.http, message)
            .await
            .with_context(|| format!("Error borrando mensaje {}", message))?;
        Ok(())
    }

    async fn add_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        glyph: &str,
    ) -> Result<()> {
        channel
            .create_reaction(&self.http, message, ReactionType::Unicode(glyph.to_string()))
            .await
            .with_context(|| format!("Error agregando reacción {} a {}", glyph, message))?;
        Ok(())
    }

    fn can_send(&self, channel: ChannelId) -> bool {
        // Sin datos en caché se intenta igual y se reporta el error
        self.permissions_in(channel)
            .map_or(true, |p| p.send_messages() && p.embed_links())
    }

    fn can_add_reactions(&self, channel: ChannelId) -> bool {
        self.permissions_in(channel)
            .is_some_and(|p| p.add_reactions() && p.read_message_history())
    }
}
