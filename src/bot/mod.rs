//! # Bot Module
//!
//! Discord side of GuildTune: slash commands, reaction controls and the
//! gateway events that feed the per-guild sessions.
//!
//! ## Architecture
//!
//! [`GuildTuneBot`] implements Serenity's [`EventHandler`]. It keeps no
//! playback state of its own; every event is translated (see [`events`]) and
//! forwarded to the [`AudioPlayer`] stored in the client's `TypeMap`:
//!
//! - Slash commands go through [`handlers`]
//! - Reactions on the "now playing" message go through [`reactions`]
//! - Voice state updates feed the empty-channel watchdog
//! - A shard reaching the disconnected stage closes its guilds' sessions

use anyhow::Result;
use serenity::{
    all::{
        ConnectionStage, Context, EventHandler, GuildId, Interaction, Reaction, Ready,
        ShardStageUpdateEvent, VoiceState,
    },
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

pub mod chat;
pub mod commands;
pub mod events;
pub mod handlers;
pub mod reactions;

use crate::{
    audio::{occupancy::relevant_channel, player::AudioPlayer},
    config::Config,
};

/// Aviso cuando un shard pierde la conexión con Discord
const SHARD_DISCONNECT_NOTICE: &str = "Hubo un problema con Discord, desconectando...";

pub struct GuildTuneBot {
    config: Arc<Config>,
}

impl GuildTuneBot {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Registra los comandos slash, por guild si `GUILD_ID` está configurado
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                commands::register_guild_commands(ctx, guild_id).await?;
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await?;
            }
        }

        info!("✅ Comandos registrados");
        Ok(())
    }

    async fn on_reaction(&self, ctx: &Context, reaction: &Reaction) {
        let Some(player) = player(ctx).await else {
            return;
        };

        let event = events::reaction_event(ctx, reaction);
        match reactions::handle_reaction(&player, &event).await {
            Ok(action) => debug!("🎛️ Reacción {:?} aplicada", action),
            Err(rejection) => trace!("Reacción ignorada: {}", rejection),
        }
    }
}

async fn player(ctx: &Context) -> Option<Arc<AudioPlayer>> {
    let data = ctx.data.read().await;
    let player = data.get::<AudioPlayer>().cloned();
    if player.is_none() {
        warn!("⚠️ AudioPlayer no inicializado");
    }
    player
}

#[async_trait]
impl EventHandler for GuildTuneBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("❌ Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Command(command) = interaction else {
            return;
        };
        let Some(player) = player(&ctx).await else {
            return;
        };

        if let Err(e) = handlers::handle_command(&ctx, command, &player).await {
            error!("Error manejando comando: {:?}", e);
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let Some(player) = player(&ctx).await else {
            return;
        };
        let bot_id = ctx.cache.current_user().id;

        // El bot salió o lo sacaron del canal
        if new.user_id == bot_id && new.channel_id.is_none() {
            if player.disconnect(guild_id).await {
                info!("🔌 Bot desconectado del canal de voz en guild {}", guild_id);
            }
            return;
        }

        let change = events::voice_change(old.as_ref(), &new);
        let bot_channel = events::voice_channel_of(&ctx, guild_id, bot_id);
        let Some(channel) = relevant_channel(&change, bot_id, bot_channel) else {
            return;
        };

        let listeners = events::listeners_in(&ctx, guild_id, channel);
        trace!("👥 {} oyentes en {} (guild {})", listeners, channel, guild_id);
        player.on_voice_occupancy(guild_id, channel, listeners);
    }

    async fn reaction_add(&self, ctx: Context, reaction: Reaction) {
        self.on_reaction(&ctx, &reaction).await;
    }

    async fn reaction_remove(&self, ctx: Context, reaction: Reaction) {
        self.on_reaction(&ctx, &reaction).await;
    }

    async fn shard_stage_update(&self, ctx: Context, event: ShardStageUpdateEvent) {
        if event.new != ConnectionStage::Disconnected {
            return;
        }
        let Some(player) = player(&ctx).await else {
            return;
        };

        let guilds = events::shard_guilds(&ctx, event.shard_id.0);
        let closed = player
            .disconnect_guilds(&guilds, SHARD_DISCONNECT_NOTICE)
            .await;
        warn!(
            "🔌 Shard {} desconectado, {} sesiones cerradas",
            event.shard_id.0, closed
        );
    }
}
