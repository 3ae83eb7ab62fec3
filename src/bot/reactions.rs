use anyhow::Result;
use serenity::model::id::{ChannelId, GuildId, MessageId};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    audio::{player::AudioPlayer, session::PlayerSession},
    ui::controls::{ControlAction, VOLUME_STEP},
};

/// Reacción agregada o quitada, ya resuelta contra la caché
#[derive(Debug, Clone)]
pub struct ReactionEvent {
    pub guild_id: Option<GuildId>,
    pub message_id: MessageId,
    /// `None` para emojis personalizados
    pub glyph: Option<String>,
    pub reactor_is_bot: bool,
    pub reactor_voice_channel: Option<ChannelId>,
}

/// Motivos para ignorar una reacción. Ninguno se muestra al usuario.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReactionRejection {
    #[error("reacción en mensaje directo")]
    DirectMessage,
    #[error("reacción de un bot")]
    BotReactor,
    #[error("glifo no reconocido")]
    UnknownGlyph,
    #[error("el usuario no está en un canal de voz")]
    NotInVoice,
    #[error("no hay sesión en el guild")]
    NoSession,
    #[error("mensaje del reproductor obsoleto")]
    StaleMessage,
    #[error("la acción no aplica al item actual")]
    NotApplicable,
}

/// Valida la reacción y aplica la acción sobre la sesión del guild.
///
/// Agregar y quitar una reacción disparan la misma acción, así cada clic del
/// usuario cuenta.
pub async fn handle_reaction(
    player: &AudioPlayer,
    event: &ReactionEvent,
) -> Result<ControlAction, ReactionRejection> {
    let guild_id = event.guild_id.ok_or(ReactionRejection::DirectMessage)?;
    if event.reactor_is_bot {
        return Err(ReactionRejection::BotReactor);
    }
    let action = event
        .glyph
        .as_deref()
        .and_then(ControlAction::from_glyph)
        .ok_or(ReactionRejection::UnknownGlyph)?;
    if event.reactor_voice_channel.is_none() {
        return Err(ReactionRejection::NotInVoice);
    }

    let session = player
        .existing(guild_id)
        .ok_or(ReactionRejection::NoSession)?;
    if session.player_message_id() != Some(event.message_id) {
        return Err(ReactionRejection::StaleMessage);
    }
    if !action.applies_to(session.is_radio()) {
        return Err(ReactionRejection::NotApplicable);
    }

    debug!("🎛️ {:?} en guild {}", action, guild_id);
    if let Err(e) = dispatch(&session, action).await {
        warn!("⚠️ Acción {:?} falló en guild {}: {:#}", action, guild_id, e);
    }
    session.refresh_player().await;

    Ok(action)
}

async fn dispatch(session: &PlayerSession, action: ControlAction) -> Result<()> {
    match action {
        ControlAction::TogglePlayPause => {
            session.toggle_pause().await?;
        }
        ControlAction::ToggleLoop => {
            session.toggle_loop();
        }
        ControlAction::VolumeUp => {
            session.adjust_volume(VOLUME_STEP).await?;
        }
        ControlAction::VolumeDown => {
            session.adjust_volume(-VOLUME_STEP).await?;
        }
        ControlAction::Skip => {
            session.skip().await?;
        }
    }
    Ok(())
}
