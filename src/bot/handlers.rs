use anyhow::{anyhow, Result};
use serenity::{
    builder::{CreateEmbed, EditInteractionResponse},
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use super::events::voice_channel_of;
use crate::{
    audio::{
        node::LoadResult,
        player::AudioPlayer,
        queue::RadioStream,
        session::{AddOutcome, PlayerSession, SessionTarget},
    },
    ui::embeds::{
        self, create_error_embed, create_info_embed, create_success_embed, create_warning_embed,
    },
};

const QUEUE_PAGE_SIZE: usize = 10;

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    player: &AudioPlayer,
) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        return reply(
            ctx,
            &command,
            create_error_embed("Solo en servidores", "Este comando se usa dentro de un servidor."),
        )
        .await;
    };

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    // Cargar tracks y conectar a voz puede tardar más que el límite de respuesta
    command.defer(&ctx.http).await?;

    let embed = match run(ctx, &command, player, guild_id).await {
        Ok(embed) => embed,
        Err(e) => {
            warn!("⚠️ /{} falló en guild {}: {:#}", command.data.name, guild_id, e);
            create_error_embed("Error", &e.to_string())
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;
    Ok(())
}

async fn run(
    ctx: &Context,
    command: &CommandInteraction,
    player: &AudioPlayer,
    guild_id: GuildId,
) -> Result<CreateEmbed> {
    match command.data.name.as_str() {
        "play" => handle_play(ctx, command, player, guild_id).await,
        "radio" => handle_radio(ctx, command, player, guild_id).await,
        "pause" => {
            let session = connect(ctx, command, player, guild_id).await?;
            Ok(if session.pause().await? {
                session.refresh_player().await;
                create_success_embed("Pausado", "⏸️ Reproducción pausada.")
            } else {
                create_warning_embed("Nada que pausar", "No hay nada sonando o ya está en pausa.")
            })
        }
        "resume" => {
            let session = connect(ctx, command, player, guild_id).await?;
            Ok(if session.resume().await? {
                session.refresh_player().await;
                create_success_embed("Reanudado", "▶️ Reproducción reanudada.")
            } else {
                create_warning_embed("Nada que reanudar", "La reproducción no está en pausa.")
            })
        }
        "skip" => {
            let session = connect(ctx, command, player, guild_id).await?;
            session.skip().await?;
            Ok(create_success_embed("Saltado", "⏭️ Canción saltada."))
        }
        "stop" => {
            let session = connect(ctx, command, player, guild_id).await?;
            session.stop().await?;
            Ok(create_success_embed("Detenido", "⏹️ Reproducción detenida y cola vacía."))
        }
        "loop" => {
            let session = connect(ctx, command, player, guild_id).await?;
            if session.is_radio() {
                return Ok(create_warning_embed("Radio", "Una radio en vivo no se puede repetir."));
            }
            let looping = session.toggle_loop();
            session.refresh_player().await;
            Ok(create_success_embed("Repetición", enabled_text(looping)))
        }
        "autoplay" => {
            let session = connect(ctx, command, player, guild_id).await?;
            let autoplay = session.toggle_autoplay();
            session.refresh_player().await;
            Ok(create_success_embed("Autoplay", enabled_text(autoplay)))
        }
        "shuffle" => {
            let session = connect(ctx, command, player, guild_id).await?;
            let count = session.shuffle();
            Ok(create_success_embed(
                "Cola mezclada",
                &format!("🔀 Se mezclaron {} canciones.", count),
            ))
        }
        "clear" => {
            let session = connect(ctx, command, player, guild_id).await?;
            let removed = session.clear();
            session.refresh_player().await;
            Ok(create_success_embed(
                "Cola limpiada",
                &format!("🗑️ Se quitaron {} canciones.", removed),
            ))
        }
        "volume" => {
            let level = int_option(command, "level")
                .ok_or_else(|| anyhow!("Falta el nivel de volumen"))?;
            let session = connect(ctx, command, player, guild_id).await?;
            let applied = session
                .set_volume(volume_level(level))
                .await?;
            session.refresh_player().await;
            Ok(create_success_embed("Volumen", &format!("🔊 Volumen en {}%", applied)))
        }
        "seek" => {
            let seconds = int_option(command, "seconds")
                .ok_or_else(|| anyhow!("Faltan los segundos"))?;
            let session = connect(ctx, command, player, guild_id).await?;
            Ok(match session.seek(seconds).await? {
                Some(position) => {
                    session.refresh_player().await;
                    create_success_embed(
                        "Posición",
                        &format!("⏩ Ahora en {}", embeds::format_duration(position)),
                    )
                }
                None => create_warning_embed("Seek", "Esa posición está fuera de la canción."),
            })
        }
        "queue" => {
            let page = int_option(command, "page")
                .and_then(|page| usize::try_from(page).ok())
                .unwrap_or(1);
            let session = existing(player, guild_id)?;
            let (current, page) = session.queue_page(page, QUEUE_PAGE_SIZE);
            Ok(embeds::create_queue_embed(current.as_ref(), &page))
        }
        "nowplaying" => {
            let session = existing(player, guild_id)?;
            Ok(match session.now_playing() {
                Some(snapshot) => embeds::create_now_playing_embed(&snapshot),
                None => create_info_embed("Nada sonando", "La cola está vacía."),
            })
        }
        "leave" => Ok(if player.disconnect(guild_id).await {
            create_success_embed("Desconectado", "👋 Me fui del canal de voz.")
        } else {
            create_warning_embed("Sin conexión", "No estoy en ningún canal de voz.")
        }),
        other => Ok(create_error_embed(
            "Comando no reconocido",
            &format!("`/{}` no existe.", other),
        )),
    }
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    player: &AudioPlayer,
    guild_id: GuildId,
) -> Result<CreateEmbed> {
    let query = str_option(command, "query").ok_or_else(|| anyhow!("Query no proporcionado"))?;
    let target = session_target(ctx, command, guild_id)?;

    let identifier = if is_web_url(query) {
        query.to_string()
    } else {
        format!("ytsearch:{}", query)
    };

    let tracks = match player.load_tracks(&identifier).await? {
        LoadResult::Track(track) => vec![track],
        LoadResult::Search(results) => results.into_iter().take(1).collect(),
        LoadResult::Playlist { name, tracks } => {
            let session = open(player, target).await?;
            let added = session.add_playlist(&name, tracks).await?;
            return Ok(create_success_embed(
                "Playlist",
                &format!("📋 {} canciones de `{}` en camino.", added, name),
            ));
        }
        LoadResult::Empty => Vec::new(),
        LoadResult::Error(message) => {
            return Ok(create_error_embed("No se pudo cargar", &message));
        }
    };

    let Some(track) = tracks.into_iter().next() else {
        return Ok(create_warning_embed(
            "Sin resultados",
            &format!("No encontré nada para `{}`.", query),
        ));
    };

    let title = track.title.clone();
    let session = open(player, target).await?;
    Ok(match session.add_track(track).await? {
        AddOutcome::NowPlaying => {
            create_success_embed("Reproduciendo", &format!("🎵 **{}**", title))
        }
        AddOutcome::Queued(position) => create_success_embed(
            "En cola",
            &format!("➕ **{}** en la posición {}", title, position),
        ),
        AddOutcome::QueueFull => create_warning_embed("Cola llena", "No caben más canciones."),
        AddOutcome::Closed => create_error_embed("Sesión cerrada", "Intenta de nuevo."),
    })
}

async fn handle_radio(
    ctx: &Context,
    command: &CommandInteraction,
    player: &AudioPlayer,
    guild_id: GuildId,
) -> Result<CreateEmbed> {
    let url = str_option(command, "url").ok_or_else(|| anyhow!("Falta la URL del stream"))?;
    let genre = str_option(command, "genre").unwrap_or("Radio").to_string();
    let target = session_target(ctx, command, guild_id)?;

    let Some(track) = player.load_tracks(url).await?.first_track() else {
        return Ok(create_error_embed(
            "Radio no disponible",
            &format!("No se pudo abrir `{}`.", url),
        ));
    };

    let session = open(player, target).await?;
    session
        .play_radio(RadioStream {
            genre: genre.clone(),
            stream_url: url.to_string(),
            track,
        })
        .await?;

    Ok(create_success_embed("Radio", &format!("📻 Sintonizando {}", genre)))
}

fn session_target(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
) -> Result<SessionTarget> {
    let voice_channel = get_user_voice_channel(ctx, guild_id, command.user.id)?;
    Ok(SessionTarget {
        guild_id,
        voice_channel,
        text_channel: command.channel_id,
    })
}

async fn connect(
    ctx: &Context,
    command: &CommandInteraction,
    player: &AudioPlayer,
    guild_id: GuildId,
) -> Result<Arc<PlayerSession>> {
    let target = session_target(ctx, command, guild_id)?;
    open(player, target).await
}

async fn open(player: &AudioPlayer, target: SessionTarget) -> Result<Arc<PlayerSession>> {
    player
        .session(target)
        .await
        .ok_or_else(|| anyhow!("No pude conectarme a tu canal de voz"))
}

fn existing(player: &AudioPlayer, guild_id: GuildId) -> Result<Arc<PlayerSession>> {
    player
        .existing(guild_id)
        .ok_or_else(|| anyhow!("No estoy reproduciendo nada en este servidor"))
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<ChannelId> {
    voice_channel_of(ctx, guild_id, user_id).ok_or_else(|| anyhow!("Debes estar en un canal de voz"))
}

fn str_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn int_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

/// Nivel pedido llevado al rango de `i32` conservando el signo
fn volume_level(level: i64) -> i32 {
    i32::try_from(level).unwrap_or(if level < 0 { i32::MIN } else { i32::MAX })
}

fn is_web_url(query: &str) -> bool {
    Url::parse(query).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

fn enabled_text(enabled: bool) -> &'static str {
    if enabled {
        "✅ Activado"
    } else {
        "❌ Desactivado"
    }
}

async fn reply(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    use serenity::builder::{CreateInteractionResponse, CreateInteractionResponseMessage};

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}
