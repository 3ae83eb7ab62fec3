use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::queue::{QueueItem, QueuePage, Track},
    ui::player_view::PlayerSnapshot,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 GuildTune";

/// Límite de Discord para títulos de embed
const MAX_TITLE_CHARS: usize = 256;
/// URIs más largas no se enlazan en la descripción
const MAX_LINKED_URI: usize = 1000;
/// Casillas de la barra de progreso
const PROGRESS_SLOTS: usize = 21;

/// Embed del reproductor para el item actual
pub fn create_now_playing_embed(snapshot: &PlayerSnapshot) -> CreateEmbed {
    match &snapshot.item {
        QueueItem::Track(track) => track_player_embed(track, snapshot),
        QueueItem::Radio(radio) => CreateEmbed::default()
            .title("📻 Reproduciendo radio")
            .color(colors::MUSIC_PURPLE)
            .field("🎼 Género", &radio.genre, true)
            .field("🔊 Volumen", format!("{}%", snapshot.volume), true)
            .field("⏸️ Pausado", yes_no(snapshot.paused), true)
            .field("📡 Stream", format!("`{}`", radio.stream_url), false)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER)),
    }
}

fn track_player_embed(track: &Track, snapshot: &PlayerSnapshot) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title(limit_title(&format!("🎵 {}", track.title)))
        .color(if snapshot.paused {
            colors::NEUTRAL_GRAY
        } else {
            colors::SUCCESS_GREEN
        })
        .field("🎤 Artista", &track.author, true)
        .field("🔴 En vivo", yes_no(track.is_stream), true)
        .field("🔊 Volumen", format!("{}%", snapshot.volume), true)
        .field("⏸️ Pausado", yes_no(snapshot.paused), true)
        .field("🔂 Repetir", yes_no(snapshot.looping), true)
        .field("🎲 Autoplay", yes_no(snapshot.autoplay), true);

    let mut description = String::new();
    if let Some(uri) = track.uri.as_deref().filter(|uri| uri.len() < MAX_LINKED_URI) {
        description.push_str(&format!("🔗 **[Abrir en el navegador]({})**\n", uri));
    }
    if let Some(duration) = track.duration.filter(|_| !track.is_stream) {
        description.push_str(&progress_line(snapshot.position, duration, snapshot.paused));
    }
    if !description.is_empty() {
        embed = embed.description(description);
    }

    let footer = if snapshot.queued > 0 {
        format!("{} • {} en cola", STANDARD_FOOTER, snapshot.queued)
    } else {
        STANDARD_FOOTER.to_string()
    };
    embed.footer(CreateEmbedFooter::new(footer))
}

/// Línea de progreso `▶ ──⚪── 1:02 / 3:30` en un bloque de código
pub fn progress_line(position: Duration, duration: Duration, paused: bool) -> String {
    let ratio = if duration.is_zero() {
        0.0
    } else {
        (position.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0)
    };
    let marker = (ratio * (PROGRESS_SLOTS - 1) as f64).round() as usize;

    let line: String = (0..PROGRESS_SLOTS)
        .map(|slot| if slot == marker { '⚪' } else { '─' })
        .collect();

    format!(
        "```http\n{} {} {} / {}\n```",
        if paused { "⏸" } else { "▶" },
        line,
        format_duration(position.min(duration)),
        format_duration(duration)
    )
}

/// Se agregó una canción a la cola
pub fn create_track_added_embed(track: &Track, position: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("✅ Canción agregada a la cola")
        .description(format!("**{}**", track.title))
        .color(colors::SUCCESS_GREEN)
        .field("🎤 Artista", &track.author, true)
        .field(
            "⏱️ Duración",
            track
                .duration
                .map(format_duration)
                .unwrap_or_else(|| "🔴 En vivo".to_string()),
            true,
        )
        .field("📍 Posición", position.to_string(), true);

    if let Some(uri) = track.uri.as_deref().filter(|uri| uri.len() < MAX_LINKED_URI) {
        embed = embed.url(uri);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Se agregaron las canciones de una playlist
pub fn create_playlist_added_embed(name: &str, added: usize) -> CreateEmbed {
    CreateEmbed::default()
        .title("📋 Playlist agregada")
        .description(format!("🎶 Se agregaron `{}` canciones de `{}`", added, name))
        .color(colors::MUSIC_PURPLE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Un track falló en el nodo (excepción o atascado)
pub fn create_track_failure_embed(uri: &str, error: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("⚠️ No se pudo reproducir el track")
        .color(colors::WARNING_ORANGE)
        .field("🔗 URL", format!("`{}`", uri), false)
        .field("❌ Error", error, false)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Reporte de caída del nodo para el canal de reportes
pub fn create_node_outage_embed(code: u16, reason: &str, by_remote: bool) -> CreateEmbed {
    CreateEmbed::default()
        .title("🚨 Conexión con el nodo de audio cerrada")
        .color(colors::ERROR_RED)
        .field("Código", code.to_string(), true)
        .field("Remoto", yes_no(by_remote), true)
        .field("Motivo", if reason.is_empty() { "sin motivo" } else { reason }, false)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Cola de reproducción paginada
pub fn create_queue_embed(current: Option<&QueueItem>, page: &QueuePage) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if let Some(current) = current {
        embed = embed.field(
            if current.is_radio() { "📻 Radio" } else { "▶️ Reproduciendo" },
            format!("**{}**", current.title()),
            false,
        );
    }

    if page.total_items == 0 {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    let mut description = String::new();
    for (i, item) in page.items.iter().enumerate() {
        let duration = item
            .duration()
            .map(|d| format!(" `[{}]`", format_duration(d)))
            .unwrap_or_default();
        description.push_str(&format!(
            "**{}**. {}{}\n",
            page.offset + i + 1,
            item.title(),
            duration
        ));
    }
    embed = embed.field("Próximas canciones", description, false);

    let mut info = format!("**Total:** {} canciones", page.total_items);
    if page.total_duration > Duration::ZERO {
        info.push_str(&format!(" • **Duración:** {}", format_duration(page.total_duration)));
    }
    embed = embed.field("Información", info, false);

    embed
        .footer(CreateEmbedFooter::new(format!(
            "Página {} de {} • GuildTune",
            page.current_page, page.total_pages
        )))
        .timestamp(Timestamp::now())
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de advertencia
pub fn create_warning_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("⚠️ {}", title))
        .description(description)
        .color(colors::WARNING_ORANGE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de información
pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "Sí"
    } else {
        "No"
    }
}

fn limit_title(title: &str) -> String {
    if title.chars().count() <= MAX_TITLE_CHARS {
        return title.to_string();
    }
    let mut limited: String = title.chars().take(MAX_TITLE_CHARS - 1).collect();
    limited.push('…');
    limited
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(65)), "1:05");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
    }

    #[test]
    fn test_progress_line_marker_positions() {
        let start = progress_line(Duration::ZERO, Duration::from_secs(200), false);
        assert_eq!(
            start,
            format!("```http\n▶ ⚪{} 0:00 / 3:20\n```", "─".repeat(20))
        );

        let end = progress_line(Duration::from_secs(200), Duration::from_secs(200), true);
        assert!(end.starts_with(&format!("```http\n⏸ {}⚪", "─".repeat(20))));

        let middle = progress_line(Duration::from_secs(100), Duration::from_secs(200), false);
        assert!(middle.contains(&format!("{}⚪{}", "─".repeat(10), "─".repeat(10))));
    }

    #[test]
    fn test_progress_line_clamps_overflow() {
        let line = progress_line(Duration::from_secs(500), Duration::from_secs(60), false);
        assert!(line.contains("1:00 / 1:00"));
    }

    #[test]
    fn test_limit_title() {
        let long = "a".repeat(300);
        assert_eq!(limit_title(&long).chars().count(), MAX_TITLE_CHARS);
        assert_eq!(limit_title("corto"), "corto");
    }
}
