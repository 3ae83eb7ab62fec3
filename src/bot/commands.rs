use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::Command, application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    Command::set_global_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        radio_command(),
        pause_command(),
        resume_command(),
        skip_command(),
        stop_command(),
        loop_command(),
        autoplay_command(),
        shuffle_command(),
        clear_command(),
        volume_command(),
        seek_command(),
        queue_command(),
        nowplaying_command(),
        leave_command(),
    ]
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción o playlist")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL o término de búsqueda",
            )
            .required(true),
        )
}

fn radio_command() -> CreateCommand {
    CreateCommand::new("radio")
        .description("Reproduce una radio en vivo (reemplaza la cola)")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "url", "URL del stream")
                .required(true),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::String,
            "genre",
            "Género para mostrar",
        ))
}

// Comandos de control

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la reproducción actual")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la reproducción pausada")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta a la siguiente canción")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción y limpia la cola")
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop").description("Activa/desactiva la repetición de la canción actual")
}

fn autoplay_command() -> CreateCommand {
    CreateCommand::new("autoplay")
        .description("Activa/desactiva canciones relacionadas al terminar la cola")
}

// Comandos de cola

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Mezcla la cola de reproducción")
}

fn clear_command() -> CreateCommand {
    CreateCommand::new("clear").description("Limpia la cola de reproducción")
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Muestra la cola de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Número de página")
                .min_int_value(1),
        )
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Muestra información de la canción actual")
}

// Comandos de audio

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Ajusta el volumen de reproducción")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "level",
                "Nivel de volumen (0-200)",
            )
            .min_int_value(0)
            .max_int_value(200)
            .required(true),
        )
}

fn seek_command() -> CreateCommand {
    CreateCommand::new("seek")
        .description("Adelanta o retrocede la canción actual")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "seconds",
                "Segundos a mover (negativo para retroceder)",
            )
            .required(true),
        )
}

// Comandos de conexión

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Desconecta el bot del canal de voz")
}
