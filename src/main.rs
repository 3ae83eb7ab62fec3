use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod storage;
#[cfg(test)]
mod testing;
mod ui;

use crate::audio::{
    autoplay::YouTubeAutoplay,
    lavalink::LavalinkNode,
    player::AudioPlayer,
    session::{PlayerContext, PlayerSettings},
};
use crate::bot::{chat::SerenityChat, GuildTuneBot};
use crate::config::Config;
use crate::storage::JsonStorage;

const SHUTDOWN_NOTICE: &str = "El bot se está apagando.";

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guildtune=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .with_thread_ids(true)
        .with_target(true)
        .init();

    info!("🎵 Iniciando GuildTune v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    info!("⚙️ Configuración:\n{}", config.summary());

    let storage = Arc::new(JsonStorage::new(config.data_dir.clone()).await?);

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGE_REACTIONS;

    // Songbird solo en modo gateway: el audio lo transmite el nodo
    let songbird = Songbird::serenity();
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(GuildTuneBot::new(config.clone()))
        .register_songbird_with(songbird.clone())
        .await?;

    info!("🎼 Inicializando nodo de audio...");
    let user_id = client.http.get_current_user().await?.id;
    let (node, events) = LavalinkNode::new(&config, user_id, songbird)?;
    node.spawn();

    let chat = Arc::new(SerenityChat::new(client.http.clone(), client.cache.clone()));
    let autoplay = Arc::new(YouTubeAutoplay::new(
        config.youtube_api_key.clone(),
        node.clone(),
        storage,
    )?);

    let player = Arc::new(AudioPlayer::new(PlayerContext {
        node,
        chat,
        autoplay,
        settings: PlayerSettings::from(config.as_ref()),
    }));
    tokio::spawn(player.as_ref().clone().run_node_events(events));

    {
        let mut data = client.data.write().await;
        data.insert::<AudioPlayer>(player.clone());
    }

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        player.disconnect_all(SHUTDOWN_NOTICE).await;
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start_autosharded().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    let version = LavalinkNode::probe(config).await?;
    println!("OK (Lavalink {})", version.trim());
    Ok(())
}
