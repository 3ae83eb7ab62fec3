use serenity::model::id::GuildId;
use std::time::Duration;
use thiserror::Error;

use super::node::NodeError;

/// Fallos del núcleo de sesiones. Ninguno tumba la sesión por sí solo salvo
/// `NodeOutage`.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("no se pudo crear la sesión de guild {guild_id}: {source}")]
    ConnectionFailure {
        guild_id: GuildId,
        #[source]
        source: NodeError,
    },
    #[error("no se pudo reproducir {uri}: {reason}")]
    TrackPlaybackFailure { uri: String, reason: String },
    #[error("el nodo de audio se desconectó ({code}): {reason}")]
    NodeOutage { code: u16, reason: String },
    #[error("posición {target_ms}ms fuera de rango (duración {duration:?})")]
    SeekOutOfRange { target_ms: i64, duration: Duration },
}
