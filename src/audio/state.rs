use std::time::Duration;
use tracing::info;

use super::queue::{QueueItem, Track};

pub const MAX_VOLUME: u16 = 200;

/// Flags de reproducción de una sesión más el item actual.
#[derive(Debug, Clone)]
pub struct PlaybackState {
    pub current: Option<QueueItem>,
    pub paused: bool,
    pub looping: bool,
    pub autoplay: bool,
    pub volume: u16,
    /// Última posición reportada por el nodo
    pub position: Duration,
    /// Contador de reproducciones iniciadas en la sesión
    plays: u64,
}

impl PlaybackState {
    pub fn new(volume: u16, autoplay: bool) -> Self {
        Self {
            current: None,
            paused: false,
            looping: false,
            autoplay,
            volume: volume.min(MAX_VOLUME),
            position: Duration::ZERO,
            plays: 0,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.current.is_some()
    }

    pub fn is_radio(&self) -> bool {
        self.current.as_ref().is_some_and(QueueItem::is_radio)
    }

    /// Marca `item` como actual desde el inicio con una reproducción nueva y
    /// devuelve el item marcado, que es el que se envía al nodo
    pub fn start(&mut self, item: QueueItem) -> QueueItem {
        self.plays += 1;
        let item = item.tagged(self.plays);
        self.current = Some(item.clone());
        self.paused = false;
        self.position = Duration::ZERO;
        item
    }

    /// Si un evento del nodo sobre `track` corresponde a la reproducción
    /// actual. Sin `play_id` se compara el contenido.
    pub fn is_current_play(&self, track: &Track) -> bool {
        self.current.as_ref().is_some_and(|current| {
            let playing = current.playable();
            match track.play_id {
                Some(play_id) => playing.play_id == Some(play_id),
                None => playing.content_hash() == track.content_hash(),
            }
        })
    }

    /// Deja la sesión sin item actual y devuelve el que estaba sonando
    pub fn finish(&mut self) -> Option<QueueItem> {
        self.paused = false;
        self.position = Duration::ZERO;
        self.current.take()
    }

    pub fn toggle_loop(&mut self) -> bool {
        self.looping = !self.looping;
        info!(
            "{} Repetición {}",
            if self.looping { "🔂" } else { "➡️" },
            if self.looping { "activada" } else { "desactivada" }
        );
        self.looping
    }

    pub fn toggle_autoplay(&mut self) -> bool {
        self.autoplay = !self.autoplay;
        info!(
            "🎲 Autoplay {}",
            if self.autoplay { "activado" } else { "desactivado" }
        );
        self.autoplay
    }

    /// Ajusta el volumen al rango [0, 200] y devuelve el valor aplicado
    pub fn set_volume(&mut self, volume: i32) -> u16 {
        self.volume = volume.clamp(0, i32::from(MAX_VOLUME)) as u16;
        self.volume
    }
}
