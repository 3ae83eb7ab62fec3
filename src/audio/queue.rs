use rand::seq::SliceRandom;
use std::{
    collections::{hash_map::DefaultHasher, VecDeque},
    hash::{Hash, Hasher},
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, info};

/// Track resuelto por el nodo de audio.
///
/// `encoded` es el blob opaco que el nodo necesita para reproducirlo; el resto
/// son metadatos para mostrar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub encoded: String,
    pub identifier: String,
    pub title: String,
    pub author: String,
    /// `None` para streams en vivo o duración desconocida
    pub duration: Option<Duration>,
    pub uri: Option<String>,
    pub source_name: String,
    pub is_stream: bool,
    /// Reproducción de la sesión a la que pertenece este track. El nodo lo
    /// devuelve en `userData` con cada evento.
    pub play_id: Option<u64>,
}

impl Track {
    /// Hash estable del contenido, usado para deduplicar y para descartar
    /// eventos del nodo que ya no corresponden al track actual.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.encoded.hash(&mut hasher);
        hasher.finish()
    }

    pub fn display_uri(&self) -> &str {
        self.uri.as_deref().unwrap_or(&self.identifier)
    }

    pub fn is_seekable(&self) -> bool {
        !self.is_stream && self.duration.is_some_and(|d| !d.is_zero())
    }
}

/// Radio en vivo: etiqueta de género, URL del stream y el track que el nodo
/// cargó para ese stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioStream {
    pub genre: String,
    pub stream_url: String,
    pub track: Track,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueItem {
    Track(Track),
    Radio(RadioStream),
}

impl QueueItem {
    /// Track que se envía al nodo para este item
    pub fn playable(&self) -> &Track {
        match self {
            QueueItem::Track(track) => track,
            QueueItem::Radio(radio) => &radio.track,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            QueueItem::Track(track) => &track.title,
            QueueItem::Radio(radio) => &radio.genre,
        }
    }

    pub fn uri(&self) -> &str {
        match self {
            QueueItem::Track(track) => track.display_uri(),
            QueueItem::Radio(radio) => &radio.stream_url,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            QueueItem::Track(track) => track.duration,
            QueueItem::Radio(_) => None,
        }
    }

    pub fn is_radio(&self) -> bool {
        matches!(self, QueueItem::Radio(_))
    }

    pub fn content_hash(&self) -> u64 {
        self.playable().content_hash()
    }

    /// Mismo item marcado con una reproducción nueva
    pub fn tagged(mut self, play_id: u64) -> Self {
        match &mut self {
            QueueItem::Track(track) => track.play_id = Some(play_id),
            QueueItem::Radio(radio) => radio.track.play_id = Some(play_id),
        }
        self
    }
}

impl From<Track> for QueueItem {
    fn from(track: Track) -> Self {
        QueueItem::Track(track)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("la cola está vacía")]
    Empty,
    #[error("la cola está llena (máximo {0} canciones)")]
    Full(usize),
}

/// Cola FIFO de una sesión. No tiene sincronización propia: la sesión dueña
/// la protege.
#[derive(Debug)]
pub struct MusicQueue {
    items: VecDeque<QueueItem>,
    max_size: usize,
}

impl MusicQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    /// Agrega un item al final de la cola y devuelve su posición (1-based)
    pub fn enqueue(&mut self, item: QueueItem) -> Result<usize, QueueError> {
        if self.items.len() >= self.max_size {
            return Err(QueueError::Full(self.max_size));
        }

        debug!("➕ Agregado a la cola: {}", item.title());
        self.items.push_back(item);
        Ok(self.items.len())
    }

    /// Agrega todos los items que quepan; devuelve cuántos entraron
    pub fn extend(&mut self, items: impl IntoIterator<Item = QueueItem>) -> usize {
        let available = self.max_size.saturating_sub(self.items.len());
        let before = self.items.len();
        self.items.extend(items.into_iter().take(available));
        self.items.len() - before
    }

    /// Saca el primer item (FIFO)
    pub fn dequeue(&mut self) -> Result<QueueItem, QueueError> {
        self.items.pop_front().ok_or(QueueError::Empty)
    }

    pub fn shuffle(&mut self) {
        let mut rng = rand::thread_rng();
        self.items.make_contiguous().shuffle(&mut rng);
        info!("🔀 Cola mezclada ({} canciones)", self.items.len());
    }

    /// Limpia la cola y devuelve cuántos items se eliminaron
    pub fn clear(&mut self) -> usize {
        let removed = self.items.len();
        self.items.clear();
        if removed > 0 {
            info!("🗑️ Cola limpiada ({} canciones)", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueItem> {
        self.items.iter()
    }

    pub fn total_duration(&self) -> Duration {
        self.items.iter().filter_map(QueueItem::duration).sum()
    }

    /// Obtiene una página de la cola (páginas 1-based)
    pub fn page(&self, page: usize, per_page: usize) -> QueuePage {
        let per_page = per_page.max(1);
        let total_pages = self.items.len().div_ceil(per_page).max(1);
        let current_page = page.clamp(1, total_pages);
        let start = (current_page - 1) * per_page;

        QueuePage {
            items: self.items.iter().skip(start).take(per_page).cloned().collect(),
            offset: start,
            current_page,
            total_pages,
            total_items: self.items.len(),
            total_duration: self.total_duration(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuePage {
    pub items: Vec<QueueItem>,
    /// Posición del primer item de la página dentro de la cola
    pub offset: usize,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
    pub total_duration: Duration,
}
