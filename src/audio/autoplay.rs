use anyhow::Result;
use async_trait::async_trait;
use rand::seq::IteratorRandom;
use regex::Regex;
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use super::{node::AudioNode, queue::Track};
use crate::storage::CandidateStore;

const SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";
const RELATED_RESULTS: &str = "6";

/// Busca un track relacionado cuando la cola se vacía con autoplay activo.
/// Los fallos se degradan a "sin candidato".
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AutoplayLookup: Send + Sync {
    async fn related(&self, finished: &Track) -> Option<Track>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
}

#[derive(Debug, Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

/// Autoplay basado en videos relacionados de YouTube, con respaldo en los
/// IDs vistos anteriormente
pub struct YouTubeAutoplay {
    api_key: Option<String>,
    client: reqwest::Client,
    node: Arc<dyn AudioNode>,
    store: Arc<dyn CandidateStore>,
    video_id: Regex,
}

impl YouTubeAutoplay {
    pub fn new(
        api_key: Option<String>,
        node: Arc<dyn AudioNode>,
        store: Arc<dyn CandidateStore>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            api_key,
            client,
            node,
            store,
            video_id: Regex::new(r"(?:youtu\.be/|[?&]v=|/(?:embed|shorts|live)/)([A-Za-z0-9_-]{11})")?,
        })
    }

    /// ID de video de YouTube del track, si lo es
    fn video_id(&self, track: &Track) -> Option<String> {
        let uri = track.uri.as_deref()?;
        if !uri.contains("youtu") {
            return None;
        }
        self.video_id
            .captures(uri)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    async fn related_video(&self, finished: &Track) -> Result<Option<String>> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Ok(None);
        };
        let Some(video_id) = self.video_id(finished) else {
            return Ok(None);
        };

        debug!("🔍 Buscando relacionados de {}", video_id);
        let response = self
            .client
            .get(SEARCH_URL)
            .query(&[
                ("part", "snippet"),
                ("type", "video"),
                ("relatedToVideoId", video_id.as_str()),
                ("maxResults", RELATED_RESULTS),
                ("key", api_key),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("YouTube API error: {} - {}", status, error_text);
        }

        let ids: Vec<String> = response
            .json::<SearchResponse>()
            .await?
            .items
            .into_iter()
            .filter_map(|item| item.id.video_id)
            .collect();

        if let Err(e) = self.store.remember(&ids).await {
            warn!("⚠️ No se pudieron guardar los candidatos: {}", e);
        }

        Ok(pick_related(&ids, &video_id))
    }

    async fn stored_candidate(&self) -> Option<String> {
        match self.store.random().await {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!("⚠️ No se pudo leer el almacén de candidatos: {}", e);
                None
            }
        }
    }
}

/// Elige al azar un relacionado distinto del video que acaba de terminar
fn pick_related(ids: &[String], finished: &str) -> Option<String> {
    ids.iter()
        .filter(|id| id.as_str() != finished)
        .choose(&mut rand::thread_rng())
        .cloned()
}

#[async_trait]
impl AutoplayLookup for YouTubeAutoplay {
    async fn related(&self, finished: &Track) -> Option<Track> {
        let related = match self.related_video(finished).await {
            Ok(related) => related,
            Err(e) => {
                warn!("⚠️ Búsqueda de relacionados falló: {}", e);
                None
            }
        };

        let video_id = match related {
            Some(id) => id,
            None => self.stored_candidate().await?,
        };

        let url = format!("https://www.youtube.com/watch?v={}", video_id);
        match self.node.load_tracks(&url).await {
            Ok(result) => {
                let track = result.first_track();
                match &track {
                    Some(track) => info!("🎲 Autoplay eligió: {}", track.title),
                    None => debug!("El nodo no devolvió tracks para {}", url),
                }
                track
            }
            Err(e) => {
                warn!("⚠️ No se pudo cargar el track de autoplay {}: {}", url, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{node::LoadResult, queue::tests::track},
        testing::FakeNode,
    };

    struct MemoryStore(Vec<String>);

    #[async_trait]
    impl CandidateStore for MemoryStore {
        async fn remember(&self, _ids: &[String]) -> Result<usize> {
            Ok(0)
        }

        async fn random(&self) -> Result<Option<String>> {
            Ok(self.0.first().cloned())
        }
    }

    fn autoplay(node: Arc<FakeNode>, stored: &[&str]) -> YouTubeAutoplay {
        let store = MemoryStore(stored.iter().map(|s| s.to_string()).collect());
        YouTubeAutoplay::new(None, node, Arc::new(store)).unwrap()
    }

    #[test]
    fn test_video_id_extraction() {
        let lookup = autoplay(Arc::new(FakeNode::default()), &[]);
        let mut t = track("x");

        t.uri = Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ&list=videoseries".into());
        assert_eq!(lookup.video_id(&t), Some("dQw4w9WgXcQ".to_string()));

        t.uri = Some("https://youtu.be/dQw4w9WgXcQ?t=42".into());
        assert_eq!(lookup.video_id(&t), Some("dQw4w9WgXcQ".to_string()));

        t.uri = Some("https://soundcloud.com/artist/song".into());
        assert_eq!(lookup.video_id(&t), None);
    }

    #[test]
    fn test_pick_related_excludes_finished() {
        let ids = vec!["aaaaaaaaaaa".to_string(), "bbbbbbbbbbb".to_string()];
        for _ in 0..20 {
            assert_eq!(pick_related(&ids, "aaaaaaaaaaa"), Some("bbbbbbbbbbb".to_string()));
        }
        assert_eq!(pick_related(&ids[..1], "aaaaaaaaaaa"), None);
    }

    #[tokio::test]
    async fn test_falls_back_to_stored_candidate() {
        let node = Arc::new(FakeNode::default());
        node.set_load_result(LoadResult::Track(track("stored")));
        let lookup = autoplay(node.clone(), &["ccccccccccc"]);

        let picked = lookup.related(&track("finished")).await;
        assert_eq!(picked.map(|t| t.title), Some("stored".to_string()));
        assert_eq!(
            node.loaded(),
            vec!["https://www.youtube.com/watch?v=ccccccccccc".to_string()]
        );
    }

    #[tokio::test]
    async fn test_no_candidate_without_store() {
        let node = Arc::new(FakeNode::default());
        let lookup = autoplay(node.clone(), &[]);
        assert_eq!(lookup.related(&track("finished")).await, None);
        assert!(node.loaded().is_empty());
    }
}
