use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::seq::IteratorRandom;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, path::PathBuf};
use tokio::{fs, sync::Mutex};
use tracing::{debug, info, warn};

/// Almacén de IDs de video ya vistos, usado como respaldo del autoplay
#[async_trait]
pub trait CandidateStore: Send + Sync {
    /// Inserta los IDs que falten; repetir la misma llamada no cambia nada
    async fn remember(&self, ids: &[String]) -> Result<usize>;

    /// Un ID guardado al azar, si hay alguno
    async fn random(&self) -> Result<Option<String>>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CandidateFile {
    video_ids: BTreeSet<String>,
}

/// Manager de almacenamiento basado en archivos JSON
pub struct JsonStorage {
    path: PathBuf,
    candidates: Mutex<BTreeSet<String>>,
}

impl JsonStorage {
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&data_dir).await?;
        let path = data_dir.join("autoplay_candidates.json");

        let candidates = match fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<CandidateFile>(&content) {
                Ok(file) => file.video_ids,
                Err(e) => {
                    warn!("⚠️ Archivo de candidatos corrupto, se empieza vacío: {}", e);
                    BTreeSet::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeSet::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("No se pudo leer {}", path.display()))
            }
        };

        info!(
            "📁 Storage inicializado en: {} ({} candidatos)",
            data_dir.display(),
            candidates.len()
        );

        Ok(Self {
            path,
            candidates: Mutex::new(candidates),
        })
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.candidates.lock().await.len()
    }

    /// Escribe a un temporal y renombra para no dejar el archivo a medias
    async fn persist(&self, candidates: &BTreeSet<String>) -> Result<()> {
        let file = CandidateFile {
            video_ids: candidates.clone(),
        };
        let content = serde_json::to_string_pretty(&file)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &self.path).await?;

        debug!("💾 {} candidatos guardados", candidates.len());
        Ok(())
    }
}

#[async_trait]
impl CandidateStore for JsonStorage {
    async fn remember(&self, ids: &[String]) -> Result<usize> {
        let mut candidates = self.candidates.lock().await;
        let before = candidates.len();
        candidates.extend(ids.iter().filter(|id| !id.is_empty()).cloned());

        let added = candidates.len() - before;
        if added > 0 {
            self.persist(&candidates).await?;
        }
        Ok(added)
    }

    async fn random(&self) -> Result<Option<String>> {
        let candidates = self.candidates.lock().await;
        Ok(candidates.iter().choose(&mut rand::thread_rng()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn test_remember_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path().to_path_buf()).await.unwrap();

        assert_eq!(storage.remember(&ids(&["aaaaaaaaaaa", "bbbbbbbbbbb"])).await.unwrap(), 2);
        assert_eq!(storage.remember(&ids(&["aaaaaaaaaaa", "bbbbbbbbbbb"])).await.unwrap(), 0);
        assert_eq!(storage.len().await, 2);
    }

    #[tokio::test]
    async fn test_candidates_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage = JsonStorage::new(dir.path().to_path_buf()).await.unwrap();
            storage.remember(&ids(&["dQw4w9WgXcQ"])).await.unwrap();
        }

        let reloaded = JsonStorage::new(dir.path().to_path_buf()).await.unwrap();
        assert_eq!(reloaded.random().await.unwrap(), Some("dQw4w9WgXcQ".to_string()));
    }

    #[tokio::test]
    async fn test_random_on_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path().to_path_buf()).await.unwrap();
        assert_eq!(storage.random().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("autoplay_candidates.json"), "{no es json").unwrap();

        let storage = JsonStorage::new(dir.path().to_path_buf()).await.unwrap();
        assert_eq!(storage.len().await, 0);
    }
}
