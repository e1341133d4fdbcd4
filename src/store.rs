use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

/// Per-user settings kept in memory and mirrored to a JSON object on disk,
/// keyed by the user id as a string.
///
/// Writes go to a temp file in the same directory which then replaces the
/// target, so a crash never leaves a half-written file. The entry lock is
/// held until the file is replaced, so the last write on disk is always the
/// last update in memory. A failed write is logged and the in-memory value
/// still applies.
#[derive(Clone)]
pub struct JsonStore<V> {
    path: PathBuf,
    entries: Arc<Mutex<HashMap<String, V>>>,
}

impl<V> JsonStore<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Loads `path`; a missing or unreadable file starts an empty store.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|err| {
                warn!("{} is not valid JSON ({}), starting empty", path.display(), err);
                HashMap::new()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => {
                warn!("cannot read {} ({}), starting empty", path.display(), err);
                HashMap::new()
            }
        };
        Self {
            path,
            entries: Arc::new(Mutex::new(entries)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self, user: u64) -> Option<V> {
        self.entries.lock().await.get(&user.to_string()).cloned()
    }

    pub async fn set(&self, user: u64, value: V) {
        let mut entries = self.entries.lock().await;
        entries.insert(user.to_string(), value);
        self.persist(entries.clone()).await;
    }

    /// Returns whether anything was stored for `user`.
    pub async fn remove(&self, user: u64) -> bool {
        let mut entries = self.entries.lock().await;
        if entries.remove(&user.to_string()).is_none() {
            return false;
        }
        self.persist(entries.clone()).await;
        true
    }

    async fn persist(&self, snapshot: HashMap<String, V>) {
        let path = self.path.clone();
        let outcome = tokio::task::spawn_blocking(move || write_atomically(&path, &snapshot)).await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!("persisting {} failed: {:#}", self.path.display(), err),
            Err(err) => warn!("persisting {} failed: {}", self.path.display(), err),
        }
    }
}

fn write_atomically<V: Serialize>(path: &Path, entries: &HashMap<String, V>) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).context("creating temp file")?;
    serde_json::to_writer_pretty(tmp.as_file_mut(), entries).context("serializing store")?;
    tmp.as_file().sync_all().context("flushing temp file")?;
    tmp.persist(path)
        .with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}
