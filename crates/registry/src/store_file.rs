//! JSON file-backed subscriber store with atomic writes.

use std::{
    collections::BTreeMap,
    ffi::OsString,
    path::{Path, PathBuf},
};

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    tokio::{fs, io::AsyncWriteExt},
    tracing::{debug, warn},
};

use crate::{
    Error, Result,
    store::SubscriberStore,
    types::{ChatKind, Destination, DestinationId},
};

/// On-disk layout: `{"chats": {"<id>": {"title": "...", "type": "group"}}}`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredState {
    #[serde(default)]
    chats: BTreeMap<i64, StoredChat>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredChat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    kind: Option<ChatKind>,
}

impl StoredState {
    fn from_destinations(destinations: &[Destination]) -> Self {
        let chats = destinations
            .iter()
            .map(|d| {
                (d.id.0, StoredChat {
                    title: d.title.clone(),
                    kind: d.kind,
                })
            })
            .collect();
        Self { chats }
    }

    fn into_destinations(self) -> Vec<Destination> {
        self.chats
            .into_iter()
            .map(|(id, chat)| Destination {
                id: DestinationId(id),
                kind: chat.kind,
                title: chat.title,
            })
            .collect()
    }
}

/// Single JSON file holding the full subscriber set.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling temp file: `<name>.tmp`.
    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("subscriptions"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Atomic write: write and fsync a temp file, rename it over the target,
    /// then fsync the directory so the rename itself is durable.
    async fn atomic_write(&self, state: &StoredState) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(state)?;
        let tmp = self.tmp_path();

        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&tmp, &self.path).await {
            if let Err(cleanup) = fs::remove_file(&tmp).await {
                warn!(path = %tmp.display(), error = %cleanup, "failed to remove temp subscriptions file");
            }
            return Err(e.into());
        }
        sync_parent_dir(&self.path).await
    }
}

#[cfg(unix)]
async fn sync_parent_dir(path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::File::open(dir).await?.sync_all().await?;
    Ok(())
}

#[cfg(not(unix))]
async fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}

#[async_trait]
impl SubscriberStore for FileStore {
    async fn load(&self) -> Result<Vec<Destination>> {
        let data = match fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no subscriptions file yet");
                return Ok(Vec::new());
            },
            Err(e) => return Err(e.into()),
        };
        if data.trim().is_empty() {
            return Ok(Vec::new());
        }
        let state: StoredState =
            serde_json::from_str(&data).map_err(|e| Error::corrupt(&self.path, e))?;
        Ok(state.into_destinations())
    }

    async fn save(&self, destinations: &[Destination]) -> Result<()> {
        self.atomic_write(&StoredState::from_destinations(destinations))
            .await
    }
}
