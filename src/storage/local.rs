//! Хранилище объектов в локальном каталоге.
//!
//! Подписанные ссылки здесь имеют схему `file://`; срок действия
//! записывается в query, но не проверяется.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;

use super::ObjectStorage;
use crate::error::{Result, StudioError};

pub struct LocalObjectStorage {
    root: PathBuf,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Путь объекта; ключ не может выходить за пределы корня
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));

        if !valid {
            return Err(StudioError::Storage(format!("invalid object key: {}", key)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn upload(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;

        log::info!(
            "Stored object {} ({} bytes, {})",
            key,
            bytes.len(),
            content_type
        );
        Ok(())
    }

    async fn signed_get_url(
        &self,
        key: &str,
        ttl: Duration,
        download_name: Option<&str>,
    ) -> Result<Url> {
        let path = self.path_for(key)?;
        if !tokio::fs::try_exists(&path).await? {
            return Err(StudioError::Storage(format!("object not found: {}", key)));
        }

        let absolute = if path.is_absolute() {
            path
        } else {
            std::env::current_dir()?.join(path)
        };
        let mut url = Url::from_file_path(&absolute)
            .map_err(|_| StudioError::Storage(format!("cannot build URL for {}", key)))?;

        let expires = chrono::Utc::now().timestamp() + ttl.as_secs() as i64;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("expires", &expires.to_string());
            if let Some(name) = download_name {
                query.append_pair("filename", name);
            }
        }
        Ok(url)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                log::debug!("Deleted object {}", key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fetch_object;

    #[tokio::test]
    async fn test_upload_fetch_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalObjectStorage::new(dir.path());
        let key = "conversations/audio/c1/a.mp3";

        storage
            .upload(key, Bytes::from_static(b"mp3"), "audio/mpeg")
            .await
            .unwrap();

        let url = storage
            .signed_get_url(key, Duration::from_secs(60), Some("lesson.mp3"))
            .await
            .unwrap();
        assert_eq!(url.scheme(), "file");
        assert!(url.query().unwrap().contains("filename=lesson.mp3"));

        let bytes = fetch_object(&storage, key, Duration::from_secs(60)).await.unwrap();
        assert_eq!(bytes.as_ref(), b"mp3");

        storage.delete(key).await.unwrap();
        storage.delete(key).await.unwrap();
        assert!(fetch_object(&storage, key, Duration::from_secs(60)).await.is_err());
    }

    #[test]
    fn test_keys_cannot_escape_root() {
        let storage = LocalObjectStorage::new("/srv/objects");
        assert!(storage.path_for("../etc/passwd").is_err());
        assert!(storage.path_for("/etc/passwd").is_err());
        assert!(storage.path_for("").is_err());
        assert_eq!(
            storage.path_for("conversations/video/c1/v.mp4").unwrap(),
            PathBuf::from("/srv/objects/conversations/video/c1/v.mp4")
        );
    }
}
