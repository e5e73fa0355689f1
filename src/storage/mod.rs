//! Объектное хранилище артефактов (аудио, видео, субтитры).
//!
//! Ядро видит хранилище только через [`ObjectStorage`]; ключи выбирает само
//! ядро (см. [`keys`]).

pub mod local;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;

use crate::error::{Result, StudioError};

pub use local::LocalObjectStorage;

/// Контракт объектного хранилища
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Загрузить объект под ключом `key`
    async fn upload(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<()>;

    /// Краткоживущая ссылка на чтение объекта
    async fn signed_get_url(
        &self,
        key: &str,
        ttl: Duration,
        download_name: Option<&str>,
    ) -> Result<Url>;

    /// Удалить объект; отсутствие объекта ошибкой не считается
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Скачать объект через подписанную ссылку
pub async fn fetch_object(storage: &dyn ObjectStorage, key: &str, ttl: Duration) -> Result<Bytes> {
    let url = storage.signed_get_url(key, ttl, None).await?;
    log::debug!("Fetching object {} via {} URL", key, url.scheme());

    if url.scheme() == "file" {
        let path = url
            .to_file_path()
            .map_err(|_| StudioError::Storage(format!("invalid file URL for {}", key)))?;
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            StudioError::Storage(format!("failed to read object {}: {}", key, e))
        })?;
        return Ok(Bytes::from(bytes));
    }

    let response = reqwest::get(url).await?;
    if !response.status().is_success() {
        return Err(StudioError::Storage(format!(
            "failed to fetch object {}: status {}",
            key,
            response.status()
        )));
    }
    Ok(response.bytes().await?)
}

/// Удаление без ошибки: используется для замены и отката артефактов
pub async fn delete_quietly(storage: &dyn ObjectStorage, key: &str) {
    if let Err(e) = storage.delete(key).await {
        log::warn!("Failed to delete object {}: {}", key, e);
    }
}

/// Ключи артефактов беседы
pub mod keys {
    fn key(folder: &str, conversation_id: &str, extension: &str) -> String {
        format!(
            "conversations/{}/{}/{}.{}",
            folder,
            conversation_id,
            uuid::Uuid::new_v4(),
            extension
        )
    }

    pub fn audio(conversation_id: &str) -> String {
        key("audio", conversation_id, "mp3")
    }

    pub fn video(conversation_id: &str) -> String {
        key("video", conversation_id, "mp4")
    }

    pub fn subtitles(conversation_id: &str) -> String {
        key("subtitles", conversation_id, "json")
    }

    #[cfg(test)]
    mod tests {
        #[test]
        fn test_keys_are_namespaced_and_unique() {
            let a = super::audio("c1");
            let b = super::audio("c1");
            assert!(a.starts_with("conversations/audio/c1/"));
            assert!(a.ends_with(".mp3"));
            assert_ne!(a, b);
            assert!(super::subtitles("c1").starts_with("conversations/subtitles/c1/"));
            assert!(super::video("c1").ends_with(".mp4"));
        }
    }
}
