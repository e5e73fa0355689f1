//! Рабочий каталог одной сборки видео
//!
//! Каталог создаётся через `tempfile` и удаляется при уничтожении значения,
//! поэтому промежуточные файлы не переживают ни успешную сборку, ни ошибку,
//! ни отмену future.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::Result;

/// Временный каталог сборки
pub struct CompositionWorkspace {
    temp_dir: TempDir,
}

impl CompositionWorkspace {
    /// Создать каталог в `parent` или в системном temp
    pub fn new(parent: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("compose-");

        let temp_dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        log::debug!("Created composition workspace {}", temp_dir.path().display());

        Ok(Self { temp_dir })
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Путь файла внутри каталога
    pub fn file(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Записать файл в каталог и вернуть его путь
    pub async fn write(&self, name: &str, contents: impl AsRef<[u8]>) -> Result<PathBuf> {
        let path = self.file(name);
        tokio::fs::write(&path, contents.as_ref()).await?;
        Ok(path)
    }

    /// Удалить каталог явно, получив ошибку удаления
    pub fn close(self) -> Result<()> {
        let path = self.temp_dir.path().to_path_buf();
        self.temp_dir.close()?;
        log::debug!("Removed composition workspace {}", path.display());
        Ok(())
    }
}
