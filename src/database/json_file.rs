//! Whole-document JSON file storage.
//!
//! Every read returns the complete document and every write replaces it.
//! Writes go to a sibling temp file that is then renamed over the target.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Storage failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn json(path: &Path, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A JSON document stored in a single file.
pub struct JsonFile<T> {
    path: PathBuf,
    /// Serializes writers (and read-modify-write updates) within the process.
    write_lock: Mutex<()>,
    _doc: PhantomData<fn() -> T>,
}

impl<T> JsonFile<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
            _doc: PhantomData,
        }
    }

    /// Read the document. `Ok(None)` if the file does not exist.
    pub async fn load(&self) -> Result<Option<T>, StoreError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::json(&self.path, e))
    }

    /// Read the document, falling back to `T::default()` when missing.
    pub async fn load_or_default(&self) -> Result<T, StoreError> {
        Ok(self.load().await?.unwrap_or_default())
    }

    /// Replace the document.
    pub async fn save(&self, value: &T) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.write(value).await
    }

    /// Load, mutate and save under the write lock.
    pub async fn update<R, F>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut T) -> R,
    {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load_or_default().await?;
        let result = f(&mut doc);
        self.write(&doc).await?;
        Ok(result)
    }

    /// Create the file with an empty document if it does not exist.
    pub async fn ensure_exists(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        if fs::try_exists(&self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?
        {
            return Ok(());
        }

        self.write(&T::default()).await?;
        info!("Created {}", self.path.display());
        Ok(())
    }

    async fn write(&self, value: &T) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }

        let json = serde_json::to_vec_pretty(value).map_err(|e| StoreError::json(&self.path, e))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, &json)
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;

        debug!("Wrote {} ({} bytes)", self.path.display(), json.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    type Doc = BTreeMap<String, u32>;

    #[tokio::test]
    async fn test_missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let file: JsonFile<Doc> = JsonFile::new(dir.path().join("absent.json"));
        assert!(file.load().await.unwrap().is_none());
        assert!(file.load_or_default().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let file: JsonFile<Doc> = JsonFile::new(dir.path().join("nested/doc.json"));

        let mut doc = Doc::new();
        doc.insert("a".into(), 1);
        file.save(&doc).await.unwrap();

        assert_eq!(file.load().await.unwrap(), Some(doc));
        assert!(!dir.path().join("nested/doc.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_update_applies_closure() {
        let dir = tempfile::tempdir().unwrap();
        let file: JsonFile<Doc> = JsonFile::new(dir.path().join("doc.json"));

        let len = file
            .update(|doc| {
                doc.insert("x".into(), 3);
                doc.len()
            })
            .await
            .unwrap();

        assert_eq!(len, 1);
        assert_eq!(file.load_or_default().await.unwrap().get("x"), Some(&3));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        std::fs::write(&path, b"{ nope").unwrap();

        let file: JsonFile<Doc> = JsonFile::new(path);
        assert!(matches!(file.load().await, Err(StoreError::Json { .. })));
    }

    #[tokio::test]
    async fn test_ensure_exists_keeps_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        std::fs::write(&path, br#"{"keep": 1}"#).unwrap();

        let file: JsonFile<Doc> = JsonFile::new(path);
        file.ensure_exists().await.unwrap();
        assert_eq!(file.load_or_default().await.unwrap().get("keep"), Some(&1));
    }
}
