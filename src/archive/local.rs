use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::storage::{object_key, ObjectStorage};
use crate::error::{FlowEngineError, Result};

/// 本地目录实现的对象存储
#[derive(Clone, Debug)]
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

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(FlowEngineError::Storage(format!("invalid object key `{key}`")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn upload(
        &self,
        organization_code: &str,
        local_path: &Path,
        directory_hint: &str,
    ) -> Result<String> {
        let file_name = local_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                FlowEngineError::Storage(format!("`{}` has no file name", local_path.display()))
            })?;
        let key = object_key(directory_hint, organization_code, file_name);
        let target = self.resolve(&key)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(local_path, &target).await?;
        debug!(key = %key, "object uploaded");
        Ok(key)
    }

    async fn fetch(&self, _organization_code: &str, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FlowEngineError::Storage(format!("object `{key}` not found")),
            _ => FlowEngineError::Io(e),
        })
    }

    async fn download_link(&self, _organization_code: &str, key: &str) -> Result<String> {
        Ok(format!("file://{}", self.resolve(key)?.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_then_fetch() {
        let source = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let file = source.path().join("run-1.json");
        std::fs::write(&file, b"{}").unwrap();

        let storage = LocalObjectStorage::new(root.path());
        let key = storage.upload("acme", &file, "flow-execution").await.unwrap();
        assert_eq!(key, "flow-execution/acme/run-1.json");
        assert_eq!(storage.fetch("acme", &key).await.unwrap(), b"{}");
        assert!(storage
            .download_link("acme", &key)
            .await
            .unwrap()
            .starts_with("file://"));
    }

    #[tokio::test]
    async fn keys_cannot_escape_the_root() {
        let root = tempfile::tempdir().unwrap();
        let storage = LocalObjectStorage::new(root.path());
        let err = storage.fetch("acme", "../secret").await.unwrap_err();
        assert!(matches!(err, FlowEngineError::Storage(_)));
    }
}
