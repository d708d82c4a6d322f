use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// 对象存储
///
/// Objects are addressed as `{directory_hint}/{organization}/{file name}`;
/// see [`object_key`].
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Copies `local_path` into the store and returns its key.
    async fn upload(
        &self,
        organization_code: &str,
        local_path: &Path,
        directory_hint: &str,
    ) -> Result<String>;

    async fn fetch(&self, organization_code: &str, key: &str) -> Result<Vec<u8>>;

    async fn download_link(&self, organization_code: &str, key: &str) -> Result<String>;
}

pub type DynObjectStorage = Arc<dyn ObjectStorage>;

pub fn object_key(directory_hint: &str, organization_code: &str, file_name: &str) -> String {
    let hint = directory_hint.trim_matches('/');
    if hint.is_empty() {
        format!("{organization_code}/{file_name}")
    } else {
        format!("{hint}/{organization_code}/{file_name}")
    }
}
