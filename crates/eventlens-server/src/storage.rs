use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::info;
use url::Url;

use eventlens_core::services::FileStore;

/// Stores uploaded files under `<data_dir>/uploads/` and hands back a
/// `file://` URL.
///
/// File names are prefixed with a content hash, so re-uploading the same
/// bytes under the same name overwrites the earlier copy instead of
/// accumulating duplicates.
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            root: data_dir.as_ref().join("uploads"),
        }
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn store(&self, file_name: &str, bytes: &[u8]) -> Result<String> {
        tokio::fs::create_dir_all(&self.root).await?;
        let root = tokio::fs::canonicalize(&self.root).await?;

        let digest = hex::encode(Sha256::digest(bytes));
        let path = root.join(format!("{}-{}", &digest[..16], sanitize(file_name)));
        tokio::fs::write(&path, bytes).await?;

        let url = Url::from_file_path(&path)
            .map_err(|_| anyhow!("cannot build file URL for {}", path.display()))?;
        info!(path = %path.display(), bytes = bytes.len(), "Upload stored");
        Ok(url.to_string())
    }
}

/// Last path component with anything outside `[A-Za-z0-9._-]` replaced.
fn sanitize(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name)
        .trim();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}
