use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// URL prefix uploaded images are served under.
pub const UPLOADS_ROUTE: &str = "/uploads";

/// Writes uploaded images to disk under random names.
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
    public_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub path: PathBuf,
    pub url: String,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>, public_url: &str) -> Self {
        ImageStore {
            dir: dir.into(),
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create uploads directory {}", self.dir.display()))
    }

    pub async fn save(&self, original_name: &str, bytes: &[u8]) -> Result<StoredImage> {
        let file_name = format!("{}{}", Uuid::new_v4(), extension_of(original_name));
        let path = self.dir.join(&file_name);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write upload {}", path.display()))?;

        Ok(StoredImage {
            url: format!("{}{}/{}", self.public_url, UPLOADS_ROUTE, file_name),
            path,
        })
    }

    pub async fn remove(&self, image: &StoredImage) {
        if let Err(e) = tokio::fs::remove_file(&image.path).await {
            tracing::warn!(path = %image.path.display(), error = %e, "Failed to remove orphaned upload");
        }
    }
}

/// Keeps a short alphanumeric extension from the client's file name, with its dot.
fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}
