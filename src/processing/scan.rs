//! Source resolution: a file or a directory under the source root

use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use crate::error::{Result, DerivativeError};
use crate::processing::formats::is_supported_input_format;

/// Files to process and the directory they live in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBatch {
    pub directory: PathBuf,
    /// File names relative to `directory`, sorted
    pub files: Vec<String>,
}

/// Resolve `src` against `source_root`.
///
/// A directory yields every immediate entry; a file yields itself with its
/// parent as the directory. `src` must be relative: an absolute path would
/// replace `source_root` in the join.
pub async fn resolve<P: AsRef<Path>>(source_root: P, src: &str) -> Result<ResolvedBatch> {
    let relative = Path::new(src);
    if relative
        .components()
        .any(|c| matches!(c, Component::RootDir | Component::Prefix(_)))
    {
        return Err(DerivativeError::invalid_path(relative));
    }
    let joined = source_root.as_ref().join(relative);

    let metadata = fs::metadata(&joined)
        .await
        .map_err(|e| DerivativeError::source_stat(&joined, e))?;

    if !metadata.is_dir() {
        let name = joined
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| DerivativeError::invalid_path(&joined))?
            .to_string();
        let directory = joined
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        debug!("Resolved single file {} in {:?}", name, directory);
        return Ok(ResolvedBatch {
            directory,
            files: vec![name],
        });
    }

    let mut entries = fs::read_dir(&joined)
        .await
        .map_err(|e| DerivativeError::source_stat(&joined, e))?;

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| DerivativeError::source_stat(&joined, e))?
    {
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            return Err(DerivativeError::invalid_path(entry.path()));
        };
        let supported = Path::new(&name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(is_supported_input_format)
            .unwrap_or(false);
        if !supported {
            // Subdirectories land here too and fail when read
            warn!("{} does not look like a supported image; it will likely fail to render", name);
        }
        files.push(name);
    }

    // Listing order is platform-dependent
    files.sort();
    debug!("Resolved {} file(s) in {:?}: {:?}", files.len(), joined, files);

    Ok(ResolvedBatch {
        directory: joined,
        files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as std_fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_resolve_single_file() {
        let root = TempDir::new().unwrap();
        std_fs::create_dir(root.path().join("heroes")).unwrap();
        std_fs::write(root.path().join("heroes/banner.jpg"), b"x").unwrap();

        let batch = resolve(root.path(), "heroes/banner.jpg").await.unwrap();
        assert_eq!(batch.files, vec!["banner.jpg".to_string()]);
        assert_eq!(batch.directory, root.path().join("heroes"));
    }

    #[tokio::test]
    async fn test_resolve_directory_lists_sorted_files() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("shoes");
        std_fs::create_dir_all(dir.join("nested")).unwrap();
        for name in ["c.png", "a.jpg", "b.jpg"] {
            std_fs::write(dir.join(name), b"x").unwrap();
        }

        let batch = resolve(root.path(), "shoes").await.unwrap();
        assert_eq!(batch.directory, dir);
        assert_eq!(batch.files, vec!["a.jpg", "b.jpg", "c.png", "nested"]);
    }

    #[tokio::test]
    async fn test_resolve_rejects_absolute_source() {
        let root = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let secret = outside.path().join("secret.jpg");
        std_fs::write(&secret, b"x").unwrap();

        let err = resolve(root.path().join("src-images"), secret.to_str().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, DerivativeError::InvalidPath { .. }));
    }

    #[tokio::test]
    async fn test_resolve_empty_src_uses_root() {
        let root = TempDir::new().unwrap();
        std_fs::write(root.path().join("only.jpg"), b"x").unwrap();

        let batch = resolve(root.path(), "").await.unwrap();
        assert_eq!(batch.files, vec!["only.jpg"]);
    }

    #[tokio::test]
    async fn test_resolve_missing_source() {
        let root = TempDir::new().unwrap();
        let err = resolve(root.path(), "missing.jpg").await.unwrap_err();
        assert!(matches!(err, DerivativeError::SourceStat { .. }));
        assert!(err.is_batch_fatal());
    }
}
