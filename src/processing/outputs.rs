//! Output directory lifecycle: empty before a batch, replace single outputs

use std::io::ErrorKind;
use std::path::Path;

use futures::future::join_all;
use tokio::fs;
use tracing::debug;

use crate::error::{Result, DerivativeError};

/// Delete every immediate entry of `directory`, concurrently.
///
/// The directory must already exist. Returns the number of entries removed.
pub async fn reset<P: AsRef<Path>>(directory: P) -> Result<usize> {
    let directory = directory.as_ref();

    let mut entries = fs::read_dir(directory)
        .await
        .map_err(|e| DerivativeError::directory_access(directory, format!("cannot list: {}", e)))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| DerivativeError::directory_access(directory, format!("cannot list: {}", e)))?
    {
        paths.push(entry.path());
    }

    let removals = paths.iter().map(|path| async move {
        fs::remove_file(path).await.map_err(|e| (path, e))
    });
    let results = join_all(removals).await;

    let failures: Vec<_> = results.into_iter().filter_map(|r| r.err()).collect();
    if let Some((path, first)) = failures.first() {
        return Err(DerivativeError::directory_access(
            directory,
            format!(
                "{} of {} entries could not be removed (first: {}: {})",
                failures.len(),
                paths.len(),
                path.display(),
                first
            ),
        ));
    }

    debug!("Reset {:?}: removed {} entries", directory, paths.len());
    Ok(paths.len())
}

/// Remove a previous output at `path`; a missing file is not an error
pub async fn remove_stale<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    match fs::remove_file(path).await {
        Ok(()) => {
            debug!("Removed previous output {:?}", path);
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No previous output at {:?}", path);
            Ok(())
        }
        Err(e) => Err(DerivativeError::render(
            path,
            format!("cannot remove previous output: {}", e),
        )),
    }
}
