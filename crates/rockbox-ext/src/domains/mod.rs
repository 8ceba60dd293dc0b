//! Capability domains. Each owns its native state and registers its
//! operations with a `register` function returning its namespace subtree.

pub mod browse;
pub mod library;
pub mod playback;
pub mod playlist;
pub mod settings;
pub mod sound;
pub mod system;

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::OpError;

/// Replace `path` with `contents` through a temp file in the same directory.
pub(crate) async fn write_atomic(path: &Path, contents: Vec<u8>) -> Result<(), OpError> {
    let path: PathBuf = path.to_path_buf();
    let target = path.clone();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let dir = target.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| OpError::Internal(format!("write task aborted: {e}")))?
    .map_err(|e| {
        tracing::error!(path = %path.display(), "failed to write file: {e}");
        OpError::Storage(format!("could not write {}", file_name(&path)))
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
