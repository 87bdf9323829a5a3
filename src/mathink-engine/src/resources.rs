//! Staging of per-language model files into writable storage
//!
//! The engine reads its `*.hdb` model files from a directory set through
//! `set_external_resource_path`. Installations ship them read-only; this
//! copies them once into a writable directory and leaves existing copies
//! alone, so it is safe to run before every session.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::Result;

/// Extension of the engine's model files
pub const RESOURCE_EXTENSION: &str = "hdb";

/// Outcome of a staging run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReport {
    /// Files copied in this run
    pub copied: Vec<String>,
    /// Files already present at the destination
    pub skipped: Vec<String>,
    /// Source files with no content
    pub empty: Vec<String>,
}

impl StageReport {
    pub fn is_complete(&self) -> bool {
        self.empty.is_empty()
    }
}

/// Copy every regular file of `source_dir` into `dest_dir` unless a file of
/// the same name already exists there.
pub async fn stage_resources(source_dir: impl AsRef<Path>, dest_dir: impl AsRef<Path>) -> Result<StageReport> {
    let source_dir = source_dir.as_ref();
    let dest_dir = dest_dir.as_ref();

    tokio::fs::create_dir_all(dest_dir).await?;
    info!("staging resources from {:?} to {:?}", source_dir, dest_dir);

    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(source_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            names.push(entry.file_name());
        }
    }
    names.sort();

    let mut report = StageReport::default();
    let total = names.len();

    for (i, name) in names.into_iter().enumerate() {
        let file_name = name.to_string_lossy().into_owned();
        let target = dest_dir.join(&name);

        if tokio::fs::try_exists(&target).await? {
            debug!("[{}/{}] {} already exists, skipping", i + 1, total, file_name);
            report.skipped.push(file_name);
            continue;
        }

        let contents = tokio::fs::read(source_dir.join(&name)).await?;
        if contents.is_empty() {
            warn!("[{}/{}] {} is empty, not staged", i + 1, total, file_name);
            report.empty.push(file_name);
            continue;
        }

        // Write under a temporary name so a partial copy never looks staged.
        let temp = temp_path(&target);
        tokio::fs::write(&temp, &contents).await?;
        tokio::fs::rename(&temp, &target).await?;

        info!("[{}/{}] staged {} ({} bytes)", i + 1, total, file_name, contents.len());
        report.copied.push(file_name);
    }

    Ok(report)
}

/// Names of `*.hdb` files present in `dir`
pub fn list_resources(dir: impl AsRef<Path>) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir.as_ref())? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == RESOURCE_EXTENSION) {
            if let Some(name) = path.file_name() {
                names.push(name.to_string_lossy().into_owned());
            }
        }
    }
    names.sort();
    Ok(names)
}

fn temp_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    target.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_staging_is_idempotent() {
        let source = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("math.hdb"), b"model").unwrap();
        std::fs::write(source.path().join("chem.hdb"), b"chem").unwrap();

        let first = stage_resources(source.path(), dest.path()).await.unwrap();
        assert_eq!(first.copied, vec!["chem.hdb", "math.hdb"]);
        assert!(first.skipped.is_empty());

        let second = stage_resources(source.path(), dest.path()).await.unwrap();
        assert!(second.copied.is_empty());
        assert_eq!(second.skipped, vec!["chem.hdb", "math.hdb"]);
    }

    #[tokio::test]
    async fn test_existing_files_are_not_overwritten() {
        let source = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("math.hdb"), b"new").unwrap();
        std::fs::write(dest.path().join("math.hdb"), b"old").unwrap();

        stage_resources(source.path(), dest.path()).await.unwrap();
        assert_eq!(std::fs::read(dest.path().join("math.hdb")).unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_empty_sources_are_reported() {
        let source = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("broken.hdb"), b"").unwrap();

        let report = stage_resources(source.path(), dest.path().join("nested")).await.unwrap();
        assert_eq!(report.empty, vec!["broken.hdb"]);
        assert!(!report.is_complete());
        assert!(!dest.path().join("nested/broken.hdb").exists());
    }

    #[test]
    fn test_list_resources() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.hdb"), b"x").unwrap();
        std::fs::write(dir.path().join("a.hdb"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        assert_eq!(list_resources(dir.path()).unwrap(), vec!["a.hdb", "b.hdb"]);
    }

    #[test]
    fn test_temp_path() {
        assert_eq!(temp_path(Path::new("/x/math.hdb")), PathBuf::from("/x/math.hdb.tmp"));
    }
}
