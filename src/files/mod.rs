//! Byte-blob storage for [`File`] entities.
//!
//! Entity metadata flows through the repository; the raw bytes flow through
//! this much narrower contract instead. [`LocalFileStore`] keeps them on the
//! local filesystem under a working directory.

use std::fmt::Debug;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{BackendError, RepositoryError, RepositoryResult};
use crate::model::{File, Model};

/// Load, save, and delete the content of file entities.
pub trait FileStore: Send + Debug {
    /// Reads the stored bytes and attaches them to the entity.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] when no content exists for the path.
    ///
    /// [`RepositoryError::NotFound`]: crate::error::RepositoryError::NotFound
    fn load(&self, file: &mut File) -> RepositoryResult<()>;

    /// Writes the entity's attached content.
    fn save(&self, file: &File) -> RepositoryResult<()>;

    /// Removes the stored content. Missing content is not an error.
    fn delete(&self, file: &File) -> RepositoryResult<()>;
}

/// File store over a local working directory.
///
/// Relative entity paths resolve under the working directory; absolute paths
/// are used as-is.
#[derive(Debug)]
pub struct LocalFileStore {
    workdir: PathBuf,
}

impl LocalFileStore {
    /// Creates the store, creating the working directory when missing.
    pub fn new(workdir: impl Into<PathBuf>) -> RepositoryResult<Self> {
        let workdir = workdir.into();
        std::fs::create_dir_all(&workdir).map_err(|source| BackendError::Io {
            backend: "file",
            source,
        })?;
        info!(workdir = %workdir.display(), "file store ready");
        Ok(Self { workdir })
    }

    /// The working directory content lives under.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn resolve(&self, file: &File) -> PathBuf {
        let path = Path::new(&file.path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workdir.join(path)
        }
    }
}

impl FileStore for LocalFileStore {
    fn load(&self, file: &mut File) -> RepositoryResult<()> {
        let path = self.resolve(file);
        let content = std::fs::read(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                RepositoryError::not_found(File::MODEL_NAME, "path", path.display())
            } else {
                BackendError::Io {
                    backend: "file",
                    source,
                }
                .into()
            }
        })?;
        debug!(path = %path.display(), bytes = content.len(), "loaded file content");
        file.set_content(content);
        Ok(())
    }

    fn save(&self, file: &File) -> RepositoryResult<()> {
        let Some(content) = file.content() else {
            return Err(BackendError::Serialization {
                backend: "file",
                message: format!("file {} has no content to save", file.path),
            }
            .into());
        };
        let path = self.resolve(file);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| BackendError::Io {
                backend: "file",
                source,
            })?;
        }
        std::fs::write(&path, content).map_err(|source| BackendError::Io {
            backend: "file",
            source,
        })?;
        debug!(path = %path.display(), bytes = content.len(), "saved file content");
        Ok(())
    }

    fn delete(&self, file: &File) -> RepositoryResult<()> {
        let path = self.resolve(file);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "deleted file content");
                Ok(())
            }
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "nothing to delete");
                Ok(())
            }
            Err(source) => Err(BackendError::Io {
                backend: "file",
                source,
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::model::Model;

    use super::*;

    #[test]
    fn test_save_load_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path().join("blobs")).unwrap();

        let mut file = File::new("notes/today.md");
        file.set_content(b"remember the milk".to_vec());
        store.save(&file).unwrap();

        let mut fresh = File::new("notes/today.md");
        store.load(&mut fresh).unwrap();
        assert_eq!(fresh.content(), Some(b"remember the milk".as_slice()));

        store.delete(&file).unwrap();
        assert!(store.load(&mut File::new("notes/today.md")).unwrap_err().is_not_found());
        // Deleting again only logs.
        store.delete(&file).unwrap();
    }

    #[test]
    fn test_saving_without_content_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path()).unwrap();
        let error = store.save(&File::new("empty.bin")).unwrap_err();
        assert!(matches!(
            error,
            RepositoryError::Backend(BackendError::Serialization { .. })
        ));
    }

    #[test]
    fn test_file_model_name_is_file() {
        assert_eq!(File::MODEL_NAME, "file");
    }
}
