use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::error::StorageError;
use crate::core::security;

use super::{is_upload_temp_name, VideoInfo, UPLOAD_TEMP_PREFIX, UPLOAD_TEMP_SUFFIX};

// ---------------------------------------------------------------------------
// Local storage directory
// ---------------------------------------------------------------------------

/// Video storage backed by a single local directory.
///
/// Every file handle handed out is owned by the caller's request and is
/// released when it is dropped. The store itself holds no mutable state, so
/// one instance is shared by all request tasks behind an `Arc`.
#[derive(Debug, Clone)]
pub struct LocalVideoStore {
    root: PathBuf,
    allow_overwrite: bool,
}

impl LocalVideoStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            allow_overwrite: true,
        }
    }

    /// Set whether uploads may replace an existing file of the same name.
    pub fn with_overwrite(mut self, allow: bool) -> Self {
        self.allow_overwrite = allow;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the storage directory if it does not exist yet.
    pub async fn ensure_root(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Resolve an untrusted filename to a canonical path inside the directory.
    ///
    /// The name is validated first, then the joined path is canonicalized and
    /// must still lie under the canonical root. A symlink pointing elsewhere
    /// resolves outside the root and is reported as not found.
    pub async fn resolve(&self, filename: &str) -> Result<PathBuf, StorageError> {
        security::validate_filename(filename)
            .map_err(|reason| StorageError::InvalidFilename { reason })?;

        let root = tokio::fs::canonicalize(&self.root).await?;
        let resolved = match tokio::fs::canonicalize(root.join(filename)).await {
            Ok(path) => path,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound {
                    filename: filename.to_string(),
                });
            }
            Err(e) => return Err(StorageError::Io(e)),
        };

        if !resolved.starts_with(&root) {
            warn!(
                filename,
                resolved = %resolved.display(),
                "resolved path escapes storage directory"
            );
            return Err(StorageError::NotFound {
                filename: filename.to_string(),
            });
        }

        Ok(resolved)
    }

    /// Open a stored video for reading.
    pub async fn open(&self, filename: &str) -> Result<File, StorageError> {
        let path = self.resolve(filename).await?;
        match File::open(&path).await {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                filename: filename.to_string(),
            }),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// List the regular files in the directory, in directory-iteration order.
    ///
    /// Directories and other non-regular entries are skipped. Entries whose
    /// metadata can't be read (e.g. removed mid-listing) are silently omitted.
    /// Symlinks are listed only when `open` would serve them: the target must
    /// be a regular file inside the directory.
    pub async fn list(&self) -> Result<Vec<VideoInfo>, StorageError> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut videos = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    debug!(name = ?raw, "skipping entry with non UTF-8 name");
                    continue;
                }
            };
            if is_upload_temp_name(&name) {
                continue;
            }

            let is_symlink = match entry.file_type().await {
                Ok(ft) => ft.is_symlink(),
                Err(e) => {
                    debug!(filename = %name, error = %e, "skipping entry with unreadable type");
                    continue;
                }
            };
            let metadata = if is_symlink {
                match self.resolve(&name).await {
                    Ok(target) => tokio::fs::metadata(target).await,
                    Err(e) => {
                        debug!(filename = %name, error = %e, "skipping unservable symlink");
                        continue;
                    }
                }
            } else {
                entry.metadata().await
            };
            let metadata = match metadata {
                Ok(m) => m,
                Err(e) => {
                    debug!(filename = %name, error = %e, "skipping entry with unreadable metadata");
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }

            videos.push(VideoInfo {
                filename: name,
                size: metadata.len(),
            });
        }

        Ok(videos)
    }

    /// Start writing a new video under `filename`.
    ///
    /// Data goes to a hidden temp file in the same directory and only
    /// replaces the final name on [`PendingUpload::commit`].
    pub async fn begin_upload(&self, filename: &str) -> Result<PendingUpload, StorageError> {
        security::validate_filename(filename)
            .map_err(|reason| StorageError::InvalidFilename { reason })?;

        let final_path = self.root.join(filename);
        if !self.allow_overwrite && tokio::fs::try_exists(&final_path).await? {
            return Err(StorageError::AlreadyExists {
                filename: filename.to_string(),
            });
        }

        let temp_path = self.root.join(format!(
            "{}{}{}",
            UPLOAD_TEMP_PREFIX,
            Uuid::new_v4(),
            UPLOAD_TEMP_SUFFIX
        ));
        let file = File::create(&temp_path).await?;
        debug!(filename, temp = %temp_path.display(), "upload temp file created");

        Ok(PendingUpload {
            filename: filename.to_string(),
            file: Some(file),
            temp_path,
            final_path,
            allow_overwrite: self.allow_overwrite,
            bytes_written: 0,
            finished: false,
        })
    }
}

// ---------------------------------------------------------------------------
// In-flight upload
// ---------------------------------------------------------------------------

/// An upload being written to its temp file.
///
/// Dropping it without calling `commit` removes the temp file, which covers
/// early returns as well as a client disconnect cancelling the request.
#[derive(Debug)]
pub struct PendingUpload {
    filename: String,
    file: Option<File>,
    temp_path: PathBuf,
    final_path: PathBuf,
    allow_overwrite: bool,
    bytes_written: u64,
    finished: bool,
}

impl PendingUpload {
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Append a chunk of the uploaded body.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), StorageError> {
        let file = self.file.as_mut().ok_or_else(|| {
            StorageError::Io(std::io::Error::other("upload file already closed"))
        })?;
        file.write_all(chunk).await?;
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    /// Flush the temp file and move it onto the final name.
    ///
    /// With overwrite disabled the move is a hard link, which fails atomically
    /// if another upload claimed the name in the meantime.
    pub async fn commit(mut self) -> Result<u64, StorageError> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }

        if self.allow_overwrite {
            tokio::fs::rename(&self.temp_path, &self.final_path).await?;
        } else {
            match tokio::fs::hard_link(&self.temp_path, &self.final_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    return Err(StorageError::AlreadyExists {
                        filename: self.filename.clone(),
                    });
                }
                Err(e) => return Err(StorageError::Io(e)),
            }
            if let Err(e) = tokio::fs::remove_file(&self.temp_path).await {
                warn!(temp = %self.temp_path.display(), error = %e, "failed to remove upload temp link");
            }
        }

        self.finished = true;
        info!(
            filename = %self.filename,
            size = self.bytes_written,
            "upload stored"
        );
        Ok(self.bytes_written)
    }

    /// Discard the upload and remove its temp file.
    pub async fn abort(mut self) {
        self.file.take();
        if let Err(e) = tokio::fs::remove_file(&self.temp_path).await {
            warn!(temp = %self.temp_path.display(), error = %e, "failed to clean up upload temp file");
        }
        self.finished = true;
    }
}

impl Drop for PendingUpload {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.file.take();
        // Drop can't await; a single unlink is cheap enough to run inline.
        if let Err(e) = std::fs::remove_file(&self.temp_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(temp = %self.temp_path.display(), error = %e, "failed to clean up abandoned upload");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_store() -> (tempfile::TempDir, LocalVideoStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalVideoStore::new(dir.path());
        (dir, store)
    }

    fn dir_entry_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_list_empty_directory() {
        let (_dir, store) = make_store();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_skips_directories_and_temp_files() {
        let (dir, store) = make_store();
        std::fs::write(dir.path().join("a.mp4"), vec![0u8; 10]).unwrap();
        std::fs::write(dir.path().join("b.mp4"), vec![0u8; 3]).unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join(".upload-abc.partial"), b"half").unwrap();

        let mut videos = store.list().await.unwrap();
        videos.sort_by(|a, b| a.filename.cmp(&b.filename));
        assert_eq!(
            videos,
            vec![
                VideoInfo {
                    filename: "a.mp4".to_string(),
                    size: 10
                },
                VideoInfo {
                    filename: "b.mp4".to_string(),
                    size: 3
                },
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_list_matches_what_open_serves_for_symlinks() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.mp4"), b"secret").unwrap();

        let (dir, store) = make_store();
        std::fs::write(dir.path().join("real.mp4"), vec![0u8; 7]).unwrap();
        std::os::unix::fs::symlink(dir.path().join("real.mp4"), dir.path().join("alias.mp4"))
            .unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret.mp4"),
            dir.path().join("escape.mp4"),
        )
        .unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone.mp4"), dir.path().join("dangling.mp4"))
            .unwrap();

        let mut videos = store.list().await.unwrap();
        videos.sort_by(|a, b| a.filename.cmp(&b.filename));
        let names: Vec<&str> = videos.iter().map(|v| v.filename.as_str()).collect();
        assert_eq!(names, vec!["alias.mp4", "real.mp4"]);
        assert_eq!(videos[0].size, 7);

        for video in &videos {
            assert!(store.open(&video.filename).await.is_ok());
        }
        assert!(store.open("escape.mp4").await.is_err());
        assert!(store.open("dangling.mp4").await.is_err());
    }

    #[tokio::test]
    async fn test_list_missing_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalVideoStore::new(dir.path().join("does-not-exist"));
        assert!(matches!(store.list().await, Err(StorageError::Io(_))));
    }

    #[tokio::test]
    async fn test_resolve_rejects_traversal() {
        let (_dir, store) = make_store();
        let result = store.resolve("../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidFilename { .. })));
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let (_dir, store) = make_store();
        let result = store.open("missing.mp4").await;
        assert!(matches!(result, Err(StorageError::NotFound { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolve_rejects_symlink_escape() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), b"secret").unwrap();

        let (dir, store) = make_store();
        std::os::unix::fs::symlink(
            outside.path().join("secret.txt"),
            dir.path().join("link.mp4"),
        )
        .unwrap();

        let result = store.open("link.mp4").await;
        assert!(matches!(result, Err(StorageError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_upload_commit_writes_final_file() {
        let (dir, store) = make_store();
        let mut upload = store.begin_upload("clip.mp4").await.unwrap();
        upload.write_chunk(b"hello ").await.unwrap();
        upload.write_chunk(b"world").await.unwrap();
        assert_eq!(upload.bytes_written(), 11);

        let size = upload.commit().await.unwrap();
        assert_eq!(size, 11);
        assert_eq!(
            std::fs::read(dir.path().join("clip.mp4")).unwrap(),
            b"hello world"
        );
        assert_eq!(dir_entry_names(dir.path()), vec!["clip.mp4".to_string()]);
    }

    #[tokio::test]
    async fn test_upload_abort_leaves_nothing_behind() {
        let (dir, store) = make_store();
        let mut upload = store.begin_upload("clip.mp4").await.unwrap();
        upload.write_chunk(b"partial").await.unwrap();
        upload.abort().await;

        assert!(dir_entry_names(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_upload_drop_removes_temp_file() {
        let (dir, store) = make_store();
        {
            let mut upload = store.begin_upload("clip.mp4").await.unwrap();
            upload.write_chunk(b"partial").await.unwrap();
        }
        assert!(dir_entry_names(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_previous_version() {
        let (dir, store) = make_store();
        std::fs::write(dir.path().join("clip.mp4"), b"original").unwrap();

        let mut upload = store.begin_upload("clip.mp4").await.unwrap();
        upload.write_chunk(b"replacement that never completes").await.unwrap();
        upload.abort().await;

        assert_eq!(
            std::fs::read(dir.path().join("clip.mp4")).unwrap(),
            b"original"
        );
    }

    #[tokio::test]
    async fn test_overwrite_allowed_by_default() {
        let (dir, store) = make_store();
        std::fs::write(dir.path().join("clip.mp4"), b"old").unwrap();

        let mut upload = store.begin_upload("clip.mp4").await.unwrap();
        upload.write_chunk(b"newer").await.unwrap();
        upload.commit().await.unwrap();

        assert_eq!(std::fs::read(dir.path().join("clip.mp4")).unwrap(), b"newer");
    }

    #[tokio::test]
    async fn test_no_clobber_rejects_existing_name() {
        let (dir, store) = make_store();
        let store = store.with_overwrite(false);
        std::fs::write(dir.path().join("clip.mp4"), b"old").unwrap();

        let result = store.begin_upload("clip.mp4").await;
        assert!(matches!(result, Err(StorageError::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn test_no_clobber_detects_race_at_commit() {
        let (dir, store) = make_store();
        let store = store.with_overwrite(false);

        let mut upload = store.begin_upload("clip.mp4").await.unwrap();
        upload.write_chunk(b"mine").await.unwrap();
        std::fs::write(dir.path().join("clip.mp4"), b"theirs").unwrap();

        let result = upload.commit().await;
        assert!(matches!(result, Err(StorageError::AlreadyExists { .. })));
        assert_eq!(std::fs::read(dir.path().join("clip.mp4")).unwrap(), b"theirs");
        assert_eq!(dir_entry_names(dir.path()), vec!["clip.mp4".to_string()]);
    }

    #[tokio::test]
    async fn test_begin_upload_rejects_bad_name() {
        let (_dir, store) = make_store();
        let result = store.begin_upload("../escape.mp4").await;
        assert!(matches!(result, Err(StorageError::InvalidFilename { .. })));
    }
}
