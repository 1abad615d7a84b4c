//! Local media storage root.
//!
//! Every stored file is named `<job_id>_<name>`, so all media belonging to a
//! job can be found (and evicted) by prefix.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Name used for downloaded media before the downloader picks an extension.
pub const DOWNLOAD_FILE_NAME: &str = "video.mp4";

/// Partial-download suffixes left behind by yt-dlp.
const PARTIAL_SUFFIXES: &[&str] = &[".part", ".ytdl", ".temp"];

const MAX_FILENAME_CHARS: usize = 120;

/// Directory holding uploaded and downloaded media.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory if missing.
    pub async fn ensure(&self) -> MediaResult<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Destination for an uploaded file.
    pub fn upload_path(&self, job_id: &str, filename: &str) -> PathBuf {
        self.root
            .join(format!("{}_{}", job_id, sanitize_filename(filename)))
    }

    /// Expected destination for a downloaded file.
    pub fn download_path(&self, job_id: &str) -> PathBuf {
        self.root.join(format!("{}_{}", job_id, DOWNLOAD_FILE_NAME))
    }

    /// Move a staged upload into the store.
    pub async fn store_upload(
        &self,
        job_id: &str,
        staged: &Path,
        filename: &str,
    ) -> MediaResult<PathBuf> {
        if !staged.exists() {
            return Err(MediaError::FileNotFound(staged.to_path_buf()));
        }
        let dst = self.upload_path(job_id, filename);
        move_file(staged, &dst).await?;
        Ok(dst)
    }

    /// First complete file (lexical order) whose name starts with `job_id`.
    pub async fn find_by_prefix(&self, job_id: &str) -> MediaResult<Option<PathBuf>> {
        Ok(self.files_with_prefix(job_id).await?.into_iter().next())
    }

    /// Delete every file belonging to `job_id`. Returns how many were removed.
    pub async fn remove_job_media(&self, job_id: &str) -> MediaResult<usize> {
        let mut removed = 0;
        for path in self.files_with_prefix_including_partial(job_id).await? {
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to remove media file");
                }
            }
        }
        Ok(removed)
    }

    async fn files_with_prefix(&self, job_id: &str) -> MediaResult<Vec<PathBuf>> {
        let files = self.files_with_prefix_including_partial(job_id).await?;
        Ok(files
            .into_iter()
            .filter(|p| {
                let name = p.file_name().and_then(|n| n.to_str()).unwrap_or_default();
                !PARTIAL_SUFFIXES.iter().any(|s| name.ends_with(s))
            })
            .collect())
    }

    async fn files_with_prefix_including_partial(&self, job_id: &str) -> MediaResult<Vec<PathBuf>> {
        if job_id.is_empty() {
            return Ok(Vec::new());
        }

        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut matches = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(job_id) && entry.file_type().await?.is_file() {
                matches.push(entry.path());
            }
        }
        matches.sort();
        Ok(matches)
    }
}

/// Reduce a client-supplied name to a safe single path component.
pub fn sanitize_filename(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILENAME_CHARS)
        .collect();

    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// Move a file, falling back to copy+delete across filesystems.
pub async fn move_file(src: &Path, dst: &Path) -> MediaResult<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            debug!(
                src = %src.display(),
                dst = %dst.display(),
                "Cross-device rename, copying instead"
            );
            copy_and_delete(src, dst).await
        }
        Err(e) => Err(e.into()),
    }
}

/// EXDEV is 18 on Linux and macOS.
fn is_cross_device_error(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(18)
}

async fn copy_and_delete(src: &Path, dst: &Path) -> MediaResult<()> {
    // Copy next to dst, then rename, so dst never holds a partial file
    let tmp_dst = dst.with_extension("tmp");

    fs::copy(src, &tmp_dst).await?;

    if let Err(e) = fs::rename(&tmp_dst, dst).await {
        let _ = fs::remove_file(&tmp_dst).await;
        return Err(e.into());
    }

    if let Err(e) = fs::remove_file(src).await {
        warn!(src = %src.display(), error = %e, "Failed to remove source after copy");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("clip.mp4"), "clip.mp4");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\videos\\my clip.mov"), "my_clip.mov");
        assert_eq!(sanitize_filename(".hidden"), "hidden");
        assert_eq!(sanitize_filename(""), "upload");
        assert_eq!(sanitize_filename("///"), "upload");
    }

    #[tokio::test]
    async fn test_store_upload_moves_file() {
        let dir = TempDir::new().unwrap();
        let store = MediaStore::new(dir.path().join("uploads"));
        let staged = dir.path().join("staged.bin");
        fs::write(&staged, b"video").await.unwrap();

        let stored = store.store_upload("job-1", &staged, "clip.mp4").await.unwrap();

        assert!(!staged.exists());
        assert_eq!(stored, dir.path().join("uploads").join("job-1_clip.mp4"));
        assert_eq!(fs::read(&stored).await.unwrap(), b"video");
    }

    #[tokio::test]
    async fn test_store_upload_missing_source() {
        let dir = TempDir::new().unwrap();
        let store = MediaStore::new(dir.path());
        let err = store
            .store_upload("job-1", &dir.path().join("nope"), "clip.mp4")
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_find_by_prefix_skips_partials_and_others() {
        let dir = TempDir::new().unwrap();
        let store = MediaStore::new(dir.path());
        for name in ["job-1_video.webm.part", "job-1_video.webm", "job-1_video.mkv", "job-2_video.mp4"] {
            fs::write(dir.path().join(name), b"x").await.unwrap();
        }

        let found = store.find_by_prefix("job-1").await.unwrap().unwrap();
        assert_eq!(found.file_name().unwrap(), "job-1_video.mkv");
        assert!(store.find_by_prefix("job-3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_prefix_missing_root() {
        let dir = TempDir::new().unwrap();
        let store = MediaStore::new(dir.path().join("absent"));
        assert!(store.find_by_prefix("job-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_job_media() {
        let dir = TempDir::new().unwrap();
        let store = MediaStore::new(dir.path());
        for name in ["job-1_video.mp4", "job-1_video.mp4.part", "job-2_clip.mp4"] {
            fs::write(dir.path().join(name), b"x").await.unwrap();
        }

        assert_eq!(store.remove_job_media("job-1").await.unwrap(), 2);
        assert!(dir.path().join("job-2_clip.mp4").exists());
        assert_eq!(store.remove_job_media("").await.unwrap(), 0);
    }

    #[test]
    fn test_is_cross_device_error() {
        assert!(is_cross_device_error(&std::io::Error::from_raw_os_error(18)));
        assert!(!is_cross_device_error(&std::io::Error::from_raw_os_error(2)));
    }
}
