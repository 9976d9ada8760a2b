//! Image file storage.
//!
//! Images live on the local filesystem under a single root, one directory per
//! account: `<root>/<account_id>/<category>[/<sub_directory>]/<file>`. Every
//! caller-supplied path segment is validated before it touches the disk, and
//! all returned paths are relative to the root.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};

/// File extensions accepted for upload and download.
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "gif"];

/// Errors from the image store.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// The file extension is not an allowed image type.
    #[error("invalid file type: {0}")]
    InvalidExtension(String),

    /// The path is malformed or resolves outside the storage root.
    #[error("invalid path: {0}")]
    PathEscape(String),

    /// The file or directory does not exist.
    #[error("image not found: {0}")]
    NotFound(String),

    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// An image upload.
#[derive(Debug, Clone, Copy)]
pub struct Upload<'a> {
    /// Owning account directory.
    pub account_id: &'a str,
    /// Category directory, e.g. `profile` or `blog`.
    pub category: &'a str,
    /// Optional nested directory below the category.
    pub sub_directory: Option<&'a str>,
    /// Name of the file as sent by the client.
    pub original_name: &'a str,
    /// Explicit file name to store under.
    pub file_name: Option<&'a str>,
    /// File contents.
    pub bytes: &'a [u8],
}

/// A stored image, addressed relative to the storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    /// File name.
    pub filename: String,
    /// Path relative to the storage root, `/`-separated.
    pub path: String,
}

/// Filesystem image store rooted at one directory.
#[derive(Debug, Clone)]
pub struct ImageStorage {
    root: PathBuf,
}

impl ImageStorage {
    /// Create a store rooted at `root`. The directory is created on first
    /// write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Save an upload.
    ///
    /// The upload's `original_name` decides the extension. Without an
    /// explicit `file_name` a timestamp name (`YYYYMMDDHHMMSS.<ext>`) is
    /// generated from `now`.
    ///
    /// # Errors
    ///
    /// - `ImageError::InvalidExtension` if either name is not an allowed image.
    /// - `ImageError::PathEscape` if any segment is unsafe.
    /// - `ImageError::Io` if the write fails.
    pub async fn save(
        &self,
        upload: &Upload<'_>,
        now: DateTime<Utc>,
    ) -> Result<StoredImage, ImageError> {
        let extension = allowed_extension(upload.original_name)?;
        let filename = match upload.file_name {
            Some(name) => {
                check_segment(name)?;
                allowed_extension(name)?;
                name.to_string()
            }
            None => timestamped_name(now, &extension),
        };

        let mut relative = PathBuf::new();
        relative.push(checked_segment(upload.account_id)?);
        relative.push(checked_segment(upload.category)?);
        if let Some(sub) = upload.sub_directory.filter(|s| !s.is_empty()) {
            relative.push(checked_relative(sub)?);
        }

        let dir = self.root.join(&relative);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&filename), upload.bytes).await?;

        relative.push(&filename);
        Ok(StoredImage {
            filename,
            path: to_slash_path(&relative),
        })
    }

    /// Read an image by its path relative to the root.
    ///
    /// # Errors
    ///
    /// - `ImageError::PathEscape` if the path is unsafe.
    /// - `ImageError::InvalidExtension` if it is not an image.
    /// - `ImageError::NotFound` if no such file exists.
    pub async fn read(&self, relative: &str) -> Result<Vec<u8>, ImageError> {
        let path = self.resolve_image(relative)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ImageError::NotFound(relative.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete an image by its path relative to the root.
    ///
    /// # Errors
    ///
    /// Same as [`ImageStorage::read`].
    pub async fn delete(&self, relative: &str) -> Result<(), ImageError> {
        let path = self.resolve_image(relative)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ImageError::NotFound(relative.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// List every file under an account's directory, as root-relative paths,
    /// sorted.
    ///
    /// # Errors
    ///
    /// - `ImageError::NotFound` if the account has no directory.
    /// - `ImageError::Io` if a directory cannot be read.
    pub async fn list(&self, account_id: &str) -> Result<Vec<String>, ImageError> {
        let account_dir = checked_segment(account_id)?;
        let start = self.root.join(account_dir);
        if !tokio::fs::try_exists(&start).await? {
            return Err(ImageError::NotFound(account_id.to_string()));
        }

        let mut files = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if let Ok(relative) = path.strip_prefix(&self.root) {
                    files.push(to_slash_path(relative));
                }
            }
        }
        files.sort();
        Ok(files)
    }

    fn resolve_image(&self, relative: &str) -> Result<PathBuf, ImageError> {
        let relative = checked_relative(relative)?;
        let name = relative
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ImageError::PathEscape(relative.display().to_string()))?;
        allowed_extension(name)?;
        Ok(self.root.join(relative))
    }
}

/// MIME type for an allowed image path.
#[must_use]
pub fn content_type(path: &str) -> Option<&'static str> {
    match extension_of(path)?.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

fn allowed_extension(name: &str) -> Result<String, ImageError> {
    extension_of(name)
        .filter(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .ok_or_else(|| ImageError::InvalidExtension(name.to_string()))
}

fn timestamped_name(now: DateTime<Utc>, extension: &str) -> String {
    format!("{}.{extension}", now.format("%Y%m%d%H%M%S"))
}

/// A single path segment: non-empty, not hidden, no separators.
fn check_segment(segment: &str) -> Result<(), ImageError> {
    let ok = !segment.is_empty()
        && !segment.starts_with('.')
        && !segment.contains(['/', '\\', '\0']);
    if ok {
        Ok(())
    } else {
        Err(ImageError::PathEscape(segment.to_string()))
    }
}

fn checked_segment(segment: &str) -> Result<&str, ImageError> {
    check_segment(segment).map(|()| segment)
}

/// A `/`-separated relative path whose every segment passes `check_segment`.
fn checked_relative(path: &str) -> Result<PathBuf, ImageError> {
    let mut out = PathBuf::new();
    for segment in path.split('/') {
        check_segment(segment).map_err(|_| ImageError::PathEscape(path.to_string()))?;
        out.push(segment);
    }
    if out.components().all(|c| matches!(c, Component::Normal(_))) {
        Ok(out)
    } else {
        Err(ImageError::PathEscape(path.to_string()))
    }
}

fn to_slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::*;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 15).unwrap()
    }

    fn upload<'a>(category: &'a str, sub_directory: Option<&'a str>) -> Upload<'a> {
        Upload {
            account_id: "6XaDKrQE",
            category,
            sub_directory,
            original_name: "me.PNG",
            file_name: None,
            bytes: b"png-bytes",
        }
    }

    #[test]
    fn extensions_are_case_insensitive() {
        assert_eq!(allowed_extension("photo.JPG").unwrap(), "jpg");
        assert!(matches!(
            allowed_extension("script.php"),
            Err(ImageError::InvalidExtension(_))
        ));
        assert!(allowed_extension("noext").is_err());
    }

    #[test]
    fn generated_names_are_timestamps() {
        assert_eq!(timestamped_name(at(), "png"), "20240501093015.png");
    }

    #[test]
    fn unsafe_paths_are_rejected() {
        for bad in ["../etc/passwd", "a/../../b.png", "/abs.png", "a//b.png", ".hidden/x.png", ""] {
            assert!(
                matches!(checked_relative(bad), Err(ImageError::PathEscape(_))),
                "accepted {bad:?}"
            );
        }
        assert!(checked_relative("6XaDKrQE/profile/icon/a.png").is_ok());
    }

    #[test]
    fn mime_types() {
        assert_eq!(content_type("a/b.JPEG"), Some("image/jpeg"));
        assert_eq!(content_type("a/b.gif"), Some("image/gif"));
        assert_eq!(content_type("a/b.txt"), None);
    }

    #[tokio::test]
    async fn save_read_list_delete() {
        let dir = TempDir::new().unwrap();
        let storage = ImageStorage::new(dir.path());

        let stored = storage
            .save(&upload("profile", Some("icon")), at())
            .await
            .unwrap();
        assert_eq!(stored.filename, "20240501093015.png");
        assert_eq!(stored.path, "6XaDKrQE/profile/icon/20240501093015.png");

        assert_eq!(storage.read(&stored.path).await.unwrap(), b"png-bytes");
        assert_eq!(storage.list("6XaDKrQE").await.unwrap(), vec![stored.path.clone()]);

        storage.delete(&stored.path).await.unwrap();
        assert!(matches!(
            storage.read(&stored.path).await,
            Err(ImageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn save_rejects_escaping_segments() {
        let dir = TempDir::new().unwrap();
        let storage = ImageStorage::new(dir.path());

        let result = storage.save(&upload("..", None), at()).await;
        assert!(matches!(result, Err(ImageError::PathEscape(_))));

        let result = storage.save(&upload("blog", Some("../../x")), at()).await;
        assert!(matches!(result, Err(ImageError::PathEscape(_))));

        let renamed = Upload {
            file_name: Some("evil.html"),
            ..upload("blog", None)
        };
        let result = storage.save(&renamed, at()).await;
        assert!(matches!(result, Err(ImageError::InvalidExtension(_))));
    }

    #[tokio::test]
    async fn listing_unknown_account_is_not_found() {
        let dir = TempDir::new().unwrap();
        let storage = ImageStorage::new(dir.path());
        assert!(matches!(
            storage.list("ZZZZZZZZ").await,
            Err(ImageError::NotFound(_))
        ));
    }
}
