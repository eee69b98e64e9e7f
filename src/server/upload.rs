use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::{StylistError, StylistResult};
use crate::llm::media::detect_mime_type;

static UPLOAD_COUNTER: AtomicU64 = AtomicU64::new(0);

const FALLBACK_NAME: &str = "upload";

/// Limits applied to each uploaded image.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_images: usize,
    pub max_image_bytes: usize,
}

/// Checks one uploaded image. `index` is zero-based.
pub fn validate_upload(
    limits: UploadLimits,
    index: usize,
    file_name: &str,
    bytes: &[u8],
) -> StylistResult<()> {
    if index >= limits.max_images {
        return Err(StylistError::InvalidInput(format!(
            "Too many images: at most {} may be uploaded",
            limits.max_images
        )));
    }
    if bytes.is_empty() {
        return Err(StylistError::InvalidInput(format!(
            "Image '{file_name}' is empty"
        )));
    }
    if bytes.len() > limits.max_image_bytes {
        return Err(StylistError::InvalidInput(format!(
            "Image '{file_name}' is {} bytes; the limit is {}",
            bytes.len(),
            limits.max_image_bytes
        )));
    }

    // The content decides; the extension is never enough on its own.
    match detect_mime_type(bytes).as_deref() {
        Some("image/jpeg") | Some("image/png") => Ok(()),
        Some(other) => Err(StylistError::InvalidInput(format!(
            "Image '{file_name}' is {other}, not a JPEG or PNG"
        ))),
        None => Err(StylistError::InvalidInput(format!(
            "Image '{file_name}' is not a recognisable JPEG or PNG"
        ))),
    }
}

/// Reduces a client-supplied file name to a safe basename.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        cleaned.chars().take(100).collect()
    }
}

fn unique_file_name(name: &str) -> String {
    let counter = UPLOAD_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!(
        "{}-{}-{}",
        Utc::now().timestamp_millis(),
        counter,
        sanitize_file_name(name)
    )
}

/// Uploaded files written to the staging directory. Every staged file is
/// removed when this value is dropped.
#[derive(Debug)]
pub struct StagedUploads {
    dir: PathBuf,
    paths: Vec<PathBuf>,
}

impl StagedUploads {
    pub async fn new(dir: &Path) -> StylistResult<Self> {
        tokio::fs::create_dir_all(dir).await?;
        Ok(Self {
            dir: dir.to_path_buf(),
            paths: Vec::new(),
        })
    }

    pub async fn stage(&mut self, file_name: &str, bytes: &[u8]) -> StylistResult<PathBuf> {
        let path = self.dir.join(unique_file_name(file_name));
        // Track before writing so a partial write is still cleaned up.
        self.paths.push(path.clone());
        tokio::fs::write(&path, bytes).await?;
        debug!("Staged upload {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl Drop for StagedUploads {
    fn drop(&mut self) {
        for path in &self.paths {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => warn!("Failed to remove staged upload {}: {err}", path.display()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_support::png_bytes;

    const LIMITS: UploadLimits = UploadLimits {
        max_images: 2,
        max_image_bytes: 1024,
    };

    #[test]
    fn sanitizes_paths_and_odd_characters() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\my photo.png"), "my_photo.png");
        assert_eq!(sanitize_file_name(".hidden.jpg"), "hidden.jpg");
        assert_eq!(sanitize_file_name(""), "upload");
        assert_eq!(sanitize_file_name("..."), "upload");
    }

    #[test]
    fn unique_names_do_not_collide() {
        assert_ne!(unique_file_name("a.png"), unique_file_name("a.png"));
        assert!(unique_file_name("a b.png").ends_with("-a_b.png"));
    }

    #[test]
    fn validates_count_size_emptiness_and_type() {
        let png = png_bytes();
        assert!(validate_upload(LIMITS, 0, "look.png", &png).is_ok());
        // Content sniffing wins over a missing extension.
        assert!(validate_upload(LIMITS, 1, "blob", &png).is_ok());

        let too_many = validate_upload(LIMITS, 2, "c.png", &png).unwrap_err();
        assert!(too_many.to_string().contains("at most 2"));

        let empty = validate_upload(LIMITS, 0, "e.png", &[]).unwrap_err();
        assert!(empty.to_string().contains("is empty"));

        let big = validate_upload(LIMITS, 0, "big.png", &vec![0u8; 2048]).unwrap_err();
        assert!(big.to_string().contains("limit is 1024"));

        let gif = b"GIF89a\x01\x00\x01\x00\x00\x00\x00;";
        let wrong = validate_upload(LIMITS, 0, "anim.gif", gif).unwrap_err();
        assert!(matches!(wrong, StylistError::InvalidInput(_)));
    }

    #[test]
    fn extension_alone_does_not_make_an_image() {
        let gif = b"GIF89a\x01\x00\x01\x00\x00\x00\x00;";
        let renamed = validate_upload(LIMITS, 0, "anim.png", gif).unwrap_err();
        assert!(renamed.to_string().contains("image/gif"));

        let text = validate_upload(LIMITS, 0, "notes.jpg", b"hello, not an image at all").unwrap_err();
        assert!(matches!(text, StylistError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn staged_files_are_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("img");
        let path = {
            let mut staged = StagedUploads::new(&staging).await.unwrap();
            let path = staged.stage("../x.png", b"data").await.unwrap();
            assert!(path.exists());
            assert_eq!(path.parent(), Some(staging.as_path()));
            assert_eq!(staged.paths().len(), 1);
            path
        };
        assert!(!path.exists());
    }
}
