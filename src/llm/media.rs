use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose, Engine as _};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use tracing::{debug, warn};

use crate::error::{StylistError, StylistResult};

pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];
const FALLBACK_MIME: &str = "image/jpeg";

#[derive(Debug, Clone)]
pub struct ImageInput {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: Option<String>,
}

impl ImageInput {
    pub fn new(bytes: Vec<u8>, file_name: Option<String>) -> Self {
        let mime_type = detect_mime_type(&bytes).unwrap_or_else(|| FALLBACK_MIME.to_string());
        Self {
            bytes,
            mime_type,
            file_name,
        }
    }
}

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

pub fn is_supported_image(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Lists the supported image files directly inside `dir`, sorted by name.
pub async fn collect_image_files(dir: &Path) -> StylistResult<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|err| {
        StylistError::InvalidInput(format!(
            "Cannot read image directory {}: {err}",
            dir.display()
        ))
    })?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if is_supported_image(&name.to_string_lossy()) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub async fn load_image_file(path: &Path) -> StylistResult<ImageInput> {
    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());
    Ok(ImageInput::new(bytes, file_name))
}

/// Re-encodes the image as JPEG when its longer side exceeds `max_dimension`.
/// Data that cannot be decoded is returned unchanged.
pub fn downscale_if_needed(input: ImageInput, max_dimension: u32) -> ImageInput {
    if max_dimension == 0 {
        return input;
    }

    let decoded = match image::load_from_memory(&input.bytes) {
        Ok(decoded) => decoded,
        Err(err) => {
            warn!(
                "Could not decode {} for resizing: {}",
                input.file_name.as_deref().unwrap_or("image"),
                err
            );
            return input;
        }
    };

    let (width, height) = decoded.dimensions();
    if width.max(height) <= max_dimension {
        return input;
    }

    let resized = decoded.resize(max_dimension, max_dimension, FilterType::Triangle);
    let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());
    let mut buffer = Cursor::new(Vec::new());
    if let Err(err) = rgb.write_to(&mut buffer, ImageFormat::Jpeg) {
        warn!("Failed to re-encode resized image: {}", err);
        return input;
    }

    debug!(
        "Downscaled {} from {}x{} to {}x{}",
        input.file_name.as_deref().unwrap_or("image"),
        width,
        height,
        rgb.width(),
        rgb.height()
    );
    ImageInput {
        bytes: buffer.into_inner(),
        mime_type: "image/jpeg".to_string(),
        file_name: input.file_name,
    }
}

/// Runs [`downscale_if_needed`] over a batch on the blocking pool, keeping
/// order. Decoding large photos is CPU-bound.
pub async fn downscale_all(
    images: Vec<ImageInput>,
    max_dimension: u32,
) -> StylistResult<Vec<ImageInput>> {
    if max_dimension == 0 || images.is_empty() {
        return Ok(images);
    }
    let resized = tokio::task::spawn_blocking(move || {
        images
            .into_iter()
            .map(|image| downscale_if_needed(image, max_dimension))
            .collect::<Vec<_>>()
    })
    .await
    .map_err(std::io::Error::from)?;
    Ok(resized)
}

pub fn to_data_url(input: &ImageInput) -> String {
    let encoded = general_purpose::STANDARD.encode(&input.bytes);
    format!("data:{};base64,{}", input.mime_type, encoded)
}
