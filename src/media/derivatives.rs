//! Derivative images written next to a downloaded original.

use std::path::{Path, PathBuf};

#[cfg(feature = "derivatives")]
use crate::error::AppError;
use crate::error::Result;
use crate::models::ImageTransform;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp", "tiff"];

/// Whether `path` names a file the derivative pipeline can decode.
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// `dir/a.png` + `-small` → `dir/a-small.png`.
pub fn derivative_path(source: &Path, suffix: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match source.extension() {
        Some(ext) => format!("{stem}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}{suffix}"),
    };
    source.with_file_name(name)
}

/// Write one sibling per transform. The source file itself is never touched.
#[cfg(feature = "derivatives")]
pub async fn generate(source: &Path, transforms: &[ImageTransform]) -> Result<Vec<PathBuf>> {
    if transforms.is_empty() || !is_image(source) {
        return Ok(Vec::new());
    }
    let source = source.to_path_buf();
    let transforms = transforms.to_vec();

    tokio::task::spawn_blocking(move || render(&source, &transforms))
        .await
        .map_err(|e| AppError::Io(std::io::Error::other(e)))?
}

#[cfg(feature = "derivatives")]
fn render(source: &Path, transforms: &[ImageTransform]) -> Result<Vec<PathBuf>> {
    use image::imageops::FilterType;

    let display = source.display().to_string();
    let original = image::open(source).map_err(|e| AppError::path(&display, e))?;

    let mut written = Vec::with_capacity(transforms.len());
    for transform in transforms {
        let output = match transform {
            ImageTransform::Scale { factor, .. } => {
                let width = ((original.width() as f32 * factor).round() as u32).max(1);
                let height = ((original.height() as f32 * factor).round() as u32).max(1);
                original.resize(width, height, FilterType::Lanczos3)
            }
            ImageTransform::Resize { width, height, .. } => {
                original.resize_exact(*width, *height, FilterType::Lanczos3)
            }
            ImageTransform::Blur { sigma, .. } => original.blur(*sigma),
        };
        let target = derivative_path(source, &transform.suffix());
        output
            .save(&target)
            .map_err(|e| AppError::path(target.display().to_string(), e))?;
        written.push(target);
    }
    Ok(written)
}

#[cfg(not(feature = "derivatives"))]
pub async fn generate(source: &Path, transforms: &[ImageTransform]) -> Result<Vec<PathBuf>> {
    if !transforms.is_empty() && is_image(source) {
        log::warn!(
            "[media] {}: image transforms configured but built without the `derivatives` feature",
            source.display()
        );
    }
    Ok(Vec::new())
}
