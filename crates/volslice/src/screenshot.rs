//! Saving rendered frames.

use std::path::Path;

use image::{ImageBuffer, Rgba};

/// Error type for image output.
#[derive(Debug, thiserror::Error)]
pub enum ScreenshotError {
    #[error("Failed to save image: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Image encoding error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid image data")]
    InvalidImageData,
}

fn to_image(
    data: &[u8],
    width: u32,
    height: u32,
) -> Result<ImageBuffer<Rgba<u8>, Vec<u8>>, ScreenshotError> {
    // Backends read back top row first, which is what the encoders expect.
    ImageBuffer::from_raw(width, height, data.to_vec()).ok_or(ScreenshotError::InvalidImageData)
}

/// Saves RGBA pixel data to an image file.
///
/// # Arguments
/// * `filename` - Output filename (supports .png, .jpg, .jpeg)
/// * `data` - RGBA pixels, 4 bytes each, as returned by `read_pixels`
/// * `width` - Image width in pixels
/// * `height` - Image height in pixels
///
/// # Errors
/// Returns an error if the file cannot be written or format is unsupported.
pub fn save_image(
    filename: impl AsRef<Path>,
    data: &[u8],
    width: u32,
    height: u32,
) -> Result<(), ScreenshotError> {
    let path = filename.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let img = to_image(data, width, height)?;
    match extension.as_str() {
        "png" => {
            img.save_with_format(path, image::ImageFormat::Png)?;
        }
        "jpg" | "jpeg" => {
            // JPEG has no alpha channel
            let rgb_img = image::DynamicImage::ImageRgba8(img).to_rgb8();
            rgb_img.save_with_format(path, image::ImageFormat::Jpeg)?;
        }
        _ => {
            return Err(ScreenshotError::UnsupportedFormat(extension));
        }
    }
    log::info!("saved {width}x{height} image to {}", path.display());
    Ok(())
}

/// Encodes RGBA pixel data as PNG in memory.
pub fn save_to_buffer(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ScreenshotError> {
    let img = to_image(data, width, height)?;
    let mut buffer = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buffer, image::ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_to_buffer_is_png() {
        let data = vec![255u8; 2 * 3 * 4];
        let png = save_to_buffer(&data, 2, 3).unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }

    #[test]
    fn test_wrong_size_rejected() {
        let data = vec![0u8; 7];
        assert!(matches!(
            save_to_buffer(&data, 2, 2),
            Err(ScreenshotError::InvalidImageData)
        ));
    }

    #[test]
    fn test_unsupported_extension() {
        let data = vec![0u8; 4];
        let path = std::env::temp_dir().join("volslice_screenshot_test.bmpx");
        assert!(matches!(
            save_image(&path, &data, 1, 1),
            Err(ScreenshotError::UnsupportedFormat(_))
        ));
    }
}
