//! Source format detection and pass-through encoding

use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageFormat, ImageOutputFormat};

use crate::error::{Result, DerivativeError};

/// JPEG quality for re-encoded derivatives
pub const JPEG_QUALITY: u8 = 80;

/// Detect the source format from its magic bytes, falling back to the
/// file extension when the header is not recognized
pub fn detect_format(data: &[u8], path: &Path) -> Result<ImageFormat> {
    if let Ok(format) = image::guess_format(data) {
        return Ok(format);
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(format_from_extension)
        .ok_or_else(|| DerivativeError::render(path, "Unrecognized image format"))
}

/// Map a file extension to a format
pub fn format_from_extension(extension: &str) -> Option<ImageFormat> {
    match extension.to_lowercase().as_str() {
        "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
        "png" => Some(ImageFormat::Png),
        "webp" => Some(ImageFormat::WebP),
        "gif" => Some(ImageFormat::Gif),
        "tiff" | "tif" => Some(ImageFormat::Tiff),
        _ => None,
    }
}

/// Get supported input extensions
pub fn supported_input_formats() -> &'static [&'static str] {
    &["jpg", "jpeg", "png", "webp", "gif", "tiff", "tif"]
}

/// Check if a file extension is supported for input
pub fn is_supported_input_format(extension: &str) -> bool {
    supported_input_formats()
        .iter()
        .any(|&fmt| fmt.eq_ignore_ascii_case(extension))
}

/// Encode `image` in `format`, the format the source arrived in
pub fn encode(image: &DynamicImage, format: ImageFormat, path: &Path) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());

    let written = match format {
        ImageFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
            rgb.write_to(&mut buffer, ImageOutputFormat::Jpeg(JPEG_QUALITY))
        }
        other => image.write_to(&mut buffer, other),
    };

    written.map_err(|e| DerivativeError::render(
        path,
        format!("Failed to encode {:?}: {}", format, e),
    ))?;

    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    fn rgba_image() -> DynamicImage {
        DynamicImage::ImageRgba8(ImageBuffer::from_pixel(8, 4, Rgba([10, 20, 30, 128])))
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(format_from_extension("JPG"), Some(ImageFormat::Jpeg));
        assert_eq!(format_from_extension("tif"), Some(ImageFormat::Tiff));
        assert_eq!(format_from_extension("psd"), None);
    }

    #[test]
    fn test_detect_prefers_header_over_extension() {
        let png = encode(&rgba_image(), ImageFormat::Png, Path::new("x.png")).unwrap();
        let detected = detect_format(&png, Path::new("mislabelled.jpg")).unwrap();
        assert_eq!(detected, ImageFormat::Png);
    }

    #[test]
    fn test_detect_unknown_data() {
        assert!(detect_format(b"not an image", Path::new("notes.txt")).is_err());
    }

    #[test]
    fn test_jpeg_encoding_drops_alpha() {
        let jpeg = encode(&rgba_image(), ImageFormat::Jpeg, Path::new("x.jpg")).unwrap();
        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 4));
    }

    #[test]
    fn test_supported_formats() {
        assert!(is_supported_input_format("jpg"));
        assert!(is_supported_input_format("PNG"));
        assert!(!is_supported_input_format("xyz"));
    }
}
