//! Image resizing: width-driven resize and cover-crop with a position hint

use std::fmt;
use std::str::FromStr;

use image::imageops::FilterType;
use image::DynamicImage;
use tracing::debug;

use crate::error::{Result, DerivativeError};

/// Anchor used when both width and height are given and the image is cropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Position {
    #[default]
    Centre,
    Top,
    RightTop,
    Right,
    RightBottom,
    Bottom,
    LeftBottom,
    Left,
    LeftTop,
}

impl Position {
    /// Focus point as fractions of the scaled image, (x, y) in 0.0..=1.0
    pub fn focus_point(self) -> (f32, f32) {
        match self {
            Self::Centre => (0.5, 0.5),
            Self::Top => (0.5, 0.0),
            Self::RightTop => (1.0, 0.0),
            Self::Right => (1.0, 0.5),
            Self::RightBottom => (1.0, 1.0),
            Self::Bottom => (0.5, 1.0),
            Self::LeftBottom => (0.0, 1.0),
            Self::Left => (0.0, 0.5),
            Self::LeftTop => (0.0, 0.0),
        }
    }
}

impl FromStr for Position {
    type Err = DerivativeError;

    /// Accepts edge names (`top`, `right bottom`, ...) and compass
    /// gravities (`north`, `southeast`, ...)
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', '_'], " ");
        let position = match normalized.as_str() {
            "centre" | "center" | "centre centre" | "center center" => Self::Centre,
            "top" | "north" => Self::Top,
            "right top" | "top right" | "northeast" => Self::RightTop,
            "right" | "east" => Self::Right,
            "right bottom" | "bottom right" | "southeast" => Self::RightBottom,
            "bottom" | "south" => Self::Bottom,
            "left bottom" | "bottom left" | "southwest" => Self::LeftBottom,
            "left" | "west" => Self::Left,
            "left top" | "top left" | "northwest" => Self::LeftTop,
            // Content-aware strategies; the crop falls back to the centre
            "entropy" | "attention" => {
                debug!("Crop strategy {:?} treated as centre", normalized);
                Self::Centre
            }
            _ => {
                return Err(DerivativeError::invalid_parameters(format!(
                    "Unknown position {:?}; expected centre, top, right, bottom, left, \
                     a combination like \"right top\", or a compass gravity like northeast",
                    s
                )))
            }
        };
        Ok(position)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Centre => "centre",
            Self::Top => "top",
            Self::RightTop => "right top",
            Self::Right => "right",
            Self::RightBottom => "right bottom",
            Self::Bottom => "bottom",
            Self::LeftBottom => "left bottom",
            Self::Left => "left",
            Self::LeftTop => "left top",
        };
        f.write_str(name)
    }
}

/// Lanczos3 resizer used by the default backend
pub struct ImageResizer {
    filter: FilterType,
}

impl ImageResizer {
    pub fn new() -> Self {
        Self {
            filter: FilterType::Lanczos3,
        }
    }

    pub fn with_filter(filter: FilterType) -> Self {
        Self { filter }
    }

    /// Resize to `width`, keeping the aspect ratio unless `height` is given,
    /// in which case the image covers `width`x`height` and is cropped
    /// around `position`.
    pub fn resize(
        &self,
        image: &DynamicImage,
        width: u32,
        height: Option<u32>,
        position: Position,
    ) -> Result<DynamicImage> {
        if width == 0 || height == Some(0) {
            return Err(DerivativeError::invalid_parameters(
                "Width and height must be greater than 0",
            ));
        }

        match height {
            None => {
                let target_height = scaled_height(image.width(), image.height(), width);
                debug!(
                    "Resizing {}x{} -> {}x{}",
                    image.width(),
                    image.height(),
                    width,
                    target_height
                );
                if width == image.width() && target_height == image.height() {
                    return Ok(image.clone());
                }
                Ok(image.resize_exact(width, target_height, self.filter))
            }
            Some(height) => {
                debug!(
                    "Cover resizing {}x{} -> {}x{} at {}",
                    image.width(),
                    image.height(),
                    width,
                    height,
                    position
                );
                Ok(self.resize_and_crop(image, width, height, position.focus_point()))
            }
        }
    }

    /// Scale so the image covers the target box, then crop to it
    fn resize_and_crop(
        &self,
        image: &DynamicImage,
        target_width: u32,
        target_height: u32,
        (focus_x, focus_y): (f32, f32),
    ) -> DynamicImage {
        let original_aspect = image.width() as f32 / image.height() as f32;
        let target_aspect = target_width as f32 / target_height as f32;

        let (intermediate_width, intermediate_height) = if original_aspect > target_aspect {
            let scale_factor = target_height as f32 / image.height() as f32;
            let new_width = (image.width() as f32 * scale_factor).round() as u32;
            (new_width.max(target_width), target_height)
        } else {
            let scale_factor = target_width as f32 / image.width() as f32;
            let new_height = (image.height() as f32 * scale_factor).round() as u32;
            (target_width, new_height.max(target_height))
        };

        let resized = image.resize_exact(intermediate_width, intermediate_height, self.filter);

        // Negative ideal offsets saturate to 0 in the cast
        let crop_x = {
            let max_crop_x = intermediate_width - target_width;
            let ideal = (focus_x * intermediate_width as f32 - target_width as f32 / 2.0).round() as u32;
            ideal.min(max_crop_x)
        };
        let crop_y = {
            let max_crop_y = intermediate_height - target_height;
            let ideal = (focus_y * intermediate_height as f32 - target_height as f32 / 2.0).round() as u32;
            ideal.min(max_crop_y)
        };

        resized.crop_imm(crop_x, crop_y, target_width, target_height)
    }
}

impl Default for ImageResizer {
    fn default() -> Self {
        Self::new()
    }
}

fn scaled_height(original_width: u32, original_height: u32, width: u32) -> u32 {
    let aspect_ratio = original_height as f32 / original_width as f32;
    ((width as f32 * aspect_ratio).round() as u32).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn create_test_image(width: u32, height: u32) -> DynamicImage {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            let intensity = ((x + y) % 255) as u8;
            Rgb([intensity, intensity, intensity])
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_width_resize_keeps_aspect_ratio() {
        let resizer = ImageResizer::new();
        let image = create_test_image(1000, 800);

        let resized = resizer.resize(&image, 500, None, Position::Centre).unwrap();
        assert_eq!((resized.width(), resized.height()), (500, 400));
    }

    #[test]
    fn test_width_resize_upscales() {
        let resized = ImageResizer::new()
            .resize(&create_test_image(100, 50), 400, None, Position::Centre)
            .unwrap();
        assert_eq!((resized.width(), resized.height()), (400, 200));
    }

    #[test]
    fn test_cover_resize_hits_exact_box() {
        let resizer = ImageResizer::with_filter(FilterType::Triangle);
        let image = create_test_image(1000, 800);

        for position in [Position::Centre, Position::LeftTop, Position::RightBottom, Position::Bottom] {
            let cropped = resizer.resize(&image, 300, Some(300), position).unwrap();
            assert_eq!((cropped.width(), cropped.height()), (300, 300));
        }

        let tall = resizer.resize(&image, 100, Some(400), Position::Left).unwrap();
        assert_eq!((tall.width(), tall.height()), (100, 400));
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        let resizer = ImageResizer::new();
        let image = create_test_image(10, 10);
        assert!(resizer.resize(&image, 0, None, Position::Centre).is_err());
        assert!(resizer.resize(&image, 10, Some(0), Position::Centre).is_err());
    }

    #[test]
    fn test_position_parsing() {
        assert_eq!("centre".parse::<Position>().unwrap(), Position::Centre);
        assert_eq!("Center".parse::<Position>().unwrap(), Position::Centre);
        assert_eq!("right top".parse::<Position>().unwrap(), Position::RightTop);
        assert_eq!("top-right".parse::<Position>().unwrap(), Position::RightTop);
        assert_eq!("southwest".parse::<Position>().unwrap(), Position::LeftBottom);
        assert_eq!("north".parse::<Position>().unwrap(), Position::Top);
        assert!("sideways".parse::<Position>().is_err());
    }

    #[test]
    fn test_crop_strategies_fall_back_to_centre() {
        assert_eq!("entropy".parse::<Position>().unwrap(), Position::Centre);
        assert_eq!("Attention".parse::<Position>().unwrap(), Position::Centre);
    }

    #[test]
    fn test_position_display_parses_back() {
        for position in [Position::Centre, Position::RightBottom, Position::LeftTop] {
            assert_eq!(position.to_string().parse::<Position>().unwrap(), position);
        }
    }
}
