//! Output filename construction
//!
//! Every derivative name is built from the source's base name and extension:
//!
//! - ratio profiles append a device-pixel-ratio suffix: `photo@0,75x.jpg`
//!   (the full-size variant keeps the plain name `photo.jpg`)
//! - breakpoint profiles append the label: `hero-xl.png`
//! - plain profiles reuse the source name, with the size encoded in the
//!   output directory instead

use std::path::Path;

use crate::error::{Result, DerivativeError};

/// Base name and extension of a file, extension without its dot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameParts {
    pub basename: String,
    pub extension: String,
}

/// Which builder a profile uses for its output names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingRule {
    Ratio,
    Labeled,
    Plain,
}

/// Split the final segment of `input` at its last dot.
///
/// A leading dot belongs to the base name, so `.hidden` has no extension.
pub fn split<P: AsRef<Path>>(input: P) -> Result<FilenameParts> {
    let input = input.as_ref();
    let name = input
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| DerivativeError::invalid_path(input))?;

    let (basename, extension) = match name.rfind('.') {
        Some(dot_pos) if dot_pos > 0 => (&name[..dot_pos], &name[dot_pos + 1..]),
        _ => (name, ""),
    };

    Ok(FilenameParts {
        basename: basename.to_string(),
        extension: extension.to_string(),
    })
}

/// `basename.extension`, or `basename@{ratio}x.extension` with the decimal
/// point written as a comma
pub fn build_ratio_name(basename: &str, extension: &str, ratio: f32) -> String {
    if (ratio - 1.0).abs() < f32::EPSILON {
        return build_plain_name(basename, extension);
    }
    let ratio = ratio.to_string().replace('.', ",");
    with_extension(format!("{}@{}x", basename, ratio), extension)
}

pub fn build_labeled_name(basename: &str, extension: &str, label: &str) -> String {
    with_extension(format!("{}-{}", basename, label), extension)
}

pub fn build_plain_name(basename: &str, extension: &str) -> String {
    with_extension(basename.to_string(), extension)
}

fn with_extension(mut name: String, extension: &str) -> String {
    if !extension.is_empty() {
        name.push('.');
        name.push_str(extension);
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_round_trip() {
        for name in ["photo.jpg", "banner.PNG", "hero.webp", "with space.tiff"] {
            let parts = split(name).unwrap();
            assert_eq!(format!("{}.{}", parts.basename, parts.extension), name);
        }
    }

    #[test]
    fn test_split_uses_last_dot_of_final_segment() {
        let parts = split("catalog/2024.summer/photo.final.jpg").unwrap();
        assert_eq!(parts.basename, "photo.final");
        assert_eq!(parts.extension, "jpg");
    }

    #[test]
    fn test_split_without_extension() {
        assert_eq!(split("README").unwrap().extension, "");
        let hidden = split(".hidden").unwrap();
        assert_eq!(hidden.basename, ".hidden");
        assert_eq!(hidden.extension, "");
    }

    #[test]
    fn test_split_rejects_unnamed_paths() {
        assert!(matches!(split(".."), Err(DerivativeError::InvalidPath { .. })));
        assert!(split("/").is_err());
    }

    #[test]
    fn test_ratio_names() {
        assert_eq!(build_ratio_name("b", "e", 1.0), "b.e");
        assert_eq!(build_ratio_name("photo", "jpg", 0.75), "photo@0,75x.jpg");
        assert_eq!(build_ratio_name("photo", "jpg", 0.5), "photo@0,5x.jpg");
        assert_eq!(build_ratio_name("photo", "jpg", 0.25), "photo@0,25x.jpg");
        assert_eq!(build_ratio_name("photo", "jpg", 2.0), "photo@2x.jpg");
    }

    #[test]
    fn test_labeled_and_plain_names() {
        assert_eq!(build_labeled_name("hero", "png", "xl"), "hero-xl.png");
        assert_eq!(build_plain_name("shoe", "jpg"), "shoe.jpg");
        assert_eq!(build_labeled_name("notes", "", "sm"), "notes-sm");
    }
}
