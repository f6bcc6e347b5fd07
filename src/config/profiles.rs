//! Sizing policy tables and the closed set of derivative profiles

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::PathConfig;
use crate::error::{Result, DerivativeError};
use crate::processing::naming::NamingRule;
use crate::processing::resize::Position;

/// A named absolute target width
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub label: String,
    pub width: u32,
}

impl Breakpoint {
    pub fn new<S: Into<String>>(label: S, width: u32) -> Self {
        Self {
            label: label.into(),
            width,
        }
    }
}

/// How one derivative's target width is derived
#[derive(Debug, Clone, PartialEq)]
pub enum SizeSpec {
    /// Scale factor applied to the source's natural width
    Ratio(f32),
    /// Named breakpoint with an absolute width
    Breakpoint(Breakpoint),
    /// Absolute width, unlabeled
    Width(u32),
}

impl SizeSpec {
    /// Whether resolving this size needs the source's natural width
    pub fn needs_source_width(&self) -> bool {
        matches!(self, Self::Ratio(_))
    }

    /// Resolve to a positive pixel width
    pub fn target_width(&self, source_width: Option<u32>) -> Result<u32> {
        match self {
            Self::Ratio(ratio) => {
                let source_width = source_width.ok_or_else(|| {
                    DerivativeError::invalid_parameters("Ratio sizing requires the source width")
                })?;
                let width = (source_width as f32 * ratio).round() as u32;
                Ok(width.max(1))
            }
            Self::Breakpoint(bp) => Ok(bp.width),
            Self::Width(width) => Ok(*width),
        }
    }
}

/// Per-profile sizing tables, fixed once the configuration is loaded
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileTables {
    /// Scale factors for lifestyle images
    pub lifestyle_ratios: Vec<f32>,

    /// Product widths; each one gets its own output subdirectory
    pub product_widths: Vec<u32>,

    /// Swatch widths
    pub swatch_widths: Vec<u32>,

    // Arrays of tables go last; TOML emits them after plain values
    /// Home page slide breakpoints
    pub slide: Vec<Breakpoint>,

    /// Three-up slide breakpoints, including the blur-up hint
    pub slide3: Vec<Breakpoint>,
}

impl Default for ProfileTables {
    fn default() -> Self {
        Self {
            lifestyle_ratios: vec![1.0, 0.75, 0.5, 0.25],
            product_widths: vec![80, 125, 400, 800],
            swatch_widths: vec![100],
            slide: vec![
                Breakpoint::new("xs", 480),
                Breakpoint::new("sm", 640),
                Breakpoint::new("md", 800),
                Breakpoint::new("lg", 1600),
                Breakpoint::new("xl", 2000),
            ],
            slide3: vec![
                Breakpoint::new("hint", 25),
                Breakpoint::new("xs", 200),
                Breakpoint::new("sm", 400),
                Breakpoint::new("md", 600),
                Breakpoint::new("lg", 800),
                Breakpoint::new("xl", 1334),
            ],
        }
    }
}

impl ProfileTables {
    /// Validate every table
    pub fn validate(&self) -> Result<()> {
        if self.lifestyle_ratios.is_empty() {
            return Err(DerivativeError::config("lifestyle_ratios must not be empty"));
        }
        for ratio in &self.lifestyle_ratios {
            if !ratio.is_finite() || *ratio <= 0.0 {
                return Err(DerivativeError::config(format!(
                    "Lifestyle ratio must be positive, got {}",
                    ratio
                )));
            }
        }
        let distinct: HashSet<u32> = self.lifestyle_ratios.iter().map(|r| r.to_bits()).collect();
        if distinct.len() != self.lifestyle_ratios.len() {
            return Err(DerivativeError::config("lifestyle_ratios contains duplicates"));
        }

        validate_breakpoints("slide", &self.slide)?;
        validate_breakpoints("slide3", &self.slide3)?;
        validate_widths("product_widths", &self.product_widths)?;
        validate_widths("swatch_widths", &self.swatch_widths)?;

        Ok(())
    }
}

fn validate_breakpoints(table: &str, breakpoints: &[Breakpoint]) -> Result<()> {
    if breakpoints.is_empty() {
        return Err(DerivativeError::config(format!("{} must not be empty", table)));
    }
    let mut seen = HashSet::new();
    for bp in breakpoints {
        if bp.label.is_empty() || bp.label.contains(['/', '\\', '.']) {
            return Err(DerivativeError::config(format!(
                "{}: invalid breakpoint label {:?}",
                table, bp.label
            )));
        }
        if bp.width == 0 {
            return Err(DerivativeError::config(format!(
                "{}: breakpoint {} has zero width",
                table, bp.label
            )));
        }
        if !seen.insert(bp.label.as_str()) {
            return Err(DerivativeError::config(format!(
                "{}: duplicate breakpoint label {}",
                table, bp.label
            )));
        }
    }
    Ok(())
}

fn validate_widths(table: &str, widths: &[u32]) -> Result<()> {
    if widths.is_empty() {
        return Err(DerivativeError::config(format!("{} must not be empty", table)));
    }
    if widths.contains(&0) {
        return Err(DerivativeError::config(format!("{} contains a zero width", table)));
    }
    let distinct: HashSet<u32> = widths.iter().copied().collect();
    if distinct.len() != widths.len() {
        return Err(DerivativeError::config(format!("{} contains duplicates", table)));
    }
    Ok(())
}

/// Parameters for a one-off resize
#[derive(Debug, Clone, PartialEq)]
pub struct ResizeRequest {
    /// Source file, relative to the source root
    pub src: String,
    pub width: u32,
    pub height: Option<u32>,
    pub position: Option<Position>,
    /// Output file name; defaults to the source's file name
    pub filename: Option<String>,
}

impl ResizeRequest {
    pub fn new<S: Into<String>>(src: S, width: u32) -> Self {
        Self {
            src: src.into(),
            width,
            height: None,
            position: None,
            filename: None,
        }
    }

    pub fn height(mut self, height: u32) -> Self {
        self.height = Some(height);
        self
    }

    pub fn position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn filename<S: Into<String>>(mut self, filename: S) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.src.is_empty() {
            return Err(DerivativeError::invalid_parameters("resize needs a source file"));
        }
        if self.width == 0 || self.height == Some(0) {
            return Err(DerivativeError::invalid_parameters(
                "Width and height must be greater than 0",
            ));
        }
        if let Some(filename) = &self.filename {
            if filename.is_empty() || filename.contains(['/', '\\']) {
                return Err(DerivativeError::invalid_parameters(format!(
                    "Output filename {:?} must be a bare file name",
                    filename
                )));
            }
        }
        Ok(())
    }
}

/// The closed set of derivative profiles
#[derive(Debug, Clone, PartialEq)]
pub enum Profile {
    Lifestyle { src: String },
    Slide { src: String },
    Slide3 { src: String },
    Product { src: String },
    Swatch { src: String },
    Resize(ResizeRequest),
}

/// Where one size of a profile lands and how it is named
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSlot {
    pub size: SizeSpec,
    pub directory: PathBuf,
}

impl Profile {
    /// Profile name as used on the command line
    pub fn name(&self) -> &'static str {
        match self {
            Self::Lifestyle { .. } => "lifestyle",
            Self::Slide { .. } => "slide",
            Self::Slide3 { .. } => "slide3",
            Self::Product { .. } => "product",
            Self::Swatch { .. } => "swatch",
            Self::Resize(_) => "resize",
        }
    }

    /// Source argument, relative to the source root
    pub fn src(&self) -> &str {
        match self {
            Self::Lifestyle { src }
            | Self::Slide { src }
            | Self::Slide3 { src }
            | Self::Product { src }
            | Self::Swatch { src } => src,
            Self::Resize(request) => &request.src,
        }
    }

    pub fn naming_rule(&self) -> NamingRule {
        match self {
            Self::Lifestyle { .. } => NamingRule::Ratio,
            Self::Slide { .. } | Self::Slide3 { .. } => NamingRule::Labeled,
            Self::Product { .. } | Self::Swatch { .. } | Self::Resize(_) => NamingRule::Plain,
        }
    }

    /// Every size this profile renders per input file, with its directory
    pub fn slots(&self, tables: &ProfileTables, paths: &PathConfig) -> Vec<OutputSlot> {
        match self {
            Self::Lifestyle { .. } => tables
                .lifestyle_ratios
                .iter()
                .map(|ratio| OutputSlot {
                    size: SizeSpec::Ratio(*ratio),
                    directory: paths.lifestyle_dir(),
                })
                .collect(),
            Self::Slide { .. } => breakpoint_slots(&tables.slide, paths.slide_dir()),
            Self::Slide3 { .. } => breakpoint_slots(&tables.slide3, paths.slide_dir()),
            Self::Product { .. } => tables
                .product_widths
                .iter()
                .map(|width| OutputSlot {
                    size: SizeSpec::Width(*width),
                    directory: paths.product_dir(*width),
                })
                .collect(),
            Self::Swatch { .. } => tables
                .swatch_widths
                .iter()
                .map(|width| OutputSlot {
                    size: SizeSpec::Width(*width),
                    directory: paths.swatch_dir(),
                })
                .collect(),
            Self::Resize(request) => vec![OutputSlot {
                size: SizeSpec::Width(request.width),
                directory: paths.resize_dir(),
            }],
        }
    }

    /// Distinct output directories reset before the batch writes
    ///
    /// Empty for `resize`, which only replaces its own output file.
    pub fn reset_dirs(&self, tables: &ProfileTables, paths: &PathConfig) -> Vec<PathBuf> {
        if matches!(self, Self::Resize(_)) {
            return Vec::new();
        }
        let mut dirs: Vec<PathBuf> = Vec::new();
        for slot in self.slots(tables, paths) {
            if !dirs.contains(&slot.directory) {
                dirs.push(slot.directory);
            }
        }
        dirs
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn breakpoint_slots(breakpoints: &[Breakpoint], directory: PathBuf) -> Vec<OutputSlot> {
    breakpoints
        .iter()
        .map(|bp| OutputSlot {
            size: SizeSpec::Breakpoint(bp.clone()),
            directory: directory.clone(),
        })
        .collect()
}
