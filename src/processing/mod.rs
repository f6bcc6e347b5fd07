//! Image I/O and rendering
//!
//! [`ProcessingEngine`] is the async front of the pipeline: it reads source
//! bytes, asks a [`ResizeBackend`] for dimensions, decodes each source once
//! and renders every size from that decode on the blocking pool, then writes
//! the results. The default backend is
//! [`ImageBackend`], built on the `image` crate.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::{DynamicImage, ImageFormat};
use tokio::fs;
use tracing::debug;

use crate::error::{Result, DerivativeError};

pub mod formats;
pub mod naming;
pub mod outputs;
pub mod resize;
pub mod scan;

pub use formats::*;
pub use naming::{FilenameParts, NamingRule};
pub use resize::{ImageResizer, Position};
pub use scan::ResolvedBatch;

/// Pixel dimensions of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Target geometry for one derivative
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderParams {
    pub width: u32,
    /// Crop to this height instead of keeping the aspect ratio
    pub height: Option<u32>,
    pub position: Option<Position>,
}

impl RenderParams {
    pub fn width(width: u32) -> Self {
        Self {
            width,
            height: None,
            position: None,
        }
    }
}

/// A source decoded once and shared by every size rendered from it
#[derive(Debug)]
pub struct DecodedSource {
    pub image: DynamicImage,
    /// Format the source arrived in; derivatives are encoded the same way
    pub format: ImageFormat,
}

/// Decode/resize/encode capability.
///
/// Implementations are synchronous; the engine calls them on the blocking
/// pool.
pub trait ResizeBackend: Send + Sync + 'static {
    /// Natural size of the encoded image in `data`
    fn dimensions(&self, data: &[u8]) -> Result<Dimensions>;

    /// Decode `data`; `path` is only used for error context
    fn decode(&self, data: &[u8], path: &Path) -> Result<DecodedSource>;

    /// Resize a decoded source and re-encode it in its own format.
    ///
    /// `output` is only used for error context.
    fn render(&self, source: &DecodedSource, params: &RenderParams, output: &Path) -> Result<Rendered>;
}

/// Encoded derivative returned by a backend
#[derive(Debug, Clone)]
pub struct Rendered {
    pub bytes: Vec<u8>,
    pub dimensions: Dimensions,
}

/// Backend using the `image` crate
pub struct ImageBackend {
    resizer: ImageResizer,
}

impl ImageBackend {
    pub fn new() -> Self {
        Self {
            resizer: ImageResizer::new(),
        }
    }
}

impl Default for ImageBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ResizeBackend for ImageBackend {
    fn dimensions(&self, data: &[u8]) -> Result<Dimensions> {
        // Reads the header only
        let reader = image::io::Reader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| DerivativeError::render(PathBuf::new(), format!("Cannot read header: {}", e)))?;
        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| DerivativeError::render(PathBuf::new(), format!("Cannot read dimensions: {}", e)))?;
        Ok(Dimensions { width, height })
    }

    fn decode(&self, data: &[u8], path: &Path) -> Result<DecodedSource> {
        let format = detect_format(data, path)?;
        let image = image::load_from_memory_with_format(data, format)
            .map_err(|e| DerivativeError::render(path, format!("Failed to decode image: {}", e)))?;
        Ok(DecodedSource { image, format })
    }

    fn render(&self, source: &DecodedSource, params: &RenderParams, output: &Path) -> Result<Rendered> {
        let resized = self.resizer.resize(
            &source.image,
            params.width,
            params.height,
            params.position.unwrap_or_default(),
        )?;
        let dimensions = Dimensions {
            width: resized.width(),
            height: resized.height(),
        };

        let bytes = encode(&resized, source.format, output)?;
        Ok(Rendered { bytes, dimensions })
    }
}

/// One output file to produce from an already-decoded source
#[derive(Debug, Clone)]
pub struct RenderTask {
    pub source: Arc<DecodedSource>,
    pub params: RenderParams,
    pub output_directory: PathBuf,
    pub output_filename: String,
}

impl RenderTask {
    pub fn output_path(&self) -> PathBuf {
        self.output_directory.join(&self.output_filename)
    }
}

/// A derivative that was written to disk
#[derive(Debug, Clone, serde::Serialize)]
pub struct RenderOutcome {
    pub output_path: PathBuf,
    pub dimensions: Dimensions,
    pub file_size: u64,
    #[serde(skip)]
    pub processing_time: Duration,
}

/// Async engine wrapping a [`ResizeBackend`]
#[derive(Clone)]
pub struct ProcessingEngine {
    backend: Arc<dyn ResizeBackend>,
}

impl ProcessingEngine {
    /// Engine backed by the `image` crate
    pub fn new() -> Self {
        Self::with_backend(Arc::new(ImageBackend::new()))
    }

    pub fn with_backend(backend: Arc<dyn ResizeBackend>) -> Self {
        Self { backend }
    }

    /// Read a whole source file into memory
    pub async fn load_source(&self, directory: &Path, filename: &str) -> Result<Arc<[u8]>> {
        let path = directory.join(filename);
        let data = fs::read(&path)
            .await
            .map_err(|e| DerivativeError::source_read(&path, e))?;
        debug!("Loaded {:?} ({} bytes)", path, data.len());
        Ok(Arc::from(data))
    }

    /// Natural width of a loaded source
    pub async fn query_width(&self, source: &Arc<[u8]>, path: &Path) -> Result<u32> {
        let backend = Arc::clone(&self.backend);
        let data = Arc::clone(source);
        let dimensions = tokio::task::spawn_blocking(move || backend.dimensions(&data))
            .await
            .map_err(|e| DerivativeError::system(format!("Task join error: {}", e)))?
            .map_err(|e| match e {
                DerivativeError::Render { message, .. } => DerivativeError::render(path, message),
                other => other,
            })?;

        if dimensions.width == 0 {
            return Err(DerivativeError::render(path, "Source reports zero width"));
        }
        Ok(dimensions.width)
    }

    /// Decode a loaded source once, for every size rendered from it
    pub async fn decode(&self, source: &Arc<[u8]>, path: &Path) -> Result<Arc<DecodedSource>> {
        let backend = Arc::clone(&self.backend);
        let data = Arc::clone(source);
        let path = path.to_path_buf();
        let decoded = tokio::task::spawn_blocking(move || backend.decode(&data, &path))
            .await
            .map_err(|e| DerivativeError::system(format!("Task join error: {}", e)))??;
        Ok(Arc::new(decoded))
    }

    /// Resize and write one derivative
    pub async fn render(&self, task: RenderTask) -> Result<RenderOutcome> {
        let start_time = Instant::now();
        let output_path = task.output_path();
        debug!("writing: {:?} ({}px)", output_path, task.params.width);

        let rendered = tokio::task::spawn_blocking({
            let backend = Arc::clone(&self.backend);
            let source = Arc::clone(&task.source);
            let params = task.params;
            let output_path = output_path.clone();
            move || backend.render(&source, &params, &output_path)
        })
        .await
        .map_err(|e| DerivativeError::system(format!("Task join error: {}", e)))??;

        fs::write(&output_path, &rendered.bytes)
            .await
            .map_err(|e| DerivativeError::render(&output_path, format!("Write failed: {}", e)))?;

        Ok(RenderOutcome {
            output_path,
            dimensions: rendered.dimensions,
            file_size: rendered.bytes.len() as u64,
            processing_time: start_time.elapsed(),
        })
    }
}

impl Default for ProcessingEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Encoded test image with a simple gradient
    pub(crate) fn encoded_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 255) as u8, (y % 255) as u8, 128])
        });
        encode(&DynamicImage::ImageRgb8(img), format, Path::new("fixture")).unwrap()
    }

    /// Backend that records renders instead of decoding anything.
    ///
    /// Reports `width` for every source and fails any render whose target
    /// width is listed in `fail_widths`.
    pub(crate) struct MockBackend {
        pub width: u32,
        pub fail_widths: Vec<u32>,
        pub decodes: AtomicUsize,
        pub renders: Mutex<Vec<(PathBuf, u32)>>,
    }

    impl MockBackend {
        pub(crate) fn new(width: u32) -> Self {
            Self {
                width,
                fail_widths: Vec::new(),
                decodes: AtomicUsize::new(0),
                renders: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing_on(mut self, width: u32) -> Self {
            self.fail_widths.push(width);
            self
        }

        pub(crate) fn rendered(&self) -> Vec<(PathBuf, u32)> {
            let mut renders = self.renders.lock().unwrap().clone();
            renders.sort();
            renders
        }

        pub(crate) fn decode_count(&self) -> usize {
            self.decodes.load(Ordering::SeqCst)
        }
    }

    impl ResizeBackend for MockBackend {
        fn dimensions(&self, data: &[u8]) -> Result<Dimensions> {
            if data.is_empty() {
                return Err(DerivativeError::render(PathBuf::new(), "empty source"));
            }
            Ok(Dimensions {
                width: self.width,
                height: self.width / 2,
            })
        }

        fn decode(&self, data: &[u8], path: &Path) -> Result<DecodedSource> {
            if data.is_empty() {
                return Err(DerivativeError::render(path, "empty source"));
            }
            self.decodes.fetch_add(1, Ordering::SeqCst);
            Ok(DecodedSource {
                image: DynamicImage::new_rgb8(1, 1),
                format: ImageFormat::Png,
            })
        }

        fn render(&self, _source: &DecodedSource, params: &RenderParams, output: &Path) -> Result<Rendered> {
            if self.fail_widths.contains(&params.width) {
                return Err(DerivativeError::render(output, "simulated failure"));
            }
            self.renders
                .lock()
                .unwrap()
                .push((output.to_path_buf(), params.width));
            Ok(Rendered {
                bytes: params.width.to_string().into_bytes(),
                dimensions: Dimensions {
                    width: params.width,
                    height: params.height.unwrap_or(params.width / 2),
                },
            })
        }
    }

    #[test]
    fn test_image_backend_dimensions() {
        let data = encoded_image(120, 80, ImageFormat::Png);
        let dims = ImageBackend::new().dimensions(&data).unwrap();
        assert_eq!(dims, Dimensions { width: 120, height: 80 });
        assert!(ImageBackend::new().dimensions(b"garbage").is_err());
    }

    #[test]
    fn test_image_backend_keeps_source_format() {
        let backend = ImageBackend::new();
        let data = encoded_image(200, 100, ImageFormat::Jpeg);
        let source = backend.decode(&data, Path::new("in/a.jpg")).unwrap();
        assert_eq!(source.format, ImageFormat::Jpeg);

        for width in [50, 100] {
            let rendered = backend
                .render(&source, &RenderParams::width(width), Path::new("out/a.jpg"))
                .unwrap();
            assert_eq!(rendered.dimensions, Dimensions { width, height: width / 2 });
            assert_eq!(image::guess_format(&rendered.bytes).unwrap(), ImageFormat::Jpeg);
        }
    }

    #[test]
    fn test_image_backend_rejects_corrupt_data() {
        let err = ImageBackend::new()
            .decode(b"definitely not an image", Path::new("in/a.jpg"))
            .unwrap_err();
        assert!(matches!(err, DerivativeError::Render { .. }));
    }

    #[tokio::test]
    async fn test_engine_render_writes_file() {
        let dir = TempDir::new().unwrap();
        let engine = ProcessingEngine::new();
        let data: Arc<[u8]> = Arc::from(encoded_image(300, 150, ImageFormat::Png));
        let task = RenderTask {
            source: engine.decode(&data, Path::new("wide.png")).await.unwrap(),
            params: RenderParams {
                width: 100,
                height: Some(100),
                position: Some(Position::Left),
            },
            output_directory: dir.path().to_path_buf(),
            output_filename: "square.png".to_string(),
        };

        let outcome = engine.render(task).await.unwrap();
        assert_eq!(outcome.output_path, dir.path().join("square.png"));
        assert_eq!(outcome.dimensions, Dimensions { width: 100, height: 100 });

        let written = image::open(dir.path().join("square.png")).unwrap();
        assert_eq!((written.width(), written.height()), (100, 100));
    }

    #[tokio::test]
    async fn test_engine_render_into_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let engine = ProcessingEngine::new();
        let data: Arc<[u8]> = Arc::from(encoded_image(40, 40, ImageFormat::Png));
        let task = RenderTask {
            source: engine.decode(&data, Path::new("a.png")).await.unwrap(),
            params: RenderParams::width(20),
            output_directory: dir.path().join("absent"),
            output_filename: "a.png".to_string(),
        };
        let err = engine.render(task).await.unwrap_err();
        assert!(matches!(err, DerivativeError::Render { .. }));
    }

    #[tokio::test]
    async fn test_load_source_and_query_width() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("photo.png"), encoded_image(64, 32, ImageFormat::Png)).unwrap();

        let engine = ProcessingEngine::new();
        let source = engine.load_source(dir.path(), "photo.png").await.unwrap();
        assert_eq!(engine.query_width(&source, Path::new("photo.png")).await.unwrap(), 64);

        let err = engine.load_source(dir.path(), "missing.png").await.unwrap_err();
        assert!(matches!(err, DerivativeError::SourceRead { .. }));
    }
}
