//! imgderive - Profile-driven responsive image derivatives
//!
//! Turns a source image, or a directory of them, into the fixed set of
//! resized variants a storefront needs. Each profile has its own sizing
//! table, output directory and naming rule:
//!
//! - **lifestyle**: ratios of the source width, `photo@0,75x.jpg`
//! - **slide** / **slide3**: named breakpoints, `hero-xl.jpg`
//! - **product**: one directory per width, `product/400/shoe.jpg`
//! - **swatch**: small fixed widths
//! - **resize**: a one-off width/height/position resize
//!
//! Output directories are emptied before a batch writes into them, then
//! every file and every size is rendered concurrently.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use imgderive::{BatchRunner, Config, Profile};
//!
//! # async fn run() -> imgderive::Result<()> {
//! let runner = BatchRunner::new(Arc::new(Config::default()));
//! let report = runner.run(&Profile::Slide { src: "banner.jpg".into() }).await?;
//!
//! for output in &report.outputs {
//!     println!("{}", output.output_path.display());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod parallel;
pub mod processing;

// Re-export commonly used types
pub use config::{Config, PathConfig, Profile, ProfileTables, ResizeRequest};
pub use error::{DerivativeError, Result, TaskFailure};
pub use parallel::{BatchReport, BatchRunner, ProgressTracker, ProgressUpdate};
pub use processing::{DecodedSource, ImageBackend, Position, ProcessingEngine, ResizeBackend};

use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `level`. Calling this more than once is
/// harmless; only the first call installs a subscriber.
pub fn init_logging(level: &str, json_format: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = if json_format {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };

    if installed {
        debug!("imgderive v{} logging initialized", VERSION);
    }
}
