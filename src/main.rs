//! imgderive CLI - Profile-driven responsive image derivatives
//!
//! One subcommand per profile. Each run empties the profile's output
//! directories, then renders every size of every source image into them.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use imgderive::{
    init_logging, BatchReport, BatchRunner, Config, DerivativeError, Position, Profile,
    ProgressTracker, ProgressUpdate, ResizeRequest,
};

/// imgderive - Profile-driven responsive image derivatives
#[derive(Parser)]
#[command(
    name = "imgderive",
    version,
    about = "Generate responsive image derivatives from a source image or directory",
    long_about = "imgderive renders the fixed set of resized variants each storefront profile \
                  needs. Sources are resolved under the source root; outputs land in per-profile \
                  directories under the output root, which must already exist and are emptied \
                  before every run."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (.toml, .yaml or .yml)
    #[arg(short, long, global = true, value_name = "FILE", env = "IMGDERIVE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the source root
    #[arg(long, global = true, value_name = "PATH")]
    source_root: Option<PathBuf>,

    /// Override the output root
    #[arg(long, global = true, value_name = "PATH")]
    output_root: Option<PathBuf>,

    /// Limit the number of renders in flight (default: unbounded)
    #[arg(long, global = true, value_name = "COUNT")]
    concurrency: Option<usize>,

    /// Print the batch report as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

/// Available subcommands
#[derive(Subcommand)]
enum Commands {
    /// Width ratios of the source: photo.jpg, photo@0,75x.jpg, ...
    Lifestyle {
        /// Source file or directory, relative to the source root
        src: Option<String>,
    },
    /// Home page slide breakpoints: banner-xs.jpg ... banner-xl.jpg
    Slide {
        /// Source file or directory, relative to the source root
        src: Option<String>,
    },
    /// Three-up slide breakpoints, including a tiny blur-up hint
    Slide3 {
        /// Source file or directory, relative to the source root
        src: Option<String>,
    },
    /// Product images, one output directory per width
    Product {
        /// Source file or directory, relative to the source root
        src: Option<String>,
    },
    /// Colour swatches
    Swatch {
        /// Source file or directory, relative to the source root
        src: Option<String>,
    },
    /// Resize a single image to an explicit size
    Resize {
        /// Source file, relative to the source root
        src: String,

        /// Target width in pixels
        #[arg(short, long, value_name = "PIXELS")]
        width: u32,

        /// Target height in pixels; crops to cover width x height
        #[arg(short = 'H', long, value_name = "PIXELS")]
        height: Option<u32>,

        /// Crop anchor: centre, top, right top, left, ...
        #[arg(short, long, value_name = "POSITION")]
        position: Option<Position>,

        /// Crop anchor as a compass gravity: north, southeast, ...
        #[arg(short, long, value_name = "GRAVITY", conflicts_with = "position")]
        gravity: Option<Position>,

        /// Output file name (default: the source's file name)
        #[arg(short, long, value_name = "NAME")]
        filename: Option<String>,
    },
    /// Show the sizing table of every profile
    Profiles,
    /// Generate example configuration file
    ExampleConfig {
        /// Output file path; the extension selects TOML or YAML
        #[arg(short, long, default_value = "imgderive.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        let message = match e.downcast_ref::<DerivativeError>() {
            Some(err) => err.user_message(),
            None => format!("{:#}", e),
        };
        eprintln!("{}: {}", style("Error").red().bold(), message);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    let log_level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    init_logging(log_level, config.logging.json_format);
    debug!("Effective configuration: {:?}", config);

    let profile = match cli.command {
        Commands::Lifestyle { src } => Profile::Lifestyle { src: src.unwrap_or_default() },
        Commands::Slide { src } => Profile::Slide { src: src.unwrap_or_default() },
        Commands::Slide3 { src } => Profile::Slide3 { src: src.unwrap_or_default() },
        Commands::Product { src } => Profile::Product { src: src.unwrap_or_default() },
        Commands::Swatch { src } => Profile::Swatch { src: src.unwrap_or_default() },
        Commands::Resize {
            src,
            width,
            height,
            position,
            gravity,
            filename,
        } => Profile::Resize(ResizeRequest {
            src,
            width,
            height,
            position: position.or(gravity),
            filename,
        }),
        Commands::Profiles => {
            show_profiles(&config);
            return Ok(());
        }
        Commands::ExampleConfig { output } => {
            return generate_example_config(&output);
        }
    };

    let report = run_batch(Arc::new(config), &profile, cli.concurrency, cli.json || cli.quiet).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !cli.quiet {
        print_summary(&report);
    }
    Ok(())
}

/// Defaults, then the config file, then command-line overrides
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(source_root) = &cli.source_root {
        config.paths.source_root = source_root.clone();
    }
    if let Some(output_root) = &cli.output_root {
        config.paths.output_root = output_root.clone();
    }

    config.validate()?;
    Ok(config)
}

async fn run_batch(
    config: Arc<Config>,
    profile: &Profile,
    concurrency: Option<usize>,
    hide_progress: bool,
) -> Result<BatchReport> {
    info!(
        "Running {} on {:?} (source root {:?}, output root {:?})",
        profile,
        profile.src(),
        config.paths.source_root,
        config.paths.output_root
    );

    let mut runner = BatchRunner::new(config);
    if let Some(limit) = concurrency {
        runner = runner.with_concurrency_limit(limit);
    }

    let bar = (!hide_progress).then(|| spawn_progress_bar(&runner.progress()));
    let result = runner.run(profile).await;
    if let Some(handle) = bar {
        let _ = handle.await;
    }

    Ok(result?)
}

/// Drive an indicatif bar from the runner's progress events
fn spawn_progress_bar(tracker: &ProgressTracker) -> JoinHandle<()> {
    let mut updates = tracker.subscribe();

    tokio::spawn(async move {
        let bar = ProgressBar::new(0);
        let bar_style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(bar_style);

        loop {
            match updates.recv().await {
                Ok(ProgressUpdate::Started { profile, planned }) => {
                    bar.set_length(planned as u64);
                    bar.set_message(profile);
                }
                Ok(ProgressUpdate::OutputRendered { path }) => {
                    if let Some(name) = path.file_name() {
                        bar.set_message(name.to_string_lossy().into_owned());
                    }
                    bar.inc(1);
                }
                Ok(ProgressUpdate::OutputFailed { count, .. }) => bar.inc(count as u64),
                Ok(ProgressUpdate::Finished { .. }) | Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(_)) => continue,
            }
        }

        bar.finish_and_clear();
    })
}

/// Show the sizing tables
fn show_profiles(config: &Config) {
    let tables = &config.profiles;
    let paths = &config.paths;

    println!("{}", style("Profiles:").bold());
    println!();

    let ratios: Vec<String> = tables.lifestyle_ratios.iter().map(|r| r.to_string()).collect();
    print_profile("lifestyle", &ratios.join(" "), &paths.lifestyle_dir());

    for (name, breakpoints) in [("slide", &tables.slide), ("slide3", &tables.slide3)] {
        let values: Vec<String> = breakpoints
            .iter()
            .map(|bp| format!("{}:{}", bp.label, bp.width))
            .collect();
        print_profile(name, &values.join(" "), &paths.slide_dir());
    }

    let widths: Vec<String> = tables.product_widths.iter().map(|w| w.to_string()).collect();
    print_profile(
        "product",
        &widths.join(" "),
        &paths.output_root.join(&paths.product).join("<width>"),
    );

    let widths: Vec<String> = tables.swatch_widths.iter().map(|w| w.to_string()).collect();
    print_profile("swatch", &widths.join(" "), &paths.swatch_dir());

    print_profile("resize", "--width [--height] [--position|--gravity]", &paths.resize_dir());
}

fn print_profile(name: &str, values: &str, directory: &Path) {
    println!("{}", style(name).cyan().bold());
    println!("  sizes:  {}", values);
    println!("  output: {}", directory.display());
}

/// Generate example configuration file
fn generate_example_config(output_path: &Path) -> Result<()> {
    Config::default().to_file(output_path)?;

    println!(
        "{}: Generated example configuration: {}",
        style("Success").green().bold(),
        output_path.display()
    );
    Ok(())
}

/// Print processing summary
fn print_summary(report: &BatchReport) {
    println!("done.");
    println!();
    println!("{}", style("Summary:").bold());
    println!("  {}: {}", style("Profile").blue(), report.profile);
    println!("  {}: {}", style("Files").green(), report.files.len());
    println!("  {}: {}", style("Outputs").green(), report.outputs.len());
    if report.entries_removed > 0 {
        println!("  {}: {}", style("Replaced").yellow(), report.entries_removed);
    }
    println!(
        "  {}: {:.2}MB",
        style("Size").cyan(),
        report.total_output_size() as f64 / 1024.0 / 1024.0
    );
    println!("  {}: {:.2}s", style("Duration").blue(), report.elapsed_ms as f64 / 1000.0);
}
