//! Batch preprocessing of image directories.
//!
//! Directories follow `data/raw` (scraped) -> `data/processed` (background
//! removed) -> `data/interim` (letterboxed, training input). Every pipeline
//! logs and skips files that fail and reports them in a [`BatchReport`].

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use image::DynamicImage;
use indicatif::{ProgressBar, ProgressStyle};
use kitvae_util::{
    background::remove_background_to_black,
    image::{has_supported_extension, open_image, save_image},
    letterbox_dynamic, BackgroundRemover, LETTERBOX_EXTENSIONS, RAW_EXTENSIONS,
};
use tracing::{error, info, warn};
use walkdir::WalkDir;

/// Scraped originals.
pub const RAW_DIR: &str = "data/raw";
/// Background removed, composited on black.
pub const PROCESSED_DIR: &str = "data/processed";
/// Letterboxed training input.
pub const INTERIM_DIR: &str = "data/interim";

/// Default letterbox canvas side.
pub const DEFAULT_TARGET_SIZE: u32 = 256;

/// Suffix appended to the file stem by background removal.
pub const BLACK_BG_SUFFIX: &str = "_black_bg";

/// Outcome of one pipeline run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// Files written, in processing order.
    pub processed: Vec<PathBuf>,
    /// Input files that failed, with the error message.
    pub failed: Vec<(PathBuf, String)>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.processed.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Regular files directly inside `dir` with an allowed extension, sorted by name.
///
/// # Errors
///
/// Fails if `dir` does not exist or cannot be read.
pub fn list_images(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("input directory not found: {}", dir.display());
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("failed to read {}", dir.display()))?;
        if entry.file_type().is_file() && has_supported_extension(entry.path(), extensions) {
            paths.push(entry.into_path());
        }
    }
    Ok(paths)
}

/// Removes the background of every `.jpg/.jpeg/.png` in `input` and writes
/// `<stem>_black_bg.png` into `output`.
pub fn remove_backgrounds(
    input: &Path,
    output: &Path,
    remover: &dyn BackgroundRemover,
) -> Result<BatchReport> {
    info!(remover = remover.name(), "removing backgrounds");
    run_batch(input, output, RAW_EXTENSIONS, "background removal", |path| {
        let image = open_image(path)?;
        let black = remove_background_to_black(remover, &image)?;

        let target = output.join(black_bg_file_name(path)?);
        save_image(&DynamicImage::ImageRgb8(black), &target)?;
        Ok(target)
    })
}

/// Letterboxes every `.jpg/.jpeg/.png/.webp` in `input` to `size x size`,
/// keeping file names.
pub fn letterbox_directory(input: &Path, output: &Path, size: u32) -> Result<BatchReport> {
    run_batch(input, output, LETTERBOX_EXTENSIONS, "letterbox", |path| {
        let image = open_image(path)?;
        let boxed = letterbox_dynamic(&image, size, size)?;

        let target = output.join(file_name(path)?);
        save_image(&DynamicImage::ImageRgb8(boxed), &target)?;
        Ok(target)
    })
}

/// Background removal, black compositing and letterboxing in one pass,
/// keeping file names.
pub fn process_directory(
    input: &Path,
    output: &Path,
    remover: &dyn BackgroundRemover,
    size: u32,
) -> Result<BatchReport> {
    info!(remover = remover.name(), size, "processing images");
    run_batch(input, output, LETTERBOX_EXTENSIONS, "processing", |path| {
        let image = open_image(path)?;
        let black = remove_background_to_black(remover, &image)?;
        let boxed = letterbox_dynamic(&DynamicImage::ImageRgb8(black), size, size)?;

        let target = output.join(file_name(path)?);
        save_image(&DynamicImage::ImageRgb8(boxed), &target)?;
        Ok(target)
    })
}

fn run_batch<F>(
    input: &Path,
    output: &Path,
    extensions: &[&str],
    stage: &str,
    mut process: F,
) -> Result<BatchReport>
where
    F: FnMut(&Path) -> Result<PathBuf>,
{
    let paths = list_images(input, extensions)?;
    std::fs::create_dir_all(output)
        .with_context(|| format!("failed to create output directory {}", output.display()))?;

    let mut report = BatchReport::default();
    if paths.is_empty() {
        warn!(dir = %input.display(), stage, "no images found");
        return Ok(report);
    }

    let progress = progress_bar(paths.len() as u64, stage);
    for path in paths {
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        progress.set_message(name.clone().unwrap_or_default());

        match process(&path) {
            Ok(written) => report.processed.push(written),
            Err(e) => {
                let message = format!("{e:#}");
                error!(
                    file = name.as_deref().unwrap_or("?"),
                    stage,
                    error = %message,
                    "failed to process image"
                );
                report.failed.push((path, message));
            }
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    info!(
        stage,
        processed = report.processed.len(),
        failed = report.failed.len(),
        output = %output.display(),
        "batch finished"
    );
    Ok(report)
}

/// Progress bar used by the batch loops.
pub fn progress_bar(len: u64, prefix: &str) -> ProgressBar {
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    bar.set_prefix(prefix.to_string());
    bar
}

fn file_name(path: &Path) -> Result<&std::ffi::OsStr> {
    path.file_name()
        .with_context(|| format!("path has no file name: {}", path.display()))
}

fn black_bg_file_name(path: &Path) -> Result<String> {
    let stem = path
        .file_stem()
        .with_context(|| format!("path has no file stem: {}", path.display()))?;
    Ok(format!("{}{BLACK_BG_SUFFIX}.png", stem.to_string_lossy()))
}
