//! Manual cleanup of processed images.
//!
//! [`review_directory`] walks a directory and asks a [`Reviewer`] about every
//! image. The terminal reviewer shows a true-color preview and reads the
//! answer from the user; the automatic reviewer flags images whose
//! background removal left (almost) nothing behind.

use std::{
    fs,
    io::{BufRead, Write},
    path::{Path, PathBuf},
};

use anyhow::Result;
use image::{imageops, DynamicImage, GenericImageView, Rgb, RgbImage};
use kitvae_util::{image::open_image, RAW_EXTENSIONS};
use tracing::{error, info, warn};

use crate::preprocess::list_images;

/// Channel value above which a pixel counts as foreground.
const BLACK_LEVEL: u8 = 16;

/// What to do with one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Keep,
    Delete,
    Quit,
}

impl ReviewDecision {
    /// `y` deletes, `q` quits, anything else (including an empty line) keeps.
    pub fn from_response(response: &str) -> Self {
        match response.trim().to_lowercase().as_str() {
            "y" => Self::Delete,
            "q" => Self::Quit,
            _ => Self::Keep,
        }
    }
}

/// Decides about images one at a time.
pub trait Reviewer {
    fn review(&mut self, path: &Path, image: &DynamicImage) -> ReviewDecision;
}

/// What a review pass did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReviewSummary {
    pub reviewed: usize,
    pub kept: usize,
    pub deleted: Vec<PathBuf>,
    /// Files that could not be decoded.
    pub skipped: usize,
    /// Whether the reviewer stopped before the end.
    pub quit: bool,
}

/// Reviews every `.jpg/.jpeg/.png` in `dir` in file-name order, deleting
/// the files the reviewer rejects.
///
/// # Errors
///
/// Fails if the directory does not exist or cannot be listed.
pub fn review_directory(dir: &Path, reviewer: &mut dyn Reviewer) -> Result<ReviewSummary> {
    let paths = list_images(dir, RAW_EXTENSIONS)?;
    let mut summary = ReviewSummary::default();

    for path in paths {
        let image = match open_image(&path) {
            Ok(image) => image,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable image");
                summary.skipped += 1;
                continue;
            }
        };

        summary.reviewed += 1;
        match reviewer.review(&path, &image) {
            ReviewDecision::Keep => summary.kept += 1,
            ReviewDecision::Delete => match fs::remove_file(&path) {
                Ok(()) => {
                    info!(path = %path.display(), "deleted");
                    summary.deleted.push(path);
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "failed to delete");
                    summary.kept += 1;
                }
            },
            ReviewDecision::Quit => {
                summary.quit = true;
                break;
            }
        }
    }

    info!(
        reviewed = summary.reviewed,
        deleted = summary.deleted.len(),
        kept = summary.kept,
        "review finished"
    );
    Ok(summary)
}

/// Fraction of pixels with at least one channel above the black level.
pub fn foreground_fraction(image: &DynamicImage) -> f64 {
    let rgb = image.to_rgb8();
    let total = rgb.width() as usize * rgb.height() as usize;
    if total == 0 {
        return 0.0;
    }

    let foreground = rgb
        .pixels()
        .filter(|p| p.0.iter().any(|&c| c > BLACK_LEVEL))
        .count();
    foreground as f64 / total as f64
}

/// Deletes images whose foreground fraction is below `threshold`.
pub fn classify(image: &DynamicImage, threshold: f64) -> ReviewDecision {
    if foreground_fraction(image) < threshold {
        ReviewDecision::Delete
    } else {
        ReviewDecision::Keep
    }
}

/// Reviewer applying [`classify`] without asking anyone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoReviewer {
    pub threshold: f64,
}

impl Default for AutoReviewer {
    fn default() -> Self {
        Self { threshold: 0.02 }
    }
}

impl Reviewer for AutoReviewer {
    fn review(&mut self, path: &Path, image: &DynamicImage) -> ReviewDecision {
        let decision = classify(image, self.threshold);
        if decision == ReviewDecision::Delete {
            info!(
                path = %path.display(),
                fraction = foreground_fraction(image),
                "almost empty image"
            );
        }
        decision
    }
}

/// Interactive reviewer for a terminal with true-color support.
pub struct TerminalReviewer<R: BufRead, W: Write> {
    input: R,
    output: W,
    preview_columns: u32,
}

impl<R: BufRead, W: Write> TerminalReviewer<R, W> {
    pub const fn new(input: R, output: W, preview_columns: u32) -> Self {
        Self {
            input,
            output,
            preview_columns,
        }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn prompt(&mut self, path: &Path, image: &DynamicImage) -> std::io::Result<ReviewDecision> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.output
            .write_all(render_preview(image, self.preview_columns).as_bytes())?;
        write!(self.output, "Delete {name}? (y/Enter/q): ")?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(ReviewDecision::Quit);
        }
        Ok(ReviewDecision::from_response(&line))
    }
}

impl<R: BufRead, W: Write> Reviewer for TerminalReviewer<R, W> {
    fn review(&mut self, path: &Path, image: &DynamicImage) -> ReviewDecision {
        match self.prompt(path, image) {
            Ok(decision) => decision,
            Err(e) => {
                warn!(error = %e, "terminal unavailable, stopping review");
                ReviewDecision::Quit
            }
        }
    }
}

/// Renders `image` as ANSI half blocks, at most `columns` wide.
///
/// Each character cell shows two pixel rows: the upper one as foreground
/// color of `▀`, the lower one as background color.
pub fn render_preview(image: &DynamicImage, columns: u32) -> String {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || columns == 0 {
        return String::new();
    }

    let preview_width = width.min(columns);
    let preview_height = ((u64::from(height) * u64::from(preview_width)) / u64::from(width))
        .max(1) as u32;
    let preview: RgbImage = imageops::resize(
        &image.to_rgb8(),
        preview_width,
        preview_height,
        imageops::FilterType::Triangle,
    );

    let mut out = String::new();
    for y in (0..preview_height).step_by(2) {
        for x in 0..preview_width {
            let Rgb([tr, tg, tb]) = *preview.get_pixel(x, y);
            let Rgb([br, bg, bb]) = if y + 1 < preview_height {
                *preview.get_pixel(x, y + 1)
            } else {
                Rgb([0, 0, 0])
            };
            out.push_str(&format!(
                "\x1b[38;2;{tr};{tg};{tb}m\x1b[48;2;{br};{bg};{bb}m\u{2580}"
            ));
        }
        out.push_str("\x1b[0m\n");
    }
    out
}
