//! Training charts rendered straight into images.

use ab_glyph::FontRef;
use anyhow::{ensure, Result};
use image::{imageops, Rgb, RgbImage};
use imageproc::{
    drawing::{
        draw_filled_circle_mut, draw_filled_rect_mut, draw_line_segment_mut, draw_text_mut,
        text_size,
    },
    rect::Rect,
};

pub const TRAIN_COLOR: Rgb<u8> = Rgb([31, 119, 180]);
pub const VALIDATION_COLOR: Rgb<u8> = Rgb([255, 127, 14]);

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([40, 40, 40]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);
const MARGIN: u32 = 40;
const GRID_LINES: u32 = 5;
const TITLE_SCALE: f32 = 20.0;
const LABEL_SCALE: f32 = 14.0;
const LEGEND_WIDTH: u32 = 100;
/// Height of the caption strip above each comparison row.
pub const CAPTION_HEIGHT: u32 = 20;

static FONT_DATA: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

fn font() -> Option<FontRef<'static>> {
    FontRef::try_from_slice(FONT_DATA).ok()
}

/// Line chart of per-epoch training and validation loss.
///
/// The y axis spans the range of both series; an empty validation series is
/// simply not drawn, nor is its legend entry. The title sits in the top margin
/// and the legend in the top-right corner of the plot area.
pub fn render_loss_chart(train: &[f64], validation: &[f64], width: u32, height: u32) -> RgbImage {
    let mut chart = RgbImage::from_pixel(width, height, BACKGROUND);
    if width <= 2 * MARGIN || height <= 2 * MARGIN {
        return chart;
    }

    let left = MARGIN as f32;
    let right = (width - MARGIN) as f32;
    let top = MARGIN as f32;
    let bottom = (height - MARGIN) as f32;

    for i in 0..=GRID_LINES {
        let y = top + (bottom - top) * i as f32 / GRID_LINES as f32;
        draw_line_segment_mut(&mut chart, (left, y), (right, y), GRID);
    }
    draw_line_segment_mut(&mut chart, (left, top), (left, bottom), AXIS);
    draw_line_segment_mut(&mut chart, (left, bottom), (right, bottom), AXIS);

    let values = train
        .iter()
        .chain(validation)
        .copied()
        .filter(|v| v.is_finite());
    let (mut min, mut max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !min.is_finite() {
        return chart;
    }
    if (max - min).abs() < f64::EPSILON {
        min -= 0.5;
        max += 0.5;
    }
    let pad = (max - min) * 0.05;
    let (min, max) = (min - pad, max + pad);

    let epochs = train.len().max(validation.len());
    let to_point = |index: usize, value: f64| -> (f32, f32) {
        let x = if epochs > 1 {
            left + (right - left) * index as f32 / (epochs - 1) as f32
        } else {
            (left + right) / 2.0
        };
        let y = bottom - (bottom - top) * ((value - min) / (max - min)) as f32;
        (x, y)
    };

    for (series, color) in [(train, TRAIN_COLOR), (validation, VALIDATION_COLOR)] {
        let points: Vec<_> = series
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_finite())
            .map(|(i, &v)| to_point(i, v))
            .collect();

        for pair in points.windows(2) {
            draw_line_segment_mut(&mut chart, pair[0], pair[1], color);
        }
        for &(x, y) in &points {
            draw_filled_circle_mut(&mut chart, (x.round() as i32, y.round() as i32), 3, color);
        }
    }

    let font = font();
    if let Some(font) = &font {
        draw_text_mut(
            &mut chart,
            AXIS,
            MARGIN as i32,
            10,
            TITLE_SCALE,
            font,
            "Training and Validation Loss",
        );
    }

    let legend_x = width.saturating_sub(MARGIN + LEGEND_WIDTH) as i32;
    let legend_y = MARGIN as i32 + 6;
    let mut entries = vec![(TRAIN_COLOR, "Train Loss")];
    if !validation.is_empty() {
        entries.push((VALIDATION_COLOR, "Val Loss"));
    }
    for (row, (color, label)) in entries.into_iter().enumerate() {
        let y = legend_y + 16 * row as i32;
        draw_filled_rect_mut(&mut chart, Rect::at(legend_x, y + 3).of_size(14, 8), color);
        if let Some(font) = &font {
            draw_text_mut(&mut chart, AXIS, legend_x + 20, y, LABEL_SCALE, font, label);
        }
    }

    chart
}

/// Grid with the originals in the top row and their reconstructions below.
///
/// # Errors
///
/// Fails if the rows are empty, differ in length, or contain images of
/// different sizes.
pub fn comparison_grid(originals: &[RgbImage], reconstructions: &[RgbImage]) -> Result<RgbImage> {
    ensure!(!originals.is_empty(), "no images to compare");
    ensure!(
        originals.len() == reconstructions.len(),
        "{} originals but {} reconstructions",
        originals.len(),
        reconstructions.len()
    );

    let (cell_w, cell_h) = originals[0].dimensions();
    ensure!(
        originals
            .iter()
            .chain(reconstructions)
            .all(|image| image.dimensions() == (cell_w, cell_h)),
        "all images must be {cell_w}x{cell_h}"
    );

    let columns = originals.len() as u32;
    let mut grid = RgbImage::new(cell_w * columns, cell_h * 2);
    for (i, (original, reconstruction)) in originals.iter().zip(reconstructions).enumerate() {
        let x = i64::from(cell_w) * i as i64;
        imageops::replace(&mut grid, original, x, 0);
        imageops::replace(&mut grid, reconstruction, x, i64::from(cell_h));
    }
    Ok(grid)
}

/// [`comparison_grid`] with a caption strip above each row: "Real (Test)"
/// over the originals and "Reconstructed" over the reconstructions.
///
/// # Errors
///
/// Fails under the same conditions as [`comparison_grid`].
pub fn captioned_comparison(
    originals: &[RgbImage],
    reconstructions: &[RgbImage],
) -> Result<RgbImage> {
    let grid = comparison_grid(originals, reconstructions)?;
    let (width, height) = grid.dimensions();
    let cell_h = height / 2;

    let mut canvas = RgbImage::from_pixel(width, height + 2 * CAPTION_HEIGHT, BACKGROUND);
    let rows = [(0, "Real (Test)"), (1, "Reconstructed")];
    for (row, caption) in rows {
        let strip_y = row * (cell_h + CAPTION_HEIGHT);
        let row_view = imageops::crop_imm(&grid, 0, row * cell_h, width, cell_h).to_image();
        imageops::replace(&mut canvas, &row_view, 0, i64::from(strip_y + CAPTION_HEIGHT));

        if let Some(font) = font() {
            let (text_w, text_h) = text_size(LABEL_SCALE, &font, caption);
            let x = width.saturating_sub(text_w) / 2;
            let y = strip_y + CAPTION_HEIGHT.saturating_sub(text_h) / 2;
            draw_text_mut(&mut canvas, AXIS, x as i32, y as i32, LABEL_SCALE, &font, caption);
        }
    }
    Ok(canvas)
}
