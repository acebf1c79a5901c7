//! # Letterbox resizing
//!
//! Scales an image to fit inside a target canvas without distortion and
//! centers it on a black background. Downscaling uses area averaging, where
//! each output pixel is the coverage-weighted mean of the source pixels its
//! footprint overlaps. Upscaling interpolates linearly.

use image::{imageops, DynamicImage, Rgb, RgbImage};
use tracing::trace;

use crate::image::{ImageError, ImageResult};

/// Where the scaled content sits inside the letterboxed canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LetterboxPlacement {
    /// Left offset of the content.
    pub dx: u32,
    /// Top offset of the content.
    pub dy: u32,
    /// Width of the scaled content.
    pub width: u32,
    /// Height of the scaled content.
    pub height: u32,
}

impl LetterboxPlacement {
    /// Computes the placement of a `src_width x src_height` image inside a
    /// `target_width x target_height` canvas.
    ///
    /// # Errors
    ///
    /// Returns an error if either size has a zero side.
    pub fn compute(
        src_width: u32,
        src_height: u32,
        target_width: u32,
        target_height: u32,
    ) -> ImageResult<Self> {
        if src_width == 0 || src_height == 0 {
            return Err(ImageError::EmptyImage {
                width: src_width,
                height: src_height,
            });
        }
        if target_width == 0 || target_height == 0 {
            return Err(ImageError::InvalidTargetSize {
                width: target_width,
                height: target_height,
            });
        }

        let scale = f64::min(
            f64::from(target_width) / f64::from(src_width),
            f64::from(target_height) / f64::from(src_height),
        );
        let width = scaled_side(src_width, scale, target_width);
        let height = scaled_side(src_height, scale, target_height);

        Ok(Self {
            dx: (target_width - width) / 2,
            dy: (target_height - height) / 2,
            width,
            height,
        })
    }

    /// Number of canvas pixels covered by the content.
    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Whether the canvas pixel `(x, y)` lies inside the content rectangle.
    pub const fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.dx && x < self.dx + self.width && y >= self.dy && y < self.dy + self.height
    }
}

fn scaled_side(side: u32, scale: f64, limit: u32) -> u32 {
    let scaled = (f64::from(side) * scale).round() as u32;
    scaled.clamp(1, limit)
}

/// Letterboxes an RGB image into a `target_width x target_height` canvas.
///
/// # Errors
///
/// Returns an error if the source image is empty or the target has a zero side.
pub fn letterbox(image: &RgbImage, target_width: u32, target_height: u32) -> ImageResult<RgbImage> {
    let (src_width, src_height) = image.dimensions();
    let placement =
        LetterboxPlacement::compute(src_width, src_height, target_width, target_height)?;

    trace!(
        src_width,
        src_height,
        target_width,
        target_height,
        ?placement,
        "letterboxing image"
    );

    let resized = resize_area(image, placement.width, placement.height)?;
    if placement.width == target_width && placement.height == target_height {
        return Ok(resized);
    }

    let mut canvas = RgbImage::from_pixel(target_width, target_height, Rgb([0, 0, 0]));
    imageops::replace(
        &mut canvas,
        &resized,
        i64::from(placement.dx),
        i64::from(placement.dy),
    );
    Ok(canvas)
}

/// Letterboxes any decoded image, discarding alpha.
pub fn letterbox_dynamic(
    image: &DynamicImage,
    target_width: u32,
    target_height: u32,
) -> ImageResult<RgbImage> {
    letterbox(&image.to_rgb8(), target_width, target_height)
}

/// Resamples `image` to `width x height`.
///
/// Axes that shrink use area averaging, axes that grow use linear
/// interpolation with half-pixel centers. Resampling to the same size
/// returns an exact copy.
///
/// # Errors
///
/// Returns an error if the source image is empty or the target has a zero side.
pub fn resize_area(image: &RgbImage, width: u32, height: u32) -> ImageResult<RgbImage> {
    let (src_width, src_height) = image.dimensions();
    if src_width == 0 || src_height == 0 {
        return Err(ImageError::EmptyImage {
            width: src_width,
            height: src_height,
        });
    }
    if width == 0 || height == 0 {
        return Err(ImageError::InvalidTargetSize { width, height });
    }
    if (src_width, src_height) == (width, height) {
        return Ok(image.clone());
    }

    let x_weights = axis_weights(src_width as usize, width as usize);
    let y_weights = axis_weights(src_height as usize, height as usize);
    let src = image.as_raw();
    let (src_w, dst_w, dst_h) = (src_width as usize, width as usize, height as usize);

    // Horizontal pass: src_height rows of dst_w pixels.
    let mut horizontal = vec![0.0f32; dst_w * src_height as usize * 3];
    for y in 0..src_height as usize {
        let row = &src[y * src_w * 3..(y + 1) * src_w * 3];
        for (x, taps) in x_weights.iter().enumerate() {
            let out = &mut horizontal[(y * dst_w + x) * 3..(y * dst_w + x) * 3 + 3];
            for &(sx, weight) in taps {
                for c in 0..3 {
                    out[c] += f32::from(row[sx * 3 + c]) * weight;
                }
            }
        }
    }

    // Vertical pass.
    let mut output = Vec::with_capacity(dst_w * dst_h * 3);
    for taps in &y_weights {
        for x in 0..dst_w {
            let mut acc = [0.0f32; 3];
            for &(sy, weight) in taps {
                let px = &horizontal[(sy * dst_w + x) * 3..(sy * dst_w + x) * 3 + 3];
                for c in 0..3 {
                    acc[c] += px[c] * weight;
                }
            }
            output.extend(acc.iter().map(|v| v.round().clamp(0.0, 255.0) as u8));
        }
    }

    RgbImage::from_raw(width, height, output).ok_or_else(|| ImageError::BufferCreationError {
        reason: "Failed to create resized image buffer".to_string(),
    })
}

/// For every destination index, the source indices and weights that feed it.
/// Weights for one destination index sum to 1.
fn axis_weights(src: usize, dst: usize) -> Vec<Vec<(usize, f32)>> {
    let scale = src as f64 / dst as f64;

    (0..dst)
        .map(|i| {
            if dst <= src {
                let start = i as f64 * scale;
                let end = (i + 1) as f64 * scale;
                let first = start.floor() as usize;
                let last = (end.ceil() as usize).min(src);

                (first..last)
                    .filter_map(|j| {
                        let overlap = end.min((j + 1) as f64) - start.max(j as f64);
                        (overlap > 1e-9).then(|| (j, (overlap / scale) as f32))
                    })
                    .collect()
            } else {
                let center = ((i as f64 + 0.5) * scale - 0.5).clamp(0.0, (src - 1) as f64);
                let j0 = center.floor() as usize;
                let j1 = (j0 + 1).min(src - 1);
                let t = (center - j0 as f64) as f32;

                if j0 == j1 || t == 0.0 {
                    vec![(j0, 1.0)]
                } else {
                    vec![(j0, 1.0 - t), (j1, t)]
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    #[test]
    fn output_has_exact_target_size() {
        for (w, h) in [(1, 1), (3, 700), (640, 480), (257, 255), (1000, 10)] {
            let out = letterbox(&gradient(w, h), 256, 256).unwrap();
            assert_eq!(out.dimensions(), (256, 256), "source {w}x{h}");
        }

        let out = letterbox(&gradient(50, 40), 120, 64).unwrap();
        assert_eq!(out.dimensions(), (120, 64));
    }

    #[test]
    fn square_input_at_target_size_is_unchanged() {
        let image = gradient(256, 256);
        let out = letterbox(&image, 256, 256).unwrap();
        assert_eq!(out, image);
    }

    #[test]
    fn letterbox_is_idempotent() {
        let once = letterbox(&gradient(300, 120), 256, 256).unwrap();
        let twice = letterbox(&once, 256, 256).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn black_input_stays_black() {
        let image = RgbImage::new(333, 97);
        let out = letterbox(&image, 256, 256).unwrap();
        assert!(out.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn wide_image_is_padded_top_and_bottom() {
        let image = RgbImage::from_pixel(100, 50, Rgb([255, 255, 255]));
        let placement = LetterboxPlacement::compute(100, 50, 256, 256).unwrap();
        assert_eq!(
            placement,
            LetterboxPlacement {
                dx: 0,
                dy: 64,
                width: 256,
                height: 128
            }
        );

        let out = letterbox(&image, 256, 256).unwrap();
        assert_eq!(out.get_pixel(128, 63).0, [0, 0, 0]);
        assert_eq!(out.get_pixel(128, 64).0, [255, 255, 255]);
        assert_eq!(out.get_pixel(0, 128).0, [255, 255, 255]);
        assert_eq!(out.get_pixel(255, 191).0, [255, 255, 255]);
        assert_eq!(out.get_pixel(128, 192).0, [0, 0, 0]);
    }

    #[test]
    fn tall_image_is_padded_left_and_right() {
        let image = RgbImage::from_pixel(50, 100, Rgb([255, 255, 255]));
        let placement = LetterboxPlacement::compute(50, 100, 256, 256).unwrap();
        assert_eq!((placement.dx, placement.dy), (64, 0));
        assert_eq!((placement.width, placement.height), (128, 256));

        let out = letterbox(&image, 256, 256).unwrap();
        assert_eq!(out.get_pixel(63, 128).0, [0, 0, 0]);
        assert_eq!(out.get_pixel(64, 0).0, [255, 255, 255]);
        assert_eq!(out.get_pixel(191, 255).0, [255, 255, 255]);
        assert_eq!(out.get_pixel(192, 128).0, [0, 0, 0]);
    }

    #[test]
    fn aspect_ratio_is_preserved_within_rounding() {
        for (w, h) in [(300, 170), (17, 999), (640, 481), (1920, 1080)] {
            let p = LetterboxPlacement::compute(w, h, 256, 256).unwrap();
            let aspect = f64::from(w) / f64::from(h);
            if w >= h {
                assert_eq!(p.width, 256, "{w}x{h}");
                let expected = 256.0 / aspect;
                assert!(
                    (f64::from(p.height) - expected).abs() <= 1.0,
                    "{w}x{h} -> height {} instead of {expected:.2}",
                    p.height
                );
            } else {
                assert_eq!(p.height, 256, "{w}x{h}");
                let expected = 256.0 * aspect;
                assert!(
                    (f64::from(p.width) - expected).abs() <= 1.0,
                    "{w}x{h} -> width {} instead of {expected:.2}",
                    p.width
                );
            }
        }
    }

    #[test]
    fn placement_covers_exactly_the_content_pixels() {
        let image = RgbImage::from_pixel(90, 30, Rgb([255, 255, 255]));
        let placement = LetterboxPlacement::compute(90, 30, 60, 60).unwrap();
        let out = letterbox(&image, 60, 60).unwrap();

        assert_eq!(placement.area(), 60 * 20);
        for (x, y, pixel) in out.enumerate_pixels() {
            let expected = if placement.contains(x, y) { 255 } else { 0 };
            assert_eq!(pixel.0, [expected; 3], "({x}, {y})");
        }
    }

    #[test]
    fn tiny_side_is_clamped_to_one_pixel() {
        let p = LetterboxPlacement::compute(2000, 1, 256, 256).unwrap();
        assert_eq!(p.width, 256);
        assert_eq!(p.height, 1);
        assert_eq!(p.dy, 127);
    }

    #[test]
    fn area_downscale_averages_blocks() {
        let image = RgbImage::from_fn(4, 2, |x, _| {
            if x % 2 == 0 {
                Rgb([0, 0, 0])
            } else {
                Rgb([200, 100, 50])
            }
        });

        let out = resize_area(&image, 2, 1).unwrap();

        assert_eq!(out.get_pixel(0, 0).0, [100, 50, 25]);
        assert_eq!(out.get_pixel(1, 0).0, [100, 50, 25]);
    }

    #[test]
    fn area_weights_sum_to_one() {
        for (src, dst) in [(10, 3), (7, 7), (3, 10), (256, 255), (1, 5)] {
            for taps in axis_weights(src, dst) {
                let sum: f32 = taps.iter().map(|(_, w)| w).sum();
                assert!((sum - 1.0).abs() < 1e-5, "{src}->{dst}: {sum}");
            }
        }
    }

    #[test]
    fn zero_sizes_are_rejected() {
        assert!(matches!(
            letterbox(&RgbImage::new(0, 10), 256, 256),
            Err(ImageError::EmptyImage { .. })
        ));
        assert!(matches!(
            letterbox(&gradient(10, 10), 0, 256),
            Err(ImageError::InvalidTargetSize { .. })
        ));
    }

    #[test]
    fn dynamic_images_drop_alpha() {
        let rgba = image::RgbaImage::from_pixel(8, 4, image::Rgba([10, 20, 30, 0]));
        let out = letterbox_dynamic(&DynamicImage::ImageRgba8(rgba), 8, 8).unwrap();

        assert_eq!(out.get_pixel(4, 4).0, [10, 20, 30]);
        assert_eq!(out.get_pixel(4, 0).0, [0, 0, 0]);
    }
}
