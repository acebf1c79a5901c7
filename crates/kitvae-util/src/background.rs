//! # Background removal
//!
//! A [`BackgroundRemover`] turns an image into RGBA where background pixels
//! carry alpha 0. Removers are ordinary values passed around by reference, so
//! a heavy segmentation model is loaded once by the caller and reused for a
//! whole directory.
//!
//! [`composite_on_black`] then flattens the result onto an opaque black canvas,
//! which is the form every downstream stage expects.

use std::marker::PhantomData;

use burn::{prelude::*, tensor::activation::sigmoid};
use image::{imageops, DynamicImage, GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};
use imageproc::region_labelling::{connected_components, Connectivity};
use tracing::debug;

use crate::image::{
    apply_imagenet_normalization, rgb_image_to_tensor, tensor_to_gray_image, ImageError,
    ImageResult,
};

/// Separates foreground from background.
pub trait BackgroundRemover {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Returns an RGBA image of the same size whose background has alpha 0.
    fn remove_background(&self, image: &DynamicImage) -> ImageResult<RgbaImage>;
}

/// Removes a flat studio backdrop.
///
/// The backdrop color is the per-channel median of the outermost pixel ring.
/// Pixels within `tolerance` (Euclidean RGB distance) of that color and
/// connected to the image border become transparent. Foreground pixels that
/// touch the removed region get an alpha ramp over `feather` distance units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BorderKeyRemover {
    tolerance: f32,
    feather: f32,
}

impl Default for BorderKeyRemover {
    fn default() -> Self {
        Self {
            tolerance: 40.0,
            feather: 20.0,
        }
    }
}

impl BorderKeyRemover {
    pub const fn new(tolerance: f32, feather: f32) -> Self {
        Self { tolerance, feather }
    }

    /// Median color of the image border.
    pub fn backdrop_color(image: &RgbImage) -> Rgb<u8> {
        let (width, height) = image.dimensions();
        let mut channels: [Vec<u8>; 3] = Default::default();

        for (x, y, pixel) in image.enumerate_pixels() {
            if x == 0 || y == 0 || x + 1 == width || y + 1 == height {
                for (c, values) in channels.iter_mut().enumerate() {
                    values.push(pixel[c]);
                }
            }
        }

        let median = |values: &mut Vec<u8>| {
            values.sort_unstable();
            values.get(values.len() / 2).copied().unwrap_or(0)
        };
        Rgb([
            median(&mut channels[0]),
            median(&mut channels[1]),
            median(&mut channels[2]),
        ])
    }

    /// Computes the alpha mask for `image`: 0 for background, 255 for foreground.
    pub fn alpha_mask(&self, image: &RgbImage) -> ImageResult<GrayImage> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(ImageError::EmptyImage { width, height });
        }

        let backdrop = Self::backdrop_color(image);
        let distance = |p: &Rgb<u8>| -> f32 {
            p.0.iter()
                .zip(backdrop.0.iter())
                .map(|(&a, &b)| {
                    let d = f32::from(a) - f32::from(b);
                    d * d
                })
                .sum::<f32>()
                .sqrt()
        };

        let candidates = GrayImage::from_fn(width, height, |x, y| {
            if distance(image.get_pixel(x, y)) <= self.tolerance {
                Luma([255])
            } else {
                Luma([0])
            }
        });

        let labels = connected_components(&candidates, Connectivity::Four, Luma([0u8]));
        let mut border_labels = std::collections::HashSet::new();
        for (x, y, label) in labels.enumerate_pixels() {
            if label[0] != 0 && (x == 0 || y == 0 || x + 1 == width || y + 1 == height) {
                border_labels.insert(label[0]);
            }
        }

        let is_background = |x: u32, y: u32| border_labels.contains(&labels.get_pixel(x, y)[0]);

        let mask = GrayImage::from_fn(width, height, |x, y| {
            if is_background(x, y) {
                return Luma([0]);
            }

            let touches_background = (x > 0 && is_background(x - 1, y))
                || (y > 0 && is_background(x, y - 1))
                || (x + 1 < width && is_background(x + 1, y))
                || (y + 1 < height && is_background(x, y + 1));
            if !touches_background || self.feather <= 0.0 {
                return Luma([255]);
            }

            let ramp = (distance(image.get_pixel(x, y)) - self.tolerance) / self.feather;
            Luma([(ramp.clamp(0.0, 1.0) * 255.0).round() as u8])
        });

        debug!(
            backdrop = ?backdrop.0,
            regions = border_labels.len(),
            "computed border-keyed alpha mask"
        );
        Ok(mask)
    }
}

impl BackgroundRemover for BorderKeyRemover {
    fn name(&self) -> &str {
        "border-key"
    }

    fn remove_background(&self, image: &DynamicImage) -> ImageResult<RgbaImage> {
        let rgba = image.to_rgba8();
        let mask = self.alpha_mask(&image.to_rgb8())?;

        // Keep any transparency the source already had.
        Ok(RgbaImage::from_fn(rgba.width(), rgba.height(), |x, y| {
            let Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
            Rgba([r, g, b, a.min(mask.get_pixel(x, y)[0])])
        }))
    }
}

/// A segmentation network predicting foreground logits.
pub trait MaskModel<B: Backend> {
    /// Square input resolution the network expects.
    fn input_size(&self) -> u32;

    /// `[1, 3, S, S]` ImageNet-normalized images to `[1, 1, S, S]` logits.
    fn forward_mask(&self, images: Tensor<B, 4>) -> Tensor<B, 4>;
}

/// Background remover backed by a learned matting model.
#[derive(Debug)]
pub struct MaskModelRemover<B: Backend, M: MaskModel<B>> {
    model: M,
    device: B::Device,
    name: String,
    _backend: PhantomData<B>,
}

impl<B: Backend, M: MaskModel<B>> MaskModelRemover<B, M> {
    pub fn new(model: M, device: B::Device, name: impl Into<String>) -> Self {
        Self {
            model,
            device,
            name: name.into(),
            _backend: PhantomData,
        }
    }

    /// Predicts the alpha mask at the original resolution.
    pub fn predict_mask(&self, image: &RgbImage) -> ImageResult<GrayImage> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(ImageError::EmptyImage { width, height });
        }

        let size = self.model.input_size();
        let resized = imageops::resize(image, size, size, imageops::FilterType::Triangle);
        let input = apply_imagenet_normalization(rgb_image_to_tensor::<B>(&resized, &self.device));

        let mask = sigmoid(self.model.forward_mask(input));
        let mask = tensor_to_gray_image(mask)?;

        Ok(imageops::resize(
            &mask,
            width,
            height,
            imageops::FilterType::Triangle,
        ))
    }
}

impl<B: Backend, M: MaskModel<B>> BackgroundRemover for MaskModelRemover<B, M> {
    fn name(&self) -> &str {
        &self.name
    }

    fn remove_background(&self, image: &DynamicImage) -> ImageResult<RgbaImage> {
        let rgb = image.to_rgb8();
        let mask = self.predict_mask(&rgb)?;
        apply_alpha_mask(&rgb, &mask)
    }
}

/// Attaches `mask` as the alpha channel of `image`.
///
/// # Errors
///
/// Returns `ImageError::DimensionMismatch` if the sizes differ.
pub fn apply_alpha_mask(image: &RgbImage, mask: &GrayImage) -> ImageResult<RgbaImage> {
    if image.dimensions() != mask.dimensions() {
        return Err(ImageError::DimensionMismatch {
            image_width: image.width(),
            image_height: image.height(),
            mask_width: mask.width(),
            mask_height: mask.height(),
        });
    }

    Ok(RgbaImage::from_fn(image.width(), image.height(), |x, y| {
        let Rgb([r, g, b]) = *image.get_pixel(x, y);
        Rgba([r, g, b, mask.get_pixel(x, y)[0]])
    }))
}

/// Flattens an RGBA image onto opaque black: `out = fg * alpha / 255`.
pub fn composite_on_black(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let Rgba([r, g, b, a]) = *image.get_pixel(x, y);
        let scale = |v: u8| ((u16::from(v) * u16::from(a) + 127) / 255) as u8;
        Rgb([scale(r), scale(g), scale(b)])
    })
}

/// Removes the background and composites the result onto black.
pub fn remove_background_to_black(
    remover: &dyn BackgroundRemover,
    image: &DynamicImage,
) -> ImageResult<RgbImage> {
    let rgba = remover.remove_background(image)?;
    Ok(composite_on_black(&rgba))
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;

    use super::*;

    type TestBackend = NdArray<f32>;

    /// Predicts foreground wherever the normalized input is bright.
    struct BrightnessModel;

    impl MaskModel<TestBackend> for BrightnessModel {
        fn input_size(&self) -> u32 {
            8
        }

        fn forward_mask(&self, images: Tensor<TestBackend, 4>) -> Tensor<TestBackend, 4> {
            images.mean_dim(1).mul_scalar(20.0)
        }
    }

    fn shirt_on_white() -> RgbImage {
        RgbImage::from_fn(40, 40, |x, y| {
            if (10..30).contains(&x) && (10..30).contains(&y) {
                Rgb([200, 20, 20])
            } else {
                Rgb([250, 250, 250])
            }
        })
    }

    #[test]
    fn backdrop_color_is_border_median() {
        let mut image = shirt_on_white();
        image.put_pixel(0, 0, Rgb([0, 0, 0]));

        assert_eq!(BorderKeyRemover::backdrop_color(&image), Rgb([250, 250, 250]));
    }

    #[test]
    fn border_key_clears_flat_backdrop() {
        let remover = BorderKeyRemover::default();
        let rgba = remover
            .remove_background(&DynamicImage::ImageRgb8(shirt_on_white()))
            .unwrap();

        assert_eq!(rgba.dimensions(), (40, 40));
        assert_eq!(rgba.get_pixel(2, 2)[3], 0);
        assert_eq!(rgba.get_pixel(39, 20)[3], 0);
        assert_eq!(rgba.get_pixel(20, 20)[3], 255);
        assert_eq!(rgba.get_pixel(20, 20).0[..3], [200, 20, 20]);
    }

    #[test]
    fn enclosed_backdrop_colored_region_is_kept() {
        // A white logo inside the shirt is not connected to the border.
        let mut image = shirt_on_white();
        for x in 18..22 {
            for y in 18..22 {
                image.put_pixel(x, y, Rgb([250, 250, 250]));
            }
        }

        let mask = BorderKeyRemover::default().alpha_mask(&image).unwrap();

        assert_eq!(mask.get_pixel(20, 20)[0], 255);
        assert_eq!(mask.get_pixel(5, 5)[0], 0);
    }

    #[test]
    fn edge_pixels_close_to_backdrop_are_feathered() {
        let mut image = shirt_on_white();
        // Slightly off-white edge: distance ~51.96 from the backdrop.
        for y in 10..30 {
            image.put_pixel(10, y, Rgb([220, 220, 220]));
        }

        let mask = BorderKeyRemover::new(40.0, 20.0).alpha_mask(&image).unwrap();
        let edge = mask.get_pixel(10, 20)[0];

        assert!(edge > 0 && edge < 255, "edge alpha {edge}");
        assert_eq!(mask.get_pixel(11, 20)[0], 255);
    }

    #[test]
    fn existing_transparency_is_preserved() {
        let mut rgba = DynamicImage::ImageRgb8(shirt_on_white()).to_rgba8();
        rgba.put_pixel(20, 20, Rgba([200, 20, 20, 10]));

        let out = BorderKeyRemover::default()
            .remove_background(&DynamicImage::ImageRgba8(rgba))
            .unwrap();

        assert_eq!(out.get_pixel(20, 20)[3], 10);
    }

    #[test]
    fn empty_image_is_rejected() {
        let remover = BorderKeyRemover::default();
        assert!(matches!(
            remover.alpha_mask(&RgbImage::new(0, 0)),
            Err(ImageError::EmptyImage { .. })
        ));
    }

    #[test]
    fn composite_scales_by_alpha() {
        let mut rgba = RgbaImage::new(3, 1);
        rgba.put_pixel(0, 0, Rgba([200, 100, 50, 255]));
        rgba.put_pixel(1, 0, Rgba([200, 100, 50, 0]));
        rgba.put_pixel(2, 0, Rgba([200, 100, 50, 128]));

        let out = composite_on_black(&rgba);

        assert_eq!(out.get_pixel(0, 0).0, [200, 100, 50]);
        assert_eq!(out.get_pixel(1, 0).0, [0, 0, 0]);
        assert_eq!(out.get_pixel(2, 0).0, [100, 50, 25]);
    }

    #[test]
    fn apply_alpha_mask_checks_dimensions() {
        let image = RgbImage::new(4, 4);
        let mask = GrayImage::new(4, 3);

        assert!(matches!(
            apply_alpha_mask(&image, &mask),
            Err(ImageError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn mask_model_remover_keeps_bright_half() {
        let image = RgbImage::from_fn(32, 16, |x, _| {
            if x < 16 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });
        let remover =
            MaskModelRemover::<TestBackend, _>::new(BrightnessModel, Default::default(), "stub");

        let rgba = remover
            .remove_background(&DynamicImage::ImageRgb8(image))
            .unwrap();

        assert_eq!(remover.name(), "stub");
        assert_eq!(rgba.dimensions(), (32, 16));
        assert!(rgba.get_pixel(2, 8)[3] > 200);
        assert!(rgba.get_pixel(29, 8)[3] < 50);
    }

    #[test]
    fn removal_to_black_blackens_backdrop() {
        let remover = BorderKeyRemover::default();
        let out =
            remove_background_to_black(&remover, &DynamicImage::ImageRgb8(shirt_on_white()))
                .unwrap();

        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(out.get_pixel(20, 20).0, [200, 20, 20]);
    }
}
