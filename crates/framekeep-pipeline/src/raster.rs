//! Concrete collaborators for RGBA rasters.
//!
//! [`RasterCodec`] reads and writes [`RgbaImage`]s through the `image`
//! crate. The region filters edit a rectangle of an image in place and
//! are shaped to be passed straight to
//! [`RegionOverlay::process_region`](crate::RegionOverlay::process_region).
//!
//! # Strategy pattern
//!
//! [`RegionFilter`] is the trait; [`RegionFilterKind`] selects an
//! implementation at runtime and carries its parameters, so a batch run
//! can be configured from JSON or the command line.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageBuffer, ImageFormat, Luma, Pixel, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::codec::Codec;
use crate::types::{Bounds, Dimensions, PipelineError, Rect};

impl<P: Pixel> Bounds for ImageBuffer<P, Vec<P::Subpixel>> {
    fn bounds(&self) -> Dimensions {
        let (width, height) = self.dimensions();
        Dimensions::new(width, height)
    }
}

/// File codec for [`RgbaImage`].
///
/// The format is chosen from the file extension on both read and write.
/// JPEG output drops the alpha channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterCodec;

impl Codec<RgbaImage> for RasterCodec {
    fn decode(&self, path: &Path) -> Result<RgbaImage, PipelineError> {
        let image = image::open(path).map_err(|e| PipelineError::codec(path, e))?;
        Ok(image.to_rgba8())
    }

    fn encode(&self, path: &Path, item: &RgbaImage) -> Result<(), PipelineError> {
        let format = ImageFormat::from_path(path).map_err(|e| PipelineError::codec(path, e))?;
        let result = if format == ImageFormat::Jpeg {
            DynamicImage::ImageRgba8(item.clone())
                .into_rgb8()
                .save_with_format(path, format)
        } else {
            item.save_with_format(path, format)
        };
        result.map_err(|e| PipelineError::codec(path, e))
    }
}

/// An in-place edit confined to one rectangle of an image.
pub trait RegionFilter {
    /// Edit the pixels of `image` inside `region`. The region is clipped
    /// to the image first; an empty result leaves the image unchanged.
    fn apply(&self, image: &mut RgbaImage, region: Rect);
}

/// Selects a region filter and its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegionFilterKind {
    /// Per-channel Gaussian blur.
    GaussianBlur {
        /// Standard deviation in pixels. Non-positive values are a no-op.
        sigma: f32,
    },
    /// Median blur over a square window.
    MedianBlur {
        /// Window radius in pixels. Zero is a no-op.
        radius: u32,
    },
    /// Mosaic of square blocks.
    Pixelate {
        /// Block edge in pixels. Values below 2 are a no-op.
        block: u32,
    },
    /// Solid color.
    Fill {
        /// RGBA fill color.
        color: [u8; 4],
    },
}

impl RegionFilterKind {
    /// Default Gaussian sigma: strong enough to hide faces at typical
    /// photo resolutions.
    pub const DEFAULT_SIGMA: f32 = 80.0;

    /// Default median radius (a 55 pixel window).
    pub const DEFAULT_MEDIAN_RADIUS: u32 = 27;

    /// Default pixelation block edge.
    pub const DEFAULT_BLOCK: u32 = 12;

    /// Default fill color, opaque black.
    pub const DEFAULT_FILL_COLOR: [u8; 4] = [0, 0, 0, 255];

    /// Gaussian blur with [`DEFAULT_SIGMA`](Self::DEFAULT_SIGMA).
    pub const DEFAULT_GAUSSIAN: Self = Self::GaussianBlur {
        sigma: Self::DEFAULT_SIGMA,
    };

    /// Median blur with [`DEFAULT_MEDIAN_RADIUS`](Self::DEFAULT_MEDIAN_RADIUS).
    pub const DEFAULT_MEDIAN: Self = Self::MedianBlur {
        radius: Self::DEFAULT_MEDIAN_RADIUS,
    };

    /// Pixelation with [`DEFAULT_BLOCK`](Self::DEFAULT_BLOCK).
    pub const DEFAULT_PIXELATE: Self = Self::Pixelate {
        block: Self::DEFAULT_BLOCK,
    };

    /// Fill with [`DEFAULT_FILL_COLOR`](Self::DEFAULT_FILL_COLOR).
    pub const DEFAULT_FILL: Self = Self::Fill {
        color: Self::DEFAULT_FILL_COLOR,
    };

    /// Short lowercase name, used for output subdirectories.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::GaussianBlur { .. } => "gaussian",
            Self::MedianBlur { .. } => "median",
            Self::Pixelate { .. } => "pixelate",
            Self::Fill { .. } => "fill",
        }
    }
}

impl RegionFilter for RegionFilterKind {
    fn apply(&self, image: &mut RgbaImage, region: Rect) {
        match *self {
            Self::GaussianBlur { sigma } => gaussian_blur_region(image, region, sigma),
            Self::MedianBlur { radius } => median_blur_region(image, region, radius),
            Self::Pixelate { block } => pixelate_region(image, region, block),
            Self::Fill { color } => fill_region(image, region, Rgba(color)),
        }
    }
}

/// `region` clipped to `image` as `(x, y, width, height)`, or `None` if
/// nothing is left.
fn clip(image: &RgbaImage, region: Rect) -> Option<(u32, u32, u32, u32)> {
    let clipped = region.intersect(Rect::full_frame(image.bounds()));
    if clipped.is_empty() {
        return None;
    }
    Some((
        clipped.x.unsigned_abs(),
        clipped.y.unsigned_abs(),
        clipped.width.unsigned_abs(),
        clipped.height.unsigned_abs(),
    ))
}

/// Run `f` on a copy of the clipped region and paste the result back.
fn edit_region<F>(image: &mut RgbaImage, region: Rect, f: F)
where
    F: FnOnce(&RgbaImage) -> RgbaImage,
{
    let Some((x, y, width, height)) = clip(image, region) else {
        return;
    };
    let patch = imageops::crop_imm(&*image, x, y, width, height).to_image();
    let edited = f(&patch);
    imageops::replace(image, &edited, i64::from(x), i64::from(y));
}

/// Return a copy of `image` with `f` applied to each of `regions`.
///
/// Each rectangle is clipped to the frame; rectangles with nothing left
/// are skipped. `f` maps a cropped patch to its replacement, which is
/// pasted back at the clipped origin. Regions are applied in order, so
/// overlapping ones see earlier edits.
///
/// Pairs with [`Pipeline::process`](crate::Pipeline::process) when no
/// [`RegionOverlay`](crate::RegionOverlay) is involved:
///
/// ```ignore
/// pipeline.process(key, |img| apply_filter_to_regions(img, &faces, invert))?;
/// ```
#[must_use]
pub fn apply_filter_to_regions<F>(image: &RgbaImage, regions: &[Rect], mut f: F) -> RgbaImage
where
    F: FnMut(&RgbaImage) -> RgbaImage,
{
    let mut out = image.clone();
    for &region in regions {
        edit_region(&mut out, region, &mut f);
    }
    out
}

/// Gaussian-blur `region` of `image` in place.
///
/// `imageproc::filter::gaussian_blur_f32` works on single channels, so
/// the region is split into R/G/B/A planes, each blurred, then
/// reassembled. Pixels outside the region do not contribute.
pub fn gaussian_blur_region(image: &mut RgbaImage, region: Rect, sigma: f32) {
    if sigma <= 0.0 {
        return;
    }
    edit_region(image, region, |patch| {
        let (w, h) = patch.dimensions();
        let planes: [GrayImage; 4] = std::array::from_fn(|c| {
            GrayImage::from_fn(w, h, |x, y| Luma([patch.get_pixel(x, y).0[c]]))
        });
        let blurred: [GrayImage; 4] =
            std::array::from_fn(|c| imageproc::filter::gaussian_blur_f32(&planes[c], sigma));
        RgbaImage::from_fn(w, h, |x, y| {
            Rgba(std::array::from_fn(|c| blurred[c].get_pixel(x, y).0[0]))
        })
    });
}

/// Median-blur `region` of `image` in place over a
/// `(2 * radius + 1)`-pixel square window.
pub fn median_blur_region(image: &mut RgbaImage, region: Rect, radius: u32) {
    if radius == 0 {
        return;
    }
    edit_region(image, region, |patch| {
        imageproc::filter::median_filter(patch, radius, radius)
    });
}

/// Pixelate `region` of `image` in place: shrink it by `block` with
/// bilinear sampling, then scale back up with nearest-neighbour.
pub fn pixelate_region(image: &mut RgbaImage, region: Rect, block: u32) {
    if block < 2 {
        return;
    }
    edit_region(image, region, |patch| {
        let (w, h) = patch.dimensions();
        let small = imageops::resize(
            patch,
            (w / block).max(1),
            (h / block).max(1),
            FilterType::Triangle,
        );
        imageops::resize(&small, w, h, FilterType::Nearest)
    });
}

/// Paint `region` of `image` with `color`.
pub fn fill_region(image: &mut RgbaImage, region: Rect, color: Rgba<u8>) {
    let Some((x0, y0, width, height)) = clip(image, region) else {
        return;
    };
    for y in y0..y0 + height {
        for x in x0..x0 + width {
            image.put_pixel(x, y, color);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::types::ErrorKind;

    /// Vertical stripes: alternating black and white columns.
    fn stripes(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, _| {
            if x % 2 == 0 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        })
    }

    fn unchanged_outside(before: &RgbaImage, after: &RgbaImage, region: Rect) -> bool {
        before.enumerate_pixels().all(|(x, y, p)| {
            let inside = i64::from(x) >= i64::from(region.x)
                && i64::from(x) < i64::from(region.x) + i64::from(region.width)
                && i64::from(y) >= i64::from(region.y)
                && i64::from(y) < i64::from(region.y) + i64::from(region.height);
            inside || after.get_pixel(x, y) == p
        })
    }

    #[test]
    fn bounds_reports_dimensions() {
        let img = RgbaImage::new(7, 3);
        assert_eq!(img.bounds(), Dimensions::new(7, 3));
        let gray = GrayImage::new(2, 9);
        assert_eq!(gray.bounds(), Dimensions::new(2, 9));
    }

    #[test]
    fn fill_paints_only_the_region() {
        let before = stripes(10, 10);
        let mut img = before.clone();
        let region = Rect::new(2, 3, 4, 2);
        fill_region(&mut img, region, Rgba([9, 8, 7, 255]));

        assert_eq!(*img.get_pixel(2, 3), Rgba([9, 8, 7, 255]));
        assert_eq!(*img.get_pixel(5, 4), Rgba([9, 8, 7, 255]));
        assert!(unchanged_outside(&before, &img, region));
    }

    #[test]
    fn fill_clips_to_image() {
        let mut img = RgbaImage::new(4, 4);
        fill_region(&mut img, Rect::new(-10, 2, 100, 100), Rgba([1, 1, 1, 1]));
        assert_eq!(*img.get_pixel(0, 2), Rgba([1, 1, 1, 1]));
        assert_eq!(*img.get_pixel(3, 3), Rgba([1, 1, 1, 1]));
        assert_eq!(*img.get_pixel(0, 1), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn filters_ignore_empty_regions() {
        let before = stripes(8, 8);
        for kind in [
            RegionFilterKind::DEFAULT_GAUSSIAN,
            RegionFilterKind::DEFAULT_MEDIAN,
            RegionFilterKind::DEFAULT_PIXELATE,
            RegionFilterKind::DEFAULT_FILL,
        ] {
            let mut img = before.clone();
            kind.apply(&mut img, Rect::default());
            kind.apply(&mut img, Rect::new(3, 3, 0, 5));
            kind.apply(&mut img, Rect::new(20, 20, 4, 4));
            assert_eq!(img, before, "{} touched an empty region", kind.name());
        }
    }

    #[test]
    fn gaussian_smooths_inside_region_only() {
        let before = stripes(12, 12);
        let mut img = before.clone();
        let region = Rect::new(2, 2, 6, 6);
        gaussian_blur_region(&mut img, region, 2.0);

        let p = img.get_pixel(4, 4).0[0];
        assert!(p > 40 && p < 215, "expected a blended value, got {p}");
        assert!(unchanged_outside(&before, &img, region));
    }

    #[test]
    fn gaussian_non_positive_sigma_is_noop() {
        let before = stripes(6, 6);
        let mut img = before.clone();
        gaussian_blur_region(&mut img, Rect::new(0, 0, 6, 6), 0.0);
        assert_eq!(img, before);
    }

    #[test]
    fn median_removes_isolated_speck() {
        let mut img = RgbaImage::from_pixel(9, 9, Rgba([0, 0, 0, 255]));
        img.put_pixel(4, 4, Rgba([255, 255, 255, 255]));
        median_blur_region(&mut img, Rect::new(1, 1, 7, 7), 1);
        assert_eq!(*img.get_pixel(4, 4), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn pixelate_makes_uniform_blocks() {
        let before = stripes(16, 16);
        let mut img = before.clone();
        let region = Rect::new(0, 0, 8, 8);
        pixelate_region(&mut img, region, 4);

        let corner = *img.get_pixel(0, 0);
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(*img.get_pixel(x, y), corner);
            }
        }
        assert!(unchanged_outside(&before, &img, region));
    }

    #[test]
    fn pixelate_small_block_is_noop() {
        let before = stripes(6, 6);
        let mut img = before.clone();
        pixelate_region(&mut img, Rect::new(0, 0, 6, 6), 1);
        assert_eq!(img, before);
    }

    #[test]
    fn apply_to_regions_leaves_input_untouched() {
        let before = stripes(10, 10);
        let regions = [Rect::new(1, 1, 3, 3), Rect::new(8, 8, 5, 5), Rect::new(50, 0, 4, 4)];
        let mut patches = Vec::new();
        let out = apply_filter_to_regions(&before, &regions, |patch| {
            patches.push(patch.dimensions());
            RgbaImage::from_pixel(patch.width(), patch.height(), Rgba([7, 7, 7, 255]))
        });

        // The third rect is off-frame and never reaches the filter.
        assert_eq!(patches, vec![(3, 3), (2, 2)]);
        assert_eq!(before, stripes(10, 10));
        assert_eq!(*out.get_pixel(1, 1), Rgba([7, 7, 7, 255]));
        assert_eq!(*out.get_pixel(9, 9), Rgba([7, 7, 7, 255]));
        assert_eq!(out.get_pixel(0, 0), before.get_pixel(0, 0));
        assert_eq!(out.get_pixel(7, 7), before.get_pixel(7, 7));
    }

    #[test]
    fn apply_to_regions_runs_in_order() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([10, 10, 10, 255]));
        let out = apply_filter_to_regions(
            &img,
            &[Rect::new(0, 0, 2, 2), Rect::new(1, 1, 2, 2)],
            |patch| {
                RgbaImage::from_fn(patch.width(), patch.height(), |x, y| {
                    let mut p = *patch.get_pixel(x, y);
                    p.0[0] += 1;
                    p
                })
            },
        );
        assert_eq!(out.get_pixel(1, 1).0[0], 12);
        assert_eq!(out.get_pixel(0, 0).0[0], 11);
        assert_eq!(out.get_pixel(2, 2).0[0], 11);
        assert_eq!(out.get_pixel(3, 3).0[0], 10);
    }

    #[test]
    fn kind_names_and_json() {
        assert_eq!(RegionFilterKind::DEFAULT_GAUSSIAN.name(), "gaussian");
        assert_eq!(RegionFilterKind::DEFAULT_MEDIAN.name(), "median");
        assert_eq!(RegionFilterKind::DEFAULT_PIXELATE.name(), "pixelate");
        assert_eq!(RegionFilterKind::DEFAULT_FILL.name(), "fill");

        let kind: RegionFilterKind =
            serde_json::from_str(r#"{"kind":"pixelate","block":5}"#).unwrap();
        assert_eq!(kind, RegionFilterKind::Pixelate { block: 5 });
    }

    #[test]
    fn codec_round_trips_png_losslessly() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("s.png");
        let img = stripes(5, 4);
        RasterCodec.encode(&path, &img).unwrap();
        assert_eq!(RasterCodec.decode(&path).unwrap(), img);
    }

    #[test]
    fn codec_writes_jpeg_without_alpha() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("s.jpg");
        let img = RgbaImage::from_pixel(8, 8, Rgba([200, 10, 10, 128]));
        RasterCodec.encode(&path, &img).unwrap();

        let back = RasterCodec.decode(&path).unwrap();
        assert_eq!(back.dimensions(), (8, 8));
        assert_eq!(back.get_pixel(3, 3).0[3], 255);
    }

    #[test]
    fn codec_errors_are_io_kind() {
        let tmp = TempDir::new().unwrap();
        let missing = RasterCodec.decode(&tmp.path().join("none.png")).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::Io);

        let garbage = tmp.path().join("junk.png");
        std::fs::write(&garbage, b"not an image").unwrap();
        assert_eq!(RasterCodec.decode(&garbage).unwrap_err().kind(), ErrorKind::Io);

        let unknown = RasterCodec
            .encode(&tmp.path().join("x.unknownext"), &RgbaImage::new(1, 1))
            .unwrap_err();
        assert_eq!(unknown.kind(), ErrorKind::Io);
    }
}
