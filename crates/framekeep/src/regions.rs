//! Fixed regions given as percentages of the image size.
//!
//! Stands in for a learned detector: each image gets the same relative
//! boxes, scaled to its own dimensions.

use std::str::FromStr;

use framekeep_pipeline::{Bounds, Detector, Dimensions, Rect};
use image::RgbaImage;

/// A rectangle as fractions (0.0-1.0) of image width and height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelativeRegion {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl RelativeRegion {
    /// Scale to pixel coordinates for an image of `size`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_rect(self, size: Dimensions) -> Rect {
        let w = f64::from(size.width);
        let h = f64::from(size.height);
        Rect::new(
            (self.x * w).round() as i32,
            (self.y * h).round() as i32,
            (self.width * w).round() as i32,
            (self.height * h).round() as i32,
        )
    }
}

impl FromStr for RelativeRegion {
    type Err = String;

    /// Parse `"X,Y,W,H"`, each a percentage in `0..=100`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let [x, y, width, height] = parts.as_slice() else {
            return Err(format!("region must be 'X,Y,W,H', got: '{s}'"));
        };

        let region = Self {
            x: percent("X", x)?,
            y: percent("Y", y)?,
            width: percent("W", width)?,
            height: percent("H", height)?,
        };
        if region.width <= 0.0 || region.height <= 0.0 {
            return Err(format!("region '{s}' has zero area"));
        }
        Ok(region)
    }
}

/// Parse one percentage and convert it to a fraction.
fn percent(name: &str, value: &str) -> Result<f64, String> {
    let v: f64 = value
        .parse()
        .map_err(|e| format!("invalid region {name} '{value}': {e}"))?;
    if !(0.0..=100.0).contains(&v) {
        return Err(format!("region {name} must be within 0-100, got {v}"));
    }
    Ok(v / 100.0)
}

/// Detector that reports the same relative regions for every image.
#[derive(Debug, Clone)]
pub struct FractionalRegions {
    regions: Vec<RelativeRegion>,
}

impl FractionalRegions {
    pub const fn new(regions: Vec<RelativeRegion>) -> Self {
        Self { regions }
    }
}

impl Detector<RgbaImage> for FractionalRegions {
    fn detect(&mut self, item: &RgbaImage) -> Vec<Rect> {
        let size = item.bounds();
        self.regions.iter().map(|region| region.to_rect(size)).collect()
    }
}
