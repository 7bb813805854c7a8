use crate::Errors;
use anyhow::Result;
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use log::debug;

/// Bounding box in the center form (center x, center y, width, height) as produced by the
/// detector
///
#[derive(Clone, Default, Debug, Copy, PartialEq)]
pub struct CenterBox {
    pub cx: f32,
    pub cy: f32,
    pub width: f32,
    pub height: f32,
}

impl CenterBox {
    pub fn new(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self {
            cx,
            cy,
            width,
            height,
        }
    }
}

/// Pixel corners of a box clamped to an image. `x_max` and `y_max` are exclusive, so every
/// covered pixel lies in `[0, width) x [0, height)`.
///
#[derive(Clone, Default, Debug, Copy, PartialEq, Eq)]
pub struct Corners {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
}

impl Corners {
    pub fn width(&self) -> u32 {
        self.x_max.saturating_sub(self.x_min)
    }

    pub fn height(&self) -> u32 {
        self.y_max.saturating_sub(self.y_min)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// Segmentation mask of one object. A value of `255` keeps the pixel untouched, `0` removes it,
/// intermediate values scale it.
///
#[derive(Clone, Debug)]
pub struct Mask(GrayImage);

impl Mask {
    pub fn new(mask: GrayImage) -> Self {
        Self(mask)
    }

    /// Mask from a row-major boolean field
    ///
    pub fn from_binary(width: u32, height: u32, field: &[bool]) -> Result<Self> {
        let values = field.iter().map(|v| if *v { 255 } else { 0 }).collect();
        Self::from_values(width, height, values)
    }

    /// Mask from a row-major grayscale field
    ///
    pub fn from_values(width: u32, height: u32, values: Vec<u8>) -> Result<Self> {
        let len = values.len();
        GrayImage::from_raw(width, height, values)
            .map(Self)
            .ok_or_else(|| {
                Errors::InvalidConfiguration(
                    "mask",
                    format!("{} values do not fill a {}x{} field", len, width, height),
                )
                .into()
            })
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.0
    }

    /// Mask resampled to `width x height` with nearest neighbour interpolation, so the hard
    /// silhouette edges are preserved.
    ///
    pub fn resized(&self, width: u32, height: u32) -> GrayImage {
        if self.0.dimensions() == (width, height) {
            self.0.clone()
        } else {
            imageops::resize(&self.0, width, height, FilterType::Nearest)
        }
    }
}

/// Object reported by the external detector/tracker for one frame
///
#[derive(Clone, Debug)]
pub struct Detection {
    pub mask: Mask,
    pub bbox: CenterBox,
    pub track_id: u64,
}

impl Detection {
    pub fn new(mask: Mask, bbox: CenterBox, track_id: u64) -> Self {
        Self {
            mask,
            bbox,
            track_id,
        }
    }
}

fn clamp_axis(center: f32, extent: f32, limit: u32) -> (u32, u32) {
    // truncation toward zero, then clamping into [0, limit]
    let lo = (center - extent / 2.0) as i64;
    let hi = (center + extent / 2.0) as i64;
    let limit = i64::from(limit);
    let lo = lo.clamp(0, limit);
    let hi = hi.clamp(0, limit);
    (lo as u32, hi.max(lo) as u32)
}

/// Converts a center-form box into corners clamped to a `width x height` image
///
pub fn bbox_corners(bbox: &CenterBox, width: u32, height: u32) -> Corners {
    let (x_min, x_max) = clamp_axis(bbox.cx, bbox.width, width);
    let (y_min, y_max) = clamp_axis(bbox.cy, bbox.height, height);
    Corners {
        x_min,
        y_min,
        x_max,
        y_max,
    }
}

/// Multiplies the image by the mask resized to the image dimensions
///
pub fn apply_mask(image: &RgbImage, mask: &Mask) -> RgbImage {
    let (width, height) = image.dimensions();
    if mask.width() == 0 || mask.height() == 0 {
        return RgbImage::new(width, height);
    }
    let resized = mask.resized(width, height);
    let mut out = image.clone();
    for (pixel, m) in out.pixels_mut().zip(resized.pixels()) {
        let m = u16::from(m.0[0]);
        for c in pixel.0.iter_mut() {
            *c = ((u16::from(*c) * m + 127) / 255) as u8;
        }
    }
    out
}

/// Cuts the card designated by `mask` and `bbox` out of `image`.
///
/// The background outside of the silhouette is zeroed and the result is cropped to the box
/// clamped to the image. A box without area after clamping (or an empty source) produces an
/// empty image.
///
pub fn segment_card(mask: &Mask, bbox: &CenterBox, image: &RgbImage) -> RgbImage {
    let (width, height) = image.dimensions();
    let corners = bbox_corners(bbox, width, height);
    if corners.is_empty() {
        debug!(
            "Box {:?} has no area inside {}x{} image after clamping",
            bbox, width, height
        );
        return RgbImage::new(0, 0);
    }
    let masked = apply_mask(image, mask);
    imageops::crop_imm(
        &masked,
        corners.x_min,
        corners.y_min,
        corners.width(),
        corners.height(),
    )
    .to_image()
}

/// Extracts the card of a detection from the frame
///
pub fn extract_card(detection: &Detection, image: &RgbImage) -> RgbImage {
    segment_card(&detection.mask, &detection.bbox, image)
}

/// Whether an extracted region carries no pixels
///
pub fn is_empty_region(image: &RgbImage) -> bool {
    image.width() == 0 || image.height() == 0
}

#[cfg(test)]
mod tests {
    use crate::extract::{
        apply_mask, bbox_corners, is_empty_region, segment_card, CenterBox, Corners, Mask,
    };
    use crate::test_stuff::{full_mask, solid_frame};
    use anyhow::Result;
    use image::{Rgb, RgbImage};

    #[test]
    fn corners_inside_image() {
        let c = bbox_corners(&CenterBox::new(50.0, 40.0, 20.0, 10.0), 100, 80);
        assert_eq!(
            c,
            Corners {
                x_min: 40,
                y_min: 35,
                x_max: 60,
                y_max: 45
            }
        );
        assert_eq!((c.width(), c.height()), (20, 10));
    }

    #[test]
    fn corners_truncate_toward_zero() {
        let c = bbox_corners(&CenterBox::new(10.7, 10.2, 5.0, 5.0), 100, 100);
        assert_eq!((c.x_min, c.x_max), (8, 13));
        assert_eq!((c.y_min, c.y_max), (7, 12));
    }

    #[test]
    fn corners_clamped() {
        let boxes = [
            CenterBox::new(-10.0, -10.0, 40.0, 40.0),
            CenterBox::new(95.0, 75.0, 40.0, 40.0),
            CenterBox::new(50.0, 40.0, 1000.0, 1000.0),
            CenterBox::new(-500.0, 40.0, 10.0, 10.0),
            CenterBox::new(500.0, 500.0, 10.0, 10.0),
            CenterBox::new(f32::NAN, 40.0, 10.0, 10.0),
        ];
        for b in boxes {
            let c = bbox_corners(&b, 100, 80);
            assert!(c.x_min <= c.x_max && c.x_max <= 100, "{:?} -> {:?}", b, c);
            assert!(c.y_min <= c.y_max && c.y_max <= 80, "{:?} -> {:?}", b, c);
            if !c.is_empty() {
                assert!(c.x_max - 1 < 100 && c.y_max - 1 < 80);
            }
        }
    }

    #[test]
    fn crop_size_matches_box() -> Result<()> {
        let frame = solid_frame(100, 80, [10, 20, 30]);
        let bbox = CenterBox::new(50.0, 40.0, 20.0, 10.0);
        let card = segment_card(&full_mask(100, 80), &bbox, &frame);
        let c = bbox_corners(&bbox, 100, 80);
        assert_eq!(card.dimensions(), (c.width(), c.height()));
        assert!(card.pixels().all(|p| *p == Rgb([10, 20, 30])));
        Ok(())
    }

    #[test]
    fn full_box_is_masked_frame() -> Result<()> {
        let mut frame = solid_frame(4, 4, [200, 100, 50]);
        frame.put_pixel(3, 3, Rgb([1, 2, 3]));
        let mask = Mask::from_binary(
            2,
            2,
            &[true, false, false, true], // keeps top-left and bottom-right quadrants
        )?;
        let bbox = CenterBox::new(2.0, 2.0, 4.0, 4.0);
        let card = segment_card(&mask, &bbox, &frame);
        assert_eq!(card, apply_mask(&frame, &mask));
        assert_eq!(*card.get_pixel(0, 0), Rgb([200, 100, 50]));
        assert_eq!(*card.get_pixel(3, 0), Rgb([0, 0, 0]));
        assert_eq!(*card.get_pixel(0, 3), Rgb([0, 0, 0]));
        assert_eq!(*card.get_pixel(3, 3), Rgb([1, 2, 3]));
        Ok(())
    }

    #[test]
    fn out_of_bounds_box_is_empty() {
        let frame = solid_frame(10, 10, [1, 1, 1]);
        let card = segment_card(
            &full_mask(10, 10),
            &CenterBox::new(-50.0, -50.0, 10.0, 10.0),
            &frame,
        );
        assert!(is_empty_region(&card));
        let card = segment_card(
            &full_mask(10, 10),
            &CenterBox::new(5.0, 5.0, 0.0, 4.0),
            &frame,
        );
        assert!(is_empty_region(&card));
    }

    #[test]
    fn empty_source_is_empty() {
        let frame = RgbImage::new(0, 0);
        let card = segment_card(&full_mask(2, 2), &CenterBox::new(1.0, 1.0, 2.0, 2.0), &frame);
        assert!(is_empty_region(&card));
    }

    #[test]
    fn grayscale_mask_scales() -> Result<()> {
        let frame = solid_frame(1, 1, [200, 100, 255]);
        let mask = Mask::from_values(1, 1, vec![128])?;
        let out = apply_mask(&frame, &mask);
        assert_eq!(*out.get_pixel(0, 0), Rgb([100, 50, 128]));
        Ok(())
    }

    #[test]
    fn mask_size_validated() {
        assert!(Mask::from_values(3, 3, vec![0; 4]).is_err());
    }
}
