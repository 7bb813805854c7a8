use crate::extract::{CenterBox, Detection, Mask};
use crate::fingerprint::utils::FromVec;
use crate::fingerprint::{Feature, ImageHash};
use image::{GrayImage, Luma, Rgb, RgbImage};
use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Frame filled with a single colour
///
pub fn solid_frame(width: u32, height: u32, color: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb(color))
}

/// Frame of uniform noise, reproducible for a seed
///
pub fn random_frame(width: u32, height: u32, seed: u64) -> RgbImage {
    let mut gen = StdRng::seed_from_u64(seed);
    let dist = Uniform::new_inclusive(0u8, 255u8);
    RgbImage::from_fn(width, height, |_, _| {
        Rgb([gen.sample(dist), gen.sample(dist), gen.sample(dist)])
    })
}

/// Gray frame brightening from left to right
///
pub fn gradient_frame(width: u32, height: u32) -> RgbImage {
    let span = width.saturating_sub(1).max(1);
    RgbImage::from_fn(width, height, |x, _| {
        let v = (x * 255 / span) as u8;
        Rgb([v, v, v])
    })
}

/// Mask keeping every pixel
///
pub fn full_mask(width: u32, height: u32) -> Mask {
    Mask::new(GrayImage::from_pixel(width, height, Luma([255])))
}

/// Mask keeping the pixels of a center-form box on a `width x height` field
///
pub fn box_mask(width: u32, height: u32, bbox: &CenterBox) -> Mask {
    let corners = crate::extract::bbox_corners(bbox, width, height);
    Mask::new(GrayImage::from_fn(width, height, |x, y| {
        let inside = x >= corners.x_min
            && x < corners.x_max
            && y >= corners.y_min
            && y < corners.y_max;
        Luma([if inside { 255 } else { 0 }])
    }))
}

/// Paints a card of `color` on `frame` and returns the detection the tracker would report
/// for it
///
pub fn paint_card(
    frame: &mut RgbImage,
    bbox: CenterBox,
    color: [u8; 3],
    track_id: u64,
) -> Detection {
    let (width, height) = frame.dimensions();
    let corners = crate::extract::bbox_corners(&bbox, width, height);
    for y in corners.y_min..corners.y_max {
        for x in corners.x_min..corners.x_max {
            frame.put_pixel(x, y, Rgb(color));
        }
    }
    Detection::new(box_mask(width, height, &bbox), bbox, track_id)
}

/// Hash code of `bits` random bits, reproducible for a seed
///
pub fn random_hash(bits: usize, seed: u64) -> ImageHash {
    let mut gen = StdRng::seed_from_u64(seed);
    let bits = (0..bits).map(|_| gen.gen_bool(0.5)).collect::<Vec<_>>();
    ImageHash::from_bits(&bits)
}

/// Hash code at exactly `distance` bits from `base`
///
pub fn hash_at_distance(base: &ImageHash, distance: usize) -> ImageHash {
    let bits = (0..base.len())
        .map(|i| if i < distance { !base.bit(i) } else { base.bit(i) })
        .collect::<Vec<_>>();
    ImageHash::from_bits(&bits)
}

/// Random vector with components in `[-1, 1]`
///
pub fn random_vector(len: usize, seed: u64) -> Vec<f32> {
    let mut gen = StdRng::seed_from_u64(seed);
    let dist = Uniform::new(-1.0f32, 1.0f32);
    (0..len).map(|_| gen.sample(dist)).collect()
}

pub fn random_feature(len: usize, seed: u64) -> Feature {
    Feature::from_vec(random_vector(len, seed))
}
