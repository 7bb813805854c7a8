use crate::extract::{bbox_corners, Detection};
use crate::identify::FrameResult;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

/// Outline colour of identified cards
pub const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

const BOX_THICKNESS: u32 = 2;

/// Outlines the clamped box of every identified track of the frame, unresolved tracks are
/// left untouched. Returns the number of drawn boxes.
///
pub fn annotate_frame<M>(
    frame: &mut RgbImage,
    detections: &[Detection],
    result: &FrameResult<M>,
) -> usize {
    let (width, height) = frame.dimensions();
    let mut drawn = 0;
    for d in detections {
        if result.get(d.track_id).is_none() {
            continue;
        }
        let c = bbox_corners(&d.bbox, width, height);
        if c.is_empty() {
            continue;
        }
        for inset in 0..BOX_THICKNESS {
            let (w, h) = (
                c.width().saturating_sub(2 * inset),
                c.height().saturating_sub(2 * inset),
            );
            if w == 0 || h == 0 {
                break;
            }
            let rect =
                Rect::at((c.x_min + inset) as i32, (c.y_min + inset) as i32).of_size(w, h);
            draw_hollow_rect_mut(frame, rect, BOX_COLOR);
        }
        drawn += 1;
    }
    drawn
}
