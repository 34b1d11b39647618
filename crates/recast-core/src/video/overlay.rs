//! Cursor and webcam compositing onto captured frames.

use image::{
    Rgba, RgbaImage,
    imageops::{self, FilterType},
};

pub const CURSOR_RADIUS: u32 = 5;
pub const CURSOR_THICKNESS: u32 = 2;
pub const CURSOR_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);

/// The webcam thumbnail is `frame width / WEBCAM_WIDTH_DIVISOR` wide.
pub const WEBCAM_WIDTH_DIVISOR: u32 = 5;
/// Gap between the thumbnail and the bottom-right frame edges.
pub const WEBCAM_PADDING: u32 = 20;
const WEBCAM_BORDER: u32 = 2;
const WEBCAM_BORDER_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Draw a ring centred on `(x, y)`. Pixels falling outside the frame are clipped.
pub fn draw_cursor(frame: &mut RgbaImage, x: u32, y: u32) {
    let reach = i64::from(CURSOR_RADIUS + CURSOR_THICKNESS);
    let radius = f64::from(CURSOR_RADIUS);
    let half_stroke = f64::from(CURSOR_THICKNESS) / 2.0;
    let (width, height) = (i64::from(frame.width()), i64::from(frame.height()));

    for dy in -reach..=reach {
        for dx in -reach..=reach {
            let distance = ((dx * dx + dy * dy) as f64).sqrt();
            if (distance - radius).abs() > half_stroke {
                continue;
            }

            let px = i64::from(x) + dx;
            let py = i64::from(y) + dy;
            if px >= 0 && py >= 0 && px < width && py < height {
                frame.put_pixel(px as u32, py as u32, CURSOR_COLOR);
            }
        }
    }
}

/// Paste a scaled copy of `camera` into the bottom-right corner of `frame`.
///
/// Returns `false` (leaving `frame` untouched) when the thumbnail would not
/// fit or the camera frame is empty.
pub fn composite_webcam(frame: &mut RgbaImage, camera: &RgbaImage) -> bool {
    if camera.width() == 0 || camera.height() == 0 {
        return false;
    }

    let thumb_width = frame.width() / WEBCAM_WIDTH_DIVISOR;
    let scale = f64::from(thumb_width) / f64::from(camera.width());
    let thumb_height = (f64::from(camera.height()) * scale) as u32;

    if thumb_width == 0 || thumb_height == 0 {
        return false;
    }
    if frame.width() < thumb_width + WEBCAM_PADDING || frame.height() < thumb_height + WEBCAM_PADDING
    {
        return false;
    }

    let x_offset = frame.width() - thumb_width - WEBCAM_PADDING;
    let y_offset = frame.height() - thumb_height - WEBCAM_PADDING;

    let thumb = imageops::resize(camera, thumb_width, thumb_height, FilterType::Triangle);
    imageops::replace(frame, &thumb, i64::from(x_offset), i64::from(y_offset));
    draw_border(frame, x_offset, y_offset, thumb_width, thumb_height);

    true
}

/// Outline the thumbnail, straddling its edge like a centred stroke.
fn draw_border(frame: &mut RgbaImage, x: u32, y: u32, width: u32, height: u32) {
    let outset = WEBCAM_BORDER / 2;
    let left = x.saturating_sub(outset);
    let top = y.saturating_sub(outset);
    let right = (x + width + outset).min(frame.width());
    let bottom = (y + height + outset).min(frame.height());

    for py in top..bottom {
        for px in left..right {
            let on_edge = px < left + WEBCAM_BORDER
                || px + WEBCAM_BORDER >= right
                || py < top + WEBCAM_BORDER
                || py + WEBCAM_BORDER >= bottom;
            if on_edge {
                frame.put_pixel(px, py, WEBCAM_BORDER_COLOR);
            }
        }
    }
}
