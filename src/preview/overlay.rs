//! Detection overlays drawn on a copy of the frame.
//!
//! Boxes are drawn for every detection. Only the first detection gets a text
//! label; the trigger decision never depends on what is drawn here.

use image::{Rgb, RgbImage};

use crate::detect::DetectionSet;
use crate::frame::Frame;

const GLYPH_WIDTH: i32 = 5;
const GLYPH_HEIGHT: i32 = 7;

#[derive(Clone, Copy, Debug)]
pub struct OverlayStyle {
    pub box_color: Rgb<u8>,
    pub text_color: Rgb<u8>,
    pub label_background: Rgb<u8>,
    pub thickness: i32,
    /// Integer glyph magnification.
    pub text_scale: i32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            box_color: Rgb([0, 255, 0]),
            text_color: Rgb([255, 255, 255]),
            label_background: Rgb([0, 96, 0]),
            thickness: 2,
            text_scale: 2,
        }
    }
}

/// Draw boxes and the primary label onto an independent copy of `frame`.
pub fn annotate(frame: &Frame, detections: &DetectionSet, style: &OverlayStyle) -> RgbImage {
    let mut image = frame.display_copy();

    for det in detections {
        let [x1, y1, x2, y2] = det.bbox.xyxy();
        draw_rectangle(
            &mut image,
            x1.round() as i32,
            y1.round() as i32,
            x2.round() as i32,
            y2.round() as i32,
            style.box_color,
            style.thickness,
        );
    }

    if let Some(primary) = detections.first() {
        let text = format!(
            "{} {:.0}%",
            primary.label,
            primary.confidence * 100.0
        );
        let scale = style.text_scale.max(1);
        let text_height = GLYPH_HEIGHT * scale + 2;
        let left = primary.bbox.x1.round() as i32;
        let top = (primary.bbox.y1.round() as i32 - text_height).max(0);
        fill_rect(
            &mut image,
            left,
            top,
            left + text_width(&text, scale) + 2,
            top + text_height,
            style.label_background,
        );
        draw_text(&mut image, left + 1, top + 1, &text, style.text_color, scale);
    }

    image
}

fn text_width(text: &str, scale: i32) -> i32 {
    text.chars().count() as i32 * (GLYPH_WIDTH + 1) * scale
}

fn put(image: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}

fn draw_rectangle(
    image: &mut RgbImage,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    color: Rgb<u8>,
    thickness: i32,
) {
    for inset in 0..thickness.max(1) {
        let (l, t, r, b) = (left + inset, top + inset, right - inset, bottom - inset);
        if l > r || t > b {
            break;
        }
        for x in l..=r {
            put(image, x, t, color);
            put(image, x, b, color);
        }
        for y in t..=b {
            put(image, l, y, color);
            put(image, r, y, color);
        }
    }
}

fn fill_rect(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    for y in top..bottom {
        for x in left..right {
            put(image, x, y, color);
        }
    }
}

fn draw_text(image: &mut RgbImage, mut x: i32, y: i32, text: &str, color: Rgb<u8>, scale: i32) {
    for ch in text.chars().flat_map(char::to_uppercase) {
        if let Some(rows) = glyph(ch) {
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if (bits >> (GLYPH_WIDTH - 1 - col)) & 1 == 0 {
                        continue;
                    }
                    let px = x + col * scale;
                    let py = y + row as i32 * scale;
                    for dy in 0..scale {
                        for dx in 0..scale {
                            put(image, px + dx, py + dy, color);
                        }
                    }
                }
            }
        }
        x += (GLYPH_WIDTH + 1) * scale;
    }
}

/// 5x7 bitmap rows, most significant of the low five bits is the left column.
fn glyph(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '%' => [0x18, 0x19, 0x02, 0x04, 0x08, 0x13, 0x03],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        _ => return None,
    };
    Some(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, Detection};

    fn bottle(x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection {
            bbox: BoundingBox::new(x1, y1, x2, y2),
            confidence: 0.83,
            class_id: 39,
            label: "bottle".to_string(),
        }
    }

    #[test]
    fn draws_on_a_copy_only() {
        let frame = Frame::new(RgbImage::new(64, 64), 1).unwrap();
        let detections = DetectionSet::new(vec![bottle(20.0, 30.0, 40.0, 60.0)], 64, 64);

        let annotated = annotate(&frame, &detections, &OverlayStyle::default());

        assert_eq!(*annotated.get_pixel(20, 45), Rgb([0, 255, 0]));
        assert!(frame.inference_view().pixels().iter().all(|&p| p == 0));
    }

    #[test]
    fn boxes_for_all_detections() {
        let frame = Frame::new(RgbImage::new(100, 100), 1).unwrap();
        let detections = DetectionSet::new(
            vec![bottle(10.0, 40.0, 20.0, 50.0), bottle(60.0, 70.0, 90.0, 95.0)],
            100,
            100,
        );

        let annotated = annotate(&frame, &detections, &OverlayStyle::default());

        assert_eq!(*annotated.get_pixel(10, 45), Rgb([0, 255, 0]));
        assert_eq!(*annotated.get_pixel(90, 80), Rgb([0, 255, 0]));
    }

    #[test]
    fn empty_set_leaves_image_untouched() {
        let frame = Frame::new(RgbImage::from_pixel(8, 8, Rgb([7, 7, 7])), 1).unwrap();
        let annotated = annotate(&frame, &DetectionSet::empty(8, 8), &OverlayStyle::default());
        assert!(annotated.pixels().all(|p| *p == Rgb([7, 7, 7])));
    }

    #[test]
    fn label_glyphs_cover_percent_labels() {
        for ch in "BOTTLE 83%".chars().filter(|c| *c != ' ') {
            assert!(glyph(ch).is_some(), "missing glyph {:?}", ch);
        }
    }
}
