//! Decoded camera frames.
//!
//! - `Frame`: owned RGB8 buffer decoded from one snapshot. Never mutated after
//!   construction; there is no `&mut` accessor to its pixels.
//! - `InferenceView`: read-only view handed to detector backends.
//!
//! Overlays for the operator preview are drawn on `Frame::display_copy()`,
//! never on the buffer used for inference.

use std::time::Instant;

use image::RgbImage;

use crate::error::DecodeError;

/// Number of interleaved channels in a frame buffer.
pub const CHANNELS: usize = 3;

/// One decoded image captured from the camera endpoint.
pub struct Frame {
    image: RgbImage,

    /// Monotonic per-source sequence number (1-based).
    pub sequence: u64,

    captured_at: Instant,
}

impl Frame {
    /// Wrap a decoded image. Empty images are rejected as a decode failure.
    pub fn new(image: RgbImage, sequence: u64) -> Result<Self, DecodeError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(DecodeError::Empty {
                width: image.width(),
                height: image.height(),
            });
        }
        Ok(Self {
            image,
            sequence,
            captured_at: Instant::now(),
        })
    }

    /// Decode an encoded still image (JPEG, PNG) into a 3-channel 8-bit frame.
    pub fn decode(bytes: &[u8], sequence: u64) -> Result<Self, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::NoData);
        }
        let decoded = image::load_from_memory(bytes).map_err(DecodeError::Malformed)?;
        Self::new(decoded.into_rgb8(), sequence)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Seconds since the frame was decoded.
    pub fn age_secs_f32(&self) -> f32 {
        self.captured_at.elapsed().as_secs_f32()
    }

    /// Backends get a restricted, read-only view for inference.
    pub fn inference_view(&self) -> InferenceView<'_> {
        InferenceView { frame: self }
    }

    /// Independent copy for overlay drawing.
    pub fn display_copy(&self) -> RgbImage {
        self.image.clone()
    }
}

/// Read-only view of a frame for inference.
///
/// The view hands out shared borrows only:
///
/// ```compile_fail
/// use sentry_gate::frame::InferenceView;
///
/// fn scribble(view: InferenceView<'_>) {
///     view.pixels()[0] = 255;
/// }
/// ```
///
/// ```compile_fail
/// use sentry_gate::frame::InferenceView;
///
/// fn peek(view: InferenceView<'_>) {
///     let _ = view.frame;
/// }
/// ```
#[derive(Clone, Copy)]
pub struct InferenceView<'a> {
    frame: &'a Frame,
}

impl<'a> InferenceView<'a> {
    pub fn width(&self) -> u32 {
        self.frame.width()
    }

    pub fn height(&self) -> u32 {
        self.frame.height()
    }

    /// Interleaved RGB bytes, row-major.
    pub fn pixels(&self) -> &'a [u8] {
        self.frame.image.as_raw()
    }

    pub fn image(&self) -> &'a RgbImage {
        &self.frame.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::io::Cursor;

    fn encode_png(image: &RgbImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("encode png");
        bytes
    }

    #[test]
    fn decodes_png_into_rgb_frame() {
        let image = RgbImage::from_pixel(4, 3, Rgb([10, 20, 30]));
        let frame = Frame::decode(&encode_png(&image), 7).expect("decode");

        assert_eq!(frame.width(), 4);
        assert_eq!(frame.height(), 3);
        assert_eq!(frame.sequence, 7);
        let view = frame.inference_view();
        assert_eq!(view.pixels().len(), 4 * 3 * CHANNELS);
        assert_eq!(&view.pixels()[..3], &[10, 20, 30]);
    }

    #[test]
    fn rejects_garbage_bytes() {
        let err = Frame::decode(b"definitely not a jpeg", 1)
            .err()
            .expect("garbage must not decode");
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn empty_body_is_a_decode_error() {
        let err = Frame::decode(&[], 1)
            .err()
            .expect("empty body must not decode");
        assert!(matches!(err, DecodeError::NoData));
    }

    #[test]
    fn rejects_empty_image() {
        let err = Frame::new(RgbImage::new(0, 0), 1)
            .err()
            .expect("empty image must be rejected");
        assert!(matches!(err, DecodeError::Empty { .. }));
    }

    #[test]
    fn display_copy_does_not_alias_inference_buffer() {
        let frame = Frame::new(RgbImage::from_pixel(2, 2, Rgb([1, 2, 3])), 1).unwrap();
        let mut copy = frame.display_copy();
        copy.put_pixel(0, 0, Rgb([255, 255, 255]));

        assert_eq!(&frame.inference_view().pixels()[..3], &[1, 2, 3]);
    }
}
