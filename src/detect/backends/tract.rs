#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, RawDetection};
use crate::error::InferenceError;
use crate::frame::InferenceView;

const LETTERBOX_FILL: f32 = 114.0 / 255.0;

/// Post-processing parameters for YOLO-style exports.
#[derive(Clone, Copy, Debug)]
pub struct YoloParams {
    /// Square model input side, in pixels.
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for YoloParams {
    fn default() -> Self {
        Self {
            input_size: 640,
            confidence_threshold: 0.25,
            iou_threshold: 0.7,
            max_detections: 300,
        }
    }
}

/// Tract-based backend for YOLOv8/YOLO11 ONNX exports.
///
/// Loads a local model file once and runs it on letterboxed RGB frames. The
/// model output is `[1, 4 + classes, anchors]` with center/size boxes in
/// model-input pixels; confidence filtering and per-class NMS are applied here.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    params: YoloParams,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, params: YoloParams) -> Result<Self> {
        let model_path = model_path.as_ref();
        let side = params.input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self { model, params })
    }

    fn build_input(&self, view: InferenceView<'_>) -> (Tensor, Letterbox) {
        let letterbox = Letterbox::fit(view.width(), view.height(), self.params.input_size);
        let resized = image::imageops::resize(
            view.image(),
            letterbox.scaled_width,
            letterbox.scaled_height,
            FilterType::Triangle,
        );
        let side = self.params.input_size as usize;
        let (pad_x, pad_y) = (letterbox.pad_x as usize, letterbox.pad_y as usize);
        let (scaled_w, scaled_h) = (resized.width() as usize, resized.height() as usize);
        let raw = resized.as_raw();

        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            if x < pad_x || y < pad_y || x >= pad_x + scaled_w || y >= pad_y + scaled_h {
                return LETTERBOX_FILL;
            }
            let idx = ((y - pad_y) * scaled_w + (x - pad_x)) * 3 + c;
            raw[idx] as f32 / 255.0
        });

        (input.into_tensor(), letterbox)
    }

    fn run(&mut self, view: InferenceView<'_>) -> Result<Vec<RawDetection>> {
        let (input, letterbox) = self.build_input(view);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let predictions = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let candidates = decode_predictions(&predictions, &self.params, &letterbox)?;
        Ok(non_max_suppression(
            candidates,
            self.params.iou_threshold,
            self.params.max_detections,
        ))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, view: InferenceView<'_>) -> Result<Vec<RawDetection>, InferenceError> {
        self.run(view).map_err(|source| InferenceError::Backend {
            backend: "tract",
            source,
        })
    }

    fn warm_up(&mut self) -> Result<(), InferenceError> {
        let side = self.params.input_size;
        let blank = crate::frame::Frame::new(image::RgbImage::new(side, side), 0).map_err(
            |err| InferenceError::Backend {
                backend: "tract",
                source: anyhow!(err),
            },
        )?;
        self.detect(blank.inference_view()).map(|_| ())
    }
}

/// Geometry of the aspect-preserving resize into the square model input.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Letterbox {
    scale: f32,
    scaled_width: u32,
    scaled_height: u32,
    pad_x: u32,
    pad_y: u32,
}

impl Letterbox {
    fn fit(width: u32, height: u32, side: u32) -> Self {
        let scale = (side as f32 / width as f32).min(side as f32 / height as f32);
        let scaled_width = ((width as f32 * scale).round() as u32).clamp(1, side);
        let scaled_height = ((height as f32 * scale).round() as u32).clamp(1, side);
        Self {
            scale,
            scaled_width,
            scaled_height,
            pad_x: (side - scaled_width) / 2,
            pad_y: (side - scaled_height) / 2,
        }
    }

    /// Map a center/size box from model input space back to frame pixels.
    fn unmap(&self, cx: f32, cy: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox::from_center(
            (cx - self.pad_x as f32) / self.scale,
            (cy - self.pad_y as f32) / self.scale,
            w / self.scale,
            h / self.scale,
        )
    }
}

fn decode_predictions(
    predictions: &tract_ndarray::ArrayViewD<'_, f32>,
    params: &YoloParams,
    letterbox: &Letterbox,
) -> Result<Vec<RawDetection>> {
    let shape = predictions.shape();
    if shape.len() != 3 || shape[0] != 1 {
        return Err(anyhow!("unexpected detector output shape {:?}", shape));
    }
    // Stock exports are channel-major [1, 4 + nc, anchors]; accept the
    // transposed layout too.
    let channel_major = shape[1] < shape[2];
    let (channels, anchors) = if channel_major {
        (shape[1], shape[2])
    } else {
        (shape[2], shape[1])
    };
    if channels < 5 {
        return Err(anyhow!(
            "detector output requires at least 5 channels (x,y,w,h,class), got {}",
            channels
        ));
    }
    let predictions = predictions
        .view()
        .into_dimensionality::<tract_ndarray::Ix3>()
        .context("detector output is not rank 3")?;
    let at = |anchor: usize, channel: usize| {
        if channel_major {
            predictions[[0, channel, anchor]]
        } else {
            predictions[[0, anchor, channel]]
        }
    };

    let mut detections = Vec::new();
    for anchor in 0..anchors {
        let mut best_class = 0usize;
        let mut best_score = f32::NEG_INFINITY;
        for channel in 4..channels {
            let score = at(anchor, channel);
            if score > best_score {
                best_score = score;
                best_class = channel - 4;
            }
        }
        if !best_score.is_finite() || best_score < params.confidence_threshold {
            continue;
        }
        detections.push(RawDetection {
            bbox: letterbox.unmap(at(anchor, 0), at(anchor, 1), at(anchor, 2), at(anchor, 3)),
            confidence: best_score,
            class_id: best_class as u32,
        });
    }
    Ok(detections)
}

/// Greedy per-class NMS, highest confidence first.
fn non_max_suppression(
    mut candidates: Vec<RawDetection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<RawDetection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<RawDetection> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|keep| {
            keep.class_id == candidate.class_id && keep.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}
