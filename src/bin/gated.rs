//! gated - detection-triggered gate controller
//!
//! This daemon:
//! 1. Fetches a still from the camera snapshot endpoint
//! 2. Runs object detection filtered to the target classes
//! 3. POSTs to the gate endpoint whenever a target object is present
//! 4. Optionally writes an annotated preview frame (type `q` + Enter to quit)

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;

use clap::Parser;
use sentry_gate::{
    control::{ControlLoop, IterationOutcome, StopFlag, TriggerDecision},
    detect::{ClassLabels, DetectionSet, Detector, DetectorBackend, StubBackend},
    ingest,
    preview::{QuitKey, SnapshotViewer},
    transport::{GateConfig, HttpGate},
    GatedConfig,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Open a gate when the camera sees a target object"
)]
struct Args {
    /// Path to a JSON or TOML config file.
    #[arg(long, env = "GATE_CONFIG")]
    config: Option<PathBuf>,

    /// Camera snapshot URL (http, https or file).
    #[arg(long)]
    camera_url: Option<String>,

    /// Gate trigger URL.
    #[arg(long)]
    gate_url: Option<String>,

    /// ONNX detection model.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Target class id or label; repeat for several classes.
    #[arg(long = "class")]
    classes: Vec<String>,

    /// Write an annotated preview frame every iteration.
    #[arg(long)]
    preview: bool,

    /// Preview file path (enables the preview).
    #[arg(long)]
    preview_path: Option<PathBuf>,

    /// Run a single iteration, print every detection and exit.
    #[arg(long, conflicts_with = "iterations")]
    once: bool,

    /// Stop after this many iterations.
    #[arg(long)]
    iterations: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = GatedConfig::load_from(args.config.as_deref())?;
    apply_args(&mut cfg, &args);
    cfg.validate()?;

    let labels = ClassLabels::coco();
    let filter = cfg.target_filter(&labels)?;
    let source = ingest::source_for_url(&cfg.camera.url, cfg.camera.timeout)?;
    let gate = HttpGate::new(GateConfig {
        url: cfg.gate.url.clone(),
        timeout: cfg.gate.timeout,
    })?;

    let mut detector = Detector::new(build_backend(&cfg)?, labels);
    detector
        .warm_up()
        .context("detector warm-up failed")?;
    log::info!("detector ready (backend: {})", detector.backend_name());

    let stop = StopFlag::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        handler_stop.request_stop();
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let mut decision = TriggerDecision::new();
    if let Some(floor) = cfg.min_confidence {
        decision = decision.with_min_confidence(floor);
    }

    let mut control = ControlLoop::new(source, detector, Box::new(gate))
        .with_class_filter(filter)
        .with_decision(decision)
        .with_retry_policy(cfg.retry_policy()?)
        .with_stop_flag(stop)
        .with_stats_interval(cfg.stats_interval);

    if cfg.preview.enabled {
        log::info!(
            "preview enabled: {} (type q + Enter to quit)",
            cfg.preview.path.display()
        );
        let viewer = SnapshotViewer::new(&cfg.preview.path).with_quit_key(QuitKey::stdin());
        control = control.with_viewer(Box::new(viewer));
    }

    if args.once {
        return report_once(control.run_iteration());
    }

    let stats = match args.iterations {
        Some(limit) => control.run_iterations(limit),
        None => control.run(),
    };
    log::info!(
        "gated stopped after {} iterations ({} triggers)",
        stats.iterations,
        stats.triggers
    );
    Ok(())
}

fn apply_args(cfg: &mut GatedConfig, args: &Args) {
    if let Some(url) = &args.camera_url {
        cfg.camera.url = url.clone();
    }
    if let Some(url) = &args.gate_url {
        cfg.gate.url = url.clone();
    }
    if let Some(model) = &args.model {
        cfg.detector.model_path = model.clone();
    }
    if !args.classes.is_empty() {
        cfg.target_classes = args.classes.clone();
    }
    if args.preview {
        cfg.preview.enabled = true;
    }
    if let Some(path) = &args.preview_path {
        cfg.preview.enabled = true;
        cfg.preview.path = path.clone();
    }
}

#[cfg(feature = "backend-tract")]
fn build_backend(cfg: &GatedConfig) -> Result<Box<dyn DetectorBackend>> {
    use sentry_gate::detect::{TractBackend, YoloParams};

    if cfg.detector.backend == "stub" {
        return Ok(stub_backend());
    }
    let params = YoloParams {
        input_size: cfg.detector.input_size,
        confidence_threshold: cfg.detector.confidence,
        iou_threshold: cfg.detector.iou,
        max_detections: cfg.detector.max_detections,
    };
    let backend = TractBackend::new(&cfg.detector.model_path, params).with_context(|| {
        format!(
            "load detection model {}",
            cfg.detector.model_path.display()
        )
    })?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn build_backend(cfg: &GatedConfig) -> Result<Box<dyn DetectorBackend>> {
    if cfg.detector.backend == "stub" {
        return Ok(stub_backend());
    }
    Err(anyhow!(
        "detector backend '{}' requires the backend-tract feature",
        cfg.detector.backend
    ))
}

fn stub_backend() -> Box<dyn DetectorBackend> {
    log::warn!("using the stub detector: the gate will never trigger");
    Box::new(StubBackend::empty())
}

/// Log the single iteration; a skipped iteration becomes the process error.
fn report_once(outcome: IterationOutcome) -> Result<()> {
    match outcome {
        IterationOutcome::Skipped { stage, reason } => {
            return Err(anyhow!("{} stage failed: {}", stage, reason));
        }
        IterationOutcome::Idle { detections } => {
            log::info!("no trigger");
            log_detections(&detections);
        }
        IterationOutcome::Triggered { detections } => {
            log::info!("gate triggered");
            log_detections(&detections);
        }
        IterationOutcome::TriggerFailed { detections, reason } => {
            log::warn!("gate trigger failed: {}", reason);
            log_detections(&detections);
        }
    }
    Ok(())
}

fn log_detections(detections: &DetectionSet) {
    let (width, height) = (detections.frame_width, detections.frame_height);
    log::info!(
        "{} detection(s) in {}x{} frame",
        detections.len(),
        width,
        height
    );
    for (index, det) in detections.iter().enumerate() {
        log::info!(
            "#{} {} ({}) conf={:.3} xyxy={:?} xywh={:?} xyxyn={:?} xywhn={:?}",
            index,
            det.label,
            det.class_id,
            det.confidence,
            det.bbox.xyxy(),
            det.bbox.xywh(),
            det.bbox.xyxyn(width, height),
            det.bbox.xywhn(width, height)
        );
    }
}
