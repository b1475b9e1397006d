use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::control::RetryPolicy;
use crate::detect::{ClassFilter, ClassLabels, BOTTLE_CLASS_ID};

const DEFAULT_CAMERA_URL: &str = "http://192.168.78.218/capture";
const DEFAULT_GATE_URL: &str = "http://192.168.4.1/gate";
const DEFAULT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_BACKEND: &str = "tract";
const DEFAULT_MODEL_PATH: &str = "yolo11x.onnx";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_CONFIDENCE: f32 = 0.25;
const DEFAULT_IOU: f32 = 0.7;
const DEFAULT_MAX_DETECTIONS: usize = 300;
const DEFAULT_RETRY_POLICY: &str = "immediate";
const DEFAULT_RETRY_DELAY_MS: u64 = 500;
const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 10_000;
const DEFAULT_PREVIEW_PATH: &str = "preview.jpg";
const DEFAULT_STATS_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Deserialize, Default)]
struct GatedConfigFile {
    camera: Option<EndpointConfigFile>,
    gate: Option<EndpointConfigFile>,
    detector: Option<DetectorConfigFile>,
    target: Option<TargetConfigFile>,
    trigger: Option<TriggerConfigFile>,
    retry: Option<RetryConfigFile>,
    preview: Option<PreviewConfigFile>,
    stats_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct EndpointConfigFile {
    url: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence: Option<f32>,
    iou: Option<f32>,
    max_detections: Option<usize>,
}

/// Target classes may be given as ids (`39`) or labels (`"bottle"`).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassSpec {
    Id(u32),
    Name(String),
}

#[derive(Debug, Deserialize, Default)]
struct TargetConfigFile {
    classes: Option<Vec<ClassSpec>>,
}

#[derive(Debug, Deserialize, Default)]
struct TriggerConfigFile {
    min_confidence: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct RetryConfigFile {
    policy: Option<String>,
    delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct PreviewConfigFile {
    enabled: Option<bool>,
    path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct GatedConfig {
    pub camera: EndpointSettings,
    pub gate: EndpointSettings,
    pub detector: DetectorSettings,
    /// Target class specs as configured; resolved by `target_filter`.
    pub target_classes: Vec<String>,
    pub min_confidence: Option<f32>,
    pub retry: RetrySettings,
    pub preview: PreviewSettings,
    pub stats_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct EndpointSettings {
    pub url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: PathBuf,
    pub input_size: u32,
    pub confidence: f32,
    pub iou: f32,
    pub max_detections: usize,
}

#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub policy: String,
    pub delay: Duration,
    pub max_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct PreviewSettings {
    pub enabled: bool,
    pub path: PathBuf,
}

impl Default for GatedConfig {
    fn default() -> Self {
        // All file sections absent: every field takes its default.
        Self::from_file(GatedConfigFile::default())
    }
}

impl GatedConfig {
    /// Load from the file named by `GATE_CONFIG` (if any), then apply
    /// `GATE_*` environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("GATE_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Like `load`, with an explicit config file path.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => GatedConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: GatedConfigFile) -> Self {
        let endpoint = |section: Option<EndpointConfigFile>, default_url: &str| {
            let section = section.unwrap_or_default();
            EndpointSettings {
                url: section.url.unwrap_or_else(|| default_url.to_string()),
                timeout: Duration::from_millis(section.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)),
            }
        };
        let camera = endpoint(file.camera, DEFAULT_CAMERA_URL);
        let gate = endpoint(file.gate, DEFAULT_GATE_URL);

        let detector = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            backend: detector
                .backend
                .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            model_path: detector
                .model_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            input_size: detector.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
            confidence: detector.confidence.unwrap_or(DEFAULT_CONFIDENCE),
            iou: detector.iou.unwrap_or(DEFAULT_IOU),
            max_detections: detector.max_detections.unwrap_or(DEFAULT_MAX_DETECTIONS),
        };

        let target_classes = file
            .target
            .and_then(|target| target.classes)
            .map(|classes| {
                classes
                    .into_iter()
                    .map(|spec| match spec {
                        ClassSpec::Id(id) => id.to_string(),
                        ClassSpec::Name(name) => name,
                    })
                    .collect()
            })
            .unwrap_or_else(|| vec![BOTTLE_CLASS_ID.to_string()]);

        let retry = file.retry.unwrap_or_default();
        let retry = RetrySettings {
            policy: retry
                .policy
                .unwrap_or_else(|| DEFAULT_RETRY_POLICY.to_string()),
            delay: Duration::from_millis(retry.delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS)),
            max_delay: Duration::from_millis(
                retry.max_delay_ms.unwrap_or(DEFAULT_RETRY_MAX_DELAY_MS),
            ),
        };

        let preview = file.preview.unwrap_or_default();
        let preview = PreviewSettings {
            enabled: preview.enabled.unwrap_or(false),
            path: preview
                .path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PREVIEW_PATH)),
        };

        Self {
            camera,
            gate,
            detector,
            target_classes,
            min_confidence: file.trigger.and_then(|trigger| trigger.min_confidence),
            retry,
            preview,
            stats_interval: Duration::from_secs(
                file.stats_interval_secs
                    .unwrap_or(DEFAULT_STATS_INTERVAL_SECS),
            ),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = non_empty_env("GATE_CAMERA_URL") {
            self.camera.url = url;
        }
        if let Some(url) = non_empty_env("GATE_URL") {
            self.gate.url = url;
        }
        if let Some(path) = non_empty_env("GATE_MODEL_PATH") {
            self.detector.model_path = PathBuf::from(path);
        }
        if let Some(classes) = non_empty_env("GATE_TARGET_CLASSES") {
            let parsed = split_csv(&classes);
            if !parsed.is_empty() {
                self.target_classes = parsed;
            }
        }
        if let Some(floor) = non_empty_env("GATE_MIN_CONFIDENCE") {
            let floor: f32 = floor
                .parse()
                .map_err(|_| anyhow!("GATE_MIN_CONFIDENCE must be a number between 0 and 1"))?;
            self.min_confidence = Some(floor);
        }
        if let Some(policy) = non_empty_env("GATE_RETRY_POLICY") {
            self.retry.policy = policy;
        }
        if let Some(path) = non_empty_env("GATE_PREVIEW_PATH") {
            self.preview.path = PathBuf::from(path);
        }
        Ok(())
    }

    /// Check ranges and references. Called by `load`; call again after
    /// applying command-line overrides.
    pub fn validate(&mut self) -> Result<()> {
        validate_http_url("camera", &self.camera.url, true)?;
        validate_http_url("gate", &self.gate.url, false)?;
        for (name, timeout) in [("camera", self.camera.timeout), ("gate", self.gate.timeout)] {
            if timeout.is_zero() {
                return Err(anyhow!("{} timeout must be greater than zero", name));
            }
        }

        self.detector.backend = self.detector.backend.trim().to_lowercase();
        if !matches!(self.detector.backend.as_str(), "tract" | "stub") {
            return Err(anyhow!(
                "unknown detector backend '{}'; expected tract or stub",
                self.detector.backend
            ));
        }
        if self.detector.input_size == 0 || self.detector.input_size % 32 != 0 {
            return Err(anyhow!(
                "detector input_size must be a positive multiple of 32, got {}",
                self.detector.input_size
            ));
        }
        check_unit("detector confidence", self.detector.confidence)?;
        check_unit("detector iou", self.detector.iou)?;
        if self.detector.max_detections == 0 {
            return Err(anyhow!("detector max_detections must be greater than zero"));
        }
        if let Some(floor) = self.min_confidence {
            check_unit("trigger min_confidence", floor)?;
        }

        if self.target_classes.is_empty() {
            return Err(anyhow!("at least one target class is required"));
        }
        self.target_filter(&ClassLabels::coco())?;
        self.retry_policy()?;

        if self.stats_interval.is_zero() {
            return Err(anyhow!("stats_interval_secs must be greater than zero"));
        }
        Ok(())
    }

    /// Resolve the configured target classes against a label table.
    pub fn target_filter(&self, labels: &ClassLabels) -> Result<ClassFilter> {
        let ids = self
            .target_classes
            .iter()
            .map(|spec| labels.resolve(spec))
            .collect::<Result<Vec<_>>>()
            .context("invalid target class")?;
        Ok(ClassFilter::new(ids))
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        RetryPolicy::from_parts(&self.retry.policy, self.retry.delay, self.retry.max_delay)
    }
}

fn read_config_file(path: &Path) -> Result<GatedConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn validate_http_url(name: &str, value: &str, allow_file: bool) -> Result<()> {
    let parsed =
        url::Url::parse(value).with_context(|| format!("invalid {} url '{}'", name, value))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        "file" if allow_file => Ok(()),
        other => Err(anyhow!(
            "{} url must use http or https, got '{}'",
            name,
            other
        )),
    }
}

fn check_unit(name: &str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(anyhow!("{} must be within 0..=1, got {}", name, value));
    }
    Ok(())
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
