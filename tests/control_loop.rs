//! End-to-end loop runs against loopback HTTP fakes for the camera and gate.

use std::io::{Cursor, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use image::{ImageFormat, Rgb, RgbImage};

use sentry_gate::control::{ControlLoop, IterationOutcome, Stage};
use sentry_gate::detect::{
    BoundingBox, ClassFilter, ClassLabels, Detector, DetectorBackend, RawDetection, StubBackend,
};
use sentry_gate::error::InferenceError;
use sentry_gate::frame::InferenceView;
use sentry_gate::ingest::{SnapshotConfig, SnapshotSource};
use sentry_gate::preview::SnapshotViewer;
use sentry_gate::transport::{GateConfig, HttpGate};

const TIMEOUT: Duration = Duration::from_millis(300);

#[derive(Clone)]
enum Reply {
    Body(Vec<u8>),
    /// Accept the connection and never answer.
    Silent,
}

/// Loopback HTTP server answering one scripted reply per connection.
/// The last reply repeats.
struct FakeServer {
    url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeServer {
    fn start(path: &str, replies: Vec<Reply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let url = format!("http://{}{}", listener.local_addr().unwrap(), path);
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();
        std::thread::spawn(move || {
            let mut held: Vec<TcpStream> = Vec::new();
            let mut index = 0;
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else {
                    break;
                };
                let request_line = read_request(&mut stream);
                seen.lock().unwrap().push(request_line);
                let reply = replies[index.min(replies.len() - 1)].clone();
                index += 1;
                match reply {
                    Reply::Body(body) => {
                        let head = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                            body.len()
                        );
                        let _ = stream.write_all(head.as_bytes());
                        let _ = stream.write_all(&body);
                    }
                    Reply::Silent => held.push(stream),
                }
            }
        });
        Self { url, requests }
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request_lines(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

fn read_request(stream: &mut TcpStream) -> String {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let mut buf = Vec::new();
    let mut chunk = [0u8; 512];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf)
        .lines()
        .next()
        .unwrap_or_default()
        .to_string()
}

fn scene() -> RgbImage {
    RgbImage::from_fn(64, 48, |x, y| Rgb([(x * 4) as u8, (y * 5) as u8, 90]))
}

fn jpeg_bytes() -> Vec<u8> {
    let mut out = Vec::new();
    image::DynamicImage::ImageRgb8(scene())
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)
        .expect("encode jpeg");
    out
}

fn raw(class_id: u32, confidence: f32) -> RawDetection {
    RawDetection {
        bbox: BoundingBox::new(10.0, 8.0, 30.0, 40.0),
        confidence,
        class_id,
    }
}

struct Rig {
    camera: FakeServer,
    gate: FakeServer,
    detects: Arc<AtomicUsize>,
    control: ControlLoop,
}

fn rig(camera: Vec<Reply>, gate: Vec<Reply>, backend: StubBackend) -> Rig {
    let camera = FakeServer::start("/capture", camera);
    let gate = FakeServer::start("/gate", gate);
    let detects = backend.call_counter();

    let source = SnapshotSource::new(SnapshotConfig {
        url: camera.url.clone(),
        timeout: TIMEOUT,
        ..SnapshotConfig::default()
    })
    .expect("source");
    let actuator = HttpGate::new(GateConfig {
        url: gate.url.clone(),
        timeout: TIMEOUT,
    })
    .expect("gate");
    let detector = Detector::new(Box::new(backend), ClassLabels::coco());
    let control = ControlLoop::new(Box::new(source), detector, Box::new(actuator))
        .with_class_filter(ClassFilter::single(39));

    Rig {
        camera,
        gate,
        detects,
        control,
    }
}

fn ok_gate() -> Vec<Reply> {
    vec![Reply::Body(Vec::new())]
}

#[test]
fn target_in_frame_triggers_gate_once() {
    let mut rig = rig(
        vec![Reply::Body(jpeg_bytes())],
        ok_gate(),
        StubBackend::repeating(vec![raw(39, 0.83)]),
    );

    let outcome = rig.control.run_iteration();

    assert!(outcome.triggered());
    let detections = outcome.detections().unwrap();
    assert_eq!(detections.len(), 1);
    assert_eq!(detections.first().unwrap().label, "bottle");
    assert!((detections.first().unwrap().confidence - 0.83).abs() < 1e-6);
    assert_eq!((detections.frame_width, detections.frame_height), (64, 48));
    assert_eq!(rig.gate.request_count(), 1);
    assert!(rig.gate.request_lines()[0].starts_with("POST /gate"));
    assert!(rig.camera.request_lines()[0].starts_with("GET /capture"));
}

#[test]
fn empty_frame_leaves_gate_alone() {
    let mut rig = rig(vec![Reply::Body(jpeg_bytes())], ok_gate(), StubBackend::empty());

    let outcome = rig.control.run_iteration();

    assert!(matches!(outcome, IterationOutcome::Idle { .. }));
    assert_eq!(rig.detects.load(Ordering::SeqCst), 1);
    assert_eq!(rig.gate.request_count(), 0);
}

#[test]
fn other_classes_never_trigger() {
    let mut rig = rig(
        vec![Reply::Body(jpeg_bytes())],
        ok_gate(),
        StubBackend::repeating(vec![raw(0, 0.97), raw(41, 0.91)]),
    );

    let stats = rig.control.run_iterations(3);

    assert_eq!(stats.idle, 3);
    assert_eq!(stats.triggers, 0);
    assert_eq!(rig.gate.request_count(), 0);
}

#[test]
fn fetch_timeout_skips_to_next_fetch() {
    let mut rig = rig(
        vec![Reply::Silent, Reply::Body(jpeg_bytes())],
        ok_gate(),
        StubBackend::repeating(vec![raw(39, 0.83)]),
    );

    let first = rig.control.run_iteration();
    assert!(matches!(
        first,
        IterationOutcome::Skipped {
            stage: Stage::Fetch,
            ..
        }
    ));
    assert_eq!(rig.detects.load(Ordering::SeqCst), 0);
    assert_eq!(rig.gate.request_count(), 0);

    let started = Instant::now();
    let second = rig.control.run_iteration();
    assert!(second.triggered());
    assert!(started.elapsed() < Duration::from_secs(2));

    let stats = rig.control.stats();
    assert_eq!(stats.fetch_failures, 1);
    assert_eq!(stats.triggers, 1);
    assert_eq!(rig.camera.request_count(), 2);
    assert_eq!(rig.gate.request_count(), 1);
}

#[test]
fn undecodable_snapshot_never_reaches_detector() {
    let mut rig = rig(
        vec![
            Reply::Body(b"<html>camera busy</html>".to_vec()),
            Reply::Body(jpeg_bytes()),
        ],
        ok_gate(),
        StubBackend::repeating(vec![raw(39, 0.83)]),
    );

    let first = rig.control.run_iteration();
    assert!(matches!(
        first,
        IterationOutcome::Skipped {
            stage: Stage::Decode,
            ..
        }
    ));
    assert_eq!(rig.detects.load(Ordering::SeqCst), 0);

    assert!(rig.control.run_iteration().triggered());
    assert_eq!(rig.detects.load(Ordering::SeqCst), 1);
    assert_eq!(rig.control.stats().decode_failures, 1);
}

#[test]
fn empty_snapshot_body_is_a_decode_failure() {
    let mut rig = rig(
        vec![Reply::Body(Vec::new()), Reply::Body(jpeg_bytes())],
        ok_gate(),
        StubBackend::repeating(vec![raw(39, 0.83)]),
    );

    let first = rig.control.run_iteration();
    assert!(matches!(
        first,
        IterationOutcome::Skipped {
            stage: Stage::Decode,
            ..
        }
    ));
    let stats = rig.control.stats();
    assert_eq!(stats.decode_failures, 1);
    assert_eq!(stats.fetch_failures, 0);
    assert_eq!(rig.detects.load(Ordering::SeqCst), 0);
    assert_eq!(rig.gate.request_count(), 0);

    assert!(rig.control.run_iteration().triggered());
    assert_eq!(rig.camera.request_count(), 2);
}

#[test]
fn gate_timeout_does_not_stop_the_loop() {
    let mut rig = rig(
        vec![Reply::Body(jpeg_bytes())],
        vec![Reply::Silent],
        StubBackend::repeating(vec![raw(39, 0.83)]),
    );

    let stats = rig.control.run_iterations(2);

    assert_eq!(stats.iterations, 2);
    assert_eq!(stats.frames, 2);
    assert_eq!(stats.trigger_failures, 2);
    assert_eq!(stats.triggers, 0);
    assert_eq!(rig.camera.request_count(), 2);
}

/// Records a checksum of every buffer handed to inference.
struct ChecksumBackend {
    sums: Arc<Mutex<Vec<u64>>>,
}

impl DetectorBackend for ChecksumBackend {
    fn name(&self) -> &'static str {
        "checksum"
    }

    fn detect(&mut self, view: InferenceView<'_>) -> Result<Vec<RawDetection>, InferenceError> {
        let sum = view.pixels().iter().map(|&p| p as u64).sum();
        self.sums.lock().unwrap().push(sum);
        Ok(vec![raw(39, 0.9)])
    }
}

#[test]
fn preview_never_alters_inference_input() {
    let camera = FakeServer::start("/capture", vec![Reply::Body(jpeg_bytes())]);
    let gate = FakeServer::start("/gate", ok_gate());
    let dir = tempfile::tempdir().unwrap();
    let preview_path = dir.path().join("preview.png");
    let sums = Arc::new(Mutex::new(Vec::new()));

    let source = SnapshotSource::new(SnapshotConfig {
        url: camera.url.clone(),
        timeout: TIMEOUT,
        ..SnapshotConfig::default()
    })
    .unwrap();
    let actuator = HttpGate::new(GateConfig {
        url: gate.url.clone(),
        timeout: TIMEOUT,
    })
    .unwrap();
    let detector = Detector::new(
        Box::new(ChecksumBackend { sums: sums.clone() }),
        ClassLabels::coco(),
    );
    let mut control = ControlLoop::new(Box::new(source), detector, Box::new(actuator))
        .with_viewer(Box::new(SnapshotViewer::new(&preview_path)));

    let stats = control.run_iterations(3);

    let expected: u64 = image::load_from_memory(&jpeg_bytes())
        .unwrap()
        .into_rgb8()
        .as_raw()
        .iter()
        .map(|&p| p as u64)
        .sum();
    assert_eq!(stats.triggers, 3);
    assert_eq!(*sums.lock().unwrap(), vec![expected; 3]);

    let preview = image::open(&preview_path).unwrap().into_rgb8();
    assert_eq!(*preview.get_pixel(10, 30), Rgb([0, 255, 0]));
    assert_eq!(gate.request_count(), 3);
}
