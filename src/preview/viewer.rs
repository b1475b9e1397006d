use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};

use anyhow::{Context, Result};
use image::{ImageFormat, RgbImage};

/// What the operator asked for after a refresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewerEvent {
    Continue,
    Quit,
}

/// Operator display surface, refreshed once per iteration.
pub trait Viewer {
    /// Present the annotated frame and poll for a quit request.
    fn show(&mut self, annotated: &RgbImage) -> Result<ViewerEvent>;

    /// Release display resources. Called once when the loop stops.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Quit key read from a line-oriented operator console.
///
/// A background thread reads lines; `q` (or `quit`) requests a stop. Polling
/// never blocks the loop.
pub struct QuitKey {
    rx: Receiver<()>,
}

impl QuitKey {
    /// Watch the process stdin.
    pub fn stdin() -> Self {
        Self::watch(std::io::BufReader::new(std::io::stdin()))
    }

    pub fn watch<R: BufRead + Send + 'static>(reader: R) -> Self {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            for line in reader.lines() {
                let Ok(line) = line else {
                    break;
                };
                if matches!(line.trim().to_ascii_lowercase().as_str(), "q" | "quit") {
                    let _ = tx.send(());
                    break;
                }
            }
        });
        Self { rx }
    }

    pub fn pressed(&self) -> bool {
        match self.rx.try_recv() {
            Ok(()) => true,
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => false,
        }
    }
}

/// Writes the latest annotated frame to an image file on every refresh.
///
/// The file is replaced atomically (write to a sibling temp file, then rename)
/// so external image viewers never observe a partial write.
pub struct SnapshotViewer {
    path: PathBuf,
    format: ImageFormat,
    quit_key: Option<QuitKey>,
    frames_written: u64,
    closed: bool,
}

impl SnapshotViewer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = ImageFormat::from_path(&path).unwrap_or(ImageFormat::Jpeg);
        Self {
            path,
            format,
            quit_key: None,
            frames_written: 0,
            closed: false,
        }
    }

    pub fn with_quit_key(mut self, quit_key: QuitKey) -> Self {
        self.quit_key = Some(quit_key);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "preview".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl Viewer for SnapshotViewer {
    fn show(&mut self, annotated: &RgbImage) -> Result<ViewerEvent> {
        let tmp = self.temp_path();
        annotated
            .save_with_format(&tmp, self.format)
            .with_context(|| format!("write preview frame to {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replace preview frame {}", self.path.display()))?;
        self.frames_written += 1;

        let quit = self.quit_key.as_ref().is_some_and(QuitKey::pressed);
        Ok(if quit {
            ViewerEvent::Quit
        } else {
            ViewerEvent::Continue
        })
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.quit_key = None;
        let tmp = self.temp_path();
        if tmp.exists() {
            std::fs::remove_file(&tmp)
                .with_context(|| format!("remove stale preview {}", tmp.display()))?;
        }
        log::info!(
            "preview closed after {} frames ({})",
            self.frames_written,
            self.path.display()
        );
        Ok(())
    }
}

impl Drop for SnapshotViewer {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::warn!("preview cleanup failed: {:#}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::{Duration, Instant};

    fn wait_for_quit(viewer: &mut SnapshotViewer, image: &RgbImage) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if viewer.show(image).unwrap() == ViewerEvent::Quit {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn writes_preview_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.jpg");
        let mut viewer = SnapshotViewer::new(&path);

        let event = viewer.show(&RgbImage::new(16, 16)).unwrap();

        assert_eq!(event, ViewerEvent::Continue);
        assert!(path.exists());
        assert!(!dir.path().join("preview.jpg.tmp").exists());
        let reread = image::open(&path).unwrap();
        assert_eq!((reread.width(), reread.height()), (16, 16));
        assert_eq!(viewer.frames_written(), 1);
    }

    #[test]
    fn quit_key_requests_stop() {
        let dir = tempfile::tempdir().unwrap();
        let mut viewer = SnapshotViewer::new(dir.path().join("preview.png"))
            .with_quit_key(QuitKey::watch(Cursor::new("hello\nq\n")));

        assert!(wait_for_quit(&mut viewer, &RgbImage::new(4, 4)));
    }

    #[test]
    fn other_input_does_not_quit() {
        let quit_key = QuitKey::watch(Cursor::new("x\nnope\n"));
        std::thread::sleep(Duration::from_millis(50));
        assert!(!quit_key.pressed());
    }
}
