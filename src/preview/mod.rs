//! Optional operator preview.
//!
//! Draws detection overlays on a copy of each frame and hands it to a
//! `Viewer`. The preview path never feeds back into detection or triggering.

mod overlay;
mod viewer;

pub use overlay::{annotate, OverlayStyle};
pub use viewer::{QuitKey, SnapshotViewer, Viewer, ViewerEvent};
