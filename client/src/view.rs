//! In-memory model of what the real-time screen shows: the preview toggle,
//! the overlay canvas and the status line.
//!
//! The capture loop writes into a [`SharedView`]; frontends read it. Writers
//! never hold the lock across an await.

use image::{Rgb as Pixel, RgbImage};
use log::debug;
use shared::{
    color_for_label, face_label, AnalysisOutcome, AnalysisResponse, Region, Rgb, StatusTone,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

pub const NO_FACES_MESSAGE: &str = "No faces detected.";
pub const CAMERA_ERROR_MESSAGE: &str = "Camera access error";
pub const STOPPED_MESSAGE: &str = "Analysis stopped.";

/// Width of the stroked face boxes, in pixels.
pub const BOX_LINE_WIDTH: u32 = 2;
/// Labels sit this far above the top edge of their box.
pub const LABEL_OFFSET: f32 = 5.0;

#[derive(Debug, Clone, PartialEq)]
pub struct FaceBox {
    pub region: Region,
    pub color: Rgb,
    pub label: String,
}

impl FaceBox {
    /// Bottom-left anchor of the label text.
    pub fn label_anchor(&self) -> (f32, f32) {
        (self.region.x, self.region.y - LABEL_OFFSET)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Canvas {
    pub frame: Option<RgbImage>,
    pub boxes: Vec<FaceBox>,
}

impl Canvas {
    /// Draws a fresh frame, wiping any annotations.
    pub fn present(&mut self, frame: RgbImage) {
        self.frame = Some(frame);
        self.boxes.clear();
    }

    /// The frame with every box stroked into its pixels. Labels are left to
    /// the frontend, which has fonts.
    pub fn rasterize(&self) -> Option<RgbImage> {
        let mut image = self.frame.clone()?;
        for face in &self.boxes {
            stroke_rect(&mut image, &face.region, face.color);
        }
        Some(image)
    }
}

fn stroke_rect(image: &mut RgbImage, region: &Region, color: Rgb) {
    let pixel = Pixel([color.0, color.1, color.2]);
    let (width, height) = (image.width() as i64, image.height() as i64);
    let mut put = |x: i64, y: i64| {
        if x >= 0 && y >= 0 && x < width && y < height {
            image.put_pixel(x as u32, y as u32, pixel);
        }
    };

    // The stroke is centered on the edge, like a 2px canvas line.
    let half = (BOX_LINE_WIDTH / 2) as i64;
    let left = region.x.round() as i64;
    let top = region.y.round() as i64;
    let right = (region.x + region.w).round() as i64;
    let bottom = (region.y + region.h).round() as i64;

    for offset in -half..(BOX_LINE_WIDTH as i64 - half) {
        for x in (left - half)..=(right + half) {
            put(x, top + offset);
            put(x, bottom + offset);
        }
        for y in (top - half)..=(bottom + half) {
            put(left + offset, y);
            put(right + offset, y);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusLine {
    pub text: String,
    pub tone: StatusTone,
}

#[derive(Debug, Clone, Default)]
pub struct LiveView {
    pub preview_visible: bool,
    pub canvas: Canvas,
    pub status: StatusLine,
    /// Sequence number of the newest tick whose outcome was rendered.
    last_rendered: u64,
}

impl LiveView {
    pub fn set_status(&mut self, text: impl Into<String>, tone: StatusTone) {
        self.status = StatusLine {
            text: text.into(),
            tone,
        };
    }

    pub fn last_rendered(&self) -> u64 {
        self.last_rendered
    }

    /// Claims the overlay for tick `seq`. Fails when a newer tick already
    /// rendered, so late responses cannot overwrite fresher ones.
    fn claim(&mut self, seq: u64) -> bool {
        if seq < self.last_rendered {
            debug!(
                "Discarding stale tick {} (tick {} already rendered)",
                seq, self.last_rendered
            );
            return false;
        }
        self.last_rendered = seq;
        true
    }

    /// Renders the response for tick `seq`, analyzed on `frame`. Returns
    /// false when the response was stale and dropped.
    pub fn apply_response(&mut self, seq: u64, frame: RgbImage, response: &AnalysisResponse) -> bool {
        if !self.claim(seq) {
            return false;
        }

        match response.outcome() {
            AnalysisOutcome::Error(error) => {
                self.canvas.present(frame);
                self.set_status(format!("Error: {}", error), StatusTone::Error);
            }
            AnalysisOutcome::NoFaces => {
                self.canvas.present(frame);
                self.set_status(NO_FACES_MESSAGE, StatusTone::Error);
            }
            AnalysisOutcome::Faces(faces) => {
                self.canvas.present(frame);
                self.canvas.boxes = faces
                    .iter()
                    .filter_map(|face| {
                        face.region.map(|region| FaceBox {
                            region,
                            color: color_for_label(&face.dominant_emotion),
                            label: face_label(&face.dominant_emotion, face.confidence),
                        })
                    })
                    .collect();

                let summary = faces
                    .iter()
                    .map(|face| face_label(&face.dominant_emotion, face.confidence))
                    .collect::<Vec<_>>()
                    .join(", ");
                self.set_status(summary, StatusTone::Success);
            }
        }
        true
    }

    /// Reports a tick that never produced a response.
    pub fn apply_failure(&mut self, seq: u64, error: &str) -> bool {
        if !self.claim(seq) {
            return false;
        }
        self.set_status(format!("Analysis error: {}", error), StatusTone::Error);
        true
    }
}

/// Handle to a [`LiveView`] shared between the capture loop and a frontend.
/// Every write bumps a revision published on a watch channel.
///
/// Tick sequence numbers are drawn from the view as well, so every loop that
/// renders into it stays ordered against `last_rendered`.
#[derive(Clone)]
pub struct SharedView {
    inner: Arc<Mutex<LiveView>>,
    revision: Arc<watch::Sender<u64>>,
    seq: Arc<AtomicU64>,
}

impl Default for SharedView {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedView {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(Mutex::new(LiveView::default())),
            revision: Arc::new(revision),
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Next tick sequence number. Never reused while any handle is alive.
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn lock(&self) -> MutexGuard<'_, LiveView> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut LiveView) -> R) -> R {
        let result = f(&mut self.lock());
        self.revision.send_modify(|revision| *revision += 1);
        result
    }

    pub fn read<R>(&self, f: impl FnOnce(&LiveView) -> R) -> R {
        f(&self.lock())
    }

    pub fn status(&self) -> StatusLine {
        self.read(|view| view.status.clone())
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }
}
