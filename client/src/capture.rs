//! Real-time capture loop.
//!
//! `start` acquires the camera and installs a fixed-period ticker; every tick
//! copies the current frame onto the canvas, encodes it as JPEG and posts it
//! to the analysis service from its own task. The ticker never waits for a
//! response, so requests may overlap. Each tick carries a sequence number
//! drawn from the shared view, and the view drops an outcome once a newer
//! tick has rendered.
//!
//! `stop` cancels the ticker, waits for it to exit and releases the camera.
//! Requests already in flight are left to finish and still render.

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use log::{debug, error, info, warn};
use shared::{CaptureConfig, StatusTone};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::EmotionApi;
use crate::camera::{CameraDevice, MediaStream};
use crate::view::{SharedView, CAMERA_ERROR_MESSAGE, STOPPED_MESSAGE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub interval: Duration,
    pub jpeg_quality: u8,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from(&CaptureConfig::default())
    }
}

impl From<&CaptureConfig> for LoopSettings {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.interval_ms.max(1)),
            jpeg_quality: config.jpeg_quality.clamp(1, 100),
        }
    }
}

type SharedStream = Arc<Mutex<Box<dyn MediaStream>>>;

/// Everything that lives between a successful `start` and the next `stop`.
struct CaptureSession {
    id: Uuid,
    stream: SharedStream,
    cancel: CancellationToken,
    ticker: JoinHandle<()>,
}

/// State a tick needs, cloned into the ticker and each request task.
#[derive(Clone)]
struct TickContext {
    api: Arc<dyn EmotionApi>,
    view: SharedView,
    in_flight: Arc<AtomicUsize>,
    jpeg_quality: u8,
}

pub struct RealtimeCaptureLoop {
    camera: Arc<dyn CameraDevice>,
    settings: LoopSettings,
    state: LoopState,
    session: Option<CaptureSession>,
    ctx: TickContext,
}

impl RealtimeCaptureLoop {
    pub fn new(
        camera: Arc<dyn CameraDevice>,
        api: Arc<dyn EmotionApi>,
        view: SharedView,
        settings: LoopSettings,
    ) -> Self {
        Self {
            camera,
            ctx: TickContext {
                api,
                view,
                in_flight: Arc::new(AtomicUsize::new(0)),
                jpeg_quality: settings.jpeg_quality,
            },
            settings,
            state: LoopState::Idle,
            session: None,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    pub fn view(&self) -> &SharedView {
        &self.ctx.view
    }

    /// Requests submitted whose response has not arrived yet.
    pub fn in_flight(&self) -> usize {
        self.ctx.in_flight.load(Ordering::SeqCst)
    }

    /// Acquires the camera and starts ticking. A session that is already
    /// running is torn down first, camera included.
    pub async fn start(&mut self) -> Result<()> {
        if self.session.is_some() {
            info!("Capture loop already running, restarting");
            self.teardown().await;
        }

        self.state = LoopState::Starting;
        info!("Requesting camera {}", self.camera.describe());

        let stream = match self.camera.acquire().await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Camera access failed: {:#}", e);
                self.ctx
                    .view
                    .update(|view| view.set_status(CAMERA_ERROR_MESSAGE, StatusTone::Error));
                self.state = LoopState::Idle;
                return Err(e.context("Camera access failed"));
            }
        };

        let stream: SharedStream = Arc::new(Mutex::new(stream));
        let cancel = CancellationToken::new();
        let id = Uuid::new_v4();

        self.ctx.view.update(|view| view.preview_visible = true);

        let ticker = tokio::spawn(run_ticker(
            id,
            self.settings.interval,
            Arc::clone(&stream),
            self.ctx.clone(),
            cancel.clone(),
        ));

        self.session = Some(CaptureSession {
            id,
            stream,
            cancel,
            ticker,
        });
        self.state = LoopState::Running;
        info!(
            "Capture session {} running every {:?}",
            id, self.settings.interval
        );
        Ok(())
    }

    /// Stops ticking and releases the camera. No tick runs after this
    /// returns; requests already in flight still complete and render.
    pub async fn stop(&mut self) {
        self.state = LoopState::Stopping;
        self.teardown().await;

        self.ctx.view.update(|view| {
            view.preview_visible = false;
            view.set_status(STOPPED_MESSAGE, StatusTone::Neutral);
        });
        self.state = LoopState::Idle;
    }

    async fn teardown(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        session.cancel.cancel();
        if let Err(e) = session.ticker.await {
            error!("Ticker for session {} failed: {}", session.id, e);
        }

        stop_stream(&session.stream);
        info!(
            "Capture session {} stopped ({} requests still in flight)",
            session.id,
            self.in_flight()
        );
    }
}

impl Drop for RealtimeCaptureLoop {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel.cancel();
            session.ticker.abort();
            stop_stream(&session.stream);
        }
    }
}

fn stop_stream(stream: &SharedStream) {
    let mut stream = stream.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    stream.stop();
}

async fn run_ticker(
    session_id: Uuid,
    period: Duration,
    stream: SharedStream,
    ctx: TickContext,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Ticker for session {} shutting down", session_id);
                break;
            }
            _ = ticker.tick() => {
                tick(&stream, &ctx);
            }
        }
    }
}

/// Copies the current frame onto the canvas and hands it to a request task.
fn tick(stream: &SharedStream, ctx: &TickContext) {
    let seq = ctx.view.next_seq();

    let grabbed = {
        let mut stream = stream.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        stream.current_frame()
    };

    let frame = match grabbed {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Tick {}: frame grab failed: {:#}", seq, e);
            let message = format!("{:#}", e);
            ctx.view.update(|view| view.apply_failure(seq, &message));
            return;
        }
    };

    ctx.view.update(|view| view.canvas.present(frame.clone()));
    ctx.in_flight.fetch_add(1, Ordering::SeqCst);
    tokio::spawn(analyze_tick(seq, frame, ctx.clone()));
}

async fn analyze_tick(seq: u64, frame: RgbImage, ctx: TickContext) {
    let outcome = match encode_jpeg(&frame, ctx.jpeg_quality) {
        Ok(jpeg) => {
            debug!("Tick {}: submitting {} byte frame", seq, jpeg.len());
            ctx.api.analyze_frame(jpeg).await
        }
        Err(e) => Err(e),
    };
    ctx.in_flight.fetch_sub(1, Ordering::SeqCst);

    let rendered = match outcome {
        Ok(response) => ctx
            .view
            .update(|view| view.apply_response(seq, frame, &response)),
        Err(e) => {
            warn!("Tick {}: analysis failed: {:#}", seq, e);
            let message = format!("{:#}", e);
            ctx.view.update(|view| view.apply_failure(seq, &message))
        }
    };

    if !rendered {
        debug!("Tick {}: outcome superseded by a newer tick", seq);
    }
}

pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality)
        .encode_image(frame)
        .context("Failed to encode frame as JPEG")?;
    Ok(jpeg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_decodable_jpeg() {
        let frame = RgbImage::from_pixel(16, 12, image::Rgb([200, 100, 50]));
        let jpeg = encode_jpeg(&frame, 90).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 12));
    }

    #[test]
    fn settings_follow_capture_config() {
        let settings = LoopSettings::from(&CaptureConfig {
            interval_ms: 250,
            jpeg_quality: 0,
            ..CaptureConfig::default()
        });
        assert_eq!(settings.interval, Duration::from_millis(250));
        assert_eq!(settings.jpeg_quality, 1);
        assert_eq!(LoopSettings::default().interval, Duration::from_millis(2000));
    }
}
