//! Camera sources for the real-time loop.
//!
//! A [`CameraDevice`] hands out a [`MediaStream`] on acquisition. The stream is
//! the live feed: `current_frame` copies whatever the device shows right now,
//! and `stop` releases the device. Sources are picked from the configured
//! device string:
//!
//! - `stub://<name>`: synthetic moving pattern, no hardware
//! - `file://<path>`: a still image decoded once and served forever
//! - anything else: a V4L2 device node (needs the `camera-v4l2` feature)

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use image::RgbImage;
use log::{debug, info};
use shared::CaptureConfig;
use std::path::PathBuf;

#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// Requests access to the device. May take as long as the device needs
    /// to come up, or fail when it is missing or busy.
    async fn acquire(&self) -> Result<Box<dyn MediaStream>>;

    fn describe(&self) -> String;
}

pub trait MediaStream: Send {
    /// Copy of the frame currently on the feed, at native resolution.
    fn current_frame(&mut self) -> Result<RgbImage>;

    /// Releases the device. Calling it again is a no-op.
    fn stop(&mut self);

    fn is_live(&self) -> bool;
}

pub fn open_camera(config: &CaptureConfig) -> Result<Box<dyn CameraDevice>> {
    let device = config.device.trim();

    if let Some(name) = device.strip_prefix("stub://") {
        return Ok(Box::new(SyntheticCamera::new(name, config.width, config.height)));
    }

    if let Some(path) = device.strip_prefix("file://") {
        return Ok(Box::new(StillImageCamera::new(path)));
    }

    open_device(device, config)
}

#[cfg(feature = "camera-v4l2")]
fn open_device(device: &str, config: &CaptureConfig) -> Result<Box<dyn CameraDevice>> {
    Ok(Box::new(crate::v4l2::V4l2Camera::new(
        device,
        config.width,
        config.height,
    )))
}

#[cfg(not(feature = "camera-v4l2"))]
fn open_device(device: &str, _config: &CaptureConfig) -> Result<Box<dyn CameraDevice>> {
    Ok(Box::new(UnavailableCamera {
        device: device.to_string(),
    }))
}

/// Stands in for a hardware device when no capture backend is compiled in;
/// every acquisition fails like a missing camera would.
#[cfg(not(feature = "camera-v4l2"))]
struct UnavailableCamera {
    device: String,
}

#[cfg(not(feature = "camera-v4l2"))]
#[async_trait]
impl CameraDevice for UnavailableCamera {
    async fn acquire(&self) -> Result<Box<dyn MediaStream>> {
        bail!(
            "Camera {} unavailable: built without the camera-v4l2 feature",
            self.device
        )
    }

    fn describe(&self) -> String {
        format!("{} (no capture backend)", self.device)
    }
}

// ----------------------------------------------------------------------------
// Synthetic source
// ----------------------------------------------------------------------------

pub struct SyntheticCamera {
    name: String,
    width: u32,
    height: u32,
}

impl SyntheticCamera {
    pub fn new(name: &str, width: u32, height: u32) -> Self {
        Self {
            name: name.to_string(),
            width: width.max(1),
            height: height.max(1),
        }
    }
}

#[async_trait]
impl CameraDevice for SyntheticCamera {
    async fn acquire(&self) -> Result<Box<dyn MediaStream>> {
        info!(
            "Synthetic camera '{}' started ({}x{})",
            self.name, self.width, self.height
        );
        Ok(Box::new(SyntheticStream {
            width: self.width,
            height: self.height,
            frame_count: 0,
            live: true,
        }))
    }

    fn describe(&self) -> String {
        format!("stub://{}", self.name)
    }
}

struct SyntheticStream {
    width: u32,
    height: u32,
    frame_count: u32,
    live: bool,
}

impl MediaStream for SyntheticStream {
    fn current_frame(&mut self) -> Result<RgbImage> {
        if !self.live {
            bail!("Synthetic stream already stopped");
        }
        self.frame_count = self.frame_count.wrapping_add(1);
        let shift = self.frame_count.wrapping_mul(8);

        // Diagonal gradient that drifts a little on every frame.
        Ok(RgbImage::from_fn(self.width, self.height, |x, y| {
            let base = x.wrapping_add(y).wrapping_add(shift);
            image::Rgb([(base % 256) as u8, ((base / 2) % 256) as u8, 96])
        }))
    }

    fn stop(&mut self) {
        if self.live {
            debug!("Synthetic stream stopped after {} frames", self.frame_count);
        }
        self.live = false;
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

// ----------------------------------------------------------------------------
// Still image source
// ----------------------------------------------------------------------------

pub struct StillImageCamera {
    path: PathBuf,
}

impl StillImageCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CameraDevice for StillImageCamera {
    async fn acquire(&self) -> Result<Box<dyn MediaStream>> {
        let path = self.path.clone();
        let frame = tokio::task::spawn_blocking(move || {
            image::open(&path)
                .with_context(|| format!("Failed to open still image {:?}", path))
                .map(|image| image.to_rgb8())
        })
        .await
        .map_err(|e| anyhow!("Still image loader failed: {}", e))??;

        info!(
            "Still image camera {:?} ready ({}x{})",
            self.path,
            frame.width(),
            frame.height()
        );
        Ok(Box::new(StillImageStream { frame, live: true }))
    }

    fn describe(&self) -> String {
        format!("file://{}", self.path.display())
    }
}

struct StillImageStream {
    frame: RgbImage,
    live: bool,
}

impl MediaStream for StillImageStream {
    fn current_frame(&mut self) -> Result<RgbImage> {
        if !self.live {
            bail!("Still image stream already stopped");
        }
        Ok(self.frame.clone())
    }

    fn stop(&mut self) {
        self.live = false;
    }

    fn is_live(&self) -> bool {
        self.live
    }
}
