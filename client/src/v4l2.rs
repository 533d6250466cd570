//! V4L2 camera source.
//!
//! The device is owned by a dedicated capture thread that keeps the most
//! recent frame in a shared slot, the same way a preview element always shows
//! the latest picture. Grabbing a frame copies that slot. Stopping the stream
//! signals the thread and joins it, which closes the device node.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use image::RgbImage;
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tokio::sync::oneshot;

use crate::camera::{CameraDevice, MediaStream};

pub struct V4l2Camera {
    device: String,
    width: u32,
    height: u32,
}

impl V4l2Camera {
    pub fn new(device: &str, width: u32, height: u32) -> Self {
        Self {
            device: device.to_string(),
            width,
            height,
        }
    }
}

#[async_trait]
impl CameraDevice for V4l2Camera {
    async fn acquire(&self) -> Result<Box<dyn MediaStream>> {
        let latest = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = oneshot::channel();

        let worker = {
            let device = self.device.clone();
            let (width, height) = (self.width, self.height);
            let latest = Arc::clone(&latest);
            let running = Arc::clone(&running);
            std::thread::Builder::new()
                .name("v4l2-capture".to_string())
                .spawn(move || capture_thread(device, width, height, latest, running, ready_tx))
                .context("Failed to spawn capture thread")?
        };

        let (width, height) = ready_rx
            .await
            .map_err(|_| anyhow!("Capture thread exited before the device was ready"))??;
        info!("V4L2 camera {} streaming at {}x{}", self.device, width, height);

        Ok(Box::new(V4l2Stream {
            device: self.device.clone(),
            latest,
            running,
            worker: Some(worker),
        }))
    }

    fn describe(&self) -> String {
        self.device.clone()
    }
}

struct V4l2Stream {
    device: String,
    latest: Arc<Mutex<Option<RgbImage>>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl MediaStream for V4l2Stream {
    fn current_frame(&mut self) -> Result<RgbImage> {
        if !self.is_live() {
            bail!("Camera {} is not streaming", self.device);
        }
        let latest = self
            .latest
            .lock()
            .map_err(|_| anyhow!("Frame slot poisoned"))?;
        latest
            .clone()
            .with_context(|| format!("Camera {} has not produced a frame yet", self.device))
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Capture thread for {} panicked", self.device);
            }
            info!("Camera {} released", self.device);
        }
    }

    fn is_live(&self) -> bool {
        self.running.load(Ordering::SeqCst)
            && self.worker.as_ref().map_or(false, |w| !w.is_finished())
    }
}

impl Drop for V4l2Stream {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_thread(
    device_path: String,
    width: u32,
    height: u32,
    latest: Arc<Mutex<Option<RgbImage>>>,
    running: Arc<AtomicBool>,
    ready: oneshot::Sender<Result<(u32, u32)>>,
) {
    use v4l::buffer::Type;
    use v4l::io::traits::CaptureStream;
    use v4l::video::Capture;

    let opened = (|| -> Result<_> {
        let mut device = v4l::Device::with_path(&device_path)
            .with_context(|| format!("open v4l2 device {}", device_path))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = width;
        format.height = height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                warn!("Failed to set RGB3 on {}: {}", device_path, err);
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        Ok((device, format))
    })();

    let (mut device, format) = match opened {
        Ok(opened) => opened,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };

    let mut stream = match v4l::prelude::MmapStream::with_buffers(&mut device, Type::VideoCapture, 4)
    {
        Ok(stream) => stream,
        Err(err) => {
            let _ = ready.send(Err(anyhow::Error::new(err).context("create v4l2 buffer stream")));
            return;
        }
    };

    let fourcc = format.fourcc;
    let (width, height) = (format.width, format.height);
    if ready.send(Ok((width, height))).is_err() {
        return;
    }

    while running.load(Ordering::SeqCst) {
        let buf = match stream.next() {
            Ok((buf, _meta)) => buf,
            Err(err) => {
                error!("Capture from {} failed: {}", device_path, err);
                break;
            }
        };

        match decode_frame(&fourcc.repr, buf, width, height) {
            Ok(frame) => {
                if let Ok(mut slot) = latest.lock() {
                    *slot = Some(frame);
                }
            }
            Err(err) => warn!("Dropping undecodable frame from {}: {}", device_path, err),
        }
    }

    running.store(false, Ordering::SeqCst);
}

fn decode_frame(fourcc: &[u8; 4], buf: &[u8], width: u32, height: u32) -> Result<RgbImage> {
    match fourcc {
        b"RGB3" => {
            let len = (width * height * 3) as usize;
            if buf.len() < len {
                bail!("short RGB3 buffer: {} < {}", buf.len(), len);
            }
            RgbImage::from_raw(width, height, buf[..len].to_vec())
                .context("RGB3 buffer does not match frame size")
        }
        b"MJPG" => Ok(image::load_from_memory(buf)
            .context("decode MJPG frame")?
            .to_rgb8()),
        b"YUYV" => yuyv_to_rgb(buf, width, height),
        other => bail!("unsupported pixel format {:?}", String::from_utf8_lossy(other)),
    }
}

fn yuyv_to_rgb(buf: &[u8], width: u32, height: u32) -> Result<RgbImage> {
    let len = (width * height * 2) as usize;
    if buf.len() < len || width % 2 != 0 {
        bail!("short or misaligned YUYV buffer");
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in buf[..len].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&yuv_pixel(y0, u, v));
        rgb.extend_from_slice(&yuv_pixel(y1, u, v));
    }
    RgbImage::from_raw(width, height, rgb).context("YUYV buffer does not match frame size")
}

fn yuv_pixel(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as f32 - 16.0;
    let d = u as f32 - 128.0;
    let e = v as f32 - 128.0;
    let clamp = |value: f32| value.round().clamp(0.0, 255.0) as u8;
    [
        clamp(1.164 * c + 1.596 * e),
        clamp(1.164 * c - 0.392 * d - 0.813 * e),
        clamp(1.164 * c + 2.017 * d),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_rgb3_buffer() {
        let buf = vec![7u8; 4 * 2 * 3];
        let frame = decode_frame(b"RGB3", &buf, 4, 2).unwrap();
        assert_eq!(frame.dimensions(), (4, 2));
        assert_eq!(frame.get_pixel(1, 1), &image::Rgb([7, 7, 7]));
    }

    #[test]
    fn yuyv_grey_stays_grey() {
        // Y=128 with neutral chroma.
        let buf = [128u8, 128, 128, 128].repeat(2);
        let frame = decode_frame(b"YUYV", &buf, 2, 2).unwrap();
        let pixel = frame.get_pixel(0, 0);
        assert_eq!(pixel[0], pixel[1]);
        assert_eq!(pixel[1], pixel[2]);
    }

    #[test]
    fn rejects_short_buffers_and_unknown_formats() {
        assert!(decode_frame(b"RGB3", &[0u8; 5], 4, 2).is_err());
        assert!(decode_frame(b"H264", &[0u8; 64], 4, 2).is_err());
    }
}
