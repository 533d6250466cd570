#![allow(dead_code)]

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use emotion_client::{CameraDevice, EmotionApi, MediaStream};
use image::RgbImage;
use serde_json::Value;
use shared::{ActionResponse, AnalysisResponse, FaceResult, Region, ResultId};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn face(emotion: &str, confidence: f64) -> FaceResult {
    FaceResult {
        region: Some(Region {
            x: 4.0,
            y: 8.0,
            w: 10.0,
            h: 12.0,
        }),
        dominant_emotion: emotion.to_string(),
        confidence,
        emotions: [(emotion.to_string(), confidence)].into_iter().collect(),
    }
}

pub fn faces(faces: Vec<FaceResult>) -> AnalysisResponse {
    AnalysisResponse {
        results: faces,
        ..AnalysisResponse::default()
    }
}

struct ScriptedFrame {
    latency: Duration,
    reply: Result<AnalysisResponse, String>,
}

/// Scripted stand-in for the analysis service.
#[derive(Default)]
pub struct MockApi {
    frame_script: Mutex<VecDeque<ScriptedFrame>>,
    image_reply: Mutex<Option<Result<Value, String>>>,
    save_reply: Mutex<Option<Result<ActionResponse, String>>>,
    delete_replies: Mutex<HashMap<ResultId, Result<ActionResponse, String>>>,
    pub frame_calls: AtomicUsize,
    pub uploads: Mutex<Vec<(String, usize)>>,
    pub saved: Mutex<Vec<Value>>,
    pub deleted: Mutex<Vec<ResultId>>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues the reply for the next realtime frame. Unscripted frames get
    /// an immediate empty result.
    pub fn push_frame(&self, latency: Duration, reply: Result<AnalysisResponse, &str>) {
        self.frame_script.lock().unwrap().push_back(ScriptedFrame {
            latency,
            reply: reply.map_err(str::to_string),
        });
    }

    pub fn set_image_reply(&self, reply: Result<Value, &str>) {
        *self.image_reply.lock().unwrap() = Some(reply.map_err(str::to_string));
    }

    pub fn set_save_reply(&self, reply: Result<ActionResponse, &str>) {
        *self.save_reply.lock().unwrap() = Some(reply.map_err(str::to_string));
    }

    pub fn set_delete_reply(&self, id: u64, reply: Result<ActionResponse, &str>) {
        self.delete_replies
            .lock()
            .unwrap()
            .insert(ResultId(id), reply.map_err(str::to_string));
    }

    pub fn frame_calls(&self) -> usize {
        self.frame_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmotionApi for MockApi {
    async fn analyze_image(&self, file_name: &str, bytes: Vec<u8>) -> Result<Value> {
        self.uploads
            .lock()
            .unwrap()
            .push((file_name.to_string(), bytes.len()));
        let reply = self.image_reply.lock().unwrap().clone();
        match reply {
            Some(reply) => reply.map_err(|e| anyhow!(e)),
            None => Ok(serde_json::json!({ "results": [] })),
        }
    }

    async fn analyze_frame(&self, _jpeg: Vec<u8>) -> Result<AnalysisResponse> {
        self.frame_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.frame_script.lock().unwrap().pop_front();
        let Some(scripted) = scripted else {
            return Ok(AnalysisResponse::default());
        };
        if !scripted.latency.is_zero() {
            tokio::time::sleep(scripted.latency).await;
        }
        scripted.reply.map_err(|e| anyhow!(e))
    }

    async fn save_result(&self, analysis: &Value) -> Result<ActionResponse> {
        self.saved.lock().unwrap().push(analysis.clone());
        let reply = self.save_reply.lock().unwrap().clone();
        match reply {
            Some(reply) => reply.map_err(|e| anyhow!(e)),
            None => Ok(ActionResponse {
                success: true,
                error: None,
            }),
        }
    }

    async fn delete_result(&self, id: ResultId) -> Result<ActionResponse> {
        self.deleted.lock().unwrap().push(id);
        let reply = self.delete_replies.lock().unwrap().remove(&id);
        match reply {
            Some(reply) => reply.map_err(|e| anyhow!(e)),
            None => Ok(ActionResponse {
                success: true,
                error: None,
            }),
        }
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        Ok(url.as_bytes().to_vec())
    }
}

/// Camera that counts acquisitions, live streams and grabbed frames.
#[derive(Default)]
pub struct FakeCamera {
    fail: bool,
    acquired: AtomicUsize,
    live: Arc<AtomicUsize>,
    grabs: Arc<AtomicUsize>,
}

impl FakeCamera {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn denied() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn grabs(&self) -> usize {
        self.grabs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CameraDevice for FakeCamera {
    async fn acquire(&self) -> Result<Box<dyn MediaStream>> {
        if self.fail {
            bail!("Permission denied");
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            live: Arc::clone(&self.live),
            grabs: Arc::clone(&self.grabs),
            stopped: false,
        }))
    }

    fn describe(&self) -> String {
        "fake".to_string()
    }
}

struct FakeStream {
    live: Arc<AtomicUsize>,
    grabs: Arc<AtomicUsize>,
    stopped: bool,
}

impl MediaStream for FakeStream {
    fn current_frame(&mut self) -> Result<RgbImage> {
        if self.stopped {
            bail!("stream stopped");
        }
        self.grabs.fetch_add(1, Ordering::SeqCst);
        Ok(RgbImage::new(32, 24))
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_live(&self) -> bool {
        !self.stopped
    }
}
