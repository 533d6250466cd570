//! Single-image analysis: upload a file, show per-face scores, optionally
//! save the result on the server.

use anyhow::{Context, Result};
use log::{error, info, warn};
use serde_json::Value;
use shared::{format_confidence, AnalysisOutcome, AnalysisResponse, FaceResult};
use std::path::Path;

use crate::api::EmotionApi;

pub const CHOOSE_FILE_MESSAGE: &str = "Please choose a file before analysis.";
pub const PROCESSING_MESSAGE: &str = "Processing image...";
pub const NO_FACES_IN_IMAGE_MESSAGE: &str = "No faces detected in the image.";
pub const RECOGNIZED_HEADING: &str = "Recognized emotions:";
pub const SAVED_MESSAGE: &str = "Result saved!";
pub const SAVE_FAILED_MESSAGE: &str = "Error while saving.";

#[derive(Debug, Clone, PartialEq)]
pub struct FaceReport {
    /// 1-based position in the response.
    pub index: usize,
    /// `Dominant emotion: happy (83.00%)`
    pub headline: String,
    /// `label: 12.34%` for every emotion the server scored.
    pub emotions: Vec<String>,
}

impl FaceReport {
    fn from_face(index: usize, face: &FaceResult) -> Self {
        Self {
            index,
            headline: format!(
                "Dominant emotion: {} ({})",
                face.dominant_emotion,
                format_confidence(face.confidence)
            ),
            emotions: face
                .emotions
                .iter()
                .map(|(label, probability)| format!("{}: {}", label, format_confidence(*probability)))
                .collect(),
        }
    }

    pub fn title(&self) -> String {
        format!("Face {}", self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    Rejected,
    Failed,
    /// No non-empty analysis to save.
    Unavailable,
}

#[derive(Debug, Default)]
pub struct ImageAnalysisPage {
    /// True while an upload is outstanding.
    pub busy: bool,
    pub message: String,
    pub faces: Vec<FaceReport>,
    pub notices: Vec<Notice>,
    pub result_image_url: Option<String>,
    /// Last non-empty analysis body, kept verbatim for saving.
    last_result: Option<Value>,
}

impl ImageAnalysisPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// The save action only exists once a non-empty result is on screen.
    pub fn can_save(&self) -> bool {
        self.last_result.is_some() && !self.faces.is_empty()
    }

    pub fn last_result(&self) -> Option<&Value> {
        self.last_result.as_ref()
    }

    pub async fn analyze(&mut self, api: &dyn EmotionApi, path: Option<&Path>) {
        self.faces.clear();
        self.notices.clear();
        self.last_result = None;
        self.result_image_url = None;

        let Some(path) = path else {
            self.message = CHOOSE_FILE_MESSAGE.to_string();
            return;
        };

        self.busy = true;
        self.message = PROCESSING_MESSAGE.to_string();

        match self.submit(api, path).await {
            Ok(body) => self.render(body),
            Err(e) => {
                error!("Analysis of {:?} failed: {:#}", path, e);
                self.message = format!("Analysis error: {:#}", e);
            }
        }

        self.busy = false;
    }

    async fn submit(&self, api: &dyn EmotionApi, path: &Path) -> Result<Value> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {:?}", path))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        info!("Uploading {} ({} bytes)", file_name, bytes.len());
        api.analyze_image(&file_name, bytes).await
    }

    fn render(&mut self, body: Value) {
        let response: AnalysisResponse = match serde_json::from_value(body.clone()) {
            Ok(response) => response,
            Err(e) => {
                self.message = format!("Analysis error: {}", e);
                return;
            }
        };

        match response.outcome() {
            AnalysisOutcome::Error(error) => {
                self.message = format!("Error: {}", error);
                return;
            }
            AnalysisOutcome::NoFaces => {
                self.message = NO_FACES_IN_IMAGE_MESSAGE.to_string();
            }
            AnalysisOutcome::Faces(faces) => {
                self.message = RECOGNIZED_HEADING.to_string();
                self.faces = faces
                    .iter()
                    .enumerate()
                    .map(|(i, face)| FaceReport::from_face(i + 1, face))
                    .collect();
                self.last_result = Some(body);
            }
        }

        self.result_image_url = response.result_image_url;
    }

    pub async fn save(&mut self, api: &dyn EmotionApi) -> SaveOutcome {
        let Some(result) = self.last_result.as_ref().filter(|_| self.can_save()) else {
            warn!("Save requested without a result to save");
            return SaveOutcome::Unavailable;
        };

        match api.save_result(result).await {
            Ok(response) if response.success => {
                info!("Result saved");
                self.push_notice(NoticeKind::Success, SAVED_MESSAGE.to_string());
                SaveOutcome::Saved
            }
            Ok(response) => {
                let text = match response.error {
                    Some(error) if !error.is_empty() => format!("{} {}", SAVE_FAILED_MESSAGE, error),
                    _ => SAVE_FAILED_MESSAGE.to_string(),
                };
                self.push_notice(NoticeKind::Failure, text);
                SaveOutcome::Rejected
            }
            Err(e) => {
                error!("Save failed: {:#}", e);
                self.push_notice(NoticeKind::Failure, format!("Error: {:#}", e));
                SaveOutcome::Failed
            }
        }
    }

    /// Downloads the annotated image the server rendered for the last analysis.
    pub async fn fetch_result_image(&self, api: &dyn EmotionApi) -> Result<Option<Vec<u8>>> {
        match self.result_image_url.as_deref() {
            Some(url) => Ok(Some(api.fetch_bytes(url).await?)),
            None => Ok(None),
        }
    }

    fn push_notice(&mut self, kind: NoticeKind, text: String) {
        self.notices.push(Notice { kind, text });
    }
}
