use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Pixel-space bounding box of a detected face within the source frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,
    pub dominant_emotion: String,
    /// Percentage in 0..=100.
    pub confidence: f64,
    #[serde(default)]
    pub emotions: BTreeMap<String, f64>,
}

/// Body returned by `/analyze` and `/analyze_realtime`.
///
/// The server answers either with `results` or with `error`, sometimes with a
/// non-2xx status; both shapes decode into this struct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    #[serde(default)]
    pub results: Vec<FaceResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What a response means for rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnalysisOutcome<'a> {
    Error(&'a str),
    NoFaces,
    Faces(&'a [FaceResult]),
}

impl AnalysisResponse {
    pub fn outcome(&self) -> AnalysisOutcome<'_> {
        match self.error.as_deref() {
            Some(error) if !error.is_empty() => AnalysisOutcome::Error(error),
            _ if self.results.is_empty() => AnalysisOutcome::NoFaces,
            _ => AnalysisOutcome::Faces(&self.results),
        }
    }
}

/// Body returned by `/save_result` and `/delete_result/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Identifier of a saved result on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultId(pub u64);

impl fmt::Display for ResultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ResultId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(ResultId)
    }
}
