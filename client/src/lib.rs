pub mod analysis;
pub mod api;
pub mod camera;
pub mod capture;
pub mod history;
#[cfg(feature = "camera-v4l2")]
pub mod v4l2;
pub mod view;

pub use analysis::{ImageAnalysisPage, SaveOutcome};
pub use api::{EmotionApi, HttpApi};
pub use camera::{open_camera, CameraDevice, MediaStream};
pub use capture::{LoopSettings, LoopState, RealtimeCaptureLoop};
pub use history::{DeleteOutcome, HistoryCard, HistoryPage};
pub use view::{LiveView, SharedView};
