use emotion_client::analysis::{FaceReport, Notice, PROCESSING_MESSAGE};
use emotion_client::{LoopState, SharedView};
use image::RgbImage;
use shared::Config;
use std::path::PathBuf;
use std::sync::mpsc;
use tokio::sync::mpsc::UnboundedSender;

use crate::backend_comm::{start_backend_thread, BackendCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Realtime,
    Image,
}

/// What the image tab shows, copied out of the backend's analysis page.
#[derive(Debug, Clone, Default)]
pub struct AnalysisSnapshot {
    pub busy: bool,
    pub message: String,
    pub faces: Vec<FaceReport>,
    pub notices: Vec<Notice>,
    pub can_save: bool,
}

#[derive(Debug)]
pub enum UiMessage {
    Connected,
    ConnectionFailed(String),
    CaptureState(LoopState),
    Analysis(AnalysisSnapshot),
    ResultImage(RgbImage),
    Error(String),
}

pub struct EmotionApp {
    pub tab: Tab,
    pub connected: bool,
    pub connection_error: Option<String>,
    pub capture_state: LoopState,

    /// Written by the capture loop, read every frame.
    pub view: SharedView,
    pub view_revision: Option<u64>,
    pub frame_texture: Option<egui::TextureHandle>,

    pub image_path: String,
    pub analysis: AnalysisSnapshot,
    pub result_texture: Option<egui::TextureHandle>,
    pub pending_result_image: Option<RgbImage>,

    // Settings
    pub show_settings: bool,
    pub config: Config,
    pub config_path: Option<PathBuf>,
    pub draft: Config,

    pub rx: mpsc::Receiver<UiMessage>,
    pub commands: UnboundedSender<BackendCommand>,
}

impl EmotionApp {
    pub fn new(config: Config, config_path: Option<PathBuf>) -> Self {
        let (tx, rx) = mpsc::channel();
        let view = SharedView::new();
        let commands = start_backend_thread(config.clone(), view.clone(), tx);

        Self {
            tab: Tab::Realtime,
            connected: false,
            connection_error: None,
            capture_state: LoopState::Idle,

            view,
            view_revision: None,
            frame_texture: None,

            image_path: String::new(),
            analysis: AnalysisSnapshot::default(),
            result_texture: None,
            pending_result_image: None,

            show_settings: false,
            draft: config.clone(),
            config,
            config_path,

            rx,
            commands,
        }
    }

    pub fn process_messages(&mut self) {
        while let Ok(message) = self.rx.try_recv() {
            match message {
                UiMessage::Connected => {
                    self.connected = true;
                    self.connection_error = None;
                }
                UiMessage::ConnectionFailed(error) => {
                    self.connected = false;
                    self.connection_error = Some(error);
                }
                UiMessage::CaptureState(state) => {
                    self.capture_state = state;
                }
                UiMessage::Analysis(snapshot) => {
                    self.analysis = snapshot;
                }
                UiMessage::ResultImage(image) => {
                    self.pending_result_image = Some(image);
                }
                UiMessage::Error(error) => {
                    log::error!("{}", error);
                }
            }
        }
    }

    fn send(&self, command: BackendCommand) {
        if self.commands.send(command).is_err() {
            log::error!("Backend thread is gone");
        }
    }

    pub fn start_capture(&mut self) {
        self.capture_state = LoopState::Starting;
        self.send(BackendCommand::StartCapture);
    }

    pub fn stop_capture(&mut self) {
        self.capture_state = LoopState::Stopping;
        self.send(BackendCommand::StopCapture);
    }

    pub fn analyze(&mut self) {
        let path = self.image_path.trim();
        let path = (!path.is_empty()).then(|| PathBuf::from(path));

        if path.is_some() {
            self.analysis.busy = true;
            self.analysis.message = PROCESSING_MESSAGE.to_string();
        }
        self.analysis.can_save = false;
        self.result_texture = None;
        self.send(BackendCommand::Analyze(path));
    }

    pub fn save_result(&mut self) {
        if self.analysis.can_save {
            self.send(BackendCommand::SaveResult);
        }
    }

    pub fn apply_settings(&mut self) {
        let saved = match &self.config_path {
            Some(path) => self.draft.save_to(path),
            None => self.draft.save(),
        };
        if let Err(e) = saved {
            log::error!("Failed to save config: {:#}", e);
        } else {
            log::info!("Settings saved");
        }

        self.config = self.draft.clone();
        self.connected = false;
        self.send(BackendCommand::Reconfigure(self.config.clone()));
        self.show_settings = false;
    }
}
