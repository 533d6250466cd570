use anyhow::{Context, Result};
use emotion_client::{
    open_camera, HttpApi, ImageAnalysisPage, LoopSettings, LoopState, RealtimeCaptureLoop,
    SharedView,
};
use shared::Config;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::app::{AnalysisSnapshot, UiMessage};

#[derive(Debug)]
pub enum BackendCommand {
    StartCapture,
    StopCapture,
    Analyze(Option<PathBuf>),
    SaveResult,
    Reconfigure(Config),
}

/// Runs the client on its own runtime so the UI thread never blocks on
/// the network or the camera.
pub fn start_backend_thread(
    config: Config,
    view: SharedView,
    tx: mpsc::Sender<UiMessage>,
) -> UnboundedSender<BackendCommand> {
    let (commands, rx) = unbounded_channel();
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(e) => {
                let _ = tx.send(UiMessage::Error(format!("Failed to start runtime: {}", e)));
                return;
            }
        };
        rt.block_on(backend_loop(config, view, rx, tx));
    });
    commands
}

struct Backend {
    api: Arc<HttpApi>,
    capture: RealtimeCaptureLoop,
    page: ImageAnalysisPage,
}

async fn connect(config: &Config, view: &SharedView) -> Result<Backend> {
    let api = Arc::new(HttpApi::new(&config.server)?);
    if let Some((username, password)) = config.server.credentials() {
        api.login(username, password).await?;
    } else {
        log::warn!("No credentials configured; the server may reject requests");
    }

    let camera = open_camera(&config.capture).context("Failed to open camera")?;
    let capture = RealtimeCaptureLoop::new(
        Arc::from(camera),
        api.clone(),
        view.clone(),
        LoopSettings::from(&config.capture),
    );

    Ok(Backend {
        api,
        capture,
        page: ImageAnalysisPage::new(),
    })
}

async fn backend_loop(
    mut config: Config,
    view: SharedView,
    mut rx: UnboundedReceiver<BackendCommand>,
    tx: mpsc::Sender<UiMessage>,
) {
    let mut backend = reconnect(&config, &view, &tx).await;

    while let Some(command) = rx.recv().await {
        if let BackendCommand::Reconfigure(new_config) = command {
            if let Some(old) = backend.as_mut() {
                old.capture.stop().await;
            }
            config = new_config;
            backend = reconnect(&config, &view, &tx).await;
            let _ = tx.send(UiMessage::CaptureState(LoopState::Idle));
            continue;
        }

        let Some(backend) = backend.as_mut() else {
            let _ = tx.send(UiMessage::Error("Not connected to the server".to_string()));
            let _ = tx.send(UiMessage::CaptureState(LoopState::Idle));
            continue;
        };

        match command {
            BackendCommand::StartCapture => {
                if let Err(e) = backend.capture.start().await {
                    let _ = tx.send(UiMessage::Error(format!("{:#}", e)));
                }
                let _ = tx.send(UiMessage::CaptureState(backend.capture.state()));
            }
            BackendCommand::StopCapture => {
                backend.capture.stop().await;
                let _ = tx.send(UiMessage::CaptureState(backend.capture.state()));
            }
            BackendCommand::Analyze(path) => {
                backend
                    .page
                    .analyze(&*backend.api, path.as_deref())
                    .await;
                let _ = tx.send(UiMessage::Analysis(snapshot(&backend.page)));

                match fetch_result_image(backend).await {
                    Ok(Some(image)) => {
                        let _ = tx.send(UiMessage::ResultImage(image));
                    }
                    Ok(None) => {}
                    Err(e) => log::warn!("Annotated image unavailable: {:#}", e),
                }
            }
            BackendCommand::SaveResult => {
                backend.page.save(&*backend.api).await;
                let _ = tx.send(UiMessage::Analysis(snapshot(&backend.page)));
            }
            BackendCommand::Reconfigure(_) => {}
        }
    }

    if let Some(backend) = backend.as_mut() {
        backend.capture.stop().await;
    }
}

async fn reconnect(
    config: &Config,
    view: &SharedView,
    tx: &mpsc::Sender<UiMessage>,
) -> Option<Backend> {
    match connect(config, view).await {
        Ok(backend) => {
            log::info!("Connected to {}", config.server.base_url);
            let _ = tx.send(UiMessage::Connected);
            Some(backend)
        }
        Err(e) => {
            log::error!("Failed to connect to {}: {:#}", config.server.base_url, e);
            let _ = tx.send(UiMessage::ConnectionFailed(format!("{:#}", e)));
            None
        }
    }
}

async fn fetch_result_image(backend: &Backend) -> Result<Option<image::RgbImage>> {
    let Some(bytes) = backend
        .page
        .fetch_result_image(&*backend.api)
        .await?
    else {
        return Ok(None);
    };
    let image = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
        .await?
        .context("Annotated image is not decodable")?;
    Ok(Some(image.to_rgb8()))
}

fn snapshot(page: &ImageAnalysisPage) -> AnalysisSnapshot {
    AnalysisSnapshot {
        busy: page.busy,
        message: page.message.clone(),
        faces: page.faces.clone(),
        notices: page.notices.clone(),
        can_save: page.can_save(),
    }
}
