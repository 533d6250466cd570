mod app;
mod backend_comm;
mod ui;

use anyhow::Result;
use app::EmotionApp;
use clap::Parser;
use eframe::egui;
use shared::Config;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "emotion-popup")]
#[command(about = "Face emotion analysis window")]
struct Args {
    /// Config file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server base URL, overrides the config file
    #[arg(long)]
    server: Option<String>,

    /// Camera device, overrides the config file
    #[arg(short, long)]
    device: Option<String>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(server) = args.server {
        config.server.base_url = server;
    }
    if let Some(device) = args.device {
        config.capture.device = device;
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([config.ui.window_width, config.ui.window_height])
            .with_title("Emotion Lens"),
        ..Default::default()
    };

    eframe::run_native(
        "Emotion Lens",
        options,
        Box::new(|_cc| Ok(Box::new(EmotionApp::new(config, args.config)))),
    )
    .map_err(|e| anyhow::anyhow!("Failed to run egui app: {}", e))
}
