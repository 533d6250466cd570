use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use emotion_client::analysis::NoticeKind;
use emotion_client::{
    open_camera, DeleteOutcome, HistoryCard, HistoryPage, HttpApi, ImageAnalysisPage,
    LoopSettings, RealtimeCaptureLoop, SaveOutcome, SharedView,
};
use log::{info, warn};
use shared::{Config, ResultId, StatusTone};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "emotion-client")]
#[command(about = "Face emotion analysis against the recognition server")]
struct Args {
    /// Config file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server base URL, e.g. http://127.0.0.1:5000
    #[arg(long)]
    server: Option<String>,

    #[arg(short, long)]
    username: Option<String>,

    #[arg(short, long)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a single image
    Analyze {
        file: PathBuf,

        /// Save the result on the server when faces were found
        #[arg(long)]
        save: bool,

        /// Write the annotated image returned by the server here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run the real-time camera loop until Ctrl-C
    Realtime {
        /// stub://<name>, file://<path> or a V4L2 device node
        #[arg(short, long)]
        device: Option<String>,

        #[arg(long)]
        interval_ms: Option<u64>,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,

        /// Save the last annotated frame here on exit
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// Delete saved results
    Delete {
        #[arg(required = true)]
        ids: Vec<ResultId>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(server) = args.server {
        config.server.base_url = server;
    }
    if let Some(username) = args.username {
        config.server.username = Some(username);
    }
    if let Some(password) = args.password {
        config.server.password = Some(password);
    }

    info!("Emotion client started against {}", config.server.base_url);

    let api = HttpApi::new(&config.server)?;
    if let Some((username, password)) = config.server.credentials() {
        api.login(username, password).await?;
    } else {
        warn!("No credentials configured; the server may reject requests");
    }

    match args.command {
        Command::Analyze { file, save, output } => analyze(api, file, save, output).await,
        Command::Realtime {
            device,
            interval_ms,
            duration,
            snapshot,
        } => {
            if let Some(device) = device {
                config.capture.device = device;
            }
            if let Some(interval_ms) = interval_ms {
                config.capture.interval_ms = interval_ms;
            }
            realtime(api, &config, duration.map(Duration::from_secs), snapshot).await
        }
        Command::Delete { ids, yes } => delete(api, ids, yes).await,
    }
}

async fn analyze(api: HttpApi, file: PathBuf, save: bool, output: Option<PathBuf>) -> Result<()> {
    let mut page = ImageAnalysisPage::new();
    page.analyze(&api, Some(file.as_path())).await;

    println!("{}", page.message);
    for face in &page.faces {
        println!("{}:", face.title());
        println!("  {}", face.headline);
        for emotion in &face.emotions {
            println!("    {}", emotion);
        }
    }

    if let Some(output) = output {
        match page.fetch_result_image(&api).await? {
            Some(bytes) => {
                std::fs::write(&output, bytes)
                    .with_context(|| format!("Failed to write {:?}", output))?;
                println!("Annotated image written to {}", output.display());
            }
            None => warn!("Server returned no annotated image"),
        }
    }

    if save {
        if page.save(&api).await == SaveOutcome::Unavailable {
            println!("Nothing to save.");
        }
        for notice in &page.notices {
            match notice.kind {
                NoticeKind::Success => println!("{}", notice.text),
                NoticeKind::Failure => eprintln!("{}", notice.text),
            }
        }
    }

    Ok(())
}

async fn realtime(
    api: HttpApi,
    config: &Config,
    duration: Option<Duration>,
    snapshot: Option<PathBuf>,
) -> Result<()> {
    let camera = open_camera(&config.capture)?;
    let view = SharedView::new();
    let mut capture = RealtimeCaptureLoop::new(
        Arc::from(camera),
        Arc::new(api),
        view.clone(),
        LoopSettings::from(&config.capture),
    );

    let mut revisions = view.subscribe();
    capture.start().await?;
    println!("Analyzing every {} ms, Ctrl-C to stop", config.capture.interval_ms);

    let deadline = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let mut last_status = view.status();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = &mut deadline => break,
            changed = revisions.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = view.status();
                if status != last_status {
                    print_status(status.tone, &status.text);
                    last_status = status;
                }
            }
        }
    }

    capture.stop().await;
    let status = view.status();
    print_status(status.tone, &status.text);

    if let Some(path) = snapshot {
        match view.read(|v| v.canvas.rasterize()) {
            Some(image) => {
                image
                    .save(&path)
                    .with_context(|| format!("Failed to write snapshot {:?}", path))?;
                println!("Snapshot written to {}", path.display());
            }
            None => warn!("No frame captured, snapshot skipped"),
        }
    }

    Ok(())
}

fn print_status(tone: StatusTone, text: &str) {
    match tone {
        StatusTone::Error => eprintln!("{}", text),
        StatusTone::Success | StatusTone::Neutral => println!("{}", text),
    }
}

async fn delete(api: HttpApi, mut ids: Vec<ResultId>, yes: bool) -> Result<()> {
    ids.sort();
    ids.dedup();
    let mut page = HistoryPage::new(ids.iter().copied().map(HistoryCard::new).collect());
    let mut failures = 0;

    for id in ids {
        let approved = yes || confirm_on_stdin(id).await;
        let outcome = page.delete(&api, id, |_| approved).await;
        match outcome {
            DeleteOutcome::Removed => println!("Deleted result {}", id),
            DeleteOutcome::Cancelled => println!("Skipped result {}", id),
            DeleteOutcome::NotFound => println!("Result {} is not listed", id),
            DeleteOutcome::Rejected(_) | DeleteOutcome::Failed(_) => {
                failures += 1;
                if let Some(notice) = &page.notice {
                    eprintln!("Result {}: {}", id, notice);
                }
            }
        }
    }

    if failures > 0 {
        bail!("{} deletion(s) failed", failures);
    }
    Ok(())
}

async fn confirm_on_stdin(id: ResultId) -> bool {
    let answer = tokio::task::spawn_blocking(move || {
        print!("Delete result {}? [y/N] ", id);
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().lock().read_line(&mut answer)?;
        Ok::<_, std::io::Error>(answer)
    })
    .await;

    match answer {
        Ok(Ok(answer)) => is_affirmative(&answer),
        Ok(Err(e)) => {
            warn!("Could not read confirmation: {}", e);
            false
        }
        Err(e) => {
            warn!("Confirmation prompt failed: {}", e);
            false
        }
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim(), "y" | "Y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_explicit_yes_confirms() {
        assert!(is_affirmative("y\n"));
        assert!(is_affirmative(" yes \n"));
        assert!(!is_affirmative("\n"));
        assert!(!is_affirmative("no\n"));
        assert!(!is_affirmative(""));
    }
}
