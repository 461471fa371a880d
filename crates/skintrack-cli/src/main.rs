use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use skintrack_core::tendency::{self, TendencyError};
use skintrack_core::{
    CollectingSink, FaceImage, ModelBundle, ObservationHistory, Photo, PipelineSettings,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "skintrack", about = "SkinTrack acne tendency CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline over a photo directory, bypassing the daemon
    Analyze {
        /// Reference face image of the tracked person
        #[arg(long)]
        reference: PathBuf,
        /// Directory of photos, processed in file-name order
        #[arg(long)]
        photos: PathBuf,
        /// Model directory (defaults to $XDG_DATA_HOME/skintrack/models)
        #[arg(long)]
        models: Option<PathBuf>,
        /// Embedding distance below which a face matches the reference
        #[arg(long)]
        threshold: Option<f32>,
    },
    /// Print verdicts for a saved observation history (JSON array)
    Reduce {
        history: PathBuf,
    },
    /// Ask the daemon to scan its photo directory now
    Scan,
    /// Show the daemon's observation history
    History,
    /// Show the daemon's current verdicts
    Verdicts,
    /// Show daemon status
    Status,
}

#[zbus::proxy(
    interface = "org.freedesktop.SkinTrack1",
    default_service = "org.freedesktop.SkinTrack1",
    default_path = "/org/freedesktop/SkinTrack1"
)]
trait SkinTrack {
    async fn scan(&self) -> zbus::Result<String>;
    async fn history(&self) -> zbus::Result<String>;
    async fn verdicts(&self) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

fn photo_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut photos = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        if skintrack_core::is_photo(&path) && path.is_file() {
            photos.push(path);
        }
    }
    photos.sort();
    Ok(photos)
}

fn analyze(reference: &Path, photos: &Path, models: Option<PathBuf>, threshold: Option<f32>) -> Result<()> {
    let mut settings = PipelineSettings::default();
    if let Some(t) = threshold {
        settings.match_threshold = t;
    }
    let bundle = ModelBundle::new(models.unwrap_or_else(skintrack_core::default_model_dir));
    let mut pipeline = bundle
        .load_pipeline(settings)
        .with_context(|| format!("loading models from {}", bundle.dir().display()))?;

    let reference = FaceImage::open(reference)
        .with_context(|| format!("loading reference {}", reference.display()))?;
    let files = photo_files(photos)?;
    eprintln!("Analyzing {} photo(s) from {}", files.len(), photos.display());

    let sink = CollectingSink::new();
    let report = pipeline.run(&reference, files.iter().map(Photo::open), &sink)?;

    for message in sink.take() {
        eprintln!("  {message}");
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn reduce(path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let history: ObservationHistory =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;

    match tendency::summarize(history.as_slice()) {
        Ok(events) => println!("{}", serde_json::to_string_pretty(&events)?),
        Err(TendencyError::InsufficientHistory(n)) => {
            println!("Not enough observations to compare ({n}, need at least 2)");
        }
    }
    Ok(())
}

/// Pretty-print a JSON string returned by the daemon.
fn print_json(raw: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

async fn daemon() -> Result<SkinTrackProxy<'static>> {
    let conn = zbus::Connection::session().await?;
    SkinTrackProxy::new(&conn)
        .await
        .context("skintrackd not reachable on the session bus")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            reference,
            photos,
            models,
            threshold,
        } => analyze(&reference, &photos, models, threshold)?,
        Commands::Reduce { history } => reduce(&history)?,
        Commands::Scan => {
            println!("Scanning...");
            print_json(&daemon().await?.scan().await?)?;
        }
        Commands::History => print_json(&daemon().await?.history().await?)?,
        Commands::Verdicts => print_json(&daemon().await?.verdicts().await?)?,
        Commands::Status => print_json(&daemon().await?.status().await?)?,
    }

    Ok(())
}
