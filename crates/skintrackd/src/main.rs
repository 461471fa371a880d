use anyhow::Result;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod store;
mod watcher;

const BUS_NAME: &str = "org.freedesktop.SkinTrack1";
const OBJECT_PATH: &str = "/org/freedesktop/SkinTrack1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("skintrackd starting");

    let config = config::Config::load()?;
    tracing::info!(
        photo_dir = %config.photo_dir.display(),
        model_dir = %config.model_dir.display(),
        db = %config.db_path.display(),
        scan_interval_days = config.scan_interval_days,
        "configuration loaded"
    );

    let engine = engine::spawn_engine(&config)?;

    let service = dbus_interface::SkinTrackService {
        engine: engine.clone(),
    };
    let _conn = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await?;

    tracing::info!(bus = BUS_NAME, "skintrackd ready");

    let mut ticker = tokio::time::interval(Duration::from_secs(config.poll_secs.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match engine.scan(false).await {
                    Ok(outcome) => tracing::debug!(?outcome, "periodic check"),
                    Err(e) => tracing::warn!(error = %e, "periodic scan failed"),
                }
            }
            res = tokio::signal::ctrl_c() => {
                res?;
                break;
            }
        }
    }

    tracing::info!("skintrackd shutting down");
    Ok(())
}
