use crate::engine::EngineHandle;
use zbus::interface;

/// D-Bus interface for the SkinTrack daemon.
///
/// Bus name: org.freedesktop.SkinTrack1
/// Object path: /org/freedesktop/SkinTrack1
pub struct SkinTrackService {
    pub engine: EngineHandle,
}

fn failed(e: impl std::fmt::Display) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(e.to_string())
}

#[interface(name = "org.freedesktop.SkinTrack1")]
impl SkinTrackService {
    /// Scan the photo directory now, ignoring the scan interval.
    async fn scan(&self) -> zbus::fdo::Result<String> {
        tracing::info!("scan requested");
        let outcome = self.engine.scan(true).await.map_err(failed)?;
        serde_json::to_string(&outcome).map_err(failed)
    }

    /// Observation history as a JSON array, oldest first.
    async fn history(&self) -> zbus::fdo::Result<String> {
        let history = self.engine.history().await.map_err(failed)?;
        serde_json::to_string(&history).map_err(failed)
    }

    /// Verdicts over the full history.
    async fn verdicts(&self) -> zbus::fdo::Result<String> {
        let verdicts = self.engine.verdicts().await.map_err(failed)?.map_err(failed)?;
        serde_json::to_string(&verdicts).map_err(failed)
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let status = self.engine.status().await.map_err(failed)?;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "photo_dir": status.photo_dir,
            "observations": status.observations,
            "severity_classes": status.severity_classes,
            "last_checked": status.last_checked,
            "last_report": status.last_report,
        })
        .to_string())
    }
}
