use crate::config::{Config, ConfigError};
use crate::store::{HistoryStore, RunRecord, StoreError};
use crate::watcher::{self, ScanDecision};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use skintrack_core::loader::LoadError;
use skintrack_core::pipeline::PipelineError;
use skintrack_core::tendency::{self, TendencyError};
use skintrack_core::types::ImageError;
use skintrack_core::{AcnePipeline, FaceImage, NotificationSink, ObservationHistory, Photo, RunReport, TracingSink, VerdictEvent};
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("model loading: {0}")]
    Load(#[from] LoadError),
    #[error("reference face: {0}")]
    Reference(#[from] ImageError),
    #[error("pipeline: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("listing photos: {0}")]
    Photos(#[from] std::io::Error),
    #[error("spawning engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Outcome of a scan request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScanOutcome {
    /// First periodic check: baseline recorded, nothing processed.
    Baseline,
    /// Periodic check inside the scan interval. `next_due` is `None` when it
    /// falls past the representable calendar.
    NotDue { next_due: Option<DateTime<Utc>> },
    /// No photos since the last scan.
    NoNewPhotos,
    Completed { report: RunReport },
}

/// Snapshot for the D-Bus `Status` call.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub photo_dir: String,
    pub observations: usize,
    pub severity_classes: usize,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_report: Option<RunReport>,
}

enum EngineRequest {
    Scan {
        force: bool,
        reply: oneshot::Sender<Result<ScanOutcome, EngineError>>,
    },
    History {
        reply: oneshot::Sender<ObservationHistory>,
    },
    Verdicts {
        reply: oneshot::Sender<Result<Vec<VerdictEvent>, TendencyError>>,
    },
    Status {
        reply: oneshot::Sender<Result<EngineStatus, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Scan the photo directory. `force` skips the interval check.
    pub async fn scan(&self, force: bool) -> Result<ScanOutcome, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Scan { force, reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn history(&self) -> Result<ObservationHistory, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::History { reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Verdicts over the full history, `NoChange` when there are none.
    pub async fn verdicts(&self) -> Result<Result<Vec<VerdictEvent>, TendencyError>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Verdicts { reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Status { reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    async fn send(&self, request: EngineRequest) -> Result<(), EngineError> {
        self.tx.send(request).await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Everything the engine thread owns.
struct Engine {
    pipeline: AcnePipeline,
    reference: FaceImage,
    store: HistoryStore,
    photo_dir: PathBuf,
    scan_interval: Duration,
    sink: Box<dyn NotificationSink + Send>,
}

/// Spawn the engine on a dedicated OS thread.
///
/// Loads the reference face, every model and the stored history
/// synchronously, so a missing artifact fails before any request is served.
pub fn spawn_engine(config: &Config) -> Result<EngineHandle, EngineError> {
    let scan_interval = config.scan_interval()?;
    let reference = FaceImage::open(&config.reference_path)?;
    tracing::info!(
        path = %config.reference_path.display(),
        width = reference.width(),
        height = reference.height(),
        "reference face loaded"
    );

    let store = HistoryStore::open(&config.db_path)?;
    let history = store.load_history()?;
    tracing::info!(observations = history.len(), "history restored");

    let pipeline = skintrack_core::ModelBundle::new(&config.model_dir)
        .load_pipeline(config.pipeline_settings())?
        .with_history(history);

    let mut engine = Engine {
        pipeline,
        reference,
        store,
        photo_dir: config.photo_dir.clone(),
        scan_interval,
        sink: Box::new(TracingSink),
    };

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("skintrack-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Scan { force, reply } => {
                        let _ = reply.send(engine.scan(force, Utc::now()));
                    }
                    EngineRequest::History { reply } => {
                        let _ = reply.send(engine.pipeline.history().clone());
                    }
                    EngineRequest::Verdicts { reply } => {
                        let _ = reply.send(tendency::summarize(engine.pipeline.history().as_slice()));
                    }
                    EngineRequest::Status { reply } => {
                        let _ = reply.send(engine.status());
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

impl Engine {
    fn scan(&mut self, force: bool, now: DateTime<Utc>) -> Result<ScanOutcome, EngineError> {
        if !force {
            let last_checked = self.store.last_checked()?;
            match watcher::scan_decision(last_checked, now, self.scan_interval) {
                ScanDecision::Baseline => {
                    tracing::info!("first check; recording baseline");
                    self.store.set_last_checked(now)?;
                    return Ok(ScanOutcome::Baseline);
                }
                ScanDecision::TooSoon => {
                    let next_due = last_checked
                        .unwrap_or(now)
                        .checked_add_signed(self.scan_interval);
                    tracing::debug!(?next_due, "scan not due");
                    return Ok(ScanOutcome::NotDue { next_due });
                }
                ScanDecision::Due => {}
            }
        }

        let processed = self.store.processed_photos()?;
        let photos = watcher::new_photos(watcher::list_photos(&self.photo_dir)?, &processed);
        if photos.is_empty() {
            tracing::info!(dir = %self.photo_dir.display(), "no new photos");
            self.store.set_last_checked(now)?;
            return Ok(ScanOutcome::NoNewPhotos);
        }
        tracing::info!(count = photos.len(), force, "scanning new photos");

        let before = self.pipeline.history().len();
        let report = self
            .pipeline
            .run(&self.reference, photos.iter().map(Photo::open), self.sink.as_ref())?;

        let keys: Vec<String> = photos.iter().map(|p| watcher::photo_key(p)).collect();
        let recorded = self.store.record_run(&RunRecord {
            started_at: now,
            finished_at: Utc::now(),
            report: &report,
            observations: &self.pipeline.history().as_slice()[before..],
            photos: &keys,
        });
        let run_id = match recorded {
            Ok(id) => id,
            Err(e) => {
                // Unpersisted photos are retried next scan; keep memory in step.
                self.pipeline.rollback_history(before);
                return Err(e.into());
            }
        };
        self.store.set_last_checked(now)?;

        tracing::info!(
            run = %run_id,
            verdicts = report.verdicts.len(),
            "scan complete"
        );
        Ok(ScanOutcome::Completed { report })
    }

    fn status(&self) -> Result<EngineStatus, EngineError> {
        Ok(EngineStatus {
            photo_dir: self.photo_dir.display().to_string(),
            observations: self.pipeline.history().len(),
            severity_classes: self.pipeline.classifier().labels().len(),
            last_checked: self.store.last_checked()?,
            last_report: self.store.last_report()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use image::{Rgb, RgbImage};
    use skintrack_core::detector::DetectorError;
    use skintrack_core::model::ModelError;
    use skintrack_core::{
        AcneClassifier, AcneObservation, BoundingBox, CollectingSink, FaceCropExtractor,
        FaceDetector, FaceSimilarityGate, InferenceModel, LabelSet, VerdictKind,
    };
    use std::path::Path;

    const CLEAR: [u8; 3] = [0, 255, 0];
    const SEVERE: [u8; 3] = [255, 0, 0];

    /// Maps the mean R, G, B of the input tensor to an output.
    struct MeanModel(fn([f32; 3]) -> Vec<f32>);

    impl InferenceModel for MeanModel {
        fn input_size(&self) -> (u32, u32) {
            (4, 4)
        }

        fn infer(&mut self, input: &[f32]) -> Result<Vec<f32>, ModelError> {
            let pixels = (input.len() / 3).max(1) as f32;
            let mut mean = [0.0f32; 3];
            for px in input.chunks_exact(3) {
                for (m, v) in mean.iter_mut().zip(px) {
                    *m += v;
                }
            }
            Ok((self.0)(mean.map(|m| m / pixels)))
        }
    }

    /// One centered face per photo.
    struct CenterFace;

    impl FaceDetector for CenterFace {
        fn detect(&mut self, _photo: &FaceImage) -> Result<Vec<BoundingBox>, DetectorError> {
            Ok(vec![BoundingBox { x: 0.25, y: 0.2, width: 0.5, height: 0.5, confidence: 0.9 }])
        }
    }

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("skintrack-engine-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_photo(dir: &Path, name: &str, rgb: [u8; 3]) {
        RgbImage::from_pixel(32, 32, Rgb(rgb)).save(dir.join(name)).unwrap();
    }

    /// Red selects severity class 1; green is the clear-skin probability.
    fn engine(photo_dir: &Path, store: HistoryStore) -> Engine {
        let classifier = AcneClassifier::new(
            Box::new(MeanModel(|[r, _, _]: [f32; 3]| vec![1.0 - r, r])),
            Box::new(MeanModel(|[_, g, _]: [f32; 3]| vec![g])),
            LabelSet::new(vec!["mild".into(), "severe".into()]),
            0.45,
        )
        .unwrap();
        let history = store.load_history().unwrap();
        let pipeline = AcnePipeline::new(
            Box::new(CenterFace),
            FaceSimilarityGate::new(Box::new(MeanModel(|_: [f32; 3]| vec![0.0, 0.0])), "test"),
            FaceCropExtractor::new(16, 16),
            classifier,
            1.0,
        )
        .with_history(history);

        Engine {
            pipeline,
            reference: FaceImage::from_dynamic(RgbImage::from_pixel(32, 32, Rgb(CLEAR)).into()),
            store,
            photo_dir: photo_dir.to_path_buf(),
            scan_interval: Duration::days(20),
            sink: Box::new(CollectingSink::new()),
        }
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, day, 8, 0, 0).unwrap()
    }

    fn completed(outcome: ScanOutcome) -> RunReport {
        match outcome {
            ScanOutcome::Completed { report } => report,
            other => panic!("expected a completed scan, got {other:?}"),
        }
    }

    #[test]
    fn test_periodic_scan_schedule() {
        let dir = temp_dir();
        write_photo(&dir, "01.png", CLEAR);
        let mut engine = engine(&dir, HistoryStore::open_in_memory().unwrap());

        assert!(matches!(engine.scan(false, at(1)).unwrap(), ScanOutcome::Baseline));
        assert_eq!(engine.store.last_checked().unwrap(), Some(at(1)));
        assert!(engine.pipeline.history().is_empty());

        match engine.scan(false, at(10)).unwrap() {
            ScanOutcome::NotDue { next_due } => assert_eq!(next_due, Some(at(21))),
            other => panic!("expected not due, got {other:?}"),
        }

        let report = completed(engine.scan(false, at(21)).unwrap());
        assert_eq!(report.observations_added, 1);
        assert_eq!(engine.store.last_checked().unwrap(), Some(at(21)));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_forced_scan_processes_only_new_photos() {
        let dir = temp_dir();
        write_photo(&dir, "01.png", CLEAR);
        write_photo(&dir, "02.png", SEVERE);
        let mut engine = engine(&dir, HistoryStore::open_in_memory().unwrap());

        let report = completed(engine.scan(true, at(1)).unwrap());
        assert_eq!(report.observations_added, 2);
        assert_eq!(report.verdicts.iter().map(|v| v.kind).collect::<Vec<_>>(), vec![VerdictKind::AcneAppeared]);
        let processed = engine.store.processed_photos().unwrap();
        assert!(processed.contains(&watcher::photo_key(&dir.join("01.png"))));
        assert!(processed.contains(&watcher::photo_key(&dir.join("02.png"))));

        assert!(matches!(engine.scan(true, at(2)).unwrap(), ScanOutcome::NoNewPhotos));

        write_photo(&dir, "03.png", SEVERE);
        let report = completed(engine.scan(true, at(3)).unwrap());
        assert_eq!(report.observations_added, 1);

        let expected = [
            AcneObservation::new(false, 0),
            AcneObservation::new(true, 1),
            AcneObservation::new(true, 1),
        ];
        assert_eq!(engine.pipeline.history().as_slice(), &expected);
        assert_eq!(engine.store.load_history().unwrap().as_slice(), &expected);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_restart_resumes_from_store() {
        let dir = temp_dir();
        let db = dir.join("history.db");
        let photos = dir.join("photos");
        std::fs::create_dir_all(&photos).unwrap();
        write_photo(&photos, "01.png", CLEAR);
        write_photo(&photos, "02.png", SEVERE);

        let mut first = engine(&photos, HistoryStore::open(&db).unwrap());
        completed(first.scan(true, at(1)).unwrap());
        drop(first);

        let mut second = engine(&photos, HistoryStore::open(&db).unwrap());
        assert_eq!(second.pipeline.history().len(), 2);
        assert!(matches!(second.scan(true, at(2)).unwrap(), ScanOutcome::NoNewPhotos));

        let status = second.status().unwrap();
        assert_eq!(status.observations, 2);
        assert_eq!(status.severity_classes, 2);
        assert_eq!(status.last_report.unwrap().observations_added, 2);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_failed_persist_leaves_history_untouched() {
        let dir = temp_dir();
        let db = dir.join("history.db");
        let photos = dir.join("photos");
        std::fs::create_dir_all(&photos).unwrap();
        write_photo(&photos, "01.png", CLEAR);
        write_photo(&photos, "02.png", SEVERE);

        let mut engine = engine(&photos, HistoryStore::open(&db).unwrap());
        rusqlite::Connection::open(&db)
            .unwrap()
            .execute_batch("DROP TABLE runs")
            .unwrap();

        let result = engine.scan(true, at(1));
        assert!(matches!(result, Err(EngineError::Store(_))));
        assert!(engine.pipeline.history().is_empty());
        assert!(engine.store.processed_photos().unwrap().is_empty());

        // Reopening recreates the table; the retry sees each photo once.
        engine.store = HistoryStore::open(&db).unwrap();
        let report = completed(engine.scan(true, at(2)).unwrap());
        assert_eq!(report.observations_added, 2);
        assert_eq!(engine.pipeline.history().len(), 2);
        assert_eq!(engine.store.load_history().unwrap().len(), 2);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_next_due_past_calendar_is_none() {
        let dir = temp_dir();
        let mut engine = engine(&dir, HistoryStore::open_in_memory().unwrap());
        engine.scan_interval = Duration::try_days(1_000_000_000).unwrap();
        engine.store.set_last_checked(at(1)).unwrap();

        match engine.scan(false, at(2)).unwrap() {
            ScanOutcome::NotDue { next_due } => assert_eq!(next_due, None),
            other => panic!("expected not due, got {other:?}"),
        }

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
