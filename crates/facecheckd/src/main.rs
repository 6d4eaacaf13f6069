use anyhow::{Context, Result};
use facecheck_core::{FaceDetector, FacePipeline, FaceRecognizer, Registry, Session};
use facecheck_hw::Camera;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

mod config;
mod db;
mod dbus_interface;
mod engine;
mod session_task;

use dbus_interface::{AttendanceService, DaemonInfo, BUS_NAME, OBJECT_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = config::Config::from_env();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        camera = %config.camera_device,
        models = %config.model_dir.display(),
        db = %config.db_path.display(),
        threshold = config.similarity_threshold,
        "facecheckd starting"
    );

    let db = db::FaceDb::open(&config.db_path)
        .await
        .with_context(|| format!("opening face store {}", config.db_path.display()))?;
    let registry = Registry::new(db.load_all().await?);
    tracing::info!(employees = registry.len(), "registry loaded");

    // Camera and models are required; fail fast before serving D-Bus.
    let camera = Camera::open(&config.camera_device)?;
    let detector = FaceDetector::load(&config.detector_model_path())?;
    tracing::info!(path = %config.detector_model_path(), "SCRFD detector loaded");
    let recognizer = FaceRecognizer::load(&config.recognizer_model_path(), config.embedding_layout)?;
    tracing::info!(path = %config.recognizer_model_path(), layout = ?config.embedding_layout, "embedding model loaded");
    let pipeline = FacePipeline::new(detector, recognizer).with_threshold(config.similarity_threshold);

    let (frame_tx, frame_rx) = watch::channel(None);
    let (event_tx, event_rx) = mpsc::channel(16);

    let now = Instant::now();
    let session = Session::new(config.session_config(), registry.len(), now);
    let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot(now));

    let _capture = engine::spawn_capture(camera, config.rotation_degrees, frame_tx)?;
    let (engine, _worker) =
        engine::spawn_analysis(pipeline, config.frame_gate(), registry, frame_rx, event_tx.clone())?;
    tokio::spawn(session_task::run(session, event_rx, snapshot_tx));

    let service = AttendanceService::new(
        db,
        engine,
        event_tx,
        snapshot_rx,
        DaemonInfo {
            camera_device: config.camera_device.clone(),
            similarity_threshold: config.similarity_threshold,
        },
    );
    let _conn = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await?;

    tracing::info!(bus = BUS_NAME, path = OBJECT_PATH, "facecheckd ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("facecheckd shutting down");

    Ok(())
}
