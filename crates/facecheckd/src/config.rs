use facecheck_core::gate::{DEFAULT_ANALYSIS_INTERVAL, DEFAULT_MATCH_COOLDOWN};
use facecheck_core::matcher::DEFAULT_MATCH_THRESHOLD;
use facecheck_core::session::{DEFAULT_DIM_DELAY, DEFAULT_DIM_LEVEL};
use facecheck_core::{FrameGate, SessionConfig, TensorLayout};
use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Cosine similarity threshold for a positive match.
    pub similarity_threshold: f32,
    /// Minimum time between two analyzed frames.
    pub analysis_interval: Duration,
    /// Time after a match during which no new frame is analyzed.
    pub cooldown: Duration,
    /// Time without a face before the display dims.
    pub dim_delay: Duration,
    /// Clockwise rotation applied to captured frames (0, 90, 180, 270).
    pub rotation_degrees: u32,
    /// Input layout of the embedding model.
    pub embedding_layout: TensorLayout,
}

impl Config {
    /// Load configuration from `FACECHECK_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse_ms = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        let model_dir = lookup("FACECHECK_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(facecheck_core::default_model_dir);
        let db_path = lookup("FACECHECK_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| facecheck_core::data_dir().join("faces.db"));

        let embedding_layout = match lookup("FACECHECK_EMBEDDING_LAYOUT").map(|v| v.parse()) {
            Some(Ok(layout)) => layout,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "ignoring FACECHECK_EMBEDDING_LAYOUT");
                TensorLayout::default()
            }
            None => TensorLayout::default(),
        };

        Self {
            camera_device: lookup("FACECHECK_CAMERA_DEVICE").unwrap_or_else(|| "/dev/video0".to_string()),
            model_dir,
            db_path,
            similarity_threshold: lookup("FACECHECK_SIMILARITY_THRESHOLD")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MATCH_THRESHOLD),
            analysis_interval: parse_ms("FACECHECK_ANALYSIS_INTERVAL_MS", DEFAULT_ANALYSIS_INTERVAL),
            cooldown: parse_ms("FACECHECK_COOLDOWN_MS", DEFAULT_MATCH_COOLDOWN),
            dim_delay: parse_ms("FACECHECK_DIM_DELAY_MS", DEFAULT_DIM_DELAY),
            rotation_degrees: lookup("FACECHECK_ROTATION")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            embedding_layout,
        }
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join(facecheck_core::DETECTOR_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the MobileFaceNet embedding model.
    pub fn recognizer_model_path(&self) -> String {
        self.model_dir
            .join(facecheck_core::RECOGNIZER_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    pub fn frame_gate(&self) -> FrameGate {
        FrameGate::new(self.analysis_interval, self.cooldown)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            cooldown: self.cooldown,
            dim_delay: self.dim_delay,
            dim_level: DEFAULT_DIM_LEVEL,
        }
    }
}
