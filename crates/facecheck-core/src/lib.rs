//! facecheck-core — Face match pipeline for attendance check-in.
//!
//! SCRFD face detection and MobileFaceNet embeddings run via ONNX Runtime;
//! both sit behind small traits so the pipeline can be driven by any
//! detector or embedding model.

pub mod crop;
pub mod detector;
pub mod gate;
pub mod matcher;
pub mod overlay;
pub mod pipeline;
pub mod recognizer;
pub mod registry;
pub mod session;
pub mod types;

pub use crop::TensorLayout;
pub use detector::{Detector, FaceDetector};
pub use gate::FrameGate;
pub use matcher::{CosineMatcher, Matcher};
pub use pipeline::{FacePipeline, PipelineError, Recognition};
pub use recognizer::{Embedder, FaceRecognizer};
pub use registry::Registry;
pub use session::{Session, SessionConfig, SessionSnapshot};
pub use types::{BoundingBox, Embedding, FaceProfile, EMBEDDING_DIM};

/// Detector model file name inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "scrfd_500m.onnx";
/// Embedding model file name inside the model directory.
pub const RECOGNIZER_MODEL_FILE: &str = "mobile_facenet.onnx";

/// Default model directory: `$XDG_DATA_HOME/facecheck/models`.
pub fn default_model_dir() -> std::path::PathBuf {
    data_dir().join("models")
}

/// Per-user data directory for facecheck.
pub fn data_dir() -> std::path::PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            std::path::PathBuf::from(home).join(".local/share")
        })
        .join("facecheck")
}
