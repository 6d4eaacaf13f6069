//! MobileFaceNet face recognizer via ONNX Runtime.
//!
//! Turns a face crop into a 192-dimensional, L2-normalized embedding.

use crate::crop::{self, TensorLayout};
use crate::types::{Embedding, EMBEDDING_DIM};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const RECOGNIZER_INTRA_THREADS: usize = 2;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0} (export MobileFaceNet to ONNX and place it in the model directory)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("expected {EMBEDDING_DIM}-dim embedding, got {0}")]
    DimensionMismatch(usize),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Opaque embedding model: normalized face tensor in, raw feature vector out.
pub trait Embedder {
    fn infer(&mut self, input: &Array4<f32>) -> Result<Vec<f32>, RecognizerError>;

    /// Input layout the model expects.
    fn layout(&self) -> TensorLayout {
        TensorLayout::Nhwc
    }
}

/// Run a face crop through `embedder` and L2-normalize the output.
pub fn extract_embedding<E: Embedder + ?Sized>(
    embedder: &mut E,
    face: &RgbImage,
) -> Result<Embedding, RecognizerError> {
    let input = crop::preprocess(face, embedder.layout());
    let raw = embedder.infer(&input)?;

    if raw.len() != EMBEDDING_DIM {
        return Err(RecognizerError::DimensionMismatch(raw.len()));
    }

    tracing::trace!(dim = raw.len(), "embedding extracted");
    Ok(Embedding::from_raw(raw))
}

/// MobileFaceNet recognizer backed by an ONNX Runtime session.
pub struct FaceRecognizer {
    session: Session,
    layout: TensorLayout,
}

impl FaceRecognizer {
    /// Load the embedding model from the given path.
    pub fn load(model_path: &str, layout: TensorLayout) -> Result<Self, RecognizerError> {
        if !Path::new(model_path).exists() {
            return Err(RecognizerError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(RECOGNIZER_INTRA_THREADS)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            ?layout,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded MobileFaceNet model"
        );

        Ok(Self { session, layout })
    }
}

impl Embedder for FaceRecognizer {
    fn infer(&mut self, input: &Array4<f32>) -> Result<Vec<f32>, RecognizerError> {
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        Ok(raw.to_vec())
    }

    fn layout(&self) -> TensorLayout {
        self.layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// Emits a fixed raw vector and records the input shape it saw.
    struct FixedEmbedder {
        output: Vec<f32>,
        layout: TensorLayout,
        seen_shape: Option<Vec<usize>>,
    }

    impl Embedder for FixedEmbedder {
        fn infer(&mut self, input: &Array4<f32>) -> Result<Vec<f32>, RecognizerError> {
            self.seen_shape = Some(input.shape().to_vec());
            Ok(self.output.clone())
        }

        fn layout(&self) -> TensorLayout {
            self.layout
        }
    }

    fn face() -> RgbImage {
        RgbImage::from_pixel(50, 64, Rgb([90, 120, 200]))
    }

    #[test]
    fn test_extract_normalizes_output() {
        let mut embedder = FixedEmbedder {
            output: vec![2.0; EMBEDDING_DIM],
            layout: TensorLayout::Nhwc,
            seen_shape: None,
        };
        let emb = extract_embedding(&mut embedder, &face()).unwrap();
        assert_eq!(emb.dim(), EMBEDDING_DIM);
        assert!((emb.norm() - 1.0).abs() < 1e-5);
        assert_eq!(embedder.seen_shape.as_deref(), Some(&[1, 112, 112, 3][..]));
    }

    #[test]
    fn test_extract_respects_layout() {
        let mut embedder = FixedEmbedder {
            output: vec![1.0; EMBEDDING_DIM],
            layout: TensorLayout::Nchw,
            seen_shape: None,
        };
        extract_embedding(&mut embedder, &face()).unwrap();
        assert_eq!(embedder.seen_shape.as_deref(), Some(&[1, 3, 112, 112][..]));
    }

    #[test]
    fn test_extract_rejects_wrong_dimension() {
        let mut embedder = FixedEmbedder {
            output: vec![1.0; 512],
            layout: TensorLayout::Nhwc,
            seen_shape: None,
        };
        let err = extract_embedding(&mut embedder, &face()).unwrap_err();
        assert!(matches!(err, RecognizerError::DimensionMismatch(512)));
    }

    #[test]
    fn test_extract_zero_output_stays_zero() {
        let mut embedder = FixedEmbedder {
            output: vec![0.0; EMBEDDING_DIM],
            layout: TensorLayout::Nhwc,
            seen_shape: None,
        };
        let emb = extract_embedding(&mut embedder, &face()).unwrap();
        assert!(emb.values.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_load_missing_model() {
        let err = FaceRecognizer::load("/nonexistent/mobile_facenet.onnx", TensorLayout::Nhwc)
            .err()
            .unwrap();
        assert!(matches!(err, RecognizerError::ModelNotFound(_)));
    }
}
