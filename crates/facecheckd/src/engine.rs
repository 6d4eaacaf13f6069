use facecheck_core::{
    Detector, Embedder, FacePipeline, FaceProfile, FrameGate, PipelineError, Recognition, Registry,
};
use facecheck_hw::{frame, Camera, Frame};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};

/// Consecutive capture failures tolerated before the capture thread gives up.
const MAX_CAPTURE_FAILURES: u32 = 30;
const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] facecheck_hw::CameraError),
    #[error("frame error: {0}")]
    Frame(#[from] facecheck_hw::FrameError),
    #[error("enrollment failed: {0}")]
    Enroll(#[from] PipelineError),
    #[error("no camera frame available yet")]
    NoFrame,
    #[error("failed to spawn {0} thread: {1}")]
    Spawn(&'static str, std::io::Error),
    #[error("analysis worker exited")]
    ChannelClosed,
}

/// Slot holding the most recent camera frame. Writers replace, never queue.
pub type LatestFrame = Option<Arc<Frame>>;

/// One analyzed frame, as delivered to the session task.
#[derive(Debug, Clone)]
pub struct Analyzed {
    pub recognition: Recognition,
    pub frame_size: (u32, u32),
    pub sequence: u32,
}

/// Everything that mutates the UI session, serialized through one channel.
#[derive(Debug)]
pub enum SessionEvent {
    Analyzed(Analyzed),
    RegistryChanged(usize),
}

/// Control messages sent from D-Bus handlers to the analysis worker.
pub(crate) enum EngineRequest {
    ReplaceRegistry(Registry),
    Enroll {
        name: String,
        reply: oneshot::Sender<Result<FaceProfile, EngineError>>,
    },
}

/// Clone-safe handle to the analysis worker.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Build a profile for `name` from the latest captured frame.
    pub async fn enroll(&self, name: &str) -> Result<FaceProfile, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Enroll {
                name: name.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Handle whose requests land in the returned receiver instead of a worker.
    #[cfg(test)]
    pub(crate) fn detached(capacity: usize) -> (Self, mpsc::Receiver<EngineRequest>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Swap the gallery used for matching. Takes effect from the next frame.
    pub async fn replace_registry(&self, registry: Registry) -> Result<(), EngineError> {
        self.tx
            .send(EngineRequest::ReplaceRegistry(registry))
            .await
            .map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the capture thread: read frames, rotate them upright, publish the latest.
///
/// The thread stops when every frame receiver is gone or the camera keeps failing.
pub fn spawn_capture(
    camera: Camera,
    rotation_degrees: u32,
    frames: watch::Sender<LatestFrame>,
) -> Result<JoinHandle<()>, EngineError> {
    if rotation_degrees % 90 != 0 {
        return Err(frame::FrameError::UnsupportedRotation(rotation_degrees).into());
    }

    std::thread::Builder::new()
        .name("facecheck-capture".into())
        .spawn(move || {
            let mut stream = match camera.stream() {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::error!(error = %e, device = %camera.device_path, "failed to start capture");
                    return;
                }
            };
            tracing::info!(device = %camera.device_path, rotation_degrees, "capture thread started");

            let mut failures = 0u32;
            while !frames.is_closed() {
                let captured = match stream.next_frame() {
                    Ok(f) => f,
                    Err(e) => {
                        failures += 1;
                        tracing::warn!(error = %e, failures, "frame capture failed");
                        if failures >= MAX_CAPTURE_FAILURES {
                            tracing::error!("too many capture failures; stopping capture");
                            break;
                        }
                        std::thread::sleep(CAPTURE_RETRY_DELAY);
                        continue;
                    }
                };
                failures = 0;

                let image = match frame::rotate(captured.image, rotation_degrees) {
                    Ok(image) => image,
                    Err(e) => {
                        tracing::warn!(error = %e, "frame rotation failed");
                        continue;
                    }
                };
                frames.send_replace(Some(Arc::new(Frame {
                    image,
                    timestamp: captured.timestamp,
                    sequence: captured.sequence,
                })));
            }
            tracing::info!("capture thread exiting");
        })
        .map_err(|e| EngineError::Spawn("capture", e))
}

/// Spawn the analysis worker on a dedicated OS thread.
///
/// The worker analyzes at most one frame at a time. While it is busy the
/// capture side keeps overwriting the frame slot, so stale frames are
/// dropped rather than queued. Every analyzed frame is forwarded to the
/// session task. The worker exits when the frame sender, the session
/// channel, or every [`EngineHandle`] is dropped.
///
/// Must be called from within a tokio runtime.
pub fn spawn_analysis<D, E>(
    mut pipeline: FacePipeline<D, E>,
    mut gate: FrameGate,
    mut registry: Registry,
    mut frames: watch::Receiver<LatestFrame>,
    events: mpsc::Sender<SessionEvent>,
) -> Result<(EngineHandle, JoinHandle<()>), EngineError>
where
    D: Detector + Send + 'static,
    E: Embedder + Send + 'static,
{
    let runtime = tokio::runtime::Handle::current();
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    let join = std::thread::Builder::new()
        .name("facecheck-analysis".into())
        .spawn(move || {
            tracing::info!(employees = registry.len(), "analysis worker started");
            let mut last_seen: Option<u32> = None;
            let mut dropped = 0u64;

            loop {
                let wake = runtime.block_on(async {
                    tokio::select! {
                        biased;
                        req = rx.recv() => Wake::Request(req),
                        changed = frames.changed() => Wake::Frame(changed.is_ok()),
                    }
                });

                match wake {
                    Wake::Request(None) | Wake::Frame(false) => break,
                    Wake::Request(Some(EngineRequest::ReplaceRegistry(next))) => {
                        tracing::info!(employees = next.len(), "registry replaced");
                        registry = next;
                    }
                    Wake::Request(Some(EngineRequest::Enroll { name, reply })) => {
                        let latest = frames.borrow().clone();
                        let result = match latest {
                            Some(frame) => pipeline.enroll(&frame.image, &name).map_err(EngineError::from),
                            None => Err(EngineError::NoFrame),
                        };
                        let _ = reply.send(result);
                    }
                    Wake::Frame(true) => {
                        let Some(frame) = frames.borrow_and_update().clone() else {
                            continue;
                        };

                        if let Some(prev) = last_seen {
                            let skipped = frame.sequence.wrapping_sub(prev).saturating_sub(1);
                            if skipped > 0 {
                                dropped += u64::from(skipped);
                                tracing::trace!(skipped, dropped, "frames replaced before analysis");
                            }
                        }
                        last_seen = Some(frame.sequence);

                        if !gate.admit(frame.timestamp) {
                            if gate.in_cooldown(frame.timestamp) {
                                tracing::trace!(sequence = frame.sequence, "frame skipped during match cooldown");
                            }
                            continue;
                        }

                        let recognition = pipeline.analyze(&frame.image, &registry);
                        if recognition.is_match() {
                            gate.record_match(frame.timestamp);
                        }

                        let analyzed = Analyzed {
                            recognition,
                            frame_size: (frame.width(), frame.height()),
                            sequence: frame.sequence,
                        };
                        if events.blocking_send(SessionEvent::Analyzed(analyzed)).is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::info!(dropped, "analysis worker exiting");
        })
        .map_err(|e| EngineError::Spawn("analysis", e))?;

    Ok((EngineHandle { tx }, join))
}

enum Wake {
    Request(Option<EngineRequest>),
    Frame(bool),
}
