//! Recognition session state.
//!
//! Owned by a single consumer that applies pipeline results in order:
//!
//! ```text
//! IDLE --face, no match--> FAILURE
//! IDLE --face, match-----> SUCCESS --cooldown elapsed--> IDLE
//! ```
//!
//! The session also tracks how long no face has been seen, so a display can
//! dim itself while nobody stands in front of the camera.

use crate::gate::DEFAULT_MATCH_COOLDOWN;
use crate::pipeline::Recognition;
use crate::types::BoundingBox;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

pub const DEFAULT_DIM_DELAY: Duration = Duration::from_millis(5000);
pub const DEFAULT_DIM_LEVEL: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Idle,
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "level", rename_all = "lowercase")]
pub enum Brightness {
    Normal,
    /// Screen brightness override in (0, 1].
    Dimmed(f32),
}

/// Message the attendance screen should show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Prompt {
    Welcome { name: String, score: f32 },
    RegisterFirst,
    Recognizing,
    LookAtCamera,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a success stays on screen before returning to idle.
    pub cooldown: Duration,
    /// Time without a face before the display dims.
    pub dim_delay: Duration,
    pub dim_level: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_MATCH_COOLDOWN,
            dim_delay: DEFAULT_DIM_DELAY,
            dim_level: DEFAULT_DIM_LEVEL,
        }
    }
}

/// Serializable view of the session for UI consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub status: AnalysisStatus,
    pub prompt: Prompt,
    pub face_box: Option<BoundingBox>,
    pub face_detected: bool,
    pub brightness: Brightness,
    pub registry_size: usize,
    /// Size of the analyzed frame the box refers to.
    pub frame_size: Option<(u32, u32)>,
}

#[derive(Debug)]
struct Recognized {
    name: String,
    score: f32,
    at: Instant,
}

#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    status: AnalysisStatus,
    recognized: Option<Recognized>,
    face_box: Option<BoundingBox>,
    /// When the face was last lost; `None` while a face is in view.
    face_lost_at: Option<Instant>,
    registry_size: usize,
    frame_size: Option<(u32, u32)>,
}

impl Session {
    pub fn new(config: SessionConfig, registry_size: usize, now: Instant) -> Self {
        Self {
            config,
            status: AnalysisStatus::Idle,
            recognized: None,
            face_box: None,
            face_lost_at: Some(now),
            registry_size,
            frame_size: None,
        }
    }

    pub fn status(&self) -> AnalysisStatus {
        self.status
    }

    pub fn recognized_employee(&self) -> Option<(&str, f32)> {
        self.recognized.as_ref().map(|r| (r.name.as_str(), r.score))
    }

    pub fn face_detected(&self) -> bool {
        self.face_lost_at.is_none()
    }

    pub fn set_registry_size(&mut self, size: usize) {
        self.registry_size = size;
    }

    pub fn set_frame_size(&mut self, width: u32, height: u32) {
        self.frame_size = Some((width, height));
    }

    /// Apply one pipeline result received at `now`.
    pub fn apply(&mut self, recognition: &Recognition, now: Instant) {
        self.set_face(recognition.bbox().copied(), now);

        match recognition {
            Recognition::Match { name, score, .. } => {
                tracing::info!(name = %name, score, "attendance recognized");
                self.recognized = Some(Recognized { name: name.clone(), score: *score, at: now });
                self.status = AnalysisStatus::Success;
            }
            Recognition::NoMatch { .. } => {
                self.recognized = None;
                self.status = AnalysisStatus::Failure;
            }
            Recognition::Idle => {
                self.recognized = None;
                self.status = AnalysisStatus::Idle;
            }
        }
    }

    /// Advance timers. Returns true when a recognition expired back to idle.
    ///
    /// Only a standing `Success` expires; a newer result is never overwritten.
    pub fn tick(&mut self, now: Instant) -> bool {
        let expired = self.status == AnalysisStatus::Success
            && self
                .recognized
                .as_ref()
                .is_some_and(|r| now.saturating_duration_since(r.at) >= self.config.cooldown);

        if expired {
            self.recognized = None;
            self.set_face(None, now);
            self.status = AnalysisStatus::Idle;
            tracing::debug!("recognition cooldown elapsed; back to idle");
        }
        expired
    }

    pub fn brightness(&self, now: Instant) -> Brightness {
        match self.face_lost_at {
            Some(lost) if now.saturating_duration_since(lost) >= self.config.dim_delay => {
                Brightness::Dimmed(self.config.dim_level)
            }
            _ => Brightness::Normal,
        }
    }

    pub fn prompt(&self) -> Prompt {
        if let Some(r) = &self.recognized {
            Prompt::Welcome { name: r.name.clone(), score: r.score }
        } else if self.registry_size == 0 {
            Prompt::RegisterFirst
        } else if self.face_detected() {
            Prompt::Recognizing
        } else {
            Prompt::LookAtCamera
        }
    }

    pub fn snapshot(&self, now: Instant) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            prompt: self.prompt(),
            face_box: self.face_box,
            face_detected: self.face_detected(),
            brightness: self.brightness(now),
            registry_size: self.registry_size,
            frame_size: self.frame_size,
        }
    }

    fn set_face(&mut self, face: Option<BoundingBox>, now: Instant) {
        match (face.is_some(), self.face_lost_at.is_some()) {
            (true, true) => {
                self.face_lost_at = None;
                tracing::debug!("face in view; brightness restored");
            }
            (false, false) => self.face_lost_at = Some(now),
            _ => {}
        }
        self.face_box = face;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    fn bbox() -> BoundingBox {
        BoundingBox::new(10.0, 10.0, 100.0, 120.0)
    }

    fn matched(name: &str) -> Recognition {
        Recognition::Match {
            name: name.into(),
            profile_id: "id".into(),
            score: 0.91,
            bbox: bbox(),
        }
    }

    fn no_match() -> Recognition {
        Recognition::NoMatch { bbox: bbox(), best_score: Some(0.4) }
    }

    fn session(now: Instant) -> Session {
        Session::new(SessionConfig::default(), 3, now)
    }

    #[test]
    fn test_starts_idle() {
        let t0 = Instant::now();
        let s = session(t0);
        assert_eq!(s.status(), AnalysisStatus::Idle);
        assert_eq!(s.prompt(), Prompt::LookAtCamera);
        assert!(!s.face_detected());
    }

    #[test]
    fn test_face_without_match_is_failure() {
        let t0 = Instant::now();
        let mut s = session(t0);
        s.apply(&no_match(), t0);
        assert_eq!(s.status(), AnalysisStatus::Failure);
        assert_eq!(s.prompt(), Prompt::Recognizing);
        assert_eq!(s.snapshot(t0).face_box, Some(bbox()));
    }

    #[test]
    fn test_match_then_cooldown_returns_to_idle() {
        let t0 = Instant::now();
        let mut s = session(t0);
        s.apply(&matched("Lan"), t0);
        assert_eq!(s.status(), AnalysisStatus::Success);
        assert_eq!(s.recognized_employee(), Some(("Lan", 0.91)));
        assert_eq!(s.prompt(), Prompt::Welcome { name: "Lan".into(), score: 0.91 });

        assert!(!s.tick(t0 + 999 * MS));
        assert_eq!(s.status(), AnalysisStatus::Success);

        assert!(s.tick(t0 + 1000 * MS));
        assert_eq!(s.status(), AnalysisStatus::Idle);
        assert!(s.recognized_employee().is_none());
        assert!(!s.face_detected());
        assert!(s.snapshot(t0 + 1000 * MS).face_box.is_none());
    }

    #[test]
    fn test_result_during_cooldown_replaces_welcome() {
        let t0 = Instant::now();
        let mut s = session(t0);
        s.apply(&matched("Lan"), t0);
        s.apply(&no_match(), t0 + 990 * MS);
        assert_eq!(s.status(), AnalysisStatus::Failure);
        assert!(s.recognized_employee().is_none());
        assert_eq!(s.prompt(), Prompt::Recognizing);

        // The cooldown deadline must not wipe the newer result.
        assert!(!s.tick(t0 + 1000 * MS));
        assert_eq!(s.status(), AnalysisStatus::Failure);
        assert!(s.face_detected());
        assert_eq!(s.snapshot(t0 + 1000 * MS).face_box, Some(bbox()));
    }

    #[test]
    fn test_idle_clears_box() {
        let t0 = Instant::now();
        let mut s = session(t0);
        s.apply(&no_match(), t0);
        s.apply(&Recognition::Idle, t0 + 200 * MS);
        assert_eq!(s.status(), AnalysisStatus::Idle);
        assert!(s.snapshot(t0 + 200 * MS).face_box.is_none());
    }

    #[test]
    fn test_dims_after_no_face() {
        let t0 = Instant::now();
        let mut s = session(t0);
        assert_eq!(s.brightness(t0 + 4999 * MS), Brightness::Normal);
        assert_eq!(s.brightness(t0 + 5000 * MS), Brightness::Dimmed(DEFAULT_DIM_LEVEL));

        s.apply(&no_match(), t0 + 6000 * MS);
        assert_eq!(s.brightness(t0 + 20_000 * MS), Brightness::Normal);

        // Dimming timer restarts when the face leaves.
        s.apply(&Recognition::Idle, t0 + 21_000 * MS);
        assert_eq!(s.brightness(t0 + 25_000 * MS), Brightness::Normal);
        assert_eq!(s.brightness(t0 + 26_000 * MS), Brightness::Dimmed(DEFAULT_DIM_LEVEL));
    }

    #[test]
    fn test_continuous_idle_does_not_restart_dim_timer() {
        let t0 = Instant::now();
        let mut s = session(t0);
        s.apply(&Recognition::Idle, t0 + 3000 * MS);
        assert_eq!(s.brightness(t0 + 5000 * MS), Brightness::Dimmed(DEFAULT_DIM_LEVEL));
    }

    #[test]
    fn test_empty_registry_prompt() {
        let t0 = Instant::now();
        let mut s = Session::new(SessionConfig::default(), 0, t0);
        s.apply(&no_match(), t0);
        assert_eq!(s.prompt(), Prompt::RegisterFirst);
        s.set_registry_size(1);
        assert_eq!(s.prompt(), Prompt::Recognizing);
    }

    #[test]
    fn test_snapshot_json() {
        let t0 = Instant::now();
        let mut s = session(t0);
        s.apply(&matched("Minh"), t0);
        s.set_frame_size(480, 640);
        let json: serde_json::Value = serde_json::to_value(s.snapshot(t0)).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["prompt"]["kind"], "welcome");
        assert_eq!(json["prompt"]["name"], "Minh");
        assert_eq!(json["brightness"]["mode"], "normal");
        assert_eq!(json["registry_size"], 3);
        assert_eq!(json["frame_size"], serde_json::json!([480, 640]));
    }
}
