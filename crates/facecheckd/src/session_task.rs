use crate::engine::SessionEvent;
use facecheck_core::{Session, SessionSnapshot};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

/// How often session timers (cooldown reset, dimming) are re-evaluated.
pub const SESSION_TICK: Duration = Duration::from_millis(100);

/// Own the UI session: apply analysis results and registry changes in arrival
/// order, advance timers, and publish a snapshot whenever it changes.
///
/// Returns when every event sender has been dropped.
pub async fn run(
    mut session: Session,
    mut events: mpsc::Receiver<SessionEvent>,
    snapshots: watch::Sender<SessionSnapshot>,
) {
    let mut ticker = tokio::time::interval(SESSION_TICK);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SessionEvent::Analyzed(analyzed)) => {
                    tracing::debug!(
                        sequence = analyzed.sequence,
                        recognition = ?analyzed.recognition,
                        "applying analysis result"
                    );
                    let (width, height) = analyzed.frame_size;
                    session.set_frame_size(width, height);
                    session.apply(&analyzed.recognition, Instant::now());
                }
                Some(SessionEvent::RegistryChanged(size)) => session.set_registry_size(size),
                None => break,
            },
            _ = ticker.tick() => {
                session.tick(Instant::now());
            }
        }

        let snapshot = session.snapshot(Instant::now());
        snapshots.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
    tracing::info!("session task exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Analyzed;
    use facecheck_core::session::{AnalysisStatus, Prompt};
    use facecheck_core::{BoundingBox, Recognition, SessionConfig};

    fn start(config: SessionConfig, registry_size: usize) -> (mpsc::Sender<SessionEvent>, watch::Receiver<SessionSnapshot>) {
        let session = Session::new(config, registry_size, Instant::now());
        let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot(Instant::now()));
        let (event_tx, event_rx) = mpsc::channel(8);
        tokio::spawn(run(session, event_rx, snapshot_tx));
        (event_tx, snapshot_rx)
    }

    async fn wait_for(
        rx: &mut watch::Receiver<SessionSnapshot>,
        pred: impl Fn(&SessionSnapshot) -> bool,
    ) -> SessionSnapshot {
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| pred(s)))
            .await
            .expect("timed out waiting for snapshot")
            .expect("session task exited")
            .clone()
    }

    fn analyzed(recognition: Recognition) -> SessionEvent {
        SessionEvent::Analyzed(Analyzed {
            recognition,
            frame_size: (640, 480),
            sequence: 1,
        })
    }

    #[tokio::test]
    async fn test_match_resets_after_cooldown() {
        let config = SessionConfig {
            cooldown: Duration::from_millis(300),
            ..SessionConfig::default()
        };
        let (events, mut snapshots) = start(config, 1);

        events
            .send(analyzed(Recognition::Match {
                name: "Lan".into(),
                profile_id: "p1".into(),
                score: 0.93,
                bbox: BoundingBox::new(100.0, 80.0, 200.0, 240.0),
            }))
            .await
            .unwrap();

        let success = wait_for(&mut snapshots, |s| s.status == AnalysisStatus::Success).await;
        assert_eq!(success.prompt, Prompt::Welcome { name: "Lan".into(), score: 0.93 });
        assert_eq!(success.frame_size, Some((640, 480)));
        assert!(success.face_box.is_some());

        let idle = wait_for(&mut snapshots, |s| s.status == AnalysisStatus::Idle).await;
        assert!(idle.face_box.is_none());
        assert!(!idle.face_detected);
    }

    #[tokio::test]
    async fn test_registry_change_updates_prompt() {
        let (events, mut snapshots) = start(SessionConfig::default(), 2);
        assert_eq!(snapshots.borrow().prompt, Prompt::LookAtCamera);

        events.send(SessionEvent::RegistryChanged(0)).await.unwrap();
        let snap = wait_for(&mut snapshots, |s| s.registry_size == 0).await;
        assert_eq!(snap.prompt, Prompt::RegisterFirst);
    }

    #[tokio::test]
    async fn test_no_match_is_failure() {
        let (events, mut snapshots) = start(SessionConfig::default(), 2);
        events
            .send(analyzed(Recognition::NoMatch {
                bbox: BoundingBox::new(0.0, 0.0, 50.0, 50.0),
                best_score: Some(0.31),
            }))
            .await
            .unwrap();

        let snap = wait_for(&mut snapshots, |s| s.status == AnalysisStatus::Failure).await;
        assert_eq!(snap.prompt, Prompt::Recognizing);
        assert!(snap.face_detected);
    }
}
