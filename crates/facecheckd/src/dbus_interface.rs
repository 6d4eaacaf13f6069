use crate::db::FaceDb;
use crate::engine::{EngineError, EngineHandle, SessionEvent};
use facecheck_core::{FaceProfile, PipelineError, Registry, SessionSnapshot};
use serde::Serialize;
use tokio::sync::{mpsc, watch, Mutex};
use zbus::{fdo, interface};

pub const BUS_NAME: &str = "org.facecheck.Attendance1";
pub const OBJECT_PATH: &str = "/org/facecheck/Attendance1";

/// Static daemon facts reported by `Status`.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonInfo {
    pub camera_device: String,
    pub similarity_threshold: f32,
}

/// Employee entry returned by `ListEmployees`.
#[derive(Debug, Serialize)]
struct EmployeeEntry<'a> {
    id: &'a str,
    name: &'a str,
    registered_at: String,
}

impl<'a> From<&'a FaceProfile> for EmployeeEntry<'a> {
    fn from(p: &'a FaceProfile) -> Self {
        Self {
            id: &p.id,
            name: &p.name,
            registered_at: p.registered_at.to_rfc3339(),
        }
    }
}

/// D-Bus interface for the attendance daemon.
///
/// Bus name: org.facecheck.Attendance1
/// Object path: /org/facecheck/Attendance1
pub struct AttendanceService {
    db: FaceDb,
    engine: EngineHandle,
    session: mpsc::Sender<SessionEvent>,
    snapshots: watch::Receiver<SessionSnapshot>,
    info: DaemonInfo,
    /// Held from a store edit until its reload is delivered, so reloads
    /// reach the worker and session in edit order.
    edits: Mutex<()>,
}

impl AttendanceService {
    pub fn new(
        db: FaceDb,
        engine: EngineHandle,
        session: mpsc::Sender<SessionEvent>,
        snapshots: watch::Receiver<SessionSnapshot>,
        info: DaemonInfo,
    ) -> Self {
        Self {
            db,
            engine,
            session,
            snapshots,
            info,
            edits: Mutex::new(()),
        }
    }

    async fn add_profile(&self, profile: FaceProfile) -> fdo::Result<Registry> {
        let _edit = self.edits.lock().await;
        self.db.add(profile).await.map_err(db_error)?;
        self.reload_registry().await
    }

    async fn remove_profile(&self, id: &str) -> fdo::Result<bool> {
        let _edit = self.edits.lock().await;
        let removed = self.db.remove(id).await.map_err(db_error)?;
        if removed {
            self.reload_registry().await?;
        }
        Ok(removed)
    }

    async fn clear_profiles(&self) -> fdo::Result<usize> {
        let _edit = self.edits.lock().await;
        let removed = self.db.clear().await.map_err(db_error)?;
        self.reload_registry().await?;
        Ok(removed)
    }

    /// Reload the registry from the store and hand it to the worker and session.
    /// Callers hold `edits`.
    async fn reload_registry(&self) -> fdo::Result<Registry> {
        let profiles = self.db.load_all().await.map_err(db_error)?;
        let registry = Registry::new(profiles);

        self.engine
            .replace_registry(registry.clone())
            .await
            .map_err(engine_error)?;
        self.session
            .send(SessionEvent::RegistryChanged(registry.len()))
            .await
            .map_err(|_| fdo::Error::Failed("session task exited".into()))?;
        Ok(registry)
    }
}

#[interface(name = "org.facecheck.Attendance1")]
impl AttendanceService {
    /// Register an employee from the face currently in front of the camera.
    /// Returns the new profile id.
    async fn register(&self, name: &str) -> fdo::Result<String> {
        tracing::info!(name, "register requested");
        let profile = self.engine.enroll(name).await.map_err(engine_error)?;
        let id = profile.id.clone();

        let registry = self.add_profile(profile).await?;
        tracing::info!(%id, employees = registry.len(), "employee registered");
        Ok(id)
    }

    /// List registered employees as a JSON array.
    async fn list_employees(&self) -> fdo::Result<String> {
        let profiles = self.db.load_all().await.map_err(db_error)?;
        let entries: Vec<EmployeeEntry<'_>> = profiles.iter().map(EmployeeEntry::from).collect();
        serde_json::to_string(&entries).map_err(|e| fdo::Error::Failed(e.to_string()))
    }

    /// Remove one employee by profile id. Returns false for an unknown id.
    async fn remove_employee(&self, id: &str) -> fdo::Result<bool> {
        tracing::info!(id, "remove requested");
        self.remove_profile(id).await
    }

    /// Delete all registered faces. Returns how many were removed.
    async fn clear_faces(&self) -> fdo::Result<u32> {
        tracing::info!("clear requested");
        let removed = self.clear_profiles().await?;
        Ok(u32::try_from(removed).unwrap_or(u32::MAX))
    }

    /// Current session snapshot plus daemon facts, as JSON.
    async fn status(&self) -> fdo::Result<String> {
        let session = self.snapshots.borrow().clone();
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "camera": self.info.camera_device,
            "similarity_threshold": self.info.similarity_threshold,
            "session": session,
        })
        .to_string())
    }
}

fn engine_error(e: EngineError) -> fdo::Error {
    match e {
        EngineError::Enroll(PipelineError::EmptyName) => fdo::Error::InvalidArgs(e.to_string()),
        other => fdo::Error::Failed(other.to_string()),
    }
}

fn db_error(e: tokio_rusqlite::Error) -> fdo::Error {
    tracing::error!(error = %e, "face store operation failed");
    fdo::Error::Failed(format!("face store: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineRequest;
    use facecheck_core::{Embedding, Session, SessionConfig, EMBEDDING_DIM};
    use std::sync::Arc;
    use std::time::Instant;

    struct Harness {
        service: Arc<AttendanceService>,
        requests: mpsc::Receiver<EngineRequest>,
        events: mpsc::Receiver<SessionEvent>,
        _snapshots: watch::Sender<SessionSnapshot>,
    }

    async fn harness() -> Harness {
        let db = FaceDb::open_in_memory().await.unwrap();
        let (engine, requests) = EngineHandle::detached(64);
        let (session_tx, events) = mpsc::channel(64);
        let now = Instant::now();
        let (snap_tx, snap_rx) = watch::channel(Session::new(SessionConfig::default(), 0, now).snapshot(now));
        let info = DaemonInfo {
            camera_device: "/dev/video0".into(),
            similarity_threshold: 0.7,
        };
        Harness {
            service: Arc::new(AttendanceService::new(db, engine, session_tx, snap_rx, info)),
            requests,
            events,
            _snapshots: snap_tx,
        }
    }

    fn profile(name: &str, seed: usize) -> FaceProfile {
        let mut raw = vec![0.0; EMBEDDING_DIM];
        raw[seed % EMBEDDING_DIM] = 1.0;
        FaceProfile::new(name, Embedding::from_raw(raw))
    }

    fn registry_sizes(h: &mut Harness) -> (Vec<usize>, Vec<usize>) {
        let mut worker = Vec::new();
        while let Ok(req) = h.requests.try_recv() {
            if let EngineRequest::ReplaceRegistry(r) = req {
                worker.push(r.len());
            }
        }
        let mut session = Vec::new();
        while let Ok(event) = h.events.try_recv() {
            if let SessionEvent::RegistryChanged(n) = event {
                session.push(n);
            }
        }
        (worker, session)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registrations_deliver_reloads_in_order() {
        let mut h = harness().await;
        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let service = h.service.clone();
                tokio::spawn(async move { service.add_profile(profile(&format!("E{i}"), i)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let (worker, session) = registry_sizes(&mut h);
        let expected: Vec<usize> = (1..=8).collect();
        assert_eq!(worker, expected);
        assert_eq!(session, expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_remove_and_clear_end_empty() {
        let mut h = harness().await;
        let a = profile("A", 0);
        let a_id = a.id.clone();
        h.service.add_profile(a).await.unwrap();
        h.service.add_profile(profile("B", 1)).await.unwrap();
        registry_sizes(&mut h);

        let (s1, s2) = (h.service.clone(), h.service.clone());
        let remove = tokio::spawn(async move { s1.remove_profile(&a_id).await });
        let clear = tokio::spawn(async move { s2.clear_profiles().await });
        let removed = remove.await.unwrap().unwrap();
        let cleared = clear.await.unwrap().unwrap();
        assert_eq!(usize::from(removed) + cleared, 2);

        let (worker, session) = registry_sizes(&mut h);
        assert_eq!(worker.last(), Some(&0));
        assert_eq!(session.last(), Some(&0));
        assert_eq!(worker, session);
    }

    #[tokio::test]
    async fn test_status_embeds_session_snapshot() {
        let h = harness().await;
        let json: serde_json::Value = serde_json::from_str(&h.service.status().await.unwrap()).unwrap();
        assert_eq!(json["camera"], "/dev/video0");
        assert_eq!(json["session"]["status"], "idle");
        assert_eq!(json["session"]["registry_size"], 0);
    }
}
