use presence_core::{AttendanceService, DashboardService, EmployeeDirectory, EmployeeDraft};
use serde::Serialize;
use std::sync::Arc;
use zbus::interface;
use zbus::object_server::SignalEmitter;

use crate::client::ApiClient;
use crate::dashboard::load_stats;
use crate::feed::AttendanceFeed;
use crate::location::LocationCache;
use crate::pipeline::AttendanceController;
use crate::session::{SessionError, SessionManager};
use crate::wizard::{EnrollmentWizard, WizardError, WizardSnapshot};

/// D-Bus interface for the Presence attendance daemon.
///
/// Bus name: org.freedesktop.Presence1
/// Object path: /org/freedesktop/Presence1
pub struct PresenceService {
    pub pipeline: AttendanceController,
    pub feed: AttendanceFeed,
    pub wizard: EnrollmentWizard,
    pub sessions: SessionManager,
    pub attendance: Arc<dyn AttendanceService>,
    pub dashboard: Arc<dyn DashboardService>,
    pub directory: Arc<dyn EmployeeDirectory>,
    /// Backend health-checked by `Status`; `None` reports "unknown".
    pub backend: Option<Arc<ApiClient>>,
    pub camera: String,
    pub location: LocationCache,
    pub roster_size: u32,
}

fn to_json<T: Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

fn session_err(err: SessionError) -> zbus::fdo::Error {
    match err {
        SessionError::NotAuthenticated => {
            zbus::fdo::Error::AccessDenied("admin login required".into())
        }
        other => zbus::fdo::Error::Failed(other.to_string()),
    }
}

fn wizard_reply(result: Result<WizardSnapshot, WizardError>) -> zbus::fdo::Result<String> {
    match result {
        Ok(snapshot) => to_json(&snapshot),
        Err(err) => {
            tracing::info!(error = %err, "enrollment request rejected");
            Err(zbus::fdo::Error::Failed(err.to_string()))
        }
    }
}

impl PresenceService {
    fn require_admin(&self) -> zbus::fdo::Result<()> {
        self.sessions.require().map(|_| ()).map_err(session_err)
    }
}

#[interface(name = "org.freedesktop.Presence1")]
impl PresenceService {
    /// Run one capture, recognise and clock-in cycle.
    ///
    /// Returns the outcome as JSON, or `{"outcome":"busy"}` if a cycle is
    /// already in flight.
    async fn clock_in(&self) -> zbus::fdo::Result<String> {
        tracing::info!("clock-in requested");
        match self.pipeline.run_cycle().await {
            Some(outcome) => to_json(&outcome),
            None => Ok(serde_json::json!({ "outcome": "busy" }).to_string()),
        }
    }

    /// Start a cycle without waiting for it. Returns false if one is
    /// already in flight; the outcome arrives as a `Notification` signal.
    async fn start_clock_in(&self) -> bool {
        tracing::info!("background clock-in requested");
        self.pipeline.start_cycle()
    }

    /// Cached recent attendance, most recent first.
    async fn recent_attendance(&self) -> zbus::fdo::Result<String> {
        to_json(&self.feed.snapshot())
    }

    async fn dashboard_stats(&self) -> zbus::fdo::Result<String> {
        self.require_admin()?;
        let stats = load_stats(
            self.dashboard.as_ref(),
            self.attendance.as_ref(),
            self.roster_size,
        )
        .await
        .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        to_json(&stats)
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let backend = match &self.backend {
            Some(client) => match client.health().await {
                Ok(true) => "ok",
                Ok(false) => "unhealthy",
                Err(_) => "unreachable",
            },
            None => "unknown",
        };
        let wizard = self.wizard.snapshot();
        let session_user = match self.sessions.current() {
            Some(_) => self.sessions.verify().await.ok().map(|s| s.user.username),
            None => None,
        };
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "backend": backend,
            "camera": self.camera,
            "location": self.location.known().map(|c| c.to_string()),
            "pipeline": self.pipeline.phase(),
            "last_outcome": self.pipeline.last_outcome(),
            "wizard_step": wizard.step,
            "feed_size": self.feed.len(),
            "session_user": session_user,
        })
        .to_string())
    }

    async fn login(&self, username: &str, password: &str) -> zbus::fdo::Result<bool> {
        match self.sessions.login(username, password).await {
            Ok(_) => Ok(true),
            Err(SessionError::InvalidCredentials(_)) => Ok(false),
            Err(err) => Err(session_err(err)),
        }
    }

    async fn logout(&self) -> zbus::fdo::Result<()> {
        self.sessions.logout().await;
        Ok(())
    }

    /// Set the enrollment identity fields.
    async fn enroll_update(
        &self,
        name: &str,
        id: &str,
        position: &str,
        department: &str,
    ) -> zbus::fdo::Result<String> {
        self.require_admin()?;
        wizard_reply(self.wizard.update_form(EmployeeDraft {
            name: name.to_string(),
            id: id.to_string(),
            position: position.to_string(),
            department: department.to_string(),
        }))
    }

    /// Next free employee ID according to the backend.
    async fn enroll_suggest_id(&self) -> zbus::fdo::Result<String> {
        self.require_admin()?;
        self.directory.next_id().await.map_err(|e| {
            tracing::warn!(error = %e, "next employee id lookup failed");
            zbus::fdo::Error::Failed(e.to_string())
        })
    }

    async fn enroll_next(&self) -> zbus::fdo::Result<String> {
        self.require_admin()?;
        wizard_reply(self.wizard.next())
    }

    async fn enroll_back(&self) -> zbus::fdo::Result<String> {
        self.require_admin()?;
        wizard_reply(self.wizard.back())
    }

    async fn enroll_train(&self) -> zbus::fdo::Result<String> {
        self.require_admin()?;
        wizard_reply(self.wizard.start_training())
    }

    async fn enroll_reset(&self) -> zbus::fdo::Result<String> {
        self.require_admin()?;
        wizard_reply(self.wizard.reset())
    }

    async fn enroll_state(&self) -> zbus::fdo::Result<String> {
        self.require_admin()?;
        to_json(&self.wizard.snapshot())
    }

    /// Emitted for every user-facing notification.
    #[zbus(signal)]
    pub async fn notification(
        emitter: &SignalEmitter<'_>,
        severity: &str,
        title: &str,
        message: &str,
    ) -> zbus::Result<()>;

    /// Emitted whenever the cached feed is replaced.
    #[zbus(signal)]
    pub async fn feed_changed(emitter: &SignalEmitter<'_>, records: u32) -> zbus::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraHandle;
    use crate::notify::Notifier;
    use crate::pipeline::PipelinePhase;
    use crate::testing::{FakeBackend, FakeCamera};
    use crate::wizard::WizardSettings;
    use presence_hw::NoLocation;
    use serde_json::Value;
    use std::time::Duration;

    fn service(backend: Arc<FakeBackend>) -> PresenceService {
        let camera = CameraHandle::new(Arc::new(FakeCamera::working()));
        let notifier = Notifier::new();
        let feed = AttendanceFeed::new(4);
        let location = LocationCache::new(Arc::new(NoLocation));
        PresenceService {
            pipeline: AttendanceController::new(
                camera.clone(),
                backend.clone(),
                backend.clone(),
                location.clone(),
                feed.clone(),
                notifier.clone(),
            ),
            feed,
            wizard: EnrollmentWizard::new(
                camera,
                notifier,
                Some(backend.clone() as Arc<dyn EmployeeDirectory>),
                WizardSettings::default(),
            ),
            sessions: SessionManager::new(backend.clone()),
            attendance: backend.clone(),
            dashboard: backend.clone(),
            directory: backend,
            backend: None,
            camera: "fake".into(),
            location,
            roster_size: 10,
        }
    }

    #[tokio::test]
    async fn test_clock_in_reports_outcome() {
        let backend = FakeBackend::new();
        backend.recognizes("101", "Budi", 90.0);
        let svc = service(backend);

        let first: Value = serde_json::from_str(&svc.clock_in().await.unwrap()).unwrap();
        assert_eq!(first["outcome"], "success");
        let second: Value = serde_json::from_str(&svc.clock_in().await.unwrap()).unwrap();
        assert_eq!(second["outcome"], "duplicate");

        let recent: Value = serde_json::from_str(&svc.recent_attendance().await.unwrap()).unwrap();
        assert_eq!(recent.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_start_clock_in_runs_in_background() {
        let backend = FakeBackend::new();
        backend.recognizes("101", "Budi", 90.0);
        let gate = backend.gate_recognition();
        let svc = service(backend.clone());

        assert!(svc.start_clock_in().await);
        while svc.pipeline.phase() != PipelinePhase::Recognizing {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!svc.start_clock_in().await);
        let busy: Value = serde_json::from_str(&svc.clock_in().await.unwrap()).unwrap();
        assert_eq!(busy["outcome"], "busy");

        gate.notify_one();
        while svc.pipeline.phase() != PipelinePhase::Idle {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let status: Value = serde_json::from_str(&svc.status().await.unwrap()).unwrap();
        assert_eq!(status["last_outcome"]["outcome"], "success");
        assert_eq!(backend.record_count(), 1);
    }

    #[tokio::test]
    async fn test_suggest_id_needs_admin() {
        let backend = FakeBackend::new();
        let svc = service(backend);
        assert!(matches!(
            svc.enroll_suggest_id().await,
            Err(zbus::fdo::Error::AccessDenied(_))
        ));

        svc.login("admin", "admin123").await.unwrap();
        assert_eq!(svc.enroll_suggest_id().await.unwrap(), "101");
    }

    #[tokio::test]
    async fn test_admin_calls_need_login() {
        let svc = service(FakeBackend::new());
        assert!(matches!(
            svc.enroll_state().await,
            Err(zbus::fdo::Error::AccessDenied(_))
        ));
        assert!(matches!(
            svc.dashboard_stats().await,
            Err(zbus::fdo::Error::AccessDenied(_))
        ));

        assert!(!svc.login("admin", "wrong").await.unwrap());
        assert!(svc.login("admin", "admin123").await.unwrap());
        let state: Value = serde_json::from_str(&svc.enroll_state().await.unwrap()).unwrap();
        assert_eq!(state["step"], "basic_info");

        svc.logout().await.unwrap();
        assert!(svc.enroll_next().await.is_err());
    }

    #[tokio::test]
    async fn test_dashboard_falls_back_when_stats_down() {
        let backend = FakeBackend::new();
        backend.seed_record("101", "Budi", presence_core::AttendanceStatus::Late);
        let svc = service(backend);
        svc.login("admin", "admin123").await.unwrap();

        let stats: Value = serde_json::from_str(&svc.dashboard_stats().await.unwrap()).unwrap();
        assert_eq!(stats["totalEmployees"], 10);
        assert_eq!(stats["todayPresent"], 1);
        assert_eq!(stats["lateArrivals"], 1);
        assert_eq!(stats["absentToday"], 9);
    }

    #[tokio::test]
    async fn test_wizard_rejection_is_reported() {
        let svc = service(FakeBackend::new());
        svc.login("admin", "admin123").await.unwrap();
        let err = svc.enroll_next().await.unwrap_err();
        assert!(matches!(err, zbus::fdo::Error::Failed(m) if m.contains("missing required fields")));

        let snap: Value = serde_json::from_str(
            &svc.enroll_update(" Sari ", "102", "Analyst", "Finance")
                .await
                .unwrap(),
        )
        .unwrap();
        assert_eq!(snap["form"]["name"], " Sari ");
        assert_eq!(snap["can_advance"], true);
        let snap: Value = serde_json::from_str(&svc.enroll_next().await.unwrap()).unwrap();
        assert_eq!(snap["step_index"], 1);
        assert_eq!(snap["capturing"], true);
        assert_eq!(snap["can_advance"], false);

        let snap: Value = serde_json::from_str(&svc.enroll_back().await.unwrap()).unwrap();
        assert_eq!(snap["step"], "basic_info");
        assert_eq!(snap["capturing"], false);
    }

    #[tokio::test]
    async fn test_status_without_backend() {
        let svc = service(FakeBackend::new());
        let status: Value = serde_json::from_str(&svc.status().await.unwrap()).unwrap();
        assert_eq!(status["backend"], "unknown");
        assert_eq!(status["pipeline"], "idle");
        assert_eq!(status["wizard_step"], "basic_info");
        assert_eq!(status["session_user"], Value::Null);
    }

    #[tokio::test]
    async fn test_status_drops_expired_session() {
        let backend = FakeBackend::new();
        let svc = service(backend.clone());
        svc.login("admin", "admin123").await.unwrap();
        let status: Value = serde_json::from_str(&svc.status().await.unwrap()).unwrap();
        assert_eq!(status["session_user"], "admin");

        backend.expire_session();
        let status: Value = serde_json::from_str(&svc.status().await.unwrap()).unwrap();
        assert_eq!(status["session_user"], Value::Null);
        assert!(svc.enroll_state().await.is_err());
    }
}
