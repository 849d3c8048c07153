//! Attendance pipeline: capture → recognize → clock-in, one cycle at a time.

use presence_core::{
    AttendanceService, ClockInOutcome, ClockInRequest, EmployeeSummary, RecognitionService,
};
use serde::Serialize;
use std::sync::{Arc, Mutex};

use crate::camera::CameraHandle;
use crate::feed::AttendanceFeed;
use crate::location::LocationCache;
use crate::notify::{Notification, Notifier, Severity};

const MSG_CAMERA_UNAVAILABLE: &str = "Camera is not available";
const MSG_NOT_RECOGNIZED: &str = "Please try again or register first";
const MSG_RECOGNITION_FAILED: &str = "Failed to process face recognition";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    Idle,
    Capturing,
    Recognizing,
    ClockingIn,
}

/// Terminal state of one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    DeviceUnavailable {
        message: String,
    },
    NotRecognized {
        message: String,
    },
    Success {
        employee: EmployeeSummary,
        message: String,
    },
    Duplicate {
        employee: EmployeeSummary,
        message: String,
    },
    ClockInFailed {
        employee: EmployeeSummary,
        reason: String,
    },
}

impl CycleOutcome {
    /// The single notification shown for this outcome.
    pub fn notification(&self) -> Notification {
        match self {
            Self::DeviceUnavailable { message } => {
                Notification::new(Severity::Error, "Camera Error", message.as_str())
            }
            Self::NotRecognized { message } => {
                Notification::new(Severity::Warning, "Face Not Recognized", message.as_str())
            }
            Self::Success { message, .. } => {
                Notification::new(Severity::Success, "Attendance Recorded", message.as_str())
            }
            Self::Duplicate { message, .. } => {
                Notification::new(Severity::Info, "Already Checked In", message.as_str())
            }
            Self::ClockInFailed { reason, .. } => {
                Notification::new(Severity::Error, "Clock In Failed", reason.as_str())
            }
        }
    }
}

/// Holds the single-flight slot for the duration of one cycle.
///
/// Dropping it, on any exit path, puts the pipeline back to `Idle`.
struct CycleGuard {
    phase: Arc<Mutex<PipelinePhase>>,
}

impl CycleGuard {
    fn advance(&self, next: PipelinePhase) {
        if let Ok(mut phase) = self.phase.lock() {
            tracing::debug!(from = ?*phase, to = ?next, "pipeline phase");
            *phase = next;
        }
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        if let Ok(mut phase) = self.phase.lock() {
            *phase = PipelinePhase::Idle;
        }
    }
}

/// Drives attendance cycles. Cheap to clone; all clones share one slot.
#[derive(Clone)]
pub struct AttendanceController {
    phase: Arc<Mutex<PipelinePhase>>,
    last_outcome: Arc<Mutex<Option<CycleOutcome>>>,
    camera: CameraHandle,
    recognition: Arc<dyn RecognitionService>,
    attendance: Arc<dyn AttendanceService>,
    location: LocationCache,
    feed: AttendanceFeed,
    notifier: Notifier,
}

impl AttendanceController {
    /// Build the controller and kick off the session's one location lookup.
    pub fn new(
        camera: CameraHandle,
        recognition: Arc<dyn RecognitionService>,
        attendance: Arc<dyn AttendanceService>,
        location: LocationCache,
        feed: AttendanceFeed,
        notifier: Notifier,
    ) -> Self {
        location.acquire();
        Self {
            phase: Arc::new(Mutex::new(PipelinePhase::Idle)),
            last_outcome: Arc::new(Mutex::new(None)),
            camera,
            recognition,
            attendance,
            location,
            feed,
            notifier,
        }
    }

    pub fn phase(&self) -> PipelinePhase {
        self.phase
            .lock()
            .map(|p| *p)
            .unwrap_or(PipelinePhase::Idle)
    }

    /// The most recent terminal outcome, for the recognition overlay.
    pub fn last_outcome(&self) -> Option<CycleOutcome> {
        self.last_outcome.lock().ok().and_then(|o| o.clone())
    }

    /// Run one cycle to completion. Returns `None` without doing anything if
    /// a cycle is already in flight.
    pub async fn run_cycle(&self) -> Option<CycleOutcome> {
        let guard = self.try_begin()?;
        Some(self.finish(guard).await)
    }

    /// Start a cycle in the background. Returns false (and queues nothing)
    /// if a cycle is already in flight.
    pub fn start_cycle(&self) -> bool {
        let Some(guard) = self.try_begin() else {
            return false;
        };
        let this = self.clone();
        tokio::spawn(async move {
            this.finish(guard).await;
        });
        true
    }

    fn try_begin(&self) -> Option<CycleGuard> {
        let mut phase = self.phase.lock().ok()?;
        if *phase != PipelinePhase::Idle {
            tracing::debug!(phase = ?*phase, "cycle already active; start ignored");
            return None;
        }
        *phase = PipelinePhase::Capturing;
        Some(CycleGuard {
            phase: self.phase.clone(),
        })
    }

    async fn finish(&self, guard: CycleGuard) -> CycleOutcome {
        let outcome = self.drive(&guard).await;
        if let Ok(mut last) = self.last_outcome.lock() {
            *last = Some(outcome.clone());
        }
        self.notifier.publish(outcome.notification());
        drop(guard);
        outcome
    }

    async fn drive(&self, guard: &CycleGuard) -> CycleOutcome {
        let coords = self.location.snapshot();

        let payload = match self.camera.capture_still().await {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(error = %err, "capture failed; camera unavailable");
                return CycleOutcome::DeviceUnavailable {
                    message: MSG_CAMERA_UNAVAILABLE.to_string(),
                };
            }
        };
        tracing::debug!(bytes = payload.bytes.len(), "frame captured");

        guard.advance(PipelinePhase::Recognizing);
        let result = match self.recognition.recognize(&payload.to_data_url()).await {
            Ok(resp) => resp.into_result(),
            Err(err) => {
                tracing::warn!(error = %err, "recognition request failed");
                return CycleOutcome::NotRecognized {
                    message: MSG_RECOGNITION_FAILED.to_string(),
                };
            }
        };

        let employee = match result.employee {
            Some(employee) if result.recognized => employee,
            _ => {
                tracing::info!(message = ?result.message, "face not recognized");
                return CycleOutcome::NotRecognized {
                    message: result
                        .message
                        .unwrap_or_else(|| MSG_NOT_RECOGNIZED.to_string()),
                };
            }
        };
        tracing::info!(
            employee = %employee.id,
            confidence = employee.confidence,
            "face recognized"
        );

        guard.advance(PipelinePhase::ClockingIn);
        let request = ClockInRequest::new(&employee.id, coords.latitude, coords.longitude);
        let response = self.attendance.clock_in(&request).await;

        match ClockInOutcome::classify(response) {
            ClockInOutcome::Success { .. } => {
                // Out-of-cadence refresh so the new record shows up now.
                if let Err(err) = self.feed.refresh(self.attendance.as_ref()).await {
                    tracing::warn!(error = %err, "post clock-in refresh failed");
                }
                let at = chrono::Local::now().format("%H:%M:%S");
                CycleOutcome::Success {
                    message: format!("{} clocked in at {at}", employee.name),
                    employee,
                }
            }
            ClockInOutcome::AlreadyCheckedIn { message } => CycleOutcome::Duplicate {
                message: message.unwrap_or_else(|| {
                    format!("{} has already checked in today", employee.name)
                }),
                employee,
            },
            ClockInOutcome::Failure { reason } => CycleOutcome::ClockInFailed { employee, reason },
        }
    }
}
