//! Employee enrollment wizard.
//!
//! Four linear stages: basic info, face capture, model training, complete.
//! Capture and training each run on their own timer, owned by the wizard
//! and torn down when the stage is left or the wizard is dropped.

use presence_core::{EmployeeDirectory, EmployeeDraft};
use presence_hw::{CameraError, ImagePayload};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::camera::CameraHandle;
use crate::notify::{Notification, Notifier, Severity};
use crate::schedule::ScheduledTask;

const PROGRESS_DONE: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WizardSettings {
    /// Frames required before training may start.
    pub capture_target: usize,
    pub capture_interval: Duration,
    pub training_tick: Duration,
    /// Percent added per training tick.
    pub training_step: u8,
}

impl Default for WizardSettings {
    fn default() -> Self {
        Self {
            capture_target: 20,
            capture_interval: Duration::from_millis(500),
            training_tick: Duration::from_millis(200),
            training_step: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    #[default]
    BasicInfo = 0,
    CaptureFaces = 1,
    TrainModel = 2,
    Complete = 3,
}

impl WizardStep {
    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::BasicInfo => "Basic Info",
            Self::CaptureFaces => "Capture Faces",
            Self::TrainModel => "Train Model",
            Self::Complete => "Complete",
        }
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameContent {
    Image(ImagePayload),
    /// Stand-in entry synthesised when the camera is unavailable. Carries
    /// no image data.
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub index: usize,
    pub content: FrameContent,
}

impl CapturedFrame {
    pub fn is_placeholder(&self) -> bool {
        matches!(self.content, FrameContent::Placeholder)
    }
}

#[derive(Debug, Clone, Default)]
pub struct WizardState {
    pub step: WizardStep,
    pub form: EmployeeDraft,
    /// Append-only; never longer than the capture target.
    pub captured_frames: Vec<CapturedFrame>,
    pub training_progress: u8,
}

/// Serializable view of the wizard for front-ends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WizardSnapshot {
    pub step: WizardStep,
    pub step_index: u8,
    pub step_label: &'static str,
    pub form: EmployeeDraft,
    pub frames_captured: usize,
    pub placeholder_frames: usize,
    pub capture_target: usize,
    pub capturing: bool,
    /// Whether `next` would be accepted right now.
    pub can_advance: bool,
    pub training_progress: u8,
    pub training: bool,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WizardError {
    #[error("missing required fields: {}", .0.join(", "))]
    IncompleteForm(Vec<&'static str>),
    #[error("captured {captured} of {target} frames")]
    CaptureIncomplete { captured: usize, target: usize },
    #[error("training is at {0}%")]
    TrainingIncomplete(u8),
    #[error("cannot go back from {0}")]
    BackwardNotAllowed(WizardStep),
    #[error("form is locked during {0}")]
    FormLocked(WizardStep),
    #[error("expected {expected}, wizard is at {actual}")]
    WrongStep {
        expected: WizardStep,
        actual: WizardStep,
    },
    #[error("training already started")]
    TrainingAlreadyStarted,
    #[error("training in progress; it cannot be interrupted")]
    TrainingInProgress,
    #[error("registration complete; reset to start over")]
    AlreadyComplete,
}

struct WizardInner {
    state: WizardState,
    /// Bumped whenever a loop is torn down or the wizard resets; loops
    /// compare it before every mutation.
    epoch: u64,
    capture_task: Option<ScheduledTask>,
    training_task: Option<ScheduledTask>,
}

struct WizardContext {
    camera: CameraHandle,
    notifier: Notifier,
    directory: Option<Arc<dyn EmployeeDirectory>>,
    settings: WizardSettings,
}

#[derive(Clone)]
pub struct EnrollmentWizard {
    inner: Arc<Mutex<WizardInner>>,
    ctx: Arc<WizardContext>,
}

fn lock(inner: &Mutex<WizardInner>) -> MutexGuard<'_, WizardInner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl EnrollmentWizard {
    /// `directory`, when set, receives the employee once enrollment completes.
    pub fn new(
        camera: CameraHandle,
        notifier: Notifier,
        directory: Option<Arc<dyn EmployeeDirectory>>,
        settings: WizardSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(WizardInner {
                state: WizardState::default(),
                epoch: 0,
                capture_task: None,
                training_task: None,
            })),
            ctx: Arc::new(WizardContext {
                camera,
                notifier,
                directory,
                settings,
            }),
        }
    }

    pub fn snapshot(&self) -> WizardSnapshot {
        self.snapshot_of(&lock(&self.inner))
    }

    fn snapshot_of(&self, inner: &WizardInner) -> WizardSnapshot {
        let state = &inner.state;
        WizardSnapshot {
            step: state.step,
            step_index: state.step.index(),
            step_label: state.step.label(),
            form: state.form.clone(),
            frames_captured: state.captured_frames.len(),
            placeholder_frames: state
                .captured_frames
                .iter()
                .filter(|f| f.is_placeholder())
                .count(),
            capture_target: self.ctx.settings.capture_target,
            capturing: inner.capture_task.is_some(),
            can_advance: self.gate(state).is_ok(),
            training_progress: state.training_progress,
            training: inner.training_task.is_some(),
        }
    }

    /// Replace the identity fields. Only allowed during basic info.
    pub fn update_form(&self, draft: EmployeeDraft) -> Result<WizardSnapshot, WizardError> {
        let mut inner = lock(&self.inner);
        if inner.state.step != WizardStep::BasicInfo {
            return Err(WizardError::FormLocked(inner.state.step));
        }
        inner.state.form = draft;
        Ok(self.snapshot_of(&inner))
    }

    /// Stage gate for the current step.
    fn gate(&self, state: &WizardState) -> Result<(), WizardError> {
        match state.step {
            WizardStep::BasicInfo => {
                let missing = state.form.missing_fields();
                if missing.is_empty() {
                    Ok(())
                } else {
                    Err(WizardError::IncompleteForm(missing))
                }
            }
            WizardStep::CaptureFaces => {
                let captured = state.captured_frames.len();
                let target = self.ctx.settings.capture_target;
                if captured == target {
                    Ok(())
                } else {
                    Err(WizardError::CaptureIncomplete { captured, target })
                }
            }
            WizardStep::TrainModel => {
                if state.training_progress == PROGRESS_DONE {
                    Ok(())
                } else {
                    Err(WizardError::TrainingIncomplete(state.training_progress))
                }
            }
            WizardStep::Complete => Err(WizardError::AlreadyComplete),
        }
    }

    /// Advance one stage if the current stage's gate is satisfied.
    pub fn next(&self) -> Result<WizardSnapshot, WizardError> {
        let mut inner = lock(&self.inner);
        self.gate(&inner.state)?;
        match inner.state.step {
            WizardStep::BasicInfo => self.enter_capture(&mut inner),
            WizardStep::CaptureFaces => {
                stop_capture(&mut inner);
                inner.state.step = WizardStep::TrainModel;
            }
            WizardStep::TrainModel => complete(&mut inner, &self.ctx),
            WizardStep::Complete => return Err(WizardError::AlreadyComplete),
        }
        tracing::info!(step = %inner.state.step, "enrollment advanced");
        Ok(self.snapshot_of(&inner))
    }

    /// Step back from capture to basic info. Frames already captured are kept.
    pub fn back(&self) -> Result<WizardSnapshot, WizardError> {
        let mut inner = lock(&self.inner);
        match inner.state.step {
            WizardStep::BasicInfo => {}
            WizardStep::CaptureFaces => {
                stop_capture(&mut inner);
                inner.state.step = WizardStep::BasicInfo;
                tracing::info!("enrollment back to basic info");
            }
            step => return Err(WizardError::BackwardNotAllowed(step)),
        }
        Ok(self.snapshot_of(&inner))
    }

    /// Start the training loop. Once started it runs to completion.
    pub fn start_training(&self) -> Result<WizardSnapshot, WizardError> {
        let mut inner = lock(&self.inner);
        if inner.state.step != WizardStep::TrainModel {
            return Err(WizardError::WrongStep {
                expected: WizardStep::TrainModel,
                actual: inner.state.step,
            });
        }
        if inner.training_task.is_some() || inner.state.training_progress > 0 {
            return Err(WizardError::TrainingAlreadyStarted);
        }

        let epoch = inner.epoch;
        let weak = Arc::downgrade(&self.inner);
        let ctx = self.ctx.clone();
        let period = ctx.settings.training_tick;
        inner.training_task = Some(ScheduledTask::spawn("enroll-training", async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if !training_tick(&weak, &ctx, epoch) {
                    break;
                }
            }
        }));
        tracing::info!(
            frames = inner.state.captured_frames.len(),
            "enrollment training started"
        );
        Ok(self.snapshot_of(&inner))
    }

    /// Return to the initial state. Refused while training is running.
    pub fn reset(&self) -> Result<WizardSnapshot, WizardError> {
        let mut inner = lock(&self.inner);
        if inner.training_task.is_some() {
            return Err(WizardError::TrainingInProgress);
        }
        stop_capture(&mut inner);
        inner.state = WizardState::default();
        tracing::info!("enrollment reset");
        Ok(self.snapshot_of(&inner))
    }

    fn enter_capture(&self, inner: &mut WizardInner) {
        inner.state.step = WizardStep::CaptureFaces;
        if inner.state.captured_frames.len() >= self.ctx.settings.capture_target {
            return;
        }

        let epoch = inner.epoch;
        let weak = Arc::downgrade(&self.inner);
        let ctx = self.ctx.clone();
        let period = ctx.settings.capture_interval;
        inner.capture_task = Some(ScheduledTask::spawn("enroll-capture", async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let captured = ctx.camera.capture_still().await;
                if !capture_tick(&weak, &ctx, epoch, captured) {
                    break;
                }
            }
        }));
    }
}

fn stop_capture(inner: &mut WizardInner) {
    inner.epoch += 1;
    if let Some(task) = inner.capture_task.take() {
        task.cancel();
    }
}

/// Apply one capture result. Returns whether the loop should keep going.
fn capture_tick(
    weak: &Weak<Mutex<WizardInner>>,
    ctx: &WizardContext,
    epoch: u64,
    captured: Result<ImagePayload, CameraError>,
) -> bool {
    let Some(inner) = weak.upgrade() else {
        return false;
    };
    let mut inner = lock(&inner);
    if inner.epoch != epoch || inner.state.step != WizardStep::CaptureFaces {
        return false;
    }

    let target = ctx.settings.capture_target;
    let frames = &mut inner.state.captured_frames;
    match captured {
        Ok(payload) => {
            if frames.len() < target {
                frames.push(CapturedFrame {
                    index: frames.len(),
                    content: FrameContent::Image(payload),
                });
            }
        }
        Err(err) => {
            let real = frames.len();
            while frames.len() < target {
                frames.push(CapturedFrame {
                    index: frames.len(),
                    content: FrameContent::Placeholder,
                });
            }
            tracing::warn!(
                error = %err,
                real,
                placeholders = target - real,
                "camera unavailable during enrollment; filled with placeholder frames"
            );
            ctx.notifier.publish(Notification::new(
                Severity::Warning,
                "Camera Unavailable",
                format!("Continuing with {} placeholder frames", target - real),
            ));
        }
    }

    let captured = inner.state.captured_frames.len();
    tracing::debug!(captured, target, "enrollment frame captured");
    if captured >= target {
        inner.capture_task = None;
        return false;
    }
    true
}

/// Apply one training tick. Returns whether the loop should keep going.
fn training_tick(weak: &Weak<Mutex<WizardInner>>, ctx: &WizardContext, epoch: u64) -> bool {
    let Some(inner) = weak.upgrade() else {
        return false;
    };
    let mut inner = lock(&inner);
    if inner.epoch != epoch || inner.state.step != WizardStep::TrainModel {
        return false;
    }

    let progress = inner
        .state
        .training_progress
        .saturating_add(ctx.settings.training_step)
        .min(PROGRESS_DONE);
    inner.state.training_progress = progress;
    tracing::debug!(progress, "enrollment training progress");

    if progress < PROGRESS_DONE {
        return true;
    }
    complete(&mut inner, ctx);
    false
}

/// Enter `Complete`: tear down training, notify once, submit the employee.
fn complete(inner: &mut WizardInner, ctx: &WizardContext) {
    inner.state.step = WizardStep::Complete;
    // Dropping our own handle from inside the task is fine; it returns next.
    inner.training_task = None;

    let name = inner.state.form.name.trim().to_string();
    ctx.notifier.publish(Notification::new(
        Severity::Success,
        "Model trained successfully",
        format!("Face model ready for {name}"),
    ));

    let (Some(directory), Some(employee)) =
        (ctx.directory.clone(), inner.state.form.to_employee())
    else {
        return;
    };
    let notifier = ctx.notifier.clone();
    tokio::spawn(async move {
        match directory.register(&employee).await {
            Ok(resp) if resp.success => {
                tracing::info!(employee = %employee.id, "employee registered");
            }
            Ok(resp) => notifier.publish(Notification::new(
                Severity::Warning,
                "Registration Failed",
                resp.message
                    .unwrap_or_else(|| format!("Could not register {}", employee.name)),
            )),
            Err(err) => {
                tracing::warn!(error = %err, employee = %employee.id, "registration request failed");
                notifier.publish(Notification::new(
                    Severity::Warning,
                    "Registration Failed",
                    format!("Could not register {}", employee.name),
                ));
            }
        }
    });
}
