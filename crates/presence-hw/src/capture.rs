//! Capture Source abstraction.

use crate::camera::CameraError;
use crate::frame::ImagePayload;

/// Anything that can produce a still frame on demand.
///
/// Capture is synchronous and may block on the device for as long as the
/// driver takes, so async callers must keep it off their runtime thread. Any
/// error means the source is unavailable for this request and callers
/// degrade accordingly.
pub trait CaptureSource: Send + Sync {
    fn capture_still(&self) -> Result<ImagePayload, CameraError>;

    /// Human-readable description for status output.
    fn describe(&self) -> String;
}

/// A capture source with no device behind it.
///
/// Used when the camera is disabled in configuration or failed to open, so
/// the daemon keeps running and every capture reports unavailability.
pub struct NoCamera {
    reason: String,
}

impl NoCamera {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl CaptureSource for NoCamera {
    fn capture_still(&self) -> Result<ImagePayload, CameraError> {
        Err(CameraError::Disabled(self.reason.clone()))
    }

    fn describe(&self) -> String {
        format!("unavailable ({})", self.reason)
    }
}
