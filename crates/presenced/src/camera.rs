//! Async front for the capture device.
//!
//! A V4L2 still blocks until the driver hands back a buffer, with no upper
//! bound. Every capture therefore runs on the blocking pool and the
//! controllers await the reply, so a stalled device never holds up the
//! runtime thread that also serves timers and D-Bus.

use presence_hw::{CameraError, CaptureSource, ImagePayload};
use std::sync::Arc;

/// Cloneable handle shared by the pipeline and the enrollment wizard.
///
/// Concurrent requests are serialised by the device itself.
#[derive(Clone)]
pub struct CameraHandle {
    source: Arc<dyn CaptureSource>,
}

impl CameraHandle {
    pub fn new(source: Arc<dyn CaptureSource>) -> Self {
        Self { source }
    }

    pub fn describe(&self) -> String {
        self.source.describe()
    }

    /// Take one still without blocking the caller's thread.
    pub async fn capture_still(&self) -> Result<ImagePayload, CameraError> {
        let source = self.source.clone();
        match tokio::task::spawn_blocking(move || source.capture_still()).await {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(error = %err, "capture worker failed");
                Err(CameraError::CaptureFailed(err.to_string()))
            }
        }
    }
}
