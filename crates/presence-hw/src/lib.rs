//! presence-hw: hardware abstraction for still capture and geolocation.
//!
//! Provides a V4L2-based camera that yields JPEG stills, a disabled camera
//! for degraded mode, and best-effort location providers.

pub mod camera;
pub mod capture;
pub mod frame;
pub mod geolocation;

pub use camera::{Camera, CameraError, PixelFormat};
pub use capture::{CaptureSource, NoCamera};
pub use frame::{Frame, ImagePayload};
pub use geolocation::{Coordinates, FixedLocation, GeolocationSource, LocationError, NoLocation};
