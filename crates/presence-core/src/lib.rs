//! presence-core: attendance data model and remote service contracts.
//!
//! Holds the types shared by the capture pipeline, the feed poller and the
//! enrollment wizard, the async traits through which the remote recognition
//! and attendance services are consumed, and the classification rules that
//! turn raw service responses into user-facing outcomes.

pub mod service;
pub mod stats;
pub mod types;
mod wire;

pub use service::{
    AttendanceService, AuthService, DashboardService, EmployeeDirectory, RecognitionService,
    ServiceError,
};
pub use types::{
    clamp_confidence, recent_window, AdminUser, AttendanceRecord, AttendanceStatus,
    ClockInOutcome, ClockInRequest, ClockInResponse, DashboardStats, Employee, EmployeeDraft,
    EmployeeSummary, LoginResponse, RecognitionResult, RecognizeResponse, RecognizedEmployee,
    RegisterResponse,
};
