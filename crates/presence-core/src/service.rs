//! Contracts for the remote services the client consumes.
//!
//! The concrete wire transport lives with the daemon; everything here is
//! request/response shape only, so controllers can be driven by fakes.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{
    AdminUser, AttendanceRecord, ClockInRequest, ClockInResponse, DashboardStats, Employee,
    LoginResponse, RecognizeResponse, RegisterResponse,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("service returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("not authenticated")]
    Unauthorized,
}

/// Remote face recognition.
#[async_trait]
pub trait RecognitionService: Send + Sync {
    /// Submit one still image (as a `data:` URL) for recognition.
    async fn recognize(&self, image: &str) -> Result<RecognizeResponse, ServiceError>;
}

/// Remote attendance records.
#[async_trait]
pub trait AttendanceService: Send + Sync {
    /// Record a clock-in. A duplicate for the current period comes back as
    /// `Ok` with `already_checked_in` set, not as an error.
    async fn clock_in(&self, request: &ClockInRequest) -> Result<ClockInResponse, ServiceError>;

    /// Today's records, in whatever order the service returns them.
    async fn today(&self) -> Result<Vec<AttendanceRecord>, ServiceError>;
}

#[async_trait]
pub trait DashboardService: Send + Sync {
    async fn stats(&self) -> Result<DashboardStats, ServiceError>;
}

/// Admin authentication.
#[async_trait]
pub trait AuthService: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ServiceError>;
    async fn logout(&self) -> Result<(), ServiceError>;
    /// The user behind the current session, or `None` if there is none.
    async fn me(&self) -> Result<Option<AdminUser>, ServiceError>;
}

/// Employee registry the enrollment wizard submits to.
#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    async fn register(&self, employee: &Employee) -> Result<RegisterResponse, ServiceError>;
    async fn next_id(&self) -> Result<String, ServiceError>;
}
