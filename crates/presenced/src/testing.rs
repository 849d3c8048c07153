//! In-process fakes for controller tests.

use async_trait::async_trait;
use chrono::NaiveTime;
use presence_core::{
    AdminUser, AttendanceRecord, AttendanceService, AttendanceStatus, AuthService,
    ClockInRequest, ClockInResponse, DashboardService, DashboardStats, Employee,
    EmployeeDirectory, LoginResponse, RecognitionService, RecognizeResponse, RecognizedEmployee,
    RegisterResponse, ServiceError,
};
use presence_hw::{
    CameraError, CaptureSource, Coordinates, GeolocationSource, ImagePayload, LocationError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub fn payload() -> ImagePayload {
    ImagePayload {
        bytes: vec![0xFF, 0xD8, 0xFF, 0xD9],
        mime: "image/jpeg",
        width: 1,
        height: 1,
    }
}

/// Capture source that succeeds for the first `available_for` calls and
/// reports unavailability afterwards.
pub struct FakeCamera {
    available_for: usize,
    /// Blocks the calling thread this long per capture, like a slow driver.
    stall: Duration,
    calls: AtomicUsize,
}

impl FakeCamera {
    pub fn working() -> Self {
        Self::failing_after(usize::MAX)
    }

    pub fn unavailable() -> Self {
        Self::failing_after(0)
    }

    pub fn failing_after(available_for: usize) -> Self {
        Self {
            available_for,
            stall: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn stalling(stall: Duration) -> Self {
        Self {
            stall,
            ..Self::working()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CaptureSource for FakeCamera {
    fn capture_still(&self) -> Result<ImagePayload, CameraError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.stall.is_zero() {
            std::thread::sleep(self.stall);
        }
        if n < self.available_for {
            Ok(payload())
        } else {
            Err(CameraError::PermissionDenied("/dev/video0".into()))
        }
    }

    fn describe(&self) -> String {
        "fake".into()
    }
}

pub struct CountingLocation {
    coords: Coordinates,
    calls: AtomicUsize,
}

impl CountingLocation {
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            coords: Coordinates { latitude, longitude },
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl GeolocationSource for CountingLocation {
    fn get_position(&self) -> Result<Coordinates, LocationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.coords)
    }
}

#[derive(Default)]
struct BackendState {
    recognize: Option<Result<RecognizeResponse, ServiceError>>,
    records: Vec<AttendanceRecord>,
    clock_in_error: Option<ServiceError>,
    clock_in_requests: Vec<ClockInRequest>,
    today_error: Option<ServiceError>,
    stats: Option<DashboardStats>,
    logged_in: Option<AdminUser>,
    registered: Vec<Employee>,
}

/// A backend double that behaves like the real service: one clock-in per
/// employee per day, with duplicates flagged `already_checked_in`.
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<BackendState>,
    recognize_gate: Mutex<Option<Arc<Notify>>>,
    pub recognize_calls: AtomicUsize,
    pub clock_in_calls: AtomicUsize,
    pub today_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn recognizes(&self, id: &str, name: &str, confidence: f32) {
        self.state.lock().unwrap().recognize = Some(Ok(RecognizeResponse {
            success: true,
            recognized: true,
            employee: Some(RecognizedEmployee {
                id: id.into(),
                name: Some(name.into()),
                position: Some("Engineer".into()),
                confidence: Some(confidence),
            }),
            message: None,
        }));
    }

    pub fn does_not_recognize(&self, message: Option<&str>) {
        self.state.lock().unwrap().recognize = Some(Ok(RecognizeResponse {
            success: true,
            recognized: false,
            employee: None,
            message: message.map(String::from),
        }));
    }

    pub fn recognition_fails(&self) {
        self.state.lock().unwrap().recognize =
            Some(Err(ServiceError::Transport("connection reset".into())));
    }

    /// Hold every recognition call until the returned handle is notified.
    pub fn gate_recognition(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.recognize_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn clock_in_fails(&self, err: ServiceError) {
        self.state.lock().unwrap().clock_in_error = Some(err);
    }

    pub fn today_fails(&self, err: Option<ServiceError>) {
        self.state.lock().unwrap().today_error = err;
    }

    pub fn set_stats(&self, stats: Option<DashboardStats>) {
        self.state.lock().unwrap().stats = stats;
    }

    pub fn seed_record(&self, employee_id: &str, name: &str, status: AttendanceStatus) {
        let mut state = self.state.lock().unwrap();
        let id = state.records.len() + 1;
        state.records.push(record(id, employee_id, name, status));
    }

    pub fn record_count(&self) -> usize {
        self.state.lock().unwrap().records.len()
    }

    pub fn clock_in_requests(&self) -> Vec<ClockInRequest> {
        self.state.lock().unwrap().clock_in_requests.clone()
    }

    pub fn registered(&self) -> Vec<Employee> {
        self.state.lock().unwrap().registered.clone()
    }
}

fn record(id: usize, employee_id: &str, name: &str, status: AttendanceStatus) -> AttendanceRecord {
    AttendanceRecord {
        id: id.to_string(),
        employee_id: Some(employee_id.into()),
        employee_name: name.into(),
        department: None,
        date: None,
        // Later records clock in later, so newest sorts first.
        clock_in: NaiveTime::from_hms_opt(8, id as u32 % 60, 0).unwrap(),
        clock_out: None,
        status,
        confidence: 95.0,
    }
}

#[async_trait]
impl RecognitionService for FakeBackend {
    async fn recognize(&self, image: &str) -> Result<RecognizeResponse, ServiceError> {
        assert!(image.starts_with("data:image/jpeg;base64,"));
        self.recognize_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.recognize_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.state
            .lock()
            .unwrap()
            .recognize
            .clone()
            .unwrap_or_else(|| Ok(RecognizeResponse::default()))
    }
}

#[async_trait]
impl AttendanceService for FakeBackend {
    async fn clock_in(&self, request: &ClockInRequest) -> Result<ClockInResponse, ServiceError> {
        self.clock_in_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        state.clock_in_requests.push(request.clone());
        if let Some(err) = state.clock_in_error.clone() {
            return Err(err);
        }
        if let Some(existing) = state
            .records
            .iter()
            .find(|r| r.employee_id.as_deref() == Some(request.employee_id.as_str()))
        {
            return Ok(ClockInResponse {
                success: false,
                message: Some(format!(
                    "Anda sudah check-in hari ini pada {}",
                    existing.clock_in
                )),
                already_checked_in: true,
                check_in_time: Some(existing.clock_in.to_string()),
            });
        }
        let id = state.records.len() + 1;
        let name = format!("employee {}", request.employee_id);
        state
            .records
            .push(record(id, &request.employee_id, &name, AttendanceStatus::OnTime));
        Ok(ClockInResponse {
            success: true,
            message: Some("Attendance recorded successfully".into()),
            ..Default::default()
        })
    }

    async fn today(&self) -> Result<Vec<AttendanceRecord>, ServiceError> {
        self.today_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        match &state.today_error {
            Some(err) => Err(err.clone()),
            None => Ok(state.records.clone()),
        }
    }
}

#[async_trait]
impl DashboardService for FakeBackend {
    async fn stats(&self) -> Result<DashboardStats, ServiceError> {
        self.state.lock().unwrap().stats.ok_or(ServiceError::Status {
            status: 500,
            message: "stats unavailable".into(),
        })
    }
}

#[async_trait]
impl AuthService for FakeBackend {
    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ServiceError> {
        if username == "admin" && password == "admin123" {
            let user = AdminUser {
                username: username.into(),
                role: "admin".into(),
            };
            self.state.lock().unwrap().logged_in = Some(user.clone());
            Ok(LoginResponse {
                success: true,
                user: Some(user),
                message: Some("Login successful".into()),
            })
        } else {
            Ok(LoginResponse {
                success: false,
                user: None,
                message: Some("Invalid credentials".into()),
            })
        }
    }

    async fn logout(&self) -> Result<(), ServiceError> {
        self.state.lock().unwrap().logged_in = None;
        Ok(())
    }

    async fn me(&self) -> Result<Option<AdminUser>, ServiceError> {
        Ok(self.state.lock().unwrap().logged_in.clone())
    }
}

impl FakeBackend {
    /// Simulate the backend dropping the session (e.g. restart).
    pub fn expire_session(&self) {
        self.state.lock().unwrap().logged_in = None;
    }
}

#[async_trait]
impl EmployeeDirectory for FakeBackend {
    async fn register(&self, employee: &Employee) -> Result<RegisterResponse, ServiceError> {
        self.state.lock().unwrap().registered.push(employee.clone());
        Ok(RegisterResponse {
            success: true,
            message: Some("Employee registered successfully".into()),
            employee_id: Some(employee.id.clone()),
        })
    }

    async fn next_id(&self) -> Result<String, ServiceError> {
        Ok((101 + self.state.lock().unwrap().registered.len()).to_string())
    }
}
