use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::service::ServiceError;
use crate::wire;

/// Lowest and highest confidence value the client ever reports.
pub const CONFIDENCE_MIN: f32 = 0.0;
pub const CONFIDENCE_MAX: f32 = 100.0;

/// Clamp a confidence score into [0, 100]. NaN maps to 0.
pub fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        return CONFIDENCE_MIN;
    }
    value.clamp(CONFIDENCE_MIN, CONFIDENCE_MAX)
}

/// A registered employee. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: String,
    pub name: String,
    pub position: String,
    pub department: String,
}

/// Identity fields entered during the first enrollment stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeDraft {
    pub name: String,
    pub id: String,
    pub position: String,
    pub department: String,
}

impl EmployeeDraft {
    /// Names of the identity fields that are still blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("name", &self.name),
            ("id", &self.id),
            ("position", &self.position),
            ("department", &self.department),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Build the employee record, or `None` while any field is blank.
    pub fn to_employee(&self) -> Option<Employee> {
        if !self.is_complete() {
            return None;
        }
        Some(Employee {
            id: self.id.trim().to_string(),
            name: self.name.trim().to_string(),
            position: self.position.trim().to_string(),
            department: self.department.trim().to_string(),
        })
    }
}

/// The employee a recognition attempt resolved to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeSummary {
    pub id: String,
    pub name: String,
    pub position: String,
    /// Recognition confidence in [0, 100].
    pub confidence: f32,
}

/// Wire shape of a recognition response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecognizeResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub recognized: bool,
    #[serde(default)]
    pub employee: Option<RecognizedEmployee>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizedEmployee {
    #[serde(deserialize_with = "wire::id_string")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default, deserialize_with = "wire::opt_confidence")]
    pub confidence: Option<f32>,
}

impl RecognizeResponse {
    /// Collapse the wire response into a recognition result.
    ///
    /// A face counts as recognized only when the call succeeded, the service
    /// said so, and an employee came back with it.
    pub fn into_result(self) -> RecognitionResult {
        match self.employee {
            Some(emp) if self.success && self.recognized => {
                let confidence = clamp_confidence(emp.confidence.unwrap_or(0.0));
                RecognitionResult {
                    recognized: true,
                    employee: Some(EmployeeSummary {
                        id: emp.id,
                        name: emp.name.unwrap_or_else(|| "Unknown".to_string()),
                        position: emp.position.unwrap_or_else(|| "Employee".to_string()),
                        confidence,
                    }),
                    confidence,
                    message: self.message,
                }
            }
            _ => RecognitionResult::miss(self.message),
        }
    }
}

/// Outcome of one recognition request. Lives for a single pipeline cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognitionResult {
    pub recognized: bool,
    pub employee: Option<EmployeeSummary>,
    pub confidence: f32,
    pub message: Option<String>,
}

impl RecognitionResult {
    pub fn miss(message: Option<String>) -> Self {
        Self {
            recognized: false,
            employee: None,
            confidence: 0.0,
            message,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttendanceStatus {
    OnTime,
    Late,
    Absent,
}

/// A clock-in record owned by the remote attendance service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    #[serde(deserialize_with = "wire::id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "wire::opt_id_string")]
    pub employee_id: Option<String>,
    pub employee_name: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    pub clock_in: NaiveTime,
    #[serde(default)]
    pub clock_out: Option<NaiveTime>,
    pub status: AttendanceStatus,
    #[serde(default, deserialize_with = "wire::confidence")]
    pub confidence: f32,
}

impl AttendanceRecord {
    /// Key used to count distinct people: employee id when known, else name.
    pub fn person_key(&self) -> &str {
        self.employee_id.as_deref().unwrap_or(&self.employee_name)
    }
}

/// Order records most-recent-first and keep at most `window` of them.
pub fn recent_window(mut records: Vec<AttendanceRecord>, window: usize) -> Vec<AttendanceRecord> {
    records.sort_by(|a, b| (b.date, b.clock_in).cmp(&(a.date, a.clock_in)));
    records.truncate(window);
    records
}

/// Clock-in request body. Coordinates travel as decimal strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockInRequest {
    pub employee_id: String,
    pub latitude: String,
    pub longitude: String,
}

impl ClockInRequest {
    pub fn new(employee_id: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            employee_id: employee_id.into(),
            latitude: latitude.to_string(),
            longitude: longitude.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClockInResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub already_checked_in: bool,
    #[serde(default)]
    pub check_in_time: Option<String>,
}

/// Classified result of a clock-in attempt. Never retried automatically.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClockInOutcome {
    Success { message: Option<String> },
    AlreadyCheckedIn { message: Option<String> },
    Failure { reason: String },
}

impl ClockInOutcome {
    /// Sort a clock-in response into exactly one of the three buckets.
    ///
    /// Transport failures become `Failure` with a generic reason; the raw
    /// error is logged here and goes no further.
    pub fn classify(result: Result<ClockInResponse, ServiceError>) -> Self {
        match result {
            Ok(resp) if resp.success => Self::Success {
                message: resp.message,
            },
            Ok(resp) if resp.already_checked_in => Self::AlreadyCheckedIn {
                message: resp.message,
            },
            Ok(resp) => Self::Failure {
                reason: resp
                    .message
                    .unwrap_or_else(|| "Failed to record attendance".to_string()),
            },
            Err(err) => {
                tracing::warn!(error = %err, "clock-in request failed");
                Self::Failure {
                    reason: "Failed to record attendance".to_string(),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_employees: u32,
    pub today_present: u32,
    pub late_arrivals: u32,
    pub absent_today: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminUser {
    pub username: String,
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub user: Option<AdminUser>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "wire::opt_id_string")]
    pub employee_id: Option<String>,
}
