//! HTTP client for the attendance backend.
//!
//! One `reqwest::Client` with a cookie store, so the admin session cookie
//! set by `/api/auth/login` rides along on later calls.

use async_trait::async_trait;
use presence_core::{
    AdminUser, AttendanceRecord, AttendanceService, AuthService, ClockInRequest, ClockInResponse,
    DashboardService, DashboardStats, Employee, EmployeeDirectory, LoginResponse,
    RecognitionService, RecognizeResponse, RegisterResponse, ServiceError,
};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// `{success, data, message}` wrapper used by the list endpoints.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MeResponse {
    #[serde(default)]
    user: Option<AdminUser>,
}

pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let http = Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .user_agent(concat!("presenced/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Whether the backend answers its health check.
    pub async fn health(&self) -> Result<bool, ServiceError> {
        let resp = self
            .http
            .get(self.url("/api/health"))
            .send()
            .await
            .map_err(transport)?;
        Ok(resp.status().is_success())
    }
}

fn transport(err: reqwest::Error) -> ServiceError {
    if err.is_decode() {
        ServiceError::Decode(err.to_string())
    } else {
        ServiceError::Transport(err.to_string())
    }
}

/// Map a non-2xx response to an error, keeping the backend's message when
/// the body carries one.
fn status_error(status: StatusCode, body: &str) -> ServiceError {
    if status == StatusCode::UNAUTHORIZED {
        return ServiceError::Unauthorized;
    }
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(String::from))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string()
        });
    ServiceError::Status {
        status: status.as_u16(),
        message,
    }
}

/// Decode the body whatever the status, for endpoints that report domain
/// failures (unrecognised face, duplicate clock-in) as 4xx with JSON.
async fn decode_any<T: DeserializeOwned>(resp: Response) -> Result<T, ServiceError> {
    let status = resp.status();
    let body = resp.text().await.map_err(transport)?;
    match serde_json::from_str(&body) {
        Ok(value) => Ok(value),
        Err(_) if !status.is_success() => Err(status_error(status, &body)),
        Err(err) => Err(ServiceError::Decode(err.to_string())),
    }
}

async fn decode_ok<T: DeserializeOwned>(resp: Response) -> Result<T, ServiceError> {
    let status = resp.status();
    let body = resp.text().await.map_err(transport)?;
    if !status.is_success() {
        return Err(status_error(status, &body));
    }
    serde_json::from_str(&body).map_err(|e| ServiceError::Decode(e.to_string()))
}

fn unwrap_envelope<T>(envelope: Envelope<T>) -> Result<T, ServiceError> {
    match (envelope.success, envelope.data) {
        (true, Some(data)) => Ok(data),
        (_, _) => Err(ServiceError::Decode(
            envelope
                .message
                .unwrap_or_else(|| "response carried no data".to_string()),
        )),
    }
}

fn id_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl RecognitionService for ApiClient {
    async fn recognize(&self, image: &str) -> Result<RecognizeResponse, ServiceError> {
        let resp = self
            .http
            .post(self.url("/api/face/recognize"))
            .json(&json!({ "image": image }))
            .send()
            .await
            .map_err(transport)?;
        tracing::debug!(status = %resp.status(), "recognize response");
        decode_any(resp).await
    }
}

#[async_trait]
impl AttendanceService for ApiClient {
    async fn clock_in(&self, request: &ClockInRequest) -> Result<ClockInResponse, ServiceError> {
        let resp = self
            .http
            .post(self.url("/api/attendance/clock-in"))
            .json(request)
            .send()
            .await
            .map_err(transport)?;
        tracing::debug!(status = %resp.status(), employee = %request.employee_id, "clock-in response");
        decode_any(resp).await
    }

    async fn today(&self) -> Result<Vec<AttendanceRecord>, ServiceError> {
        let resp = self
            .http
            .get(self.url("/api/attendance/today"))
            .send()
            .await
            .map_err(transport)?;
        unwrap_envelope(decode_ok(resp).await?)
    }
}

#[async_trait]
impl DashboardService for ApiClient {
    async fn stats(&self) -> Result<DashboardStats, ServiceError> {
        let resp = self
            .http
            .get(self.url("/api/dashboard/stats"))
            .send()
            .await
            .map_err(transport)?;
        unwrap_envelope(decode_ok(resp).await?)
    }
}

#[async_trait]
impl AuthService for ApiClient {
    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ServiceError> {
        let resp = self
            .http
            .post(self.url("/api/auth/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .map_err(transport)?;
        decode_any(resp).await
    }

    async fn logout(&self) -> Result<(), ServiceError> {
        let resp = self
            .http
            .post(self.url("/api/auth/logout"))
            .send()
            .await
            .map_err(transport)?;
        decode_ok::<Value>(resp).await.map(|_| ())
    }

    async fn me(&self) -> Result<Option<AdminUser>, ServiceError> {
        let resp = self
            .http
            .get(self.url("/api/auth/me"))
            .send()
            .await
            .map_err(transport)?;
        match decode_ok::<MeResponse>(resp).await {
            Ok(me) => Ok(me.user),
            Err(ServiceError::Unauthorized) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl EmployeeDirectory for ApiClient {
    async fn register(&self, employee: &Employee) -> Result<RegisterResponse, ServiceError> {
        let resp = self
            .http
            .post(self.url("/api/employees/register"))
            .json(employee)
            .send()
            .await
            .map_err(transport)?;
        decode_any(resp).await
    }

    async fn next_id(&self) -> Result<String, ServiceError> {
        let resp = self
            .http
            .get(self.url("/api/employees/next-id"))
            .send()
            .await
            .map_err(transport)?;
        let body: Value = decode_ok(resp).await?;
        body.get("nextId")
            .and_then(id_value)
            .ok_or_else(|| ServiceError::Decode("missing nextId".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_core::AttendanceStatus;

    #[test]
    fn test_base_url_is_normalised() {
        let client = ApiClient::new("http://127.0.0.1:5000/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:5000");
        assert_eq!(
            client.url("/api/health"),
            "http://127.0.0.1:5000/api/health"
        );
    }

    #[test]
    fn test_status_error_keeps_backend_message() {
        let err = status_error(
            StatusCode::NOT_FOUND,
            r#"{"success": false, "message": "Employee not found"}"#,
        );
        assert_eq!(
            err,
            ServiceError::Status {
                status: 404,
                message: "Employee not found".into()
            }
        );

        let err = status_error(StatusCode::BAD_GATEWAY, "<html>");
        assert!(matches!(err, ServiceError::Status { status: 502, ref message } if message == "Bad Gateway"));
        assert_eq!(
            status_error(StatusCode::UNAUTHORIZED, ""),
            ServiceError::Unauthorized
        );
    }

    #[test]
    fn test_today_envelope() {
        let body = r#"{
            "success": true,
            "data": [{
                "id": 7, "employeeId": 101, "employeeName": "Budi",
                "department": "IT", "date": "2026-10-17", "clockIn": "08:55:10",
                "clockOut": null, "status": "on-time", "confidence": 92.5,
                "latitude": "-6.2", "longitude": "106.8"
            }]
        }"#;
        let envelope: Envelope<Vec<AttendanceRecord>> = serde_json::from_str(body).unwrap();
        let records = unwrap_envelope(envelope).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "7");
        assert_eq!(records[0].employee_id.as_deref(), Some("101"));
        assert_eq!(records[0].status, AttendanceStatus::OnTime);
    }

    #[test]
    fn test_empty_envelope_is_decode_error() {
        let envelope: Envelope<DashboardStats> =
            serde_json::from_str(r#"{"success": false, "message": "db down"}"#).unwrap();
        assert_eq!(
            unwrap_envelope(envelope).unwrap_err(),
            ServiceError::Decode("db down".into())
        );
    }

    #[test]
    fn test_id_value() {
        assert_eq!(id_value(&json!(104)), Some("104".into()));
        assert_eq!(id_value(&json!("EMP1")), Some("EMP1".into()));
        assert_eq!(id_value(&Value::Null), None);
    }
}
