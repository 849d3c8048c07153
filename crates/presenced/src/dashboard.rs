//! Dashboard counters, with a local fallback.

use presence_core::stats::aggregate;
use presence_core::{AttendanceService, DashboardService, DashboardStats, ServiceError};

/// Fetch dashboard counters from the stats endpoint. If that fails, derive
/// them from today's records instead; only when both fail is it an error.
pub async fn load_stats(
    dashboard: &dyn DashboardService,
    attendance: &dyn AttendanceService,
    roster_size: u32,
) -> Result<DashboardStats, ServiceError> {
    match dashboard.stats().await {
        Ok(stats) => Ok(stats),
        Err(err) => {
            tracing::warn!(error = %err, "stats endpoint failed; aggregating from today's records");
            let records = attendance.today().await?;
            Ok(aggregate(&records, roster_size))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;
    use presence_core::AttendanceStatus;

    #[tokio::test]
    async fn test_prefers_stats_endpoint() {
        let backend = FakeBackend::new();
        let stats = DashboardStats {
            total_employees: 12,
            today_present: 9,
            late_arrivals: 2,
            absent_today: 3,
        };
        backend.set_stats(Some(stats));
        let got = load_stats(backend.as_ref(), backend.as_ref(), 0).await.unwrap();
        assert_eq!(got, stats);
    }

    #[tokio::test]
    async fn test_falls_back_to_records() {
        let backend = FakeBackend::new();
        backend.seed_record("101", "Budi", AttendanceStatus::OnTime);
        backend.seed_record("102", "Sari", AttendanceStatus::Late);
        backend.seed_record("102", "Sari", AttendanceStatus::Late);

        let got = load_stats(backend.as_ref(), backend.as_ref(), 5).await.unwrap();
        assert_eq!(
            got,
            DashboardStats {
                total_employees: 5,
                today_present: 2,
                late_arrivals: 1,
                absent_today: 3,
            }
        );
    }

    #[tokio::test]
    async fn test_both_failing_is_an_error() {
        let backend = FakeBackend::new();
        backend.today_fails(Some(ServiceError::Transport("down".into())));
        assert!(load_stats(backend.as_ref(), backend.as_ref(), 5).await.is_err());
    }
}
