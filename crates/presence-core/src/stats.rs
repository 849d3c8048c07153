//! Client-side dashboard aggregation, used when the stats endpoint is down.

use std::collections::HashSet;

use crate::types::{AttendanceRecord, AttendanceStatus, DashboardStats};

/// Aggregate today's records into dashboard counters.
///
/// People are counted once however many records they have. `roster_size`
/// of 0 means the roster is unknown, in which case everyone present is
/// taken as the whole roster.
pub fn aggregate(records: &[AttendanceRecord], roster_size: u32) -> DashboardStats {
    let present: HashSet<&str> = records.iter().map(AttendanceRecord::person_key).collect();
    let late: HashSet<&str> = records
        .iter()
        .filter(|r| r.status == AttendanceStatus::Late)
        .map(AttendanceRecord::person_key)
        .collect();

    let today_present = present.len() as u32;
    let total_employees = roster_size.max(today_present);

    DashboardStats {
        total_employees,
        today_present,
        late_arrivals: late.len() as u32,
        absent_today: total_employees.saturating_sub(today_present),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn rec(person: &str, status: AttendanceStatus) -> AttendanceRecord {
        AttendanceRecord {
            id: format!("{person}-{status:?}"),
            employee_id: Some(person.into()),
            employee_name: person.into(),
            department: None,
            date: None,
            clock_in: NaiveTime::from_hms_opt(9, 15, 0).unwrap(),
            clock_out: None,
            status,
            confidence: 95.0,
        }
    }

    #[test]
    fn test_aggregate_counts_distinct_people() {
        let records = vec![
            rec("101", AttendanceStatus::OnTime),
            rec("101", AttendanceStatus::Late),
            rec("102", AttendanceStatus::Late),
        ];
        let stats = aggregate(&records, 5);
        assert_eq!(
            stats,
            DashboardStats {
                total_employees: 5,
                today_present: 2,
                late_arrivals: 2,
                absent_today: 3,
            }
        );
    }

    #[test]
    fn test_aggregate_unknown_roster() {
        let records = vec![rec("101", AttendanceStatus::OnTime)];
        let stats = aggregate(&records, 0);
        assert_eq!(stats.total_employees, 1);
        assert_eq!(stats.absent_today, 0);
    }

    #[test]
    fn test_aggregate_empty() {
        assert_eq!(aggregate(&[], 3).absent_today, 3);
    }
}
