//! Send-time planning for the four touchpoints of a registration.

use chrono::{DateTime, Duration, Utc};

use super::model::Touchpoint;

/// Raw target time for one touchpoint, before clamping.
pub fn target_time(
    touchpoint: Touchpoint,
    registered_at: DateTime<Utc>,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    follow_up_delay: Duration,
) -> DateTime<Utc> {
    match touchpoint {
        Touchpoint::Welcome => registered_at,
        Touchpoint::Reminder24h => starts_at - Duration::hours(24),
        Touchpoint::Reminder1h => starts_at - Duration::hours(1),
        Touchpoint::FollowUp => ends_at + follow_up_delay,
    }
}

/// Fire times for every touchpoint, in touchpoint order.
///
/// Targets already behind `now` are clamped to `now` so they fire immediately
/// instead of being dropped.
pub fn plan_touchpoints(
    registered_at: DateTime<Utc>,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    follow_up_delay: Duration,
    now: DateTime<Utc>,
) -> [(Touchpoint, DateTime<Utc>); 4] {
    Touchpoint::ALL.map(|tp| {
        let target = target_time(tp, registered_at, starts_at, ends_at, follow_up_delay);
        (tp, target.max(now))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, 10, h, 0, 0).unwrap()
    }

    #[test]
    fn future_event_uses_documented_offsets() {
        let now = at(0) - Duration::days(3);
        let start = at(18);
        let end = at(19);
        let plan = plan_touchpoints(now, start, end, Duration::hours(2), now);

        assert_eq!(plan[0], (Touchpoint::Welcome, now));
        assert_eq!(plan[1], (Touchpoint::Reminder24h, start - Duration::hours(24)));
        assert_eq!(plan[2], (Touchpoint::Reminder1h, start - Duration::hours(1)));
        assert_eq!(plan[3], (Touchpoint::FollowUp, end + Duration::hours(2)));
    }

    #[test]
    fn one_job_per_touchpoint() {
        let now = at(0);
        let plan = plan_touchpoints(now, at(10), at(11), Duration::hours(2), now);
        let kinds: Vec<Touchpoint> = plan.iter().map(|(tp, _)| *tp).collect();
        assert_eq!(kinds, Touchpoint::ALL.to_vec());
    }

    #[test]
    fn past_reminders_are_clamped_not_skipped() {
        // Event starts in 30 minutes: both reminders are overdue.
        let now = at(12);
        let start = now + Duration::minutes(30);
        let plan = plan_touchpoints(now, start, start + Duration::hours(1), Duration::hours(2), now);

        assert_eq!(plan[1].1, now);
        assert_eq!(plan[2].1, now);
        assert_eq!(plan[3].1, start + Duration::hours(3));
    }

    #[test]
    fn event_already_over_fires_everything_now() {
        let now = at(20);
        let plan = plan_touchpoints(now, at(10), at(11), Duration::hours(2), now);
        assert!(plan.iter().all(|(_, t)| *t == now));
    }

    #[test]
    fn stale_registration_timestamp_is_clamped() {
        let now = at(12);
        let plan = plan_touchpoints(now - Duration::seconds(5), at(23), at(23), Duration::hours(2), now);
        assert_eq!(plan[0].1, now);
    }

    #[test]
    fn follow_up_delay_is_configurable() {
        let now = at(0);
        let plan = plan_touchpoints(now, at(10), at(11), Duration::hours(6), now);
        assert_eq!(plan[3].1, at(17));
    }
}
