//! Presence-based availability.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tracing::warn;

use taskforge_core::UserId;

use crate::collaborator::{AttendanceSource, DEFAULT_LOOKUP_TIMEOUT, bounded};

pub const PRESENT_SCORE: f64 = 1.0;
/// Used both for "no presence record" and for attendance lookups that fail.
pub const ABSENT_SCORE: f64 = 0.5;

type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

pub struct AvailabilityResolver {
    attendance: Arc<dyn AttendanceSource>,
    timeout: Duration,
    today: Clock,
}

impl AvailabilityResolver {
    pub fn new(attendance: Arc<dyn AttendanceSource>) -> Self {
        Self {
            attendance,
            timeout: DEFAULT_LOOKUP_TIMEOUT,
            today: Arc::new(|| Utc::now().date_naive()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the source of "today" (UTC calendar date by default).
    pub fn with_clock(mut self, today: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        self.today = Arc::new(today);
        self
    }

    pub fn today(&self) -> NaiveDate {
        (self.today)()
    }

    pub async fn availability_score(&self, user_id: UserId) -> f64 {
        self.availability_score_on(user_id, self.today()).await
    }

    /// 1.0 with a presence record on `date`, 0.5 otherwise. Fails open to 0.5.
    pub async fn availability_score_on(&self, user_id: UserId, date: NaiveDate) -> f64 {
        match bounded("attendance", self.timeout, self.attendance.has_presence(user_id, date)).await {
            Ok(true) => PRESENT_SCORE,
            Ok(false) => ABSENT_SCORE,
            Err(err) => {
                warn!(user_id = %user_id, %date, error = %err, "attendance lookup failed; treating as absent");
                ABSENT_SCORE
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeAttendance, user};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[tokio::test]
    async fn presence_on_the_day_scores_full() {
        let u = user(1);
        let resolver = AvailabilityResolver::new(Arc::new(FakeAttendance::default().present(u, day(2))));

        assert_eq!(resolver.availability_score_on(u, day(2)).await, PRESENT_SCORE);
        assert_eq!(resolver.availability_score_on(u, day(3)).await, ABSENT_SCORE);
    }

    #[tokio::test]
    async fn uses_the_injected_clock_for_today() {
        let u = user(1);
        let resolver = AvailabilityResolver::new(Arc::new(FakeAttendance::default().present(u, day(5))))
            .with_clock(|| NaiveDate::from_ymd_opt(2026, 3, 5).unwrap());

        assert_eq!(resolver.availability_score(u).await, PRESENT_SCORE);
    }

    #[tokio::test]
    async fn lookup_failure_fails_open() {
        let resolver = AvailabilityResolver::new(Arc::new(FakeAttendance::default().failing()));

        assert_eq!(resolver.availability_score_on(user(1), day(1)).await, ABSENT_SCORE);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_attendance_times_out_to_absent() {
        let u = user(1);
        let attendance = FakeAttendance::default()
            .present(u, day(1))
            .stalling(Duration::from_secs(30));
        let resolver = AvailabilityResolver::new(Arc::new(attendance)).with_timeout(Duration::from_millis(100));

        assert_eq!(resolver.availability_score_on(u, day(1)).await, ABSENT_SCORE);
    }
}
