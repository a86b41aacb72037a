use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc, Weekday};

use chambers_core::{DomainError, DomainResult};

/// A fixed weekly trigger time in UTC.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct WeeklySchedule {
    weekday: Weekday,
    time: NaiveTime,
}

impl Default for WeeklySchedule {
    /// Sunday 03:00 UTC.
    fn default() -> Self {
        Self {
            weekday: Weekday::Sun,
            time: NaiveTime::MIN + Duration::hours(3),
        }
    }
}

impl WeeklySchedule {
    pub fn new(weekday: Weekday, hour: u32, minute: u32) -> DomainResult<Self> {
        let time = NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| {
            DomainError::validation(format!("invalid schedule time {hour:02}:{minute:02}"))
        })?;
        Ok(Self { weekday, time })
    }

    pub fn weekday(&self) -> Weekday {
        self.weekday
    }

    pub fn time(&self) -> NaiveTime {
        self.time
    }

    /// The first trigger strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let days_ahead = (self.weekday.num_days_from_monday() + 7
            - now.weekday().num_days_from_monday())
            % 7;
        let date = now.date_naive() + Duration::days(i64::from(days_ahead));
        let candidate = date.and_time(self.time).and_utc();

        if candidate <= now {
            candidate + Duration::weeks(1)
        } else {
            candidate
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn next_trigger_later_the_same_week() {
        // 2026-10-14 is a Wednesday.
        let schedule = WeeklySchedule::default();
        assert_eq!(
            schedule.next_after(at("2026-10-14T12:00:00Z")),
            at("2026-10-18T03:00:00Z")
        );
    }

    #[test]
    fn trigger_day_before_and_after_the_time() {
        let schedule = WeeklySchedule::default();
        assert_eq!(
            schedule.next_after(at("2026-10-18T02:59:59Z")),
            at("2026-10-18T03:00:00Z")
        );
        assert_eq!(
            schedule.next_after(at("2026-10-18T03:00:00Z")),
            at("2026-10-25T03:00:00Z")
        );
    }

    #[test]
    fn custom_weekday_and_time() {
        let schedule = WeeklySchedule::new(Weekday::Mon, 22, 30).unwrap();
        let next = schedule.next_after(at("2026-10-19T23:00:00Z"));
        assert_eq!(next, at("2026-10-26T22:30:00Z"));
        assert_eq!(next.weekday(), Weekday::Mon);
    }

    #[test]
    fn rejects_out_of_range_time() {
        assert!(WeeklySchedule::new(Weekday::Sun, 24, 0).is_err());
        assert!(WeeklySchedule::new(Weekday::Sun, 3, 60).is_err());
    }
}
