//! Activation windows for rate-limit policies.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// Daily clock-time window, inclusive at both ends.
///
/// `end < start` wraps past midnight: `22:00-06:00` covers the night.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl DailyWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn wraps_midnight(&self) -> bool {
        self.end < self.start
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.wraps_midnight() {
            time >= self.start || time <= self.end
        } else {
            self.start <= time && time <= self.end
        }
    }
}

/// Inclusive date range; an unset end is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |from| from <= date) && self.to.map_or(true, |to| date <= to)
    }
}

/// When a policy is in force: an optional daily window within an optional
/// date range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivationWindow {
    pub daily: Option<DailyWindow>,
    pub dates: DateRange,
}

impl ActivationWindow {
    /// A window that is always active.
    pub fn always() -> Self {
        Self::default()
    }

    pub fn is_active(&self, now: NaiveDateTime) -> bool {
        if !self.dates.contains(now.date()) {
            return false;
        }
        self.daily.map_or(true, |w| w.contains(now.time()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_daytime_window() {
        let w = DailyWindow::new(t(9, 0), t(18, 0));
        assert!(!w.wraps_midnight());
        assert!(w.contains(t(9, 0)));
        assert!(w.contains(t(12, 30)));
        assert!(w.contains(t(18, 0)));
        assert!(!w.contains(t(8, 59)));
        assert!(!w.contains(t(20, 0)));
    }

    #[test]
    fn test_overnight_window() {
        let w = DailyWindow::new(t(22, 0), t(6, 0));
        assert!(w.wraps_midnight());
        assert!(w.contains(t(23, 30)));
        assert!(w.contains(t(2, 0)));
        assert!(w.contains(t(22, 0)));
        assert!(w.contains(t(6, 0)));
        assert!(!w.contains(t(12, 0)));
    }

    #[test]
    fn test_date_range_inclusive() {
        let r = DateRange::new(Some(d(2024, 3, 1)), Some(d(2024, 3, 31)));
        assert!(r.contains(d(2024, 3, 1)));
        assert!(r.contains(d(2024, 3, 31)));
        assert!(!r.contains(d(2024, 2, 29)));
        assert!(!r.contains(d(2024, 4, 1)));

        let open = DateRange::new(Some(d(2024, 3, 1)), None);
        assert!(open.contains(d(2030, 1, 1)));
        assert!(DateRange::default().contains(d(1999, 1, 1)));
    }

    #[test]
    fn test_activation_combines_dates_and_time() {
        let w = ActivationWindow {
            daily: Some(DailyWindow::new(t(22, 0), t(6, 0))),
            dates: DateRange::new(Some(d(2024, 3, 1)), Some(d(2024, 3, 31))),
        };
        assert!(w.is_active(d(2024, 3, 10).and_time(t(23, 0))));
        assert!(!w.is_active(d(2024, 3, 10).and_time(t(12, 0))));
        assert!(!w.is_active(d(2024, 4, 1).and_time(t(1, 0))));
        assert!(ActivationWindow::always().is_active(d(2024, 4, 1).and_time(t(12, 0))));
    }
}
