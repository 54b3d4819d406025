use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

/// Wall-clock seam. Injected into the quiz engine so admission-window
/// and streak logic stay testable with a fixed clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// First and last day of the calendar month containing `date`.
pub fn month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = date.with_day(1).expect("day 1 always exists");
    let next_month = if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    }
    .expect("first of month always exists");
    (start, next_month - Duration::days(1))
}

/// Default name for an auto-created monthly season.
pub fn month_season_name(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}
