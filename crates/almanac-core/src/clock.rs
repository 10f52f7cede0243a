use chrono::{DateTime, Duration, Local, LocalResult, NaiveDate, TimeZone};

/// Source of "now" for everything that reasons about local calendar days.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;

    /// Today's local calendar date.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall-clock time in the process's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock pinned to one instant. Test helper, also handy for replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Local>);

impl FixedClock {
    /// Noon local time on the given date.
    pub fn on(date: NaiveDate) -> Self {
        let naive = date.and_hms_opt(12, 0, 0).unwrap_or_default();
        let now = Local
            .from_local_datetime(&naive)
            .earliest()
            .unwrap_or_else(Local::now);
        Self(now)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        self.0
    }
}

/// The first local midnight strictly after `now`.
///
/// On days where a DST transition swallows midnight, the first valid local
/// instant after the gap is returned instead.
pub fn next_midnight_after<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut date = now.date_naive();

    loop {
        date = date.succ_opt().unwrap_or(date);
        let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();

        let candidate = match tz.from_local_datetime(&midnight) {
            LocalResult::Single(t) => Some(t),
            LocalResult::Ambiguous(earliest, _) => Some(earliest),
            LocalResult::None => (1..=24).find_map(|minutes_step| {
                let probe = midnight + Duration::minutes(minutes_step * 15);
                tz.from_local_datetime(&probe).earliest()
            }),
        };

        if let Some(t) = candidate {
            if t > *now {
                return t;
            }
        }
    }
}
