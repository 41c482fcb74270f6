use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Arc;

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Venue wall clock: UTC "now" projected into the venue timezone.
#[derive(Clone)]
pub struct Clock {
    timezone: Tz,
    now_provider: NowProvider,
}

impl Clock {
    pub fn new(timezone: Tz) -> Self {
        Self {
            timezone,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    /// Clock pinned to a venue-local wall time.
    pub fn fixed(timezone: Tz, local: NaiveDateTime) -> Self {
        let instant = timezone
            .from_local_datetime(&local)
            .earliest()
            .map(|value| value.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&local));
        Self::new(timezone).with_now_provider(Arc::new(move || instant))
    }

    pub fn now_utc(&self) -> DateTime<Utc> {
        (self.now_provider)()
    }

    pub fn local_now(&self) -> NaiveDateTime {
        self.now_utc().with_timezone(&self.timezone).naive_local()
    }

    pub fn today(&self) -> NaiveDate {
        self.local_now().date()
    }
}

impl std::fmt::Debug for Clock {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Clock")
            .field("timezone", &self.timezone)
            .finish_non_exhaustive()
    }
}
