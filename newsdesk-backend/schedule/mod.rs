pub mod budget;
pub mod priority;
pub mod scheduler;

use chrono::{DateTime, FixedOffset, NaiveDate, Timelike, Utc};

pub use budget::Budget;
pub use priority::{PriorityBucket, PriorityTable};
pub use scheduler::PublishScheduler;

/// Hour of day (0-23) in site-local time.
pub fn site_hour(now: DateTime<Utc>, offset: FixedOffset) -> u32 {
    now.with_timezone(&offset).hour()
}

pub fn site_date(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}
