//! Human-readable rendering of the next allowed dose time.

use chrono::{Duration, NaiveDateTime, NaiveTime};
use std::fmt;

/// Date bucket of an eligibility instant relative to `now`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NextDoseDisplay {
    /// Eligible immediately
    Now,
    /// Later on `now`'s calendar date
    Today(NaiveTime),
    /// On the calendar date after `now`
    Tomorrow(NaiveTime),
    /// Any other date
    On(NaiveDateTime),
}

impl NextDoseDisplay {
    pub fn new(next_allowed: NaiveDateTime, now: NaiveDateTime) -> Self {
        if now >= next_allowed {
            return NextDoseDisplay::Now;
        }

        let today = now.date();
        let date = next_allowed.date();
        if date == today {
            NextDoseDisplay::Today(next_allowed.time())
        } else if Some(date) == today.checked_add_signed(Duration::days(1)) {
            NextDoseDisplay::Tomorrow(next_allowed.time())
        } else {
            NextDoseDisplay::On(next_allowed)
        }
    }

    /// Phrase used after "You can take this medication again"
    pub fn sentence(&self) -> String {
        match self {
            NextDoseDisplay::Now => "Now".to_string(),
            other => format!("at {}", other),
        }
    }
}

impl fmt::Display for NextDoseDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NextDoseDisplay::Now => write!(f, "Now"),
            NextDoseDisplay::Today(t) => write!(f, "today at {}", t.format("%H:%M")),
            NextDoseDisplay::Tomorrow(t) => write!(f, "tomorrow at {}", t.format("%H:%M")),
            NextDoseDisplay::On(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M")),
        }
    }
}
