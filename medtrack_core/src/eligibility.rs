//! Dose eligibility calculator.
//!
//! Computes the earliest instant a new dose is permitted from the dose
//! history of one medication and its two policy limits:
//! - Minimum interval since the most recent dose
//! - Maximum doses inside the rolling 24-hour window ending at `now`
//!
//! Everything here is pure: no I/O, no shared state, same output for the
//! same inputs. Both the status views and the "take dose" gate go through
//! [`evaluate`].

use crate::{DosePolicy, Error, Result};
use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

/// Length of the rolling window used for the daily cap
pub const WINDOW_HOURS: i64 = 24;

/// Which limit is holding the next dose back
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    /// Nothing binds, a dose may be taken now
    None,
    /// Minimum interval since the last dose
    Interval,
    /// Daily cap reached inside the rolling window
    DailyCap,
}

impl Constraint {
    /// User-facing refusal message for the write path
    pub fn refusal(&self) -> &'static str {
        match self {
            Constraint::None => "Dose allowed",
            Constraint::Interval => "Minimum interval not met",
            Constraint::DailyCap => "Max doses reached in the last 24 hours",
        }
    }
}

/// Full result of an eligibility evaluation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Eligibility {
    /// Reference instant the evaluation was made against
    pub now: NaiveDateTime,
    /// Earliest instant permitted by spacing alone
    pub by_interval: NaiveDateTime,
    /// Earliest instant permitted by the daily cap alone
    pub by_cap: NaiveDateTime,
    /// Doses strictly after `now - 24h`
    pub doses_in_window: usize,
    /// `max(by_interval, by_cap, now)`
    pub next_allowed: NaiveDateTime,
    pub constraint: Constraint,
}

impl Eligibility {
    fn immediate(now: NaiveDateTime) -> Self {
        Self {
            now,
            by_interval: now,
            by_cap: now,
            doses_in_window: 0,
            next_allowed: now,
            constraint: Constraint::None,
        }
    }

    /// True when a dose may be taken at `now`
    pub fn is_eligible(&self) -> bool {
        self.next_allowed <= self.now
    }

    /// Time left until the next dose is permitted (zero when eligible)
    pub fn wait(&self) -> Duration {
        self.next_allowed - self.now
    }
}

/// Earliest instant a new dose is permitted.
///
/// `dose_times` must be ascending (duplicates allowed, may be empty). The
/// result is never earlier than `now`; an empty history returns `now`.
/// Inputs outside the documented domain are not rejected here, see
/// [`checked_next_allowed`] for the strict variant.
pub fn next_allowed(
    dose_times: &[NaiveDateTime],
    min_interval_hours: u32,
    max_doses_per_window: u32,
    now: NaiveDateTime,
) -> NaiveDateTime {
    evaluate(dose_times, min_interval_hours, max_doses_per_window, now).next_allowed
}

/// Same as [`next_allowed`], but fails fast on a zero cap or unsorted history.
pub fn checked_next_allowed(
    dose_times: &[NaiveDateTime],
    min_interval_hours: u32,
    max_doses_per_window: u32,
    now: NaiveDateTime,
) -> Result<NaiveDateTime> {
    if max_doses_per_window == 0 {
        return Err(Error::InvalidArgument(
            "max doses per window must be at least 1".into(),
        ));
    }
    if let Some(pos) = dose_times.windows(2).position(|w| w[0] > w[1]) {
        return Err(Error::InvalidArgument(format!(
            "dose times must be ascending ({} is after {})",
            dose_times[pos],
            dose_times[pos + 1]
        )));
    }
    Ok(next_allowed(
        dose_times,
        min_interval_hours,
        max_doses_per_window,
        now,
    ))
}

/// Evaluate both constraints and report which one binds.
pub fn evaluate(
    dose_times: &[NaiveDateTime],
    min_interval_hours: u32,
    max_doses_per_window: u32,
    now: NaiveDateTime,
) -> Eligibility {
    let Some(&last) = dose_times.last() else {
        return Eligibility::immediate(now);
    };

    let by_interval = saturating_add(last, Duration::hours(i64::from(min_interval_hours)));

    // Strict `>`: a dose at exactly now - 24h has already left the window
    let window_start = now
        .checked_sub_signed(Duration::hours(WINDOW_HOURS))
        .unwrap_or(NaiveDateTime::MIN);
    let mut recent = dose_times.iter().copied().filter(|t| *t > window_start);
    let oldest_recent = recent.next();
    let doses_in_window = oldest_recent.map_or(0, |_| 1 + recent.count());

    let by_cap = match oldest_recent {
        Some(oldest) if doses_in_window >= max_doses_per_window as usize => {
            saturating_add(oldest, Duration::hours(WINDOW_HOURS))
        }
        _ => now,
    };

    let next_allowed = by_interval.max(by_cap).max(now);
    let constraint = if next_allowed <= now {
        Constraint::None
    } else if by_interval >= by_cap {
        Constraint::Interval
    } else {
        Constraint::DailyCap
    };

    tracing::trace!(
        %last,
        %by_interval,
        %by_cap,
        doses_in_window,
        %next_allowed,
        "Evaluated dose eligibility"
    );

    Eligibility {
        now,
        by_interval,
        by_cap,
        doses_in_window,
        next_allowed,
        constraint,
    }
}

fn saturating_add(t: NaiveDateTime, d: Duration) -> NaiveDateTime {
    t.checked_add_signed(d).unwrap_or(NaiveDateTime::MAX)
}

impl DosePolicy {
    /// Evaluate this policy against an ascending dose history
    pub fn eligibility(&self, dose_times: &[NaiveDateTime], now: NaiveDateTime) -> Eligibility {
        evaluate(
            dose_times,
            self.min_interval_hours,
            self.max_doses_per_day,
            now,
        )
    }
}
