use chrono::{DateTime, Days, NaiveTime, Utc};

use crate::state_store::StateRecord;

#[derive(Debug, Clone, PartialEq)]
pub struct QuotaDecision {
    pub allowed: bool,
    /// The record after lazy day rollover, with the grant folded in when
    /// `allowed` is true. Callers persist it only once the elevation sticks.
    pub record: StateRecord,
}

/// Decide whether another elevation is permitted today.
///
/// All day arithmetic is UTC. A stored date other than today's resets the
/// counter before the limit check; the counter increment is part of the
/// returned record, never a side effect.
pub fn evaluate(record: &StateRecord, now: DateTime<Utc>, limit: u32) -> QuotaDecision {
    let today = now.date_naive();
    let mut rolled = record.clone();
    if rolled.date != today {
        rolled.date = today;
        rolled.count_used = 0;
    }

    let allowed = rolled.count_used < limit;
    if allowed {
        rolled.count_used += 1;
    }

    QuotaDecision {
        allowed,
        record: rolled,
    }
}

/// Whole hours until the next UTC midnight, when the daily counter resets.
pub fn hours_until_reset(now: DateTime<Utc>) -> i64 {
    let next_midnight = (now.date_naive() + Days::new(1))
        .and_time(NaiveTime::MIN)
        .and_utc();
    next_midnight.signed_duration_since(now).num_hours()
}
