// 2.0: business-day arithmetic. every period in the fund (rebalance, management,
// holding periods) is counted in weekdays. weekends never count.

use crate::types::Timestamp;
use chrono::{Datelike, Duration, NaiveDate, Weekday};

pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

// a start on saturday or sunday counts from the following monday
fn roll_to_business_day(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date + Duration::days(2),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    }
}

/// Number of weekdays in `(start, end]`, with a weekend `start` rolled forward to
/// Monday. Zero when `end` is not after the (rolled) start.
pub fn business_days_elapsed(start: NaiveDate, end: NaiveDate) -> i64 {
    let start = roll_to_business_day(start);
    if end <= start {
        return 0;
    }

    let total_days = (end - start).num_days();
    let whole_weeks = total_days / 7;
    let mut elapsed = whole_weeks * 5;

    // walk the partial week, at most six days
    let mut day = start + Duration::days(whole_weeks * 7);
    while day < end {
        let Some(next) = day.succ_opt() else { break };
        day = next;
        if is_business_day(day) {
            elapsed += 1;
        }
    }

    elapsed
}

/// Same count taken from two timestamps; only their calendar dates matter.
pub fn compute_days_elapsed(date_entered: Timestamp, current: Timestamp) -> i64 {
    business_days_elapsed(date_entered.date(), current.date())
}

// 2.1: business days plus the intraday remainder. never negative.
pub fn holding_period(date_entered: Timestamp, current: Timestamp) -> Duration {
    let days = compute_days_elapsed(date_entered, current);
    let intraday = current.time() - date_entered.time();
    let held = Duration::days(days) + intraday;
    if held < Duration::zero() {
        Duration::zero()
    } else {
        held
    }
}
