use chrono::TimeDelta;
use tracing::info;

use crate::limits::*;
use crate::model::*;

/// Offset for a caller-chosen publish time. Skips the template and the store.
///
/// A time more than the skew tolerance in the past is pushed forward by one
/// day, once.
pub fn resolve_explicit(at: Ts, base: Ts) -> (Ts, OffsetSecs) {
    let offset = offset_between(at, base);
    if at - base >= -TimeDelta::seconds(EXPLICIT_TOLERANCE_SECS) {
        return (at, offset);
    }
    let shifted = at + TimeDelta::hours(EXPLICIT_SHIFT_HOURS);
    let corrected = offset_between(shifted, base);
    metrics::counter!(crate::observability::EXPLICIT_CORRECTIONS_TOTAL).increment(1);
    info!(%at, %shifted, offset, corrected, "explicit publish time in the past, shifted forward one day");
    (shifted, corrected)
}
