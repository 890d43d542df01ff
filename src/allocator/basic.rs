use std::collections::HashSet;

use chrono::{NaiveDate, TimeDelta, Timelike};
use tracing::{info, warn};

use crate::catalog::SlotTemplateCatalog;
use crate::limits::*;
use crate::model::*;

use super::{AllocError, SlotAllocator};

// ── Slot search ─────────────────────────────────────────────────

/// Earliest allowed hour on the first day in `days` (offsets from `from`)
/// whose weekday has any.
fn first_day_slot(
    catalog: &SlotTemplateCatalog,
    class: PriorityClass,
    from: NaiveDate,
    days: impl Iterator<Item = i64>,
) -> Option<Ts> {
    days.map(|d| from + TimeDelta::days(d)).find_map(|date| {
        catalog
            .hours_on(class, weekday_of(date))
            .next()
            .map(|h| at_hour(date, h))
    })
}

/// Advance the cursor one slot past `last`: the next allowed hour on the same
/// day, else the first hour of the next allowed weekday (wrapping the week).
fn cursor_step(catalog: &SlotTemplateCatalog, class: PriorityClass, last: Ts) -> Option<Ts> {
    let date = last.date_naive();
    let hour = last.hour() as u8;
    if let Some(h) = catalog
        .hours_on(class, weekday_of(date))
        .find(|&h| h > hour)
    {
        return Some(at_hour(date, h));
    }
    first_day_slot(catalog, class, date, 1..=7)
}

/// First slot strictly after `base`'s hour, searching `BASIC_HORIZON_DAYS`.
fn first_slot_after(catalog: &SlotTemplateCatalog, class: PriorityClass, base: Ts) -> Option<Ts> {
    let start = base.date_naive();
    let base_hour = base.hour() as u8;
    (0..BASIC_HORIZON_DAYS).find_map(|d| {
        let date = start + TimeDelta::days(d);
        let mut hours = catalog.hours_on(class, weekday_of(date));
        let hour = if d == 0 {
            hours.find(|&h| h > base_hour)
        } else {
            hours.next()
        };
        hour.map(|h| at_hour(date, h))
    })
}

/// Next basic-tier slot for `class` given its reservation history.
///
/// Returns `None` when no unreserved slot exists inside the horizon.
pub fn next_basic_slot(
    catalog: &SlotTemplateCatalog,
    class: PriorityClass,
    taken: &[Ts],
    base: Ts,
) -> Option<Ts> {
    let mut candidate = match taken.last() {
        None => first_day_slot(catalog, class, base.date_naive(), 0..7)?,
        Some(&last) => cursor_step(catalog, class, last)?,
    };
    if candidate < base {
        candidate = first_slot_after(catalog, class, base)?;
    }

    // Only reachable after a release or a hand-edited history.
    let reserved: HashSet<&Ts> = taken.iter().collect();
    let horizon = candidate.max(base) + TimeDelta::days(BASIC_HORIZON_DAYS);
    while reserved.contains(&candidate) {
        candidate = cursor_step(catalog, class, candidate)?;
        if candidate > horizon {
            return None;
        }
    }
    Some(candidate)
}

impl SlotAllocator {
    /// Reserve one slot for a basic tier (`p1`..`p3`).
    pub async fn allocate_basic(&self, class: PriorityClass, base: Ts) -> Result<Ts, AllocError> {
        if class.is_repurpose() {
            return Err(AllocError::InvalidRequest(format!(
                "{class} is a repurpose tier, use a batch request"
            )));
        }
        let _class = self.lock_class(class).await;
        let mut taken = self.store.load(class).await?;
        if taken.len() >= MAX_TAKEN_PER_CLASS {
            return Err(AllocError::LimitExceeded("too many reservations for class"));
        }

        let Some(slot) = next_basic_slot(&self.catalog, class, &taken, base) else {
            self.raise_exhausted(class, base).await;
            return Err(AllocError::SchedulingExhausted(class));
        };

        taken.push(slot);
        self.store.save(class, &taken).await?;
        metrics::counter!(crate::observability::SLOTS_RESERVED_TOTAL, "class" => class.as_str())
            .increment(1);
        info!(%class, %slot, offset = offset_between(slot, base), "slot reserved");
        Ok(slot)
    }

    /// Best effort: a failing alert sink is logged and otherwise ignored.
    async fn raise_exhausted(&self, class: PriorityClass, base: Ts) {
        metrics::counter!(crate::observability::SCHEDULING_EXHAUSTED_TOTAL, "class" => class.as_str())
            .increment(1);
        warn!(%class, %base, "no free slot within {BASIC_HORIZON_DAYS} days");
        let Some(alerts) = &self.alerts else { return };
        let message = format!(
            "scheduling exhausted: no free {class} slot within {BASIC_HORIZON_DAYS} days of {base}"
        );
        if let Err(e) = alerts.notify(&message).await {
            warn!(%class, "failed to send exhaustion alert: {e}");
        }
    }
}
