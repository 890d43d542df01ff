use std::collections::HashSet;

use chrono::{Datelike, TimeDelta};
use tracing::{info, warn};

use crate::catalog::SlotTemplateCatalog;
use crate::limits::*;
use crate::model::*;

use super::{AllocError, SlotAllocator};

/// Allowed hours per weekday (index 0 = Sunday) with midnight folded into the
/// previous day as hour 24, so "Tuesday 00:00" counts as the end of Monday.
pub fn normalize_template(slots: &[TimeSlot]) -> [Vec<u8>; 7] {
    let mut by_day: [Vec<u8>; 7] = Default::default();
    for slot in slots {
        if slot.hour == 0 {
            by_day[((slot.weekday + 6) % 7) as usize].push(24);
        } else {
            by_day[slot.weekday as usize].push(slot.hour);
        }
    }
    for hours in &mut by_day {
        hours.sort_unstable();
        hours.dedup();
    }
    by_day
}

/// Pick up to `count` slots, at most one per week window, stepping
/// `weeks_between` weeks from the Monday of `base`'s week. Only Monday..Friday
/// windows are considered. Result is ascending and may be short.
pub fn find_repurpose_slots(
    catalog: &SlotTemplateCatalog,
    class: PriorityClass,
    taken: &[Ts],
    base: Ts,
    count: u32,
    weeks_between: u32,
) -> Vec<Ts> {
    let by_day = normalize_template(catalog.slots_for(class));
    let reserved: HashSet<&Ts> = taken.iter().collect();
    let base_date = base.date_naive();
    let monday = base_date - TimeDelta::days(base_date.weekday().num_days_from_monday() as i64);

    let mut found = Vec::with_capacity(count as usize);
    for step in 0..REPURPOSE_HORIZON_STEPS {
        if found.len() >= count as usize {
            break;
        }
        let week = monday + TimeDelta::weeks(step * weeks_between as i64);
        let pick = (MONDAY..=FRIDAY).find_map(|weekday| {
            let date = week + TimeDelta::days((weekday - MONDAY) as i64);
            by_day[weekday as usize]
                .iter()
                .map(|&h| at_hour(date, h))
                .find(|c| *c > base && !reserved.contains(c))
        });
        if let Some(slot) = pick {
            found.push(slot);
        }
    }
    found.sort_unstable();
    found
}

impl SlotAllocator {
    /// Reserve a spaced batch for a repurpose tier (`r1`..`r3`).
    ///
    /// A short batch is not an error; it is reported through
    /// [`RepurposeOutcome::shortfall`].
    pub async fn allocate_repurpose(
        &self,
        class: PriorityClass,
        base: Ts,
        count: u32,
        weeks_between: u32,
    ) -> Result<RepurposeOutcome, AllocError> {
        if !class.is_repurpose() {
            return Err(AllocError::InvalidRequest(format!(
                "{class} is a basic tier and takes no batch"
            )));
        }
        ScheduleRequest::repurpose(class, base, count, weeks_between).validate()?;

        let _class = self.lock_class(class).await;
        let mut taken = self.store.load(class).await?;
        if taken.len() + count as usize > MAX_TAKEN_PER_CLASS {
            return Err(AllocError::LimitExceeded("too many reservations for class"));
        }

        let slots = find_repurpose_slots(&self.catalog, class, &taken, base, count, weeks_between);
        if !slots.is_empty() {
            taken.extend_from_slice(&slots);
            self.store.save(class, &taken).await?;
        }

        let shortfall = count - slots.len() as u32;
        let offsets = slots.iter().map(|s| offset_between(*s, base)).collect();
        metrics::counter!(crate::observability::SLOTS_RESERVED_TOTAL, "class" => class.as_str())
            .increment(slots.len() as u64);
        if shortfall > 0 {
            metrics::counter!(crate::observability::REPURPOSE_SHORTFALL_TOTAL, "class" => class.as_str())
                .increment(shortfall as u64);
            warn!(
                %class, requested = count, placed = slots.len(), shortfall,
                "repurpose batch short after {REPURPOSE_HORIZON_STEPS} week steps"
            );
        } else {
            info!(%class, count, weeks_between, "repurpose batch reserved");
        }

        Ok(RepurposeOutcome {
            slots,
            offsets,
            requested: count,
            shortfall,
        })
    }
}
