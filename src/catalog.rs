use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::path::Path;

use crate::model::*;

#[derive(Debug)]
pub enum CatalogError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    MissingClass(PriorityClass),
    InvalidSlot(PriorityClass, TimeSlot),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::Io(e) => write!(f, "template read error: {e}"),
            CatalogError::Parse(e) => write!(f, "template parse error: {e}"),
            CatalogError::MissingClass(class) => {
                write!(f, "template has no slots for class {class}")
            }
            CatalogError::InvalidSlot(class, slot) => write!(
                f,
                "template slot out of range for class {class}: weekday {} hour {}",
                slot.weekday, slot.hour
            ),
        }
    }
}

impl std::error::Error for CatalogError {}

/// Weekly publishing windows per priority class, fixed at deploy time.
///
/// Slots per class are sorted by (weekday, hour) and deduplicated. Every class
/// has at least one slot, so lookups never fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotTemplateCatalog {
    slots: BTreeMap<PriorityClass, Vec<TimeSlot>>,
}

impl SlotTemplateCatalog {
    pub fn new(mut slots: BTreeMap<PriorityClass, Vec<TimeSlot>>) -> Result<Self, CatalogError> {
        for class in PriorityClass::ALL {
            let list = slots.entry(class).or_default();
            if list.is_empty() {
                return Err(CatalogError::MissingClass(class));
            }
            if let Some(bad) = list.iter().find(|s| !s.is_valid()) {
                return Err(CatalogError::InvalidSlot(class, *bad));
            }
            list.sort_unstable();
            list.dedup();
        }
        Ok(Self { slots })
    }

    /// Parse `{"p1": [{"weekday": 6, "hour": 14}, ...], ...}`.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let slots: BTreeMap<PriorityClass, Vec<TimeSlot>> =
            serde_json::from_str(json).map_err(CatalogError::Parse)?;
        Self::new(slots)
    }

    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path).map_err(CatalogError::Io)?;
        Self::from_json(&json)
    }

    pub fn slots_for(&self, class: PriorityClass) -> &[TimeSlot] {
        self.slots.get(&class).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Allowed hours on one weekday, ascending.
    pub fn hours_on(&self, class: PriorityClass, weekday: u8) -> impl Iterator<Item = u8> + '_ {
        self.slots_for(class)
            .iter()
            .filter(move |s| s.weekday == weekday)
            .map(|s| s.hour)
    }

    /// True if `at` sits exactly on the start of one of the class's windows.
    pub fn contains(&self, class: PriorityClass, at: &Ts) -> bool {
        use chrono::Timelike;
        if at.minute() != 0 || at.second() != 0 || at.nanosecond() != 0 {
            return false;
        }
        let slot = TimeSlot::new(weekday_of(at.date_naive()), at.hour() as u8);
        self.slots_for(class).binary_search(&slot).is_ok()
    }
}

fn windows(days: &[u8], hours: RangeInclusive<u8>) -> impl Iterator<Item = TimeSlot> + '_ {
    days.iter()
        .flat_map(move |&d| hours.clone().map(move |h| TimeSlot::new(d, h)))
}

const WEEKDAYS: [u8; 5] = [MONDAY, TUESDAY, WEDNESDAY, THURSDAY, FRIDAY];
const WEEKEND: [u8; 2] = [SATURDAY, SUNDAY];
const EVERY_DAY: [u8; 7] = [SUNDAY, MONDAY, TUESDAY, WEDNESDAY, THURSDAY, FRIDAY, SATURDAY];

impl Default for SlotTemplateCatalog {
    /// Built-in UTC template.
    fn default() -> Self {
        let mut slots = BTreeMap::new();
        // weekend peak
        slots.insert(PriorityClass::P1, windows(&WEEKEND, 14..=18).collect());
        // weekday evenings, weekend late mornings
        slots.insert(
            PriorityClass::P2,
            windows(&WEEKDAYS, 17..=20)
                .chain(windows(&WEEKEND, 10..=13))
                .collect(),
        );
        // off-peak, two disjoint windows per day
        slots.insert(
            PriorityClass::P3,
            windows(&EVERY_DAY, 6..=8)
                .chain(windows(&EVERY_DAY, 21..=22))
                .collect(),
        );
        slots.insert(PriorityClass::R1, windows(&WEEKDAYS, 15..=17).collect());
        slots.insert(PriorityClass::R2, windows(&WEEKDAYS, 12..=13).collect());
        // midnight closing out Monday..Friday
        slots.insert(
            PriorityClass::R3,
            windows(&[TUESDAY, WEDNESDAY, THURSDAY, FRIDAY, SATURDAY], 0..=0).collect(),
        );

        let mut catalog = Self { slots };
        for list in catalog.slots.values_mut() {
            list.sort_unstable();
            list.dedup();
        }
        catalog
    }
}
