use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// UTC instant. Every slot computation happens in UTC.
pub type Ts = DateTime<Utc>;

/// Signed seconds between a computed publish time and the request's base time.
pub type OffsetSecs = i64;

pub const SUNDAY: u8 = 0;
pub const MONDAY: u8 = 1;
pub const TUESDAY: u8 = 2;
pub const WEDNESDAY: u8 = 3;
pub const THURSDAY: u8 = 4;
pub const FRIDAY: u8 = 5;
pub const SATURDAY: u8 = 6;

/// Weekday of a calendar date, 0 = Sunday.
pub fn weekday_of(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// Whole seconds from `base` to `at`, rounded up so a timer armed with the
/// offset never fires before `at`.
pub fn offset_between(at: Ts, base: Ts) -> OffsetSecs {
    let delta = at - base;
    let secs = delta.num_seconds();
    if delta > TimeDelta::seconds(secs) { secs + 1 } else { secs }
}

/// `date` at `hour:00:00` UTC. Hour 24 lands on the next day's midnight.
pub fn at_hour(date: NaiveDate, hour: u8) -> Ts {
    date.and_time(NaiveTime::MIN).and_utc() + TimeDelta::hours(hour as i64)
}

/// Publishing tier. `P*` tiers hand out one slot per call, `R*` tiers a spaced batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityClass {
    P1,
    P2,
    P3,
    R1,
    R2,
    R3,
}

impl PriorityClass {
    pub const ALL: [PriorityClass; 6] = [
        PriorityClass::P1,
        PriorityClass::P2,
        PriorityClass::P3,
        PriorityClass::R1,
        PriorityClass::R2,
        PriorityClass::R3,
    ];

    pub fn is_repurpose(self) -> bool {
        matches!(self, PriorityClass::R1 | PriorityClass::R2 | PriorityClass::R3)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PriorityClass::P1 => "p1",
            PriorityClass::P2 => "p2",
            PriorityClass::P3 => "p3",
            PriorityClass::R1 => "r1",
            PriorityClass::R2 => "r2",
            PriorityClass::R3 => "r3",
        }
    }
}

impl fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownClass(pub String);

impl fmt::Display for UnknownClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown priority class: {}", self.0)
    }
}

impl std::error::Error for UnknownClass {}

impl FromStr for PriorityClass {
    type Err = UnknownClass;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PriorityClass::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownClass(s.to_string()))
    }
}

/// An allowed publishing window: one hour on one weekday, UTC.
///
/// Field order matters: the derived `Ord` sorts by weekday, then hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeSlot {
    /// 0 = Sunday .. 6 = Saturday.
    pub weekday: u8,
    /// 0..=23.
    pub hour: u8,
}

impl TimeSlot {
    pub fn new(weekday: u8, hour: u8) -> Self {
        debug_assert!(weekday < 7 && hour < 24, "TimeSlot out of range");
        Self { weekday, hour }
    }

    pub fn is_valid(&self) -> bool {
        self.weekday < 7 && self.hour < 24
    }
}

/// Every timestamp already promised to a post, per class, in insertion order.
///
/// Serializes as `{"p1": ["2024-01-06T14:00:00Z", ...], ...}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TakenDateSet {
    classes: BTreeMap<PriorityClass, Vec<Ts>>,
}

impl TakenDateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, class: PriorityClass) -> &[Ts] {
        self.classes.get(&class).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Replace the full sequence for `class`.
    pub fn set(&mut self, class: PriorityClass, taken: Vec<Ts>) {
        if taken.is_empty() {
            self.classes.remove(&class);
        } else {
            self.classes.insert(class, taken);
        }
    }

    pub fn push(&mut self, class: PriorityClass, at: Ts) {
        self.classes.entry(class).or_default().push(at);
    }

    pub fn len(&self, class: PriorityClass) -> usize {
        self.get(class).len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.values().all(Vec::is_empty)
    }
}

/// What the caller asked for: a tier, or a concrete time chosen upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleTarget {
    Class(PriorityClass),
    Explicit(Ts),
}

/// Batch parameters, present only for repurpose tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSpec {
    pub count: u32,
    pub weeks_between: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleRequest {
    pub target: ScheduleTarget,
    pub base_time: Ts,
    pub batch: Option<BatchSpec>,
}

impl ScheduleRequest {
    pub fn basic(class: PriorityClass, base_time: Ts) -> Self {
        Self {
            target: ScheduleTarget::Class(class),
            base_time,
            batch: None,
        }
    }

    pub fn repurpose(class: PriorityClass, base_time: Ts, count: u32, weeks_between: u32) -> Self {
        Self {
            target: ScheduleTarget::Class(class),
            base_time,
            batch: Some(BatchSpec {
                count,
                weeks_between,
            }),
        }
    }

    pub fn explicit(at: Ts, base_time: Ts) -> Self {
        Self {
            target: ScheduleTarget::Explicit(at),
            base_time,
            batch: None,
        }
    }
}

/// Result of a repurpose batch search. A short batch is reported, never hidden.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepurposeOutcome {
    /// Reserved publish times, ascending.
    pub slots: Vec<Ts>,
    /// `slots[i] - base_time` in seconds.
    pub offsets: Vec<OffsetSecs>,
    pub requested: u32,
    /// How many of `requested` could not be placed within the search horizon.
    pub shortfall: u32,
}

impl RepurposeOutcome {
    pub fn is_complete(&self) -> bool {
        self.shortfall == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleResult {
    /// Basic tier or explicit timestamp.
    Single { at: Ts, offset: OffsetSecs },
    Batch(RepurposeOutcome),
}

impl ScheduleResult {
    pub fn offsets(&self) -> Vec<OffsetSecs> {
        match self {
            ScheduleResult::Single { offset, .. } => vec![*offset],
            ScheduleResult::Batch(outcome) => outcome.offsets.clone(),
        }
    }
}

/// WAL record format for the key-value store. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Record {
    Put {
        namespace: String,
        key: String,
        value: String,
    },
}
