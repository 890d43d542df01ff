//! Hard bounds on searches, requests, and wire input.

/// Days the basic-tier past-date correction walks before giving up.
pub const BASIC_HORIZON_DAYS: i64 = 14;

/// Week steps the repurpose search takes before returning a short batch.
pub const REPURPOSE_HORIZON_STEPS: i64 = 52;

/// Explicit timestamps may lag the base time by this much (clock skew).
pub const EXPLICIT_TOLERANCE_SECS: i64 = 600;

/// Explicit timestamps older than the tolerance are pushed forward once by this.
pub const EXPLICIT_SHIFT_HOURS: i64 = 24;

pub const MAX_BATCH_COUNT: u32 = 52;
pub const MAX_WEEKS_BETWEEN: u32 = 52;

/// Reservations a single class may accumulate.
pub const MAX_TAKEN_PER_CLASS: usize = 100_000;

/// Longest accepted line on the text protocol, in bytes.
pub const MAX_LINE_LEN: usize = 1024;
