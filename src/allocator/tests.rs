use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{NaiveDate, TimeDelta};

use super::*;
use crate::alert::{AlertError, AlertHub};
use crate::limits::*;
use crate::store::{KvTakenDates, MemoryKv, StoreError, WalKv};

const H: i64 = 3_600;
const D: i64 = 86_400;

fn ts(s: &str) -> Ts {
    s.parse().unwrap()
}

fn catalog() -> Arc<SlotTemplateCatalog> {
    Arc::new(SlotTemplateCatalog::default())
}

fn memory_allocator() -> (SlotAllocator, Arc<KvTakenDates>) {
    let store = Arc::new(KvTakenDates::new(Arc::new(MemoryKv::new())));
    (SlotAllocator::new(catalog(), store.clone()), store)
}

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("postslot_test_allocator");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

/// Every slot of `class` on the calendar days `from..=to`.
fn all_slots(class: PriorityClass, from: &str, to: &str) -> Vec<Ts> {
    let catalog = SlotTemplateCatalog::default();
    let mut date: NaiveDate = from.parse().unwrap();
    let end: NaiveDate = to.parse().unwrap();
    let mut out = Vec::new();
    while date <= end {
        out.extend(catalog.hours_on(class, weekday_of(date)).map(|h| at_hour(date, h)));
        date += TimeDelta::days(1);
    }
    out
}

struct FailingStore;

#[async_trait]
impl TakenDateStore for FailingStore {
    async fn load(&self, _class: PriorityClass) -> Result<Vec<Ts>, StoreError> {
        Err(StoreError::Io(std::io::Error::other("disk unavailable")))
    }

    async fn save(&self, _class: PriorityClass, _taken: &[Ts]) -> Result<(), StoreError> {
        Err(StoreError::Io(std::io::Error::other("disk unavailable")))
    }
}

#[derive(Default)]
struct FailingAlerts {
    calls: AtomicUsize,
}

#[async_trait]
impl AlertSink for FailingAlerts {
    async fn notify(&self, _message: &str) -> Result<(), AlertError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AlertError("webhook returned 500".into()))
    }
}

// ── Basic tiers: pure search ─────────────────────────────

#[test]
fn empty_history_starts_at_next_allowed_day() {
    let slot = next_basic_slot(&catalog(), PriorityClass::P1, &[], ts("2024-01-03T12:00:00Z"));
    assert_eq!(slot, Some(ts("2024-01-06T14:00:00Z")));
}

#[test]
fn cursor_takes_next_hour_same_day() {
    let taken = [ts("2024-01-06T14:00:00Z")];
    let slot = next_basic_slot(&catalog(), PriorityClass::P1, &taken, ts("2024-01-03T12:00:00Z"));
    assert_eq!(slot, Some(ts("2024-01-06T15:00:00Z")));
}

#[test]
fn saturday_close_rolls_to_sunday_then_next_saturday() {
    let base = ts("2024-01-03T12:00:00Z");
    let after_sat = next_basic_slot(&catalog(), PriorityClass::P1, &[ts("2024-01-06T18:00:00Z")], base);
    assert_eq!(after_sat, Some(ts("2024-01-07T14:00:00Z")));
    let after_sun = next_basic_slot(&catalog(), PriorityClass::P1, &[ts("2024-01-07T18:00:00Z")], base);
    assert_eq!(after_sun, Some(ts("2024-01-13T14:00:00Z")));
}

#[test]
fn weekday_and_weekend_windows_follow_the_cursor_day() {
    let base = ts("2024-01-03T12:00:00Z");
    let cat = catalog();
    // Friday evening window closes -> Saturday morning window
    assert_eq!(
        next_basic_slot(&cat, PriorityClass::P2, &[ts("2024-01-05T20:00:00Z")], base),
        Some(ts("2024-01-06T10:00:00Z"))
    );
    // Sunday morning window closes -> Monday evening window
    assert_eq!(
        next_basic_slot(&cat, PriorityClass::P2, &[ts("2024-01-07T13:00:00Z")], base),
        Some(ts("2024-01-08T17:00:00Z"))
    );
    assert_eq!(
        next_basic_slot(&cat, PriorityClass::P2, &[ts("2024-01-09T18:00:00Z")], base),
        Some(ts("2024-01-09T19:00:00Z"))
    );
}

#[test]
fn cursor_jumps_gaps_between_windows() {
    let base = ts("2024-01-03T12:00:00Z");
    let cat = catalog();
    assert_eq!(
        next_basic_slot(&cat, PriorityClass::P3, &[ts("2024-01-08T08:00:00Z")], base),
        Some(ts("2024-01-08T21:00:00Z"))
    );
    assert_eq!(
        next_basic_slot(&cat, PriorityClass::P3, &[ts("2024-01-08T22:00:00Z")], base),
        Some(ts("2024-01-09T06:00:00Z"))
    );
}

#[test]
fn stale_cursor_is_corrected_to_after_base() {
    // cursor would give Sunday 2023-12-31 14:00, long past
    let taken = [ts("2023-12-30T18:00:00Z")];
    let base = ts("2024-01-06T15:30:00Z");
    assert_eq!(
        next_basic_slot(&catalog(), PriorityClass::P1, &taken, base),
        Some(ts("2024-01-06T16:00:00Z"))
    );
}

#[test]
fn empty_history_same_day_past_window_start() {
    let cat = catalog();
    assert_eq!(
        next_basic_slot(&cat, PriorityClass::P1, &[], ts("2024-01-06T16:30:00Z")),
        Some(ts("2024-01-06T17:00:00Z"))
    );
    // Sunday evening, after the last window of the weekend
    assert_eq!(
        next_basic_slot(&cat, PriorityClass::P1, &[], ts("2024-01-07T19:00:00Z")),
        Some(ts("2024-01-13T14:00:00Z"))
    );
}

#[test]
fn base_exactly_on_slot_is_allowed() {
    let base = ts("2024-01-06T14:00:00Z");
    assert_eq!(
        next_basic_slot(&catalog(), PriorityClass::P1, &[], base),
        Some(base)
    );
}

#[test]
fn reserved_candidate_is_skipped() {
    // out-of-order history: the cursor lands on an already reserved slot
    let taken = [ts("2024-01-06T15:00:00Z"), ts("2024-01-06T14:00:00Z")];
    assert_eq!(
        next_basic_slot(&catalog(), PriorityClass::P1, &taken, ts("2024-01-03T12:00:00Z")),
        Some(ts("2024-01-06T16:00:00Z"))
    );
}

#[test]
fn fully_reserved_horizon_exhausts() {
    let mut taken = all_slots(PriorityClass::P1, "2024-01-06", "2024-01-21");
    taken.push(ts("2023-12-31T18:00:00Z"));
    assert_eq!(
        next_basic_slot(&catalog(), PriorityClass::P1, &taken, ts("2024-01-03T12:00:00Z")),
        None
    );
}

// ── Basic tiers: allocator ───────────────────────────────

#[tokio::test]
async fn first_p1_allocation_offset() {
    let (alloc, _) = memory_allocator();
    let base = ts("2024-01-03T12:00:00Z");
    let result = alloc
        .allocate(ScheduleRequest::basic(PriorityClass::P1, base))
        .await
        .unwrap();
    assert_eq!(
        result,
        ScheduleResult::Single {
            at: ts("2024-01-06T14:00:00Z"),
            offset: 3 * D + 2 * H,
        }
    );
}

#[tokio::test]
async fn sub_second_base_never_fires_early() {
    let (alloc, _) = memory_allocator();
    let base = ts("2024-01-03T12:00:00.700Z");
    let result = alloc
        .allocate(ScheduleRequest::basic(PriorityClass::P1, base))
        .await
        .unwrap();
    let ScheduleResult::Single { at, offset } = result else {
        panic!("expected a single slot");
    };
    assert_eq!(at, ts("2024-01-06T14:00:00Z"));
    assert_eq!(offset, 3 * D + 2 * H);
    assert!(base + TimeDelta::seconds(offset) >= at);

    let outcome = alloc
        .allocate_repurpose(PriorityClass::R1, base, 2, 1)
        .await
        .unwrap();
    for (slot, offset) in outcome.slots.iter().zip(&outcome.offsets) {
        assert!(base + TimeDelta::seconds(*offset) >= *slot, "{slot} fires early");
    }
    assert_eq!(outcome.offsets[0], 3 * H);
}

#[tokio::test]
async fn p1_walks_the_weekend_then_wraps() {
    let (alloc, store) = memory_allocator();
    let base = ts("2024-01-03T12:00:00Z");
    let mut got = Vec::new();
    for _ in 0..11 {
        got.push(alloc.allocate_basic(PriorityClass::P1, base).await.unwrap());
    }
    let mut expected = all_slots(PriorityClass::P1, "2024-01-06", "2024-01-07");
    expected.push(ts("2024-01-13T14:00:00Z"));
    assert_eq!(got, expected);
    assert_eq!(store.load(PriorityClass::P1).await.unwrap(), expected);
}

#[tokio::test]
async fn basic_allocations_hold_invariants() {
    let (alloc, _) = memory_allocator();
    let base = ts("2024-01-03T12:17:45Z");
    for class in [PriorityClass::P1, PriorityClass::P2, PriorityClass::P3] {
        let mut seen = HashSet::new();
        let mut previous: Option<Ts> = None;
        for _ in 0..60 {
            let slot = alloc.allocate_basic(class, base).await.unwrap();
            assert!(alloc.catalog().contains(class, &slot), "{class}: {slot} not in template");
            assert!(slot >= base, "{class}: {slot} before base");
            assert!(seen.insert(slot), "{class}: {slot} issued twice");
            if let Some(prev) = previous {
                assert!(slot > prev, "{class}: cursor went backwards");
            }
            previous = Some(slot);
        }
    }
}

#[tokio::test]
async fn exhaustion_alerts_and_fails() {
    let hub = Arc::new(AlertHub::new());
    let mut rx = hub.subscribe();
    let store = Arc::new(KvTakenDates::new(Arc::new(MemoryKv::new())));
    let alloc = SlotAllocator::new(catalog(), store.clone()).with_alerts(hub);

    let mut taken = all_slots(PriorityClass::P1, "2024-01-06", "2024-01-21");
    taken.push(ts("2023-12-31T18:00:00Z"));
    store.save(PriorityClass::P1, &taken).await.unwrap();

    let err = alloc
        .allocate_basic(PriorityClass::P1, ts("2024-01-03T12:00:00Z"))
        .await
        .unwrap_err();
    assert!(matches!(err, AllocError::SchedulingExhausted(PriorityClass::P1)));

    let alert = rx.recv().await.unwrap();
    assert!(alert.message.contains("p1"), "{}", alert.message);
    // nothing appended on failure
    assert_eq!(store.load(PriorityClass::P1).await.unwrap(), taken);
}

#[tokio::test]
async fn failing_alert_sink_does_not_change_the_error() {
    let alerts = Arc::new(FailingAlerts::default());
    let store = Arc::new(KvTakenDates::new(Arc::new(MemoryKv::new())));
    let alloc = SlotAllocator::new(catalog(), store.clone()).with_alerts(alerts.clone());

    let mut taken = all_slots(PriorityClass::P1, "2024-01-06", "2024-01-21");
    taken.push(ts("2023-12-31T18:00:00Z"));
    store.save(PriorityClass::P1, &taken).await.unwrap();

    let result = alloc
        .allocate(ScheduleRequest::basic(PriorityClass::P1, ts("2024-01-03T12:00:00Z")))
        .await;
    assert!(matches!(result, Err(AllocError::SchedulingExhausted(_))));
    assert_eq!(alerts.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn store_errors_propagate() {
    let alloc = SlotAllocator::new(catalog(), Arc::new(FailingStore));
    let base = ts("2024-01-03T12:00:00Z");
    let err = alloc.allocate_basic(PriorityClass::P2, base).await.unwrap_err();
    assert!(matches!(err, AllocError::Store(StoreError::Io(_))));
    let err = alloc
        .allocate_repurpose(PriorityClass::R1, base, 2, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, AllocError::Store(_)));
    assert!(err.to_string().contains("disk unavailable"));
}

#[tokio::test]
async fn wrong_family_rejected() {
    let (alloc, _) = memory_allocator();
    let base = ts("2024-01-03T12:00:00Z");
    assert!(matches!(
        alloc.allocate_basic(PriorityClass::R1, base).await,
        Err(AllocError::InvalidRequest(_))
    ));
    assert!(matches!(
        alloc.allocate_repurpose(PriorityClass::P1, base, 2, 1).await,
        Err(AllocError::InvalidRequest(_))
    ));
    let missing_batch = ScheduleRequest {
        target: ScheduleTarget::Class(PriorityClass::R2),
        base_time: base,
        batch: None,
    };
    assert!(matches!(
        alloc.allocate(missing_batch).await,
        Err(AllocError::InvalidRequest(_))
    ));
}

// ── Explicit timestamps ──────────────────────────────────

#[tokio::test]
async fn explicit_within_tolerance_is_unchanged() {
    let (alloc, store) = memory_allocator();
    let base = ts("2024-01-03T12:00:00Z");
    let at = ts("2024-01-03T11:55:00Z");
    let result = alloc.allocate(ScheduleRequest::explicit(at, base)).await.unwrap();
    assert_eq!(result, ScheduleResult::Single { at, offset: -300 });
    assert!(store.load_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn explicit_in_the_past_shifts_one_day() {
    let (alloc, _) = memory_allocator();
    let base = ts("2024-01-03T12:00:00Z");
    let result = alloc
        .allocate(ScheduleRequest::explicit(ts("2024-01-03T10:00:00Z"), base))
        .await
        .unwrap();
    assert_eq!(
        result,
        ScheduleResult::Single {
            at: ts("2024-01-04T10:00:00Z"),
            offset: 22 * H,
        }
    );
}

#[test]
fn explicit_tolerance_boundary() {
    let base = ts("2024-01-03T12:00:00Z");
    let edge = base - TimeDelta::seconds(EXPLICIT_TOLERANCE_SECS);
    assert_eq!(resolve_explicit(edge, base), (edge, -600));
    let past = edge - TimeDelta::seconds(1);
    let (shifted, offset) = resolve_explicit(past, base);
    assert_eq!(shifted, past + TimeDelta::hours(24));
    assert_eq!(offset, D - 601);
    // shifted once only, even if still in the past
    let ancient = base - TimeDelta::days(3);
    assert_eq!(resolve_explicit(ancient, base).1, -2 * D);
}

#[test]
fn explicit_tolerance_counts_fractional_seconds() {
    // 600.5 s late is past the tolerance even though it rounds to -600
    let base = ts("2024-01-03T12:10:00.500Z");
    let at = ts("2024-01-03T12:00:00Z");
    let (out, offset) = resolve_explicit(at, base);
    assert_eq!(out, ts("2024-01-04T12:00:00Z"));
    assert!(out >= base - TimeDelta::seconds(EXPLICIT_TOLERANCE_SECS));
    assert_eq!(offset, D - 600);

    // 599.5 s late stays put, offset rounded toward the later second
    let at = ts("2024-01-03T12:00:01Z");
    assert_eq!(resolve_explicit(at, base), (at, -599));
}

#[test]
fn explicit_future_passes_through() {
    let base = ts("2024-01-03T12:00:00Z");
    let at = ts("2024-01-10T09:00:00Z");
    assert_eq!(resolve_explicit(at, base), (at, 6 * D + 21 * H));
}

// ── Repurpose tiers ──────────────────────────────────────

#[test]
fn normalize_moves_midnight_to_previous_day() {
    let cat = catalog();
    let by_day = normalize_template(cat.slots_for(PriorityClass::R3));
    assert!(by_day[SUNDAY as usize].is_empty());
    for day in MONDAY..=FRIDAY {
        assert_eq!(by_day[day as usize], vec![24]);
    }
    assert!(by_day[SATURDAY as usize].is_empty());

    let sunday_midnight = normalize_template(&[TimeSlot::new(SUNDAY, 0), TimeSlot::new(SUNDAY, 9)]);
    assert_eq!(sunday_midnight[SATURDAY as usize], vec![24]);
    assert_eq!(sunday_midnight[SUNDAY as usize], vec![9]);
}

#[tokio::test]
async fn repurpose_batch_is_spaced_by_weeks() {
    let (alloc, store) = memory_allocator();
    let base = ts("2024-01-01T09:00:00Z");
    let outcome = alloc
        .allocate_repurpose(PriorityClass::R1, base, 3, 2)
        .await
        .unwrap();
    assert_eq!(
        outcome.slots,
        vec![
            ts("2024-01-01T15:00:00Z"),
            ts("2024-01-15T15:00:00Z"),
            ts("2024-01-29T15:00:00Z"),
        ]
    );
    assert_eq!(outcome.offsets, vec![6 * H, 14 * D + 6 * H, 28 * D + 6 * H]);
    assert!(outcome.is_complete());
    assert_eq!(store.load(PriorityClass::R1).await.unwrap(), outcome.slots);
}

#[tokio::test]
async fn repurpose_skips_taken_slots() {
    let (alloc, store) = memory_allocator();
    let already = ts("2024-01-15T15:00:00Z");
    store.save(PriorityClass::R1, &[already]).await.unwrap();

    let outcome = alloc
        .allocate_repurpose(PriorityClass::R1, ts("2024-01-01T09:00:00Z"), 3, 2)
        .await
        .unwrap();
    assert_eq!(
        outcome.slots,
        vec![
            ts("2024-01-01T15:00:00Z"),
            ts("2024-01-15T16:00:00Z"),
            ts("2024-01-29T15:00:00Z"),
        ]
    );
    let taken = store.load(PriorityClass::R1).await.unwrap();
    assert_eq!(taken.len(), 4);
    assert_eq!(taken[0], already);
}

#[tokio::test]
async fn repurpose_midnight_slots() {
    let (alloc, _) = memory_allocator();
    let outcome = alloc
        .allocate_repurpose(PriorityClass::R3, ts("2024-01-01T09:00:00Z"), 2, 1)
        .await
        .unwrap();
    assert_eq!(
        outcome.slots,
        vec![ts("2024-01-02T00:00:00Z"), ts("2024-01-09T00:00:00Z")]
    );
    for slot in &outcome.slots {
        assert!(alloc.catalog().contains(PriorityClass::R3, slot));
    }
}

#[test]
fn repurpose_week_window_and_base() {
    let cat = catalog();
    // Friday afternoon: still room on Friday
    assert_eq!(
        find_repurpose_slots(&cat, PriorityClass::R1, &[], ts("2024-01-05T16:30:00Z"), 1, 1),
        vec![ts("2024-01-05T17:00:00Z")]
    );
    // Friday evening: this week is spent
    assert_eq!(
        find_repurpose_slots(&cat, PriorityClass::R1, &[], ts("2024-01-05T18:00:00Z"), 1, 1),
        vec![ts("2024-01-08T15:00:00Z")]
    );
    // Sunday belongs to the week that started the Monday before
    assert_eq!(
        find_repurpose_slots(&cat, PriorityClass::R1, &[], ts("2024-01-07T10:00:00Z"), 1, 1),
        vec![ts("2024-01-08T15:00:00Z")]
    );
    // base slot itself is not strictly after base
    assert_eq!(
        find_repurpose_slots(&cat, PriorityClass::R2, &[], ts("2024-01-01T12:00:00Z"), 1, 1),
        vec![ts("2024-01-01T13:00:00Z")]
    );
}

#[test]
fn repurpose_spacing_property() {
    let cat = catalog();
    let base = ts("2024-03-06T20:00:00Z");
    for weeks in [1u32, 2, 3, 5] {
        let slots = find_repurpose_slots(&cat, PriorityClass::R2, &[], base, 6, weeks);
        assert_eq!(slots.len(), 6);
        for pair in slots.windows(2) {
            let week_a = pair[0].date_naive().week(chrono::Weekday::Mon).first_day();
            let week_b = pair[1].date_naive().week(chrono::Weekday::Mon).first_day();
            assert!((week_b - week_a).num_days() >= 7 * weeks as i64);
        }
        assert!(slots.iter().all(|s| *s > base && cat.contains(PriorityClass::R2, s)));
    }
}

#[tokio::test]
async fn repurpose_shortfall_is_reported() {
    let (alloc, store) = memory_allocator();
    let base = ts("2024-01-01T09:00:00Z");
    let monday = base.date_naive();
    let free_weeks = [10i64, 20];
    let mut taken = Vec::new();
    for week in 0..REPURPOSE_HORIZON_STEPS {
        if free_weeks.contains(&week) {
            continue;
        }
        let start = monday + TimeDelta::weeks(week);
        let end = start + TimeDelta::days(6);
        taken.extend(all_slots(
            PriorityClass::R2,
            &start.to_string(),
            &end.to_string(),
        ));
    }
    store.save(PriorityClass::R2, &taken).await.unwrap();

    let result = alloc
        .allocate(ScheduleRequest::repurpose(PriorityClass::R2, base, 5, 1))
        .await
        .unwrap();
    let ScheduleResult::Batch(outcome) = result else {
        panic!("expected a batch result");
    };
    assert_eq!(outcome.requested, 5);
    assert_eq!(outcome.shortfall, 3);
    assert!(!outcome.is_complete());
    assert_eq!(
        outcome.slots,
        vec![
            at_hour(monday + TimeDelta::weeks(10), 12),
            at_hour(monday + TimeDelta::weeks(20), 12),
        ]
    );
    assert_eq!(
        store.load(PriorityClass::R2).await.unwrap().len(),
        taken.len() + 2
    );
}

// ── Release ──────────────────────────────────────────────

#[tokio::test]
async fn released_slot_is_reissued() {
    let (alloc, _) = memory_allocator();
    let base = ts("2024-01-03T12:00:00Z");
    alloc.allocate_basic(PriorityClass::P1, base).await.unwrap();
    let second = alloc.allocate_basic(PriorityClass::P1, base).await.unwrap();

    assert!(alloc.release(PriorityClass::P1, second).await.unwrap());
    assert!(!alloc.release(PriorityClass::P1, second).await.unwrap());
    assert_eq!(alloc.allocate_basic(PriorityClass::P1, base).await.unwrap(), second);
    assert_eq!(alloc.taken(PriorityClass::P1).await.unwrap().len(), 2);
}

#[tokio::test]
async fn released_repurpose_slot_is_eligible_again() {
    let (alloc, _) = memory_allocator();
    let base = ts("2024-01-01T09:00:00Z");
    let first = alloc
        .allocate_repurpose(PriorityClass::R2, base, 1, 1)
        .await
        .unwrap();
    assert!(alloc.release(PriorityClass::R2, first.slots[0]).await.unwrap());
    let again = alloc
        .allocate_repurpose(PriorityClass::R2, base, 1, 1)
        .await
        .unwrap();
    assert_eq!(again.slots, first.slots);
}

// ── Persistence & concurrency ────────────────────────────

#[tokio::test]
async fn reload_from_wal_continues_where_memory_would() {
    let path = test_wal_path("reload.wal");
    let base = ts("2024-01-03T12:00:00Z");
    let mut first_run = Vec::new();
    {
        let kv = Arc::new(WalKv::open(path.clone()).unwrap());
        let alloc = SlotAllocator::new(catalog(), Arc::new(KvTakenDates::new(kv)));
        for _ in 0..5 {
            first_run.push(alloc.allocate_basic(PriorityClass::P2, base).await.unwrap());
        }
        alloc.allocate_repurpose(PriorityClass::R1, base, 2, 1).await.unwrap();
    }

    let kv = Arc::new(WalKv::open(path).unwrap());
    let reloaded = SlotAllocator::new(catalog(), Arc::new(KvTakenDates::new(kv)));
    assert_eq!(reloaded.taken(PriorityClass::P2).await.unwrap(), first_run);
    let after_reload = reloaded.allocate_basic(PriorityClass::P2, base).await.unwrap();

    let (memory, _) = memory_allocator();
    let mut expected = None;
    for _ in 0..6 {
        expected = Some(memory.allocate_basic(PriorityClass::P2, base).await.unwrap());
    }
    assert_eq!(Some(after_reload), expected);
    assert!(!first_run.contains(&after_reload));
    assert_eq!(reloaded.taken(PriorityClass::R1).await.unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_requests_never_double_book() {
    let (alloc, store) = memory_allocator();
    let alloc = Arc::new(alloc);
    let base = ts("2024-01-03T12:00:00Z");

    let mut handles = Vec::new();
    for i in 0..40 {
        let alloc = alloc.clone();
        handles.push(tokio::spawn(async move {
            if i % 4 == 0 {
                alloc
                    .allocate_repurpose(PriorityClass::R1, base, 2, 1)
                    .await
                    .unwrap()
                    .slots
            } else {
                vec![alloc.allocate_basic(PriorityClass::P3, base).await.unwrap()]
            }
        }));
    }
    let mut p3 = HashSet::new();
    let mut r1 = HashSet::new();
    for (i, h) in handles.into_iter().enumerate() {
        for slot in h.await.unwrap() {
            let set = if i % 4 == 0 { &mut r1 } else { &mut p3 };
            assert!(set.insert(slot), "{slot} issued twice");
        }
    }
    assert_eq!(p3.len(), 30);
    assert_eq!(r1.len(), 20);
    assert_eq!(store.load(PriorityClass::P3).await.unwrap().len(), 30);
    assert_eq!(store.load(PriorityClass::R1).await.unwrap().len(), 20);
}
