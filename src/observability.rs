use std::net::SocketAddr;

use crate::command::Command;
use crate::model::{ScheduleRequest, ScheduleTarget};

// ── Allocation ──────────────────────────────────────────────────

/// Counter: allocation calls. Labels: kind, status.
pub const ALLOCATIONS_TOTAL: &str = "postslot_allocations_total";

/// Histogram: allocation latency in seconds, store I/O included. Labels: kind.
pub const ALLOCATION_DURATION_SECONDS: &str = "postslot_allocation_duration_seconds";

/// Counter: slots written to the taken-date store. Labels: class.
pub const SLOTS_RESERVED_TOTAL: &str = "postslot_slots_reserved_total";

/// Counter: basic-tier searches that found nothing. Labels: class.
pub const SCHEDULING_EXHAUSTED_TOTAL: &str = "postslot_scheduling_exhausted_total";

/// Counter: repurpose slots requested but not placed. Labels: class.
pub const REPURPOSE_SHORTFALL_TOTAL: &str = "postslot_repurpose_shortfall_total";

/// Counter: explicit timestamps shifted forward a day.
pub const EXPLICIT_CORRECTIONS_TOTAL: &str = "postslot_explicit_corrections_total";

/// Counter: slots given back. Labels: class.
pub const RELEASES_TOTAL: &str = "postslot_releases_total";

// ── Server ──────────────────────────────────────────────────────

/// Gauge: open TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "postslot_connections_active";

/// Counter: connections accepted.
pub const CONNECTIONS_TOTAL: &str = "postslot_connections_total";

/// Counter: connections refused at the limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "postslot_connections_rejected_total";

/// Counter: protocol commands handled. Labels: command, status.
pub const COMMANDS_TOTAL: &str = "postslot_commands_total";

// ── Storage ─────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "postslot_wal_flush_duration_seconds";

/// Histogram: records per WAL flush.
pub const WAL_FLUSH_BATCH_SIZE: &str = "postslot_wal_flush_batch_size";

/// Counter: WAL compactions completed.
pub const WAL_COMPACTIONS_TOTAL: &str = "postslot_wal_compactions_total";

/// Install the Prometheus exporter on `port`. No-op if `port` is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

pub fn request_label(request: &ScheduleRequest) -> &'static str {
    match request.target {
        ScheduleTarget::Explicit(_) => "explicit",
        ScheduleTarget::Class(class) if class.is_repurpose() => "repurpose",
        ScheduleTarget::Class(_) => "basic",
    }
}

pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::Allocate(_) => "allocate",
        Command::Release { .. } => "release",
        Command::Taken { .. } => "taken",
    }
}
