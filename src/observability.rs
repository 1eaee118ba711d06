use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "airtime_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "airtime_query_duration_seconds";

/// Counter: scheduling transactions. Labels: op, outcome.
pub const TRANSACTIONS_TOTAL: &str = "airtime_transactions_total";

/// Counter: reads that found a slot booked past its capacity.
pub const OVERBOOKED_SLOTS_TOTAL: &str = "airtime_overbooked_slots_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "airtime_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "airtime_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "airtime_connections_rejected_total";

/// Gauge: number of screen networks with a loaded engine.
pub const TENANTS_ACTIVE: &str = "airtime_tenants_active";

/// Counter: startup/auth failures.
pub const AUTH_FAILURES_TOTAL: &str = "airtime_auth_failures_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::RegisterContent { .. } => "register_content",
        Command::BatchAdd { .. } => "batch_add",
        Command::BlockAdd { .. } => "block_add",
        Command::EditAd { .. } => "edit_ad",
        Command::TogglePause { .. } => "toggle_pause",
        Command::DeleteAd { .. } => "delete_ad",
        Command::SelectContent => "select_content",
        Command::SelectSlots { .. } => "select_slots",
        Command::SelectRotation { .. } => "select_rotation",
        Command::SelectWeekSummary => "select_week_summary",
        Command::SelectOwnAds => "select_own_ads",
    }
}
