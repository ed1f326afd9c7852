//! Prometheus text exposition format.
//!
//! Renders reload metrics and router status for scraping by a Prometheus
//! server or compatible agent.

use crate::collector::MetricsSnapshot;
use crate::status::StatusSnapshot;

fn metric(out: &mut String, name: &str, kind: &str, help: &str, value: impl std::fmt::Display) {
    out.push_str(&format!("# HELP edgeward_{name} {help}\n"));
    out.push_str(&format!("# TYPE edgeward_{name} {kind}\n"));
    out.push_str(&format!("edgeward_{name} {value}\n"));
}

/// Render metrics and status into Prometheus text format.
pub fn render_prometheus(metrics: &MetricsSnapshot, status: &StatusSnapshot) -> String {
    let mut out = String::new();

    metric(&mut out, "commits_total", "counter", "Successful config commits.", metrics.commits);
    metric(
        &mut out,
        "reload_failures_total",
        "counter",
        "Failed render or activate attempts.",
        metrics.reload_failures,
    );
    metric(
        &mut out,
        "unchanged_activations_total",
        "counter",
        "Commits whose config was already active.",
        metrics.unchanged_activations,
    );

    out.push_str("# HELP edgeward_write_config_seconds Time spent rendering and writing the config.\n");
    out.push_str("# TYPE edgeward_write_config_seconds summary\n");
    out.push_str(&format!(
        "edgeward_write_config_seconds_sum {:.6}\n",
        metrics.write_config_micros_sum as f64 / 1_000_000.0
    ));
    out.push_str(&format!(
        "edgeward_write_config_seconds_count {}\n",
        metrics.write_config_count
    ));

    out.push_str("# HELP edgeward_reload_seconds Time spent activating a new config.\n");
    out.push_str("# TYPE edgeward_reload_seconds summary\n");
    out.push_str(&format!(
        "edgeward_reload_seconds_sum {:.6}\n",
        metrics.reload_micros_sum as f64 / 1_000_000.0
    ));
    out.push_str(&format!("edgeward_reload_seconds_count {}\n", metrics.reload_count));

    out.push_str("# HELP edgeward_events_total Reconciled watch events by outcome.\n");
    out.push_str("# TYPE edgeward_events_total counter\n");
    for (outcome, value) in [
        ("applied", metrics.events_applied),
        ("ignored", metrics.events_ignored),
        ("rejected", metrics.events_rejected),
    ] {
        out.push_str(&format!("edgeward_events_total{{outcome=\"{outcome}\"}} {value}\n"));
    }

    metric(&mut out, "active_routes", "gauge", "Keys with an active route.", metrics.active_routes);
    metric(
        &mut out,
        "rejected_routes",
        "gauge",
        "Routes excluded by validation.",
        metrics.rejected_routes,
    );

    metric(&mut out, "ready", "gauge", "1 once a config has been committed.", u8::from(status.ready));
    metric(&mut out, "synced", "gauge", "1 once the initial lists are synced.", u8::from(status.synced()));
    metric(
        &mut out,
        "last_commit_timestamp_seconds",
        "gauge",
        "Unix time of the last successful commit.",
        status.last_commit_epoch.unwrap_or(0),
    );

    out
}
