//! Prometheus metrics collection and formatting.
//!
//! This module renders pool state and binding-layer fallbacks in Prometheus
//! text exposition format.

use std::fmt::Write;

use stayhub_core::TaskFamily;

use crate::binding::Offloader;

/// Collect all metrics from an offloader and format as Prometheus text.
pub fn collect_metrics(offloader: &Offloader) -> String {
    let mut output = String::new();

    collect_pool_metrics(offloader, &mut output);
    collect_fallback_metrics(offloader, &mut output);

    output
}

/// Unit and task gauges per family. Families without a running pool report
/// zero.
fn collect_pool_metrics(offloader: &Offloader, output: &mut String) {
    let status = offloader.status();
    let snapshot = |family: &TaskFamily| status.get(family).copied().flatten().unwrap_or_default();

    writeln!(
        output,
        "# HELP stayhub_pool_workers Worker units per pool by state"
    )
    .ok();
    writeln!(output, "# TYPE stayhub_pool_workers gauge").ok();
    for family in &TaskFamily::ALL {
        let s = snapshot(family);
        writeln!(
            output,
            "stayhub_pool_workers{{family=\"{family}\",state=\"free\"}} {}",
            s.available_workers
        )
        .ok();
        writeln!(
            output,
            "stayhub_pool_workers{{family=\"{family}\",state=\"busy\"}} {}",
            s.busy_workers()
        )
        .ok();
    }

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP stayhub_pool_tasks Tasks per pool by state"
    )
    .ok();
    writeln!(output, "# TYPE stayhub_pool_tasks gauge").ok();
    for family in &TaskFamily::ALL {
        let s = snapshot(family);
        writeln!(
            output,
            "stayhub_pool_tasks{{family=\"{family}\",state=\"active\"}} {}",
            s.active_tasks
        )
        .ok();
        writeln!(
            output,
            "stayhub_pool_tasks{{family=\"{family}\",state=\"queued\"}} {}",
            s.queued_tasks
        )
        .ok();
    }
}

/// Fallbacks taken by the binding layer.
fn collect_fallback_metrics(offloader: &Offloader, output: &mut String) {
    writeln!(output).ok();
    writeln!(
        output,
        "# HELP stayhub_offload_fallbacks_total Computations that fell back after a failure"
    )
    .ok();
    writeln!(output, "# TYPE stayhub_offload_fallbacks_total counter").ok();
    for (operation, count) in offloader.fallback_counts() {
        writeln!(
            output,
            "stayhub_offload_fallbacks_total{{operation=\"{}\"}} {count}",
            operation.as_str()
        )
        .ok();
    }
}
