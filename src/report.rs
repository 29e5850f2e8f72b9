//! Plain-text rendering of a [`DashboardView`] for the terminal.

use crate::aggregate::Measure;
use crate::dashboard::{Chart, ChartPoint, DashboardView, Notice};
use crate::format::{format_currency, format_percent, format_quantity};
use itertools::Itertools;
use std::fmt::Write;

const BAR_WIDTH: usize = 30;
const LABEL_WIDTH: usize = 28;

pub fn render_text(view: &DashboardView) -> String {
    let mut out = String::new();

    for notice in &view.notices {
        let _ = writeln!(out, "[{}] {}", notice_level(notice), notice.text());
    }
    if !view.notices.is_empty() {
        out.push('\n');
    }

    let _ = writeln!(out, "=== Sales Dashboard ===");
    let _ = writeln!(out, "Rows: {} of {}", view.rows_filtered, view.rows_total);
    if let Some((from, to)) = view.date_bounds {
        let _ = writeln!(out, "Order dates: {} to {}", from, to);
    }
    let applied = view
        .filters
        .iter()
        .filter(|s| s.applied)
        .map(|s| format!("{} ({} -> {})", s.column, s.rows_before, s.rows_after))
        .join(", ");
    if !applied.is_empty() {
        let _ = writeln!(out, "Filters: {}", applied);
    }
    out.push('\n');

    for tile in &view.kpi_tiles {
        let _ = writeln!(out, "{:<22}{:>14}", tile.label, tile.value);
    }

    for chart in &view.charts {
        out.push('\n');
        let _ = writeln!(out, "--- {} ---", chart.title());
        render_chart(&mut out, chart);
    }
    out
}

fn notice_level(notice: &Notice) -> &'static str {
    match notice {
        Notice::Success(_) => "ok",
        Notice::Warning(_) => "warning",
        Notice::Error(_) => "error",
        Notice::NoData => "info",
    }
}

fn render_chart(out: &mut String, chart: &Chart) {
    match chart {
        Chart::Bar { measure, points, .. } | Chart::Line { measure, points, .. } => {
            render_bars(out, points, *measure)
        }
        Chart::Pie { measure, slices, .. } => {
            for slice in slices {
                let _ = writeln!(
                    out,
                    "{:<w$}{:>12}  {}",
                    truncate(&slice.label),
                    measure_value(*measure, slice.value),
                    format_percent(slice.share),
                    w = LABEL_WIDTH
                );
            }
        }
        Chart::Treemap { measure, nodes, .. } => {
            for (parent, group) in &nodes.iter().group_by(|n| n.path.first().cloned()) {
                let _ = writeln!(out, "{}", parent.unwrap_or_default());
                for node in group {
                    let leaf = node.path.iter().skip(1).join(" / ");
                    let _ = writeln!(
                        out,
                        "  {:<w$}{:>12}",
                        truncate(&leaf),
                        measure_value(*measure, node.value),
                        w = LABEL_WIDTH - 2
                    );
                }
            }
        }
        Chart::Scatter { points, .. } => {
            let _ = writeln!(out, "{:<w$}{:>12}{:>12}{:>8}", "", "Sales", "Profit", "Qty", w = LABEL_WIDTH);
            for p in points {
                let _ = writeln!(
                    out,
                    "{:<w$}{:>12}{:>12}{:>8}",
                    truncate(&p.label),
                    format_currency(p.sales),
                    format_currency(p.profit),
                    format_quantity(p.quantity),
                    w = LABEL_WIDTH
                );
            }
        }
    }
}

fn render_bars(out: &mut String, points: &[ChartPoint], measure: Measure) {
    let peak = points
        .iter()
        .map(|p| p.value.abs())
        .fold(0.0_f64, f64::max);
    for point in points {
        let len = if peak > 0.0 {
            ((point.value.abs() / peak) * BAR_WIDTH as f64).round() as usize
        } else {
            0
        };
        let mark = if point.value < 0.0 { '-' } else { '#' };
        let _ = writeln!(
            out,
            "{:<w$}{:<bw$} {}",
            truncate(&point.label),
            mark.to_string().repeat(len),
            measure_value(measure, point.value),
            w = LABEL_WIDTH,
            bw = BAR_WIDTH
        );
    }
}

fn measure_value(measure: Measure, value: f64) -> String {
    match measure {
        Measure::Sales | Measure::Profit => format_currency(value),
        Measure::Quantity => format_quantity(value),
        Measure::MarginRate => format_percent(value),
    }
}

fn truncate(label: &str) -> String {
    if label.chars().count() < LABEL_WIDTH {
        label.to_string()
    } else {
        let mut cut: String = label.chars().take(LABEL_WIDTH - 4).collect();
        cut.push_str("...");
        cut
    }
}
