//! CLI display utilities for job views and sweep reports

use crate::core::styles::StyleRole;
use crate::monitor::{JobView, UnitCondition, UnitView};
use crate::retention::SweepReport;
use crate::status::{JobState, MasterStatus, Progress};
use prettytable::{format, Cell, Row, Table};

/// Longest `current_item` shown before it is cut from the left
const ITEM_COLUMN_WIDTH: usize = 40;

fn condition_role(condition: UnitCondition) -> StyleRole {
    match condition {
        UnitCondition::Pending => StyleRole::Pending,
        UnitCondition::Active => StyleRole::Active,
        UnitCondition::Stale => StyleRole::Stale,
        UnitCondition::Completed => StyleRole::Completed,
        UnitCondition::Failed => StyleRole::Failed,
    }
}

fn state_role(state: JobState) -> StyleRole {
    match state {
        JobState::Initializing => StyleRole::Pending,
        JobState::InProgress => StyleRole::Active,
        JobState::Completed => StyleRole::Completed,
        JobState::Failed => StyleRole::Failed,
    }
}

pub fn format_progress(progress: &Progress) -> String {
    match (progress.current, progress.total, progress.ratio()) {
        (Some(current), Some(total), Some(ratio)) => {
            format!("{}/{} ({:.0}%)", current, total, ratio * 100.0)
        }
        (Some(current), Some(total), None) => format!("{}/{}", current, total),
        (Some(current), None, _) => current.to_string(),
        (None, Some(total), _) => format!("0/{}", total),
        (None, None, _) => "-".to_string(),
    }
}

/// Keep the tail of long paths, which is the informative part
fn shorten_item(item: &str) -> String {
    let count = item.chars().count();
    if count <= ITEM_COLUMN_WIDTH {
        return item.to_string();
    }
    let tail: String = item.chars().skip(count - (ITEM_COLUMN_WIDTH - 3)).collect();
    format!("...{}", tail)
}

fn unit_detail(unit: &UnitView) -> String {
    if let Some(reason) = unit.failure_reason {
        match unit.errors.first() {
            Some(first) => format!("{}: {}", reason, first.lines().next().unwrap_or_default()),
            None => reason.to_string(),
        }
    } else {
        unit.current_item.as_deref().map(shorten_item).unwrap_or_default()
    }
}

fn styled_cell(text: &str, role: StyleRole, use_color: bool) -> Cell {
    let cell = Cell::new(text);
    match role.to_prettytable_spec() {
        Some(spec) if use_color => cell.style_spec(&spec),
        _ => cell,
    }
}

/// One row per unit
pub fn job_table(view: &JobView, use_color: bool) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_CLEAN);

    let header = |text: &str| styled_cell(text, StyleRole::Header, use_color);
    table.set_titles(Row::new(vec![
        header("#"),
        header("Name"),
        header("Phase"),
        header("Condition"),
        header("Progress"),
        header("PID"),
        header("Detail"),
    ]));

    for unit in &view.units {
        let role = condition_role(unit.condition);
        table.add_row(Row::new(vec![
            Cell::new(&unit.index.to_string()),
            Cell::new(&unit.name),
            Cell::new(unit.phase.as_str()),
            styled_cell(unit.condition.as_str(), role, use_color),
            Cell::new(&format_progress(&unit.progress)),
            Cell::new(&unit.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".into())),
            Cell::new(&unit_detail(unit)),
        ]));
    }
    table
}

/// One-line headline for a job view
pub fn format_job_headline(view: &JobView, use_color: bool) -> String {
    let state = state_role(view.state).paint(view.state.as_str(), use_color);
    let mut line = format!(
        "{} {}: {} completed, {} failed, {} in progress, {} pending of {} ({:.1}s)",
        StyleRole::Key.paint(&view.job_id, use_color),
        state,
        view.counts.completed,
        view.counts.failed,
        view.counts.in_progress,
        view.counts.pending,
        view.total_units,
        view.elapsed.as_secs_f64()
    );
    if view.stale > 0 {
        line.push_str(&format!(
            ", {}",
            StyleRole::Stale.paint(&format!("{} stale", view.stale), use_color)
        ));
    }
    line
}

pub fn print_job_view(view: &JobView, use_color: bool) {
    println!("{}", format_job_headline(view, use_color));
    if view.units.is_empty() {
        return;
    }
    println!();
    let table = job_table(view, use_color);
    if let Err(e) = table.print_tty(use_color) {
        log::debug!("Table output failed: {}", e);
    }
}

pub fn format_master_summary(master: &MasterStatus, use_color: bool) -> String {
    let mut lines = vec![
        format!(
            "{} {}",
            StyleRole::Key.paint(&master.job_id, use_color),
            state_role(master.status).paint(master.status.as_str(), use_color)
        ),
        format!(
            "  units: {} ({} completed, {} failed, {} in progress, {} pending)",
            master.total_units,
            master.counts.completed,
            master.counts.failed,
            master.counts.in_progress,
            master.counts.pending
        ),
        format!("  started: {}", master.started_at.to_rfc3339()),
    ];
    if let Some(completed_at) = master.completed_at {
        lines.push(format!("  completed: {}", completed_at.to_rfc3339()));
    }
    lines.push(format!(
        "  last aggregation: {}",
        StyleRole::Dim.paint(&master.last_aggregation.to_rfc3339(), use_color)
    ));
    lines.join("\n")
}

pub fn format_sweep_report(report: &SweepReport, use_color: bool) -> String {
    let mut lines = vec![format!(
        "Examined {} jobs: {} removed, {} retained",
        report.examined,
        report.removed.len(),
        report.retained
    )];
    for job_id in &report.removed {
        lines.push(format!("  removed {}", StyleRole::Dim.paint(job_id, use_color)));
    }
    for error in &report.errors {
        lines.push(format!("  {}", StyleRole::Failed.paint(error, use_color)));
    }
    lines.join("\n")
}
