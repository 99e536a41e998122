use std::fmt::Write;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::config::Settings;
use crate::loader::Snapshot;
use crate::metrics::{self, Buckets};
use crate::models::{
    ApplicationBreakdown, CollaborationEdge, DashboardCounts, Defect, DefectField,
    DistributionEntry, KpiMetrics, ProjectInsight, StatusCounts, TeamPerformance, TeamStat,
    TeamWorkload, TestingMetrics, TrendPoint,
};
use crate::view::DashboardView;

/// Everything the dashboard renders, computed once from one scoped defect list.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsDocument {
    pub generated_at: NaiveDateTime,
    pub scope: String,
    pub kpis: KpiMetrics,
    pub counts: DashboardCounts,
    pub statuses: StatusCounts,
    pub priority: Vec<DistributionEntry>,
    pub severity: Vec<DistributionEntry>,
    pub issue_types: Vec<DistributionEntry>,
    pub teams: Vec<TeamStat>,
    pub team_performance: Vec<TeamPerformance>,
    pub workload: Vec<TeamWorkload>,
    pub vps: Vec<DistributionEntry>,
    pub trend: Vec<TrendPoint>,
    pub collaboration: Vec<CollaborationEdge>,
    pub applications: Vec<ApplicationBreakdown>,
    pub projects: Vec<ProjectInsight>,
    pub testing: TestingMetrics,
    pub recent: Vec<Defect>,
}

pub fn build_metrics_document(
    view: &DashboardView,
    snapshot: &Snapshot,
    settings: &Settings,
    now: NaiveDateTime,
) -> MetricsDocument {
    let defects = view.apply(&snapshot.defects, now);
    let teams = &snapshot.teams;
    let distribution =
        |field: DefectField| metrics::distribution_by(&defects, field, &Buckets::for_field(field));

    MetricsDocument {
        generated_at: now,
        scope: view.describe(),
        kpis: metrics::kpi_summary(&defects),
        counts: metrics::dashboard_counts(&defects),
        statuses: metrics::status_counts(&defects),
        priority: metrics::priority_distribution(&defects),
        severity: distribution(DefectField::Severity),
        issue_types: distribution(DefectField::IssueType),
        teams: metrics::team_rollup(&defects, teams),
        team_performance: metrics::team_performance(&defects, teams),
        workload: metrics::team_workload(&defects, teams),
        vps: metrics::vp_rollup(&defects, teams),
        trend: metrics::daily_trend(&defects, settings.trend_days, now.date()),
        collaboration: metrics::collaboration_edges(&defects, settings.collaboration_limit),
        applications: metrics::application_breakdown(&defects),
        projects: metrics::project_insights(&defects, settings.project_limit),
        testing: metrics::testing_metrics(&defects),
        recent: metrics::recent_defects(&defects, settings.recent_limit),
    }
}

fn write_distribution(output: &mut String, heading: &str, entries: &[DistributionEntry]) {
    let _ = writeln!(output);
    let _ = writeln!(output, "## {heading}");

    if entries.iter().all(|entry| entry.value == 0) {
        let _ = writeln!(output, "No defects recorded for this scope.");
        return;
    }

    for entry in entries {
        let _ = writeln!(output, "- {}: {}", entry.name, entry.value);
    }
}

pub fn build_report(document: &MetricsDocument) -> String {
    let mut output = String::new();
    let kpis = &document.kpis;

    let _ = writeln!(output, "# Defect Metrics Report");
    let _ = writeln!(
        output,
        "Generated {} for {}",
        document.generated_at.format("%Y-%m-%d %H:%M"),
        document.scope
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Key Metrics");
    let _ = writeln!(output, "- Total defects: {}", kpis.total);
    let _ = writeln!(output, "- Critical: {}", kpis.critical);
    let _ = writeln!(output, "- In progress: {}", kpis.in_progress);
    let _ = writeln!(output, "- Blockers: {}", kpis.blockers);
    let _ = writeln!(
        output,
        "- Resolved: {} ({}% resolution rate)",
        kpis.resolved, kpis.resolution_rate
    );
    let _ = writeln!(output, "- Validation pass rate: {}%", kpis.validation_pass_rate);
    let _ = writeln!(
        output,
        "- Open: {}, closed: {}, recurring: {}",
        document.counts.open, document.counts.closed, document.counts.recurring
    );

    let statuses = &document.statuses;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Status");
    if statuses.all == 0 {
        let _ = writeln!(output, "No defects recorded for this scope.");
    } else {
        for (name, value) in [
            ("Open", statuses.open),
            ("In Progress", statuses.in_progress),
            ("Resolved", statuses.resolved),
            ("Closed", statuses.closed),
            ("Reopened", statuses.reopened),
        ] {
            let _ = writeln!(output, "- {name}: {value}");
        }
    }

    write_distribution(&mut output, "Priority", &document.priority);
    write_distribution(&mut output, "Severity", &document.severity);
    write_distribution(&mut output, "Issue Type", &document.issue_types);
    write_distribution(&mut output, "Validation", &document.testing.validation);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Team Efficiency");
    if document.teams.is_empty() {
        let _ = writeln!(output, "No teams configured.");
    } else {
        for team in &document.teams {
            let _ = writeln!(
                output,
                "- {}{}: efficiency {}% ({}% resolved, {}% validated) across {} defects, {} requested",
                team.name,
                team.vp
                    .as_deref()
                    .map(|vp| format!(" (VP {vp})"))
                    .unwrap_or_default(),
                team.efficiency_score,
                team.resolution_rate,
                team.validation_success_rate,
                team.total_defects,
                team.requested_defects
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Team Performance");
    if document.team_performance.is_empty() {
        let _ = writeln!(output, "No team owns a defect in this scope.");
    } else {
        for row in &document.team_performance {
            let _ = writeln!(
                output,
                "- {}: {}% resolved ({} of {}, {} critical)",
                row.name, row.resolution_rate, row.resolved, row.total, row.critical
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Workload");
    if document.workload.is_empty() {
        let _ = writeln!(output, "No teams configured.");
    } else {
        for row in &document.workload {
            let _ = writeln!(
                output,
                "- {}: {} assigned, {} requested, {} resolved",
                row.name, row.assigned, row.requested, row.resolved
            );
        }
    }

    write_distribution(&mut output, "Defects by VP", &document.vps);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Daily Trend");
    for point in &document.trend {
        let _ = writeln!(
            output,
            "- {}: {} created, {} resolved, {} critical",
            point.label(),
            point.created,
            point.resolved,
            point.critical
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Cross-Team Collaboration");
    if document.collaboration.is_empty() {
        let _ = writeln!(output, "No cross-team requests in this scope.");
    } else {
        for edge in &document.collaboration {
            let _ = writeln!(output, "- {}: {}", edge.teams, edge.count);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Applications");
    if document.applications.is_empty() {
        let _ = writeln!(output, "No applications recorded.");
    } else {
        for app in &document.applications {
            let _ = writeln!(
                output,
                "- {}: {} defects ({} critical, {} resolved)",
                app.name, app.total, app.critical, app.resolved
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Projects");
    if document.projects.is_empty() {
        let _ = writeln!(output, "No projects recorded.");
    } else {
        for (rank, project) in document.projects.iter().enumerate() {
            let _ = writeln!(
                output,
                "{}. {} ({}, lead {}): {} defects, {} critical, {} resolved, {} blocked",
                rank + 1,
                project.name,
                project.project_type,
                project.lead,
                project.total,
                project.critical,
                project.resolved,
                project.blocked
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Defects");
    if document.recent.is_empty() {
        let _ = writeln!(output, "No defects recorded for this scope.");
    } else {
        for defect in &document.recent {
            let _ = writeln!(
                output,
                "- {} [{}] {} ({}, {})",
                defect.issue_key,
                defect.priority.map(|p| p.as_str()).unwrap_or("No priority"),
                defect.summary,
                defect.status.map(|s| s.as_str()).unwrap_or("No status"),
                defect
                    .created_date
                    .map(|created| created.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "undated".to_string())
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::tests::{at, defect, team};
    use crate::models::{Priority, Status, Validation};

    fn settings() -> Settings {
        Settings {
            trend_days: 7,
            collaboration_limit: 8,
            recent_limit: 8,
            project_limit: 6,
            max_connections: 5,
            snapshot_dir: None,
            log_level: "info".to_string(),
            log_json: false,
        }
    }

    fn snapshot() -> Snapshot {
        let mut closed = defect(Priority::Critical, Status::Closed, "A");
        closed.validation = Some(Validation::Pass);
        closed.created_date = at("2025-03-07T09:00:00");
        closed.requesting_team = Some("B".to_string());
        let mut open = defect(Priority::Low, Status::Open, "B");
        open.created_date = at("2025-03-05T15:30:00");

        Snapshot {
            defects: vec![closed, open],
            teams: vec![team("A", Some("Dana")), team("B", None)],
        }
    }

    #[test]
    fn document_uses_one_scoped_list() {
        let now = at("2025-03-07T18:00:00").unwrap();
        let document =
            build_metrics_document(&DashboardView::default(), &snapshot(), &settings(), now);

        assert_eq!(document.kpis.total, 2);
        assert_eq!(document.kpis.resolution_rate, 50);
        assert_eq!(document.teams[0].name, "A");
        assert_eq!(document.trend.len(), 7);
        assert_eq!(document.trend[6].created, 1);
        assert_eq!(document.collaboration[0].teams, "B → A");
        assert_eq!(document.vps[0].name, "Dana");
        assert_eq!(document.recent[0].issue_key, "DEF-A");
    }

    #[test]
    fn markdown_report_lists_sections() {
        let now = at("2025-03-07T18:00:00").unwrap();
        let document =
            build_metrics_document(&DashboardView::default(), &snapshot(), &settings(), now);
        let report = build_report(&document);

        assert!(report.starts_with("# Defect Metrics Report"));
        assert!(report.contains("- Resolved: 1 (50% resolution rate)"));
        assert!(report.contains("- A (VP Dana): efficiency 100%"));
        assert!(report.contains("- Mar 07: 1 created, 1 resolved, 1 critical"));
        assert!(report.contains("- B → A: 1"));

        assert!(report.contains("## Status\n- Open: 1\n- In Progress: 0\n- Resolved: 0\n- Closed: 1"));
        assert!(report.contains("## Issue Type\nNo defects recorded for this scope."));
        assert!(report.contains("## Team Performance\n- A: 100% resolved (1 of 1, 1 critical)\n- B: 0% resolved (0 of 1, 0 critical)"));
        assert!(report.contains("## Workload\n- A: 1 assigned, 0 requested, 1 resolved\n- B: 1 assigned, 1 requested, 0 resolved"));
    }

    #[test]
    fn empty_snapshot_still_renders() {
        let now = at("2025-03-07T18:00:00").unwrap();
        let document = build_metrics_document(
            &DashboardView::default(),
            &Snapshot::default(),
            &settings(),
            now,
        );
        let report = build_report(&document);

        assert!(report.contains("No teams configured."));
        assert!(report.contains("## Status\nNo defects recorded for this scope."));
        assert!(report.contains("No team owns a defect in this scope."));
        assert!(report.contains("No cross-team requests in this scope."));
        assert_eq!(document.trend.len(), 7);
    }
}
