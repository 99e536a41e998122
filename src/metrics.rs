//! Defect aggregation.
//!
//! Every function here is a pure transform over a materialized snapshot: it
//! never mutates its inputs, never fails, and returns owned summaries. Records
//! missing the attribute a metric looks at simply do not contribute.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};

use crate::models::{
    ApplicationBreakdown, CollaborationEdge, DashboardCounts, DateRange, Defect, DefectField,
    DistributionEntry, KpiMetrics, Priority, ProjectInsight, Severity, Status, StatusCounts,
    Team, TeamPerformance, TeamStat, TeamWorkload, TestingMetrics, TrendPoint, Validation,
};

pub const DEFAULT_TREND_DAYS: u32 = 7;
/// Longest trend window; larger requests are clamped.
pub const MAX_TREND_DAYS: u32 = 3650;
pub const DEFAULT_COLLABORATION_LIMIT: usize = 8;
pub const DEFAULT_PROJECT_LIMIT: usize = 6;
pub const DEFAULT_RECENT_LIMIT: usize = 8;

/// Which buckets a distribution reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Buckets {
    /// Exactly these names, in this order; empty buckets report zero.
    Fixed(Vec<String>),
    /// Distinct non-empty values present in the data, in first-seen order.
    Discover,
}

impl Buckets {
    /// The field's own enumeration when it has one, otherwise discovery.
    pub fn for_field(field: DefectField) -> Self {
        field
            .known_buckets()
            .map(Buckets::Fixed)
            .unwrap_or(Buckets::Discover)
    }
}

/// `round(100 * part / whole)`, zero when `whole` is zero.
pub fn percentage(part: usize, whole: usize) -> u32 {
    raw_percentage(part, whole).round() as u32
}

fn raw_percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        (part as f64 / whole as f64) * 100.0
    }
}

fn count_where<'a, I, F>(defects: I, predicate: F) -> usize
where
    I: IntoIterator<Item = &'a Defect>,
    F: Fn(&Defect) -> bool,
{
    defects.into_iter().filter(|&defect| predicate(defect)).count()
}

/// Defects whose non-empty `field` equals `value`.
fn with_value<'a>(defects: &'a [Defect], field: DefectField, value: &str) -> Vec<&'a Defect> {
    defects
        .iter()
        .filter(|d| d.field_value(field) == Some(value))
        .collect()
}

/// Sums `(key, count)` pairs keeping first-seen order, ready for a stable sort.
fn tally<'a, I>(keys: I) -> Vec<(String, usize)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut positions: HashMap<&'a str, usize> = HashMap::new();
    let mut counts: Vec<(String, usize)> = Vec::new();

    for key in keys {
        match positions.get(key) {
            Some(&index) => counts[index].1 += 1,
            None => {
                positions.insert(key, counts.len());
                counts.push((key.to_string(), 1));
            }
        }
    }

    counts
}

fn distinct_values(defects: &[Defect], field: DefectField) -> Vec<&str> {
    let mut seen: Vec<&str> = Vec::new();
    for value in defects.iter().filter_map(|d| d.field_value(field)) {
        if !seen.contains(&value) {
            seen.push(value);
        }
    }
    seen
}

pub fn filter_by_date_range(defects: &[Defect], range: Option<&DateRange>) -> Vec<Defect> {
    let Some((start, end)) = range.and_then(DateRange::bounds) else {
        return defects.to_vec();
    };

    defects
        .iter()
        .filter(|defect| {
            defect
                .created_date
                .is_some_and(|created| created >= start && created <= end)
        })
        .cloned()
        .collect()
}

pub fn kpi_summary(defects: &[Defect]) -> KpiMetrics {
    let total = defects.len();
    let resolved = count_where(defects, Defect::is_resolved);
    let validation_pass = count_where(defects, |d| d.validation == Some(Validation::Pass));
    let validation_total = count_where(defects, |d| d.validation.is_some());

    KpiMetrics {
        total,
        critical: count_where(defects, Defect::is_critical),
        resolved,
        in_progress: count_where(defects, |d| d.status == Some(Status::InProgress)),
        blockers: count_where(defects, |d| d.severity == Some(Severity::Blocker)),
        resolution_rate: percentage(resolved, total),
        validation_pass_rate: percentage(validation_pass, validation_total),
    }
}

pub fn distribution_by(
    defects: &[Defect],
    field: DefectField,
    buckets: &Buckets,
) -> Vec<DistributionEntry> {
    let counts = tally(defects.iter().filter_map(|d| d.field_value(field)));

    match buckets {
        Buckets::Discover => counts
            .into_iter()
            .map(|(name, value)| DistributionEntry { name, value })
            .collect(),
        Buckets::Fixed(names) => names
            .iter()
            .map(|name| DistributionEntry {
                name: name.clone(),
                value: counts
                    .iter()
                    .find(|(key, _)| key == name)
                    .map_or(0, |(_, count)| *count),
            })
            .collect(),
    }
}

fn team_stat(defects: &[Defect], team: &Team) -> TeamStat {
    let assigned = with_value(defects, DefectField::AssignedTeam, &team.name);
    let requested = with_value(defects, DefectField::RequestingTeam, &team.name).len();
    let count = |predicate: fn(&Defect) -> bool| count_where(assigned.iter().copied(), predicate);

    let total = assigned.len();
    let closed = count(Defect::is_resolved);
    let pass = count(|d| d.validation == Some(Validation::Pass));
    let fail = count(|d| d.validation == Some(Validation::Fail));
    let blocked = count(|d| d.validation == Some(Validation::Blocked));

    let resolution = raw_percentage(closed, total);
    let validation = raw_percentage(pass, pass + fail + blocked);

    TeamStat {
        name: team.name.clone(),
        vp: team.vp.clone(),
        lead: team.lead.clone(),
        member_count: team.members.len(),
        total_defects: total,
        requested_defects: requested,
        closed_defects: closed,
        in_progress_defects: count(|d| d.status == Some(Status::InProgress)),
        critical_defects: count(Defect::is_critical),
        validation_pass: pass,
        validation_fail: fail,
        blocked_defects: blocked,
        resolution_rate: resolution.round() as u32,
        validation_success_rate: validation.round() as u32,
        efficiency_score: ((resolution + validation) / 2.0).round() as u32,
    }
}

/// Per-team statistics ranked by efficiency score; ties keep team order.
pub fn team_rollup(defects: &[Defect], teams: &[Team]) -> Vec<TeamStat> {
    let mut stats: Vec<TeamStat> = teams.iter().map(|team| team_stat(defects, team)).collect();
    stats.sort_by(|a, b| b.efficiency_score.cmp(&a.efficiency_score));
    stats
}

/// Teams that own at least one defect, ranked by resolution rate.
pub fn team_performance(defects: &[Defect], teams: &[Team]) -> Vec<TeamPerformance> {
    let mut rows: Vec<TeamPerformance> = teams
        .iter()
        .map(|team| team_stat(defects, team))
        .filter(|stat| stat.total_defects > 0)
        .map(|stat| TeamPerformance {
            name: stat.name,
            vp: stat.vp,
            total: stat.total_defects,
            resolved: stat.closed_defects,
            critical: stat.critical_defects,
            resolution_rate: stat.resolution_rate,
        })
        .collect();
    rows.sort_by(|a, b| b.resolution_rate.cmp(&a.resolution_rate));
    rows
}

pub fn team_workload(defects: &[Defect], teams: &[Team]) -> Vec<TeamWorkload> {
    let mut rows: Vec<TeamWorkload> = teams
        .iter()
        .map(|team| {
            let stat = team_stat(defects, team);
            TeamWorkload {
                name: stat.name,
                assigned: stat.total_defects,
                requested: stat.requested_defects,
                resolved: stat.closed_defects,
            }
        })
        .collect();
    rows.sort_by(|a, b| b.assigned.cmp(&a.assigned));
    rows
}

pub fn vp_rollup(defects: &[Defect], teams: &[Team]) -> Vec<DistributionEntry> {
    let team_to_vp: HashMap<&str, &str> = teams
        .iter()
        .filter(|team| !team.name.is_empty())
        .filter_map(|team| {
            team.vp
                .as_deref()
                .filter(|vp| !vp.is_empty())
                .map(|vp| (team.name.as_str(), vp))
        })
        .collect();

    let mut rows: Vec<DistributionEntry> = tally(
        defects
            .iter()
            .filter_map(|d| d.field_value(DefectField::AssignedTeam))
            .filter_map(|team| team_to_vp.get(team).copied()),
    )
    .into_iter()
    .map(|(name, value)| DistributionEntry { name, value })
    .collect();

    rows.sort_by(|a, b| b.value.cmp(&a.value));
    rows
}

/// One bucket per calendar day for the `window_days` days ending on `today`,
/// oldest first. The window is clamped to `MAX_TREND_DAYS` and stops early at
/// the start of the calendar.
pub fn daily_trend(defects: &[Defect], window_days: u32, today: NaiveDate) -> Vec<TrendPoint> {
    let window = i64::from(window_days.min(MAX_TREND_DAYS));
    let mut points: Vec<TrendPoint> = (0..window)
        .map_while(|offset| today.checked_sub_signed(Duration::days(offset)))
        .map(|date| {
            let day: Vec<&Defect> = defects
                .iter()
                .filter(|d| d.created_date.is_some_and(|created| created.date() == date))
                .collect();

            TrendPoint {
                date,
                created: day.len(),
                resolved: day.iter().filter(|d| d.is_resolved()).count(),
                critical: day.iter().filter(|d| d.is_critical()).count(),
            }
        })
        .collect();

    points.reverse();
    points
}

pub fn collaboration_edges(defects: &[Defect], limit: usize) -> Vec<CollaborationEdge> {
    let keys: Vec<String> = defects
        .iter()
        .filter_map(|defect| {
            let requester = defect.field_value(DefectField::RequestingTeam)?;
            let assignee = defect.field_value(DefectField::AssignedTeam)?;
            (requester != assignee).then(|| format!("{requester} → {assignee}"))
        })
        .collect();

    let mut edges: Vec<CollaborationEdge> = tally(keys.iter().map(String::as_str))
        .into_iter()
        .map(|(teams, count)| CollaborationEdge { teams, count })
        .collect();

    edges.sort_by(|a, b| b.count.cmp(&a.count));
    edges.truncate(limit);
    edges
}

pub fn dashboard_counts(defects: &[Defect]) -> DashboardCounts {
    DashboardCounts {
        total: defects.len(),
        open: count_where(defects, |d| d.status.is_some_and(|s| s.is_active())),
        closed: count_where(defects, |d| d.status == Some(Status::Closed)),
        critical: count_where(defects, Defect::is_critical),
        recurring: count_where(defects, |d| d.is_recurring),
    }
}

pub fn status_counts(defects: &[Defect]) -> StatusCounts {
    let with_status = |status: Status| count_where(defects, |d| d.status == Some(status));

    StatusCounts {
        all: defects.len(),
        open: with_status(Status::Open),
        in_progress: with_status(Status::InProgress),
        resolved: with_status(Status::Resolved),
        closed: with_status(Status::Closed),
        reopened: with_status(Status::Reopened),
    }
}

pub fn application_breakdown(defects: &[Defect]) -> Vec<ApplicationBreakdown> {
    let mut rows: Vec<ApplicationBreakdown> =
        distinct_values(defects, DefectField::AffectedApplication)
            .into_iter()
            .map(|app| {
                let scoped = with_value(defects, DefectField::AffectedApplication, app);
                ApplicationBreakdown {
                    name: app.to_string(),
                    total: scoped.len(),
                    critical: count_where(scoped.iter().copied(), Defect::is_critical),
                    resolved: count_where(scoped.iter().copied(), Defect::is_resolved),
                }
            })
            .collect();

    rows.sort_by(|a, b| b.total.cmp(&a.total));
    rows
}

pub fn project_insights(defects: &[Defect], limit: usize) -> Vec<ProjectInsight> {
    let mut rows: Vec<ProjectInsight> = distinct_values(defects, DefectField::ProjectName)
        .into_iter()
        .map(|project| {
            let scoped = with_value(defects, DefectField::ProjectName, project);
            let first = scoped.first().copied();
            let describe = |value: Option<&String>| {
                value
                    .filter(|v| !v.is_empty())
                    .cloned()
                    .unwrap_or_else(|| "Unknown".to_string())
            };

            ProjectInsight {
                name: project.to_string(),
                project_type: describe(first.and_then(|d| d.project_type.as_ref())),
                lead: describe(first.and_then(|d| d.project_lead.as_ref())),
                total: scoped.len(),
                critical: count_where(scoped.iter().copied(), Defect::is_critical),
                resolved: count_where(scoped.iter().copied(), Defect::is_resolved),
                blocked: count_where(scoped.iter().copied(), |d| {
                    d.validation == Some(Validation::Blocked)
                }),
            }
        })
        .collect();

    rows.sort_by(|a, b| b.total.cmp(&a.total));
    rows.truncate(limit);
    rows
}

pub fn testing_metrics(defects: &[Defect]) -> TestingMetrics {
    TestingMetrics {
        validation: distribution_by(
            defects,
            DefectField::Validation,
            &Buckets::for_field(DefectField::Validation),
        ),
        categories: distribution_by(defects, DefectField::TestCategory, &Buckets::Discover),
    }
}

/// Newest first; defects without a creation date sort last.
pub fn recent_defects(defects: &[Defect], limit: usize) -> Vec<Defect> {
    let mut recent = defects.to_vec();
    recent.sort_by(|a, b| b.created_date.cmp(&a.created_date));
    recent.truncate(limit);
    recent
}

/// Fixed priority buckets, the most common distribution on the dashboard.
pub fn priority_distribution(defects: &[Defect]) -> Vec<DistributionEntry> {
    let buckets = Buckets::Fixed(Priority::ALL.iter().map(ToString::to_string).collect());
    distribution_by(defects, DefectField::Priority, &buckets)
}
