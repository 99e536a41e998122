use chrono::{Duration, NaiveDateTime};
use clap::ValueEnum;

use crate::metrics;
use crate::models::{DateRange, Defect, Priority, Severity, Status, Validation};

/// Relative look-back used when no explicit date range is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum TimeWindow {
    #[default]
    #[value(name = "all")]
    All,
    #[value(name = "7d")]
    Last7Days,
    #[value(name = "30d")]
    Last30Days,
    #[value(name = "90d")]
    Last90Days,
}

impl TimeWindow {
    pub fn days(&self) -> Option<i64> {
        match self {
            TimeWindow::All => None,
            TimeWindow::Last7Days => Some(7),
            TimeWindow::Last30Days => Some(30),
            TimeWindow::Last90Days => Some(90),
        }
    }
}

/// Filters shared by every summary rendered for one invocation.
#[derive(Debug, Clone, Default)]
pub struct DashboardView {
    pub date_range: DateRange,
    pub window: TimeWindow,
    pub application: Option<String>,
}

impl DashboardView {
    /// Date range first, then application, then the relative window (only
    /// when the date range is inactive).
    pub fn apply(&self, defects: &[Defect], now: NaiveDateTime) -> Vec<Defect> {
        let mut scoped = metrics::filter_by_date_range(defects, Some(&self.date_range));

        if let Some(application) = self.application.as_deref() {
            scoped.retain(|d| d.affected_application.as_deref() == Some(application));
        }

        if !self.date_range.is_active() {
            if let Some(days) = self.window.days() {
                let cutoff = now - Duration::days(days);
                scoped.retain(|d| d.created_date.is_some_and(|created| created >= cutoff));
            }
        }

        scoped
    }

    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        match (self.date_range.from, self.date_range.to) {
            (Some(from), Some(to)) => parts.push(format!("{from} to {to}")),
            (Some(from), None) => parts.push(format!("{from}")),
            _ => match self.window.days() {
                Some(days) => parts.push(format!("last {days} days")),
                None => parts.push("all time".to_string()),
            },
        }
        if let Some(application) = &self.application {
            parts.push(format!("application {application}"));
        }
        parts.join(", ")
    }
}

/// Record-level search over the defect list; `None` criteria match everything.
#[derive(Debug, Clone, Default)]
pub struct DefectQuery {
    pub search: Option<String>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub team: Option<String>,
    pub project: Option<String>,
    pub severity: Option<Severity>,
    pub validation: Option<Validation>,
}

impl DefectQuery {
    pub fn matches(&self, defect: &Defect) -> bool {
        let search_hit = match self.search.as_deref().map(str::to_lowercase) {
            None => true,
            Some(term) => [
                Some(defect.summary.as_str()),
                defect.description.as_deref(),
                Some(defect.issue_key.as_str()),
            ]
            .into_iter()
            .flatten()
            .any(|text| text.to_lowercase().contains(&term)),
        };

        search_hit
            && criterion(self.status, defect.status)
            && criterion(self.priority, defect.priority)
            && criterion(self.severity, defect.severity)
            && criterion(self.validation, defect.validation)
            && criterion(self.team.as_deref(), defect.assigned_team.as_deref())
            && criterion(self.project.as_deref(), defect.project_name.as_deref())
    }

    pub fn apply(&self, defects: &[Defect]) -> Vec<Defect> {
        defects.iter().filter(|d| self.matches(d)).cloned().collect()
    }
}

fn criterion<T: PartialEq>(wanted: Option<T>, actual: Option<T>) -> bool {
    match wanted {
        None => true,
        Some(wanted) => actual == Some(wanted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::tests::{at, defect};
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        at("2025-03-31T12:00:00").unwrap()
    }

    fn dated(created: &str, app: &str) -> Defect {
        let mut d = defect(Priority::High, Status::Open, "Core");
        d.created_date = at(created);
        d.affected_application = Some(app.to_string());
        d
    }

    #[test]
    fn window_applies_only_without_date_range() {
        let defects = vec![
            dated("2025-03-28T09:00:00", "Portal"),
            dated("2025-02-01T09:00:00", "Portal"),
        ];

        let recent = DashboardView {
            window: TimeWindow::Last7Days,
            ..DashboardView::default()
        };
        assert_eq!(recent.apply(&defects, now()).len(), 1);

        let ranged = DashboardView {
            window: TimeWindow::Last7Days,
            date_range: DateRange::new(NaiveDate::from_ymd_opt(2025, 2, 1), None),
            ..DashboardView::default()
        };
        let scoped = ranged.apply(&defects, now());
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].created_date, at("2025-02-01T09:00:00"));
    }

    #[test]
    fn application_filter_is_exact() {
        let defects = vec![
            dated("2025-03-28T09:00:00", "Portal"),
            dated("2025-03-28T09:00:00", "Portal Admin"),
        ];
        let view = DashboardView {
            application: Some("Portal".to_string()),
            ..DashboardView::default()
        };
        assert_eq!(view.apply(&defects, now()).len(), 1);
        assert_eq!(view.describe(), "all time, application Portal");
    }

    #[test]
    fn query_matches_search_and_criteria() {
        let mut login = defect(Priority::Critical, Status::Open, "Core");
        login.issue_key = "AUTH-7".to_string();
        login.description = Some("SSO redirect loops".to_string());
        let other = defect(Priority::Low, Status::Closed, "Payments");
        let defects = vec![login, other];

        let by_text = DefectQuery {
            search: Some("sso".to_string()),
            ..DefectQuery::default()
        };
        assert_eq!(by_text.apply(&defects).len(), 1);

        let by_key = DefectQuery {
            search: Some("auth-7".to_string()),
            priority: Some(Priority::Critical),
            ..DefectQuery::default()
        };
        assert_eq!(by_key.apply(&defects).len(), 1);

        let by_team = DefectQuery {
            team: Some("Payments".to_string()),
            status: Some(Status::Open),
            ..DefectQuery::default()
        };
        assert!(by_team.apply(&defects).is_empty());

        assert_eq!(DefectQuery::default().apply(&defects).len(), 2);
    }
}
