use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognised {field} value {value:?}")]
pub struct FieldParseError {
    pub field: &'static str,
    pub value: String,
}

/// Lowercases and folds `_`/`-` to spaces so `in_progress` matches `In Progress`.
fn normalize_label(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|c| match c {
            '_' | '-' => ' ',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

macro_rules! labelled_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = FieldParseError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let wanted = normalize_label(value);
                $name::ALL
                    .iter()
                    .copied()
                    .find(|candidate| normalize_label(candidate.as_str()) == wanted)
                    .ok_or_else(|| FieldParseError {
                        field: stringify!($name),
                        value: value.to_string(),
                    })
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }
    };
}

labelled_enum!(IssueType {
    Bug => "Bug",
    Story => "Story",
    Task => "Task",
    Epic => "Epic",
});

labelled_enum!(Priority {
    Critical => "Critical",
    High => "High",
    Medium => "Medium",
    Low => "Low",
});

labelled_enum!(Severity {
    Blocker => "Blocker",
    Critical => "Critical",
    Major => "Major",
    Minor => "Minor",
});

labelled_enum!(
    /// Workflow state of a defect as reported by the tracker.
    Status {
        Open => "Open",
        InProgress => "In Progress",
        Resolved => "Resolved",
        Closed => "Closed",
        Reopened => "Reopened",
    }
);

labelled_enum!(
    /// Outcome of test validation; absent when the defect was never validated.
    Validation {
        Pass => "Pass",
        Fail => "Fail",
        Blocked => "Blocked",
    }
);

impl Status {
    /// Resolved and Closed both count towards resolution.
    pub fn is_resolved(&self) -> bool {
        matches!(self, Status::Resolved | Status::Closed)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Status::Open | Status::InProgress | Status::Reopened)
    }
}

/// Parses an optional raw label, treating anything unrecognised as absent.
pub fn parse_label<T: FromStr>(raw: Option<&str>) -> Option<T> {
    raw.and_then(|value| value.parse().ok())
}

/// Accepts naive ISO-8601, RFC 3339 with an offset (converted to local wall
/// clock time) or a bare date at midnight.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(value) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(value);
    }
    if let Ok(value) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(value);
    }
    if let Ok(value) = DateTime::parse_from_rfc3339(raw) {
        return Some(value.with_timezone(&Local).naive_local());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

fn lenient_label<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(parse_label(raw.as_deref()))
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

/// Present-but-null collapses to the field's default, like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Defect {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub issue_key: String,
    #[serde(deserialize_with = "null_as_default")]
    pub summary: String,
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient_label")]
    pub issue_type: Option<IssueType>,
    #[serde(deserialize_with = "lenient_label")]
    pub priority: Option<Priority>,
    #[serde(deserialize_with = "lenient_label")]
    pub severity: Option<Severity>,
    #[serde(deserialize_with = "lenient_label")]
    pub status: Option<Status>,
    #[serde(deserialize_with = "lenient_label")]
    pub validation: Option<Validation>,
    pub assigned_team: Option<String>,
    pub requesting_team: Option<String>,
    pub affected_application: Option<String>,
    pub project_name: Option<String>,
    pub project_key: Option<String>,
    pub project_type: Option<String>,
    pub project_lead: Option<String>,
    pub assignee: Option<String>,
    pub reporter: Option<String>,
    pub creator: Option<String>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub created_date: Option<NaiveDateTime>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub updated_date: Option<NaiveDateTime>,
    pub test_category: Option<String>,
    pub test_levels: Option<String>,
    pub test_type: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub labels: BTreeSet<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub is_recurring: bool,
}

impl Defect {
    pub fn is_resolved(&self) -> bool {
        self.status.is_some_and(|status| status.is_resolved())
    }

    pub fn is_critical(&self) -> bool {
        self.priority == Some(Priority::Critical)
    }

    /// The value this defect carries for `field`; empty strings count as absent.
    pub fn field_value(&self, field: DefectField) -> Option<&str> {
        let value: Option<&str> = match field {
            DefectField::IssueType => self.issue_type.map(|v| v.as_str()),
            DefectField::Priority => self.priority.map(|v| v.as_str()),
            DefectField::Severity => self.severity.map(|v| v.as_str()),
            DefectField::Status => self.status.map(|v| v.as_str()),
            DefectField::Validation => self.validation.map(|v| v.as_str()),
            DefectField::AssignedTeam => self.assigned_team.as_deref(),
            DefectField::RequestingTeam => self.requesting_team.as_deref(),
            DefectField::AffectedApplication => self.affected_application.as_deref(),
            DefectField::ProjectName => self.project_name.as_deref(),
            DefectField::TestCategory => self.test_category.as_deref(),
            DefectField::TestType => self.test_type.as_deref(),
        };
        value.filter(|v| !v.is_empty())
    }
}

/// Defect attributes that distributions can be computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DefectField {
    IssueType,
    Priority,
    Severity,
    Status,
    Validation,
    AssignedTeam,
    RequestingTeam,
    AffectedApplication,
    ProjectName,
    TestCategory,
    TestType,
}

impl DefectField {
    /// The fixed bucket enumeration for enumerated fields, `None` for free text.
    pub fn known_buckets(&self) -> Option<Vec<String>> {
        fn labels<T: fmt::Display>(all: &[T]) -> Option<Vec<String>> {
            Some(all.iter().map(ToString::to_string).collect())
        }

        match self {
            DefectField::IssueType => labels(IssueType::ALL),
            DefectField::Priority => labels(Priority::ALL),
            DefectField::Severity => labels(Severity::ALL),
            DefectField::Status => labels(Status::ALL),
            DefectField::Validation => labels(Validation::ALL),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Team {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    pub lead: Option<String>,
    pub vp: Option<String>,
    pub color: Option<String>,
    pub description: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub members: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub focus_areas: Vec<String>,
}

/// Calendar-date range; without `from` it covers every record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }

    pub fn is_active(&self) -> bool {
        self.from.is_some()
    }

    /// Start of `from` through the last millisecond of `to` (or of `from`).
    pub fn bounds(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let from = self.from?;
        let end_day = self.to.unwrap_or(from);
        let start = from.and_hms_opt(0, 0, 0)?;
        let end = end_day.and_time(NaiveTime::from_hms_milli_opt(23, 59, 59, 999)?);
        Some((start, end))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KpiMetrics {
    pub total: usize,
    pub critical: usize,
    pub resolved: usize,
    pub in_progress: usize,
    pub blockers: usize,
    pub resolution_rate: u32,
    pub validation_pass_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistributionEntry {
    pub name: String,
    pub value: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamStat {
    pub name: String,
    pub vp: Option<String>,
    pub lead: Option<String>,
    pub member_count: usize,
    pub total_defects: usize,
    pub requested_defects: usize,
    pub closed_defects: usize,
    pub in_progress_defects: usize,
    pub critical_defects: usize,
    pub validation_pass: usize,
    pub validation_fail: usize,
    pub blocked_defects: usize,
    pub resolution_rate: u32,
    pub validation_success_rate: u32,
    pub efficiency_score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamPerformance {
    pub name: String,
    pub vp: Option<String>,
    pub total: usize,
    pub resolved: usize,
    pub critical: usize,
    pub resolution_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamWorkload {
    pub name: String,
    pub assigned: usize,
    pub requested: usize,
    pub resolved: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub created: usize,
    pub resolved: usize,
    pub critical: usize,
}

impl TrendPoint {
    /// Short chart label such as `Mar 04`.
    pub fn label(&self) -> String {
        self.date.format("%b %d").to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollaborationEdge {
    pub teams: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DashboardCounts {
    pub total: usize,
    pub open: usize,
    pub closed: usize,
    pub critical: usize,
    pub recurring: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub all: usize,
    pub open: usize,
    pub in_progress: usize,
    pub resolved: usize,
    pub closed: usize,
    pub reopened: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationBreakdown {
    pub name: String,
    pub total: usize,
    pub critical: usize,
    pub resolved: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectInsight {
    pub name: String,
    pub project_type: String,
    pub lead: String,
    pub total: usize,
    pub critical: usize,
    pub resolved: usize,
    pub blocked: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestingMetrics {
    pub validation: Vec<DistributionEntry>,
    pub categories: Vec<DistributionEntry>,
}
