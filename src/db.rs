use std::collections::BTreeSet;

use chrono::{Duration, Local, NaiveDateTime};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{
    parse_label, parse_timestamp, Defect, IssueType, Priority, Severity, Status, Team, Validation,
};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<usize> {
    let teams = vec![
        (
            "Payments",
            "Priya Raman",
            Some("Jordan Ellis"),
            "#e20074",
            vec!["Priya Raman", "Tomas Weber", "Ana Costa", "Kenji Mori"],
            vec!["Checkout", "Refunds"],
        ),
        (
            "Core Platform",
            "Malik Osei",
            Some("Jordan Ellis"),
            "#3b82f6",
            vec!["Malik Osei", "Ivy Chen"],
            vec!["Caching", "Identity"],
        ),
        (
            "Mobile",
            "Sofia Lindqvist",
            Some("Casey Park"),
            "#10b981",
            vec!["Sofia Lindqvist", "Diego Ruiz", "Hana Sato"],
            vec!["iOS", "Android"],
        ),
        (
            "QA Automation",
            "Noah Brandt",
            None,
            "#f59e0b",
            vec!["Noah Brandt"],
            vec!["Regression", "Release gates"],
        ),
    ];

    for (name, lead, vp, color, members, focus_areas) in teams {
        sqlx::query(
            r#"
            INSERT INTO defect_dashboard.teams (id, name, lead, vp, color, members, focus_areas)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (name) DO UPDATE
            SET lead = EXCLUDED.lead, vp = EXCLUDED.vp, color = EXCLUDED.color,
                members = EXCLUDED.members, focus_areas = EXCLUDED.focus_areas
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(lead)
        .bind(vp)
        .bind(color)
        .bind(members.into_iter().map(str::to_string).collect::<Vec<_>>())
        .bind(focus_areas.into_iter().map(str::to_string).collect::<Vec<_>>())
        .execute(pool)
        .await?;
    }

    let now = Local::now().naive_local();
    let defects = vec![
        (
            "PAY-101",
            "Refund total off by one cent",
            Priority::High,
            Severity::Major,
            Status::Resolved,
            Some(Validation::Pass),
            "Payments",
            "Mobile",
            "Checkout",
            1,
        ),
        (
            "PAY-102",
            "Card form rejects valid Amex numbers",
            Priority::Critical,
            Severity::Blocker,
            Status::InProgress,
            None,
            "Payments",
            "Payments",
            "Checkout",
            0,
        ),
        (
            "CORE-88",
            "Session cache evicts active tokens",
            Priority::Critical,
            Severity::Critical,
            Status::Open,
            Some(Validation::Fail),
            "Core Platform",
            "Payments",
            "Identity",
            2,
        ),
        (
            "CORE-91",
            "Config reload drops feature flags",
            Priority::Medium,
            Severity::Major,
            Status::Closed,
            Some(Validation::Pass),
            "Core Platform",
            "QA Automation",
            "Admin Console",
            5,
        ),
        (
            "MOB-17",
            "Push notifications duplicated on Android 14",
            Priority::Medium,
            Severity::Minor,
            Status::Reopened,
            Some(Validation::Blocked),
            "Mobile",
            "QA Automation",
            "Mobile App",
            3,
        ),
        (
            "MOB-23",
            "Dark mode contrast on receipts",
            Priority::Low,
            Severity::Minor,
            Status::Open,
            None,
            "Mobile",
            "Payments",
            "Mobile App",
            12,
        ),
    ];

    let mut inserted = 0usize;
    for (
        issue_key,
        summary,
        priority,
        severity,
        status,
        validation,
        assigned_team,
        requesting_team,
        application,
        days_ago,
    ) in defects
    {
        let defect = Defect {
            issue_key: issue_key.to_string(),
            summary: summary.to_string(),
            issue_type: Some(IssueType::Bug),
            priority: Some(priority),
            severity: Some(severity),
            status: Some(status),
            validation,
            assigned_team: Some(assigned_team.to_string()),
            requesting_team: Some(requesting_team.to_string()),
            affected_application: Some(application.to_string()),
            project_name: Some("Q3 Reliability".to_string()),
            project_key: Some("REL".to_string()),
            created_date: Some(now - Duration::days(days_ago)),
            updated_date: Some(now),
            is_recurring: issue_key == "MOB-17",
            ..Defect::default()
        };

        if insert_defect(pool, &defect).await? {
            inserted += 1;
        }
    }

    Ok(inserted)
}

/// Inserts a defect unless its issue key already exists.
async fn insert_defect(pool: &PgPool, defect: &Defect) -> Result<bool, sqlx::Error> {
    let id = Uuid::parse_str(&defect.id).unwrap_or_else(|_| Uuid::new_v4());
    let labels: Vec<String> = defect.labels.iter().cloned().collect();

    let result = sqlx::query(
        r#"
        INSERT INTO defect_dashboard.defects
        (id, issue_key, summary, description, issue_type, priority, severity, status,
         validation, assigned_team, requesting_team, affected_application, project_name,
         project_key, project_type, project_lead, assignee, reporter, creator,
         created_date, updated_date, test_category, test_levels, test_type, labels, tags,
         is_recurring)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                $18, $19, $20, $21, $22, $23, $24, $25, $26, $27)
        ON CONFLICT (issue_key) DO NOTHING
        "#,
    )
    .bind(id)
    .bind(&defect.issue_key)
    .bind(&defect.summary)
    .bind(&defect.description)
    .bind(defect.issue_type.map(|v| v.as_str()))
    .bind(defect.priority.map(|v| v.as_str()))
    .bind(defect.severity.map(|v| v.as_str()))
    .bind(defect.status.map(|v| v.as_str()))
    .bind(defect.validation.map(|v| v.as_str()))
    .bind(&defect.assigned_team)
    .bind(&defect.requesting_team)
    .bind(&defect.affected_application)
    .bind(&defect.project_name)
    .bind(&defect.project_key)
    .bind(&defect.project_type)
    .bind(&defect.project_lead)
    .bind(&defect.assignee)
    .bind(&defect.reporter)
    .bind(&defect.creator)
    .bind(defect.created_date)
    .bind(defect.updated_date)
    .bind(&defect.test_category)
    .bind(&defect.test_levels)
    .bind(&defect.test_type)
    .bind(labels)
    .bind(&defect.tags)
    .bind(defect.is_recurring)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// All defects, newest first; undated records last.
pub async fn fetch_defects(pool: &PgPool) -> Result<Vec<Defect>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id::text AS id, issue_key, summary, description, issue_type, priority, \
         severity, status, validation, assigned_team, requesting_team, affected_application, \
         project_name, project_key, project_type, project_lead, assignee, reporter, creator, \
         created_date, updated_date, test_category, test_levels, test_type, labels, tags, \
         is_recurring \
         FROM defect_dashboard.defects \
         ORDER BY created_date DESC NULLS LAST",
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(defect_from_row).collect()
}

fn defect_from_row(row: &PgRow) -> Result<Defect, sqlx::Error> {
    let label = |column: &str| -> Result<Option<String>, sqlx::Error> { row.try_get(column) };
    let labels: Vec<String> = row.try_get("labels")?;

    Ok(Defect {
        id: row.try_get("id")?,
        issue_key: row.try_get("issue_key")?,
        summary: row.try_get("summary")?,
        description: row.try_get("description")?,
        issue_type: parse_label::<IssueType>(label("issue_type")?.as_deref()),
        priority: parse_label::<Priority>(label("priority")?.as_deref()),
        severity: parse_label::<Severity>(label("severity")?.as_deref()),
        status: parse_label::<Status>(label("status")?.as_deref()),
        validation: parse_label::<Validation>(label("validation")?.as_deref()),
        assigned_team: row.try_get("assigned_team")?,
        requesting_team: row.try_get("requesting_team")?,
        affected_application: row.try_get("affected_application")?,
        project_name: row.try_get("project_name")?,
        project_key: row.try_get("project_key")?,
        project_type: row.try_get("project_type")?,
        project_lead: row.try_get("project_lead")?,
        assignee: row.try_get("assignee")?,
        reporter: row.try_get("reporter")?,
        creator: row.try_get("creator")?,
        created_date: row.try_get::<Option<NaiveDateTime>, _>("created_date")?,
        updated_date: row.try_get::<Option<NaiveDateTime>, _>("updated_date")?,
        test_category: row.try_get("test_category")?,
        test_levels: row.try_get("test_levels")?,
        test_type: row.try_get("test_type")?,
        labels: labels.into_iter().collect::<BTreeSet<_>>(),
        tags: row.try_get("tags")?,
        is_recurring: row.try_get("is_recurring")?,
    })
}

pub async fn fetch_teams(pool: &PgPool) -> Result<Vec<Team>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id::text AS id, name, lead, vp, color, description, members, focus_areas \
         FROM defect_dashboard.teams \
         ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    let mut teams = Vec::with_capacity(rows.len());
    for row in rows {
        teams.push(Team {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            lead: row.try_get("lead")?,
            vp: row.try_get("vp")?,
            color: row.try_get("color")?,
            description: row.try_get("description")?,
            members: row.try_get("members")?,
            focus_areas: row.try_get("focus_areas")?,
        });
    }

    Ok(teams)
}

#[derive(Debug, serde::Deserialize)]
struct CsvRow {
    issue_key: String,
    summary: String,
    description: Option<String>,
    issue_type: Option<String>,
    priority: Option<String>,
    severity: Option<String>,
    status: Option<String>,
    validation: Option<String>,
    assigned_team: Option<String>,
    requesting_team: Option<String>,
    affected_application: Option<String>,
    project_name: Option<String>,
    assignee: Option<String>,
    reporter: Option<String>,
    created_date: Option<String>,
    test_category: Option<String>,
    labels: Option<String>,
    is_recurring: Option<bool>,
}

impl CsvRow {
    fn into_defect(self) -> Defect {
        let split = |value: Option<String>| -> Vec<String> {
            value
                .unwrap_or_default()
                .split(';')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect()
        };

        Defect {
            issue_key: self.issue_key,
            summary: self.summary,
            description: self.description,
            issue_type: parse_label(self.issue_type.as_deref()),
            priority: parse_label(self.priority.as_deref()),
            severity: parse_label(self.severity.as_deref()),
            status: parse_label(self.status.as_deref()),
            validation: parse_label(self.validation.as_deref()),
            assigned_team: self.assigned_team,
            requesting_team: self.requesting_team,
            affected_application: self.affected_application,
            project_name: self.project_name,
            assignee: self.assignee,
            reporter: self.reporter,
            created_date: self.created_date.as_deref().and_then(parse_timestamp),
            test_category: self.test_category,
            labels: split(self.labels).into_iter().collect(),
            is_recurring: self.is_recurring.unwrap_or(false),
            ..Defect::default()
        }
    }
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let defect = result?.into_defect();
        if defect.created_date.is_none() {
            tracing::warn!(issue_key = %defect.issue_key, "imported defect has no usable created_date");
        }

        if insert_defect(pool, &defect).await? {
            inserted += 1;
        }
    }

    Ok(inserted)
}
