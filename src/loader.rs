use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;

use crate::db;
use crate::models::{Defect, Team};

pub const DEFECTS_FILE: &str = "defects.json";
pub const TEAMS_FILE: &str = "teams.json";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("database query failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Where defect and team listings come from.
pub enum Source {
    Postgres(PgPool),
    /// A directory holding `defects.json` and `teams.json`.
    Files(PathBuf),
}

impl Source {
    pub fn describe(&self) -> String {
        match self {
            Source::Postgres(_) => "postgres".to_string(),
            Source::Files(dir) => dir.display().to_string(),
        }
    }
}

/// A complete pair of listings; both are always loaded together.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub defects: Vec<Defect>,
    pub teams: Vec<Team>,
}

impl Snapshot {
    pub async fn fetch(source: &Source) -> Result<Self, LoadError> {
        let (defects, teams) = match source {
            Source::Postgres(pool) => {
                tokio::try_join!(db::fetch_defects(pool), db::fetch_teams(pool))?
            }
            Source::Files(dir) => tokio::try_join!(
                read_json::<Vec<Defect>>(dir.join(DEFECTS_FILE)),
                read_json::<Vec<Team>>(dir.join(TEAMS_FILE))
            )?,
        };

        Ok(Self { defects, teams })
    }

    /// Replaces the snapshot with fresh listings. On failure the error is
    /// logged and the current contents are kept.
    pub async fn refresh(&mut self, source: &Source) -> bool {
        match Self::fetch(source).await {
            Ok(fresh) => {
                tracing::info!(
                    source = %source.describe(),
                    defects = fresh.defects.len(),
                    teams = fresh.teams.len(),
                    "loaded snapshot"
                );
                *self = fresh;
                true
            }
            Err(error) => {
                tracing::error!(
                    source = %source.describe(),
                    %error,
                    "failed to load snapshot, keeping previous data"
                );
                false
            }
        }
    }

    pub async fn write_to(&self, dir: &Path) -> Result<(), LoadError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| LoadError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        tokio::try_join!(
            write_json(dir.join(DEFECTS_FILE), &self.defects),
            write_json(dir.join(TEAMS_FILE), &self.teams)
        )?;
        Ok(())
    }
}

async fn read_json<T: DeserializeOwned>(path: PathBuf) -> Result<T, LoadError> {
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(source) => return Err(LoadError::Io { path, source }),
    };
    serde_json::from_slice(&bytes).map_err(|source| LoadError::Json { path, source })
}

async fn write_json<T: Serialize>(path: PathBuf, value: &T) -> Result<(), LoadError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| LoadError::Json {
        path: path.clone(),
        source,
    })?;
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|source| LoadError::Io { path, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Priority, Status};

    const DEFECTS: &str = r#"[
        {"id": "d1", "issue_key": "PAY-1", "summary": "Refund rounding", "priority": "High",
         "status": "Closed", "assigned_team": "Payments", "created_date": "2025-03-01T10:00:00"},
        {"id": "d2", "issue_key": "CORE-9", "summary": "Cache stampede", "priority": "critical",
         "status": "in_progress", "assigned_team": "Core"}
    ]"#;

    const TEAMS: &str = r#"[
        {"id": "t1", "name": "Payments", "vp": "Riley", "members": ["Sam", "Lee"]},
        {"id": "t2", "name": "Core"}
    ]"#;

    fn write_fixture(dir: &Path) {
        std::fs::write(dir.join(DEFECTS_FILE), DEFECTS).unwrap();
        std::fs::write(dir.join(TEAMS_FILE), TEAMS).unwrap();
    }

    #[tokio::test]
    async fn loads_snapshot_from_files() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());

        let snapshot = Snapshot::fetch(&Source::Files(dir.path().to_path_buf()))
            .await
            .unwrap();
        assert_eq!(snapshot.defects.len(), 2);
        assert_eq!(snapshot.teams.len(), 2);
        assert_eq!(snapshot.defects[1].priority, Some(Priority::Critical));
        assert_eq!(snapshot.defects[1].status, Some(Status::InProgress));
        assert_eq!(snapshot.teams[0].members, vec!["Sam", "Lee"]);
    }

    #[tokio::test]
    async fn nulls_in_snapshot_do_not_block_loading() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(DEFECTS_FILE),
            r#"[
                {"issue_key": "PAY-3", "summary": null, "tags": null, "labels": null,
                 "is_recurring": null, "status": null, "assigned_team": "Payments"},
                {"issue_key": "PAY-4", "summary": "Duplicate charge", "status": "Open"}
            ]"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join(TEAMS_FILE),
            r#"[{"id": null, "name": "Payments", "members": null, "focus_areas": null}]"#,
        )
        .unwrap();

        let mut snapshot = Snapshot::default();
        assert!(snapshot.refresh(&Source::Files(dir.path().to_path_buf())).await);
        assert_eq!(snapshot.defects.len(), 2);
        assert!(snapshot.defects[0].tags.is_empty());
        assert_eq!(snapshot.defects[0].status, None);
        assert_eq!(snapshot.defects[1].status, Some(Status::Open));
        assert!(snapshot.teams[0].members.is_empty());
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        let mut snapshot = Snapshot::default();
        assert!(snapshot.refresh(&Source::Files(dir.path().to_path_buf())).await);

        std::fs::remove_file(dir.path().join(TEAMS_FILE)).unwrap();
        assert!(!snapshot.refresh(&Source::Files(dir.path().to_path_buf())).await);
        assert_eq!(snapshot.defects.len(), 2);
        assert_eq!(snapshot.teams.len(), 2);
    }

    #[tokio::test]
    async fn malformed_json_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DEFECTS_FILE), "{ not json").unwrap();
        std::fs::write(dir.path().join(TEAMS_FILE), TEAMS).unwrap();

        let error = Snapshot::fetch(&Source::Files(dir.path().to_path_buf()))
            .await
            .unwrap_err();
        assert!(matches!(error, LoadError::Json { .. }));
    }

    #[tokio::test]
    async fn written_snapshot_reloads() {
        let source = tempfile::tempdir().unwrap();
        write_fixture(source.path());
        let snapshot = Snapshot::fetch(&Source::Files(source.path().to_path_buf()))
            .await
            .unwrap();

        let target = tempfile::tempdir().unwrap();
        let out = target.path().join("export");
        snapshot.write_to(&out).await.unwrap();

        let reloaded = Snapshot::fetch(&Source::Files(out)).await.unwrap();
        assert_eq!(reloaded.defects[0].created_date, snapshot.defects[0].created_date);
        assert_eq!(reloaded.teams[0].vp.as_deref(), Some("Riley"));
    }
}
