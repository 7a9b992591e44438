use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDate;
use db::{
    DatabaseConnection, DbErr,
    models::app::{App, AppError, CreateApp, UpdateApp},
    models::release_train::{
        CreateReleaseTrain, ReleaseTrain, TrainError, TrainStatus, TrainWithStats,
    },
    models::stop::{Stop, StopError},
    types::Platform,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::{auth::Principal, template::StopTemplate};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error(transparent)]
    App(#[from] AppError),
    #[error(transparent)]
    Train(#[from] TrainError),
    #[error(transparent)]
    Stop(#[from] StopError),
    #[error("Managing releases requires admin")]
    AdminRequired,
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Best-effort version ordering: non-numeric characters are stripped per
/// `.`-separated segment and the remaining digits compared numerically,
/// left to right, with missing segments reading as 0. Not strict semver —
/// "v1.10.0" sorts above "v1.2.0".
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let a_key = version_key(a);
    let b_key = version_key(b);
    let len = a_key.len().max(b_key.len());
    for i in 0..len {
        let x = a_key.get(i).copied().unwrap_or(0);
        let y = b_key.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

fn version_key(version: &str) -> Vec<u64> {
    version
        .split('.')
        .map(|segment| {
            let digits: String = segment.chars().filter(|c| c.is_ascii_digit()).collect();
            digits.parse().unwrap_or(0)
        })
        .collect()
}

/// One active line per track: the dashboard shows the release that is
/// actually moving, the one that just shipped, and files the rest away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseClassification {
    CurrentActive,
    RecentlyCompleted,
    Archived,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedRelease {
    #[serde(flatten)]
    pub release: TrainWithStats,
    pub classification: ReleaseClassification,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackReleases {
    pub app_id: Uuid,
    pub app_name: String,
    pub platform: Platform,
    pub releases: Vec<ClassifiedRelease>,
}

/// Classify one track's trains, highest version first. The highest-version
/// incomplete train is the current active one; the most recently updated
/// complete train is the recently completed one; soft-deleted and everything
/// else read as archived.
pub fn classify_releases(mut releases: Vec<TrainWithStats>) -> Vec<ClassifiedRelease> {
    releases.sort_by(|a, b| compare_versions(&b.version, &a.version));

    let current_active = releases
        .iter()
        .position(|r| r.is_active && r.status != TrainStatus::Complete);
    let recently_completed = releases
        .iter()
        .enumerate()
        .filter(|(_, r)| r.is_active && r.status == TrainStatus::Complete)
        .max_by_key(|(_, r)| r.updated_at)
        .map(|(index, _)| index);

    releases
        .into_iter()
        .enumerate()
        .map(|(index, release)| {
            let classification = if Some(index) == current_active {
                ReleaseClassification::CurrentActive
            } else if Some(index) == recently_completed {
                ReleaseClassification::RecentlyCompleted
            } else {
                ReleaseClassification::Archived
            };
            ClassifiedRelease {
                release,
                classification,
            }
        })
        .collect()
}

/// Cross-train queries and admin-level release management.
#[derive(Clone, Default)]
pub struct RegistryService;

impl RegistryService {
    pub fn new() -> Self {
        Self
    }

    fn ensure_admin(principal: &Principal) -> Result<()> {
        if !principal.is_admin {
            return Err(RegistryError::AdminRequired);
        }
        Ok(())
    }

    /// Every train with its app name, stop counts and the in-progress stop
    /// title. Plain read; callers may cache it and invalidate on any train
    /// or stop write.
    pub async fn list_releases_with_stats(
        &self,
        db: &DatabaseConnection,
    ) -> Result<Vec<TrainWithStats>> {
        Ok(ReleaseTrain::find_all_with_stats(db).await?)
    }

    /// All trains grouped by (app, platform) track and classified, tracks
    /// ordered by app name then platform.
    pub async fn group_by_track(&self, db: &DatabaseConnection) -> Result<Vec<TrackReleases>> {
        let trains = ReleaseTrain::find_all_with_stats(db).await?;

        let mut tracks: BTreeMap<(String, String, Uuid), Vec<TrainWithStats>> = BTreeMap::new();
        for train in trains {
            let key = (
                train.app_name.clone(),
                train.platform.to_string(),
                train.app_id,
            );
            tracks.entry(key).or_default().push(train);
        }

        Ok(tracks
            .into_iter()
            .map(|((app_name, _, app_id), releases)| {
                let platform = releases[0].platform;
                TrackReleases {
                    app_id,
                    app_name,
                    platform,
                    releases: classify_releases(releases),
                }
            })
            .collect())
    }

    pub async fn create_app(
        &self,
        db: &DatabaseConnection,
        data: &CreateApp,
        principal: &Principal,
    ) -> Result<App> {
        Self::ensure_admin(principal)?;
        Ok(App::create(db, data, Uuid::new_v4()).await?)
    }

    pub async fn update_app(
        &self,
        db: &DatabaseConnection,
        app_id: Uuid,
        data: &UpdateApp,
        principal: &Principal,
    ) -> Result<App> {
        Self::ensure_admin(principal)?;
        Ok(App::update(db, app_id, data).await?)
    }

    /// Deletes the app and every train under it.
    pub async fn delete_app(
        &self,
        db: &DatabaseConnection,
        app_id: Uuid,
        principal: &Principal,
    ) -> Result<u64> {
        Self::ensure_admin(principal)?;
        Ok(App::delete(db, app_id).await?)
    }

    /// Create a train and its templated stops. Only enabled template entries
    /// are persisted, renumbered 1..M.
    pub async fn create_release(
        &self,
        db: &DatabaseConnection,
        data: &CreateReleaseTrain,
        template: &StopTemplate,
        principal: &Principal,
    ) -> Result<ReleaseTrain> {
        Self::ensure_admin(principal)?;
        let train = ReleaseTrain::create(db, data, Uuid::new_v4()).await?;
        Stop::create_many(db, train.id, &template.enabled_specs()).await?;
        Ok(train)
    }

    pub async fn update_version(
        &self,
        db: &DatabaseConnection,
        train_id: Uuid,
        version: String,
        principal: &Principal,
    ) -> Result<ReleaseTrain> {
        Self::ensure_admin(principal)?;
        Ok(ReleaseTrain::update_version(db, train_id, version).await?)
    }

    pub async fn update_deadline(
        &self,
        db: &DatabaseConnection,
        train_id: Uuid,
        deadline: Option<NaiveDate>,
        principal: &Principal,
    ) -> Result<ReleaseTrain> {
        Self::ensure_admin(principal)?;
        Ok(ReleaseTrain::update_deadline(db, train_id, deadline).await?)
    }

    /// Soft retirement: the train stays queryable but stops being a
    /// candidate for the current-active slot.
    pub async fn set_active(
        &self,
        db: &DatabaseConnection,
        train_id: Uuid,
        is_active: bool,
        principal: &Principal,
    ) -> Result<ReleaseTrain> {
        Self::ensure_admin(principal)?;
        Ok(ReleaseTrain::set_active(db, train_id, is_active).await?)
    }

    pub async fn delete_release(
        &self,
        db: &DatabaseConnection,
        train_id: Uuid,
        principal: &Principal,
    ) -> Result<u64> {
        Self::ensure_admin(principal)?;
        Ok(ReleaseTrain::delete(db, train_id).await?)
    }
}
