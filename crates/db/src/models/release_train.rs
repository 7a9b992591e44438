use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set, SqlErr,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    entities::{app, note, release_train, stop},
    events::{
        EVENT_STOP_DELETED, EVENT_TRAIN_CREATED, EVENT_TRAIN_DELETED, EVENT_TRAIN_UPDATED,
        StopEventPayload, TrainEventPayload,
    },
    models::{event_outbox::EventOutbox, ids, stop::Stop},
    types::{Platform, StopStatus},
};

#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("App not found")]
    AppNotFound,
    #[error("Release train not found")]
    TrainNotFound,
    #[error("A train for this app, platform and version already exists: {0}")]
    DuplicateVersion(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseTrain {
    pub id: Uuid,
    pub app_id: Uuid,
    pub platform: Platform,
    pub version: String,
    pub is_active: bool,
    pub deadline: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReleaseTrain {
    pub app_id: Uuid,
    pub platform: Platform,
    pub version: String,
    pub deadline: Option<NaiveDate>,
}

/// Train-level status, always derived from the stop list and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainStatus {
    NotStarted,
    InProgress,
    Blocked,
    Complete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainWithStats {
    #[serde(flatten)]
    pub train: ReleaseTrain,
    pub app_name: String,
    pub total: usize,
    pub done: usize,
    pub in_progress: usize,
    pub blocked: usize,
    pub current_stop_title: Option<String>,
    pub status: TrainStatus,
}

impl std::ops::Deref for TrainWithStats {
    type Target = ReleaseTrain;
    fn deref(&self) -> &Self::Target {
        &self.train
    }
}

pub fn completed_count(stops: &[Stop]) -> usize {
    stops.iter().filter(|s| s.status == StopStatus::Done).count()
}

pub fn in_progress_count(stops: &[Stop]) -> usize {
    stops
        .iter()
        .filter(|s| s.status == StopStatus::InProgress)
        .count()
}

pub fn blocked_count(stops: &[Stop]) -> usize {
    stops
        .iter()
        .filter(|s| s.status == StopStatus::Blocked)
        .count()
}

/// The unique in-progress stop. The progression engine guarantees at most
/// one; if that has been violated behind its back, the lowest number wins.
pub fn current_stop(stops: &[Stop]) -> Option<&Stop> {
    let mut in_progress = stops
        .iter()
        .filter(|s| s.status == StopStatus::InProgress);
    let first = in_progress.next();
    if in_progress.next().is_some() {
        tracing::warn!("multiple in-progress stops found; using the lowest number");
    }
    first
}

/// The lowest-numbered stop holding the train, whether running or stuck.
pub fn train_head(stops: &[Stop]) -> Option<&Stop> {
    stops.iter().find(|s| s.status.is_active())
}

pub fn is_complete(stops: &[Stop]) -> bool {
    !stops.is_empty() && completed_count(stops) == stops.len()
}

pub fn progress_percent(stops: &[Stop]) -> f64 {
    if stops.is_empty() {
        return 0.0;
    }
    completed_count(stops) as f64 / stops.len() as f64 * 100.0
}

pub fn derived_status(stops: &[Stop]) -> TrainStatus {
    if is_complete(stops) {
        return TrainStatus::Complete;
    }
    if blocked_count(stops) > 0 {
        return TrainStatus::Blocked;
    }
    if in_progress_count(stops) > 0 || completed_count(stops) > 0 {
        return TrainStatus::InProgress;
    }
    TrainStatus::NotStarted
}

impl ReleaseTrain {
    fn from_model(model: release_train::Model, app_uuid: Uuid) -> Self {
        Self {
            id: model.uuid,
            app_id: app_uuid,
            platform: model.platform,
            version: model.version,
            is_active: model.is_active,
            deadline: model.deadline,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        }
    }

    async fn resolve<C: ConnectionTrait>(
        db: &C,
        model: release_train::Model,
    ) -> Result<Self, TrainError> {
        let app_uuid = ids::app_uuid_by_id(db, model.app_id)
            .await?
            .ok_or(TrainError::AppNotFound)?;
        Ok(Self::from_model(model, app_uuid))
    }

    pub async fn find_by_id<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
    ) -> Result<Option<Self>, TrainError> {
        let record = release_train::Entity::find()
            .filter(release_train::Column::Uuid.eq(id))
            .one(db)
            .await?;

        match record {
            Some(model) => Ok(Some(Self::resolve(db, model).await?)),
            None => Ok(None),
        }
    }

    pub async fn find_by_app_id<C: ConnectionTrait>(
        db: &C,
        app_id: Uuid,
    ) -> Result<Vec<Self>, TrainError> {
        let app_row_id = ids::app_id_by_uuid(db, app_id)
            .await?
            .ok_or(TrainError::AppNotFound)?;

        let models = release_train::Entity::find()
            .filter(release_train::Column::AppId.eq(app_row_id))
            .order_by_desc(release_train::Column::CreatedAt)
            .all(db)
            .await?;

        let mut trains = Vec::with_capacity(models.len());
        for model in models {
            trains.push(Self::from_model(model, app_id));
        }
        Ok(trains)
    }

    pub async fn find_all<C: ConnectionTrait>(db: &C) -> Result<Vec<Self>, TrainError> {
        let models = release_train::Entity::find()
            .order_by_desc(release_train::Column::CreatedAt)
            .all(db)
            .await?;

        let mut trains = Vec::with_capacity(models.len());
        for model in models {
            trains.push(Self::resolve(db, model).await?);
        }
        Ok(trains)
    }

    /// Every train joined with its app name and stop counts, the dashboard
    /// projection behind the release registry.
    pub async fn find_all_with_stats<C: ConnectionTrait>(
        db: &C,
    ) -> Result<Vec<TrainWithStats>, TrainError> {
        let models = release_train::Entity::find()
            .order_by_desc(release_train::Column::CreatedAt)
            .all(db)
            .await?;

        let mut result = Vec::with_capacity(models.len());
        for model in models {
            let app_model = app::Entity::find_by_id(model.app_id)
                .one(db)
                .await?
                .ok_or(TrainError::AppNotFound)?;

            let train = Self::from_model(model, app_model.uuid);
            let stops = Stop::find_by_train_id(db, train.id)
                .await
                .map_err(|err| match err {
                    crate::models::stop::StopError::Database(e) => TrainError::Database(e),
                    _ => TrainError::TrainNotFound,
                })?;

            let status = derived_status(&stops);
            let current_stop_title = current_stop(&stops).map(|s| s.title.clone());
            result.push(TrainWithStats {
                app_name: app_model.name,
                total: stops.len(),
                done: completed_count(&stops),
                in_progress: in_progress_count(&stops),
                blocked: blocked_count(&stops),
                current_stop_title,
                status,
                train,
            });
        }
        Ok(result)
    }

    pub async fn create<C: ConnectionTrait>(
        db: &C,
        data: &CreateReleaseTrain,
        train_id: Uuid,
    ) -> Result<Self, TrainError> {
        let app_row_id = ids::app_id_by_uuid(db, data.app_id)
            .await?
            .ok_or(TrainError::AppNotFound)?;

        let now = Utc::now();
        let active = release_train::ActiveModel {
            uuid: Set(train_id),
            app_id: Set(app_row_id),
            platform: Set(data.platform),
            version: Set(data.version.clone()),
            is_active: Set(true),
            deadline: Set(data.deadline),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        };

        let model = match active.insert(db).await {
            Ok(model) => model,
            Err(err) => {
                if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                    return Err(TrainError::DuplicateVersion(data.version.clone()));
                }
                return Err(err.into());
            }
        };

        let payload = serde_json::to_value(TrainEventPayload {
            train_id,
            app_id: data.app_id,
        })
        .map_err(|err| DbErr::Custom(err.to_string()))?;
        EventOutbox::enqueue(db, EVENT_TRAIN_CREATED, "release_train", train_id, payload)
            .await?;
        Ok(Self::from_model(model, data.app_id))
    }

    pub async fn update_version<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        version: String,
    ) -> Result<Self, TrainError> {
        let record = release_train::Entity::find()
            .filter(release_train::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(TrainError::TrainNotFound)?;

        let app_uuid = ids::app_uuid_by_id(db, record.app_id)
            .await?
            .ok_or(TrainError::AppNotFound)?;

        let mut active: release_train::ActiveModel = record.into();
        active.version = Set(version.clone());
        active.updated_at = Set(Utc::now().into());

        let updated = match active.update(db).await {
            Ok(model) => model,
            Err(err) => {
                if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                    return Err(TrainError::DuplicateVersion(version));
                }
                return Err(err.into());
            }
        };

        Self::enqueue_updated(db, id, app_uuid).await?;
        Ok(Self::from_model(updated, app_uuid))
    }

    pub async fn update_deadline<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        deadline: Option<NaiveDate>,
    ) -> Result<Self, TrainError> {
        let record = release_train::Entity::find()
            .filter(release_train::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(TrainError::TrainNotFound)?;

        let app_uuid = ids::app_uuid_by_id(db, record.app_id)
            .await?
            .ok_or(TrainError::AppNotFound)?;

        let mut active: release_train::ActiveModel = record.into();
        active.deadline = Set(deadline);
        active.updated_at = Set(Utc::now().into());

        let updated = active.update(db).await?;
        Self::enqueue_updated(db, id, app_uuid).await?;
        Ok(Self::from_model(updated, app_uuid))
    }

    pub async fn set_active<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        is_active: bool,
    ) -> Result<Self, TrainError> {
        let record = release_train::Entity::find()
            .filter(release_train::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(TrainError::TrainNotFound)?;

        let app_uuid = ids::app_uuid_by_id(db, record.app_id)
            .await?
            .ok_or(TrainError::AppNotFound)?;

        let mut active: release_train::ActiveModel = record.into();
        active.is_active = Set(is_active);
        active.updated_at = Set(Utc::now().into());

        let updated = active.update(db).await?;
        Self::enqueue_updated(db, id, app_uuid).await?;
        Ok(Self::from_model(updated, app_uuid))
    }

    /// Cascading delete: notes of the train's stops, then the stops, then
    /// the train itself. Note cleanup is explicit rather than left to
    /// foreign-key cascade so it behaves the same on every backend.
    pub async fn delete<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<u64, TrainError> {
        let record = release_train::Entity::find()
            .filter(release_train::Column::Uuid.eq(id))
            .one(db)
            .await?;

        let Some(record) = record else {
            return Ok(0);
        };

        let app_uuid = ids::app_uuid_by_id(db, record.app_id)
            .await?
            .ok_or(TrainError::AppNotFound)?;

        let stops = stop::Entity::find()
            .filter(stop::Column::ReleaseTrainId.eq(record.id))
            .all(db)
            .await?;
        let stop_row_ids: Vec<i64> = stops.iter().map(|s| s.id).collect();

        if !stop_row_ids.is_empty() {
            note::Entity::delete_many()
                .filter(note::Column::StopId.is_in(stop_row_ids.clone()))
                .exec(db)
                .await?;
            stop::Entity::delete_many()
                .filter(stop::Column::Id.is_in(stop_row_ids))
                .exec(db)
                .await?;
        }

        let result = release_train::Entity::delete_many()
            .filter(release_train::Column::Uuid.eq(id))
            .exec(db)
            .await?;

        if result.rows_affected > 0 {
            for stop_model in stops {
                let payload = serde_json::to_value(StopEventPayload {
                    stop_id: stop_model.uuid,
                    train_id: id,
                })
                .map_err(|err| DbErr::Custom(err.to_string()))?;
                EventOutbox::enqueue(db, EVENT_STOP_DELETED, "stop", stop_model.uuid, payload)
                    .await?;
            }

            let payload = serde_json::to_value(TrainEventPayload {
                train_id: id,
                app_id: app_uuid,
            })
            .map_err(|err| DbErr::Custom(err.to_string()))?;
            EventOutbox::enqueue(db, EVENT_TRAIN_DELETED, "release_train", id, payload).await?;
        }

        Ok(result.rows_affected)
    }

    async fn enqueue_updated<C: ConnectionTrait>(
        db: &C,
        train_id: Uuid,
        app_id: Uuid,
    ) -> Result<(), DbErr> {
        let payload = serde_json::to_value(TrainEventPayload { train_id, app_id })
            .map_err(|err| DbErr::Custom(err.to_string()))?;
        EventOutbox::enqueue(db, EVENT_TRAIN_UPDATED, "release_train", train_id, payload).await
    }
}

#[cfg(test)]
mod tests {
    use crate::types::StopOwnerType;

    use super::*;

    fn stop_with_status(number: i32, status: StopStatus) -> Stop {
        let now = Utc::now();
        Stop {
            id: Uuid::new_v4(),
            release_train_id: Uuid::new_v4(),
            number,
            title: format!("Stop {number}"),
            description: None,
            owner_type: StopOwnerType::Person,
            owner_name: "Release manager".to_string(),
            status,
            started_at: None,
            completed_at: None,
            updated_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn train_of(statuses: &[StopStatus]) -> Vec<Stop> {
        statuses
            .iter()
            .enumerate()
            .map(|(i, status)| stop_with_status(i as i32 + 1, status.clone()))
            .collect()
    }

    #[test]
    fn counts_by_status() {
        let stops = train_of(&[
            StopStatus::Done,
            StopStatus::Done,
            StopStatus::InProgress,
            StopStatus::NotStarted,
        ]);
        assert_eq!(completed_count(&stops), 2);
        assert_eq!(in_progress_count(&stops), 1);
        assert_eq!(blocked_count(&stops), 0);
    }

    #[test]
    fn current_stop_picks_lowest_number_on_violation() {
        let stops = train_of(&[
            StopStatus::Done,
            StopStatus::InProgress,
            StopStatus::InProgress,
        ]);
        assert_eq!(current_stop(&stops).unwrap().number, 2);
    }

    #[test]
    fn train_head_includes_blocked() {
        let stops = train_of(&[StopStatus::Done, StopStatus::Blocked, StopStatus::NotStarted]);
        assert_eq!(train_head(&stops).unwrap().number, 2);
    }

    #[test]
    fn empty_train_is_never_complete() {
        assert!(!is_complete(&[]));
        assert_eq!(progress_percent(&[]), 0.0);
        assert_eq!(derived_status(&[]), TrainStatus::NotStarted);
    }

    #[test]
    fn full_train_is_complete() {
        let stops = train_of(&[StopStatus::Done, StopStatus::Done]);
        assert!(is_complete(&stops));
        assert_eq!(progress_percent(&stops), 100.0);
        assert_eq!(derived_status(&stops), TrainStatus::Complete);
    }

    #[test]
    fn derived_status_prefers_blocked_over_in_progress() {
        let stops = train_of(&[StopStatus::Done, StopStatus::Blocked, StopStatus::NotStarted]);
        assert_eq!(derived_status(&stops), TrainStatus::Blocked);
    }

    #[test]
    fn partially_done_train_counts_as_in_progress() {
        // Crash between advance writes can leave done stops with no active
        // head; the train still reads as in progress.
        let stops = train_of(&[StopStatus::Done, StopStatus::NotStarted]);
        assert_eq!(derived_status(&stops), TrainStatus::InProgress);
        assert_eq!(progress_percent(&stops), 50.0);
    }
}
