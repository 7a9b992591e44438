use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    entities::stop,
    events::{EVENT_STOP_CREATED, EVENT_STOP_DELETED, EVENT_STOP_UPDATED, StopEventPayload},
    models::{event_outbox::EventOutbox, ids},
    types::{StopOwnerType, StopStatus},
};

#[derive(Debug, Error)]
pub enum StopError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Release train not found")]
    TrainNotFound,
    #[error("Stop not found")]
    StopNotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stop {
    pub id: Uuid,
    pub release_train_id: Uuid,
    pub number: i32,
    pub title: String,
    pub description: Option<String>,
    pub owner_type: StopOwnerType,
    pub owner_name: String,
    pub status: StopStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStop {
    pub number: i32,
    pub title: String,
    pub description: Option<String>,
    pub owner_type: StopOwnerType,
    pub owner_name: String,
}

/// Timestamp fields produced by a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusStamp {
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// The single-stop status transform. Total over any (status, new_status)
/// pair: legality of the overall sequence is the progression engine's
/// responsibility, not this layer's.
///
/// - first entry into `in_progress` stamps `started_at`; re-entries keep the
///   original start
/// - `done` stamps `completed_at`
/// - `in_progress` clears `completed_at` (re-open)
pub fn stamp_transition(
    new_status: &StopStatus,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> StatusStamp {
    let started_at = match new_status {
        StopStatus::InProgress => started_at.or(Some(now)),
        _ => started_at,
    };
    let completed_at = match new_status {
        StopStatus::Done => Some(now),
        StopStatus::InProgress => None,
        _ => completed_at,
    };
    StatusStamp {
        started_at,
        completed_at,
    }
}

impl Stop {
    pub(crate) fn from_model(model: stop::Model, train_uuid: Uuid) -> Self {
        Self {
            id: model.uuid,
            release_train_id: train_uuid,
            number: model.number,
            title: model.title,
            description: model.description,
            owner_type: model.owner_type,
            owner_name: model.owner_name,
            status: model.status,
            started_at: model.started_at.map(Into::into),
            completed_at: model.completed_at.map(Into::into),
            updated_by: model.updated_by,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        }
    }

    async fn resolve<C: ConnectionTrait>(
        db: &C,
        model: stop::Model,
    ) -> Result<Self, StopError> {
        let train_uuid = ids::train_uuid_by_id(db, model.release_train_id)
            .await?
            .ok_or(StopError::TrainNotFound)?;
        Ok(Self::from_model(model, train_uuid))
    }

    pub async fn find_by_id<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
    ) -> Result<Option<Self>, StopError> {
        let record = stop::Entity::find()
            .filter(stop::Column::Uuid.eq(id))
            .one(db)
            .await?;

        match record {
            Some(model) => Ok(Some(Self::resolve(db, model).await?)),
            None => Ok(None),
        }
    }

    /// All stops of a train in `number` order, the order every progression
    /// and renumbering decision is made in.
    pub async fn find_by_train_id<C: ConnectionTrait>(
        db: &C,
        train_id: Uuid,
    ) -> Result<Vec<Self>, StopError> {
        let train_row_id = ids::train_id_by_uuid(db, train_id)
            .await?
            .ok_or(StopError::TrainNotFound)?;

        let models = stop::Entity::find()
            .filter(stop::Column::ReleaseTrainId.eq(train_row_id))
            .order_by_asc(stop::Column::Number)
            .all(db)
            .await?;

        let mut stops = Vec::with_capacity(models.len());
        for model in models {
            stops.push(Self::from_model(model, train_id));
        }
        Ok(stops)
    }

    pub async fn create_many<C: ConnectionTrait>(
        db: &C,
        train_id: Uuid,
        specs: &[CreateStop],
    ) -> Result<Vec<Self>, StopError> {
        let train_row_id = ids::train_id_by_uuid(db, train_id)
            .await?
            .ok_or(StopError::TrainNotFound)?;

        let mut stops = Vec::with_capacity(specs.len());
        for spec in specs {
            let stop_id = Uuid::new_v4();
            let now = Utc::now();
            let active = stop::ActiveModel {
                uuid: Set(stop_id),
                release_train_id: Set(train_row_id),
                number: Set(spec.number),
                title: Set(spec.title.clone()),
                description: Set(spec.description.clone()),
                owner_type: Set(spec.owner_type),
                owner_name: Set(spec.owner_name.clone()),
                status: Set(StopStatus::NotStarted),
                started_at: Set(None),
                completed_at: Set(None),
                updated_by: Set(None),
                created_at: Set(now.into()),
                updated_at: Set(now.into()),
                ..Default::default()
            };

            let model = active.insert(db).await?;
            let payload = serde_json::to_value(StopEventPayload {
                stop_id,
                train_id,
            })
            .map_err(|err| DbErr::Custom(err.to_string()))?;
            EventOutbox::enqueue(db, EVENT_STOP_CREATED, "stop", stop_id, payload).await?;
            stops.push(Self::from_model(model, train_id));
        }
        Ok(stops)
    }

    /// Persist a status change, applying [`stamp_transition`] to the stored
    /// timestamps.
    pub async fn update_status<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        new_status: StopStatus,
        actor: Uuid,
    ) -> Result<Self, StopError> {
        let record = stop::Entity::find()
            .filter(stop::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(StopError::StopNotFound)?;

        let train_uuid = ids::train_uuid_by_id(db, record.release_train_id)
            .await?
            .ok_or(StopError::TrainNotFound)?;

        let now = Utc::now();
        let stamp = stamp_transition(
            &new_status,
            record.started_at.map(Into::into),
            record.completed_at.map(Into::into),
            now,
        );

        let mut active: stop::ActiveModel = record.into();
        active.status = Set(new_status);
        active.started_at = Set(stamp.started_at.map(Into::into));
        active.completed_at = Set(stamp.completed_at.map(Into::into));
        active.updated_by = Set(Some(actor));
        active.updated_at = Set(now.into());

        let updated = active.update(db).await?;
        let payload = serde_json::to_value(StopEventPayload {
            stop_id: id,
            train_id: train_uuid,
        })
        .map_err(|err| DbErr::Custom(err.to_string()))?;
        EventOutbox::enqueue(db, EVENT_STOP_UPDATED, "stop", id, payload).await?;

        Ok(Self::from_model(updated, train_uuid))
    }

    pub async fn set_number<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        number: i32,
    ) -> Result<(), StopError> {
        let record = stop::Entity::find()
            .filter(stop::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(StopError::StopNotFound)?;

        let train_uuid = ids::train_uuid_by_id(db, record.release_train_id)
            .await?
            .ok_or(StopError::TrainNotFound)?;

        let mut active: stop::ActiveModel = record.into();
        active.number = Set(number);
        active.updated_at = Set(Utc::now().into());
        active.update(db).await?;

        let payload = serde_json::to_value(StopEventPayload {
            stop_id: id,
            train_id: train_uuid,
        })
        .map_err(|err| DbErr::Custom(err.to_string()))?;
        EventOutbox::enqueue(db, EVENT_STOP_UPDATED, "stop", id, payload).await?;
        Ok(())
    }

    /// Put every stop of a train back to `not_started` with cleared
    /// timestamps. Notes are untouched; they are the audit trail that
    /// survives a restart.
    pub async fn reset_all_for_train<C: ConnectionTrait>(
        db: &C,
        train_id: Uuid,
        actor: Uuid,
    ) -> Result<u64, StopError> {
        let train_row_id = ids::train_id_by_uuid(db, train_id)
            .await?
            .ok_or(StopError::TrainNotFound)?;

        let stops = stop::Entity::find()
            .filter(stop::Column::ReleaseTrainId.eq(train_row_id))
            .all(db)
            .await?;

        let result = stop::Entity::update_many()
            .col_expr(stop::Column::Status, Expr::value(StopStatus::NotStarted))
            .col_expr(
                stop::Column::StartedAt,
                Expr::value(None::<DateTime<Utc>>),
            )
            .col_expr(
                stop::Column::CompletedAt,
                Expr::value(None::<DateTime<Utc>>),
            )
            .col_expr(stop::Column::UpdatedBy, Expr::value(Some(actor)))
            .col_expr(stop::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(stop::Column::ReleaseTrainId.eq(train_row_id))
            .exec(db)
            .await?;

        for stop_model in stops {
            let payload = serde_json::to_value(StopEventPayload {
                stop_id: stop_model.uuid,
                train_id,
            })
            .map_err(|err| DbErr::Custom(err.to_string()))?;
            EventOutbox::enqueue(db, EVENT_STOP_UPDATED, "stop", stop_model.uuid, payload)
                .await?;
        }

        Ok(result.rows_affected)
    }

    pub async fn delete_by_ids<C: ConnectionTrait>(
        db: &C,
        stop_ids: &[Uuid],
    ) -> Result<u64, StopError> {
        if stop_ids.is_empty() {
            return Ok(0);
        }

        let records = stop::Entity::find()
            .filter(stop::Column::Uuid.is_in(stop_ids.to_vec()))
            .all(db)
            .await?;

        let result = stop::Entity::delete_many()
            .filter(stop::Column::Uuid.is_in(stop_ids.to_vec()))
            .exec(db)
            .await?;

        for record in records {
            let train_uuid = ids::train_uuid_by_id(db, record.release_train_id)
                .await?
                .ok_or(StopError::TrainNotFound)?;
            let payload = serde_json::to_value(StopEventPayload {
                stop_id: record.uuid,
                train_id: train_uuid,
            })
            .map_err(|err| DbErr::Custom(err.to_string()))?;
            EventOutbox::enqueue(db, EVENT_STOP_DELETED, "stop", record.uuid, payload).await?;
        }

        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, minute, 0).unwrap()
    }

    #[test]
    fn first_start_stamps_started_at() {
        let stamp = stamp_transition(&StopStatus::InProgress, None, None, at(5));
        assert_eq!(stamp.started_at, Some(at(5)));
        assert_eq!(stamp.completed_at, None);
    }

    #[test]
    fn restart_keeps_original_started_at() {
        let stamp = stamp_transition(&StopStatus::InProgress, Some(at(5)), Some(at(20)), at(30));
        assert_eq!(stamp.started_at, Some(at(5)));
        // Re-opening clears the completion mark.
        assert_eq!(stamp.completed_at, None);
    }

    #[test]
    fn done_stamps_completed_at() {
        let stamp = stamp_transition(&StopStatus::Done, Some(at(5)), None, at(45));
        assert_eq!(stamp.started_at, Some(at(5)));
        assert_eq!(stamp.completed_at, Some(at(45)));
    }

    #[test]
    fn blocked_leaves_timestamps_alone() {
        let stamp = stamp_transition(&StopStatus::Blocked, Some(at(5)), None, at(45));
        assert_eq!(stamp.started_at, Some(at(5)));
        assert_eq!(stamp.completed_at, None);
    }

    #[test]
    fn transform_is_total_over_unusual_pairs() {
        // done -> not_started is invocable; the transform does not police it.
        let stamp = stamp_transition(&StopStatus::NotStarted, Some(at(5)), Some(at(20)), at(45));
        assert_eq!(stamp.started_at, Some(at(5)));
        assert_eq!(stamp.completed_at, Some(at(20)));
    }
}
