use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    entities::{app, release_train},
    events::{AppEventPayload, EVENT_APP_CREATED, EVENT_APP_DELETED, EVENT_APP_UPDATED},
    models::{event_outbox::EventOutbox, release_train::ReleaseTrain},
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error(transparent)]
    Train(#[from] crate::models::release_train::TrainError),
    #[error("App not found")]
    AppNotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct App {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateApp {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateApp {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl App {
    fn from_model(model: app::Model) -> Self {
        Self {
            id: model.uuid,
            name: model.name,
            description: model.description,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        }
    }

    pub async fn find_all<C: ConnectionTrait>(db: &C) -> Result<Vec<Self>, DbErr> {
        let records = app::Entity::find()
            .order_by_asc(app::Column::Name)
            .all(db)
            .await?;
        Ok(records.into_iter().map(Self::from_model).collect())
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = app::Entity::find()
            .filter(app::Column::Uuid.eq(id))
            .one(db)
            .await?;
        Ok(record.map(Self::from_model))
    }

    pub async fn create<C: ConnectionTrait>(
        db: &C,
        data: &CreateApp,
        app_id: Uuid,
    ) -> Result<Self, DbErr> {
        let now = Utc::now();
        let active = app::ActiveModel {
            uuid: Set(app_id),
            name: Set(data.name.clone()),
            description: Set(data.description.clone()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        };

        let model = active.insert(db).await?;
        let payload = serde_json::to_value(AppEventPayload { app_id })
            .map_err(|err| DbErr::Custom(err.to_string()))?;
        EventOutbox::enqueue(db, EVENT_APP_CREATED, "app", app_id, payload).await?;
        Ok(Self::from_model(model))
    }

    pub async fn update<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        data: &UpdateApp,
    ) -> Result<Self, AppError> {
        let record = app::Entity::find()
            .filter(app::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(AppError::AppNotFound)?;

        let mut active: app::ActiveModel = record.into();
        if let Some(name) = data.name.clone() {
            active.name = Set(name);
        }
        if data.description.is_some() {
            active.description = Set(data.description.clone());
        }
        active.updated_at = Set(Utc::now().into());

        let updated = active.update(db).await?;
        let payload = serde_json::to_value(AppEventPayload { app_id: id })
            .map_err(|err| DbErr::Custom(err.to_string()))?;
        EventOutbox::enqueue(db, EVENT_APP_UPDATED, "app", id, payload).await?;
        Ok(Self::from_model(updated))
    }

    /// Deleting an app takes its whole release history with it: every train,
    /// each train's stops, and each stop's notes.
    pub async fn delete<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<u64, AppError> {
        let record = app::Entity::find()
            .filter(app::Column::Uuid.eq(id))
            .one(db)
            .await?;

        let Some(record) = record else {
            return Ok(0);
        };

        let trains = release_train::Entity::find()
            .filter(release_train::Column::AppId.eq(record.id))
            .all(db)
            .await?;
        for train in trains {
            ReleaseTrain::delete(db, train.uuid).await?;
        }

        let result = app::Entity::delete_many()
            .filter(app::Column::Uuid.eq(id))
            .exec(db)
            .await?;

        if result.rows_affected > 0 {
            let payload = serde_json::to_value(AppEventPayload { app_id: id })
                .map_err(|err| DbErr::Custom(err.to_string()))?;
            EventOutbox::enqueue(db, EVENT_APP_DELETED, "app", id, payload).await?;
        }

        Ok(result.rows_affected)
    }
}
