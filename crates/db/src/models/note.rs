use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    entities::note,
    events::{EVENT_NOTE_CREATED, NoteEventPayload},
    models::{event_outbox::EventOutbox, ids},
};

#[derive(Debug, Error)]
pub enum NoteError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Stop not found")]
    StopNotFound,
}

/// Append-only from the core's perspective: notes are created and read,
/// never edited. The author display name is captured at creation time so the
/// trail stays readable after account changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub stop_id: Uuid,
    pub author_id: Uuid,
    pub author_name: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNote {
    pub stop_id: Uuid,
    pub author_id: Uuid,
    pub author_name: String,
    pub body: String,
}

impl Note {
    fn from_model(model: note::Model, stop_uuid: Uuid) -> Self {
        Self {
            id: model.uuid,
            stop_id: stop_uuid,
            author_id: model.author_id,
            author_name: model.author_name,
            body: model.body,
            created_at: model.created_at.into(),
        }
    }

    pub async fn create<C: ConnectionTrait>(
        db: &C,
        data: &CreateNote,
        note_id: Uuid,
    ) -> Result<Self, NoteError> {
        let stop_row_id = ids::stop_id_by_uuid(db, data.stop_id)
            .await?
            .ok_or(NoteError::StopNotFound)?;

        let now = Utc::now();
        let active = note::ActiveModel {
            uuid: Set(note_id),
            stop_id: Set(stop_row_id),
            author_id: Set(data.author_id),
            author_name: Set(data.author_name.clone()),
            body: Set(data.body.clone()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        };

        let model = active.insert(db).await?;
        let payload = serde_json::to_value(NoteEventPayload {
            note_id,
            stop_id: data.stop_id,
        })
        .map_err(|err| DbErr::Custom(err.to_string()))?;
        EventOutbox::enqueue(db, EVENT_NOTE_CREATED, "note", note_id, payload).await?;
        Ok(Self::from_model(model, data.stop_id))
    }

    /// Newest first, the display order.
    pub async fn find_by_stop_id<C: ConnectionTrait>(
        db: &C,
        stop_id: Uuid,
    ) -> Result<Vec<Self>, NoteError> {
        let stop_row_id = ids::stop_id_by_uuid(db, stop_id)
            .await?
            .ok_or(NoteError::StopNotFound)?;

        let models = note::Entity::find()
            .filter(note::Column::StopId.eq(stop_row_id))
            .order_by_desc(note::Column::CreatedAt)
            .all(db)
            .await?;

        Ok(models
            .into_iter()
            .map(|model| Self::from_model(model, stop_id))
            .collect())
    }

    /// Referential cleanup before stop deletion; not assumed to cascade.
    pub async fn delete_by_stop_ids<C: ConnectionTrait>(
        db: &C,
        stop_ids: &[Uuid],
    ) -> Result<u64, NoteError> {
        if stop_ids.is_empty() {
            return Ok(0);
        }

        let mut row_ids = Vec::with_capacity(stop_ids.len());
        for stop_id in stop_ids {
            if let Some(row_id) = ids::stop_id_by_uuid(db, *stop_id).await? {
                row_ids.push(row_id);
            }
        }

        if row_ids.is_empty() {
            return Ok(0);
        }

        let result = note::Entity::delete_many()
            .filter(note::Column::StopId.is_in(row_ids))
            .exec(db)
            .await?;

        Ok(result.rows_affected)
    }
}
