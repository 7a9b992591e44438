use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const EVENT_APP_CREATED: &str = "app.created";
pub const EVENT_APP_UPDATED: &str = "app.updated";
pub const EVENT_APP_DELETED: &str = "app.deleted";

pub const EVENT_TRAIN_CREATED: &str = "release_train.created";
pub const EVENT_TRAIN_UPDATED: &str = "release_train.updated";
pub const EVENT_TRAIN_DELETED: &str = "release_train.deleted";

pub const EVENT_STOP_CREATED: &str = "stop.created";
pub const EVENT_STOP_UPDATED: &str = "stop.updated";
pub const EVENT_STOP_DELETED: &str = "stop.deleted";

pub const EVENT_NOTE_CREATED: &str = "note.created";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppEventPayload {
    pub app_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainEventPayload {
    pub train_id: Uuid,
    pub app_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopEventPayload {
    pub stop_id: Uuid,
    pub train_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteEventPayload {
    pub note_id: Uuid,
    pub stop_id: Uuid,
}
