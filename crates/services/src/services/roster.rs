use db::{
    DatabaseConnection, DbErr,
    models::{
        note::{Note, NoteError},
        stop::{CreateStop, Stop, StopError},
    },
    types::StopOwnerType,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::auth::Principal;

#[derive(Debug, Error)]
pub enum RosterError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Editing the stop roster requires admin")]
    AdminRequired,
    #[error("Release train not found")]
    TrainNotFound,
    #[error("Stop not found")]
    StopNotFound,
}

pub type Result<T> = std::result::Result<T, RosterError>;

impl From<StopError> for RosterError {
    fn from(err: StopError) -> Self {
        match err {
            StopError::Database(e) => Self::Database(e),
            StopError::TrainNotFound => Self::TrainNotFound,
            StopError::StopNotFound => Self::StopNotFound,
        }
    }
}

impl From<NoteError> for RosterError {
    fn from(err: NoteError) -> Self {
        match err {
            NoteError::Database(e) => Self::Database(e),
            NoteError::StopNotFound => Self::StopNotFound,
        }
    }
}

/// A stop to append, before it has a position. Numbers are assigned
/// provisionally on insert and settled by the renumbering pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStop {
    pub title: String,
    pub description: Option<String>,
    pub owner_type: StopOwnerType,
    pub owner_name: String,
}

/// Structural mutation of a train's stop list, independent of runtime
/// progression. Every edit ends with contiguous 1..N numbering, which the
/// progression engine's next-stop lookup depends on.
#[derive(Clone, Default)]
pub struct RosterService;

impl RosterService {
    pub fn new() -> Self {
        Self
    }

    fn ensure_admin(principal: &Principal) -> Result<()> {
        if !principal.is_admin {
            return Err(RosterError::AdminRequired);
        }
        Ok(())
    }

    pub async fn add_stops(
        &self,
        db: &DatabaseConnection,
        train_id: Uuid,
        specs: &[NewStop],
        principal: &Principal,
    ) -> Result<Vec<Stop>> {
        Self::ensure_admin(principal)?;
        if specs.is_empty() {
            return Ok(Vec::new());
        }

        let existing = Stop::find_by_train_id(db, train_id).await?;
        let next_number = existing.iter().map(|s| s.number).max().unwrap_or(0) + 1;
        let create_specs: Vec<CreateStop> = specs
            .iter()
            .enumerate()
            .map(|(i, spec)| CreateStop {
                number: next_number + i as i32,
                title: spec.title.clone(),
                description: spec.description.clone(),
                owner_type: spec.owner_type,
                owner_name: spec.owner_name.clone(),
            })
            .collect();

        let created = Stop::create_many(db, train_id, &create_specs).await?;
        self.renumber(db, train_id).await?;
        Ok(created)
    }

    pub async fn delete_stops(
        &self,
        db: &DatabaseConnection,
        stop_ids: &[Uuid],
        principal: &Principal,
    ) -> Result<u64> {
        Self::ensure_admin(principal)?;
        if stop_ids.is_empty() {
            return Ok(0);
        }

        // Notes first: referential cleanup is explicit, not assumed to
        // cascade.
        Note::delete_by_stop_ids(db, stop_ids).await?;
        let removed = Stop::delete_by_ids(db, stop_ids).await?;
        if removed < stop_ids.len() as u64 {
            tracing::warn!(
                "requested {} stop deletions, removed {}",
                stop_ids.len(),
                removed
            );
        }
        Ok(removed)
    }

    /// Composite roster edit: delete, then add, then renumber the survivors
    /// to contiguous 1..N. Returns the settled roster in number order.
    pub async fn update_release_stops(
        &self,
        db: &DatabaseConnection,
        train_id: Uuid,
        to_add: &[NewStop],
        to_delete: &[Uuid],
        principal: &Principal,
    ) -> Result<Vec<Stop>> {
        Self::ensure_admin(principal)?;

        if !to_delete.is_empty() {
            Note::delete_by_stop_ids(db, to_delete).await?;
            Stop::delete_by_ids(db, to_delete).await?;
        }

        if !to_add.is_empty() {
            let existing = Stop::find_by_train_id(db, train_id).await?;
            let next_number = existing.iter().map(|s| s.number).max().unwrap_or(0) + 1;
            let create_specs: Vec<CreateStop> = to_add
                .iter()
                .enumerate()
                .map(|(i, spec)| CreateStop {
                    number: next_number + i as i32,
                    title: spec.title.clone(),
                    description: spec.description.clone(),
                    owner_type: spec.owner_type,
                    owner_name: spec.owner_name.clone(),
                })
                .collect();
            Stop::create_many(db, train_id, &create_specs).await?;
        }

        self.renumber(db, train_id).await?;
        Ok(Stop::find_by_train_id(db, train_id).await?)
    }

    /// Walk the stops in current order and close any gaps. Only rows whose
    /// number actually changes are written. Descending positions are never
    /// assigned, so the unique (train, number) index is never violated
    /// mid-pass.
    async fn renumber(&self, db: &DatabaseConnection, train_id: Uuid) -> Result<()> {
        let stops = Stop::find_by_train_id(db, train_id).await?;
        for (index, stop) in stops.iter().enumerate() {
            let wanted = index as i32 + 1;
            if stop.number != wanted {
                Stop::set_number(db, stop.id, wanted).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use db::{
        models::{
            app::{App, CreateApp},
            note::CreateNote,
            release_train::{CreateReleaseTrain, ReleaseTrain},
        },
        types::Platform,
    };
    use sea_orm::Database;
    use sea_orm_migration::MigratorTrait;

    use super::*;

    async fn setup_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db_migration::Migrator::up(&db, None).await.unwrap();
        db
    }

    async fn seed_train(db: &DatabaseConnection, stop_count: i32) -> ReleaseTrain {
        let app = App::create(
            db,
            &CreateApp {
                name: "Weather".to_string(),
                description: None,
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();

        let train = ReleaseTrain::create(
            db,
            &CreateReleaseTrain {
                app_id: app.id,
                platform: Platform::Android,
                version: "1.0.0".to_string(),
                deadline: None,
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();

        let specs: Vec<CreateStop> = (1..=stop_count)
            .map(|number| CreateStop {
                number,
                title: format!("Stop {number}"),
                description: None,
                owner_type: StopOwnerType::Person,
                owner_name: "Release manager".to_string(),
            })
            .collect();
        Stop::create_many(db, train.id, &specs).await.unwrap();
        train
    }

    fn new_stop(title: &str) -> NewStop {
        NewStop {
            title: title.to_string(),
            description: None,
            owner_type: StopOwnerType::Automation,
            owner_name: "CI".to_string(),
        }
    }

    #[tokio::test]
    async fn deleting_a_middle_stop_renumbers_survivors() {
        let db = setup_db().await;
        let train = seed_train(&db, 5).await;
        let roster = RosterService::new();
        let admin = Principal::admin(Uuid::new_v4(), "Avery");

        let stops = Stop::find_by_train_id(&db, train.id).await.unwrap();
        let third = stops[2].id;

        let roster_after = roster
            .update_release_stops(&db, train.id, &[], &[third], &admin)
            .await
            .unwrap();

        let numbers: Vec<i32> = roster_after.iter().map(|s| s.number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        let titles: Vec<&str> = roster_after.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Stop 1", "Stop 2", "Stop 4", "Stop 5"]);
    }

    #[tokio::test]
    async fn add_stops_appends_after_existing_numbers() {
        let db = setup_db().await;
        let train = seed_train(&db, 3).await;
        let roster = RosterService::new();
        let admin = Principal::admin(Uuid::new_v4(), "Avery");

        let created = roster
            .add_stops(&db, train.id, &[new_stop("Smoke test"), new_stop("Tag build")], &admin)
            .await
            .unwrap();
        assert_eq!(created.len(), 2);

        let stops = Stop::find_by_train_id(&db, train.id).await.unwrap();
        let numbers: Vec<i32> = stops.iter().map(|s| s.number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
        assert_eq!(stops[3].title, "Smoke test");
        assert_eq!(stops[4].title, "Tag build");
    }

    #[tokio::test]
    async fn empty_edits_are_noops() {
        let db = setup_db().await;
        let train = seed_train(&db, 3).await;
        let roster = RosterService::new();
        let admin = Principal::admin(Uuid::new_v4(), "Avery");

        let created = roster.add_stops(&db, train.id, &[], &admin).await.unwrap();
        assert!(created.is_empty());

        let removed = roster.delete_stops(&db, &[], &admin).await.unwrap();
        assert_eq!(removed, 0);

        let stops = Stop::find_by_train_id(&db, train.id).await.unwrap();
        assert_eq!(stops.len(), 3);
    }

    #[tokio::test]
    async fn delete_stops_cleans_up_notes_first() {
        let db = setup_db().await;
        let train = seed_train(&db, 2).await;
        let roster = RosterService::new();
        let admin = Principal::admin(Uuid::new_v4(), "Avery");

        let stops = Stop::find_by_train_id(&db, train.id).await.unwrap();
        Note::create(
            &db,
            &CreateNote {
                stop_id: stops[0].id,
                author_id: admin.id,
                author_name: admin.display_name.clone(),
                body: "flaky signing step".to_string(),
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();

        let removed = roster
            .delete_stops(&db, &[stops[0].id], &admin)
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let remaining = Stop::find_by_train_id(&db, train.id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, stops[1].id);
    }

    #[tokio::test]
    async fn combined_edit_deletes_adds_and_renumbers() {
        let db = setup_db().await;
        let train = seed_train(&db, 4).await;
        let roster = RosterService::new();
        let admin = Principal::admin(Uuid::new_v4(), "Avery");

        let stops = Stop::find_by_train_id(&db, train.id).await.unwrap();
        let roster_after = roster
            .update_release_stops(
                &db,
                train.id,
                &[new_stop("Store submission")],
                &[stops[0].id, stops[2].id],
                &admin,
            )
            .await
            .unwrap();

        let numbers: Vec<i32> = roster_after.iter().map(|s| s.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        let titles: Vec<&str> = roster_after.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Stop 2", "Stop 4", "Store submission"]);
    }

    #[tokio::test]
    async fn roster_edits_require_admin() {
        let db = setup_db().await;
        let train = seed_train(&db, 2).await;
        let roster = RosterService::new();
        let editor = Principal::editor(Uuid::new_v4(), "Dana");

        let err = roster
            .add_stops(&db, train.id, &[new_stop("Extra")], &editor)
            .await
            .unwrap_err();
        assert!(matches!(err, RosterError::AdminRequired));

        let err = roster
            .update_release_stops(&db, train.id, &[], &[], &editor)
            .await
            .unwrap_err();
        assert!(matches!(err, RosterError::AdminRequired));
    }
}
