use db::{
    DatabaseConnection, DbErr, TransactionTrait,
    models::{
        release_train,
        stop::{Stop, StopError},
    },
    types::StopStatus,
};
use thiserror::Error;
use uuid::Uuid;

use super::auth::Principal;

#[derive(Debug, Error)]
pub enum ProgressionError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Stop editing requires the edit capability")]
    EditPermissionRequired,
    #[error("Release train not found")]
    TrainNotFound,
    #[error("Stop not found")]
    StopNotFound,
    #[error("The train has no stops")]
    NoStopsFound,
    #[error("The train is already started")]
    AlreadyStarted,
}

pub type Result<T> = std::result::Result<T, ProgressionError>;

impl From<StopError> for ProgressionError {
    fn from(err: StopError) -> Self {
        match err {
            StopError::Database(e) => Self::Database(e),
            StopError::TrainNotFound => Self::TrainNotFound,
            StopError::StopNotFound => Self::StopNotFound,
        }
    }
}

#[derive(Debug, Clone)]
pub enum AdvanceOutcome {
    /// No stop was in progress. Deliberate no-op, not an error: repeated
    /// calls without an intervening start change nothing.
    NoActiveStop,
    Advanced {
        completed: Stop,
        started: Stop,
    },
    /// The last stop was completed; train completeness stays derived, so
    /// nothing else is written.
    TrainCompleted {
        completed: Stop,
    },
}

/// The only component allowed to move a train's runtime state. It owns the
/// single-active-stop invariant: every mutation flows through here, and the
/// stop-level transform stays permissive.
#[derive(Clone, Default)]
pub struct ProgressionService;

impl ProgressionService {
    pub fn new() -> Self {
        Self
    }

    fn ensure_can_edit(principal: &Principal) -> Result<()> {
        if !principal.can_edit {
            return Err(ProgressionError::EditPermissionRequired);
        }
        Ok(())
    }

    /// Put the first stop in progress on a virgin train.
    pub async fn start_train(
        &self,
        db: &DatabaseConnection,
        train_id: Uuid,
        principal: &Principal,
    ) -> Result<Stop> {
        Self::ensure_can_edit(principal)?;

        let stops = Stop::find_by_train_id(db, train_id).await?;
        let Some(first) = stops.first() else {
            return Err(ProgressionError::NoStopsFound);
        };
        if first.status != StopStatus::NotStarted {
            return Err(ProgressionError::AlreadyStarted);
        }

        Ok(Stop::update_status(db, first.id, StopStatus::InProgress, principal.id).await?)
    }

    /// Apply the single-stop transform to one stop. No cross-stop side
    /// effects; moving the head lives in [`Self::advance_to_next_stop`].
    pub async fn update_stop_status(
        &self,
        db: &DatabaseConnection,
        stop_id: Uuid,
        new_status: StopStatus,
        principal: &Principal,
    ) -> Result<Stop> {
        Self::ensure_can_edit(principal)?;
        Ok(Stop::update_status(db, stop_id, new_status, principal.id).await?)
    }

    /// Complete the current stop and hand the train to the next one. Both
    /// writes commit in one transaction so a crash can not leave the current
    /// stop done without its successor started.
    pub async fn advance_to_next_stop(
        &self,
        db: &DatabaseConnection,
        train_id: Uuid,
        principal: &Principal,
    ) -> Result<AdvanceOutcome> {
        Self::ensure_can_edit(principal)?;

        let stops = Stop::find_by_train_id(db, train_id).await?;
        let Some(current) = release_train::current_stop(&stops) else {
            return Ok(AdvanceOutcome::NoActiveStop);
        };
        let next = stops.iter().find(|s| s.number > current.number);

        let txn = db.begin().await?;
        let completed =
            Stop::update_status(&txn, current.id, StopStatus::Done, principal.id).await?;
        let started = match next {
            Some(next) => {
                Some(Stop::update_status(&txn, next.id, StopStatus::InProgress, principal.id).await?)
            }
            None => None,
        };
        txn.commit().await?;

        Ok(match started {
            Some(started) => AdvanceOutcome::Advanced { completed, started },
            None => AdvanceOutcome::TrainCompleted { completed },
        })
    }

    /// Restart the workflow: every stop back to `not_started` with cleared
    /// timestamps. Notes survive; they are the history of the previous run.
    pub async fn reset_train(
        &self,
        db: &DatabaseConnection,
        train_id: Uuid,
        principal: &Principal,
    ) -> Result<u64> {
        Self::ensure_can_edit(principal)?;
        Ok(Stop::reset_all_for_train(db, train_id, principal.id).await?)
    }
}

#[cfg(test)]
mod tests {
    use db::{
        models::{
            app::{App, CreateApp},
            note::{CreateNote, Note},
            release_train::{
                self, CreateReleaseTrain, ReleaseTrain, TrainStatus, derived_status,
                is_complete, progress_percent,
            },
            stop::CreateStop,
        },
        types::{Platform, StopOwnerType},
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
                platform: Platform::Ios,
                version: "3.1.0".to_string(),
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

    fn active_stop_count(stops: &[Stop]) -> usize {
        stops.iter().filter(|s| s.status.is_active()).count()
    }

    #[tokio::test]
    async fn start_train_puts_first_stop_in_progress() {
        let db = setup_db().await;
        let train = seed_train(&db, 10).await;
        let engine = ProgressionService::new();
        let editor = Principal::editor(Uuid::new_v4(), "Dana");

        let started = engine.start_train(&db, train.id, &editor).await.unwrap();
        assert_eq!(started.number, 1);
        assert_eq!(started.status, StopStatus::InProgress);
        assert!(started.started_at.is_some());
        assert_eq!(started.updated_by, Some(editor.id));

        let stops = Stop::find_by_train_id(&db, train.id).await.unwrap();
        assert!(
            stops
                .iter()
                .skip(1)
                .all(|s| s.status == StopStatus::NotStarted)
        );
    }

    #[tokio::test]
    async fn start_train_rejects_non_virgin_train() {
        let db = setup_db().await;
        let train = seed_train(&db, 3).await;
        let engine = ProgressionService::new();
        let editor = Principal::editor(Uuid::new_v4(), "Dana");

        engine.start_train(&db, train.id, &editor).await.unwrap();
        let err = engine.start_train(&db, train.id, &editor).await.unwrap_err();
        assert!(matches!(err, ProgressionError::AlreadyStarted));
    }

    #[tokio::test]
    async fn start_train_requires_stops() {
        let db = setup_db().await;
        let train = seed_train(&db, 0).await;
        let engine = ProgressionService::new();
        let editor = Principal::editor(Uuid::new_v4(), "Dana");

        let err = engine.start_train(&db, train.id, &editor).await.unwrap_err();
        assert!(matches!(err, ProgressionError::NoStopsFound));
    }

    #[tokio::test]
    async fn start_train_requires_edit_capability() {
        let db = setup_db().await;
        let train = seed_train(&db, 3).await;
        let engine = ProgressionService::new();
        let viewer = Principal::viewer(Uuid::new_v4(), "Sam");

        let err = engine.start_train(&db, train.id, &viewer).await.unwrap_err();
        assert!(matches!(err, ProgressionError::EditPermissionRequired));
    }

    #[tokio::test]
    async fn advance_completes_current_and_starts_next() {
        let db = setup_db().await;
        let train = seed_train(&db, 10).await;
        let engine = ProgressionService::new();
        let editor = Principal::editor(Uuid::new_v4(), "Dana");

        engine.start_train(&db, train.id, &editor).await.unwrap();
        engine
            .advance_to_next_stop(&db, train.id, &editor)
            .await
            .unwrap();
        let outcome = engine
            .advance_to_next_stop(&db, train.id, &editor)
            .await
            .unwrap();

        let AdvanceOutcome::Advanced { completed, started } = outcome else {
            panic!("expected an advance");
        };
        assert_eq!(completed.number, 2);
        assert_eq!(completed.status, StopStatus::Done);
        assert!(completed.completed_at.is_some());
        assert_eq!(started.number, 3);
        assert_eq!(started.status, StopStatus::InProgress);
        assert!(started.started_at.is_some());

        let stops = Stop::find_by_train_id(&db, train.id).await.unwrap();
        assert!(stops[..2].iter().all(|s| s.status == StopStatus::Done));
        assert!(
            stops[3..]
                .iter()
                .all(|s| s.status == StopStatus::NotStarted)
        );
        assert_eq!(active_stop_count(&stops), 1);
    }

    #[tokio::test]
    async fn advance_without_active_stop_is_a_noop() {
        let db = setup_db().await;
        let train = seed_train(&db, 3).await;
        let engine = ProgressionService::new();
        let editor = Principal::editor(Uuid::new_v4(), "Dana");

        let before = Stop::find_by_train_id(&db, train.id).await.unwrap();
        let outcome = engine
            .advance_to_next_stop(&db, train.id, &editor)
            .await
            .unwrap();
        assert!(matches!(outcome, AdvanceOutcome::NoActiveStop));

        let after = Stop::find_by_train_id(&db, train.id).await.unwrap();
        for (b, a) in before.iter().zip(after.iter()) {
            assert_eq!(b.status, a.status);
            assert_eq!(b.updated_at, a.updated_at);
        }
    }

    #[tokio::test]
    async fn advancing_past_the_last_stop_completes_the_train() {
        let db = setup_db().await;
        let train = seed_train(&db, 3).await;
        let engine = ProgressionService::new();
        let editor = Principal::editor(Uuid::new_v4(), "Dana");

        engine.start_train(&db, train.id, &editor).await.unwrap();
        for _ in 0..2 {
            engine
                .advance_to_next_stop(&db, train.id, &editor)
                .await
                .unwrap();
        }
        let outcome = engine
            .advance_to_next_stop(&db, train.id, &editor)
            .await
            .unwrap();
        assert!(matches!(outcome, AdvanceOutcome::TrainCompleted { .. }));

        let stops = Stop::find_by_train_id(&db, train.id).await.unwrap();
        assert!(is_complete(&stops));
        assert_eq!(progress_percent(&stops), 100.0);
        assert_eq!(derived_status(&stops), TrainStatus::Complete);

        // Further advances are no-ops and completion never regresses.
        let outcome = engine
            .advance_to_next_stop(&db, train.id, &editor)
            .await
            .unwrap();
        assert!(matches!(outcome, AdvanceOutcome::NoActiveStop));
        let stops = Stop::find_by_train_id(&db, train.id).await.unwrap();
        assert_eq!(release_train::completed_count(&stops), 3);
    }

    #[tokio::test]
    async fn completed_count_is_monotonic_across_advances() {
        let db = setup_db().await;
        let train = seed_train(&db, 5).await;
        let engine = ProgressionService::new();
        let editor = Principal::editor(Uuid::new_v4(), "Dana");

        engine.start_train(&db, train.id, &editor).await.unwrap();
        let mut last_completed = 0;
        for _ in 0..7 {
            engine
                .advance_to_next_stop(&db, train.id, &editor)
                .await
                .unwrap();
            let stops = Stop::find_by_train_id(&db, train.id).await.unwrap();
            let completed = release_train::completed_count(&stops);
            assert!(completed >= last_completed);
            assert!(active_stop_count(&stops) <= 1);
            last_completed = completed;
        }
        assert_eq!(last_completed, 5);
    }

    #[tokio::test]
    async fn blocked_stop_round_trips_through_in_progress() {
        let db = setup_db().await;
        let train = seed_train(&db, 3).await;
        let engine = ProgressionService::new();
        let editor = Principal::editor(Uuid::new_v4(), "Dana");

        let head = engine.start_train(&db, train.id, &editor).await.unwrap();
        let blocked = engine
            .update_stop_status(&db, head.id, StopStatus::Blocked, &editor)
            .await
            .unwrap();
        assert_eq!(blocked.status, StopStatus::Blocked);
        // Blocking does not disturb the original start time.
        assert_eq!(blocked.started_at, head.started_at);

        let stops = Stop::find_by_train_id(&db, train.id).await.unwrap();
        assert_eq!(derived_status(&stops), TrainStatus::Blocked);
        assert_eq!(active_stop_count(&stops), 1);

        let resumed = engine
            .update_stop_status(&db, head.id, StopStatus::InProgress, &editor)
            .await
            .unwrap();
        assert_eq!(resumed.status, StopStatus::InProgress);
        assert_eq!(resumed.started_at, head.started_at);
    }

    #[tokio::test]
    async fn reset_round_trips_to_a_fresh_train_and_keeps_notes() {
        let db = setup_db().await;
        let train = seed_train(&db, 4).await;
        let engine = ProgressionService::new();
        let editor = Principal::editor(Uuid::new_v4(), "Dana");

        engine.start_train(&db, train.id, &editor).await.unwrap();
        engine
            .advance_to_next_stop(&db, train.id, &editor)
            .await
            .unwrap();

        let stops = Stop::find_by_train_id(&db, train.id).await.unwrap();
        Note::create(
            &db,
            &CreateNote {
                stop_id: stops[0].id,
                author_id: editor.id,
                author_name: editor.display_name.clone(),
                body: "build 1042 signed off".to_string(),
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();

        let reset_count = engine.reset_train(&db, train.id, &editor).await.unwrap();
        assert_eq!(reset_count, 4);

        let stops = Stop::find_by_train_id(&db, train.id).await.unwrap();
        for stop in &stops {
            assert_eq!(stop.status, StopStatus::NotStarted);
            assert_eq!(stop.started_at, None);
            assert_eq!(stop.completed_at, None);
            assert_eq!(stop.updated_by, Some(editor.id));
        }
        assert_eq!(derived_status(&stops), TrainStatus::NotStarted);

        let notes = Note::find_by_stop_id(&db, stops[0].id).await.unwrap();
        assert_eq!(notes.len(), 1);

        // The restarted train looks exactly like a freshly created one.
        let restarted = engine.start_train(&db, train.id, &editor).await.unwrap();
        assert_eq!(restarted.number, 1);
        assert_eq!(restarted.status, StopStatus::InProgress);
    }

    #[tokio::test]
    async fn advance_on_missing_train_reports_not_found() {
        let db = setup_db().await;
        let engine = ProgressionService::new();
        let editor = Principal::editor(Uuid::new_v4(), "Dana");

        let err = engine
            .advance_to_next_stop(&db, Uuid::new_v4(), &editor)
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressionError::TrainNotFound));
    }
}
