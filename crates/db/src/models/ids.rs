use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QuerySelect};
use uuid::Uuid;

use crate::entities::{app, release_train, stop};

pub async fn app_id_by_uuid<C: ConnectionTrait>(
    db: &C,
    uuid: Uuid,
) -> Result<Option<i64>, DbErr> {
    app::Entity::find()
        .select_only()
        .column(app::Column::Id)
        .filter(app::Column::Uuid.eq(uuid))
        .into_tuple()
        .one(db)
        .await
}

pub async fn app_uuid_by_id<C: ConnectionTrait>(
    db: &C,
    id: i64,
) -> Result<Option<Uuid>, DbErr> {
    app::Entity::find()
        .select_only()
        .column(app::Column::Uuid)
        .filter(app::Column::Id.eq(id))
        .into_tuple()
        .one(db)
        .await
}

pub async fn train_id_by_uuid<C: ConnectionTrait>(
    db: &C,
    uuid: Uuid,
) -> Result<Option<i64>, DbErr> {
    release_train::Entity::find()
        .select_only()
        .column(release_train::Column::Id)
        .filter(release_train::Column::Uuid.eq(uuid))
        .into_tuple()
        .one(db)
        .await
}

pub async fn train_uuid_by_id<C: ConnectionTrait>(
    db: &C,
    id: i64,
) -> Result<Option<Uuid>, DbErr> {
    release_train::Entity::find()
        .select_only()
        .column(release_train::Column::Uuid)
        .filter(release_train::Column::Id.eq(id))
        .into_tuple()
        .one(db)
        .await
}

pub async fn stop_id_by_uuid<C: ConnectionTrait>(
    db: &C,
    uuid: Uuid,
) -> Result<Option<i64>, DbErr> {
    stop::Entity::find()
        .select_only()
        .column(stop::Column::Id)
        .filter(stop::Column::Uuid.eq(uuid))
        .into_tuple()
        .one(db)
        .await
}

pub async fn stop_uuid_by_id<C: ConnectionTrait>(
    db: &C,
    id: i64,
) -> Result<Option<Uuid>, DbErr> {
    stop::Entity::find()
        .select_only()
        .column(stop::Column::Uuid)
        .filter(stop::Column::Id.eq(id))
        .into_tuple()
        .one(db)
        .await
}

#[cfg(test)]
mod tests {
    use sea_orm::Database;
    use sea_orm_migration::MigratorTrait;

    use crate::{
        models::{
            app::{App, CreateApp},
            release_train::{CreateReleaseTrain, ReleaseTrain},
        },
        types::Platform,
    };

    use super::*;

    async fn setup_db() -> sea_orm::DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db_migration::Migrator::up(&db, None).await.unwrap();
        db
    }

    #[tokio::test]
    async fn ids_roundtrip_for_apps_and_trains() {
        let db = setup_db().await;

        let app_id = Uuid::new_v4();
        let app = App::create(
            &db,
            &CreateApp {
                name: "Weather".to_string(),
                description: None,
            },
            app_id,
        )
        .await
        .unwrap();
        assert_eq!(app.id, app_id);

        let app_row_id = app_id_by_uuid(&db, app_id)
            .await
            .unwrap()
            .expect("app row id");
        assert_eq!(app_uuid_by_id(&db, app_row_id).await.unwrap(), Some(app_id));

        let train_id = Uuid::new_v4();
        let train = ReleaseTrain::create(
            &db,
            &CreateReleaseTrain {
                app_id,
                platform: Platform::Ios,
                version: "1.0.0".to_string(),
                deadline: None,
            },
            train_id,
        )
        .await
        .unwrap();
        assert_eq!(train.id, train_id);
        assert_eq!(train.app_id, app_id);

        let train_row_id = train_id_by_uuid(&db, train_id)
            .await
            .unwrap()
            .expect("train row id");
        assert_eq!(
            train_uuid_by_id(&db, train_row_id).await.unwrap(),
            Some(train_id)
        );
    }
}
