use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::DatabaseBackend;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(Apps::Table)
                    .col(pk_id_col(manager, Apps::Id))
                    .col(uuid_col(Apps::Uuid))
                    .col(ColumnDef::new(Apps::Name).string().not_null())
                    .col(ColumnDef::new(Apps::Description).text())
                    .col(timestamp_col(Apps::CreatedAt))
                    .col(timestamp_col(Apps::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_apps_uuid")
                    .table(Apps::Table)
                    .col(Apps::Uuid)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(ReleaseTrains::Table)
                    .col(pk_id_col(manager, ReleaseTrains::Id))
                    .col(uuid_col(ReleaseTrains::Uuid))
                    .col(fk_id_col(manager, ReleaseTrains::AppId))
                    .col(
                        ColumnDef::new(ReleaseTrains::Platform)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ReleaseTrains::Version).string().not_null())
                    .col(
                        ColumnDef::new(ReleaseTrains::IsActive)
                            .boolean()
                            .not_null()
                            .default(Expr::val(true)),
                    )
                    .col(ColumnDef::new(ReleaseTrains::Deadline).date())
                    .col(timestamp_col(ReleaseTrains::CreatedAt))
                    .col(timestamp_col(ReleaseTrains::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_release_trains_app_id")
                            .from(ReleaseTrains::Table, ReleaseTrains::AppId)
                            .to(Apps::Table, Apps::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_release_trains_uuid")
                    .table(ReleaseTrains::Table)
                    .col(ReleaseTrains::Uuid)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // One train per (app, platform, version) triple.
        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_release_trains_app_platform_version")
                    .table(ReleaseTrains::Table)
                    .col(ReleaseTrains::AppId)
                    .col(ReleaseTrains::Platform)
                    .col(ReleaseTrains::Version)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(Stops::Table)
                    .col(pk_id_col(manager, Stops::Id))
                    .col(uuid_col(Stops::Uuid))
                    .col(fk_id_col(manager, Stops::ReleaseTrainId))
                    .col(ColumnDef::new(Stops::Number).integer().not_null())
                    .col(ColumnDef::new(Stops::Title).string().not_null())
                    .col(ColumnDef::new(Stops::Description).text())
                    .col(
                        ColumnDef::new(Stops::OwnerType)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Stops::OwnerName).string().not_null())
                    .col(
                        ColumnDef::new(Stops::Status)
                            .string_len(32)
                            .not_null()
                            .default(Expr::val("not_started")),
                    )
                    .col(ColumnDef::new(Stops::StartedAt).timestamp())
                    .col(ColumnDef::new(Stops::CompletedAt).timestamp())
                    .col(uuid_nullable_col(Stops::UpdatedBy))
                    .col(timestamp_col(Stops::CreatedAt))
                    .col(timestamp_col(Stops::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_stops_release_train_id")
                            .from(Stops::Table, Stops::ReleaseTrainId)
                            .to(ReleaseTrains::Table, ReleaseTrains::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_stops_uuid")
                    .table(Stops::Table)
                    .col(Stops::Uuid)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_stops_train_number")
                    .table(Stops::Table)
                    .col(Stops::ReleaseTrainId)
                    .col(Stops::Number)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(Notes::Table)
                    .col(pk_id_col(manager, Notes::Id))
                    .col(uuid_col(Notes::Uuid))
                    .col(fk_id_col(manager, Notes::StopId))
                    .col(uuid_col(Notes::AuthorId))
                    .col(ColumnDef::new(Notes::AuthorName).string().not_null())
                    .col(ColumnDef::new(Notes::Body).text().not_null())
                    .col(timestamp_col(Notes::CreatedAt))
                    .col(timestamp_col(Notes::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_notes_stop_id")
                            .from(Notes::Table, Notes::StopId)
                            .to(Stops::Table, Stops::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_notes_uuid")
                    .table(Notes::Table)
                    .col(Notes::Uuid)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_notes_stop_id")
                    .table(Notes::Table)
                    .col(Notes::StopId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(EventOutbox::Table)
                    .col(pk_id_col(manager, EventOutbox::Id))
                    .col(uuid_col(EventOutbox::Uuid))
                    .col(ColumnDef::new(EventOutbox::EventType).string().not_null())
                    .col(ColumnDef::new(EventOutbox::EntityType).string().not_null())
                    .col(uuid_col(EventOutbox::EntityUuid))
                    .col(ColumnDef::new(EventOutbox::Payload).json().not_null())
                    .col(timestamp_col(EventOutbox::CreatedAt))
                    .col(ColumnDef::new(EventOutbox::PublishedAt).timestamp())
                    .col(
                        ColumnDef::new(EventOutbox::Attempts)
                            .integer()
                            .not_null()
                            .default(Expr::val(0)),
                    )
                    .col(ColumnDef::new(EventOutbox::LastError).text())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_event_outbox_published_at")
                    .table(EventOutbox::Table)
                    .col(EventOutbox::PublishedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EventOutbox::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Notes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Stops::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ReleaseTrains::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Apps::Table).to_owned())
            .await?;
        Ok(())
    }
}

fn pk_id_col<T: Iden>(manager: &SchemaManager, col: T) -> ColumnDef {
    let mut col = ColumnDef::new(col);
    match manager.get_database_backend() {
        DatabaseBackend::Sqlite => {
            col.integer();
        }
        _ => {
            col.big_integer();
        }
    }
    col.not_null().auto_increment().primary_key().to_owned()
}

fn fk_id_col<T: Iden>(manager: &SchemaManager, col: T) -> ColumnDef {
    let mut col = ColumnDef::new(col);
    match manager.get_database_backend() {
        DatabaseBackend::Sqlite => {
            col.integer();
        }
        _ => {
            col.big_integer();
        }
    }
    col.not_null().to_owned()
}

fn uuid_col<T: Iden>(col: T) -> ColumnDef {
    ColumnDef::new(col).uuid().not_null().to_owned()
}

fn uuid_nullable_col<T: Iden>(col: T) -> ColumnDef {
    ColumnDef::new(col).uuid().to_owned()
}

fn timestamp_col<T: Iden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .timestamp()
        .not_null()
        .default(Expr::current_timestamp())
        .to_owned()
}

#[derive(Iden)]
enum Apps {
    Table,
    Id,
    Uuid,
    Name,
    Description,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum ReleaseTrains {
    Table,
    Id,
    Uuid,
    AppId,
    Platform,
    Version,
    IsActive,
    Deadline,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Stops {
    Table,
    Id,
    Uuid,
    ReleaseTrainId,
    Number,
    Title,
    Description,
    OwnerType,
    OwnerName,
    Status,
    StartedAt,
    CompletedAt,
    UpdatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Notes {
    Table,
    Id,
    Uuid,
    StopId,
    AuthorId,
    AuthorName,
    Body,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum EventOutbox {
    Table,
    Id,
    Uuid,
    EventType,
    EntityType,
    EntityUuid,
    Payload,
    CreatedAt,
    PublishedAt,
    Attempts,
    LastError,
}
