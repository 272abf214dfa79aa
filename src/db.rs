use log::info;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait, Schema};

use crate::model;

/// Connect to `url` and create any missing tables.
pub async fn connect(url: &str) -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(url).await?;
    create_tables(&db).await?;
    Ok(db)
}

pub async fn create_tables<C: ConnectionTrait>(db: &C) -> Result<(), DbErr> {
    create_table(model::member::Entity, db).await?;
    create_table(model::title::Entity, db).await?;
    create_table(model::tally::Entity, db).await?;
    create_table(model::vote::Entity, db).await?;
    create_table(model::activity::Entity, db).await?;
    info!("Tables ready");
    Ok(())
}

async fn create_table<E: EntityTrait, C: ConnectionTrait>(entity: E, db: &C) -> Result<(), DbErr> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;

    Ok(())
}
