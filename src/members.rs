use log::info;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, IntoActiveModel,
    QueryFilter, Set,
};

use crate::model::member;

pub async fn find_by_telegram_id<C: ConnectionTrait>(
    conn: &C,
    telegram_id: i64,
) -> Result<Option<member::Model>, DbErr> {
    member::Entity::find()
        .filter(member::Column::TelegramId.eq(telegram_id))
        .one(conn)
        .await
}

/// Register a sender. New members start out not allowed to act.
/// Registering again returns the existing row untouched.
pub async fn register<C: ConnectionTrait>(
    conn: &C,
    telegram_id: i64,
    username: &str,
) -> Result<member::Model, DbErr> {
    if let Some(existing) = find_by_telegram_id(conn, telegram_id).await? {
        return Ok(existing);
    }

    let registered = member::ActiveModel {
        telegram_id: Set(telegram_id),
        username: Set(username.to_string()),
        allowed: Set(false),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    info!("Registered {username} as member {}", registered.id);
    Ok(registered)
}

/// Approve a registered member by username. `None` if nobody registered under it.
pub async fn allow<C: ConnectionTrait>(
    conn: &C,
    username: &str,
) -> Result<Option<member::Model>, DbErr> {
    let user = member::Entity::find()
        .filter(member::Column::Username.eq(username))
        .one(conn)
        .await?;

    let user = match user {
        Some(u) => u,
        None => return Ok(None),
    };

    let mut user_active = user.into_active_model();
    user_active.allowed = Set(true);
    let updated = user_active.update(conn).await?;

    info!("Allowed member {} ({})", updated.id, updated.username);
    Ok(Some(updated))
}
