//! Append-only log of gated actions.
//!
//! A member's latest entry is the one with the latest timestamp; entries
//! stamped with the same instant fall back to insertion order (id).

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use log::debug;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};

use crate::model::{
    activity::{self, Action},
    title,
};

/// How far back `last_action_time` looks. Only bounds the lookup; the rate
/// limiter itself compares calendar days.
pub const RECENT_WINDOW_DAYS: i64 = 2;

pub async fn record<C: ConnectionTrait>(
    conn: &C,
    member_id: i32,
    action: Action,
    title_id: i32,
    at: DateTime<Utc>,
) -> Result<activity::Model, DbErr> {
    let entry = activity::ActiveModel {
        member_id: Set(member_id),
        action: Set(action.as_str().to_string()),
        title_id: Set(title_id),
        created_at: Set(at),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    debug!("member {member_id} {action} title {title_id}");
    Ok(entry)
}

/// Timestamp of the member's latest entry, if it lies within the recency window.
pub async fn last_action_time<C: ConnectionTrait>(
    conn: &C,
    member_id: i32,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, DbErr> {
    let horizon = now - Duration::days(RECENT_WINDOW_DAYS);
    let latest = activity::Entity::find()
        .filter(activity::Column::MemberId.eq(member_id))
        .filter(activity::Column::CreatedAt.gte(horizon))
        .order_by_desc(activity::Column::CreatedAt)
        .order_by_desc(activity::Column::Id)
        .one(conn)
        .await?;

    Ok(latest.map(|entry| entry.created_at))
}

/// A member's entries, newest first, with the name of the title each one touched.
pub async fn history<C: ConnectionTrait>(
    conn: &C,
    member_id: i32,
) -> Result<Vec<(activity::Model, String)>, DbErr> {
    let entries = activity::Entity::find()
        .filter(activity::Column::MemberId.eq(member_id))
        .order_by_desc(activity::Column::CreatedAt)
        .order_by_desc(activity::Column::Id)
        .all(conn)
        .await?;

    let title_ids: Vec<i32> = entries.iter().map(|e| e.title_id).collect();
    let names: HashMap<i32, String> = title::Entity::find()
        .filter(title::Column::Id.is_in(title_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|t| (t.id, t.name))
        .collect();

    Ok(entries
        .into_iter()
        .map(|entry| {
            let name = names
                .get(&entry.title_id)
                .cloned()
                .unwrap_or_else(|| format!("#{}", entry.title_id));
            (entry, name)
        })
        .collect())
}
