//! Leaderboards over non-owned titles.
//!
//! The all-time board reads the running counts kept in the `tally` table. A
//! windowed board counts the individual `vote` rows cast since a point in
//! time. Both are ordered by count (highest first), ties broken by
//! case-insensitive name and then by title id, so the output is deterministic.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Days, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use itertools::Itertools;
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder};

use crate::model::{tally, title, vote};

/// One leaderboard row
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Standing {
    pub title_id: i32,
    pub name: String,
    pub count: i64,
}

/// Ranked vote counts for non-owned titles. With `since`, only votes cast at
/// or after that instant are counted. Titles without votes are left out.
pub async fn tally<C: ConnectionTrait>(
    conn: &C,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<Standing>, DbErr> {
    let titles: HashMap<i32, title::Model> = title::Entity::find()
        .filter(title::Column::Owned.eq(false))
        .all(conn)
        .await?
        .into_iter()
        .map(|t| (t.id, t))
        .collect();

    let counts: HashMap<i32, i64> = match since {
        None => tally::Entity::find()
            .filter(tally::Column::Count.gt(0))
            .all(conn)
            .await?
            .into_iter()
            .map(|t| (t.title_id, t.count))
            .collect(),
        Some(since) => vote::Entity::find()
            .filter(vote::Column::CreatedAt.gte(since))
            .all(conn)
            .await?
            .into_iter()
            .counts_by(|v| v.title_id)
            .into_iter()
            .map(|(id, n)| (id, n as i64))
            .collect(),
    };

    Ok(rank(&titles, counts))
}

fn rank(titles: &HashMap<i32, title::Model>, counts: HashMap<i32, i64>) -> Vec<Standing> {
    counts
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .filter_map(|(id, count)| titles.get(&id).map(|t| (t, count)))
        .sorted_by(|(a, a_count), (b, b_count)| {
            b_count
                .cmp(a_count)
                .then_with(|| a.name_key.cmp(&b.name_key))
                .then_with(|| a.id.cmp(&b.id))
        })
        .map(|(t, count)| Standing {
            title_id: t.id,
            name: t.name.clone(),
            count,
        })
        .collect()
}

/// Monday 00:00 local time of the week containing `now`.
pub fn week_start(now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let today = now.with_timezone(&tz).date_naive();
    let monday = today - Days::new(u64::from(today.weekday().num_days_from_monday()));
    local_midnight(monday, tz)
}

fn local_midnight(day: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let midnight = day.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&midnight) {
        LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => t.with_timezone(&Utc),
        // midnight skipped by a DST jump; take the first hour that exists
        LocalResult::None => (1..=3)
            .find_map(|h| {
                tz.from_local_datetime(&(midnight + chrono::Duration::hours(h)))
                    .earliest()
            })
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&midnight)),
    }
}

/// Owned titles, alphabetically.
pub async fn owned_titles<C: ConnectionTrait>(conn: &C) -> Result<Vec<title::Model>, DbErr> {
    title::Entity::find()
        .filter(title::Column::Owned.eq(true))
        .order_by_asc(title::Column::NameKey)
        .all(conn)
        .await
}

/// Non-owned titles whose name contains `fragment` (any case), best all-time
/// count first.
pub async fn suggest<C: ConnectionTrait>(
    conn: &C,
    fragment: &str,
    limit: usize,
) -> Result<Vec<Standing>, DbErr> {
    let fragment = title::name_key(fragment);
    if fragment.is_empty() {
        return Ok(vec![]);
    }

    // matched here rather than with LIKE, where `%` and `_` are wildcards
    let titles = title::Entity::find()
        .filter(title::Column::Owned.eq(false))
        .all(conn)
        .await?
        .into_iter()
        .filter(|t| t.name_key.contains(&fragment))
        .collect_vec();

    let counts: HashMap<i32, i64> = tally::Entity::find()
        .filter(tally::Column::TitleId.is_in(titles.iter().map(|t| t.id).collect_vec()))
        .all(conn)
        .await?
        .into_iter()
        .map(|t| (t.title_id, t.count))
        .collect();

    Ok(titles
        .into_iter()
        .map(|t| Standing {
            count: counts.get(&t.id).copied().unwrap_or(0),
            title_id: t.id,
            name: t.name,
        })
        .sorted_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| title::name_key(&a.name).cmp(&title::name_key(&b.name)))
                .then_with(|| a.title_id.cmp(&b.title_id))
        })
        .take(limit)
        .collect())
}

#[cfg(test)]
mod tests {
    use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

    use super::*;
    use crate::db::testing::{add_member, memory_db, utc};

    async fn seed_title(db: &DatabaseConnection, name: &str, owned: bool, count: i64) -> i32 {
        let creator = add_member(db, &format!("creator of {name}")).await;
        let t = title::ActiveModel {
            name: Set(name.to_string()),
            name_key: Set(title::name_key(name)),
            owned: Set(owned),
            creator_id: Set(creator.id),
            created_at: Set(utc(2026, 10, 1, 12, 0)),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap();
        tally::ActiveModel {
            title_id: Set(t.id),
            count: Set(count),
        }
        .insert(db)
        .await
        .unwrap();
        t.id
    }

    async fn cast(db: &DatabaseConnection, title_id: i32, at: DateTime<Utc>) {
        vote::ActiveModel {
            title_id: Set(title_id),
            member_id: Set(1),
            created_at: Set(at),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap();
    }

    fn board(standings: &[Standing]) -> Vec<(&str, i64)> {
        standings.iter().map(|s| (s.name.as_str(), s.count)).collect()
    }

    #[tokio::test]
    async fn all_time_excludes_owned_and_unvoted() {
        let db = memory_db().await;
        seed_title(&db, "Foo", false, 3).await;
        seed_title(&db, "Bar", false, 5).await;
        seed_title(&db, "Baz", true, 0).await;
        seed_title(&db, "Qux", false, 0).await;
        seed_title(&db, "Owned Favourite", true, 9).await;

        let standings = tally(&db, None).await.unwrap();
        assert_eq!(board(&standings), vec![("Bar", 5), ("Foo", 3)]);
    }

    #[tokio::test]
    async fn ties_are_broken_by_name() {
        let db = memory_db().await;
        seed_title(&db, "zeta", false, 2).await;
        seed_title(&db, "Alpha", false, 2).await;
        seed_title(&db, "beta", false, 2).await;

        let standings = tally(&db, None).await.unwrap();
        assert_eq!(board(&standings), vec![("Alpha", 2), ("beta", 2), ("zeta", 2)]);
    }

    #[tokio::test]
    async fn window_counts_only_votes_since_monday() {
        let db = memory_db().await;
        let foo = seed_title(&db, "Foo", false, 3).await;
        let bar = seed_title(&db, "Bar", false, 2).await;

        // Wednesday 2026-10-14 noon in Chicago
        let now = utc(2026, 10, 14, 17, 0);
        let monday = week_start(now, chrono_tz::America::Chicago);
        assert_eq!(monday, utc(2026, 10, 12, 5, 0));

        cast(&db, foo, utc(2026, 10, 9, 15, 0)).await; // last Friday
        cast(&db, foo, utc(2026, 10, 12, 4, 59)).await; // Sunday 23:59 local
        cast(&db, foo, utc(2026, 10, 13, 15, 0)).await;
        cast(&db, bar, utc(2026, 10, 12, 5, 0)).await; // Monday 00:00 local
        cast(&db, bar, utc(2026, 10, 14, 15, 0)).await;

        let standings = tally(&db, Some(monday)).await.unwrap();
        assert_eq!(board(&standings), vec![("Bar", 2), ("Foo", 1)]);
    }

    #[tokio::test]
    async fn window_skips_owned_titles() {
        let db = memory_db().await;
        let owned = seed_title(&db, "Gone", true, 1).await;
        cast(&db, owned, utc(2026, 10, 13, 15, 0)).await;

        let standings = tally(&db, Some(utc(2026, 10, 12, 5, 0))).await.unwrap();
        assert!(standings.is_empty());
    }

    #[test]
    fn every_day_of_a_week_maps_to_its_monday() {
        let tz = chrono_tz::America::Chicago;
        for day in 12..=18 {
            assert_eq!(week_start(utc(2026, 10, day, 17, 0), tz), utc(2026, 10, 12, 5, 0));
        }
        // early Monday UTC is still Sunday in Chicago
        assert_eq!(week_start(utc(2026, 10, 19, 3, 0), tz), utc(2026, 10, 12, 5, 0));
    }

    #[test]
    fn missing_midnight_falls_forward() {
        // Sao Paulo skipped from 00:00 to 01:00 on 2018-11-04
        let day = NaiveDate::from_ymd_opt(2018, 11, 4).unwrap();
        let start = local_midnight(day, chrono_tz::America::Sao_Paulo);
        assert_eq!(start, utc(2018, 11, 4, 3, 0));

        // an ordinary day is plain midnight
        let day = NaiveDate::from_ymd_opt(2018, 11, 5).unwrap();
        assert_eq!(local_midnight(day, chrono_tz::America::Sao_Paulo), utc(2018, 11, 5, 2, 0));
    }

    #[test]
    fn week_start_in_utc() {
        let start = week_start(utc(2026, 10, 16, 23, 59), chrono_tz::UTC);
        assert_eq!(start, utc(2026, 10, 12, 0, 0));
    }

    #[tokio::test]
    async fn suggest_matches_any_case() {
        let db = memory_db().await;
        seed_title(&db, "Halo 3", false, 1).await;
        seed_title(&db, "Halo Reach", false, 4).await;
        seed_title(&db, "Halo 2", true, 0).await;
        seed_title(&db, "Fable", false, 7).await;

        let found = suggest(&db, "HALO", 10).await.unwrap();
        assert_eq!(board(&found), vec![("Halo Reach", 4), ("Halo 3", 1)]);

        assert!(suggest(&db, "   ", 10).await.unwrap().is_empty());
        assert!(suggest(&db, "%", 10).await.unwrap().is_empty());
        assert!(suggest(&db, "halo_", 10).await.unwrap().is_empty());
        assert_eq!(suggest(&db, "halo", 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn owned_titles_are_listed_alphabetically() {
        let db = memory_db().await;
        seed_title(&db, "zork", true, 0).await;
        seed_title(&db, "Asteroids", true, 0).await;
        seed_title(&db, "Pending", false, 0).await;

        let names: Vec<_> = owned_titles(&db).await.unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["Asteroids", "zork"]);
    }
}
