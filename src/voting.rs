//! Adding and voting on titles.
//!
//! Every gated action runs inside a per-member lock and a single database
//! transaction: check the rate limit, mutate, append to the ledger, commit.
//! Returning early drops the transaction, which rolls it back, so a rejected
//! action leaves nothing behind.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, Utc};
use log::{info, warn};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, EntityTrait, IntoActiveModel, QueryFilter, Set, TransactionTrait,
};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::{
    error::{Missing, VoteError},
    ledger,
    limiter::RateLimiter,
    model::{activity, activity::Action, member, tally, title, vote},
    tally::{self as board, Standing},
};

/// Longest accepted title, in characters
pub const MAX_TITLE_LEN: usize = 100;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// How a vote names its title
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TitleRef {
    /// Case-insensitive name
    Name(String),
    Id(i32),
}

impl TitleRef {
    /// `#12` refers to title 12; anything else is a name.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        match text.strip_prefix('#').map(str::parse) {
            Some(Ok(id)) => Self::Id(id),
            _ => Self::Name(text.to_string()),
        }
    }
}

/// Successful outcome of a gated action
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Confirmation {
    Added { title: String },
    Voted { title: String, count: i64 },
}

impl fmt::Display for Confirmation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added { title } => write!(f, "{title} has been saved"),
            Self::Voted { title, count } => {
                write!(f, "Your vote for {title} has been counted! ({count} total)")
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Window {
    AllTime,
    /// Since Monday 00:00 local time
    ThisWeek,
}

/// Per-member async locks around check-then-write.
#[derive(Default)]
struct MemberLocks {
    locks: Mutex<HashMap<i32, Arc<AsyncMutex<()>>>>,
}

impl MemberLocks {
    async fn acquire(&self, member_id: i32) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(member_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

pub struct Voting {
    db: DatabaseConnection,
    limiter: RateLimiter,
    clock: Clock,
    locks: MemberLocks,
}

impl Voting {
    pub fn new(db: DatabaseConnection, limiter: RateLimiter) -> Self {
        Self::with_clock(db, limiter, Arc::new(Utc::now))
    }

    pub fn with_clock(db: DatabaseConnection, limiter: RateLimiter, clock: Clock) -> Self {
        Self {
            db,
            limiter,
            clock,
            locks: MemberLocks::default(),
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Propose a title. Proposing a title someone else already proposed
    /// counts as a vote for it.
    pub async fn add_title(&self, member_id: i32, name: &str) -> Result<Confirmation, VoteError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(VoteError::Validation("Title must not be empty".to_string()));
        }
        if name.chars().count() > MAX_TITLE_LEN {
            return Err(VoteError::Validation(format!(
                "Title must be at most {MAX_TITLE_LEN} characters"
            )));
        }

        let _guard = self.locks.acquire(member_id).await;
        let now = self.now();
        let txn = self.db.begin().await?;

        require_member(&txn, member_id).await?;

        let existing = title::Entity::find()
            .filter(title::Column::NameKey.eq(title::name_key(name)))
            .one(&txn)
            .await?;

        let confirmation = match existing {
            Some(t) if t.owned => return Err(VoteError::AlreadyOwned { title: t.name }),
            Some(t) => {
                self.gate(&txn, member_id, now).await?;
                let count = cast_vote(&txn, member_id, &t, now).await?;
                Confirmation::Voted {
                    title: t.name,
                    count,
                }
            }
            None => {
                self.gate(&txn, member_id, now).await?;
                let created = create_title(&txn, member_id, name, now).await?;
                ledger::record(&txn, member_id, Action::Added, created.id, now).await?;
                Confirmation::Added {
                    title: created.name,
                }
            }
        };

        txn.commit().await?;
        info!("member {member_id}: {confirmation}");
        Ok(confirmation)
    }

    /// Vote for a non-owned title.
    pub async fn vote(&self, member_id: i32, title_ref: &TitleRef) -> Result<Confirmation, VoteError> {
        let _guard = self.locks.acquire(member_id).await;
        let now = self.now();
        let txn = self.db.begin().await?;

        require_member(&txn, member_id).await?;

        let (found, missing) = match title_ref {
            TitleRef::Name(name) => (
                title::Entity::find()
                    .filter(title::Column::NameKey.eq(title::name_key(name)))
                    .one(&txn)
                    .await?,
                Missing::TitleName(name.trim().to_string()),
            ),
            TitleRef::Id(id) => (
                title::Entity::find_by_id(*id).one(&txn).await?,
                Missing::TitleId(*id),
            ),
        };
        let target = match found {
            Some(t) if !t.owned => t,
            _ => return Err(VoteError::NotFound(missing)),
        };

        self.gate(&txn, member_id, now).await?;
        let count = cast_vote(&txn, member_id, &target, now).await?;

        txn.commit().await?;
        let confirmation = Confirmation::Voted {
            title: target.name,
            count,
        };
        info!("member {member_id}: {confirmation}");
        Ok(confirmation)
    }

    async fn gate(
        &self,
        txn: &DatabaseTransaction,
        member_id: i32,
        now: DateTime<Utc>,
    ) -> Result<(), VoteError> {
        self.limiter
            .check(txn, member_id, now)
            .await?
            .into_result()
            .map_err(|reason| {
                info!("member {member_id} refused: {reason}");
                VoteError::RateLimited(reason)
            })
    }

    /// Mark a title as owned. Owned titles drop off every board and cannot be voted on.
    pub async fn mark_owned(&self, name: &str) -> Result<title::Model, VoteError> {
        let txn = self.db.begin().await?;
        let found = title::Entity::find()
            .filter(title::Column::NameKey.eq(title::name_key(name)))
            .one(&txn)
            .await?;

        let found = match found {
            Some(t) if t.owned => return Err(VoteError::AlreadyOwned { title: t.name }),
            Some(t) => t,
            None => return Err(VoteError::NotFound(Missing::TitleName(name.trim().to_string()))),
        };

        let mut active = found.into_active_model();
        active.owned = Set(true);
        let updated = active.update(&txn).await?;
        txn.commit().await?;

        info!("{} is now owned", updated.name);
        Ok(updated)
    }

    pub async fn standings(&self, window: Window) -> Result<Vec<Standing>, VoteError> {
        let since = match window {
            Window::AllTime => None,
            Window::ThisWeek => Some(board::week_start(self.now(), self.limiter.timezone())),
        };
        Ok(board::tally(&self.db, since).await?)
    }

    pub async fn owned(&self) -> Result<Vec<title::Model>, VoteError> {
        Ok(board::owned_titles(&self.db).await?)
    }

    pub async fn suggest(&self, fragment: &str, limit: usize) -> Result<Vec<Standing>, VoteError> {
        Ok(board::suggest(&self.db, fragment, limit).await?)
    }

    pub async fn last_action_time(&self, member_id: i32) -> Result<Option<DateTime<Utc>>, VoteError> {
        Ok(ledger::last_action_time(&self.db, member_id, self.now()).await?)
    }

    pub async fn history(&self, member_id: i32) -> Result<Vec<(activity::Model, String)>, VoteError> {
        Ok(ledger::history(&self.db, member_id).await?)
    }
}

async fn require_member<C: ConnectionTrait>(conn: &C, member_id: i32) -> Result<(), VoteError> {
    match member::Entity::find_by_id(member_id).one(conn).await? {
        Some(_) => Ok(()),
        None => {
            warn!("Unknown member {member_id}");
            Err(VoteError::NotFound(Missing::Member(member_id)))
        }
    }
}

/// Create a title together with its zero tally.
async fn create_title<C: ConnectionTrait>(
    conn: &C,
    creator_id: i32,
    name: &str,
    now: DateTime<Utc>,
) -> Result<title::Model, VoteError> {
    let created = title::ActiveModel {
        name: Set(name.to_string()),
        name_key: Set(title::name_key(name)),
        owned: Set(false),
        creator_id: Set(creator_id),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    tally::ActiveModel {
        title_id: Set(created.id),
        count: Set(0),
    }
    .insert(conn)
    .await?;

    Ok(created)
}

/// Bump the tally, store the vote and log it. Returns the new count.
async fn cast_vote<C: ConnectionTrait>(
    conn: &C,
    member_id: i32,
    target: &title::Model,
    now: DateTime<Utc>,
) -> Result<i64, VoteError> {
    tally::Entity::update_many()
        .col_expr(tally::Column::Count, Expr::col(tally::Column::Count).add(1))
        .filter(tally::Column::TitleId.eq(target.id))
        .exec(conn)
        .await?;

    vote::ActiveModel {
        title_id: Set(target.id),
        member_id: Set(member_id),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    ledger::record(conn, member_id, Action::Voted, target.id, now).await?;

    let count = tally::Entity::find_by_id(target.id)
        .one(conn)
        .await?
        .map(|t| t.count)
        .unwrap_or(0);
    Ok(count)
}
