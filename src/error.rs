use std::fmt;

use thiserror::Error;

/// Why a gated action was refused
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DenyReason {
    /// The member already added or voted today
    ActedToday,
    /// Weekend policy applies
    Weekend,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActedToday => f.write_str("You can only vote or add once per day, not until tomorrow"),
            Self::Weekend => f.write_str("Voting is closed for you this weekend, not until Monday"),
        }
    }
}

/// What a failed lookup was looking for
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Missing {
    Member(i32),
    TitleName(String),
    TitleId(i32),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Member(id) => write!(f, "member #{id}"),
            Self::TitleName(name) => write!(f, "title {name:?}"),
            Self::TitleId(id) => write!(f, "title #{id}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum VoteError {
    #[error("{0}")]
    Validation(String),

    #[error("{title} is already owned")]
    AlreadyOwned { title: String },

    #[error("{0}")]
    RateLimited(DenyReason),

    /// Absent, or owned and therefore not votable
    #[error("No votable {0}")]
    NotFound(Missing),

    /// Problem originated from the database library; fatal for the action
    #[error("Storage failure: {0}")]
    Storage(#[from] sea_orm::DbErr),
}

impl VoteError {
    /// Rejections are the caller's fault and leave no trace; everything else is internal.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid {key} value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum BotError {
    /// Problem originated from the Telegram bot library
    #[error("{0:?}")]
    Request(#[from] teloxide::RequestError),

    /// Command parsing error
    #[error("{0:?}")]
    CommandParse(#[from] teloxide::utils::command::ParseError),

    /// Message carried no text to parse
    #[error("Message has no text")]
    NoText,

    /// Problem originated from the database library
    #[error("{0:?}")]
    Database(#[from] sea_orm::DbErr),

    #[error(transparent)]
    Vote(VoteError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<VoteError> for BotError {
    fn from(e: VoteError) -> Self {
        match e {
            VoteError::Storage(e) => Self::Database(e),
            other => Self::Vote(other),
        }
    }
}
