//! Once-per-day gate for adding and voting.

use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;
use log::debug;
use sea_orm::{ConnectionTrait, DbErr};

use crate::{error::DenyReason, ledger};

/// What happens on Saturdays and Sundays (local time).
///
/// `TightenOnly` is the default: the weekend only refuses members who have a
/// recent ledger entry and never blocks a fresh member.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WeekendPolicy {
    /// No weekend rule
    Open,
    #[default]
    TightenOnly,
    /// Nobody acts on weekends
    Closed,
}

impl FromStr for WeekendPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "tighten" => Ok(Self::TightenOnly),
            "closed" => Ok(Self::Closed),
            other => Err(format!("expected open, tighten or closed, got {other:?}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied(DenyReason),
}

impl Decision {
    pub fn into_result(self) -> Result<(), DenyReason> {
        match self {
            Self::Allowed => Ok(()),
            Self::Denied(reason) => Err(reason),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RateLimiter {
    timezone: Tz,
    weekend: WeekendPolicy,
}

impl RateLimiter {
    pub fn new(timezone: Tz, weekend: WeekendPolicy) -> Self {
        Self { timezone, weekend }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Decide from the member's last action time alone.
    pub fn decide(&self, last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Decision {
        let today = now.with_timezone(&self.timezone);
        let weekend = today.weekday().num_days_from_monday() >= 5;

        let last = match last {
            Some(last) => last.with_timezone(&self.timezone),
            None if weekend && self.weekend == WeekendPolicy::Closed => {
                return Decision::Denied(DenyReason::Weekend)
            }
            None => return Decision::Allowed,
        };

        if last.date_naive() == today.date_naive() {
            return Decision::Denied(DenyReason::ActedToday);
        }

        match self.weekend {
            WeekendPolicy::TightenOnly | WeekendPolicy::Closed if weekend => {
                Decision::Denied(DenyReason::Weekend)
            }
            _ => Decision::Allowed,
        }
    }

    /// Look the member up in the ledger and decide. Storage faults propagate.
    pub async fn check<C: ConnectionTrait>(
        &self,
        conn: &C,
        member_id: i32,
        now: DateTime<Utc>,
    ) -> Result<Decision, DbErr> {
        let last = ledger::last_action_time(conn, member_id, now).await?;
        let decision = self.decide(last, now);
        debug!("member {member_id} last acted {last:?}: {decision:?}");
        Ok(decision)
    }
}
