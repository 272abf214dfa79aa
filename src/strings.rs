pub const SENDER_UNKNOWN: &str = "Failed to find the sender of this message";
pub const NOT_AUTHORIZED: &str = "You're not allowed to add or vote yet";
pub const NOT_MEMBER: &str = "You have not registered, send /register first";
pub const USERNAME_MISSING: &str = "You must set a username (check your Telegram settings)";
pub const NEED_APPROVAL: &str = "Great! Now tell the admin to approve your request";
pub const ALREADY_ALLOWED: &str = "You're already registered and allowed to vote";
pub const NOT_REGISTERED: &str = "The specified user has not registered";
pub const WRONG_ARGNUM: &str = "Wrong number of arguments";
pub const NO_PERM: &str = "*You're not supposed to do that*";
pub const TITLE_MISSING: &str = "Tell me which title, e.g. /add Halo 3";
pub const NO_VOTES: &str = "No votes yet";
pub const NO_VOTES_THIS_WEEK: &str = "No votes since Monday";
pub const NOTHING_OWNED: &str = "Nothing owned yet";
pub const NO_HISTORY: &str = "You have not added or voted for anything yet";
pub const ALL_TIME_HEADER: &str = "<b>All-time votes</b>";
pub const THIS_WEEK_HEADER: &str = "<b>Top votes this week</b>";
pub const OWNED_HEADER: &str = "<b>Titles we own</b>";
pub const HISTORY_HEADER: &str = "<b>Your activity</b>";
pub const SUGGESTION_PREFIX: &str = "Voting for:";
