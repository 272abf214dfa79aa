use std::sync::Arc;

use itertools::Itertools;
use log::{info, warn};
use teloxide::{
    dispatching2::UpdateFilterExt,
    prelude2::*,
    types::{
        InlineQueryResult, InlineQueryResultArticle, InputMessageContent, InputMessageContentText,
        ParseMode,
    },
    utils::command::BotCommand,
};

mod config;
mod db;
mod error;
mod ledger;
mod limiter;
mod members;
mod model;
mod strings;
mod tally;
mod voting;

use config::Config;
use error::{BotError, VoteError};
use limiter::RateLimiter;
use tally::Standing;
use voting::{Confirmation, TitleRef, Voting, Window};

/// Most titles offered for one inline query
const SUGGESTION_LIMIT: usize = 20;

#[tokio::main]
async fn main() -> Result<(), BotError> {
    teloxide::enable_logging!();
    info!("Starting bot");

    let config = Config::from_env()?;
    let bot = Bot::from_env();

    // connect to db, creating tables if not exists
    let db = db::connect(&config.db_url).await?;

    let limiter = RateLimiter::new(config.timezone, config.weekend);
    info!(
        "Timezone {}, weekend policy {:?}",
        config.timezone, config.weekend
    );
    let state = BotState {
        voting: Voting::new(db, limiter),
        config,
    };

    // setup handlers
    let inline_handler =
        Update::filter_inline_query().branch(dptree::endpoint(inline_queries_handler));
    let cmd_handler = Update::filter_message()
        .filter_command::<Command>()
        .branch(dptree::endpoint(command_handler));
    let chosen_handler =
        Update::filter_chosen_inline_result().branch(dptree::endpoint(chosen_result_handler));

    let handler = dptree::entry()
        .branch(inline_handler)
        .branch(cmd_handler)
        .branch(chosen_handler);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![Arc::new(state)])
        .build()
        .setup_ctrlc_handler()
        .dispatch()
        .await;

    Ok(())
}

struct BotState {
    voting: Voting,
    config: Config,
}

/// Choosing a suggested title counts as a vote for it.
async fn chosen_result_handler(
    bot: Bot,
    chosen: ChosenInlineResult,
    store: Arc<BotState>,
) -> Result<(), BotError> {
    let title_id: i32 = match chosen.result_id.parse() {
        Ok(id) => id,
        Err(_) => {
            warn!("Chosen result id {} is not a title id", chosen.result_id);
            return Ok(());
        }
    };

    let member = members::find_by_telegram_id(store.voting.db(), chosen.from.id).await?;
    let text = match member {
        Some(m) if m.allowed => match store.voting.vote(m.id, &TitleRef::Id(title_id)).await {
            Ok(confirmation) => confirmation.to_string(),
            Err(e) if e.is_rejection() => e.to_string(),
            Err(e) => return Err(e.into()),
        },
        Some(_) => strings::NOT_AUTHORIZED.to_string(),
        None => strings::NOT_MEMBER.to_string(),
    };

    // the chooser may never have opened a private chat with the bot
    if let Err(e) = bot.send_message(chosen.from.id, text).send().await {
        warn!("Could not tell {} about chosen title {title_id}: {e}", chosen.from.id);
    }

    Ok(())
}

async fn command_handler(
    bot: Bot,
    message: Message,
    store: Arc<BotState>,
) -> Result<(), BotError> {
    let command = Command::parse(
        message.text().ok_or(BotError::NoText)?,
        &store.config.bot_name,
    )?;

    // every command acts on behalf of a known sender
    let sender = match message.from() {
        Some(user) => user.clone(),
        None => {
            reply_msg(bot, message, strings::SENDER_UNKNOWN).await?;
            return Ok(());
        }
    };

    match command {
        Command::Add { text } => {
            let text = text.trim();
            if text.is_empty() {
                reply_msg(bot, message, strings::TITLE_MISSING).await?;
                return Ok(());
            }
            let member = match allowed_member(&bot, &message, &store, sender.id).await? {
                Some(m) => m,
                None => return Ok(()),
            };
            let outcome = store.voting.add_title(member.id, text).await;
            reply_outcome(bot, message, outcome).await?;
        }
        Command::Vote { text } => {
            if text.trim().is_empty() {
                reply_msg(bot, message, strings::TITLE_MISSING).await?;
                return Ok(());
            }
            let member = match allowed_member(&bot, &message, &store, sender.id).await? {
                Some(m) => m,
                None => return Ok(()),
            };
            let outcome = store.voting.vote(member.id, &TitleRef::parse(&text)).await;
            reply_outcome(bot, message, outcome).await?;
        }
        Command::Votes => {
            let standings = store.voting.standings(Window::AllTime).await?;
            let text = format_board(strings::ALL_TIME_HEADER, strings::NO_VOTES, &standings);
            reply_msg_with_parse_mode(bot, message, Some(ParseMode::Html), text).await?;
        }
        Command::Top => {
            let standings = store.voting.standings(Window::ThisWeek).await?;
            let text =
                format_board(strings::THIS_WEEK_HEADER, strings::NO_VOTES_THIS_WEEK, &standings);
            reply_msg_with_parse_mode(bot, message, Some(ParseMode::Html), text).await?;
        }
        Command::Owned => {
            let owned = store.voting.owned().await?;
            let text = if owned.is_empty() {
                strings::NOTHING_OWNED.to_string()
            } else {
                let names = owned
                    .iter()
                    .map(|t| html_escape::encode_text(&t.name))
                    .join("\n- ");
                format!("{}\n- {names}", strings::OWNED_HEADER)
            };
            reply_msg_with_parse_mode(bot, message, Some(ParseMode::Html), text).await?;
        }
        Command::Mine => {
            let member = match members::find_by_telegram_id(store.voting.db(), sender.id).await? {
                Some(m) => m,
                None => {
                    reply_msg(bot, message, strings::NOT_MEMBER).await?;
                    return Ok(());
                }
            };
            let history = store.voting.history(member.id).await?;
            let text = if history.is_empty() {
                strings::NO_HISTORY.to_string()
            } else {
                let tz = store.config.timezone;
                let rows = history
                    .iter()
                    .map(|(entry, name)| {
                        format!(
                            "{} {} <i>{}</i>",
                            entry.created_at.with_timezone(&tz).format("%Y-%m-%d %H:%M"),
                            entry.action,
                            html_escape::encode_text(name)
                        )
                    })
                    .join("\n");
                format!("{}\n{rows}", strings::HISTORY_HEADER)
            };
            let text = match store.voting.last_action_time(member.id).await? {
                Some(last) => format!(
                    "{text}\n\nLast acted {}",
                    last.with_timezone(&store.config.timezone).format("%A %H:%M")
                ),
                None => text,
            };
            reply_msg_with_parse_mode(bot, message, Some(ParseMode::Html), text).await?;
        }
        Command::Register => {
            // the table requires username
            let username = if let Some(username) = &sender.username {
                username.clone()
            } else {
                reply_msg(bot, message, strings::USERNAME_MISSING).await?;
                return Ok(());
            };

            let member = members::register(store.voting.db(), sender.id, &username).await?;

            // respond to user
            let text = if member.allowed {
                strings::ALREADY_ALLOWED
            } else {
                strings::NEED_APPROVAL
            };
            reply_msg(bot, message, text).await?;
        }
        Command::Allow { text } => {
            let args = text.trim().split_whitespace().collect_vec();
            if args.len() != 2 {
                reply_msg(bot, message, strings::WRONG_ARGNUM).await?;
                return Ok(());
            }
            let (secret, username) = (args[0], args[1]);

            // verify secret
            if secret != store.config.secret {
                reply_msg(bot, message, strings::NO_PERM).await?;
                return Ok(());
            }

            let updated_user = match members::allow(store.voting.db(), username).await? {
                Some(u) => u,
                None => {
                    reply_msg(bot, message, strings::NOT_REGISTERED).await?;
                    return Ok(());
                }
            };

            reply_msg_with_parse_mode(
                bot,
                message,
                Some(ParseMode::Html),
                format!(
                    "Allowed <code>{}</code>",
                    html_escape::encode_text(&updated_user.username)
                ),
            )
            .await?;
        }
        Command::Own { text } => {
            let (secret, title) = match text.trim().split_once(char::is_whitespace) {
                Some((secret, title)) if !title.trim().is_empty() => (secret, title.trim()),
                _ => {
                    reply_msg(bot, message, strings::WRONG_ARGNUM).await?;
                    return Ok(());
                }
            };

            // verify secret
            if secret != store.config.secret {
                reply_msg(bot, message, strings::NO_PERM).await?;
                return Ok(());
            }

            match store.voting.mark_owned(title).await {
                Ok(owned) => {
                    reply_msg(bot, message, format!("{} is now owned", owned.name)).await?;
                }
                Err(e) if e.is_rejection() => reply_msg(bot, message, e.to_string()).await?,
                Err(e) => return Err(e.into()),
            }
        }
        Command::Help => {
            reply_msg(bot, message, Command::descriptions()).await?;
        }
    }
    Ok(())
}

/// The sender's member row if they may act; otherwise reply why not.
async fn allowed_member(
    bot: &Bot,
    message: &Message,
    store: &BotState,
    telegram_id: i64,
) -> Result<Option<model::member::Model>, BotError> {
    match members::find_by_telegram_id(store.voting.db(), telegram_id).await? {
        Some(m) if m.allowed => Ok(Some(m)),
        Some(_) => {
            reply_msg(bot.clone(), message.clone(), strings::NOT_AUTHORIZED).await?;
            Ok(None)
        }
        None => {
            reply_msg(bot.clone(), message.clone(), strings::NOT_MEMBER).await?;
            Ok(None)
        }
    }
}

async fn inline_queries_handler(
    bot: Bot,
    update: InlineQuery,
    store: Arc<BotState>,
) -> Result<(), BotError> {
    let query_str = update.query.as_str();
    info!("Query: {query_str}");

    // reject empty queries
    if query_str.trim() == "" {
        return Ok(());
    }

    let suggestions = store.voting.suggest(query_str, SUGGESTION_LIMIT).await?;

    // Title ids are used as result ids, so the chosen result handler knows what to vote for
    let query_responses = suggestions
        .into_iter()
        .map(|standing| {
            let content =
                InputMessageContent::Text(InputMessageContentText::new(suggestion_text(&standing)));
            InlineQueryResultArticle::new(standing.title_id.to_string(), standing.name, content)
                .description(format!("{} votes", standing.count))
                .into()
        })
        .collect::<Vec<InlineQueryResult>>();

    bot.answer_inline_query(update.id, query_responses)
        .send()
        .await?;

    Ok(())
}

/// Text posted when a suggestion is chosen. The vote itself is cast by
/// `chosen_result_handler`, so this must never parse as a command.
fn suggestion_text(standing: &Standing) -> String {
    format!("{} {}", strings::SUGGESTION_PREFIX, standing.name)
}

fn format_board(header: &str, empty: &str, standings: &[Standing]) -> String {
    if standings.is_empty() {
        return empty.to_string();
    }
    let rows = standings
        .iter()
        .enumerate()
        .map(|(rank, s)| {
            format!(
                "{}. {} ({})",
                rank + 1,
                html_escape::encode_text(&s.name),
                s.count
            )
        })
        .join("\n");
    format!("{header}\n{rows}")
}

async fn reply_outcome(
    bot: Bot,
    message: Message,
    outcome: Result<Confirmation, VoteError>,
) -> Result<(), BotError> {
    match outcome {
        Ok(confirmation) => reply_msg(bot, message, confirmation.to_string()).await,
        Err(e) if e.is_rejection() => reply_msg(bot, message, e.to_string()).await,
        Err(e) => Err(e.into()),
    }
}

async fn reply_msg<S: AsRef<str>>(bot: Bot, message: Message, text: S) -> Result<(), BotError> {
    reply_msg_with_parse_mode(bot, message, None, text).await?;
    Ok(())
}

async fn reply_msg_with_parse_mode<S: AsRef<str>>(
    bot: Bot,
    message: Message,
    parse_mode: Option<ParseMode>,
    text: S,
) -> Result<(), BotError> {
    let mut send_message = bot.send_message(message.chat.id, text.as_ref());
    send_message.reply_to_message_id = Some(message.id);
    send_message.parse_mode = parse_mode;
    send_message.send().await?;
    Ok(())
}

#[derive(BotCommand, Debug)]
#[command(rename = "lowercase", description = "Commands:")]
enum Command {
    #[command(description = "propose a title; proposing one that exists votes for it.")]
    Add { text: String },

    #[command(description = "vote for a title by name or #id.")]
    Vote { text: String },

    #[command(description = "all-time leaderboard.")]
    Votes,

    #[command(description = "leaderboard since Monday.")]
    Top,

    #[command(description = "titles already owned.")]
    Owned,

    #[command(description = "what you added and voted for.")]
    Mine,

    #[command(description = "register self as a voter")]
    Register,

    #[command(description = "allow a user to vote")]
    Allow { text: String },

    #[command(description = "mark a title as owned")]
    Own { text: String },

    #[command(description = "get help message")]
    Help,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chosen_suggestions_do_not_post_commands() {
        let standing = Standing {
            title_id: 7,
            name: "/vote #7".into(),
            count: 1,
        };
        let text = suggestion_text(&standing);
        assert!(!text.starts_with('/'));
        assert!(Command::parse(&text, "title_vote_bot").is_err());
    }

    #[test]
    fn boards_are_numbered_and_escaped() {
        let standings = vec![
            Standing {
                title_id: 2,
                name: "Bar & Grill".into(),
                count: 5,
            },
            Standing {
                title_id: 1,
                name: "Foo".into(),
                count: 3,
            },
        ];
        let text = format_board("Top", "none", &standings);
        assert_eq!(text, "Top\n1. Bar &amp; Grill (5)\n2. Foo (3)");
        assert_eq!(format_board("Top", "none", &[]), "none");
    }
}
