//! Command, callback and text handlers.

use super::admission::{admit, Admission};
use super::resilient::{send_html, to_transport_error, TELEGRAM_MESSAGE_LIMIT};
use super::transport::TelegramJobTransport;
use super::views;
use crate::config::{Settings, TRANSIENT_NOTICE_SECS};
use crate::job::flood::{with_flood_control, FLOOD_WAIT_LIMIT};
use crate::job::{Job, JobOutcome, JobPipeline, JobStatus, TransportError};
use crate::storage::UserStore;
use crate::utils::split_long_message;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, ChatId, InputFile, ParseMode};
use teloxide::utils::command::BotCommands;
use tracing::{info, warn};

/// Telegram limit for photo captions
const CAPTION_LIMIT: usize = 1024;

/// Supported bot commands
#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    /// Welcome message with the supported domains
    #[command(description = "show the welcome message")]
    Start,
    /// Authorize a user (owner only)
    #[command(description = "authorize a user")]
    AddUser(String),
    /// Revoke a user (owner only)
    #[command(description = "revoke a user")]
    RemoveUser(String),
    /// List authorized users (owner only)
    #[command(description = "list authorized users")]
    UserList,
}

/// Safely get user ID from message, returning 0 if sender is unknown
#[must_use]
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

/// Safely get user name from message
#[must_use]
pub fn get_user_name(msg: &Message) -> String {
    msg.from
        .as_ref()
        .map_or_else(|| "Unknown".to_string(), |u| u.first_name.clone())
}

async fn reply_html(bot: &Bot, msg: &Message, text: impl Into<String>) -> Result<()> {
    bot.send_message(msg.chat.id, text.into())
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

/// Handler for the /start command
///
/// # Errors
///
/// Returns an error if neither the welcome photo nor the text fallback can be sent.
pub async fn start(bot: Bot, msg: Message, settings: Arc<Settings>) -> Result<()> {
    let chat_id = msg.chat.id;
    let caption = views::welcome_caption(settings.max_size_bytes());
    let keyboard = views::welcome_keyboard(&settings.channel_name, &settings.channel_url);

    info!(user_id = get_user_id_safe(&msg), "User started the bot");

    if let Ok(photo_url) = reqwest::Url::parse(&settings.welcome_url) {
        let sent = with_flood_control(FLOOD_WAIT_LIMIT, || async {
            bot.send_photo(chat_id, InputFile::url(photo_url.clone()))
                .caption(caption.clone())
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboard.clone())
                .await
                .map_err(to_transport_error)
        })
        .await;
        match sent {
            Ok(_) => return Ok(()),
            Err(e) => warn!(error = %e, "Welcome photo failed, sending text instead"),
        }
    }

    bot.send_message(chat_id, caption)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboard)
        .await?;
    Ok(())
}

/// Handler for inline button presses
///
/// # Errors
///
/// Returns an error if the callback cannot be answered.
pub async fn handle_callback(bot: Bot, q: CallbackQuery) -> Result<()> {
    let request = bot.answer_callback_query(q.id.clone());
    if q.data.as_deref() == Some(views::SUPPORTED_DOMAINS_CALLBACK) {
        request
            .text(views::supported_domains_alert())
            .show_alert(true)
            .await?;
    } else {
        request.await?;
    }
    Ok(())
}

/// Parse the user ID argument of an owner command, replying on failure
async fn parse_user_arg(bot: &Bot, msg: &Message, command: &str, arg: &str) -> Result<Option<i64>> {
    let Some(raw) = arg.split_whitespace().next() else {
        reply_html(bot, msg, views::usage(command)).await?;
        return Ok(None);
    };
    if let Ok(user_id) = raw.parse::<i64>() {
        Ok(Some(user_id))
    } else {
        reply_html(bot, msg, views::INVALID_USER_ID).await?;
        Ok(None)
    }
}

/// Whether the sender is the owner; replies with a refusal otherwise
async fn ensure_owner(bot: &Bot, msg: &Message, settings: &Settings) -> Result<bool> {
    let user_id = get_user_id_safe(msg);
    if user_id == settings.bot_owner_id {
        return Ok(true);
    }
    warn!(user_id, "Owner command attempted by non-owner");
    reply_html(bot, msg, views::OWNER_ONLY).await?;
    Ok(false)
}

/// Handler for /adduser
///
/// # Errors
///
/// Returns an error if a reply cannot be sent.
pub async fn add_user(
    bot: Bot,
    msg: Message,
    arg: String,
    settings: Arc<Settings>,
    store: Arc<dyn UserStore>,
) -> Result<()> {
    if !ensure_owner(&bot, &msg, &settings).await? {
        return Ok(());
    }
    let Some(user_id) = parse_user_arg(&bot, &msg, "adduser", &arg).await? else {
        return Ok(());
    };

    match store.add(user_id).await {
        Ok(true) => {
            reply_html(&bot, &msg, views::user_added(user_id)).await?;
            match bot.send_message(ChatId(user_id), views::ADDED_NOTICE).await {
                Ok(_) => info!(user_id, "Notified user"),
                Err(e) => warn!(user_id, error = %e, "Couldn't message user"),
            }
        }
        Ok(false) => reply_html(&bot, &msg, views::user_already_added(user_id)).await?,
        Err(e) => {
            warn!(user_id, error = %e, "Failed to persist user list");
            reply_html(
                &bot,
                &msg,
                format!("❌ Error: {}", html_escape::encode_text(&e.to_string())),
            )
            .await?;
        }
    }
    Ok(())
}

/// Handler for /removeuser
///
/// # Errors
///
/// Returns an error if a reply cannot be sent.
pub async fn remove_user(
    bot: Bot,
    msg: Message,
    arg: String,
    settings: Arc<Settings>,
    store: Arc<dyn UserStore>,
) -> Result<()> {
    if !ensure_owner(&bot, &msg, &settings).await? {
        return Ok(());
    }
    let Some(user_id) = parse_user_arg(&bot, &msg, "removeuser", &arg).await? else {
        return Ok(());
    };

    match store.remove(user_id).await {
        Ok(true) => reply_html(&bot, &msg, views::user_removed(user_id)).await?,
        Ok(false) => reply_html(&bot, &msg, views::user_not_authorized(user_id)).await?,
        Err(e) => {
            warn!(user_id, error = %e, "Failed to persist user list");
            reply_html(
                &bot,
                &msg,
                format!("❌ Error: {}", html_escape::encode_text(&e.to_string())),
            )
            .await?;
        }
    }
    Ok(())
}

/// Handler for /userlist
///
/// # Errors
///
/// Returns an error if neither the photo nor the text fallback can be sent.
pub async fn user_list(
    bot: Bot,
    msg: Message,
    settings: Arc<Settings>,
    store: Arc<dyn UserStore>,
) -> Result<()> {
    if !ensure_owner(&bot, &msg, &settings).await? {
        return Ok(());
    }

    let ids = store.list().await;
    info!(count = ids.len(), "/userlist requested");
    if ids.is_empty() {
        reply_html(&bot, &msg, views::NO_AUTHORIZED_USERS).await?;
        return Ok(());
    }

    let mut users = Vec::with_capacity(ids.len());
    for user_id in ids {
        let name = match bot.get_chat(ChatId(user_id)).await {
            Ok(chat) => chat.first_name().map(ToString::to_string),
            Err(e) => {
                warn!(user_id, error = %e, "User lookup failed");
                None
            }
        };
        users.push((user_id, name));
    }

    let text = views::user_list_text(&users);
    let keyboard = views::contact_keyboard(&settings.contact_url);

    if text.chars().count() <= CAPTION_LIMIT {
        if let Ok(photo_url) = reqwest::Url::parse(&settings.photo_url) {
            let mut req = bot
                .send_photo(msg.chat.id, InputFile::url(photo_url))
                .caption(text.clone())
                .parse_mode(ParseMode::Html);
            if let Some(markup) = keyboard.clone() {
                req = req.reply_markup(markup);
            }
            match req.await {
                Ok(_) => return Ok(()),
                Err(e) => warn!(error = %e, "Couldn't send user list photo"),
            }
        }
    }

    let parts = split_long_message(&text, TELEGRAM_MESSAGE_LIMIT);
    let last = parts.len().saturating_sub(1);
    for (index, part) in parts.into_iter().enumerate() {
        let mut req = bot
            .send_message(msg.chat.id, part)
            .parse_mode(ParseMode::Html);
        if index == last {
            if let Some(markup) = keyboard.clone() {
                req = req.reply_markup(markup);
            }
        }
        req.await?;
    }
    Ok(())
}

/// Handler for private text messages
///
/// Unauthorized senders and anything that is not a supported link get a
/// short-lived notice. A link gets a status message and a job running in its
/// own task.
///
/// # Errors
///
/// Returns an error if a reply cannot be sent.
pub async fn handle_text(
    bot: Bot,
    msg: Message,
    settings: Arc<Settings>,
    store: Arc<dyn UserStore>,
    pipeline: Arc<JobPipeline>,
) -> Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let user_id = get_user_id_safe(&msg);
    let listed = store.contains(user_id).await;

    match admit(user_id, settings.bot_owner_id, listed, text) {
        Admission::Accepted(url) => {
            start_job(bot, &msg, user_id, url, &settings, pipeline).await?;
        }
        rejected => {
            if rejected == Admission::Denied {
                info!(
                    user_id,
                    user_name = %get_user_name(&msg),
                    "⛔️ Unauthorized access"
                );
            }
            if let Some(notice) = rejection_notice(&rejected) {
                tokio::spawn(send_transient_notice(bot, msg.chat.id, notice));
            }
        }
    }
    Ok(())
}

/// Short-lived reply for a message that does not start a job
const fn rejection_notice(admission: &Admission) -> Option<&'static str> {
    match admission {
        Admission::Denied => Some(views::NOT_AUTHORIZED),
        Admission::InvalidLink => Some(views::INVALID_LINK),
        Admission::Accepted(_) => None,
    }
}

/// Post `text` and delete it after a short while
async fn send_transient_notice(bot: Bot, chat_id: ChatId, text: &'static str) {
    let notice = match bot.send_message(chat_id, text).await {
        Ok(notice) => notice,
        Err(e) => {
            warn!(error = %e, "Failed to send transient notice");
            return;
        }
    };
    tokio::time::sleep(Duration::from_secs(TRANSIENT_NOTICE_SECS)).await;
    if let Err(e) = bot.delete_message(chat_id, notice.id).await {
        warn!(error = %e, "Failed to delete transient notice");
    }
}

async fn start_job(
    bot: Bot,
    msg: &Message,
    user_id: i64,
    url: String,
    settings: &Settings,
    pipeline: Arc<JobPipeline>,
) -> Result<()> {
    let chat_id = msg.chat.id;
    let initial = views::status_text(&JobStatus::Resolving);
    let status = with_flood_control(FLOOD_WAIT_LIMIT, || send_html(&bot, chat_id, initial.clone())).await;

    let status = match status {
        Ok(status) => status,
        Err(TransportError::FloodWaitTooLong(wait)) => {
            warn!(user_id, wait = ?wait, "Flood wait too long, dropping link");
            bot.send_message(chat_id, views::FLOOD_WAIT_TOO_LONG).await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let job = Job::new(user_id, url, &settings.download_dir);
    let transport = TelegramJobTransport::new(bot, chat_id, status.id);

    tokio::spawn(async move {
        match pipeline.run(&job, &transport).await {
            JobOutcome::Done => {}
            JobOutcome::Failed { stage, error } => {
                info!(user_id, stage = %stage, error = %error, "Job ended with failure");
            }
        }
    });
    Ok(())
}
