//! Telegram request helpers that surface flood control as [`TransportError`].
//!
//! Each helper performs a single request. Callers that want the
//! wait-and-retry-once behavior wrap them in
//! [`with_flood_control`](crate::job::flood::with_flood_control).
//!
//! # Usage
//!
//! ```ignore
//! use terabox_courier::bot::resilient::send_html;
//! use terabox_courier::job::flood::{with_flood_control, FLOOD_WAIT_LIMIT};
//!
//! let msg = with_flood_control(FLOOD_WAIT_LIMIT, || send_html(&bot, chat_id, "⏳")).await?;
//! ```

use crate::job::TransportError;
use teloxide::prelude::*;
use teloxide::types::{ChatId, Message, MessageId, ParseMode};
use teloxide::RequestError;
use tracing::debug;

/// Telegram's message limit with a safety margin for markup
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4000;

const ERROR_NOT_MODIFIED: &str = "message is not modified";
const ERROR_EDIT_NOT_FOUND: &str = "message to edit not found";
const ERROR_DELETE_NOT_FOUND: &str = "message to delete not found";

/// Map a teloxide error onto the pipeline's transport error
#[must_use]
pub fn to_transport_error(error: RequestError) -> TransportError {
    match error {
        RequestError::RetryAfter(wait) => TransportError::FloodWait(wait.duration()),
        other => TransportError::Request(other.to_string()),
    }
}

/// Send an HTML message.
///
/// # Errors
///
/// Returns `TransportError::FloodWait` on flood control, `Request` otherwise.
pub async fn send_html(
    bot: &Bot,
    chat_id: ChatId,
    text: impl Into<String>,
) -> Result<Message, TransportError> {
    bot.send_message(chat_id, text.into())
        .parse_mode(ParseMode::Html)
        .await
        .map_err(to_transport_error)
}

/// Edit an HTML message.
///
/// Text longer than [`TELEGRAM_MESSAGE_LIMIT`] is truncated. Edits that
/// change nothing or target a deleted message count as success.
///
/// # Errors
///
/// Returns `TransportError::FloodWait` on flood control, `Request` otherwise.
pub async fn edit_html(
    bot: &Bot,
    chat_id: ChatId,
    msg_id: MessageId,
    text: &str,
) -> Result<(), TransportError> {
    let text = if text.chars().count() > TELEGRAM_MESSAGE_LIMIT {
        format!("{}...", crate::utils::truncate_str(text, TELEGRAM_MESSAGE_LIMIT))
    } else {
        text.to_string()
    };

    match bot
        .edit_message_text(chat_id, msg_id, text)
        .parse_mode(ParseMode::Html)
        .await
    {
        Ok(_) => Ok(()),
        Err(e) => {
            let err_msg = e.to_string();
            if err_msg.contains(ERROR_NOT_MODIFIED) || err_msg.contains(ERROR_EDIT_NOT_FOUND) {
                debug!("Message update skipped: {err_msg}");
                Ok(())
            } else {
                Err(to_transport_error(e))
            }
        }
    }
}

/// Delete a message; an already deleted message counts as success.
///
/// # Errors
///
/// Returns `TransportError::FloodWait` on flood control, `Request` otherwise.
pub async fn delete(bot: &Bot, chat_id: ChatId, msg_id: MessageId) -> Result<(), TransportError> {
    match bot.delete_message(chat_id, msg_id).await {
        Ok(_) => Ok(()),
        Err(e) if e.to_string().contains(ERROR_DELETE_NOT_FOUND) => {
            debug!("Message already deleted");
            Ok(())
        }
        Err(e) => Err(to_transport_error(e)),
    }
}
