//! Admission of inbound text messages.
//!
//! Decides whether a private text message starts a job. The check is pure so
//! the authorization rules can be tested without a bot.

// lazy_regex! uses once_cell internally
#![allow(clippy::non_std_lazy_statics)]

use lazy_regex::lazy_regex;

/// Supported share links, anchored at the start of the message
static RE_SHARE_LINK: lazy_regex::Lazy<regex::Regex> = lazy_regex!(
    r"^https?://(?:www\.)?(?:teraboxlink\.com|terasharelink\.com|teraboxapp\.com|1024terabox\.com|terabox\.com|terafileshare\.com|4funbox\.co|teraboxapp\.to|terabox\.app)/s/[a-zA-Z0-9_-]+"
);

/// What to do with an inbound text message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The sender may not use the bot
    Denied,
    /// The sender is authorized but the text is not a supported link
    InvalidLink,
    /// Start a job for this link (the trimmed message text)
    Accepted(String),
}

/// Whether `text` starts with a supported share link
#[must_use]
pub fn is_share_link(text: &str) -> bool {
    RE_SHARE_LINK.is_match(text)
}

/// Decide how to handle `text` from `user_id`.
///
/// The owner is always authorized. Authorization is checked before the link,
/// so unauthorized senders never learn whether their link was valid.
#[must_use]
pub fn admit(user_id: i64, owner_id: i64, is_listed: bool, text: &str) -> Admission {
    if user_id != owner_id && !is_listed {
        return Admission::Denied;
    }

    let text = text.trim();
    if is_share_link(text) {
        Admission::Accepted(text.to_string())
    } else {
        Admission::InvalidLink
    }
}
