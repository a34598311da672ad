//! HTML texts and inline keyboards shown by the bot.
//!
//! All dynamic values are HTML-escaped before they are interpolated.

use crate::job::metadata::{FileMetadata, MetadataError};
use crate::job::progress::{human_readable_size, progress_bar, BAR_LENGTH};
use crate::job::{JobError, JobStatus};
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use tracing::warn;

/// Callback payload of the "Supported Domains" button
pub const SUPPORTED_DOMAINS_CALLBACK: &str = "show_supported_domains";

/// Reply to non-owners running owner commands
pub const OWNER_ONLY: &str = "🚫 You cannot run this command.";
/// Reply to users that are not on the authorized list
pub const NOT_AUTHORIZED: &str = "🚫 You are not authorized to use this bot.";
/// Transient reply to text that is not a supported link
pub const INVALID_LINK: &str = "❌ Please send a valid Terabox link";
/// Reply when the initial status message hits a too-long flood wait
pub const FLOOD_WAIT_TOO_LONG: &str = "🚫 FloodWait too long. Please try again later.";
/// Message sent to a newly authorized user
pub const ADDED_NOTICE: &str = "✅ You've been added to the authorized user list.";
/// Reply to `/userlist` with an empty list
pub const NO_AUTHORIZED_USERS: &str = "⚠️ There are no authorized users.";
/// Placeholder for users whose profile cannot be fetched
pub const UNKNOWN_USER_NAME: &str = "Name not found (❗Hasn't started the bot)";

const BANNER: &str = "╭━◝━━━━━━━━━━━━◜━╮\n⚡❍⊱❁ Team Sonu ™\n╰━◞━━━━━━━━━━━━◟━╯";
const FOOTER: &str = "✨❍⭕️━━━━━━━━━━━━━━━⭕️❍✨";
const LIST_RULE: &str = "═══════════════════════";

/// Domains accepted by the link pattern, as listed to users
pub const SUPPORTED_DOMAINS: &[&str] = &[
    "terabox.com",
    "4funbox.co",
    "terabox.app",
    "teraboxapp.com",
    "teraboxapp.to",
    "teraboxlink.com",
    "terafileshare.com",
    "terasharelink.com",
    "1024terabox.com",
];

/// Status message text for `status`
#[must_use]
pub fn status_text(status: &JobStatus) -> String {
    match status {
        JobStatus::Resolving => {
            format!("{BANNER}\n\n🔍 <b>Processing your link...</b>\n{FOOTER}")
        }
        JobStatus::Downloading {
            file_name,
            size,
            percent,
        } => progress_text("📥 <b>Downloading:</b>", file_name, *size, *percent),
        JobStatus::Uploading {
            file_name,
            size,
            percent,
        } => progress_text("📤 <b>Uploading:</b>", file_name, *size, *percent),
    }
}

fn progress_text(label: &str, file_name: &str, size: u64, percent: u8) -> String {
    format!(
        "{BANNER}\n\n{label} <code>{}</code>\n📦 <b>Size:</b> {}\n🔸 {} 🔸\n🚀 <b>Progress:</b> {percent}%\n{FOOTER}",
        html_escape::encode_text(file_name),
        human_readable_size(size),
        progress_bar(percent, BAR_LENGTH),
    )
}

/// Status message text describing why a job failed
#[must_use]
pub fn failure_text(error: &JobError) -> String {
    match error {
        JobError::Metadata(MetadataError::Status(code)) => {
            format!("❌ <b>API Error:</b> Failed to fetch link information\nStatus Code: {code}")
        }
        JobError::Metadata(e) => format!(
            "❌ <b>API Error:</b> Failed to fetch link information\n{}",
            html_escape::encode_text(&e.to_string())
        ),
        JobError::TooLarge { size, max } => format!(
            "❌ <b>File Too Large:</b> {}\nMax allowed: {}",
            human_readable_size(*size),
            human_readable_size(*max)
        ),
        JobError::DownloadTimeout(limit) => {
            format!("❌ Download timed out ({} hours)", limit.as_secs() / 3600)
        }
        JobError::DownloadFailed(reason) => format!(
            "❌ <b>Download Failed:</b>\n{}",
            html_escape::encode_text(reason)
        ),
        JobError::Incomplete { expected, actual } => format!(
            "❌ <b>Download Failed:</b>\nFile incomplete or corrupted\nExpected: {}\nActual: {}",
            human_readable_size(*expected),
            human_readable_size(*actual)
        ),
        JobError::UploadTimeout(limit) => format!(
            "❌ <b>Upload Timeout:</b>\nUpload took too long ({}s limit)\nPlease try again with a smaller file.",
            limit.as_secs()
        ),
        JobError::UploadFailed(reason) => format!(
            "❌ <b>Upload Failed:</b>\n{}",
            html_escape::encode_text(reason)
        ),
        JobError::FloodControl(_) => FLOOD_WAIT_TOO_LONG.to_string(),
        JobError::Io(e) => format!(
            "❌ <b>Critical Error:</b>\n{}",
            html_escape::encode_text(&e.to_string())
        ),
    }
}

/// Caption attached to the uploaded file
#[must_use]
pub fn upload_caption(metadata: &FileMetadata) -> String {
    format!(
        "{BANNER}\n\n<pre>✅ Your File is Ready!</pre>\n\n📂 <b>File:</b> <code>{}</code>\n📦 <b>Size:</b> {}\n{FOOTER}",
        html_escape::encode_text(&metadata.name),
        human_readable_size(metadata.size),
    )
}

/// "Direct Download" button below the uploaded file.
///
/// `None` when the direct URL is not a valid absolute URL.
#[must_use]
pub fn direct_download_keyboard(metadata: &FileMetadata) -> Option<InlineKeyboardMarkup> {
    match reqwest::Url::parse(&metadata.direct_url) {
        Ok(url) => Some(InlineKeyboardMarkup::new(vec![vec![
            InlineKeyboardButton::url(
                format!("🔗 Direct Download {}", human_readable_size(metadata.size)),
                url,
            ),
        ]])),
        Err(e) => {
            warn!(error = %e, "Direct URL is not a valid button target");
            None
        }
    }
}

/// Caption of the `/start` welcome photo
#[must_use]
pub fn welcome_caption(max_size_bytes: u64) -> String {
    format!(
        "<pre>🔷🔹🔸♦️◈ 𝗧𝗘𝗥𝗔𝗕𝗢𝗫 𝗕𝗢𝗧 ◈♦️🔸🔹🔷</pre>\n\n\
         📘 <b>How It Works:</b>\n\
         ➤ Paste your Terabox URL below 👇\n\
         ➤ The bot will fetch &amp; send the file ⚡\n\n\
         🌐 <b>Supported:</b> <i>(Tap the button below)</i>\n\n\
         📦 <b>Limit:</b> <code>{}</code>\n\
         <pre>👨‍💻 Created by Team_Sonu</pre>",
        human_readable_size(max_size_bytes)
    )
}

/// Buttons below the welcome photo
#[must_use]
pub fn welcome_keyboard(channel_name: &str, channel_url: &str) -> InlineKeyboardMarkup {
    let mut rows = vec![vec![InlineKeyboardButton::callback(
        "🌐 Supported Domains",
        SUPPORTED_DOMAINS_CALLBACK,
    )]];
    match reqwest::Url::parse(channel_url) {
        Ok(url) => rows.push(vec![InlineKeyboardButton::url(channel_name, url)]),
        Err(e) => warn!(error = %e, "CHANNEL_URL is not a valid URL, omitting channel button"),
    }
    InlineKeyboardMarkup::new(rows)
}

/// Alert text listing the supported domains
#[must_use]
pub fn supported_domains_alert() -> String {
    let mut text = String::from("🌍 Supported Domains:\n");
    for domain in SUPPORTED_DOMAINS {
        text.push_str("💧 ");
        text.push_str(domain);
        text.push('\n');
    }
    // No footer rule: alerts are capped at 200 characters
    text.push_str("\n⚡❍⊱❁ Team_Sonu  ™");
    text
}

/// Contact button below the user list
#[must_use]
pub fn contact_keyboard(contact_url: &str) -> Option<InlineKeyboardMarkup> {
    reqwest::Url::parse(contact_url).ok().map(|url| {
        InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::url("💧 Contact 💦", url)]])
    })
}

/// `/userlist` body; `None` names render as [`UNKNOWN_USER_NAME`]
#[must_use]
pub fn user_list_text(users: &[(i64, Option<String>)]) -> String {
    let mut text = format!("👤 <b>Authorized User List:</b>\n{LIST_RULE}\n");
    for (index, (user_id, name)) in users.iter().enumerate() {
        let name = name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .map_or_else(|| UNKNOWN_USER_NAME.to_string(), |n| html_escape::encode_text(n).into_owned());
        text.push_str(&format!("🔹 {}. {name}\n🆔 <code>{user_id}</code>\n\n", index + 1));
    }
    text.push_str(LIST_RULE);
    text
}

/// Usage hint for an owner command
#[must_use]
pub fn usage(command: &str) -> String {
    format!("❌ Use: /{command} &lt;user_id&gt;")
}

/// Reply to a non-numeric user ID argument
pub const INVALID_USER_ID: &str = "❌ Invalid user ID! Enter a number.";

/// Reply to a successful `/adduser`
#[must_use]
pub fn user_added(user_id: i64) -> String {
    format!("✅ User <code>{user_id}</code> Added!")
}

/// Reply to `/adduser` for an already authorized user
#[must_use]
pub fn user_already_added(user_id: i64) -> String {
    format!("ℹ️ User <code>{user_id}</code> was already added.")
}

/// Reply to a successful `/removeuser`
#[must_use]
pub fn user_removed(user_id: i64) -> String {
    format!("❎ User <code>{user_id}</code> removed!")
}

/// Reply to `/removeuser` for a user that was not on the list
#[must_use]
pub fn user_not_authorized(user_id: i64) -> String {
    format!("⚠️ User <code>{user_id}</code> was not authorized.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn meta() -> FileMetadata {
        FileMetadata {
            name: "<b>clip</b>.mp4".to_string(),
            direct_url: "https://cdn.example/clip.mp4".to_string(),
            size: 500 * 1024 * 1024,
            thumbnail_url: None,
        }
    }

    #[test]
    fn progress_status_shows_bar_and_percent() {
        let text = status_text(&JobStatus::Downloading {
            file_name: "a.mkv".to_string(),
            size: 1024,
            percent: 50,
        });
        assert!(text.contains("📥 <b>Downloading:</b> <code>a.mkv</code>"));
        assert!(text.contains("📦 <b>Size:</b> 1.00 KB"));
        assert!(text.contains(&format!("🔸 {}{} 🔸", "█".repeat(10), "░".repeat(10))));
        assert!(text.contains("🚀 <b>Progress:</b> 50%"));
    }

    #[test]
    fn file_names_are_escaped() {
        let caption = upload_caption(&meta());
        assert!(caption.contains("&lt;b&gt;clip&lt;/b&gt;.mp4"));
        assert!(caption.contains("📦 <b>Size:</b> 500.00 MB"));
    }

    #[test]
    fn failure_texts_name_the_cause() {
        let too_large = failure_text(&JobError::TooLarge {
            size: 2500 * 1024 * 1024,
            max: 1900 * 1024 * 1024,
        });
        assert!(too_large.starts_with("❌ <b>File Too Large:</b> 2.44 GB"));
        assert!(too_large.ends_with("Max allowed: 1.86 GB"));

        let status = failure_text(&JobError::Metadata(MetadataError::Status(404)));
        assert!(status.ends_with("Status Code: 404"));

        assert_eq!(
            failure_text(&JobError::DownloadTimeout(Duration::from_secs(7200))),
            "❌ Download timed out (2 hours)"
        );
        assert!(failure_text(&JobError::UploadTimeout(Duration::from_secs(660))).contains("(660s limit)"));
        assert_eq!(
            failure_text(&JobError::FloodControl(Duration::from_secs(900))),
            FLOOD_WAIT_TOO_LONG
        );
    }

    #[test]
    fn direct_download_button_requires_valid_url() {
        assert!(direct_download_keyboard(&meta()).is_some());

        let mut bad = meta();
        bad.direct_url = "not a url".to_string();
        assert!(direct_download_keyboard(&bad).is_none());
    }

    #[test]
    fn user_list_uses_fallback_names() {
        let text = user_list_text(&[(1, Some("Ann".to_string())), (2, None)]);
        assert!(text.contains("🔹 1. Ann\n🆔 <code>1</code>"));
        assert!(text.contains(&format!("🔹 2. {UNKNOWN_USER_NAME}\n🆔 <code>2</code>")));
    }

    #[test]
    fn alert_lists_every_domain() {
        let alert = supported_domains_alert();
        for domain in SUPPORTED_DOMAINS {
            assert!(alert.contains(domain));
        }
        assert!(alert.encode_utf16().count() <= 200);
    }
}
