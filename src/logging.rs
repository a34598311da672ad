//! Logging setup.
//!
//! Events go to stderr and to a log file. Both outputs pass through
//! [`RedactingMakeWriter`], which masks Telegram bot tokens that show up in
//! request URLs and error messages.

use regex::Regex;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns for redacting sensitive data
pub struct RedactionPatterns {
    token_in_url: Regex,
    bare_token: Regex,
    prefixed_token: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            token_in_url: Regex::new(r"(https?://[^/]+/(?:file/)?bot)([0-9]+:[A-Za-z0-9_-]+)(/)")?,
            bare_token: Regex::new(r"([0-9]{8,10}:[A-Za-z0-9_-]{35})")?,
            prefixed_token: Regex::new(r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+")?,
        })
    }

    /// Mask every bot token in `input`
    #[must_use]
    pub fn redact(&self, input: &str) -> String {
        let output = self
            .token_in_url
            .replace_all(input, "$1[TELEGRAM_TOKEN]$3");
        let output = self.bare_token.replace_all(&output, "[TELEGRAM_TOKEN]");
        self.prefixed_token
            .replace_all(&output, "$1[TELEGRAM_TOKEN]")
            .into_owned()
    }
}

/// Writer that redacts everything passing through it
pub struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // Report the original length even though the redacted text may differ
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// [`MakeWriter`](tracing_subscriber::fmt::MakeWriter) wrapping writers in [`RedactingWriter`]
pub struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    /// Wrap writers produced by `make_inner`
    pub const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

/// Install the global subscriber: stderr plus a non-blocking file layer.
///
/// The returned guard flushes the file on drop; keep it alive for the whole
/// process.
pub fn init_logging(patterns: &Arc<RedactionPatterns>, log_file: &Path) -> WorkerGuard {
    let dir = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = log_file
        .file_name()
        .map_or_else(|| "bot.log".into(), |name| name.to_os_string());

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));

    let stderr_writer = RedactingMakeWriter::new(io::stderr, patterns.clone());
    let file_writer = RedactingMakeWriter::new(move || file_writer.clone(), patterns.clone());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(stderr_writer))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    guard
}
