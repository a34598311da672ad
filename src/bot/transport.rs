//! Telegram implementation of [`JobTransport`].
//!
//! One transport is bound to one job's status message. Uploads stream the
//! file from disk through [`ProgressReader`], which reports bytes handed to
//! the HTTP client.

use super::resilient::{delete, edit_html, to_transport_error};
use super::views;
use crate::job::{
    JobError, JobStatus, JobTransport, TransportError, UploadKind, UploadProgress, UploadRequest,
};
use async_trait::async_trait;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use teloxide::prelude::*;
use teloxide::types::{ChatId, InputFile, MessageId, ParseMode};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

/// Status message of one job in one chat
#[derive(Clone)]
pub struct TelegramJobTransport {
    bot: Bot,
    chat_id: ChatId,
    status_msg_id: MessageId,
}

impl TelegramJobTransport {
    /// Bind a transport to an already sent status message
    #[must_use]
    pub const fn new(bot: Bot, chat_id: ChatId, status_msg_id: MessageId) -> Self {
        Self {
            bot,
            chat_id,
            status_msg_id,
        }
    }
}

#[async_trait]
impl JobTransport for TelegramJobTransport {
    async fn update_status(&self, status: &JobStatus) -> Result<(), TransportError> {
        edit_html(
            &self.bot,
            self.chat_id,
            self.status_msg_id,
            &views::status_text(status),
        )
        .await
    }

    async fn report_failure(&self, error: &JobError) -> Result<(), TransportError> {
        edit_html(
            &self.bot,
            self.chat_id,
            self.status_msg_id,
            &views::failure_text(error),
        )
        .await
    }

    async fn delete_status(&self) -> Result<(), TransportError> {
        delete(&self.bot, self.chat_id, self.status_msg_id).await
    }

    async fn upload(
        &self,
        request: &UploadRequest,
        progress: UnboundedSender<UploadProgress>,
    ) -> Result<(), TransportError> {
        let file = tokio::fs::File::open(&request.path)
            .await
            .map_err(|e| TransportError::Request(format!("failed to open upload: {e}")))?;
        let total = match file.metadata().await {
            Ok(meta) => meta.len(),
            Err(_) => request.metadata.size,
        };
        let input = InputFile::read(ProgressReader::new(file, total, progress))
            .file_name(request.metadata.name.clone());

        let caption = views::upload_caption(&request.metadata);
        let keyboard = views::direct_download_keyboard(&request.metadata);
        let thumbnail = request
            .thumbnail
            .as_ref()
            .filter(|path| path.is_file())
            .map(|path| InputFile::file(path.clone()));

        info!(
            chat_id = self.chat_id.0,
            file_name = %request.metadata.name,
            size = total,
            kind = ?request.kind,
            "Uploading file"
        );

        let sent = match request.kind {
            UploadKind::Video {
                duration,
                supports_streaming,
                has_spoiler,
            } => {
                let mut req = self
                    .bot
                    .send_video(self.chat_id, input)
                    .caption(caption)
                    .parse_mode(ParseMode::Html)
                    .supports_streaming(supports_streaming)
                    .has_spoiler(has_spoiler);
                if let Some(seconds) = duration {
                    req = req.duration(seconds);
                }
                if let Some(thumb) = thumbnail {
                    req = req.thumbnail(thumb);
                }
                if let Some(markup) = keyboard {
                    req = req.reply_markup(markup);
                }
                req.await
            }
            UploadKind::Document => {
                let mut req = self
                    .bot
                    .send_document(self.chat_id, input)
                    .caption(caption)
                    .parse_mode(ParseMode::Html);
                if let Some(thumb) = thumbnail {
                    req = req.thumbnail(thumb);
                }
                if let Some(markup) = keyboard {
                    req = req.reply_markup(markup);
                }
                req.await
            }
        };

        sent.map(|_| ()).map_err(to_transport_error)
    }
}

/// Reader that reports cumulative bytes read on a channel
pub struct ProgressReader<R> {
    inner: R,
    sent: u64,
    total: u64,
    progress: UnboundedSender<UploadProgress>,
}

impl<R> ProgressReader<R> {
    /// Wrap `inner`, whose full length is `total` bytes
    pub const fn new(inner: R, total: u64, progress: UnboundedSender<UploadProgress>) -> Self {
        Self {
            inner,
            sent: 0,
            total,
            progress,
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ProgressReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            let read = (buf.filled().len() - before) as u64;
            if read > 0 {
                self.sent += read;
                // Nobody listening is fine, the upload goes on
                let _ = self.progress.send(UploadProgress {
                    sent: self.sent,
                    total: self.total,
                });
            }
        }
        poll
    }
}
