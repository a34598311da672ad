//! Telegram bot that fetches Terabox share links and re-uploads the files.
//!
//! A link goes through [`job::JobPipeline`]: metadata lookup, size gate,
//! aria2c download, upload back into the chat, cleanup. The Telegram side
//! lives in [`bot`].

/// Telegram handlers, views and transport
pub mod bot;
/// Configuration and settings management
pub mod config;
/// Per-link job pipeline
pub mod job;
/// Logging setup with secret redaction
pub mod logging;
/// Authorized user storage
pub mod storage;
/// Utility functions
pub mod utils;
/// Health-check web server
pub mod web;
