/// Admission of inbound text messages
pub mod admission;
/// Command, callback and text handlers
pub mod handlers;
/// Flood-aware Telegram request helpers
pub mod resilient;
/// Telegram implementation of the job transport
pub mod transport;
/// Message texts and keyboards
pub mod views;

pub use transport::TelegramJobTransport;
