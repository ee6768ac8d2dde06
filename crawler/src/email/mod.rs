pub mod client;
pub mod mail_api;
pub mod raw_message;

pub use client::GmailClient;
pub use mail_api::{BatchItem, GmailApiError, MailApi, MessageIdPage};
pub use raw_message::RawMessage;
