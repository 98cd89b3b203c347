//! Chat transport: Telegram Bot API types and client.

pub mod client;
pub mod types;

pub use client::{ChatApi, TelegramClient, TelegramError};
