//! Conversation layer between the chat transport and the pipeline.

pub mod admin;
pub mod handler;
pub mod messages;
pub mod session;
pub mod state;

pub use handler::{Bot, BotOptions};
