//! Service layer: external integrations, persistence and the processing pipeline.
//!
//! Contains clients for document analysis (Gemini), market search (Perplexity)
//! and spreadsheets (Google Sheets), plus local stores and fallback artifacts.

pub mod enrichment;
pub mod gemini;
pub mod google_auth;
pub mod local_storage;
pub mod market;
pub mod pipeline;
pub mod prompts;
pub mod sheets;
pub mod store;

pub use gemini::GeminiClient;
pub use google_auth::ServiceAccountAuth;
pub use local_storage::LocalStorage;
pub use market::PerplexityClient;
pub use pipeline::Pipeline;
pub use sheets::GoogleSheetsClient;
pub use store::{ProjectStore, UserStore};
