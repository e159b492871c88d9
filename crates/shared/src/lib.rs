//! Wayfarer Shared - boundary types between the engine and whatever embeds it
//! (a chat bot, an HTTP layer, a test harness).
//!
//! # Design Principles
//!
//! 1. **Minimal dependencies** - Only serde and serde_json
//! 2. **No business logic** - Pure data types and serialization
//! 3. **No domain IDs** - DTOs carry raw strings; the engine resolves them

pub mod requests;
pub mod responses;

pub use requests::ActionRequest;
pub use responses::{ActionOutcome, Notification, WorldStatus};
