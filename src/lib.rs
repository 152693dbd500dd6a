//! Chat client core: session and profile management, a real-time channel,
//! and the conversation state that reconciles REST history with live events.

pub mod api;
pub mod app;
pub mod channel;
pub mod error;
pub mod imaging;
pub mod notice;
pub mod storage;
pub mod stores;
pub mod ui;
pub mod utils;

pub use error::{Error, Result};
