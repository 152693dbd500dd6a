//! Terminal front end: command parsing and plain-text rendering of the
//! stores. No state of its own.

pub mod chat_view;
pub mod commands;
pub mod sidebar;
