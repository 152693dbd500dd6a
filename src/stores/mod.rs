pub mod chat;
pub mod session;
pub mod theme;

pub use chat::ChatStore;
pub use session::SessionStore;
pub use theme::ThemeStore;
