//! User-facing notifications. Stores push them; whatever front end is
//! running drains the queue and shows them.

use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Success,
    Error,
    Loading,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Show { id: u64, level: Level, text: String },
    /// Replace the text of a still-visible notice (a loading one, usually).
    Update { id: u64, text: String },
    Dismiss { id: u64 },
}

/// Sending half of the notice queue. Cloned into every store.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Notice>,
    next_id: std::sync::Arc<std::sync::atomic::AtomicU64>,
}

impl Notifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let notifier = Self { tx, next_id: Default::default() };
        (notifier, rx)
    }

    fn show(&self, level: Level, text: impl Into<String>) -> u64 {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        // nobody listening is fine; notices are best effort
        let _ = self.tx.send(Notice::Show { id, level, text: text.into() });
        id
    }

    pub fn info(&self, text: impl Into<String>) -> u64 {
        self.show(Level::Info, text)
    }

    pub fn success(&self, text: impl Into<String>) -> u64 {
        self.show(Level::Success, text)
    }

    pub fn error(&self, text: impl Into<String>) -> u64 {
        self.show(Level::Error, text)
    }

    pub fn loading(&self, text: impl Into<String>) -> u64 {
        self.show(Level::Loading, text)
    }

    pub fn update(&self, id: u64, text: impl Into<String>) {
        let _ = self.tx.send(Notice::Update { id, text: text.into() });
    }

    pub fn dismiss(&self, id: u64) {
        let _ = self.tx.send(Notice::Dismiss { id });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_across_clones() {
        let (a, mut rx) = Notifier::channel();
        let b = a.clone();
        let first = a.loading("Updating profile...");
        let second = b.error("boom");
        assert_ne!(first, second);
        a.dismiss(first);

        assert!(matches!(rx.try_recv().unwrap(), Notice::Show { level: Level::Loading, .. }));
        assert!(matches!(rx.try_recv().unwrap(), Notice::Show { level: Level::Error, .. }));
        assert_eq!(rx.try_recv().unwrap(), Notice::Dismiss { id: first });
    }
}
