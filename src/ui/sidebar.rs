use crate::api::models::Correspondent;
use crate::stores::{ChatStore, SessionStore};

/// One roster line: position, presence dot, name, unread badge.
pub fn row(index: usize, c: &Correspondent, unread: u32, online: bool, selected: bool) -> String {
    let cursor = if selected { '>' } else { ' ' };
    let dot = if online { '*' } else { ' ' };
    let mut line = format!("{cursor}{:>3}. {dot} {}", index + 1, c.full_name());
    if c.has_unread {
        line.push_str(&format!(" ({} new)", unread.max(1)));
    }
    line
}

/// Roster in display order, one line per correspondent.
pub fn render(chat: &ChatStore, session: &SessionStore) -> Vec<String> {
    let selected = chat.selected().map(|c| c.id.as_str());
    let rows: Vec<String> = chat
        .sorted_roster()
        .into_iter()
        .enumerate()
        .map(|(i, c)| row(i, c, chat.unread_count(&c.id), session.is_online(&c.id), selected == Some(c.id.as_str())))
        .collect();
    if rows.is_empty() {
        return vec!["  (no conversations)".to_string()];
    }
    rows
}

/// Resolve what the user typed after `/open`: a 1-based roster position, an
/// id, or a (case-insensitive) first name.
pub fn pick<'a>(chat: &'a ChatStore, needle: &str) -> Option<&'a Correspondent> {
    let sorted = chat.sorted_roster();
    if let Ok(n) = needle.parse::<usize>() {
        if let Some(c) = n.checked_sub(1).and_then(|i| sorted.get(i).copied()) {
            return Some(c);
        }
    }
    sorted
        .iter()
        .copied()
        .find(|c| c.id == needle)
        .or_else(|| sorted.iter().copied().find(|c| c.name.eq_ignore_ascii_case(needle)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_shows_badge_and_presence() {
        let c = Correspondent {
            id: "u1".into(),
            name: "Ada".into(),
            last_name: "Lovelace".into(),
            profile_picture: None,
            last_activity: None,
            has_unread: true,
        };
        assert_eq!(row(0, &c, 3, true, false), "   1. * Ada Lovelace (3 new)");
        let read = Correspondent { has_unread: false, ..c };
        assert_eq!(row(9, &read, 0, false, true), "> 10.   Ada Lovelace");
    }
}
