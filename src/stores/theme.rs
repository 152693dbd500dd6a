use crate::error::Result;
use crate::storage::Preferences;

const THEME_KEY: &str = "theme";
pub const DEFAULT_THEME: &str = "black";

pub struct ThemeStore {
    prefs: Preferences,
    theme: String,
}

impl ThemeStore {
    pub fn load(prefs: Preferences) -> Self {
        let theme = match prefs.get(THEME_KEY) {
            Ok(Some(t)) => t,
            Ok(None) => DEFAULT_THEME.to_string(),
            Err(e) => {
                log::debug!("could not read theme preference: {e}");
                DEFAULT_THEME.to_string()
            }
        };
        Self { prefs, theme }
    }

    pub fn theme(&self) -> &str {
        &self.theme
    }

    pub fn set_theme(&mut self, theme: &str) -> Result<()> {
        self.prefs.set(THEME_KEY, theme)?;
        self.theme = theme.to_string();
        Ok(())
    }
}
