use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use crate::storage::{KeyValueStore, THEME_KEY};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ThemePreference {
    Light,
    Dark,
    #[default]
    System,
}

impl ThemePreference {
    pub fn as_str(self) -> &'static str {
        match self {
            ThemePreference::Light => "light",
            ThemePreference::Dark => "dark",
            ThemePreference::System => "system",
        }
    }

    /// Resolve against the platform colour scheme.
    pub fn is_dark(self, system_is_dark: bool) -> bool {
        match self {
            ThemePreference::Light => false,
            ThemePreference::Dark => true,
            ThemePreference::System => system_is_dark,
        }
    }
}

impl fmt::Display for ThemePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThemePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light" => Ok(ThemePreference::Light),
            "dark" => Ok(ThemePreference::Dark),
            "system" => Ok(ThemePreference::System),
            other => Err(format!("unknown theme {other:?}")),
        }
    }
}

pub struct ThemeManager {
    store: Arc<dyn KeyValueStore>,
    current: RwLock<ThemePreference>,
}

impl ThemeManager {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            current: RwLock::new(ThemePreference::default()),
        }
    }

    pub fn theme(&self) -> ThemePreference {
        *self.current.read()
    }

    pub fn is_dark_mode(&self, system_is_dark: bool) -> bool {
        self.theme().is_dark(system_is_dark)
    }

    /// Load the saved preference. Missing, unknown or unreadable values
    /// leave `system` in place.
    pub async fn load(&self) -> ThemePreference {
        match self.store.get(THEME_KEY).await {
            Ok(Some(saved)) => match saved.parse() {
                Ok(theme) => *self.current.write() = theme,
                Err(e) => warn!(error = %e, "ignoring saved theme"),
            },
            Ok(None) => {}
            Err(e) => warn!(error = %e, "failed to load theme preference"),
        }
        self.theme()
    }

    /// Switch theme. Memory changes first; a failed save is only logged.
    pub async fn set(&self, theme: ThemePreference) {
        {
            let mut current = self.current.write();
            if *current == theme {
                return;
            }
            *current = theme;
        }
        if let Err(e) = self.store.set(THEME_KEY, theme.as_str()).await {
            warn!(error = %e, "failed to save theme preference");
        }
    }
}
