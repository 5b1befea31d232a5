use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{
    error::StoreError,
    persist::{load_or_default, save_json},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Grid,
    List,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct UiPrefs {
    theme: Theme,
    sidebar_collapsed: bool,
    view_mode: ViewMode,
    active_tab: String,
}

impl Default for UiPrefs {
    fn default() -> Self {
        Self {
            theme: Theme::System,
            sidebar_collapsed: false,
            view_mode: ViewMode::Grid,
            active_tab: "home".into(),
        }
    }
}

/// Display preferences, persisted to `ui.json`. The command palette flag is
/// session-only.
#[derive(Debug)]
pub struct UiStore {
    path: PathBuf,
    prefs: UiPrefs,
    command_palette_open: bool,
}

impl UiStore {
    pub fn load(path: PathBuf) -> Self {
        let prefs = load_or_default(&path);
        Self {
            path,
            prefs,
            command_palette_open: false,
        }
    }

    pub fn save(&self) -> Result<(), StoreError> {
        save_json(&self.path, &self.prefs)
    }

    pub fn theme(&self) -> Theme {
        self.prefs.theme
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.prefs.theme = theme;
    }

    /// `System` resolves against the caller's notion of the OS preference.
    pub fn effective_theme(&self, system_prefers_dark: bool) -> Theme {
        match self.prefs.theme {
            Theme::System if system_prefers_dark => Theme::Dark,
            Theme::System => Theme::Light,
            explicit => explicit,
        }
    }

    pub fn sidebar_collapsed(&self) -> bool {
        self.prefs.sidebar_collapsed
    }

    pub fn toggle_sidebar(&mut self) {
        self.prefs.sidebar_collapsed = !self.prefs.sidebar_collapsed;
    }

    pub fn set_sidebar_collapsed(&mut self, collapsed: bool) {
        self.prefs.sidebar_collapsed = collapsed;
    }

    pub fn view_mode(&self) -> ViewMode {
        self.prefs.view_mode
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) {
        self.prefs.view_mode = mode;
    }

    pub fn active_tab(&self) -> &str {
        &self.prefs.active_tab
    }

    pub fn set_active_tab(&mut self, tab: impl Into<String>) {
        self.prefs.active_tab = tab.into();
    }

    pub fn command_palette_open(&self) -> bool {
        self.command_palette_open
    }

    pub fn toggle_command_palette(&mut self) {
        self.command_palette_open = !self.command_palette_open;
    }

    pub fn set_command_palette_open(&mut self, open: bool) {
        self.command_palette_open = open;
    }
}
