//! Persisted client state.
//!
//! Each store owns its state and reads or writes one JSON file, only when
//! asked to via `load` / `save`. Nothing here is global: callers construct
//! the stores they need and pass them around.

pub mod chat;
pub mod documents;
pub mod error;
mod persist;
pub mod settings;
pub mod ui;
pub mod uploads;

use std::path::{Path, PathBuf};

pub use {
    chat::{ChatMessage, ChatSession, ChatStore, NewMessage, Role},
    documents::{Document, DocumentStore, StatusFilter},
    error::StoreError,
    settings::{
        AiModel, ModelKind, ParserSettings, ParserSettingsUpdate, QuerySettings,
        QuerySettingsUpdate, Settings, SettingsStore,
    },
    ui::{Theme, UiStore, ViewMode},
    uploads::{UploadStatus, UploadTask, UploadTracker},
};

/// File layout of the data directory.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn chat(&self) -> PathBuf {
        self.root.join("chat.json")
    }

    pub fn documents(&self) -> PathBuf {
        self.root.join("documents.json")
    }

    pub fn settings(&self) -> PathBuf {
        self.root.join("settings.json")
    }

    pub fn ui(&self) -> PathBuf {
        self.root.join("ui.json")
    }
}
