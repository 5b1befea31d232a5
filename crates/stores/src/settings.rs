use std::path::PathBuf;

use {
    rag_studio_client::QueryMode,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize, Serializer},
};

use crate::{
    error::StoreError,
    persist::{load_or_default, save_json},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Llm,
    Vision,
    Embedding,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiModel {
    pub id: String,
    pub name: String,
    /// `openai`, `anthropic`, `google` or `local`.
    pub provider: String,
    #[serde(rename = "type")]
    pub kind: ModelKind,
}

impl AiModel {
    pub fn new(id: &str, name: &str, provider: &str, kind: ModelKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            provider: provider.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserSettings {
    /// `mineru` or `docling`.
    pub parser: String,
    /// `auto`, `ocr` or `txt`.
    pub parse_method: String,
    pub enable_image_processing: bool,
    pub enable_table_processing: bool,
    pub enable_equation_processing: bool,
}

impl Default for ParserSettings {
    fn default() -> Self {
        Self {
            parser: "mineru".into(),
            parse_method: "auto".into(),
            enable_image_processing: true,
            enable_table_processing: true,
            enable_equation_processing: true,
        }
    }
}

/// Fields left `None` keep their current value.
#[derive(Debug, Clone, Default)]
pub struct ParserSettingsUpdate {
    pub parser: Option<String>,
    pub parse_method: Option<String>,
    pub enable_image_processing: Option<bool>,
    pub enable_table_processing: Option<bool>,
    pub enable_equation_processing: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    pub default_mode: QueryMode,
    pub enable_vlm: bool,
    pub top_k: u32,
    pub temperature: f32,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            default_mode: QueryMode::Hybrid,
            enable_vlm: false,
            top_k: 10,
            temperature: 0.7,
        }
    }
}

/// Fields left `None` keep their current value.
#[derive(Debug, Clone, Default)]
pub struct QuerySettingsUpdate {
    pub default_mode: Option<QueryMode>,
    pub enable_vlm: Option<bool>,
    pub top_k: Option<u32>,
    pub temperature: Option<f32>,
}

fn expose<S: Serializer>(secret: &Secret<String>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

fn default_models() -> Vec<AiModel> {
    vec![
        AiModel::new("gpt-4o", "GPT-4o", "openai", ModelKind::Llm),
        AiModel::new("gpt-4o-mini", "GPT-4o Mini", "openai", ModelKind::Llm),
        AiModel::new("gpt-4-turbo", "GPT-4 Turbo", "openai", ModelKind::Llm),
        AiModel::new("gpt-4o", "GPT-4o Vision", "openai", ModelKind::Vision),
        AiModel::new(
            "text-embedding-3-large",
            "Text Embedding 3 Large",
            "openai",
            ModelKind::Embedding,
        ),
    ]
}

#[derive(Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_url: String,
    #[serde(serialize_with = "expose")]
    pub openai_api_key: Secret<String>,
    pub openai_base_url: String,
    pub default_llm_model: String,
    pub default_vision_model: String,
    pub default_embedding_model: String,
    pub parser: ParserSettings,
    pub query: QuerySettings,
    pub available_models: Vec<AiModel>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".into(),
            openai_api_key: Secret::new(String::new()),
            openai_base_url: "https://api.openai.com/v1".into(),
            default_llm_model: "gpt-4o-mini".into(),
            default_vision_model: "gpt-4o".into(),
            default_embedding_model: "text-embedding-3-large".into(),
            parser: ParserSettings::default(),
            query: QuerySettings::default(),
            available_models: default_models(),
        }
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("api_url", &self.api_url)
            .field("openai_api_key", &"[REDACTED]")
            .field("openai_base_url", &self.openai_base_url)
            .field("default_llm_model", &self.default_llm_model)
            .field("default_vision_model", &self.default_vision_model)
            .field("default_embedding_model", &self.default_embedding_model)
            .field("parser", &self.parser)
            .field("query", &self.query)
            .field("available_models", &self.available_models.len())
            .finish()
    }
}

impl Settings {
    pub fn has_openai_api_key(&self) -> bool {
        !self.openai_api_key.expose_secret().is_empty()
    }
}

/// User settings, persisted in full to `settings.json` (owner-only on Unix,
/// since it holds the API key).
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    settings: Settings,
}

impl SettingsStore {
    pub fn load(path: PathBuf) -> Self {
        let settings = load_or_default(&path);
        Self { path, settings }
    }

    pub fn save(&self) -> Result<(), StoreError> {
        save_json(&self.path, &self.settings)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600)).map_err(
                |source| StoreError::Io {
                    path: self.path.clone(),
                    source,
                },
            )?;
        }
        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn set_api_url(&mut self, url: impl Into<String>) {
        self.settings.api_url = url.into();
    }

    pub fn set_openai_api_key(&mut self, key: Secret<String>) {
        self.settings.openai_api_key = key;
    }

    pub fn set_openai_base_url(&mut self, url: impl Into<String>) {
        self.settings.openai_base_url = url.into();
    }

    pub fn set_default_llm_model(&mut self, model: impl Into<String>) {
        self.settings.default_llm_model = model.into();
    }

    pub fn set_default_vision_model(&mut self, model: impl Into<String>) {
        self.settings.default_vision_model = model.into();
    }

    pub fn set_default_embedding_model(&mut self, model: impl Into<String>) {
        self.settings.default_embedding_model = model.into();
    }

    pub fn update_parser_settings(&mut self, update: ParserSettingsUpdate) {
        let parser = &mut self.settings.parser;
        if let Some(v) = update.parser {
            parser.parser = v;
        }
        if let Some(v) = update.parse_method {
            parser.parse_method = v;
        }
        if let Some(v) = update.enable_image_processing {
            parser.enable_image_processing = v;
        }
        if let Some(v) = update.enable_table_processing {
            parser.enable_table_processing = v;
        }
        if let Some(v) = update.enable_equation_processing {
            parser.enable_equation_processing = v;
        }
    }

    pub fn update_query_settings(&mut self, update: QuerySettingsUpdate) {
        let query = &mut self.settings.query;
        if let Some(v) = update.default_mode {
            query.default_mode = v;
        }
        if let Some(v) = update.enable_vlm {
            query.enable_vlm = v;
        }
        if let Some(v) = update.top_k {
            query.top_k = v;
        }
        if let Some(v) = update.temperature {
            query.temperature = v;
        }
    }

    pub fn add_model(&mut self, model: AiModel) {
        self.settings.available_models.push(model);
    }

    /// Removes every entry with this id, across model kinds.
    pub fn remove_model(&mut self, id: &str) {
        self.settings.available_models.retain(|m| m.id != id);
    }

    pub fn reset(&mut self) {
        self.settings = Settings::default();
    }
}
