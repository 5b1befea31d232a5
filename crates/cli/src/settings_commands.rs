use {
    anyhow::Result,
    clap::Subcommand,
    rag_studio_client::{ApiClient, QueryMode},
    rag_studio_stores::{ParserSettingsUpdate, QuerySettingsUpdate, Settings, SettingsStore},
    secrecy::Secret,
    serde_json::json,
    tracing::info,
};

use crate::context::{App, print_json};

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Print the current settings. The OpenAI key is never shown.
    Show,
    /// Point the client at another backend.
    SetApiUrl { url: String },
    /// Store the OpenAI key, read from the environment.
    SetOpenaiKey {
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        key: String,
    },
    /// Default document parser options.
    Parser {
        /// mineru or docling.
        #[arg(long)]
        parser: Option<String>,
        /// auto, ocr or txt.
        #[arg(long)]
        parse_method: Option<String>,
        #[arg(long)]
        images: Option<bool>,
        #[arg(long)]
        tables: Option<bool>,
        #[arg(long)]
        equations: Option<bool>,
    },
    /// Default query options.
    Query {
        #[arg(long)]
        mode: Option<QueryMode>,
        #[arg(long)]
        vlm: Option<bool>,
        #[arg(long)]
        top_k: Option<u32>,
        #[arg(long)]
        temperature: Option<f32>,
    },
    /// Restore every setting to its default.
    Reset,
}

fn summary(settings: &Settings) -> serde_json::Value {
    json!({
        "api_url": settings.api_url,
        "openai_api_key": if settings.has_openai_api_key() { "set" } else { "unset" },
        "openai_base_url": settings.openai_base_url,
        "default_llm_model": settings.default_llm_model,
        "default_vision_model": settings.default_vision_model,
        "default_embedding_model": settings.default_embedding_model,
        "parser": settings.parser,
        "query": settings.query,
        "available_models": settings.available_models,
    })
}

pub fn handle_settings(app: &App, action: SettingsAction) -> Result<()> {
    let mut store = SettingsStore::load(app.data.settings());
    match action {
        SettingsAction::Show => return print_json(&summary(store.settings())),
        SettingsAction::SetApiUrl { url } => {
            ApiClient::new(&url)?;
            store.set_api_url(&url);
            let path = rag_studio_config::update_config(|c| c.api.url = url.clone())?;
            info!(path = %path.display(), %url, "api url updated");
        },
        SettingsAction::SetOpenaiKey { key } => store.set_openai_api_key(Secret::new(key)),
        SettingsAction::Parser {
            parser,
            parse_method,
            images,
            tables,
            equations,
        } => store.update_parser_settings(ParserSettingsUpdate {
            parser,
            parse_method,
            enable_image_processing: images,
            enable_table_processing: tables,
            enable_equation_processing: equations,
        }),
        SettingsAction::Query {
            mode,
            vlm,
            top_k,
            temperature,
        } => store.update_query_settings(QuerySettingsUpdate {
            default_mode: mode,
            enable_vlm: vlm,
            top_k,
            temperature,
        }),
        SettingsAction::Reset => store.reset(),
    }
    store.save()?;
    print_json(&summary(store.settings()))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret};

    #[test]
    fn summary_hides_the_key() {
        let mut settings = Settings::default();
        assert_eq!(summary(&settings)["openai_api_key"], "unset");
        settings.openai_api_key = Secret::new("sk-test".into());
        let out = summary(&settings);
        assert_eq!(out["openai_api_key"], "set");
        assert!(!out.to_string().contains(settings.openai_api_key.expose_secret()));
        assert_eq!(out["query"]["default_mode"], "hybrid");
    }
}
