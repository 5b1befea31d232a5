use {
    anyhow::Context,
    rag_studio_channels::ChannelConfig,
    rag_studio_client::ApiClient,
    rag_studio_config::StudioConfig,
    rag_studio_stores::DataDir,
    secrecy::Secret,
    serde_json::Value,
};

/// Resolved configuration shared by every command.
pub struct App {
    pub config: StudioConfig,
    pub data: DataDir,
}

impl App {
    pub fn load() -> Self {
        Self::from_config(rag_studio_config::discover_and_load())
    }

    pub fn from_config(config: StudioConfig) -> Self {
        let data = DataDir::new(rag_studio_config::data_dir(&config));
        Self { config, data }
    }

    pub fn api(&self) -> anyhow::Result<ApiClient> {
        let api = &self.config.api;
        let client = ApiClient::with_timeout(&api.url, api.timeout())
            .with_context(|| format!("invalid api.url '{}'", api.url))?;
        Ok(client.with_token(api.token.clone().map(Secret::new)))
    }

    /// Channel settings for `client_id`, or the configured one.
    pub fn channel_config(&self, client_id: Option<&str>) -> anyhow::Result<ChannelConfig> {
        let section = &self.config.channel;
        let url = self.api()?.ws_url(client_id.unwrap_or(&section.client_id))?;
        Ok(ChannelConfig::new(url)
            .with_reconnect(section.reconnect)
            .with_reconnect_interval(section.reconnect_interval()))
    }
}

pub fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::time::Duration};

    fn app(url: &str) -> App {
        let mut config = StudioConfig::default();
        config.api.url = url.into();
        config.channel.reconnect_interval_ms = 250;
        config.storage.data_dir = Some("/tmp/rag-studio-cli-test".into());
        App::from_config(config)
    }

    #[test]
    fn channel_config_derives_ws_url() {
        let app = app("https://rag.example.com");
        let cfg = app.channel_config(None).unwrap();
        assert_eq!(cfg.url, "wss://rag.example.com/api/v1/ws/upload-client");
        assert!(cfg.reconnect);
        assert_eq!(cfg.reconnect_interval, Duration::from_millis(250));

        let custom = app.channel_config(Some("cli-7")).unwrap();
        assert_eq!(custom.url, "wss://rag.example.com/api/v1/ws/cli-7");
    }

    #[test]
    fn invalid_api_url_is_reported() {
        let app = app("not a url");
        let err = app.api().unwrap_err();
        assert!(err.to_string().contains("invalid api.url"));
    }

    #[test]
    fn data_dir_follows_config() {
        let app = app("http://localhost:8000");
        assert!(app.data.chat().ends_with("chat.json"));
        assert_eq!(
            Some(app.data.root()),
            app.config.storage.data_dir.as_deref()
        );
    }
}
