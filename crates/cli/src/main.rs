mod chat_commands;
mod context;
mod library_commands;
mod live_commands;
mod settings_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    rag_studio_client::ApiError,
    tracing::{debug, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use crate::context::App;

#[derive(Parser)]
#[command(name = "rag-studio", about = "RAG Studio: command-line client for a RAG-Anything backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Directory holding rag-studio.{toml,yaml,yml,json}. Other locations
    /// are not searched when set.
    #[arg(long, global = true, env = "RAG_STUDIO_CONFIG_DIR")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print live channel messages until Ctrl-C.
    Watch {
        /// Channel client id; defaults to `channel.client_id`.
        #[arg(long)]
        client_id: Option<String>,
    },
    /// Upload files, parse them and follow their progress.
    Upload(live_commands::UploadArgs),
    /// Ask the knowledge base a question.
    Query(chat_commands::QueryArgs),
    /// Uploaded documents.
    Docs {
        #[command(subcommand)]
        action: library_commands::DocsAction,
    },
    /// Knowledge graph.
    Graph {
        #[command(subcommand)]
        action: library_commands::GraphAction,
    },
    /// Vector space.
    Vectors {
        #[command(subcommand)]
        action: library_commands::VectorsAction,
    },
    /// Backend health and status.
    Health,
    /// Document, chunk, entity and query totals in one view.
    Analytics {
        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Local chat sessions.
    Sessions {
        #[command(subcommand)]
        action: chat_commands::SessionAction,
    },
    /// Client settings.
    Settings {
        #[command(subcommand)]
        action: settings_commands::SettingsAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

async fn run(app: &App, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Watch { client_id } => live_commands::watch(app, client_id.as_deref()).await,
        Commands::Upload(args) => live_commands::upload(app, args).await,
        Commands::Query(args) => chat_commands::query(app, args).await,
        Commands::Docs { action } => library_commands::handle_docs(app, action).await,
        Commands::Graph { action } => library_commands::handle_graph(app, action).await,
        Commands::Vectors { action } => library_commands::handle_vectors(app, action).await,
        Commands::Health => library_commands::health(app).await,
        Commands::Analytics { json } => library_commands::analytics(app, json).await,
        Commands::Sessions { action } => chat_commands::handle_sessions(app, action),
        Commands::Settings { action } => settings_commands::handle_settings(app, action),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    debug!(version = env!("CARGO_PKG_VERSION"), "rag-studio starting");

    if let Some(dir) = cli.config.clone() {
        rag_studio_config::set_config_dir(dir);
    }
    let app = App::load();

    let result = run(&app, cli.command).await;
    if let Err(e) = &result {
        if matches!(e.downcast_ref::<ApiError>(), Some(ApiError::Unauthorized)) {
            forget_token();
        }
    }
    result
}

/// The backend rejected the configured token: drop it so the next run does
/// not keep sending it.
fn forget_token() {
    match rag_studio_config::update_config(|c| c.api.token = None) {
        Ok(path) => warn!(path = %path.display(), "api token rejected, removed it from config"),
        Err(e) => warn!(error = %e, "api token rejected, failed to update config"),
    }
    if std::env::var_os(rag_studio_config::loader::ENV_API_TOKEN).is_some() {
        warn!(
            "{} is set in the environment and was also rejected",
            rag_studio_config::loader::ENV_API_TOKEN
        );
    }
}
