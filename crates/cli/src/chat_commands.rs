use {
    anyhow::{Result, bail},
    clap::{Args, Subcommand},
    rag_studio_client::QueryMode,
    rag_studio_stores::{ChatSession, ChatStore, NewMessage, Role, SettingsStore},
    serde_json::Value,
    tracing::warn,
};

use crate::context::App;

#[derive(Args)]
pub struct QueryArgs {
    /// The question.
    text: String,
    /// naive, local, global or hybrid; defaults to the saved query setting.
    #[arg(long)]
    mode: Option<QueryMode>,
    /// Use the vision model on retrieved images.
    #[arg(long)]
    vlm: bool,
    /// Record the exchange in this session instead of the current one.
    #[arg(long, conflicts_with = "new_session")]
    session: Option<String>,
    /// Start a new session for this question.
    #[arg(long)]
    new_session: bool,
}

#[derive(Subcommand)]
pub enum SessionAction {
    /// Most recently updated sessions.
    List {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Print a session's messages; defaults to the current session.
    Show { id: Option<String> },
    /// Remove all messages from a session.
    Clear { id: String },
    /// Delete a session.
    Delete { id: String },
    /// Start an empty session and make it current.
    New { title: Option<String> },
}

/// The answer text of a query response, falling back to the raw body.
fn answer_of(response: &Value) -> String {
    ["answer", "response", "result"]
        .iter()
        .find_map(|key| response[*key].as_str())
        .map(str::to_string)
        .unwrap_or_else(|| response.to_string())
}

fn sources_of(response: &Value) -> Vec<Value> {
    response["sources"].as_array().cloned().unwrap_or_default()
}

/// Make the session the exchange belongs to current.
fn select_session(chat: &mut ChatStore, args: &QueryArgs) -> Result<()> {
    if let Some(id) = &args.session {
        if chat.session(id).is_none() {
            bail!("no chat session '{id}'");
        }
        chat.set_current_session(id);
    } else if args.new_session || chat.current_session().is_none() {
        chat.create_session(None);
    }
    Ok(())
}

pub async fn query(app: &App, args: QueryArgs) -> Result<()> {
    let api = app.api()?;
    let defaults = SettingsStore::load(app.data.settings()).settings().query.clone();
    let mode = args.mode.unwrap_or(defaults.default_mode);
    let vlm = args.vlm || defaults.enable_vlm;

    let mut chat = ChatStore::load(app.data.chat());
    select_session(&mut chat, &args)?;
    chat.add_message(NewMessage::user(&args.text).with_mode(mode, vlm))?;
    chat.set_streaming(true);
    chat.save()?;

    let result = api.query(&args.text, mode, vlm).await;
    chat.set_streaming(false);
    let response = match result {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "query failed");
            chat.add_message(NewMessage::assistant(format!("Error: {e}")).with_mode(mode, vlm))?;
            chat.save()?;
            return Err(e.into());
        },
    };

    let answer = answer_of(&response);
    let sources = sources_of(&response);
    println!("{answer}");
    if !sources.is_empty() {
        println!("\n{} sources", sources.len());
    }
    chat.add_message(
        NewMessage::assistant(answer)
            .with_mode(mode, vlm)
            .with_sources(sources),
    )?;
    chat.save()?;
    Ok(())
}

fn print_session(session: &ChatSession) {
    println!("{} ({})", session.title, session.id);
    for message in &session.messages {
        let who = match message.role {
            Role::User => "you",
            Role::Assistant => "assistant",
            Role::System => "system",
        };
        println!("\n{who}:\n{}", message.content);
    }
}

pub fn handle_sessions(app: &App, action: SessionAction) -> Result<()> {
    let mut chat = ChatStore::load(app.data.chat());
    match action {
        SessionAction::List { limit } => {
            let current = chat.current_session_id();
            for session in chat.recent_sessions(limit) {
                let marker = if current == Some(session.id.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!(
                    "{marker} {}  {:>3} msgs  {}",
                    session.id,
                    session.messages.len(),
                    session.title
                );
            }
        },
        SessionAction::Show { id } => {
            let session = match &id {
                Some(id) => chat.session(id),
                None => chat.current_session(),
            };
            match session {
                Some(session) => print_session(session),
                None => bail!("no such chat session"),
            }
        },
        SessionAction::Clear { id } => {
            if !chat.clear_session(&id) {
                bail!("no chat session '{id}'");
            }
            chat.save()?;
        },
        SessionAction::Delete { id } => {
            if !chat.delete_session(&id) {
                bail!("no chat session '{id}'");
            }
            chat.save()?;
        },
        SessionAction::New { title } => {
            let id = chat.create_session(title.as_deref()).id.clone();
            chat.save()?;
            println!("{id}");
        },
    }
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    fn args(session: Option<&str>, new_session: bool) -> QueryArgs {
        QueryArgs {
            text: "what is in the report?".into(),
            mode: None,
            vlm: false,
            session: session.map(str::to_string),
            new_session,
        }
    }

    #[test]
    fn answer_falls_back_through_known_keys() {
        assert_eq!(answer_of(&json!({"answer": "42"})), "42");
        assert_eq!(answer_of(&json!({"response": "hi"})), "hi");
        assert_eq!(answer_of(&json!({"other": 1})), r#"{"other":1}"#);
        assert_eq!(sources_of(&json!({"sources": [{"id": 1}]})).len(), 1);
        assert!(sources_of(&json!({})).is_empty());
    }

    #[test]
    fn session_selection() {
        let dir = std::env::temp_dir().join(format!("rag-studio-chat-{}", std::process::id()));
        let mut chat = ChatStore::load(dir.join("chat.json"));

        select_session(&mut chat, &args(None, false)).unwrap();
        let first = chat.current_session_id().unwrap().to_string();

        select_session(&mut chat, &args(None, false)).unwrap();
        assert_eq!(chat.current_session_id(), Some(first.as_str()));

        select_session(&mut chat, &args(None, true)).unwrap();
        assert_ne!(chat.current_session_id(), Some(first.as_str()));

        select_session(&mut chat, &args(Some(&first), false)).unwrap();
        assert_eq!(chat.current_session_id(), Some(first.as_str()));

        assert!(select_session(&mut chat, &args(Some("session_missing"), false)).is_err());
    }
}
