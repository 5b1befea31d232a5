use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use {
    anyhow::Result,
    clap::Args,
    rag_studio_channels::{ChannelError, FanOut, MessageChannel},
    rag_studio_protocol::{ChannelMessage, ParsingProgress},
    rag_studio_stores::{SettingsStore, UploadStatus, UploadTracker},
    tokio::sync::broadcast::{self, error::RecvError},
    tracing::{info, warn},
};

use crate::context::App;

#[derive(Args)]
pub struct UploadArgs {
    /// Files to upload.
    #[arg(required = true)]
    files: Vec<PathBuf>,
    /// `mineru` or `docling`; defaults to the saved parser setting.
    #[arg(long)]
    parser: Option<String>,
    /// `auto`, `ocr` or `txt`; defaults to the saved parser setting.
    #[arg(long)]
    parse_method: Option<String>,
    /// Channel client id for progress updates.
    #[arg(long)]
    client_id: Option<String>,
}

/// Open a channel whose messages fan out to `fanout`.
fn open_channel(app: &App, client_id: Option<&str>, fanout: &FanOut) -> Result<MessageChannel> {
    let config = app.channel_config(client_id)?;
    info!(url = %config.url, "opening channel");
    Ok(MessageChannel::builder(config)
        .on_message(fanout.handler())
        .on_connect(|| info!("live updates connected"))
        .on_disconnect(|| warn!("live updates disconnected"))
        .on_error(|e: &ChannelError| warn!(error = %e, "live updates error"))
        .build())
}

fn describe(msg: &ChannelMessage) -> String {
    if let Some(p) = ParsingProgress::from_message(msg) {
        let mut line = format!(
            "[{}] {} {}%",
            p.status.as_deref().unwrap_or("progress"),
            p.filename,
            p.progress.unwrap_or(0)
        );
        if let Some(message) = p.message.filter(|m| !m.is_empty()) {
            line.push_str(&format!(" {message}"));
        }
        return line;
    }
    msg.encode().unwrap_or_else(|_| format!("[{}]", msg.kind))
}

pub async fn watch(app: &App, client_id: Option<&str>) -> Result<()> {
    let fanout = FanOut::default();
    let mut messages = fanout.subscribe();
    let channel = open_channel(app, client_id, &fanout)?;
    channel.connect().await;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            received = messages.recv() => match received {
                Ok(msg) => println!("{}", describe(&msg)),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "output fell behind"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    channel.disconnect();
    Ok(())
}

/// The upload itself covers the first half of a file's progress; parsing
/// the second.
fn upload_percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 50;
    }
    ((sent.min(total) * 50 + total / 2) / total) as u8
}

fn with_tracker<R>(tracker: &Mutex<UploadTracker>, f: impl FnOnce(&mut UploadTracker) -> R) -> R {
    f(&mut tracker.lock().unwrap_or_else(|e| e.into_inner()))
}

/// Apply progress messages to the tracker until the fan-out closes.
fn follow_progress(
    tracker: Arc<Mutex<UploadTracker>>,
    mut messages: broadcast::Receiver<ChannelMessage>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match messages.recv().await {
                Ok(msg) => {
                    let applied = with_tracker(&tracker, |t| t.apply_message(&msg));
                    if applied {
                        println!("{}", describe(&msg));
                    }
                },
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "dropped progress updates"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

pub async fn upload(app: &App, args: UploadArgs) -> Result<()> {
    let api = app.api()?;
    let parser_settings = SettingsStore::load(app.data.settings()).settings().parser.clone();
    let parser = args.parser.unwrap_or(parser_settings.parser);
    let parse_method = args.parse_method.unwrap_or(parser_settings.parse_method);

    let tracker = Arc::new(Mutex::new(UploadTracker::new()));

    let names: Vec<String> = args
        .files
        .iter()
        .map(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.display().to_string())
        })
        .collect();
    with_tracker(&tracker, |t| t.add_files(names.iter().cloned()));

    let fanout = FanOut::default();
    let follower = follow_progress(Arc::clone(&tracker), fanout.subscribe());
    let channel = open_channel(app, args.client_id.as_deref(), &fanout)?;
    channel.connect().await;

    for (path, name) in args.files.iter().zip(&names) {
        with_tracker(&tracker, |t| {
            t.set_status(name, UploadStatus::Uploading, 0, None);
        });
        println!("uploading {}", path.display());
        let progress = {
            let tracker = Arc::clone(&tracker);
            let name = name.clone();
            move |sent, total| {
                with_tracker(&tracker, |t| {
                    t.set_status(&name, UploadStatus::Uploading, upload_percent(sent, total), None);
                });
            }
        };
        let uploaded = match api.upload_document_with_progress(path, progress).await {
            Ok(uploaded) => uploaded,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "upload failed");
                with_tracker(&tracker, |t| {
                    t.fail(name, e.to_string());
                });
                continue;
            },
        };

        with_tracker(&tracker, |t| {
            t.set_status(
                name,
                UploadStatus::Parsing,
                50,
                Some("Starting document parsing...".into()),
            );
        });
        match api
            .parse_document(&uploaded.file_path, Some(&parser), Some(&parse_method))
            .await
        {
            Ok(_) => with_tracker(&tracker, |t| {
                t.set_status(
                    name,
                    UploadStatus::Completed,
                    100,
                    Some("Document parsed successfully".into()),
                );
            }),
            Err(e) => {
                warn!(file = %uploaded.filename, error = %e, "parsing failed");
                with_tracker(&tracker, |t| {
                    t.fail(name, e.to_string());
                });
            },
        }
    }

    channel.disconnect();
    drop(channel);
    follower.abort();

    let tracker = tracker.lock().unwrap_or_else(|e| e.into_inner());
    let mut failed = 0;
    for task in tracker.tasks() {
        match &task.error {
            Some(error) => {
                failed += 1;
                println!("{:<10} {}  {error}", task.status, task.filename);
            },
            None => println!("{:<10} {}", task.status, task.filename),
        }
    }
    if failed > 0 {
        anyhow::bail!("{failed} of {} files failed", tracker.tasks().len());
    }
    Ok(())
}
