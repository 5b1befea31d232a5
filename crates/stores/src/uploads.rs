use std::{fmt, str::FromStr};

use {
    rag_studio_protocol::{ChannelMessage, ParsingProgress},
    tracing::debug,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Pending,
    Uploading,
    Parsing,
    Completed,
    Failed,
}

impl UploadStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Uploading => "uploading",
            Self::Parsing => "parsing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        })
    }
}

impl FromStr for UploadStatus {
    type Err = String;

    /// Accepts the backend's spellings as well as ours.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" | "queued" => Ok(Self::Pending),
            "uploading" => Ok(Self::Uploading),
            "parsing" | "processing" => Ok(Self::Parsing),
            "completed" | "complete" | "done" => Ok(Self::Completed),
            "failed" | "error" => Ok(Self::Failed),
            other => Err(format!("unknown upload status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadTask {
    pub id: String,
    pub filename: String,
    pub status: UploadStatus,
    pub progress: u8,
    pub message: Option<String>,
    pub error: Option<String>,
}

/// Upload and parse progress per file, fed by the CLI and by
/// `parsing_progress` messages from the channel. Not persisted.
#[derive(Debug, Default)]
pub struct UploadTracker {
    tasks: Vec<UploadTask>,
}

impl UploadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue files as `Pending` at 0%.
    pub fn add_files<I, S>(&mut self, filenames: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tasks.extend(filenames.into_iter().map(|name| UploadTask {
            id: uuid::Uuid::new_v4().simple().to_string(),
            filename: name.into(),
            status: UploadStatus::Pending,
            progress: 0,
            message: None,
            error: None,
        }));
    }

    pub fn tasks(&self) -> &[UploadTask] {
        &self.tasks
    }

    pub fn task(&self, filename: &str) -> Option<&UploadTask> {
        self.tasks.iter().find(|t| t.filename == filename)
    }

    fn task_mut(&mut self, filename: &str) -> Option<&mut UploadTask> {
        self.tasks.iter_mut().find(|t| t.filename == filename)
    }

    pub fn set_status(
        &mut self,
        filename: &str,
        status: UploadStatus,
        progress: u8,
        message: Option<String>,
    ) -> bool {
        let Some(task) = self.task_mut(filename) else {
            return false;
        };
        task.status = status;
        task.progress = progress.min(100);
        task.message = message;
        true
    }

    pub fn fail(&mut self, filename: &str, error: impl Into<String>) -> bool {
        let Some(task) = self.task_mut(filename) else {
            return false;
        };
        task.status = UploadStatus::Failed;
        task.error = Some(error.into());
        true
    }

    /// Apply a progress update for a tracked file. Fields the update leaves
    /// out keep their value; unknown status strings are ignored.
    pub fn apply_progress(&mut self, update: &ParsingProgress) -> bool {
        let Some(task) = self.task_mut(&update.filename) else {
            debug!(filename = %update.filename, "progress for untracked file");
            return false;
        };
        if let Some(status) = update.status.as_deref().and_then(|s| s.parse().ok()) {
            task.status = status;
        }
        if let Some(progress) = update.progress {
            task.progress = progress;
        }
        if update.message.is_some() {
            task.message = update.message.clone();
        }
        if let Some(error) = &update.error {
            task.error = Some(error.clone());
            task.status = UploadStatus::Failed;
        }
        true
    }

    /// Anything other than a `parsing_progress` message is ignored.
    pub fn apply_message(&mut self, msg: &ChannelMessage) -> bool {
        ParsingProgress::from_message(msg).is_some_and(|update| self.apply_progress(&update))
    }

    pub fn all_finished(&self) -> bool {
        self.tasks.iter().all(|t| t.status.is_finished())
    }

    pub fn clear_finished(&mut self) {
        self.tasks.retain(|t| !t.status.is_finished());
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> UploadTracker {
        let mut tracker = UploadTracker::new();
        tracker.add_files(["a.pdf", "b.docx"]);
        tracker
    }

    #[test]
    fn new_files_start_pending() {
        let tracker = tracker();
        assert_eq!(tracker.tasks().len(), 2);
        assert!(tracker.tasks().iter().all(|t| t.status == UploadStatus::Pending && t.progress == 0));
        assert_ne!(tracker.tasks()[0].id, tracker.tasks()[1].id);
    }

    #[test]
    fn flat_progress_message_updates_task() {
        let mut tracker = tracker();
        let msg = ChannelMessage::decode(
            r#"{"type":"parsing_progress","filename":"a.pdf","status":"parsing","progress":42}"#,
        )
        .unwrap();
        assert!(tracker.apply_message(&msg));

        let task = tracker.task("a.pdf").unwrap();
        assert_eq!(task.status, UploadStatus::Parsing);
        assert_eq!(task.progress, 42);
        assert_eq!(tracker.task("b.docx").unwrap().progress, 0);
    }

    #[test]
    fn nested_progress_and_unknown_status() {
        let mut tracker = tracker();
        tracker.set_status("b.docx", UploadStatus::Parsing, 50, None);
        let msg = ChannelMessage::decode(
            r#"{"type":"parsing_progress","data":{"filename":"b.docx","status":"vectorizing","progress":80,"message":"embedding"}}"#,
        )
        .unwrap();
        assert!(tracker.apply_message(&msg));

        let task = tracker.task("b.docx").unwrap();
        assert_eq!(task.status, UploadStatus::Parsing);
        assert_eq!(task.progress, 80);
        assert_eq!(task.message.as_deref(), Some("embedding"));
    }

    #[test]
    fn error_field_fails_task() {
        let mut tracker = tracker();
        let msg = ChannelMessage::decode(
            r#"{"type":"parsing_progress","filename":"a.pdf","error":"mineru crashed"}"#,
        )
        .unwrap();
        tracker.apply_message(&msg);
        let task = tracker.task("a.pdf").unwrap();
        assert_eq!(task.status, UploadStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("mineru crashed"));
    }

    #[test]
    fn ignores_other_messages_and_untracked_files() {
        let mut tracker = tracker();
        let info = ChannelMessage::decode(r#"{"type":"info","filename":"a.pdf","progress":99}"#).unwrap();
        assert!(!tracker.apply_message(&info));
        let stranger = ChannelMessage::decode(
            r#"{"type":"parsing_progress","filename":"zzz.pdf","progress":10}"#,
        )
        .unwrap();
        assert!(!tracker.apply_message(&stranger));
        assert_eq!(tracker.task("a.pdf").unwrap().progress, 0);
    }

    #[test]
    fn clear_finished_keeps_active() {
        let mut tracker = tracker();
        tracker.set_status("a.pdf", UploadStatus::Completed, 100, Some("done".into()));
        assert!(!tracker.all_finished());
        tracker.fail("b.docx", "upload failed");
        assert!(tracker.all_finished());

        tracker.add_files(["c.png"]);
        tracker.clear_finished();
        assert_eq!(tracker.tasks().len(), 1);
        assert_eq!(tracker.tasks()[0].filename, "c.png");
    }

    #[test]
    fn status_parsing_accepts_backend_spellings() {
        assert_eq!("processing".parse::<UploadStatus>().unwrap(), UploadStatus::Parsing);
        assert_eq!("Completed".parse::<UploadStatus>().unwrap(), UploadStatus::Completed);
        assert!("vectorizing".parse::<UploadStatus>().is_err());
    }
}
