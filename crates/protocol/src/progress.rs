use crate::{ChannelMessage, kinds};

/// Parsing progress for one uploaded file, extracted from a
/// `parsing_progress` message.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsingProgress {
    pub filename: String,
    pub status: Option<String>,
    /// Percentage, clamped to `0..=100`.
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub document_id: Option<String>,
    pub current_step: Option<String>,
    pub error: Option<String>,
}

impl ParsingProgress {
    /// Returns `None` for other message types and for progress messages
    /// that do not name a file.
    pub fn from_message(msg: &ChannelMessage) -> Option<Self> {
        if !msg.is(kinds::PARSING_PROGRESS) {
            return None;
        }
        let owned = |name: &str| msg.field_str(name).map(str::to_string);
        Some(Self {
            filename: owned("filename")?,
            status: owned("status"),
            progress: msg.field_f64("progress").map(clamp_percent),
            message: owned("message"),
            document_id: owned("documentId").or_else(|| owned("document_id")),
            current_step: owned("currentStep").or_else(|| owned("current_step")),
            error: owned("error"),
        })
    }
}

fn clamp_percent(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_flat_progress() {
        let msg = ChannelMessage::decode(
            r#"{"type":"parsing_progress","filename":"a.pdf","status":"parsing","progress":42}"#,
        )
        .unwrap();
        let progress = ParsingProgress::from_message(&msg).unwrap();
        assert_eq!(progress.filename, "a.pdf");
        assert_eq!(progress.status.as_deref(), Some("parsing"));
        assert_eq!(progress.progress, Some(42));
        assert!(progress.message.is_none());
    }

    #[test]
    fn extracts_nested_progress_from_backend() {
        let msg = ChannelMessage::decode(
            r#"{"type":"parsing_progress","data":{"filename":"a.pdf","progress":99.6,"status":"completed","message":"done","documentId":"d1"}}"#,
        )
        .unwrap();
        let progress = ParsingProgress::from_message(&msg).unwrap();
        assert_eq!(progress.progress, Some(100));
        assert_eq!(progress.message.as_deref(), Some("done"));
        assert_eq!(progress.document_id.as_deref(), Some("d1"));
    }

    #[test]
    fn clamps_out_of_range_values() {
        assert_eq!(clamp_percent(-5.0), 0);
        assert_eq!(clamp_percent(250.0), 100);
        assert_eq!(clamp_percent(f64::NAN), 0);
    }

    #[test]
    fn ignores_other_kinds_and_missing_filename() {
        let info = ChannelMessage::new(kinds::INFO).with_field("filename", "a.pdf");
        assert!(ParsingProgress::from_message(&info).is_none());

        let anonymous = ChannelMessage::new(kinds::PARSING_PROGRESS).with_field("progress", 3);
        assert!(ParsingProgress::from_message(&anonymous).is_none());
    }
}
