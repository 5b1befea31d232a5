//! Request and response shapes the client types out. Everything else the
//! backend returns is passed through as `serde_json::Value`.

use std::{fmt, str::FromStr};

use {
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    Naive,
    Local,
    Global,
    #[default]
    Hybrid,
}

impl QueryMode {
    pub const ALL: [Self; 4] = [Self::Naive, Self::Local, Self::Global, Self::Hybrid];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Naive => "naive",
            Self::Local => "local",
            Self::Global => "global",
            Self::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown query mode '{s}' (expected naive, local, global or hybrid)"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub filename: String,
    /// Server-side path, passed back to `parse_document`.
    pub file_path: String,
    pub size: u64,
    #[serde(rename = "type", default)]
    pub content_type: Option<String>,
}

/// One entry of `/documents/list`. The backend is loose about which fields
/// it fills in, so nearly everything is optional.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DocumentRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub filename: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// Seconds since the Unix epoch.
    #[serde(default)]
    pub uploaded_at: Option<f64>,
    #[serde(default)]
    pub chunks: Option<u64>,
    #[serde(default)]
    pub entities: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct DocumentList {
    #[serde(default)]
    pub documents: Vec<DocumentRecord>,
    #[serde(default)]
    pub total: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ListDocumentsQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    Positive,
    Negative,
}
