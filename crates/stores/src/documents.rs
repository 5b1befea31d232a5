use std::{fmt, path::PathBuf, str::FromStr};

use {
    rag_studio_client::{ApiClient, DocumentRecord, ListDocumentsQuery},
    serde::{Deserialize, Serialize},
    tracing::{info, warn},
};

use crate::{
    error::StoreError,
    persist::{load_or_default, now_ms, save_json},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Completed,
    Processing,
    Failed,
}

impl StatusFilter {
    fn matches(self, status: &str) -> bool {
        match self {
            Self::All => true,
            Self::Completed => status == "completed",
            Self::Processing => status == "processing",
            Self::Failed => status == "failed",
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::All => "all",
            Self::Completed => "completed",
            Self::Processing => "processing",
            Self::Failed => "failed",
        })
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "completed" => Ok(Self::Completed),
            "processing" => Ok(Self::Processing),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown status filter '{other}'")),
        }
    }
}

/// A document as the client shows it.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub size: u64,
    pub kind: String,
    pub status: String,
    /// Milliseconds since the Unix epoch.
    pub uploaded_at: u64,
    pub chunks: Option<u64>,
    pub entities: Option<u64>,
}

impl From<DocumentRecord> for Document {
    fn from(record: DocumentRecord) -> Self {
        Self {
            id: record.id.unwrap_or_else(|| record.filename.clone()),
            size: record.size.unwrap_or(0),
            kind: record
                .kind
                .or(record.content_type)
                .unwrap_or_else(|| "application/octet-stream".into()),
            status: record.status.unwrap_or_else(|| "completed".into()),
            uploaded_at: record
                .uploaded_at
                .map(|secs| (secs * 1000.0) as u64)
                .unwrap_or_else(now_ms),
            chunks: record.chunks,
            entities: record.entities,
            filename: record.filename,
        }
    }
}

/// The only part of the document view that survives restarts.
#[derive(Debug, Default, Serialize, Deserialize)]
struct DocumentFilters {
    #[serde(default)]
    search_query: String,
    #[serde(default)]
    status_filter: StatusFilter,
}

/// Cached document list with local filtering, persisted to
/// `documents.json`.
pub struct DocumentStore {
    path: PathBuf,
    filters: DocumentFilters,
    documents: Vec<Document>,
    selected: Option<String>,
    loading: bool,
    error: Option<String>,
}

impl DocumentStore {
    pub fn load(path: PathBuf) -> Self {
        let filters = load_or_default(&path);
        Self {
            path,
            filters,
            documents: Vec::new(),
            selected: None,
            loading: false,
            error: None,
        }
    }

    /// Writes the search query and status filter only.
    pub fn save(&self) -> Result<(), StoreError> {
        save_json(&self.path, &self.filters)
    }

    /// Replace the cache with the backend's list. Failures are recorded in
    /// [`error`](Self::error) and leave the previous list in place.
    pub async fn load_documents(&mut self, api: &ApiClient) {
        self.loading = true;
        self.error = None;
        match api.list_documents(&ListDocumentsQuery::default()).await {
            Ok(list) => {
                self.documents = list.documents.into_iter().map(Document::from).collect();
                info!(count = self.documents.len(), "loaded documents");
            },
            Err(e) => {
                warn!(error = %e, "failed to load documents");
                self.error = Some(e.to_string());
            },
        }
        self.loading = false;
    }

    /// Delete on the backend, then locally. The error is both recorded and
    /// returned.
    pub async fn delete_document(&mut self, api: &ApiClient, id: &str) -> Result<(), StoreError> {
        self.loading = true;
        self.error = None;
        let result = api.delete_document(id).await;
        self.loading = false;
        match result {
            Ok(_) => {
                self.documents.retain(|d| d.id != id);
                if self.selected.as_deref() == Some(id) {
                    self.selected = None;
                }
                Ok(())
            },
            Err(e) => {
                warn!(id, error = %e, "failed to delete document");
                self.error = Some(e.to_string());
                Err(e.into())
            },
        }
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn select(&mut self, id: Option<&str>) {
        self.selected = id.map(str::to_string);
    }

    pub fn selected(&self) -> Option<&Document> {
        let id = self.selected.as_deref()?;
        self.documents.iter().find(|d| d.id == id)
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn search_query(&self) -> &str {
        &self.filters.search_query
    }

    pub fn set_search_query(&mut self, query: impl Into<String>) {
        self.filters.search_query = query.into();
    }

    pub fn status_filter(&self) -> StatusFilter {
        self.filters.status_filter
    }

    pub fn set_status_filter(&mut self, filter: StatusFilter) {
        self.filters.status_filter = filter;
    }

    /// Case-insensitive filename search, then the status filter.
    pub fn filtered_documents(&self) -> Vec<&Document> {
        let needle = self.filters.search_query.to_lowercase();
        self.documents
            .iter()
            .filter(|d| needle.is_empty() || d.filename.to_lowercase().contains(&needle))
            .filter(|d| self.filters.status_filter.matches(&d.status))
            .collect()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const LIST: &str = r#"{"documents":[
        {"id":"Report.pdf","filename":"Report.pdf","size":10,"type":"application/pdf","status":"completed","uploaded_at":1700000000.5},
        {"filename":"scan.png","content_type":"image/png","status":"processing"},
        {"filename":"notes.txt"}
    ],"total":3}"#;

    async fn loaded(server: &mut mockito::ServerGuard) -> (tempfile::TempDir, DocumentStore, ApiClient) {
        let _mock = server
            .mock("GET", "/api/v1/documents/list")
            .with_status(200)
            .with_body(LIST)
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let mut store = DocumentStore::load(dir.path().join("documents.json"));
        let api = ApiClient::new(&server.url()).unwrap();
        store.load_documents(&api).await;
        (dir, store, api)
    }

    #[tokio::test]
    async fn maps_backend_records_with_fallbacks() {
        let mut server = mockito::Server::new_async().await;
        let (_dir, store, _api) = loaded(&mut server).await;

        let docs = store.documents();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].uploaded_at, 1_700_000_000_500);
        assert_eq!(docs[1].id, "scan.png");
        assert_eq!(docs[1].kind, "image/png");
        assert_eq!(docs[2].kind, "application/octet-stream");
        assert_eq!(docs[2].status, "completed");
        assert!(!store.is_loading());
        assert!(store.error().is_none());
    }

    #[tokio::test]
    async fn filters_by_search_then_status() {
        let mut server = mockito::Server::new_async().await;
        let (_dir, mut store, _api) = loaded(&mut server).await;

        store.set_search_query("REPORT");
        let names: Vec<_> = store.filtered_documents().iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, ["Report.pdf"]);

        store.set_search_query("");
        store.set_status_filter(StatusFilter::Processing);
        let names: Vec<_> = store.filtered_documents().iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, ["scan.png"]);
    }

    #[tokio::test]
    async fn delete_clears_matching_selection() {
        let mut server = mockito::Server::new_async().await;
        let (_dir, mut store, api) = loaded(&mut server).await;
        let _mock = server
            .mock("DELETE", "/api/v1/documents/scan.png")
            .with_status(200)
            .with_body(r#"{"message":"deleted"}"#)
            .create_async()
            .await;

        store.select(Some("scan.png"));
        assert_eq!(store.selected().unwrap().filename, "scan.png");
        store.delete_document(&api, "scan.png").await.unwrap();
        assert!(store.selected().is_none());
        assert_eq!(store.documents().len(), 2);
    }

    #[tokio::test]
    async fn delete_failure_is_recorded_and_returned() {
        let mut server = mockito::Server::new_async().await;
        let (_dir, mut store, api) = loaded(&mut server).await;
        let _mock = server
            .mock("DELETE", "/api/v1/documents/notes.txt")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let err = store.delete_document(&api, "notes.txt").await.unwrap_err();
        assert!(matches!(err, StoreError::Api(_)));
        assert!(store.error().unwrap().contains("500"));
        assert_eq!(store.documents().len(), 3);
    }

    #[tokio::test]
    async fn load_failure_keeps_previous_list() {
        let mut server = mockito::Server::new_async().await;
        let (_dir, mut store, _api) = loaded(&mut server).await;

        let broken = ApiClient::new("http://127.0.0.1:1").unwrap();
        store.load_documents(&broken).await;
        assert!(store.error().is_some());
        assert_eq!(store.documents().len(), 3);
    }

    #[test]
    fn only_filters_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("documents.json");
        let mut store = DocumentStore::load(path.clone());
        store.set_search_query("pdf");
        store.set_status_filter(StatusFilter::Failed);
        store.save().unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({"search_query": "pdf", "status_filter": "failed"}));

        let reloaded = DocumentStore::load(path);
        assert_eq!(reloaded.search_query(), "pdf");
        assert_eq!(reloaded.status_filter(), StatusFilter::Failed);
        assert!(reloaded.documents().is_empty());
    }

    #[test]
    fn status_filter_parses() {
        assert_eq!("Processing".parse::<StatusFilter>().unwrap(), StatusFilter::Processing);
        assert!("archived".parse::<StatusFilter>().is_err());
    }
}
