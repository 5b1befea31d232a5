//! REST client for the RAG backend's `/api/v1` surface.
//!
//! Bodies are passed through as JSON values except where the CLI and stores
//! need fields (uploads and the document list).

pub mod error;
pub mod types;

use std::{path::Path, time::Duration};

use {
    futures::TryStreamExt,
    reqwest::{
        Body, Client, RequestBuilder, Response, StatusCode,
        multipart::{Form, Part},
    },
    secrecy::{ExposeSecret, Secret},
    serde::{Serialize, de::DeserializeOwned},
    serde_json::{Value, json},
    tokio_util::io::ReaderStream,
    tracing::{debug, warn},
    url::Url,
};

pub use {
    error::ApiError,
    types::{
        DocumentList, DocumentRecord, Feedback, GraphFilters, ListDocumentsQuery, QueryMode,
        UploadResponse,
    },
};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const API_PREFIX: &str = "/api/v1";

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    /// Server root without trailing slash, e.g. `http://localhost:8000`.
    root: String,
    token: Option<Secret<String>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("root", &self.root)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl ApiClient {
    pub fn new(api_url: &str) -> Result<Self, ApiError> {
        Self::with_timeout(api_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(api_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let parsed = Url::parse(api_url).map_err(|source| ApiError::InvalidUrl {
            url: api_url.to_string(),
            source,
        })?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            root: parsed.as_str().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    #[must_use]
    pub fn with_token(mut self, token: Option<Secret<String>>) -> Self {
        self.token = token;
        self
    }

    pub fn api_url(&self) -> &str {
        &self.root
    }

    /// Channel endpoint for `client_id`: `http` becomes `ws`, `https`
    /// becomes `wss`.
    pub fn ws_url(&self, client_id: &str) -> Result<String, ApiError> {
        let (scheme, rest) = match self.root.split_once("://") {
            Some(("https", rest)) => ("wss", rest),
            Some((_, rest)) => ("ws", rest),
            None => ("ws", self.root.as_str()),
        };
        let raw = format!("{scheme}://{rest}{API_PREFIX}/ws/");
        let mut url = Url::parse(&raw).map_err(|source| ApiError::InvalidUrl { url: raw, source })?;
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(client_id);
        }
        Ok(url.into())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{API_PREFIX}{path}", self.root)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        };
        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!(url = %response.url(), "api rejected credentials");
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), body = %body, "api request failed");
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let bytes = self.execute(request).await?.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.decode(self.client.get(self.endpoint(path))).await
    }

    async fn get_with<T: DeserializeOwned, Q: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &Q,
    ) -> Result<T, ApiError> {
        self.decode(self.client.get(self.endpoint(path)).query(query))
            .await
    }

    async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.decode(self.client.post(self.endpoint(path)).json(body))
            .await
    }

    // ── Documents ──────────────────────────────────────────────────────────

    /// Upload a local file as the multipart `file` field.
    pub async fn upload_document(&self, path: &Path) -> Result<UploadResponse, ApiError> {
        self.upload_document_with_progress(path, |_, _| {}).await
    }

    /// Like [`upload_document`](Self::upload_document), streaming the file
    /// from disk. `on_progress(sent, total)` is called with byte counts as
    /// each chunk is handed to the connection.
    pub async fn upload_document_with_progress(
        &self,
        path: &Path,
        on_progress: impl Fn(u64, u64) + Send + Sync + 'static,
    ) -> Result<UploadResponse, ApiError> {
        let io = |source| ApiError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = tokio::fs::File::open(path).await.map_err(io)?;
        let total = file.metadata().await.map_err(io)?.len();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".into());
        debug!(filename = %filename, size = total, "uploading document");

        let mut sent = 0u64;
        let chunks = ReaderStream::new(file).inspect_ok(move |chunk| {
            sent += chunk.len() as u64;
            on_progress(sent, total);
        });
        let part = Part::stream_with_length(Body::wrap_stream(chunks), total).file_name(filename);
        let form = Form::new().part("file", part);
        self.decode(
            self.client
                .post(self.endpoint("/documents/upload"))
                .multipart(form),
        )
        .await
    }

    /// Start parsing a previously uploaded file. Progress arrives on the
    /// message channel as `parsing_progress` frames.
    pub async fn parse_document(
        &self,
        file_path: &str,
        parser: Option<&str>,
        parse_method: Option<&str>,
    ) -> Result<Value, ApiError> {
        #[derive(Serialize)]
        struct Params<'a> {
            file_path: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            parser: Option<&'a str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            parse_method: Option<&'a str>,
        }
        let params = Params {
            file_path,
            parser,
            parse_method,
        };
        self.decode(
            self.client
                .post(self.endpoint("/documents/parse"))
                .query(&params),
        )
        .await
    }

    pub async fn list_documents(&self, query: &ListDocumentsQuery) -> Result<DocumentList, ApiError> {
        self.get_with("/documents/list", query).await
    }

    pub async fn get_document(&self, id: &str) -> Result<Value, ApiError> {
        self.get(&format!("/documents/{id}")).await
    }

    pub async fn delete_document(&self, id: &str) -> Result<Value, ApiError> {
        self.decode(self.client.delete(self.endpoint(&format!("/documents/{id}"))))
            .await
    }

    // ── Query ──────────────────────────────────────────────────────────────

    pub async fn query(&self, text: &str, mode: QueryMode, vlm_enhanced: bool) -> Result<Value, ApiError> {
        self.post_json(
            "/query/",
            &json!({ "query": text, "mode": mode, "vlm_enhanced": vlm_enhanced }),
        )
        .await
    }

    pub async fn multimodal_query(
        &self,
        text: &str,
        mode: QueryMode,
        content: Vec<Value>,
    ) -> Result<Value, ApiError> {
        self.post_json(
            "/query/multimodal",
            &json!({ "query": text, "mode": mode, "multimodal_content": content }),
        )
        .await
    }

    pub async fn query_history(&self, limit: usize, offset: usize) -> Result<Value, ApiError> {
        self.get_with("/query/history", &[("limit", limit), ("offset", offset)])
            .await
    }

    pub async fn query_feedback(
        &self,
        query_id: &str,
        feedback: Feedback,
        comment: Option<&str>,
    ) -> Result<Value, ApiError> {
        #[derive(Serialize)]
        struct Params<'a> {
            query_id: &'a str,
            feedback: Feedback,
            #[serde(skip_serializing_if = "Option::is_none")]
            comment: Option<&'a str>,
        }
        let params = Params {
            query_id,
            feedback,
            comment,
        };
        self.decode(
            self.client
                .post(self.endpoint("/query/feedback"))
                .query(&params),
        )
        .await
    }

    // ── Knowledge graph ────────────────────────────────────────────────────

    pub async fn graph_data(&self, filters: &GraphFilters) -> Result<Value, ApiError> {
        self.get_with("/graph/data", filters).await
    }

    pub async fn entity(&self, id: &str) -> Result<Value, ApiError> {
        self.get(&format!("/graph/entity/{id}")).await
    }

    pub async fn search_entities(
        &self,
        query: &str,
        entity_type: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Value, ApiError> {
        #[derive(Serialize)]
        struct Params<'a> {
            query: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            entity_type: Option<&'a str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            limit: Option<usize>,
        }
        self.get_with("/graph/search", &Params {
            query,
            entity_type,
            limit,
        })
        .await
    }

    pub async fn subgraph(&self, center_node: &str, depth: u32) -> Result<Value, ApiError> {
        #[derive(Serialize)]
        struct Params<'a> {
            center_node: &'a str,
            depth: u32,
        }
        self.get_with("/graph/subgraph", &Params { center_node, depth })
            .await
    }

    pub async fn graph_stats(&self) -> Result<Value, ApiError> {
        self.get("/graph/stats").await
    }

    // ── Vectors ────────────────────────────────────────────────────────────

    /// `method` is one of `umap`, `tsne`, `pca`; `dimensions` is 2 or 3.
    pub async fn vector_projection(
        &self,
        method: &str,
        dimensions: u8,
        content_type: Option<&str>,
    ) -> Result<Value, ApiError> {
        #[derive(Serialize)]
        struct Params<'a> {
            method: &'a str,
            dimensions: u8,
            #[serde(skip_serializing_if = "Option::is_none")]
            content_type: Option<&'a str>,
        }
        self.get_with("/vectors/projection", &Params {
            method,
            dimensions,
            content_type,
        })
        .await
    }

    pub async fn vector_search(
        &self,
        query_text: Option<&str>,
        vector_id: Option<&str>,
        top_k: usize,
    ) -> Result<Value, ApiError> {
        #[derive(Serialize)]
        struct Params<'a> {
            #[serde(skip_serializing_if = "Option::is_none")]
            query_text: Option<&'a str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            vector_id: Option<&'a str>,
            top_k: usize,
        }
        self.get_with("/vectors/search", &Params {
            query_text,
            vector_id,
            top_k,
        })
        .await
    }

    /// `method` is one of `kmeans`, `dbscan`, `hdbscan`.
    pub async fn clusters(&self, method: &str, n_clusters: Option<usize>) -> Result<Value, ApiError> {
        #[derive(Serialize)]
        struct Params<'a> {
            method: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            n_clusters: Option<usize>,
        }
        self.get_with("/vectors/clusters", &Params { method, n_clusters })
            .await
    }

    pub async fn vector_stats(&self) -> Result<Value, ApiError> {
        self.get("/vectors/stats").await
    }

    // ── System ─────────────────────────────────────────────────────────────

    /// Root `/health`, outside the versioned prefix.
    pub async fn health(&self) -> Result<Value, ApiError> {
        self.decode(self.client.get(format!("{}/health", self.root)))
            .await
    }

    pub async fn system_status(&self) -> Result<Value, ApiError> {
        self.get("/system/status").await
    }
}
