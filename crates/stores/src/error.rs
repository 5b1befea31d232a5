use std::path::PathBuf;

use rag_studio_client::ApiError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize store: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("no current chat session")]
    NoCurrentSession,
}
