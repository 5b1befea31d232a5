use {
    anyhow::Result,
    clap::Subcommand,
    rag_studio_client::GraphFilters,
    rag_studio_stores::{DocumentStore, StatusFilter, StoreError},
    serde::Serialize,
    serde_json::Value,
};

use crate::context::{App, print_json};

#[derive(Subcommand)]
pub enum DocsAction {
    /// List uploaded documents.
    List {
        /// Case-insensitive filename filter; saved for the next listing.
        #[arg(long)]
        search: Option<String>,
        /// all, completed, processing or failed; saved for the next listing.
        #[arg(long)]
        status: Option<StatusFilter>,
    },
    /// Show one document.
    Get { id: String },
    /// Delete a document from the backend.
    Delete { id: String },
}

#[derive(Subcommand)]
pub enum GraphAction {
    /// Node and edge counts.
    Stats,
    /// Search entities by name.
    Search {
        query: String,
        #[arg(long)]
        entity_type: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// One entity and its relations.
    Entity { id: String },
    /// Neighbourhood of a node.
    Subgraph {
        center_node: String,
        #[arg(long, default_value_t = 2)]
        depth: u32,
    },
    /// The whole graph, optionally filtered.
    Data {
        #[arg(long)]
        content_type: Option<String>,
        #[arg(long)]
        document_id: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Subcommand)]
pub enum VectorsAction {
    /// Collection statistics.
    Stats,
    /// Nearest neighbours of a text or an existing vector.
    Search {
        #[arg(long, conflicts_with = "vector_id", required_unless_present = "vector_id")]
        text: Option<String>,
        #[arg(long)]
        vector_id: Option<String>,
        #[arg(long, default_value_t = 10)]
        top_k: usize,
    },
    /// Cluster assignments.
    Clusters {
        /// kmeans, dbscan or hdbscan.
        #[arg(long, default_value = "kmeans")]
        method: String,
        #[arg(long)]
        n_clusters: Option<usize>,
    },
    /// Low-dimensional projection for plotting.
    Projection {
        /// umap, tsne or pca.
        #[arg(long, default_value = "umap")]
        method: String,
        #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(2..=3))]
        dimensions: u8,
        #[arg(long)]
        content_type: Option<String>,
    },
}

/// Keep API errors downcastable for the caller.
fn unwrap_store_error(e: StoreError) -> anyhow::Error {
    match e {
        StoreError::Api(api) => api.into(),
        other => other.into(),
    }
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

pub async fn handle_docs(app: &App, action: DocsAction) -> Result<()> {
    let api = app.api()?;
    match action {
        DocsAction::List { search, status } => {
            let mut store = DocumentStore::load(app.data.documents());
            if let Some(search) = search {
                store.set_search_query(search);
            }
            if let Some(status) = status {
                store.set_status_filter(status);
            }
            store.save()?;

            store.load_documents(&api).await;
            if let Some(error) = store.error() {
                anyhow::bail!("failed to list documents: {error}");
            }
            let docs = store.filtered_documents();
            if docs.is_empty() {
                println!("no documents");
                return Ok(());
            }
            for doc in docs {
                println!(
                    "{:<11} {:>9}  {}  ({})",
                    doc.status,
                    format_size(doc.size),
                    doc.filename,
                    doc.id
                );
            }
        },
        DocsAction::Get { id } => print_json(&api.get_document(&id).await?)?,
        DocsAction::Delete { id } => {
            let mut store = DocumentStore::load(app.data.documents());
            store
                .delete_document(&api, &id)
                .await
                .map_err(unwrap_store_error)?;
            println!("deleted {id}");
        },
    }
    Ok(())
}

pub async fn handle_graph(app: &App, action: GraphAction) -> Result<()> {
    let api = app.api()?;
    let value = match action {
        GraphAction::Stats => api.graph_stats().await?,
        GraphAction::Search {
            query,
            entity_type,
            limit,
        } => {
            api.search_entities(&query, entity_type.as_deref(), limit)
                .await?
        },
        GraphAction::Entity { id } => api.entity(&id).await?,
        GraphAction::Subgraph { center_node, depth } => api.subgraph(&center_node, depth).await?,
        GraphAction::Data {
            content_type,
            document_id,
            limit,
        } => {
            api.graph_data(&GraphFilters {
                content_type,
                document_id,
                limit,
            })
            .await?
        },
    };
    print_json(&value)
}

pub async fn handle_vectors(app: &App, action: VectorsAction) -> Result<()> {
    let api = app.api()?;
    let value = match action {
        VectorsAction::Stats => api.vector_stats().await?,
        VectorsAction::Search {
            text,
            vector_id,
            top_k,
        } => {
            api.vector_search(text.as_deref(), vector_id.as_deref(), top_k)
                .await?
        },
        VectorsAction::Clusters { method, n_clusters } => api.clusters(&method, n_clusters).await?,
        VectorsAction::Projection {
            method,
            dimensions,
            content_type,
        } => {
            api.vector_projection(&method, dimensions, content_type.as_deref())
                .await?
        },
    };
    print_json(&value)
}

/// Headline numbers across system status, vector stats and graph stats.
#[derive(Debug, Default, PartialEq, Serialize)]
struct Analytics {
    documents: u64,
    chunks: u64,
    entities: u64,
    relationships: u64,
    queries: u64,
    avg_query_time_ms: f64,
}

fn count(value: &Value, key: &str) -> Option<u64> {
    let field = &value[key];
    field
        .as_u64()
        .or_else(|| field.as_f64().filter(|n| *n >= 0.0).map(|n| n.round() as u64))
}

impl Analytics {
    /// Missing fields count as zero. Entity and relationship totals fall back
    /// to the graph's node and edge counts.
    fn from_stats(system: &Value, vectors: &Value, graph: &Value) -> Self {
        Self {
            documents: count(system, "documents").unwrap_or(0),
            chunks: count(vectors, "total_chunks").unwrap_or(0),
            entities: count(vectors, "total_entities")
                .or_else(|| count(graph, "total_nodes"))
                .unwrap_or(0),
            relationships: count(vectors, "total_relationships")
                .or_else(|| count(graph, "total_edges"))
                .unwrap_or(0),
            queries: count(system, "queries").unwrap_or(0),
            avg_query_time_ms: system["avg_query_time"].as_f64().unwrap_or(0.0),
        }
    }
}

pub async fn analytics(app: &App, json: bool) -> Result<()> {
    let api = app.api()?;
    let (system, vectors, graph) =
        tokio::try_join!(api.system_status(), api.vector_stats(), api.graph_stats())?;
    let summary = Analytics::from_stats(&system, &vectors, &graph);
    if json {
        return print_json(&serde_json::to_value(&summary)?);
    }
    println!("documents      {}", summary.documents);
    println!("chunks         {}", summary.chunks);
    println!("entities       {}", summary.entities);
    println!("relationships  {}", summary.relationships);
    println!("queries        {}", summary.queries);
    println!("avg query time {}ms", summary.avg_query_time_ms);
    Ok(())
}

pub async fn health(app: &App) -> Result<()> {
    let api = app.api()?;
    let health = api.health().await?;
    println!("backend {}: {}", api.api_url(), health["status"].as_str().unwrap_or("unknown"));
    match api.system_status().await {
        Ok(status) => print_json(&status)?,
        Err(e) => tracing::warn!(error = %e, "system status unavailable"),
    }
    Ok(())
}
