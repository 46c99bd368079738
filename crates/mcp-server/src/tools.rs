//! MCP tools for Relay
//!
//! Wires the retrieval and streaming components together and exposes
//! them to AI agents via the MCP protocol.

use crate::config::RelayConfig;
use anyhow::Result;
use relay_backend::{AiBackend, CompletionRequest, HttpBackend, HttpBackendConfig};
use relay_code_chunker::{Chunker, ChunkerConfig};
use relay_context::{ContextSelector, SelectorConfig};
use relay_embedder::{Embedder, EmbedderConfig};
use relay_indexer::ProjectIndexer;
use relay_metrics::MetricsRecorder;
use relay_resilience::{BreakerConfig, BreakerRegistry};
use relay_stream::{StreamConfig, StreamError, StreamOrchestrator};
use relay_vector_store::VectorStore;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo};
use rmcp::schemars;
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Relay MCP Service
#[derive(Clone)]
pub struct RelayService {
    state: Arc<AppState>,
    /// Tool router
    tool_router: ToolRouter<Self>,
}

struct AppState {
    config: RelayConfig,
    store: Arc<VectorStore>,
    selector: ContextSelector,
    orchestrator: StreamOrchestrator,
    breakers: Arc<BreakerRegistry>,
    indexer: ProjectIndexer,
    metrics: Arc<MetricsRecorder>,
}

impl RelayService {
    /// Build the full component stack from configuration.
    pub fn new(config: RelayConfig) -> Result<Self> {
        let metrics = Arc::new(MetricsRecorder::new()?);

        let breakers = Arc::new(BreakerRegistry::new(BreakerConfig {
            failure_threshold: config.breaker_failure_threshold,
            window_size: config.breaker_window_size,
            min_samples: config.breaker_min_samples,
            cooldown: config.breaker_cooldown(),
            half_open_probes: config.breaker_half_open_probes,
        }));
        breakers.add_observer(metrics.clone());

        let backend: Arc<dyn AiBackend> = Arc::new(HttpBackend::new(&HttpBackendConfig {
            base_url: config.backend_url.clone(),
            timeout_secs: config.backend_timeout_secs,
            channel_capacity: config.stream_channel_capacity,
        })?);

        let store = Arc::new(VectorStore::open(&config.store_path, config.embedding_dims)?);

        let embedder = Arc::new(
            Embedder::new(
                backend.clone(),
                breakers.handle("embeddings"),
                EmbedderConfig {
                    dims: config.embedding_dims,
                    max_batch_size: config.embed_batch_size,
                    cache_capacity: config.embed_cache_capacity,
                },
            )
            .with_observer(metrics.clone()),
        );

        let selector = ContextSelector::new(
            embedder.clone(),
            store.clone(),
            SelectorConfig {
                over_fetch_factor: config.over_fetch_factor,
                recency_half_life_ms: config.recency_half_life_ms,
            },
        );

        let orchestrator = StreamOrchestrator::new(
            backend,
            breakers.handle("completion"),
            StreamConfig {
                idle_timeout: config.stream_idle_timeout(),
                channel_capacity: config.stream_channel_capacity,
            },
        )
        .with_observer(metrics.clone());

        let indexer = ProjectIndexer::new(
            Chunker::new(ChunkerConfig::default()),
            embedder,
            store.clone(),
        );

        Ok(Self {
            state: Arc::new(AppState {
                config,
                store,
                selector,
                orchestrator,
                breakers,
                indexer,
                metrics,
            }),
            tool_router: Self::tool_router(),
        })
    }

    /// The telemetry recorder, for the metrics exporter
    #[must_use]
    pub fn metrics(&self) -> Arc<MetricsRecorder> {
        self.state.metrics.clone()
    }
}

#[tool_handler]
impl ServerHandler for RelayService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some("Relay provides context-augmented streaming completion. Use 'index' to index a project, 'search_context' to retrieve ranked code context for a query, 'stream_complete' for a completion augmented with retrieved context, and 'status' for store/breaker/session health.".into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            ..Default::default()
        }
    }
}

// ============================================================================
// Tool Input/Output Schemas
// ============================================================================

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct IndexRequest {
    /// Project directory path
    #[schemars(description = "Project directory to index")]
    pub path: String,
}

#[derive(Debug, Serialize, schemars::JsonSchema)]
pub struct IndexResult {
    /// Candidate files seen by the scanner
    pub files_seen: usize,
    /// Files (re-)indexed
    pub files_indexed: usize,
    /// Files skipped as unchanged
    pub files_skipped: usize,
    /// Chunks written to the store
    pub chunks_indexed: usize,
    /// Chunks dropped because embedding failed
    pub chunks_failed: usize,
    /// Indexing time in milliseconds
    pub time_ms: u64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchContextRequest {
    /// Search query
    #[schemars(description = "Natural language or code query")]
    pub query: String,

    /// Maximum results (default: 5)
    #[schemars(description = "Maximum number of context chunks (1-50)")]
    pub k: Option<usize>,

    /// Similarity/recency blend weight
    #[schemars(description = "Recency weight in [0,1]; 0 = pure similarity")]
    pub recency_weight: Option<f64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct StreamCompleteRequest {
    /// The prompt to complete
    #[schemars(description = "Prompt text")]
    pub prompt: String,

    /// Context chunks to retrieve (default: 5, 0 disables retrieval)
    #[schemars(description = "Number of context chunks to retrieve (0-50)")]
    pub context_k: Option<usize>,

    /// Similarity/recency blend weight
    #[schemars(description = "Recency weight in [0,1]")]
    pub recency_weight: Option<f64>,
}

#[derive(Debug, Serialize, schemars::JsonSchema)]
pub struct StreamCompleteResult {
    /// Assembled completion text
    pub text: String,
    /// How many context chunks augmented the prompt
    pub context_chunks: usize,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct StatusRequest {}

// ============================================================================
// Tool Implementations
// ============================================================================

#[tool_router]
impl RelayService {
    /// Index a project directory
    #[tool(
        description = "Index a project directory for semantic context retrieval. Run this before search_context or stream_complete."
    )]
    pub async fn index(
        &self,
        Parameters(request): Parameters<IndexRequest>,
    ) -> Result<CallToolResult, McpError> {
        let root = PathBuf::from(&request.path);
        if !root.is_dir() {
            return Ok(CallToolResult::error(vec![Content::text(format!(
                "Error: {} is not a directory",
                root.display()
            ))]));
        }

        let started = Instant::now();
        match self.state.indexer.index_directory(&root, unix_now_ms()).await {
            Ok(stats) => {
                let result = IndexResult {
                    files_seen: stats.files_seen,
                    files_indexed: stats.files_indexed,
                    files_skipped: stats.files_skipped,
                    chunks_indexed: stats.chunks_indexed,
                    chunks_failed: stats.chunks_failed,
                    time_ms: started.elapsed().as_millis() as u64,
                };
                Ok(CallToolResult::success(vec![Content::text(
                    serde_json::to_string_pretty(&result).unwrap_or_default(),
                )]))
            }
            Err(e) => Ok(CallToolResult::error(vec![Content::text(format!(
                "Error: {e}"
            ))])),
        }
    }

    /// Retrieve ranked context for a query
    #[tool(
        description = "Semantic search over indexed code; returns context chunks ranked by a similarity/recency blend."
    )]
    pub async fn search_context(
        &self,
        Parameters(request): Parameters<SearchContextRequest>,
    ) -> Result<CallToolResult, McpError> {
        let k = request.k.unwrap_or(5).clamp(1, 50);
        let weight = request
            .recency_weight
            .unwrap_or(self.state.config.recency_weight);

        let bundle = self.state.selector.select_now(&request.query, k, weight).await;
        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&bundle).unwrap_or_default(),
        )]))
    }

    /// Context-augmented streaming completion
    #[tool(
        description = "Run a streaming completion augmented with retrieved context and return the assembled text. Reports 'temporarily unavailable' immediately when the completion backend is degraded."
    )]
    pub async fn stream_complete(
        &self,
        Parameters(request): Parameters<StreamCompleteRequest>,
    ) -> Result<CallToolResult, McpError> {
        let k = request.context_k.unwrap_or(5).min(50);
        let weight = request
            .recency_weight
            .unwrap_or(self.state.config.recency_weight);

        // An empty bundle (empty store, degraded embeddings) is fine;
        // completion proceeds without context.
        let bundle = self.state.selector.select_now(&request.prompt, k, weight).await;

        let handle = self.state.orchestrator.start_stream(CompletionRequest {
            prompt: request.prompt,
            context: bundle.prompt_sections(),
        });

        match handle.collect_text().await {
            Ok(text) => {
                let result = StreamCompleteResult {
                    text,
                    context_chunks: bundle.len(),
                };
                Ok(CallToolResult::success(vec![Content::text(
                    serde_json::to_string_pretty(&result).unwrap_or_default(),
                )]))
            }
            Err(StreamError::BackendUnavailable { retry_after_ms }) => {
                Ok(CallToolResult::error(vec![Content::text(format!(
                    "Completion backend temporarily unavailable; retry after {retry_after_ms}ms"
                ))]))
            }
            Err(e) => Ok(CallToolResult::error(vec![Content::text(format!(
                "Error: {e}"
            ))])),
        }
    }

    /// Store, breaker, and session health
    #[tool(description = "Report vector store size, circuit breaker states, and active streaming sessions.")]
    pub async fn status(
        &self,
        Parameters(_request): Parameters<StatusRequest>,
    ) -> Result<CallToolResult, McpError> {
        let status = serde_json::json!({
            "store_records": self.state.store.len(),
            "store_writes_halted": self.state.store.is_halted(),
            "breakers": self.state.breakers.snapshots(),
            "active_sessions": self.state.orchestrator.active_sessions(),
        });
        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&status).unwrap_or_default(),
        )]))
    }
}

fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &std::path::Path) -> RelayConfig {
        RelayConfig {
            store_path: dir.join("store.jsonl"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_service_builds_full_stack() {
        let dir = tempfile::tempdir().unwrap();
        let service = RelayService::new(test_config(dir.path())).unwrap();
        assert_eq!(service.state.store.len(), 0);
    }

    #[tokio::test]
    async fn test_status_reports_both_breakers() {
        let dir = tempfile::tempdir().unwrap();
        let service = RelayService::new(test_config(dir.path())).unwrap();

        let result = service.status(Parameters(StatusRequest {})).await;
        assert!(result.is_ok());
        let snapshots = service.state.breakers.snapshots();
        let names: Vec<&str> = snapshots.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"embeddings"));
        assert!(names.contains(&"completion"));
    }

    #[tokio::test]
    async fn test_search_context_degrades_without_backend() {
        // No backend is listening; retrieval degrades to an empty
        // bundle instead of failing the tool call.
        let dir = tempfile::tempdir().unwrap();
        let service = RelayService::new(test_config(dir.path())).unwrap();

        let result = service
            .search_context(Parameters(SearchContextRequest {
                query: "anything".to_string(),
                k: None,
                recency_weight: None,
            }))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_index_rejects_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let service = RelayService::new(test_config(dir.path())).unwrap();

        let result = service
            .index(Parameters(IndexRequest {
                path: "/no/such/project".to_string(),
            }))
            .await;
        assert!(result.is_ok());
    }
}
