use std::sync::Arc;

use secrecy::ExposeSecret;

use crate::DbPool;
use crate::clients::ClientBag;
use crate::config::Config;
use crate::error::Result;
use crate::services::chat::ChatOrchestrator;
use crate::services::embedding_store::EmbeddingStore;
use crate::services::extractor::DocumentExtractor;
use crate::services::file_processor::FileProcessor;
use crate::services::llm_router::LlmRouter;
use crate::services::session_attachments::SessionAttachmentHandler;
use crate::services::status::StatusSessionManager;
use crate::services::storage::FileStorage;
use crate::services::vector_files::VectorFileManager;
use crate::services::web_search::{BraveSearchClient, SearchApi};

/// Application state shared across all HTTP handlers.
///
/// All external clients are constructed once here and injected into the
/// services that need them.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<Config>,
    pub clients: ClientBag,
    pub status: Arc<StatusSessionManager>,
    pub storage: FileStorage,
    pub llm: Arc<LlmRouter>,
    pub embedding_store: EmbeddingStore,
    pub file_processor: FileProcessor,
    pub attachments: SessionAttachmentHandler,
    pub vector_files: VectorFileManager,
    pub orchestrator: Arc<ChatOrchestrator>,
}

impl AppState {
    /// Wire up the full service graph. The vector index itself is resolved
    /// separately via [`AppState::init`].
    pub fn new(config: Config, pool: DbPool) -> Result<Self> {
        let config = Arc::new(config);
        let clients = ClientBag::from_config(&config);
        let status = Arc::new(StatusSessionManager::new());
        let storage = FileStorage::new(&config.uploads.base_folder);
        let llm = Arc::new(LlmRouter::new(clients.clone()));

        let embedding_store = EmbeddingStore::new(
            clients.pinecone.clone(),
            clients.openai.clone(),
            config.database.url.expose_secret(),
            config.ai.embedding_dimension,
        )?;

        let extractor = DocumentExtractor::new(clients.whisper.clone(), storage.clone());
        let file_processor = FileProcessor::new(
            embedding_store.clone(),
            extractor.clone(),
            storage.clone(),
            config.ai.chunk_size_tokens,
            config.ai.chunk_overlap_tokens,
        );
        let attachments = SessionAttachmentHandler::new(storage.clone(), extractor);
        let vector_files = VectorFileManager::new(
            file_processor.clone(),
            embedding_store.clone(),
            storage.clone(),
        );

        let search: Option<Arc<dyn SearchApi>> = clients.brave_api_key.clone().map(|key| {
            let http = reqwest::Client::new();
            Arc::new(BraveSearchClient::new(http, key)) as Arc<dyn SearchApi>
        });

        let orchestrator = Arc::new(ChatOrchestrator::new(
            pool.clone(),
            status.clone(),
            llm.clone(),
            file_processor.clone(),
            attachments.clone(),
            search,
            storage.clone(),
            config.ai.embedding_token_limit,
        ));

        Ok(Self {
            pool,
            config,
            clients,
            status,
            storage,
            llm,
            embedding_store,
            file_processor,
            attachments,
            vector_files,
            orchestrator,
        })
    }

    /// Resolve external resources that need a round trip (the vector
    /// index). Called once at startup.
    pub async fn init(&self) -> Result<()> {
        self.embedding_store.init().await
    }
}
