pub mod chat;
pub mod conversations;
pub mod embedding_store;
pub mod extractor;
pub mod file_processor;
pub mod llm_router;
pub mod session_attachments;
pub mod status;
pub mod storage;
pub mod system_messages;
pub mod time_context;
pub mod titles;
pub mod tokens;
pub mod vector_files;
pub mod web_scraper;
pub mod web_search;
