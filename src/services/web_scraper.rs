//! Future extension point for orchestrated web content extraction. The
//! Scrapy-era scraping path was removed; the route stays as a stub until
//! an AI-powered extractor (e.g. Firecrawl) lands.

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ExtractOutcome {
    pub success: bool,
    pub message: String,
}

pub async fn extract_content(url: &str) -> ExtractOutcome {
    tracing::info!("extract_content called for URL: {} (not implemented)", url);
    ExtractOutcome {
        success: false,
        message: "Web content extraction not implemented yet. Integrate Firecrawl here."
            .to_string(),
    }
}
