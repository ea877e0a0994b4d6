//! Deep web search (C11): three generated queries, sequential rate-limited
//! searches with URL dedupe, full page fetches, per-result summarization,
//! and a cited combined summary with a concatenation safety net.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::models::conversations::Message;
use crate::services::llm_router::{GenerateOptions, GenerateText};
use crate::services::storage::FileStorage;
use crate::services::web_search::common::{
    FetchedResult, SearchApi, SearchResult, fetch_full_content, truncate_chars,
};

pub const MAX_CONTENT_LENGTH: usize = 5000;
pub const MODEL_COMBINE: &str = "gpt-4o-mini-2024-07-18";
pub const MODEL_FALLBACK: &str = "gpt-3.5-turbo";

/// A per-result summary carrying its citation number and source URL.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ResultSummary {
    pub index: usize,
    pub url: String,
    pub summary: String,
}

#[derive(Debug, Deserialize)]
struct GeneratedQueries {
    queries: Vec<String>,
}

/// Ask the model for three diverse queries as JSON; malformed output is an
/// error, not a guess.
pub async fn generate_search_queries(
    llm: &dyn GenerateText,
    model: &str,
    interpretation: &str,
) -> Result<Vec<String>> {
    let system_message = "Generate three diverse search queries based on the given \
interpretation. Respond with only valid JSON in the format: \
{\"queries\": [\"query1\", \"query2\", \"query3\"]}";
    let request = vec![
        Message::system(system_message),
        Message::user(interpretation),
    ];

    let outcome = llm
        .generate(model, &request, 0.3, &GenerateOptions::default())
        .await
        .map_err(|e| Error::Provider(format!("Failed to generate search queries: {}", e)))?;

    let parsed: GeneratedQueries = serde_json::from_str(outcome.text.trim())
        .map_err(|e| Error::Provider(format!("Failed to generate search queries: {}", e)))?;
    if parsed.queries.is_empty() {
        return Err(Error::Provider(
            "Failed to generate search queries: empty query list".to_string(),
        ));
    }
    Ok(parsed.queries)
}

/// Run the searches sequentially (the shared limiter spaces them out),
/// deduplicating by URL. Individual failures are tolerated; only a total
/// wipeout fails the search.
pub async fn perform_multiple_web_searches(
    search: &dyn SearchApi,
    queries: &[String],
) -> Result<Vec<SearchResult>> {
    let mut all_results = Vec::new();
    let mut urls_seen = std::collections::HashSet::new();
    let mut successful_searches = 0;

    for (i, query) in queries.iter().enumerate() {
        tracing::info!(
            "Performing search {}/{}: '{}'",
            i + 1,
            queries.len(),
            truncate_chars(query, 50)
        );
        match search.search(query).await {
            Ok(results) => {
                if results.is_empty() {
                    tracing::warn!("Search {} returned no results", i + 1);
                } else {
                    let found = results.len();
                    for result in results {
                        if urls_seen.insert(result.url.clone()) {
                            all_results.push(result);
                        }
                    }
                    successful_searches += 1;
                    tracing::info!("Search {} completed successfully, found {} results", i + 1, found);
                }
            }
            Err(e) => {
                tracing::error!(
                    "Search {} failed for query '{}': {}",
                    i + 1,
                    truncate_chars(query, 50),
                    e
                );
                continue;
            }
        }
    }

    tracing::info!(
        "Completed {}/{} searches successfully. Total unique results: {}",
        successful_searches,
        queries.len(),
        all_results.len()
    );

    if successful_searches == 0 {
        return Err(Error::Provider(
            "All search queries failed due to rate limits or errors".to_string(),
        ));
    }
    Ok(all_results)
}

/// Summarize one page with emphasis on query relevance, preserving code
/// snippets. Content is truncated to 5000 characters with a marker.
pub async fn intelligent_summarize(
    llm: &dyn GenerateText,
    model: &str,
    content: &str,
    query: &str,
) -> Result<String> {
    if content.is_empty() {
        return Ok("No content available for summarization.".to_string());
    }

    let system_message = "You are an advanced AI assistant tasked with intelligently \
summarizing web content. Your summaries should be informative, relevant to the query, and \
include key information. If the content contains code, especially for newer libraries, \
repos, or APIs, include it verbatim in your summary. Adjust the level of detail based on \
the content's relevance and information density. Your summary should be comprehensive yet \
concise.";

    let mut truncated = truncate_chars(content, MAX_CONTENT_LENGTH).to_string();
    if content.chars().count() > MAX_CONTENT_LENGTH {
        truncated.push_str("... [Content truncated]");
    }
    let user_message = format!(
        "Summarize the following content, focusing on information relevant to the query: \
\"{}\"\nContent: {}\nRemember to include any relevant code snippets verbatim, especially \
if they relate to new technologies or APIs.",
        query, truncated
    );

    let request = vec![Message::system(system_message), Message::user(user_message)];
    let outcome = llm
        .generate(model, &request, 0.3, &GenerateOptions::default())
        .await
        .map_err(|e| Error::Provider(format!("Failed to generate intelligent summary: {}", e)))?;
    Ok(outcome.text.trim().to_string())
}

/// Concatenate per-result summaries with their citations; the last-resort
/// output when both combiner models fail.
pub fn basic_concatenation(summaries: &[ResultSummary], prefix: &str) -> String {
    let mut output = format!("{}\n\n", prefix);
    for summary in summaries {
        output.push_str(&format!("[{}] {}\n\n", summary.index, summary.summary));
    }
    output.push_str("\nSources:\n");
    for summary in summaries {
        output.push_str(&format!("[{}] {}\n", summary.index, summary.url));
    }
    output
}

/// Append any citation missing from the combined text under an
/// "Additional Sources:" block so every source stays reachable.
pub fn ensure_all_citations(text: &str, summaries: &[ResultSummary]) -> String {
    let missing: Vec<&ResultSummary> = summaries
        .iter()
        .filter(|s| !text.contains(&format!("[{}]", s.index)))
        .collect();
    if missing.is_empty() {
        return text.to_string();
    }
    let mut output = format!("{}\n\nAdditional Sources:\n", text);
    for summary in missing {
        output.push_str(&format!("[{}] {}\n", summary.index, summary.url));
    }
    output
}

/// Summarize every fetched result, then combine into one cited answer.
pub async fn summarize_search_results(
    llm: &dyn GenerateText,
    model: &str,
    results: &[FetchedResult],
    query: &str,
) -> Result<String> {
    if results.is_empty() {
        return Ok("No search results were found to summarize.".to_string());
    }

    let mut summaries: Vec<ResultSummary> = Vec::new();
    let mut failed = 0usize;
    for result in results {
        if result.content.is_empty() {
            continue;
        }
        let summary = match intelligent_summarize(llm, model, &result.content, query).await {
            Ok(s) if !s.is_empty() => s,
            _ => match intelligent_summarize(llm, MODEL_FALLBACK, &result.content, query).await {
                Ok(s) if !s.is_empty() => s,
                _ => {
                    failed += 1;
                    tracing::error!(
                        "Both primary and fallback summarization failed for {}",
                        result.result.url
                    );
                    continue;
                }
            },
        };
        summaries.push(ResultSummary {
            index: result.result.citation_number,
            url: result.result.url.clone(),
            summary,
        });
    }

    if summaries.is_empty() {
        return Err(Error::Provider(format!(
            "Failed to generate any summaries from the search results ({} failures)",
            failed
        )));
    }

    let combine_prompt = format!(
        "Combine these summaries into a coherent response that answers the query: \"{}\"\n\
Requirements:\n\
Include relevant information from all sources\n\
Use numbered footnotes [1], [2], etc. for citations\n\
Preserve any code snippets exactly as they appear\n\
Include all sources in the final 'Sources:' section\n\
Maintain a clear, logical flow of information\n\
Focus on information relevant to the query\n\
Format the response as:\n\
Main summary with inline citations\n\
Code snippets (if any) with proper formatting\n\
Sources section with full URLs\n\
Summaries to combine:\n{}",
        query,
        serde_json::to_string_pretty(&summaries).unwrap_or_default()
    );
    let request = vec![
        Message::system(
            "You are an expert at combining multiple sources into clear, comprehensive \
summaries. Focus on accuracy, clarity, and proper citation of sources. Preserve technical \
details and code snippets exactly as provided.",
        ),
        Message::user(combine_prompt),
    ];

    let mut final_summary = match llm
        .generate(model, &request, 0.3, &GenerateOptions::default())
        .await
    {
        Ok(outcome) => outcome.text.trim().to_string(),
        Err(e) => {
            tracing::error!("Combined summary generation failed: {}", e);
            String::new()
        }
    };

    if final_summary.is_empty() && model != MODEL_FALLBACK {
        final_summary = match llm
            .generate(MODEL_FALLBACK, &request, 0.3, &GenerateOptions::default())
            .await
        {
            Ok(outcome) => outcome.text.trim().to_string(),
            Err(e) => {
                tracing::error!("Fallback combined summary failed: {}", e);
                String::new()
            }
        };
    }

    if final_summary.is_empty() {
        return Ok(basic_concatenation(&summaries, "Summary of found information:"));
    }

    Ok(ensure_all_citations(&final_summary, &summaries))
}

/// The deep pipeline end to end. Returns the generated queries plus the
/// combined summary.
pub async fn deep_search_process(
    llm: &dyn GenerateText,
    search: &dyn SearchApi,
    http: &reqwest::Client,
    storage: &FileStorage,
    model: &str,
    understood_query: &str,
    user_id: i32,
    system_message_id: i32,
) -> Result<(Vec<String>, String)> {
    tracing::info!("Step 1: Generating search queries based on understood query");
    let generated_queries = generate_search_queries(llm, model, understood_query).await?;

    tracing::info!("Step 2: Performing multiple web searches");
    let web_search_results = perform_multiple_web_searches(search, &generated_queries).await?;

    if web_search_results.is_empty() {
        tracing::warn!("No relevant web search results were found");
        return Ok((
            generated_queries,
            "No relevant web search results were found.".to_string(),
        ));
    }

    tracing::info!("Step 3: Fetching full content for search results");
    let full_results = fetch_full_content(
        http,
        storage,
        web_search_results,
        user_id,
        system_message_id,
    )
    .await;

    tracing::info!("Step 4: Summarizing search results");
    let summarized = summarize_search_results(llm, model, &full_results, understood_query).await?;
    Ok((generated_queries, summarized))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(index: usize, url: &str, text: &str) -> ResultSummary {
        ResultSummary {
            index,
            url: url.to_string(),
            summary: text.to_string(),
        }
    }

    #[test]
    fn missing_citations_are_appended() {
        let summaries = vec![
            summary(1, "https://a.example", "first"),
            summary(2, "https://b.example", "second"),
            summary(3, "https://c.example", "third"),
        ];
        let text = "Combined answer citing [1] and [3].\n\nSources:\n[1] https://a.example\n[3] https://c.example";
        let completed = ensure_all_citations(text, &summaries);
        assert!(completed.contains("Additional Sources:"));
        assert!(completed.contains("[2] https://b.example"));
        // Already-cited sources are not repeated in the appendix
        assert_eq!(completed.matches("https://a.example").count(), 1);
    }

    #[test]
    fn complete_citations_pass_through_unchanged() {
        let summaries = vec![summary(1, "https://a.example", "only")];
        let text = "Answer [1].\n\nSources:\n[1] https://a.example";
        assert_eq!(ensure_all_citations(text, &summaries), text);
    }

    #[test]
    fn concatenation_lists_every_summary_and_source() {
        let summaries = vec![
            summary(1, "https://a.example", "alpha facts"),
            summary(4, "https://b.example", "beta facts"),
        ];
        let output = basic_concatenation(&summaries, "Summary of found information:");
        assert!(output.contains("[1] alpha facts"));
        assert!(output.contains("[4] beta facts"));
        assert!(output.contains("Sources:"));
        assert!(output.contains("[1] https://a.example"));
        assert!(output.contains("[4] https://b.example"));
    }
}
