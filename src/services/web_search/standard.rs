//! Standard web search (C10): one rewritten query, one search, partial
//! fetches, one cited summary.

use crate::error::Result;
use crate::models::conversations::Message;
use crate::services::llm_router::{GenerateOptions, GenerateText};
use crate::services::storage::FileStorage;
use crate::services::web_search::common::{FetchedResult, SearchApi, fetch_partial_content};

/// Rewrite the user's request into one focused search query. Falls back to
/// the original query on any failure.
pub async fn generate_single_search_query(
    llm: &dyn GenerateText,
    model: &str,
    messages: &[Message],
    user_query: &str,
) -> String {
    let system_message = "Generate a single, focused search query based on the conversation \
history and user query.\nThe query should:\n\
- Capture the main intent of the user's request\n\
- Be specific enough to find relevant information\n\
- Be general enough to get comprehensive results\n\
- Use key terms from the original query\n\
- Be formatted for web search (no special characters or formatting)\n\
Respond with ONLY the search query, no additional text or explanation.";

    let recent = &messages[messages.len().saturating_sub(5)..];
    let mut conversation_history = recent
        .iter()
        .map(|m| format!("{}: {}", capitalize_role(m), m.content))
        .collect::<Vec<_>>()
        .join("\n");
    if conversation_history.is_empty() {
        conversation_history = format!("Query: {}", user_query);
    } else {
        conversation_history.push_str(&format!("\nCurrent Query: {}", user_query));
    }

    let request = vec![
        Message::system(system_message),
        Message::user(conversation_history),
    ];

    tracing::info!("Attempting to generate search query using {}", model);
    match llm.generate(model, &request, 0.3, &GenerateOptions::default()).await {
        Ok(outcome) => {
            let generated = outcome.text.trim().to_string();
            if generated.len() < 3 {
                tracing::warn!("Generated query too short, using original query");
                user_query.trim().to_string()
            } else {
                generated
            }
        }
        Err(e) => {
            tracing::error!("Error generating search query: {}; using original query", e);
            user_query.trim().to_string()
        }
    }
}

fn capitalize_role(message: &Message) -> String {
    let role = message.role.to_string();
    let mut chars = role.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => role,
    }
}

/// Summarize partial-content results into a cited answer.
pub async fn standard_summarize_search_results(
    llm: &dyn GenerateText,
    model: &str,
    results: &[FetchedResult],
    query: &str,
) -> Result<String> {
    tracing::info!(
        "Starting standard summarization of search results for query: '{}'",
        crate::services::web_search::common::truncate_chars(query, 50)
    );

    let combined_content = results
        .iter()
        .map(|r| {
            format!(
                "Title: {}\nURL: {}\nPartial Content: {}",
                r.result.title, r.result.url, r.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let system_message = "Summarize the given search results, focusing on information relevant \
to the query. \nInclude key points from each result and cite them using numbered footnotes \
[1], [2], etc. \nAt the end, include a 'Sources:' section with full URLs for each footnote.";
    let user_message = format!(
        "Summarize the following search results, focusing on information relevant to the \
query: \"{}\"\nSearch Results:\n{}\nProvide a concise but comprehensive summary that \
addresses the query, citing sources with footnotes.",
        query, combined_content
    );

    let request = vec![Message::system(system_message), Message::user(user_message)];
    let outcome = llm.generate(model, &request, 0.3, &GenerateOptions::default()).await?;
    Ok(outcome.text.trim().to_string())
}

/// The standard pipeline. Returns the single generated query plus the
/// cited summary.
pub async fn standard_search_process(
    llm: &dyn GenerateText,
    search: &dyn SearchApi,
    http: &reqwest::Client,
    storage: &FileStorage,
    model: &str,
    understood_query: &str,
    user_id: i32,
    system_message_id: i32,
) -> Result<(Vec<String>, String)> {
    tracing::info!("Step 2: Generating search query");
    let search_query =
        generate_single_search_query(llm, model, &[], understood_query).await;
    tracing::info!("Generated search query: {}", search_query);

    tracing::info!("Step 3: Performing web search");
    let web_search_results = search.search(&search_query).await?;
    tracing::info!("Web search completed. Results count: {}", web_search_results.len());

    if web_search_results.is_empty() {
        tracing::warn!("No web search results found.");
        return Ok((
            vec![search_query],
            "No relevant web search results were found.".to_string(),
        ));
    }

    tracing::info!("Step 4: Fetching partial content for search results");
    let partial_results = fetch_partial_content(
        http,
        storage,
        web_search_results,
        user_id,
        system_message_id,
    )
    .await;

    tracing::info!("Step 5: Summarizing search results");
    let summarized =
        standard_summarize_search_results(llm, model, &partial_results, understood_query).await?;
    tracing::info!(
        "Summarization completed. Summary length: {} characters",
        summarized.len()
    );

    Ok((vec![search_query], summarized))
}
