//! Pipeline tests for the web-search subsystem, driven by scripted fakes
//! for the LLM and the search API so no network is involved.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use chatforge::error::{Error, Result};
use chatforge::models::conversations::Message;
use chatforge::services::llm_router::{GenerateOptions, GenerateOutcome, GenerateText};
use chatforge::services::status::StatusSessionManager;
use chatforge::services::storage::FileStorage;
use chatforge::services::web_search::common::{FetchedResult, SearchApi, SearchResult};
use chatforge::services::web_search::{deep, standard};

/// Pops canned responses in call order; errors once the script runs out.
struct ScriptedLlm {
    responses: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    fn new(responses: &[&str]) -> Self {
        let mut list: Vec<String> = responses.iter().map(|s| s.to_string()).collect();
        list.reverse();
        Self {
            responses: Mutex::new(list),
            calls: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerateText for ScriptedLlm {
    async fn generate(
        &self,
        model: &str,
        _messages: &[Message],
        _temperature: f32,
        _options: &GenerateOptions,
    ) -> Result<GenerateOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut responses = self.responses.lock().unwrap();
        match responses.pop() {
            Some(text) => Ok(GenerateOutcome {
                text,
                model_name: model.to_string(),
                thinking: None,
            }),
            None => Err(Error::Provider("script exhausted".to_string())),
        }
    }
}

/// Returns pre-built result sets per call; entries of `Err` simulate a
/// failing search.
struct ScriptedSearch {
    outcomes: Mutex<Vec<Result<Vec<SearchResult>>>>,
    calls: AtomicUsize,
}

impl ScriptedSearch {
    fn new(outcomes: Vec<Result<Vec<SearchResult>>>) -> Self {
        let mut outcomes = outcomes;
        outcomes.reverse();
        Self {
            outcomes: Mutex::new(outcomes),
            calls: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchApi for ScriptedSearch {
    async fn search(&self, _query: &str) -> Result<Vec<SearchResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcomes
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Ok(vec![]))
    }
}

fn hits(urls: &[&str]) -> Vec<SearchResult> {
    urls.iter()
        .enumerate()
        .map(|(i, url)| SearchResult {
            title: format!("Result {}", i + 1),
            url: url.to_string(),
            description: "description".to_string(),
            citation_number: i + 1,
        })
        .collect()
}

fn fetched(url: &str, citation: usize, content: &str) -> FetchedResult {
    FetchedResult {
        result: SearchResult {
            title: format!("Result {}", citation),
            url: url.to_string(),
            description: String::new(),
            citation_number: citation,
        },
        content: content.to_string(),
    }
}

// --- Standard pipeline ---

#[tokio::test]
async fn standard_pipeline_searches_once_and_cites_sources() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(dir.path().to_str().unwrap());
    let http = reqwest::Client::new();

    let summary = "Key findings [1] and more [2], plus [3].\n\nSources:\n\
[1] https://one.invalid/a\n[2] https://two.invalid/b\n[3] https://three.invalid/c";
    let llm = ScriptedLlm::new(&["rust async runtimes", summary]);
    let search = ScriptedSearch::new(vec![Ok(hits(&[
        "https://one.invalid/a",
        "https://two.invalid/b",
        "https://three.invalid/c",
    ]))]);

    let (queries, result) = standard::standard_search_process(
        &llm,
        &search,
        &http,
        &storage,
        "gpt-4o-mini",
        "what async runtimes exist for rust",
        7,
        3,
    )
    .await
    .unwrap();

    assert_eq!(search.call_count(), 1);
    assert_eq!(queries, vec!["rust async runtimes".to_string()]);
    for marker in ["[1]", "[2]", "[3]", "Sources:"] {
        assert!(result.contains(marker), "missing {}", marker);
    }

    // Each fetched result was persisted under web_search_results/
    let results_dir = dir.path().join("7/3/web_search_results");
    for n in 1..=3 {
        assert!(results_dir.join(format!("partial_result_{}.json", n)).exists());
    }
}

#[tokio::test]
async fn standard_query_generation_falls_back_to_the_original() {
    let llm = ScriptedLlm::new(&[]); // exhausted script: generation errors
    let query =
        standard::generate_single_search_query(&llm, "gpt-4o-mini", &[], "  original query  ")
            .await;
    assert_eq!(query, "original query");

    let llm = ScriptedLlm::new(&["x"]); // too short to be a real query
    let query = standard::generate_single_search_query(&llm, "gpt-4o-mini", &[], "fallback").await;
    assert_eq!(query, "fallback");
}

#[tokio::test]
async fn standard_pipeline_with_no_hits_reports_none() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(dir.path().to_str().unwrap());
    let http = reqwest::Client::new();

    let llm = ScriptedLlm::new(&["a query"]);
    let search = ScriptedSearch::new(vec![Ok(vec![])]);

    let (queries, result) = standard::standard_search_process(
        &llm, &search, &http, &storage, "gpt-4o-mini", "anything", 1, 1,
    )
    .await
    .unwrap();

    assert_eq!(queries.len(), 1);
    assert_eq!(result, "No relevant web search results were found.");
}

// --- Deep pipeline components ---

#[tokio::test]
async fn deep_query_generation_parses_json_and_rejects_garbage() {
    let llm = ScriptedLlm::new(&[r#"{"queries": ["q1", "q2", "q3"]}"#]);
    let queries = deep::generate_search_queries(&llm, "gpt-4o", "interpretation")
        .await
        .unwrap();
    assert_eq!(queries, vec!["q1", "q2", "q3"]);

    let llm = ScriptedLlm::new(&["here are some queries: q1, q2"]);
    assert!(deep::generate_search_queries(&llm, "gpt-4o", "interpretation").await.is_err());
}

#[tokio::test]
async fn deep_searches_tolerate_a_failing_query() {
    let queries = vec!["q1".to_string(), "q2".to_string(), "q3".to_string()];
    let search = ScriptedSearch::new(vec![
        Ok(hits(&["https://a.invalid", "https://b.invalid"])),
        Err(Error::RateLimited("Rate limit reached".to_string())),
        Ok(hits(&["https://b.invalid", "https://c.invalid"])),
    ]);

    let results = deep::perform_multiple_web_searches(&search, &queries)
        .await
        .unwrap();

    assert_eq!(search.call_count(), 3);
    // URL b is deduplicated across the two successful searches
    let urls: Vec<&str> = results.iter().map(|r| r.url.as_str()).collect();
    assert_eq!(urls, vec!["https://a.invalid", "https://b.invalid", "https://c.invalid"]);
}

#[tokio::test]
async fn deep_search_fails_only_when_every_query_fails() {
    let queries = vec!["q1".to_string(), "q2".to_string(), "q3".to_string()];
    let search = ScriptedSearch::new(vec![
        Err(Error::RateLimited("429".to_string())),
        Err(Error::RateLimited("429".to_string())),
        Err(Error::RateLimited("429".to_string())),
    ]);

    let outcome = deep::perform_multiple_web_searches(&search, &queries).await;
    assert!(outcome.is_err());
}

#[tokio::test]
async fn deep_summaries_carry_unique_citations_and_sources() {
    // Per-result summaries for citations 1 and 3, then a combined answer
    // that forgets to cite [3].
    let llm = ScriptedLlm::new(&[
        "summary of first page",
        "summary of third page",
        "Combined answer citing [1].\n\nSources:\n[1] https://a.invalid",
    ]);
    let results = vec![
        fetched("https://a.invalid", 1, "alpha content"),
        fetched("https://c.invalid", 3, "gamma content"),
    ];

    let combined = deep::summarize_search_results(&llm, "gpt-4o", &results, "query")
        .await
        .unwrap();

    assert!(combined.contains("[1]"));
    assert!(combined.contains("Additional Sources:"));
    assert!(combined.contains("[3] https://c.invalid"));
}

#[tokio::test]
async fn deep_combiner_falls_back_to_concatenation() {
    // Two empty combiner responses push the pipeline to the safety net.
    let llm = ScriptedLlm::new(&["per-result summary", "", ""]);
    let results = vec![fetched("https://a.invalid", 1, "alpha content")];

    let combined = deep::summarize_search_results(&llm, "gpt-4o", &results, "query")
        .await
        .unwrap();

    assert!(combined.contains("Summary of found information:"));
    assert!(combined.contains("[1] per-result summary"));
    assert!(combined.contains("Sources:"));
    assert!(combined.contains("[1] https://a.invalid"));
}

#[tokio::test]
async fn deep_results_with_no_content_are_an_error() {
    let llm = ScriptedLlm::new(&[]);
    let results = vec![fetched("https://a.invalid", 1, "")];
    assert!(
        deep::summarize_search_results(&llm, "gpt-4o", &results, "query")
            .await
            .is_err()
    );
}

// --- Orchestrated entry point ---

#[tokio::test]
async fn full_standard_process_emits_status_and_returns_summary() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(dir.path().to_str().unwrap());
    let http = reqwest::Client::new();
    let status = StatusSessionManager::new();
    let session_id = status.create_session(1).await;

    let llm = ScriptedLlm::new(&[
        "the user wants rust web frameworks",
        "rust web frameworks comparison",
        "Frameworks overview [1].\n\nSources:\n[1] https://a.invalid",
    ]);
    let search = ScriptedSearch::new(vec![Ok(hits(&["https://a.invalid"]))]);

    let (queries, summary) = chatforge::services::web_search::perform_web_search_process(
        &llm,
        &search,
        &http,
        &storage,
        &status,
        "gpt-4o",
        &[Message::user("what rust web frameworks are there?")],
        "what rust web frameworks are there?",
        1,
        2,
        false,
        &session_id,
    )
    .await
    .unwrap();

    assert_eq!(queries, vec!["rust web frameworks comparison".to_string()]);
    assert!(summary.contains("[1]"));
    assert_eq!(llm.call_count(), 3);
}
