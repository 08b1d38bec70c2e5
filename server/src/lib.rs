use anyhow::Result;
use axum::{extract::{Path, Query, State}, routing::get, Json, Router};
use cordex_core::persist::{load_meta, IndexPaths};
use cordex_core::{SearchHit, SearchIndex, Tokenizer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub const DEFAULT_K: usize = 10;
pub const MAX_K: usize = 100;

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { DEFAULT_K }

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Boolean,
    Semantic,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub mode: SearchMode,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SuggestResponse {
    pub query: String,
    pub suggestions: Vec<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub index: Arc<SearchIndex>,
}

/// Load the index from `index_dir` and build the router. Any load failure
/// aborts startup.
pub fn build_app(index_dir: &str, lemmas: Option<&str>) -> Result<Router> {
    let mut tokenizer = Tokenizer::new();
    if let Some(path) = lemmas {
        tokenizer = tokenizer.with_lemmas(Tokenizer::load_lemmas(std::path::Path::new(path))?);
    }
    let paths = IndexPaths::new(index_dir);
    check_lemmas(&paths, &tokenizer);
    let index = SearchIndex::load(&paths)?.with_tokenizer(tokenizer);
    tracing::info!(
        docs = index.forward.len(),
        words = index.lexicon.len(),
        semantic = index.has_semantic(),
        "index loaded"
    );
    Ok(router(index))
}

/// Compare the query tokenizer's lemma dictionary with the size recorded in
/// the manifest at build time. A mismatch is logged and reported as `false`.
pub fn check_lemmas(paths: &IndexPaths, tokenizer: &Tokenizer) -> bool {
    match load_meta(paths) {
        Ok(meta) if meta.lemma_count != tokenizer.lemma_count() => {
            tracing::warn!(
                indexed = meta.lemma_count,
                queries = tokenizer.lemma_count(),
                "lemma dictionary differs from the one used at build time; queries may not match indexed terms"
            );
            false
        }
        Ok(_) => true,
        Err(err) => {
            tracing::warn!(error = %err, "manifest unreadable; lemma dictionary not checked");
            true
        }
    }
}

pub fn router(index: SearchIndex) -> Router {
    let app_state = AppState { index: Arc::new(index) };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/semantic", get(semantic_handler))
        .route("/autocomplete", get(autocomplete_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn run_search(state: &AppState, params: SearchParams, mode: SearchMode) -> SearchResponse {
    let start = std::time::Instant::now();
    let k = params.k.clamp(1, MAX_K);
    let tokens = state.index.tokenizer.tokenize(&params.q);
    let results = match mode {
        SearchMode::Boolean => state.index.search_tokens(&tokens, k),
        SearchMode::Semantic => state.index.semantic_search_tokens(&tokens, k),
    };
    let elapsed = start.elapsed();
    tracing::debug!(query = %params.q, ?mode, tokens = tokens.len(), hits = results.len(), "query served");
    SearchResponse { query: params.q, mode, took_s: elapsed.as_secs_f64(), total_hits: results.len(), results }
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Json<SearchResponse> {
    Json(run_search(&state, params, SearchMode::Boolean))
}

pub async fn semantic_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Json<SearchResponse> {
    Json(run_search(&state, params, SearchMode::Semantic))
}

pub async fn autocomplete_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Json<SuggestResponse> {
    let suggestions = state.index.suggest(&params.q, params.k.clamp(1, MAX_K));
    Json(SuggestResponse { query: params.q, suggestions })
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<u32>) -> Json<serde_json::Value> {
    let index = &state.index;
    if let (Some(external_id), Some(terms)) = (index.forward.external_id_of(doc_id), index.forward.terms_of(doc_id)) {
        let meta = index.metadata.get(external_id).cloned().unwrap_or_default();
        return Json(serde_json::json!({
            "doc_id": doc_id,
            "external_id": external_id,
            "title": meta.title,
            "url": meta.url,
            "num_terms": terms.len(),
        }));
    }
    Json(serde_json::json!({ "error": "not found" }))
}
