use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use cordex_core::persist::{save_index, IndexPaths};
use cordex_core::{DocEmbeddings, DocMeta, IndexBuilder, MetadataStore, Tokenizer, WordEmbeddings, EMBEDDING_DIM};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::tempdir;
use tower::ServiceExt;

fn one_hot(i: usize) -> Vec<f32> {
    let mut v = vec![0.0; EMBEDDING_DIM];
    v[i] = 1.0;
    v
}

fn build_tiny_index(dir: &std::path::Path) {
    let paths = IndexPaths::new(dir);
    let tokenizer = Tokenizer::new();
    let mut builder = IndexBuilder::new();
    builder.add_document("doc0", &tokenizer.tokenize("Rust is great. rust systems programming."));
    builder.add_document("doc1", &tokenizer.tokenize("Learning rust."));
    builder.add_document("doc2", &tokenizer.tokenize("Gardening tips"));
    let (lexicon, forward, inverted) = builder.finish();

    let mut metadata = MetadataStore::new();
    metadata.insert("doc0", DocMeta { title: "Doc 0".into(), url: "https://example.org/0".into() });
    metadata.insert("doc1", DocMeta { title: "Doc 1".into(), url: String::new() });
    save_index(&paths, &lexicon, &forward, &inverted, &metadata, "2024-01-01T00:00:00Z".into(), 0).unwrap();

    let mut words = WordEmbeddings::new(EMBEDDING_DIM);
    words.insert("rust", one_hot(0));
    words.insert("programming", one_hot(1));
    words.insert("gardening", one_hot(2));
    words.save_binary(&paths.word_embeddings()).unwrap();
    DocEmbeddings::build(&words, &forward, &lexicon).save_binary(&paths.doc_embeddings()).unwrap();
}

async fn call(app: Router, uri: &str) -> (StatusCode, Value) {
    let req = Request::get(uri).body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

fn app_for(dir: &std::path::Path) -> Router {
    server::build_app(dir.to_str().unwrap(), None).unwrap()
}

#[tokio::test]
async fn search_returns_ranked_results() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());

    let (status, json) = call(app_for(dir.path()), "/search?q=rust&k=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["mode"], "boolean");
    let arr = json["results"].as_array().unwrap();
    assert_eq!(arr.len(), 2);
    assert_eq!(arr[0]["doc_id"].as_u64().unwrap(), 0);
    assert_eq!(arr[0]["score"].as_f64().unwrap(), 2.0);
    assert_eq!(arr[0]["title"], "Doc 0");
    assert_eq!(arr[0]["url"], "https://example.org/0");
    assert_eq!(arr[1]["external_id"], "doc1");
}

#[tokio::test]
async fn unknown_query_is_empty_not_an_error() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());

    let (status, json) = call(app_for(dir.path()), "/search?q=zebra").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_hits"], 0);
    let (status, json) = call(app_for(dir.path()), "/semantic").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["results"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn semantic_search_uses_embeddings() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());

    let (status, json) = call(app_for(dir.path()), "/semantic?q=gardening&k=5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["mode"], "semantic");
    let arr = json["results"].as_array().unwrap();
    assert_eq!(arr.len(), 1);
    assert_eq!(arr[0]["external_id"], "doc2");
    assert!((arr[0]["score"].as_f64().unwrap() - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn autocomplete_and_doc_lookup() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());

    let (_, json) = call(app_for(dir.path()), "/autocomplete?q=Pro").await;
    assert_eq!(json["suggestions"], serde_json::json!(["programming"]));

    let (_, json) = call(app_for(dir.path()), "/doc/1").await;
    assert_eq!(json["external_id"], "doc1");
    assert_eq!(json["title"], "Doc 1");

    let (_, json) = call(app_for(dir.path()), "/doc/42").await;
    assert_eq!(json["error"], "not found");
}

#[test]
fn missing_index_aborts_startup() {
    let dir = tempdir().unwrap();
    assert!(server::build_app(dir.path().to_str().unwrap(), None).is_err());
}

#[test]
fn lemma_dictionary_mismatch_is_detected() {
    let dir = tempdir().unwrap();
    build_tiny_index(dir.path());
    let paths = IndexPaths::new(dir.path());

    assert!(server::check_lemmas(&paths, &Tokenizer::new()));
    let lemmas = [("programs".to_string(), "program".to_string())].into_iter().collect();
    assert!(!server::check_lemmas(&paths, &Tokenizer::new().with_lemmas(lemmas)));

    let lemma_file = dir.path().join("lemmas.txt");
    std::fs::write(&lemma_file, "programs program\n").unwrap();
    assert!(server::build_app(dir.path().to_str().unwrap(), lemma_file.to_str()).is_ok());
}
