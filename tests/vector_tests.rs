//! Tests for the REST-backed vector stores.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bujji::vector::{
    HashingEmbedder, PineconeVectorStore, QdrantVectorStore, VectorEntry, VectorSelector, VectorStore,
};

const DIM: usize = 8;

fn embedder() -> Arc<HashingEmbedder> {
    Arc::new(HashingEmbedder::new(DIM))
}

async fn qdrant_server(exists: bool) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/collections/docs/exists"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": { "exists": exists } })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/collections/docs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": { "status": "yellow" } })))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/collections/docs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": { "status": "green" } })))
        .with_priority(2)
        .mount(&server)
        .await;
    server
}

fn qdrant(server: &MockServer) -> QdrantVectorStore {
    QdrantVectorStore::new(server.uri(), Some("qk".into()), "docs", embedder())
        .with_dimension(DIM)
        .with_readiness_polling(Duration::from_millis(1), 5)
}

#[tokio::test]
async fn qdrant_creates_the_collection_once_and_waits_for_green() {
    let server = qdrant_server(false).await;
    Mock::given(method("PUT"))
        .and(path("/collections/docs"))
        .and(body_partial_json(json!({ "vectors": { "size": DIM, "distance": "Cosine" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": true })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/collections/docs/points"))
        .and(header("api-key", "qk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": { "status": "completed" } })))
        .expect(2)
        .mount(&server)
        .await;

    let store = qdrant(&server);
    let ids = store
        .add_documents(vec![VectorEntry::new("alpha").with_id("doc-1")])
        .await
        .unwrap();
    assert_eq!(ids, ["doc-1"]);
    // Same id again is an upsert; the collection is not created twice.
    store
        .add_documents(vec![VectorEntry::new("alpha v2").with_id("doc-1")])
        .await
        .unwrap();
}

#[tokio::test]
async fn qdrant_search_maps_payloads_to_chunks() {
    let server = qdrant_server(true).await;
    Mock::given(method("POST"))
        .and(path("/collections/docs/points/search"))
        .and(body_partial_json(json!({ "limit": 2, "with_payload": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": [
                {
                    "id": "5f0c6b1e-8a1e-4b8e-9d7e-000000000001",
                    "score": 0.91,
                    "payload": {
                        "entry_id": "doc-1",
                        "page_content": "Paris is the capital of France.",
                        "metadata": { "user_id": "u1" }
                    }
                },
                {
                    "id": "5f0c6b1e-8a1e-4b8e-9d7e-000000000002",
                    "score": 0.42,
                    "payload": { "entry_id": "doc-2", "page_content": "Berlin is in Germany." }
                }
            ]
        })))
        .mount(&server)
        .await;

    let store = qdrant(&server);
    let hits = store.similarity_search("capital of France", 2).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, "doc-1");
    assert_eq!(hits[0].metadata["user_id"], "u1");

    let rendered = store.query("capital of France", 2).await.unwrap();
    assert_eq!(
        rendered,
        "Chunk 1\nParis is the capital of France.\n\nChunk 2\nBerlin is in Germany."
    );
}

#[tokio::test]
async fn qdrant_deletes_by_filter_and_drops_the_collection() {
    let server = qdrant_server(true).await;
    Mock::given(method("POST"))
        .and(path("/collections/docs/points/delete"))
        .and(body_partial_json(json!({
            "filter": { "must": [{ "key": "metadata.conversation_id", "match": { "value": "c1" } }] }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": { "status": "completed" } })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/collections/docs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": true })))
        .expect(1)
        .mount(&server)
        .await;

    let store = qdrant(&server);
    let mut filter = Map::new();
    filter.insert("conversation_id".into(), json!("c1"));
    store.delete_vectors(VectorSelector::Filter(filter)).await.unwrap();
    store.delete_index().await.unwrap();
}

#[tokio::test]
async fn qdrant_gives_up_when_the_collection_never_turns_green() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/collections/docs/exists"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": { "exists": true } })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/collections/docs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": { "status": "red" } })))
        .mount(&server)
        .await;

    let err = qdrant(&server)
        .add_documents(vec![VectorEntry::new("alpha")])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("did not become ready"));
}

async fn pinecone_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/bujji-u1"))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/indexes/bujji-u1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "bujji-u1",
            "host": server.uri(),
            "status": { "ready": true, "state": "Ready" }
        })))
        .with_priority(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/indexes"))
        .and(header("api-key", "pk"))
        .and(header("x-pinecone-api-version", "2024-07"))
        .and(body_partial_json(json!({
            "name": "bujji-u1",
            "dimension": DIM,
            "metric": "cosine",
            "spec": { "serverless": { "cloud": "aws", "region": "us-east-1" } }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    server
}

fn pinecone(server: &MockServer) -> PineconeVectorStore {
    PineconeVectorStore::new("pk", "bujji-u1", embedder())
        .with_dimension(DIM)
        .with_control_url(server.uri())
        .with_readiness_polling(Duration::from_millis(1), 5)
}

#[tokio::test]
async fn pinecone_creates_the_index_then_upserts_and_queries() {
    let server = pinecone_server().await;
    Mock::given(method("POST"))
        .and(path("/vectors/upsert"))
        .and(body_partial_json(json!({
            "vectors": [{ "id": "doc-1", "metadata": { "text": "hello world", "user_id": "u1" } }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "upsertedCount": 1 })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .and(body_partial_json(json!({ "includeMetadata": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "matches": [{ "id": "doc-1", "score": 0.88, "metadata": { "text": "hello world", "user_id": "u1" } }]
        })))
        .mount(&server)
        .await;

    let store = pinecone(&server);
    store
        .add_documents(vec![VectorEntry::new("hello world")
            .with_id("doc-1")
            .with_metadata("user_id", "u1")])
        .await
        .unwrap();

    let rendered = store.query("hello", 50).await.unwrap();
    assert_eq!(rendered, "Chunk 1\nhello world");

    let hits = store.similarity_search("hello", 3).await.unwrap();
    assert_eq!(hits[0].text, "hello world");
    assert!(!hits[0].metadata.contains_key("text"));

    // k above the cap is clamped before it reaches the backend.
    let queries = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/query")
        .map(|r| r.body_json::<serde_json::Value>().unwrap()["topK"].clone())
        .collect::<Vec<_>>();
    assert_eq!(queries, [json!(10), json!(3)]);
}

#[tokio::test]
async fn pinecone_delete_index_tolerates_missing_index() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/indexes/bujji-u1"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    pinecone(&server).delete_index().await.unwrap();
}
