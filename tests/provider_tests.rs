//! Tests for the chat-completions providers against a local server.

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bujji::error::BujjiError;
use bujji::provider::groq::GroqProvider;
use bujji::provider::openai::OpenAiProvider;
use bujji::provider::{BoundModel, ModelProvider, ToolDefinition};
use bujji::types::{FinishReason, Message};

fn calculator_definition() -> ToolDefinition {
    ToolDefinition {
        name: "calculator".into(),
        description: "Evaluate arithmetic".into(),
        parameters: json!({
            "type": "object",
            "properties": { "expression": { "type": "string" } },
            "required": ["expression"]
        }),
    }
}

fn sse(events: &[serde_json::Value]) -> String {
    let mut body: String = events.iter().map(|e| format!("data: {e}\n\n")).collect();
    body.push_str("data: [DONE]\n\n");
    body
}

#[tokio::test]
async fn invoke_parses_tool_calls_and_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "stream": false,
            "tools": [{ "type": "function", "function": { "name": "calculator" } }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": { "name": "calculator", "arguments": "{\"expression\":\"2+2\"}" }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 8, "total_tokens": 20 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = Arc::new(OpenAiProvider::new(
        "gpt-4o-mini".into(),
        "sk-test".into(),
        Some(server.uri()),
    ));
    let model = BoundModel::new(provider, vec![calculator_definition()]);

    let message = model.invoke(&[Message::human("What is 2+2?")]).await.unwrap();
    assert!(message.has_tool_calls());
    assert_eq!(message.tool_calls[0].id, "call_1");
    assert_eq!(message.tool_calls[0].arguments, json!({"expression": "2+2"}));
    assert_eq!(message.finish_reason, Some(FinishReason::ToolCalls));
    assert_eq!(message.usage.unwrap().total_tokens, 20);
    assert_eq!(message.model.as_deref(), Some("openai:gpt-4o-mini"));
}

#[tokio::test]
async fn groq_stream_assembles_text_and_reads_x_groq_usage() {
    let server = MockServer::start().await;
    let body = sse(&[
        json!({ "choices": [{ "delta": { "content": "2 + 2 " } }] }),
        json!({ "choices": [{ "delta": { "content": "is 4." } }] }),
        json!({
            "choices": [{ "delta": {}, "finish_reason": "stop" }],
            "x_groq": { "usage": { "prompt_tokens": 5, "completion_tokens": 4, "total_tokens": 9 } }
        }),
    ]);
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({ "model": "llama-3.1-8b-instant", "stream": true })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(&server)
        .await;

    let provider = Arc::new(GroqProvider::new(
        "llama-3.1-8b-instant".into(),
        "gsk-test".into(),
        Some(server.uri()),
    ));
    assert_eq!(provider.provider_name(), "groq");
    let model = BoundModel::new(provider, vec![]);

    let mut fragments = Vec::new();
    let message = model
        .stream_with(&[Message::human("What is 2+2?")], |text| fragments.push(text.to_string()))
        .await
        .unwrap();

    assert_eq!(fragments, ["2 + 2 ", "is 4."]);
    assert_eq!(message.content, "2 + 2 is 4.");
    assert_eq!(message.finish_reason, Some(FinishReason::Stop));
    assert_eq!(message.usage.unwrap().total_tokens, 9);
    assert_eq!(message.model.as_deref(), Some("groq:llama-3.1-8b-instant"));
}

#[tokio::test]
async fn streamed_tool_call_fragments_are_joined() {
    let server = MockServer::start().await;
    let body = sse(&[
        json!({ "choices": [{ "delta": { "tool_calls": [{
            "index": 0, "id": "call_9", "function": { "name": "calculator", "arguments": "{\"expr" }
        }] } }] }),
        json!({ "choices": [{ "delta": { "tool_calls": [{
            "index": 0, "function": { "arguments": "ession\":\"6*7\"}" }
        }] } }] }),
        json!({ "choices": [{ "delta": {}, "finish_reason": "tool_calls" }] }),
    ]);
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let provider = Arc::new(OpenAiProvider::new("gpt-4o".into(), "k".into(), Some(server.uri())));
    let model = BoundModel::new(provider, vec![calculator_definition()]);

    let message = model
        .stream_with(&[Message::human("6*7?")], |_| {})
        .await
        .unwrap();
    assert_eq!(message.tool_calls.len(), 1);
    assert_eq!(message.tool_calls[0].id, "call_9");
    assert_eq!(message.tool_calls[0].arguments, json!({"expression": "6*7"}));
    assert_eq!(message.finish_reason, Some(FinishReason::ToolCalls));
}

#[tokio::test]
async fn http_failures_map_to_typed_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let provider = Arc::new(OpenAiProvider::new("gpt-4o".into(), "bad".into(), Some(server.uri())));
    let err = BoundModel::new(provider, vec![])
        .invoke(&[Message::human("hi")])
        .await
        .unwrap_err();
    assert!(matches!(err, BujjiError::Authentication(_)));
}
