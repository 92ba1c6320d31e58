//! Client to server through the wire encoding, with a scripted model.

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;

use aibox::client::{ChatClient, LocalBackend, RunState, ToolCallStatus};
use aibox::tools::ToolConfig;
use aibox::types::{HistoryMessage, Role};

use common::*;

fn weather_client(script: &Arc<Script>) -> ChatClient {
    let backend = LocalBackend::new(service(script))
        .with_tool_config(ToolConfig::default().with_legacy_tools(["get_weather"]));
    ChatClient::new(Arc::new(backend))
}

#[tokio::test]
async fn weather_question_round_trips_through_a_tool_call() {
    let script = Script::new();
    let mut first_turn = vec![text("Let me check.")];
    first_turn.extend(tool_call("call_1", "get_weather", r#"{"city":"Tokyo"}"#));
    script.push_turn(first_turn);
    script.push_turn(vec![text(" It is 21C and sunny in Tokyo.")]);

    let client = weather_client(&script);
    let thread = client.thread("s1");
    let state = thread
        .submit("What's the weather in Tokyo?", Vec::new())
        .await
        .expect("submit");

    assert_eq!(state, RunState::Finalized);
    let messages = thread.messages().await;
    assert_eq!(messages.len(), 2);
    let reply = &messages[1];
    assert_eq!(reply.text_content, "Let me check. It is 21C and sunny in Tokyo.");
    assert!(reply.error.is_none());

    let call = reply.tool_call("call_1").expect("tool call folded");
    assert_eq!(call.name, "get_weather");
    assert_eq!(call.status, ToolCallStatus::Completed);
    assert_eq!(call.arguments(), Some(serde_json::json!({ "city": "Tokyo" })));
    let result: serde_json::Value =
        serde_json::from_str(call.result.as_deref().expect("result")).expect("JSON result");
    assert_eq!(result["city"], "Tokyo");
    assert_eq!(result["conditions"], "sunny");

    let requests = script.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].tools.iter().any(|tool| tool.name == "get_weather"));
    let last = requests[1].messages.last().expect("tool result sent back");
    assert_eq!(last.role, Role::Tool);
}

#[tokio::test]
async fn follow_up_keeps_the_server_transcript_when_histories_agree() {
    let script = Script::new();
    script.push_turn(tool_call("call_1", "get_weather", r#"{"city":"Tokyo"}"#));
    script.push_turn(vec![text("Sunny.")]);
    script.push_turn(vec![text("Yes, still sunny.")]);

    let client = weather_client(&script);
    let thread = client.thread("s1");
    thread.submit("Tokyo weather?", Vec::new()).await.expect("first");
    thread.submit("Still sunny?", Vec::new()).await.expect("second");

    let follow_up = &script.requests()[2];
    let roles: Vec<Role> = follow_up.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant, Role::User]
    );
}

#[tokio::test]
async fn retraction_rewinds_the_server_transcript() {
    let script = Script::new();
    script.push_turn(vec![text("A1")]);
    script.push_turn(vec![text("A2")]);
    script.push_turn(vec![text("A2 take two")]);

    let backend = Arc::new(LocalBackend::new(service(&script)));
    let client = ChatClient::new(backend.clone());
    let thread = client.thread("s1");
    thread.submit("U1", Vec::new()).await.expect("first");
    thread.submit("U2", Vec::new()).await.expect("second");

    let retraction = thread.retract().await.expect("retract").expect("exchange");
    assert_eq!(retraction.text, "U2");
    let record = backend.service().get_session("s1").await.expect("record");
    assert_eq!(
        record.history,
        vec![HistoryMessage::user("U1"), HistoryMessage::assistant("A1")]
    );

    thread.submit("U2 edited", Vec::new()).await.expect("resubmit");
    let texts: Vec<String> = script.requests()[2]
        .messages
        .iter()
        .map(|message| message.text())
        .collect();
    assert_eq!(texts, vec!["U1", "A1", "U2 edited"]);
}

#[tokio::test]
async fn provider_failure_surfaces_as_a_notice_after_partial_text() {
    let script = Script::new();
    script.push_turn(vec![text("Half an ans"), Step::Fail("socket closed".into())]);

    let client = weather_client(&script);
    let thread = client.thread("s1");
    let state = thread.submit("explain", Vec::new()).await.expect("submit");

    assert_eq!(state, RunState::Failed);
    let reply = &thread.messages().await[1];
    assert_eq!(reply.text_content, "Half an ans");
    assert_eq!(
        reply.display_text(),
        "Half an ans\n\nAn error occurred during streaming."
    );
}

#[tokio::test]
async fn clearing_a_thread_forgets_the_server_session() {
    let script = Script::new();
    script.push_turn(vec![text("hello")]);

    let backend = Arc::new(LocalBackend::new(service(&script)));
    let client = ChatClient::new(backend.clone());
    client.thread("s1").submit("hi", Vec::new()).await.expect("submit");
    assert!(backend.service().cache().contains("s1"));

    assert!(client.clear("s1").await.expect("clear"));
    assert!(!backend.service().cache().contains("s1"));
    assert!(client.store().is_empty());
}
